//! Route command implementation.

use hubsync_protocol::{match_route, resolve_route, RouteMatch};

/// Resolves a feed path against subscription keys.
///
/// Returns the winning key and how it matched.
pub fn resolve<'a>(path: &str, keys: &'a [String]) -> Option<(&'a str, RouteMatch)> {
    let key = resolve_route(keys.iter().map(String::as_str), path)?;
    let kind = match_route(key, path)?;
    Some((key, kind))
}

/// Runs the route command.
pub fn run(path: &str, keys: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    match resolve(path, keys) {
        Some((key, kind)) => {
            println!("{path} -> {key} ({})", describe(kind));
            Ok(())
        }
        None => Err(format!("No key matches {path}").into()),
    }
}

fn describe(kind: RouteMatch) -> &'static str {
    match kind {
        RouteMatch::Exact => "exact",
        RouteMatch::KeyIsSuffix => "path ends with key",
        RouteMatch::PathIsSuffix => "key ends with path",
    }
}
