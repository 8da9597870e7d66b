//! Feed route matching.
//!
//! Feed identifiers are matched by string suffix so that one subscription key
//! can stand for a parameterized route: a key `orders` matches the path
//! `/api/v1/orders`, and a key `/api/v1/orders` matches the path `orders`.
//!
//! When several keys match a path, the winner is chosen deterministically:
//!
//! 1. a key equal to the path;
//! 2. otherwise the longest key the path ends with;
//! 3. otherwise the shortest key that ends with the path;
//!
//! with remaining ties broken by lexicographic key order.

use std::cmp::Reverse;

/// How a key matched a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RouteMatch {
    /// Key and path are equal.
    Exact,
    /// The path ends with the key.
    KeyIsSuffix,
    /// The key ends with the path.
    PathIsSuffix,
}

/// Classifies how `key` matches `path`, if at all.
///
/// Empty strings only match each other exactly.
pub fn match_route(key: &str, path: &str) -> Option<RouteMatch> {
    if key == path {
        Some(RouteMatch::Exact)
    } else if key.is_empty() || path.is_empty() {
        None
    } else if path.ends_with(key) {
        Some(RouteMatch::KeyIsSuffix)
    } else if key.ends_with(path) {
        Some(RouteMatch::PathIsSuffix)
    } else {
        None
    }
}

/// Returns true if `key` matches `path` in either direction.
pub fn route_matches(key: &str, path: &str) -> bool {
    match_route(key, path).is_some()
}

/// Resolves `path` to the best matching key.
pub fn resolve_route<'a, I>(keys: I, path: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    keys.into_iter()
        .filter_map(|key| match_route(key, path).map(|kind| (rank(kind, key), key)))
        .min()
        .map(|(_, key)| key)
}

/// Sort key: lower is better.
fn rank(kind: RouteMatch, key: &str) -> (RouteMatch, Reverse<usize>, usize) {
    match kind {
        RouteMatch::Exact => (kind, Reverse(0), 0),
        RouteMatch::KeyIsSuffix => (kind, Reverse(key.len()), 0),
        RouteMatch::PathIsSuffix => (kind, Reverse(0), key.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn match_kinds() {
        assert_eq!(match_route("orders", "orders"), Some(RouteMatch::Exact));
        assert_eq!(
            match_route("orders", "/api/orders"),
            Some(RouteMatch::KeyIsSuffix)
        );
        assert_eq!(
            match_route("/api/orders", "orders"),
            Some(RouteMatch::PathIsSuffix)
        );
        assert_eq!(match_route("orders", "/api/customers"), None);
        assert_eq!(match_route("", "/api/orders"), None);
        assert_eq!(match_route("orders", ""), None);
    }

    #[test]
    fn exact_wins() {
        let keys = ["api/orders", "orders", "/v1/api/orders"];
        assert_eq!(resolve_route(keys, "orders"), Some("orders"));
    }

    #[test]
    fn longest_suffix_key_wins() {
        let keys = ["orders", "api/orders", "customers"];
        assert_eq!(resolve_route(keys, "/v1/api/orders"), Some("api/orders"));
    }

    #[test]
    fn key_suffix_preferred_over_path_suffix() {
        let keys = ["/tenant/7/orders", "orders"];
        assert_eq!(resolve_route(keys, "7/orders"), Some("orders"));
    }

    #[test]
    fn shortest_key_ending_with_path() {
        let keys = ["/tenant/7/orders", "/7/orders"];
        assert_eq!(resolve_route(keys, "orders"), Some("/7/orders"));
    }

    #[test]
    fn ties_are_lexicographic() {
        let keys = ["/b/orders", "/a/orders"];
        assert_eq!(resolve_route(keys, "orders"), Some("/a/orders"));
        let reversed = ["/a/orders", "/b/orders"];
        assert_eq!(resolve_route(reversed, "orders"), Some("/a/orders"));
    }

    #[test]
    fn no_match() {
        let keys = ["orders", "customers"];
        assert_eq!(resolve_route(keys, "invoices"), None);
        assert_eq!(resolve_route(std::iter::empty(), "orders"), None);
    }

    proptest! {
        #[test]
        fn matching_is_symmetric(key in "[a-z/]{0,12}", path in "[a-z/]{0,12}") {
            prop_assert_eq!(route_matches(&key, &path), route_matches(&path, &key));
        }

        #[test]
        fn resolution_ignores_key_order(mut keys in prop::collection::vec("[a-z/]{1,10}", 0..6), path in "[a-z/]{1,10}") {
            let forward = resolve_route(keys.iter().map(String::as_str), &path).map(str::to_string);
            keys.reverse();
            let backward = resolve_route(keys.iter().map(String::as_str), &path).map(str::to_string);
            prop_assert_eq!(forward, backward);
        }
    }
}
