//! # HubSync Protocol
//!
//! Change envelope types and feed routing for HubSync.
//!
//! This crate provides:
//! - `ChangeEnvelope`, `UrlChangeSet` and `EntityChange` as delivered by the hub
//! - Hub message and action names shared by client and transport implementations
//! - Deterministic suffix-based feed route resolution
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod error;
mod messages;
mod route;

pub use change::{ChangeEnvelope, ChangeState, Collection, EntityChange, Record, UrlChangeSet};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    HubMessage, CHANGES_MESSAGE, SESSION_HEADER, SESSION_ID_MESSAGE,
    UNSUBSCRIBE_ACTION,
};
pub use route::{match_route, resolve_route, route_matches, RouteMatch};
