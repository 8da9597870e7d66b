//! # HubSync Engine
//!
//! Client core for real-time collection sync over a hub connection.
//!
//! This crate provides:
//! - Connection state machine with a session-id handshake
//! - Single-flight connect and a jittered reconnect loop
//! - Subscription cache with suffix-routed feed lookup
//! - Dual-key change reconciliation
//! - Change callbacks with shared or deep-copy delivery
//! - Snapshot fetches over an HTTP collaborator
//!
//! ## Architecture
//!
//! A [`SyncClient`] subscribes to a feed by fetching its full collection
//! once. From then on the hub pushes change envelopes which are reconciled
//! into the cached collection and dispatched to callbacks. After a lost
//! connection is re-established every tracked feed is fetched again.
//!
//! ## Key Invariants
//!
//! - At most one connection attempt runs at a time
//! - Envelopes are applied and dispatched in arrival order
//! - A cached feed always holds a collection; absence means not subscribed
//! - Readers never observe a partially applied change set
//! - A failed snapshot fetch leaves the cache unchanged

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod callbacks;
mod client;
mod config;
mod error;
mod http;
mod processor;
mod snapshot;
mod state;
mod store;
mod transport;

pub use callbacks::{CallbackRegistry, DataCallback, DeliveryMode, EnvelopeCallback};
pub use client::SyncClient;
pub use config::{ClientConfig, ReconnectConfig};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpRequest, HttpResponse, MockHttpClient};
pub use processor::{ApplyOutcome, ApplyStats, RecordIdentity, SyncProcessor};
pub use snapshot::SnapshotFetcher;
pub use state::{ConnectionManager, ConnectionState, ReconnectOutcome, SyncStats};
pub use store::SubscriptionStore;
pub use transport::{ClosedHandler, HubTransport, MessageHandler, MockTransport};
