//! # HubSync Testkit
//!
//! Test utilities for HubSync.
//!
//! This crate provides:
//! - A sync client wired to mock collaborators
//! - Envelope builders and callback recorders
//! - Property-based test generators using proptest
//! - Reconciliation test vectors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hubsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_client() {
//!     let t = TestClient::new();
//!     t.serve("orders", &serde_json::json!([]));
//!     let orders = t.sync_with("orders").await.unwrap();
//!     // ... push envelopes, check the cache
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use generators::*;
pub use vectors::*;
