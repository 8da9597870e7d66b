//! Test fixtures and client helpers.
//!
//! Provides a [`SyncClient`] wired to in-memory collaborators and small
//! builders for common test scenarios.

use hubsync_engine::{
    ClientConfig, ConnectionState, DataCallback, MockHttpClient, MockTransport, ReconnectConfig,
    SyncClient,
};
use hubsync_protocol::{ChangeEnvelope, Collection, EntityChange, UrlChangeSet};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Endpoint used by test clients.
pub const TEST_ENDPOINT: &str = "https://hub.test";

/// Session id prefix assigned by the mock transport.
pub const TEST_SESSION_PREFIX: &str = "session";

/// A sync client over mock collaborators.
pub type MockClient = SyncClient<MockTransport, MockHttpClient>;

/// A test client with handles to its collaborators.
pub struct TestClient {
    /// The client under test.
    pub client: MockClient,
    /// The mock hub connection.
    pub transport: Arc<MockTransport>,
    /// The mock snapshot endpoint.
    pub http: Arc<MockHttpClient>,
}

impl TestClient {
    /// Creates a client with [`test_config`].
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Creates a client with the given configuration.
    pub fn with_config(config: ClientConfig) -> Self {
        let transport = Arc::new(MockTransport::with_session_prefix(TEST_SESSION_PREFIX));
        let http = Arc::new(MockHttpClient::new());
        let client = SyncClient::new(Arc::clone(&transport), Arc::clone(&http), config);
        Self {
            client,
            transport,
            http,
        }
    }

    /// Serves `collection` as the snapshot of `feed`.
    pub fn serve(&self, feed: &str, collection: &Value) {
        self.http
            .set_json(self.client.config().snapshot_url(feed), collection);
    }

    /// Returns how many snapshot requests were made for `feed`.
    pub fn snapshot_requests(&self, feed: &str) -> usize {
        self.http
            .request_count(&self.client.config().snapshot_url(feed))
    }

    /// Pushes an envelope from the hub and lets the client process it.
    pub async fn push(&self, envelope: &ChangeEnvelope) {
        self.transport.deliver_envelope(envelope);
        settle().await;
    }
}

impl Default for TestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestClient {
    type Target = MockClient;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

/// Configuration used by [`TestClient::new`]: short handshake timeout and a
/// fixed 100 ms reconnect delay.
pub fn test_config() -> ClientConfig {
    ClientConfig::new(TEST_ENDPOINT)
        .with_handshake_timeout(Duration::from_secs(1))
        .with_reconnect(ReconnectConfig::no_jitter(Duration::from_millis(100)))
}

/// Yields to the runtime until queued events have been handled.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Waits until `state` is announced on `rx`.
///
/// Returns false if it was not seen within 60 seconds.
pub async fn wait_for_state(
    rx: &mut broadcast::Receiver<ConnectionState>,
    state: ConnectionState,
) -> bool {
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(seen) if seen == state => return true,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(60), wait)
        .await
        .unwrap_or(false)
}

/// Builds a single-feed envelope.
pub fn envelope(feed: &str, changes: Vec<EntityChange>) -> ChangeEnvelope {
    let mut set = UrlChangeSet::new(feed);
    set.changes = changes;
    ChangeEnvelope::new(vec![set])
}

/// Records every collection handed to a callback.
#[derive(Clone, Default)]
pub struct CallbackRecorder {
    calls: Arc<Mutex<Vec<Arc<Collection>>>>,
    callback: Arc<Mutex<Option<DataCallback>>>,
}

impl CallbackRecorder {
    /// Creates a new recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recording callback. Every call returns the same `Arc`.
    pub fn callback(&self) -> DataCallback {
        let mut slot = self.callback.lock();
        if let Some(callback) = slot.as_ref() {
            return Arc::clone(callback);
        }
        let calls = Arc::clone(&self.calls);
        let callback: DataCallback = Arc::new(move |collection: Arc<Collection>| {
            calls.lock().push(collection);
        });
        *slot = Some(Arc::clone(&callback));
        callback
    }

    /// Returns every delivered collection.
    pub fn calls(&self) -> Vec<Arc<Collection>> {
        self.calls.lock().clone()
    }

    /// Returns the number of deliveries.
    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the last delivered collection.
    pub fn last(&self) -> Option<Arc<Collection>> {
        self.calls.lock().last().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_hands_out_one_callback() {
        let recorder = CallbackRecorder::new();
        let a = recorder.callback();
        let b = recorder.callback();
        assert!(Arc::ptr_eq(&a, &b));

        a(Arc::new(vec![serde_json::json!({"id": 1})]));
        assert_eq!(recorder.count(), 1);
        assert_eq!(recorder.last().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_client_serves_snapshots() {
        let t = TestClient::new();
        t.serve("orders", &serde_json::json!([{"id": 1}]));

        let orders = t.sync_with("orders").await.unwrap();

        assert_eq!(orders.len(), 1);
        assert_eq!(t.snapshot_requests("orders"), 1);
        assert_eq!(t.state(), ConnectionState::Connected);
    }
}
