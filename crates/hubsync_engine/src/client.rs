//! The sync client.
//!
//! [`SyncClient`] wires the connection manager, the subscription cache, the
//! reconciler, the callback registry and the snapshot fetcher together.
//!
//! Inbound envelopes and closure notifications are queued by the transport
//! handlers and consumed by a single event task, so changes are applied and
//! dispatched strictly in arrival order.

use crate::callbacks::{CallbackRegistry, DataCallback, DeliveryMode, EnvelopeCallback};
use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::HttpClient;
use crate::processor::{RecordIdentity, SyncProcessor};
use crate::snapshot::SnapshotFetcher;
use crate::state::{ConnectionManager, ConnectionState, ReconnectOutcome, SyncStats};
use crate::store::SubscriptionStore;
use crate::transport::HubTransport;
use hubsync_protocol::{ChangeEnvelope, Collection, HubMessage, CHANGES_MESSAGE, UNSUBSCRIBE_ACTION};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum ClientEvent {
    Changes(ChangeEnvelope),
    Closed(Option<String>),
}

struct ClientInner<T: HubTransport, H: HttpClient> {
    config: ClientConfig,
    connection: Arc<ConnectionManager<T>>,
    store: Arc<SubscriptionStore>,
    processor: SyncProcessor,
    callbacks: CallbackRegistry,
    snapshots: SnapshotFetcher<T, H>,
    stats: Mutex<SyncStats>,
}

/// A real-time sync client.
///
/// Must be created inside a Tokio runtime.
pub struct SyncClient<T: HubTransport, H: HttpClient> {
    inner: Arc<ClientInner<T, H>>,
    events: JoinHandle<()>,
}

impl<T: HubTransport, H: HttpClient> SyncClient<T, H> {
    /// Creates a client and registers its handlers on `transport`.
    ///
    /// Nothing is started until [`connect`](Self::connect) or
    /// [`sync_with`](Self::sync_with) is called.
    pub fn new(transport: Arc<T>, http: Arc<H>, config: ClientConfig) -> Self {
        let connection = Arc::new(ConnectionManager::new(Arc::clone(&transport), &config));
        let store = Arc::new(SubscriptionStore::new());
        let mode = DeliveryMode::from_deep_copy(config.deep_copy_on_delivery);

        let inner = Arc::new(ClientInner {
            processor: SyncProcessor::new(RecordIdentity::new(
                config.primary_key.clone(),
                config.alternate_key.clone(),
            )),
            callbacks: CallbackRegistry::new(mode),
            snapshots: SnapshotFetcher::new(
                Arc::clone(&connection),
                http,
                Arc::clone(&store),
                &config,
            ),
            connection,
            store,
            config,
            stats: Mutex::new(SyncStats::default()),
        });

        let (tx, rx) = mpsc::unbounded_channel();

        let changes_tx = tx.clone();
        transport.on(
            CHANGES_MESSAGE,
            Arc::new(move |args: &[Value]| {
                match HubMessage::decode(CHANGES_MESSAGE, args) {
                    Ok(HubMessage::Changes(envelope)) => {
                        let _ = changes_tx.send(ClientEvent::Changes(envelope));
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "dropping undecodable change envelope"),
                }
            }),
        );
        transport.on_closed(Arc::new(move |reason: Option<String>| {
            let _ = tx.send(ClientEvent::Closed(reason));
        }));

        let events = tokio::spawn(run_events(Arc::downgrade(&inner), rx));
        Self { inner, events }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Ensures the connection is established.
    ///
    /// On failure the reconnect loop is started in the background (when
    /// auto-reconnect is enabled) and the error is returned.
    pub async fn connect(&self) -> SyncResult<()> {
        self.inner.ensure_connected().await
    }

    /// Gets the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Subscribes to connection state transitions.
    pub fn state_changes(&self) -> broadcast::Receiver<ConnectionState> {
        self.inner.connection.subscribe()
    }

    /// Gets the current session id.
    pub fn session_id(&self) -> Option<String> {
        self.inner.connection.session_id()
    }

    /// Returns the cached collection for `feed`, fetching it if absent.
    pub async fn sync_with(&self, feed: &str) -> SyncResult<Arc<Collection>> {
        if self.inner.store.get(feed).is_none() {
            self.inner.ensure_connected().await?;
        }
        self.inner.snapshots.sync_with(feed).await
    }

    /// Fetches the whole collection for `feed`, replacing the cache entry.
    ///
    /// A connection failure starts the reconnect loop, as in
    /// [`connect`](Self::connect).
    pub async fn fetch_full(&self, feed: &str) -> SyncResult<Arc<Collection>> {
        self.inner.ensure_connected().await?;
        self.inner.snapshots.fetch_full(feed).await
    }

    /// Returns the cached collection for `feed` without fetching.
    pub fn cached(&self, feed: &str) -> Option<Arc<Collection>> {
        let cached = self.inner.store.get(feed)?;
        Some(self.inner.callbacks.mode().deliver(&cached))
    }

    /// Returns every subscribed feed, sorted.
    pub fn tracked_feeds(&self) -> Vec<String> {
        self.inner.store.feeds()
    }

    /// Registers a callback for changes to feeds matching `feed`.
    ///
    /// Returns false if this callback was already registered for it.
    pub fn on_data_change(&self, feed: impl Into<String>, callback: DataCallback) -> bool {
        self.inner.callbacks.register(feed, callback)
    }

    /// Unregisters a feed callback. Returns false if it was not registered.
    pub fn off_data_change(&self, feed: &str, callback: &DataCallback) -> bool {
        self.inner.callbacks.unregister(feed, callback)
    }

    /// Registers an observer for every decoded envelope.
    pub fn on_any_change(&self, callback: EnvelopeCallback) -> bool {
        self.inner.callbacks.register_envelope(callback)
    }

    /// Unregisters an envelope observer.
    pub fn off_any_change(&self, callback: &EnvelopeCallback) -> bool {
        self.inner.callbacks.unregister_envelope(callback)
    }

    /// Asks the server to stop sending changes for `feed` and drops the
    /// cached collection.
    ///
    /// The cache is untouched if the remote call fails.
    pub async fn unsubscribe(&self, feed: &str) -> SyncResult<()> {
        self.inner
            .connection
            .transport()
            .invoke(UNSUBSCRIBE_ACTION, vec![Value::String(feed.to_string())])
            .await?;
        self.inner.store.remove(feed);
        info!(feed = %feed, "unsubscribed");
        Ok(())
    }

    /// Runs the reconnect loop and refreshes every tracked feed once
    /// connected.
    pub async fn reconnect(&self) -> ReconnectOutcome {
        self.inner.reconnect_and_refresh().await
    }

    /// Stops reconnecting and refuses further connection attempts.
    pub fn shutdown(&self) {
        info!("shutting down sync client");
        self.inner.connection.shutdown();
    }

    /// Returns a snapshot of the client statistics.
    pub fn stats(&self) -> SyncStats {
        let mut stats = self.inner.stats.lock().clone();
        stats.snapshots_fetched = self.inner.snapshots.fetched_count();
        stats.reconnect_attempts = self.inner.connection.reconnect_attempts();
        stats.last_error = self.inner.connection.last_error();
        stats
    }
}

impl<T: HubTransport, H: HttpClient> Drop for SyncClient<T, H> {
    fn drop(&mut self) {
        self.inner.connection.shutdown();
        self.events.abort();
    }
}

impl<T: HubTransport, H: HttpClient> ClientInner<T, H> {
    fn handle_envelope(&self, envelope: &ChangeEnvelope) {
        self.stats.lock().envelopes_received += 1;
        if self.config.debug {
            debug!(envelope = ?envelope, "change envelope received");
        } else {
            debug!(
                change_sets = envelope.len(),
                changes = envelope.change_count(),
                "change envelope received"
            );
        }

        self.callbacks.notify_envelope(envelope);
        if self.config.suppress_processing {
            return;
        }

        let outcome = self.processor.apply(&self.store, envelope);
        {
            let mut stats = self.stats.lock();
            stats.change_sets_applied += outcome.applied_sets;
            stats.records_added += outcome.stats.added;
            stats.records_replaced += outcome.stats.replaced;
            stats.records_removed += outcome.stats.removed;
            stats.last_sync_time = Some(Instant::now());
        }

        let invoked = self.callbacks.dispatch(&self.store, &outcome.changed);
        self.stats.lock().callbacks_invoked += invoked as u64;
    }

    async fn ensure_connected(self: &Arc<Self>) -> SyncResult<()> {
        match self.connection.connect().await {
            Ok(()) => Ok(()),
            Err(SyncError::Shutdown) => Err(SyncError::Shutdown),
            Err(err) => {
                self.spawn_reconnect();
                Err(err)
            }
        }
    }

    async fn reconnect_and_refresh(&self) -> ReconnectOutcome {
        let outcome = self.connection.reconnect().await;
        if let ReconnectOutcome::Reconnected { .. } = outcome {
            for feed in self.store.feeds() {
                if let Err(err) = self.snapshots.fetch_full(&feed).await {
                    warn!(feed = %feed, error = %err, "failed to refresh feed after reconnect");
                }
            }
        }
        outcome
    }

    fn spawn_reconnect(self: &Arc<Self>) {
        if !self.config.auto_reconnect || self.connection.is_shut_down() {
            return;
        }
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = inner.reconnect_and_refresh().await;
            debug!(?outcome, "reconnect finished");
        });
    }
}

async fn run_events<T: HubTransport, H: HttpClient>(
    inner: Weak<ClientInner<T, H>>,
    mut rx: mpsc::UnboundedReceiver<ClientEvent>,
) {
    while let Some(event) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match event {
            ClientEvent::Changes(envelope) => inner.handle_envelope(&envelope),
            ClientEvent::Closed(reason) => {
                inner.connection.handle_closed(reason.as_deref());
                inner.spawn_reconnect();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconnectConfig;
    use crate::http::MockHttpClient;
    use crate::transport::MockTransport;
    use hubsync_protocol::{EntityChange, UrlChangeSet};
    use serde_json::json;
    use std::time::Duration;

    fn client() -> (
        SyncClient<MockTransport, MockHttpClient>,
        Arc<MockTransport>,
        Arc<MockHttpClient>,
    ) {
        let transport = Arc::new(MockTransport::with_session_prefix("s"));
        let http = Arc::new(MockHttpClient::new());
        let config = ClientConfig::new("https://hub")
            .with_reconnect(ReconnectConfig::no_jitter(Duration::from_millis(100)));
        let client = SyncClient::new(Arc::clone(&transport), Arc::clone(&http), config);
        (client, transport, http)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn registers_handlers_on_construction() {
        let (_client, transport, _http) = client();
        assert!(transport.has_handler(CHANGES_MESSAGE));
    }

    #[tokio::test]
    async fn envelope_flows_into_cache() {
        let (client, transport, http) = client();
        http.set_json("https://hub/orders", &json!([]));
        client.sync_with("orders").await.unwrap();

        transport.deliver_envelope(&ChangeEnvelope::new(vec![UrlChangeSet::new("orders")
            .with_change(EntityChange::added(json!({"id": 1})))]));
        settle().await;

        assert_eq!(*client.cached("orders").unwrap(), vec![json!({"id": 1})]);
        let stats = client.stats();
        assert_eq!(stats.envelopes_received, 1);
        assert_eq!(stats.records_added, 1);
        assert_eq!(stats.snapshots_fetched, 1);
    }

    #[tokio::test]
    async fn undecodable_envelope_is_dropped() {
        let (client, transport, _http) = client();
        transport.deliver(CHANGES_MESSAGE, &[json!("not an envelope")]);
        settle().await;
        assert_eq!(client.stats().envelopes_received, 0);
    }

    #[tokio::test]
    async fn unsubscribe_failure_keeps_cache() {
        let (client, transport, http) = client();
        http.set_json("https://hub/orders", &json!([{"id": 1}]));
        client.sync_with("orders").await.unwrap();

        transport.set_invoke_error(Some(SyncError::transport("broken pipe")));
        assert!(client.unsubscribe("orders").await.is_err());
        assert!(client.cached("orders").is_some());

        transport.set_invoke_error(None);
        client.unsubscribe("orders").await.unwrap();
        assert!(client.cached("orders").is_none());
        assert_eq!(
            transport.invocations(),
            vec![(UNSUBSCRIBE_ACTION.to_string(), vec![json!("orders")])]
        );
    }

    #[tokio::test]
    async fn shutdown_refuses_connect() {
        let (client, _transport, _http) = client();
        client.shutdown();
        assert_eq!(client.connect().await, Err(SyncError::Shutdown));
    }
}
