//! Full-collection snapshot fetches.

use crate::callbacks::DeliveryMode;
use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::HttpClient;
use crate::state::ConnectionManager;
use crate::store::SubscriptionStore;
use crate::transport::HubTransport;
use hubsync_protocol::{Collection, SESSION_HEADER};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Loads whole collections over HTTP and caches them.
pub struct SnapshotFetcher<T: HubTransport, H: HttpClient> {
    connection: Arc<ConnectionManager<T>>,
    http: Arc<H>,
    store: Arc<SubscriptionStore>,
    config: ClientConfig,
    mode: DeliveryMode,
    fetched: AtomicU64,
}

impl<T: HubTransport, H: HttpClient> SnapshotFetcher<T, H> {
    /// Creates a fetcher that caches into `store`.
    pub fn new(
        connection: Arc<ConnectionManager<T>>,
        http: Arc<H>,
        store: Arc<SubscriptionStore>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            connection,
            http,
            store,
            mode: DeliveryMode::from_deep_copy(config.deep_copy_on_delivery),
            config: config.clone(),
            fetched: AtomicU64::new(0),
        }
    }

    /// Returns the number of successful fetches.
    pub fn fetched_count(&self) -> u64 {
        self.fetched.load(Ordering::Relaxed)
    }

    /// Returns the cached collection for `feed`, fetching it if absent.
    ///
    /// This is the only call that creates a subscription.
    pub async fn sync_with(&self, feed: &str) -> SyncResult<Arc<Collection>> {
        if let Some(cached) = self.store.get(feed) {
            return Ok(self.mode.deliver(&cached));
        }
        self.fetch_full(feed).await
    }

    /// Fetches the whole collection for `feed` and replaces the cache entry.
    ///
    /// Waits for the connection first. On a non-success status the cache is
    /// left as it was.
    pub async fn fetch_full(&self, feed: &str) -> SyncResult<Arc<Collection>> {
        self.connection.connect().await?;
        let session_id = self.connection.session_id().ok_or(SyncError::NotConnected)?;

        let url = self.config.snapshot_url(feed);
        let headers = vec![(SESSION_HEADER.to_string(), session_id)];
        let response = self.http.get(&url, &headers).await?;

        if !response.is_success() {
            return Err(SyncError::Http {
                status: response.status,
                reason: response.reason,
            });
        }

        let collection: Collection = serde_json::from_slice(&response.body)?;
        if self.config.debug {
            debug!(feed = %feed, url = %url, records = ?collection, "snapshot fetched");
        } else {
            debug!(feed = %feed, records = collection.len(), "snapshot fetched");
        }

        let cached = self.store.set(feed, collection);
        self.fetched.fetch_add(1, Ordering::Relaxed);
        Ok(self.mode.deliver(&cached))
    }
}
