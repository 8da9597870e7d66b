//! Connection state machine.

use crate::config::{ClientConfig, ReconnectConfig};
use crate::error::{SyncError, SyncResult};
use crate::transport::HubTransport;
use hubsync_protocol::{HubMessage, SESSION_ID_MESSAGE};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, oneshot, Notify};
use tracing::{debug, info, warn};

const STATE_CHANNEL_CAPACITY: usize = 64;

/// The current state of the hub connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection.
    Disconnected,
    /// The transport is starting.
    Connecting,
    /// The transport is up; waiting for the server to assign a session id.
    WaitingForSessionId,
    /// Connected with a session id.
    Connected,
}

impl ConnectionState {
    /// Returns true while a connection attempt is in flight.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::WaitingForSessionId
        )
    }

    /// Returns true if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::WaitingForSessionId => "waiting-for-session-id",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Statistics about a sync client.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Change envelopes received.
    pub envelopes_received: u64,
    /// Change sets that found a cached collection.
    pub change_sets_applied: u64,
    /// Records appended by reconciliation.
    pub records_added: u64,
    /// Records replaced by reconciliation.
    pub records_replaced: u64,
    /// Records removed by reconciliation.
    pub records_removed: u64,
    /// Feed callback invocations.
    pub callbacks_invoked: u64,
    /// Successful snapshot fetches.
    pub snapshots_fetched: u64,
    /// Connection attempts made by the reconnect loop.
    pub reconnect_attempts: u64,
    /// Last time an envelope was applied.
    pub last_sync_time: Option<Instant>,
    /// Last connection error message.
    pub last_error: Option<String>,
}

/// Result of a reconnect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// Auto-reconnect is disabled; nothing was done.
    Disabled,
    /// Another reconnect loop is already running.
    AlreadyRunning,
    /// Connected again after the given number of attempts.
    Reconnected {
        /// Attempts made, including the successful one.
        attempts: u32,
    },
    /// The manager was shut down before a connection was made.
    Stopped,
}

/// Drives the connection lifecycle.
///
/// At most one connection attempt runs at a time. Callers of
/// [`connect`](Self::connect) that arrive while an attempt is in flight wait
/// for it and receive its outcome instead of starting their own.
pub struct ConnectionManager<T: HubTransport> {
    transport: Arc<T>,
    handshake_timeout: Duration,
    reconnect: ReconnectConfig,
    auto_reconnect: bool,
    state: RwLock<ConnectionState>,
    state_tx: broadcast::Sender<ConnectionState>,
    session_id: RwLock<Option<String>>,
    /// Serializes connection attempts.
    gate: tokio::sync::Mutex<()>,
    /// Number of finished attempts; lets waiters detect that one completed.
    completed_attempts: AtomicU64,
    last_outcome: RwLock<Option<SyncResult<()>>>,
    reconnecting: AtomicBool,
    reconnect_attempts: AtomicU64,
    last_error: RwLock<Option<String>>,
    shutdown: AtomicBool,
    shutdown_notify: Notify,
}

impl<T: HubTransport> ConnectionManager<T> {
    /// Creates a new manager in the `Disconnected` state.
    pub fn new(transport: Arc<T>, config: &ClientConfig) -> Self {
        let (state_tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            transport,
            handshake_timeout: config.handshake_timeout,
            reconnect: config.reconnect.clone(),
            auto_reconnect: config.auto_reconnect,
            state: RwLock::new(ConnectionState::Disconnected),
            state_tx,
            session_id: RwLock::new(None),
            gate: tokio::sync::Mutex::new(()),
            completed_attempts: AtomicU64::new(0),
            last_outcome: RwLock::new(None),
            reconnecting: AtomicBool::new(false),
            reconnect_attempts: AtomicU64::new(0),
            last_error: RwLock::new(None),
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Subscribes to state transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Gets the session id of the current connection.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    /// Gets the transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Returns true while a reconnect loop is running.
    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::SeqCst)
    }

    /// Returns the number of attempts made by reconnect loops.
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Returns the last connection error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Stops reconnecting and refuses further connection attempts.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();
    }

    /// Sets the state, notifying subscribers on change.
    fn set_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state changed");
            // No receivers is fine.
            let _ = self.state_tx.send(state);
        }
    }

    /// Ensures the connection is established.
    ///
    /// Returns immediately when connected. Otherwise joins the in-flight
    /// attempt, or starts one.
    pub async fn connect(&self) -> SyncResult<()> {
        if self.is_shut_down() {
            return Err(SyncError::Shutdown);
        }
        if self.state().is_connected() {
            return Ok(());
        }

        let observed = self.completed_attempts.load(Ordering::SeqCst);
        let _gate = self.gate.lock().await;

        if self.completed_attempts.load(Ordering::SeqCst) != observed {
            let shared = self.last_outcome.read().clone();
            // A success is stale if the connection dropped since.
            if let Some(outcome) = shared {
                if outcome.is_err() || self.state().is_connected() {
                    return outcome;
                }
            }
        }
        if self.state().is_connected() {
            return Ok(());
        }

        let outcome = self.attempt().await;
        *self.last_outcome.write() = Some(outcome.clone());
        self.completed_attempts.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    /// Runs one connection attempt. Callers must hold the gate.
    async fn attempt(&self) -> SyncResult<()> {
        self.set_state(ConnectionState::Connecting);

        // One-shot session handler, armed before the transport starts so an
        // early session id is not lost.
        let (session_tx, session_rx) = oneshot::channel::<Vec<Value>>();
        let slot = Mutex::new(Some(session_tx));
        self.transport.on(
            SESSION_ID_MESSAGE,
            Arc::new(move |args: &[Value]| {
                if let Some(tx) = slot.lock().take() {
                    let _ = tx.send(args.to_vec());
                }
            }),
        );

        if let Err(err) = self.transport.start().await {
            self.transport.remove_handler(SESSION_ID_MESSAGE);
            warn!(error = %err, "transport failed to start");
            self.fail(&err);
            return Err(err);
        }

        self.set_state(ConnectionState::WaitingForSessionId);
        let waited = tokio::time::timeout(self.handshake_timeout, session_rx).await;
        self.transport.remove_handler(SESSION_ID_MESSAGE);

        let result = match waited {
            Ok(Ok(args)) => match HubMessage::decode(SESSION_ID_MESSAGE, &args) {
                Ok(HubMessage::SessionAssigned(id)) => Ok(id),
                Ok(other) => Err(SyncError::Protocol(format!(
                    "unexpected handshake reply: {other:?}"
                ))),
                Err(err) => Err(err.into()),
            },
            Ok(Err(_)) => Err(SyncError::HandshakeAborted),
            // The transport stays open; the server may still be reachable.
            Err(_) => Err(SyncError::HandshakeTimeout(self.handshake_timeout)),
        };

        match result {
            Ok(session_id) => {
                info!(session_id = %session_id, "connected");
                *self.session_id.write() = Some(session_id);
                *self.last_error.write() = None;
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "handshake failed");
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn fail(&self, err: &SyncError) {
        *self.last_error.write() = Some(err.to_string());
        self.session_id.write().take();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Records transport closure.
    ///
    /// Clears the session id and aborts a pending handshake.
    pub fn handle_closed(&self, reason: Option<&str>) {
        info!(reason = reason.unwrap_or("none"), "transport closed");
        self.session_id.write().take();
        self.transport.remove_handler(SESSION_ID_MESSAGE);
        self.set_state(ConnectionState::Disconnected);
    }

    /// Reconnects until a connection is made or the manager shuts down.
    ///
    /// Waits `base_delay + uniform(0, variance)` between failed attempts.
    /// There is no attempt limit. Only one loop runs at a time.
    pub async fn reconnect(&self) -> ReconnectOutcome {
        if !self.auto_reconnect {
            return ReconnectOutcome::Disabled;
        }
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return ReconnectOutcome::AlreadyRunning;
        }
        let _running = ReconnectGuard(&self.reconnecting);

        let mut attempts = 0u32;
        loop {
            if self.is_shut_down() {
                return ReconnectOutcome::Stopped;
            }
            attempts += 1;
            self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);

            match self.connect().await {
                Ok(()) => {
                    info!(attempts, "reconnected");
                    return ReconnectOutcome::Reconnected { attempts };
                }
                Err(SyncError::Shutdown) => return ReconnectOutcome::Stopped,
                Err(err) => {
                    let delay = self.reconnect.delay();
                    warn!(
                        error = %err,
                        attempt = attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "reconnect attempt failed"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown_notify.notified() => return ReconnectOutcome::Stopped,
                    }
                }
            }
        }
    }
}

/// Clears the reconnecting flag when the loop exits or is dropped.
struct ReconnectGuard<'a>(&'a AtomicBool);

impl Drop for ReconnectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
