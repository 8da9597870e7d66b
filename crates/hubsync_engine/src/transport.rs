//! Transport layer abstraction for the hub connection.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use hubsync_protocol::{ChangeEnvelope, CHANGES_MESSAGE, SESSION_ID_MESSAGE};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Handler for a named inbound message. Receives the message arguments.
pub type MessageHandler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Handler for connection loss. Receives the close reason, if any.
pub type ClosedHandler = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// A persistent hub connection.
///
/// This trait abstracts the wire transport (WebSocket, long polling, an
/// in-process loopback for tests). Implementations must deliver inbound
/// messages in order and fire the closed handlers once per connection loss.
#[async_trait]
pub trait HubTransport: Send + Sync + 'static {
    /// Starts (or restarts) the connection.
    async fn start(&self) -> SyncResult<()>;

    /// Registers the handler for a named inbound message.
    ///
    /// Replaces any handler already registered for `message`.
    fn on(&self, message: &str, handler: MessageHandler);

    /// Removes the handler for a named inbound message, if any.
    fn remove_handler(&self, message: &str);

    /// Invokes a named server-side action.
    async fn invoke(&self, action: &str, args: Vec<Value>) -> SyncResult<Value>;

    /// Registers a handler fired when the connection is lost.
    fn on_closed(&self, handler: ClosedHandler);
}

/// A mock transport for testing.
///
/// Start results can be scripted; by default every start succeeds. When a
/// session prefix is set, each successful start immediately delivers a
/// session id of the form `{prefix}-{n}`.
#[derive(Default)]
pub struct MockTransport {
    handlers: Mutex<HashMap<String, MessageHandler>>,
    closed_handlers: Mutex<Vec<ClosedHandler>>,
    start_results: Mutex<VecDeque<SyncResult<()>>>,
    start_delay: Mutex<Duration>,
    session_prefix: Mutex<Option<String>>,
    invoke_error: Mutex<Option<SyncError>>,
    invocations: Mutex<Vec<(String, Vec<Value>)>>,
    starts: AtomicUsize,
    started: AtomicBool,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock that assigns session ids automatically on start.
    pub fn with_session_prefix(prefix: impl Into<String>) -> Self {
        let transport = Self::new();
        transport.set_session_prefix(Some(prefix.into()));
        transport
    }

    /// Sets or clears the automatic session id prefix.
    pub fn set_session_prefix(&self, prefix: Option<String>) {
        *self.session_prefix.lock() = prefix;
    }

    /// Queues the result of a future `start` call.
    pub fn push_start_result(&self, result: SyncResult<()>) {
        self.start_results.lock().push_back(result);
    }

    /// Makes every `start` call wait before completing.
    pub fn set_start_delay(&self, delay: Duration) {
        *self.start_delay.lock() = delay;
    }

    /// Makes every `invoke` call fail with the given error.
    pub fn set_invoke_error(&self, error: Option<SyncError>) {
        *self.invoke_error.lock() = error;
    }

    /// Returns how many times `start` was called.
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Returns true if the last start succeeded and no close followed.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Returns true if a handler is registered for `message`.
    pub fn has_handler(&self, message: &str) -> bool {
        self.handlers.lock().contains_key(message)
    }

    /// Returns all recorded invocations.
    pub fn invocations(&self) -> Vec<(String, Vec<Value>)> {
        self.invocations.lock().clone()
    }

    /// Delivers an inbound message. Returns false if nothing handled it.
    pub fn deliver(&self, message: &str, args: &[Value]) -> bool {
        let handler = self.handlers.lock().get(message).cloned();
        match handler {
            Some(handler) => {
                handler(args);
                true
            }
            None => false,
        }
    }

    /// Delivers a session id message.
    pub fn deliver_session_id(&self, session_id: &str) -> bool {
        self.deliver(SESSION_ID_MESSAGE, &[Value::String(session_id.to_string())])
    }

    /// Delivers a change envelope.
    pub fn deliver_envelope(&self, envelope: &ChangeEnvelope) -> bool {
        let payload = serde_json::to_value(envelope).unwrap_or_default();
        self.deliver(CHANGES_MESSAGE, &[payload])
    }

    /// Simulates connection loss.
    pub fn close(&self, reason: Option<&str>) {
        self.started.store(false, Ordering::SeqCst);
        let handlers = self.closed_handlers.lock().clone();
        for handler in handlers {
            handler(reason.map(str::to_string));
        }
    }
}

#[async_trait]
impl HubTransport for MockTransport {
    async fn start(&self) -> SyncResult<()> {
        let attempt = self.starts.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = *self.start_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = self.start_results.lock().pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.started.store(true, Ordering::SeqCst);
            let prefix = self.session_prefix.lock().clone();
            if let Some(prefix) = prefix {
                self.deliver_session_id(&format!("{prefix}-{attempt}"));
            }
        }
        result
    }

    fn on(&self, message: &str, handler: MessageHandler) {
        self.handlers.lock().insert(message.to_string(), handler);
    }

    fn remove_handler(&self, message: &str) {
        self.handlers.lock().remove(message);
    }

    async fn invoke(&self, action: &str, args: Vec<Value>) -> SyncResult<Value> {
        if !self.is_started() {
            return Err(SyncError::NotConnected);
        }
        let injected = self.invoke_error.lock().clone();
        if let Some(err) = injected {
            return Err(err);
        }
        self.invocations.lock().push((action.to_string(), args));
        Ok(Value::Null)
    }

    fn on_closed(&self, handler: ClosedHandler) {
        self.closed_handlers.lock().push(handler);
    }
}
