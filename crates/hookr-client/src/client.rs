//! Relay client: connection lifecycle and event dispatch.
//!
//! [`RelayClient::connect`] performs the authenticated handshake and then
//! hands the socket to a reader task. The reader consumes frames one at a
//! time and runs every observer for a frame before reading the next one, so
//! a slow observer delays later frames instead of reordering them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hookr_core::{decode_frame, Envelope, HookEvent};

use crate::config::ClientConfig;
use crate::error::RelayError;
use crate::registry::{CallbackId, CallbackRegistry};
use crate::transport::{self, WsStream};

/// Reply to an application-level `ping` envelope.
const PONG_FRAME: &str = r#"{"type":"pong"}"#;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Passed to `on_connected` observers each time a session is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// 1 for the first session, incremented on every reconnect.
    pub generation: u64,
    pub reconnected: bool,
}

/// How a reader loop iteration ended.
enum SessionEnd {
    /// `close()` was requested.
    Closed,
    /// Unrecoverable; no reconnect.
    Fatal(RelayError),
    /// Unexpected drop; reconnect if the policy allows.
    Dropped(RelayError),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    config: ClientConfig,
    registry: Mutex<CallbackRegistry>,
    state: watch::Sender<ConnectionState>,
    /// Number of reader tasks still running.
    running: watch::Sender<usize>,
    generation: AtomicU64,
    /// Bumped on every `connect()`; a reader only tears down its own session.
    session: AtomicU64,
    cancel: Mutex<Option<CancellationToken>>,
}

impl Inner {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Compare-and-set on the lifecycle state.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let moved = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            debug!(?from, ?to, "Relay state transition");
        }
        moved
    }

    /// Force `Disconnected`. Returns whether the state changed.
    fn shut_down(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                false
            } else {
                *state = ConnectionState::Disconnected;
                true
            }
        })
    }

    fn close(&self) {
        let was_live = self.shut_down();
        if let Some(token) = lock(&self.cancel).take() {
            token.cancel();
        }
        if was_live {
            info!(url = %self.config.url, "Relay client closed");
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn dispatch_connected(&self, info: ConnectionInfo) {
        let observers = lock(&self.registry).connected_observers();
        for observer in observers {
            observer(&info);
        }
    }

    fn dispatch_hook(&self, event: &HookEvent) {
        let observers = lock(&self.registry).hook_observers();
        for observer in observers {
            observer(event);
        }
    }

    fn dispatch_error(&self, err: &RelayError) {
        let observers = lock(&self.registry).error_observers();
        if observers.is_empty() {
            warn!(error = %err, "Relay error with no error observers registered");
        }
        for observer in observers {
            observer(err);
        }
    }
}

/// Decrements the running-reader count however the reader exits.
struct ReaderGuard {
    inner: Arc<Inner>,
    session: u64,
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        // A newer connect() may already own the state machine.
        if self.inner.session.load(Ordering::SeqCst) == self.session {
            self.inner.shut_down();
        }
        self.inner.running.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Client for the hookR event stream.
pub struct RelayClient {
    inner: Arc<Inner>,
}

impl RelayClient {
    /// Create a new client (not yet connected).
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry: Mutex::new(CallbackRegistry::new()),
                state: watch::Sender::new(ConnectionState::Disconnected),
                running: watch::Sender::new(0),
                generation: AtomicU64::new(0),
                session: AtomicU64::new(0),
                cancel: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Number of sessions established so far (0 before the first connect).
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Watch lifecycle state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Connect and authenticate.
    ///
    /// Completes once the handshake has finished or failed; the handshake is
    /// bounded by `connect_timeout`. On success the `on_connected` observers
    /// run before this returns and a background reader starts consuming
    /// frames.
    pub async fn connect(&self) -> Result<(), RelayError> {
        let inner = &self.inner;
        if !inner.transition(ConnectionState::Disconnected, ConnectionState::Connecting) {
            return Err(RelayError::AlreadyConnected);
        }
        let session = inner.session.fetch_add(1, Ordering::SeqCst) + 1;

        let token = CancellationToken::new();
        *lock(&inner.cancel) = Some(token.clone());
        info!(url = %inner.config.url, "Connecting to hookR");

        let opened = tokio::select! {
            biased;
            () = token.cancelled() => {
                Err(RelayError::Connection("Connect aborted by close()".into()))
            }
            result = transport::open(&inner.config) => result,
        };

        let ws = match opened {
            Ok(ws) => ws,
            Err(e) => {
                inner.transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                error!(error = %e, url = %inner.config.url, "Connect failed");
                return Err(e);
            }
        };

        if !inner.transition(ConnectionState::Connecting, ConnectionState::Connected) {
            return Err(RelayError::Connection(
                "Relay client closed while connecting".into(),
            ));
        }

        let generation = inner.next_generation();
        info!(url = %inner.config.url, generation, "Connected");
        inner.dispatch_connected(ConnectionInfo {
            generation,
            reconnected: false,
        });

        inner.running.send_modify(|n| *n += 1);
        let guard = ReaderGuard {
            inner: Arc::clone(inner),
            session,
        };
        tokio::spawn(run_reader(guard, ws, token));
        Ok(())
    }

    pub fn on_connected<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&ConnectionInfo) + Send + Sync + 'static,
    {
        lock(&self.inner.registry).add_connected(Arc::new(callback))
    }

    pub fn on_hook_called<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&HookEvent) + Send + Sync + 'static,
    {
        lock(&self.inner.registry).add_hook_called(Arc::new(callback))
    }

    pub fn on_error<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&RelayError) + Send + Sync + 'static,
    {
        lock(&self.inner.registry).add_error(Arc::new(callback))
    }

    /// Remove an observer. Returns `false` if it was already removed.
    pub fn off(&self, id: CallbackId) -> bool {
        lock(&self.inner.registry).remove(id)
    }

    /// Release the connection.
    ///
    /// Idempotent and non-blocking: the state becomes `Disconnected`
    /// immediately and the reader sends a close frame on its way out. Safe
    /// to call from inside an observer.
    pub fn close(&self) {
        self.inner.close();
    }

    /// A handle that can close this client from elsewhere (signal handlers,
    /// observers) without keeping it alive.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Resolves once no reader task is running: after `close()` has flushed
    /// the close frame, or after the session ended on its own.
    pub async fn closed(&self) {
        let mut running = self.inner.running.subscribe();
        let _ = running.wait_for(|n| *n == 0).await;
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayClient")
            .field("url", &self.inner.config.url)
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

/// Weak handle to [`RelayClient::close`].
#[derive(Debug, Clone)]
pub struct CloseHandle {
    inner: Weak<Inner>,
}

impl CloseHandle {
    pub fn close(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.close();
        }
    }
}

/// Reader task: owns the socket until close, fatal error, or exhausted retries.
async fn run_reader(guard: ReaderGuard, mut ws: WsStream, token: CancellationToken) {
    let inner = Arc::clone(&guard.inner);

    loop {
        let end = match pump(&inner, &mut ws, &token).await {
            // close() won a race with a failing write; the session is over.
            _ if token.is_cancelled() => SessionEnd::Closed,
            end => end,
        };
        match end {
            SessionEnd::Closed => {
                send_close(&inner, &mut ws).await;
                return;
            }
            SessionEnd::Fatal(err) => {
                inner.shut_down();
                error!(error = %err, "Relay session ended");
                inner.dispatch_error(&err);
                send_close(&inner, &mut ws).await;
                return;
            }
            SessionEnd::Dropped(err) => match reconnect(&inner, &token, err).await {
                Some(next) => ws = next,
                None => return,
            },
        }
    }
}

enum ReaderEvent {
    Cancelled,
    Frame(Option<Result<Message, WsError>>),
    Keepalive,
}

/// Consume frames until the session ends.
async fn pump(inner: &Inner, ws: &mut WsStream, token: &CancellationToken) -> SessionEnd {
    let mut keepalive = inner.config.keepalive_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        let event = tokio::select! {
            biased;
            () = token.cancelled() => ReaderEvent::Cancelled,
            frame = ws.next() => ReaderEvent::Frame(frame),
            () = tick(&mut keepalive) => ReaderEvent::Keepalive,
        };

        match event {
            ReaderEvent::Cancelled => return SessionEnd::Closed,
            ReaderEvent::Frame(Some(Ok(message))) => {
                if let Some(end) = handle_message(inner, ws, message).await {
                    return end;
                }
            }
            ReaderEvent::Frame(Some(Err(e))) => {
                return SessionEnd::Dropped(RelayError::Transport(e.to_string()));
            }
            ReaderEvent::Frame(None) => {
                return SessionEnd::Dropped(RelayError::Transport("Stream ended by service".into()));
            }
            ReaderEvent::Keepalive => {
                if let Err(e) = ws.send(Message::Ping(Default::default())).await {
                    return SessionEnd::Dropped(RelayError::Transport(format!(
                        "Keepalive ping failed: {e}"
                    )));
                }
            }
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn handle_message(inner: &Inner, ws: &mut WsStream, message: Message) -> Option<SessionEnd> {
    match message {
        Message::Text(text) => handle_text(inner, ws, text.as_str()).await,
        Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
            Ok(text) => handle_text(inner, ws, text).await,
            Err(_) => {
                inner.dispatch_error(&RelayError::Protocol("Binary frame is not UTF-8".into()));
                None
            }
        },
        Message::Close(frame) => Some(match frame {
            Some(frame) if transport::is_auth_close(frame.code) => {
                SessionEnd::Fatal(RelayError::Authentication(format!(
                    "Service closed the session: {}",
                    frame.reason.as_str()
                )))
            }
            Some(frame) => SessionEnd::Dropped(RelayError::Transport(format!(
                "Closed by service ({}): {}",
                u16::from(frame.code),
                frame.reason.as_str()
            ))),
            None => SessionEnd::Dropped(RelayError::Transport("Closed by service".into())),
        }),
        // tungstenite answers pings itself
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}

async fn handle_text(inner: &Inner, ws: &mut WsStream, text: &str) -> Option<SessionEnd> {
    match decode_frame(text) {
        Ok(Envelope::HookCalled(event)) => {
            debug!(event_id = %event.event_id, hook_id = %event.hook_id, "Hook called");
            inner.dispatch_hook(&event);
        }
        Ok(Envelope::Connected) => debug!("Service acknowledged session"),
        Ok(Envelope::Error(server)) if server.is_auth_rejection() => {
            return Some(SessionEnd::Fatal(RelayError::Authentication(server.message)));
        }
        Ok(Envelope::Error(server)) => {
            warn!(code = %server.code, message = %server.message, "Service reported an error");
            inner.dispatch_error(&RelayError::Server {
                code: server.code,
                message: server.message,
            });
        }
        Ok(Envelope::Ping) => {
            if let Err(e) = ws.send(Message::text(PONG_FRAME)).await {
                return Some(SessionEnd::Dropped(RelayError::Transport(format!(
                    "Failed to answer ping: {e}"
                ))));
            }
        }
        // Unknown categories are logged by the decoder.
        Ok(Envelope::Pong | Envelope::Unknown { .. }) => {}
        Err(e) => {
            let err = RelayError::from(e);
            warn!(error = %err, "Dropping malformed frame");
            inner.dispatch_error(&err);
        }
    }
    None
}

/// Handle an unexpected drop. Returns the new socket, or `None` when the
/// reader should stop.
async fn reconnect(
    inner: &Inner,
    token: &CancellationToken,
    cause: RelayError,
) -> Option<WsStream> {
    if token.is_cancelled() {
        return None;
    }
    let Some(policy) = inner.config.reconnect.clone() else {
        inner.shut_down();
        error!(error = %cause, "Connection lost and reconnect is disabled");
        inner.dispatch_error(&cause);
        return None;
    };

    // Only one reconnect may be in flight; `Reconnecting` is the guard.
    if !inner.transition(ConnectionState::Connected, ConnectionState::Reconnecting) {
        return None;
    }
    warn!(error = %cause, "Connection lost, reconnecting");
    inner.dispatch_error(&cause);

    let mut attempt: u32 = 0;
    loop {
        if !policy.should_retry(attempt) {
            inner.shut_down();
            let err = RelayError::Transport(format!("Gave up after {attempt} reconnect attempts"));
            error!(error = %err, "Max reconnect attempts reached");
            inner.dispatch_error(&err);
            return None;
        }

        let delay = policy.delay_for_attempt(attempt);
        debug!(attempt, delay_ms = delay.as_millis(), "Waiting before reconnect");
        tokio::select! {
            biased;
            () = token.cancelled() => return None,
            () = tokio::time::sleep(delay) => {}
        }

        if !inner.transition(ConnectionState::Reconnecting, ConnectionState::Connecting) {
            return None;
        }

        let opened = tokio::select! {
            biased;
            () = token.cancelled() => return None,
            result = transport::open(&inner.config) => result,
        };

        match opened {
            Ok(ws) => {
                if !inner.transition(ConnectionState::Connecting, ConnectionState::Connected) {
                    return None;
                }
                let generation = inner.next_generation();
                info!(generation, attempt, "Reconnected");
                inner.dispatch_connected(ConnectionInfo {
                    generation,
                    reconnected: true,
                });
                return Some(ws);
            }
            Err(err @ RelayError::Authentication(_)) => {
                inner.shut_down();
                error!(error = %err, "Credential rejected while reconnecting");
                inner.dispatch_error(&err);
                return None;
            }
            Err(err) => {
                warn!(error = %err, attempt, "Reconnect attempt failed");
                inner.dispatch_error(&err);
                if !inner.transition(ConnectionState::Connecting, ConnectionState::Reconnecting) {
                    return None;
                }
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

async fn send_close(inner: &Inner, ws: &mut WsStream) {
    match tokio::time::timeout(inner.config.close_timeout, ws.close(None)).await {
        Ok(Ok(())) => debug!("Close frame sent"),
        Ok(Err(e)) => debug!(error = %e, "Close frame not delivered"),
        Err(_) => debug!("Timed out sending close frame"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn test_client() -> RelayClient {
        RelayClient::new(ClientConfig::new("ws://127.0.0.1:1/events", "key"))
    }

    #[test]
    fn new_client_is_disconnected() {
        let client = test_client();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.is_connected());
        assert_eq!(client.generation(), 0);
    }

    #[test]
    fn close_is_idempotent() {
        let client = test_client();
        let rx = client.subscribe_state();
        client.close();
        client.close();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn close_from_connected_transitions_once() {
        let client = test_client();
        assert!(client
            .inner
            .transition(ConnectionState::Disconnected, ConnectionState::Connected));
        let mut rx = client.subscribe_state();
        client.close();
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();
        client.close();
        assert!(!rx.has_changed().unwrap());
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn transition_is_compare_and_set() {
        let client = test_client();
        assert!(!client
            .inner
            .transition(ConnectionState::Connected, ConnectionState::Reconnecting));
        assert!(client
            .inner
            .transition(ConnectionState::Disconnected, ConnectionState::Connecting));
        assert_eq!(client.state(), ConnectionState::Connecting);
    }

    #[test]
    fn stale_reader_guard_leaves_newer_session_alone() {
        let client = test_client();
        let inner = &client.inner;
        inner.running.send_modify(|n| *n += 2);
        let stale = ReaderGuard {
            inner: Arc::clone(inner),
            session: 1,
        };
        let current = ReaderGuard {
            inner: Arc::clone(inner),
            session: 2,
        };
        inner.session.store(2, Ordering::SeqCst);
        assert!(inner.transition(ConnectionState::Disconnected, ConnectionState::Connected));

        drop(stale);
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(*inner.running.borrow(), 1);

        drop(current);
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(*inner.running.borrow(), 0);
    }

    #[test]
    fn observers_fire_in_registration_order() {
        let client = test_client();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            client.on_hook_called(move |_| order.lock().unwrap().push(tag));
        }
        client.inner.dispatch_hook(&HookEvent::new("e1", "h1"));
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn off_removes_single_observer() {
        let client = test_client();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = Arc::clone(&count);
        let first = client.on_error(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = Arc::clone(&count);
        client.on_error(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        assert!(client.off(first));
        assert!(!client.off(first));
        client.inner.dispatch_error(&RelayError::Protocol("x".into()));
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn observer_can_close_during_dispatch() {
        let client = test_client();
        client
            .inner
            .transition(ConnectionState::Disconnected, ConnectionState::Connected);
        let handle = client.close_handle();
        client.on_hook_called(move |_| handle.close());
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        client.on_hook_called(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        client.inner.dispatch_hook(&HookEvent::new("e1", "h1"));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        // The snapshot taken before dispatch still reaches later observers.
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn observer_can_register_during_dispatch() {
        let client = Arc::new(test_client());
        let weak = Arc::downgrade(&client);
        client.on_connected(move |_| {
            if let Some(c) = weak.upgrade() {
                c.on_connected(|_| {});
            }
        });
        client.inner.dispatch_connected(ConnectionInfo {
            generation: 1,
            reconnected: false,
        });
        assert_eq!(
            lock(&client.inner.registry).len(crate::registry::Category::Connected),
            2
        );
    }

    #[test]
    fn close_handle_outliving_client_is_noop() {
        let handle = test_client().close_handle();
        handle.close();
    }

    #[tokio::test]
    async fn closed_resolves_without_session() {
        let client = test_client();
        tokio::time::timeout(Duration::from_secs(1), client.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_connect_returns_to_disconnected() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RelayClient::new(ClientConfig::new(format!("ws://{addr}/events"), "key"));
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, RelayError::Connection(_)), "{err:?}");
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.generation(), 0);
    }
}
