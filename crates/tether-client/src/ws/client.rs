use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{Mutex, Notify, RwLock, mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use tether_shared::ws_protocol::{CLOSE_NORMAL, ClientMessage, ClientMessageKind, ServerEvent};

use super::outbox::SocketOutbox;
use crate::error::SessionError;
use crate::normalize;

const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the session-scoped WebSocket client.
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    /// Backend base URL (http/https, rewritten to ws/wss for the handshake).
    pub url: String,
    pub auth_token: String,
    pub session_id: String,
    /// Consecutive failed attempts before giving up.
    pub max_reconnect_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
    /// How long to wait for the server's explicit ready acknowledgment
    /// before optimistically assuming readiness. Some backends never send
    /// the acknowledgment; without this the client would deadlock waiting.
    pub ready_grace: Duration,
    /// Bound on how long a caller blocks waiting for a queued send.
    pub send_timeout: Duration,
}

impl WsClientConfig {
    pub fn new(
        url: impl Into<String>,
        auth_token: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            auth_token: auth_token.into(),
            session_id: session_id.into(),
            max_reconnect_attempts: 10,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            ready_grace: Duration::from_millis(200),
            send_timeout: Duration::from_secs(5),
        }
    }
}

/// Connection state, reported monotonically per transition via callback.
/// `Connected` does not imply the server accepts session traffic yet;
/// readiness is tracked separately (see [`WsClient::is_ready`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Reconnection progress surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectStatus {
    Idle,
    Reconnecting { attempt: usize },
    Failed,
    MaxAttemptsReached,
}

/// Reconnect delay: `min(base * 2^attempt, cap)`.
pub(crate) fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt)).min(cap)
}

pub(crate) fn handshake_url(base: &str, token: &str, session_id: &str) -> String {
    format!(
        "{}/ws/chat?token={}&cid={}",
        base.replace("http://", "ws://").replace("https://", "wss://"),
        urlencoding::encode(token),
        urlencoding::encode(session_id),
    )
}

/// Monotonic epoch millis for lock-free last-activity tracking.
fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

type FrameHandler = Box<dyn Fn(ServerEvent) + Send + Sync>;
type StateHandler = Box<dyn Fn(ConnectionState) + Send + Sync>;
type ReconnectHandler = Box<dyn Fn(ReconnectStatus) + Send + Sync>;
type ErrorHandler = Box<dyn Fn(SessionError) + Send + Sync>;
type ConnectionCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Handlers {
    on_frame: Mutex<Option<FrameHandler>>,
    on_state: Mutex<Option<StateHandler>>,
    on_reconnect: Mutex<Option<ReconnectHandler>>,
    on_error: Mutex<Option<ErrorHandler>>,
    on_connect: Mutex<Option<ConnectionCallback>>,
}

struct Inner {
    config: WsClientConfig,
    /// Bound session id; swappable in place via `rebind`.
    session_id: RwLock<String>,
    state: RwLock<ConnectionState>,
    /// Transport open AND server acknowledged (explicitly or optimistically).
    server_ready: AtomicBool,
    /// Channel to the write task of the live connection, if any.
    tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    outbox: Mutex<SocketOutbox>,
    /// Set once a terminal error ends the session; sends fail fast after.
    terminal: Mutex<Option<SessionError>>,
    ready_notify: Notify,
    shutdown: Notify,
    shutdown_flag: AtomicBool,
    loop_running: AtomicBool,
    last_activity: AtomicU64,
    handlers: Handlers,
}

pub struct WsClient {
    inner: Arc<Inner>,
}

impl WsClient {
    pub fn new(config: WsClientConfig) -> Self {
        let session_id = config.session_id.clone();
        Self {
            inner: Arc::new(Inner {
                config,
                session_id: RwLock::new(session_id),
                state: RwLock::new(ConnectionState::Disconnected),
                server_ready: AtomicBool::new(false),
                tx: Mutex::new(None),
                outbox: Mutex::new(SocketOutbox::new()),
                terminal: Mutex::new(None),
                ready_notify: Notify::new(),
                shutdown: Notify::new(),
                shutdown_flag: AtomicBool::new(false),
                loop_running: AtomicBool::new(false),
                last_activity: AtomicU64::new(0),
                handlers: Handlers::default(),
            }),
        }
    }

    pub fn config(&self) -> &WsClientConfig {
        &self.inner.config
    }

    pub async fn session_id(&self) -> String {
        self.inner.session_id.read().await.clone()
    }

    /// Register the inbound frame handler. Frames are delivered
    /// synchronously from the read task, in receipt order.
    pub async fn set_on_frame(&self, handler: impl Fn(ServerEvent) + Send + Sync + 'static) {
        *self.inner.handlers.on_frame.lock().await = Some(Box::new(handler));
    }

    pub async fn set_on_state(&self, handler: impl Fn(ConnectionState) + Send + Sync + 'static) {
        *self.inner.handlers.on_state.lock().await = Some(Box::new(handler));
    }

    pub async fn set_on_reconnect(
        &self,
        handler: impl Fn(ReconnectStatus) + Send + Sync + 'static,
    ) {
        *self.inner.handlers.on_reconnect.lock().await = Some(Box::new(handler));
    }

    pub async fn set_on_error(&self, handler: impl Fn(SessionError) + Send + Sync + 'static) {
        *self.inner.handlers.on_error.lock().await = Some(Box::new(handler));
    }

    /// Invoked every time the connection becomes server-ready.
    pub async fn set_on_connect(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self.inner.handlers.on_connect.lock().await = Some(Box::new(handler));
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.inner.state.read().await
    }

    pub fn is_ready(&self) -> bool {
        self.inner.server_ready.load(Ordering::SeqCst)
    }

    /// Wait until server-ready (or timeout).
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        if self.is_ready() {
            return true;
        }
        time::timeout(timeout, self.inner.ready_notify.notified())
            .await
            .is_ok()
    }

    /// Queue or send one client message. The returned receiver resolves
    /// once the message reaches the transport, or with the error that
    /// made delivery impossible.
    pub async fn send(&self, msg: &ClientMessage) -> oneshot::Receiver<Result<(), SessionError>> {
        let (ack, rx) = oneshot::channel();

        let json = match serde_json::to_string(msg) {
            Ok(j) => j,
            Err(e) => {
                let _ = ack.send(Err(SessionError::Transport(format!("serialize: {e}"))));
                return rx;
            }
        };

        if self.inner.shutdown_flag.load(Ordering::Relaxed) {
            let _ = ack.send(Err(SessionError::Closed));
            return rx;
        }
        if let Some(err) = self.inner.terminal.lock().await.clone() {
            let _ = ack.send(Err(err));
            return rx;
        }

        // Hold the tx lock across the ready check and the enqueue. The
        // ready flush drains the outbox under the same lock, so a send
        // cannot land in an already-flushed queue.
        let tx_guard = self.inner.tx.lock().await;
        if self.inner.server_ready.load(Ordering::SeqCst)
            && let Some(tx) = tx_guard.as_ref()
        {
            let result = tx
                .send(Message::Text(json.into()))
                .map_err(|_| SessionError::Transport("writer closed".into()));
            let _ = ack.send(result);
        } else {
            self.inner.outbox.lock().await.enqueue(json, ack);
        }
        rx
    }

    /// Start the connection loop with auto-reconnection, heartbeat, and
    /// connect timeout. Clears any previous terminal error. Idempotent
    /// while a loop is already running.
    pub async fn connect(&self) {
        *self.inner.terminal.lock().await = None;
        self.inner.shutdown_flag.store(false, Ordering::Relaxed);
        self.spawn_loop_if_idle();
    }

    /// Kick the connection loop if it is not running and the session has
    /// not failed terminally. Used for on-demand reconnect-then-send.
    pub async fn ensure_connected(&self) {
        if self.inner.shutdown_flag.load(Ordering::Relaxed)
            || self.inner.terminal.lock().await.is_some()
        {
            return;
        }
        self.spawn_loop_if_idle();
    }

    fn spawn_loop_if_idle(&self) {
        if self.inner.loop_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = self.inner.clone();
        tokio::spawn(async move {
            run_loop(&inner).await;
            inner.loop_running.store(false, Ordering::SeqCst);
        });
    }

    /// Rebind the client to a different session id. If the connection is
    /// server-ready the socket is kept and a bind intent announces the
    /// new id; otherwise the id is simply adopted by the next connect.
    pub async fn rebind(&self, session_id: impl Into<String>) {
        let sid = session_id.into();
        *self.inner.session_id.write().await = sid.clone();

        if self.inner.server_ready.load(Ordering::SeqCst) {
            let msg =
                ClientMessage::new(ClientMessageKind::BindSession, json!({ "cid": sid.clone() }));
            if let Ok(json) = serde_json::to_string(&msg)
                && let Some(tx) = self.inner.tx.lock().await.as_ref()
            {
                let _ = tx.send(Message::Text(json.into()));
            }
            info!(session_id = %sid, "rebound session in place");
        }
    }

    /// Silent teardown: stop reconnection, cancel timers, reject queued
    /// sends, and guarantee no callback fires afterwards.
    pub async fn close(&self) {
        self.inner.shutdown_flag.store(true, Ordering::Relaxed);
        self.inner.shutdown.notify_one();

        self.inner.server_ready.store(false, Ordering::SeqCst);
        *self.inner.tx.lock().await = None;
        *self.inner.state.write().await = ConnectionState::Disconnected;
        self.inner
            .outbox
            .lock()
            .await
            .reject_all(&SessionError::Closed);
    }
}

impl Inner {
    async fn set_state(&self, next: ConnectionState) {
        *self.state.write().await = next;
        if self.shutdown_flag.load(Ordering::Relaxed) {
            return;
        }
        if let Some(cb) = self.handlers.on_state.lock().await.as_ref() {
            cb(next);
        }
    }

    async fn report_reconnect(&self, status: ReconnectStatus) {
        if self.shutdown_flag.load(Ordering::Relaxed) {
            return;
        }
        if let Some(cb) = self.handlers.on_reconnect.lock().await.as_ref() {
            cb(status);
        }
    }

    async fn report_error(&self, err: SessionError) {
        if self.shutdown_flag.load(Ordering::Relaxed) {
            return;
        }
        if let Some(cb) = self.handlers.on_error.lock().await.as_ref() {
            cb(err);
        }
    }

    /// Transition to server-ready exactly once per connection cycle:
    /// flush the outbox in arrival order, then notify waiters.
    async fn mark_ready(&self) {
        if self.server_ready.swap(true, Ordering::SeqCst) {
            return;
        }

        // Flush under the tx lock so a concurrent send cannot observe
        // ready=true while the queue still holds earlier entries.
        {
            let tx_guard = self.tx.lock().await;
            if let Some(tx) = tx_guard.as_ref() {
                let queued = self.outbox.lock().await.drain();
                if !queued.is_empty() {
                    info!(count = queued.len(), "flushing outbound queue");
                }
                for item in queued {
                    let result = tx
                        .send(Message::Text(item.json.into()))
                        .map_err(|_| SessionError::Transport("writer closed".into()));
                    let _ = item.ack.send(result);
                }
            }
        }

        if !self.shutdown_flag.load(Ordering::Relaxed)
            && let Some(cb) = self.handlers.on_connect.lock().await.as_ref()
        {
            cb();
        }
        self.ready_notify.notify_waiters();
    }

    /// Terminal failure: reject everything queued, remember the error so
    /// later sends fail fast, and stop reconnecting.
    async fn fail_terminal(&self, err: SessionError) {
        *self.terminal.lock().await = Some(err.clone());
        self.server_ready.store(false, Ordering::SeqCst);
        *self.tx.lock().await = None;
        self.outbox.lock().await.reject_all(&err);
        self.set_state(ConnectionState::Disconnected).await;

        let status = if matches!(err, SessionError::MaxReconnectAttempts) {
            ReconnectStatus::MaxAttemptsReached
        } else {
            ReconnectStatus::Failed
        };
        self.report_reconnect(status).await;
        self.report_error(err).await;
    }
}

async fn run_loop(inner: &Arc<Inner>) {
    let config = inner.config.clone();
    let mut attempts: usize = 0;
    let mut has_connected_once = false;

    loop {
        if inner.shutdown_flag.load(Ordering::Relaxed) {
            break;
        }

        if attempts >= config.max_reconnect_attempts {
            warn!(attempts, "max reconnection attempts reached, giving up");
            inner.fail_terminal(SessionError::MaxReconnectAttempts).await;
            break;
        }

        inner
            .set_state(if has_connected_once || attempts > 0 {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Connecting
            })
            .await;

        let ws_url = {
            let sid = inner.session_id.read().await;
            handshake_url(&config.url, &config.auth_token, &sid)
        };
        debug!(attempt = attempts, "connecting to WebSocket");

        let connect_result =
            time::timeout(config.connect_timeout, tokio_tungstenite::connect_async(&ws_url)).await;

        let ws_stream = match connect_result {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => {
                warn!(attempt = attempts, error = %e, "WebSocket connection failed, will retry");
                inner
                    .report_error(SessionError::Transport(e.to_string()))
                    .await;
                let delay = backoff_delay(config.base_backoff, config.max_backoff, attempts as u32);
                attempts += 1;
                inner
                    .report_reconnect(ReconnectStatus::Reconnecting { attempt: attempts })
                    .await;
                wait_backoff(inner, delay).await;
                continue;
            }
            Err(_) => {
                warn!(
                    attempt = attempts,
                    "WebSocket connect timed out ({}s), will retry",
                    config.connect_timeout.as_secs()
                );
                inner
                    .report_error(SessionError::ConnectTimeout(config.connect_timeout))
                    .await;
                let delay = backoff_delay(config.base_backoff, config.max_backoff, attempts as u32);
                attempts += 1;
                inner
                    .report_reconnect(ReconnectStatus::Reconnecting { attempt: attempts })
                    .await;
                wait_backoff(inner, delay).await;
                continue;
            }
        };

        {
            let sid = inner.session_id.read().await;
            info!(session_id = %sid, "WebSocket connected");
        }
        inner.set_state(ConnectionState::Connected).await;
        inner.report_reconnect(ReconnectStatus::Idle).await;
        attempts = 0;
        has_connected_once = true;
        inner.last_activity.store(epoch_ms(), Ordering::Relaxed);

        let (mut write, mut read) = ws_stream.split();
        let (send_tx, mut send_rx) = mpsc::unbounded_channel::<Message>();
        *inner.tx.lock().await = Some(send_tx.clone());

        // Signals receipt of the server's explicit ready acknowledgment.
        let ready_signal = Arc::new(Notify::new());

        // --- Ready task (handshake) ---
        // Marks ready on explicit acknowledgment, or optimistically after
        // the grace period for servers that omit the handshake event.
        let ready_task = {
            let inner = inner.clone();
            let signal = ready_signal.clone();
            async move {
                tokio::select! {
                    _ = signal.notified() => {
                        debug!("server acknowledged readiness");
                    }
                    _ = time::sleep(inner.config.ready_grace) => {
                        debug!(
                            grace_ms = inner.config.ready_grace.as_millis() as u64,
                            "no ready acknowledgment within grace period, assuming ready"
                        );
                    }
                }
                inner.mark_ready().await;
                std::future::pending::<()>().await
            }
        };

        // --- Write task ---
        let write_task = {
            let inner = inner.clone();
            async move {
                while let Some(msg) = send_rx.recv().await {
                    if inner.shutdown_flag.load(Ordering::Relaxed) {
                        break;
                    }
                    if write.send(msg).await.is_err() {
                        break;
                    }
                }
            }
        };

        // --- Ping task (heartbeat) ---
        let ping_task = {
            let tx = send_tx.clone();
            let inner = inner.clone();
            async move {
                let mut interval = time::interval(inner.config.ping_interval);
                interval.tick().await; // skip first immediate tick
                loop {
                    interval.tick().await;
                    if inner.shutdown_flag.load(Ordering::Relaxed) {
                        break;
                    }
                    let ping = ClientMessage::ping();
                    let Ok(json) = serde_json::to_string(&ping) else {
                        break;
                    };
                    if tx.send(Message::Text(json.into())).is_err() {
                        break;
                    }
                }
            }
        };

        // --- Watchdog task (detect dead connection) ---
        let dead_timeout = config.ping_interval + PONG_TIMEOUT;
        let watchdog_task = {
            let inner = inner.clone();
            async move {
                let mut interval = time::interval(Duration::from_secs(5));
                loop {
                    interval.tick().await;
                    if inner.shutdown_flag.load(Ordering::Relaxed) {
                        break;
                    }
                    let last = inner.last_activity.load(Ordering::Relaxed);
                    if epoch_ms().saturating_sub(last) > dead_timeout.as_millis() as u64 {
                        warn!(
                            "no activity for {}s, connection presumed dead",
                            dead_timeout.as_secs()
                        );
                        break;
                    }
                }
            }
        };

        // --- Read task ---
        // Returns the error that ended this connection cycle: a terminal
        // one for semantic close codes, a transport one for read errors,
        // and None for clean endings. Reporting happens after the select,
        // so each disconnect cycle surfaces at most one error.
        let read_task = {
            let inner = inner.clone();
            let signal = ready_signal.clone();
            async move {
                let mut outcome: Option<SessionError> = None;
                while let Some(msg) = read.next().await {
                    if inner.shutdown_flag.load(Ordering::Relaxed) {
                        break;
                    }
                    // Any received frame counts as activity
                    inner.last_activity.store(epoch_ms(), Ordering::Relaxed);

                    match msg {
                        Ok(Message::Text(text)) => {
                            let Ok(frame) = serde_json::from_str::<ServerEvent>(text.as_str())
                            else {
                                debug!("ignoring unparseable frame");
                                continue;
                            };
                            if normalize::is_ready_ack(&frame.kind) {
                                signal.notify_one();
                            }
                            if let Some(cb) = inner.handlers.on_frame.lock().await.as_ref() {
                                cb(frame);
                            }
                        }
                        Ok(Message::Pong(_)) | Ok(Message::Ping(_)) => {
                            // Activity already recorded above
                        }
                        Ok(Message::Close(frame)) => {
                            let code = frame
                                .as_ref()
                                .map(|f| u16::from(f.code))
                                .unwrap_or(CLOSE_NORMAL);
                            outcome = SessionError::from_close_code(code);
                            info!(code, terminal = outcome.is_some(), "server closed connection");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "WebSocket read error");
                            outcome = Some(SessionError::Transport(e.to_string()));
                            break;
                        }
                        _ => {}
                    }
                }
                outcome
            }
        };

        let mut cycle_outcome: Option<SessionError> = None;
        tokio::select! {
            outcome = read_task => { cycle_outcome = outcome; }
            _ = write_task => {}
            _ = ping_task => {}
            _ = watchdog_task => {}
            _ = ready_task => {}
            _ = wait_shutdown(inner) => {
                inner.server_ready.store(false, Ordering::SeqCst);
                *inner.tx.lock().await = None;
                *inner.state.write().await = ConnectionState::Disconnected;
                inner.outbox.lock().await.reject_all(&SessionError::Closed);
                return;
            }
        }

        inner.server_ready.store(false, Ordering::SeqCst);
        *inner.tx.lock().await = None;

        match cycle_outcome {
            Some(err) if err.is_terminal() => {
                inner.fail_terminal(err).await;
                break;
            }
            Some(err) => inner.report_error(err).await,
            None => {}
        }

        inner.set_state(ConnectionState::Disconnected).await;
        info!("WebSocket disconnected, scheduling reconnect");

        let delay = backoff_delay(config.base_backoff, config.max_backoff, attempts as u32);
        attempts += 1;
        inner
            .report_reconnect(ReconnectStatus::Reconnecting { attempt: attempts })
            .await;
        wait_backoff(inner, delay).await;
    }
}

/// Wait for a shutdown signal. A permit left over from a teardown that
/// ran while no loop was listening does not count; only a notification
/// with the flag set ends the wait.
async fn wait_shutdown(inner: &Inner) {
    loop {
        inner.shutdown.notified().await;
        if inner.shutdown_flag.load(Ordering::Relaxed) {
            return;
        }
    }
}

/// Wait for the backoff duration, respecting shutdown.
async fn wait_backoff(inner: &Arc<Inner>, delay: Duration) {
    if inner.shutdown_flag.load(Ordering::Relaxed) {
        return;
    }
    debug!(backoff_ms = delay.as_millis() as u64, "waiting before reconnect");
    tokio::select! {
        _ = time::sleep(delay) => {},
        _ = wait_shutdown(inner) => {},
    }
}
