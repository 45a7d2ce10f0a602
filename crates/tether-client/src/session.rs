//! Session facade: the public contract the rendering layer consumes.
//!
//! Owns one [`WsClient`] and the projected [`SessionState`]. Inbound
//! frames run normalize -> reduce synchronously in receipt order; the
//! write side goes through the client's outbound queue with promise
//! semantics and a bounded wait.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::MutexGuard;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tokio::time;
use tracing::{debug, warn};

use tether_shared::schemas::{InterruptDecision, Message};
use tether_shared::ws_protocol::{ClientMessage, ClientMessageKind};

use crate::api::ApiClient;
use crate::error::SessionError;
use crate::normalize::{self, ErrorPayload};
use crate::projector::{self, SessionState};
use crate::ws::{ConnectionState, ReconnectStatus, WsClient, WsClientConfig};

type UpdateHandler = Box<dyn Fn(&SessionState) + Send + Sync>;
type ConnectionHandler = Box<dyn Fn(ConnectionState) + Send + Sync>;
type ReconnectStatusHandler = Box<dyn Fn(ReconnectStatus) + Send + Sync>;

#[derive(Default)]
struct FacadeHandlers {
    on_update: StdMutex<Option<UpdateHandler>>,
    on_connection: StdMutex<Option<ConnectionHandler>>,
    on_reconnect: StdMutex<Option<ReconnectStatusHandler>>,
}

impl FacadeHandlers {
    fn notify_update(&self, state: &SessionState) {
        let guard = lock_poison_free(&self.on_update);
        if let Some(cb) = guard.as_ref() {
            cb(state);
        }
    }
}

/// A poisoned lock only means another thread panicked mid-update; the
/// projected state is still the best view we have.
fn lock_poison_free<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct SessionClient {
    ws: Arc<WsClient>,
    state: Arc<StdMutex<SessionState>>,
    handlers: Arc<FacadeHandlers>,
    api: Option<Arc<ApiClient>>,
}

impl SessionClient {
    pub fn new(config: WsClientConfig) -> Self {
        Self {
            ws: Arc::new(WsClient::new(config)),
            state: Arc::new(StdMutex::new(SessionState::default())),
            handlers: Arc::new(FacadeHandlers::default()),
            api: None,
        }
    }

    /// Attach the REST collaborator used for history seeding and the
    /// HTTP control fallbacks.
    pub fn with_api(mut self, api: ApiClient) -> Self {
        self.api = Some(Arc::new(api));
        self
    }

    /// Snapshot of the projected state. Do not call from inside the
    /// update callback; the callback already receives the state.
    pub fn state(&self) -> SessionState {
        lock_poison_free(&self.state).clone()
    }

    pub async fn session_id(&self) -> String {
        self.ws.session_id().await
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.ws.connection_state().await
    }

    pub fn on_update(&self, handler: impl Fn(&SessionState) + Send + Sync + 'static) {
        *lock_poison_free(&self.handlers.on_update) = Some(Box::new(handler));
    }

    pub fn on_connection(&self, handler: impl Fn(ConnectionState) + Send + Sync + 'static) {
        *lock_poison_free(&self.handlers.on_connection) = Some(Box::new(handler));
    }

    pub fn on_reconnect_status(&self, handler: impl Fn(ReconnectStatus) + Send + Sync + 'static) {
        *lock_poison_free(&self.handlers.on_reconnect) = Some(Box::new(handler));
    }

    /// Wire the event pipeline and start the connection.
    pub async fn connect(&self) {
        let state = self.state.clone();
        let handlers = self.handlers.clone();
        self.ws
            .set_on_frame(move |frame| {
                let Some(event) = normalize::normalize(&frame) else {
                    debug!(kind = %frame.kind, "ignoring unrecognized event type");
                    return;
                };
                let mut guard = lock_poison_free(&state);
                projector::apply(&mut guard, event);
                handlers.notify_update(&guard);
            })
            .await;

        let handlers = self.handlers.clone();
        self.ws
            .set_on_state(move |connection_state| {
                let guard = lock_poison_free(&handlers.on_connection);
                if let Some(cb) = guard.as_ref() {
                    cb(connection_state);
                }
            })
            .await;

        let handlers = self.handlers.clone();
        self.ws
            .set_on_reconnect(move |status| {
                let guard = lock_poison_free(&handlers.on_reconnect);
                if let Some(cb) = guard.as_ref() {
                    cb(status);
                }
            })
            .await;

        let state = self.state.clone();
        let handlers = self.handlers.clone();
        self.ws
            .set_on_error(move |err| {
                let mut guard = lock_poison_free(&state);
                guard.last_error = Some(ErrorPayload {
                    code: None,
                    message: err.to_string(),
                });
                if err.is_terminal() {
                    guard.is_loading = false;
                }
                handlers.notify_update(&guard);
            })
            .await;

        self.ws.connect().await;
    }

    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        self.ws.wait_ready(timeout).await
    }

    /// Send a user message. Optimistically flips the loading flag;
    /// disconnected callers get an on-demand reconnect bounded by the
    /// configured send timeout.
    pub async fn send_user_message(&self, content: &str, attachments: Vec<Value>) -> Result<()> {
        {
            let mut guard = lock_poison_free(&self.state);
            guard.is_loading = true;
            guard.last_error = None;
            self.handlers.notify_update(&guard);
        }

        let mut data = json!({
            "content": content,
            "localId": uuid::Uuid::new_v4().to_string(),
        });
        if !attachments.is_empty() {
            data["attachments"] = Value::Array(attachments);
        }
        self.deliver(ClientMessage::new(ClientMessageKind::UserMessage, data))
            .await
    }

    /// Resume the active interrupt with a human decision.
    pub async fn resume_interrupt(
        &self,
        interrupt_id: &str,
        decision: InterruptDecision,
        value: Option<Value>,
    ) -> Result<()> {
        self.deliver(ClientMessage::new(
            ClientMessageKind::ResumeInterrupt,
            json!({
                "interruptId": interrupt_id,
                "decision": decision,
                "value": value,
            }),
        ))
        .await?;

        // Clear the active interrupt locally; the stream's `done` clears
        // it too, but resuming should reflect immediately.
        let mut guard = lock_poison_free(&self.state);
        if guard
            .interrupt
            .as_ref()
            .is_some_and(|i| i.id == interrupt_id)
        {
            guard.interrupt = None;
            guard.is_loading = true;
            self.handlers.notify_update(&guard);
        }
        Ok(())
    }

    /// Advisory stop: asks the backend to end the current turn. Nothing
    /// local is cancelled.
    pub async fn stop(&self) -> Result<()> {
        let _ = self
            .ws
            .send(&ClientMessage::new(ClientMessageKind::Stop, Value::Null))
            .await;
        Ok(())
    }

    /// Switch this client to another session id without discarding the
    /// socket. The projection restarts empty; the new session's events
    /// (or a snapshot) rebuild it.
    pub async fn rebind(&self, session_id: &str) {
        self.ws.rebind(session_id).await;
        let mut guard = lock_poison_free(&self.state);
        *guard = SessionState::default();
        self.handlers.notify_update(&guard);
    }

    /// Seed the projection with persisted history from the REST side.
    /// Returns how many messages were adopted.
    pub async fn load_history(&self) -> Result<usize> {
        let api = self.api.as_ref().context("no REST client configured")?;
        let session_id = self.ws.session_id().await;
        let raw = api.get_messages(&session_id, 0, 500).await?;

        let mut guard = lock_poison_free(&self.state);
        let mut adopted = 0;
        for value in raw {
            let Ok(message) = serde_json::from_value::<Message>(value) else {
                continue;
            };
            if guard.push_message(message) {
                adopted += 1;
            }
        }
        if adopted > 0 {
            self.handlers.notify_update(&guard);
        }
        Ok(adopted)
    }

    pub fn api(&self) -> Option<&ApiClient> {
        self.api.as_deref()
    }

    /// Tear down the connection. Queued sends reject, timers stop, and
    /// no further callback fires.
    pub async fn close(&self) {
        self.ws.close().await;
    }

    async fn deliver(&self, msg: ClientMessage) -> Result<()> {
        self.ws.ensure_connected().await;
        let ack = self.ws.send(&msg).await;
        let timeout = self.ws.config().send_timeout;
        match time::timeout(timeout, ack).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(err))) => {
                warn!(error = %err, "send failed");
                Err(err.into())
            }
            Ok(Err(_)) => Err(anyhow!("send dropped during teardown")),
            Err(_) => Err(SessionError::SendTimeout.into()),
        }
    }
}
