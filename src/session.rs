//! Chat session context
//!
//! A [`ChatSession`] is built when a session view opens and torn down when
//! it closes. It owns the transport, the aggregator (inside a driver task)
//! and the [`SessionStore`] that views subscribe to.

mod history;
mod store;

pub use history::{
    AgentAction, HistoryError, HistoryMessage, HttpMessageHistory, InMemoryHistory,
    MessageHistory, MessageListResponse, MessageRole,
};
pub use store::{SessionSnapshot, SessionStore};

use crate::aggregator::{Aggregator, Effect, SessionError};
use crate::codec;
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::transport::{
    ConnectionStatus, Connector, Transport, TransportEvent, WebSocketConnector,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const EVENT_BUFFER: usize = 64;

/// Completed history read, tagged with the generation that requested it
struct HistoryReply {
    generation: u64,
    result: Result<Vec<HistoryMessage>, HistoryError>,
}

enum Command {
    ClearError,
}

pub struct ChatSession {
    session_id: String,
    transport: Transport,
    store: Arc<SessionStore>,
    events_tx: mpsc::Sender<TransportEvent>,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
    driver: Option<JoinHandle<()>>,
}

impl ChatSession {
    /// Open a session: start the driver, connect, and load finalized history.
    /// Must be called inside a tokio runtime.
    pub fn open(
        config: &ClientConfig,
        session_id: impl Into<String>,
        connector: Arc<dyn Connector>,
        history: Arc<dyn MessageHistory>,
    ) -> Self {
        let session_id = session_id.into();
        let store = Arc::new(SessionStore::new());
        let shutdown = CancellationToken::new();

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (history_tx, history_rx) = mpsc::unbounded_channel();

        let driver = SessionDriver {
            session_id: session_id.clone(),
            aggregator: Aggregator::new(),
            store: Arc::clone(&store),
            history,
            history_tx,
            shutdown: shutdown.clone(),
        };
        let driver = tokio::spawn(driver.run(events_rx, commands_rx, history_rx));

        let transport = Transport::new(
            config.stream_url(&session_id),
            connector,
            config.reconnect_policy(),
        );
        tracing::info!(session_id = %session_id, url = %transport.url(), "Opening chat session");
        transport.connect(events_tx.clone());

        Self {
            session_id,
            transport,
            store,
            events_tx,
            commands,
            shutdown,
            driver: Some(driver),
        }
    }

    /// Open a session against the configured backend: WebSocket stream plus
    /// REST history.
    pub fn open_remote(config: &ClientConfig, session_id: impl Into<String>) -> ClientResult<Self> {
        let history = Arc::new(config.http_history()?);
        Ok(Self::open(
            config,
            session_id,
            Arc::new(WebSocketConnector::new()),
            history,
        ))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.store.snapshot()
    }

    /// Send one user message. Fails immediately unless connected.
    pub fn send(&self, text: &str) -> ClientResult<()> {
        self.transport.send(text)
    }

    /// Explicit reconnect; resets the retry budget and supersedes any pending retry
    pub fn reconnect(&self) {
        tracing::info!(session_id = %self.session_id, "Explicit reconnect");
        self.transport.connect(self.events_tx.clone());
    }

    pub fn clear_error(&self) {
        let _ = self.commands.send(Command::ClearError);
    }

    /// Tear the session down. Idempotent.
    pub fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.transport.close();
        self.shutdown.cancel();
        tracing::info!(session_id = %self.session_id, "Chat session closed");
    }

    /// Close and wait for the driver task to finish
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                tracing::warn!(error = %e, "Session driver ended abnormally");
            }
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Single writer of the store: folds transport events and history replies
struct SessionDriver {
    session_id: String,
    aggregator: Aggregator,
    store: Arc<SessionStore>,
    history: Arc<dyn MessageHistory>,
    history_tx: mpsc::UnboundedSender<HistoryReply>,
    shutdown: CancellationToken,
}

impl SessionDriver {
    async fn run(
        mut self,
        mut events: mpsc::Receiver<TransportEvent>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut history_replies: mpsc::UnboundedReceiver<HistoryReply>,
    ) {
        tracing::debug!(session_id = %self.session_id, "Session driver started");
        self.request_history("session_open");

        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                Some(event) = events.recv() => self.handle_transport(event),
                Some(reply) = history_replies.recv() => self.handle_history(reply),
                Some(command) = commands.recv() => match command {
                    Command::ClearError => self.store.clear_error(),
                },
                else => break,
            }
        }

        self.store.set_status(ConnectionStatus::Closed);
        tracing::debug!(session_id = %self.session_id, "Session driver stopped");
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Status(status) => self.store.set_status(status),
            TransportEvent::Frame(raw) => {
                let event = codec::decode_event(&raw);
                tracing::debug!(session_id = %self.session_id, kind = event.kind(), "Frame received");
                let effects = self.aggregator.apply(event);
                for effect in effects {
                    self.execute_effect(effect);
                }
            }
            TransportEvent::Failure { message } => {
                tracing::debug!(session_id = %self.session_id, reason = %message, "Transport failure");
            }
            TransportEvent::ReconnectScheduled { attempt, delay } => {
                tracing::debug!(
                    session_id = %self.session_id,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Reconnect pending"
                );
            }
            TransportEvent::Exhausted { attempts } => {
                tracing::error!(session_id = %self.session_id, attempts, "Connection lost");
                self.store.set_error(SessionError::connection_lost());
            }
        }
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::PublishTurn => self.store.publish_turn(self.aggregator.turn()),
            Effect::RefreshHistory { reason, message_id } => {
                tracing::debug!(
                    session_id = %self.session_id,
                    message_id = message_id.as_deref().unwrap_or(""),
                    "History refresh signalled"
                );
                self.request_history(reason.as_str());
            }
            Effect::SetError(error) => {
                tracing::warn!(session_id = %self.session_id, error = %error.message, "Turn failed");
                self.store.set_error(error);
            }
            Effect::ClearError => self.store.clear_error(),
            Effect::Anomaly(anomaly) => {
                tracing::warn!(session_id = %self.session_id, anomaly = %anomaly, "Protocol anomaly");
            }
        }
    }

    /// Start a deferred history read for a new generation
    fn request_history(&self, trigger: &'static str) {
        let generation = self.store.request_history();
        let history = Arc::clone(&self.history);
        let replies = self.history_tx.clone();
        let shutdown = self.shutdown.clone();
        let session_id = self.session_id.clone();

        tracing::debug!(session_id = %self.session_id, generation, trigger, "Requesting history");
        tokio::spawn(async move {
            let result = tokio::select! {
                () = shutdown.cancelled() => return,
                result = history.list(&session_id) => result,
            };
            let _ = replies.send(HistoryReply { generation, result });
        });
    }

    fn handle_history(&mut self, reply: HistoryReply) {
        let HistoryReply { generation, result } = reply;
        match result {
            Ok(messages) => {
                let count = messages.len();
                if self.store.apply_history(generation, messages) {
                    tracing::info!(session_id = %self.session_id, generation, count, "History refreshed");
                } else {
                    tracing::debug!(session_id = %self.session_id, generation, "Discarding stale history");
                }
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, generation, error = %e, "History refresh failed");
                self.store.settle_history(generation);
            }
        }
    }
}
