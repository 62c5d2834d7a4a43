//! Streaming transport
//!
//! Owns the one connection of a chat session. A supervisor task connects,
//! pumps frames in arrival order into a single registered sink, and hands
//! unexpected closures to the [`ReconnectPolicy`]. Closing (or connecting
//! again) cancels the supervisor, including any pending reconnect sleep.

mod reconnect;
pub mod traits;
mod websocket;

#[cfg(test)]
pub mod testing;

pub use reconnect::{ReconnectPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};
pub use traits::{Connection, Connector, FrameSink, FrameStream};
pub use websocket::WebSocketConnector;

use crate::codec;
use crate::error::ClientError;
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Frame is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),
    #[error("I/O error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Reconnecting,
}

/// Everything the transport reports to its sink, in order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Status(ConnectionStatus),
    /// One raw inbound frame
    Frame(String),
    /// A connection attempt failed or an open connection dropped
    Failure { message: String },
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Retries used up; the transport is now `Closed`
    Exhausted { attempts: u32 },
}

/// The single consumer of transport events
pub type EventSink = mpsc::Sender<TransportEvent>;

struct Shared {
    status: ConnectionStatus,
    policy: ReconnectPolicy,
    /// Present only while `Open`
    outbound: Option<mpsc::UnboundedSender<String>>,
    cancel: Option<CancellationToken>,
    /// Bumped by every connect/close so a superseded supervisor can't write
    generation: u64,
}

pub struct Transport {
    url: String,
    connector: Arc<dyn Connector>,
    shared: Arc<Mutex<Shared>>,
}

impl Transport {
    pub fn new(url: impl Into<String>, connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        Self {
            url: url.into(),
            connector,
            shared: Arc::new(Mutex::new(Shared {
                status: ConnectionStatus::Idle,
                policy,
                outbound: None,
                cancel: None,
                generation: 0,
            })),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> ConnectionStatus {
        lock(&self.shared).status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }

    /// Current reconnect attempt count
    pub fn reconnect_attempt(&self) -> u32 {
        lock(&self.shared).policy.attempt()
    }

    /// Start connecting and register `sink` as the only event consumer.
    ///
    /// Supersedes any previous connection or pending reconnect and resets
    /// the attempt count. Must be called inside a tokio runtime.
    pub fn connect(&self, sink: EventSink) {
        let (generation, cancel) = {
            let mut shared = lock(&self.shared);
            if let Some(previous) = shared.cancel.take() {
                previous.cancel();
            }
            shared.generation += 1;
            shared.policy.reset();
            shared.outbound = None;
            shared.status = ConnectionStatus::Connecting;
            let cancel = CancellationToken::new();
            shared.cancel = Some(cancel.clone());
            (shared.generation, cancel)
        };

        tracing::info!(url = %self.url, generation, "Connecting");

        let supervisor = Supervisor {
            url: self.url.clone(),
            connector: Arc::clone(&self.connector),
            shared: Arc::clone(&self.shared),
            generation,
            sink,
            cancel,
        };
        tokio::spawn(supervisor.run());
    }

    /// Queue one user message for the open connection.
    ///
    /// Fails with [`ClientError::NotConnected`] unless the connection is
    /// `Open`; nothing is queued in that case.
    pub fn send(&self, text: &str) -> Result<(), ClientError> {
        let shared = lock(&self.shared);
        match (&shared.status, &shared.outbound) {
            (ConnectionStatus::Open, Some(outbound)) => {
                outbound
                    .send(codec::encode(text))
                    .map_err(|_| ClientError::NotConnected)?;
                tracing::debug!(len = text.len(), "Queued user message");
                Ok(())
            }
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Terminal shutdown. Idempotent; suppresses any further reconnects.
    pub fn close(&self) {
        let mut shared = lock(&self.shared);
        let Some(cancel) = shared.cancel.take() else {
            shared.status = ConnectionStatus::Closed;
            return;
        };
        shared.status = ConnectionStatus::Closing;
        shared.generation += 1;
        cancel.cancel();
        shared.outbound = None;
        shared.status = ConnectionStatus::Closed;
        tracing::info!(url = %self.url, "Transport closed");
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

enum PumpExit {
    Cancelled,
    SinkClosed,
    Lost(String),
}

/// One connect/reconnect loop, owned by a spawned task
struct Supervisor {
    url: String,
    connector: Arc<dyn Connector>,
    shared: Arc<Mutex<Shared>>,
    generation: u64,
    sink: EventSink,
    cancel: CancellationToken,
}

impl Supervisor {
    async fn run(self) {
        loop {
            if !self.publish_status(ConnectionStatus::Connecting).await {
                return;
            }

            let attempt = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                result = self.connector.connect(&self.url) => result,
            };

            let reason = match attempt {
                Ok(connection) => {
                    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                    if !self.mark_open(outbound_tx) {
                        return;
                    }
                    tracing::info!(url = %self.url, "Connection open");
                    if self.emit(TransportEvent::Status(ConnectionStatus::Open)).await.is_err() {
                        return;
                    }
                    match self.pump(connection, outbound_rx).await {
                        PumpExit::Cancelled | PumpExit::SinkClosed => return,
                        PumpExit::Lost(reason) => reason,
                    }
                }
                Err(e) => e.to_string(),
            };

            if !self.schedule_retry(reason).await {
                return;
            }
        }
    }

    /// Returns false if the loop should stop.
    async fn schedule_retry(&self, reason: String) -> bool {
        let next = {
            let mut shared = lock(&self.shared);
            if shared.generation != self.generation {
                return false;
            }
            shared.outbound = None;
            let next = shared.policy.next_delay();
            let attempt = shared.policy.attempt();
            shared.status = if next.is_some() {
                ConnectionStatus::Reconnecting
            } else {
                ConnectionStatus::Closed
            };
            next.map(|delay| (attempt, delay)).ok_or(attempt)
        };

        tracing::warn!(url = %self.url, reason = %reason, "Connection lost");
        if self
            .emit(TransportEvent::Failure { message: reason })
            .await
            .is_err()
        {
            return false;
        }

        match next {
            Ok((attempt, delay)) => {
                tracing::warn!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Scheduling reconnect"
                );
                let scheduled = self
                    .emit(TransportEvent::Status(ConnectionStatus::Reconnecting))
                    .await
                    .is_ok()
                    && self
                        .emit(TransportEvent::ReconnectScheduled { attempt, delay })
                        .await
                        .is_ok();
                if !scheduled {
                    return false;
                }
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => false,
                    () = tokio::time::sleep(delay) => true,
                }
            }
            Err(attempts) => {
                tracing::error!(url = %self.url, attempts, "Reconnect attempts exhausted");
                let _ = self
                    .emit(TransportEvent::Status(ConnectionStatus::Closed))
                    .await;
                let _ = self.emit(TransportEvent::Exhausted { attempts }).await;
                false
            }
        }
    }

    async fn pump(
        &self,
        connection: Connection,
        mut outbound: mpsc::UnboundedReceiver<String>,
    ) -> PumpExit {
        let Connection {
            mut incoming,
            mut outgoing,
        } = connection;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    if let Err(e) = outgoing.close().await {
                        tracing::debug!(error = %e, "Error closing connection");
                    }
                    return PumpExit::Cancelled;
                }
                frame = incoming.next() => match frame {
                    Some(Ok(raw)) => {
                        if self.emit(TransportEvent::Frame(raw)).await.is_err() {
                            return PumpExit::SinkClosed;
                        }
                    }
                    Some(Err(e)) => return PumpExit::Lost(e.to_string()),
                    None => return PumpExit::Lost("connection closed by peer".to_string()),
                },
                Some(raw) = outbound.recv() => {
                    if let Err(e) = outgoing.send(raw).await {
                        return PumpExit::Lost(e.to_string());
                    }
                }
            }
        }
    }

    fn mark_open(&self, outbound: mpsc::UnboundedSender<String>) -> bool {
        let mut shared = lock(&self.shared);
        if shared.generation != self.generation {
            return false;
        }
        shared.policy.reset();
        shared.outbound = Some(outbound);
        shared.status = ConnectionStatus::Open;
        true
    }

    /// Returns false if this supervisor has been superseded or the sink is gone.
    async fn publish_status(&self, status: ConnectionStatus) -> bool {
        {
            let mut shared = lock(&self.shared);
            if shared.generation != self.generation {
                return false;
            }
            shared.status = status;
        }
        self.emit(TransportEvent::Status(status)).await.is_ok()
    }

    /// Deliver one event unless this supervisor was superseded meanwhile.
    /// The generation is checked under the same lock `connect`/`close` bump
    /// it with, after sink capacity is reserved, so nothing stale lands.
    async fn emit(&self, event: TransportEvent) -> Result<(), ()> {
        let permit = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(()),
            permit = self.sink.reserve() => permit.map_err(|_| ())?,
        };
        let shared = lock(&self.shared);
        if shared.generation != self.generation {
            return Err(());
        }
        permit.send(event);
        Ok(())
    }
}
