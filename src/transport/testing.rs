//! Scripted connector for transport and session tests

use super::traits::{Connection, Connector};
use super::TransportError;
use async_trait::async_trait;
use futures::channel::mpsc as futures_mpsc;
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

enum Plan {
    Accept(Connection),
    Refuse(String),
}

/// Hands out connections in the order they were scripted.
/// An empty script refuses.
#[derive(Default)]
pub struct MockConnector {
    script: Mutex<VecDeque<Plan>>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an accepted connection and return the server side of it
    pub fn accept(&self) -> MockServer {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (written_tx, written_rx) = futures_mpsc::unbounded::<String>();

        let incoming = UnboundedReceiverStream::new(inbound_rx).boxed();
        let outgoing = written_tx.sink_map_err(|e| TransportError::Io(e.to_string()));
        let connection = Connection::new(incoming, Box::pin(outgoing));

        self.script
            .lock()
            .unwrap()
            .push_back(Plan::Accept(connection));

        MockServer {
            inbound: inbound_tx,
            written: written_rx,
        }
    }

    pub fn refuse(&self, reason: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Plan::Refuse(reason.to_string()));
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Connection, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let plan = self.script.lock().unwrap().pop_front();
        match plan {
            Some(Plan::Accept(connection)) => Ok(connection),
            Some(Plan::Refuse(reason)) => Err(TransportError::ConnectionRefused(reason)),
            None => Err(TransportError::ConnectionRefused(
                "no scripted connection".to_string(),
            )),
        }
    }
}

/// Server end of a scripted connection. Dropping it drops the connection.
pub struct MockServer {
    inbound: mpsc::UnboundedSender<Result<String, TransportError>>,
    written: futures_mpsc::UnboundedReceiver<String>,
}

impl MockServer {
    pub fn push(&self, raw: &str) {
        let _ = self.inbound.send(Ok(raw.to_string()));
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.push(&value.to_string());
    }

    /// Fail the connection with a transport error
    pub fn fail(&self, message: &str) {
        let _ = self
            .inbound
            .send(Err(TransportError::Io(message.to_string())));
    }

    /// Next frame the client wrote; `None` once the client closed its side
    pub async fn next_written(&mut self) -> Option<String> {
        self.written.next().await
    }
}
