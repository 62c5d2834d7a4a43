//! Trait abstractions for the streaming connection
//!
//! The transport only sees raw text frames through these seams, so the
//! supervisor can be driven by a scripted connector in tests.

use super::TransportError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::Sink;
use std::pin::Pin;
use std::sync::Arc;

/// Inbound raw frames. The stream ending means the peer went away.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

/// Outbound raw frames
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// One established bidirectional connection
pub struct Connection {
    pub incoming: FrameStream,
    pub outgoing: FrameSink,
}

impl Connection {
    pub fn new(incoming: FrameStream, outgoing: FrameSink) -> Self {
        Self { incoming, outgoing }
    }
}

/// Opens connections to a streaming endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError>;
}

#[async_trait]
impl<T: Connector + ?Sized> Connector for Arc<T> {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        (**self).connect(url).await
    }
}
