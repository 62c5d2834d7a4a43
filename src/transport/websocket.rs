//! WebSocket connector backed by tokio-tungstenite

use super::traits::{Connection, Connector};
use super::TransportError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Production connector for `ws://` and `wss://` endpoints
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        let (socket, response) = connect_async(url).await?;
        tracing::debug!(url = %url, status = %response.status(), "WebSocket handshake complete");

        let (ws_tx, ws_rx) = socket.split();

        // Control frames are handled by tungstenite; only data frames reach the aggregator.
        // The stream ends after the close handshake.
        let incoming = ws_rx
            .filter_map(|message| async move {
                match message {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(Message::Binary(data)) => {
                        Some(String::from_utf8(data.to_vec()).map_err(TransportError::from))
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(frame = ?frame, "Server sent close frame");
                        None
                    }
                    Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
                    Err(e) => Some(Err(TransportError::from(e))),
                }
            })
            .boxed();

        let outgoing = ws_tx
            .sink_map_err(TransportError::from)
            .with(|raw: String| async move { Ok::<_, TransportError>(Message::Text(raw.into())) });

        Ok(Connection::new(incoming, Box::pin(outgoing)))
    }
}
