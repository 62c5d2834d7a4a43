//! Client error types

use crate::session::HistoryError;
use thiserror::Error;

/// Errors surfaced to callers of a chat session
#[derive(Debug, Error)]
pub enum ClientError {
    /// `send` was called while the connection is not `Open`. Nothing was written.
    #[error("WebSocket is not connected")]
    NotConnected,
    /// The REST history client could not be built
    #[error("History error: {0}")]
    History(#[from] HistoryError),
}

pub type ClientResult<T> = Result<T, ClientError>;
