//! Streaming client for agentic chat sessions
//!
//! Frames arrive over one WebSocket per session, are decoded by [`codec`],
//! folded into the live turn by [`aggregator`], and published to views
//! through a [`session::SessionStore`].

pub mod aggregator;
pub mod codec;
pub mod config;
pub mod error;
pub mod session;
pub mod transport;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use session::{ChatSession, SessionSnapshot, SessionStore};
