//! Finalized message history
//!
//! The history collaborator is read-only from the client's side: after a
//! turn ends (or the user's message is saved) the session re-lists the
//! messages that the backend has persisted.

use crate::aggregator::{ToolCallRecord, ToolCallStatus};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("History request to {url} failed with status {status}")]
    Status { status: u16, url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    #[serde(other)]
    Unknown,
}

/// A tool invocation persisted alongside an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub action_type: Option<String>,
    #[serde(default)]
    pub action_input: Option<Value>,
    #[serde(default)]
    pub action_output: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// One finalized message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub agent_actions: Option<Vec<AgentAction>>,
}

impl HistoryMessage {
    /// Persisted agent actions as completed tool calls, oldest first
    pub fn tool_calls(&self) -> Vec<ToolCallRecord> {
        let mut actions: Vec<&AgentAction> = self.agent_actions.iter().flatten().collect();
        actions.sort_by_key(|action| action.created_at);

        actions
            .into_iter()
            .enumerate()
            .map(|(index, action)| {
                let args = action
                    .action_input
                    .clone()
                    .unwrap_or_else(|| Value::Object(Map::new()));
                ToolCallRecord {
                    tool_call_id: action
                        .id
                        .clone()
                        .unwrap_or_else(|| format!("{}-action-{index}", self.id)),
                    tool_name: action
                        .action_type
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                    raw_args: args.to_string(),
                    args,
                    result: action.action_output.as_ref().map(|output| match output {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    }),
                    is_error: Some(action.status.as_deref() != Some("success")),
                    status: ToolCallStatus::Complete,
                    step: None,
                }
            })
            .collect()
    }
}

/// `GET /api/v1/chats/{id}/messages` response body
#[derive(Debug, Clone, Deserialize)]
pub struct MessageListResponse {
    pub messages: Vec<HistoryMessage>,
    #[serde(default)]
    pub total: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody {
    Envelope(MessageListResponse),
    Bare(Vec<HistoryMessage>),
}

/// RFC 3339, or a naive timestamp taken as UTC
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// Read access to a session's finalized messages
#[async_trait]
pub trait MessageHistory: Send + Sync {
    async fn list(&self, session_id: &str) -> Result<Vec<HistoryMessage>, HistoryError>;
}

#[async_trait]
impl<T: MessageHistory + ?Sized> MessageHistory for Arc<T> {
    async fn list(&self, session_id: &str) -> Result<Vec<HistoryMessage>, HistoryError> {
        (**self).list(session_id).await
    }
}

/// History over the REST API
#[derive(Debug, Clone)]
pub struct HttpMessageHistory {
    client: reqwest::Client,
    api_base: String,
}

impl HttpMessageHistory {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, HistoryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn messages_url(&self, session_id: &str) -> String {
        format!("{}/api/v1/chats/{session_id}/messages", self.api_base)
    }
}

#[async_trait]
impl MessageHistory for HttpMessageHistory {
    async fn list(&self, session_id: &str) -> Result<Vec<HistoryMessage>, HistoryError> {
        let url = self.messages_url(session_id);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HistoryError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let messages = match response.json::<ListBody>().await? {
            ListBody::Envelope(body) => {
                tracing::debug!(total = body.total, "Listed messages");
                body.messages
            }
            ListBody::Bare(messages) => messages,
        };
        Ok(messages)
    }
}

/// In-memory history for tests and offline use
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    sessions: Mutex<HashMap<String, Vec<HistoryMessage>>>,
    /// Artificial latency per call, consumed in order
    delays: Mutex<Vec<Duration>>,
    fail_next: Mutex<bool>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, session_id: &str, message: HistoryMessage) {
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(session_id.to_string())
            .or_default()
            .push(message);
    }

    /// Delay the next `list` calls by the given durations, in call order
    pub fn delay_next(&self, delays: impl IntoIterator<Item = Duration>) {
        let mut queue = self
            .delays
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        queue.extend(delays);
    }

    /// Make the next `list` call fail
    pub fn fail_next(&self) {
        *self
            .fail_next
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = true;
    }
}

#[async_trait]
impl MessageHistory for InMemoryHistory {
    async fn list(&self, session_id: &str) -> Result<Vec<HistoryMessage>, HistoryError> {
        let delay = {
            let mut queue = self
                .delays
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            (!queue.is_empty()).then(|| queue.remove(0))
        };
        // Snapshot before sleeping so a delayed read returns older data
        let snapshot = self
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        let fail = std::mem::take(
            &mut *self
                .fail_next
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(HistoryError::Status {
                status: 503,
                url: format!("memory://{session_id}/messages"),
            });
        }
        Ok(snapshot)
    }
}
