//! Client configuration from environment variables

use crate::session::{HistoryError, HttpMessageHistory};
use crate::transport::{ReconnectPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the streaming endpoint
    pub ws_url: String,
    /// Base URL of the REST API
    pub api_url: String,
    pub max_reconnects: u32,
    pub reconnect_delay: Duration,
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            max_reconnects: DEFAULT_MAX_ATTEMPTS,
            reconnect_delay: DEFAULT_BASE_DELAY,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let url = |key: &str, default: String| {
            lookup(key)
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(default)
        };

        Self {
            ws_url: url("AGENT_CHAT_WS_URL", defaults.ws_url),
            api_url: url("AGENT_CHAT_API_URL", defaults.api_url),
            max_reconnects: parse_or("AGENT_CHAT_MAX_RECONNECTS", &lookup, defaults.max_reconnects),
            reconnect_delay: Duration::from_millis(parse_or(
                "AGENT_CHAT_RECONNECT_DELAY_MS",
                &lookup,
                u64::try_from(defaults.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
            )),
            http_timeout: Duration::from_secs(parse_or(
                "AGENT_CHAT_HTTP_TIMEOUT_SECS",
                &lookup,
                defaults.http_timeout.as_secs(),
            )),
        }
    }

    /// `{ws}/api/v1/chats/{id}/stream`
    pub fn stream_url(&self, session_id: &str) -> String {
        format!("{}/api/v1/chats/{session_id}/stream", self.ws_url)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.max_reconnects, self.reconnect_delay)
    }

    /// REST history client for this API base
    pub fn http_history(&self) -> Result<HttpMessageHistory, HistoryError> {
        HttpMessageHistory::new(&self.api_url, self.http_timeout)
    }
}

fn parse_or<T>(key: &str, lookup: &impl Fn(&str) -> Option<String>, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, default = %default, "Invalid config value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.reconnect_policy(), ReconnectPolicy::default());
        assert_eq!(
            config.stream_url("abc"),
            "ws://127.0.0.1:8000/api/v1/chats/abc/stream"
        );
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("AGENT_CHAT_WS_URL", "wss://chat.example.com/"),
            ("AGENT_CHAT_API_URL", "https://chat.example.com"),
            ("AGENT_CHAT_MAX_RECONNECTS", "5"),
            ("AGENT_CHAT_RECONNECT_DELAY_MS", "250"),
            ("AGENT_CHAT_HTTP_TIMEOUT_SECS", " 7 "),
        ]);

        assert_eq!(
            config.stream_url("s-1"),
            "wss://chat.example.com/api/v1/chats/s-1/stream"
        );
        assert_eq!(config.api_url, "https://chat.example.com");
        assert_eq!(config.max_reconnects, 5);
        assert_eq!(config.reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.http_timeout, Duration::from_secs(7));

        let mut policy = config.reconnect_policy();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = config_from(&[
            ("AGENT_CHAT_MAX_RECONNECTS", "many"),
            ("AGENT_CHAT_RECONNECT_DELAY_MS", "-1"),
            ("AGENT_CHAT_WS_URL", "   "),
        ]);
        assert_eq!(config.max_reconnects, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.reconnect_delay, DEFAULT_BASE_DELAY);
        assert_eq!(config.ws_url, DEFAULT_WS_URL);
    }

    #[test]
    fn test_http_history_uses_api_base() {
        let config = config_from(&[("AGENT_CHAT_API_URL", "http://api:9000")]);
        let history = config.http_history().unwrap();
        assert_eq!(
            history.messages_url("s-9"),
            "http://api:9000/api/v1/chats/s-9/messages"
        );
    }
}
