//! agent-chat - terminal client for one agentic chat session
//!
//! Prints the assistant's streamed text and completed tool calls as they
//! arrive and sends each stdin line as a user message. `/reconnect` and
//! `/clear` map to the session's explicit reconnect and error dismissal.

use agent_chat_client::aggregator::{SessionError, ToolCallStatus};
use agent_chat_client::transport::ConnectionStatus;
use agent_chat_client::{ChatSession, ClientConfig, SessionSnapshot};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they don't interleave with the transcript
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_chat_client=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let session_id = std::env::args()
        .nth(1)
        .ok_or("usage: agent-chat <session-id>")?;

    let config = ClientConfig::from_env();
    tracing::info!(
        ws_url = %config.ws_url,
        api_url = %config.api_url,
        max_reconnects = config.max_reconnects,
        "Configuration loaded"
    );

    let session = ChatSession::open_remote(&config, session_id)?;

    let printer = tokio::spawn(print_transcript(session.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        match text {
            "" => {}
            "/reconnect" => session.reconnect(),
            "/clear" => session.clear_error(),
            _ => {
                if let Err(e) = session.send(text) {
                    eprintln!("! {e}");
                }
            }
        }
    }

    session.shutdown().await;
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Printer task failed");
    }
    Ok(())
}

async fn print_transcript(mut rx: watch::Receiver<SessionSnapshot>) {
    let mut printer = TranscriptPrinter::default();
    loop {
        let snapshot = rx.borrow_and_update().clone();
        let written = printer.update(&snapshot, &mut std::io::stdout().lock());
        if let Err(e) = written {
            tracing::warn!(error = %e, "Failed to write transcript");
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Turns successive snapshots into append-only terminal output
#[derive(Debug)]
struct TranscriptPrinter {
    status: ConnectionStatus,
    was_streaming: bool,
    printed_text: String,
    printed_tools: usize,
    error: Option<SessionError>,
}

impl Default for TranscriptPrinter {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Idle,
            was_streaming: false,
            printed_text: String::new(),
            printed_tools: 0,
            error: None,
        }
    }
}

impl TranscriptPrinter {
    fn update(&mut self, snapshot: &SessionSnapshot, out: &mut impl Write) -> std::io::Result<()> {
        if snapshot.status != self.status {
            self.status = snapshot.status;
            writeln!(out, "[{:?}]", snapshot.status)?;
        }

        let text = snapshot.streaming_message();
        let restarted = (snapshot.is_streaming() && !self.was_streaming)
            || !text.starts_with(self.printed_text.as_str())
            || snapshot.tool_calls().len() < self.printed_tools;
        if restarted && (snapshot.is_streaming() || !text.is_empty()) {
            self.printed_text.clear();
            self.printed_tools = 0;
            write!(out, "\nassistant> ")?;
        }

        if let Some(delta) = text.get(self.printed_text.len()..).filter(|d| !d.is_empty()) {
            write!(out, "{delta}")?;
            self.printed_text.push_str(delta);
        }

        // Print tool calls in order, each once it has completed
        let tools = snapshot.tool_calls();
        while let Some(call) = tools
            .get(self.printed_tools)
            .filter(|call| call.status == ToolCallStatus::Complete)
        {
            let outcome = if call.is_error == Some(true) { "failed" } else { "ok" };
            writeln!(out, "\n  [{}] {} {outcome}", call.tool_name, call.args)?;
            self.printed_tools += 1;
        }

        if self.was_streaming && !snapshot.is_streaming() {
            writeln!(out)?;
        }
        self.was_streaming = snapshot.is_streaming();

        if snapshot.error != self.error {
            if let Some(error) = &snapshot.error {
                writeln!(out, "! {}", error.message)?;
            }
            self.error.clone_from(&snapshot.error);
        }

        out.flush()
    }
}
