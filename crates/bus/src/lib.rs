//! claw-bus: session event stream
//!
//! Everything a front end can observe about a running session flows through
//! here: assistant text, tool calls, tool results, auto-commits, and the one
//! terminal event that ends each user message.

use claw_provider::{ProviderError, ToolCall};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::trace;

/// Outcome class of a tool execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Ok,
    Error,
}

/// Product of executing one tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Call this result answers
    pub call_id: String,
    /// Tool that produced it
    pub tool: String,
    pub status: ToolStatus,
    pub output: String,
    /// Exit code, shell commands only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, tool: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            tool: tool.into(),
            status: ToolStatus::Ok,
            output: output.into(),
            exit_code: None,
        }
    }

    pub fn error(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool: tool.into(),
            status: ToolStatus::Error,
            output: output.into(),
            exit_code: None,
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }
}

/// Why a session stopped without a final answer
#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    IterationLimitExceeded { limit: u32 },
    UserCancelled,
    Provider(ProviderError),
    /// The session was already closed by an earlier abort
    SessionClosed,
    /// Broken internal invariant; should never reach users
    Internal(String),
}

impl AbortReason {
    /// Cancellation and the iteration cap are stops, not failures
    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            AbortReason::IterationLimitExceeded { .. } | AbortReason::UserCancelled
        )
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::IterationLimitExceeded { limit } => {
                write!(f, "iteration limit of {} turns exceeded", limit)
            }
            AbortReason::UserCancelled => write!(f, "cancelled by user"),
            AbortReason::Provider(err) => write!(f, "provider error: {}", err),
            AbortReason::SessionClosed => write!(f, "session is closed; start a new one"),
            AbortReason::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

/// Incremental session events, each tagged with the session id
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Narration or reasoning the model attached to a turn
    AssistantText { session_id: String, text: String },
    ToolCallIssued { session_id: String, call: ToolCall },
    ToolResultProduced { session_id: String, result: ToolResult },
    /// Commit made by the auto-commit policy
    AutoCommitted {
        session_id: String,
        commit: String,
        message: String,
    },
    /// Terminal: the model gave its final answer
    Finished {
        session_id: String,
        answer: String,
        iterations: u32,
    },
    /// Terminal: the session stopped early
    Aborted {
        session_id: String,
        reason: AbortReason,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::AssistantText { session_id, .. }
            | SessionEvent::ToolCallIssued { session_id, .. }
            | SessionEvent::ToolResultProduced { session_id, .. }
            | SessionEvent::AutoCommitted { session_id, .. }
            | SessionEvent::Finished { session_id, .. }
            | SessionEvent::Aborted { session_id, .. } => session_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::Finished { .. } | SessionEvent::Aborted { .. }
        )
    }
}

/// How one user message ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Finished { answer: String, iterations: u32 },
    Aborted(AbortReason),
}

impl Outcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, Outcome::Finished { .. })
    }
}

/// Create a connected sender/stream pair
pub fn event_channel() -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventStream { rx })
}

/// Producer side, owned by the session task
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSender {
    /// Deliver an event; a front end that stopped listening is not an error
    pub fn emit(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            trace!("◆ event receiver gone, dropping event");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, handed to the front end
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventStream {
    /// Next event, or `None` once the session task is done with this message
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Skip to the terminal event
    pub async fn outcome(mut self) -> Outcome {
        while let Some(event) = self.rx.recv().await {
            match event {
                SessionEvent::Finished {
                    answer, iterations, ..
                } => return Outcome::Finished { answer, iterations },
                SessionEvent::Aborted { reason, .. } => return Outcome::Aborted(reason),
                _ => {}
            }
        }
        Outcome::Aborted(AbortReason::Internal(
            "event stream closed before a terminal event".to_string(),
        ))
    }

    /// Gather every event up to and including the terminal one
    pub async fn collect(mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }
}
