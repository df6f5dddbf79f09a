//! claw-agent: orchestration core
//!
//! Transcript, tool registry and executor, per-root locks, and the session
//! state machine that drives a model through a coding task.

use std::path::PathBuf;
use thiserror::Error;

pub mod commit;
pub mod context;
pub mod engine;
pub mod locks;
pub mod session;
pub mod tools;
pub mod transcript;

pub use commit::AutoCommitter;
pub use context::ContextBuilder;
pub use engine::{Engine, SessionHandle};
pub use locks::RootLocks;
pub use session::{LoopState, Session, SessionConfig};
pub use tools::{ToolContext, ToolError, ToolRegistry, ToolTrait};
pub use transcript::{Transcript, TranscriptError};

/// Session-level failures
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("invalid project root {path}: {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("session {0} is closed")]
    SessionClosed(String),

    #[error(transparent)]
    Provider(#[from] claw_provider::ProviderError),

    #[error(transparent)]
    Transcript(#[from] TranscriptError),
}

pub type Result<T> = std::result::Result<T, AgentError>;
