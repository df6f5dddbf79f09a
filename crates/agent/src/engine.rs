//! Session engine
//!
//! Starts sessions, each on its own task, and hands front ends a cloneable
//! handle. Messages sent to one session queue behind each other; sessions
//! share nothing but the per-root lock table.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use claw_bus::{event_channel, AbortReason, EventSender, EventStream, SessionEvent};
use claw_provider::{build_provider, Provider};

use crate::context::ContextBuilder;
use crate::locks::RootLocks;
use crate::session::{Session, SessionConfig};
use crate::tools::{ToolContext, ToolRegistry};
use crate::{AgentError, Result};

struct Job {
    text: String,
    events: EventSender,
}

/// Owns the shared lock table; clone freely
#[derive(Debug, Clone, Default)]
pub struct Engine {
    locks: RootLocks,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locks(&self) -> &RootLocks {
        &self.locks
    }

    /// Build the configured provider once and start a session with it
    pub async fn start_session(&self, config: SessionConfig) -> Result<SessionHandle> {
        let provider = build_provider(&config.provider)?;
        self.start_session_with_provider(config, provider).await
    }

    pub async fn start_session_with_provider(
        &self,
        config: SessionConfig,
        provider: Arc<dyn Provider>,
    ) -> Result<SessionHandle> {
        self.start_session_with_registry(config, provider, ToolRegistry::with_defaults())
            .await
    }

    pub async fn start_session_with_registry(
        &self,
        mut config: SessionConfig,
        provider: Arc<dyn Provider>,
        registry: ToolRegistry,
    ) -> Result<SessionHandle> {
        let root = canonical_root(&config.root).await?;
        config.root = root.clone();

        let id = Uuid::new_v4().to_string();
        let system_prompt = ContextBuilder::new(&root).build_system_prompt().await;
        let ctx = ToolContext::new(
            root.clone(),
            config.command_timeout_secs,
            self.locks.lock_for(&root),
        );
        let cancel = CancellationToken::new();

        info!(session = %id, root = %root.display(), provider = %provider.id(), "◆ session started");
        let session = Session::new(
            id.clone(),
            config,
            provider,
            registry,
            system_prompt,
            ctx,
            cancel.clone(),
        );

        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_session(session, rx));

        Ok(SessionHandle {
            id,
            root,
            jobs,
            cancel,
        })
    }
}

async fn canonical_root(root: &Path) -> Result<PathBuf> {
    let invalid = |reason: String| AgentError::InvalidRoot {
        path: root.to_path_buf(),
        reason,
    };
    let canonical = tokio::fs::canonicalize(root)
        .await
        .map_err(|e| invalid(e.to_string()))?;
    if !canonical.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }
    Ok(canonical)
}

async fn run_session(mut session: Session, mut jobs: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = jobs.recv().await {
        session.handle_message(&job.text, &job.events).await;
    }
    debug!(session = %session.id(), "session task exiting");
}

/// Front-end handle to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: String,
    root: PathBuf,
    jobs: mpsc::UnboundedSender<Job>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Canonical project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Queue a user message; the stream ends with `Finished` or `Aborted`
    pub fn send_user_message(&self, text: impl Into<String>) -> EventStream {
        let (events, stream) = event_channel();
        let job = Job {
            text: text.into(),
            events,
        };
        if let Err(mpsc::error::SendError(job)) = self.jobs.send(job) {
            job.events.emit(SessionEvent::Aborted {
                session_id: self.id.clone(),
                reason: AbortReason::SessionClosed,
            });
        }
        stream
    }

    /// Ask the session to stop at its next transition
    pub fn cancel(&self) {
        info!(session = %self.id, "cancellation requested");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The session task has exited
    pub fn is_closed(&self) -> bool {
        self.jobs.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claw_config::Config;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_root_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cfg = SessionConfig::from_config(&Config::default(), dir.path().join("missing"));
        cfg.provider.api_key = "k".into();
        let err = Engine::new().start_session(cfg).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidRoot { .. }));
    }

    #[tokio::test]
    async fn test_file_root_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "").unwrap();
        let mut cfg = SessionConfig::from_config(&Config::default(), &file);
        cfg.provider.api_key = "k".into();
        let err = Engine::new().start_session(cfg).await.unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_provider_error() {
        let dir = TempDir::new().unwrap();
        let cfg = SessionConfig::from_config(&Config::default(), dir.path());
        let err = Engine::new().start_session(cfg).await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
    }
}
