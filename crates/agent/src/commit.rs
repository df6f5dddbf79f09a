//! Auto-commit policy
//!
//! Commits made on the session's behalf after successful file mutations.
//! They go through the same executor as model-requested commits, so they
//! take the per-root lock, but they never enter the transcript.

use claw_bus::{EventSender, SessionEvent, ToolResult};
use claw_config::CommitPolicy;
use claw_provider::ToolCall;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::tools::git::{parse_commit_id, NOTHING_TO_COMMIT};
use crate::tools::{ToolContext, ToolRegistry};

/// Longest commit subject produced
pub const MAX_SUBJECT_CHARS: usize = 72;

/// A successful mutating call
#[derive(Debug, Clone, PartialEq)]
struct Mutation {
    tool: String,
    /// `path` argument, absent for shell commands
    path: Option<String>,
    summary: String,
}

impl Mutation {
    fn from_call(call: &ToolCall) -> Self {
        let arg = |key: &str| call.arguments.get(key).and_then(Value::as_str).map(str::to_string);
        let path = arg("path");
        let summary = match (&path, arg("command")) {
            (Some(p), _) => format!("{} {}", call.name, p),
            (None, Some(cmd)) => format!("{} `{}`", call.name, cmd),
            (None, None) => call.name.clone(),
        };
        Self {
            tool: call.name.clone(),
            path,
            summary,
        }
    }
}

/// Tracks mutations and commits according to a `CommitPolicy`
#[derive(Debug)]
pub struct AutoCommitter {
    policy: CommitPolicy,
    batch: Vec<Mutation>,
    task: Vec<Mutation>,
    sequence: u64,
}

impl AutoCommitter {
    pub fn new(policy: CommitPolicy) -> Self {
        Self {
            policy,
            batch: Vec::new(),
            task: Vec::new(),
            sequence: 0,
        }
    }

    pub fn policy(&self) -> CommitPolicy {
        self.policy
    }

    /// Note a finished call; only successful mutations count
    pub fn record(&mut self, registry: &ToolRegistry, call: &ToolCall, result: &ToolResult) {
        if self.policy == CommitPolicy::Off || result.is_error() || !registry.mutates(&call.name) {
            return;
        }
        let mutation = Mutation::from_call(call);
        self.batch.push(mutation.clone());
        self.task.push(mutation);
    }

    /// Mutations seen since the task started
    pub fn pending(&self) -> usize {
        self.task.len()
    }

    /// Forget everything recorded so far
    pub fn reset(&mut self) {
        self.batch.clear();
        self.task.clear();
    }

    /// After a tool batch: commit under `PerMutation`
    pub async fn after_batch(
        &mut self,
        registry: &ToolRegistry,
        ctx: &ToolContext,
        session_id: &str,
        events: &EventSender,
    ) -> Option<String> {
        let batch = std::mem::take(&mut self.batch);
        if self.policy != CommitPolicy::PerMutation || batch.is_empty() {
            return None;
        }
        self.task.clear();
        let joined = batch
            .iter()
            .map(|m| m.summary.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let message = subject(&format!("claw: {joined}"));
        self.commit(registry, ctx, session_id, events, message, &batch)
            .await
    }

    /// After a final answer: commit under `PerTask`
    pub async fn after_task(
        &mut self,
        answer: &str,
        registry: &ToolRegistry,
        ctx: &ToolContext,
        session_id: &str,
        events: &EventSender,
    ) -> Option<String> {
        let task = std::mem::take(&mut self.task);
        self.batch.clear();
        if self.policy != CommitPolicy::PerTask || task.is_empty() {
            return None;
        }
        let first = answer.lines().find(|l| !l.trim().is_empty()).unwrap_or("update");
        let message = subject(&format!("feat: {}", first.trim()));
        self.commit(registry, ctx, session_id, events, message, &task)
            .await
    }

    async fn commit(
        &mut self,
        registry: &ToolRegistry,
        ctx: &ToolContext,
        session_id: &str,
        events: &EventSender,
        message: String,
        mutations: &[Mutation],
    ) -> Option<String> {
        self.sequence += 1;
        let mut args = json!({ "message": message });
        if let Some(paths) = stage_paths(mutations) {
            args["paths"] = json!(paths);
        }
        let call = ToolCall::new(format!("auto-commit-{}", self.sequence), "git_commit", args);

        let result = registry.execute(&call, ctx).await;
        if result.is_error() {
            if result.output.contains(NOTHING_TO_COMMIT) {
                info!(session = %session_id, "auto-commit skipped: nothing to commit");
            } else {
                warn!(session = %session_id, "auto-commit failed: {}", result.output);
            }
            return None;
        }

        let commit = parse_commit_id(&result.output)?.to_string();
        info!(session = %session_id, commit = %commit, "◆ auto-committed: {}", message);
        events.emit(SessionEvent::AutoCommitted {
            session_id: session_id.to_string(),
            commit: commit.clone(),
            message,
        });
        Some(commit)
    }
}

/// Explicit paths when every mutation names a simple one; otherwise stage all
fn stage_paths(mutations: &[Mutation]) -> Option<String> {
    let mut paths: Vec<&str> = Vec::new();
    for m in mutations {
        let path = m.path.as_deref()?;
        if path.chars().any(char::is_whitespace) {
            return None;
        }
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        None
    } else {
        Some(paths.join(" "))
    }
}

/// Trim to a commit subject, on a char boundary
fn subject(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= MAX_SUBJECT_CHARS {
        return line.to_string();
    }
    let mut out: String = line.chars().take(MAX_SUBJECT_CHARS - 3).collect();
    out.push_str("...");
    out
}
