//! System prompt assembly for a coding session

use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Builds the system prompt once per session
pub struct ContextBuilder {
    root: PathBuf,
}

impl ContextBuilder {
    /// Project notes picked up from the root, if present
    pub const PROJECT_NOTES: &'static str = "CLAW.md";

    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Identity and rules, then project notes when the root has them
    pub async fn build_system_prompt(&self) -> String {
        let mut parts = vec![self.identity()];

        if let Some(notes) = self.load_project_notes().await {
            parts.push(format!("## Project notes ({})\n\n{}", Self::PROJECT_NOTES, notes));
        }

        parts.join("\n\n---\n\n")
    }

    fn identity(&self) -> String {
        let today = Local::now().format("%Y-%m-%d (%A)");
        let root = self.root.display();

        format!(
            r#"# claw

You are claw, an autonomous coding agent operating on a real codebase.
Fulfil the user's request by reading, searching, writing and modifying files.

## Capabilities
- Read files, list directories, search code
- Write new files, edit existing files (exact find-and-replace)
- Run shell commands (tests, builds, package installs)
- Create git commits

## Rules
1. Read relevant files before modifying them.
2. Make minimal, focused changes. Do not rewrite whole files unless necessary.
3. Verify your changes: re-read the file, run the tests if the project has them.
4. Follow the project's existing style.
5. If something is unclear, say so in your reply, but prefer acting autonomously.
6. When the task is complete, reply with a short summary and no tool calls.

## Project
Root: {root}
All file paths are relative to this root; paths outside it are rejected.

## Date
{today}"#
        )
    }

    async fn load_project_notes(&self) -> Option<String> {
        let path = self.root.join(Self::PROJECT_NOTES);
        if !path.is_file() {
            return None;
        }
        match tokio::fs::read_to_string(&path).await {
            Ok(content) if !content.trim().is_empty() => Some(content),
            Ok(_) => None,
            Err(e) => {
                debug!("failed to read {}: {}", path.display(), e);
                None
            }
        }
    }
}
