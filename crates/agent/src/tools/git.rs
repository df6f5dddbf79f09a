//! Version-control commit tool

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{Param, ParamKind, ToolArgs, ToolContext, ToolError, ToolOutput, ToolTrait};

const GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Marker the committer looks for in a successful result
pub const COMMITTED_PREFIX: &str = "OK: committed ";

/// Message used when nothing is staged
pub const NOTHING_TO_COMMIT: &str = "nothing to commit";

async fn git(root: &Path, args: &[&str], paths: &[PathBuf]) -> Result<Output, ToolError> {
    let mut cmd = Command::new("git");
    cmd.args(args)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if !paths.is_empty() {
        cmd.arg("--").args(paths);
    }

    match tokio::time::timeout(GIT_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(ToolError::Execution(format!("failed to run git: {e}"))),
        Err(_) => Err(ToolError::Timeout {
            secs: GIT_TIMEOUT.as_secs(),
        }),
    }
}

fn git_failure(step: &str, output: &Output) -> ToolError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let detail = if stderr.trim().is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.trim().to_string()
    };
    ToolError::Execution(format!("git {step} failed: {detail}"))
}

/// Short id of the commit in a `git_commit` result
pub fn parse_commit_id(output: &str) -> Option<&str> {
    output
        .strip_prefix(COMMITTED_PREFIX)?
        .split(':')
        .next()
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

pub struct GitCommitTool;

#[async_trait]
impl ToolTrait for GitCommitTool {
    fn name(&self) -> &str {
        "git_commit"
    }

    fn description(&self) -> &str {
        "Stage changes and create a git commit. Stages the listed paths, or all changes when none are given. Fails if there is nothing to commit."
    }

    fn params(&self) -> &[Param] {
        const PARAMS: &[Param] = &[
            Param::required("message", ParamKind::String, "Commit message"),
            Param::optional(
                "paths",
                ParamKind::PathList,
                "Whitespace-separated paths to stage (default: everything)",
            ),
        ];
        PARAMS
    }

    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let message = args.required_str("message")?;
        if message.trim().is_empty() {
            return Err(ToolError::Validation("message must not be empty".to_string()));
        }
        let root = ctx.root.as_path();
        // the root may be a subdirectory of the repository; never stage above it
        let scope = match args.paths("paths") {
            [] => vec![root.to_path_buf()],
            listed => listed.to_vec(),
        };
        let paths = scope.as_slice();

        let probe = git(root, &["rev-parse", "--git-dir"], &[]).await?;
        if !probe.status.success() {
            return Err(ToolError::Execution(format!(
                "{} is not a git repository",
                root.display()
            )));
        }

        let add = git(root, &["add", "-A"], paths).await?;
        if !add.status.success() {
            return Err(git_failure("add", &add));
        }

        let staged = git(root, &["diff", "--cached", "--quiet"], paths).await?;
        match staged.status.code() {
            Some(0) => return Err(ToolError::Execution(NOTHING_TO_COMMIT.to_string())),
            Some(1) => {}
            _ => return Err(git_failure("diff", &staged)),
        }

        debug!("◆ committing {} path(s)", paths.len());
        let commit = git(root, &["commit", "-q", "-m", message], paths).await?;
        if !commit.status.success() {
            return Err(git_failure("commit", &commit));
        }

        let head = git(root, &["rev-parse", "--short", "HEAD"], &[]).await?;
        if !head.status.success() {
            return Err(git_failure("rev-parse", &head));
        }
        let id = String::from_utf8_lossy(&head.stdout).trim().to_string();
        let subject = message.lines().next().unwrap_or_default();
        Ok(ToolOutput::ok(format!("{COMMITTED_PREFIX}{id}: {subject}")))
    }
}
