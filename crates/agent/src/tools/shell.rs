//! Shell command execution in the project root

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::output::head_tail;
use super::{Param, ParamKind, ToolArgs, ToolContext, ToolError, ToolOutput, ToolTrait};

/// Output larger than this is trimmed to head and tail
pub const MAX_OUTPUT_BYTES: usize = 8000;
const HEAD_BYTES: usize = 4000;
const TAIL_BYTES: usize = 2000;

pub struct RunCommandTool;

#[async_trait]
impl ToolTrait for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the project directory. Use for tests, builds, installs and git inspection."
    }

    fn params(&self) -> &[Param] {
        const PARAMS: &[Param] = &[
            Param::required("command", ParamKind::String, "Shell command to execute"),
            Param::optional("timeout", ParamKind::Integer, "Timeout in seconds").with_range(1, 600),
        ];
        PARAMS
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let command = args.required_str("command")?;
        if command.trim().is_empty() {
            return Err(ToolError::Validation("command must not be empty".to_string()));
        }
        let secs = args
            .int("timeout")
            .map(|t| t as u64)
            .unwrap_or(ctx.command_timeout_secs);

        debug!("◆ running `{}` (timeout {}s)", command, secs);
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Execution(format!("failed to start command: {e}")))?;

        let output = match tokio::time::timeout(Duration::from_secs(secs), child.wait_with_output())
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!("command timed out after {}s: {}", secs, command);
                return Err(ToolError::Timeout { secs });
            }
        };

        // Killed by a signal when there is no code
        let code = output.status.code().unwrap_or(-1);
        Ok(ToolOutput::ok(format_output(&output.stdout, &output.stderr, code)).with_exit_code(code))
    }
}

/// Status line, then stdout, then stderr, trimmed to size
pub fn format_output(stdout: &[u8], stderr: &[u8], code: i32) -> String {
    let mut body = String::from_utf8_lossy(stdout).into_owned();
    if !stderr.is_empty() {
        if !body.is_empty() && !body.ends_with('\n') {
            body.push('\n');
        }
        body.push_str("STDERR:\n");
        body.push_str(&String::from_utf8_lossy(stderr));
    }
    if body.len() > MAX_OUTPUT_BYTES {
        body = head_tail(&body, HEAD_BYTES, TAIL_BYTES);
    }

    let status = if code == 0 {
        "[OK] exit code 0".to_string()
    } else {
        format!("[FAILED] exit code {code}")
    };
    if body.is_empty() {
        status
    } else {
        format!("{status}\n{body}")
    }
}
