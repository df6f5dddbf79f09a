//! Console channel
//!
//! Reads tasks line by line and prints session events as they arrive.
//! Generic over the reader and writer so tests can drive it in memory.

use async_trait::async_trait;
use std::io::{BufRead, Write};
use tracing::debug;

use claw_agent::SessionHandle;
use claw_bus::{AbortReason, Outcome, SessionEvent};

use crate::render::{result_preview, tool_call_line};
use crate::{Channel, Result, SessionLauncher};

pub struct ConsoleChannel<R, W> {
    launcher: SessionLauncher,
    input: R,
    output: W,
    interrupts: bool,
}

impl<R, W> ConsoleChannel<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    pub fn new(launcher: SessionLauncher, input: R, output: W) -> Self {
        Self {
            launcher,
            input,
            output,
            interrupts: false,
        }
    }

    /// Cancel the running task on Ctrl-C instead of leaving it to the OS
    pub fn with_interrupts(mut self) -> Self {
        self.interrupts = true;
        self
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    /// Run one task in a fresh session
    pub async fn run_task(&mut self, task: &str) -> Result<Outcome> {
        let handle = self.launcher.launch().await?;
        writeln!(self.output, "◆ Project: {}", handle.root().display())?;
        self.drive(&handle, task).await
    }

    /// Interactive loop over one session until `exit`, `quit` or end of input
    pub async fn chat(&mut self) -> Result<()> {
        let mut handle = self.launcher.launch().await?;
        writeln!(
            self.output,
            "◆ Interactive mode (type 'exit' to quit, '/new' for a fresh session)"
        )?;
        writeln!(self.output, "◆ Project: {}", handle.root().display())?;
        writeln!(self.output, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;

        loop {
            write!(self.output, "◆ ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                break;
            }

            let text = line.trim();
            match text {
                "" => continue,
                "exit" | "quit" => break,
                "/new" => {
                    handle = self.launcher.launch().await?;
                    writeln!(self.output, "Started a new session.")?;
                    continue;
                }
                _ => {}
            }

            let text = text.to_string();
            if let Outcome::Aborted(_) = self.drive(&handle, &text).await? {
                handle = self.launcher.launch().await?;
                writeln!(self.output, "Session closed; started a new one.")?;
            }
        }

        writeln!(self.output, "Bye.")?;
        Ok(())
    }

    async fn drive(&mut self, handle: &SessionHandle, text: &str) -> Result<Outcome> {
        let mut stream = handle.send_user_message(text);

        loop {
            let event = if self.interrupts && !handle.is_cancelled() {
                tokio::select! {
                    event = stream.recv() => event,
                    _ = tokio::signal::ctrl_c() => {
                        writeln!(self.output, "^C cancelling...")?;
                        handle.cancel();
                        continue;
                    }
                }
            } else {
                stream.recv().await
            };

            let Some(event) = event else {
                debug!(session = %handle.id(), "event stream ended early");
                return Ok(Outcome::Aborted(AbortReason::Internal(
                    "event stream closed before a terminal event".to_string(),
                )));
            };

            self.render(&event)?;
            match event {
                SessionEvent::Finished {
                    answer, iterations, ..
                } => return Ok(Outcome::Finished { answer, iterations }),
                SessionEvent::Aborted { reason, .. } => return Ok(Outcome::Aborted(reason)),
                _ => {}
            }
        }
    }

    fn render(&mut self, event: &SessionEvent) -> std::io::Result<()> {
        let out = &mut self.output;
        match event {
            SessionEvent::AssistantText { text, .. } => writeln!(out, "{}", text.trim()),
            SessionEvent::ToolCallIssued { call, .. } => writeln!(out, "  {}", tool_call_line(call)),
            SessionEvent::ToolResultProduced { result, .. } => {
                let mark = if result.is_error() { "✗" } else { "✓" };
                let preview = result_preview(result);
                if preview.trim().is_empty() {
                    return writeln!(out, "    {} (no output)", mark);
                }
                for (i, line) in preview.lines().enumerate() {
                    if i == 0 {
                        writeln!(out, "    {} {}", mark, line)?;
                    } else {
                        writeln!(out, "      {}", line)?;
                    }
                }
                Ok(())
            }
            SessionEvent::AutoCommitted {
                commit, message, ..
            } => writeln!(out, "  📝 committed {}: {}", commit, message),
            SessionEvent::Finished { answer, .. } => writeln!(out, "\n◆ {}\n", answer),
            SessionEvent::Aborted { reason, .. } => writeln!(out, "\n✗ Aborted: {}\n", reason),
        }
    }
}

#[async_trait]
impl<R, W> Channel for ConsoleChannel<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn name(&self) -> &str {
        "console"
    }

    async fn start(&mut self) -> Result<()> {
        self.chat().await
    }
}
