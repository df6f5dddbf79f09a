//! Text rendering shared by the front ends

use std::collections::VecDeque;

use claw_bus::{Outcome, SessionEvent, ToolResult};
use claw_provider::ToolCall;

/// Longest `→ tool(args)` line the console prints
pub const TOOL_LINE_CHARS: usize = 200;

/// Result lines shown before the remainder count
pub const PREVIEW_LINES: usize = 10;

/// Visible characters per Telegram message; the API caps at 4096
pub const TELEGRAM_LIMIT: usize = 4000;

/// Tool steps kept in a Telegram progress message
pub const STEP_HISTORY: usize = 5;

const STEP_CHARS: usize = 100;
const ANSWER_CHARS: usize = 3000;
const SHOWN_COMMITS: usize = 3;
const TRIM_MARKER: &str = "\n\n...(truncated)...\n\n";

/// Cut to `max` characters, ending in `...` when anything was dropped
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Keep the head and tail of `text` so that it fits in `limit` characters
pub fn trim_middle(text: &str, limit: usize) -> String {
    let total = text.chars().count();
    if total <= limit {
        return text.to_string();
    }
    let head_chars = limit / 2;
    let tail_chars = limit * 3 / 8;
    let byte_at = |n: usize| {
        text.char_indices()
            .nth(n)
            .map(|(i, _)| i)
            .unwrap_or(text.len())
    };
    let head_end = byte_at(head_chars);
    let tail_start = byte_at(total - tail_chars);
    format!("{}{}{}", &text[..head_end], TRIM_MARKER, &text[tail_start..])
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `name(args)` with the arguments as compact JSON
pub fn call_summary(call: &ToolCall) -> String {
    format!("{}({})", call.name, call.arguments)
}

pub fn tool_call_line(call: &ToolCall) -> String {
    truncate_chars(&format!("→ {}", call_summary(call)), TOOL_LINE_CHARS)
}

/// First lines of a tool result plus a count of what was left out
pub fn result_preview(result: &ToolResult) -> String {
    let lines: Vec<&str> = result.output.lines().collect();
    let mut preview = lines
        .iter()
        .take(PREVIEW_LINES)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    if lines.len() > PREVIEW_LINES {
        preview.push_str(&format!("\n... ({} more lines)", lines.len() - PREVIEW_LINES));
    }
    preview
}

/// One-line verdict for a finished or aborted message
pub fn outcome_text(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Finished { answer, .. } => answer.clone(),
        Outcome::Aborted(reason) => format!("Aborted: {}", reason),
    }
}

/// Running summary of a task for an editable chat message
#[derive(Debug, Default)]
pub struct TaskProgress {
    steps: VecDeque<String>,
    total_steps: usize,
    commits: VecDeque<String>,
    outcome: Option<Outcome>,
}

impl TaskProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in an event; returns whether the rendering changed
    pub fn observe(&mut self, event: &SessionEvent) -> bool {
        match event {
            SessionEvent::AssistantText { .. } => false,
            SessionEvent::ToolCallIssued { call, .. } => {
                self.steps
                    .push_back(format!("🔧 {}", truncate_chars(&call_summary(call), STEP_CHARS)));
                if self.steps.len() > STEP_HISTORY {
                    self.steps.pop_front();
                }
                self.total_steps += 1;
                true
            }
            SessionEvent::ToolResultProduced { result, .. } => {
                if !result.is_error() {
                    return false;
                }
                if let Some(last) = self.steps.back_mut() {
                    last.push_str(" ✗");
                }
                true
            }
            SessionEvent::AutoCommitted {
                commit, message, ..
            } => {
                self.commits.push_back(format!("{} {}", commit, message));
                if self.commits.len() > SHOWN_COMMITS {
                    self.commits.pop_front();
                }
                true
            }
            SessionEvent::Finished {
                answer, iterations, ..
            } => {
                self.outcome = Some(Outcome::Finished {
                    answer: answer.clone(),
                    iterations: *iterations,
                });
                true
            }
            SessionEvent::Aborted { reason, .. } => {
                self.outcome = Some(Outcome::Aborted(reason.clone()));
                true
            }
        }
    }

    pub fn steps(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(String::as_str)
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.outcome.is_some()
    }

    /// HTML body for Telegram; only the answer is ever trimmed
    pub fn render_html(&self) -> String {
        let mut parts = Vec::new();

        if !self.steps.is_empty() {
            let mut section = String::from("<b>Steps:</b>\n");
            let hidden = self.total_steps - self.steps.len();
            if hidden > 0 {
                section.push_str(&format!("... {} earlier\n", hidden));
            }
            let steps: Vec<String> = self.steps.iter().map(|s| escape_html(s)).collect();
            section.push_str(&steps.join("\n"));
            parts.push(section);
        }

        for commit in &self.commits {
            parts.push(format!("📝 committed <code>{}</code>", escape_html(commit)));
        }

        parts.push(match &self.outcome {
            None => "🔄 Working...".to_string(),
            Some(Outcome::Finished { answer, .. }) => format!(
                "✅ <b>Done:</b> {}",
                escape_html(&trim_middle(answer, ANSWER_CHARS))
            ),
            Some(Outcome::Aborted(reason)) => format!(
                "❌ <b>Stopped:</b> {}",
                escape_html(&trim_middle(&reason.to_string(), ANSWER_CHARS))
            ),
        });

        parts.join("\n\n")
    }
}
