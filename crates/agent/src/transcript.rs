//! Append-only conversation record for one session

use claw_provider::{Message, Role, ToolCall};
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranscriptError {
    #[error("{0} tool call(s) still waiting for results")]
    PendingCalls(usize),

    #[error("result for {got} but the next pending call is {expected}")]
    OutOfOrder { expected: String, got: String },

    #[error("result for {0} answers no pending call")]
    UnexpectedResult(String),

    #[error("assistant turn reuses call id {0}")]
    DuplicateCallId(String),
}

/// Ordered messages plus the calls still owed a result.
///
/// Every tool result must answer the oldest unanswered call; a new user or
/// assistant message is refused while any call is pending.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    pending: VecDeque<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Call ids issued but not yet answered, oldest first
    pub fn pending_calls(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> Result<(), TranscriptError> {
        self.ensure_settled()?;
        self.messages.push(Message::user(text));
        Ok(())
    }

    pub fn push_assistant(
        &mut self,
        text: impl Into<String>,
        calls: Vec<ToolCall>,
    ) -> Result<(), TranscriptError> {
        self.ensure_settled()?;
        for (i, call) in calls.iter().enumerate() {
            if calls[..i].iter().any(|earlier| earlier.id == call.id) {
                return Err(TranscriptError::DuplicateCallId(call.id.clone()));
            }
        }
        self.pending.extend(calls.iter().map(|c| c.id.clone()));
        self.messages.push(Message::assistant(text, calls));
        Ok(())
    }

    pub fn push_tool_result(
        &mut self,
        call_id: &str,
        output: impl Into<String>,
        is_error: bool,
    ) -> Result<(), TranscriptError> {
        match self.pending.front() {
            None => return Err(TranscriptError::UnexpectedResult(call_id.to_string())),
            Some(expected) if expected != call_id => {
                return Err(TranscriptError::OutOfOrder {
                    expected: expected.clone(),
                    got: call_id.to_string(),
                })
            }
            Some(_) => {}
        }
        self.pending.pop_front();
        self.messages
            .push(Message::tool_result(call_id, output, is_error));
        Ok(())
    }

    /// Last assistant message without tool calls
    pub fn last_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && m.tool_calls.is_empty())
            .map(|m| m.content.as_str())
    }

    fn ensure_settled(&self) -> Result<(), TranscriptError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(TranscriptError::PendingCalls(self.pending.len()))
        }
    }
}
