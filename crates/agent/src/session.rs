//! Session state machine
//!
//! One session drives the model through a task as an explicit loop over
//! `LoopState`. Turns are strictly sequential; cancellation and the
//! iteration cap are checked at the top of every transition.

use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use claw_bus::{AbortReason, EventSender, Outcome, SessionEvent, ToolResult};
use claw_config::{CommitPolicy, Config};
use claw_provider::{
    ModelLimits, ModelTurn, Provider, ProviderError, ProviderSettings, ToolCall, ToolSpec,
    TurnRequest,
};

use crate::commit::AutoCommitter;
use crate::tools::{ToolContext, ToolRegistry};
use crate::transcript::{Transcript, TranscriptError};

/// Result text for calls skipped because the session was cancelled
pub const CANCELLED_OUTPUT: &str = "cancelled before execution";

/// Validated inputs for one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Working-directory root; canonicalized when the session starts
    pub root: PathBuf,
    pub provider: ProviderSettings,
    pub model: String,
    pub limits: ModelLimits,
    /// Model turns allowed per user message
    pub max_iterations: u32,
    /// Default `run_command` timeout
    pub command_timeout_secs: u64,
    pub commit_policy: CommitPolicy,
}

impl SessionConfig {
    pub fn from_config(config: &Config, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            provider: ProviderSettings::from(&config.llm),
            model: config.llm.model.clone(),
            limits: ModelLimits {
                max_tokens: config.llm.max_tokens,
                temperature: config.llm.temperature,
                context_window: config.llm.context_window,
            },
            max_iterations: config.project.max_iterations,
            command_timeout_secs: config.project.command_timeout_secs,
            commit_policy: config.project.effective_commit_policy(),
        }
    }
}

/// Where the loop is
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    AwaitingUserInput,
    RequestingModel,
    ExecutingTools(Vec<ToolCall>),
    Done(String),
    Aborted(AbortReason),
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Done(_) | LoopState::Aborted(_))
    }
}

pub struct Session {
    id: String,
    config: SessionConfig,
    provider: Arc<dyn Provider>,
    registry: ToolRegistry,
    tool_specs: Vec<ToolSpec>,
    transcript: Transcript,
    system_prompt: String,
    state: LoopState,
    cancel: CancellationToken,
    ctx: ToolContext,
    committer: AutoCommitter,
    closed: bool,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        config: SessionConfig,
        provider: Arc<dyn Provider>,
        registry: ToolRegistry,
        system_prompt: String,
        ctx: ToolContext,
        cancel: CancellationToken,
    ) -> Self {
        let tool_specs = registry.specs();
        let committer = AutoCommitter::new(config.commit_policy);
        Self {
            id: id.into(),
            config,
            provider,
            registry,
            tool_specs,
            transcript: Transcript::new(),
            system_prompt,
            state: LoopState::AwaitingUserInput,
            cancel,
            ctx,
            committer,
            closed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one user message to a final answer or an abort
    pub async fn handle_message(&mut self, text: &str, events: &EventSender) -> Outcome {
        if self.closed {
            debug!(session = %self.id, "message for closed session");
            return self.emit_abort(events, AbortReason::SessionClosed);
        }

        info!(session = %self.id, "◆ new task: {}", preview(text));
        self.committer.reset();
        self.state = match self.transcript.push_user(text) {
            Ok(()) => LoopState::RequestingModel,
            Err(e) => internal(e),
        };
        let mut iterations: u32 = 0;

        loop {
            let state = std::mem::replace(&mut self.state, LoopState::AwaitingUserInput);
            self.state = match state {
                LoopState::RequestingModel => self.request_model(&mut iterations, events).await,
                LoopState::ExecutingTools(calls) => self.execute_tools(calls, events).await,
                LoopState::Done(answer) => {
                    self.committer
                        .after_task(&answer, &self.registry, &self.ctx, &self.id, events)
                        .await;
                    info!(session = %self.id, iterations, "◆ task finished");
                    events.emit(SessionEvent::Finished {
                        session_id: self.id.clone(),
                        answer: answer.clone(),
                        iterations,
                    });
                    self.state = LoopState::AwaitingUserInput;
                    return Outcome::Finished { answer, iterations };
                }
                LoopState::Aborted(reason) => {
                    return self.emit_abort(events, reason);
                }
                LoopState::AwaitingUserInput => {
                    internal("loop reached AwaitingUserInput mid-task")
                }
            };
        }
    }

    async fn request_model(&mut self, iterations: &mut u32, events: &EventSender) -> LoopState {
        if self.cancel.is_cancelled() {
            return LoopState::Aborted(AbortReason::UserCancelled);
        }
        if *iterations >= self.config.max_iterations {
            warn!(session = %self.id, limit = self.config.max_iterations, "iteration limit reached");
            return LoopState::Aborted(AbortReason::IterationLimitExceeded {
                limit: self.config.max_iterations,
            });
        }
        *iterations += 1;
        debug!(session = %self.id, iteration = *iterations, "requesting model turn");

        let request = TurnRequest {
            model: self.config.model.clone(),
            system: self.system_prompt.clone(),
            messages: self.transcript.messages().to_vec(),
            tools: self.tool_specs.clone(),
            limits: self.config.limits,
        };

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            response = self.provider.send(request) => Some(response),
        };

        let response = match response {
            None => return LoopState::Aborted(AbortReason::UserCancelled),
            Some(Err(e)) => {
                error!(session = %self.id, provider = %self.provider.id(), "model turn failed: {}", e);
                return LoopState::Aborted(AbortReason::Provider(e));
            }
            Some(Ok(response)) => response,
        };
        debug!(
            session = %self.id,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "model turn received"
        );

        match response.turn {
            ModelTurn::Final { text } => match self.transcript.push_assistant(text.clone(), Vec::new()) {
                Ok(()) => LoopState::Done(text),
                Err(e) => internal(e),
            },
            ModelTurn::ToolCalls { text, calls } => {
                if let Some(ref narration) = text {
                    events.emit(SessionEvent::AssistantText {
                        session_id: self.id.clone(),
                        text: narration.clone(),
                    });
                }
                match self
                    .transcript
                    .push_assistant(text.unwrap_or_default(), calls.clone())
                {
                    Ok(()) => LoopState::ExecutingTools(calls),
                    Err(e @ TranscriptError::DuplicateCallId(_)) => {
                        error!(session = %self.id, "model broke the turn contract: {}", e);
                        LoopState::Aborted(AbortReason::Provider(ProviderError::MalformedResponse(
                            e.to_string(),
                        )))
                    }
                    Err(e) => internal(e),
                }
            }
        }
    }

    async fn execute_tools(&mut self, calls: Vec<ToolCall>, events: &EventSender) -> LoopState {
        for (index, call) in calls.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(session = %self.id, skipped = calls.len() - index, "cancelled before tool execution");
                for skipped in &calls[index..] {
                    let result = ToolResult::error(&skipped.id, &skipped.name, CANCELLED_OUTPUT);
                    if let Err(e) = self.append_result(result, events) {
                        return internal(e);
                    }
                }
                return LoopState::Aborted(AbortReason::UserCancelled);
            }

            events.emit(SessionEvent::ToolCallIssued {
                session_id: self.id.clone(),
                call: call.clone(),
            });
            let result = self.registry.execute(call, &self.ctx).await;
            self.committer.record(&self.registry, call, &result);
            if let Err(e) = self.append_result(result, events) {
                return internal(e);
            }
        }

        self.committer
            .after_batch(&self.registry, &self.ctx, &self.id, events)
            .await;
        LoopState::RequestingModel
    }

    fn append_result(&mut self, result: ToolResult, events: &EventSender) -> Result<(), TranscriptError> {
        self.transcript
            .push_tool_result(&result.call_id, result.output.clone(), result.is_error())?;
        events.emit(SessionEvent::ToolResultProduced {
            session_id: self.id.clone(),
            result,
        });
        Ok(())
    }

    /// Close the session and report why
    fn emit_abort(&mut self, events: &EventSender, reason: AbortReason) -> Outcome {
        if reason.is_failure() {
            warn!(session = %self.id, "◆ session aborted: {}", reason);
        } else {
            info!(session = %self.id, "◆ session stopped: {}", reason);
        }
        self.closed = true;
        self.state = LoopState::Aborted(reason.clone());
        events.emit(SessionEvent::Aborted {
            session_id: self.id.clone(),
            reason: reason.clone(),
        });
        Outcome::Aborted(reason)
    }
}

fn internal(e: impl std::fmt::Display) -> LoopState {
    LoopState::Aborted(AbortReason::Internal(e.to_string()))
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(80).collect();
    if text.chars().count() > 80 {
        out.push_str("...");
    }
    out
}
