//! Tool registry and executor
//!
//! A fixed set of tools, each declaring a parameter schema. The registry
//! validates every call before the tool body runs and turns every outcome,
//! success or failure, into a `ToolResult` the model can read.

pub mod filesystem;
pub mod git;
pub mod output;
pub mod path_utils;
pub mod schema;
pub mod search;
pub mod shell;

pub use filesystem::{EditFileTool, ListDirTool, ReadFileTool, WriteFileTool};
pub use git::GitCommitTool;
pub use schema::{Param, ParamKind, ToolArgs};
pub use search::SearchCodeTool;
pub use shell::RunCommandTool;

use async_trait::async_trait;
use claw_bus::ToolResult;
use claw_provider::{ToolCall, ToolSpec};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

use crate::locks::RootLock;

/// Largest tool output handed back to the model
pub const MAX_RESULT_BYTES: usize = 16_000;

/// Tool failures, split into validation and execution classes
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    Validation(String),

    #[error("path '{path}' is outside the project root {root}")]
    PathEscape { path: String, root: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Execution(String),

    #[error("timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Rejected before the tool body ran
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ToolError::UnknownTool(_) | ToolError::Validation(_) | ToolError::PathEscape { .. }
        )
    }
}

/// What a tool body produced
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    pub exit_code: Option<i32>,
    /// Ran to completion but reports failure (non-zero exit)
    pub failed: bool,
}

impl ToolOutput {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exit_code: None,
            failed: false,
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self.failed = code != 0;
        self
    }
}

/// Per-session execution environment
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Canonical project root
    pub root: PathBuf,
    /// Default `run_command` timeout
    pub command_timeout_secs: u64,
    /// Shared with every session on the same root
    pub lock: RootLock,
}

impl ToolContext {
    pub fn new(root: PathBuf, command_timeout_secs: u64, lock: RootLock) -> Self {
        Self {
            root,
            command_timeout_secs,
            lock,
        }
    }
}

#[async_trait]
pub trait ToolTrait: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn params(&self) -> &[Param];

    /// Changes files in the working tree
    fn mutates(&self) -> bool {
        false
    }

    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> Result<ToolOutput, ToolError>;
}

pub fn to_tool_spec(tool: &dyn ToolTrait) -> ToolSpec {
    ToolSpec {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: schema::to_json_schema(tool.params()),
    }
}

type BoxedTool = Box<dyn ToolTrait>;

/// Tools in declaration order
pub struct ToolRegistry {
    tools: Vec<BoxedTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// The full coding tool set
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ReadFileTool);
        registry.register(ListDirTool);
        registry.register(SearchCodeTool);
        registry.register(WriteFileTool);
        registry.register(EditFileTool);
        registry.register(RunCommandTool);
        registry.register(GitCommitTool);
        registry
    }

    /// Add a tool, replacing any tool with the same name in place
    pub fn register<T: ToolTrait + 'static>(&mut self, tool: T) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(index) => self.tools[index] = Box::new(tool),
            None => self.tools.push(Box::new(tool)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn ToolTrait> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| to_tool_spec(t.as_ref())).collect()
    }

    pub fn mutates(&self, name: &str) -> bool {
        self.get(name).map(|t| t.mutates()).unwrap_or(false)
    }

    /// Resolve the tool and check arguments without running anything
    pub fn validate(
        &self,
        call: &ToolCall,
        ctx: &ToolContext,
    ) -> Result<(&dyn ToolTrait, ToolArgs), ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        let args = schema::validate(tool.params(), &call.arguments, &ctx.root)?;
        Ok((tool, args))
    }

    /// Take the root lock, validate, run, and package the result.
    ///
    /// Paths are resolved under the lock so another session on the same root
    /// cannot swap a component between the check and the use.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let outcome = {
            let _guard = ctx.lock.lock().await;
            let (tool, args) = match self.validate(call, ctx) {
                Ok(found) => found,
                Err(e) => {
                    warn!(tool = %call.name, call_id = %call.id, "rejected tool call: {}", e);
                    return ToolResult::error(&call.id, &call.name, e.to_string());
                }
            };
            debug!(tool = %call.name, call_id = %call.id, "◆ executing tool");
            tool.execute(&args, ctx).await
        };

        match outcome {
            Ok(out) => {
                let text = output::cap_bytes(&out.text, MAX_RESULT_BYTES);
                let mut result = if out.failed {
                    ToolResult::error(&call.id, &call.name, text)
                } else {
                    ToolResult::ok(&call.id, &call.name, text)
                };
                result.exit_code = out.exit_code;
                result
            }
            Err(e) => {
                debug!(tool = %call.name, call_id = %call.id, "tool failed: {}", e);
                ToolResult::error(&call.id, &call.name, e.to_string())
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
