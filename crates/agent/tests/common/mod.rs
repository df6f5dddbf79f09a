//! Shared fixtures for session tests

#![allow(dead_code)]

use async_trait::async_trait;
use claw_agent::SessionConfig;
use claw_config::CommitPolicy;
use claw_provider::{
    ModelLimits, ModelResponse, ModelTurn, Provider, ProviderError, ProviderSettings, Result,
    ToolCall, TurnRequest, Usage,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Plays back a fixed list of turns and records every request
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<Result<ModelTurn>>>,
    requests: Mutex<Vec<TurnRequest>>,
    delay: Duration,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<Result<ModelTurn>>) -> Arc<Self> {
        Self::with_delay(turns, Duration::ZERO)
    }

    pub fn with_delay(turns: Vec<Result<ModelTurn>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
            delay,
        })
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn send(&self, request: TurnRequest) -> Result<ModelResponse> {
        self.requests.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.turns.lock().unwrap().pop_front();
        match next {
            Some(turn) => turn.map(|turn| ModelResponse {
                turn,
                usage: Usage::default(),
            }),
            None => Err(ProviderError::MalformedResponse(
                "script exhausted".to_string(),
            )),
        }
    }

    fn id(&self) -> String {
        "scripted".to_string()
    }
}

pub fn final_text(text: &str) -> Result<ModelTurn> {
    Ok(ModelTurn::Final {
        text: text.to_string(),
    })
}

pub fn tool_calls(calls: Vec<(&str, &str, Value)>) -> Result<ModelTurn> {
    Ok(ModelTurn::ToolCalls {
        text: None,
        calls: calls
            .into_iter()
            .map(|(id, name, args)| ToolCall::new(id, name, args))
            .collect(),
    })
}

pub fn session_config(root: &Path) -> SessionConfig {
    SessionConfig {
        root: root.to_path_buf(),
        provider: ProviderSettings {
            provider: "scripted".to_string(),
            api_key: "test-key".to_string(),
            api_base: None,
            request_timeout: Duration::from_secs(5),
            max_retries: 1,
        },
        model: "test-model".to_string(),
        limits: ModelLimits::default(),
        max_iterations: 10,
        command_timeout_secs: 10,
        commit_policy: CommitPolicy::Off,
    }
}

pub fn git(root: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Repository with a local identity and one initial commit
pub fn init_repo(root: &Path) {
    git(root, &["init", "-q"]);
    git(root, &["config", "user.email", "claw@example.com"]);
    git(root, &["config", "user.name", "claw"]);
    git(root, &["config", "commit.gpgsign", "false"]);
    std::fs::write(root.join(".gitkeep"), "").unwrap();
    git(root, &["add", "-A"]);
    git(root, &["commit", "-q", "-m", "init"]);
}
