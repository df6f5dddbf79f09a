//! Common test utilities for claw integration tests
#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Isolated home directory and project for one test
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config_dir: PathBuf,
    pub project_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let config_dir = temp_dir.path().join(".claw");
        let project_dir = temp_dir.path().join("project");

        std::fs::create_dir_all(&project_dir)?;

        Ok(Self {
            temp_dir,
            config_dir,
            project_dir,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    /// Command with HOME pointed at the test environment and no CLAW_* leaks
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_claw"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.current_dir(self.temp_dir.path());
        for key in [
            "CLAW_API_KEY",
            "CLAW_API_BASE",
            "CLAW_MODEL",
            "CLAW_PROVIDER",
            "CLAW_TG_TOKEN",
            "RUST_LOG",
        ] {
            cmd.env_remove(key);
        }
        cmd
    }

    /// Write a config document
    pub fn write_config(&self, json: &serde_json::Value) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::write(self.config_file(), serde_json::to_string_pretty(json)?)?;
        Ok(())
    }

    /// Config with a key, pointing at the test project
    pub fn create_config(&self) -> anyhow::Result<()> {
        self.write_config(&serde_json::json!({
            "llm": {"provider": "deepseek", "api_key": "sk-test", "model": "deepseek-chat"},
            "project": {"root": self.project_dir, "auto_commit": false}
        }))
    }
}
