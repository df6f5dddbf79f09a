//! End-to-end tests against a local OpenAI-compatible server

mod common;

use common::TestEnv;
use predicates::prelude::*;
use serde_json::json;

fn config_for(env: &TestEnv, base: &str) -> serde_json::Value {
    json!({
        "llm": {
            "provider": "openai",
            "api_key": "sk-test",
            "api_base": base,
            "model": "gpt-4o",
            "max_retries": 1
        },
        "project": {"root": env.project_dir, "auto_commit": false}
    })
}

#[test]
fn test_run_prints_final_answer() {
    let env = TestEnv::new().unwrap();
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "Hello from the model"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 4}
            })
            .to_string(),
        )
        .create();
    env.write_config(&config_for(&env, &server.url())).unwrap();

    env.command()
        .args(["run", "say", "hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains("◆ Hello from the model"));

    mock.assert();
}

#[test]
fn test_run_auth_failure_exits_nonzero() {
    let env = TestEnv::new().unwrap();
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body(r#"{"error": {"message": "invalid api key"}}"#)
        .create();
    env.write_config(&config_for(&env, &server.url())).unwrap();

    env.command()
        .args(["run", "say", "hello"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Aborted: provider error"));
}

#[test]
fn test_project_flag_overrides_config_root() {
    let env = TestEnv::new().unwrap();
    let other = env.temp_dir.path().join("other");
    std::fs::create_dir_all(&other).unwrap();

    let mut server = mockito::Server::new();
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}]
            })
            .to_string(),
        )
        .create();
    env.write_config(&config_for(&env, &server.url())).unwrap();

    let canonical = std::fs::canonicalize(&other).unwrap();
    env.command()
        .args(["run", "look", "-p", "other"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "Project: {}",
            canonical.display()
        )));
}
