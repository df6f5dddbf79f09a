//! Concurrent sessions: shared roots serialize, distinct roots do not

mod common;

use claw_agent::Engine;
use claw_bus::{SessionEvent, ToolStatus};
use common::{final_text, git, init_repo, session_config, tool_calls, ScriptedProvider};
use serde_json::json;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn commit_ids(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::ToolResultProduced { result, .. } if result.tool == "git_commit" => {
                assert_eq!(result.status, ToolStatus::Ok, "{}", result.output);
                result
                    .output
                    .strip_prefix("OK: committed ")
                    .and_then(|rest| rest.split(':').next())
                    .map(str::to_string)
            }
            _ => None,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_commits_same_root() {
    let dir = TempDir::new().unwrap();
    init_repo(dir.path());
    let engine = Engine::new();

    let mut handles = Vec::new();
    for name in ["alpha", "beta"] {
        let file = format!("{name}.txt");
        let provider = ScriptedProvider::new(vec![
            tool_calls(vec![
                ("w", "write_file", json!({"path": &file, "content": name})),
                (
                    "c",
                    "git_commit",
                    json!({"message": format!("add {name}"), "paths": &file}),
                ),
            ]),
            final_text("committed"),
        ]);
        handles.push(
            engine
                .start_session_with_provider(session_config(dir.path()), provider)
                .await
                .unwrap(),
        );
    }
    assert_eq!(engine.locks().len(), 1);

    let streams: Vec<_> = handles
        .iter()
        .map(|h| h.send_user_message("write and commit"))
        .collect();
    let mut ids = Vec::new();
    for stream in streams {
        let events = stream.collect().await;
        assert!(matches!(events.last(), Some(SessionEvent::Finished { .. })));
        ids.extend(commit_ids(&events));
    }

    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);

    let log = git(dir.path(), &["log", "--format=%s"]);
    assert!(log.contains("add alpha"));
    assert!(log.contains("add beta"));
    assert_eq!(git(dir.path(), &["rev-list", "--count", "HEAD"]).trim(), "3");
    assert!(git(dir.path(), &["status", "--porcelain"]).trim().is_empty());
    git(dir.path(), &["fsck", "--no-progress"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_roots_run_in_parallel() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let engine = Engine::new();
    let started = Instant::now();

    let mut streams = Vec::new();
    for dir in [&first, &second] {
        let provider = ScriptedProvider::new(vec![
            tool_calls(vec![("s", "run_command", json!({"command": "sleep 1"}))]),
            final_text("slept"),
        ]);
        let handle = engine
            .start_session_with_provider(session_config(dir.path()), provider)
            .await
            .unwrap();
        streams.push(handle.send_user_message("sleep"));
    }
    assert_eq!(engine.locks().len(), 2);

    for stream in streams {
        assert!(stream.outcome().await.is_finished());
    }
    assert!(
        started.elapsed() < Duration::from_millis(1900),
        "sessions on different roots were serialized"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_root_tool_executions_serialize() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::new();
    let started = Instant::now();

    let mut streams = Vec::new();
    for _ in 0..2 {
        let provider = ScriptedProvider::new(vec![
            tool_calls(vec![("s", "run_command", json!({"command": "sleep 1"}))]),
            final_text("slept"),
        ]);
        let handle = engine
            .start_session_with_provider(session_config(dir.path()), provider)
            .await
            .unwrap();
        streams.push(handle.send_user_message("sleep"));
    }

    for stream in streams {
        assert!(stream.outcome().await.is_finished());
    }
    assert!(started.elapsed() >= Duration::from_secs(2));
}
