//! End-to-end session scenarios against a scripted model

mod common;

use claw_agent::Engine;
use claw_bus::{AbortReason, Outcome, SessionEvent, ToolStatus};
use claw_config::CommitPolicy;
use claw_provider::{ProviderError, Role};
use common::{final_text, git, init_repo, session_config, tool_calls, ScriptedProvider};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

fn results(events: &[SessionEvent]) -> Vec<(String, ToolStatus)> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::ToolResultProduced { result, .. } => {
                Some((result.call_id.clone(), result.status))
            }
            _ => None,
        })
        .collect()
}

// ========== Scenario Tests ==========

#[tokio::test]
async fn test_add_readme_scenario() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![(
            "call_1",
            "write_file",
            json!({"path": "README.md", "content": "# Project\n"}),
        )]),
        final_text("README created."),
    ]);

    let handle = Engine::new()
        .start_session_with_provider(session_config(dir.path()), provider.clone())
        .await
        .unwrap();
    let events = handle.send_user_message("add a README").collect().await;

    assert_eq!(
        events.last(),
        Some(&SessionEvent::Finished {
            session_id: handle.id().to_string(),
            answer: "README created.".to_string(),
            iterations: 2,
        })
    );
    assert_eq!(results(&events), vec![("call_1".to_string(), ToolStatus::Ok)]);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("README.md")).unwrap(),
        "# Project\n"
    );

    // Second turn saw the whole transcript in order
    let requests = provider.requests();
    let roles: Vec<Role> = requests[1].messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool]);
    assert_eq!(requests[1].messages[2].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(requests[0].tools.len(), 7);
}

#[tokio::test]
async fn test_nonzero_exit_continues() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![(
            "t1",
            "run_command",
            json!({"command": "echo failing >&2; exit 2", "timeout": 30}),
        )]),
        final_text("Tests fail; see output."),
    ]);

    let handle = Engine::new()
        .start_session_with_provider(session_config(dir.path()), provider.clone())
        .await
        .unwrap();
    let events = handle.send_user_message("run the tests").collect().await;

    let result = events
        .iter()
        .find_map(|e| match e {
            SessionEvent::ToolResultProduced { result, .. } => Some(result.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(result.status, ToolStatus::Error);
    assert_eq!(result.exit_code, Some(2));
    assert!(events.last().unwrap().is_terminal());
    assert!(matches!(events.last(), Some(SessionEvent::Finished { .. })));
    assert_eq!(provider.request_count(), 2);
    assert!(provider.requests()[1].messages[2].is_error);
}

#[tokio::test]
async fn test_results_follow_call_order() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![
            ("c1", "write_file", json!({"path": "b.txt", "content": "beta"})),
            ("c2", "read_file", json!({"path": "b.txt"})),
            ("c3", "read_file", json!({"path": "missing.txt"})),
            ("c4", "no_such_tool", json!({})),
            ("c5", "read_file", json!({"path": "a.txt"})),
        ]),
        final_text("done"),
    ]);

    let handle = Engine::new()
        .start_session_with_provider(session_config(dir.path()), provider.clone())
        .await
        .unwrap();
    let events = handle.send_user_message("shuffle").collect().await;

    assert_eq!(
        results(&events),
        vec![
            ("c1".to_string(), ToolStatus::Ok),
            ("c2".to_string(), ToolStatus::Ok),
            ("c3".to_string(), ToolStatus::Error),
            ("c4".to_string(), ToolStatus::Error),
            ("c5".to_string(), ToolStatus::Ok),
        ]
    );

    // The read after the write observed it
    let second = &provider.requests()[1];
    assert!(second.messages[3].content.contains("1 | beta"));
    let answered: Vec<&str> = second
        .messages
        .iter()
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    assert_eq!(answered, vec!["c1", "c2", "c3", "c4", "c5"]);
}

#[tokio::test]
async fn test_events_interleave_calls_and_results() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![
            ("c1", "list_dir", json!({"path": "."})),
            ("c2", "list_dir", json!({"path": "."})),
        ]),
        final_text("listed"),
    ]);

    let handle = Engine::new()
        .start_session_with_provider(session_config(dir.path()), provider)
        .await
        .unwrap();
    let events = handle.send_user_message("look around").collect().await;

    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            SessionEvent::ToolCallIssued { .. } => "call",
            SessionEvent::ToolResultProduced { .. } => "result",
            SessionEvent::Finished { .. } => "finished",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["call", "result", "call", "result", "finished"]);
    assert!(events.iter().all(|e| e.session_id() == handle.id()));
}

#[tokio::test]
async fn test_path_escape_reported_to_model() {
    let dir = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let target = outside.path().join("pwned.txt");
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![
            ("c1", "write_file", json!({"path": "../../pwned.txt", "content": "x"})),
            ("c2", "write_file", json!({"path": target.to_str().unwrap(), "content": "x"})),
            ("c3", "read_file", json!({"path": "/etc/hostname"})),
        ]),
        final_text("could not"),
    ]);

    let handle = Engine::new()
        .start_session_with_provider(session_config(dir.path()), provider.clone())
        .await
        .unwrap();
    let outcome = handle.send_user_message("escape").outcome().await;

    assert!(outcome.is_finished());
    assert!(!target.exists());
    let tool_messages: Vec<_> = provider.requests()[1]
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .cloned()
        .collect();
    assert_eq!(tool_messages.len(), 3);
    for message in tool_messages {
        assert!(message.is_error);
        assert!(message.content.contains("outside the project root"));
    }
}

#[tokio::test]
async fn test_shell_timeout_becomes_error_result() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![("c1", "run_command", json!({"command": "sleep 30", "timeout": 1}))]),
        final_text("it hung"),
    ]);

    let handle = Engine::new()
        .start_session_with_provider(session_config(dir.path()), provider)
        .await
        .unwrap();
    let events = tokio::time::timeout(
        Duration::from_secs(15),
        handle.send_user_message("hang").collect(),
    )
    .await
    .expect("loop must not hang on a slow command");

    let result = events
        .iter()
        .find_map(|e| match e {
            SessionEvent::ToolResultProduced { result, .. } => Some(result.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(result.status, ToolStatus::Error);
    assert!(result.output.contains("timed out"));
    assert!(matches!(events.last(), Some(SessionEvent::Finished { .. })));
}

#[tokio::test]
async fn test_idempotent_reads() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/lib.rs"), "pub fn answer() -> u32 { 42 }\n").unwrap();
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![
            ("r1", "read_file", json!({"path": "src/lib.rs"})),
            ("r2", "read_file", json!({"path": "src/lib.rs"})),
            ("s1", "search_code", json!({"pattern": "answer"})),
            ("s2", "search_code", json!({"pattern": "answer"})),
        ]),
        final_text("same"),
    ]);

    let handle = Engine::new()
        .start_session_with_provider(session_config(dir.path()), provider.clone())
        .await
        .unwrap();
    handle.send_user_message("read twice").outcome().await;

    let messages = &provider.requests()[1].messages;
    assert_eq!(messages[2].content, messages[3].content);
    assert_eq!(messages[4].content, messages[5].content);
    assert_eq!(messages[4].content, "src/lib.rs:1:pub fn answer() -> u32 { 42 }");
}

// ========== Lifecycle Tests ==========

#[tokio::test]
async fn test_iteration_cap_aborts() {
    let dir = TempDir::new().unwrap();
    let turns = (0..5)
        .map(|i| {
            let id = format!("c{i}");
            tool_calls(vec![(id.as_str(), "list_dir", json!({"path": "."}))])
        })
        .collect();
    let provider = ScriptedProvider::new(turns);
    let mut config = session_config(dir.path());
    config.max_iterations = 3;

    let handle = Engine::new()
        .start_session_with_provider(config, provider.clone())
        .await
        .unwrap();
    let outcome = handle.send_user_message("never stop").outcome().await;

    assert_eq!(
        outcome,
        Outcome::Aborted(AbortReason::IterationLimitExceeded { limit: 3 })
    );
    assert_eq!(provider.request_count(), 3);
}

#[tokio::test]
async fn test_follow_up_message_keeps_transcript() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![final_text("first"), final_text("second")]);

    let handle = Engine::new()
        .start_session_with_provider(session_config(dir.path()), provider.clone())
        .await
        .unwrap();
    let first = handle.send_user_message("one");
    let second = handle.send_user_message("two");
    assert!(first.outcome().await.is_finished());
    assert!(second.outcome().await.is_finished());

    let requests = provider.requests();
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(requests[1].messages[2].content, "two");
}

#[tokio::test]
async fn test_fatal_provider_error_closes_session() {
    let dir = TempDir::new().unwrap();
    let error = ProviderError::Authentication {
        status: 401,
        message: "invalid api key".to_string(),
    };
    let provider = ScriptedProvider::new(vec![Err(error.clone())]);

    let handle = Engine::new()
        .start_session_with_provider(session_config(dir.path()), provider.clone())
        .await
        .unwrap();
    let outcome = handle.send_user_message("task").outcome().await;
    assert_eq!(outcome, Outcome::Aborted(AbortReason::Provider(error)));

    let again = handle.send_user_message("retry").outcome().await;
    assert_eq!(again, Outcome::Aborted(AbortReason::SessionClosed));
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn test_malformed_response_aborts() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![Err(ProviderError::MalformedResponse(
        "response carried neither text nor tool calls".to_string(),
    ))]);

    let handle = Engine::new()
        .start_session_with_provider(session_config(dir.path()), provider)
        .await
        .unwrap();
    let outcome = handle.send_user_message("task").outcome().await;
    match outcome {
        Outcome::Aborted(reason) => assert!(reason.is_failure()),
        other => panic!("expected abort, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cancel_during_model_call() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::with_delay(
        vec![final_text("too late")],
        Duration::from_secs(30),
    );

    let handle = Engine::new()
        .start_session_with_provider(session_config(dir.path()), provider)
        .await
        .unwrap();
    let stream = handle.send_user_message("slow task");
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), stream.outcome())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Aborted(AbortReason::UserCancelled));
}

#[tokio::test]
async fn test_cancel_between_tools_answers_pending_calls() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![
            ("c1", "run_command", json!({"command": "sleep 1"})),
            ("c2", "write_file", json!({"path": "late.txt", "content": "x"})),
        ]),
        final_text("unreachable"),
    ]);

    let handle = Engine::new()
        .start_session_with_provider(session_config(dir.path()), provider.clone())
        .await
        .unwrap();
    let stream = handle.send_user_message("two steps");
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.cancel();
    let events = stream.collect().await;

    assert_eq!(
        results(&events),
        vec![
            ("c1".to_string(), ToolStatus::Ok),
            ("c2".to_string(), ToolStatus::Error),
        ]
    );
    assert!(matches!(
        events.last(),
        Some(SessionEvent::Aborted {
            reason: AbortReason::UserCancelled,
            ..
        })
    ));
    assert!(!dir.path().join("late.txt").exists());
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn test_per_task_auto_commit() {
    let dir = TempDir::new().unwrap();
    init_repo(dir.path());
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![(
            "c1",
            "write_file",
            json!({"path": "README.md", "content": "# hi\n"}),
        )]),
        final_text("README created."),
    ]);
    let mut config = session_config(dir.path());
    config.commit_policy = CommitPolicy::PerTask;

    let handle = Engine::new()
        .start_session_with_provider(config, provider)
        .await
        .unwrap();
    let events = handle.send_user_message("add a README").collect().await;

    let committed = events.iter().find_map(|e| match e {
        SessionEvent::AutoCommitted { message, .. } => Some(message.clone()),
        _ => None,
    });
    assert_eq!(committed.as_deref(), Some("feat: README created."));
    assert_eq!(git(dir.path(), &["log", "-1", "--format=%s"]).trim(), "feat: README created.");
    assert!(git(dir.path(), &["status", "--porcelain"]).trim().is_empty());
}

#[tokio::test]
async fn test_commit_policy_off_leaves_tree_dirty() {
    let dir = TempDir::new().unwrap();
    init_repo(dir.path());
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![("c1", "write_file", json!({"path": "x.txt", "content": "x"}))]),
        final_text("wrote x"),
    ]);

    let handle = Engine::new()
        .start_session_with_provider(session_config(dir.path()), provider)
        .await
        .unwrap();
    let events = handle.send_user_message("write x").collect().await;

    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::AutoCommitted { .. })));
    assert!(git(dir.path(), &["status", "--porcelain"]).contains("x.txt"));
}

#[tokio::test]
async fn test_duplicate_call_ids_abort_as_malformed() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![
            ("dup", "list_dir", json!({"path": "."})),
            ("dup", "list_dir", json!({"path": "."})),
        ]),
        final_text("unreachable"),
    ]);

    let handle = Engine::new()
        .start_session_with_provider(session_config(dir.path()), provider.clone())
        .await
        .unwrap();
    let events = handle.send_user_message("list twice").collect().await;

    assert!(results(&events).is_empty());
    match events.last() {
        Some(SessionEvent::Aborted {
            reason: AbortReason::Provider(ProviderError::MalformedResponse(msg)),
            ..
        }) => assert!(msg.contains("dup")),
        other => panic!("expected malformed response abort, got {other:?}"),
    }
    assert_eq!(provider.request_count(), 1);
}

// ========== Subdirectory Root Tests ==========

/// Repository at `<tmp>/repo` with the session root at `repo/sub` and an
/// uncommitted file outside the root
fn nested_root(dir: &TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
    let repo = dir.path().join("repo");
    let sub = repo.join("sub");
    std::fs::create_dir_all(&sub).unwrap();
    init_repo(&repo);
    std::fs::write(repo.join("outside.txt"), "not mine\n").unwrap();
    (repo, sub)
}

fn committed_files(repo: &std::path::Path) -> Vec<String> {
    git(repo, &["show", "--name-only", "--format=", "HEAD"])
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_git_commit_stays_inside_subdirectory_root() {
    let dir = TempDir::new().unwrap();
    let (repo, sub) = nested_root(&dir);
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![
            ("c1", "write_file", json!({"path": "inside.txt", "content": "mine\n"})),
            ("c2", "git_commit", json!({"message": "add inside"})),
        ]),
        final_text("committed"),
    ]);

    let handle = Engine::new()
        .start_session_with_provider(session_config(&sub), provider)
        .await
        .unwrap();
    let events = handle.send_user_message("commit my file").collect().await;

    assert_eq!(
        results(&events),
        vec![
            ("c1".to_string(), ToolStatus::Ok),
            ("c2".to_string(), ToolStatus::Ok),
        ]
    );
    assert_eq!(committed_files(&repo), vec!["sub/inside.txt".to_string()]);
    assert!(git(&repo, &["status", "--porcelain"]).contains("?? outside.txt"));
}

#[tokio::test]
async fn test_per_task_auto_commit_stays_inside_subdirectory_root() {
    let dir = TempDir::new().unwrap();
    let (repo, sub) = nested_root(&dir);
    // a shell mutation names no path, so the commit stages the whole root
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![(
            "c1",
            "run_command",
            json!({"command": "echo made > made.txt"}),
        )]),
        final_text("Made a file."),
    ]);
    let mut config = session_config(&sub);
    config.commit_policy = CommitPolicy::PerTask;

    let handle = Engine::new()
        .start_session_with_provider(config, provider)
        .await
        .unwrap();
    let events = handle.send_user_message("make a file").collect().await;

    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::AutoCommitted { .. })));
    assert_eq!(committed_files(&repo), vec!["sub/made.txt".to_string()]);
    assert!(git(&repo, &["status", "--porcelain"]).contains("?? outside.txt"));
}
