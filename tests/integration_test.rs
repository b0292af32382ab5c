//! Integration tests for `claude_stopgate`.

use chrono::Utc;
use claude_stopgate::config::GateConfig;
use claude_stopgate::hooks::{run_post_tool_use, run_pre_tool_use, run_stop_hook};
use claude_stopgate::hooks::{Envelope, StopHookContext};
use claude_stopgate::{CommandRunner, JsonFileStore, RealCommandRunner, StateKey, StateStore};
use claude_stopgate::VERSION;
use serial_test::serial;
use tempfile::TempDir;

fn envelope(project: &TempDir, mut fields: serde_json::Value) -> Envelope {
    fields["cwd"] = serde_json::json!(project.path().display().to_string());
    Envelope::parse(&fields.to_string()).unwrap()
}

#[test]
fn test_version_exists() {
    assert!(!VERSION.is_empty());
}

#[test]
fn test_real_command_runner() {
    let runner = RealCommandRunner::new();
    let output = runner.run("echo", &["hello"], None).unwrap();
    assert!(output.success());
    assert!(output.stdout.contains("hello"));
}

#[test]
#[serial]
fn test_advisory_runs_real_commands() {
    let state = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    let store = JsonFileStore::new(state.path());
    let runner = RealCommandRunner::new();

    let mut config = GateConfig::default();
    config.advisory.run_tests = true;
    config.advisory.test_command = "exit 3".to_string();
    config.advisory.run_build = true;
    config.advisory.build_command = "sleep 5".to_string();
    config.advisory.timeout_secs = 1;

    let ctx = StopHookContext { config: &config, store: &store, runner: &runner, now: Utc::now() };
    let stop = envelope(&project, serde_json::json!({"note": "TODO: tidy up"}));
    let result = run_stop_hook(&stop, &ctx).unwrap();

    assert!(!result.is_block());
    assert_eq!(result.messages.len(), 1);
    let banner = &result.messages[0];
    assert!(banner.contains("  - TODO: 1 found"));
    assert!(banner.contains("Tests failed: exit 3"));
    assert!(banner.contains("Build timed out after 1s: sleep 5"));
}

#[test]
#[serial]
fn test_session_lifecycle_on_disk() {
    let state = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    let store = JsonFileStore::new(state.path());
    let runner = RealCommandRunner::new();
    let config = GateConfig::default();
    let now = Utc::now();

    let edit = envelope(
        &project,
        serde_json::json!({"tool_name": "Edit", "tool_input": {"file_path": "src/app.ts"}}),
    );
    run_post_tool_use(&edit, &store, now);
    assert!(store.read(StateKey::Pipeline).unwrap().is_some());

    let ctx = StopHookContext { config: &config, store: &store, runner: &runner, now };
    let stop = envelope(&project, serde_json::json!({"hook_event_name": "Stop"}));
    let blocked = run_stop_hook(&stop, &ctx).unwrap();
    assert!(blocked.block_reason.unwrap().contains("app.ts"));

    let mut review = envelope(
        &project,
        serde_json::json!({
            "tool_name": "Task",
            "tool_use_id": "toolu_42",
            "tool_input": {"subagent_type": "heimdall", "prompt": "Review app.ts"},
        }),
    );
    run_pre_tool_use(&mut review, &store, now);
    assert!(store.read(StateKey::PendingTasks).unwrap().unwrap().contains("toolu_42"));

    let messages = run_post_tool_use(&review, &store, now);
    assert!(messages.iter().any(|m| m == "Code verification agent 'heimdall' executed"));
    assert!(messages.iter().any(|m| m.starts_with("Task heimdall finished")));

    let allowed = run_stop_hook(&stop, &ctx).unwrap();
    assert!(!allowed.is_block());
    assert!(store.read(StateKey::Pipeline).unwrap().is_none());
}

#[test]
#[serial]
fn test_record_from_other_project_is_discarded() {
    let state = TempDir::new().unwrap();
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let store = JsonFileStore::new(state.path());
    let runner = RealCommandRunner::new();
    let config = GateConfig::default();
    let now = Utc::now();

    let edit = envelope(
        &first,
        serde_json::json!({"tool_name": "Write", "tool_input": {"file_path": "lib.rs"}}),
    );
    run_post_tool_use(&edit, &store, now);

    let ctx = StopHookContext { config: &config, store: &store, runner: &runner, now };
    let stop = envelope(&second, serde_json::json!({}));
    let result = run_stop_hook(&stop, &ctx).unwrap();

    assert!(!result.is_block());
    assert!(store.read(StateKey::Pipeline).unwrap().is_none());
}

#[cfg(feature = "cli")]
#[test]
#[serial]
fn test_cli_round_trip() {
    use claude_stopgate::cli::{run_with, Command, RunEnv};
    use std::process::ExitCode;

    let state = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    let runner = RealCommandRunner::new();
    let env = RunEnv { state_dir: Some(state.path().to_path_buf()), runner: &runner, now: Utc::now() };
    let cwd = project.path().display().to_string();

    let malformed = run_with(Command::Stop, "{not json", &env);
    assert_eq!(malformed.exit_code, ExitCode::from(1));
    assert!(malformed.stdout.is_empty());

    let edit = serde_json::json!({
        "hook_event_name": "PostToolUse",
        "cwd": cwd,
        "tool_name": "MultiEdit",
        "tool_input": {"file_path": "docs/plan.md"},
    });
    let output = run_with(Command::Hook, &edit.to_string(), &env);
    assert_eq!(output.exit_code, ExitCode::SUCCESS);
    assert_eq!(output.stdout[0], edit.to_string());

    let stop = serde_json::json!({"hook_event_name": "Stop", "cwd": cwd});
    let output = run_with(Command::Hook, &stop.to_string(), &env);
    assert_eq!(output.exit_code, ExitCode::from(2));
    let decision: serde_json::Value = serde_json::from_str(&output.stdout[0]).unwrap();
    assert!(decision["reason"].as_str().unwrap().contains("plan.md"));
}
