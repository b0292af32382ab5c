//! Command execution for the CLI.
//!
//! This module handles running CLI commands and producing output.

use crate::cli::Command;
use crate::command::RealCommandRunner;
use crate::config::GateConfig;
use crate::decision::{BlockDecision, GateResult, EXIT_ERROR};
use crate::error::{Error, Result};
use crate::hook_logging;
use crate::hooks::{
    run_post_tool_use, run_pre_tool_use, run_stop_hook, Envelope, HookEvent, StopHookContext,
};
use crate::paths;
use crate::storage::JsonFileStore;
use crate::templates;
use crate::traits::{CommandRunner, StateKey, StateStore};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tera::Context;

/// Output from running the CLI, with separate stdout and stderr messages.
#[derive(Debug)]
pub struct CliOutput {
    /// Exit code for the process.
    pub exit_code: ExitCode,
    /// Messages to print to stdout.
    pub stdout: Vec<String>,
    /// Messages to print to stderr.
    pub stderr: Vec<String>,
}

impl CliOutput {
    fn error(message: String) -> Self {
        Self { exit_code: ExitCode::from(EXIT_ERROR), stdout: vec![], stderr: vec![message] }
    }
}

/// The process surroundings a command runs in.
pub struct RunEnv<'a> {
    /// Directory holding the state records; `None` if it cannot be found.
    pub state_dir: Option<PathBuf>,
    /// Runner for external commands.
    pub runner: &'a dyn CommandRunner,
    /// Current time.
    pub now: DateTime<Utc>,
}

/// Run a CLI command with the given stdin input.
pub fn run(command: Command, stdin: &str) -> CliOutput {
    let runner = RealCommandRunner::new();
    let env = RunEnv { state_dir: paths::state_dir(), runner: &runner, now: Utc::now() };
    run_with(command, stdin, &env)
}

/// Run a CLI command in an explicit environment.
pub fn run_with(command: Command, stdin: &str, env: &RunEnv<'_>) -> CliOutput {
    match command {
        Command::Version => run_version(),
        Command::Status => run_status(env),
        Command::Reset => run_reset(env),
        Command::Stop => run_hook_cmd(Some(HookEvent::Stop), stdin, env),
        Command::PreToolUse => run_hook_cmd(Some(HookEvent::PreToolUse), stdin, env),
        Command::PostToolUse => run_hook_cmd(Some(HookEvent::PostToolUse), stdin, env),
        Command::Hook => run_hook_cmd(None, stdin, env),
    }
}

// === Utility Commands ===

fn run_version() -> CliOutput {
    CliOutput {
        exit_code: ExitCode::SUCCESS,
        stdout: vec![],
        stderr: vec![format!("claude-stopgate v{}", crate::VERSION)],
    }
}

fn run_status(env: &RunEnv<'_>) -> CliOutput {
    let Some(dir) = &env.state_dir else {
        return CliOutput::error("Error: Could not determine state directory".to_string());
    };
    let store = JsonFileStore::new(dir);

    let records: Vec<serde_json::Value> = StateKey::ALL
        .iter()
        .map(|key| {
            serde_json::json!({
                "name": key.file_name(),
                "contents": store.read(*key).ok().flatten().map(|c| c.trim_end().to_string()),
            })
        })
        .collect();

    let mut ctx = Context::new();
    ctx.insert("state_dir", &dir.display().to_string());
    ctx.insert("records", &records);

    match templates::render(templates::STATUS, &ctx) {
        Ok(text) => CliOutput {
            exit_code: ExitCode::SUCCESS,
            stdout: vec![text.trim_end().to_string()],
            stderr: vec![],
        },
        Err(e) => CliOutput::error(format!("Error rendering status: {e}")),
    }
}

fn run_reset(env: &RunEnv<'_>) -> CliOutput {
    let Some(dir) = &env.state_dir else {
        return CliOutput::error("Error: Could not determine state directory".to_string());
    };
    let store = JsonFileStore::new(dir);

    let mut stderr = Vec::new();
    let mut failed = false;
    for key in StateKey::ALL {
        match store.remove(key) {
            Ok(()) => stderr.push(format!("Cleared {}", key.file_name())),
            Err(e) => {
                failed = true;
                stderr.push(format!("Error clearing {}: {e}", key.file_name()));
            }
        }
    }

    let exit_code = if failed { ExitCode::from(EXIT_ERROR) } else { ExitCode::SUCCESS };
    CliOutput { exit_code, stdout: vec![], stderr }
}

// === Hook Commands ===

/// Run a hook. `expected` is the hook named by the command; `None` means
/// dispatch on the envelope's own event kind.
fn run_hook_cmd(expected: Option<HookEvent>, stdin: &str, env: &RunEnv<'_>) -> CliOutput {
    let mut envelope = match Envelope::parse(stdin) {
        Ok(e) => e,
        Err(e) => return CliOutput::error(format!("Error parsing hook input: {e}")),
    };

    let base_dir = envelope.working_dir();
    let mut messages = Vec::new();
    let config = GateConfig::resolve(&base_dir, &mut messages);

    let event = expected.unwrap_or_else(|| envelope.event().clone());
    if let Some(dir) = &env.state_dir {
        let hook_type = hook_type_for(&event);
        hook_logging::log_hook_event(&config, hook_type, stdin, dir);
    }

    if let Err(e) = init_templates(&config, &base_dir) {
        messages.push(format!("Warning: {e}; using built-in messages"));
    }

    let Some(dir) = &env.state_dir else {
        messages.push("Error: Could not determine state directory".to_string());
        return pass_through(&envelope, stdin, ExitCode::from(EXIT_ERROR), messages);
    };
    let store = JsonFileStore::new(dir);

    match event {
        HookEvent::Stop => {
            let ctx =
                StopHookContext { config: &config, store: &store, runner: env.runner, now: env.now };
            match run_stop_hook(&envelope, &ctx) {
                Ok(result) => stop_output(&envelope, stdin, result, messages),
                Err(e) => {
                    messages.push(format!("Error running stop hook: {e}"));
                    pass_through(&envelope, stdin, ExitCode::from(EXIT_ERROR), messages)
                }
            }
        }
        HookEvent::PreToolUse => {
            messages.extend(run_pre_tool_use(&mut envelope, &store, env.now));
            pass_through(&envelope, stdin, ExitCode::SUCCESS, messages)
        }
        HookEvent::PostToolUse => {
            messages.extend(run_post_tool_use(&envelope, &store, env.now));
            pass_through(&envelope, stdin, ExitCode::SUCCESS, messages)
        }
        HookEvent::Other(_) => pass_through(&envelope, stdin, ExitCode::SUCCESS, messages),
    }
}

const fn hook_type_for(event: &HookEvent) -> &'static str {
    match event {
        HookEvent::Stop => "stop",
        HookEvent::PreToolUse => "pre-tool-use",
        HookEvent::PostToolUse => "post-tool-use",
        HookEvent::Other(_) => "other",
    }
}

/// Load project template overrides, falling back to the embedded set.
fn init_templates(config: &GateConfig, base_dir: &Path) -> Result<()> {
    let dir = config.templates_dir.as_ref().map(|d| base_dir.join(d));
    templates::init_templates(dir.as_deref()).or_else(|e| {
        templates::init_templates(None)?;
        Err(e)
    })
}

/// Emit the (possibly annotated) envelope unchanged.
fn pass_through(
    envelope: &Envelope,
    stdin: &str,
    exit_code: ExitCode,
    stderr: Vec<String>,
) -> CliOutput {
    let json = envelope.to_json().unwrap_or_else(|_| stdin.trim().to_string());
    CliOutput { exit_code, stdout: vec![json], stderr }
}

fn stop_output(
    envelope: &Envelope,
    stdin: &str,
    result: GateResult,
    mut messages: Vec<String>,
) -> CliOutput {
    let exit_code = ExitCode::from(result.exit_code());
    messages.extend(result.messages);

    let Some(reason) = result.block_reason else {
        return pass_through(envelope, stdin, exit_code, messages);
    };

    match BlockDecision::new(&reason).to_json() {
        Ok(json) => CliOutput { exit_code, stdout: vec![json], stderr: messages },
        Err(e) => {
            messages.push(Error::from(e).to_string());
            pass_through(envelope, stdin, ExitCode::from(EXIT_ERROR), messages)
        }
    }
}
