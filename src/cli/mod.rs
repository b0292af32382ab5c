//! Command-line interface for claude-stopgate.
//!
//! Hook commands read one JSON envelope from stdin and are wired up in the
//! Claude Code hook settings. The remaining commands inspect or clear the
//! persisted gate state by hand.

mod run;


pub use run::{run, run_with, CliOutput, RunEnv};

use clap::{Parser, Subcommand};

/// Stop hooks that keep a Claude session working until it is done and
/// reviewed.
///
/// Configure through `.claude/stopgate-config.yaml` or environment
/// variables (`RALPH_ENABLED`, `PIPELINE_SKIP`, `VERIFY_TESTS`, ...).
#[derive(Parser, Debug)]
#[command(name = "claude-stopgate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // === Utility Commands ===
    /// Show version information.
    Version,

    /// Print the persisted continuation, verification and pending-task state.
    Status,

    /// Delete all persisted gate state.
    ///
    /// Use this to abandon a continuation loop or a pending review demand.
    Reset,

    // === Hook Commands (receive JSON from stdin) ===
    /// Run the stop hook (stdin: JSON hook input).
    ///
    /// Exits 2 with a block decision on stdout when the session must keep
    /// working. Not intended for direct use.
    #[command(hide = true)]
    Stop,

    /// Run the pre-tool-use hook (stdin: JSON hook input).
    #[command(name = "pre-tool-use", hide = true)]
    PreToolUse,

    /// Run the post-tool-use hook (stdin: JSON hook input).
    #[command(name = "post-tool-use", hide = true)]
    PostToolUse,

    /// Run whichever hook the envelope describes (stdin: JSON hook input).
    #[command(hide = true)]
    Hook,
}

impl Command {
    /// Returns true if this command requires stdin input.
    #[must_use]
    pub const fn needs_stdin(&self) -> bool {
        self.is_hook()
    }

    /// Returns true if this is a hook command.
    #[must_use]
    pub const fn is_hook(&self) -> bool {
        self.hook_type().is_some()
    }

    /// Hook name used in the debug event log.
    #[must_use]
    pub const fn hook_type(&self) -> Option<&'static str> {
        match self {
            Self::Stop => Some("stop"),
            Self::PreToolUse => Some("pre-tool-use"),
            Self::PostToolUse => Some("post-tool-use"),
            Self::Hook => Some("hook"),
            Self::Version | Self::Status | Self::Reset => None,
        }
    }
}
