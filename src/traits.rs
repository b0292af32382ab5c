//! Core traits for testability and abstraction.

use crate::error::Result;
use crate::paths;
use std::time::Duration;

/// Output from a command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// The exit code of the command.
    pub exit_code: i32,
    /// The stdout output.
    pub stdout: String,
    /// The stderr output.
    pub stderr: String,
}

impl CommandOutput {
    /// Check if the command succeeded (exit code 0).
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Trait for running shell commands.
///
/// This trait abstracts command execution for testability.
pub trait CommandRunner {
    /// Run a command with the given arguments and timeout.
    ///
    /// When a timeout is given and the command outlives it, the child is
    /// killed and [`crate::error::Error::CommandTimeout`] is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned, or times out.
    fn run(&self, program: &str, args: &[&str], timeout: Option<Duration>)
        -> Result<CommandOutput>;
}

/// Identifies one of the persisted state records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    /// The continuation-loop iteration record.
    Continuation,
    /// The modification/verification record.
    Pipeline,
    /// The pending-task correlation record.
    PendingTasks,
}

impl StateKey {
    /// All state keys, in display order.
    pub const ALL: [Self; 3] = [Self::Continuation, Self::Pipeline, Self::PendingTasks];

    /// File name backing this record.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Continuation => paths::CONTINUATION_STATE_FILE,
            Self::Pipeline => paths::PIPELINE_STATE_FILE,
            Self::PendingTasks => paths::PENDING_TASKS_FILE,
        }
    }
}

/// Trait for persistent state storage.
///
/// Every record is read in full, mutated, and written back in full. There is
/// no locking: two processes doing read-modify-write on the same key at the
/// same time may lose one of the updates. Callers rely on that being the
/// only coordination there is.
pub trait StateStore {
    /// Read the raw contents of a record, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read.
    fn read(&self, key: StateKey) -> Result<Option<String>>;

    /// Replace the contents of a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    fn write(&self, key: StateKey, contents: &str) -> Result<()>;

    /// Delete a record. Deleting a missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be removed.
    fn remove(&self, key: StateKey) -> Result<()>;
}
