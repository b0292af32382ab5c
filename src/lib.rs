//! # `claude_stopgate`
//!
//! Stop hooks that keep a Claude session working until its task is finished
//! and its changes have been reviewed by another agent.

pub mod advisory;
#[cfg(feature = "cli")]
pub mod cli;
pub mod command;
pub mod completion;
pub mod config;
pub mod continuation;
pub mod decision;
pub mod error;
pub mod hook_logging;
pub mod hooks;
pub mod paths;
pub mod pending;
pub mod pipeline;
pub mod storage;
pub mod templates;
pub mod testing;
pub mod tracker;
pub mod traits;

pub use command::RealCommandRunner;
pub use decision::GateResult;
pub use error::{Error, Result};
pub use storage::JsonFileStore;
pub use traits::{CommandRunner, StateKey, StateStore};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
