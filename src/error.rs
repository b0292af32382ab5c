//! Error types for `claude_stopgate`.

/// Errors that can occur in the stop-gate hooks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON parsing error occurred.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML parsing error occurred.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A command timed out.
    #[error("Command '{command}' timed out after {timeout_secs} seconds")]
    CommandTimeout {
        /// The command that was run.
        command: String,
        /// The timeout in seconds.
        timeout_secs: u64,
    },

    /// The hook input was not a usable event envelope.
    #[error("Invalid hook input: {0}")]
    InvalidInput(String),

    /// A template error occurred.
    #[error("Template error: {0}")]
    Template(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
