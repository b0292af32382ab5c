//! Allow/block verdicts and their wire form.

use serde::Serialize;

/// Exit code for an allowed stop.
pub const EXIT_ALLOW: u8 = 0;

/// Exit code for an internal error.
pub const EXIT_ERROR: u8 = 1;

/// Exit code for a blocked stop.
pub const EXIT_BLOCK: u8 = 2;

/// Outcome of one gate (or of the whole stop hook).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateResult {
    /// Reason for blocking; `None` means allow.
    pub block_reason: Option<String>,
    /// Messages to display to stderr.
    pub messages: Vec<String>,
}

impl GateResult {
    /// Create an "allow" result.
    pub const fn allow() -> Self {
        Self { block_reason: None, messages: Vec::new() }
    }

    /// Create a "block" result with the reason shown to the agent.
    pub fn block(reason: impl Into<String>) -> Self {
        Self { block_reason: Some(reason.into()), messages: Vec::new() }
    }

    /// Add a message to display.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.messages.push(msg.into());
        self
    }

    /// Add multiple messages.
    #[must_use]
    pub fn with_messages(mut self, msgs: impl IntoIterator<Item = String>) -> Self {
        self.messages.extend(msgs);
        self
    }

    /// Check if this result blocks.
    #[must_use]
    pub const fn is_block(&self) -> bool {
        self.block_reason.is_some()
    }

    /// Process exit code for this result.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        if self.is_block() {
            EXIT_BLOCK
        } else {
            EXIT_ALLOW
        }
    }
}

/// The JSON object written to stdout when a stop is blocked.
#[derive(Debug, Clone, Serialize)]
pub struct BlockDecision<'a> {
    /// Always `"block"`.
    pub decision: &'static str,
    /// Shown to the agent as the reason to keep going.
    pub reason: &'a str,
}

impl<'a> BlockDecision<'a> {
    /// Create a block decision.
    pub const fn new(reason: &'a str) -> Self {
        Self { decision: "block", reason }
    }

    /// Serialize to a single line of JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_and_block() {
        let allow = GateResult::allow().with_message("fine");
        assert!(!allow.is_block());
        assert_eq!(allow.exit_code(), 0);
        assert_eq!(allow.messages, vec!["fine"]);

        let block = GateResult::block("keep going");
        assert!(block.is_block());
        assert_eq!(block.exit_code(), 2);
        assert_eq!(block.block_reason.as_deref(), Some("keep going"));
    }

    #[test]
    fn test_block_decision_json() {
        let json = BlockDecision::new("needs \"review\"").to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["decision"], "block");
        assert_eq!(value["reason"], "needs \"review\"");
        assert!(!json.contains('\n'));
    }
}
