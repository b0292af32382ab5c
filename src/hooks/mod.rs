//! Hook implementations for Claude Code.
//!
//! Every hook receives one JSON envelope on stdin. The envelope is parsed
//! once into an [`Envelope`], which keeps the raw object (so it can be
//! passed back unchanged) and the [`HookEvent`] it represents.

mod post_tool_use;
mod pre_tool_use;
mod stop;

pub use post_tool_use::run_post_tool_use;
pub use pre_tool_use::run_pre_tool_use;
pub use stop::{run_stop_hook, StopHookContext};

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Which lifecycle event an envelope describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    /// The agent (or a subagent) wants to stop.
    Stop,
    /// A tool is about to run.
    PreToolUse,
    /// A tool has finished.
    PostToolUse,
    /// Any other named event; passed through untouched.
    Other(String),
}

impl HookEvent {
    /// Decide the event kind from the envelope fields.
    ///
    /// `hook_event_name` wins when present. Otherwise a tool result means
    /// post-tool-use, a bare tool name means pre-tool-use, and anything else
    /// is a stop.
    fn classify(raw: &Map<String, Value>) -> Self {
        if let Some(name) = raw.get("hook_event_name").and_then(Value::as_str) {
            return match name {
                "Stop" => Self::Stop,
                "PreToolUse" => Self::PreToolUse,
                "PostToolUse" => Self::PostToolUse,
                other => Self::Other(other.to_string()),
            };
        }
        if raw.contains_key("tool_result") || raw.contains_key("tool_response") {
            Self::PostToolUse
        } else if raw.contains_key("tool_name") {
            Self::PreToolUse
        } else {
            Self::Stop
        }
    }
}

/// A parsed hook envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    raw: Map<String, Value>,
    event: HookEvent,
}

impl Envelope {
    /// Parse an envelope from stdin contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, is not JSON, or is not a
    /// JSON object.
    pub fn parse(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Err(Error::InvalidInput("empty hook input".to_string()));
        }
        match serde_json::from_str::<Value>(input)? {
            Value::Object(raw) => {
                let event = HookEvent::classify(&raw);
                Ok(Self { raw, event })
            }
            other => Err(Error::InvalidInput(format!(
                "hook input must be a JSON object, got {}",
                json_type(&other)
            ))),
        }
    }

    /// The event this envelope describes.
    pub const fn event(&self) -> &HookEvent {
        &self.event
    }

    /// Get a top-level string field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.raw.get(key).and_then(Value::as_str)
    }

    /// Get a string field of `tool_input`.
    pub fn tool_input_str(&self, key: &str) -> Option<&str> {
        self.raw.get("tool_input").and_then(|input| input.get(key)).and_then(Value::as_str)
    }

    /// The tool name, or `""` when absent.
    pub fn tool_name(&self) -> &str {
        self.str_field("tool_name").unwrap_or_default()
    }

    /// The host's `stop_hook_active` flag.
    pub fn stop_hook_active(&self) -> bool {
        self.raw.get("stop_hook_active").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Path of the session transcript, if given.
    pub fn transcript_path(&self) -> Option<&Path> {
        self.str_field("transcript_path").filter(|p| !p.is_empty()).map(Path::new)
    }

    /// The session's working directory: the envelope's `cwd`, else the
    /// process directory.
    pub fn working_dir(&self) -> PathBuf {
        self.str_field("cwd")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Set a top-level field.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.raw.insert(key.to_string(), value.into());
    }

    /// Serialize back to a single line of JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.raw)?)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
