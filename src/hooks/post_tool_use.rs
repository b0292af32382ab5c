//! `PostToolUse` hook.
//!
//! Feeds the tool use to the modification tracker and pairs finished `Task`
//! calls with their recorded start.

use crate::hooks::Envelope;
use crate::pending::{finish_task, TASK_ID_FIELD};
use crate::tracker::{record_tool_use, ToolUse};
use crate::traits::StateStore;
use chrono::{DateTime, Utc};

/// Run the post-tool-use hook.
///
/// Returns messages for stderr. State failures become warnings.
pub fn run_post_tool_use(
    envelope: &Envelope,
    store: &dyn StateStore,
    now: DateTime<Utc>,
) -> Vec<String> {
    let tool = ToolUse {
        tool_name: envelope.tool_name(),
        file_path: envelope.tool_input_str("file_path"),
        subagent_type: envelope.tool_input_str("subagent_type"),
    };

    let mut messages = match record_tool_use(&tool, &envelope.working_dir(), store, now) {
        Ok(changes) => changes,
        Err(e) => vec![format!("Warning: Could not update verification state: {e}")],
    };

    if tool.tool_name == "Task" {
        let key = envelope.str_field(TASK_ID_FIELD).or_else(|| envelope.str_field("tool_use_id"));
        if let Some(key) = key {
            match finish_task(key, store, now) {
                Ok(Some(task)) => messages.push(format!(
                    "Task {} finished in {}s",
                    task.subagent_type,
                    task.duration.num_seconds()
                )),
                Ok(None) => {}
                Err(e) => messages.push(format!("Warning: Could not record task finish: {e}")),
            }
        }
    }

    messages
}
