//! `PreToolUse` hook.
//!
//! Records the start of every `Task` call in the pending-task record and
//! tags the envelope with the correlation key.

use crate::hooks::Envelope;
use crate::pending::{begin_task, TASK_ID_FIELD};
use crate::traits::StateStore;
use chrono::{DateTime, Utc};

/// Run the pre-tool-use hook, annotating the envelope in place.
///
/// Returns messages for stderr. State failures become warnings; the tool
/// call is never blocked.
pub fn run_pre_tool_use(
    envelope: &mut Envelope,
    store: &dyn StateStore,
    now: DateTime<Utc>,
) -> Vec<String> {
    if envelope.tool_name() != "Task" {
        return Vec::new();
    }

    let subagent_type = envelope.tool_input_str("subagent_type").unwrap_or("unknown").to_string();
    let prompt = envelope.tool_input_str("prompt").unwrap_or_default().to_string();
    let tool_use_id = envelope.str_field("tool_use_id").map(ToString::to_string);

    match begin_task(tool_use_id.as_deref(), &subagent_type, &prompt, store, now) {
        Ok(key) => {
            envelope.insert(TASK_ID_FIELD, key);
            Vec::new()
        }
        Err(e) => vec![format!("Warning: Could not record task start: {e}")],
    }
}
