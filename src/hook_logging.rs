//! Debug hook event logging.
//!
//! When `debug_logging` is enabled, every hook invocation is appended as a
//! JSONL line to `hook-events.jsonl` in the state directory. This allows
//! debugging gate decisions by inspecting exactly what events were received.

use crate::config::GateConfig;
use crate::paths::HOOK_EVENTS_FILE;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Log a hook event if debug logging is enabled.
///
/// Errors are silently ignored; logging never affects a hook's outcome.
pub fn log_hook_event(config: &GateConfig, hook_type: &str, raw_input: &str, state_dir: &Path) {
    if !config.debug_logging {
        return;
    }

    write_hook_event(hook_type, raw_input, state_dir);
}

/// Write the hook event to the log file.
fn write_hook_event(hook_type: &str, raw_input: &str, state_dir: &Path) {
    if std::fs::create_dir_all(state_dir).is_err() {
        return;
    }

    let log_path = state_dir.join(HOOK_EVENTS_FILE);

    let timestamp = chrono::Utc::now().to_rfc3339();

    // Embed valid JSON as-is, anything else as a string
    let input_value: serde_json::Value = serde_json::from_str(raw_input)
        .unwrap_or_else(|_| serde_json::Value::String(raw_input.to_string()));

    let entry = serde_json::json!({
        "timestamp": timestamp,
        "hook_type": hook_type,
        "input": input_value,
    });

    let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) else {
        return;
    };

    let _ = writeln!(file, "{entry}");
}
