//! Path utilities for determining state storage locations.
//!
//! State files live in the per-user Claude configuration directory,
//! `~/.claude/`, next to the files other hooks in the same suite keep there.
//! The `STOPGATE_STATE_DIR` environment variable overrides the location.

use std::path::{Path, PathBuf};

/// Directory name under the home directory.
const CLAUDE_DIR_NAME: &str = ".claude";

/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV: &str = "STOPGATE_STATE_DIR";

/// Continuation-loop record file name.
pub const CONTINUATION_STATE_FILE: &str = "ralph-state.json";

/// Modification/verification record file name.
pub const PIPELINE_STATE_FILE: &str = "pipeline-state.json";

/// Pending-task correlation record file name.
pub const PENDING_TASKS_FILE: &str = "agent-pending.json";

/// Debug hook event log file name.
pub const HOOK_EVENTS_FILE: &str = "hook-events.jsonl";

/// Get the directory holding the persisted hook state.
///
/// Returns the override from `STOPGATE_STATE_DIR` when set and non-empty,
/// otherwise `~/.claude/`. Returns `None` if the home directory cannot be
/// determined.
#[must_use]
pub fn state_dir() -> Option<PathBuf> {
    state_dir_from(std::env::var(STATE_DIR_ENV).ok().as_deref())
}

/// Resolve the state directory from an optional override value.
fn state_dir_from(override_dir: Option<&str>) -> Option<PathBuf> {
    match override_dir.map(str::trim) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::home_dir().map(|home| home.join(CLAUDE_DIR_NAME)),
    }
}

/// Get the final path component as a display name.
///
/// Handles both `/` and `\` separators so records written on another
/// platform still display sensibly.
#[must_use]
pub fn display_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).find(|part| !part.is_empty()).unwrap_or(path)
}

/// Normalize a path for comparison: forward slashes, no trailing slash.
#[must_use]
pub fn normalize(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    let trimmed = text.trim_end_matches('/');
    if trimmed.is_empty() {
        text
    } else {
        trimmed.to_string()
    }
}
