//! Start/end pairing for subagent tasks.
//!
//! A `Task` tool use is recorded when it starts and removed when it
//! finishes, keyed by a per-invocation id so concurrent tasks of the same
//! type never collide. Entries that never finish expire after ten minutes.

use crate::error::Result;
use crate::storage::{load_record, save_record};
use crate::traits::{StateKey, StateStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Envelope field carrying the correlation key from start to finish.
pub const TASK_ID_FIELD: &str = "_agentTaskId";

/// Pending entries older than this are dropped.
const STALE_AFTER_MINUTES: i64 = 10;

/// Stored prompts are cut to this many characters.
const PROMPT_LIMIT: usize = 200;

/// A task that has started but not yet finished.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingTask {
    /// The subagent type.
    #[serde(rename = "type")]
    pub subagent_type: String,
    /// When the task started.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    /// The start of the task prompt.
    #[serde(default)]
    pub prompt: String,
}

/// A task whose start and finish were paired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedTask {
    /// The subagent type.
    pub subagent_type: String,
    /// Time between start and finish.
    pub duration: chrono::Duration,
}

/// Load the pending map, skipping malformed and expired entries.
///
/// Returns the live entries and whether anything was skipped.
fn load_live(store: &dyn StateStore, now: DateTime<Utc>) -> (BTreeMap<String, PendingTask>, bool) {
    let raw: BTreeMap<String, serde_json::Value> =
        load_record(store, StateKey::PendingTasks).unwrap_or_default();
    let total = raw.len();

    let live: BTreeMap<String, PendingTask> = raw
        .into_iter()
        .filter_map(|(key, value)| {
            serde_json::from_value::<PendingTask>(value).ok().map(|task| (key, task))
        })
        .filter(|(_, task)| {
            now - task.start_time <= chrono::Duration::minutes(STALE_AFTER_MINUTES)
        })
        .collect();

    let pruned = live.len() != total;
    (live, pruned)
}

/// Record the start of a task and return its correlation key.
///
/// The host's `tool_use_id` is used when present; otherwise a fresh UUID.
///
/// # Errors
///
/// Returns an error if the pending record cannot be saved.
pub fn begin_task(
    tool_use_id: Option<&str>,
    subagent_type: &str,
    prompt: &str,
    store: &dyn StateStore,
    now: DateTime<Utc>,
) -> Result<String> {
    let key = tool_use_id
        .filter(|id| !id.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), ToString::to_string);

    let (mut pending, _) = load_live(store, now);
    pending.insert(
        key.clone(),
        PendingTask {
            subagent_type: subagent_type.to_string(),
            start_time: now,
            prompt: prompt.chars().take(PROMPT_LIMIT).collect(),
        },
    );
    save_record(store, StateKey::PendingTasks, &pending)?;

    Ok(key)
}

/// Pair the finish of a task with its start.
///
/// Only an entry stored under exactly `key` matches. Returns `None` when
/// there is no such entry.
///
/// # Errors
///
/// Returns an error if the pending record cannot be saved.
pub fn finish_task(
    key: &str,
    store: &dyn StateStore,
    now: DateTime<Utc>,
) -> Result<Option<FinishedTask>> {
    let (mut pending, pruned) = load_live(store, now);
    let finished = pending.remove(key);

    if finished.is_some() || pruned {
        save_record(store, StateKey::PendingTasks, &pending)?;
    }

    Ok(finished.map(|task| FinishedTask {
        subagent_type: task.subagent_type,
        duration: now - task.start_time,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStateStore;
    use chrono::TimeZone;

    fn pending(store: &MemoryStateStore) -> BTreeMap<String, PendingTask> {
        load_record(store, StateKey::PendingTasks).unwrap_or_default()
    }

    #[test]
    fn test_begin_uses_tool_use_id() {
        let store = MemoryStateStore::new();
        let key = begin_task(Some("toolu_01"), "heimdall", "review", &store, Utc::now()).unwrap();

        assert_eq!(key, "toolu_01");
        let entries = pending(&store);
        assert_eq!(entries["toolu_01"].subagent_type, "heimdall");
        assert!(store.get(StateKey::PendingTasks).unwrap().contains("\"type\": \"heimdall\""));
    }

    #[test]
    fn test_begin_generates_unique_keys() {
        let store = MemoryStateStore::new();
        let now = Utc::now();
        let a = begin_task(None, "loki", "", &store, now).unwrap();
        let b = begin_task(Some(""), "loki", "", &store, now).unwrap();

        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
        assert_eq!(pending(&store).len(), 2);
    }

    #[test]
    fn test_prompt_is_truncated() {
        let store = MemoryStateStore::new();
        let long = "é".repeat(500);
        begin_task(Some("k"), "tyr", &long, &store, Utc::now()).unwrap();

        assert_eq!(pending(&store)["k"].prompt.chars().count(), 200);
    }

    #[test]
    fn test_finish_pairs_by_key() {
        let store = MemoryStateStore::new();
        // Stored times have millisecond precision
        let start = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        begin_task(Some("a"), "heimdall", "", &store, start).unwrap();
        begin_task(Some("b"), "heimdall", "", &store, start).unwrap();

        let finished =
            finish_task("b", &store, start + chrono::Duration::seconds(42)).unwrap().unwrap();

        assert_eq!(finished.subagent_type, "heimdall");
        assert_eq!(finished.duration, chrono::Duration::seconds(42));
        let left = pending(&store);
        assert!(left.contains_key("a"));
        assert!(!left.contains_key("b"));
    }

    #[test]
    fn test_finish_unknown_key() {
        let store = MemoryStateStore::new();
        begin_task(Some("a"), "loki", "", &store, Utc::now()).unwrap();

        assert!(finish_task("heimdall", &store, Utc::now()).unwrap().is_none());
        assert_eq!(pending(&store).len(), 1);
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let store = MemoryStateStore::new();
        let start = Utc::now();
        begin_task(Some("old"), "odin", "", &store, start).unwrap();

        let later = start + chrono::Duration::minutes(11);
        assert!(finish_task("old", &store, later).unwrap().is_none());
        assert!(pending(&store).is_empty());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let store = MemoryStateStore::new();
        store.insert(StateKey::PendingTasks, r#"{"bad": {"nope": 1}}"#);

        begin_task(Some("good"), "norns", "", &store, Utc::now()).unwrap();

        let entries = pending(&store);
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("good"));
    }
}
