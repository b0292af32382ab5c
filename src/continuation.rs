//! The continuation loop ("Ralph").
//!
//! Keeps an agent working by blocking each stop until a completion signal
//! shows up or the iteration budget is spent. The iteration count survives
//! between hook processes in the continuation record.

use crate::completion::{self, CompletionDetector};
use crate::config::ContinuationConfig;
use crate::decision::GateResult;
use crate::error::Result;
use crate::storage::{load_record, save_record};
use crate::templates;
use crate::traits::{StateKey, StateStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tera::Context;

/// Every continuation block reason starts with this.
pub const LOOP_REASON_PREFIX: &str = "[Ralph Loop ";

/// Records whose loop started longer ago than this belong to an old session.
const STALE_AFTER_MINUTES: i64 = 60;

/// Persisted continuation-loop state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationRecord {
    /// Number of stops blocked so far.
    pub iterations: u32,
    /// When the loop started.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
}

impl ContinuationRecord {
    /// A record for a loop starting now.
    pub const fn fresh(now: DateTime<Utc>) -> Self {
        Self { iterations: 0, start_time: now }
    }

    /// Whether this record belongs to an earlier session.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.start_time > chrono::Duration::minutes(STALE_AFTER_MINUTES)
    }

    /// Load the current record, or a fresh one if absent, unreadable or stale.
    pub fn load_or_fresh(store: &dyn StateStore, now: DateTime<Utc>) -> Self {
        load_record::<Self>(store, StateKey::Continuation)
            .filter(|record| !record.is_stale(now))
            .unwrap_or_else(|| Self::fresh(now))
    }
}

/// Inputs for one evaluation of the loop.
#[derive(Debug, Clone)]
pub struct LoopInput<'a> {
    /// The stop envelope, serialized.
    pub envelope_text: &'a str,
    /// The session transcript, if it could be read.
    pub transcript: Option<&'a str>,
    /// The host's re-entry flag.
    pub stop_hook_active: bool,
    /// Current time.
    pub now: DateTime<Utc>,
}

/// Evaluate the continuation loop for one stop event.
///
/// # Errors
///
/// Returns an error if the block reason template fails to render. State
/// I/O problems are reported as messages and never fail the loop.
pub fn run_continuation_loop(
    input: &LoopInput<'_>,
    config: &ContinuationConfig,
    store: &dyn StateStore,
) -> Result<GateResult> {
    if !config.enabled {
        return Ok(GateResult::allow());
    }

    if input.stop_hook_active {
        return Ok(reset(store, GateResult::allow())
            .with_message("Ralph loop: stop_hook_active detected, allowing termination"));
    }

    let mut record = ContinuationRecord::load_or_fresh(store, input.now);

    // Our own block messages quote the marker, so they must not count.
    let transcript =
        input.transcript.map(|t| completion::without_lines_containing(t, LOOP_REASON_PREFIX));
    let detection = CompletionDetector::with_marker(&config.completion_marker)
        .detect(input.envelope_text, transcript.as_deref());

    if detection.complete {
        let by = detection.check.map(|check| format!(" by {check}")).unwrap_or_default();
        return Ok(reset(store, GateResult::allow()).with_message(format!(
            "Ralph loop: completion detected{by}: {} ({} iterations)",
            detection.reason, record.iterations
        )));
    }

    if record.iterations >= config.max_iterations {
        return Ok(reset(store, GateResult::allow()).with_message(format!(
            "Ralph loop: max iterations ({}) reached",
            config.max_iterations
        )));
    }

    record.iterations += 1;
    let reason = block_reason(config, record.iterations)?;
    // An unsaved counter would hold the loop at the same iteration forever.
    if let Err(e) = save_record(store, StateKey::Continuation, &record) {
        return Ok(GateResult::allow()
            .with_message(format!("Warning: Could not save loop state: {e}; allowing termination")));
    }

    Ok(GateResult::block(reason).with_message(format!(
        "Ralph loop: iteration {}/{} ({}), continuing work",
        record.iterations, config.max_iterations, detection.reason
    )))
}

/// Render the reason shown to the agent when a stop is blocked.
fn block_reason(config: &ContinuationConfig, iteration: u32) -> Result<String> {
    let mut ctx = Context::new();
    ctx.insert("iteration", &iteration);
    ctx.insert("max_iterations", &config.max_iterations);
    ctx.insert("marker", &config.completion_marker);
    ctx.insert("prompt", &config.prompt);
    Ok(templates::render(templates::CONTINUATION_BLOCK, &ctx)?.trim_end().to_string())
}

/// Delete the record, noting any failure on the result.
fn reset(store: &dyn StateStore, result: GateResult) -> GateResult {
    match store.remove(StateKey::Continuation) {
        Ok(()) => result,
        Err(e) => result.with_message(format!("Warning: Could not clear loop state: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingStateStore, MemoryStateStore};

    fn enabled(max_iterations: u32) -> ContinuationConfig {
        ContinuationConfig { enabled: true, max_iterations, ..Default::default() }
    }

    fn input(envelope_text: &str) -> LoopInput<'_> {
        LoopInput { envelope_text, transcript: None, stop_hook_active: false, now: Utc::now() }
    }

    #[test]
    fn test_disabled_touches_nothing() {
        let store = MemoryStateStore::new();
        store.insert(StateKey::Continuation, "garbage");

        let result =
            run_continuation_loop(&input("{}"), &ContinuationConfig::default(), &store).unwrap();

        assert!(!result.is_block());
        assert_eq!(store.get(StateKey::Continuation).as_deref(), Some("garbage"));
    }

    #[test]
    #[serial_test::serial]
    fn test_blocks_until_max_then_allows() {
        let store = MemoryStateStore::new();
        let config = enabled(3);

        for n in 1..=3 {
            let result = run_continuation_loop(&input("{}"), &config, &store).unwrap();
            let reason = result.block_reason.unwrap();
            assert!(reason.starts_with(&format!("[Ralph Loop {n}/3]")), "got {reason}");
            assert!(reason.ends_with("Output \"COMPLETE\" when complete."));
        }

        let result = run_continuation_loop(&input("{}"), &config, &store).unwrap();
        assert!(!result.is_block());
        assert!(!store.contains(StateKey::Continuation));
    }

    #[test]
    #[serial_test::serial]
    fn test_record_persists_iterations() {
        let store = MemoryStateStore::new();
        let now = Utc::now();
        let loop_input = LoopInput { now, ..input("{}") };

        run_continuation_loop(&loop_input, &enabled(5), &store).unwrap();

        let record: ContinuationRecord = load_record(&store, StateKey::Continuation).unwrap();
        assert_eq!(record.iterations, 1);
        assert_eq!(record.start_time.timestamp_millis(), now.timestamp_millis());

        let raw = store.get(StateKey::Continuation).unwrap();
        assert!(raw.contains("\"startTime\""));
    }

    #[test]
    fn test_completion_resets() {
        let store = MemoryStateStore::new();
        store.insert(StateKey::Continuation, r#"{"iterations": 2, "startTime": 0}"#);

        let result =
            run_continuation_loop(&input("all done: COMPLETE"), &enabled(5), &store).unwrap();

        assert!(!result.is_block());
        assert!(!store.contains(StateKey::Continuation));
        assert_eq!(
            result.messages[0],
            "Ralph loop: completion detected by custom marker: Custom marker \"COMPLETE\" (2 iterations)"
        );
    }

    #[test]
    fn test_stop_hook_active_resets() {
        let store = MemoryStateStore::new();
        store.insert(StateKey::Continuation, r#"{"iterations": 2, "startTime": 0}"#);

        let loop_input = LoopInput { stop_hook_active: true, ..input("{}") };
        let result = run_continuation_loop(&loop_input, &enabled(5), &store).unwrap();

        assert!(!result.is_block());
        assert!(!store.contains(StateKey::Continuation));
    }

    #[test]
    #[serial_test::serial]
    fn test_stale_record_starts_over() {
        let store = MemoryStateStore::new();
        let now = Utc::now();
        let old = ContinuationRecord {
            iterations: 4,
            start_time: now - chrono::Duration::minutes(61),
        };
        save_record(&store, StateKey::Continuation, &old).unwrap();

        let result =
            run_continuation_loop(&LoopInput { now, ..input("{}") }, &enabled(5), &store).unwrap();

        assert!(result.block_reason.unwrap().starts_with("[Ralph Loop 1/5]"));
    }

    #[test]
    #[serial_test::serial]
    fn test_malformed_record_starts_over() {
        let store = MemoryStateStore::new();
        store.insert(StateKey::Continuation, "{not json");

        let result = run_continuation_loop(&input("{}"), &enabled(5), &store).unwrap();

        assert!(result.block_reason.unwrap().starts_with("[Ralph Loop 1/5]"));
    }

    #[test]
    #[serial_test::serial]
    fn test_own_block_message_in_transcript_is_ignored() {
        let store = MemoryStateStore::new();
        let transcript = "{\"content\":\"[Ralph Loop 1/5] Completion marker not found. \
                          Please continue work. Output \\\"COMPLETE\\\" when complete.\"}";
        let loop_input = LoopInput { transcript: Some(transcript), ..input("{}") };

        let result = run_continuation_loop(&loop_input, &enabled(5), &store).unwrap();

        assert!(result.is_block());
    }

    #[test]
    fn test_transcript_completion_allows() {
        let store = MemoryStateStore::new();
        let loop_input = LoopInput { transcript: Some("{\"text\":\"TASK_COMPLETE\"}"), ..input("{}") };

        let result = run_continuation_loop(&loop_input, &enabled(5), &store).unwrap();

        assert!(!result.is_block());
    }

    #[test]
    #[serial_test::serial]
    fn test_prompt_is_reinjected() {
        let store = MemoryStateStore::new();
        let config = ContinuationConfig {
            prompt: Some("Port the remaining handlers".to_string()),
            ..enabled(5)
        };

        let result = run_continuation_loop(&input("{}"), &config, &store).unwrap();

        assert!(result
            .block_reason
            .unwrap()
            .ends_with("\n\nTask instruction: Port the remaining handlers"));
    }

    #[test]
    #[serial_test::serial]
    fn test_unsaved_counter_allows_termination() {
        let result = run_continuation_loop(&input("{}"), &enabled(5), &FailingStateStore).unwrap();

        assert!(!result.is_block());
        assert_eq!(
            result.messages,
            vec!["Warning: Could not save loop state: I/O error: state unavailable; allowing termination"
                .to_string()]
        );
    }
}
