//! Stop hook orchestration.
//!
//! Runs the gates in a fixed order: the continuation loop, then the
//! verification pipeline, then the advisory pass. The first gate to block
//! decides; the advisory pass can only add warnings.

use crate::advisory;
use crate::config::GateConfig;
use crate::continuation::{run_continuation_loop, LoopInput};
use crate::decision::GateResult;
use crate::error::Result;
use crate::hooks::Envelope;
use crate::pipeline::run_verification_pipeline;
use crate::traits::{CommandRunner, StateStore};
use chrono::{DateTime, Utc};

/// Everything the stop hook needs besides the envelope.
pub struct StopHookContext<'a> {
    /// Effective configuration.
    pub config: &'a GateConfig,
    /// Persisted state.
    pub store: &'a dyn StateStore,
    /// Runner for the advisory test/build commands.
    pub runner: &'a dyn CommandRunner,
    /// Current time.
    pub now: DateTime<Utc>,
}

/// Run the stop hook.
///
/// # Errors
///
/// Returns an error if the envelope cannot be re-serialized or a message
/// template fails to render. State problems never produce an error.
pub fn run_stop_hook(envelope: &Envelope, ctx: &StopHookContext<'_>) -> Result<GateResult> {
    let envelope_text = envelope.to_json()?;
    // An unreadable transcript is the same as no transcript.
    let transcript = envelope
        .transcript_path()
        .and_then(|path| std::fs::read(path).ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

    let input = LoopInput {
        envelope_text: &envelope_text,
        transcript: transcript.as_deref(),
        stop_hook_active: envelope.stop_hook_active(),
        now: ctx.now,
    };
    let continuation = run_continuation_loop(&input, &ctx.config.continuation, ctx.store)?;
    if continuation.is_block() {
        return Ok(continuation);
    }
    let mut messages = continuation.messages;

    let pipeline = run_verification_pipeline(
        &envelope.working_dir(),
        &ctx.config.pipeline,
        ctx.store,
        ctx.now,
    )?;
    if pipeline.is_block() {
        messages.extend(pipeline.messages);
        return Ok(GateResult { messages, ..pipeline });
    }
    messages.extend(pipeline.messages);

    let warnings = advisory::run_advisory_pass(&envelope_text, &ctx.config.advisory, ctx.runner);
    if !warnings.is_empty() {
        messages.push(advisory::render_warnings(&warnings)?);
    }

    Ok(GateResult::allow().with_messages(messages))
}
