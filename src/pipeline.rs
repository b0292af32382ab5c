//! The verification pipeline.
//!
//! Refuses to end a session that changed code or plans until a second agent
//! has been asked to review the work. "Reviewed" only means the right kind
//! of collaborator was invoked; nothing here judges whether it approved.

use crate::config::PipelineConfig;
use crate::decision::GateResult;
use crate::error::{Error, Result};
use crate::paths;
use crate::storage::load_record;
use crate::templates;
use crate::tracker::{ModificationRecord, VerificationStatus};
use crate::traits::{StateKey, StateStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tera::Context;

/// How many modified files the block reason names before summarizing.
const MAX_FILES_TO_SHOW: usize = 3;

/// Which verifier invocations satisfy the code and plan review steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewPolicy {
    /// Code review needs `code-reviewer` or `heimdall`; plan review needs
    /// `plan-reviewer` or `loki`.
    #[default]
    #[serde(rename = "strict")]
    Strict,
    /// Any known verifier satisfies either review step.
    #[serde(rename = "any")]
    AnyVerifier,
}

impl FromStr for ReviewPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "any" => Ok(Self::AnyVerifier),
            other => Err(Error::InvalidInput(format!("unknown review policy: {other}"))),
        }
    }
}

impl ReviewPolicy {
    fn code_reviewed(self, status: &VerificationStatus) -> bool {
        match self {
            Self::Strict => status.code_reviewer || status.heimdall,
            Self::AnyVerifier => status.any_marked(),
        }
    }

    fn plan_reviewed(self, status: &VerificationStatus) -> bool {
        match self {
            Self::Strict => status.plan_reviewer || status.loki,
            Self::AnyVerifier => status.any_marked(),
        }
    }
}

/// A verification step that still has to happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingStep {
    /// Short name of the step.
    pub name: &'static str,
    /// Subagents that would satisfy it.
    pub collaborators: &'static [&'static str],
    /// Why it is required.
    pub justification: &'static str,
}

const CODE_REVIEW: MissingStep = MissingStep {
    name: "code review",
    collaborators: &["heimdall", "code-reviewer"],
    justification: "Code was modified - another agent must review for quality, bugs, and security",
};

const PLAN_REVIEW: MissingStep = MissingStep {
    name: "plan review",
    collaborators: &["loki", "plan-reviewer"],
    justification: "Plan was created - another agent must review for flaws and risks",
};

const ANY_VERIFICATION: MissingStep = MissingStep {
    name: "any verification",
    collaborators: &["heimdall", "loki"],
    justification: "Significant changes were made without any verification by another agent",
};

/// Work out which verification steps the record still lacks.
pub fn missing_steps(record: &ModificationRecord, policy: ReviewPolicy) -> Vec<MissingStep> {
    let status = &record.verification_status;
    let mut missing = Vec::new();

    if record.code_modified && !policy.code_reviewed(status) {
        missing.push(CODE_REVIEW);
    }
    if record.plan_created && !policy.plan_reviewed(status) {
        missing.push(PLAN_REVIEW);
    }
    // Catch-all for records whose flags disagree with their verifier list.
    if missing.is_empty() && record.needs_review() && !status.any_verification {
        missing.push(ANY_VERIFICATION);
    }

    missing
}

/// Evaluate the verification pipeline at stop time.
///
/// `cwd` is the directory the session is working in; a record written for
/// another directory is discarded.
///
/// # Errors
///
/// Returns an error if the block reason template fails to render.
pub fn run_verification_pipeline(
    cwd: &Path,
    config: &PipelineConfig,
    store: &dyn StateStore,
    now: DateTime<Utc>,
) -> Result<GateResult> {
    if !config.enabled {
        return Ok(GateResult::allow());
    }

    let Some(record) = load_record::<ModificationRecord>(store, StateKey::Pipeline) else {
        return Ok(GateResult::allow());
    };
    if !record.needs_review() {
        return Ok(GateResult::allow());
    }

    if record.is_for_other_directory(cwd) {
        return Ok(reset(store, GateResult::allow()).with_message(format!(
            "Verification: discarding record for {}",
            record.working_directory.as_deref().unwrap_or_default()
        )));
    }

    if record.is_stale(now) {
        return Ok(reset(store, GateResult::allow())
            .with_message("Verification: discarding record older than one hour"));
    }

    let missing = missing_steps(&record, config.review_policy);
    if missing.is_empty() {
        return Ok(reset(store, GateResult::allow())
            .with_message("Verification: all outputs verified by another agent"));
    }

    let names: Vec<&str> = missing.iter().map(|s| s.name).collect();
    Ok(GateResult::block(block_reason(&record, &missing)?).with_message(format!(
        "Self-verification required, session termination blocked (missing: {})",
        names.join(", ")
    )))
}

/// Render the reason shown to the agent.
fn block_reason(record: &ModificationRecord, missing: &[MissingStep]) -> Result<String> {
    let mut modified: Vec<&str> = Vec::new();
    for path in record.files_modified.iter().chain(&record.plans_modified) {
        let name = paths::display_name(path);
        if !modified.contains(&name) {
            modified.push(name);
        }
    }
    let shown = &modified[..modified.len().min(MAX_FILES_TO_SHOW)];

    let collaborators: Vec<String> =
        missing.iter().map(|step| step.collaborators.join(" or ")).collect();

    let mut ctx = Context::new();
    ctx.insert("collaborators", &collaborators);
    ctx.insert("steps", missing);
    ctx.insert("files", shown);
    ctx.insert("more_files", &(modified.len() - shown.len()));
    ctx.insert("example_agent", missing.first().map_or("heimdall", |s| s.collaborators[0]));
    Ok(templates::render(templates::PIPELINE_BLOCK, &ctx)?.trim_end().to_string())
}

/// Delete the record, noting any failure on the result.
fn reset(store: &dyn StateStore, result: GateResult) -> GateResult {
    match store.remove(StateKey::Pipeline) {
        Ok(()) => result,
        Err(e) => result.with_message(format!("Warning: Could not clear verification state: {e}")),
    }
}
