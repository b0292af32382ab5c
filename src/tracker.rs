//! Modification and verification tracking.
//!
//! Runs after every tool use. Edits to code or plan files mark the session
//! as needing review; a `Task` call to a known reviewer marks that review as
//! done. The accumulated state is the modification record, which the
//! verification pipeline reads at stop time.

use crate::error::Result;
use crate::paths;
use crate::storage::{load_record, save_record};
use crate::traits::{StateKey, StateStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Records untouched for longer than this belong to an earlier session.
pub const STALE_AFTER_MINUTES: i64 = 60;

/// Extensions counted as source code.
const CODE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "py", "go", "rs", "java", "kt", "c", "cpp", "h", "cs", "rb", "php",
];

/// Config and documentation extensions, never counted as code.
const SKIP_EXTENSIONS: &[&str] = &[
    "json", "yaml", "yml", "toml", "ini", "env", "md", "txt", "rst", "html", "css", "scss", "svg",
];

/// File names never counted as code.
const SKIP_FILES: &[&str] =
    &["package.json", "tsconfig.json", "pyproject.toml", ".env", ".gitignore", "README.md"];

/// Tools whose `file_path` input is a modified file.
const EDIT_TOOLS: &[&str] = &["Edit", "Write", "MultiEdit"];

/// What kind of output a verifier reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierClass {
    /// Reviews code.
    Code,
    /// Reviews plans.
    Plan,
    /// Reviews anything.
    General,
}

impl VerifierClass {
    /// How a verifier of this class is named in tracker messages.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Code => "Code verification agent",
            Self::Plan => "Plan verification agent",
            Self::General => "Verification agent",
        }
    }
}

/// A collaborating subagent whose invocation counts as verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verifier {
    /// `code-reviewer`
    CodeReviewer,
    /// `heimdall`
    Heimdall,
    /// `test-writer`
    TestWriter,
    /// `tyr`
    Tyr,
    /// `plan-reviewer`
    PlanReviewer,
    /// `loki`
    Loki,
    /// `momus`
    Momus,
    /// `oracle`
    Oracle,
    /// `odin`
    Odin,
    /// `norns`
    Norns,
}

impl Verifier {
    /// All known verifiers.
    pub const ALL: [Self; 10] = [
        Self::CodeReviewer,
        Self::Heimdall,
        Self::TestWriter,
        Self::Tyr,
        Self::PlanReviewer,
        Self::Loki,
        Self::Momus,
        Self::Oracle,
        Self::Odin,
        Self::Norns,
    ];

    /// Look up a verifier by subagent type, ignoring case.
    pub fn from_subagent(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|v| v.subagent_name() == name)
    }

    /// The subagent type as passed to the `Task` tool.
    pub const fn subagent_name(self) -> &'static str {
        match self {
            Self::CodeReviewer => "code-reviewer",
            Self::Heimdall => "heimdall",
            Self::TestWriter => "test-writer",
            Self::Tyr => "tyr",
            Self::PlanReviewer => "plan-reviewer",
            Self::Loki => "loki",
            Self::Momus => "momus",
            Self::Oracle => "oracle",
            Self::Odin => "odin",
            Self::Norns => "norns",
        }
    }

    /// What this verifier reviews.
    pub const fn class(self) -> VerifierClass {
        match self {
            Self::CodeReviewer | Self::Heimdall | Self::TestWriter | Self::Tyr => {
                VerifierClass::Code
            }
            Self::PlanReviewer | Self::Loki | Self::Momus | Self::Oracle | Self::Odin => {
                VerifierClass::Plan
            }
            Self::Norns => VerifierClass::General,
        }
    }
}

/// Which verifiers have been invoked. Serialized with one camelCase key
/// per verifier plus `anyVerification`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::struct_excessive_bools)] // One flag per verifier is the record format
pub struct VerificationStatus {
    /// `code-reviewer` was invoked.
    pub code_reviewer: bool,
    /// `heimdall` was invoked.
    pub heimdall: bool,
    /// `test-writer` was invoked.
    pub test_writer: bool,
    /// `tyr` was invoked.
    pub tyr: bool,
    /// `plan-reviewer` was invoked.
    pub plan_reviewer: bool,
    /// `loki` was invoked.
    pub loki: bool,
    /// `momus` was invoked.
    pub momus: bool,
    /// `oracle` was invoked.
    pub oracle: bool,
    /// `odin` was invoked.
    pub odin: bool,
    /// `norns` was invoked.
    pub norns: bool,
    /// At least one verifier was invoked.
    pub any_verification: bool,
}

impl VerificationStatus {
    fn flag_mut(&mut self, verifier: Verifier) -> &mut bool {
        match verifier {
            Verifier::CodeReviewer => &mut self.code_reviewer,
            Verifier::Heimdall => &mut self.heimdall,
            Verifier::TestWriter => &mut self.test_writer,
            Verifier::Tyr => &mut self.tyr,
            Verifier::PlanReviewer => &mut self.plan_reviewer,
            Verifier::Loki => &mut self.loki,
            Verifier::Momus => &mut self.momus,
            Verifier::Oracle => &mut self.oracle,
            Verifier::Odin => &mut self.odin,
            Verifier::Norns => &mut self.norns,
        }
    }

    /// Whether a verifier has been invoked.
    pub const fn is_marked(&self, verifier: Verifier) -> bool {
        match verifier {
            Verifier::CodeReviewer => self.code_reviewer,
            Verifier::Heimdall => self.heimdall,
            Verifier::TestWriter => self.test_writer,
            Verifier::Tyr => self.tyr,
            Verifier::PlanReviewer => self.plan_reviewer,
            Verifier::Loki => self.loki,
            Verifier::Momus => self.momus,
            Verifier::Oracle => self.oracle,
            Verifier::Odin => self.odin,
            Verifier::Norns => self.norns,
        }
    }

    /// Mark a verifier as invoked. Returns true if this changed anything.
    pub fn mark(&mut self, verifier: Verifier) -> bool {
        let changed = !self.is_marked(verifier) || !self.any_verification;
        *self.flag_mut(verifier) = true;
        self.any_verification = true;
        changed
    }

    /// Whether any individual verifier flag is set.
    pub fn any_marked(&self) -> bool {
        Verifier::ALL.into_iter().any(|v| self.is_marked(v))
    }
}

/// Persisted record of what this session modified and who reviewed it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModificationRecord {
    /// A code file was edited.
    #[serde(default)]
    pub code_modified: bool,
    /// A plan file was edited.
    #[serde(default)]
    pub plan_created: bool,
    /// Edited code files, in first-edit order.
    #[serde(default)]
    pub files_modified: Vec<String>,
    /// Edited plan files, in first-edit order.
    #[serde(default)]
    pub plans_modified: Vec<String>,
    /// Which verifiers have run. Older records call this `pipelineStatus`.
    #[serde(default, alias = "pipelineStatus")]
    pub verification_status: VerificationStatus,
    /// Last time the record changed.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_modified: DateTime<Utc>,
    /// Project directory the record belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
}

impl ModificationRecord {
    /// An empty record.
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            code_modified: false,
            plan_created: false,
            files_modified: Vec::new(),
            plans_modified: Vec::new(),
            verification_status: VerificationStatus::default(),
            last_modified: now,
            working_directory: None,
        }
    }

    /// Whether the record has gone untouched for too long.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.last_modified > chrono::Duration::minutes(STALE_AFTER_MINUTES)
    }

    /// Whether the record was written for a different project directory.
    pub fn is_for_other_directory(&self, cwd: &Path) -> bool {
        self.working_directory
            .as_deref()
            .is_some_and(|dir| paths::normalize(Path::new(dir)) != paths::normalize(cwd))
    }

    /// Whether anything needing review was produced.
    pub const fn needs_review(&self) -> bool {
        self.code_modified || self.plan_created
    }

    /// Record an edited code file.
    pub fn add_code_file(&mut self, path: &str) {
        self.code_modified = true;
        if !self.files_modified.iter().any(|f| f == path) {
            self.files_modified.push(path.to_string());
        }
    }

    /// Record an edited plan file.
    pub fn add_plan_file(&mut self, path: &str) {
        self.plan_created = true;
        if !self.plans_modified.iter().any(|f| f == path) {
            self.plans_modified.push(path.to_string());
        }
    }
}

/// Check whether a path is a source code file.
pub fn is_code_file(path: &str) -> bool {
    if path.is_empty() || SKIP_FILES.contains(&paths::display_name(path)) {
        return false;
    }
    let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_lowercase();
    !SKIP_EXTENSIONS.contains(&ext.as_str()) && CODE_EXTENSIONS.contains(&ext.as_str())
}

/// Check whether a path is a plan document.
pub fn is_plan_file(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    let lower = normalized.to_lowercase();
    normalized.contains(".claude/plans/")
        || lower.ends_with("plan.md")
        || lower.ends_with("roadmap.md")
}

/// A tool use as seen by the tracker.
#[derive(Debug, Clone, Copy)]
pub struct ToolUse<'a> {
    /// The tool name (`Edit`, `Task`, ...).
    pub tool_name: &'a str,
    /// The tool's `file_path` input, if any.
    pub file_path: Option<&'a str>,
    /// The tool's `subagent_type` input, if any.
    pub subagent_type: Option<&'a str>,
}

/// Apply one tool use to a record. Returns a message per change made.
pub fn apply_tool_use(record: &mut ModificationRecord, tool: &ToolUse<'_>) -> Vec<String> {
    let mut changes = Vec::new();

    if EDIT_TOOLS.contains(&tool.tool_name) {
        let path = tool.file_path.unwrap_or_default();
        if is_code_file(path) {
            record.add_code_file(path);
            changes.push(format!(
                "Code file modified: {} (requires verification)",
                paths::display_name(path)
            ));
        }
        if is_plan_file(path) {
            record.add_plan_file(path);
            changes.push(format!(
                "Plan file modified: {} (requires review)",
                paths::display_name(path)
            ));
        }
    }

    if tool.tool_name == "Task" {
        if let Some(verifier) = tool.subagent_type.and_then(Verifier::from_subagent) {
            if record.verification_status.mark(verifier) {
                changes.push(format!(
                    "{} '{}' executed",
                    verifier.class().label(),
                    verifier.subagent_name()
                ));
            }
        }
    }

    changes
}

/// Track one post-tool-use event in the persisted record.
///
/// Stale records and records from another directory are replaced before
/// the event is applied. Nothing is written when the event changes nothing.
///
/// # Errors
///
/// Returns an error if the updated record cannot be saved.
pub fn record_tool_use(
    tool: &ToolUse<'_>,
    cwd: &Path,
    store: &dyn StateStore,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    let mut record = load_record::<ModificationRecord>(store, StateKey::Pipeline)
        .filter(|r| !r.is_stale(now) && !r.is_for_other_directory(cwd))
        .unwrap_or_else(|| ModificationRecord::fresh(now));

    let changes = apply_tool_use(&mut record, tool);
    if changes.is_empty() {
        return Ok(changes);
    }

    record.last_modified = now;
    record.working_directory = Some(paths::normalize(cwd));
    save_record(store, StateKey::Pipeline, &record)?;
    Ok(changes)
}
