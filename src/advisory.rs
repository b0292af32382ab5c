//! Advisory checks run before a session is allowed to end.
//!
//! Nothing here can block a stop. Leftover work markers in the envelope and
//! failing test or build commands are reported as warnings only.

use crate::config::AdvisoryConfig;
use crate::error::{Error, Result};
use crate::templates;
use crate::traits::CommandRunner;
use once_cell::sync::Lazy;
use regex::Regex;
use tera::Context;

/// Markers of unfinished work, with their display labels.
static WORK_MARKERS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("[ ]", Regex::new(r"\[ \]").unwrap()),
        ("TODO", Regex::new(r"(?i)TODO:").unwrap()),
        ("FIXME", Regex::new(r"(?i)FIXME:").unwrap()),
        ("in_progress", Regex::new(r"in_progress").unwrap()),
    ]
});

/// Count each work marker in the text, omitting markers that do not occur.
pub fn scan_work_markers(text: &str) -> Vec<(&'static str, usize)> {
    WORK_MARKERS
        .iter()
        .map(|(label, re)| (*label, re.find_iter(text).count()))
        .filter(|(_, count)| *count > 0)
        .collect()
}

/// Run one verification command, returning a warning if it did not pass.
fn check_command(
    runner: &dyn CommandRunner,
    kind: &str,
    command: &str,
    config: &AdvisoryConfig,
) -> Option<String> {
    match runner.run("sh", &["-c", command], Some(config.timeout())) {
        Ok(output) if output.success() => None,
        Ok(_) => Some(format!("{kind} failed: {command}")),
        Err(Error::CommandTimeout { timeout_secs, .. }) => {
            Some(format!("{kind} timed out after {timeout_secs}s: {command}"))
        }
        Err(e) => Some(format!("{kind} could not run: {command} ({e})")),
    }
}

/// Run the advisory pass, returning the warnings it produced.
pub fn run_advisory_pass(
    envelope_text: &str,
    config: &AdvisoryConfig,
    runner: &dyn CommandRunner,
) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.check_todos {
        let markers = scan_work_markers(envelope_text);
        if !markers.is_empty() {
            warnings.push("Incomplete work found:".to_string());
            warnings.extend(
                markers.into_iter().map(|(label, count)| format!("  - {label}: {count} found")),
            );
        }
    }

    if config.run_tests {
        warnings.extend(check_command(runner, "Tests", &config.test_command, config));
    }
    if config.run_build {
        warnings.extend(check_command(runner, "Build", &config.build_command, config));
    }

    warnings
}

/// Render warnings as the stderr banner.
///
/// # Errors
///
/// Returns an error if the template fails to render.
pub fn render_warnings(warnings: &[String]) -> Result<String> {
    let mut ctx = Context::new();
    ctx.insert("warnings", warnings);
    Ok(templates::render(templates::ADVISORY_WARNINGS, &ctx)?.trim_end().to_string())
}
