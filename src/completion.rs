//! Completion detection.
//!
//! Decides whether the agent's visible output says its work is finished.
//! Each source of text (the hook envelope, the session transcript) is run
//! through an ordered table of checks; the first check with an opinion
//! decides for that source, and the sources are OR-combined.

use once_cell::sync::Lazy;
use regex::Regex;

/// Reason reported when no check had an opinion.
pub const NO_SIGNAL: &str = "no signal";

/// Todo status entries in JSON key/value form. Backslash-escaped quotes are
/// accepted so todos embedded in a JSON string still count.
static TODO_STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\\?"status\\?"\s*:\s*\\?"(completed|in_progress|pending)\\?""#).unwrap()
});

/// Phrases that count as "done" regardless of the configured marker.
static COMPLETION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?is)<promise>.*?COMPLETE.*?</promise>",
        r"TASK_COMPLETE",
        r"\[COMPLETE\]",
        r"(?i)task\s*complete",
        r"(?i)all\s*tasks.*complete",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Result of running the detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// Whether completion was detected.
    pub complete: bool,
    /// Human-readable explanation.
    pub reason: String,
    /// Label of the check that decided, if any.
    pub check: Option<&'static str>,
}

impl Detection {
    fn no_signal() -> Self {
        Self { complete: false, reason: NO_SIGNAL.to_string(), check: None }
    }
}

/// A decisive outcome from one check.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Verdict {
    Complete(String),
    Incomplete(String),
}

type Check = fn(&CompletionDetector, &str) -> Option<Verdict>;

/// The checks, in evaluation order.
const CHECKS: [(&str, Check); 3] = [
    ("todo census", CompletionDetector::todo_census),
    ("custom marker", CompletionDetector::custom_marker),
    ("completion pattern", CompletionDetector::completion_pattern),
];

/// Detects completion signals in agent output.
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    marker: String,
}

impl Default for CompletionDetector {
    fn default() -> Self {
        Self::with_marker(crate::config::DEFAULT_COMPLETION_MARKER)
    }
}

impl CompletionDetector {
    /// Create a detector using the given literal completion marker.
    #[must_use]
    pub fn with_marker(marker: impl Into<String>) -> Self {
        Self { marker: marker.into() }
    }

    /// Detect completion in the envelope text and, if given, the transcript.
    ///
    /// Completion in either source wins. Otherwise the reason comes from the
    /// first source with an explicit incomplete verdict, or is
    /// [`NO_SIGNAL`].
    #[must_use]
    pub fn detect(&self, envelope: &str, transcript: Option<&str>) -> Detection {
        let results: Vec<(&'static str, Verdict)> = std::iter::once(envelope)
            .chain(transcript)
            .filter_map(|text| self.evaluate(text))
            .collect();

        let mut first_incomplete = None;
        for (check, verdict) in results {
            match verdict {
                Verdict::Complete(reason) => {
                    return Detection { complete: true, reason, check: Some(check) };
                }
                Verdict::Incomplete(reason) => {
                    first_incomplete.get_or_insert(Detection {
                        complete: false,
                        reason,
                        check: Some(check),
                    });
                }
            }
        }

        first_incomplete.unwrap_or_else(Detection::no_signal)
    }

    /// Run the check table over one source.
    fn evaluate(&self, text: &str) -> Option<(&'static str, Verdict)> {
        CHECKS.iter().find_map(|(label, check)| check(self, text).map(|v| (*label, v)))
    }

    fn todo_census(&self, text: &str) -> Option<Verdict> {
        let (mut completed, mut in_progress, mut pending) = (0usize, 0usize, 0usize);
        for caps in TODO_STATUS.captures_iter(text) {
            match &caps[1] {
                "completed" => completed += 1,
                "in_progress" => in_progress += 1,
                _ => pending += 1,
            }
        }

        if completed > 0 && in_progress == 0 && pending == 0 {
            return Some(Verdict::Complete(format!("All todos complete ({completed})")));
        }
        if completed + in_progress + pending > 0 {
            return Some(Verdict::Incomplete(format!(
                "Todos incomplete - completed: {completed}, in_progress: {in_progress}, pending: {pending}"
            )));
        }
        None
    }

    fn custom_marker(&self, text: &str) -> Option<Verdict> {
        (!self.marker.is_empty() && text.contains(&self.marker))
            .then(|| Verdict::Complete(format!("Custom marker \"{}\"", self.marker)))
    }

    fn completion_pattern(&self, text: &str) -> Option<Verdict> {
        COMPLETION_PATTERNS
            .iter()
            .any(|p| p.is_match(text))
            .then(|| Verdict::Complete("Text pattern match".to_string()))
    }
}

/// Drop every line containing `needle`.
///
/// Used to keep the gate's own block messages, which quote the marker, from
/// being read back out of the transcript as a completion signal.
#[must_use]
pub fn without_lines_containing(text: &str, needle: &str) -> String {
    text.lines().filter(|line| !line.contains(needle)).collect::<Vec<_>>().join("\n")
}
