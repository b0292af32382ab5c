//! Configuration management for claude-stopgate.
//!
//! Settings are layered: built-in defaults, then the optional project file
//! `.claude/stopgate-config.yaml`, then environment variables. Environment
//! variables keep the names used by the rest of the hook suite
//! (`RALPH_ENABLED`, `PIPELINE_SKIP`, `VERIFY_TESTS`, ...).

use crate::error::Result;
use crate::pipeline::ReviewPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file path relative to project root.
pub const CONFIG_FILE_PATH: &str = ".claude/stopgate-config.yaml";

/// Default maximum number of continuation iterations.
pub const DEFAULT_MAX_ITERATIONS: u32 = 20;

/// Default completion marker.
pub const DEFAULT_COMPLETION_MARKER: &str = "COMPLETE";

/// Default timeout for advisory test/build commands.
pub const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 60;

/// Continuation-loop ("Ralph") settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContinuationConfig {
    /// Whether the loop runs at all.
    pub enabled: bool,
    /// Maximum number of blocked stops before giving up.
    pub max_iterations: u32,
    /// Literal marker whose presence counts as completion.
    pub completion_marker: String,
    /// Instruction re-injected with every block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl Default for ContinuationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            completion_marker: DEFAULT_COMPLETION_MARKER.to_string(),
            prompt: None,
        }
    }
}

/// Verification-pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Whether the pipeline can block a stop.
    pub enabled: bool,
    /// Which verifiers satisfy which review step.
    pub review_policy: ReviewPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { enabled: true, review_policy: ReviewPolicy::Strict }
    }
}

/// Advisory pass settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)] // Config structs legitimately have many boolean flags
pub struct AdvisoryConfig {
    /// Scan the envelope for leftover work markers.
    pub check_todos: bool,
    /// Run the test command.
    pub run_tests: bool,
    /// Run the build command.
    pub run_build: bool,
    /// Shell command used for tests.
    pub test_command: String,
    /// Shell command used for the build.
    pub build_command: String,
    /// Upper bound on each command's run time, in seconds.
    pub timeout_secs: u64,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            check_todos: true,
            run_tests: false,
            run_build: false,
            test_command: "npm test".to_string(),
            build_command: "npm run build".to_string(),
            timeout_secs: DEFAULT_VERIFY_TIMEOUT_SECS,
        }
    }
}

impl AdvisoryConfig {
    /// Get the command timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Complete configuration for the stop gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    /// Continuation-loop settings.
    pub continuation: ContinuationConfig,
    /// Verification-pipeline settings.
    pub pipeline: PipelineConfig,
    /// Advisory pass settings.
    pub advisory: AdvisoryConfig,
    /// Append every hook invocation to the debug event log.
    pub debug_logging: bool,
    /// Directory of `.tera` files overriding the embedded messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,
}

impl GateConfig {
    /// Load config from a specific base directory, returning None if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_from(base_dir: &Path) -> Result<Option<Self>> {
        let config_path = Self::config_path(base_dir);
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(Some(config))
    }

    /// Get the config file path for a base directory.
    pub fn config_path(base_dir: &Path) -> PathBuf {
        base_dir.join(CONFIG_FILE_PATH)
    }

    /// Resolve the effective configuration for a project directory.
    ///
    /// A config file that fails to parse is reported and skipped: the hooks
    /// must still run on defaults plus environment.
    pub fn resolve(base_dir: &Path, messages: &mut Vec<String>) -> Self {
        let base = match Self::load_from(base_dir) {
            Ok(config) => config.unwrap_or_default(),
            Err(e) => {
                messages.push(format!("Warning: Could not load config: {e}"));
                Self::default()
            }
        };
        base.with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Apply environment-variable overrides using the given lookup.
    #[must_use]
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str| lookup(name).map(|v| v.trim().to_string());
        let text = |name: &str| flag(name).filter(|v| !v.is_empty());

        // Opt-in switches are on only for the literal "true"; opt-out
        // switches are off only for the literal "false".
        if let Some(v) = flag("RALPH_ENABLED") {
            self.continuation.enabled = v == "true";
        }
        if let Some(n) = text("RALPH_MAX_ITERATIONS").and_then(|v| v.parse::<u32>().ok()) {
            if n > 0 {
                self.continuation.max_iterations = n;
            }
        }
        if let Some(marker) = text("RALPH_COMPLETION_MARKER") {
            self.continuation.completion_marker = marker;
        }
        if let Some(prompt) = lookup("RALPH_PROMPT").filter(|p| !p.trim().is_empty()) {
            self.continuation.prompt = Some(prompt);
        }

        if let Some(v) = flag("PIPELINE_SKIP") {
            self.pipeline.enabled = v != "true";
        }
        if let Some(policy) = text("PIPELINE_REVIEW_POLICY").and_then(|v| v.parse().ok()) {
            self.pipeline.review_policy = policy;
        }

        if let Some(v) = flag("VERIFY_TODOS") {
            self.advisory.check_todos = v != "false";
        }
        if let Some(v) = flag("VERIFY_TESTS") {
            self.advisory.run_tests = v == "true";
        }
        if let Some(v) = flag("VERIFY_BUILD") {
            self.advisory.run_build = v == "true";
        }
        if let Some(cmd) = text("TEST_COMMAND") {
            self.advisory.test_command = cmd;
        }
        if let Some(cmd) = text("BUILD_COMMAND") {
            self.advisory.build_command = cmd;
        }
        if let Some(secs) = text("VERIFY_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            if secs > 0 {
                self.advisory.timeout_secs = secs;
            }
        }

        if let Some(v) = flag("STOPGATE_DEBUG") {
            self.debug_logging = v == "true";
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GateConfig::default();
        assert!(!config.continuation.enabled);
        assert_eq!(config.continuation.max_iterations, 20);
        assert_eq!(config.continuation.completion_marker, "COMPLETE");
        assert!(config.continuation.prompt.is_none());
        assert!(config.pipeline.enabled);
        assert_eq!(config.pipeline.review_policy, ReviewPolicy::Strict);
        assert!(config.advisory.check_todos);
        assert!(!config.advisory.run_tests);
        assert!(!config.advisory.run_build);
        assert_eq!(config.advisory.test_command, "npm test");
        assert_eq!(config.advisory.build_command, "npm run build");
        assert_eq!(config.advisory.timeout(), Duration::from_secs(60));
        assert!(!config.debug_logging);
    }

    #[test]
    fn test_env_overrides_all() {
        let config = GateConfig::default().with_env_overrides(env(&[
            ("RALPH_ENABLED", "true"),
            ("RALPH_MAX_ITERATIONS", "3"),
            ("RALPH_COMPLETION_MARKER", "DONE"),
            ("RALPH_PROMPT", "Finish the migration"),
            ("PIPELINE_SKIP", "true"),
            ("PIPELINE_REVIEW_POLICY", "any"),
            ("VERIFY_TODOS", "false"),
            ("VERIFY_TESTS", "true"),
            ("VERIFY_BUILD", "true"),
            ("TEST_COMMAND", "cargo test"),
            ("BUILD_COMMAND", "cargo build"),
            ("VERIFY_TIMEOUT_SECS", "5"),
            ("STOPGATE_DEBUG", "true"),
        ]));

        assert!(config.continuation.enabled);
        assert_eq!(config.continuation.max_iterations, 3);
        assert_eq!(config.continuation.completion_marker, "DONE");
        assert_eq!(config.continuation.prompt.as_deref(), Some("Finish the migration"));
        assert!(!config.pipeline.enabled);
        assert_eq!(config.pipeline.review_policy, ReviewPolicy::AnyVerifier);
        assert!(!config.advisory.check_todos);
        assert!(config.advisory.run_tests);
        assert!(config.advisory.run_build);
        assert_eq!(config.advisory.test_command, "cargo test");
        assert_eq!(config.advisory.build_command, "cargo build");
        assert_eq!(config.advisory.timeout_secs, 5);
        assert!(config.debug_logging);
    }

    #[test]
    fn test_switches_need_exact_values() {
        let config = GateConfig::default().with_env_overrides(env(&[
            ("RALPH_ENABLED", "yes"),
            ("PIPELINE_SKIP", "1"),
            ("VERIFY_TODOS", "0"),
        ]));
        assert!(!config.continuation.enabled);
        assert!(config.pipeline.enabled);
        assert!(config.advisory.check_todos);
    }

    #[test]
    fn test_invalid_numbers_keep_defaults() {
        let config = GateConfig::default().with_env_overrides(env(&[
            ("RALPH_MAX_ITERATIONS", "0"),
            ("VERIFY_TIMEOUT_SECS", "soon"),
        ]));
        assert_eq!(config.continuation.max_iterations, 20);
        assert_eq!(config.advisory.timeout_secs, 60);

        let config =
            GateConfig::default().with_env_overrides(env(&[("RALPH_MAX_ITERATIONS", "lots")]));
        assert_eq!(config.continuation.max_iterations, 20);
    }

    #[test]
    fn test_empty_strings_keep_defaults() {
        let config = GateConfig::default().with_env_overrides(env(&[
            ("RALPH_COMPLETION_MARKER", ""),
            ("RALPH_PROMPT", "   "),
            ("TEST_COMMAND", ""),
        ]));
        assert_eq!(config.continuation.completion_marker, "COMPLETE");
        assert!(config.continuation.prompt.is_none());
        assert_eq!(config.advisory.test_command, "npm test");
    }

    #[test]
    fn test_load_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(GateConfig::load_from(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_serialized_config_loads_back() {
        let dir = TempDir::new().unwrap();
        let mut config = GateConfig::default();
        config.continuation.enabled = true;
        config.continuation.max_iterations = 7;
        config.debug_logging = true;

        std::fs::create_dir_all(dir.path().join(".claude")).unwrap();
        std::fs::write(GateConfig::config_path(dir.path()), serde_yaml::to_string(&config).unwrap())
            .unwrap();

        let loaded = GateConfig::load_from(dir.path()).unwrap().unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".claude")).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_PATH),
            "continuation:\n  enabled: true\npipeline:\n  review_policy: any\n",
        )
        .unwrap();

        let config = GateConfig::load_from(dir.path()).unwrap().unwrap();
        assert!(config.continuation.enabled);
        assert_eq!(config.continuation.max_iterations, 20);
        assert!(config.pipeline.enabled);
        assert_eq!(config.pipeline.review_policy, ReviewPolicy::AnyVerifier);
        assert!(config.advisory.check_todos);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file_config = GateConfig::default();
        file_config.continuation.enabled = true;

        let config = file_config.with_env_overrides(env(&[("RALPH_ENABLED", "false")]));
        assert!(!config.continuation.enabled);
    }

    #[test]
    #[serial_test::serial]
    fn test_resolve_reports_bad_file() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".claude")).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_PATH), "continuation: [unclosed").unwrap();

        let mut messages = Vec::new();
        let config = GateConfig::resolve(dir.path(), &mut messages);

        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Could not load config"));
        assert_eq!(config.continuation.max_iterations, GateConfig::default().continuation.max_iterations);
    }
}
