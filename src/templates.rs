//! Template loading and rendering using Tera.
//!
//! User-facing messages (block reasons, warning banners, status output) are
//! Tera templates embedded in the binary. A project can override any of
//! them by pointing `templates_dir` in its config at a directory of `.tera`
//! files with the same relative names.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use tera::{Context, Tera};

/// Continuation-loop block reason.
pub const CONTINUATION_BLOCK: &str = "messages/continuation/block.tera";

/// Verification-pipeline block reason.
pub const PIPELINE_BLOCK: &str = "messages/pipeline/block.tera";

/// Advisory warning banner.
pub const ADVISORY_WARNINGS: &str = "messages/advisory/warnings.tera";

/// `status` command output.
pub const STATUS: &str = "messages/status.tera";

/// Embedded default templates for fallback when files don't exist.
static EMBEDDED_TEMPLATES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();

    m.insert(
        CONTINUATION_BLOCK,
        include_str!("../templates/messages/continuation/block.tera"),
    );
    m.insert(PIPELINE_BLOCK, include_str!("../templates/messages/pipeline/block.tera"));
    m.insert(ADVISORY_WARNINGS, include_str!("../templates/messages/advisory/warnings.tera"));
    m.insert(STATUS, include_str!("../templates/messages/status.tera"));

    m
});

/// Global template engine with caching.
static TERA: Lazy<RwLock<Option<Tera>>> = Lazy::new(|| RwLock::new(None));

/// Initialize the template engine.
///
/// Templates found under `templates_dir` take precedence; anything missing
/// is filled in from the embedded defaults. With no directory, only the
/// embedded defaults are used.
///
/// # Errors
///
/// Returns an error if the templates directory exists but contains invalid
/// templates.
pub fn init_templates(templates_dir: Option<&Path>) -> Result<()> {
    let mut tera = Tera::default();

    if let Some(dir) = templates_dir.filter(|d| d.exists()) {
        let glob_pattern = format!("{}/**/*.tera", dir.display());
        tera = Tera::new(&glob_pattern).map_err(|e| {
            Error::Template(format!("Failed to load templates from {}: {e}", dir.display()))
        })?;
    }

    for (name, content) in EMBEDDED_TEMPLATES.iter() {
        if tera.get_template(name).is_err() {
            tera.add_raw_template(name, content)
                .map_err(|e| Error::Template(format!("Invalid embedded template {name}: {e}")))?;
        }
    }

    *TERA.write().map_err(|e| Error::Template(e.to_string()))? = Some(tera);

    Ok(())
}

/// Render a template with the given context.
///
/// The engine is initialized with embedded defaults on first use if
/// [`init_templates`] has not been called.
///
/// # Errors
///
/// Returns an error if the template doesn't exist or rendering fails.
pub fn render(name: &str, context: &Context) -> Result<String> {
    let needs_init = TERA.read().map_err(|e| Error::Template(e.to_string()))?.is_none();

    if needs_init {
        init_templates(None)?;
    }

    let guard = TERA.read().map_err(|e| Error::Template(e.to_string()))?;
    let tera = guard.as_ref().ok_or_else(|| Error::Template("Templates not initialized".into()))?;
    let rendered = tera
        .render(name, context)
        .map_err(|e| Error::Template(format!("Failed to render template {name}: {e}")))?;
    drop(guard);

    Ok(rendered)
}

/// Reset the template cache, forcing re-initialization on next use.
///
/// # Errors
///
/// Returns an error if the write lock cannot be acquired.
pub fn reset_cache() -> Result<()> {
    *TERA.write().map_err(|e| Error::Template(e.to_string()))? = None;
    Ok(())
}

/// Get the list of all embedded template names.
#[must_use]
pub fn embedded_template_names() -> Vec<&'static str> {
    EMBEDDED_TEMPLATES.keys().copied().collect()
}

/// Verify all embedded templates can be rendered with sample data.
///
/// # Errors
///
/// Returns an error if any template fails to render.
pub fn verify_all_templates() -> Result<()> {
    reset_cache()?;
    init_templates(None)?;

    for name in embedded_template_names() {
        render(name, &sample_context())
            .map_err(|e| Error::Template(format!("Template {name} failed to render: {e}")))?;
    }

    Ok(())
}

/// Create a sample context with every variable a template might need.
fn sample_context() -> Context {
    let mut ctx = Context::new();

    // Continuation
    ctx.insert("iteration", &2_u32);
    ctx.insert("max_iterations", &20_u32);
    ctx.insert("marker", "COMPLETE");
    ctx.insert("prompt", "Finish the migration");

    // Pipeline
    ctx.insert("collaborators", &["heimdall", "loki"]);
    ctx.insert(
        "steps",
        &[serde_json::json!({
            "name": "code review",
            "collaborators": ["heimdall", "code-reviewer"],
            "justification": "Code was modified",
        })],
    );
    ctx.insert("files", &["main.rs", "lib.rs"]);
    ctx.insert("more_files", &2_usize);
    ctx.insert("example_agent", "heimdall");

    // Advisory
    ctx.insert("warnings", &["Tests failed: npm test"]);

    // Status
    ctx.insert("state_dir", "/home/user/.claude");
    ctx.insert(
        "records",
        &[serde_json::json!({ "name": "ralph-state.json", "contents": "{}" })],
    );

    ctx
}
