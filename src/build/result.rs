//! Build result types.
//!
//! Contains the outcome of a single build call.

use serde::Serialize;
use std::time::Duration;

/// Outcome of one build call.
///
/// Asset compilation failures are an expected outcome and are returned as
/// data; infrastructure problems are reported through `BuildError` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "errors", rename_all = "lowercase")]
pub enum BuildResult {
    /// Every asset built
    Success,
    /// The engine reported failure; one line per asset error
    Failure(Vec<String>),
}

impl BuildResult {
    /// Check if the build succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, BuildResult::Success)
    }

    /// Check if the build failed.
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Error lines collected during the build (empty on success).
    pub fn error_lines(&self) -> &[String] {
        match self {
            BuildResult::Success => &[],
            BuildResult::Failure(lines) => lines,
        }
    }

    /// Newline-joined error text, or `None` on success.
    pub fn error_text(&self) -> Option<String> {
        match self {
            BuildResult::Success => None,
            BuildResult::Failure(lines) => Some(lines.join("\n")),
        }
    }

    /// Format a one-line summary of the result.
    pub fn summary(&self, assets: usize, duration: Duration) -> String {
        match self {
            BuildResult::Success => format!(
                "Build succeeded: {} asset{} in {:?}",
                assets,
                if assets == 1 { "" } else { "s" },
                duration
            ),
            BuildResult::Failure(lines) => format!(
                "Build failed: {} error{} ({} asset{})",
                lines.len(),
                if lines.len() == 1 { "" } else { "s" },
                assets,
                if assets == 1 { "" } else { "s" }
            ),
        }
    }
}

impl std::fmt::Display for BuildResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildResult::Success => write!(f, "success"),
            BuildResult::Failure(lines) => write!(f, "failed:\n{}", lines.join("\n")),
        }
    }
}
