//! Structured diagnostics surfaced alongside results.
//!
//! Discovery and config loading accumulate diagnostics rather than failing
//! fast; the CLI renders them in production order. On a non-error discovery
//! the caller renders; on an error return the failing service attaches them
//! to the returned set so nothing is swallowed.

use std::path::{Path, PathBuf};

use crate::output::Output;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A single structured diagnostic with a stable code.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub path: Option<PathBuf>,
}

impl Diagnostic {
    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.into(),
            message: message.into(),
            path: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: code.into(),
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Render this diagnostic through the standard output helper.
    pub fn render(&self) {
        let location = self
            .path
            .as_ref()
            .map(|p| format!(" [{}]", p.display()))
            .unwrap_or_default();
        let line = format!("{}: {}{}", self.code, self.message, location);
        match self.severity {
            Severity::Warning => Output::warning(line),
            Severity::Error => Output::error(line),
        }
    }
}

/// Render a batch of diagnostics in production order.
pub fn render_all(diagnostics: &[Diagnostic]) {
    for diag in diagnostics {
        diag.render();
    }
}
