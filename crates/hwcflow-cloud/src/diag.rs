//! Diagnostics reported by resource operations
//!
//! A resource operation either succeeds or returns a [`Diagnostics`] list.
//! Entries carry a severity, so a list may hold warnings alongside (or
//! instead of) errors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a single diagnostic entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// One diagnostic entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,

    /// Short, single-line description
    pub summary: String,

    /// Optional longer explanation
    pub detail: Option<String>,

    /// Attribute path the entry refers to (e.g. `source_db.0.ip`)
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_attribute(mut self, path: impl Into<String>) -> Self {
        self.attribute = Some(path.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref path) = self.attribute {
            write!(f, "{}: ", path)?;
        }
        write!(f, "{}", self.summary)?;
        if let Some(ref detail) = self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

/// Ordered list of diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics(Vec<Diagnostic>);

/// Result type of resource operations
pub type DiagResult<T = ()> = std::result::Result<T, Diagnostics>;

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A list holding a single error entry
    pub fn error(summary: impl Into<String>) -> Self {
        Self(vec![Diagnostic::error(summary)])
    }

    /// A list holding a single warning entry
    pub fn warning(summary: impl Into<String>) -> Self {
        Self(vec![Diagnostic::warning(summary)])
    }

    /// Wrap any displayable error as a single error entry
    pub fn from_err(err: impl fmt::Display) -> Self {
        Self::error(err.to_string())
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn has_error(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| !d.is_error())
    }

    /// First error entry, if any
    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.errors().next()
    }

    /// Turn an accumulated list into a result: `Err` when any entry is an error
    pub fn into_result(self) -> DiagResult {
        if self.has_error() { Err(self) } else { Ok(()) }
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Self(vec![diagnostic])
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut errors = self.errors().peekable();
        if errors.peek().is_none() {
            return match self.0.first() {
                Some(first) => write!(f, "{}", first),
                None => write!(f, "no diagnostics"),
            };
        }
        let mut first = true;
        for diagnostic in errors {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}", diagnostic)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}

/// Build an error [`Diagnostics`] from a format string
#[macro_export]
macro_rules! diag_errorf {
    ($($arg:tt)*) => {
        $crate::diag::Diagnostics::error(format!($($arg)*))
    };
}
