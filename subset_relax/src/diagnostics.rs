//! Diagnostics produced by the passes.
//!
//! A [`Diagnostics`] collector is created per pass and threaded through every
//! sub-operation as `&mut Diagnostics`. Recoverable problems are recorded with
//! [`Diagnostics::emit`] and processing continues. Invariant violations go
//! through [`Diagnostics::emit_fatal`], which hands back a [`Fatal`] marker
//! that callers propagate with `?` up to the pass boundary.
//!
//! The collected records are rendered once, when the pass finishes.

use crate::span::Span;
use std::fmt;

/// Category of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A type could not be determined; the node is left untyped.
    UnresolvedType,
    /// An inferred type conflicts with an annotation or a structural requirement.
    Mismatch,
    /// A global name has no module entry.
    UndefinedReference,
    /// A structural precondition of the IR is broken.
    InvariantViolation,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::UnresolvedType => "unresolved-type",
            DiagnosticKind::Mismatch => "mismatch",
            DiagnosticKind::UndefinedReference => "undefined-reference",
            DiagnosticKind::InvariantViolation => "invariant-violation",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Recoverable; the pass continues.
    Error,
    /// Unrecoverable; the pass is aborted.
    Fatal,
}

/// A single diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub span: Span,
    pub message: String,
    /// Optional name of the global function being processed.
    pub context: Option<String>,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            span,
            message: message.into(),
            context: None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        write!(f, "{}[{}]: {}", severity, self.kind, self.message)?;
        if !self.span.is_synthetic() {
            write!(
                f,
                " at line {}, column {}",
                self.span.start_line, self.span.start_column
            )?;
        }
        if let Some(ctx) = &self.context {
            write!(f, " (in {})", ctx)?;
        }
        Ok(())
    }
}

/// Marker returned by [`Diagnostics::emit_fatal`]; the fatal record itself is
/// already in the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fatal;

/// Append-only diagnostic collector.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
    context: Option<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `name` as context to every record emitted until the next call.
    pub fn set_context(&mut self, name: Option<&str>) {
        self.context = name.map(str::to_string);
    }

    /// Record a recoverable diagnostic.
    pub fn emit(&mut self, mut diagnostic: Diagnostic) {
        if diagnostic.context.is_none() {
            diagnostic.context = self.context.clone();
        }
        tracing::trace!(%diagnostic, "diagnostic emitted");
        self.records.push(diagnostic);
    }

    /// Shorthand for `emit(Diagnostic::error(..))`.
    pub fn error(&mut self, kind: DiagnosticKind, span: Span, message: impl Into<String>) {
        self.emit(Diagnostic::error(kind, span, message));
    }

    /// Record an unrecoverable invariant violation.
    pub fn emit_fatal(&mut self, span: Span, message: impl Into<String>) -> Fatal {
        let mut diagnostic = Diagnostic::error(DiagnosticKind::InvariantViolation, span, message);
        diagnostic.severity = Severity::Fatal;
        self.emit(diagnostic);
        Fatal
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_fatal(&self) -> bool {
        self.records.iter().any(|d| d.severity == Severity::Fatal)
    }

    pub fn count_kind(&self, kind: DiagnosticKind) -> usize {
        self.records.iter().filter(|d| d.kind == kind).count()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.records.iter()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.records.extend(other.records);
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.records
    }

    /// One line per record, in emission order.
    pub fn render(&self) -> String {
        self.records
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_attaches_context() {
        let mut diags = Diagnostics::new();
        diags.set_context(Some("main"));
        diags.error(DiagnosticKind::Mismatch, Span::synthetic(), "bad");
        diags.set_context(None);
        diags.error(DiagnosticKind::UnresolvedType, Span::synthetic(), "unknown");

        let records: Vec<_> = diags.iter().collect();
        assert_eq!(records[0].context.as_deref(), Some("main"));
        assert_eq!(records[1].context, None);
        assert!(!diags.has_fatal());
    }

    #[test]
    fn test_emit_fatal_records_invariant_violation() {
        let mut diags = Diagnostics::new();
        let Fatal = diags.emit_fatal(Span::new(3, 7, 3, 9), "binding target is not a variable");
        assert!(diags.has_fatal());
        assert_eq!(diags.count_kind(DiagnosticKind::InvariantViolation), 1);
    }

    #[test]
    fn test_render() {
        let mut diags = Diagnostics::new();
        diags.error(
            DiagnosticKind::UndefinedReference,
            Span::new(4, 2, 4, 5),
            "no global variable named 'g' in module",
        );
        diags.set_context(Some("f"));
        diags.error(DiagnosticKind::UnresolvedType, Span::synthetic(), "untyped");
        insta::assert_snapshot!(diags.render(), @r"
        error[undefined-reference]: no global variable named 'g' in module at line 4, column 2
        error[unresolved-type]: untyped (in f)
        ");
    }
}
