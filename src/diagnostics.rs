//! Unified Diagnostics Module
//!
//! Single diagnostic type shared by every compiler pass: parsing, formatting
//! validation, declaration extraction, block compilation and cross-linking.
//! The [`Diagnostics`] sink is append-only and keeps insertion order, so two
//! compiles of the same input report identical lists.

use serde::{Deserialize, Serialize};

/// Diagnostic severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Diagnostic codes for categorizing issues
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    // =========================================================================
    // Syntax / structure
    // =========================================================================
    SyntaxError,
    InvalidStatement,
    InvalidFormat,

    // =========================================================================
    // Schema
    // =========================================================================
    UnknownBlock,
    UnknownField,
    MissingField,
    TypeMismatch,
    InvalidValue,

    // =========================================================================
    // References
    // =========================================================================
    UnknownVariable,
    UnknownSet,
    UnknownResource,
    AmbiguousReference,
    CircularReference,
    UnboundReference,
    UnknownFunction,
    FunctionArgument,

    // =========================================================================
    // Semantics
    // =========================================================================
    DuplicateDeclaration,
    DuplicateId,
    DuplicateName,
    FieldMismatch,
    DanglingReference,
    MissingProject,
    UnusedDeclaration,
}

/// A line/column/offset triple. Lines and columns are 1-based, offsets are
/// byte offsets into the source file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

/// Source location span
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub file: String,
    pub start: Position,
    pub end: Position,
}

impl SourceSpan {
    pub fn new(file: impl Into<String>, start: Position, end: Position) -> Self {
        Self {
            file: file.into(),
            start,
            end,
        }
    }

    /// Create a span from byte offsets (requires source text for line/col calculation)
    pub fn from_byte_offset(file: &str, source: &str, start: usize, end: usize) -> Self {
        let index = LineIndex::new(source);
        Self::new(file, index.position(start), index.position(end))
    }

    /// Span pointing at the start of a file, used when nothing better is known
    pub fn file_start(file: &str) -> Self {
        let origin = Position {
            line: 1,
            column: 1,
            offset: 0,
        };
        Self::new(file, origin, origin)
    }
}

/// Precomputed line starts for fast offset → line/column conversion
#[derive(Clone, Debug)]
pub struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .char_indices()
                .filter(|(_, c)| *c == '\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            source,
            line_starts,
        }
    }

    /// Convert byte offset to line and column
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = self
            .source
            .get(line_start..offset)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(0);
        Position {
            line: line as u32 + 1,
            column: column as u32 + 1,
            offset,
        }
    }
}

/// A diagnostic message with location and severity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
}

impl Diagnostic {
    /// Create an error diagnostic
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            span: None,
        }
    }

    /// Create a warning diagnostic
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            span: None,
        }
    }

    /// Add source span
    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    /// Add a span when one is available
    pub fn with_span_opt(mut self, span: Option<&SourceSpan>) -> Self {
        self.span = span.cloned();
        self
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }

    /// Check if this is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self.severity, Severity::Warning)
    }
}

// =============================================================================
// Sink
// =============================================================================

/// Ordered, append-only diagnostics list shared by every pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    /// Record an error at `span`
    pub fn error(&mut self, code: DiagnosticCode, message: impl Into<String>, span: &SourceSpan) {
        self.push(Diagnostic::error(code, message).with_span(span.clone()));
    }

    /// Record a warning at `span`
    pub fn warning(
        &mut self,
        code: DiagnosticCode,
        message: impl Into<String>,
        span: &SourceSpan,
    ) {
        self.push(Diagnostic::warning(code, message).with_span(span.clone()));
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.items.extend(iter);
    }
}

// =============================================================================
// Suggestions
// =============================================================================

/// Find the closest candidate to `name` by Jaro-Winkler similarity.
pub fn suggest<'a, I>(name: &str, candidates: I, threshold: f64) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .map(|candidate| (strsim::jaro_winkler(name, candidate), candidate))
        .filter(|(score, _)| *score >= threshold)
        .max_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(a.1)))
        .map(|(_, candidate)| candidate.to_string())
}

/// Append a "did you mean" hint to a message when a suggestion exists
pub fn with_suggestion(message: String, suggestion: Option<String>) -> String {
    match suggestion {
        Some(s) => format!("{} (did you mean '{}'?)", message, s),
        None => message,
    }
}

// =============================================================================
// Convenience Builders
// =============================================================================

/// Create an error for a circular reference chain
pub fn cycle_error(what: &str, chain: &[String]) -> Diagnostic {
    Diagnostic::error(
        DiagnosticCode::CircularReference,
        format!("circular {} reference: {}", what, chain.join(" -> ")),
    )
}

/// Create an error for a duplicate id within one collection
pub fn duplicate_id_error(collection: &str, id: &str) -> Diagnostic {
    Diagnostic::error(
        DiagnosticCode::DuplicateId,
        format!("duplicate id '{}' in {}", id, collection),
    )
}

/// Create an error for a missing required field
pub fn missing_field_error(field: &str, construct: &str) -> Diagnostic {
    Diagnostic::error(
        DiagnosticCode::MissingField,
        format!("missing required field '{}' in {}", field, construct),
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let diag = Diagnostic::error(DiagnosticCode::SyntaxError, "unexpected token");
        assert!(diag.is_error());
        assert!(!diag.is_warning());
        assert_eq!(diag.message, "unexpected token");
    }

    #[test]
    fn test_warning_not_error() {
        let mut sink = Diagnostics::new();
        sink.warning(
            DiagnosticCode::UnusedDeclaration,
            "unused",
            &SourceSpan::file_start("a.wd"),
        );
        assert!(!sink.has_errors());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_line_index() {
        let source = "line1\nline2\nline3";
        let index = LineIndex::new(source);
        assert_eq!(index.position(0).line, 1);
        assert_eq!(index.position(5).column, 6);
        assert_eq!(index.position(6).line, 2);
        assert_eq!(index.position(6).column, 1);
        assert_eq!(index.position(12).line, 3);
    }

    #[test]
    fn test_span_from_offsets() {
        let span = SourceSpan::from_byte_offset("w.wd", "ab\ncd", 3, 5);
        assert_eq!(span.start.line, 2);
        assert_eq!(span.end.column, 3);
        assert_eq!(span.file, "w.wd");
    }

    #[test]
    fn test_serialized_shape() {
        let diag = Diagnostic::error(DiagnosticCode::DuplicateId, "dup")
            .with_span(SourceSpan::file_start("a.wd"));
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["severity"], "error");
        assert_eq!(json["code"], "duplicate_id");
        assert_eq!(json["span"]["start"]["line"], 1);
    }

    #[test]
    fn test_suggest() {
        let hint = suggest("presure", ["pressure", "era", "culture"], 0.8);
        assert_eq!(hint.as_deref(), Some("pressure"));
        assert!(suggest("zzz", ["pressure"], 0.8).is_none());
    }

    #[test]
    fn test_cycle_error() {
        let diag = cycle_error("set", &["a".to_string(), "b".to_string(), "a".to_string()]);
        assert_eq!(diag.code, DiagnosticCode::CircularReference);
        assert!(diag.message.contains("a -> b -> a"));
    }
}
