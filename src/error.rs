//! Compiler error types.
//!
//! Each local construct (a factor, a condition, a reference) fails with one of
//! these typed errors. The construct boundary turns the error into a single
//! [`Diagnostic`] and the compile continues with the construct's siblings.

use thiserror::Error;

use crate::diagnostics::{Diagnostic, DiagnosticCode, SourceSpan};

/// Syntax error raised by a [`crate::parser::SourceParser`].
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    /// Best-effort location of the failure
    pub span: Option<SourceSpan>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Option<SourceSpan>) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

/// Failure of a token-stream micro-parser.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TokenError {
    #[error("{construct}: expected {expected}, found end of input")]
    UnexpectedEnd { construct: String, expected: String },

    #[error("{construct}: expected {expected}, found '{found}'")]
    Unexpected {
        construct: String,
        expected: String,
        found: String,
    },

    #[error("{construct}: unknown option '{key}'{hint}")]
    UnknownOption {
        construct: String,
        key: String,
        hint: String,
    },

    #[error("{construct}: unknown type '{found}'{hint}")]
    UnknownType {
        construct: String,
        found: String,
        hint: String,
    },

    #[error("{construct}: missing required option '{key}'")]
    MissingOption { construct: String, key: String },

    #[error("{construct}: option '{key}' given more than once")]
    DuplicateOption { construct: String, key: String },

    #[error("{construct}: nested {shape} values are not allowed in a token list")]
    NestedValue { construct: String, shape: String },

    #[error("{construct}: invalid value '{value}' for '{field}', expected one of: {allowed}")]
    InvalidChoice {
        construct: String,
        field: String,
        value: String,
        allowed: String,
    },

    #[error("{construct}: {message}")]
    Invalid { construct: String, message: String },
}

impl TokenError {
    pub fn invalid(construct: &str, message: impl Into<String>) -> Self {
        TokenError::Invalid {
            construct: construct.to_string(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> DiagnosticCode {
        match self {
            TokenError::UnknownOption { .. } => DiagnosticCode::UnknownField,
            TokenError::MissingOption { .. } => DiagnosticCode::MissingField,
            TokenError::NestedValue { .. } => DiagnosticCode::TypeMismatch,
            TokenError::UnexpectedEnd { .. }
            | TokenError::Unexpected { .. }
            | TokenError::UnknownType { .. }
            | TokenError::DuplicateOption { .. }
            | TokenError::InvalidChoice { .. }
            | TokenError::Invalid { .. } => DiagnosticCode::InvalidValue,
        }
    }

    pub fn to_diagnostic(&self, span: &SourceSpan) -> Diagnostic {
        Diagnostic::error(self.code(), self.to_string()).with_span(span.clone())
    }
}

/// Failure to resolve a `<name>.id` resource reference or a set name.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("'{0}' is not a resource reference (expected '<name>.id')")]
    NotAReference(String),

    #[error("unknown {allowed} '{name}'{hint}")]
    UnknownResource {
        name: String,
        allowed: String,
        hint: String,
    },

    #[error("ambiguous reference '{name}.id': matches {matches}")]
    Ambiguous { name: String, matches: String },

    #[error("unknown set '{name}'{hint}")]
    UnknownSet { name: String, hint: String },

    #[error("'none' cannot be combined with other items in set {0}")]
    NoneWithItems(String),

    #[error("'include' must be followed by a set name in {0}")]
    DanglingInclude(String),
}

impl ResolveError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            ResolveError::NotAReference(_) => DiagnosticCode::InvalidValue,
            ResolveError::UnknownResource { .. } => DiagnosticCode::UnknownResource,
            ResolveError::Ambiguous { .. } => DiagnosticCode::AmbiguousReference,
            ResolveError::UnknownSet { .. } => DiagnosticCode::UnknownSet,
            ResolveError::NoneWithItems(_) | ResolveError::DanglingInclude(_) => {
                DiagnosticCode::InvalidValue
            }
        }
    }

    pub fn to_diagnostic(&self, span: &SourceSpan) -> Diagnostic {
        Diagnostic::error(self.code(), self.to_string()).with_span(span.clone())
    }
}

/// Failure inside the expression function table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FunctionError {
    #[error("unknown function '{name}'{hint}")]
    Unknown { name: String, hint: String },

    #[error("{name}() expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: String,
        found: usize,
    },

    #[error("{name}(): {message}")]
    Argument { name: String, message: String },
}

impl FunctionError {
    pub fn argument(name: &str, message: impl Into<String>) -> Self {
        FunctionError::Argument {
            name: name.to_string(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> DiagnosticCode {
        match self {
            FunctionError::Unknown { .. } => DiagnosticCode::UnknownFunction,
            FunctionError::Arity { .. } | FunctionError::Argument { .. } => {
                DiagnosticCode::FunctionArgument
            }
        }
    }
}

/// Failure to bind an alias in a reference position.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    #[error("'{alias}' is not declared in this scope{hint}")]
    Unbound { alias: String, hint: String },

    #[error("'{0}' is already declared in this scope")]
    AlreadyDeclared(String),

    #[error("empty reference")]
    Empty,
}

impl BindError {
    pub fn to_diagnostic(&self, span: &SourceSpan) -> Diagnostic {
        let code = match self {
            BindError::Unbound { .. } => DiagnosticCode::UnboundReference,
            BindError::AlreadyDeclared(_) => DiagnosticCode::DuplicateDeclaration,
            BindError::Empty => DiagnosticCode::InvalidValue,
        };
        Diagnostic::error(code, self.to_string()).with_span(span.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TokenError::UnknownOption {
            construct: "entity_count".into(),
            key: "kindd".into(),
            hint: " (did you mean 'kind'?)".into(),
        };
        assert_eq!(
            err.to_string(),
            "entity_count: unknown option 'kindd' (did you mean 'kind'?)"
        );
        assert_eq!(err.code(), DiagnosticCode::UnknownField);

        let err = ResolveError::Ambiguous {
            name: "north".into(),
            matches: "culture, culture".into(),
        };
        assert!(err.to_string().contains("north.id"));
        assert_eq!(err.code(), DiagnosticCode::AmbiguousReference);
    }

    #[test]
    fn error_to_diagnostic_keeps_span() {
        let span = SourceSpan::file_start("w.wd");
        let diag = FunctionError::argument("sort", "mixed list");
        assert_eq!(diag.code(), DiagnosticCode::FunctionArgument);
        let diag = BindError::Unbound {
            alias: "hero".into(),
            hint: String::new(),
        }
        .to_diagnostic(&span);
        assert_eq!(diag.span, Some(span));
        assert_eq!(diag.code, DiagnosticCode::UnboundReference);
    }
}
