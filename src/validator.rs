//! Formatting validator
//!
//! Fast structural pass over the parsed statement forest, run before any
//! semantic work. It catches statements that can never be valid at the top
//! level and declared ids that do not follow the identifier format, so later
//! stages can assume a well-formed tree.
//!
//! # Key Constraints
//!
//! - Top level holds only blocks, attributes (declarations and shorthand)
//!   and `rel` seed relationships
//! - Container blocks hold only blocks
//! - Declared ids match `CompilerOptions::id_pattern`

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::ast::{Block, Statement};
use crate::compiler::expand::container_child;
use crate::config::CompilerOptions;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics, SourceSpan};

static DEFAULT_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$").unwrap());

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Formatting violation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{kind} statement is not allowed at the top level")]
    TopLevelStatement { kind: &'static str },

    #[error("{kind} statement is not allowed directly inside container '{container}'")]
    ContainerStatement {
        kind: &'static str,
        container: String,
    },

    #[error("container '{container}' holds '{child}' blocks only, found '{found}'")]
    WrongChild {
        container: String,
        child: &'static str,
        found: String,
    },

    #[error("invalid id '{id}' for {block}: ids must match {pattern}")]
    InvalidId {
        id: String,
        block: String,
        pattern: String,
    },

    #[error("empty label in {block}")]
    EmptyLabel { block: String },
}

impl ValidationError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            ValidationError::TopLevelStatement { .. }
            | ValidationError::ContainerStatement { .. }
            | ValidationError::WrongChild { .. } => DiagnosticCode::InvalidStatement,
            ValidationError::InvalidId { .. } | ValidationError::EmptyLabel { .. } => {
                DiagnosticCode::InvalidFormat
            }
        }
    }

    pub fn to_diagnostic(&self, span: &SourceSpan) -> Diagnostic {
        Diagnostic::error(self.code(), self.to_string()).with_span(span.clone())
    }
}

// =============================================================================
// VALIDATION RESULT
// =============================================================================

/// Statistics gathered during validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub statement_count: usize,
    pub block_count: usize,
    pub declaration_count: usize,
    pub relationship_count: usize,
}

/// Label position that carries the id for blocks that declare one
pub fn id_label_index(block_name: &str) -> Option<usize> {
    match block_name {
        "system" => Some(1),
        "project" | "entity_kind" | "relationship_kind" | "culture" | "tag" | "axis"
        | "pressure" | "era" | "generator" | "action" | "seed_entity" | "naming_domain"
        | "grammar" | "lexeme_list" | "naming_profile" | "page" | "set" => Some(0),
        _ => None,
    }
}

// =============================================================================
// VALIDATOR
// =============================================================================

/// Validate the top-level statement forest, pushing one diagnostic per
/// violation.
pub fn validate_formatting(
    statements: &[Statement],
    options: &CompilerOptions,
    diagnostics: &mut Diagnostics,
) -> ValidationStats {
    let pattern = id_regex(options, diagnostics);
    let mut validator = FormatValidator {
        pattern,
        pattern_text: &options.id_pattern,
        diagnostics,
        stats: ValidationStats::default(),
    };
    for stmt in statements {
        validator.top_level(stmt);
    }
    validator.stats
}

fn id_regex(options: &CompilerOptions, diagnostics: &mut Diagnostics) -> Option<Regex> {
    if options.id_pattern == DEFAULT_ID_PATTERN.as_str() {
        return Some(DEFAULT_ID_PATTERN.clone());
    }
    match Regex::new(&options.id_pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::InvalidValue,
                format!("invalid id_pattern '{}': {}", options.id_pattern, e),
            ));
            None
        }
    }
}

struct FormatValidator<'a> {
    pattern: Option<Regex>,
    pattern_text: &'a str,
    diagnostics: &'a mut Diagnostics,
    stats: ValidationStats,
}

impl FormatValidator<'_> {
    fn report(&mut self, error: ValidationError, span: &SourceSpan) {
        self.diagnostics.push(error.to_diagnostic(span));
    }

    fn top_level(&mut self, stmt: &Statement) {
        self.stats.statement_count += 1;
        match stmt {
            Statement::Block(block) => {
                self.stats.block_count += 1;
                if matches!(block.name.as_str(), "vars" | "set") {
                    self.stats.declaration_count += 1;
                }
                match container_child(&block.name) {
                    Some(child) => self.container(block, child),
                    None => self.block_labels(block),
                }
            }
            Statement::Attribute(attr) => {
                if matches!(attr.key.as_str(), "var" | "set") {
                    self.stats.declaration_count += 1;
                }
            }
            Statement::Rel(_) => self.stats.relationship_count += 1,
            other => self.report(
                ValidationError::TopLevelStatement {
                    kind: other.kind_name(),
                },
                other.span(),
            ),
        }
    }

    fn container(&mut self, block: &Block, child: &'static str) {
        for stmt in &block.body {
            self.stats.statement_count += 1;
            match stmt {
                Statement::Block(inner) if inner.name == child => {
                    self.stats.block_count += 1;
                    self.block_labels(inner);
                }
                Statement::Block(inner) => self.report(
                    ValidationError::WrongChild {
                        container: block.name.clone(),
                        child,
                        found: inner.name.clone(),
                    },
                    &inner.span,
                ),
                // `seed_relationships { rel ... }` is the natural container form
                Statement::Rel(_) if child == "seed_relationship" => {
                    self.stats.relationship_count += 1;
                }
                other => self.report(
                    ValidationError::ContainerStatement {
                        kind: other.kind_name(),
                        container: block.name.clone(),
                    },
                    other.span(),
                ),
            }
        }
    }

    fn block_labels(&mut self, block: &Block) {
        if block.labels.iter().any(|l| l.is_empty()) {
            self.report(
                ValidationError::EmptyLabel {
                    block: block.name.clone(),
                },
                &block.span,
            );
            return;
        }
        let Some(index) = id_label_index(&block.name) else {
            return;
        };
        let Some(id) = block.label(index) else {
            return;
        };
        let Some(pattern) = &self.pattern else {
            return;
        };
        if !pattern.is_match(id) {
            let error = ValidationError::InvalidId {
                id: id.to_string(),
                block: block.name.clone(),
                pattern: self.pattern_text.to_string(),
            };
            self.report(error, &block.span);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn validate(src: &str) -> (Diagnostics, ValidationStats) {
        let stmts = parse_source(src, "v.wd").unwrap();
        let mut diagnostics = Diagnostics::new();
        let stats = validate_formatting(&stmts, &CompilerOptions::default(), &mut diagnostics);
        (diagnostics, stats)
    }

    #[test]
    fn test_valid_forest() {
        let (diags, stats) = validate(
            "project demo {}\nvar x 1\nset s a b\nrel ally a -> b\npressures {\n  pressure p {}\n}",
        );
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(stats.declaration_count, 2);
        assert_eq!(stats.relationship_count, 1);
        assert_eq!(stats.block_count, 3);
    }

    #[test]
    fn test_top_level_predicate_rejected() {
        let (diags, _) = validate("pressure.x >= 3\nmutate a.b = 1");
        assert_eq!(diags.error_count(), 2);
        assert!(diags
            .iter()
            .all(|d| d.code == DiagnosticCode::InvalidStatement));
    }

    #[test]
    fn test_bad_id() {
        let (diags, _) = validate("era \"Dawn Age\" {}\nsystem graph_contagion plague-1 {}");
        assert_eq!(diags.error_count(), 1);
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.code, DiagnosticCode::InvalidFormat);
        assert!(diag.message.contains("Dawn Age"));
    }

    #[test]
    fn test_container_children() {
        let (diags, _) = validate("eras {\n  era a {}\n  pressure b {}\n  summary \"x\"\n}");
        assert_eq!(diags.error_count(), 2);
    }
}
