//! Variable declarations and lazy, cycle-safe resolution
//!
//! Variables are declared with top-level `var <name> <value...>` attributes,
//! `var <name> { ... }` object blocks or `vars { <name> <value...> }` blocks
//! and referenced as `var.<name>` (any
//! configured prefix) with optional dotted path segments.
//!
//! Each name moves through `Unvisited -> Resolving -> Resolved`. Meeting a
//! `Resolving` name again means the declaration refers back to itself; that
//! reports one circular-reference diagnostic and freezes the name to `null`.

use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use super::{evaluate, EvalContext};
use crate::ast::{Block, Statement, Value};
use crate::compiler::fields::block_to_value;
use crate::diagnostics::{
    cycle_error, with_suggestion, Diagnostic, DiagnosticCode, Diagnostics, SourceSpan,
};

/// A declared variable
#[derive(Debug, Clone, PartialEq)]
pub struct VariableEntry {
    pub name: String,
    pub value: Value,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
enum Resolution {
    Unvisited,
    Resolving,
    Resolved(JsonValue),
}

/// Name -> declaration table with per-name resolution state
#[derive(Debug, Default)]
pub struct VariableTable {
    entries: BTreeMap<String, VariableEntry>,
    states: BTreeMap<String, Resolution>,
    stack: Vec<String>,
    used: BTreeSet<String>,
}

impl VariableTable {
    /// Split variable declarations out of the top-level statements.
    ///
    /// Returns the table and the statements that are not declarations.
    pub fn extract(
        statements: Vec<Statement>,
        diagnostics: &mut Diagnostics,
    ) -> (Self, Vec<Statement>) {
        let mut table = Self::default();
        let mut rest = Vec::with_capacity(statements.len());

        for stmt in statements {
            match stmt {
                Statement::Attribute(attr) if attr.key == "var" => {
                    let mut items = attr.value.items().to_vec();
                    let name = match items.first().and_then(Value::as_identifier) {
                        Some(name) if items.len() > 1 => name.to_string(),
                        _ => {
                            diagnostics.error(
                                DiagnosticCode::InvalidStatement,
                                "expected 'var <name> <value>'",
                                &attr.span,
                            );
                            continue;
                        }
                    };
                    items.remove(0);
                    let value = if items.len() == 1 {
                        items.remove(0)
                    } else {
                        Value::Array(items)
                    };
                    table.declare(name, value, attr.span, diagnostics);
                }
                Statement::Block(block) if block.name == "vars" => {
                    table.declare_block(&block, diagnostics);
                }
                Statement::Block(mut block) if block.name == "var" => {
                    if block.labels.len() != 1 {
                        diagnostics.error(
                            DiagnosticCode::InvalidStatement,
                            "expected 'var <name> { ... }'",
                            &block.span,
                        );
                        continue;
                    }
                    let name = block.labels.remove(0);
                    let value = block_to_value(&block);
                    table.declare(name, value, block.span, diagnostics);
                }
                other => rest.push(other),
            }
        }

        (table, rest)
    }

    fn declare_block(&mut self, block: &Block, diagnostics: &mut Diagnostics) {
        if !block.labels.is_empty() {
            diagnostics.error(
                DiagnosticCode::InvalidStatement,
                "'vars' blocks take no labels",
                &block.span,
            );
        }
        for stmt in &block.body {
            match stmt {
                Statement::Attribute(attr) => {
                    self.declare(attr.key.clone(), attr.value.clone(), attr.span.clone(), diagnostics)
                }
                Statement::Block(inner) => self.declare(
                    inner.name.clone(),
                    block_to_value(inner),
                    inner.span.clone(),
                    diagnostics,
                ),
                other => diagnostics.error(
                    DiagnosticCode::InvalidStatement,
                    format!(
                        "{} statement is not a variable declaration",
                        other.kind_name()
                    ),
                    other.span(),
                ),
            }
        }
    }

    /// Declare a variable; a second declaration of the same name is an error.
    pub fn declare(
        &mut self,
        name: String,
        value: Value,
        span: SourceSpan,
        diagnostics: &mut Diagnostics,
    ) {
        if let Some(existing) = self.entries.get(&name) {
            let first = &existing.span;
            diagnostics.error(
                DiagnosticCode::DuplicateDeclaration,
                format!(
                    "variable '{}' is already declared at {}:{}",
                    name, first.file, first.start.line
                ),
                &span,
            );
            return;
        }
        self.states.insert(name.clone(), Resolution::Unvisited);
        self.entries
            .insert(name.clone(), VariableEntry { name, value, span });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&VariableEntry> {
        self.entries.get(name)
    }

    /// Declarations no reference ever resolved, in name order
    pub fn unused(&self) -> impl Iterator<Item = &VariableEntry> {
        self.entries
            .values()
            .filter(|e| !self.used.contains(&e.name))
    }
}

/// Resolve every declaration no reference has reached yet, so errors inside
/// unreferenced variables are reported as well. Does not count as a use.
pub fn resolve_all(ctx: &mut EvalContext) {
    let pending: Vec<(String, SourceSpan)> = ctx
        .variables
        .entries
        .values()
        .filter(|e| matches!(ctx.variables.states.get(&e.name), Some(Resolution::Unvisited)))
        .map(|e| (e.name.clone(), e.span.clone()))
        .collect();
    for (name, span) in pending {
        if !matches!(ctx.variables.states.get(&name), Some(Resolution::Unvisited)) {
            continue;
        }
        let was_used = ctx.variables.used.contains(&name);
        resolve_variable(&name, ctx, &span);
        if !was_used {
            ctx.variables.used.remove(&name);
        }
    }
}

/// Resolve `name.path.segments` against the context's variable table.
pub fn resolve_variable(path: &str, ctx: &mut EvalContext, span: &SourceSpan) -> JsonValue {
    let mut segments = path.split('.');
    let base = segments.next().unwrap_or_default();

    let Some(declared) = ctx.variables.entries.get(base).map(|e| e.value.clone()) else {
        let hint = ctx.suggest(base, ctx.variables.entries.keys().map(String::as_str));
        let message = with_suggestion(format!("unknown variable '{}'", base), hint);
        ctx.error(DiagnosticCode::UnknownVariable, message, span);
        return JsonValue::Null;
    };
    ctx.variables.used.insert(base.to_string());

    let resolved = match ctx.variables.states.get(base) {
        Some(Resolution::Resolved(v)) => v.clone(),
        Some(Resolution::Resolving) => {
            let start = ctx
                .variables
                .stack
                .iter()
                .position(|n| n == base)
                .unwrap_or(0);
            let mut chain: Vec<String> = ctx.variables.stack[start..].to_vec();
            chain.push(base.to_string());
            warn!("circular variable reference: {}", chain.join(" -> "));
            ctx.push(cycle_error("variable", &chain).with_span(span.clone()));
            return JsonValue::Null;
        }
        Some(Resolution::Unvisited) | None => {
            let declared_span = ctx
                .variables
                .entries
                .get(base)
                .map(|e| e.span.clone())
                .unwrap_or_else(|| span.clone());
            ctx.variables
                .states
                .insert(base.to_string(), Resolution::Resolving);
            ctx.variables.stack.push(base.to_string());
            let value = evaluate(&declared, ctx, &declared_span);
            ctx.variables.stack.pop();
            ctx.variables
                .states
                .insert(base.to_string(), Resolution::Resolved(value.clone()));
            value
        }
    };

    let mut current = resolved;
    let mut walked = base.to_string();
    for segment in segments {
        match index_value(current, segment) {
            Ok(next) => current = next,
            Err(message) => {
                ctx.push(
                    Diagnostic::error(
                        DiagnosticCode::InvalidValue,
                        format!("cannot resolve '{}.{}': {}", walked, segment, message),
                    )
                    .with_span(span.clone()),
                );
                return JsonValue::Null;
            }
        }
        walked.push('.');
        walked.push_str(segment);
    }
    current
}

/// Numeric segments index arrays, other segments index map keys
fn index_value(value: JsonValue, segment: &str) -> Result<JsonValue, String> {
    match value {
        JsonValue::Array(mut items) => {
            let index: usize = segment
                .parse()
                .map_err(|_| format!("'{}' is not an array index", segment))?;
            if index >= items.len() {
                return Err(format!(
                    "index {} out of range for array of length {}",
                    index,
                    items.len()
                ));
            }
            Ok(items.swap_remove(index))
        }
        JsonValue::Object(mut map) => map
            .remove(segment)
            .ok_or_else(|| format!("no key '{}'", segment)),
        JsonValue::Null => Err("value is null".to_string()),
        other => Err(format!("cannot index into {}", json_type_name(&other))),
    }
}

pub(crate) fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerOptions;
    use crate::parser::parse_source;
    use crate::registry::ResourceRegistry;
    use crate::sets::SetTable;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn context(src: &str) -> EvalContext {
        let stmts = parse_source(src, "vars.wd").unwrap();
        let mut diagnostics = Diagnostics::new();
        let (table, rest) = VariableTable::extract(stmts, &mut diagnostics);
        assert!(rest.is_empty());
        EvalContext::new(
            CompilerOptions::default(),
            table,
            ResourceRegistry::default(),
            SetTable::default(),
            diagnostics,
        )
    }

    fn lookup(ctx: &mut EvalContext, path: &str) -> JsonValue {
        resolve_variable(path, ctx, &SourceSpan::file_start("use.wd"))
    }

    #[test]
    fn test_simple_and_nested() {
        let mut ctx = context(
            "var base 10\nvars {\n  kinds [npc faction]\n  palette { primary \"red\" }\n}\nvar alias var.kinds.1",
        );
        assert_eq!(lookup(&mut ctx, "base"), json!(10));
        assert_eq!(lookup(&mut ctx, "kinds.0"), json!("npc"));
        assert_eq!(lookup(&mut ctx, "palette.primary"), json!("red"));
        assert_eq!(lookup(&mut ctx, "alias"), json!("faction"));
        assert!(ctx.diagnostics.is_empty());
    }

    #[test]
    fn test_var_block_declares_object() {
        let mut ctx = context("var palette {\n  primary \"red\"\n  shades [light dark]\n}");
        assert_eq!(lookup(&mut ctx, "palette.primary"), json!("red"));
        assert_eq!(lookup(&mut ctx, "palette.shades.1"), json!("dark"));
        assert!(ctx.diagnostics.is_empty());
    }

    #[test]
    fn test_var_block_needs_one_name() {
        let stmts = parse_source("var { x 1 }\nvar a b { x 1 }", "v.wd").unwrap();
        let mut diagnostics = Diagnostics::new();
        let (table, rest) = VariableTable::extract(stmts, &mut diagnostics);
        assert!(rest.is_empty());
        assert!(table.is_empty());
        let codes: Vec<DiagnosticCode> = diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![DiagnosticCode::InvalidStatement, DiagnosticCode::InvalidStatement]);
    }

    #[test]
    fn test_circular_reference() {
        let mut ctx = context("var a var.b\nvar b var.a");
        assert_eq!(lookup(&mut ctx, "a"), JsonValue::Null);
        assert_eq!(ctx.diagnostics.error_count(), 1);
        let diag = ctx.diagnostics.iter().next().unwrap();
        assert_eq!(diag.code, DiagnosticCode::CircularReference);
        assert!(diag.message.contains("a -> b -> a"));

        // frozen: no second diagnostic
        assert_eq!(lookup(&mut ctx, "b"), JsonValue::Null);
        assert_eq!(ctx.diagnostics.error_count(), 1);
    }

    #[test]
    fn test_self_reference() {
        let mut ctx = context("var a [1 var.a]");
        assert_eq!(lookup(&mut ctx, "a"), json!([1, null]));
        assert_eq!(ctx.diagnostics.error_count(), 1);
    }

    #[test]
    fn test_unknown_variable_suggestion() {
        let mut ctx = context("var palette 1");
        lookup(&mut ctx, "pallete");
        let diag = ctx.diagnostics.iter().next().unwrap();
        assert_eq!(diag.code, DiagnosticCode::UnknownVariable);
        assert!(diag.message.contains("did you mean 'palette'"));
    }

    #[test]
    fn test_bad_index() {
        let mut ctx = context("var list [a b]");
        assert_eq!(lookup(&mut ctx, "list.5"), JsonValue::Null);
        assert!(ctx
            .diagnostics
            .iter()
            .any(|d| d.message.contains("out of range")));
    }

    #[test]
    fn test_resolve_all_reports_unreferenced_cycle() {
        let mut ctx = context("var a var.b\nvar b var.a\nvar c 1");
        resolve_all(&mut ctx);
        assert_eq!(ctx.diagnostics.error_count(), 1);
        let unused: Vec<&str> = ctx.variables.unused().map(|e| e.name.as_str()).collect();
        assert_eq!(unused, vec!["a", "c"]);
    }

    #[test]
    fn test_duplicate_and_unused() {
        let stmts = parse_source("var a 1\nvar a 2\nvar b 3", "d.wd").unwrap();
        let mut diagnostics = Diagnostics::new();
        let (table, _) = VariableTable::extract(stmts, &mut diagnostics);
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(table.len(), 2);
        let unused: Vec<&str> = table.unused().map(|e| e.name.as_str()).collect();
        assert_eq!(unused, vec!["a", "b"]);
    }
}
