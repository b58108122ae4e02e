//! Field evaluation helpers shared by the block builders
//!
//! Each helper evaluates one attribute value, checks its shape and reports
//! at most one diagnostic. When evaluation itself already reported (unknown
//! variable, bad call), the helper yields `None` without piling on a second
//! diagnostic for the same value.

use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;
use std::fmt::Display;

use crate::ast::{Block, Statement, Value};
use crate::diagnostics::{DiagnosticCode, SourceSpan};
use crate::eval::{evaluate, insert_coalescing, EvalContext};
use crate::tokens::{flatten, Token};

/// Generic structural view of a block: labels become `id`/`name`, attributes
/// become entries, nested blocks become objects and lone words become `true`.
pub fn block_to_value(block: &Block) -> Value {
    let mut entries = Vec::new();
    if let Some(id) = block.label(0) {
        entries.push(("id".to_string(), Value::string(id)));
    }
    if let Some(name) = block.label(1) {
        entries.push(("name".to_string(), Value::string(name)));
    }
    for stmt in &block.body {
        match stmt {
            Statement::Attribute(attr) => entries.push((attr.key.clone(), attr.value.clone())),
            Statement::Block(inner) => entries.push((inner.name.clone(), block_to_value(inner))),
            Statement::Bare(bare) => {
                if let Some(word) = bare.value.as_identifier() {
                    entries.push((word.to_string(), Value::Boolean(true)));
                }
            }
            _ => {}
        }
    }
    Value::Object(entries)
}

/// Evaluate a free-form block into a JSON object, coalescing repeated keys
pub fn block_to_json(block: &Block, ctx: &mut EvalContext) -> JsonValue {
    let mut map = Map::new();
    let mut coalesced = BTreeSet::new();
    for stmt in &block.body {
        let (key, value) = match stmt {
            Statement::Attribute(attr) => (attr.key.clone(), evaluate(&attr.value, ctx, &attr.span)),
            Statement::Block(inner) => {
                let mut nested = block_to_json(inner, ctx);
                if let JsonValue::Object(fields) = &mut nested {
                    if let Some(id) = inner.label(0) {
                        fields.insert("id".to_string(), JsonValue::String(id.to_string()));
                    }
                    if let Some(name) = inner.label(1) {
                        fields.insert("name".to_string(), JsonValue::String(name.to_string()));
                    }
                }
                (inner.name.clone(), nested)
            }
            Statement::Bare(bare) => match bare.value.as_identifier() {
                Some(word) => (word.to_string(), JsonValue::Bool(true)),
                None => {
                    ctx.error(
                        DiagnosticCode::InvalidStatement,
                        format!("bare value is not allowed in {}", block.name),
                        &bare.span,
                    );
                    continue;
                }
            },
            other => {
                ctx.error(
                    DiagnosticCode::InvalidStatement,
                    format!("{} statement is not allowed in {}", other.kind_name(), block.name),
                    other.span(),
                );
                continue;
            }
        };
        insert_coalescing(&mut map, &mut coalesced, &key, value);
    }
    JsonValue::Object(map)
}

/// Evaluate, returning `None` when evaluation itself reported an error
pub fn evaluate_checked(value: &Value, ctx: &mut EvalContext, span: &SourceSpan) -> Option<JsonValue> {
    let before = ctx.diagnostics.error_count();
    let evaluated = evaluate(value, ctx, span);
    (ctx.diagnostics.error_count() == before).then_some(evaluated)
}

fn mismatch(ctx: &mut EvalContext, field: &str, expected: &str, found: &JsonValue, span: &SourceSpan) {
    ctx.error(
        DiagnosticCode::TypeMismatch,
        format!(
            "'{}' expects {}, found {}",
            field,
            expected,
            crate::eval::variables::json_type_name(found)
        ),
        span,
    );
}

/// A string (numbers and booleans are taken as their text)
pub fn eval_string(value: &Value, ctx: &mut EvalContext, field: &str, span: &SourceSpan) -> Option<String> {
    match evaluate_checked(value, ctx, span)? {
        JsonValue::String(s) => Some(s),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        other => {
            mismatch(ctx, field, "a string", &other, span);
            None
        }
    }
}

pub fn eval_number(value: &Value, ctx: &mut EvalContext, field: &str, span: &SourceSpan) -> Option<f64> {
    match evaluate_checked(value, ctx, span)? {
        JsonValue::Number(n) => n.as_f64(),
        other => {
            mismatch(ctx, field, "a number", &other, span);
            None
        }
    }
}

pub fn eval_bool(value: &Value, ctx: &mut EvalContext, field: &str, span: &SourceSpan) -> Option<bool> {
    match evaluate_checked(value, ctx, span)? {
        JsonValue::Bool(b) => Some(b),
        other => {
            mismatch(ctx, field, "true or false", &other, span);
            None
        }
    }
}

/// Flat tokens of one value
pub fn eval_tokens(
    value: &Value,
    ctx: &mut EvalContext,
    construct: &str,
    span: &SourceSpan,
) -> Option<Vec<Token>> {
    let evaluated = evaluate_checked(value, ctx, span)?;
    match flatten(&evaluated, construct) {
        Ok(tokens) => Some(tokens),
        Err(e) => {
            ctx.push(e.to_diagnostic(span));
            None
        }
    }
}

/// One word or a list of words
pub fn eval_string_list(
    value: &Value,
    ctx: &mut EvalContext,
    field: &str,
    span: &SourceSpan,
) -> Option<Vec<String>> {
    eval_tokens(value, ctx, field, span).map(|tokens| tokens.iter().map(Token::text).collect())
}

/// A word list with inline `include <set>` and `none` support
pub fn eval_set_valued(
    value: &Value,
    ctx: &mut EvalContext,
    field: &str,
    span: &SourceSpan,
) -> Option<Vec<String>> {
    let words = eval_string_list(value, ctx, field, span)?;
    ctx.resolve_inline_set(&words, field, span)
}

/// Store `value` in an unset slot; a second assignment is an error
pub fn set_once<T>(
    slot: &mut Option<T>,
    value: T,
    field: &str,
    ctx: &mut EvalContext,
    span: &SourceSpan,
) -> bool {
    if slot.is_some() {
        ctx.error(
            DiagnosticCode::DuplicateDeclaration,
            format!("'{}' is given more than once", field),
            span,
        );
        return false;
    }
    *slot = Some(value);
    true
}

/// Required label at `index`
pub fn labeled(block: &Block, index: usize, field: &str, ctx: &mut EvalContext) -> Option<String> {
    match block.label(index) {
        Some(label) => Some(label.to_string()),
        None => {
            ctx.error(
                DiagnosticCode::MissingField,
                format!("{} block is missing its {} label", block.name, field),
                &block.span,
            );
            None
        }
    }
}

/// A value supplied both as a label and as a field must agree.
pub fn reconcile_field<T: PartialEq + Display>(
    field: &str,
    existing: Option<T>,
    candidate: Option<T>,
) -> Result<Option<T>, String> {
    match (existing, candidate) {
        (Some(a), Some(b)) if a != b => Err(format!(
            "{} is '{}' in the label but '{}' in the body",
            field, a, b
        )),
        (Some(a), _) => Ok(Some(a)),
        (None, b) => Ok(b),
    }
}

/// `decay_rate` -> `decayRate`
pub fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
