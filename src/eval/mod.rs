//! Value evaluation
//!
//! Turns unevaluated [`ast::Value`](crate::ast::Value) nodes into plain
//! `serde_json::Value` data. Variable references resolve through the
//! [`VariableTable`], calls dispatch through the closed function table in
//! [`functions`].
//!
//! Everything a resolution function may touch lives in one [`EvalContext`]
//! owned by a single compile call and passed down by `&mut`.

pub mod functions;
pub mod variables;

use serde_json::{Map, Number, Value as JsonValue};
use std::collections::BTreeSet;
use tracing::debug;

use crate::ast::Value;
use crate::config::CompilerOptions;
use crate::diagnostics::{
    suggest, with_suggestion, Diagnostic, DiagnosticCode, Diagnostics, SourceSpan,
};
use crate::registry::{ResourceKind, ResourceRegistry};
use crate::sets::SetTable;

pub use variables::{VariableEntry, VariableTable};

/// Per-compile evaluation state
#[derive(Debug)]
pub struct EvalContext {
    pub options: CompilerOptions,
    pub variables: VariableTable,
    pub registry: ResourceRegistry,
    pub sets: SetTable,
    pub diagnostics: Diagnostics,
    call_depth: usize,
}

impl EvalContext {
    pub fn new(
        options: CompilerOptions,
        variables: VariableTable,
        registry: ResourceRegistry,
        sets: SetTable,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            options,
            variables,
            registry,
            sets,
            diagnostics,
            call_depth: 0,
        }
    }

    /// Context with no declarations, for evaluating standalone values
    pub fn empty(options: CompilerOptions) -> Self {
        Self::new(
            options,
            VariableTable::default(),
            ResourceRegistry::default(),
            SetTable::default(),
            Diagnostics::new(),
        )
    }

    pub fn error(&mut self, code: DiagnosticCode, message: impl Into<String>, span: &SourceSpan) {
        self.diagnostics.error(code, message, span);
    }

    pub fn warning(&mut self, code: DiagnosticCode, message: impl Into<String>, span: &SourceSpan) {
        self.diagnostics.warning(code, message, span);
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }

    /// "Did you mean" lookup honoring the configured threshold
    pub fn suggest<'a, I>(&self, name: &str, candidates: I) -> Option<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        suggest(name, candidates, self.options.suggestion_threshold)
    }

    /// Report an unknown key with a suggestion drawn from `known`
    pub fn unknown_field(&mut self, construct: &str, key: &str, known: &[&str], span: &SourceSpan) {
        let hint = self.suggest(key, known.iter().copied());
        let message = with_suggestion(format!("unknown field '{}' in {}", key, construct), hint);
        self.error(DiagnosticCode::UnknownField, message, span);
    }

    /// Resolve a `<name>.id` reference, reporting failures. Returns the id.
    pub fn resolve_resource(
        &mut self,
        reference: &str,
        allowed: &[ResourceKind],
        span: &SourceSpan,
    ) -> Option<String> {
        let threshold = self.options.suggestion_threshold;
        match self.registry.resolve_reference(reference, allowed, threshold) {
            Ok(entry) => Some(entry.id.clone()),
            Err(e) => {
                self.push(e.to_diagnostic(span));
                None
            }
        }
    }

    /// Expand an inline set-valued token list (`a b include other`, `none`)
    pub fn resolve_inline_set(
        &mut self,
        tokens: &[String],
        construct: &str,
        span: &SourceSpan,
    ) -> Option<Vec<String>> {
        let threshold = self.options.suggestion_threshold;
        match self.sets.expand_inline(tokens, construct, threshold) {
            Ok(items) => Some(items),
            Err(e) => {
                self.push(e.to_diagnostic(span));
                None
            }
        }
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }
}

/// Evaluate a value node into plain data.
///
/// Never fails: every problem becomes a diagnostic and a `null` in place of
/// the offending sub-value.
pub fn evaluate(value: &Value, ctx: &mut EvalContext, span: &SourceSpan) -> JsonValue {
    match value {
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Number(n) => number_to_json(*n),
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Null => JsonValue::Null,
        Value::Identifier(name) => match ctx.options.variable_path(name) {
            Some(path) => variables::resolve_variable(path, ctx, span),
            None => JsonValue::String(name.clone()),
        },
        Value::Array(items) => {
            JsonValue::Array(items.iter().map(|v| evaluate(v, ctx, span)).collect())
        }
        Value::Object(entries) => {
            let mut map = Map::new();
            let mut coalesced = BTreeSet::new();
            for (key, v) in entries {
                let resolved = evaluate(v, ctx, span);
                insert_coalescing(&mut map, &mut coalesced, key, resolved);
            }
            JsonValue::Object(map)
        }
        Value::Call { name, args } => evaluate_call(name, args, ctx, span),
    }
}

fn evaluate_call(name: &str, args: &[Value], ctx: &mut EvalContext, span: &SourceSpan) -> JsonValue {
    if ctx.call_depth >= ctx.options.max_call_depth {
        ctx.error(
            DiagnosticCode::FunctionArgument,
            format!(
                "call to {}() exceeds the maximum nesting depth of {}",
                name, ctx.options.max_call_depth
            ),
            span,
        );
        return JsonValue::Null;
    }

    ctx.call_depth += 1;
    let evaluated: Vec<JsonValue> = args.iter().map(|a| evaluate(a, ctx, span)).collect();
    let result = functions::call(name, evaluated, ctx.options.suggestion_threshold);
    ctx.call_depth -= 1;

    match result {
        Ok(v) => v,
        Err(e) => {
            debug!("function call failed: {}", e);
            ctx.push(Diagnostic::error(e.code(), e.to_string()).with_span(span.clone()));
            JsonValue::Null
        }
    }
}

/// Insert `value` under `key`; a repeated key turns the entry into an array
/// of every value given for it.
pub fn insert_coalescing(
    map: &mut Map<String, JsonValue>,
    coalesced: &mut BTreeSet<String>,
    key: &str,
    value: JsonValue,
) {
    match map.get_mut(key) {
        None => {
            map.insert(key.to_string(), value);
        }
        Some(JsonValue::Array(items)) if coalesced.contains(key) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = JsonValue::Array(vec![first, value]);
            coalesced.insert(key.to_string());
        }
    }
}

/// Integral finite numbers become JSON integers
pub fn number_to_json(n: f64) -> JsonValue {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        JsonValue::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn span() -> SourceSpan {
        SourceSpan::file_start("e.wd")
    }

    #[test]
    fn test_primitives() {
        let mut ctx = EvalContext::empty(CompilerOptions::default());
        assert_eq!(evaluate(&Value::Number(2.0), &mut ctx, &span()), json!(2));
        assert_eq!(evaluate(&Value::Number(0.25), &mut ctx, &span()), json!(0.25));
        assert_eq!(evaluate(&Value::ident("settlement"), &mut ctx, &span()), json!("settlement"));
        assert!(ctx.diagnostics.is_empty());
    }

    #[test]
    fn test_repeated_keys_coalesce() {
        let mut ctx = EvalContext::empty(CompilerOptions::default());
        let value = Value::Object(vec![
            ("tag".into(), Value::ident("a")),
            ("tag".into(), Value::ident("b")),
            ("tag".into(), Value::ident("c")),
            ("list".into(), Value::Array(vec![Value::Number(1.0)])),
        ]);
        assert_eq!(
            evaluate(&value, &mut ctx, &span()),
            json!({"tag": ["a", "b", "c"], "list": [1]})
        );
    }

    #[test]
    fn test_array_then_repeat_keeps_array_as_item() {
        let mut map = Map::new();
        let mut seen = BTreeSet::new();
        insert_coalescing(&mut map, &mut seen, "k", json!([1, 2]));
        insert_coalescing(&mut map, &mut seen, "k", json!(3));
        assert_eq!(JsonValue::Object(map), json!({"k": [[1, 2], 3]}));
    }

    #[test]
    fn test_call_depth_guard() {
        let options = CompilerOptions {
            max_call_depth: 2,
            ..CompilerOptions::default()
        };
        let mut ctx = EvalContext::empty(options);
        let inner = Value::Call {
            name: "upper".into(),
            args: vec![Value::string("x")],
        };
        let nested = Value::Call {
            name: "lower".into(),
            args: vec![Value::Call {
                name: "upper".into(),
                args: vec![inner],
            }],
        };
        evaluate(&nested, &mut ctx, &span());
        assert!(ctx
            .diagnostics
            .iter()
            .any(|d| d.message.contains("maximum nesting depth of 2")));
    }

    #[test]
    fn test_unknown_function_is_null_with_error() {
        let mut ctx = EvalContext::empty(CompilerOptions::default());
        let value = Value::Call {
            name: "uper".into(),
            args: vec![Value::string("x")],
        };
        assert_eq!(evaluate(&value, &mut ctx, &span()), JsonValue::Null);
        let diag = ctx.diagnostics.iter().next().unwrap();
        assert_eq!(diag.code, DiagnosticCode::UnknownFunction);
        assert!(diag.message.contains("did you mean 'upper'"));
    }
}
