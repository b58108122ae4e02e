//! Reference binding for generator, action and system bodies
//!
//! Every mini-DSL compilation owns a [`BindingContext`] seeded with the
//! well-known roles. Declarations (`let hero`, `create hero`, a `selection`)
//! add aliases. Once a record is built its reference-bearing fields are
//! rewritten to runtime form:
//!
//! ```text
//! actor          -> $actor
//! hero.leader    -> $hero.leader      (hero declared by `create hero`)
//! $target        -> $target           (already runtime form)
//! any            -> any               (wildcard)
//! villain        -> error: 'villain' is not declared in this scope
//! ```
//!
//! Literal fields (tags, kinds, statuses) are never touched. Typed records
//! expose their reference sites through [`BindReferences`]; free-form system
//! configuration goes through [`BindingContext::rewrite_json`], which walks
//! the JSON tree and rewrites only [`REFERENCE_KEYS`].

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

use crate::diagnostics::{suggest, with_suggestion, SourceSpan};
use crate::error::BindError;
use crate::eval::EvalContext;

/// Roles bound in every context
pub const WELL_KNOWN_ROLES: &[&str] = &[
    "actor",
    "target",
    "self",
    "partner",
    "source",
    "member",
    "instigator",
];

/// Keys whose values are entity references
pub const REFERENCE_KEYS: &[&str] = &[
    "entity",
    "src",
    "dst",
    "with",
    "from",
    "to",
    "entities",
    "relatedTo",
    "replacements",
];

pub const WILDCARD: &str = "any";

/// Which construct owns the bindings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Generator,
    Action,
    System,
    Era,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContextKind::Generator => "generator",
            ContextKind::Action => "action",
            ContextKind::System => "system",
            ContextKind::Era => "era",
        })
    }
}

/// Alias -> runtime reference table for one construct
#[derive(Debug, Clone)]
pub struct BindingContext {
    pub kind: ContextKind,
    bindings: BTreeMap<String, String>,
    pub span: SourceSpan,
    selection_declared: bool,
    threshold: f64,
}

impl BindingContext {
    pub fn new(kind: ContextKind, span: SourceSpan) -> Self {
        let bindings = WELL_KNOWN_ROLES
            .iter()
            .map(|role| (role.to_string(), format!("${}", role)))
            .collect();
        Self {
            kind,
            bindings,
            span,
            selection_declared: false,
            threshold: 0.8,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Add an alias (`let`, `create`). Re-declaring a well-known role or an
    /// existing alias is an error.
    pub fn declare(&mut self, alias: &str) -> Result<String, BindError> {
        if alias.is_empty() {
            return Err(BindError::Empty);
        }
        if self.bindings.contains_key(alias) {
            return Err(BindError::AlreadyDeclared(alias.to_string()));
        }
        let runtime = format!("${}", alias);
        self.bindings.insert(alias.to_string(), runtime.clone());
        Ok(runtime)
    }

    /// Record the scope's selection, which binds `target`. Returns false when
    /// a selection was already declared.
    pub fn declare_selection(&mut self) -> bool {
        if self.selection_declared {
            return false;
        }
        self.selection_declared = true;
        self.bindings
            .insert("target".to_string(), "$target".to_string());
        true
    }

    pub fn selection_declared(&self) -> bool {
        self.selection_declared
    }

    pub fn is_bound(&self, alias: &str) -> bool {
        self.bindings.contains_key(alias)
    }

    /// Rewrite one reference to runtime form
    pub fn bind(&self, reference: &str) -> Result<String, BindError> {
        if reference.is_empty() {
            return Err(BindError::Empty);
        }
        if reference.starts_with('$') || reference == WILDCARD {
            return Ok(reference.to_string());
        }
        let (head, rest) = match reference.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (reference, None),
        };
        let Some(runtime) = self.bindings.get(head) else {
            let hint = suggest(head, self.bindings.keys().map(String::as_str), self.threshold);
            return Err(BindError::Unbound {
                alias: head.to_string(),
                hint: with_suggestion(String::new(), hint),
            });
        };
        Ok(match rest {
            Some(rest) => format!("{}.{}", runtime, rest),
            None => runtime.clone(),
        })
    }

    /// Rewrite every string under a reference key, recursively
    pub fn rewrite_json(&self, value: &mut JsonValue) -> Vec<BindError> {
        let mut errors = Vec::new();
        self.rewrite_value(value, false, &mut errors);
        errors
    }

    fn rewrite_value(&self, value: &mut JsonValue, in_reference: bool, errors: &mut Vec<BindError>) {
        match value {
            JsonValue::String(s) if in_reference => match self.bind(s) {
                Ok(bound) => *s = bound,
                Err(e) => errors.push(e),
            },
            JsonValue::Array(items) => {
                for item in items {
                    self.rewrite_value(item, in_reference, errors);
                }
            }
            JsonValue::Object(map) => {
                for (key, item) in map.iter_mut() {
                    let is_reference = REFERENCE_KEYS.contains(&key.as_str());
                    self.rewrite_value(item, is_reference, errors);
                }
            }
            _ => {}
        }
    }

    /// Bind `record`'s references, reporting each failure at `span`.
    /// Returns `None` when any reference failed.
    pub fn bind_record<T: BindReferences>(
        &self,
        mut record: T,
        ctx: &mut EvalContext,
        span: &SourceSpan,
    ) -> Option<T> {
        let mut errors = Vec::new();
        record.bind_references(self, &mut errors);
        if errors.is_empty() {
            return Some(record);
        }
        for error in errors {
            ctx.push(error.to_diagnostic(span));
        }
        None
    }
}

/// A reference to an entity, rewritten to `$alias` form during binding
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityRef(pub String);

impl EntityRef {
    pub fn new(reference: impl Into<String>) -> Self {
        EntityRef(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Records carrying entity references
pub trait BindReferences {
    fn bind_references(&mut self, ctx: &BindingContext, errors: &mut Vec<BindError>);
}

impl BindReferences for EntityRef {
    fn bind_references(&mut self, ctx: &BindingContext, errors: &mut Vec<BindError>) {
        match ctx.bind(&self.0) {
            Ok(bound) => self.0 = bound,
            Err(e) => errors.push(e),
        }
    }
}

impl<T: BindReferences> BindReferences for Vec<T> {
    fn bind_references(&mut self, ctx: &BindingContext, errors: &mut Vec<BindError>) {
        for item in self.iter_mut() {
            item.bind_references(ctx, errors);
        }
    }
}

impl<T: BindReferences> BindReferences for Option<T> {
    fn bind_references(&mut self, ctx: &BindingContext, errors: &mut Vec<BindError>) {
        if let Some(item) = self {
            item.bind_references(ctx, errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn context() -> BindingContext {
        BindingContext::new(ContextKind::Generator, SourceSpan::file_start("g.wd"))
    }

    #[test]
    fn test_well_known_and_declared() {
        let mut ctx = context();
        assert_eq!(ctx.bind("actor").unwrap(), "$actor");
        assert_eq!(ctx.declare("hero").unwrap(), "$hero");
        assert_eq!(ctx.bind("hero.leader").unwrap(), "$hero.leader");
        assert_eq!(ctx.bind("$other").unwrap(), "$other");
        assert_eq!(ctx.bind("any").unwrap(), "any");
    }

    #[test]
    fn test_unbound_with_hint() {
        let mut ctx = context();
        ctx.declare("hero").unwrap();
        let err = ctx.bind("heros").unwrap_err();
        assert_eq!(
            err.to_string(),
            "'heros' is not declared in this scope (did you mean 'hero'?)"
        );
        assert!(matches!(ctx.declare("hero"), Err(BindError::AlreadyDeclared(_))));
        assert!(matches!(ctx.declare("actor"), Err(BindError::AlreadyDeclared(_))));
    }

    #[test]
    fn test_single_selection() {
        let mut ctx = context();
        assert!(ctx.declare_selection());
        assert!(!ctx.declare_selection());
        assert!(ctx.selection_declared());
    }

    #[test]
    fn test_rewrite_json_only_reference_keys() {
        let ctx = context();
        let mut config = json!({
            "relationshipKind": "member_of",
            "src": "actor",
            "nested": {"entities": ["target", "$self"], "tag": "actor"},
            "with": "ghost"
        });
        let errors = ctx.rewrite_json(&mut config);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            config,
            json!({
                "relationshipKind": "member_of",
                "src": "$actor",
                "nested": {"entities": ["$target", "$self"], "tag": "actor"},
                "with": "ghost"
            })
        );
    }

    #[test]
    fn test_bind_vec_and_option() {
        let ctx = context();
        let mut refs = vec![EntityRef::new("actor"), EntityRef::new("nobody")];
        let mut errors = Vec::new();
        refs.bind_references(&ctx, &mut errors);
        assert_eq!(refs[0].as_str(), "$actor");
        assert_eq!(errors.len(), 1);

        let mut maybe: Option<EntityRef> = None;
        maybe.bind_references(&ctx, &mut errors);
        assert_eq!(errors.len(), 1);
    }
}
