//! Set algebra
//!
//! ```text
//! set allies { a b include other_allies }
//! set nobody { none }
//! set allies a b include other_allies       # one-line form
//! ```
//!
//! Sets resolve eagerly, in declaration order, by a memoized depth-first walk:
//! the set's own items first, then each included set, keeping the first
//! occurrence of every item. A set that includes itself (directly or through others) is
//! reported once per offending name and frozen to the empty set.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::ast::{Block, Statement, Value};
use crate::diagnostics::{
    cycle_error, suggest, with_suggestion, DiagnosticCode, Diagnostics, SourceSpan,
};
use crate::error::ResolveError;

pub const INCLUDE_KEYWORD: &str = "include";
pub const NONE_KEYWORD: &str = "none";

/// A declared set, before resolution
#[derive(Debug, Clone, PartialEq)]
pub struct SetDefinition {
    pub name: String,
    pub items: Vec<String>,
    pub includes: Vec<String>,
    pub explicit_none: bool,
    pub span: SourceSpan,
}

impl SetDefinition {
    /// Parse `word* (include name)* | none` tokens
    pub fn from_tokens(
        name: impl Into<String>,
        tokens: &[String],
        span: SourceSpan,
    ) -> Result<Self, ResolveError> {
        let name = name.into();
        let mut def = SetDefinition {
            name: name.clone(),
            items: Vec::new(),
            includes: Vec::new(),
            explicit_none: false,
            span,
        };
        let mut iter = tokens.iter();
        while let Some(token) = iter.next() {
            match token.as_str() {
                INCLUDE_KEYWORD => match iter.next() {
                    Some(included) => def.includes.push(included.clone()),
                    None => return Err(ResolveError::DanglingInclude(name)),
                },
                NONE_KEYWORD => def.explicit_none = true,
                _ => def.items.push(token.clone()),
            }
        }
        if def.explicit_none && (!def.items.is_empty() || !def.includes.is_empty()) {
            return Err(ResolveError::NoneWithItems(name));
        }
        Ok(def)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Resolving,
    Resolved,
}

/// Resolved sets by name
#[derive(Debug, Clone, Default)]
pub struct SetTable {
    definitions: BTreeMap<String, SetDefinition>,
    resolved: BTreeMap<String, Vec<String>>,
}

impl SetTable {
    /// Split `set` blocks out of the top-level blocks and resolve them.
    pub fn extract(
        blocks: Vec<Block>,
        suggestion_threshold: f64,
        diagnostics: &mut Diagnostics,
    ) -> (Self, Vec<Block>) {
        let mut definitions = Vec::new();
        let mut rest = Vec::with_capacity(blocks.len());

        for block in blocks {
            if block.name != "set" {
                rest.push(block);
                continue;
            }
            let Some(name) = block.label(0).map(str::to_string) else {
                diagnostics.error(
                    DiagnosticCode::MissingField,
                    "set declaration needs a name",
                    &block.span,
                );
                continue;
            };
            let Some(mut tokens) = set_tokens(&block, diagnostics) else {
                continue;
            };
            // labels after the name are items too: `set allies a b {}`
            let mut all: Vec<String> = block.labels[1..].to_vec();
            all.append(&mut tokens);
            match SetDefinition::from_tokens(name, &all, block.span.clone()) {
                Ok(def) => definitions.push(def),
                Err(e) => diagnostics.push(e.to_diagnostic(&block.span)),
            }
        }

        (Self::resolve(definitions, suggestion_threshold, diagnostics), rest)
    }

    /// Resolve every definition, reporting duplicates, unknown includes and
    /// cycles.
    pub fn resolve(
        definitions: Vec<SetDefinition>,
        suggestion_threshold: f64,
        diagnostics: &mut Diagnostics,
    ) -> Self {
        let mut table = SetTable::default();
        let mut order = Vec::new();
        for def in definitions {
            if let Some(existing) = table.definitions.get(&def.name) {
                diagnostics.error(
                    DiagnosticCode::DuplicateDeclaration,
                    format!(
                        "set '{}' is already declared at {}:{}",
                        def.name, existing.span.file, existing.span.start.line
                    ),
                    &def.span,
                );
                continue;
            }
            order.push(def.name.clone());
            table.definitions.insert(def.name.clone(), def);
        }

        let mut resolver = Resolver {
            definitions: &table.definitions,
            states: BTreeMap::new(),
            stack: Vec::new(),
            cyclic: BTreeSet::new(),
            resolved: BTreeMap::new(),
            suggestion_threshold,
            diagnostics,
        };
        for name in &order {
            resolver.resolve(name);
        }
        let resolved = resolver.resolved;
        debug!("resolved {} sets", resolved.len());
        table.resolved = resolved;
        table
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.resolved.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Expand a field-level token list using the same `include` / `none`
    /// syntax as declarations.
    pub fn expand_inline(
        &self,
        tokens: &[String],
        construct: &str,
        suggestion_threshold: f64,
    ) -> Result<Vec<String>, ResolveError> {
        let def = SetDefinition::from_tokens(construct, tokens, SourceSpan::default())?;
        let mut out = Vec::new();
        push_unique(&mut out, def.items);
        for included in &def.includes {
            let Some(items) = self.get(included) else {
                let hint = suggest(
                    included,
                    self.definitions.keys().map(String::as_str),
                    suggestion_threshold,
                );
                return Err(ResolveError::UnknownSet {
                    name: included.clone(),
                    hint: with_suggestion(String::new(), hint),
                });
            };
            push_unique(&mut out, items.iter().cloned());
        }
        Ok(out)
    }
}

struct Resolver<'a> {
    definitions: &'a BTreeMap<String, SetDefinition>,
    states: BTreeMap<String, VisitState>,
    stack: Vec<String>,
    cyclic: BTreeSet<String>,
    resolved: BTreeMap<String, Vec<String>>,
    suggestion_threshold: f64,
    diagnostics: &'a mut Diagnostics,
}

impl Resolver<'_> {
    fn resolve(&mut self, name: &str) -> Vec<String> {
        match self.states.get(name) {
            Some(VisitState::Resolved) => {
                return self.resolved.get(name).cloned().unwrap_or_default();
            }
            Some(VisitState::Resolving) => {
                self.report_cycle(name);
                return Vec::new();
            }
            None => {}
        }

        let definitions = self.definitions;
        let Some(def) = definitions.get(name) else {
            return Vec::new();
        };

        self.states.insert(name.to_string(), VisitState::Resolving);
        self.stack.push(name.to_string());

        let mut items = Vec::new();
        push_unique(&mut items, def.items.iter().cloned());
        for included in &def.includes {
            if !definitions.contains_key(included) {
                let hint = suggest(
                    included,
                    definitions.keys().map(String::as_str),
                    self.suggestion_threshold,
                );
                let message = with_suggestion(
                    format!("set '{}' includes unknown set '{}'", name, included),
                    hint,
                );
                self.diagnostics
                    .error(DiagnosticCode::UnknownSet, message, &def.span);
                continue;
            }
            let included_items = self.resolve(included);
            push_unique(&mut items, included_items);
        }

        self.stack.pop();
        if self.cyclic.contains(name) {
            items.clear();
        }
        self.states.insert(name.to_string(), VisitState::Resolved);
        self.resolved.insert(name.to_string(), items.clone());
        items
    }

    /// Every set on the stack from `name` upward is part of the cycle; each
    /// gets one diagnostic, the first time it is found on a cycle.
    fn report_cycle(&mut self, name: &str) {
        let start = self.stack.iter().position(|n| n == name).unwrap_or(0);
        let members: Vec<String> = self.stack[start..].to_vec();
        for (i, member) in members.iter().enumerate() {
            if !self.cyclic.insert(member.clone()) {
                continue;
            }
            let mut chain: Vec<String> = members[i..].to_vec();
            chain.extend(members[..i].iter().cloned());
            chain.push(member.clone());
            warn!("circular set include: {}", chain.join(" -> "));
            let span = self
                .definitions
                .get(member)
                .map(|d| d.span.clone())
                .unwrap_or_default();
            self.diagnostics
                .push(cycle_error("set include", &chain).with_span(span));
        }
    }
}

fn push_unique(out: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
}

/// Words of a set block body: every attribute, bare value and predicate line
/// flattened into text tokens.
fn set_tokens(block: &Block, diagnostics: &mut Diagnostics) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut ok = true;
    for stmt in &block.body {
        let values: Vec<Value> = match stmt {
            Statement::Attribute(attr) => {
                let mut v = vec![Value::ident(attr.key.clone())];
                v.extend(attr.value.items().iter().cloned());
                v
            }
            Statement::Bare(bare) => bare.value.items().to_vec(),
            other => {
                diagnostics.error(
                    DiagnosticCode::InvalidStatement,
                    format!("{} statement is not allowed in a set", other.kind_name()),
                    other.span(),
                );
                ok = false;
                continue;
            }
        };
        for value in values {
            match value {
                Value::Identifier(s) | Value::String(s) => tokens.push(s),
                Value::Number(_) => tokens.push(value.to_dsl_string()),
                other => {
                    diagnostics.error(
                        DiagnosticCode::TypeMismatch,
                        format!("set items must be words, found {}", other.describe()),
                        stmt.span(),
                    );
                    ok = false;
                }
            }
        }
    }
    ok.then_some(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use pretty_assertions::assert_eq;

    fn table(src: &str) -> (SetTable, Diagnostics) {
        let blocks: Vec<Block> = parse_source(src, "s.wd")
            .unwrap()
            .into_iter()
            .filter_map(|s| match s {
                Statement::Block(b) => Some(b),
                _ => None,
            })
            .collect();
        let mut diagnostics = Diagnostics::new();
        let (table, _) = SetTable::extract(blocks, 0.8, &mut diagnostics);
        (table, diagnostics)
    }

    #[test]
    fn test_include_union() {
        let (sets, diags) = table("set allies { a b include other_allies }\nset other_allies { b c }");
        assert!(diags.is_empty());
        assert_eq!(sets.get("allies").unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn test_items_come_first() {
        let (sets, _) = table("set x { include y z }\nset y { a b z }");
        assert_eq!(sets.get("x").unwrap(), ["z", "a", "b"]);
    }

    #[test]
    fn test_literal_dedupe() {
        let (sets, _) = table("set s { a b a c b }");
        assert_eq!(sets.get("s").unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn test_mutual_cycle() {
        let (sets, diags) = table("set a { x include b }\nset b { y include a }\nset c { include a z }");
        assert_eq!(diags.error_count(), 2);
        assert!(diags
            .iter()
            .all(|d| d.code == DiagnosticCode::CircularReference));
        assert_eq!(sets.get("a").unwrap(), [] as [String; 0]);
        assert_eq!(sets.get("b").unwrap(), [] as [String; 0]);
        // dependents keep their own items
        assert_eq!(sets.get("c").unwrap(), ["z"]);
    }

    #[test]
    fn test_self_cycle() {
        let (sets, diags) = table("set a { include a }");
        assert_eq!(diags.error_count(), 1);
        assert!(sets.get("a").unwrap().is_empty());
    }

    #[test]
    fn test_none() {
        let (sets, diags) = table("set nobody { none }\nset bad { none a }");
        assert_eq!(diags.error_count(), 1);
        assert!(sets.get("nobody").unwrap().is_empty());
        assert!(sets.get("bad").is_none());
    }

    #[test]
    fn test_unknown_include_and_duplicate() {
        let (_, diags) = table("set a { include alies }\nset allies { x }\nset allies { y }");
        let codes: Vec<DiagnosticCode> = diags.iter().map(|d| d.code).collect();
        assert!(codes.contains(&DiagnosticCode::UnknownSet));
        assert!(codes.contains(&DiagnosticCode::DuplicateDeclaration));
    }

    #[test]
    fn test_unknown_include_hint_follows_threshold() {
        let definitions = || {
            ["a", "allies"]
                .iter()
                .map(|name| {
                    let includes = if *name == "a" { vec!["alies".to_string()] } else { Vec::new() };
                    SetDefinition {
                        name: name.to_string(),
                        items: Vec::new(),
                        includes,
                        explicit_none: false,
                        span: SourceSpan::file_start("s.wd"),
                    }
                })
                .collect::<Vec<_>>()
        };

        let mut loose = Diagnostics::new();
        SetTable::resolve(definitions(), 0.8, &mut loose);
        assert!(loose.iter().next().unwrap().message.contains("did you mean 'allies'"));

        let mut strict = Diagnostics::new();
        SetTable::resolve(definitions(), 1.0, &mut strict);
        let diag = strict.iter().next().unwrap();
        assert_eq!(diag.code, DiagnosticCode::UnknownSet);
        assert!(!diag.message.contains("did you mean"));
    }

    #[test]
    fn test_expand_inline() {
        let (sets, _) = table("set mortal { npc faction }");
        let tokens: Vec<String> = ["hero", "include", "mortal", "npc"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            sets.expand_inline(&tokens, "kind", 0.8).unwrap(),
            vec!["hero", "npc", "faction"]
        );

        let err = sets
            .expand_inline(&["none".to_string(), "x".to_string()], "kind", 0.8)
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoneWithItems(_)));

        let err = sets
            .expand_inline(&["include".to_string(), "mortl".to_string()], "kind", 0.8)
            .unwrap_err();
        assert!(err.to_string().contains("did you mean 'mortal'"));
    }
}
