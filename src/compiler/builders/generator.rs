//! `generator <id> [name] { ... }`
//!
//! Generators compile in two passes. The first declares every alias the body
//! introduces so references may appear before their declaration:
//!
//! ```text
//! generator found_colony {
//!     selection { kind location }            # binds target
//!     let founder { kind npc; from target via resident_of }
//!     create colony { kind settlement; status thriving }
//!     rel founded_by colony -> founder
//! }
//! ```
//!
//! The second compiles each statement against the finished binding context.

use std::collections::BTreeMap;

use tracing::debug;

use super::BlockScope;
use crate::ast::{Block, Rel, Statement};
use crate::binding_context::{BindReferences, BindingContext, ContextKind, EntityRef};
use crate::compiler::fields::block_to_json;
use crate::compiler::mapping::CompiledItem;
use crate::diagnostics::DiagnosticCode;
use crate::dsl::conditions::compile_conditions;
use crate::dsl::mutations::{compile_mutations, relationship_options};
use crate::dsl::selection::compile_selection;
use crate::error::BindError;
use crate::eval::EvalContext;
use crate::model::{CreationSpec, GeneratorDef, RelationshipSpec};

const GENERATOR_FIELDS: &[&str] = &[
    "name",
    "description",
    "enabled",
    "applicability",
    "selection",
    "let",
    "create",
    "relationship",
    "mutations",
];

const CREATE_FIELDS: &[&str] = &[
    "kind",
    "subtype",
    "status",
    "prominence",
    "culture",
    "tags",
    "description",
    "placement",
];

const RELATIONSHIP_FIELDS: &[&str] = &["src", "dst", "strength", "bidirectional"];

impl BindReferences for RelationshipSpec {
    fn bind_references(&mut self, ctx: &BindingContext, errors: &mut Vec<BindError>) {
        self.src.bind_references(ctx, errors);
        self.dst.bind_references(ctx, errors);
    }
}

pub fn build_generator(block: &Block, ctx: &mut EvalContext) -> Option<CompiledItem> {
    let mut scope = BlockScope::new(block);
    let id = scope.id(0, ctx)?;
    let mut binding = BindingContext::new(ContextKind::Generator, block.span.clone())
        .with_threshold(ctx.options.suggestion_threshold);
    declare_aliases(block, &mut binding, &mut scope, ctx);

    let mut def = GeneratorDef {
        id,
        name: block.label(1).map(str::to_string),
        ..GeneratorDef::default()
    };
    let mut enabled = None;

    for stmt in &block.body {
        match stmt {
            Statement::Attribute(attr) => match attr.key.as_str() {
                "name" => scope.name(&mut def.name, attr, ctx),
                "description" => scope.text(&mut def.description, attr, ctx),
                "enabled" => scope.boolean(&mut enabled, attr, ctx),
                _ => scope.reject(stmt, GENERATOR_FIELDS, ctx),
            },
            Statement::Rel(rel) => match relationship_from_rel(rel, ctx, &binding) {
                Some(spec) => def.relationships.push(spec),
                None => scope.fail(),
            },
            Statement::Block(inner) => match inner.name.as_str() {
                "applicability" => {
                    let conditions = scope.guard(ctx, |ctx| compile_conditions(&inner.body, ctx, &binding));
                    def.applicability.extend(conditions);
                }
                // duplicates were reported while declaring
                "selection" => match compile_selection(&inner.body, "selection", ctx, &binding) {
                    Some(selection) => {
                        def.selection.get_or_insert(selection);
                    }
                    None => scope.fail(),
                },
                "let" => {
                    let Some(alias) = inner.label(0) else {
                        continue;
                    };
                    let construct = format!("let {}", alias);
                    match compile_selection(&inner.body, &construct, ctx, &binding) {
                        Some(selection) => {
                            def.variables.insert(alias.to_string(), selection);
                        }
                        None => scope.fail(),
                    }
                }
                "create" => match compile_creation(inner, ctx, &binding) {
                    Some(spec) => def.creation.push(spec),
                    None => scope.fail(),
                },
                "relationship" => match relationship_block(inner, ctx, &binding) {
                    Some(spec) => def.relationships.push(spec),
                    None => scope.fail(),
                },
                "mutations" => {
                    let mutations = scope.guard(ctx, |ctx| compile_mutations(&inner.body, ctx, &binding));
                    def.state_updates.extend(mutations);
                }
                _ => scope.reject(stmt, GENERATOR_FIELDS, ctx),
            },
            other => scope.reject(other, GENERATOR_FIELDS, ctx),
        }
    }

    def.enabled = enabled.unwrap_or(true);
    debug!(
        generator = %def.id,
        creates = def.creation.len(),
        relationships = def.relationships.len(),
        "compiled generator"
    );
    scope.finish(CompiledItem::Generator(def))
}

/// First pass: `selection`, `let <alias>` and `create <alias>` declarations
fn declare_aliases(
    block: &Block,
    binding: &mut BindingContext,
    scope: &mut BlockScope,
    ctx: &mut EvalContext,
) {
    for inner in block.body.iter().filter_map(Statement::as_block) {
        match inner.name.as_str() {
            "selection" => {
                if !binding.declare_selection() {
                    ctx.error(
                        DiagnosticCode::DuplicateDeclaration,
                        format!("generator '{}' declares more than one selection", block.label(0).unwrap_or("")),
                        &inner.span,
                    );
                    scope.fail();
                }
            }
            "let" | "create" => {
                let Some(alias) = inner.label(0) else {
                    ctx.error(
                        DiagnosticCode::MissingField,
                        format!("'{}' needs an alias label", inner.name),
                        &inner.span,
                    );
                    scope.fail();
                    continue;
                };
                if let Err(e) = binding.declare(alias) {
                    ctx.push(e.to_diagnostic(&inner.span));
                    scope.fail();
                }
            }
            _ => {}
        }
    }
}

/// `create <alias> { kind ...; subtype ...; ... }`
fn compile_creation(block: &Block, ctx: &mut EvalContext, binding: &BindingContext) -> Option<CreationSpec> {
    let alias = block.label(0)?;
    let mut scope = BlockScope::new(block);
    let entity_ref = match binding.bind(alias) {
        Ok(bound) => bound,
        Err(e) => {
            ctx.push(e.to_diagnostic(&block.span));
            return None;
        }
    };
    let mut spec = CreationSpec {
        entity_ref,
        ..CreationSpec::default()
    };
    let mut kind = None;
    let mut tags = None;

    for stmt in &block.body {
        match stmt {
            Statement::Attribute(attr) => match attr.key.as_str() {
                "kind" => scope.text(&mut kind, attr, ctx),
                "subtype" => scope.text(&mut spec.subtype, attr, ctx),
                "status" => scope.text(&mut spec.status, attr, ctx),
                "prominence" => scope.prominence(&mut spec.prominence, attr, ctx),
                "culture" => scope.text(&mut spec.culture, attr, ctx),
                "tags" => scope.words(&mut tags, attr, ctx),
                "description" => scope.text(&mut spec.description, attr, ctx),
                _ => scope.reject(stmt, CREATE_FIELDS, ctx),
            },
            Statement::Block(inner) if inner.name == "placement" => {
                let mut placement = block_to_json(inner, ctx);
                let errors = binding.rewrite_json(&mut placement);
                scope.check(errors.is_empty());
                for error in errors {
                    ctx.push(error.to_diagnostic(&inner.span));
                }
                if spec.placement.replace(placement).is_some() {
                    ctx.error(
                        DiagnosticCode::DuplicateDeclaration,
                        "'placement' is given more than once",
                        &inner.span,
                    );
                    scope.fail();
                }
            }
            other => scope.reject(other, CREATE_FIELDS, ctx),
        }
    }

    match kind {
        Some(kind) => spec.kind = kind,
        None if scope.ok => {
            ctx.error(
                DiagnosticCode::MissingField,
                format!("create {} is missing 'kind'", alias),
                &block.span,
            );
            scope.fail();
        }
        None => {}
    }
    spec.tags = tags.unwrap_or_default();
    scope.finish(spec)
}

/// `rel <kind> <src> -> <dst> [strength n] [bidirectional b]`
fn relationship_from_rel(rel: &Rel, ctx: &mut EvalContext, binding: &BindingContext) -> Option<RelationshipSpec> {
    let (strength, bidirectional) = relationship_options(&rel.options, ctx, &rel.span)?;
    let spec = RelationshipSpec {
        kind: rel.kind.clone(),
        src: EntityRef::new(rel.src.clone()),
        dst: EntityRef::new(rel.dst.clone()),
        strength,
        bidirectional,
    };
    binding.bind_record(spec, ctx, &rel.span)
}

/// `relationship <kind> { src a; dst b; strength n; bidirectional b }`
fn relationship_block(block: &Block, ctx: &mut EvalContext, binding: &BindingContext) -> Option<RelationshipSpec> {
    let mut scope = BlockScope::new(block);
    let kind = scope.id(0, ctx)?;
    let mut src = None;
    let mut dst = None;
    let mut strength = None;
    let mut bidirectional = None;
    for stmt in &block.body {
        let Statement::Attribute(attr) = stmt else {
            scope.reject(stmt, RELATIONSHIP_FIELDS, ctx);
            continue;
        };
        match attr.key.as_str() {
            "src" => scope.text(&mut src, attr, ctx),
            "dst" => scope.text(&mut dst, attr, ctx),
            "strength" => scope.number(&mut strength, attr, ctx),
            "bidirectional" => scope.boolean(&mut bidirectional, attr, ctx),
            _ => scope.reject(stmt, RELATIONSHIP_FIELDS, ctx),
        }
    }
    let mut endpoints = BTreeMap::new();
    for (field, value) in [("src", src), ("dst", dst)] {
        match value {
            Some(v) => {
                endpoints.insert(field, v);
            }
            None if scope.ok => {
                ctx.error(
                    DiagnosticCode::MissingField,
                    format!("relationship {} is missing '{}'", kind, field),
                    &block.span,
                );
                scope.fail();
            }
            None => {}
        }
    }
    if !scope.ok {
        return None;
    }
    let spec = RelationshipSpec {
        kind,
        src: EntityRef::new(endpoints.remove("src")?),
        dst: EntityRef::new(endpoints.remove("dst")?),
        strength,
        bidirectional,
    };
    binding.bind_record(spec, ctx, &block.span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::builders::test_support::last_block;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn compile(src: &str) -> (Option<GeneratorDef>, EvalContext) {
        let (block, mut ctx) = last_block(src);
        let def = build_generator(&block, &mut ctx).map(|item| match item {
            CompiledItem::Generator(g) => g,
            other => panic!("unexpected {:?}", other),
        });
        (def, ctx)
    }

    #[test]
    fn test_generator_binds_declared_aliases() {
        let (def, ctx) = compile(
            r#"generator found_colony "Found Colony" {
  rel founded_by colony -> founder strength 0.8
  selection {
    kind location
  }
  let founder {
    kind npc
    from target via resident_of
  }
  create colony {
    kind settlement
    status thriving
    prominence recognized
    tags [frontier new]
    placement {
      near target
      entity founder
    }
  }
  relationship resident_of {
    src founder
    dst colony
  }
  mutations {
    modify_pressure expansion 2
  }
}"#,
        );
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        let json = serde_json::to_value(def.unwrap()).unwrap();
        assert_eq!(json["enabled"], json!(true));
        assert_eq!(json["creation"][0]["entityRef"], json!("$colony"));
        assert_eq!(json["creation"][0]["prominence"], json!("recognized"));
        assert_eq!(
            json["creation"][0]["placement"],
            json!({"near": "target", "entity": "$founder"})
        );
        assert_eq!(
            json["relationships"],
            json!([
                {"kind": "founded_by", "src": "$colony", "dst": "$founder", "strength": 0.8},
                {"kind": "resident_of", "src": "$founder", "dst": "$colony"}
            ])
        );
        assert_eq!(json["variables"]["founder"]["from"]["relatedTo"], json!("$target"));
        assert_eq!(json["stateUpdates"][0]["type"], json!("modify_pressure"));
    }

    #[test]
    fn test_undeclared_alias() {
        let (def, ctx) = compile("generator g {\n  rel ally_of colny -> actor\n  create colony {\n    kind settlement\n  }\n}");
        assert!(def.is_none());
        let diag = ctx.diagnostics.iter().next().unwrap();
        assert_eq!(diag.code, DiagnosticCode::UnboundReference);
        assert!(diag.message.contains("colony"));
    }

    #[test]
    fn test_second_selection_is_an_error() {
        let (def, ctx) = compile("generator g {\n  selection {\n    kind npc\n  }\n  selection {\n    kind faction\n  }\n}");
        assert!(def.is_none());
        assert_eq!(ctx.diagnostics.error_count(), 1);
    }

    #[test]
    fn test_create_requires_kind() {
        let (def, ctx) = compile("generator g {\n  create hero {\n    status alive\n  }\n}");
        assert!(def.is_none());
        assert_eq!(ctx.diagnostics.iter().next().unwrap().code, DiagnosticCode::MissingField);
    }

    #[test]
    fn test_alias_cannot_shadow_role() {
        let (def, ctx) = compile("generator g {\n  create actor {\n    kind npc\n  }\n}");
        assert!(def.is_none());
        assert_eq!(
            ctx.diagnostics.iter().next().unwrap().code,
            DiagnosticCode::DuplicateDeclaration
        );
    }

    #[test]
    fn test_disabled() {
        let (def, _) = compile("generator g {\n  enabled false\n}");
        assert!(!def.unwrap().enabled);
    }
}
