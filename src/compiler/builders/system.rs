//! `system <type> <id> [name] { ... }`
//!
//! System configuration is free-form: attributes and nested blocks evaluate
//! to JSON under camelCased keys. Three sub-blocks compile through the
//! mini-languages instead:
//!
//! ```text
//! conditions { ... }            -> "conditions": [Condition]
//! selection { ... }             -> "selection": Selection
//! mutations / on_trigger { ... } -> "mutations" / "onTrigger": [Mutation]
//! ```
//!
//! Entity references inside the free-form part (`entity`, `src`, `with`, ...)
//! are rewritten through the system's binding context.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use super::BlockScope;
use crate::ast::{Block, Statement};
use crate::binding_context::{BindingContext, ContextKind};
use crate::compiler::fields::{block_to_json, camel_case, evaluate_checked, labeled};
use crate::compiler::mapping::CompiledItem;
use crate::diagnostics::{with_suggestion, DiagnosticCode, SourceSpan};
use crate::dsl::conditions::compile_conditions;
use crate::dsl::mutations::compile_mutations;
use crate::dsl::selection::compile_selection;
use crate::eval::{insert_coalescing, EvalContext};
use crate::model::SystemDef;

pub const SYSTEM_TYPES: &[&str] = &[
    "connection_evolution",
    "graph_contagion",
    "threshold_trigger",
    "cluster_formation",
    "tag_diffusion",
    "plane_diffusion",
    "era_spawner",
    "era_transition",
    "universal_catalyst",
    "relationship_maintenance",
];

const COMPILED_BLOCKS: &[&str] = &["conditions", "selection", "mutations", "on_trigger"];

pub fn build_system(block: &Block, ctx: &mut EvalContext) -> Option<CompiledItem> {
    let mut scope = BlockScope::new(block);
    let system_type = labeled(block, 0, "type", ctx);
    let id = scope.id(1, ctx);
    let (Some(system_type), Some(id)) = (system_type, id) else {
        return None;
    };
    if !SYSTEM_TYPES.contains(&system_type.as_str()) {
        let hint = ctx.suggest(&system_type, SYSTEM_TYPES.iter().copied());
        ctx.error(
            DiagnosticCode::InvalidValue,
            with_suggestion(format!("unknown system type '{}'", system_type), hint),
            &block.span,
        );
        scope.fail();
    }

    let mut binding = BindingContext::new(ContextKind::System, block.span.clone())
        .with_threshold(ctx.options.suggestion_threshold);
    let mut name = block.label(2).map(str::to_string);
    let mut description = None;
    let mut config = Map::new();
    let mut coalesced = BTreeSet::new();

    for stmt in &block.body {
        match stmt {
            Statement::Attribute(attr) if attr.key == "name" => scope.name(&mut name, attr, ctx),
            Statement::Attribute(attr) if attr.key == "description" => {
                scope.text(&mut description, attr, ctx)
            }
            Statement::Attribute(attr) => match evaluate_checked(&attr.value, ctx, &attr.span) {
                Some(mut value) => {
                    let ok = rewrite(&binding, &mut value, ctx, &attr.span);
                    scope.check(ok);
                    insert_coalescing(&mut config, &mut coalesced, &camel_case(&attr.key), value);
                }
                None => scope.fail(),
            },
            Statement::Block(inner) if COMPILED_BLOCKS.contains(&inner.name.as_str()) => {
                let key = camel_case(&inner.name);
                if config.contains_key(&key) {
                    ctx.error(
                        DiagnosticCode::DuplicateDeclaration,
                        format!("'{}' is given more than once", inner.name),
                        &inner.span,
                    );
                    scope.fail();
                    continue;
                }
                let compiled = match inner.name.as_str() {
                    "conditions" => {
                        let conditions = scope.guard(ctx, |ctx| compile_conditions(&inner.body, ctx, &binding));
                        to_json(&conditions, ctx, &inner.span)
                    }
                    "selection" => {
                        binding.declare_selection();
                        compile_selection(&inner.body, "selection", ctx, &binding)
                            .and_then(|selection| to_json(&selection, ctx, &inner.span))
                    }
                    _ => {
                        let mutations = scope.guard(ctx, |ctx| compile_mutations(&inner.body, ctx, &binding));
                        to_json(&mutations, ctx, &inner.span)
                    }
                };
                match compiled {
                    Some(value) => {
                        config.insert(key, value);
                    }
                    None => scope.fail(),
                }
            }
            Statement::Block(inner) => {
                let before = ctx.diagnostics.error_count();
                let mut value = block_to_json(inner, ctx);
                scope.check(ctx.diagnostics.error_count() == before);
                let ok = rewrite(&binding, &mut value, ctx, &inner.span);
                scope.check(ok);
                insert_coalescing(&mut config, &mut coalesced, &camel_case(&inner.name), value);
            }
            other => {
                ctx.error(
                    DiagnosticCode::InvalidStatement,
                    format!("{} statement is not allowed in system", other.kind_name()),
                    other.span(),
                );
                scope.fail();
            }
        }
    }

    scope.finish(CompiledItem::System(SystemDef {
        system_type,
        id,
        name,
        description,
        config,
    }))
}

fn rewrite(binding: &BindingContext, value: &mut JsonValue, ctx: &mut EvalContext, span: &SourceSpan) -> bool {
    let errors = binding.rewrite_json(value);
    let ok = errors.is_empty();
    for error in errors {
        ctx.push(error.to_diagnostic(span));
    }
    ok
}

fn to_json<T: Serialize>(value: &T, ctx: &mut EvalContext, span: &SourceSpan) -> Option<JsonValue> {
    match serde_json::to_value(value) {
        Ok(json) => Some(json),
        Err(e) => {
            ctx.error(DiagnosticCode::InvalidValue, format!("cannot serialize: {}", e), span);
            None
        }
    }
}
