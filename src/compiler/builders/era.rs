//! `era <id> [name] { ... }`

use std::collections::BTreeMap;

use super::BlockScope;
use crate::ast::{Attribute, Block, Statement};
use crate::binding_context::{BindingContext, ContextKind};
use crate::compiler::fields::eval_tokens;
use crate::compiler::mapping::CompiledItem;
use crate::diagnostics::DiagnosticCode;
use crate::dsl::conditions::compile_conditions;
use crate::dsl::mutations::compile_mutations;
use crate::dsl::settle;
use crate::error::TokenError;
use crate::eval::EvalContext;
use crate::model::EraDef;
use crate::tokens::TokenStream;

const ERA_FIELDS: &[&str] = &[
    "name",
    "summary",
    "template_weight",
    "system_modifier",
    "entry",
    "exit",
    "on_enter",
    "on_exit",
];

pub fn build_era(block: &Block, ctx: &mut EvalContext) -> Option<CompiledItem> {
    let mut scope = BlockScope::new(block);
    let id = scope.id(0, ctx)?;
    let binding = BindingContext::new(ContextKind::Era, block.span.clone())
        .with_threshold(ctx.options.suggestion_threshold);
    let mut def = EraDef {
        id,
        name: block.label(1).map(str::to_string),
        ..EraDef::default()
    };

    for stmt in &block.body {
        match stmt {
            Statement::Attribute(attr) => match attr.key.as_str() {
                "name" => scope.name(&mut def.name, attr, ctx),
                "summary" => scope.text(&mut def.summary, attr, ctx),
                "template_weight" => {
                    let ok = weight_entry(attr, &mut def.template_weights, "generator", ctx);
                    scope.check(ok);
                }
                "system_modifier" => {
                    let ok = weight_entry(attr, &mut def.system_modifiers, "system", ctx);
                    scope.check(ok);
                }
                _ => scope.reject(stmt, ERA_FIELDS, ctx),
            },
            Statement::Block(inner) => {
                let body = &inner.body;
                match inner.name.as_str() {
                    "entry" => {
                        let conditions = scope.guard(ctx, |ctx| compile_conditions(body, ctx, &binding));
                        def.entry_conditions.extend(conditions);
                    }
                    "exit" => {
                        let conditions = scope.guard(ctx, |ctx| compile_conditions(body, ctx, &binding));
                        def.exit_conditions.extend(conditions);
                    }
                    "on_enter" => {
                        let effects = scope.guard(ctx, |ctx| compile_mutations(body, ctx, &binding));
                        def.entry_effects.extend(effects);
                    }
                    "on_exit" => {
                        let effects = scope.guard(ctx, |ctx| compile_mutations(body, ctx, &binding));
                        def.exit_effects.extend(effects);
                    }
                    _ => scope.reject(stmt, ERA_FIELDS, ctx),
                }
            }
            other => scope.reject(other, ERA_FIELDS, ctx),
        }
    }
    scope.finish(CompiledItem::Era(def))
}

/// `<key> <target> <number>` into a map, once per target
fn weight_entry(
    attr: &Attribute,
    map: &mut BTreeMap<String, f64>,
    target: &str,
    ctx: &mut EvalContext,
) -> bool {
    let Some(tokens) = eval_tokens(&attr.value, ctx, &attr.key, &attr.span) else {
        return false;
    };
    let parsed = (|| -> Result<(String, f64), TokenError> {
        let mut stream = TokenStream::new(attr.key.as_str(), &tokens);
        let name = stream.next_ident(&format!("a {} id", target))?;
        let value = stream.next_number("a number")?;
        stream.expect_end()?;
        Ok((name, value))
    })();
    let Some((name, value)) = settle(parsed, ctx, &attr.span) else {
        return false;
    };
    if value < 0.0 {
        ctx.error(
            DiagnosticCode::InvalidValue,
            format!("{} for '{}' cannot be negative", attr.key, name),
            &attr.span,
        );
        return false;
    }
    if map.contains_key(&name) {
        ctx.error(
            DiagnosticCode::DuplicateDeclaration,
            format!("{} for '{}' is given more than once", attr.key, name),
            &attr.span,
        );
        return false;
    }
    map.insert(name, value);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::builders::test_support::last_block;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_era() {
        let (block, mut ctx) = last_block(
            "era expansion \"Age of Expansion\" {\n  summary \"Settlements spread\"\n  template_weight found_colony 2\n  system_modifier trade_network 1.5\n  exit {\n    time_elapsed > 100\n  }\n  on_enter {\n    modify_pressure conflict 5\n  }\n}",
        );
        let Some(CompiledItem::Era(era)) = build_era(&block, &mut ctx) else {
            panic!("{:?}", ctx.diagnostics);
        };
        let json = serde_json::to_value(&era).unwrap();
        assert_eq!(json["name"], json!("Age of Expansion"));
        assert_eq!(json["templateWeights"], json!({"found_colony": 2}));
        assert_eq!(json["systemModifiers"], json!({"trade_network": 1.5}));
        assert_eq!(era.exit_conditions.len(), 1);
        assert_eq!(era.entry_effects.len(), 1);
        assert!(era.entry_conditions.is_empty());
    }

    #[test]
    fn test_duplicate_weight() {
        let (block, mut ctx) = last_block("era e {\n  template_weight g 1\n  template_weight g 2\n}");
        assert!(build_era(&block, &mut ctx).is_none());
        assert_eq!(
            ctx.diagnostics.iter().next().unwrap().code,
            DiagnosticCode::DuplicateDeclaration
        );
    }

    #[test]
    fn test_bad_condition_fails_era() {
        let (block, mut ctx) = last_block("era e {\n  entry {\n    pressur conflict > 5\n  }\n}");
        assert!(build_era(&block, &mut ctx).is_none());
        assert_eq!(ctx.diagnostics.error_count(), 1);
    }
}
