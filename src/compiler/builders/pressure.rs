//! `pressure <id> [name] { ... }`

use super::BlockScope;
use crate::ast::{Block, Statement};
use crate::compiler::fields::eval_tokens;
use crate::compiler::mapping::CompiledItem;
use crate::diagnostics::DiagnosticCode;
use crate::dsl::contract::{parse_contract_entry, PressureContract};
use crate::dsl::factors::{compile_factor, GrowthFactor};
use crate::dsl::settle;
use crate::eval::EvalContext;
use crate::model::{PressureDef, PressureGrowth};
use crate::tokens::attribute_tokens;

const PRESSURE_FIELDS: &[&str] = &["name", "description", "initial_value", "homeostasis", "growth", "contract"];
const GROWTH_FIELDS: &[&str] = &["positive", "negative"];

pub const MAX_PRESSURE: f64 = 100.0;

pub fn build_pressure(block: &Block, ctx: &mut EvalContext) -> Option<CompiledItem> {
    let mut scope = BlockScope::new(block);
    let id = scope.id(0, ctx)?;
    let mut name = block.label(1).map(str::to_string);
    let mut description = None;
    let mut initial_value = None;
    let mut homeostasis = None;
    let mut growth: Option<PressureGrowth> = None;
    let mut contract: Option<PressureContract> = None;

    for stmt in &block.body {
        match stmt {
            Statement::Attribute(attr) => match attr.key.as_str() {
                "name" => scope.name(&mut name, attr, ctx),
                "description" => scope.text(&mut description, attr, ctx),
                "initial_value" => scope.number(&mut initial_value, attr, ctx),
                "homeostasis" => scope.number(&mut homeostasis, attr, ctx),
                _ => scope.reject(stmt, PRESSURE_FIELDS, ctx),
            },
            Statement::Block(inner) if inner.name == "growth" => {
                if growth.is_some() {
                    ctx.error(DiagnosticCode::DuplicateDeclaration, "'growth' is given more than once", &inner.span);
                    scope.fail();
                    continue;
                }
                growth = Some(scope.guard(ctx, |ctx| compile_growth(inner, ctx)));
            }
            Statement::Block(inner) if inner.name == "contract" => {
                let parsed = scope.guard(ctx, |ctx| compile_contract(inner, ctx));
                let target = contract.get_or_insert_with(PressureContract::default);
                target.sources.extend(parsed.sources);
                target.sinks.extend(parsed.sinks);
                target.affects.extend(parsed.affects);
            }
            other => scope.reject(other, PRESSURE_FIELDS, ctx),
        }
    }

    let initial_value = initial_value.unwrap_or(0.0);
    if !(0.0..=MAX_PRESSURE).contains(&initial_value) {
        ctx.error(
            DiagnosticCode::InvalidValue,
            format!("initial_value must be between 0 and {}, found {}", MAX_PRESSURE, initial_value),
            &block.span,
        );
        scope.fail();
    }

    scope
        .finish(PressureDef {
            id,
            name,
            description,
            initial_value,
            homeostasis,
            growth: growth.unwrap_or_default(),
            contract: contract.filter(|c| !c.is_empty()),
        })
        .map(CompiledItem::Pressure)
}

/// `positive <factor>` / `negative <factor>` lines
fn compile_growth(block: &Block, ctx: &mut EvalContext) -> PressureGrowth {
    let threshold = ctx.options.suggestion_threshold;
    let mut growth = PressureGrowth::default();
    for stmt in &block.body {
        let Statement::Attribute(attr) = stmt else {
            match stmt.head() {
                Some(head) => ctx.unknown_field("growth", head, GROWTH_FIELDS, stmt.span()),
                None => ctx.error(
                    DiagnosticCode::InvalidStatement,
                    format!("{} statement is not allowed in growth", stmt.kind_name()),
                    stmt.span(),
                ),
            }
            continue;
        };
        let positive = match attr.key.as_str() {
            "positive" => true,
            "negative" => false,
            other => {
                ctx.unknown_field("growth", other, GROWTH_FIELDS, &attr.span);
                continue;
            }
        };
        let factor: Option<GrowthFactor> = eval_tokens(&attr.value, ctx, "growth factor", &attr.span)
            .and_then(|tokens| settle(compile_factor(&tokens, threshold), ctx, &attr.span));
        match factor {
            Some(f) if positive => growth.positive_feedback.push(f),
            Some(f) => growth.negative_feedback.push(f),
            None => {}
        }
    }
    growth
}

fn compile_contract(block: &Block, ctx: &mut EvalContext) -> PressureContract {
    let threshold = ctx.options.suggestion_threshold;
    let mut contract = PressureContract::default();
    for stmt in &block.body {
        let Statement::Attribute(attr) = stmt else {
            ctx.error(
                DiagnosticCode::InvalidStatement,
                format!("{} statement is not a contract entry", stmt.kind_name()),
                stmt.span(),
            );
            continue;
        };
        let entry = settle(attribute_tokens(&attr.key, &attr.value, ctx, &attr.span), ctx, &attr.span)
            .and_then(|tokens| settle(parse_contract_entry(&tokens, threshold), ctx, &attr.span));
        if let Some(entry) = entry {
            contract.push(entry);
        }
    }
    contract
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::builders::test_support::last_block;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn compile(src: &str) -> (Option<PressureDef>, EvalContext) {
        let (block, mut ctx) = last_block(src);
        let item = build_pressure(&block, &mut ctx).map(|item| match item {
            CompiledItem::Pressure(p) => p,
            other => panic!("unexpected {:?}", other),
        });
        (item, ctx)
    }

    #[test]
    fn test_pressure_with_growth_and_contract() {
        let (pressure, ctx) = compile(
            "pressure conflict \"Conflict\" {\n  initial_value 20\n  homeostasis 0.05\n  growth {\n    positive tag_count rebel coefficient 2\n    negative constant value 1\n  }\n  contract {\n    source component raids delta 2\n  }\n}",
        );
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        let json = serde_json::to_value(pressure.unwrap()).unwrap();
        assert_eq!(json["name"], json!("Conflict"));
        assert_eq!(json["initialValue"], json!(20));
        assert_eq!(json["growth"]["positiveFeedback"][0]["type"], json!("tag_count"));
        assert_eq!(json["growth"]["negativeFeedback"][0]["type"], json!("constant"));
        assert_eq!(json["contract"]["sources"][0]["component"], json!("raids"));
    }

    #[test]
    fn test_initial_value_range() {
        let (pressure, ctx) = compile("pressure p { initial_value 140 }");
        assert!(pressure.is_none());
        assert_eq!(ctx.diagnostics.iter().next().unwrap().code, DiagnosticCode::InvalidValue);
    }

    #[test]
    fn test_defaults() {
        let (pressure, _) = compile("pressure calm {}");
        let pressure = pressure.unwrap();
        assert_eq!(pressure.initial_value, 0.0);
        assert!(pressure.growth.positive_feedback.is_empty());
        assert!(pressure.contract.is_none());
    }

    #[test]
    fn test_bad_factor_fails_pressure() {
        let (pressure, ctx) = compile("pressure p {\n  growth {\n    positive entity_cnt kind npc\n  }\n}");
        assert!(pressure.is_none());
        assert_eq!(ctx.diagnostics.error_count(), 1);
    }
}
