//! `action <id> [name] { actor {} target {} outcome {} probability {} }`

use super::BlockScope;
use crate::ast::{Attribute, Block, Statement};
use crate::binding_context::{BindingContext, ContextKind};
use crate::compiler::fields::eval_tokens;
use crate::compiler::mapping::CompiledItem;
use crate::diagnostics::DiagnosticCode;
use crate::dsl::conditions::compile_conditions;
use crate::dsl::mutations::compile_mutations;
use crate::dsl::selection::compile_selection;
use crate::dsl::settle;
use crate::error::TokenError;
use crate::eval::EvalContext;
use crate::model::{ActionDef, ActorSpec, OutcomeSpec, ProbabilitySpec};
use crate::tokens::TokenStream;

const ACTION_FIELDS: &[&str] = &["name", "description", "actor", "target", "outcome", "probability"];
const ACTOR_FIELDS: &[&str] = &["selection", "conditions", "instigator"];
const PROBABILITY_FIELDS: &[&str] = &["success", "weight", "pressure"];

pub fn build_action(block: &Block, ctx: &mut EvalContext) -> Option<CompiledItem> {
    let mut scope = BlockScope::new(block);
    let id = scope.id(0, ctx)?;
    let mut binding = BindingContext::new(ContextKind::Action, block.span.clone())
        .with_threshold(ctx.options.suggestion_threshold);
    let mut def = ActionDef {
        id,
        name: block.label(1).map(str::to_string),
        ..ActionDef::default()
    };
    let mut seen = Vec::new();

    for stmt in &block.body {
        match stmt {
            Statement::Attribute(attr) => match attr.key.as_str() {
                "name" => scope.name(&mut def.name, attr, ctx),
                "description" => scope.text(&mut def.description, attr, ctx),
                _ => scope.reject(stmt, ACTION_FIELDS, ctx),
            },
            Statement::Block(inner) if ACTION_FIELDS.contains(&inner.name.as_str()) => {
                if seen.contains(&inner.name.as_str()) {
                    ctx.error(
                        DiagnosticCode::DuplicateDeclaration,
                        format!("'{}' is given more than once", inner.name),
                        &inner.span,
                    );
                    scope.fail();
                    continue;
                }
                seen.push(inner.name.as_str());
                match inner.name.as_str() {
                    "actor" => match compile_actor(inner, ctx, &binding) {
                        Some(actor) => def.actor = actor,
                        None => scope.fail(),
                    },
                    "target" => {
                        binding.declare_selection();
                        match compile_selection(&inner.body, "target", ctx, &binding) {
                            Some(selection) => def.target = Some(selection),
                            None => scope.fail(),
                        }
                    }
                    "outcome" => match compile_outcome(inner, ctx, &binding) {
                        Some(outcome) => def.outcome = outcome,
                        None => scope.fail(),
                    },
                    "probability" => match compile_probability(inner, ctx) {
                        Some(probability) => def.probability = probability,
                        None => scope.fail(),
                    },
                    _ => scope.reject(stmt, ACTION_FIELDS, ctx),
                }
            }
            other => scope.reject(other, ACTION_FIELDS, ctx),
        }
    }
    scope.finish(CompiledItem::Action(def))
}

fn compile_actor(block: &Block, ctx: &mut EvalContext, binding: &BindingContext) -> Option<ActorSpec> {
    let mut scope = BlockScope::new(block);
    let mut actor = ActorSpec::default();
    for stmt in &block.body {
        let Statement::Block(inner) = stmt else {
            scope.reject(stmt, ACTOR_FIELDS, ctx);
            continue;
        };
        match inner.name.as_str() {
            "selection" | "instigator" => {
                let slot = if inner.name == "selection" {
                    &mut actor.selection
                } else {
                    &mut actor.instigator
                };
                if slot.is_some() {
                    ctx.error(
                        DiagnosticCode::DuplicateDeclaration,
                        format!("actor declares more than one {}", inner.name),
                        &inner.span,
                    );
                    scope.fail();
                    continue;
                }
                let construct = format!("actor {}", inner.name);
                match compile_selection(&inner.body, &construct, ctx, binding) {
                    Some(selection) => *slot = Some(selection),
                    None => scope.fail(),
                }
            }
            "conditions" => {
                let conditions = scope.guard(ctx, |ctx| compile_conditions(&inner.body, ctx, binding));
                actor.conditions.extend(conditions);
            }
            _ => scope.reject(stmt, ACTOR_FIELDS, ctx),
        }
    }
    scope.finish(actor)
}

/// Mutation statements plus an optional `description_template`. A nested
/// `mutations {}` block is accepted as well.
fn compile_outcome(block: &Block, ctx: &mut EvalContext, binding: &BindingContext) -> Option<OutcomeSpec> {
    let mut scope = BlockScope::new(block);
    let mut outcome = OutcomeSpec::default();
    for stmt in &block.body {
        match stmt {
            Statement::Attribute(attr) if attr.key == "description_template" => {
                scope.text(&mut outcome.description_template, attr, ctx);
            }
            Statement::Block(inner) if inner.name == "mutations" => {
                let mutations = scope.guard(ctx, |ctx| compile_mutations(&inner.body, ctx, binding));
                outcome.mutations.extend(mutations);
            }
            other => {
                let mutations = scope.guard(ctx, |ctx| compile_mutations(std::slice::from_ref(other), ctx, binding));
                outcome.mutations.extend(mutations);
            }
        }
    }
    scope.finish(outcome)
}

fn compile_probability(block: &Block, ctx: &mut EvalContext) -> Option<ProbabilitySpec> {
    let mut scope = BlockScope::new(block);
    let mut success = None;
    let mut weight = None;
    let mut probability = ProbabilitySpec::default();
    for stmt in &block.body {
        let Statement::Attribute(attr) = stmt else {
            scope.reject(stmt, PROBABILITY_FIELDS, ctx);
            continue;
        };
        match attr.key.as_str() {
            "success" => scope.number(&mut success, attr, ctx),
            "weight" => scope.number(&mut weight, attr, ctx),
            "pressure" => {
                let ok = pressure_modifier(attr, &mut probability, ctx);
                scope.check(ok);
            }
            _ => scope.reject(stmt, PROBABILITY_FIELDS, ctx),
        }
    }
    if let Some(chance) = success {
        if !(0.0..=1.0).contains(&chance) {
            ctx.error(
                DiagnosticCode::InvalidValue,
                format!("success must be between 0 and 1, found {}", chance),
                &block.span,
            );
            scope.fail();
        }
        probability.base_success_chance = chance;
    }
    if let Some(weight) = weight {
        if weight < 0.0 {
            ctx.error(
                DiagnosticCode::InvalidValue,
                format!("weight cannot be negative, found {}", weight),
                &block.span,
            );
            scope.fail();
        }
        probability.base_weight = weight;
    }
    scope.finish(probability)
}

/// `pressure <id> <multiplier>`
fn pressure_modifier(attr: &Attribute, probability: &mut ProbabilitySpec, ctx: &mut EvalContext) -> bool {
    let Some(tokens) = eval_tokens(&attr.value, ctx, "pressure", &attr.span) else {
        return false;
    };
    let parsed = (|| -> Result<(String, f64), TokenError> {
        let mut stream = TokenStream::new("pressure modifier", &tokens);
        let id = stream.next_ident("a pressure id")?;
        let multiplier = stream.next_number("a multiplier")?;
        stream.expect_end()?;
        Ok((id, multiplier))
    })();
    let Some((id, multiplier)) = settle(parsed, ctx, &attr.span) else {
        return false;
    };
    if probability.pressure_modifiers.insert(id.clone(), multiplier).is_some() {
        ctx.error(
            DiagnosticCode::DuplicateDeclaration,
            format!("pressure modifier for '{}' is given more than once", id),
            &attr.span,
        );
        return false;
    }
    true
}
