//! Conditions
//!
//! Applicability rules, era entry/exit rules and actor conditions share one
//! grammar. The first token names the condition type:
//!
//! ```text
//! pressure conflict gte 40
//! entity_count npc status alive between 3 10
//! relationship_exists actor member_of with target direction src
//! time_elapsed 20
//! not_self
//! all { tag_exists actor brave; random_chance 0.5 }
//! ```
//!
//! Predicate lines (`pressure.conflict >= 40`, `time_elapsed > 5`,
//! `entity_count.npc < 3`) and `era in [a b]` are accepted as shorthands.

use serde::Serialize;

use super::{direction_option, settle, Direction};
use crate::ast::{Block, Predicate, Statement};
use crate::binding_context::{BindReferences, BindingContext, EntityRef};
use crate::diagnostics::{DiagnosticCode, SourceSpan};
use crate::error::{BindError, TokenError};
use crate::eval::{evaluate, EvalContext};
use crate::model::num;
use crate::tokens::{
    attribute_tokens, block_tokens, flatten, whole_u32, CompareOp, Comparison, Token, TokenStream,
    COMPARISON_KEYWORDS,
};

pub const CONDITION_TYPES: &[&str] = &[
    "pressure",
    "cap",
    "entity_count",
    "tag_exists",
    "lacks_tag",
    "relationship_exists",
    "relationship_count",
    "random_chance",
    "time_elapsed",
    "growth_phases_complete",
    "era_match",
    "prominence",
    "entity_exists",
    "not_self",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProminenceLevel {
    Forgotten,
    Marginal,
    Recognized,
    Renowned,
    Mythic,
}

impl ProminenceLevel {
    pub const NAMES: &'static [&'static str] =
        &["forgotten", "marginal", "recognized", "renowned", "mythic"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "forgotten" => Some(ProminenceLevel::Forgotten),
            "marginal" => Some(ProminenceLevel::Marginal),
            "recognized" => Some(ProminenceLevel::Recognized),
            "renowned" => Some(ProminenceLevel::Renowned),
            "mythic" => Some(ProminenceLevel::Mythic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Pressure(PressureCondition),
    Cap {
        kind: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
        #[serde(serialize_with = "num")]
        max: f64,
    },
    EntityCount(EntityCountCondition),
    TagExists {
        entity: EntityRef,
        tag: String,
    },
    LacksTag {
        entity: EntityRef,
        tag: String,
    },
    RelationshipExists {
        entity: EntityRef,
        #[serde(rename = "relationshipKind")]
        relationship_kind: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        with: Option<EntityRef>,
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<Direction>,
    },
    RelationshipCount(RelationshipCountCondition),
    RandomChance {
        #[serde(serialize_with = "num")]
        chance: f64,
    },
    TimeElapsed(TimeElapsedCondition),
    GrowthPhasesComplete {
        #[serde(rename = "minPhases")]
        min_phases: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        era: Option<String>,
    },
    EraMatch {
        eras: Vec<String>,
    },
    Prominence {
        entity: EntityRef,
        operator: CompareOp,
        level: ProminenceLevel,
    },
    EntityExists {
        entity: EntityRef,
    },
    NotSelf,
    And {
        conditions: Vec<Condition>,
    },
    Or {
        conditions: Vec<Condition>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PressureCondition {
    #[serde(rename = "pressureId")]
    pub pressure_id: String,
    #[serde(flatten)]
    pub comparison: Comparison,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityCountCondition {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub comparison: Comparison,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipCountCondition {
    pub entity: EntityRef,
    #[serde(rename = "relationshipKind")]
    pub relationship_kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(flatten)]
    pub comparison: Comparison,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeElapsedCondition {
    #[serde(flatten)]
    pub comparison: Comparison,
}

impl BindReferences for Condition {
    fn bind_references(&mut self, ctx: &BindingContext, errors: &mut Vec<BindError>) {
        match self {
            Condition::TagExists { entity, .. }
            | Condition::LacksTag { entity, .. }
            | Condition::Prominence { entity, .. }
            | Condition::EntityExists { entity } => entity.bind_references(ctx, errors),
            Condition::RelationshipExists { entity, with, .. } => {
                entity.bind_references(ctx, errors);
                with.bind_references(ctx, errors);
            }
            Condition::RelationshipCount(c) => c.entity.bind_references(ctx, errors),
            Condition::And { conditions } | Condition::Or { conditions } => {
                conditions.bind_references(ctx, errors)
            }
            Condition::Pressure(_)
            | Condition::Cap { .. }
            | Condition::EntityCount(_)
            | Condition::RandomChance { .. }
            | Condition::TimeElapsed(_)
            | Condition::GrowthPhasesComplete { .. }
            | Condition::EraMatch { .. }
            | Condition::NotSelf => {}
        }
    }
}

// ============================================================================
// Token grammar
// ============================================================================

/// Parse one condition from flat tokens
pub fn parse_condition(tokens: &[Token], threshold: f64) -> Result<Condition, TokenError> {
    let mut stream = TokenStream::new("condition", tokens).with_threshold(threshold);
    let condition_type = stream.next_ident("a condition type")?;
    if !CONDITION_TYPES.contains(&condition_type.as_str()) {
        return Err(stream.unknown_type(condition_type, CONDITION_TYPES));
    }
    stream.set_construct(condition_type.clone());

    let condition = match condition_type.as_str() {
        "pressure" => Condition::Pressure(PressureCondition {
            pressure_id: stream.next_ident("a pressure id")?,
            comparison: stream.comparison()?,
        }),
        "cap" => {
            let opts = stream.keyed_options(&["kind", "subtype", "max"])?;
            Condition::Cap {
                kind: opts.require_string("kind")?,
                subtype: opts.string("subtype"),
                max: opts.require_number("max")?,
            }
        }
        "entity_count" => {
            let kind = stream.next_ident("an entity kind")?;
            let opts = stream.keyed_options_until(&["subtype", "status"], COMPARISON_KEYWORDS)?;
            Condition::EntityCount(EntityCountCondition {
                kind,
                subtype: opts.string("subtype"),
                status: opts.string("status"),
                comparison: stream.comparison()?,
            })
        }
        "tag_exists" | "lacks_tag" => {
            let entity = entity_ref(&mut stream)?;
            let tag = stream.next_ident("a tag")?;
            if condition_type == "tag_exists" {
                Condition::TagExists { entity, tag }
            } else {
                Condition::LacksTag { entity, tag }
            }
        }
        "relationship_exists" => {
            let entity = entity_ref(&mut stream)?;
            let relationship_kind = stream.next_ident("a relationship kind")?;
            let opts = stream.keyed_options(&["with", "direction"])?;
            Condition::RelationshipExists {
                entity,
                relationship_kind,
                with: opts.string("with").map(EntityRef),
                direction: direction_option(&opts)?,
            }
        }
        "relationship_count" => {
            let entity = entity_ref(&mut stream)?;
            let relationship_kind = stream.next_ident("a relationship kind")?;
            let comparison = stream.comparison()?;
            let opts = stream.keyed_options(&["direction"])?;
            Condition::RelationshipCount(RelationshipCountCondition {
                entity,
                relationship_kind,
                direction: direction_option(&opts)?,
                comparison,
            })
        }
        "random_chance" => {
            let chance = stream.next_number("a probability")?;
            if !(0.0..=1.0).contains(&chance) {
                return Err(stream.invalid(format!("chance {} is outside 0..1", chance)));
            }
            Condition::RandomChance { chance }
        }
        "time_elapsed" => {
            let comparison = if stream.peek().and_then(Token::as_number).is_some() {
                Comparison::Gte {
                    value: stream.next_number("a tick count")?,
                }
            } else {
                stream.comparison()?
            };
            Condition::TimeElapsed(TimeElapsedCondition { comparison })
        }
        "growth_phases_complete" => {
            let phases = stream.next_number("a phase count")?;
            let Some(min_phases) = whole_u32(phases) else {
                return Err(stream.invalid(format!("{} is not a whole number of phases", phases)));
            };
            let opts = stream.keyed_options(&["era"])?;
            Condition::GrowthPhasesComplete {
                min_phases,
                era: opts.string("era"),
            }
        }
        "era_match" => {
            let eras = stream.prefix_list(&[]);
            if eras.is_empty() {
                return Err(stream.invalid("expected at least one era"));
            }
            Condition::EraMatch { eras }
        }
        "prominence" => {
            let entity = entity_ref(&mut stream)?;
            let operator = stream.compare_op()?;
            let level = stream.next_choice("level", ProminenceLevel::NAMES)?;
            Condition::Prominence {
                entity,
                operator,
                level: ProminenceLevel::parse(&level).unwrap_or(ProminenceLevel::Marginal),
            }
        }
        "entity_exists" => Condition::EntityExists {
            entity: entity_ref(&mut stream)?,
        },
        _ => Condition::NotSelf,
    };
    stream.expect_end()?;
    Ok(condition)
}

fn entity_ref(stream: &mut TokenStream) -> Result<EntityRef, TokenError> {
    stream.next_ident("an entity reference").map(EntityRef)
}

// ============================================================================
// Statement bodies
// ============================================================================

/// Compile every condition in a block body
pub fn compile_conditions(
    body: &[Statement],
    ctx: &mut EvalContext,
    binding: &BindingContext,
) -> Vec<Condition> {
    body.iter()
        .filter_map(|stmt| compile_condition_statement(stmt, ctx, binding))
        .collect()
}

fn compile_condition_statement(
    stmt: &Statement,
    ctx: &mut EvalContext,
    binding: &BindingContext,
) -> Option<Condition> {
    let span = stmt.span();
    let condition = match stmt {
        Statement::Attribute(attr) => {
            let tokens = settle(attribute_tokens(&attr.key, &attr.value, ctx, span), ctx, span)?;
            parse(&tokens, ctx, span)?
        }
        Statement::Bare(bare) => {
            let value = evaluate(&bare.value, ctx, span);
            let tokens = settle(flatten(&value, "condition"), ctx, span)?;
            parse(&tokens, ctx, span)?
        }
        Statement::Block(block) if matches!(block.name.as_str(), "all" | "any") => {
            return composite(block, ctx, binding)
        }
        Statement::Block(block) => {
            let tokens = settle(block_tokens(block, ctx), ctx, span)?;
            parse(&tokens, ctx, span)?
        }
        Statement::Predicate(pred) => predicate(pred, ctx)?,
        Statement::In(clause) if clause.subject == "era" => {
            let value = evaluate(&clause.value, ctx, span);
            let tokens = settle(flatten(&value, "era in"), ctx, span)?;
            let eras = tokens.iter().map(Token::text).collect();
            Condition::EraMatch { eras }
        }
        other => {
            ctx.error(
                DiagnosticCode::InvalidStatement,
                format!("{} statement is not a condition", other.kind_name()),
                span,
            );
            return None;
        }
    };

    let condition = expand_era_sets(condition, ctx, span)?;
    binding.bind_record(condition, ctx, span)
}

fn parse(tokens: &[Token], ctx: &mut EvalContext, span: &SourceSpan) -> Option<Condition> {
    let threshold = ctx.options.suggestion_threshold;
    settle(parse_condition(tokens, threshold), ctx, span)
}

fn composite(block: &Block, ctx: &mut EvalContext, binding: &BindingContext) -> Option<Condition> {
    if !block.labels.is_empty() {
        ctx.error(
            DiagnosticCode::InvalidStatement,
            format!("'{}' blocks take no labels", block.name),
            &block.span,
        );
        return None;
    }
    if block.body.is_empty() {
        ctx.error(
            DiagnosticCode::MissingField,
            format!("'{}' block needs at least one condition", block.name),
            &block.span,
        );
        return None;
    }
    let conditions = compile_conditions(&block.body, ctx, binding);
    Some(if block.name == "all" {
        Condition::And { conditions }
    } else {
        Condition::Or { conditions }
    })
}

/// `pressure.<id> op n`, `time_elapsed op n`, `entity_count.<kind> op n`
fn predicate(pred: &Predicate, ctx: &mut EvalContext) -> Option<Condition> {
    let span = &pred.span;
    let Some(op) = CompareOp::parse(&pred.operator) else {
        ctx.error(
            DiagnosticCode::InvalidValue,
            format!("operator '{}' is not supported in conditions", pred.operator),
            span,
        );
        return None;
    };
    let value = evaluate(&pred.value, ctx, span);
    let Some(n) = value.as_f64() else {
        ctx.error(
            DiagnosticCode::TypeMismatch,
            format!("'{}' compares against a number, found {}", pred.subject, value),
            span,
        );
        return None;
    };
    let comparison = Comparison::new(op, n);

    if let Some(pressure_id) = pred.subject.strip_prefix("pressure.") {
        return Some(Condition::Pressure(PressureCondition {
            pressure_id: pressure_id.to_string(),
            comparison,
        }));
    }
    if let Some(kind) = pred.subject.strip_prefix("entity_count.") {
        return Some(Condition::EntityCount(EntityCountCondition {
            kind: kind.to_string(),
            subtype: None,
            status: None,
            comparison,
        }));
    }
    if pred.subject == "time_elapsed" {
        return Some(Condition::TimeElapsed(TimeElapsedCondition { comparison }));
    }
    ctx.error(
        DiagnosticCode::InvalidStatement,
        format!(
            "'{}' cannot be compared; expected pressure.<id>, entity_count.<kind> or time_elapsed",
            pred.subject
        ),
        span,
    );
    None
}

fn expand_era_sets(
    condition: Condition,
    ctx: &mut EvalContext,
    span: &SourceSpan,
) -> Option<Condition> {
    match condition {
        Condition::EraMatch { eras } => {
            let eras = ctx.resolve_inline_set(&eras, "era_match", span)?;
            Some(Condition::EraMatch { eras })
        }
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding_context::ContextKind;
    use crate::config::CompilerOptions;
    use crate::diagnostics::Diagnostics;
    use crate::eval::VariableTable;
    use crate::parser::parse_source;
    use crate::registry::ResourceRegistry;
    use crate::sets::SetTable;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn compile(src: &str) -> (Vec<Condition>, EvalContext) {
        let stmts = parse_source(src, "c.wd").unwrap();
        let mut diagnostics = Diagnostics::new();
        let set_stmts = parse_source("set late { industrial modern }", "s.wd").unwrap();
        let set_blocks = set_stmts.into_iter().filter_map(|s| match s {
            Statement::Block(b) => Some(b),
            _ => None,
        });
        let (sets, _) = SetTable::extract(set_blocks.collect(), 0.8, &mut diagnostics);
        let mut ctx = EvalContext::new(
            CompilerOptions::default(),
            VariableTable::default(),
            ResourceRegistry::default(),
            sets,
            diagnostics,
        );
        let binding = BindingContext::new(ContextKind::Generator, SourceSpan::file_start("c.wd"));
        let conditions = compile_conditions(&stmts, &mut ctx, &binding);
        (conditions, ctx)
    }

    fn to_json(conditions: &[Condition]) -> serde_json::Value {
        serde_json::to_value(conditions).unwrap()
    }

    #[test]
    fn test_token_conditions() {
        let (conditions, ctx) = compile(
            "pressure conflict gte 40\nentity_count npc status alive between 3 10\ntag_exists actor brave\nnot_self",
        );
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        assert_eq!(
            to_json(&conditions),
            json!([
                {"type": "pressure", "pressureId": "conflict", "operator": "gte", "value": 40},
                {"type": "entity_count", "kind": "npc", "status": "alive", "operator": "between", "min": 3, "max": 10},
                {"type": "tag_exists", "entity": "$actor", "tag": "brave"},
                {"type": "not_self"}
            ])
        );
    }

    #[test]
    fn test_predicates_and_era_in() {
        let (conditions, ctx) =
            compile("pressure.conflict >= 40\ntime_elapsed > 5\nera in [early include late]");
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        assert_eq!(
            to_json(&conditions),
            json!([
                {"type": "pressure", "pressureId": "conflict", "operator": "gte", "value": 40},
                {"type": "time_elapsed", "operator": "gt", "value": 5},
                {"type": "era_match", "eras": ["early", "industrial", "modern"]}
            ])
        );
    }

    #[test]
    fn test_growth_phases_range() {
        let (conditions, ctx) = compile("growth_phases_complete 2\ngrowth_phases_complete 5000000000");
        assert_eq!(ctx.diagnostics.error_count(), 1);
        assert_eq!(
            to_json(&conditions),
            json!([{"type": "growth_phases_complete", "minPhases": 2}])
        );
    }

    #[test]
    fn test_time_elapsed_defaults_to_gte() {
        let (conditions, _) = compile("time_elapsed 20");
        assert_eq!(
            to_json(&conditions),
            json!([{"type": "time_elapsed", "operator": "gte", "value": 20}])
        );
    }

    #[test]
    fn test_composites() {
        let (conditions, ctx) =
            compile("any {\n  random_chance 0.5\n  all { lacks_tag target exiled; entity_exists partner }\n}");
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        assert_eq!(
            to_json(&conditions),
            json!([{
                "type": "or",
                "conditions": [
                    {"type": "random_chance", "chance": 0.5},
                    {"type": "and", "conditions": [
                        {"type": "lacks_tag", "entity": "$target", "tag": "exiled"},
                        {"type": "entity_exists", "entity": "$partner"}
                    ]}
                ]
            }])
        );
    }

    #[test]
    fn test_relationship_conditions() {
        let (conditions, ctx) = compile(
            "relationship_exists actor member_of with target direction src\nrelationship_count actor ally_of gt 2",
        );
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        assert_eq!(
            to_json(&conditions),
            json!([
                {"type": "relationship_exists", "entity": "$actor", "relationshipKind": "member_of", "with": "$target", "direction": "src"},
                {"type": "relationship_count", "entity": "$actor", "relationshipKind": "ally_of", "operator": "gt", "value": 2}
            ])
        );
    }

    #[test]
    fn test_failures_are_local() {
        let (conditions, ctx) = compile(
            "random_chance 2\ntag_exists villain brave\npresure conflict gt 1\nprominence actor gte renowned",
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(ctx.diagnostics.error_count(), 3);
        let messages: Vec<&str> = ctx.diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert!(messages[0].contains("outside 0..1"));
        assert!(messages[1].contains("'villain' is not declared"));
        assert!(messages[2].contains("did you mean 'pressure'"));
    }
}
