//! Mutations
//!
//! Descriptions of state changes applied at runtime. Written as token lines,
//! `rel` lines or `mutate` lines:
//!
//! ```text
//! set_tag actor hero value 1
//! archive_relationship actor member_of with target
//! rel ally_of actor -> hero strength 0.5
//! mutate pressure.conflict += 5
//! mutate hero.tags -= exiled
//! ```

use serde::Serialize;
use serde_json::Value as JsonValue;

use super::{direction_option, settle, Direction};
use crate::ast::{Mutate, Rel, Statement, Value};
use crate::binding_context::{BindReferences, BindingContext, EntityRef};
use crate::diagnostics::{DiagnosticCode, SourceSpan};
use crate::error::{BindError, TokenError};
use crate::eval::{evaluate, EvalContext};
use crate::model::{num, opt_num};
use crate::tokens::{attribute_tokens, block_tokens, flatten, Token, TokenStream};

pub const MUTATION_TYPES: &[&str] = &[
    "set_tag",
    "remove_tag",
    "change_status",
    "adjust_prominence",
    "modify_pressure",
    "create_relationship",
    "adjust_relationship",
    "archive_relationship",
    "transfer_relationship",
    "update_rate_limit",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    SetTag {
        entity: EntityRef,
        tag: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<JsonValue>,
    },
    RemoveTag {
        entity: EntityRef,
        tag: String,
    },
    ChangeStatus {
        entity: EntityRef,
        #[serde(rename = "newStatus")]
        new_status: String,
    },
    AdjustProminence {
        entity: EntityRef,
        #[serde(serialize_with = "num")]
        delta: f64,
    },
    ModifyPressure {
        #[serde(rename = "pressureId")]
        pressure_id: String,
        #[serde(serialize_with = "num")]
        delta: f64,
    },
    CreateRelationship {
        kind: String,
        src: EntityRef,
        dst: EntityRef,
        #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
        strength: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        bidirectional: Option<bool>,
    },
    AdjustRelationship {
        kind: String,
        src: EntityRef,
        dst: EntityRef,
        #[serde(serialize_with = "num")]
        delta: f64,
    },
    ArchiveRelationship {
        entity: EntityRef,
        #[serde(rename = "relationshipKind")]
        relationship_kind: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        with: Option<EntityRef>,
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<Direction>,
    },
    TransferRelationship {
        entity: EntityRef,
        #[serde(rename = "relationshipKind")]
        relationship_kind: String,
        from: EntityRef,
        to: EntityRef,
    },
    UpdateRateLimit,
}

impl BindReferences for Mutation {
    fn bind_references(&mut self, ctx: &BindingContext, errors: &mut Vec<BindError>) {
        match self {
            Mutation::SetTag { entity, .. }
            | Mutation::RemoveTag { entity, .. }
            | Mutation::ChangeStatus { entity, .. }
            | Mutation::AdjustProminence { entity, .. } => entity.bind_references(ctx, errors),
            Mutation::CreateRelationship { src, dst, .. }
            | Mutation::AdjustRelationship { src, dst, .. } => {
                src.bind_references(ctx, errors);
                dst.bind_references(ctx, errors);
            }
            Mutation::ArchiveRelationship { entity, with, .. } => {
                entity.bind_references(ctx, errors);
                with.bind_references(ctx, errors);
            }
            Mutation::TransferRelationship {
                entity, from, to, ..
            } => {
                entity.bind_references(ctx, errors);
                from.bind_references(ctx, errors);
                to.bind_references(ctx, errors);
            }
            Mutation::ModifyPressure { .. } | Mutation::UpdateRateLimit => {}
        }
    }
}

// ============================================================================
// Token grammar
// ============================================================================

pub fn parse_mutation(tokens: &[Token], threshold: f64) -> Result<Mutation, TokenError> {
    let mut stream = TokenStream::new("mutation", tokens).with_threshold(threshold);
    let mutation_type = stream.next_ident("a mutation type")?;
    if !MUTATION_TYPES.contains(&mutation_type.as_str()) {
        return Err(stream.unknown_type(mutation_type, MUTATION_TYPES));
    }
    stream.set_construct(mutation_type.clone());

    let mutation = match mutation_type.as_str() {
        "set_tag" => {
            let entity = entity_ref(&mut stream)?;
            let tag = stream.next_ident("a tag")?;
            let opts = stream.keyed_options(&["value"])?;
            Mutation::SetTag {
                entity,
                tag,
                value: opts.get("value").map(Token::to_json),
            }
        }
        "remove_tag" => Mutation::RemoveTag {
            entity: entity_ref(&mut stream)?,
            tag: stream.next_ident("a tag")?,
        },
        "change_status" => Mutation::ChangeStatus {
            entity: entity_ref(&mut stream)?,
            new_status: stream.next_ident("a status")?,
        },
        "adjust_prominence" => Mutation::AdjustProminence {
            entity: entity_ref(&mut stream)?,
            delta: stream.next_number("a prominence delta")?,
        },
        "modify_pressure" => Mutation::ModifyPressure {
            pressure_id: stream.next_ident("a pressure id")?,
            delta: stream.next_number("a pressure delta")?,
        },
        "create_relationship" => {
            let kind = stream.next_ident("a relationship kind")?;
            let src = entity_ref(&mut stream)?;
            let dst = entity_ref(&mut stream)?;
            let opts = stream.keyed_options(&["strength", "bidirectional"])?;
            Mutation::CreateRelationship {
                kind,
                src,
                dst,
                strength: opts.number("strength")?,
                bidirectional: opts.boolean("bidirectional")?,
            }
        }
        "adjust_relationship" => {
            let kind = stream.next_ident("a relationship kind")?;
            let src = entity_ref(&mut stream)?;
            let dst = entity_ref(&mut stream)?;
            let opts = stream.keyed_options(&["delta"])?;
            Mutation::AdjustRelationship {
                kind,
                src,
                dst,
                delta: opts.require_number("delta")?,
            }
        }
        "archive_relationship" => {
            let entity = entity_ref(&mut stream)?;
            let relationship_kind = stream.next_ident("a relationship kind")?;
            let opts = stream.keyed_options(&["with", "direction"])?;
            Mutation::ArchiveRelationship {
                entity,
                relationship_kind,
                with: opts.string("with").map(EntityRef),
                direction: direction_option(&opts)?,
            }
        }
        "transfer_relationship" => {
            let entity = entity_ref(&mut stream)?;
            let relationship_kind = stream.next_ident("a relationship kind")?;
            let opts = stream.keyed_options(&["from", "to"])?;
            Mutation::TransferRelationship {
                entity,
                relationship_kind,
                from: EntityRef(opts.require_string("from")?),
                to: EntityRef(opts.require_string("to")?),
            }
        }
        _ => Mutation::UpdateRateLimit,
    };
    stream.expect_end()?;
    Ok(mutation)
}

fn entity_ref(stream: &mut TokenStream) -> Result<EntityRef, TokenError> {
    stream.next_ident("an entity reference").map(EntityRef)
}

// ============================================================================
// Statement bodies
// ============================================================================

/// Compile every mutation in a block body
pub fn compile_mutations(
    body: &[Statement],
    ctx: &mut EvalContext,
    binding: &BindingContext,
) -> Vec<Mutation> {
    body.iter()
        .filter_map(|stmt| compile_mutation_statement(stmt, ctx, binding))
        .collect()
}

fn compile_mutation_statement(
    stmt: &Statement,
    ctx: &mut EvalContext,
    binding: &BindingContext,
) -> Option<Mutation> {
    let span = stmt.span();
    let threshold = ctx.options.suggestion_threshold;
    let mutation = match stmt {
        Statement::Attribute(attr) => {
            let tokens = settle(attribute_tokens(&attr.key, &attr.value, ctx, span), ctx, span)?;
            settle(parse_mutation(&tokens, threshold), ctx, span)?
        }
        Statement::Bare(bare) => {
            let value = evaluate(&bare.value, ctx, span);
            let tokens = settle(flatten(&value, "mutation"), ctx, span)?;
            settle(parse_mutation(&tokens, threshold), ctx, span)?
        }
        Statement::Block(block) => {
            let tokens = settle(block_tokens(block, ctx), ctx, span)?;
            settle(parse_mutation(&tokens, threshold), ctx, span)?
        }
        Statement::Rel(rel) => rel_mutation(rel, ctx)?,
        Statement::Mutate(m) => mutate_statement(m, ctx)?,
        other => {
            ctx.error(
                DiagnosticCode::InvalidStatement,
                format!("{} statement is not a mutation", other.kind_name()),
                span,
            );
            return None;
        }
    };
    binding.bind_record(mutation, ctx, span)
}

fn rel_mutation(rel: &Rel, ctx: &mut EvalContext) -> Option<Mutation> {
    let (strength, bidirectional) = relationship_options(&rel.options, ctx, &rel.span)?;
    Some(Mutation::CreateRelationship {
        kind: rel.kind.clone(),
        src: EntityRef::new(rel.src.clone()),
        dst: EntityRef::new(rel.dst.clone()),
        strength,
        bidirectional,
    })
}

/// `strength` and `bidirectional` options of a `rel` line
pub fn relationship_options(
    options: &[(String, Value)],
    ctx: &mut EvalContext,
    span: &SourceSpan,
) -> Option<(Option<f64>, Option<bool>)> {
    let mut strength = None;
    let mut bidirectional = None;
    let mut ok = true;
    for (key, value) in options {
        let evaluated = evaluate(value, ctx, span);
        match (key.as_str(), &evaluated) {
            ("strength", JsonValue::Number(n)) => strength = n.as_f64(),
            ("bidirectional", JsonValue::Bool(b)) => bidirectional = Some(*b),
            ("strength", _) | ("bidirectional", _) => {
                ctx.error(
                    DiagnosticCode::TypeMismatch,
                    format!("rel option '{}' has the wrong type: {}", key, evaluated),
                    span,
                );
                ok = false;
            }
            _ => {
                ctx.unknown_field("rel", key, &["strength", "bidirectional"], span);
                ok = false;
            }
        }
    }
    ok.then_some((strength, bidirectional))
}

/// `mutate <target> <op> <value>`
fn mutate_statement(m: &Mutate, ctx: &mut EvalContext) -> Option<Mutation> {
    let span = &m.span;
    let value = evaluate(&m.value, ctx, span);

    let signed_delta = |ctx: &mut EvalContext| -> Option<f64> {
        let Some(n) = value.as_f64() else {
            ctx.error(
                DiagnosticCode::TypeMismatch,
                format!("mutate {}: expected a number, found {}", m.target, value),
                span,
            );
            return None;
        };
        match m.operator.as_str() {
            "+=" => Some(n),
            "-=" => Some(-n),
            other => {
                ctx.error(
                    DiagnosticCode::InvalidValue,
                    format!("mutate {}: expected '+=' or '-=', found '{}'", m.target, other),
                    span,
                );
                None
            }
        }
    };

    if let Some(pressure_id) = m.target.strip_prefix("pressure.") {
        return Some(Mutation::ModifyPressure {
            pressure_id: pressure_id.to_string(),
            delta: signed_delta(ctx)?,
        });
    }

    let Some((entity, field)) = m.target.rsplit_once('.') else {
        ctx.error(
            DiagnosticCode::InvalidValue,
            format!(
                "mutate target '{}' must be pressure.<id> or <entity>.<prominence|status|tags>",
                m.target
            ),
            span,
        );
        return None;
    };
    let entity = EntityRef::new(entity);

    match field {
        "prominence" => Some(Mutation::AdjustProminence {
            entity,
            delta: signed_delta(ctx)?,
        }),
        "status" | "tags" => {
            let Some(word) = value.as_str().map(str::to_string) else {
                ctx.error(
                    DiagnosticCode::TypeMismatch,
                    format!("mutate {}: expected a word, found {}", m.target, value),
                    span,
                );
                return None;
            };
            match (field, m.operator.as_str()) {
                ("status", "=") => Some(Mutation::ChangeStatus {
                    entity,
                    new_status: word,
                }),
                ("tags", "+=") => Some(Mutation::SetTag {
                    entity,
                    tag: word,
                    value: None,
                }),
                ("tags", "-=") => Some(Mutation::RemoveTag { entity, tag: word }),
                _ => {
                    ctx.error(
                        DiagnosticCode::InvalidValue,
                        format!("operator '{}' cannot be applied to {}", m.operator, m.target),
                        span,
                    );
                    None
                }
            }
        }
        other => {
            ctx.error(
                DiagnosticCode::InvalidValue,
                format!(
                    "cannot mutate '{}' of an entity; expected prominence, status or tags",
                    other
                ),
                span,
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding_context::ContextKind;
    use crate::config::CompilerOptions;
    use crate::parser::parse_source;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn compile(src: &str) -> (serde_json::Value, EvalContext) {
        let stmts = parse_source(src, "m.wd").unwrap();
        let mut ctx = EvalContext::empty(CompilerOptions::default());
        let mut binding = BindingContext::new(ContextKind::Generator, SourceSpan::file_start("m.wd"));
        binding.declare("hero").unwrap();
        let mutations = compile_mutations(&stmts, &mut ctx, &binding);
        (serde_json::to_value(mutations).unwrap(), ctx)
    }

    #[test]
    fn test_token_mutations() {
        let (json, ctx) = compile(
            "set_tag actor hero value 1\narchive_relationship actor member_of with target\nmodify_pressure conflict -5\nupdate_rate_limit",
        );
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        assert_eq!(
            json,
            json!([
                {"type": "set_tag", "entity": "$actor", "tag": "hero", "value": 1},
                {"type": "archive_relationship", "entity": "$actor", "relationshipKind": "member_of", "with": "$target"},
                {"type": "modify_pressure", "pressureId": "conflict", "delta": -5},
                {"type": "update_rate_limit"}
            ])
        );
    }

    #[test]
    fn test_rel_and_mutate_lines() {
        let (json, ctx) = compile(
            "rel ally_of actor -> hero strength 0.5\nmutate pressure.conflict -= 2\nmutate hero.prominence += 1\nmutate hero.status = exiled\nmutate hero.tags -= brave",
        );
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        assert_eq!(
            json,
            json!([
                {"type": "create_relationship", "kind": "ally_of", "src": "$actor", "dst": "$hero", "strength": 0.5},
                {"type": "modify_pressure", "pressureId": "conflict", "delta": -2},
                {"type": "adjust_prominence", "entity": "$hero", "delta": 1},
                {"type": "change_status", "entity": "$hero", "newStatus": "exiled"},
                {"type": "remove_tag", "entity": "$hero", "tag": "brave"}
            ])
        );
    }

    #[test]
    fn test_transfer_requires_endpoints() {
        let (json, ctx) = compile("transfer_relationship hero member_of from actor\nchange_status hero");
        assert_eq!(json, json!([]));
        assert_eq!(ctx.diagnostics.error_count(), 2);
        assert!(ctx
            .diagnostics
            .iter()
            .any(|d| d.message.contains("missing required option 'to'")));
    }

    #[test]
    fn test_bad_mutate_target() {
        let (_, ctx) = compile("mutate hero.name = bob\nmutate hero.status += 1");
        assert_eq!(ctx.diagnostics.error_count(), 2);
    }
}
