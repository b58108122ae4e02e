//! Shorthand and container expansion
//!
//! Runs on the top-level statements once variables are split out:
//!
//! ```text
//! pressures { pressure a {} pressure b {} }   -> pressure a {}, pressure b {}
//! naming { grammar g {} lexeme_list l {} }    -> grammar g {}, lexeme_list l {}
//! seed_relationships { rel ally a -> b }      -> seed_relationship ally a b {}
//! rel ally_of a -> b strength 0.5             -> seed_relationship ally_of a b { strength 0.5 }
//! tag brave                                   -> tag brave {}
//! set allies a b include others               -> set allies a b include others {}
//! ```

use tracing::debug;

use super::mapping;
use crate::ast::{Attribute, Block, Rel, Statement, Value};
use crate::diagnostics::{suggest, with_suggestion, DiagnosticCode, Diagnostics};
use crate::dsl::naming::NAMING_BLOCKS;

/// Container block name that groups naming resources of every kind
pub const NAMING_CONTAINER: &str = "naming";

/// Child block name a container holds
pub fn container_child(name: &str) -> Option<&'static str> {
    match name {
        "pressures" => Some("pressure"),
        "eras" => Some("era"),
        "generators" => Some("generator"),
        "actions" => Some("action"),
        "entity_kinds" => Some("entity_kind"),
        "relationship_kinds" => Some("relationship_kind"),
        "cultures" => Some("culture"),
        "tags" => Some("tag"),
        "axes" => Some("axis"),
        "systems" => Some("system"),
        "seed_entities" => Some("seed_entity"),
        "seed_relationships" => Some("seed_relationship"),
        _ => None,
    }
}

/// Expand containers and shorthand forms. Statements that are neither
/// blocks nor shorthand pass through unchanged.
pub fn expand_shorthand(
    statements: Vec<Statement>,
    suggestion_threshold: f64,
    diagnostics: &mut Diagnostics,
) -> Vec<Statement> {
    let mut out = Vec::with_capacity(statements.len());
    for stmt in statements {
        match stmt {
            Statement::Block(block) if container_child(&block.name).is_some() => {
                expand_container(block, &mut out);
            }
            Statement::Block(block) if block.name == NAMING_CONTAINER => {
                expand_naming(block, &mut out, diagnostics);
            }
            Statement::Rel(rel) => out.push(Statement::Block(rel_to_block(rel))),
            Statement::Attribute(attr) => {
                if let Some(block) = attribute_to_block(attr, suggestion_threshold, diagnostics) {
                    out.push(Statement::Block(block));
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn expand_container(block: Block, out: &mut Vec<Statement>) {
    debug!(container = %block.name, children = block.body.len(), "expanding container");
    for child in block.body {
        match child {
            Statement::Rel(rel) => out.push(Statement::Block(rel_to_block(rel))),
            // wrong children were already reported by the formatting pass
            other => out.push(other),
        }
    }
}

fn expand_naming(block: Block, out: &mut Vec<Statement>, diagnostics: &mut Diagnostics) {
    if !block.labels.is_empty() {
        diagnostics.error(
            DiagnosticCode::InvalidStatement,
            "'naming' containers take no labels",
            &block.span,
        );
    }
    for child in block.body {
        match child {
            Statement::Block(inner) if NAMING_BLOCKS.contains(&inner.name.as_str()) => {
                out.push(Statement::Block(inner));
            }
            other => {
                let found = other.head().unwrap_or(other.kind_name()).to_string();
                diagnostics.error(
                    DiagnosticCode::InvalidStatement,
                    format!(
                        "container 'naming' holds {} blocks only, found '{}'",
                        NAMING_BLOCKS.join(", "),
                        found
                    ),
                    other.span(),
                );
            }
        }
    }
}

/// `rel kind src -> dst key value...` as a seed relationship block
fn rel_to_block(rel: Rel) -> Block {
    let body = rel
        .options
        .into_iter()
        .map(|(key, value)| {
            Statement::Attribute(Attribute {
                key,
                value,
                span: rel.span.clone(),
            })
        })
        .collect();
    Block {
        name: "seed_relationship".to_string(),
        labels: vec![rel.kind, rel.src, rel.dst],
        body,
        span: rel.span,
    }
}

/// `tag brave` -> `tag brave {}`. Only block names the compiler knows expand;
/// anything else is an unknown block.
fn attribute_to_block(
    attr: Attribute,
    suggestion_threshold: f64,
    diagnostics: &mut Diagnostics,
) -> Option<Block> {
    if mapping::lookup(&attr.key).is_none() {
        let hint = suggest(&attr.key, mapping::block_names(), suggestion_threshold);
        diagnostics.error(
            DiagnosticCode::UnknownBlock,
            with_suggestion(format!("unknown top-level statement '{}'", attr.key), hint),
            &attr.span,
        );
        return None;
    }
    let mut labels = Vec::new();
    for item in attr.value.items() {
        match item {
            Value::Identifier(s) | Value::String(s) => labels.push(s.clone()),
            Value::Number(_) | Value::Boolean(_) => labels.push(item.to_dsl_string()),
            other => {
                diagnostics.error(
                    DiagnosticCode::TypeMismatch,
                    format!(
                        "'{}' shorthand takes words only, found {}",
                        attr.key,
                        other.describe()
                    ),
                    &attr.span,
                );
                return None;
            }
        }
    }
    Some(Block {
        name: attr.key,
        labels,
        body: Vec::new(),
        span: attr.span,
    })
}
