//! Entity kinds, relationship kinds, cultures, tags and axes

use super::BlockScope;
use crate::ast::{Attribute, Block, Statement};
use crate::compiler::fields::{block_to_json, eval_set_valued, eval_string_list, eval_tokens, set_once};
use crate::compiler::mapping::CompiledItem;
use crate::diagnostics::{duplicate_id_error, DiagnosticCode};
use crate::dsl::semantic_plane::compile_semantic_plane;
use crate::dsl::settle;
use crate::error::TokenError;
use crate::eval::EvalContext;
use crate::model::{
    AxisBias, AxisDef, CultureDef, EntityKindDef, Polarity, Rarity, RelationshipKindDef,
    StatusDef, SubtypeDef, TagDef,
};
use crate::tokens::{Token, TokenStream};

const ENTITY_KIND_FIELDS: &[&str] = &[
    "name",
    "description",
    "subtype",
    "status",
    "required_relationship",
    "semantic_plane",
    "style",
];
const RELATIONSHIP_KIND_FIELDS: &[&str] = &[
    "name",
    "description",
    "src",
    "dst",
    "polarity",
    "decay_rate",
    "cullable",
    "symmetric",
];
const CULTURE_FIELDS: &[&str] = &["name", "description", "color", "home_region", "axis_bias"];
const TAG_FIELDS: &[&str] = &["category", "rarity", "description", "entity_kinds", "conflicts", "axis"];
const AXIS_FIELDS: &[&str] = &["name", "description", "low", "high"];

const TERMINAL: &str = "terminal";

// ============================================================================
// entity_kind
// ============================================================================

pub fn build_entity_kind(block: &Block, ctx: &mut EvalContext) -> Option<CompiledItem> {
    let mut scope = BlockScope::new(block);
    let kind = scope.id(0, ctx)?;
    let mut def = EntityKindDef {
        kind,
        ..EntityKindDef::default()
    };

    for stmt in &block.body {
        match stmt {
            Statement::Attribute(attr) => match attr.key.as_str() {
                "name" => scope.name(&mut def.name, attr, ctx),
                "description" => scope.text(&mut def.description, attr, ctx),
                "subtype" => match subtype(attr, ctx) {
                    Some(sub) if def.subtypes.iter().any(|s| s.id == sub.id) => {
                        ctx.push(duplicate_id_error("subtype", &sub.id).with_span(attr.span.clone()));
                        scope.fail();
                    }
                    Some(sub) => def.subtypes.push(sub),
                    None => scope.fail(),
                },
                "status" => match status(attr, ctx) {
                    Some(st) if def.statuses.iter().any(|s| s.id == st.id) => {
                        ctx.push(duplicate_id_error("status", &st.id).with_span(attr.span.clone()));
                        scope.fail();
                    }
                    Some(st) => def.statuses.push(st),
                    None => scope.fail(),
                },
                "required_relationship" => {
                    match eval_string_list(&attr.value, ctx, "required_relationship", &attr.span) {
                        Some(kinds) => {
                            for kind in kinds {
                                if !def.required_relationships.contains(&kind) {
                                    def.required_relationships.push(kind);
                                }
                            }
                        }
                        None => scope.fail(),
                    }
                }
                _ => scope.reject(stmt, ENTITY_KIND_FIELDS, ctx),
            },
            Statement::Block(inner) if inner.name == "semantic_plane" => {
                let plane = compile_semantic_plane(inner, ctx);
                let ok = plane
                    .map(|p| set_once(&mut def.semantic_plane, p, "semantic_plane", ctx, &inner.span))
                    .unwrap_or(false);
                scope.check(ok);
            }
            Statement::Block(inner) if inner.name == "style" => {
                let style = block_to_json(inner, ctx);
                let ok = set_once(&mut def.style, style, "style", ctx, &inner.span);
                scope.check(ok);
            }
            other => scope.reject(other, ENTITY_KIND_FIELDS, ctx),
        }
    }
    scope.finish(CompiledItem::EntityKind(def))
}

/// `subtype <id> [name]`
fn subtype(attr: &Attribute, ctx: &mut EvalContext) -> Option<SubtypeDef> {
    let tokens = eval_tokens(&attr.value, ctx, "subtype", &attr.span)?;
    let parsed = (|| -> Result<SubtypeDef, TokenError> {
        let mut stream = TokenStream::new("subtype", &tokens);
        let id = stream.next_ident("a subtype id")?;
        let name = stream.peek().map(Token::text);
        if name.is_some() {
            stream.next_token("a name")?;
        }
        stream.expect_end()?;
        Ok(SubtypeDef { id, name })
    })();
    settle(parsed, ctx, &attr.span)
}

/// `status <id> [name] [terminal]`
fn status(attr: &Attribute, ctx: &mut EvalContext) -> Option<StatusDef> {
    let tokens = eval_tokens(&attr.value, ctx, "status", &attr.span)?;
    let parsed = (|| -> Result<StatusDef, TokenError> {
        let mut stream = TokenStream::new("status", &tokens);
        let id = stream.next_ident("a status id")?;
        let mut name = None;
        let mut is_terminal = false;
        if let Some(token) = stream.peek() {
            if token.as_str() != Some(TERMINAL) {
                name = Some(token.text());
                stream.next_token("a name")?;
            }
        }
        if stream.eat(TERMINAL) {
            is_terminal = true;
        }
        stream.expect_end()?;
        Ok(StatusDef { id, name, is_terminal })
    })();
    settle(parsed, ctx, &attr.span)
}

// ============================================================================
// relationship_kind
// ============================================================================

pub fn build_relationship_kind(block: &Block, ctx: &mut EvalContext) -> Option<CompiledItem> {
    let mut scope = BlockScope::new(block);
    let kind = scope.id(0, ctx)?;
    let mut def = RelationshipKindDef {
        kind,
        ..RelationshipKindDef::default()
    };
    let mut polarity = None;

    for stmt in &block.body {
        let Statement::Attribute(attr) = stmt else {
            scope.reject(stmt, RELATIONSHIP_KIND_FIELDS, ctx);
            continue;
        };
        match attr.key.as_str() {
            "name" => scope.name(&mut def.name, attr, ctx),
            "description" => scope.text(&mut def.description, attr, ctx),
            "src" | "dst" => match eval_set_valued(&attr.value, ctx, &attr.key, &attr.span) {
                Some(kinds) => {
                    let target = if attr.key == "src" {
                        &mut def.src_kinds
                    } else {
                        &mut def.dst_kinds
                    };
                    for kind in kinds {
                        if !target.contains(&kind) {
                            target.push(kind);
                        }
                    }
                }
                None => scope.fail(),
            },
            "polarity" => scope.text(&mut polarity, attr, ctx),
            "decay_rate" => scope.number(&mut def.decay_rate, attr, ctx),
            "cullable" => scope.boolean(&mut def.cullable, attr, ctx),
            "symmetric" => scope.boolean(&mut def.symmetric, attr, ctx),
            _ => scope.reject(stmt, RELATIONSHIP_KIND_FIELDS, ctx),
        }
    }

    if let Some(word) = polarity {
        match Polarity::parse(&word) {
            Some(p) => def.polarity = Some(p),
            None => {
                ctx.error(
                    DiagnosticCode::InvalidValue,
                    format!(
                        "invalid polarity '{}', expected one of: {}",
                        word,
                        Polarity::NAMES.join(", ")
                    ),
                    &block.span,
                );
                scope.fail();
            }
        }
    }
    if let Some(rate) = def.decay_rate {
        if !(0.0..=1.0).contains(&rate) {
            ctx.error(
                DiagnosticCode::InvalidValue,
                format!("decay_rate must be between 0 and 1, found {}", rate),
                &block.span,
            );
            scope.fail();
        }
    }
    scope.finish(CompiledItem::RelationshipKind(def))
}

// ============================================================================
// culture
// ============================================================================

pub fn build_culture(block: &Block, ctx: &mut EvalContext) -> Option<CompiledItem> {
    let mut scope = BlockScope::new(block);
    let id = scope.id(0, ctx)?;
    let mut def = CultureDef {
        id,
        name: block.label(1).map(str::to_string),
        ..CultureDef::default()
    };

    for stmt in &block.body {
        let Statement::Attribute(attr) = stmt else {
            scope.reject(stmt, CULTURE_FIELDS, ctx);
            continue;
        };
        match attr.key.as_str() {
            "name" => scope.name(&mut def.name, attr, ctx),
            "description" => scope.text(&mut def.description, attr, ctx),
            "color" => scope.text(&mut def.color, attr, ctx),
            "home_region" => match eval_string_list(&attr.value, ctx, "home_region", &attr.span) {
                Some(words) if words.len() >= 2 => {
                    let regions = def.home_regions.entry(words[0].clone()).or_default();
                    for region in &words[1..] {
                        if !regions.contains(region) {
                            regions.push(region.clone());
                        }
                    }
                }
                Some(_) => {
                    ctx.error(
                        DiagnosticCode::InvalidValue,
                        "expected 'home_region <kind> <region>...'",
                        &attr.span,
                    );
                    scope.fail();
                }
                None => scope.fail(),
            },
            "axis_bias" => {
                let threshold = ctx.options.suggestion_threshold;
                let parsed = eval_tokens(&attr.value, ctx, "axis_bias", &attr.span)
                    .and_then(|tokens| settle(parse_axis_bias(&tokens, threshold), ctx, &attr.span));
                match parsed {
                    Some((kind, _)) if def.axis_biases.contains_key(&kind) => {
                        ctx.error(
                            DiagnosticCode::DuplicateDeclaration,
                            format!("axis_bias for '{}' is given more than once", kind),
                            &attr.span,
                        );
                        scope.fail();
                    }
                    Some((kind, bias)) => {
                        def.axis_biases.insert(kind, bias);
                    }
                    None => scope.fail(),
                }
            }
            _ => scope.reject(stmt, CULTURE_FIELDS, ctx),
        }
    }
    scope.finish(CompiledItem::Culture(def))
}

/// `axis_bias <kind> x <n> y <n> [z <n>]`
fn parse_axis_bias(tokens: &[Token], threshold: f64) -> Result<(String, AxisBias), TokenError> {
    let mut stream = TokenStream::new("axis_bias", tokens).with_threshold(threshold);
    let kind = stream.next_ident("an entity kind")?;
    let opts = stream.keyed_options(&["x", "y", "z"])?;
    Ok((
        kind,
        AxisBias {
            x: opts.require_number("x")?,
            y: opts.require_number("y")?,
            z: opts.number("z")?,
        },
    ))
}

// ============================================================================
// tag
// ============================================================================

pub fn build_tag(block: &Block, ctx: &mut EvalContext) -> Option<CompiledItem> {
    let mut scope = BlockScope::new(block);
    let tag = scope.id(0, ctx)?;
    let mut def = TagDef {
        tag,
        ..TagDef::default()
    };
    let mut rarity = None;
    let mut entity_kinds = None;
    let mut conflicts = None;

    for stmt in &block.body {
        let Statement::Attribute(attr) = stmt else {
            scope.reject(stmt, TAG_FIELDS, ctx);
            continue;
        };
        match attr.key.as_str() {
            "category" => scope.text(&mut def.category, attr, ctx),
            "rarity" => scope.text(&mut rarity, attr, ctx),
            "description" => scope.text(&mut def.description, attr, ctx),
            "axis" => scope.text(&mut def.axis, attr, ctx),
            "entity_kinds" | "conflicts" => {
                let slot = if attr.key == "entity_kinds" {
                    &mut entity_kinds
                } else {
                    &mut conflicts
                };
                let ok = eval_set_valued(&attr.value, ctx, &attr.key, &attr.span)
                    .map(|items| set_once(slot, items, &attr.key, ctx, &attr.span))
                    .unwrap_or(false);
                scope.check(ok);
            }
            _ => scope.reject(stmt, TAG_FIELDS, ctx),
        }
    }

    if let Some(word) = rarity {
        match Rarity::parse(&word) {
            Some(r) => def.rarity = Some(r),
            None => {
                ctx.error(
                    DiagnosticCode::InvalidValue,
                    format!("invalid rarity '{}', expected one of: {}", word, Rarity::NAMES.join(", ")),
                    &block.span,
                );
                scope.fail();
            }
        }
    }
    def.entity_kinds = entity_kinds.unwrap_or_default();
    def.conflicts = conflicts.unwrap_or_default();
    if def.conflicts.contains(&def.tag) {
        ctx.error(
            DiagnosticCode::InvalidValue,
            format!("tag '{}' cannot conflict with itself", def.tag),
            &block.span,
        );
        scope.fail();
    }
    scope.finish(CompiledItem::Tag(def))
}

// ============================================================================
// axis
// ============================================================================

pub fn build_axis(block: &Block, ctx: &mut EvalContext) -> Option<CompiledItem> {
    let mut scope = BlockScope::new(block);
    let id = scope.id(0, ctx)?;
    let mut def = AxisDef {
        id,
        name: block.label(1).map(str::to_string),
        ..AxisDef::default()
    };
    for stmt in &block.body {
        let Statement::Attribute(attr) = stmt else {
            scope.reject(stmt, AXIS_FIELDS, ctx);
            continue;
        };
        match attr.key.as_str() {
            "name" => scope.name(&mut def.name, attr, ctx),
            "description" => scope.text(&mut def.description, attr, ctx),
            "low" => scope.text(&mut def.low_tag, attr, ctx),
            "high" => scope.text(&mut def.high_tag, attr, ctx),
            _ => scope.reject(stmt, AXIS_FIELDS, ctx),
        }
    }
    if let (Some(low), Some(high)) = (&def.low_tag, &def.high_tag) {
        if low == high {
            let message = format!("axis '{}' uses '{}' for both ends", def.id, low);
            ctx.error(DiagnosticCode::InvalidValue, message, &block.span);
            scope.fail();
        }
    }
    scope.finish(CompiledItem::Axis(def))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::builders::test_support::last_block;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn item_json(src: &str, build: fn(&Block, &mut EvalContext) -> Option<CompiledItem>) -> serde_json::Value {
        let (block, mut ctx) = last_block(src);
        let item = build(&block, &mut ctx);
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        match item.unwrap() {
            CompiledItem::EntityKind(d) => serde_json::to_value(d).unwrap(),
            CompiledItem::RelationshipKind(d) => serde_json::to_value(d).unwrap(),
            CompiledItem::Culture(d) => serde_json::to_value(d).unwrap(),
            CompiledItem::Tag(d) => serde_json::to_value(d).unwrap(),
            CompiledItem::Axis(d) => serde_json::to_value(d).unwrap(),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_entity_kind() {
        let json = item_json(
            "entity_kind npc {\n  name \"Person\"\n  subtype merchant \"Merchant\"\n  status alive\n  status dead \"Dead\" terminal\n  required_relationship member_of\n  style { color \"#fff\" }\n}",
            build_entity_kind,
        );
        assert_eq!(
            json,
            json!({
                "kind": "npc",
                "name": "Person",
                "subtypes": [{"id": "merchant", "name": "Merchant"}],
                "statuses": [
                    {"id": "alive", "isTerminal": false},
                    {"id": "dead", "name": "Dead", "isTerminal": true}
                ],
                "requiredRelationships": ["member_of"],
                "style": {"color": "#fff"}
            })
        );
    }

    #[test]
    fn test_relationship_kind_with_sets() {
        let json = item_json(
            "set people { npc hero }\nrelationship_kind ally_of {\n  src include people\n  dst [faction]\n  polarity positive\n  decay_rate 0.1\n  symmetric true\n}",
            build_relationship_kind,
        );
        assert_eq!(
            json,
            json!({
                "kind": "ally_of",
                "srcKinds": ["npc", "hero"],
                "dstKinds": ["faction"],
                "polarity": "positive",
                "decayRate": 0.1,
                "symmetric": true
            })
        );
    }

    #[test]
    fn test_culture() {
        let json = item_json(
            "culture north \"Northmen\" {\n  color \"#336\"\n  home_region location tundra coast\n  axis_bias npc x 10 y -5\n}",
            build_culture,
        );
        assert_eq!(
            json,
            json!({
                "id": "north",
                "name": "Northmen",
                "color": "#336",
                "homeRegions": {"location": ["tundra", "coast"]},
                "axisBiases": {"npc": {"x": 10, "y": -5}}
            })
        );
    }

    #[test]
    fn test_tag_rarity_and_conflicts() {
        let json = item_json(
            "tag brave {\n  category trait\n  rarity rare\n  entity_kinds npc\n  conflicts coward\n}",
            build_tag,
        );
        assert_eq!(
            json,
            json!({
                "tag": "brave",
                "category": "trait",
                "rarity": "rare",
                "entityKinds": ["npc"],
                "conflicts": ["coward"]
            })
        );

        let (block, mut ctx) = last_block("tag brave { rarity mythical }");
        assert!(build_tag(&block, &mut ctx).is_none());
        assert_eq!(ctx.diagnostics.iter().next().unwrap().code, DiagnosticCode::InvalidValue);
    }

    #[test]
    fn test_unknown_field_suggests() {
        let (block, mut ctx) = last_block("axis order { hihg chaos }");
        assert!(build_axis(&block, &mut ctx).is_none());
        let diag = ctx.diagnostics.iter().next().unwrap();
        assert_eq!(diag.code, DiagnosticCode::UnknownField);
        assert!(diag.message.contains("did you mean 'high'"));
    }
}
