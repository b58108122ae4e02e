//! Seed entities and seed relationships

use super::BlockScope;
use crate::ast::{Block, Statement};
use crate::compiler::fields::labeled;
use crate::compiler::mapping::CompiledItem;
use crate::diagnostics::DiagnosticCode;
use crate::eval::EvalContext;
use crate::model::{Coordinates, SeedEntity, SeedRelationship};

const SEED_ENTITY_FIELDS: &[&str] = &[
    "name",
    "kind",
    "subtype",
    "status",
    "prominence",
    "culture",
    "tags",
    "description",
    "coordinates",
];
const COORDINATE_FIELDS: &[&str] = &["x", "y", "z"];

pub fn build_seed_entity(block: &Block, ctx: &mut EvalContext) -> Option<CompiledItem> {
    let mut scope = BlockScope::new(block);
    let id = scope.id(0, ctx)?;
    let mut entity = SeedEntity {
        id,
        name: block.label(1).map(str::to_string),
        ..SeedEntity::default()
    };
    let mut kind = None;
    let mut tags = None;

    for stmt in &block.body {
        match stmt {
            Statement::Attribute(attr) => match attr.key.as_str() {
                "name" => scope.name(&mut entity.name, attr, ctx),
                "kind" => scope.text(&mut kind, attr, ctx),
                "subtype" => scope.text(&mut entity.subtype, attr, ctx),
                "status" => scope.text(&mut entity.status, attr, ctx),
                "prominence" => scope.prominence(&mut entity.prominence, attr, ctx),
                "culture" => scope.text(&mut entity.culture, attr, ctx),
                "tags" => scope.words(&mut tags, attr, ctx),
                "description" => scope.text(&mut entity.description, attr, ctx),
                _ => scope.reject(stmt, SEED_ENTITY_FIELDS, ctx),
            },
            Statement::Block(inner) if inner.name == "coordinates" => {
                if entity.coordinates.is_some() {
                    ctx.error(
                        DiagnosticCode::DuplicateDeclaration,
                        "'coordinates' is given more than once",
                        &inner.span,
                    );
                    scope.fail();
                    continue;
                }
                entity.coordinates = coordinates(inner, ctx);
                scope.check(entity.coordinates.is_some());
            }
            other => scope.reject(other, SEED_ENTITY_FIELDS, ctx),
        }
    }

    match kind {
        Some(kind) => entity.kind = kind,
        None if scope.ok => {
            ctx.error(
                DiagnosticCode::MissingField,
                format!("seed_entity {} is missing 'kind'", entity.id),
                &block.span,
            );
            scope.fail();
        }
        None => {}
    }
    entity.tags = tags.unwrap_or_default();
    scope.finish(CompiledItem::SeedEntity(entity))
}

/// `coordinates { x n; y n; z n }`, `z` optional
fn coordinates(block: &Block, ctx: &mut EvalContext) -> Option<Coordinates> {
    let mut scope = BlockScope::new(block);
    let (mut x, mut y, mut z) = (None, None, None);
    for stmt in &block.body {
        let Statement::Attribute(attr) = stmt else {
            scope.reject(stmt, COORDINATE_FIELDS, ctx);
            continue;
        };
        match attr.key.as_str() {
            "x" => scope.number(&mut x, attr, ctx),
            "y" => scope.number(&mut y, attr, ctx),
            "z" => scope.number(&mut z, attr, ctx),
            _ => scope.reject(stmt, COORDINATE_FIELDS, ctx),
        }
    }
    if !scope.ok {
        return None;
    }
    match (x, y) {
        (Some(x), Some(y)) => Some(Coordinates { x, y, z }),
        _ => {
            ctx.error(
                DiagnosticCode::MissingField,
                "coordinates need both 'x' and 'y'",
                &block.span,
            );
            None
        }
    }
}

pub fn build_seed_relationship(block: &Block, ctx: &mut EvalContext) -> Option<CompiledItem> {
    let mut scope = BlockScope::new(block);
    let kind = labeled(block, 0, "kind", ctx);
    let src = labeled(block, 1, "src", ctx);
    let dst = labeled(block, 2, "dst", ctx);
    let (Some(kind), Some(src), Some(dst)) = (kind, src, dst) else {
        return None;
    };
    let mut strength = None;
    for stmt in &block.body {
        match stmt {
            Statement::Attribute(attr) if attr.key == "strength" => scope.number(&mut strength, attr, ctx),
            other => scope.reject(other, &["strength"], ctx),
        }
    }
    if let Some(s) = strength {
        if !(0.0..=1.0).contains(&s) {
            ctx.error(
                DiagnosticCode::InvalidValue,
                format!("strength must be between 0 and 1, found {}", s),
                &block.span,
            );
            scope.fail();
        }
    }
    scope.finish(CompiledItem::SeedRelationship(SeedRelationship {
        kind,
        src,
        dst,
        strength,
    }))
}
