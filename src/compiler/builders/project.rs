//! `project <id> [name] { ... }`

use std::collections::BTreeMap;

use super::BlockScope;
use crate::ast::{Block, Statement};
use crate::compiler::fields::{block_to_json, camel_case, evaluate_checked};
use crate::compiler::mapping::CompiledItem;
use crate::diagnostics::DiagnosticCode;
use crate::eval::EvalContext;
use crate::model::{ProjectRoot, RESERVED_ROOT_KEYS};

pub fn build_project(block: &Block, ctx: &mut EvalContext) -> Option<CompiledItem> {
    let mut scope = BlockScope::new(block);
    let id = scope.id(0, ctx)?;
    let mut name = block.label(1).map(str::to_string);
    let mut description = None;
    let mut version = None;
    let mut metadata = BTreeMap::new();

    for stmt in &block.body {
        let (key, value, span) = match stmt {
            Statement::Attribute(attr) => match attr.key.as_str() {
                "name" => {
                    scope.name(&mut name, attr, ctx);
                    continue;
                }
                "description" => {
                    scope.text(&mut description, attr, ctx);
                    continue;
                }
                "version" => {
                    scope.text(&mut version, attr, ctx);
                    continue;
                }
                _ => match evaluate_checked(&attr.value, ctx, &attr.span) {
                    Some(value) => (attr.key.as_str(), value, &attr.span),
                    None => {
                        scope.fail();
                        continue;
                    }
                },
            },
            Statement::Block(inner) => (inner.name.as_str(), block_to_json(inner, ctx), &inner.span),
            other => {
                scope.reject(other, &["name", "description", "version"], ctx);
                continue;
            }
        };
        let key = camel_case(key);
        if RESERVED_ROOT_KEYS.contains(&key.as_str()) {
            ctx.error(
                DiagnosticCode::InvalidValue,
                format!("project field '{}' collides with a configuration section", key),
                span,
            );
            scope.fail();
            continue;
        }
        if metadata.insert(key.clone(), value).is_some() {
            ctx.error(
                DiagnosticCode::DuplicateDeclaration,
                format!("project field '{}' is given more than once", key),
                span,
            );
            scope.fail();
        }
    }

    scope
        .finish(ProjectRoot {
            id,
            name,
            description,
            version,
            metadata,
        })
        .map(CompiledItem::Project)
}
