//! Block builders
//!
//! One builder per mapped block name. A builder walks its block body, reports
//! every problem it finds and returns `None` when any of them was an error.
//! Helpers here keep the per-field plumbing uniform across builders.

pub mod action;
pub mod era;
pub mod generator;
pub mod kinds;
pub mod pressure;
pub mod project;
pub mod seeds;
pub mod system;

use super::fields::{
    block_to_json, eval_bool, eval_number, eval_set_valued, eval_string, reconcile_field, set_once,
};
use super::mapping::{CompiledItem, Singleton};
use crate::ast::{Attribute, Block, Statement};
use crate::diagnostics::DiagnosticCode;
use crate::dsl::conditions::ProminenceLevel;
use crate::eval::EvalContext;

// ============================================================================
// Singletons
// ============================================================================

pub fn build_ui(block: &Block, ctx: &mut EvalContext) -> Option<CompiledItem> {
    build_free_form(block, ctx, Singleton::Ui)
}

pub fn build_illuminator(block: &Block, ctx: &mut EvalContext) -> Option<CompiledItem> {
    build_free_form(block, ctx, Singleton::Illuminator)
}

pub fn build_distribution(block: &Block, ctx: &mut EvalContext) -> Option<CompiledItem> {
    build_free_form(block, ctx, Singleton::Distribution)
}

fn build_free_form(block: &Block, ctx: &mut EvalContext, singleton: Singleton) -> Option<CompiledItem> {
    let before = ctx.diagnostics.error_count();
    let value = block_to_json(block, ctx);
    (ctx.diagnostics.error_count() == before).then_some(CompiledItem::Singleton(singleton, value))
}

// ============================================================================
// Field helpers
// ============================================================================

/// Tracks whether any field of the block failed
pub(crate) struct BlockScope<'b> {
    pub block: &'b Block,
    pub ok: bool,
}

impl<'b> BlockScope<'b> {
    pub fn new(block: &'b Block) -> Self {
        Self { block, ok: true }
    }

    pub fn check(&mut self, ok: bool) {
        self.ok &= ok;
    }

    pub fn fail(&mut self) {
        self.ok = false;
    }

    /// Run a compiler that only reports through the context; any new error
    /// fails the block.
    pub fn guard<T>(&mut self, ctx: &mut EvalContext, f: impl FnOnce(&mut EvalContext) -> T) -> T {
        let before = ctx.diagnostics.error_count();
        let out = f(ctx);
        self.ok &= ctx.diagnostics.error_count() == before;
        out
    }

    /// Id label (position `index`)
    pub fn id(&mut self, index: usize, ctx: &mut EvalContext) -> Option<String> {
        let id = super::fields::labeled(self.block, index, "id", ctx);
        if id.is_none() {
            self.ok = false;
        }
        id
    }

    pub fn text(&mut self, slot: &mut Option<String>, attr: &Attribute, ctx: &mut EvalContext) {
        let ok = eval_string(&attr.value, ctx, &attr.key, &attr.span)
            .map(|v| set_once(slot, v, &attr.key, ctx, &attr.span))
            .unwrap_or(false);
        self.ok &= ok;
    }

    pub fn number(&mut self, slot: &mut Option<f64>, attr: &Attribute, ctx: &mut EvalContext) {
        let ok = eval_number(&attr.value, ctx, &attr.key, &attr.span)
            .map(|v| set_once(slot, v, &attr.key, ctx, &attr.span))
            .unwrap_or(false);
        self.ok &= ok;
    }

    pub fn boolean(&mut self, slot: &mut Option<bool>, attr: &Attribute, ctx: &mut EvalContext) {
        let ok = eval_bool(&attr.value, ctx, &attr.key, &attr.span)
            .map(|v| set_once(slot, v, &attr.key, ctx, &attr.span))
            .unwrap_or(false);
        self.ok &= ok;
    }

    pub fn prominence(&mut self, slot: &mut Option<ProminenceLevel>, attr: &Attribute, ctx: &mut EvalContext) {
        let Some(word) = eval_string(&attr.value, ctx, &attr.key, &attr.span) else {
            self.ok = false;
            return;
        };
        let Some(level) = ProminenceLevel::parse(&word) else {
            ctx.error(
                DiagnosticCode::InvalidValue,
                format!(
                    "invalid prominence '{}', expected one of: {}",
                    word,
                    ProminenceLevel::NAMES.join(", ")
                ),
                &attr.span,
            );
            self.ok = false;
            return;
        };
        self.ok &= set_once(slot, level, &attr.key, ctx, &attr.span);
    }

    /// Set-valued word list stored once
    pub fn words(&mut self, slot: &mut Option<Vec<String>>, attr: &Attribute, ctx: &mut EvalContext) {
        let ok = eval_set_valued(&attr.value, ctx, &attr.key, &attr.span)
            .map(|v| set_once(slot, v, &attr.key, ctx, &attr.span))
            .unwrap_or(false);
        self.ok &= ok;
    }

    /// `name` given in the body must match the name label, if any
    pub fn name(&mut self, slot: &mut Option<String>, attr: &Attribute, ctx: &mut EvalContext) {
        let Some(candidate) = eval_string(&attr.value, ctx, "name", &attr.span) else {
            self.ok = false;
            return;
        };
        match reconcile_field("name", slot.take(), Some(candidate)) {
            Ok(name) => *slot = name,
            Err(message) => {
                ctx.error(DiagnosticCode::FieldMismatch, message, &attr.span);
                self.ok = false;
            }
        }
    }

    /// Report a statement the block does not accept
    pub fn reject(&mut self, stmt: &Statement, known: &[&str], ctx: &mut EvalContext) {
        self.ok = false;
        match stmt {
            Statement::Attribute(attr) => ctx.unknown_field(&self.block.name, &attr.key, known, &attr.span),
            Statement::Block(inner) => ctx.unknown_field(&self.block.name, &inner.name, known, &inner.span),
            Statement::Bare(bare) => match bare.value.as_identifier() {
                Some(word) => ctx.unknown_field(&self.block.name, word, known, &bare.span),
                None => ctx.error(
                    DiagnosticCode::InvalidStatement,
                    format!("bare value is not allowed in {}", self.block.name),
                    &bare.span,
                ),
            },
            other => ctx.error(
                DiagnosticCode::InvalidStatement,
                format!("{} statement is not allowed in {}", other.kind_name(), self.block.name),
                other.span(),
            ),
        }
    }

    /// Final result: the item when every field compiled
    pub fn finish<T>(self, item: T) -> Option<T> {
        self.ok.then_some(item)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::ast::Block;
    use crate::config::CompilerOptions;
    use crate::diagnostics::Diagnostics;
    use crate::eval::{EvalContext, VariableTable};
    use crate::parser::parse_source;
    use crate::registry::ResourceRegistry;
    use crate::sets::SetTable;

    /// Parse `src`, register its blocks and return the last block with a
    /// context that knows about every block and set declared before it.
    pub fn last_block(src: &str) -> (Block, EvalContext) {
        let mut diagnostics = Diagnostics::new();
        let stmts = parse_source(src, "b.wd").unwrap();
        let (variables, rest) = VariableTable::extract(stmts, &mut diagnostics);
        let blocks: Vec<Block> = rest.into_iter().filter_map(|s| s.as_block().cloned()).collect();
        let (sets, blocks) = SetTable::extract(blocks, 0.8, &mut diagnostics);
        let registry = ResourceRegistry::build(blocks.iter());
        let block = blocks.last().cloned().unwrap();
        let ctx = EvalContext::new(CompilerOptions::default(), variables, registry, sets, diagnostics);
        (block, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::last_block;
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_ui_singleton() {
        let (block, mut ctx) = last_block("ui {\n  theme dark\n  panels [map timeline]\n}");
        let item = build_ui(&block, &mut ctx).unwrap();
        assert_eq!(
            item,
            CompiledItem::Singleton(Singleton::Ui, json!({"theme": "dark", "panels": ["map", "timeline"]}))
        );
    }

    #[test]
    fn test_name_label_must_agree() {
        let (block, mut ctx) = last_block("culture north \"North\" { name \"Northmen\" }");
        assert!(kinds::build_culture(&block, &mut ctx).is_none());
        assert_eq!(ctx.diagnostics.iter().next().unwrap().code, DiagnosticCode::FieldMismatch);
    }
}
