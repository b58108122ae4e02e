//! Mini-language compilers
//!
//! Each submodule turns flat token lists (or small statement bodies) into a
//! typed record. A construct that fails reports exactly one diagnostic and
//! yields nothing; its siblings keep compiling.

pub mod conditions;
pub mod contract;
pub mod factors;
pub mod mutations;
pub mod naming;
pub mod selection;
pub mod semantic_plane;

use serde::Serialize;

use crate::diagnostics::SourceSpan;
use crate::error::TokenError;
use crate::eval::EvalContext;

/// Relationship direction relative to the subject entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Src,
    Dst,
    Any,
}

impl Direction {
    pub const NAMES: &'static [&'static str] = &["src", "dst", "any"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "src" => Some(Direction::Src),
            "dst" => Some(Direction::Dst),
            "any" => Some(Direction::Any),
            _ => None,
        }
    }
}

/// Turn a micro-parser result into a value or one diagnostic
pub(crate) fn settle<T>(
    result: Result<T, TokenError>,
    ctx: &mut EvalContext,
    span: &SourceSpan,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            ctx.push(e.to_diagnostic(span));
            None
        }
    }
}

/// Parse an optional `direction` keyed value
pub(crate) fn direction_option(
    options: &crate::tokens::KeyedOptions,
) -> Result<Option<Direction>, TokenError> {
    Ok(options
        .choice("direction", Direction::NAMES)?
        .and_then(|d| Direction::parse(&d)))
}
