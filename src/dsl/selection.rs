//! Entity selection
//!
//! ```text
//! selection {
//!     kind npc
//!     status alive include active_statuses
//!     from actor via member_of direction src
//!     pick weighted
//!     max 3
//!     filter has_tag brave
//!     filter exclude actor partner
//!     saturation ally_of max 5
//!     prominence >= recognized
//! }
//! ```
//!
//! The same body is accepted by `let <alias> { ... }` and by action
//! `actor`/`target` blocks.

use serde::Serialize;

use super::conditions::ProminenceLevel;
use super::{direction_option, settle, Direction};
use crate::ast::{Attribute, FromClause, Predicate, Statement};
use crate::binding_context::{BindReferences, BindingContext, EntityRef};
use crate::compiler::fields::{eval_number, eval_set_valued, eval_string};
use crate::diagnostics::DiagnosticCode;
use crate::error::{BindError, TokenError};
use crate::eval::{evaluate, EvalContext};
use crate::tokens::{attribute_tokens, flatten, whole_u32, CompareOp, Token, TokenStream};

pub const SELECTION_FIELDS: &[&str] = &[
    "kind",
    "subtype",
    "status",
    "from",
    "pick",
    "max",
    "filter",
    "saturation",
    "prominence",
];

pub const FILTER_TYPES: &[&str] = &[
    "has_tag",
    "lacks_tag",
    "has_relationship",
    "lacks_relationship",
    "exclude",
    "matches_culture",
    "prominence",
    "status",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    ByKind,
    ByRelationship,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PickStrategy {
    #[default]
    Random,
    First,
    Weighted,
    All,
}

impl PickStrategy {
    pub const NAMES: &'static [&'static str] = &["random", "first", "weighted", "all"];

    fn parse(value: &str) -> Option<Self> {
        match value {
            "random" => Some(PickStrategy::Random),
            "first" => Some(PickStrategy::First),
            "weighted" => Some(PickStrategy::Weighted),
            "all" => Some(PickStrategy::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSource {
    pub related_to: EntityRef,
    pub relationship_kind: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaturationLimit {
    pub relationship_kind: String,
    pub max_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionFilter {
    HasTag {
        tag: String,
    },
    LacksTag {
        tag: String,
    },
    HasRelationship {
        kind: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        with: Option<EntityRef>,
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<Direction>,
    },
    LacksRelationship {
        kind: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        with: Option<EntityRef>,
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<Direction>,
    },
    Exclude {
        entities: Vec<EntityRef>,
    },
    MatchesCulture {
        with: EntityRef,
    },
    Prominence {
        operator: CompareOp,
        level: ProminenceLevel,
    },
    Status {
        statuses: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub strategy: SelectionStrategy,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subtypes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<SelectionSource>,
    pub pick_strategy: PickStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<SelectionFilter>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub saturation_limits: Vec<SaturationLimit>,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::ByKind,
            kinds: Vec::new(),
            subtypes: Vec::new(),
            statuses: Vec::new(),
            from: None,
            pick_strategy: PickStrategy::Random,
            max_results: None,
            filters: Vec::new(),
            saturation_limits: Vec::new(),
        }
    }
}

impl BindReferences for SelectionFilter {
    fn bind_references(&mut self, ctx: &BindingContext, errors: &mut Vec<BindError>) {
        match self {
            SelectionFilter::HasRelationship { with, .. }
            | SelectionFilter::LacksRelationship { with, .. } => with.bind_references(ctx, errors),
            SelectionFilter::Exclude { entities } => entities.bind_references(ctx, errors),
            SelectionFilter::MatchesCulture { with } => with.bind_references(ctx, errors),
            SelectionFilter::HasTag { .. }
            | SelectionFilter::LacksTag { .. }
            | SelectionFilter::Prominence { .. }
            | SelectionFilter::Status { .. } => {}
        }
    }
}

impl BindReferences for Selection {
    fn bind_references(&mut self, ctx: &BindingContext, errors: &mut Vec<BindError>) {
        if let Some(source) = &mut self.from {
            source.related_to.bind_references(ctx, errors);
        }
        self.filters.bind_references(ctx, errors);
    }
}

// ============================================================================
// Filter grammar
// ============================================================================

pub fn parse_filter(tokens: &[Token], threshold: f64) -> Result<SelectionFilter, TokenError> {
    let mut stream = TokenStream::new("filter", tokens).with_threshold(threshold);
    let filter_type = stream.next_ident("a filter type")?;
    if !FILTER_TYPES.contains(&filter_type.as_str()) {
        return Err(stream.unknown_type(filter_type, FILTER_TYPES));
    }
    stream.set_construct(format!("filter {}", filter_type));

    let filter = match filter_type.as_str() {
        "has_tag" => SelectionFilter::HasTag {
            tag: stream.next_ident("a tag")?,
        },
        "lacks_tag" => SelectionFilter::LacksTag {
            tag: stream.next_ident("a tag")?,
        },
        "has_relationship" | "lacks_relationship" => {
            let kind = stream.next_ident("a relationship kind")?;
            let opts = stream.keyed_options(&["with", "direction"])?;
            let with = opts.string("with").map(EntityRef);
            let direction = direction_option(&opts)?;
            if filter_type == "has_relationship" {
                SelectionFilter::HasRelationship {
                    kind,
                    with,
                    direction,
                }
            } else {
                SelectionFilter::LacksRelationship {
                    kind,
                    with,
                    direction,
                }
            }
        }
        "exclude" => {
            let entities: Vec<EntityRef> = stream.prefix_list(&[]).into_iter().map(EntityRef).collect();
            if entities.is_empty() {
                return Err(stream.invalid("expected at least one entity reference"));
            }
            SelectionFilter::Exclude { entities }
        }
        "matches_culture" => SelectionFilter::MatchesCulture {
            with: EntityRef(stream.next_ident("an entity reference")?),
        },
        "prominence" => {
            let operator = stream.compare_op()?;
            let level = stream.next_choice("level", ProminenceLevel::NAMES)?;
            let level = ProminenceLevel::parse(&level)
                .ok_or_else(|| stream.invalid(format!("unknown prominence level '{}'", level)))?;
            SelectionFilter::Prominence { operator, level }
        }
        _ => {
            let statuses = stream.prefix_list(&[]);
            if statuses.is_empty() {
                return Err(stream.invalid("expected at least one status"));
            }
            SelectionFilter::Status { statuses }
        }
    };
    stream.expect_end()?;
    Ok(filter)
}

fn parse_saturation(tokens: &[Token], threshold: f64) -> Result<SaturationLimit, TokenError> {
    let mut stream = TokenStream::new("saturation", tokens).with_threshold(threshold);
    let relationship_kind = stream.next_ident("a relationship kind")?;
    let opts = stream.keyed_options(&["max", "direction"])?;
    let max = opts.require_number("max")?;
    let Some(max_count) = whole_u32(max) else {
        return Err(stream.invalid(format!("max {} is not a whole number in range", max)));
    };
    Ok(SaturationLimit {
        relationship_kind,
        max_count,
        direction: direction_option(&opts)?,
    })
}

// ============================================================================
// Selection bodies
// ============================================================================

/// Compile a selection body. Reports every problem and returns `None` when
/// any statement failed.
pub fn compile_selection(
    body: &[Statement],
    construct: &str,
    ctx: &mut EvalContext,
    binding: &BindingContext,
) -> Option<Selection> {
    let mut selection = Selection::default();
    let mut ok = true;
    for stmt in body {
        ok &= match stmt {
            Statement::Attribute(attr) => selection_attribute(&mut selection, attr, construct, ctx),
            Statement::From(from) => selection_source(&mut selection, from, ctx),
            Statement::Predicate(pred) if pred.subject == "prominence" => {
                prominence_predicate(&mut selection, pred, ctx)
            }
            Statement::Block(block) => {
                ctx.unknown_field(construct, &block.name, SELECTION_FIELDS, &block.span);
                false
            }
            other => {
                ctx.error(
                    DiagnosticCode::InvalidStatement,
                    format!("{} statement is not allowed in {}", other.kind_name(), construct),
                    other.span(),
                );
                false
            }
        };
    }
    if !ok {
        return None;
    }
    binding.bind_record(selection, ctx, &binding.span)
}

fn selection_attribute(
    selection: &mut Selection,
    attr: &Attribute,
    construct: &str,
    ctx: &mut EvalContext,
) -> bool {
    let span = &attr.span;
    let threshold = ctx.options.suggestion_threshold;
    match attr.key.as_str() {
        "kind" | "subtype" | "status" => {
            let Some(items) = eval_set_valued(&attr.value, ctx, &attr.key, span) else {
                return false;
            };
            let target = match attr.key.as_str() {
                "kind" => &mut selection.kinds,
                "subtype" => &mut selection.subtypes,
                _ => &mut selection.statuses,
            };
            for item in items {
                if !target.contains(&item) {
                    target.push(item);
                }
            }
            true
        }
        "pick" => {
            let Some(word) = eval_string(&attr.value, ctx, "pick", span) else {
                return false;
            };
            match PickStrategy::parse(&word) {
                Some(pick) => {
                    selection.pick_strategy = pick;
                    true
                }
                None => {
                    ctx.error(
                        DiagnosticCode::InvalidValue,
                        format!(
                            "invalid pick strategy '{}', expected one of: {}",
                            word,
                            PickStrategy::NAMES.join(", ")
                        ),
                        span,
                    );
                    false
                }
            }
        }
        "max" => {
            let Some(n) = eval_number(&attr.value, ctx, "max", span) else {
                return false;
            };
            let Some(max) = whole_u32(n).filter(|m| *m >= 1) else {
                ctx.error(
                    DiagnosticCode::InvalidValue,
                    format!("max must be a positive whole number, found {}", n),
                    span,
                );
                return false;
            };
            selection.max_results = Some(max);
            true
        }
        "filter" => {
            let value = evaluate(&attr.value, ctx, span);
            let Some(tokens) = settle(flatten(&value, "filter"), ctx, span) else {
                return false;
            };
            match settle(parse_filter(&tokens, threshold), ctx, span) {
                Some(filter) => {
                    selection.filters.push(filter);
                    true
                }
                None => false,
            }
        }
        "prominence" => {
            let Some(tokens) = settle(attribute_tokens("prominence", &attr.value, ctx, span), ctx, span)
            else {
                return false;
            };
            match settle(parse_filter(&tokens, threshold), ctx, span) {
                Some(filter) => {
                    selection.filters.push(filter);
                    true
                }
                None => false,
            }
        }
        "saturation" => {
            let value = evaluate(&attr.value, ctx, span);
            let Some(tokens) = settle(flatten(&value, "saturation"), ctx, span) else {
                return false;
            };
            match settle(parse_saturation(&tokens, threshold), ctx, span) {
                Some(limit) => {
                    selection.saturation_limits.push(limit);
                    true
                }
                None => false,
            }
        }
        other => {
            ctx.unknown_field(construct, other, SELECTION_FIELDS, span);
            false
        }
    }
}

/// `from <ref> via <relationship> [direction src|dst|any]`
fn selection_source(selection: &mut Selection, from: &FromClause, ctx: &mut EvalContext) -> bool {
    let span = &from.span;
    if selection.from.is_some() {
        ctx.error(
            DiagnosticCode::DuplicateDeclaration,
            "a selection has at most one 'from' source",
            span,
        );
        return false;
    }
    let mut via = None;
    let mut direction = Direction::Any;
    for (key, value) in &from.options {
        match key.as_str() {
            "via" => via = eval_string(value, ctx, "via", span),
            "direction" => {
                let Some(word) = eval_string(value, ctx, "direction", span) else {
                    return false;
                };
                match Direction::parse(&word) {
                    Some(d) => direction = d,
                    None => {
                        ctx.error(
                            DiagnosticCode::InvalidValue,
                            format!("invalid direction '{}', expected src, dst or any", word),
                            span,
                        );
                        return false;
                    }
                }
            }
            other => {
                ctx.unknown_field("from", other, &["via", "direction"], span);
                return false;
            }
        }
    }
    let Some(relationship_kind) = via else {
        ctx.error(
            DiagnosticCode::MissingField,
            "expected 'from <entity> via <relationship>'",
            span,
        );
        return false;
    };
    selection.strategy = SelectionStrategy::ByRelationship;
    selection.from = Some(SelectionSource {
        related_to: EntityRef::new(from.source.clone()),
        relationship_kind,
        direction,
    });
    true
}

fn prominence_predicate(selection: &mut Selection, pred: &Predicate, ctx: &mut EvalContext) -> bool {
    let span = &pred.span;
    let Some(operator) = CompareOp::parse(&pred.operator) else {
        ctx.error(
            DiagnosticCode::InvalidValue,
            format!("operator '{}' cannot compare prominence", pred.operator),
            span,
        );
        return false;
    };
    let Some(word) = eval_string(&pred.value, ctx, "prominence", span) else {
        return false;
    };
    let Some(level) = ProminenceLevel::parse(&word) else {
        ctx.error(
            DiagnosticCode::InvalidValue,
            format!(
                "invalid prominence level '{}', expected one of: {}",
                word,
                ProminenceLevel::NAMES.join(", ")
            ),
            span,
        );
        return false;
    };
    selection
        .filters
        .push(SelectionFilter::Prominence { operator, level });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding_context::ContextKind;
    use crate::config::CompilerOptions;
    use crate::diagnostics::SourceSpan;
    use crate::parser::parse_source;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn compile(src: &str) -> (Option<Selection>, EvalContext) {
        let stmts = parse_source(src, "s.wd").unwrap();
        let mut ctx = EvalContext::empty(CompilerOptions::default());
        let binding = BindingContext::new(ContextKind::Generator, SourceSpan::file_start("s.wd"));
        let selection = compile_selection(&stmts, "selection", &mut ctx, &binding);
        (selection, ctx)
    }

    #[test]
    fn test_full_selection() {
        let (selection, ctx) = compile(
            "kind npc\nstatus alive\nfrom actor via member_of direction src\npick weighted\nmax 3\nfilter has_tag brave\nfilter exclude actor partner\nsaturation ally_of max 5\nprominence >= recognized",
        );
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        assert_eq!(
            serde_json::to_value(selection.unwrap()).unwrap(),
            json!({
                "strategy": "by_relationship",
                "kinds": ["npc"],
                "statuses": ["alive"],
                "from": {"relatedTo": "$actor", "relationshipKind": "member_of", "direction": "src"},
                "pickStrategy": "weighted",
                "maxResults": 3,
                "filters": [
                    {"type": "has_tag", "tag": "brave"},
                    {"type": "exclude", "entities": ["$actor", "$partner"]},
                    {"type": "prominence", "operator": "gte", "level": "recognized"}
                ],
                "saturationLimits": [{"relationshipKind": "ally_of", "maxCount": 5}]
            })
        );
    }

    #[test]
    fn test_defaults() {
        let (selection, _) = compile("kind [npc faction]");
        assert_eq!(
            serde_json::to_value(selection.unwrap()).unwrap(),
            json!({"strategy": "by_kind", "kinds": ["npc", "faction"], "pickStrategy": "random"})
        );
    }

    #[test]
    fn test_unknown_field_suggestion() {
        let (selection, ctx) = compile("knd npc");
        assert!(selection.is_none());
        let diag = ctx.diagnostics.iter().next().unwrap();
        assert_eq!(diag.code, DiagnosticCode::UnknownField);
        assert!(diag.message.contains("did you mean 'kind'"));
    }

    #[test]
    fn test_invalid_values() {
        let (selection, ctx) = compile("pick sometimes\nmax 0\nfrom actor direction src");
        assert!(selection.is_none());
        assert_eq!(ctx.diagnostics.error_count(), 3);
    }

    #[test]
    fn test_counts_out_of_range() {
        let (selection, ctx) = compile("saturation ally_of max 5000000000\nmax 5000000000");
        assert!(selection.is_none());
        assert_eq!(ctx.diagnostics.error_count(), 2);
        assert!(ctx
            .diagnostics
            .iter()
            .all(|d| d.code == DiagnosticCode::InvalidValue));
    }

    #[test]
    fn test_unbound_filter_reference() {
        let (selection, ctx) = compile("filter matches_culture stranger");
        assert!(selection.is_none());
        assert_eq!(
            ctx.diagnostics.iter().next().unwrap().code,
            DiagnosticCode::UnboundReference
        );
    }
}
