//! Naming resources
//!
//! Four top-level block kinds describe how a culture names things. They are
//! compiled before any other block and attached to their culture afterwards:
//!
//! ```text
//! naming_domain elven_sounds {
//!     culture sylvan.id
//!     consonants [l r th n]
//!     vowels [a e i]
//!     length 2 4
//! }
//! grammar elven_place {
//!     culture sylvan.id
//!     start place
//!     rule place root suffix | root
//!     rule root elven_roots.id
//!     rule suffix "wen"
//! }
//! lexeme_list elven_roots { culture sylvan.id; entries [gal lor mir] }
//! naming_profile elven_default {
//!     culture sylvan.id
//!     default
//!     strategy grammar elven_place.id weight 3
//!     strategy domain elven_sounds.id
//! }
//! ```

use serde::Serialize;
use std::collections::BTreeMap;

use super::settle;
use crate::ast::{Block, Statement};
use crate::compiler::fields::{eval_bool, eval_string, eval_string_list, eval_tokens, set_once};
use crate::diagnostics::{duplicate_id_error, DiagnosticCode, SourceSpan};
use crate::error::TokenError;
use crate::eval::EvalContext;
use crate::model::num;
use crate::registry::ResourceKind;
use crate::tokens::{whole_u32, Token, TokenStream};

/// Block names compiled by this module
pub const NAMING_BLOCKS: &[&str] = &["naming_domain", "grammar", "lexeme_list", "naming_profile"];

const DOMAIN_FIELDS: &[&str] = &["culture", "consonants", "vowels", "syllables", "length"];
const GRAMMAR_FIELDS: &[&str] = &["culture", "start", "rule"];
const LEXEME_FIELDS: &[&str] = &["culture", "entries", "description"];
const PROFILE_FIELDS: &[&str] = &["culture", "default", "strategy"];

const ALTERNATIVE_SEPARATOR: &str = "|";

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LengthRange {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamingDomain {
    pub id: String,
    pub culture_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub consonants: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vowels: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub syllables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<LengthRange>,
}

/// One symbol of a grammar production
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GrammarToken {
    Rule(String),
    LexemeList(String),
    Domain(String),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grammar {
    pub id: String,
    pub culture_id: String,
    pub start: String,
    /// Symbol -> alternatives, each a token sequence
    pub rules: BTreeMap<String, Vec<Vec<GrammarToken>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LexemeList {
    pub id: String,
    pub culture_id: String,
    pub entries: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Grammar,
    Domain,
    Lexeme,
}

impl StrategyKind {
    pub const NAMES: &'static [&'static str] = &["grammar", "domain", "lexeme"];

    fn parse(value: &str) -> Option<Self> {
        match value {
            "grammar" => Some(StrategyKind::Grammar),
            "domain" => Some(StrategyKind::Domain),
            "lexeme" => Some(StrategyKind::Lexeme),
            _ => None,
        }
    }

    fn resource_kind(self) -> ResourceKind {
        match self {
            StrategyKind::Grammar => ResourceKind::Grammar,
            StrategyKind::Domain => ResourceKind::NamingDomain,
            StrategyKind::Lexeme => ResourceKind::LexemeList,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamingStrategy {
    pub kind: StrategyKind,
    pub reference: String,
    #[serde(serialize_with = "num")]
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamingProfile {
    pub id: String,
    pub culture_id: String,
    pub is_default: bool,
    pub strategies: Vec<NamingStrategy>,
}

/// Everything attached to one culture
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CultureNaming {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<NamingDomain>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub grammars: Vec<Grammar>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lexeme_lists: Vec<LexemeList>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<NamingProfile>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NamingResource {
    Domain(NamingDomain),
    Grammar(Grammar),
    LexemeList(LexemeList),
    Profile(NamingProfile),
}

impl NamingResource {
    pub fn id(&self) -> &str {
        match self {
            NamingResource::Domain(d) => &d.id,
            NamingResource::Grammar(g) => &g.id,
            NamingResource::LexemeList(l) => &l.id,
            NamingResource::Profile(p) => &p.id,
        }
    }

    pub fn culture_id(&self) -> &str {
        match self {
            NamingResource::Domain(d) => &d.culture_id,
            NamingResource::Grammar(g) => &g.culture_id,
            NamingResource::LexemeList(l) => &l.culture_id,
            NamingResource::Profile(p) => &p.culture_id,
        }
    }

    pub fn block_name(&self) -> &'static str {
        match self {
            NamingResource::Domain(_) => "naming_domain",
            NamingResource::Grammar(_) => "grammar",
            NamingResource::LexemeList(_) => "lexeme_list",
            NamingResource::Profile(_) => "naming_profile",
        }
    }
}

impl CultureNaming {
    pub fn push(&mut self, resource: NamingResource) {
        match resource {
            NamingResource::Domain(d) => self.domains.push(d),
            NamingResource::Grammar(g) => self.grammars.push(g),
            NamingResource::LexemeList(l) => self.lexeme_lists.push(l),
            NamingResource::Profile(p) => self.profiles.push(p),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamingEntry {
    pub resource: NamingResource,
    pub span: SourceSpan,
}

/// Compiled naming resources awaiting their cultures
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamingResources {
    pub entries: Vec<NamingEntry>,
}

impl NamingResources {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Compile every naming block out of `blocks`, returning the rest untouched.
pub fn extract_naming_resources(
    blocks: Vec<Block>,
    ctx: &mut EvalContext,
) -> (NamingResources, Vec<Block>) {
    let mut resources = NamingResources::default();
    let mut rest = Vec::with_capacity(blocks.len());
    for block in blocks {
        if !NAMING_BLOCKS.contains(&block.name.as_str()) {
            rest.push(block);
            continue;
        }
        let Some(resource) = compile_naming_block(&block, ctx) else {
            continue;
        };
        let duplicate = resources.entries.iter().any(|e| {
            e.resource.block_name() == resource.block_name() && e.resource.id() == resource.id()
        });
        if duplicate {
            ctx.push(duplicate_id_error(resource.block_name(), resource.id()).with_span(block.span.clone()));
            continue;
        }
        resources.entries.push(NamingEntry {
            resource,
            span: block.span.clone(),
        });
    }
    (resources, rest)
}

fn compile_naming_block(block: &Block, ctx: &mut EvalContext) -> Option<NamingResource> {
    let Some(id) = block.label(0).map(str::to_string) else {
        ctx.error(
            DiagnosticCode::MissingField,
            format!("{} block needs an id label", block.name),
            &block.span,
        );
        return None;
    };
    match block.name.as_str() {
        "naming_domain" => compile_domain(id, block, ctx).map(NamingResource::Domain),
        "grammar" => compile_grammar(id, block, ctx).map(NamingResource::Grammar),
        "lexeme_list" => compile_lexeme_list(id, block, ctx).map(NamingResource::LexemeList),
        _ => compile_profile(id, block, ctx).map(NamingResource::Profile),
    }
}

/// `culture <c>.id`, resolved to the culture's id
fn culture_reference(value: &crate::ast::Value, ctx: &mut EvalContext, span: &SourceSpan) -> Option<String> {
    let reference = eval_string(value, ctx, "culture", span)?;
    ctx.resolve_resource(&reference, &[ResourceKind::Culture], span)
}

fn require<T>(slot: Option<T>, field: &str, block: &Block, ctx: &mut EvalContext) -> Option<T> {
    if slot.is_none() {
        ctx.error(
            DiagnosticCode::MissingField,
            format!("{} '{}' is missing '{}'", block.name, block.label(0).unwrap_or_default(), field),
            &block.span,
        );
    }
    slot
}

fn reject_statement(stmt: &Statement, block: &Block, known: &[&str], ctx: &mut EvalContext) {
    match stmt {
        Statement::Attribute(attr) => ctx.unknown_field(&block.name, &attr.key, known, &attr.span),
        Statement::Block(inner) => ctx.unknown_field(&block.name, &inner.name, known, &inner.span),
        other => ctx.error(
            DiagnosticCode::InvalidStatement,
            format!("{} statement is not allowed in {}", other.kind_name(), block.name),
            other.span(),
        ),
    }
}

fn compile_domain(id: String, block: &Block, ctx: &mut EvalContext) -> Option<NamingDomain> {
    let mut ok = true;
    let mut culture = None;
    let mut consonants = Vec::new();
    let mut vowels = Vec::new();
    let mut syllables = Vec::new();
    let mut length = None;
    for stmt in &block.body {
        let Statement::Attribute(attr) = stmt else {
            reject_statement(stmt, block, DOMAIN_FIELDS, ctx);
            ok = false;
            continue;
        };
        let span = &attr.span;
        ok &= match attr.key.as_str() {
            "culture" => culture_reference(&attr.value, ctx, span)
                .map(|c| set_once(&mut culture, c, "culture", ctx, span))
                .unwrap_or(false),
            "consonants" | "vowels" | "syllables" => match eval_string_list(&attr.value, ctx, &attr.key, span) {
                Some(items) => {
                    match attr.key.as_str() {
                        "consonants" => consonants.extend(items),
                        "vowels" => vowels.extend(items),
                        _ => syllables.extend(items),
                    }
                    true
                }
                None => false,
            },
            "length" => {
                let threshold = ctx.options.suggestion_threshold;
                eval_tokens(&attr.value, ctx, "length", span)
                    .and_then(|tokens| settle(parse_length(&tokens, threshold), ctx, span))
                    .map(|range| set_once(&mut length, range, "length", ctx, span))
                    .unwrap_or(false)
            }
            other => {
                ctx.unknown_field("naming_domain", other, DOMAIN_FIELDS, span);
                false
            }
        };
    }
    if !ok {
        return None;
    }
    let culture_id = require(culture, "culture", block, ctx)?;
    if consonants.is_empty() && vowels.is_empty() && syllables.is_empty() {
        ctx.error(
            DiagnosticCode::MissingField,
            format!("naming_domain '{}' needs consonants and vowels, or syllables", id),
            &block.span,
        );
        return None;
    }
    Some(NamingDomain {
        id,
        culture_id,
        consonants,
        vowels,
        syllables,
        length,
    })
}

fn parse_length(tokens: &[Token], threshold: f64) -> Result<LengthRange, TokenError> {
    let mut stream = TokenStream::new("length", tokens).with_threshold(threshold);
    let min = stream.next_number("a minimum length")?;
    let max = stream.next_number("a maximum length")?;
    stream.expect_end()?;
    let (Some(min), Some(max)) = (whole_u32(min).filter(|m| *m >= 1), whole_u32(max)) else {
        return Err(stream.invalid("lengths must be positive whole numbers"));
    };
    if min > max {
        return Err(stream.invalid(format!("minimum {} exceeds maximum {}", min, max)));
    }
    Ok(LengthRange { min, max })
}

fn compile_grammar(id: String, block: &Block, ctx: &mut EvalContext) -> Option<Grammar> {
    let mut ok = true;
    let mut culture = None;
    let mut start = None;
    let mut raw_rules: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();
    let mut rule_spans: Vec<(String, SourceSpan)> = Vec::new();
    for stmt in &block.body {
        let Statement::Attribute(attr) = stmt else {
            reject_statement(stmt, block, GRAMMAR_FIELDS, ctx);
            ok = false;
            continue;
        };
        let span = &attr.span;
        ok &= match attr.key.as_str() {
            "culture" => culture_reference(&attr.value, ctx, span)
                .map(|c| set_once(&mut culture, c, "culture", ctx, span))
                .unwrap_or(false),
            "start" => eval_string(&attr.value, ctx, "start", span)
                .map(|s| set_once(&mut start, s, "start", ctx, span))
                .unwrap_or(false),
            "rule" => match eval_string_list(&attr.value, ctx, "rule", span) {
                Some(words) => match split_rule(&words) {
                    Ok((symbol, alternatives)) => {
                        rule_spans.push((symbol.clone(), span.clone()));
                        raw_rules.entry(symbol).or_default().extend(alternatives);
                        true
                    }
                    Err(message) => {
                        ctx.error(DiagnosticCode::InvalidValue, message, span);
                        false
                    }
                },
                None => false,
            },
            other => {
                ctx.unknown_field("grammar", other, GRAMMAR_FIELDS, span);
                false
            }
        };
    }
    if !ok {
        return None;
    }
    let culture_id = require(culture, "culture", block, ctx)?;
    let start = require(start, "start", block, ctx)?;
    if !raw_rules.contains_key(&start) {
        let hint = ctx.suggest(&start, raw_rules.keys().map(String::as_str));
        ctx.error(
            DiagnosticCode::UnknownField,
            crate::diagnostics::with_suggestion(
                format!("grammar '{}' starts at '{}', which has no rule", id, start),
                hint,
            ),
            &block.span,
        );
        return None;
    }

    let mut rules = BTreeMap::new();
    for (symbol, alternatives) in &raw_rules {
        let span = rule_spans
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, span)| span.clone())
            .unwrap_or_else(|| block.span.clone());
        let mut compiled = Vec::with_capacity(alternatives.len());
        for alternative in alternatives {
            let mut sequence = Vec::with_capacity(alternative.len());
            for word in alternative {
                match classify_token(word, &raw_rules, ctx, &span) {
                    Some(token) => sequence.push(token),
                    None => ok = false,
                }
            }
            compiled.push(sequence);
        }
        rules.insert(symbol.clone(), compiled);
    }

    ok.then_some(Grammar {
        id,
        culture_id,
        start,
        rules,
    })
}

/// `symbol a b | c` -> (symbol, [[a, b], [c]])
fn split_rule(words: &[String]) -> Result<(String, Vec<Vec<String>>), String> {
    let Some((symbol, rest)) = words.split_first() else {
        return Err("rule needs a symbol and at least one production".to_string());
    };
    if symbol == ALTERNATIVE_SEPARATOR {
        return Err("rule needs a symbol before its productions".to_string());
    }
    let alternatives: Vec<Vec<String>> = rest
        .split(|w| w == ALTERNATIVE_SEPARATOR)
        .map(<[String]>::to_vec)
        .collect();
    if rest.is_empty() || alternatives.iter().any(Vec::is_empty) {
        return Err(format!("rule '{}' has an empty production", symbol));
    }
    Ok((symbol.clone(), alternatives))
}

fn classify_token(
    word: &str,
    rules: &BTreeMap<String, Vec<Vec<String>>>,
    ctx: &mut EvalContext,
    span: &SourceSpan,
) -> Option<GrammarToken> {
    if rules.contains_key(word) {
        return Some(GrammarToken::Rule(word.to_string()));
    }
    if !word.ends_with(".id") {
        return Some(GrammarToken::Literal(word.to_string()));
    }
    let threshold = ctx.options.suggestion_threshold;
    let allowed = [ResourceKind::LexemeList, ResourceKind::NamingDomain];
    match ctx.registry.resolve_reference(word, &allowed, threshold) {
        Ok(entry) => Some(match entry.kind {
            ResourceKind::NamingDomain => GrammarToken::Domain(entry.id.clone()),
            _ => GrammarToken::LexemeList(entry.id.clone()),
        }),
        Err(e) => {
            ctx.push(e.to_diagnostic(span));
            None
        }
    }
}

fn compile_lexeme_list(id: String, block: &Block, ctx: &mut EvalContext) -> Option<LexemeList> {
    let mut ok = true;
    let mut culture = None;
    let mut entries: Vec<String> = Vec::new();
    let mut description = None;
    for stmt in &block.body {
        let Statement::Attribute(attr) = stmt else {
            reject_statement(stmt, block, LEXEME_FIELDS, ctx);
            ok = false;
            continue;
        };
        let span = &attr.span;
        ok &= match attr.key.as_str() {
            "culture" => culture_reference(&attr.value, ctx, span)
                .map(|c| set_once(&mut culture, c, "culture", ctx, span))
                .unwrap_or(false),
            "entries" => match eval_string_list(&attr.value, ctx, "entries", span) {
                Some(items) => {
                    entries.extend(items);
                    true
                }
                None => false,
            },
            "description" => eval_string(&attr.value, ctx, "description", span)
                .map(|d| set_once(&mut description, d, "description", ctx, span))
                .unwrap_or(false),
            other => {
                ctx.unknown_field("lexeme_list", other, LEXEME_FIELDS, span);
                false
            }
        };
    }
    if !ok {
        return None;
    }
    let culture_id = require(culture, "culture", block, ctx)?;
    if entries.is_empty() {
        ctx.error(
            DiagnosticCode::MissingField,
            format!("lexeme_list '{}' has no entries", id),
            &block.span,
        );
        return None;
    }
    Some(LexemeList {
        id,
        culture_id,
        entries,
        description,
    })
}

fn compile_profile(id: String, block: &Block, ctx: &mut EvalContext) -> Option<NamingProfile> {
    let mut ok = true;
    let mut culture = None;
    let mut is_default = None;
    let mut strategies = Vec::new();
    for stmt in &block.body {
        let span = stmt.span();
        ok &= match stmt {
            Statement::Bare(bare) if bare.value.as_identifier() == Some("default") => {
                set_once(&mut is_default, true, "default", ctx, span)
            }
            Statement::Attribute(attr) => match attr.key.as_str() {
                "culture" => culture_reference(&attr.value, ctx, span)
                    .map(|c| set_once(&mut culture, c, "culture", ctx, span))
                    .unwrap_or(false),
                "default" => eval_bool(&attr.value, ctx, "default", span)
                    .map(|b| set_once(&mut is_default, b, "default", ctx, span))
                    .unwrap_or(false),
                "strategy" => match compile_strategy(attr, ctx) {
                    Some(strategy) => {
                        strategies.push(strategy);
                        true
                    }
                    None => false,
                },
                other => {
                    ctx.unknown_field("naming_profile", other, PROFILE_FIELDS, span);
                    false
                }
            },
            other => {
                reject_statement(other, block, PROFILE_FIELDS, ctx);
                false
            }
        };
    }
    if !ok {
        return None;
    }
    let culture_id = require(culture, "culture", block, ctx)?;
    if strategies.is_empty() {
        ctx.error(
            DiagnosticCode::MissingField,
            format!("naming_profile '{}' has no strategy", id),
            &block.span,
        );
        return None;
    }
    Some(NamingProfile {
        id,
        culture_id,
        is_default: is_default.unwrap_or(false),
        strategies,
    })
}

/// `strategy grammar|domain|lexeme <ref>.id [weight w]`
fn compile_strategy(attr: &crate::ast::Attribute, ctx: &mut EvalContext) -> Option<NamingStrategy> {
    let span = &attr.span;
    let threshold = ctx.options.suggestion_threshold;
    let tokens = eval_tokens(&attr.value, ctx, "strategy", span)?;
    let (kind, reference, weight) = settle(parse_strategy(&tokens, threshold), ctx, span)?;
    let reference = ctx.resolve_resource(&reference, &[kind.resource_kind()], span)?;
    Some(NamingStrategy {
        kind,
        reference,
        weight,
    })
}

fn parse_strategy(tokens: &[Token], threshold: f64) -> Result<(StrategyKind, String, f64), TokenError> {
    let mut stream = TokenStream::new("strategy", tokens).with_threshold(threshold);
    let kind = stream.next_choice("kind", StrategyKind::NAMES)?;
    let kind = StrategyKind::parse(&kind).ok_or_else(|| stream.invalid("unknown strategy kind"))?;
    let reference = stream.next_ident("a reference like 'name.id'")?;
    let opts = stream.keyed_options(&["weight"])?;
    let weight = opts.number("weight")?.unwrap_or(1.0);
    if weight <= 0.0 {
        return Err(stream.invalid(format!("weight must be positive, found {}", weight)));
    }
    Ok((kind, reference, weight))
}
