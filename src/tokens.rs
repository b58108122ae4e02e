//! Token-stream micro-parsers
//!
//! The mini-languages (growth factors, contract entries, conditions,
//! mutations, selection filters) are written as flat word lists:
//!
//! ```text
//! entity_count kind settlement status thriving coefficient 2 cap 50
//! relationship_count ally_of rival_of coefficient 0.5
//! relationship_exists actor member_of with target direction src
//! ```
//!
//! An attribute value is evaluated, flattened into [`Token`]s and consumed by
//! a [`TokenStream`]. Two shapes recur: keyed options (`key value` pairs from
//! an allow-list) and a prefix list (plain words up to a stop word) followed
//! by keyed options. Parsers are greedy and stop at the first invalid token.

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::ast::{Block, Statement, Value};
use crate::diagnostics::{suggest, with_suggestion};
use crate::error::TokenError;
use crate::eval::{evaluate, EvalContext};

/// One flat token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Str(String),
    Num(f64),
}

/// `n` as a `u32` when it is a whole number in range
pub fn whole_u32(n: f64) -> Option<u32> {
    (n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX)).then_some(n as u32)
}

impl Token {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Token::Str(s) => Some(s),
            Token::Num(_) => None,
        }
    }

    /// Finite numbers, or strings that parse as finite numbers
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            Token::Num(n) => *n,
            Token::Str(s) => s.parse().ok()?,
        };
        n.is_finite().then_some(n)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.as_str() {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        }
    }

    pub fn text(&self) -> String {
        match self {
            Token::Str(s) => s.clone(),
            Token::Num(n) => Value::Number(*n).to_dsl_string(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Token::Str(s) => JsonValue::String(s.clone()),
            Token::Num(n) => crate::eval::number_to_json(*n),
        }
    }
}

/// Flatten one evaluated value into tokens. A top-level array contributes its
/// items; anything nested deeper is rejected.
pub fn flatten(value: &JsonValue, construct: &str) -> Result<Vec<Token>, TokenError> {
    let mut tokens = Vec::new();
    match value {
        JsonValue::Array(items) => {
            for item in items {
                tokens.push(scalar_token(item, construct)?);
            }
        }
        other => tokens.push(scalar_token(other, construct)?),
    }
    Ok(tokens)
}

fn scalar_token(value: &JsonValue, construct: &str) -> Result<Token, TokenError> {
    match value {
        JsonValue::String(s) => Ok(Token::Str(s.clone())),
        JsonValue::Number(n) => Ok(Token::Num(n.as_f64().unwrap_or_default())),
        JsonValue::Bool(b) => Ok(Token::Str(b.to_string())),
        JsonValue::Null => Err(TokenError::NestedValue {
            construct: construct.to_string(),
            shape: "null".to_string(),
        }),
        JsonValue::Array(_) => Err(TokenError::NestedValue {
            construct: construct.to_string(),
            shape: "array".to_string(),
        }),
        JsonValue::Object(_) => Err(TokenError::NestedValue {
            construct: construct.to_string(),
            shape: "object".to_string(),
        }),
    }
}

/// `key value...` attribute as tokens: the key, then the flattened value
pub fn attribute_tokens(
    key: &str,
    value: &Value,
    ctx: &mut EvalContext,
    span: &crate::diagnostics::SourceSpan,
) -> Result<Vec<Token>, TokenError> {
    let evaluated = evaluate(value, ctx, span);
    let mut tokens = vec![Token::Str(key.to_string())];
    tokens.extend(flatten(&evaluated, key)?);
    Ok(tokens)
}

/// Block form: `name labels... { key value ... }` flattens to
/// `name, labels..., key, value, key, value, ...`
pub fn block_tokens(block: &Block, ctx: &mut EvalContext) -> Result<Vec<Token>, TokenError> {
    let mut tokens = vec![Token::Str(block.name.clone())];
    tokens.extend(block.labels.iter().cloned().map(Token::Str));
    for stmt in &block.body {
        match stmt {
            Statement::Attribute(attr) => {
                tokens.extend(attribute_tokens(&attr.key, &attr.value, ctx, &attr.span)?);
            }
            Statement::Bare(bare) => {
                let evaluated = evaluate(&bare.value, ctx, &bare.span);
                tokens.extend(flatten(&evaluated, &block.name)?);
            }
            other => {
                return Err(TokenError::invalid(
                    &block.name,
                    format!("{} statement cannot be flattened into tokens", other.kind_name()),
                ))
            }
        }
    }
    Ok(tokens)
}

// ============================================================================
// Comparison
// ============================================================================

/// Comparison keywords (and their symbolic aliases)
pub const COMPARISON_KEYWORDS: &[&str] = &[
    "gt", "gte", "lt", "lte", "eq", "between", ">", ">=", "<", "<=", "==",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl CompareOp {
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "gt" | ">" => Some(CompareOp::Gt),
            "gte" | ">=" => Some(CompareOp::Gte),
            "lt" | "<" => Some(CompareOp::Lt),
            "lte" | "<=" => Some(CompareOp::Lte),
            "eq" | "==" => Some(CompareOp::Eq),
            _ => None,
        }
    }
}

/// A numeric comparison, serialized flat as `operator` plus operands
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operator", rename_all = "snake_case")]
pub enum Comparison {
    Gt {
        #[serde(serialize_with = "crate::model::num")]
        value: f64,
    },
    Gte {
        #[serde(serialize_with = "crate::model::num")]
        value: f64,
    },
    Lt {
        #[serde(serialize_with = "crate::model::num")]
        value: f64,
    },
    Lte {
        #[serde(serialize_with = "crate::model::num")]
        value: f64,
    },
    Eq {
        #[serde(serialize_with = "crate::model::num")]
        value: f64,
    },
    Between {
        #[serde(serialize_with = "crate::model::num")]
        min: f64,
        #[serde(serialize_with = "crate::model::num")]
        max: f64,
    },
}

impl Comparison {
    pub fn new(op: CompareOp, value: f64) -> Self {
        match op {
            CompareOp::Gt => Comparison::Gt { value },
            CompareOp::Gte => Comparison::Gte { value },
            CompareOp::Lt => Comparison::Lt { value },
            CompareOp::Lte => Comparison::Lte { value },
            CompareOp::Eq => Comparison::Eq { value },
        }
    }
}

// ============================================================================
// Token stream
// ============================================================================

/// Cursor over a token slice for one construct
#[derive(Debug)]
pub struct TokenStream<'a> {
    construct: String,
    tokens: &'a [Token],
    pos: usize,
    threshold: f64,
}

impl<'a> TokenStream<'a> {
    pub fn new(construct: impl Into<String>, tokens: &'a [Token]) -> Self {
        Self {
            construct: construct.into(),
            tokens,
            pos: 0,
            threshold: 0.8,
        }
    }

    /// Set the similarity threshold for "did you mean" hints
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn construct(&self) -> &str {
        &self.construct
    }

    /// Rename the construct used in error messages (after reading the type)
    pub fn set_construct(&mut self, construct: impl Into<String>) {
        self.construct = construct.into();
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn remaining(&self) -> &'a [Token] {
        &self.tokens[self.pos.min(self.tokens.len())..]
    }

    pub fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    pub fn peek_str(&self) -> Option<&'a str> {
        self.peek().and_then(Token::as_str)
    }

    fn end_error(&self, expected: &str) -> TokenError {
        TokenError::UnexpectedEnd {
            construct: self.construct.clone(),
            expected: expected.to_string(),
        }
    }

    fn unexpected(&self, expected: &str, found: &Token) -> TokenError {
        TokenError::Unexpected {
            construct: self.construct.clone(),
            expected: expected.to_string(),
            found: found.text(),
        }
    }

    pub fn invalid(&self, message: impl Into<String>) -> TokenError {
        TokenError::invalid(&self.construct, message)
    }

    /// Unrecognized construct type, with a suggestion drawn from `known`
    pub fn unknown_type(&self, found: String, known: &[&str]) -> TokenError {
        let hint = suggest(&found, known.iter().copied(), self.threshold);
        TokenError::UnknownType {
            construct: self.construct.clone(),
            found,
            hint: with_suggestion(String::new(), hint),
        }
    }

    pub fn next_token(&mut self, expected: &str) -> Result<&'a Token, TokenError> {
        let token = self.tokens.get(self.pos).ok_or_else(|| self.end_error(expected))?;
        self.pos += 1;
        Ok(token)
    }

    /// Next word (numbers are rejected)
    pub fn next_ident(&mut self, expected: &str) -> Result<String, TokenError> {
        let token = self.next_token(expected)?;
        match token {
            Token::Str(s) => Ok(s.clone()),
            Token::Num(_) => Err(self.unexpected(expected, token)),
        }
    }

    pub fn next_number(&mut self, expected: &str) -> Result<f64, TokenError> {
        let token = self.next_token(expected)?;
        token
            .as_number()
            .ok_or_else(|| self.unexpected(expected, token))
    }

    /// Consume `word` if it is next
    pub fn eat(&mut self, word: &str) -> bool {
        if self.peek_str() == Some(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn expect_word(&mut self, word: &str) -> Result<(), TokenError> {
        let expected = format!("'{}'", word);
        let token = self.next_token(&expected)?;
        if token.as_str() == Some(word) {
            Ok(())
        } else {
            Err(self.unexpected(&expected, token))
        }
    }

    pub fn expect_end(&self) -> Result<(), TokenError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.unexpected("end of input", token)),
        }
    }

    /// Choice from a fixed vocabulary
    pub fn next_choice(&mut self, field: &str, allowed: &[&str]) -> Result<String, TokenError> {
        let value = self.next_ident(field)?;
        if allowed.contains(&value.as_str()) {
            Ok(value)
        } else {
            Err(TokenError::InvalidChoice {
                construct: self.construct.clone(),
                field: field.to_string(),
                value,
                allowed: allowed.join(", "),
            })
        }
    }

    /// Plain words until a stop word (or the end)
    pub fn prefix_list(&mut self, stop_words: &[&str]) -> Vec<String> {
        let mut words = Vec::new();
        while let Some(token) = self.peek() {
            match token.as_str() {
                Some(word) if !stop_words.contains(&word) => {
                    words.push(word.to_string());
                    self.pos += 1;
                }
                _ => break,
            }
        }
        words
    }

    /// `key value` pairs from `allowed` until the end of the stream
    pub fn keyed_options(&mut self, allowed: &[&str]) -> Result<KeyedOptions, TokenError> {
        self.keyed_options_until(allowed, &[])
    }

    /// `key value` pairs from `allowed`, stopping before any key in `stop`
    pub fn keyed_options_until(
        &mut self,
        allowed: &[&str],
        stop: &[&str],
    ) -> Result<KeyedOptions, TokenError> {
        let mut options = KeyedOptions {
            construct: self.construct.clone(),
            values: Vec::new(),
        };
        while let Some(token) = self.peek() {
            let Some(key) = token.as_str() else {
                return Err(self.unexpected("an option name", token));
            };
            if stop.contains(&key) {
                break;
            }
            if !allowed.contains(&key) {
                let hint = suggest(key, allowed.iter().copied(), self.threshold);
                return Err(TokenError::UnknownOption {
                    construct: self.construct.clone(),
                    key: key.to_string(),
                    hint: with_suggestion(String::new(), hint),
                });
            }
            if options.values.iter().any(|(k, _)| k == key) {
                return Err(TokenError::DuplicateOption {
                    construct: self.construct.clone(),
                    key: key.to_string(),
                });
            }
            self.pos += 1;
            let value = self.next_token(&format!("a value for '{}'", key))?;
            options.values.push((key.to_string(), value.clone()));
        }
        Ok(options)
    }

    /// Comparison keyword and operand(s): `gte 40`, `> 3`, `between 1 5`
    pub fn comparison(&mut self) -> Result<Comparison, TokenError> {
        let word = self.next_ident("a comparison (gt, gte, lt, lte, eq, between)")?;
        if word == "between" {
            let min = self.next_number("a lower bound")?;
            let max = self.next_number("an upper bound")?;
            if min > max {
                return Err(self.invalid(format!("between {} {}: lower bound exceeds upper bound", min, max)));
            }
            return Ok(Comparison::Between { min, max });
        }
        let Some(op) = CompareOp::parse(&word) else {
            return Err(TokenError::InvalidChoice {
                construct: self.construct.clone(),
                field: "comparison".to_string(),
                value: word,
                allowed: "gt, gte, lt, lte, eq, between".to_string(),
            });
        };
        let value = self.next_number("a number")?;
        Ok(Comparison::new(op, value))
    }

    pub fn compare_op(&mut self) -> Result<CompareOp, TokenError> {
        let word = self.next_ident("a comparison (gt, gte, lt, lte, eq)")?;
        CompareOp::parse(&word).ok_or_else(|| TokenError::InvalidChoice {
            construct: self.construct.clone(),
            field: "comparison".to_string(),
            value: word,
            allowed: "gt, gte, lt, lte, eq".to_string(),
        })
    }
}

/// Parsed `key value` pairs
#[derive(Debug, Clone, Default)]
pub struct KeyedOptions {
    construct: String,
    values: Vec<(String, Token)>,
}

impl KeyedOptions {
    pub fn get(&self, key: &str) -> Option<&Token> {
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.get(key).map(Token::text)
    }

    pub fn require_string(&self, key: &str) -> Result<String, TokenError> {
        self.string(key).ok_or_else(|| TokenError::MissingOption {
            construct: self.construct.clone(),
            key: key.to_string(),
        })
    }

    pub fn number(&self, key: &str) -> Result<Option<f64>, TokenError> {
        match self.get(key) {
            None => Ok(None),
            Some(token) => token.as_number().map(Some).ok_or_else(|| TokenError::Unexpected {
                construct: self.construct.clone(),
                expected: format!("a number for '{}'", key),
                found: token.text(),
            }),
        }
    }

    pub fn require_number(&self, key: &str) -> Result<f64, TokenError> {
        self.number(key)?.ok_or_else(|| TokenError::MissingOption {
            construct: self.construct.clone(),
            key: key.to_string(),
        })
    }

    pub fn boolean(&self, key: &str) -> Result<Option<bool>, TokenError> {
        match self.get(key) {
            None => Ok(None),
            Some(token) => token.as_bool().map(Some).ok_or_else(|| TokenError::Unexpected {
                construct: self.construct.clone(),
                expected: format!("true or false for '{}'", key),
                found: token.text(),
            }),
        }
    }

    /// Value of `key` restricted to a vocabulary
    pub fn choice(&self, key: &str, allowed: &[&str]) -> Result<Option<String>, TokenError> {
        match self.string(key) {
            None => Ok(None),
            Some(value) if allowed.contains(&value.as_str()) => Ok(Some(value)),
            Some(value) => Err(TokenError::InvalidChoice {
                construct: self.construct.clone(),
                field: key.to_string(),
                value,
                allowed: allowed.join(", "),
            }),
        }
    }
}
