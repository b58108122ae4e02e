//! Default syntactic parser
//!
//! The compiler consumes a generic statement forest through the
//! [`SourceParser`] trait. This module provides the nom-based implementation
//! used when callers do not bring their own.
//!
//! ## Grammar
//!
//! ```text
//! program    := (statement (NEWLINE | ';'))*
//! statement  := 'rel' IDENT IDENT '->' IDENT option*
//!             | 'mutate' IDENT ('=' | '+=' | '-=') value+
//!             | 'from' IDENT option*
//!             | IDENT label* '{' program '}'          (block)
//!             | IDENT 'in' value+                     (membership)
//!             | IDENT CMP value                       (predicate)
//!             | IDENT value*                          (attribute / bare word)
//!             | value+                                (bare value)
//! option     := IDENT value
//! value      := STRING | NUMBER | 'true' | 'false' | 'null'
//!             | IDENT | IDENT '(' value* ')' | OPERATOR
//!             | '[' value* ']' | '{' (KEY ':' value)* '}'
//! ```
//!
//! Comments start with `#` or `//` and run to the end of the line.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit1, satisfy},
    combinator::{opt, recognize},
    error::{VerboseError, VerboseErrorKind},
    sequence::{pair, tuple},
    IResult,
};

use crate::ast::*;
use crate::diagnostics::{LineIndex, SourceSpan};
use crate::error::ParseError;

/// Comparison operators that turn `subject op value` into a predicate
pub const COMPARISON_OPERATORS: &[&str] = &[">", ">=", "<", "<=", "==", "!="];

const MAX_NESTING: usize = 128;

// ============================================================================
// Public API
// ============================================================================

/// The syntactic-parser contract: source text in, statement forest out.
pub trait SourceParser {
    fn parse(&self, source: &str, path: &str) -> Result<Vec<Statement>, ParseError>;
}

/// The built-in parser for the block/attribute syntax
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultParser;

impl SourceParser for DefaultParser {
    fn parse(&self, source: &str, path: &str) -> Result<Vec<Statement>, ParseError> {
        parse_source(source, path)
    }
}

/// Parse a complete source file into statements
pub fn parse_source(source: &str, path: &str) -> Result<Vec<Statement>, ParseError> {
    let cursor = Cursor::new(source, path);
    match program(&cursor, source) {
        Ok((_, statements)) => Ok(statements),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(cursor.to_parse_error(e)),
        Err(nom::Err::Incomplete(_)) => Err(ParseError::new("incomplete input", None)),
    }
}

// ============================================================================
// Internal Parsers
// ============================================================================

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

struct Cursor<'a> {
    original: &'a str,
    file: &'a str,
    index: LineIndex<'a>,
}

impl<'a> Cursor<'a> {
    fn new(original: &'a str, file: &'a str) -> Self {
        Self {
            original,
            file,
            index: LineIndex::new(original),
        }
    }

    fn offset(&self, input: &str) -> usize {
        self.original.len() - input.len()
    }

    fn span(&self, start: usize, end: usize) -> SourceSpan {
        SourceSpan::new(self.file, self.index.position(start), self.index.position(end))
    }

    fn to_parse_error(&self, err: VerboseError<&str>) -> ParseError {
        let Some((rest, _)) = err.errors.first() else {
            return ParseError::new("syntax error", None);
        };
        let offset = self.offset(rest);
        let expected = err.errors.iter().find_map(|(_, kind)| match kind {
            VerboseErrorKind::Context(ctx) => Some(*ctx),
            _ => None,
        });
        let found = match rest.chars().next() {
            Some('\n') => "end of line".to_string(),
            Some(c) => format!("'{}'", c),
            None => "end of input".to_string(),
        };
        let message = match expected {
            Some(expected) => format!("expected {}, found {}", expected, found),
            None => format!("unexpected {}", found),
        };
        ParseError::new(message, Some(self.span(offset, offset)))
    }
}

fn failure<'a, T>(input: &'a str, expected: &'static str) -> PResult<'a, T> {
    Err(nom::Err::Failure(VerboseError {
        errors: vec![(input, VerboseErrorKind::Context(expected))],
    }))
}

fn backtrack<'a, T>(input: &'a str, expected: &'static str) -> PResult<'a, T> {
    Err(nom::Err::Error(VerboseError {
        errors: vec![(input, VerboseErrorKind::Context(expected))],
    }))
}

/// Promote a recoverable error into a hard failure with context
fn expect<'a, T>(result: PResult<'a, T>, input: &'a str, what: &'static str) -> PResult<'a, T> {
    match result {
        Err(nom::Err::Error(_)) => failure(input, what),
        other => other,
    }
}

// ============================================================================
// Layout
// ============================================================================

/// Spaces, tabs and comments (never newlines)
fn blank(input: &str) -> PResult<'_, ()> {
    let mut rest = input;
    loop {
        let (r, _) = take_while(|c| c == ' ' || c == '\t' || c == '\r')(rest)?;
        rest = r;
        if rest.starts_with('#') || rest.starts_with("//") {
            let (r, _) = take_while(|c| c != '\n')(rest)?;
            rest = r;
        } else {
            return Ok((rest, ()));
        }
    }
}

/// Blank space including newlines (inside brackets)
fn gap(input: &str) -> PResult<'_, ()> {
    let mut rest = input;
    loop {
        let (r, _) = blank(rest)?;
        match r.strip_prefix('\n') {
            Some(r) => rest = r,
            None => return Ok((r, ())),
        }
    }
}

/// Blank lines and statement separators
fn separators(input: &str) -> PResult<'_, ()> {
    let mut rest = input;
    loop {
        let (r, _) = blank(rest)?;
        match r.strip_prefix('\n').or_else(|| r.strip_prefix(';')) {
            Some(r) => rest = r,
            None => return Ok((r, ())),
        }
    }
}

fn statement_end(input: &str) -> PResult<'_, ()> {
    let (rest, _) = blank(input)?;
    match rest.chars().next() {
        None | Some('\n') | Some(';') | Some('}') => Ok((rest, ())),
        Some(_) => failure(rest, "end of statement"),
    }
}

// ============================================================================
// Statements
// ============================================================================

fn program<'a>(c: &Cursor<'a>, input: &'a str) -> PResult<'a, Vec<Statement>> {
    let mut statements = Vec::new();
    let mut rest = input;
    loop {
        let (r, _) = separators(rest)?;
        rest = r;
        if rest.is_empty() {
            return Ok((rest, statements));
        }
        if rest.starts_with('}') {
            return failure(rest, "a statement (unmatched '}')");
        }
        let (r, stmt) = statement(c, rest, 0)?;
        statements.push(stmt);
        let (r, _) = statement_end(r)?;
        rest = r;
    }
}

fn block_body<'a>(c: &Cursor<'a>, input: &'a str, depth: usize) -> PResult<'a, Vec<Statement>> {
    if depth > MAX_NESTING {
        return failure(input, "shallower nesting");
    }
    let (mut rest, _) = char('{')(input)?;
    let mut body = Vec::new();
    loop {
        let (r, _) = separators(rest)?;
        rest = r;
        if let Some(r) = rest.strip_prefix('}') {
            return Ok((r, body));
        }
        if rest.is_empty() {
            return failure(rest, "closing '}'");
        }
        let (r, stmt) = statement(c, rest, depth + 1)?;
        body.push(stmt);
        let (r, _) = statement_end(r)?;
        rest = r;
    }
}

fn statement<'a>(c: &Cursor<'a>, input: &'a str, depth: usize) -> PResult<'a, Statement> {
    let start = c.offset(input);

    if let Ok((after, name)) = identifier(input) {
        if !after.starts_with('(') && !matches!(name, "true" | "false" | "null") {
            return match name {
                "rel" => rel_statement(c, after, start),
                "mutate" => mutate_statement(c, after, start),
                "from" => from_statement(c, after, start),
                _ => named_statement(c, name, after, start, depth),
            };
        }
    }

    let (rest, (mut values, end)) = line_values(c, input)?;
    let value = if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    };
    Ok((
        rest,
        Statement::Bare(Bare {
            value,
            span: c.span(start, end),
        }),
    ))
}

fn named_statement<'a>(
    c: &Cursor<'a>,
    name: &'a str,
    after: &'a str,
    start: usize,
    depth: usize,
) -> PResult<'a, Statement> {
    let (rest, (mut tokens, end)) = line_values(c, after)?;
    let (rest, _) = blank(rest)?;

    if rest.starts_with('{') {
        let Some(labels) = tokens.iter().map(label_text).collect::<Option<Vec<_>>>() else {
            return failure(after, "block labels (identifiers, strings or numbers)");
        };
        let (rest, body) = block_body(c, rest, depth)?;
        let end = c.offset(rest);
        return Ok((
            rest,
            Statement::Block(Block {
                name: name.to_string(),
                labels,
                body,
                span: c.span(start, end),
            }),
        ));
    }

    let span = c.span(start, end);
    let subject = name.to_string();

    let stmt = match tokens.first() {
        None => Statement::Bare(Bare {
            value: Value::Identifier(subject),
            span,
        }),
        Some(Value::Identifier(kw)) if kw == "in" => {
            tokens.remove(0);
            let value = match tokens.len() {
                0 => return failure(rest, "a value after 'in'"),
                1 => tokens.remove(0),
                _ => Value::Array(tokens),
            };
            Statement::In(InClause {
                subject,
                value,
                span,
            })
        }
        Some(Value::Identifier(op))
            if tokens.len() == 2 && COMPARISON_OPERATORS.contains(&op.as_str()) =>
        {
            let operator = op.clone();
            Statement::Predicate(Predicate {
                subject,
                operator,
                value: tokens.remove(1),
                span,
            })
        }
        Some(_) => {
            let value = if tokens.len() == 1 {
                tokens.remove(0)
            } else {
                Value::Array(tokens)
            };
            Statement::Attribute(Attribute {
                key: subject,
                value,
                span,
            })
        }
    };
    Ok((rest, stmt))
}

fn rel_statement<'a>(c: &Cursor<'a>, input: &'a str, start: usize) -> PResult<'a, Statement> {
    let (rest, _) = blank(input)?;
    let (rest, kind) = expect(identifier(rest), rest, "relationship kind")?;
    let (rest, _) = blank(rest)?;
    let (rest, src) = expect(identifier(rest), rest, "source entity")?;
    let (rest, _) = blank(rest)?;
    let (rest, _) = expect(tag("->")(rest), rest, "'->'")?;
    let (rest, _) = blank(rest)?;
    let (rest, dst) = expect(identifier(rest), rest, "destination entity")?;
    let options_start = rest;
    let (rest, (tokens, end)) = line_values(c, rest)?;
    let Some(options) = pair_options(tokens) else {
        return failure(options_start, "key/value option pairs");
    };
    let end = end.max(c.offset(options_start));
    Ok((
        rest,
        Statement::Rel(Rel {
            kind: kind.to_string(),
            src: src.to_string(),
            dst: dst.to_string(),
            options,
            span: c.span(start, end),
        }),
    ))
}

fn mutate_statement<'a>(c: &Cursor<'a>, input: &'a str, start: usize) -> PResult<'a, Statement> {
    let (rest, _) = blank(input)?;
    let (rest, target) = expect(identifier(rest), rest, "mutation target")?;
    let (rest, _) = blank(rest)?;
    let op_result = alt((tag("+="), tag("-="), tag("=")))(rest);
    let (rest, operator) = expect(op_result, rest, "'=', '+=' or '-='")?;
    let value_start = rest;
    let (rest, (mut values, end)) = line_values(c, rest)?;
    let value = match values.len() {
        0 => return failure(value_start, "a value"),
        1 => values.remove(0),
        _ => Value::Array(values),
    };
    Ok((
        rest,
        Statement::Mutate(Mutate {
            target: target.to_string(),
            operator: operator.to_string(),
            value,
            span: c.span(start, end),
        }),
    ))
}

fn from_statement<'a>(c: &Cursor<'a>, input: &'a str, start: usize) -> PResult<'a, Statement> {
    let (rest, _) = blank(input)?;
    let (rest, source) = expect(identifier(rest), rest, "selection source")?;
    let options_start = rest;
    let (rest, (tokens, end)) = line_values(c, rest)?;
    let Some(options) = pair_options(tokens) else {
        return failure(options_start, "key/value option pairs");
    };
    let end = end.max(c.offset(options_start));
    Ok((
        rest,
        Statement::From(FromClause {
            source: source.to_string(),
            options,
            span: c.span(start, end),
        }),
    ))
}

fn label_text(value: &Value) -> Option<String> {
    match value {
        Value::Identifier(s) | Value::String(s) => Some(s.clone()),
        Value::Number(_) => Some(value.to_dsl_string()),
        _ => None,
    }
}

fn pair_options(tokens: Vec<Value>) -> Option<Vec<(String, Value)>> {
    if tokens.len() % 2 != 0 {
        return None;
    }
    let mut options = Vec::with_capacity(tokens.len() / 2);
    let mut iter = tokens.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        match key {
            Value::Identifier(k) => options.push((k, value)),
            _ => return None,
        }
    }
    Some(options)
}

/// Values up to the end of the line (or a block brace). Returns the offset
/// just past the last value.
fn line_values<'a>(c: &Cursor<'a>, input: &'a str) -> PResult<'a, (Vec<Value>, usize)> {
    let mut items = Vec::new();
    let mut rest = input;
    let mut end = c.offset(input);
    loop {
        let (r, _) = blank(rest)?;
        rest = r;
        match rest.chars().next() {
            None | Some('\n') | Some(';') | Some('{') | Some('}') => {
                return Ok((rest, (items, end)));
            }
            Some(_) => {
                let (r, v) = value(c, rest, 0)?;
                items.push(v);
                rest = r;
                end = c.offset(rest);
            }
        }
    }
}

// ============================================================================
// Values
// ============================================================================

fn value<'a>(c: &Cursor<'a>, input: &'a str, depth: usize) -> PResult<'a, Value> {
    if depth > MAX_NESTING {
        return failure(input, "shallower nesting");
    }
    let mut chars = input.chars();
    match chars.next() {
        Some('"') => {
            let (rest, s) = string_literal(input)?;
            Ok((rest, Value::String(s)))
        }
        Some('[') => array_literal(c, input, depth),
        Some('{') => object_literal(c, input, depth),
        Some(ch) if ch.is_ascii_digit() => number_value(input),
        Some('-') if chars.next().is_some_and(|d| d.is_ascii_digit()) => number_value(input),
        Some(ch) if is_identifier_start(ch) => identifier_or_call(c, input, depth),
        Some(_) => match operator(input) {
            Ok((rest, op)) => Ok((rest, Value::Identifier(op.to_string()))),
            Err(_) => failure(input, "a value"),
        },
        None => backtrack(input, "a value"),
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn identifier(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        satisfy(is_identifier_start),
        take_while(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '$')),
    ))(input)
}

fn operator(input: &str) -> PResult<'_, &str> {
    alt((
        tag(">="),
        tag("<="),
        tag("=="),
        tag("!="),
        tag("->"),
        tag("+="),
        tag("-="),
        tag(">"),
        tag("<"),
        tag("="),
        tag("|"),
    ))(input)
}

fn number_value(input: &str) -> PResult<'_, Value> {
    let (rest, text) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)?;
    match text.parse::<f64>() {
        Ok(n) => Ok((rest, Value::Number(n))),
        Err(_) => failure(input, "a number"),
    }
}

fn identifier_or_call<'a>(c: &Cursor<'a>, input: &'a str, depth: usize) -> PResult<'a, Value> {
    let (rest, name) = identifier(input)?;
    if rest.starts_with('(') {
        let (rest, args) = delimited_values(c, rest, '(', ')', "closing ')'", depth)?;
        return Ok((
            rest,
            Value::Call {
                name: name.to_string(),
                args,
            },
        ));
    }
    let value = match name {
        "true" => Value::Boolean(true),
        "false" => Value::Boolean(false),
        "null" => Value::Null,
        _ => Value::Identifier(name.to_string()),
    };
    Ok((rest, value))
}

fn array_literal<'a>(c: &Cursor<'a>, input: &'a str, depth: usize) -> PResult<'a, Value> {
    let (rest, items) = delimited_values(c, input, '[', ']', "closing ']'", depth)?;
    Ok((rest, Value::Array(items)))
}

/// `open value (','? value)* close`, newlines allowed
fn delimited_values<'a>(
    c: &Cursor<'a>,
    input: &'a str,
    open: char,
    close: char,
    expected_close: &'static str,
    depth: usize,
) -> PResult<'a, Vec<Value>> {
    let (mut rest, _) = char(open)(input)?;
    let mut items = Vec::new();
    loop {
        let (r, _) = gap(rest)?;
        rest = r;
        if let Some(r) = rest.strip_prefix(close) {
            return Ok((r, items));
        }
        if rest.is_empty() {
            return failure(rest, expected_close);
        }
        let (r, item) = value(c, rest, depth + 1)?;
        items.push(item);
        let (r, _) = gap(r)?;
        rest = r.strip_prefix(',').unwrap_or(r);
    }
}

/// `{ key: value, ... }`
fn object_literal<'a>(c: &Cursor<'a>, input: &'a str, depth: usize) -> PResult<'a, Value> {
    let (mut rest, _) = char('{')(input)?;
    let mut entries = Vec::new();
    loop {
        let (r, _) = gap(rest)?;
        rest = r;
        if let Some(r) = rest.strip_prefix('}') {
            return Ok((r, Value::Object(entries)));
        }
        let (r, key) = if rest.starts_with('"') {
            string_literal(rest)?
        } else {
            let (r, k) = expect(identifier(rest), rest, "an object key")?;
            (r, k.to_string())
        };
        let (r, _) = blank(r)?;
        let (r, _) = expect(char(':')(r), r, "':' after object key")?;
        let (r, _) = gap(r)?;
        let (r, v) = value(c, r, depth + 1)?;
        entries.push((key, v));
        let (r, _) = gap(r)?;
        rest = r.strip_prefix(',').unwrap_or(r);
    }
}

/// String literal with escape sequences, or a triple-quoted block string
fn string_literal(input: &str) -> PResult<'_, String> {
    if let Some(body) = input.strip_prefix("\"\"\"") {
        return match body.find("\"\"\"") {
            Some(end) => Ok((&body[end + 3..], dedent(&body[..end]))),
            None => failure(input, "closing '\"\"\"'"),
        };
    }
    let Some(body) = input.strip_prefix('"') else {
        return backtrack(input, "a string");
    };
    let mut out = String::new();
    let mut chars = body.char_indices();
    while let Some((i, ch)) = chars.next() {
        match ch {
            '"' => return Ok((&body[i + 1..], out)),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, '"')) => out.push('"'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => break,
            },
            '\n' => return failure(&body[i..], "closing '\"'"),
            other => out.push(other),
        }
    }
    failure(input, "closing '\"'")
}

/// Strip the leading newline and common indentation of a block string
fn dedent(text: &str) -> String {
    let text = text.strip_prefix('\n').unwrap_or(text);
    let text = text.strip_prefix("\r\n").unwrap_or(text);
    let indent = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let lines: Vec<&str> = text
        .lines()
        .map(|l| if l.len() >= indent { &l[indent..] } else { l.trim_start() })
        .collect();
    lines.join("\n").trim_end().to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(src: &str) -> Vec<Statement> {
        parse_source(src, "test.wd").expect("parse failed")
    }

    fn only(src: &str) -> Statement {
        let mut stmts = parse(src);
        assert_eq!(stmts.len(), 1, "expected one statement in {:?}", stmts);
        stmts.remove(0)
    }

    #[test]
    fn test_simple_block() {
        let stmt = only("pressure conflict \"Conflict\" {\n  initial_value 10\n}\n");
        let Statement::Block(block) = stmt else {
            panic!("expected block");
        };
        assert_eq!(block.name, "pressure");
        assert_eq!(block.labels, vec!["conflict", "Conflict"]);
        assert_eq!(block.body.len(), 1);
        let Statement::Attribute(attr) = &block.body[0] else {
            panic!("expected attribute");
        };
        assert_eq!(attr.key, "initial_value");
        assert_eq!(attr.value, Value::Number(10.0));
    }

    #[test]
    fn test_attribute_with_many_values() {
        let stmt = only("positive entity_count kind settlement coefficient 2");
        let Statement::Attribute(attr) = stmt else {
            panic!("expected attribute");
        };
        assert_eq!(attr.key, "positive");
        assert_eq!(
            attr.value,
            Value::Array(vec![
                Value::ident("entity_count"),
                Value::ident("kind"),
                Value::ident("settlement"),
                Value::ident("coefficient"),
                Value::Number(2.0),
            ])
        );
    }

    #[test]
    fn test_one_line_block() {
        let stmt = only("set allies { a b include other_allies }");
        let Statement::Block(block) = stmt else {
            panic!("expected block");
        };
        assert_eq!(block.labels, vec!["allies"]);
        assert_eq!(block.body.len(), 1);
    }

    #[test]
    fn test_bare_word_and_bare_value() {
        let stmts = parse("conditions {\n  not_self\n  \"text\"\n}");
        let Statement::Block(block) = &stmts[0] else {
            panic!("expected block");
        };
        assert_eq!(
            block.body[0],
            Statement::Bare(Bare {
                value: Value::ident("not_self"),
                span: block.body[0].span().clone(),
            })
        );
        assert!(matches!(&block.body[1], Statement::Bare(b) if b.value == Value::string("text")));
    }

    #[test]
    fn test_predicate_and_in() {
        let stmts = parse("pressure.conflict >= 40\nera in [dawn dusk]\nkind in npc faction");
        assert!(matches!(
            &stmts[0],
            Statement::Predicate(p) if p.subject == "pressure.conflict" && p.operator == ">=" && p.value == Value::Number(40.0)
        ));
        assert!(matches!(&stmts[1], Statement::In(i) if i.subject == "era"));
        let Statement::In(membership) = &stmts[2] else {
            panic!("expected in");
        };
        assert_eq!(membership.value.items().len(), 2);
    }

    #[test]
    fn test_rel_statement() {
        let stmt = only("rel ally_of hero -> target strength 0.5 bidirectional true");
        let Statement::Rel(rel) = stmt else {
            panic!("expected rel");
        };
        assert_eq!(rel.kind, "ally_of");
        assert_eq!(rel.src, "hero");
        assert_eq!(rel.dst, "target");
        assert_eq!(
            rel.options,
            vec![
                ("strength".to_string(), Value::Number(0.5)),
                ("bidirectional".to_string(), Value::Boolean(true)),
            ]
        );
    }

    #[test]
    fn test_mutate_and_from() {
        let stmts = parse("mutate pressure.conflict += 5\nfrom actor via member_of direction src");
        assert!(matches!(
            &stmts[0],
            Statement::Mutate(m) if m.target == "pressure.conflict" && m.operator == "+=" && m.value == Value::Number(5.0)
        ));
        let Statement::From(from) = &stmts[1] else {
            panic!("expected from");
        };
        assert_eq!(from.source, "actor");
        assert_eq!(from.options.len(), 2);
    }

    #[test]
    fn test_values() {
        let stmt = only(
            "value [1, -2.5 \"x\"\n  true null] [{ a: 1, b: [x y] }] join(var.names, \", \") >=",
        );
        let Statement::Attribute(attr) = stmt else {
            panic!("expected attribute");
        };
        let items = attr.value.items();
        assert_eq!(
            items[0],
            Value::Array(vec![
                Value::Number(1.0),
                Value::Number(-2.5),
                Value::string("x"),
                Value::Boolean(true),
                Value::Null,
            ])
        );
        let Value::Array(nested) = &items[1] else {
            panic!("expected array");
        };
        assert!(matches!(&nested[0], Value::Object(e) if e.len() == 2));
        assert!(matches!(&items[2], Value::Call { name, args } if name == "join" && args.len() == 2));
        assert_eq!(items[3], Value::ident(">="));
    }

    #[test]
    fn test_strings() {
        let stmt = only(r#"description "say \"hi\"\n""#);
        let Statement::Attribute(attr) = stmt else {
            panic!("expected attribute");
        };
        assert_eq!(attr.value, Value::string("say \"hi\"\n"));

        let stmt = only("content \"\"\"\n    # Title\n      body\n    \"\"\"");
        let Statement::Attribute(attr) = stmt else {
            panic!("expected attribute");
        };
        assert_eq!(attr.value, Value::string("# Title\n  body"));

        let stmt = only("name \"\"");
        assert!(matches!(stmt, Statement::Attribute(a) if a.value == Value::string("")));
    }

    #[test]
    fn test_comments_and_separators() {
        let stmts = parse("# header\ntag brave; tag bold // trailing\n\n// end");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_spans() {
        let stmts = parse("\n\nera dawn {\n  summary \"x\"\n}\n");
        let span = stmts[0].span();
        assert_eq!(span.file, "test.wd");
        assert_eq!(span.start.line, 3);
        assert_eq!(span.start.column, 1);
        assert_eq!(span.end.line, 5);
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse_source("era dawn {\n  summary \"x\"\n", "bad.wd").unwrap_err();
        assert!(err.message.contains("closing '}'"), "{}", err.message);
        assert_eq!(err.span.unwrap().file, "bad.wd");
    }

    #[test]
    fn test_unclosed_string() {
        let err = parse_source("name \"oops\nnext 1", "bad.wd").unwrap_err();
        assert!(err.message.contains("closing '\"'"));
        assert_eq!(err.span.unwrap().start.line, 1);
    }

    #[test]
    fn test_unmatched_brace() {
        let err = parse_source("tag a\n}", "bad.wd").unwrap_err();
        assert_eq!(err.span.unwrap().start.line, 2);
    }

    #[test]
    fn test_bad_rel() {
        let err = parse_source("rel ally_of a b", "bad.wd").unwrap_err();
        assert!(err.message.contains("'->'"));
    }

    #[test]
    fn test_default_parser_trait() {
        let parser = DefaultParser;
        let stmts = parser.parse("project demo {}", "p.wd").unwrap();
        assert!(stmts[0].as_block().is_some());
    }
}
