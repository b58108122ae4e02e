//! Statement forest produced by the syntactic parser
//!
//! The parser hands the compiler a generic tree: attributes, labeled blocks
//! and a handful of specialised statement shapes (predicates, relationship
//! lines, mutations, membership tests, selection sources). Nothing here knows
//! about pressures or eras; that meaning is assigned by the compiler passes.
//!
//! ## Value forms
//!
//! ```text
//! "text" 12 -0.5 true null       primitives
//! settlement  var.kinds.0        identifiers (var.* = variable lookup)
//! [a b c]                        arrays
//! { key: value }                 objects
//! join(var.names, ", ")          calls
//! ```

use serde::{Deserialize, Serialize};

use crate::diagnostics::SourceSpan;

// =============================================================================
// SOURCE FILES
// =============================================================================

/// One input file: path plus already-read content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

// =============================================================================
// VALUES
// =============================================================================

/// Generic, unevaluated value node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
    /// Bare word. Becomes a variable lookup when it carries a variable prefix,
    /// otherwise evaluates to the literal string.
    Identifier(String),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
    Call { name: String, args: Vec<Value> },
}

impl Value {
    pub fn ident(name: impl Into<String>) -> Self {
        Value::Identifier(name.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Text of a string or identifier
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Identifier(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Value::Identifier(s) => Some(s),
            _ => None,
        }
    }

    /// Human-readable shape name for diagnostics
    pub fn describe(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Null => "null",
            Value::Identifier(_) => "identifier",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Call { .. } => "call",
        }
    }

    /// Items of an array, or the value itself as a one-element slice
    pub fn items(&self) -> &[Value] {
        match self {
            Value::Array(items) => items,
            other => std::slice::from_ref(other),
        }
    }

    /// Render back to DSL source (for messages)
    pub fn to_dsl_string(&self) -> String {
        match self {
            Value::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
            Value::Number(n) => format_number(*n),
            Value::Boolean(b) => b.to_string(),
            Value::Null => "null".to_string(),
            Value::Identifier(name) => name.clone(),
            Value::Array(items) => {
                let inner: Vec<String> = items.iter().map(Value::to_dsl_string).collect();
                format!("[{}]", inner.join(" "))
            }
            Value::Object(entries) => {
                let pairs: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.to_dsl_string()))
                    .collect();
                format!("{{{}}}", pairs.join(", "))
            }
            Value::Call { name, args } => {
                let inner: Vec<String> = args.iter().map(Value::to_dsl_string).collect();
                format!("{}({})", name, inner.join(", "))
            }
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

// =============================================================================
// STATEMENTS
// =============================================================================

/// A single statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Attribute(Attribute),
    Block(Block),
    Bare(Bare),
    Predicate(Predicate),
    Rel(Rel),
    Mutate(Mutate),
    In(InClause),
    From(FromClause),
}

/// `key value...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: Value,
    pub span: SourceSpan,
}

/// `name label... { body }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub labels: Vec<String>,
    pub body: Vec<Statement>,
    pub span: SourceSpan,
}

/// A statement that is only a value (a lone word, string or list)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bare {
    pub value: Value,
    pub span: SourceSpan,
}

/// `subject op value`, e.g. `pressure.conflict >= 40`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub subject: String,
    pub operator: String,
    pub value: Value,
    pub span: SourceSpan,
}

/// `rel kind src -> dst key value...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rel {
    pub kind: String,
    pub src: String,
    pub dst: String,
    pub options: Vec<(String, Value)>,
    pub span: SourceSpan,
}

/// `mutate target op value`, e.g. `mutate pressure.conflict += 5`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutate {
    pub target: String,
    pub operator: String,
    pub value: Value,
    pub span: SourceSpan,
}

/// `subject in value...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InClause {
    pub subject: String,
    pub value: Value,
    pub span: SourceSpan,
}

/// `from source key value...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FromClause {
    pub source: String,
    pub options: Vec<(String, Value)>,
    pub span: SourceSpan,
}

impl Statement {
    pub fn span(&self) -> &SourceSpan {
        match self {
            Statement::Attribute(a) => &a.span,
            Statement::Block(b) => &b.span,
            Statement::Bare(b) => &b.span,
            Statement::Predicate(p) => &p.span,
            Statement::Rel(r) => &r.span,
            Statement::Mutate(m) => &m.span,
            Statement::In(i) => &i.span,
            Statement::From(f) => &f.span,
        }
    }

    /// Statement kind name for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Attribute(_) => "attribute",
            Statement::Block(_) => "block",
            Statement::Bare(_) => "bare value",
            Statement::Predicate(_) => "predicate",
            Statement::Rel(_) => "rel",
            Statement::Mutate(_) => "mutate",
            Statement::In(_) => "in",
            Statement::From(_) => "from",
        }
    }

    /// Leading keyword: attribute key, block name, predicate subject, ...
    pub fn head(&self) -> Option<&str> {
        match self {
            Statement::Attribute(a) => Some(&a.key),
            Statement::Block(b) => Some(&b.name),
            Statement::Bare(b) => b.value.as_identifier(),
            Statement::Predicate(p) => Some(&p.subject),
            Statement::Rel(_) => Some("rel"),
            Statement::Mutate(_) => Some("mutate"),
            Statement::In(i) => Some(&i.subject),
            Statement::From(_) => Some("from"),
        }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Statement::Block(b) => Some(b),
            _ => None,
        }
    }
}

impl Block {
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Attributes with the given key, in order
    pub fn attributes<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Attribute> + 'a {
        self.body.iter().filter_map(move |s| match s {
            Statement::Attribute(a) if a.key == key => Some(a),
            _ => None,
        })
    }

    /// Nested blocks with the given name, in order
    pub fn blocks<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.body.iter().filter_map(move |s| match s {
            Statement::Block(b) if b.name == name => Some(b),
            _ => None,
        })
    }
}

// =============================================================================
// TREE WALKING UTILITIES
// =============================================================================

/// Visitor trait for walking the statement forest
pub trait StatementVisitor {
    fn visit_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Attribute(a) => self.visit_value(&a.value, &a.span),
            Statement::Block(b) => self.visit_block(b),
            Statement::Bare(b) => self.visit_value(&b.value, &b.span),
            Statement::Predicate(p) => self.visit_value(&p.value, &p.span),
            Statement::Rel(r) => {
                for (_, v) in &r.options {
                    self.visit_value(v, &r.span);
                }
            }
            Statement::Mutate(m) => self.visit_value(&m.value, &m.span),
            Statement::In(i) => self.visit_value(&i.value, &i.span),
            Statement::From(f) => {
                for (_, v) in &f.options {
                    self.visit_value(v, &f.span);
                }
            }
        }
    }

    fn visit_block(&mut self, block: &Block) {
        for stmt in &block.body {
            self.visit_statement(stmt);
        }
    }

    fn visit_value(&mut self, value: &Value, span: &SourceSpan) {
        match value {
            Value::Identifier(name) => self.visit_identifier(name, span),
            Value::Array(items) => {
                for item in items {
                    self.visit_value(item, span);
                }
            }
            Value::Object(entries) => {
                for (_, v) in entries {
                    self.visit_value(v, span);
                }
            }
            Value::Call { args, .. } => {
                for arg in args {
                    self.visit_value(arg, span);
                }
            }
            _ => {}
        }
    }

    /// Override to handle identifiers (variable refs, resource refs)
    fn visit_identifier(&mut self, _name: &str, _span: &SourceSpan) {}
}

/// Collect every identifier carrying one of `prefixes`, with its span
pub fn find_prefixed_identifiers(
    statements: &[Statement],
    prefixes: &[String],
) -> Vec<(String, SourceSpan)> {
    struct Collector<'p> {
        prefixes: &'p [String],
        refs: Vec<(String, SourceSpan)>,
    }

    impl StatementVisitor for Collector<'_> {
        fn visit_identifier(&mut self, name: &str, span: &SourceSpan) {
            if self.prefixes.iter().any(|p| name.starts_with(p.as_str())) {
                self.refs.push((name.to_string(), span.clone()));
            }
        }
    }

    let mut collector = Collector {
        prefixes,
        refs: Vec::new(),
    };
    for stmt in statements {
        collector.visit_statement(stmt);
    }
    collector.refs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> SourceSpan {
        SourceSpan::file_start("t.wd")
    }

    #[test]
    fn test_value_helpers() {
        assert_eq!(Value::ident("settlement").as_text(), Some("settlement"));
        assert_eq!(Value::Number(2.0).to_dsl_string(), "2");
        assert_eq!(Value::Number(0.5).to_dsl_string(), "0.5");
        assert_eq!(Value::Null.describe(), "null");
        let arr = Value::Array(vec![Value::ident("a"), Value::ident("b")]);
        assert_eq!(arr.items().len(), 2);
        assert_eq!(Value::ident("a").items().len(), 1);
    }

    #[test]
    fn test_block_accessors() {
        let block = Block {
            name: "pressure".into(),
            labels: vec!["conflict".into()],
            body: vec![
                Statement::Attribute(Attribute {
                    key: "initial_value".into(),
                    value: Value::Number(10.0),
                    span: span(),
                }),
                Statement::Block(Block {
                    name: "growth".into(),
                    labels: vec![],
                    body: vec![],
                    span: span(),
                }),
            ],
            span: span(),
        };
        assert_eq!(block.label(0), Some("conflict"));
        assert_eq!(block.attributes("initial_value").count(), 1);
        assert_eq!(block.blocks("growth").count(), 1);
    }

    #[test]
    fn test_find_prefixed_identifiers() {
        let stmts = vec![Statement::Attribute(Attribute {
            key: "kind".into(),
            value: Value::Array(vec![
                Value::ident("var.main"),
                Value::Call {
                    name: "upper".into(),
                    args: vec![Value::ident("vars.other")],
                },
                Value::ident("plain"),
            ]),
            span: span(),
        })];
        let refs = find_prefixed_identifiers(&stmts, &["var.".to_string(), "vars.".to_string()]);
        let names: Vec<&str> = refs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["var.main", "vars.other"]);
    }
}
