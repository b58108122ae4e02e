//! world-dsl: compiler for the world-building configuration language
//!
//! Source files written in a small block/attribute language describe a
//! procedurally simulated world: entity and relationship kinds, cultures,
//! pressures, eras, generators, actions, systems and seed data. This crate
//! compiles them into one deterministic [`WorldConfig`] plus diagnostics:
//! - AST types and the nom-based default parser
//! - Formatting validator and shorthand expansion
//! - Value evaluation with variables, sets, resource references and functions
//! - Mini-language compilers (factors, conditions, mutations, selections, naming)
//! - Reference binding for generator, action and system bodies
//! - Cross-reference validation
//! - Static page compilation
//! - YAML configuration types and loader
//!
//! Compilation is pure and in-memory: callers pass file contents, nothing is
//! read from disk except by [`ConfigLoader`].

pub mod ast;
pub mod binding_context;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod dsl;
pub mod error;
pub mod eval;
pub mod model;
pub mod pages;
pub mod parser;
pub mod registry;
pub mod sets;
pub mod tokens;
pub mod validator;

// Re-export commonly used types
pub use ast::{Block, SourceFile, Statement, Value};
pub use binding_context::BindingContext;
pub use compiler::{compile_project, compile_project_with, ProjectOutput};
pub use config::loader::ConfigLoader;
pub use config::types::*;
pub use diagnostics::{Diagnostic, DiagnosticCode, Severity, SourceSpan};
pub use error::ParseError;
pub use model::WorldConfig;
pub use pages::{compile_static_pages, compile_static_pages_with, PagesOutput, StaticPage};
pub use parser::{parse_source, DefaultParser, SourceParser};
pub use validator::{ValidationError, ValidationStats};
