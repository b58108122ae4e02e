//! World compiler
//!
//! Turns a set of source files into one [`WorldConfig`]. The pipeline runs in
//! fixed stages; every stage runs to completion and the compile halts between
//! stages once any error has been reported:
//!
//! ```text
//! parse -> validate formatting -> extract variables -> expand shorthand
//!       -> collect blocks -> extract sets -> registry + eval context
//!       -> naming resources -> compile blocks -> sort
//!       -> cross-references -> attach naming -> WorldConfig
//! ```
//!
//! Errors never abort a stage. Each construct that fails reports exactly one
//! diagnostic and its siblings keep compiling, so one run surfaces as many
//! problems as possible.

pub mod builders;
pub mod expand;
pub mod fields;
pub mod link;
pub mod mapping;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ast::{Block, SourceFile, Statement};
use crate::config::CompilerOptions;
use crate::diagnostics::{
    duplicate_id_error, suggest, with_suggestion, Diagnostic, DiagnosticCode, Diagnostics,
    SourceSpan,
};
use crate::dsl::naming::extract_naming_resources;
use crate::eval::{variables, EvalContext, VariableTable};
use crate::model::{CollectionItem, WorldConfig};
use crate::pages::is_content_file;
use crate::parser::{DefaultParser, SourceParser};
use crate::registry::ResourceRegistry;
use crate::sets::SetTable;
use crate::validator::validate_formatting;

use link::{item_key, ItemSpans};
use mapping::{Collection, CompiledItem, Singleton, SortKey, Target};

// ============================================================================
// Output
// ============================================================================

/// Result of one compile: the configuration when no error was reported, and
/// every diagnostic in the order it was found
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectOutput {
    pub config: Option<WorldConfig>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ProjectOutput {
    fn failed(diagnostics: Diagnostics) -> Self {
        Self {
            config: None,
            diagnostics: diagnostics.into_vec(),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

// ============================================================================
// Stages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Parse,
    ValidateFormatting,
    ExtractVariables,
    ExpandShorthand,
    CollectBlocks,
    ExtractSets,
    ExtractNaming,
    CompileBlocks,
    ValidateReferences,
    AttachNaming,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Parse => "parse",
            Stage::ValidateFormatting => "validate_formatting",
            Stage::ExtractVariables => "extract_variables",
            Stage::ExpandShorthand => "expand_shorthand",
            Stage::CollectBlocks => "collect_blocks",
            Stage::ExtractSets => "extract_sets",
            Stage::ExtractNaming => "extract_naming",
            Stage::CompileBlocks => "compile_blocks",
            Stage::ValidateReferences => "validate_references",
            Stage::AttachNaming => "attach_naming",
        })
    }
}

/// Stage checkpoint: true when the compile must stop here
fn halted(stage: Stage, diagnostics: &Diagnostics) -> bool {
    let errors = diagnostics.error_count();
    if errors > 0 {
        warn!(%stage, errors, "compile halted");
        return true;
    }
    debug!(%stage, diagnostics = diagnostics.len(), "stage complete");
    false
}

// ============================================================================
// Entry points
// ============================================================================

/// Compile `files` with the built-in parser and default options
pub fn compile_project(files: &[SourceFile]) -> ProjectOutput {
    compile_project_with(&DefaultParser, files, &CompilerOptions::default())
}

/// Compile `files` with a caller-supplied parser and options
pub fn compile_project_with(
    parser: &dyn SourceParser,
    files: &[SourceFile],
    options: &CompilerOptions,
) -> ProjectOutput {
    info!(files = files.len(), "compiling world");
    let mut diagnostics = Diagnostics::new();

    let statements = parse_files(parser, files, &mut diagnostics);
    if halted(Stage::Parse, &diagnostics) {
        return ProjectOutput::failed(diagnostics);
    }

    validate_formatting(&statements, options, &mut diagnostics);
    if halted(Stage::ValidateFormatting, &diagnostics) {
        return ProjectOutput::failed(diagnostics);
    }

    let (variable_table, statements) = VariableTable::extract(statements, &mut diagnostics);
    if halted(Stage::ExtractVariables, &diagnostics) {
        return ProjectOutput::failed(diagnostics);
    }

    let statements = expand::expand_shorthand(statements, options.suggestion_threshold, &mut diagnostics);
    if halted(Stage::ExpandShorthand, &diagnostics) {
        return ProjectOutput::failed(diagnostics);
    }

    let blocks = collect_blocks(statements, options, &mut diagnostics);
    if halted(Stage::CollectBlocks, &diagnostics) {
        return ProjectOutput::failed(diagnostics);
    }

    let (sets, blocks) = SetTable::extract(blocks, options.suggestion_threshold, &mut diagnostics);
    if halted(Stage::ExtractSets, &diagnostics) {
        return ProjectOutput::failed(diagnostics);
    }

    let registry = ResourceRegistry::build(blocks.iter());
    debug!(resources = registry.len(), sets = sets.len(), "entering evaluation");
    let mut ctx = EvalContext::new(options.clone(), variable_table, registry, sets, diagnostics);
    variables::resolve_all(&mut ctx);

    let (naming, blocks) = extract_naming_resources(blocks, &mut ctx);
    if halted(Stage::ExtractNaming, &ctx.diagnostics) {
        return ProjectOutput::failed(ctx.into_diagnostics());
    }

    let (mut config, spans) = compile_blocks(&blocks, files, &mut ctx);
    let mut diagnostics = ctx.into_diagnostics();
    if halted(Stage::CompileBlocks, &diagnostics) {
        return ProjectOutput::failed(diagnostics);
    }

    sort_collections(&mut config);

    link::validate_references(&config, &spans, options.suggestion_threshold, &mut diagnostics);
    if halted(Stage::ValidateReferences, &diagnostics) {
        return ProjectOutput::failed(diagnostics);
    }

    link::attach_naming(&mut config, naming, options.suggestion_threshold, &mut diagnostics);
    if halted(Stage::AttachNaming, &diagnostics) {
        return ProjectOutput::failed(diagnostics);
    }

    info!(
        items = config.item_count(),
        warnings = diagnostics.len(),
        "world compiled"
    );
    ProjectOutput {
        config: Some(config),
        diagnostics: diagnostics.into_vec(),
    }
}

// ============================================================================
// Front stages
// ============================================================================

fn parse_files(
    parser: &dyn SourceParser,
    files: &[SourceFile],
    diagnostics: &mut Diagnostics,
) -> Vec<Statement> {
    let mut statements = Vec::new();
    for file in files.iter().filter(|f| !is_content_file(&f.path)) {
        match parser.parse(&file.content, &file.path) {
            Ok(parsed) => {
                debug!(file = %file.path, statements = parsed.len(), "parsed");
                statements.extend(parsed);
            }
            Err(e) => {
                let span = e.span.unwrap_or_else(|| SourceSpan::file_start(&file.path));
                diagnostics.push(Diagnostic::error(DiagnosticCode::SyntaxError, e.message).with_span(span));
            }
        }
    }
    statements
}

/// Keep the mapped top-level blocks. Page blocks belong to the static page
/// compiler and are dropped here.
fn collect_blocks(
    statements: Vec<Statement>,
    options: &CompilerOptions,
    diagnostics: &mut Diagnostics,
) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(statements.len());
    for stmt in statements {
        let block = match stmt {
            Statement::Block(block) => block,
            other => {
                diagnostics.error(
                    DiagnosticCode::InvalidStatement,
                    format!("{} statement is not allowed at the top level", other.kind_name()),
                    other.span(),
                );
                continue;
            }
        };
        let Some(mapping) = mapping::lookup(&block.name) else {
            let hint = suggest(&block.name, mapping::block_names(), options.suggestion_threshold);
            diagnostics.error(
                DiagnosticCode::UnknownBlock,
                with_suggestion(format!("unknown block '{}'", block.name), hint),
                &block.span,
            );
            continue;
        };
        match mapping.target {
            Target::StaticPage => continue,
            Target::Declaration => {}
            _ if block.labels.len() > mapping.labels.len() => {
                let roles: Vec<&str> = mapping.labels.iter().map(|r| r.name).collect();
                diagnostics.error(
                    DiagnosticCode::InvalidStatement,
                    format!(
                        "{} takes at most {} label(s) ({}), found {}",
                        block.name,
                        roles.len(),
                        roles.join(", "),
                        block.labels.len()
                    ),
                    &block.span,
                );
                continue;
            }
            _ => {}
        }
        blocks.push(block);
    }
    blocks
}

// ============================================================================
// Block compilation
// ============================================================================

/// Accumulates compiled items, enforcing one project, one of each singleton
/// and unique ids and display names per collection
struct Collector {
    config: WorldConfig,
    spans: ItemSpans,
    names: BTreeMap<(Collection, String), SourceSpan>,
    project: Option<SourceSpan>,
    singletons: Vec<(Singleton, SourceSpan)>,
}

fn location(span: &SourceSpan) -> String {
    format!("{}:{}", span.file, span.start.line)
}

impl Collector {
    fn new() -> Self {
        Self {
            config: WorldConfig::default(),
            spans: ItemSpans::default(),
            names: BTreeMap::new(),
            project: None,
            singletons: Vec::new(),
        }
    }

    /// True when `item` may join `collection`
    fn admit<T: CollectionItem>(
        &mut self,
        collection: Collection,
        item: &T,
        span: &SourceSpan,
        diagnostics: &mut Diagnostics,
    ) -> bool {
        let key = item_key(collection, item);
        if let Some(first) = self.spans.insert(collection, key.clone(), span.clone()) {
            let mut diagnostic = duplicate_id_error(&collection.to_string(), &key).with_span(span.clone());
            diagnostic.message = format!("{} (first declared at {})", diagnostic.message, location(first));
            diagnostics.push(diagnostic);
            return false;
        }
        if let Some(name) = item.display_name() {
            if let Some(first) = self.names.get(&(collection, name.to_string())) {
                diagnostics.error(
                    DiagnosticCode::DuplicateName,
                    format!(
                        "duplicate name '{}' in {} (first declared at {})",
                        name,
                        collection,
                        location(first)
                    ),
                    span,
                );
                return false;
            }
            self.names.insert((collection, name.to_string()), span.clone());
        }
        true
    }

    fn list<T: CollectionItem>(
        &mut self,
        collection: Collection,
        item: T,
        span: &SourceSpan,
        diagnostics: &mut Diagnostics,
        field: impl FnOnce(&mut WorldConfig) -> &mut Vec<T>,
    ) {
        if self.admit(collection, &item, span, diagnostics) {
            field(&mut self.config).push(item);
        }
    }

    fn add(&mut self, item: CompiledItem, span: &SourceSpan, diagnostics: &mut Diagnostics) {
        match item {
            CompiledItem::Project(root) => {
                if let Some(first) = &self.project {
                    diagnostics.error(
                        DiagnosticCode::DuplicateDeclaration,
                        format!("project is declared more than once (first at {})", location(first)),
                        span,
                    );
                    return;
                }
                self.project = Some(span.clone());
                self.config.merge_project(root);
            }
            CompiledItem::Singleton(singleton, value) => {
                if let Some((_, first)) = self.singletons.iter().find(|(s, _)| *s == singleton) {
                    diagnostics.error(
                        DiagnosticCode::DuplicateDeclaration,
                        format!(
                            "{} block is declared more than once (first at {})",
                            singleton_block(singleton),
                            location(first)
                        ),
                        span,
                    );
                    return;
                }
                self.singletons.push((singleton, span.clone()));
                let slot = match singleton {
                    Singleton::Ui => &mut self.config.ui_config,
                    Singleton::Illuminator => &mut self.config.illuminator_config,
                    Singleton::Distribution => &mut self.config.distribution_targets,
                };
                *slot = Some(value);
            }
            CompiledItem::EntityKind(k) => {
                self.list(Collection::EntityKinds, k, span, diagnostics, |config| &mut config.entity_kinds)
            }
            CompiledItem::RelationshipKind(k) => {
                self.list(Collection::RelationshipKinds, k, span, diagnostics, |config| &mut config.relationship_kinds)
            }
            CompiledItem::Culture(c) => {
                self.list(Collection::Cultures, c, span, diagnostics, |config| &mut config.cultures)
            }
            CompiledItem::Tag(t) => {
                self.list(Collection::Tags, t, span, diagnostics, |config| &mut config.tag_registry)
            }
            CompiledItem::Axis(a) => {
                self.list(Collection::Axes, a, span, diagnostics, |config| &mut config.axis_definitions)
            }
            CompiledItem::Pressure(p) => {
                self.list(Collection::Pressures, p, span, diagnostics, |config| &mut config.pressures)
            }
            CompiledItem::Era(e) => {
                self.list(Collection::Eras, e, span, diagnostics, |config| &mut config.eras)
            }
            CompiledItem::Generator(g) => {
                self.list(Collection::Generators, g, span, diagnostics, |config| &mut config.generators)
            }
            CompiledItem::Action(a) => {
                self.list(Collection::Actions, a, span, diagnostics, |config| &mut config.actions)
            }
            CompiledItem::System(s) => {
                self.list(Collection::Systems, s, span, diagnostics, |config| &mut config.systems)
            }
            CompiledItem::SeedEntity(e) => {
                self.list(Collection::SeedEntities, e, span, diagnostics, |config| &mut config.seed_entities)
            }
            CompiledItem::SeedRelationship(r) => {
                self.list(Collection::SeedRelationships, r, span, diagnostics, |config| &mut config.seed_relationships)
            }
        }
    }
}

fn singleton_block(singleton: Singleton) -> &'static str {
    match singleton {
        Singleton::Ui => "ui",
        Singleton::Illuminator => "illuminator",
        Singleton::Distribution => "distribution",
    }
}

fn compile_blocks(blocks: &[Block], files: &[SourceFile], ctx: &mut EvalContext) -> (WorldConfig, ItemSpans) {
    let mut collector = Collector::new();
    let mut project_declared = false;

    for block in blocks {
        let Some(builder) = mapping::lookup(&block.name).and_then(|m| m.builder) else {
            continue;
        };
        project_declared |= block.name == "project";
        match builder(block, ctx) {
            Some(item) => {
                debug!(block = %block.name, labels = ?block.labels, "compiled block");
                collector.add(item, &block.span, &mut ctx.diagnostics);
            }
            None => debug!(block = %block.name, labels = ?block.labels, "block failed"),
        }
    }

    if !project_declared && ctx.options.require_project {
        let diagnostic = Diagnostic::error(
            DiagnosticCode::MissingProject,
            "missing required project block",
        );
        let span = files.first().map(|f| SourceSpan::file_start(&f.path));
        ctx.push(diagnostic.with_span_opt(span.as_ref()));
    }

    if ctx.options.warn_on_unused_variables {
        for entry in ctx.variables.unused() {
            ctx.diagnostics.warning(
                DiagnosticCode::UnusedDeclaration,
                format!("variable '{}' is never used", entry.name),
                &entry.span,
            );
        }
    }

    (collector.config, collector.spans)
}

// ============================================================================
// Sorting
// ============================================================================

fn sort_items<T: CollectionItem>(collection: Collection, items: &mut [T]) {
    match mapping::sort_key(collection) {
        SortKey::Id => items.sort_by(|a, b| a.id().cmp(b.id())),
        SortKey::Endpoints => items.sort_by(|a, b| a.endpoints().cmp(&b.endpoints())),
        SortKey::Unsorted => {}
    }
}

fn sort_collections(config: &mut WorldConfig) {
    sort_items(Collection::EntityKinds, &mut config.entity_kinds);
    sort_items(Collection::RelationshipKinds, &mut config.relationship_kinds);
    sort_items(Collection::Cultures, &mut config.cultures);
    sort_items(Collection::Tags, &mut config.tag_registry);
    sort_items(Collection::Axes, &mut config.axis_definitions);
    sort_items(Collection::Pressures, &mut config.pressures);
    sort_items(Collection::Eras, &mut config.eras);
    sort_items(Collection::Generators, &mut config.generators);
    sort_items(Collection::Actions, &mut config.actions);
    sort_items(Collection::Systems, &mut config.systems);
    sort_items(Collection::SeedEntities, &mut config.seed_entities);
    sort_items(Collection::SeedRelationships, &mut config.seed_relationships);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compile(src: &str) -> ProjectOutput {
        compile_project(&[SourceFile::new("world.wd", src)])
    }

    fn codes(output: &ProjectOutput) -> Vec<DiagnosticCode> {
        output.diagnostics.iter().map(|d| d.code).collect()
    }

    #[test]
    fn test_minimal_world() {
        let output = compile("project demo \"Demo\" {}\nentity_kind npc {}\nentity_kind faction {}");
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        let config = output.config.unwrap();
        assert_eq!(config.id, "demo");
        let kinds: Vec<&str> = config.entity_kinds.iter().map(|k| k.kind.as_str()).collect();
        assert_eq!(kinds, vec!["faction", "npc"]);
    }

    #[test]
    fn test_syntax_error_halts() {
        let output = compile("project demo {");
        assert!(output.config.is_none());
        assert_eq!(codes(&output), vec![DiagnosticCode::SyntaxError]);
    }

    #[test]
    fn test_unknown_block_suggests() {
        let output = compile("project demo {}\npresure conflict {}");
        assert!(output.config.is_none());
        let diag = &output.diagnostics[0];
        assert_eq!(diag.code, DiagnosticCode::UnknownBlock);
        assert!(diag.message.contains("did you mean 'pressure'"));
    }

    #[test]
    fn test_second_project_rejected() {
        let output = compile("project a {}\nproject b {}");
        assert_eq!(codes(&output), vec![DiagnosticCode::DuplicateDeclaration]);
    }

    #[test]
    fn test_duplicate_singleton() {
        let output = compile("project a {}\nui { theme dark }\nui { theme light }");
        assert_eq!(codes(&output), vec![DiagnosticCode::DuplicateDeclaration]);
    }

    #[test]
    fn test_duplicate_display_name() {
        let output = compile("project a {}\nera one \"Dawn\" {}\nera two \"Dawn\" {}");
        assert_eq!(codes(&output), vec![DiagnosticCode::DuplicateName]);
    }

    #[test]
    fn test_unused_variable_warns() {
        let output = compile("project a {}\nvar spare 3");
        assert!(output.config.is_some());
        assert_eq!(codes(&output), vec![DiagnosticCode::UnusedDeclaration]);
    }

    #[test]
    fn test_project_optional_when_configured() {
        let options = CompilerOptions {
            require_project: false,
            ..CompilerOptions::default()
        };
        let output = compile_project_with(&DefaultParser, &[SourceFile::new("w.wd", "tag brave")], &options);
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        assert_eq!(output.config.unwrap().tag_registry.len(), 1);
    }

    #[test]
    fn test_too_many_labels() {
        let output = compile("project a {}\npressure p \"P\" extra {}");
        assert_eq!(codes(&output), vec![DiagnosticCode::InvalidStatement]);
    }

    #[test]
    fn test_compile_errors_keep_siblings() {
        let output = compile("project a {}\npressure p { initial_value 500 }\npressure q { initial_value 900 }");
        assert!(output.config.is_none());
        assert_eq!(codes(&output), vec![DiagnosticCode::InvalidValue, DiagnosticCode::InvalidValue]);
    }
}
