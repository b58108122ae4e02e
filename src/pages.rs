//! Static page compiler
//!
//! Compiles only `page` blocks, independent of the world schema:
//!
//! ```text
//! page lore_intro {
//!   title "The Northern Reaches"
//!   slug intro
//!   content_file "pages/intro.md"
//!   order 1
//! }
//! ```
//!
//! `content` is inline text; `content_file` names another file of the same
//! compile. Every other field is carried through under its camelCased key.
//! Other top-level blocks are ignored, variables and sets are available.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::ast::{Block, SourceFile, Statement};
use crate::compiler::builders::BlockScope;
use crate::compiler::fields::{block_to_json, camel_case, evaluate_checked};
use crate::config::CompilerOptions;
use crate::diagnostics::{
    duplicate_id_error, missing_field_error, suggest, with_suggestion, Diagnostic,
    DiagnosticCode, Diagnostics, SourceSpan,
};
use crate::eval::{insert_coalescing, EvalContext, VariableTable};
use crate::parser::{DefaultParser, SourceParser};
use crate::registry::ResourceRegistry;
use crate::sets::SetTable;

/// Files with these extensions are page content and never parsed as source
pub const CONTENT_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "html", "htm"];

const PAGE_FIELDS: &[&str] = &["title", "slug", "content", "content_file"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticPage {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    /// Path of the file the content was loaded from
    #[serde(rename = "contentFile", skip_serializing_if = "Option::is_none")]
    pub content_file: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagesOutput {
    pub pages: Option<Vec<StaticPage>>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn compile_static_pages(files: &[SourceFile]) -> PagesOutput {
    compile_static_pages_with(&DefaultParser, files, &CompilerOptions::default())
}

pub fn compile_static_pages_with(
    parser: &dyn SourceParser,
    files: &[SourceFile],
    options: &CompilerOptions,
) -> PagesOutput {
    info!(files = files.len(), "compiling static pages");
    let mut diagnostics = Diagnostics::new();
    let mut statements = Vec::new();
    for file in files.iter().filter(|f| !is_content_file(&f.path)) {
        match parser.parse(&file.content, &file.path) {
            Ok(parsed) => statements.extend(parsed),
            Err(e) => {
                let span = e.span.unwrap_or_else(|| SourceSpan::file_start(&file.path));
                diagnostics.push(Diagnostic::error(DiagnosticCode::SyntaxError, e.message).with_span(span));
            }
        }
    }
    if diagnostics.has_errors() {
        return PagesOutput {
            pages: None,
            diagnostics: diagnostics.into_vec(),
        };
    }

    let (variables, rest) = VariableTable::extract(statements, &mut diagnostics);
    let blocks: Vec<Block> = rest
        .into_iter()
        .filter_map(|stmt| match stmt {
            Statement::Block(block) if block.name == "page" || block.name == "set" => Some(block),
            _ => None,
        })
        .collect();
    let (sets, blocks) = SetTable::extract(blocks, options.suggestion_threshold, &mut diagnostics);
    let mut ctx = EvalContext::new(
        options.clone(),
        variables,
        ResourceRegistry::default(),
        sets,
        diagnostics,
    );

    let index = FileIndex::new(files);
    let mut pages: Vec<StaticPage> = Vec::new();
    let mut seen = BTreeSet::new();
    for block in &blocks {
        let Some(page) = build_page(block, &index, &mut ctx) else {
            continue;
        };
        if !seen.insert(page.id.clone()) {
            ctx.push(duplicate_id_error("pages", &page.id).with_span(block.span.clone()));
            continue;
        }
        debug!(page = %page.id, "compiled page");
        pages.push(page);
    }

    let diagnostics = ctx.into_diagnostics();
    if diagnostics.has_errors() {
        return PagesOutput {
            pages: None,
            diagnostics: diagnostics.into_vec(),
        };
    }
    pages.sort_by(|a, b| a.id.cmp(&b.id));
    info!(pages = pages.len(), "static pages compiled");
    PagesOutput {
        pages: Some(pages),
        diagnostics: diagnostics.into_vec(),
    }
}

fn build_page(block: &Block, files: &FileIndex<'_>, ctx: &mut EvalContext) -> Option<StaticPage> {
    let mut scope = BlockScope::new(block);
    let id = scope.id(0, ctx)?;
    let mut title = None;
    let mut slug = None;
    let mut content = None;
    let mut content_file = None;
    let mut fields = serde_json::Map::new();
    let mut coalesced = BTreeSet::new();

    for stmt in &block.body {
        match stmt {
            Statement::Attribute(attr) => match attr.key.as_str() {
                "title" => scope.text(&mut title, attr, ctx),
                "slug" => scope.text(&mut slug, attr, ctx),
                "content" => scope.text(&mut content, attr, ctx),
                "content_file" => scope.text(&mut content_file, attr, ctx),
                key => match evaluate_checked(&attr.value, ctx, &attr.span) {
                    Some(value) => insert_coalescing(&mut fields, &mut coalesced, &camel_case(key), value),
                    None => scope.fail(),
                },
            },
            Statement::Block(inner) => {
                let before = ctx.diagnostics.error_count();
                let value = block_to_json(inner, ctx);
                scope.check(ctx.diagnostics.error_count() == before);
                insert_coalescing(&mut fields, &mut coalesced, &camel_case(&inner.name), value);
            }
            other => scope.reject(other, PAGE_FIELDS, ctx),
        }
    }

    let Some(title) = title else {
        if scope.ok {
            ctx.push(missing_field_error("title", &format!("page {}", id)).with_span(block.span.clone()));
        }
        return None;
    };

    let (content, content_file) = match (content, content_file) {
        (Some(_), Some(_)) => {
            ctx.error(
                DiagnosticCode::InvalidValue,
                format!("page {} gives both 'content' and 'content_file'", id),
                &block.span,
            );
            return None;
        }
        (Some(text), None) => (text, None),
        (None, Some(path)) => {
            let file = files.find(&path, &block.span, ctx)?;
            (file.content.clone(), Some(file.path.clone()))
        }
        (None, None) => {
            if scope.ok {
                ctx.error(
                    DiagnosticCode::MissingField,
                    format!("page {} needs 'content' or 'content_file'", id),
                    &block.span,
                );
            }
            return None;
        }
    };

    let slug = slug.unwrap_or_else(|| id.clone());
    scope.finish(StaticPage {
        id,
        title,
        slug,
        content,
        content_file,
        fields: fields.into_iter().collect(),
    })
}

// ============================================================================
// Content files
// ============================================================================

pub(crate) fn is_content_file(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| CONTENT_EXTENSIONS.iter().any(|c| c.eq_ignore_ascii_case(e)))
}

/// Lexically normalized `/`-separated path: `.` dropped, `..` applied
fn normalize(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }
    parts.join("/")
}

struct FileIndex<'a> {
    files: Vec<(String, &'a SourceFile)>,
}

impl<'a> FileIndex<'a> {
    fn new(files: &'a [SourceFile]) -> Self {
        Self {
            files: files.iter().map(|f| (normalize(Path::new(&f.path)), f)).collect(),
        }
    }

    fn exact(&self, path: &str) -> Option<&'a SourceFile> {
        self.files.iter().find(|(p, _)| p == path).map(|(_, f)| *f)
    }

    /// Match relative to the declaring file's directory, then verbatim, then
    /// by unique suffix
    fn find(&self, wanted: &str, span: &SourceSpan, ctx: &mut EvalContext) -> Option<&'a SourceFile> {
        let relative = Path::new(&span.file)
            .parent()
            .map(|dir| dir.join(wanted))
            .unwrap_or_else(|| PathBuf::from(wanted));
        if let Some(file) = self.exact(&normalize(&relative)) {
            return Some(file);
        }
        let verbatim = normalize(Path::new(wanted));
        if let Some(file) = self.exact(&verbatim) {
            return Some(file);
        }

        let suffix = format!("/{}", verbatim);
        let matches: Vec<&'a SourceFile> = self
            .files
            .iter()
            .filter(|(p, _)| p.ends_with(&suffix))
            .map(|(_, f)| *f)
            .collect();
        match matches.as_slice() {
            [file] => Some(*file),
            [] => {
                let hint = suggest(
                    &verbatim,
                    self.files.iter().map(|(p, _)| p.as_str()),
                    ctx.options.suggestion_threshold,
                );
                ctx.error(
                    DiagnosticCode::UnknownResource,
                    with_suggestion(format!("content file '{}' is not among the compiled files", wanted), hint),
                    span,
                );
                None
            }
            many => {
                let paths: Vec<&str> = many.iter().map(|f| f.path.as_str()).collect();
                ctx.error(
                    DiagnosticCode::AmbiguousReference,
                    format!("content file '{}' matches several files: {}", wanted, paths.join(", ")),
                    span,
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("./a/b/../c.md")), "a/c.md");
        assert_eq!(normalize(Path::new("/root/x.md")), "root/x.md");
    }

    #[test]
    fn test_content_extension() {
        assert!(is_content_file("pages/intro.MD"));
        assert!(!is_content_file("world/pages.wd"));
    }

    #[test]
    fn test_inline_page_with_extra_fields() {
        let output = compile_static_pages(&[SourceFile::new(
            "site.wd",
            "page about {\n  title \"About\"\n  content \"Hello\"\n  nav_order 2\n}",
        )]);
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        let pages = output.pages.unwrap();
        assert_eq!(pages[0].slug, "about");
        assert_eq!(pages[0].fields.get("navOrder"), Some(&serde_json::json!(2)));
    }
}
