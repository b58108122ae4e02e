//! Static page compilation against in-memory file sets

use pretty_assertions::assert_eq;
use serde_json::json;
use world_dsl::{compile_static_pages, DiagnosticCode, SourceFile};

#[test]
fn test_pages_with_content_files() {
    let files = vec![
        SourceFile::new(
            "site/pages.wd",
            r#"
var site_title "The Frontier"

page lore {
  title "Lore"
  content_file "content/lore.md"
}

page about {
  title var.site_title
  slug about-us
  content "A world of settlers."
  nav_order 2
}

project ignored {}
"#,
        ),
        SourceFile::new("site/content/lore.md", "# Lore\n\nLong ago..."),
    ];
    let output = compile_static_pages(&files);
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    let pages = output.pages.unwrap();
    let ids: Vec<&str> = pages.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["about", "lore"]);

    assert_eq!(
        serde_json::to_value(&pages[0]).unwrap(),
        json!({
            "id": "about",
            "title": "The Frontier",
            "slug": "about-us",
            "content": "A world of settlers.",
            "navOrder": 2
        })
    );
    assert_eq!(pages[1].content, "# Lore\n\nLong ago...");
    assert_eq!(pages[1].content_file.as_deref(), Some("site/content/lore.md"));
}

#[test]
fn test_content_file_suffix_match() {
    let files = vec![
        SourceFile::new("pages.wd", "page intro {\n  title \"Intro\"\n  content_file \"intro.md\"\n}"),
        SourceFile::new("docs/en/intro.md", "hello"),
    ];
    let output = compile_static_pages(&files);
    assert_eq!(output.pages.unwrap()[0].content, "hello");
}

#[test]
fn test_ambiguous_content_file() {
    let files = vec![
        SourceFile::new("pages.wd", "page intro {\n  title \"Intro\"\n  content_file \"intro.md\"\n}"),
        SourceFile::new("en/intro.md", "hello"),
        SourceFile::new("fr/intro.md", "bonjour"),
    ];
    let output = compile_static_pages(&files);
    assert!(output.pages.is_none());
    assert_eq!(output.diagnostics[0].code, DiagnosticCode::AmbiguousReference);
}

#[test]
fn test_missing_content_file() {
    let files = vec![SourceFile::new(
        "pages.wd",
        "page intro {\n  title \"Intro\"\n  content_file \"intro.md\"\n}",
    )];
    let output = compile_static_pages(&files);
    assert!(output.pages.is_none());
    assert_eq!(output.diagnostics[0].code, DiagnosticCode::UnknownResource);
}

#[test]
fn test_page_errors() {
    let output = compile_static_pages(&[SourceFile::new(
        "pages.wd",
        "page a {\n  content \"x\"\n}\npage b {\n  title \"B\"\n  content \"x\"\n  content_file \"b.md\"\n}\npage c {\n  title \"C\"\n  content \"x\"\n}\npage c {\n  title \"C2\"\n  content \"y\"\n}",
    )]);
    assert!(output.pages.is_none());
    let codes: Vec<DiagnosticCode> = output.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(
        codes,
        vec![
            DiagnosticCode::MissingField,
            DiagnosticCode::InvalidValue,
            DiagnosticCode::DuplicateId
        ]
    );
}

#[test]
fn test_pages_ignored_by_world_compile() {
    let output = world_dsl::compile_project(&[SourceFile::new(
        "w.wd",
        "project p {}\npage about {\n  title \"About\"\n  content \"x\"\n}",
    )]);
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert!(output.config.is_some());
}
