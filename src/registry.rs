//! Resource registry
//!
//! Index of every labeled resource block by its id label. The same name may
//! exist under several kinds (a culture and a tag both called `north`);
//! callers resolve `<name>.id` references with an allowed-kind filter and
//! exactly one entry must survive it.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::ast::Block;
use crate::diagnostics::{suggest, with_suggestion, SourceSpan};
use crate::error::ResolveError;

/// Kinds of block that register a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    EntityKind,
    RelationshipKind,
    Era,
    Culture,
    Axis,
    Tag,
    Pressure,
    Generator,
    Action,
    System,
    SeedEntity,
    NamingDomain,
    Grammar,
    LexemeList,
    NamingProfile,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 15] = [
        ResourceKind::EntityKind,
        ResourceKind::RelationshipKind,
        ResourceKind::Era,
        ResourceKind::Culture,
        ResourceKind::Axis,
        ResourceKind::Tag,
        ResourceKind::Pressure,
        ResourceKind::Generator,
        ResourceKind::Action,
        ResourceKind::System,
        ResourceKind::SeedEntity,
        ResourceKind::NamingDomain,
        ResourceKind::Grammar,
        ResourceKind::LexemeList,
        ResourceKind::NamingProfile,
    ];

    pub fn from_block(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.block_name() == name)
    }

    pub fn block_name(self) -> &'static str {
        match self {
            ResourceKind::EntityKind => "entity_kind",
            ResourceKind::RelationshipKind => "relationship_kind",
            ResourceKind::Era => "era",
            ResourceKind::Culture => "culture",
            ResourceKind::Axis => "axis",
            ResourceKind::Tag => "tag",
            ResourceKind::Pressure => "pressure",
            ResourceKind::Generator => "generator",
            ResourceKind::Action => "action",
            ResourceKind::System => "system",
            ResourceKind::SeedEntity => "seed_entity",
            ResourceKind::NamingDomain => "naming_domain",
            ResourceKind::Grammar => "grammar",
            ResourceKind::LexemeList => "lexeme_list",
            ResourceKind::NamingProfile => "naming_profile",
        }
    }

    /// Label position holding the id (`system <type> <id>`)
    pub fn id_label(self) -> usize {
        match self {
            ResourceKind::System => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.block_name())
    }
}

/// One registered resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceEntry {
    pub name: String,
    pub id: String,
    pub kind: ResourceKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    by_name: BTreeMap<String, Vec<ResourceEntry>>,
}

impl ResourceRegistry {
    /// Index every resource block among `blocks`
    pub fn build<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> Self {
        let mut registry = Self::default();
        for block in blocks {
            let Some(kind) = ResourceKind::from_block(&block.name) else {
                continue;
            };
            if let Some(id) = block.label(kind.id_label()) {
                registry.insert(ResourceEntry {
                    name: id.to_string(),
                    id: id.to_string(),
                    kind,
                    span: block.span.clone(),
                });
            }
        }
        registry
    }

    pub fn insert(&mut self, entry: ResourceEntry) {
        self.by_name
            .entry(entry.name.clone())
            .or_default()
            .push(entry);
    }

    pub fn entries(&self, name: &str) -> &[ResourceEntry] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Resolve `<name>.id` to the single entry whose kind is allowed
    pub fn resolve_reference(
        &self,
        reference: &str,
        allowed: &[ResourceKind],
        suggestion_threshold: f64,
    ) -> Result<&ResourceEntry, ResolveError> {
        let name = reference
            .strip_suffix(".id")
            .filter(|n| !n.is_empty() && !n.contains('.'))
            .ok_or_else(|| ResolveError::NotAReference(reference.to_string()))?;

        let matches: Vec<&ResourceEntry> = self
            .entries(name)
            .iter()
            .filter(|e| allowed.contains(&e.kind))
            .collect();

        match matches.as_slice() {
            [single] => Ok(*single),
            [] => {
                let candidates = self
                    .by_name
                    .iter()
                    .filter(|(_, entries)| entries.iter().any(|e| allowed.contains(&e.kind)))
                    .map(|(n, _)| n.as_str());
                let hint = suggest(name, candidates, suggestion_threshold);
                Err(ResolveError::UnknownResource {
                    name: name.to_string(),
                    allowed: describe_kinds(allowed),
                    hint: with_suggestion(String::new(), hint),
                })
            }
            many => Err(ResolveError::Ambiguous {
                name: name.to_string(),
                matches: many
                    .iter()
                    .map(|e| format!("{} at {}:{}", e.kind, e.span.file, e.span.start.line))
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

fn describe_kinds(kinds: &[ResourceKind]) -> String {
    let names: Vec<&str> = kinds.iter().map(|k| k.block_name()).collect();
    names.join(" or ")
}
