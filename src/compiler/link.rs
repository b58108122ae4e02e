//! Post-pass linkers
//!
//! Run on the sorted configuration. Cross-reference validation checks links
//! between compiled items that no single builder can see:
//!
//! ```text
//! seed_relationship ally_of aldric bran   -> aldric, bran are seed entities
//!                                            ally_of is a relationship kind
//!                                            endpoint kinds fit src/dst
//! seed_entity aldric { kind npc ... }     -> npc is an entity kind, subtype
//!                                            and status declared by npc
//! era { template_weight g 2 }             -> g is a generator (warning)
//! axis { low a; high b }                  -> a, b are tags (warning)
//! tag { conflicts x }                     -> x is a tag (warning)
//! ```
//!
//! Naming resources are attached to their cultures last.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::mapping::{sort_key, Collection, SortKey};
use crate::diagnostics::{suggest, with_suggestion, Diagnostic, DiagnosticCode, Diagnostics, SourceSpan};
use crate::dsl::naming::{CultureNaming, NamingResources};
use crate::model::{CollectionItem, WorldConfig};

// ============================================================================
// Item spans
// ============================================================================

/// Declaration span of every admitted item, keyed by collection and item key
#[derive(Debug, Clone, Default)]
pub struct ItemSpans {
    spans: BTreeMap<(Collection, String), SourceSpan>,
}

/// Uniqueness key of an item: its id, or `kind src -> dst` for collections
/// sorted by endpoints
pub fn item_key<T: CollectionItem>(collection: Collection, item: &T) -> String {
    match sort_key(collection) {
        SortKey::Endpoints => {
            let (kind, src, dst) = item.endpoints();
            format!("{} {} -> {}", kind, src, dst)
        }
        SortKey::Id | SortKey::Unsorted => item.id().to_string(),
    }
}

impl ItemSpans {
    /// Record `key`; returns the earlier span when the key is taken
    pub fn insert(&mut self, collection: Collection, key: String, span: SourceSpan) -> Option<&SourceSpan> {
        use std::collections::btree_map::Entry;
        match self.spans.entry((collection, key)) {
            Entry::Occupied(entry) => Some(&*entry.into_mut()),
            Entry::Vacant(entry) => {
                entry.insert(span);
                None
            }
        }
    }

    pub fn get(&self, collection: Collection, key: &str) -> Option<&SourceSpan> {
        self.spans.get(&(collection, key.to_string()))
    }

    fn span_of<T: CollectionItem>(&self, collection: Collection, item: &T) -> Option<&SourceSpan> {
        self.get(collection, &item_key(collection, item))
    }
}

// ============================================================================
// Cross-reference validation
// ============================================================================

struct Linker<'a> {
    config: &'a WorldConfig,
    spans: &'a ItemSpans,
    threshold: f64,
    diagnostics: &'a mut Diagnostics,
}

impl Linker<'_> {
    fn report(&mut self, code: DiagnosticCode, message: String, span: Option<&SourceSpan>, warning: bool) {
        let diagnostic = if warning {
            Diagnostic::warning(code, message)
        } else {
            Diagnostic::error(code, message)
        };
        self.diagnostics.push(diagnostic.with_span_opt(span));
    }

    fn dangling<'c>(
        &mut self,
        what: &str,
        name: &str,
        candidates: impl IntoIterator<Item = &'c str>,
        context: String,
        span: Option<&SourceSpan>,
    ) {
        let hint = suggest(name, candidates, self.threshold);
        let message = with_suggestion(format!("{} names unknown {} '{}'", context, what, name), hint);
        self.report(DiagnosticCode::DanglingReference, message, span, false);
    }

    fn seed_relationships(&mut self) {
        let config = self.config;
        for rel in &config.seed_relationships {
            let span = self.spans.span_of(Collection::SeedRelationships, rel).cloned();
            let context = format!("seed relationship {} {} -> {}", rel.kind, rel.src, rel.dst);
            let kind = config.relationship_kind(&rel.kind);
            if kind.is_none() {
                let names = config.relationship_kinds.iter().map(|k| k.kind.as_str());
                self.dangling("relationship kind", &rel.kind, names, context.clone(), span.as_ref());
            }
            for (role, endpoint) in [("src", &rel.src), ("dst", &rel.dst)] {
                let Some(entity) = config.seed_entity(endpoint) else {
                    let ids = config.seed_entities.iter().map(|e| e.id.as_str());
                    self.dangling("seed entity", endpoint, ids, context.clone(), span.as_ref());
                    continue;
                };
                let Some(kind) = kind else {
                    continue;
                };
                let allowed = if role == "src" { &kind.src_kinds } else { &kind.dst_kinds };
                if !allowed.is_empty() && !allowed.contains(&entity.kind) {
                    let message = format!(
                        "{}: {} '{}' is a {}, but {} accepts {} kinds {}",
                        context,
                        role,
                        entity.id,
                        entity.kind,
                        kind.kind,
                        role,
                        allowed.join(", ")
                    );
                    self.report(DiagnosticCode::InvalidValue, message, span.as_ref(), false);
                }
            }
        }
    }

    fn seed_entities(&mut self) {
        let config = self.config;
        for entity in &config.seed_entities {
            let span = self.spans.span_of(Collection::SeedEntities, entity).cloned();
            let context = format!("seed entity '{}'", entity.id);
            match config.entity_kind(&entity.kind) {
                None => {
                    let kinds = config.entity_kinds.iter().map(|k| k.kind.as_str());
                    self.dangling("entity kind", &entity.kind, kinds, context.clone(), span.as_ref());
                }
                Some(kind) => {
                    if let Some(subtype) = &entity.subtype {
                        if !kind.subtypes.is_empty() && !kind.subtypes.iter().any(|s| &s.id == subtype) {
                            let ids = kind.subtypes.iter().map(|s| s.id.as_str());
                            let what = format!("{} subtype", kind.kind);
                            self.dangling(&what, subtype, ids, context.clone(), span.as_ref());
                        }
                    }
                    if let Some(status) = &entity.status {
                        if !kind.statuses.is_empty() && !kind.statuses.iter().any(|s| &s.id == status) {
                            let ids = kind.statuses.iter().map(|s| s.id.as_str());
                            let what = format!("{} status", kind.kind);
                            self.dangling(&what, status, ids, context.clone(), span.as_ref());
                        }
                    }
                }
            }
            if let Some(culture) = &entity.culture {
                if !config.cultures.iter().any(|c| &c.id == culture) {
                    let ids = config.cultures.iter().map(|c| c.id.as_str());
                    self.dangling("culture", culture, ids, context, span.as_ref());
                }
            }
        }
    }

    fn eras(&mut self) {
        let config = self.config;
        let generators: BTreeSet<&str> = config.generators.iter().map(|g| g.id.as_str()).collect();
        for era in &config.eras {
            let span = self.spans.span_of(Collection::Eras, era).cloned();
            for generator in era.template_weights.keys() {
                if !generators.contains(generator.as_str()) {
                    let message = format!(
                        "era '{}' weights unknown generator '{}'",
                        era.id, generator
                    );
                    self.report(DiagnosticCode::DanglingReference, message, span.as_ref(), true);
                }
            }
        }
    }

    fn tags(&mut self) {
        let config = self.config;
        let tags: BTreeSet<&str> = config.tag_registry.iter().map(|t| t.tag.as_str()).collect();
        for axis in &config.axis_definitions {
            let span = self.spans.span_of(Collection::Axes, axis).cloned();
            for (end, tag) in [("low", &axis.low_tag), ("high", &axis.high_tag)] {
                let Some(tag) = tag else {
                    continue;
                };
                if !tags.contains(tag.as_str()) {
                    let message = format!("axis '{}' {} tag '{}' is not registered", axis.id, end, tag);
                    self.report(DiagnosticCode::DanglingReference, message, span.as_ref(), true);
                }
            }
        }
        for tag in &config.tag_registry {
            let span = self.spans.span_of(Collection::Tags, tag).cloned();
            for conflict in &tag.conflicts {
                if !tags.contains(conflict.as_str()) {
                    let message = format!("tag '{}' conflicts with unregistered tag '{}'", tag.tag, conflict);
                    self.report(DiagnosticCode::DanglingReference, message, span.as_ref(), true);
                }
            }
        }
    }
}

/// Check links between compiled items, reporting every broken one
pub fn validate_references(
    config: &WorldConfig,
    spans: &ItemSpans,
    threshold: f64,
    diagnostics: &mut Diagnostics,
) {
    let mut linker = Linker {
        config,
        spans,
        threshold,
        diagnostics,
    };
    linker.seed_relationships();
    linker.seed_entities();
    linker.eras();
    linker.tags();
}

// ============================================================================
// Naming
// ============================================================================

/// Attach naming resources to their cultures. A resource whose culture was
/// not compiled is an error.
pub fn attach_naming(
    config: &mut WorldConfig,
    naming: NamingResources,
    threshold: f64,
    diagnostics: &mut Diagnostics,
) {
    let mut attached = 0usize;
    for entry in naming.entries {
        let culture_id = entry.resource.culture_id().to_string();
        let Some(culture) = config.cultures.iter_mut().find(|c| c.id == culture_id) else {
            let hint = suggest(&culture_id, config.cultures.iter().map(|c| c.id.as_str()), threshold);
            diagnostics.error(
                DiagnosticCode::DanglingReference,
                with_suggestion(
                    format!(
                        "{} '{}' belongs to unknown culture '{}'",
                        entry.resource.block_name(),
                        entry.resource.id(),
                        culture_id
                    ),
                    hint,
                ),
                &entry.span,
            );
            continue;
        };
        culture.naming.get_or_insert_with(CultureNaming::default).push(entry.resource);
        attached += 1;
    }
    for naming in config.cultures.iter_mut().filter_map(|c| c.naming.as_mut()) {
        naming.domains.sort_by(|a, b| a.id.cmp(&b.id));
        naming.grammars.sort_by(|a, b| a.id.cmp(&b.id));
        naming.lexeme_lists.sort_by(|a, b| a.id.cmp(&b.id));
        naming.profiles.sort_by(|a, b| a.id.cmp(&b.id));
    }
    debug!(attached, "attached naming resources");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AxisDef, EntityKindDef, RelationshipKindDef, SeedEntity, SeedRelationship, StatusDef, TagDef,
    };

    fn entity(id: &str, kind: &str) -> SeedEntity {
        SeedEntity {
            id: id.into(),
            kind: kind.into(),
            ..SeedEntity::default()
        }
    }

    fn run(config: &WorldConfig) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        validate_references(config, &ItemSpans::default(), 0.8, &mut diagnostics);
        diagnostics
    }

    fn base() -> WorldConfig {
        WorldConfig {
            entity_kinds: vec![
                EntityKindDef {
                    kind: "npc".into(),
                    statuses: vec![StatusDef {
                        id: "alive".into(),
                        name: None,
                        is_terminal: false,
                    }],
                    ..EntityKindDef::default()
                },
                EntityKindDef {
                    kind: "faction".into(),
                    ..EntityKindDef::default()
                },
            ],
            relationship_kinds: vec![RelationshipKindDef {
                kind: "member_of".into(),
                src_kinds: vec!["npc".into()],
                dst_kinds: vec!["faction".into()],
                ..RelationshipKindDef::default()
            }],
            seed_entities: vec![entity("aldric", "npc"), entity("guild", "faction")],
            ..WorldConfig::default()
        }
    }

    #[test]
    fn test_clean_config() {
        let mut config = base();
        config.seed_relationships.push(SeedRelationship {
            kind: "member_of".into(),
            src: "aldric".into(),
            dst: "guild".into(),
            strength: None,
        });
        assert!(run(&config).is_empty());
    }

    #[test]
    fn test_dangling_endpoint_and_kind_restriction() {
        let mut config = base();
        config.seed_relationships.push(SeedRelationship {
            kind: "member_of".into(),
            src: "guild".into(),
            dst: "aldrik".into(),
            strength: None,
        });
        let diags = run(&config);
        let messages: Vec<&str> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(diags.error_count(), 2, "{:?}", messages);
        assert!(messages.iter().any(|m| m.contains("accepts src kinds npc")));
        assert!(messages.iter().any(|m| m.contains("did you mean 'aldric'")));
    }

    #[test]
    fn test_undeclared_status() {
        let mut config = base();
        config.seed_entities[0].status = Some("dead".into());
        let diags = run(&config);
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.iter().next().unwrap().code, DiagnosticCode::DanglingReference);
    }

    #[test]
    fn test_unregistered_tags_warn() {
        let mut config = base();
        config.tag_registry.push(TagDef {
            tag: "brave".into(),
            conflicts: vec!["coward".into()],
            ..TagDef::default()
        });
        config.axis_definitions.push(AxisDef {
            id: "courage".into(),
            low_tag: Some("coward".into()),
            high_tag: Some("brave".into()),
            ..AxisDef::default()
        });
        let diags = run(&config);
        assert_eq!(diags.error_count(), 0);
        assert_eq!(diags.len(), 2);
    }
}
