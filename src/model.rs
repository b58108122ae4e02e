//! Compiled configuration records
//!
//! `WorldConfig` is the single value handed to the simulation runtime. It
//! serializes to camelCase JSON. Numbers that happen to be integral are
//! written as integers (`coefficient: 2`, not `2.0`) through the
//! [`num`] family of serializers.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

use crate::binding_context::EntityRef;
use crate::dsl::conditions::{Condition, ProminenceLevel};
use crate::dsl::contract::PressureContract;
use crate::dsl::factors::GrowthFactor;
use crate::dsl::mutations::Mutation;
use crate::dsl::naming::CultureNaming;
use crate::dsl::selection::Selection;
use crate::dsl::semantic_plane::SemanticPlane;

// ============================================================================
// Number serialization
// ============================================================================

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Serialize an integral `f64` as an integer
pub fn num<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < MAX_SAFE_INTEGER {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

pub fn opt_num<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => num(v, serializer),
        None => serializer.serialize_none(),
    }
}

pub fn num_map<S: Serializer>(
    value: &BTreeMap<String, f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(value.len()))?;
    for (k, v) in value {
        map.serialize_entry(k, &crate::eval::number_to_json(*v))?;
    }
    map.end()
}

// ============================================================================
// Collection items
// ============================================================================

/// Identity and ordering of an item inside a configuration collection
pub trait CollectionItem {
    fn id(&self) -> &str;

    fn display_name(&self) -> Option<&str> {
        None
    }

    /// Ordering key for collections sorted by endpoints
    fn endpoints(&self) -> (&str, &str, &str) {
        (self.id(), "", "")
    }
}

macro_rules! collection_item {
    ($ty:ty, $id:ident) => {
        impl CollectionItem for $ty {
            fn id(&self) -> &str {
                &self.$id
            }

            fn display_name(&self) -> Option<&str> {
                self.name.as_deref()
            }
        }
    };
}

// ============================================================================
// Root
// ============================================================================

/// The compiled world configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldConfig {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Extra `project` fields
    #[serde(flatten)]
    pub metadata: BTreeMap<String, JsonValue>,
    pub entity_kinds: Vec<EntityKindDef>,
    pub relationship_kinds: Vec<RelationshipKindDef>,
    pub cultures: Vec<CultureDef>,
    pub tag_registry: Vec<TagDef>,
    pub axis_definitions: Vec<AxisDef>,
    pub pressures: Vec<PressureDef>,
    pub eras: Vec<EraDef>,
    pub generators: Vec<GeneratorDef>,
    pub actions: Vec<ActionDef>,
    pub systems: Vec<SystemDef>,
    pub seed_entities: Vec<SeedEntity>,
    pub seed_relationships: Vec<SeedRelationship>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_config: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub illuminator_config: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution_targets: Option<JsonValue>,
}

/// Root keys a `project` block may not reuse for metadata
pub const RESERVED_ROOT_KEYS: &[&str] = &[
    "id",
    "name",
    "description",
    "version",
    "entityKinds",
    "relationshipKinds",
    "cultures",
    "tagRegistry",
    "axisDefinitions",
    "pressures",
    "eras",
    "generators",
    "actions",
    "systems",
    "seedEntities",
    "seedRelationships",
    "uiConfig",
    "illuminatorConfig",
    "distributionTargets",
];

/// Fields a `project` block contributes to the root
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectRoot {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub metadata: BTreeMap<String, JsonValue>,
}

impl WorldConfig {
    pub fn merge_project(&mut self, project: ProjectRoot) {
        self.id = project.id;
        self.name = project.name;
        self.description = project.description;
        self.version = project.version;
        self.metadata = project.metadata;
    }

    pub fn entity_kind(&self, kind: &str) -> Option<&EntityKindDef> {
        self.entity_kinds.iter().find(|k| k.kind == kind)
    }

    pub fn relationship_kind(&self, kind: &str) -> Option<&RelationshipKindDef> {
        self.relationship_kinds.iter().find(|k| k.kind == kind)
    }

    pub fn seed_entity(&self, id: &str) -> Option<&SeedEntity> {
        self.seed_entities.iter().find(|e| e.id == id)
    }

    /// Total number of items across all collections
    pub fn item_count(&self) -> usize {
        self.entity_kinds.len()
            + self.relationship_kinds.len()
            + self.cultures.len()
            + self.tag_registry.len()
            + self.axis_definitions.len()
            + self.pressures.len()
            + self.eras.len()
            + self.generators.len()
            + self.actions.len()
            + self.systems.len()
            + self.seed_entities.len()
            + self.seed_relationships.len()
    }
}

// ============================================================================
// Kinds
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityKindDef {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub subtypes: Vec<SubtypeDef>,
    pub statuses: Vec<StatusDef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_relationships: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_plane: Option<SemanticPlane>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<JsonValue>,
}

collection_item!(EntityKindDef, kind);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtypeDef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub is_terminal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
    Neutral,
}

impl Polarity {
    pub const NAMES: &'static [&'static str] = &["positive", "negative", "neutral"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "positive" => Some(Polarity::Positive),
            "negative" => Some(Polarity::Negative),
            "neutral" => Some(Polarity::Neutral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipKindDef {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub src_kinds: Vec<String>,
    pub dst_kinds: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polarity: Option<Polarity>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
    pub decay_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symmetric: Option<bool>,
}

collection_item!(RelationshipKindDef, kind);

// ============================================================================
// Cultures, tags, axes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisBias {
    #[serde(serialize_with = "num")]
    pub x: f64,
    #[serde(serialize_with = "num")]
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
    pub z: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CultureDef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Entity kind -> home regions
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub home_regions: BTreeMap<String, Vec<String>>,
    /// Entity kind -> bias on that kind's semantic plane
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub axis_biases: BTreeMap<String, AxisBias>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub naming: Option<CultureNaming>,
}

collection_item!(CultureDef, id);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Legendary,
}

impl Rarity {
    pub const NAMES: &'static [&'static str] = &["common", "uncommon", "rare", "legendary"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "common" => Some(Rarity::Common),
            "uncommon" => Some(Rarity::Uncommon),
            "rare" => Some(Rarity::Rare),
            "legendary" => Some(Rarity::Legendary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDef {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rarity: Option<Rarity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub entity_kinds: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub axis: Option<String>,
}

impl CollectionItem for TagDef {
    fn id(&self) -> &str {
        &self.tag
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisDef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_tag: Option<String>,
}

collection_item!(AxisDef, id);

// ============================================================================
// Pressures and eras
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PressureGrowth {
    pub positive_feedback: Vec<GrowthFactor>,
    pub negative_feedback: Vec<GrowthFactor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PressureDef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(serialize_with = "num")]
    pub initial_value: f64,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
    pub homeostasis: Option<f64>,
    pub growth: PressureGrowth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<PressureContract>,
}

collection_item!(PressureDef, id);

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EraDef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(serialize_with = "num_map")]
    pub template_weights: BTreeMap<String, f64>,
    #[serde(serialize_with = "num_map")]
    pub system_modifiers: BTreeMap<String, f64>,
    pub entry_conditions: Vec<Condition>,
    pub exit_conditions: Vec<Condition>,
    pub entry_effects: Vec<Mutation>,
    pub exit_effects: Vec<Mutation>,
}

collection_item!(EraDef, id);

// ============================================================================
// Generators and actions
// ============================================================================

/// `create <alias> { ... }`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationSpec {
    pub entity_ref: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prominence: Option<ProminenceLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub culture: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement: Option<JsonValue>,
}

/// A relationship a generator creates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipSpec {
    pub kind: String,
    pub src: EntityRef,
    pub dst: EntityRef,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
    pub strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidirectional: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorDef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,
    pub applicability: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
    /// `let` aliases and their selections
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, Selection>,
    pub creation: Vec<CreationSpec>,
    pub relationships: Vec<RelationshipSpec>,
    pub state_updates: Vec<Mutation>,
}

collection_item!(GeneratorDef, id);

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instigator: Option<Selection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeSpec {
    pub mutations: Vec<Mutation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_template: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbabilitySpec {
    #[serde(serialize_with = "num")]
    pub base_success_chance: f64,
    #[serde(serialize_with = "num")]
    pub base_weight: f64,
    #[serde(serialize_with = "num_map")]
    pub pressure_modifiers: BTreeMap<String, f64>,
}

impl Default for ProbabilitySpec {
    fn default() -> Self {
        Self {
            base_success_chance: 1.0,
            base_weight: 1.0,
            pressure_modifiers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub actor: ActorSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Selection>,
    pub outcome: OutcomeSpec,
    pub probability: ProbabilitySpec,
}

collection_item!(ActionDef, id);

// ============================================================================
// Systems and seeds
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemDef {
    pub system_type: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub config: Map<String, JsonValue>,
}

collection_item!(SystemDef, id);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coordinates {
    #[serde(serialize_with = "num")]
    pub x: f64,
    #[serde(serialize_with = "num")]
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
    pub z: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedEntity {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prominence: Option<ProminenceLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub culture: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

collection_item!(SeedEntity, id);

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeedRelationship {
    pub kind: String,
    pub src: String,
    pub dst: String,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
    pub strength: Option<f64>,
}

impl CollectionItem for SeedRelationship {
    fn id(&self) -> &str {
        &self.kind
    }

    fn endpoints(&self) -> (&str, &str, &str) {
        (&self.kind, &self.src, &self.dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_integral_numbers_serialize_as_integers() {
        let pressure = PressureDef {
            id: "conflict".into(),
            initial_value: 10.0,
            homeostasis: Some(0.25),
            ..PressureDef::default()
        };
        let json = serde_json::to_value(&pressure).unwrap();
        assert_eq!(json["initialValue"], json!(10));
        assert_eq!(json["homeostasis"], json!(0.25));
        assert!(json.get("contract").is_none());
    }

    #[test]
    fn test_metadata_flattens_into_root() {
        let mut config = WorldConfig::default();
        let mut metadata = BTreeMap::new();
        metadata.insert("author".to_string(), json!("someone"));
        config.merge_project(ProjectRoot {
            id: "world".into(),
            name: Some("World".into()),
            metadata,
            ..ProjectRoot::default()
        });
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["author"], json!("someone"));
        assert_eq!(json["id"], json!("world"));
        assert_eq!(json["entityKinds"], json!([]));
        assert!(json.get("uiConfig").is_none());
    }

    #[test]
    fn test_seed_relationship_endpoints_order() {
        let mut rels = vec![
            SeedRelationship {
                kind: "ally_of".into(),
                src: "b".into(),
                dst: "a".into(),
                strength: None,
            },
            SeedRelationship {
                kind: "ally_of".into(),
                src: "a".into(),
                dst: "c".into(),
                strength: None,
            },
        ];
        rels.sort_by(|x, y| x.endpoints().cmp(&y.endpoints()));
        assert_eq!(rels[0].src, "a");
    }
}
