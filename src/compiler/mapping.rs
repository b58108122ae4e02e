//! Block mapping table
//!
//! Every top-level block name the compiler accepts has exactly one entry:
//! where its compiled item goes, which labels it takes, how its collection
//! is sorted and which builder compiles it.

use std::fmt;

use super::builders;
use crate::ast::Block;
use crate::eval::EvalContext;
use crate::model::{
    ActionDef, AxisDef, CultureDef, EntityKindDef, EraDef, GeneratorDef, PressureDef,
    ProjectRoot, RelationshipKindDef, SeedEntity, SeedRelationship, SystemDef, TagDef,
};
use serde_json::Value as JsonValue;

/// Compiles one block into its item, reporting problems on the context
pub type Builder = fn(&Block, &mut EvalContext) -> Option<CompiledItem>;

/// Output collections of the configuration root
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    EntityKinds,
    RelationshipKinds,
    Cultures,
    Tags,
    Axes,
    Pressures,
    Eras,
    Generators,
    Actions,
    Systems,
    SeedEntities,
    SeedRelationships,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Collection::EntityKinds => "entityKinds",
            Collection::RelationshipKinds => "relationshipKinds",
            Collection::Cultures => "cultures",
            Collection::Tags => "tagRegistry",
            Collection::Axes => "axisDefinitions",
            Collection::Pressures => "pressures",
            Collection::Eras => "eras",
            Collection::Generators => "generators",
            Collection::Actions => "actions",
            Collection::Systems => "systems",
            Collection::SeedEntities => "seedEntities",
            Collection::SeedRelationships => "seedRelationships",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Singleton {
    Ui,
    Illuminator,
    Distribution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Merged into the configuration root
    Root,
    List(Collection),
    Singleton(Singleton),
    /// Compiled ahead of the other blocks and attached to cultures
    Naming,
    /// `var`, `vars`, `set`: consumed before block compilation
    Declaration,
    /// Only meaningful to the static page compiler
    StaticPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Id,
    /// (kind, src, dst)
    Endpoints,
    Unsorted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelRole {
    pub name: &'static str,
    pub required: bool,
}

const fn required(name: &'static str) -> LabelRole {
    LabelRole {
        name,
        required: true,
    }
}

const fn optional(name: &'static str) -> LabelRole {
    LabelRole {
        name,
        required: false,
    }
}

const ID_NAME: &[LabelRole] = &[required("id"), optional("name")];
const ID_ONLY: &[LabelRole] = &[required("id")];
const NONE: &[LabelRole] = &[];

#[derive(Clone, Copy)]
pub struct BlockMapping {
    pub block: &'static str,
    pub target: Target,
    pub labels: &'static [LabelRole],
    pub sort: SortKey,
    pub builder: Option<Builder>,
}

impl fmt::Debug for BlockMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockMapping")
            .field("block", &self.block)
            .field("target", &self.target)
            .field("sort", &self.sort)
            .finish()
    }
}

/// A compiled top-level item
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledItem {
    Project(ProjectRoot),
    EntityKind(EntityKindDef),
    RelationshipKind(RelationshipKindDef),
    Culture(CultureDef),
    Tag(TagDef),
    Axis(AxisDef),
    Pressure(PressureDef),
    Era(EraDef),
    Generator(GeneratorDef),
    Action(ActionDef),
    System(SystemDef),
    SeedEntity(SeedEntity),
    SeedRelationship(SeedRelationship),
    Singleton(Singleton, JsonValue),
}

const fn list(
    block: &'static str,
    collection: Collection,
    labels: &'static [LabelRole],
    builder: Builder,
) -> BlockMapping {
    BlockMapping {
        block,
        target: Target::List(collection),
        labels,
        sort: SortKey::Id,
        builder: Some(builder),
    }
}

const fn passive(block: &'static str, target: Target, labels: &'static [LabelRole]) -> BlockMapping {
    BlockMapping {
        block,
        target,
        labels,
        sort: SortKey::Unsorted,
        builder: None,
    }
}

pub static MAPPINGS: &[BlockMapping] = &[
    BlockMapping {
        block: "project",
        target: Target::Root,
        labels: ID_NAME,
        sort: SortKey::Unsorted,
        builder: Some(builders::project::build_project),
    },
    list("entity_kind", Collection::EntityKinds, ID_ONLY, builders::kinds::build_entity_kind),
    list(
        "relationship_kind",
        Collection::RelationshipKinds,
        ID_ONLY,
        builders::kinds::build_relationship_kind,
    ),
    list("culture", Collection::Cultures, ID_NAME, builders::kinds::build_culture),
    list("tag", Collection::Tags, ID_ONLY, builders::kinds::build_tag),
    list("axis", Collection::Axes, ID_NAME, builders::kinds::build_axis),
    list("pressure", Collection::Pressures, ID_NAME, builders::pressure::build_pressure),
    list("era", Collection::Eras, ID_NAME, builders::era::build_era),
    list("generator", Collection::Generators, ID_NAME, builders::generator::build_generator),
    list("action", Collection::Actions, ID_NAME, builders::action::build_action),
    list(
        "system",
        Collection::Systems,
        &[required("type"), required("id"), optional("name")],
        builders::system::build_system,
    ),
    list("seed_entity", Collection::SeedEntities, ID_NAME, builders::seeds::build_seed_entity),
    BlockMapping {
        block: "seed_relationship",
        target: Target::List(Collection::SeedRelationships),
        labels: &[required("kind"), required("src"), required("dst")],
        sort: SortKey::Endpoints,
        builder: Some(builders::seeds::build_seed_relationship),
    },
    BlockMapping {
        block: "ui",
        target: Target::Singleton(Singleton::Ui),
        labels: NONE,
        sort: SortKey::Unsorted,
        builder: Some(builders::build_ui),
    },
    BlockMapping {
        block: "illuminator",
        target: Target::Singleton(Singleton::Illuminator),
        labels: NONE,
        sort: SortKey::Unsorted,
        builder: Some(builders::build_illuminator),
    },
    BlockMapping {
        block: "distribution",
        target: Target::Singleton(Singleton::Distribution),
        labels: NONE,
        sort: SortKey::Unsorted,
        builder: Some(builders::build_distribution),
    },
    passive("naming_domain", Target::Naming, ID_ONLY),
    passive("grammar", Target::Naming, ID_ONLY),
    passive("lexeme_list", Target::Naming, ID_ONLY),
    passive("naming_profile", Target::Naming, ID_ONLY),
    passive("var", Target::Declaration, NONE),
    passive("vars", Target::Declaration, NONE),
    passive("set", Target::Declaration, NONE),
    passive("page", Target::StaticPage, ID_ONLY),
];

pub fn lookup(block: &str) -> Option<&'static BlockMapping> {
    MAPPINGS.iter().find(|m| m.block == block)
}

pub fn block_names() -> impl Iterator<Item = &'static str> {
    MAPPINGS.iter().map(|m| m.block)
}

/// Sort key of a list collection
pub fn sort_key(collection: Collection) -> SortKey {
    MAPPINGS
        .iter()
        .find(|m| m.target == Target::List(collection))
        .map(|m| m.sort)
        .unwrap_or(SortKey::Unsorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_block_names_unique() {
        let names: BTreeSet<&str> = block_names().collect();
        assert_eq!(names.len(), MAPPINGS.len());
    }

    #[test]
    fn test_every_collection_has_one_builder() {
        for mapping in MAPPINGS {
            if let Target::List(_) | Target::Root | Target::Singleton(_) = mapping.target {
                assert!(mapping.builder.is_some(), "{} has no builder", mapping.block);
            }
        }
        assert_eq!(sort_key(Collection::SeedRelationships), SortKey::Endpoints);
        assert_eq!(sort_key(Collection::Pressures), SortKey::Id);
    }
}
