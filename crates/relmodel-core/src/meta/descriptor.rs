use indexmap::IndexMap;
use relmodel_core_types::{EntityId, PropertyId};
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::declaration::{Accessors, Cardinality, CloneStrategy, EmbeddingRule};
use crate::clone::expr::Expr;
use crate::value::{Value, ValueType};

/// Canonical, fully-resolved description of one property of one entity
///
/// Immutable once built; shared through the owning [`EntityDescriptor`].
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub id: PropertyId,
    /// Entity that first introduced the property
    pub declared_by: EntityId,
    pub cardinality: Cardinality,
    pub value_type: ValueType,
    pub inverse: Option<PropertyId>,
    pub embed: EmbeddingRule,
    pub delete_embed: EmbeddingRule,
    pub clone: CloneStrategy,
    /// Parsed form of a `CloneStrategy::Custom` expression
    pub clone_expr: Option<Expr>,
    pub clone_after: Vec<PropertyId>,
    /// Mutated only as an inverse side effect
    pub derived: bool,
    /// SINGLE back-reference whose inverse embeds the holder
    pub container: bool,
    pub read_only: bool,
    pub transient: bool,
    pub exclude_from_equality: bool,
    pub allow_duplicates: bool,
    pub accessors: Accessors,
    pub default_text: Option<String>,
    pub default_value: Option<Value>,
    pub tag: Option<String>,
}

impl PropertyDescriptor {
    pub fn is_list(&self) -> bool {
        self.cardinality == Cardinality::List
    }

    pub fn is_single(&self) -> bool {
        self.cardinality == Cardinality::Single
    }

    pub fn is_entity_typed(&self) -> bool {
        self.value_type.is_entity()
    }

    pub fn target_entity(&self) -> Option<&EntityId> {
        self.value_type.target_entity()
    }

    /// Entity-typed with the CLONE strategy
    pub fn is_owned(&self) -> bool {
        self.is_entity_typed() && self.clone == CloneStrategy::Clone
    }

    /// Participates in structural equality, distance and merge
    pub fn is_relevant(&self) -> bool {
        !(self.transient || self.derived || self.container || self.exclude_from_equality)
    }

    /// Value a never-written property reads as
    pub fn initial_value(&self) -> Value {
        match self.cardinality {
            Cardinality::List => Value::List(Vec::new()),
            Cardinality::Single => self.default_value.clone().unwrap_or(Value::Null),
        }
    }
}

/// Canonical description of one entity with inheritance applied
#[derive(Debug)]
pub struct EntityDescriptor {
    pub id: EntityId,
    pub parents: Vec<EntityId>,
    /// Transitive ancestors, excluding the entity itself
    pub ancestors: BTreeSet<EntityId>,
    /// Ancestors first (depth-first over parents), ending with the entity itself
    pub lineage: Vec<EntityId>,
    pub is_abstract: bool,
    pub requires_initializer: bool,
    /// Inherited properties first, in parent order, then newly declared ones
    pub properties: IndexMap<PropertyId, PropertyDescriptor>,
    /// Property visiting order honoring clone-after dependencies
    pub clone_order: Vec<PropertyId>,
    embedded: OnceLock<BTreeSet<EntityId>>,
}

impl EntityDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: EntityId,
        parents: Vec<EntityId>,
        ancestors: BTreeSet<EntityId>,
        lineage: Vec<EntityId>,
        is_abstract: bool,
        requires_initializer: bool,
        properties: IndexMap<PropertyId, PropertyDescriptor>,
        clone_order: Vec<PropertyId>,
    ) -> Self {
        Self {
            id,
            parents,
            ancestors,
            lineage,
            is_abstract,
            requires_initializer,
            properties,
            clone_order,
            embedded: OnceLock::new(),
        }
    }

    pub fn property(&self, id: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(id)
    }

    /// True for the entity itself and every ancestor
    pub fn is_a(&self, entity: &EntityId) -> bool {
        &self.id == entity || self.ancestors.contains(entity)
    }

    pub fn relevant_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.values().filter(|p| p.is_relevant())
    }

    pub fn entity_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.values().filter(|p| p.is_entity_typed())
    }

    pub(crate) fn embedded_cache(&self) -> &OnceLock<BTreeSet<EntityId>> {
        &self.embedded
    }
}

impl PartialEq for EntityDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
