//! Inheritance combination and post-resolution checks
//!
//! Resolution runs in two stages. `combine` walks parent edges only and merges
//! declarations field by field; `finalize` then applies defaults and the
//! cross-entity checks (inverses, companions, containment) against the
//! combined form of other entities, so mutually-referencing entities never
//! recurse into each other's finalization.

use indexmap::IndexMap;
use relmodel_core_types::{EntityId, PropertyId};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use super::declaration::{
    Accessors, Cardinality, CloneStrategy, EmbeddingRule, EntityDecl, PropertyDecl,
};
use super::descriptor::{EntityDescriptor, PropertyDescriptor};
use crate::clone::expr::Expr;
use crate::convert::ConverterTable;
use crate::errors::{ModelError, Result};
use crate::value::ValueType;

/// A field value together with the entity whose declaration supplied it
#[derive(Debug, Clone)]
pub(crate) struct Defined<T> {
    pub value: T,
    pub by: EntityId,
}

fn value_of<T: Clone>(field: &Option<Defined<T>>) -> Option<T> {
    field.as_ref().map(|d| d.value.clone())
}

#[derive(Debug, Clone)]
pub(crate) struct CombinedProperty {
    pub id: PropertyId,
    pub declared_by: EntityId,
    pub cardinality: Option<Defined<Cardinality>>,
    pub value_type: Option<Defined<ValueType>>,
    pub inverse: Option<Defined<PropertyId>>,
    pub default: Option<Defined<String>>,
    pub clone: Option<Defined<CloneStrategy>>,
    pub clone_after: Option<Defined<Vec<PropertyId>>>,
    pub embed: Option<Defined<EmbeddingRule>>,
    pub delete_embed: Option<Defined<EmbeddingRule>>,
    pub tag: Option<Defined<String>>,
    pub derived: Option<Defined<bool>>,
    pub read_only: Option<Defined<bool>>,
    pub transient: Option<Defined<bool>>,
    pub exclude_from_equality: Option<Defined<bool>>,
    pub allow_duplicates: Option<Defined<bool>>,
    pub accessors: Option<Defined<Accessors>>,
}

impl CombinedProperty {
    fn cardinality(&self) -> Cardinality {
        value_of(&self.cardinality).unwrap_or(Cardinality::Single)
    }

    fn target_entity(&self) -> Option<EntityId> {
        value_of(&self.value_type).and_then(|t| t.target_entity().cloned())
    }

    fn embeds(&self) -> bool {
        self.embed
            .as_ref()
            .map(|d| !d.value.is_none())
            .unwrap_or(false)
    }
}

/// Entity with inheritance merged but no defaults or cross-entity checks applied
#[derive(Debug)]
pub(crate) struct CombinedEntity {
    pub id: EntityId,
    pub parents: Vec<EntityId>,
    pub ancestors: BTreeSet<EntityId>,
    pub lineage: Vec<EntityId>,
    pub is_abstract: bool,
    pub requires_initializer: bool,
    pub properties: IndexMap<PropertyId, CombinedProperty>,
}

macro_rules! combine_fields {
    (
        $resolver:expr, $entity:expr, $pid:expr, $own:expr, $inherited:expr;
        $($field:ident),+ $(,)?
    ) => {
        CombinedProperty {
            id: $pid.clone(),
            declared_by: $inherited
                .first()
                .map(|p| p.declared_by.clone())
                .unwrap_or_else(|| $entity.clone()),
            $(
                $field: $resolver.combine_field(
                    $entity,
                    $pid,
                    stringify!($field),
                    $own.and_then(|d: &PropertyDecl| d.$field.clone()),
                    $inherited.iter().filter_map(|p| p.$field.as_ref()).collect(),
                )?,
            )+
        }
    };
}

/// Resolution state shared across one registry's lifetime
pub(crate) struct Resolver<'a> {
    decls: &'a IndexMap<EntityId, EntityDecl>,
    combined: &'a mut HashMap<EntityId, Arc<CombinedEntity>>,
    stack: Vec<EntityId>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        decls: &'a IndexMap<EntityId, EntityDecl>,
        combined: &'a mut HashMap<EntityId, Arc<CombinedEntity>>,
    ) -> Self {
        Self {
            decls,
            combined,
            stack: Vec::new(),
        }
    }

    /// Merge an entity's declaration with its (recursively combined) parents
    pub fn combine(&mut self, id: &EntityId) -> Result<Arc<CombinedEntity>> {
        if let Some(done) = self.combined.get(id) {
            return Ok(done.clone());
        }
        if self.stack.contains(id) {
            return Err(ModelError::InheritanceCycle { entity: id.clone() });
        }
        let decls = self.decls;
        let decl = decls
            .get(id)
            .ok_or_else(|| ModelError::UnknownEntity { entity: id.clone() })?;

        self.stack.push(id.clone());
        let result = self.combine_decl(decl);
        self.stack.pop();

        let combined = Arc::new(result?);
        self.combined.insert(id.clone(), combined.clone());
        Ok(combined)
    }

    fn combine_decl(&mut self, decl: &EntityDecl) -> Result<CombinedEntity> {
        let mut parents = Vec::with_capacity(decl.parents.len());
        for parent in &decl.parents {
            parents.push(self.combine(parent)?);
        }

        let mut ancestors = BTreeSet::new();
        let mut lineage: Vec<EntityId> = Vec::new();
        for parent in &parents {
            ancestors.insert(parent.id.clone());
            ancestors.extend(parent.ancestors.iter().cloned());
            for e in &parent.lineage {
                if !lineage.contains(e) {
                    lineage.push(e.clone());
                }
            }
        }
        lineage.push(decl.id.clone());

        let mut seen_own = HashSet::new();
        for own in &decl.properties {
            if !seen_own.insert(&own.id) {
                return Err(ModelError::DuplicateProperty {
                    entity: decl.id.clone(),
                    property: own.id.clone(),
                });
            }
        }

        let mut order: Vec<PropertyId> = Vec::new();
        for parent in &parents {
            for pid in parent.properties.keys() {
                if !order.contains(pid) {
                    order.push(pid.clone());
                }
            }
        }
        for own in &decl.properties {
            if !order.contains(&own.id) {
                order.push(own.id.clone());
            }
        }

        let mut properties = IndexMap::with_capacity(order.len());
        for pid in order {
            let own = decl.own_property(pid.as_str());
            let inherited: Vec<&CombinedProperty> = parents
                .iter()
                .filter_map(|p| p.properties.get(&pid))
                .collect();
            let property = combine_fields!(self, &decl.id, &pid, own, inherited;
                cardinality, value_type, inverse, default, clone, clone_after,
                embed, delete_embed, tag, derived, read_only, transient,
                exclude_from_equality, allow_duplicates, accessors,
            );
            properties.insert(pid, property);
        }

        Ok(CombinedEntity {
            id: decl.id.clone(),
            parents: decl.parents.clone(),
            ancestors,
            lineage,
            is_abstract: decl.is_abstract,
            requires_initializer: decl.requires_initializer
                || parents.iter().any(|p| p.requires_initializer),
            properties,
        })
    }

    /// Pick the authoritative definition of one field
    ///
    /// An own declaration rules. Otherwise a definition made by a descendant
    /// of another defining ancestor overrides it; any remaining disagreement
    /// is a conflict.
    fn combine_field<T: Clone + PartialEq>(
        &self,
        entity: &EntityId,
        property: &PropertyId,
        field: &'static str,
        own: Option<T>,
        inherited: Vec<&Defined<T>>,
    ) -> Result<Option<Defined<T>>> {
        if let Some(value) = own {
            return Ok(Some(Defined {
                value,
                by: entity.clone(),
            }));
        }

        let mut candidates: Vec<&Defined<T>> = Vec::new();
        for d in inherited {
            if !candidates.iter().any(|c| c.by == d.by) {
                candidates.push(d);
            }
        }

        let survivors: Vec<&Defined<T>> = candidates
            .iter()
            .copied()
            .filter(|c| {
                !candidates
                    .iter()
                    .any(|d| d.by != c.by && self.descends(&d.by, &c.by))
            })
            .collect();

        let Some(first) = survivors.first() else {
            return Ok(None);
        };
        if let Some(other) = survivors.iter().find(|d| d.value != first.value) {
            return Err(ModelError::InheritanceConflict {
                entity: entity.clone(),
                property: property.clone(),
                field,
                first: first.by.clone(),
                second: other.by.clone(),
            });
        }
        Ok(Some((*first).clone()))
    }

    fn descends(&self, entity: &EntityId, ancestor: &EntityId) -> bool {
        self.combined
            .get(entity)
            .map(|c| c.ancestors.contains(ancestor))
            .unwrap_or(false)
    }

    /// Either entity is-a the other
    fn related(&mut self, a: &EntityId, b: &EntityId) -> Result<bool> {
        if a == b {
            return Ok(true);
        }
        let ca = self.combine(a)?;
        let cb = self.combine(b)?;
        Ok(ca.ancestors.contains(b) || cb.ancestors.contains(a))
    }

    /// Build the canonical descriptor for an entity
    pub fn finalize(
        &mut self,
        id: &EntityId,
        converters: &ConverterTable,
    ) -> Result<EntityDescriptor> {
        let entity = self.combine(id)?;

        let mut properties = IndexMap::with_capacity(entity.properties.len());
        for cp in entity.properties.values() {
            let pd = self.finalize_property(&entity, cp, converters)?;
            properties.insert(pd.id.clone(), pd);
        }

        check_clone_after(&entity.id, &properties)?;
        check_tags(&entity.id, &properties)?;
        if !entity.is_abstract {
            check_list_accessors(&entity.id, &properties)?;
        }
        let clone_order = clone_order(&entity.id, &properties)?;

        Ok(EntityDescriptor::new(
            entity.id.clone(),
            entity.parents.clone(),
            entity.ancestors.clone(),
            entity.lineage.clone(),
            entity.is_abstract,
            entity.requires_initializer,
            properties,
            clone_order,
        ))
    }

    fn finalize_property(
        &mut self,
        entity: &CombinedEntity,
        cp: &CombinedProperty,
        converters: &ConverterTable,
    ) -> Result<PropertyDescriptor> {
        let eid = &entity.id;
        let pid = &cp.id;

        let value_type =
            value_of(&cp.value_type).ok_or_else(|| ModelError::MissingValueType {
                entity: eid.clone(),
                property: pid.clone(),
            })?;
        let cardinality = cp.cardinality();
        let target = value_type.target_entity().cloned();

        let embed = value_of(&cp.embed).unwrap_or_default();
        let delete_embed = value_of(&cp.delete_embed).unwrap_or_else(|| embed.clone());
        for rule in [&embed, &delete_embed] {
            self.check_embedding(eid, pid, target.as_ref(), rule)?;
        }

        let (inverse, partner) = self.resolve_inverse(entity, cp, target.as_ref())?;

        let explicit_derived = value_of(&cp.derived);
        let derived = match (&inverse, &partner) {
            (Some(q), Some(qp))
                if cardinality == Cardinality::Single
                    && qp.cardinality() == Cardinality::Single =>
            {
                let target_id = target.as_ref().unwrap_or(eid);
                single_pair_derived(
                    eid,
                    pid,
                    target_id,
                    q,
                    explicit_derived,
                    value_of(&qp.derived),
                )?
            }
            _ => explicit_derived.unwrap_or(false),
        };

        let container = cardinality == Cardinality::Single
            && partner.as_ref().map(|qp| qp.embeds()).unwrap_or(false);

        let clone = value_of(&cp.clone).unwrap_or_else(|| {
            if derived || container {
                CloneStrategy::Ignore
            } else if target.is_some() && !embed.is_none() {
                CloneStrategy::Clone
            } else if target.is_some() {
                CloneStrategy::Reference
            } else {
                CloneStrategy::Clone
            }
        });
        let clone_expr = match &clone {
            CloneStrategy::Custom(src) => {
                if cardinality == Cardinality::List {
                    return Err(ModelError::InvalidCloneStrategy {
                        entity: eid.clone(),
                        property: pid.clone(),
                        reason: "custom expressions apply to single-valued properties only"
                            .to_string(),
                    });
                }
                Some(
                    Expr::parse(src).map_err(|reason| ModelError::MalformedExpression {
                        entity: eid.clone(),
                        property: pid.clone(),
                        reason,
                    })?,
                )
            }
            _ => None,
        };

        let default_text = value_of(&cp.default);
        let default_value = match &default_text {
            None => None,
            Some(_) if target.is_some() || cardinality == Cardinality::List => {
                return Err(ModelError::MalformedDefault {
                    entity: eid.clone(),
                    property: pid.clone(),
                    reason: "entity-typed and list properties cannot declare a default"
                        .to_string(),
                });
            }
            Some(text) => Some(converters.from_text(&value_type, text).map_err(|e| {
                ModelError::MalformedDefault {
                    entity: eid.clone(),
                    property: pid.clone(),
                    reason: e.to_string(),
                }
            })?),
        };

        Ok(PropertyDescriptor {
            id: pid.clone(),
            declared_by: cp.declared_by.clone(),
            cardinality,
            value_type,
            inverse,
            embed,
            delete_embed,
            clone,
            clone_expr,
            clone_after: value_of(&cp.clone_after).unwrap_or_default(),
            derived,
            container,
            read_only: value_of(&cp.read_only).unwrap_or(false),
            transient: value_of(&cp.transient).unwrap_or(false),
            exclude_from_equality: value_of(&cp.exclude_from_equality).unwrap_or(false),
            allow_duplicates: value_of(&cp.allow_duplicates).unwrap_or(false),
            accessors: value_of(&cp.accessors).unwrap_or_default(),
            default_text,
            default_value,
            tag: value_of(&cp.tag),
        })
    }

    fn check_embedding(
        &mut self,
        eid: &EntityId,
        pid: &PropertyId,
        target: Option<&EntityId>,
        rule: &EmbeddingRule,
    ) -> Result<()> {
        if rule.is_none() {
            return Ok(());
        }
        let Some(target) = target else {
            return Err(ModelError::InvalidEmbedding {
                entity: eid.clone(),
                property: pid.clone(),
                reason: "only entity-typed properties can embed".to_string(),
            });
        };
        let target_entity = self.combine(target)?;
        for companion in rule.companions() {
            if !target_entity.properties.contains_key(companion) {
                return Err(ModelError::UnknownPropertyReference {
                    entity: eid.clone(),
                    property: pid.clone(),
                    referenced: companion.clone(),
                });
            }
        }
        Ok(())
    }

    /// Resolve the inverse of `cp`, returning its id and combined partner
    ///
    /// A property without a declared inverse adopts one when a property of
    /// its target entity names it as inverse.
    fn resolve_inverse(
        &mut self,
        entity: &CombinedEntity,
        cp: &CombinedProperty,
        target: Option<&EntityId>,
    ) -> Result<(Option<PropertyId>, Option<CombinedProperty>)> {
        let eid = &entity.id;
        let pid = &cp.id;

        match value_of(&cp.inverse) {
            Some(q) => {
                let Some(target) = target else {
                    return Err(ModelError::InverseMismatch {
                        entity: eid.clone(),
                        property: pid.clone(),
                        reason: "inverse declared on a scalar property".to_string(),
                    });
                };
                let target_entity = self.combine(target)?;
                let partner = target_entity.properties.get(&q).cloned().ok_or_else(|| {
                    ModelError::DanglingInverse {
                        entity: eid.clone(),
                        property: pid.clone(),
                        inverse: q.clone(),
                        target: target.clone(),
                    }
                })?;
                if let Some(back) = value_of(&partner.inverse) {
                    if &back != pid {
                        return Err(ModelError::InverseMismatch {
                            entity: eid.clone(),
                            property: pid.clone(),
                            reason: format!("{}.{} names {} as its inverse", target, q, back),
                        });
                    }
                }
                let Some(back_target) = partner.target_entity() else {
                    return Err(ModelError::InverseMismatch {
                        entity: eid.clone(),
                        property: pid.clone(),
                        reason: format!("{}.{} is not entity-typed", target, q),
                    });
                };
                if !self.related(eid, &back_target)? {
                    return Err(ModelError::InverseMismatch {
                        entity: eid.clone(),
                        property: pid.clone(),
                        reason: format!(
                            "{}.{} refers to unrelated entity {}",
                            target, q, back_target
                        ),
                    });
                }
                Ok((Some(q), Some(partner)))
            }
            None => {
                let Some(target) = target else {
                    return Ok((None, None));
                };
                let target_entity = self.combine(target)?;
                for candidate in target_entity.properties.values() {
                    if value_of(&candidate.inverse).as_ref() != Some(pid) {
                        continue;
                    }
                    if let Some(back_target) = candidate.target_entity() {
                        if self.related(eid, &back_target)? {
                            return Ok((Some(candidate.id.clone()), Some(candidate.clone())));
                        }
                    }
                }
                Ok((None, None))
            }
        }
    }
}

/// Decide whether `pid` is the derived side of a SINGLE/SINGLE inverse pair
fn single_pair_derived(
    eid: &EntityId,
    pid: &PropertyId,
    target: &EntityId,
    q: &PropertyId,
    own: Option<bool>,
    partner: Option<bool>,
) -> Result<bool> {
    match (own, partner) {
        (Some(true), Some(true)) => Err(ModelError::AmbiguousDerivation {
            entity: eid.clone(),
            property: pid.clone(),
            inverse: q.clone(),
        }),
        (Some(own), _) => Ok(own),
        (None, Some(true)) => Ok(false),
        (None, Some(false)) => Ok(true),
        (None, None) => {
            if pid == q {
                // self-inverse never derived; otherwise the entity id breaks the tie
                Ok(eid != target && eid > target)
            } else {
                Ok(pid > q)
            }
        }
    }
}

fn check_clone_after(
    eid: &EntityId,
    properties: &IndexMap<PropertyId, PropertyDescriptor>,
) -> Result<()> {
    for pd in properties.values() {
        for dep in &pd.clone_after {
            if !properties.contains_key(dep) {
                return Err(ModelError::UnknownPropertyReference {
                    entity: eid.clone(),
                    property: pd.id.clone(),
                    referenced: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

fn check_tags(eid: &EntityId, properties: &IndexMap<PropertyId, PropertyDescriptor>) -> Result<()> {
    let mut seen: HashMap<&str, &PropertyId> = HashMap::new();
    for pd in properties.values() {
        if let Some(tag) = &pd.tag {
            if let Some(first) = seen.insert(tag.as_str(), &pd.id) {
                return Err(ModelError::DuplicateSerializationTag {
                    entity: eid.clone(),
                    tag: tag.clone(),
                    first: first.clone(),
                    second: pd.id.clone(),
                });
            }
        }
    }
    Ok(())
}

fn check_list_accessors(
    eid: &EntityId,
    properties: &IndexMap<PropertyId, PropertyDescriptor>,
) -> Result<()> {
    for pd in properties.values().filter(|p| p.is_list()) {
        let missing = if !pd.accessors.add {
            Some("add")
        } else if !pd.accessors.remove {
            Some("remove")
        } else {
            None
        };
        if let Some(accessor) = missing {
            return Err(ModelError::MissingAccessor {
                entity: eid.clone(),
                property: pd.id.clone(),
                accessor,
            });
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Declaration order, with every property placed after its clone-after dependencies
fn clone_order(
    eid: &EntityId,
    properties: &IndexMap<PropertyId, PropertyDescriptor>,
) -> Result<Vec<PropertyId>> {
    fn visit(
        eid: &EntityId,
        pid: &PropertyId,
        properties: &IndexMap<PropertyId, PropertyDescriptor>,
        marks: &mut HashMap<PropertyId, Mark>,
        order: &mut Vec<PropertyId>,
    ) -> Result<()> {
        match marks.get(pid) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(ModelError::CloneOrderCycle {
                    entity: eid.clone(),
                    property: pid.clone(),
                })
            }
            None => {}
        }
        marks.insert(pid.clone(), Mark::Visiting);
        if let Some(pd) = properties.get(pid) {
            for dep in &pd.clone_after {
                visit(eid, dep, properties, marks, order)?;
            }
        }
        marks.insert(pid.clone(), Mark::Done);
        order.push(pid.clone());
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut order = Vec::with_capacity(properties.len());
    for pid in properties.keys() {
        visit(eid, pid, properties, &mut marks, &mut order)?;
    }
    Ok(order)
}
