//! Instance dispatcher: every property read and write flows through here
//!
//! Each canonical mutation runs its guards (initialization, cardinality,
//! writability, deletion, value type), stores the value, notifies, records an
//! edit, and keeps the inverse property in sync.

use relmodel_core_types::{InstanceId, PropertyId};

use super::inverse;
use crate::errors::{ModelError, Result};
use crate::graph::{ChangeEvent, ChangeKind, Graph};
use crate::meta::{EntityDescriptor, PropertyDescriptor};
use crate::value::{Value, ValueType};

pub(crate) fn property_of<'e>(
    entity: &'e EntityDescriptor,
    property: &str,
) -> Result<&'e PropertyDescriptor> {
    entity
        .property(property)
        .ok_or_else(|| ModelError::UnknownProperty {
            entity: entity.id.clone(),
            property: PropertyId::from(property),
        })
}

fn is_privileged(graph: &Graph, id: InstanceId) -> Result<bool> {
    Ok(graph.is_privileged() || graph.instance(id)?.flags.deserializing)
}

fn check_readable(graph: &Graph, id: InstanceId) -> Result<()> {
    let flags = &graph.instance(id)?.flags;
    if !flags.initialized && !flags.initializing && !is_privileged(graph, id)? {
        return Err(ModelError::UninitializedState { instance: id });
    }
    Ok(())
}

fn check_writable(
    graph: &Graph,
    id: InstanceId,
    entity: &EntityDescriptor,
    pd: &PropertyDescriptor,
    op: &'static str,
    accessor: bool,
) -> Result<()> {
    check_readable(graph, id)?;
    if is_privileged(graph, id)? {
        return Ok(());
    }
    if graph.instance(id)?.flags.deleted {
        return Err(ModelError::InstanceDeleted { instance: id });
    }
    if pd.read_only || pd.derived || !accessor {
        return Err(ModelError::NotWritable {
            entity: entity.id.clone(),
            property: pd.id.clone(),
            op,
        });
    }
    Ok(())
}

fn check_cardinality(
    entity: &EntityDescriptor,
    pd: &PropertyDescriptor,
    op: &'static str,
    want_list: bool,
) -> Result<()> {
    if pd.is_list() != want_list {
        return Err(ModelError::WrongCardinality {
            entity: entity.id.clone(),
            property: pd.id.clone(),
            op,
            cardinality: pd.cardinality.as_str(),
        });
    }
    Ok(())
}

fn check_value(
    graph: &Graph,
    entity: &EntityDescriptor,
    pd: &PropertyDescriptor,
    value: &Value,
    element: bool,
) -> Result<()> {
    let mismatch = |found: String| ModelError::TypeMismatch {
        entity: entity.id.clone(),
        property: pd.id.clone(),
        expected: pd.value_type.to_string(),
        found,
    };

    match (value, &pd.value_type) {
        (Value::Null, _) if !element => Ok(()),
        (Value::Ref(r), ValueType::Entity(target)) => {
            let referenced = graph.instance(*r)?;
            if referenced.flags.deleted && !graph.is_privileged() {
                return Err(ModelError::InstanceDeleted { instance: *r });
            }
            if !referenced.descriptor().is_a(target) {
                return Err(mismatch(format!("entity({})", referenced.entity())));
            }
            Ok(())
        }
        (_, ValueType::Custom(_)) => {
            if graph
                .registry()
                .converters()
                .is_convertible(&pd.value_type, value)
            {
                Ok(())
            } else {
                Err(mismatch(value.type_name().to_string()))
            }
        }
        (Value::Bool(_), ValueType::Bool)
        | (Value::Int(_), ValueType::Int)
        | (Value::Float(_), ValueType::Float)
        | (Value::Text(_), ValueType::Text)
        | (Value::Date(_), ValueType::Date) => Ok(()),
        _ => Err(mismatch(value.type_name().to_string())),
    }
}

/// Effective value: stored, else the property's initial value
pub(crate) fn current(graph: &Graph, id: InstanceId, pd: &PropertyDescriptor) -> Result<Value> {
    Ok(graph
        .instance(id)?
        .stored(pd.id.as_str())
        .cloned()
        .unwrap_or_else(|| pd.initial_value()))
}

/// Effective value without any guard; used by graph-wide algorithms
pub(crate) fn peek(graph: &Graph, id: InstanceId, property: &str) -> Result<Value> {
    let entity = graph.descriptor_of(id)?;
    let pd = property_of(&entity, property)?;
    current(graph, id, pd)
}

fn into_items(value: Value) -> Vec<Value> {
    match value {
        Value::List(items) => items,
        _ => Vec::new(),
    }
}

fn store(graph: &mut Graph, id: InstanceId, pd: &PropertyDescriptor, value: Value) -> Result<()> {
    let instance = graph.instance_mut(id)?;
    instance.values.insert(pd.id.clone(), value);
    if !pd.transient && !instance.flags.deserializing {
        instance.flags.modified = true;
    }
    Ok(())
}

fn emit(graph: &mut Graph, id: InstanceId, pd: &PropertyDescriptor, kind: ChangeKind) {
    graph.emit(ChangeEvent {
        instance: id,
        property: Some(pd.id.clone()),
        kind,
    });
}

/// Read a property, materializing its default on first access
///
/// Materialization is not a mutation: no notification, no modified flag.
///
/// # Errors
///
/// * `InstanceNotFound` / `UnknownProperty` - bad instance or property id
/// * `UninitializedState` - the instance's initializer has not completed
pub fn get(graph: &mut Graph, id: InstanceId, property: &str) -> Result<Value> {
    let entity = graph.descriptor_of(id)?;
    let pd = property_of(&entity, property)?;
    check_readable(graph, id)?;

    let instance = graph.instance_mut(id)?;
    if let Some(value) = instance.values.get(property) {
        return Ok(value.clone());
    }
    let value = pd.initial_value();
    instance.values.insert(pd.id.clone(), value.clone());
    Ok(value)
}

/// Read a property's effective value without storing anything
///
/// # Errors
///
/// Same as [`get`].
pub fn read(graph: &Graph, id: InstanceId, property: &str) -> Result<Value> {
    let entity = graph.descriptor_of(id)?;
    let pd = property_of(&entity, property)?;
    check_readable(graph, id)?;
    current(graph, id, pd)
}

/// Instances referenced by a property, in order
///
/// # Errors
///
/// Same as [`get`].
pub fn read_refs(graph: &Graph, id: InstanceId, property: &str) -> Result<Vec<InstanceId>> {
    Ok(read(graph, id, property)?.refs())
}

/// Set a SINGLE property
///
/// No-op when the value is unchanged, or when a user write replaces an
/// instance reference with a structurally equal one. Otherwise the inverse is
/// detached from the old value, the value stored, subscribers notified, and
/// the inverse attached to the new value.
///
/// # Errors
///
/// * `WrongCardinality` - the property is a LIST
/// * `NotWritable` - read-only, derived or setter disabled
/// * `InstanceDeleted` - the instance (or referenced instance) was deleted
/// * `TypeMismatch` - the value does not conform to the declared type
/// * `UninitializedState` - the instance's initializer has not completed
pub fn set(
    graph: &mut Graph,
    id: InstanceId,
    property: &str,
    value: impl Into<Value>,
) -> Result<()> {
    set_impl(graph, id, property, value.into(), None)
}

pub(crate) fn set_impl(
    graph: &mut Graph,
    id: InstanceId,
    property: &str,
    value: Value,
    origin: Option<InstanceId>,
) -> Result<()> {
    let entity = graph.descriptor_of(id)?;
    let pd = property_of(&entity, property)?;
    check_cardinality(&entity, pd, "set", false)?;
    check_writable(graph, id, &entity, pd, "set", pd.accessors.set)?;
    check_value(graph, &entity, pd, &value, false)?;

    let old = current(graph, id, pd)?;
    if old == value {
        return Ok(());
    }
    // Internal writes and inverse side effects keep identity so both ends stay paired.
    if origin.is_none() && !is_privileged(graph, id)? {
        if let (Value::Ref(current_ref), Value::Ref(new_ref)) = (&old, &value) {
            if crate::compare::structural_equals(graph, *current_ref, *new_ref)? {
                tracing::trace!(instance_id = %id, property_id = %pd.id, "set to equal value");
                return Ok(());
            }
        }
    }

    let key = (id, pd.id.clone());
    if graph.scheduled_sets.get(&key) == Some(&value) {
        tracing::trace!(instance_id = %id, property_id = %pd.id, "set already in flight");
        return Ok(());
    }
    graph.scheduled_sets.insert(key.clone(), value.clone());
    let result = apply_set(graph, id, pd, old, value, origin);
    graph.scheduled_sets.remove(&key);
    result
}

fn apply_set(
    graph: &mut Graph,
    id: InstanceId,
    pd: &PropertyDescriptor,
    old: Value,
    new: Value,
    origin: Option<InstanceId>,
) -> Result<()> {
    if let (Some(q), Some(previous)) = (&pd.inverse, old.as_instance()) {
        if Some(previous) != origin {
            inverse::detach(graph, previous, q, id)?;
        }
    }

    tracing::trace!(instance_id = %id, property_id = %pd.id, "set");
    store(graph, id, pd, new.clone())?;
    emit(
        graph,
        id,
        pd,
        ChangeKind::Set {
            old,
            new: new.clone(),
        },
    );

    if let (Some(q), Some(next)) = (&pd.inverse, new.as_instance()) {
        if Some(next) != origin {
            inverse::attach(graph, next, q, id)?;
        }
    }
    Ok(())
}

/// Append to a LIST property
///
/// Without `allow_duplicates`, adding an element already present is a no-op.
///
/// # Errors
///
/// * `WrongCardinality` - the property is SINGLE
/// * `NotWritable` / `InstanceDeleted` / `TypeMismatch` / `UninitializedState`
pub fn add(
    graph: &mut Graph,
    id: InstanceId,
    property: &str,
    value: impl Into<Value>,
) -> Result<()> {
    add_impl(graph, id, property, value.into(), None, None)
}

/// Insert into a LIST property at `index`
///
/// # Errors
///
/// Same as [`add`], plus `IndexOutOfBounds` when `index` exceeds the length.
pub fn add_at(
    graph: &mut Graph,
    id: InstanceId,
    property: &str,
    value: impl Into<Value>,
    index: usize,
) -> Result<()> {
    add_impl(graph, id, property, value.into(), Some(index), None)
}

pub(crate) fn add_impl(
    graph: &mut Graph,
    id: InstanceId,
    property: &str,
    value: Value,
    index: Option<usize>,
    origin: Option<InstanceId>,
) -> Result<()> {
    let entity = graph.descriptor_of(id)?;
    let pd = property_of(&entity, property)?;
    check_cardinality(&entity, pd, "add", true)?;
    check_writable(graph, id, &entity, pd, "add", pd.accessors.add)?;
    check_value(graph, &entity, pd, &value, true)?;

    let mut items = into_items(current(graph, id, pd)?);
    if !pd.allow_duplicates && items.contains(&value) {
        return Ok(());
    }
    let index = index.unwrap_or(items.len());
    if index > items.len() {
        return Err(ModelError::IndexOutOfBounds {
            entity: entity.id.clone(),
            property: pd.id.clone(),
            index,
            len: items.len(),
        });
    }

    tracing::trace!(instance_id = %id, property_id = %pd.id, index, "add");
    items.insert(index, value.clone());
    store(graph, id, pd, Value::List(items))?;
    emit(
        graph,
        id,
        pd,
        ChangeKind::Added {
            value: value.clone(),
            index,
        },
    );

    if let (Some(q), Some(target)) = (&pd.inverse, value.as_instance()) {
        if Some(target) != origin {
            inverse::attach(graph, target, q, id)?;
        }
    }
    Ok(())
}

/// Remove the first occurrence of `value` from a LIST property
///
/// Removing an absent element is a no-op.
///
/// # Errors
///
/// * `WrongCardinality` - the property is SINGLE
/// * `NotWritable` / `InstanceDeleted` / `UninitializedState`
pub fn remove(
    graph: &mut Graph,
    id: InstanceId,
    property: &str,
    value: impl Into<Value>,
) -> Result<()> {
    remove_impl(graph, id, property, value.into(), None)
}

pub(crate) fn remove_impl(
    graph: &mut Graph,
    id: InstanceId,
    property: &str,
    value: Value,
    origin: Option<InstanceId>,
) -> Result<()> {
    let entity = graph.descriptor_of(id)?;
    let pd = property_of(&entity, property)?;
    check_cardinality(&entity, pd, "remove", true)?;
    check_writable(graph, id, &entity, pd, "remove", pd.accessors.remove)?;

    let items = into_items(current(graph, id, pd)?);
    match items.iter().position(|v| v == &value) {
        Some(index) => remove_at_impl(graph, id, property, index, origin).map(|_| ()),
        None => Ok(()),
    }
}

/// Remove and return the element at `index` of a LIST property
///
/// # Errors
///
/// Same as [`remove`], plus `IndexOutOfBounds`.
pub fn remove_at(graph: &mut Graph, id: InstanceId, property: &str, index: usize) -> Result<Value> {
    remove_at_impl(graph, id, property, index, None)
}

pub(crate) fn remove_at_impl(
    graph: &mut Graph,
    id: InstanceId,
    property: &str,
    index: usize,
    origin: Option<InstanceId>,
) -> Result<Value> {
    let entity = graph.descriptor_of(id)?;
    let pd = property_of(&entity, property)?;
    check_cardinality(&entity, pd, "remove", true)?;
    check_writable(graph, id, &entity, pd, "remove", pd.accessors.remove)?;

    let mut items = into_items(current(graph, id, pd)?);
    if index >= items.len() {
        return Err(ModelError::IndexOutOfBounds {
            entity: entity.id.clone(),
            property: pd.id.clone(),
            index,
            len: items.len(),
        });
    }

    tracing::trace!(instance_id = %id, property_id = %pd.id, index, "remove");
    let value = items.remove(index);
    let still_present = items.contains(&value);
    store(graph, id, pd, Value::List(items))?;
    emit(
        graph,
        id,
        pd,
        ChangeKind::Removed {
            value: value.clone(),
            index,
        },
    );

    if let (Some(q), Some(target)) = (&pd.inverse, value.as_instance()) {
        if !still_present && Some(target) != origin {
            inverse::detach(graph, target, q, id)?;
        }
    }
    Ok(value)
}

/// Move an existing element of a LIST property to `new_index`
///
/// # Errors
///
/// * `ElementNotFound` - `value` is not in the list
/// * `IndexOutOfBounds` - `new_index` is not a current position
/// * `WrongCardinality` / `NotWritable` / `InstanceDeleted` / `UninitializedState`
pub fn reindex(
    graph: &mut Graph,
    id: InstanceId,
    property: &str,
    value: impl Into<Value>,
    new_index: usize,
) -> Result<()> {
    let value = value.into();
    let entity = graph.descriptor_of(id)?;
    let pd = property_of(&entity, property)?;
    check_cardinality(&entity, pd, "reindex", true)?;
    check_writable(
        graph,
        id,
        &entity,
        pd,
        "reindex",
        pd.accessors.add && pd.accessors.remove,
    )?;

    let items = into_items(current(graph, id, pd)?);
    let from = items
        .iter()
        .position(|v| v == &value)
        .ok_or_else(|| ModelError::ElementNotFound {
            entity: entity.id.clone(),
            property: pd.id.clone(),
        })?;
    move_element(graph, id, &entity, pd, items, from, new_index)
}

/// Move the element at `from` to `to`
pub(crate) fn move_at(
    graph: &mut Graph,
    id: InstanceId,
    property: &str,
    from: usize,
    to: usize,
) -> Result<()> {
    let entity = graph.descriptor_of(id)?;
    let pd = property_of(&entity, property)?;
    check_cardinality(&entity, pd, "reindex", true)?;
    let items = into_items(current(graph, id, pd)?);
    if from >= items.len() {
        return Err(ModelError::IndexOutOfBounds {
            entity: entity.id.clone(),
            property: pd.id.clone(),
            index: from,
            len: items.len(),
        });
    }
    move_element(graph, id, &entity, pd, items, from, to)
}

fn move_element(
    graph: &mut Graph,
    id: InstanceId,
    entity: &EntityDescriptor,
    pd: &PropertyDescriptor,
    mut items: Vec<Value>,
    from: usize,
    to: usize,
) -> Result<()> {
    if to >= items.len() {
        return Err(ModelError::IndexOutOfBounds {
            entity: entity.id.clone(),
            property: pd.id.clone(),
            index: to,
            len: items.len(),
        });
    }
    if from == to {
        return Ok(());
    }

    tracing::trace!(instance_id = %id, property_id = %pd.id, from, to, "reindex");
    let value = items.remove(from);
    items.insert(to, value.clone());
    store(graph, id, pd, Value::List(items))?;
    emit(graph, id, pd, ChangeKind::Moved { value, from, to });
    Ok(())
}
