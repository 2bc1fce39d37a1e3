//! Cycle-safe deep copy
//!
//! Cloning runs in two phases over a shared translation table. Phase 1
//! allocates a blank clone per original, registering it before recursing
//! into CLONE-strategy targets inside the structural closure. Phase 2 writes
//! final values into every clone through the dispatcher.

pub mod expr;

use indexmap::{IndexMap, IndexSet};
use relmodel_core_types::InstanceId;
use std::time::Instant;

use crate::errors::{ModelError, Result};
use crate::graph::{Graph, MutationContext};
use crate::meta::{CloneStrategy, PropertyDescriptor};
use crate::ops::closure::{compute_closure, ClosureKind};
use crate::ops::dispatch;
use crate::ops::lifecycle::insert_new;
use crate::value::Value;
use crate::{log_op_end, log_op_error, log_op_start};

/// Original → clone, in allocation order
pub type TranslationTable = IndexMap<InstanceId, InstanceId>;

/// Clone one instance
///
/// `context` widens the structural closure: CLONE-strategy targets outside
/// the closure of `context ∪ {id}` are left unset on the clone.
///
/// # Errors
///
/// * `CloneInProgress` - the instance is already being cloned
/// * `InstanceNotFound` and dispatcher errors from the finalize phase
pub fn clone_instance(
    graph: &mut Graph,
    id: InstanceId,
    context: &IndexSet<InstanceId>,
) -> Result<InstanceId> {
    let table = clone_all(graph, &[id], context)?;
    table.get(&id).copied().ok_or_else(|| ModelError::Internal {
        message: format!("clone of {} missing from translation table", id),
    })
}

/// Clone several roots with one translation table
///
/// References among the roots resolve to sibling clones.
///
/// # Errors
///
/// Same as [`clone_instance`].
pub fn clone_all(
    graph: &mut Graph,
    roots: &[InstanceId],
    context: &IndexSet<InstanceId>,
) -> Result<TranslationTable> {
    log_op_start!("clone", roots = roots.len(), context_len = context.len());
    let start = Instant::now();
    let table = clone_all_impl(graph, roots, context).map_err(|e| {
        log_op_error!(
            "clone",
            e.clone(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        e
    })?;
    log_op_end!(
        "clone",
        duration_ms = start.elapsed().as_millis() as u64,
        clone_count = table.len()
    );
    Ok(table)
}

pub(crate) fn clone_all_impl(
    graph: &mut Graph,
    roots: &[InstanceId],
    context: &IndexSet<InstanceId>,
) -> Result<TranslationTable> {
    for root in roots {
        if graph.instance(*root)?.flags.being_cloned {
            return Err(ModelError::CloneInProgress { instance: *root });
        }
    }

    let closure = compute_closure(graph, roots, context, ClosureKind::Structural)?;
    let mut table = TranslationTable::new();

    let result = graph.with_context(MutationContext::Cloning, |g| {
        for root in roots {
            allocate(g, *root, &closure, &mut table)?;
        }
        let pairs: Vec<(InstanceId, InstanceId)> =
            table.iter().map(|(o, c)| (*o, *c)).collect();
        for (original, copy) in pairs {
            finalize(g, original, copy, &table)?;
        }
        Ok(())
    });

    for original in table.keys() {
        if let Ok(instance) = graph.instance_mut(*original) {
            instance.flags.being_cloned = false;
        }
    }
    result?;

    tracing::debug!(clone_count = table.len(), "clone finished");
    Ok(table)
}

/// Phase 1: allocate a blank clone and recurse into owned targets
fn allocate(
    graph: &mut Graph,
    original: InstanceId,
    closure: &IndexSet<InstanceId>,
    table: &mut TranslationTable,
) -> Result<()> {
    if table.contains_key(&original) {
        return Ok(());
    }

    let entity = graph.descriptor_of(original)?;
    graph.instance_mut(original)?.flags.being_cloned = true;
    let copy = insert_new(graph, entity.clone());
    graph.instance_mut(copy)?.flags.initialized = true;
    table.insert(original, copy);
    tracing::trace!(original = %original, clone = %copy, "allocated clone");

    for pid in &entity.clone_order {
        let Some(pd) = entity.property(pid.as_str()) else {
            continue;
        };
        if !pd.is_owned() {
            continue;
        }
        for target in dispatch::peek(graph, original, pid.as_str())?.refs() {
            if closure.contains(&target) {
                allocate(graph, target, closure, table)?;
            }
        }
    }
    Ok(())
}

/// Phase 2: write final values into one clone
fn finalize(
    graph: &mut Graph,
    original: InstanceId,
    copy: InstanceId,
    table: &TranslationTable,
) -> Result<()> {
    let entity = graph.descriptor_of(original)?;

    for pid in &entity.clone_order {
        let Some(pd) = entity.property(pid.as_str()) else {
            continue;
        };
        let value = match &pd.clone {
            CloneStrategy::Ignore => continue,
            CloneStrategy::Custom(_) => match &pd.clone_expr {
                Some(expr) => expr.eval(graph, copy, original, &pd.id)?,
                None => continue,
            },
            CloneStrategy::Clone | CloneStrategy::Reference => {
                let Some(stored) = graph.instance(original)?.stored(pid.as_str()).cloned() else {
                    continue;
                };
                translate(pd, stored, table)
            }
        };
        write(graph, copy, pd, value)?;
    }
    Ok(())
}

/// Map references of an original value into the clone's world
///
/// CLONE targets without a clone are dropped; REFERENCE targets without a
/// clone are shared as-is.
fn translate(pd: &PropertyDescriptor, value: Value, table: &TranslationTable) -> Value {
    if !pd.is_entity_typed() {
        return value;
    }
    let map = |r: InstanceId| -> Option<InstanceId> {
        match (table.get(&r), &pd.clone) {
            (Some(c), _) => Some(*c),
            (None, CloneStrategy::Reference) => Some(r),
            (None, _) => None,
        }
    };
    match value {
        Value::Ref(r) => map(r).map(Value::Ref).unwrap_or(Value::Null),
        Value::List(items) => Value::List(
            items
                .into_iter()
                .filter_map(|v| v.as_instance().and_then(map).map(Value::Ref))
                .collect(),
        ),
        other => other,
    }
}

/// Write a value through the dispatcher, reproducing list order
///
/// Inverse side effects of earlier writes may already have placed elements
/// in the clone's list; those are moved rather than added again.
pub(crate) fn write(
    graph: &mut Graph,
    id: InstanceId,
    pd: &PropertyDescriptor,
    value: Value,
) -> Result<()> {
    let property = pd.id.as_str();
    if pd.is_single() {
        return dispatch::set_impl(graph, id, property, value, None);
    }

    let desired = match value {
        Value::List(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };
    for (index, item) in desired.into_iter().enumerate() {
        let current = dispatch::peek(graph, id, property)?;
        let items = current.as_list().unwrap_or(&[]);
        let found = items
            .iter()
            .skip(index)
            .position(|v| v == &item)
            .map(|p| p + index);
        match found {
            Some(from) if from == index => {}
            Some(from) => dispatch::move_at(graph, id, property, from, index)?,
            None => {
                let at = Some(index.min(items.len()));
                dispatch::add_impl(graph, id, property, item, at, None)?
            }
        }
    }
    Ok(())
}
