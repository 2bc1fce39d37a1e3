//! Instance lifecycle: creation, initialization, delete/undelete and the
//! serialization seams

use indexmap::IndexSet;
use relmodel_core_types::{InstanceId, PropertyId};
use std::sync::Arc;
use std::time::Instant;

use super::closure::{compute_closure, ClosureKind};
use super::dispatch;
use crate::errors::{ModelError, Result};
use crate::graph::{ChangeEvent, ChangeKind, EditRecord, Graph, Instance, MutationContext};
use crate::meta::{EntityDescriptor, HookKind};
use crate::value::Value;
use crate::{log_op_end, log_op_error, log_op_start};

/// Create an instance of `entity`
///
/// Registered `Initialize` hooks run with the instance in the initializing
/// state. An entity that requires an initializer but has none registered
/// stays uninitialized until [`initialize`] is called.
///
/// # Errors
///
/// * Definition errors if the entity does not resolve
/// * `AbstractEntity` - the entity is abstract
/// * Any error returned by an initialize hook
pub fn create(graph: &mut Graph, entity: &str) -> Result<InstanceId> {
    log_op_start!("create", entity_id = entity);
    let start = Instant::now();
    let id = create_impl(graph, entity).map_err(|e| {
        log_op_error!(
            "create",
            e.clone(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        e
    })?;
    log_op_end!(
        "create",
        duration_ms = start.elapsed().as_millis() as u64,
        instance_id = %id
    );
    Ok(id)
}

fn create_impl(graph: &mut Graph, entity: &str) -> Result<InstanceId> {
    let descriptor = graph.registry().resolve(entity)?;
    if descriptor.is_abstract {
        return Err(ModelError::AbstractEntity {
            entity: descriptor.id.clone(),
        });
    }
    let hooks = graph.registry().hooks_for(entity, HookKind::Initialize)?;
    let requires_initializer = descriptor.requires_initializer;
    let id = insert_new(graph, descriptor);

    if hooks.is_empty() {
        if !requires_initializer {
            graph.instance_mut(id)?.flags.initialized = true;
        }
        return Ok(id);
    }

    graph.instance_mut(id)?.flags.initializing = true;
    let result = hooks.iter().try_for_each(|hook| hook(graph, id));
    let flags = &mut graph.instance_mut(id)?.flags;
    flags.initializing = false;
    result?;
    flags.initialized = true;
    Ok(id)
}

/// Allocate a blank instance and record its creation
pub(crate) fn insert_new(graph: &mut Graph, descriptor: Arc<EntityDescriptor>) -> InstanceId {
    let id = InstanceId::new();
    let entity = descriptor.id.clone();
    graph.insert(Instance::new(id, descriptor));
    graph.record(EditRecord::Created { instance: id, entity });
    id
}

/// Run a caller-supplied initializer on an instance that is not yet initialized
///
/// No-op when the instance is already initialized.
///
/// # Errors
///
/// Returns `InstanceNotFound`, or whatever `init` returns; the instance then
/// stays uninitialized.
pub fn initialize<F>(graph: &mut Graph, id: InstanceId, init: F) -> Result<()>
where
    F: FnOnce(&mut Graph, InstanceId) -> Result<()>,
{
    if graph.instance(id)?.flags.initialized {
        return Ok(());
    }
    graph.instance_mut(id)?.flags.initializing = true;
    let result = init(graph, id);
    let flags = &mut graph.instance_mut(id)?.flags;
    flags.initializing = false;
    result?;
    flags.initialized = true;
    Ok(())
}

/// Delete an instance and everything it embeds for deletion
///
/// # Errors
///
/// Returns `InstanceNotFound` for unknown ids; errors from the cascade
/// propagate and may leave the graph partially deleted.
pub fn delete(graph: &mut Graph, id: InstanceId) -> Result<()> {
    delete_in_context(graph, id, &IndexSet::new())
}

/// Delete an instance as part of a larger deletion
///
/// `context` names instances the caller is already deleting; they seed the
/// closure but are left to the caller.
///
/// # Errors
///
/// Same as [`delete`].
pub fn delete_in_context(
    graph: &mut Graph,
    id: InstanceId,
    context: &IndexSet<InstanceId>,
) -> Result<()> {
    log_op_start!("delete", instance_id = %id, context_len = context.len());
    let start = Instant::now();
    graph
        .with_context(MutationContext::Deleting, |g| delete_root(g, id, context))
        .map_err(|e| {
            log_op_error!(
                "delete",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;
    log_op_end!("delete", duration_ms = start.elapsed().as_millis() as u64);
    Ok(())
}

fn is_deleting_or_deleted(graph: &Graph, id: InstanceId) -> Result<bool> {
    let flags = &graph.instance(id)?.flags;
    Ok(flags.deleted || flags.deleting)
}

fn delete_root(graph: &mut Graph, id: InstanceId, context: &IndexSet<InstanceId>) -> Result<()> {
    if is_deleting_or_deleted(graph, id)? {
        return Ok(());
    }
    let closure = compute_closure(graph, &[id], context, ClosureKind::Deletion)?;
    tracing::debug!(instance_id = %id, closure_len = closure.len(), "deleting");
    delete_impl(graph, id, &closure, context)?;

    for member in closure.iter().copied() {
        if member == id || context.contains(&member) || is_deleting_or_deleted(graph, member)? {
            continue;
        }
        tracing::warn!(
            instance_id = %member,
            root = %id,
            "closure member not reached by cascade; deleting it directly"
        );
        delete_impl(graph, member, &closure, context)?;
    }
    Ok(())
}

fn delete_impl(
    graph: &mut Graph,
    id: InstanceId,
    closure: &IndexSet<InstanceId>,
    context: &IndexSet<InstanceId>,
) -> Result<()> {
    if is_deleting_or_deleted(graph, id)? {
        return Ok(());
    }

    graph.instance_mut(id)?.flags.deleting = true;
    let result = delete_cascade(graph, id, closure, context);
    let instance = graph.instance_mut(id)?;
    instance.flags.deleting = false;
    let snapshot = result?;

    instance.flags.deleted = true;
    instance.deletion_snapshot = snapshot;
    graph.emit(ChangeEvent {
        instance: id,
        property: None,
        kind: ChangeKind::Deleted,
    });
    graph.release_subscriptions(id);
    Ok(())
}

/// Clear entity-typed properties and delete closure members they referenced
///
/// Returns the pre-deletion values of the cleared properties.
fn delete_cascade(
    graph: &mut Graph,
    id: InstanceId,
    closure: &IndexSet<InstanceId>,
    context: &IndexSet<InstanceId>,
) -> Result<Vec<(PropertyId, Value)>> {
    let entity = graph.descriptor_of(id)?;
    let mut snapshot = Vec::new();
    for pd in entity.entity_properties() {
        let old = dispatch::current(graph, id, pd)?;
        if old.is_empty() {
            continue;
        }
        if pd.is_single() {
            dispatch::set_impl(graph, id, pd.id.as_str(), Value::Null, None)?;
        } else {
            let len = old.as_list().map(|l| l.len()).unwrap_or(0);
            for index in (0..len).rev() {
                dispatch::remove_at_impl(graph, id, pd.id.as_str(), index, None)?;
            }
        }
        for target in old.refs() {
            if closure.contains(&target) && !context.contains(&target) {
                delete_impl(graph, target, closure, context)?;
            }
        }
        snapshot.push((pd.id.clone(), old));
    }
    Ok(snapshot)
}

/// Reverse a deletion
///
/// With `restore_properties`, the values cleared at deletion are replayed
/// through the dispatcher so inverses re-attach. No-op if not deleted.
///
/// # Errors
///
/// Returns `InstanceNotFound` for unknown ids, or a dispatcher error from the replay.
pub fn undelete(graph: &mut Graph, id: InstanceId, restore_properties: bool) -> Result<()> {
    log_op_start!("undelete", instance_id = %id, restore_properties = restore_properties);
    let start = Instant::now();
    graph
        .with_context(MutationContext::Undeleting, |g| {
            undelete_impl(g, id, restore_properties)
        })
        .map_err(|e| {
            log_op_error!(
                "undelete",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;
    log_op_end!("undelete", duration_ms = start.elapsed().as_millis() as u64);
    Ok(())
}

fn undelete_impl(graph: &mut Graph, id: InstanceId, restore_properties: bool) -> Result<()> {
    let instance = graph.instance_mut(id)?;
    if !instance.flags.deleted || instance.flags.undeleting {
        return Ok(());
    }
    instance.flags.undeleting = true;
    instance.flags.deleted = false;
    let snapshot = std::mem::take(&mut instance.deletion_snapshot);

    let result = if restore_properties {
        replay(graph, id, &snapshot)
    } else {
        Ok(())
    };
    graph.instance_mut(id)?.flags.undeleting = false;
    result?;

    graph.emit(ChangeEvent {
        instance: id,
        property: None,
        kind: ChangeKind::Undeleted,
    });
    Ok(())
}

fn replay(graph: &mut Graph, id: InstanceId, snapshot: &[(PropertyId, Value)]) -> Result<()> {
    for (property, value) in snapshot {
        match value {
            Value::List(items) => {
                for item in items {
                    dispatch::add_impl(graph, id, property.as_str(), item.clone(), None, None)?;
                }
            }
            other => dispatch::set_impl(graph, id, property.as_str(), other.clone(), None)?,
        }
    }
    Ok(())
}

// ========== Serialization seams ==========

fn run_hooks(graph: &mut Graph, id: InstanceId, kind: HookKind) -> Result<()> {
    let entity = graph.instance(id)?.entity().clone();
    let hooks = graph.registry().hooks_for(entity.as_str(), kind)?;
    hooks.iter().try_for_each(|hook| hook(graph, id))
}

/// Allocate an instance with a known id for a deserializer
///
/// The instance starts in the deserializing state: writes are privileged and
/// produce no notifications, edit records or modified flag.
///
/// # Errors
///
/// * Definition errors if the entity does not resolve
/// * `AbstractEntity` - the entity is abstract
/// * `Internal` - the id is already present in the graph
pub fn create_for_deserialize(
    graph: &mut Graph,
    entity: &str,
    id: InstanceId,
) -> Result<InstanceId> {
    let descriptor = graph.registry().resolve(entity)?;
    if descriptor.is_abstract {
        return Err(ModelError::AbstractEntity {
            entity: descriptor.id.clone(),
        });
    }
    if graph.contains(id) {
        return Err(ModelError::Internal {
            message: format!("instance {} already present", id),
        });
    }
    let mut instance = Instance::new(id, descriptor);
    instance.flags.deserializing = true;
    instance.flags.initialized = true;
    graph.insert(instance);
    Ok(id)
}

/// Put an existing instance into the deserializing state
///
/// # Errors
///
/// Returns `InstanceNotFound` for unknown ids.
pub fn begin_deserialize(graph: &mut Graph, id: InstanceId) -> Result<()> {
    graph.instance_mut(id)?.flags.deserializing = true;
    Ok(())
}

/// Run `AfterDeserialize` hooks and leave the deserializing state
///
/// The modified flag is cleared afterwards.
///
/// # Errors
///
/// Returns `InstanceNotFound` for unknown ids, or the first hook error.
pub fn end_deserialize(graph: &mut Graph, id: InstanceId) -> Result<()> {
    let result = run_hooks(graph, id, HookKind::AfterDeserialize);
    let flags = &mut graph.instance_mut(id)?.flags;
    flags.deserializing = false;
    flags.initialized = true;
    flags.modified = false;
    result
}

/// Run `BeforeSerialize` hooks
///
/// # Errors
///
/// Returns `InstanceNotFound` for unknown ids, or the first hook error.
pub fn before_serialize(graph: &mut Graph, id: InstanceId) -> Result<()> {
    run_hooks(graph, id, HookKind::BeforeSerialize)
}

/// # Errors
///
/// Returns `InstanceNotFound` for unknown ids.
pub fn clear_modified(graph: &mut Graph, id: InstanceId) -> Result<()> {
    graph.instance_mut(id)?.flags.modified = false;
    Ok(())
}
