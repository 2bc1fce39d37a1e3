//! Inverse-property synchronization
//!
//! Side effects run through the dispatcher in the `Inverse` context and carry
//! the originating holder, so the echo back toward the holder is suppressed.

use relmodel_core_types::{InstanceId, PropertyId};

use super::dispatch::{self, property_of};
use crate::errors::Result;
use crate::graph::{Graph, MutationContext};
use crate::value::Value;

/// Make `holder` present in `target`'s inverse property `q`
pub(crate) fn attach(
    graph: &mut Graph,
    target: InstanceId,
    q: &PropertyId,
    holder: InstanceId,
) -> Result<()> {
    graph.with_context(MutationContext::Inverse, |g| {
        let entity = g.descriptor_of(target)?;
        let qp = property_of(&entity, q.as_str())?;
        tracing::trace!(
            instance_id = %target,
            property_id = %q,
            holder = %holder,
            "attach inverse"
        );
        if qp.is_single() {
            dispatch::set_impl(g, target, q.as_str(), Value::Ref(holder), Some(holder))
        } else {
            // presence only: one entry per holder
            if dispatch::current(g, target, qp)?.refs().contains(&holder) {
                return Ok(());
            }
            dispatch::add_impl(g, target, q.as_str(), Value::Ref(holder), None, Some(holder))
        }
    })
}

/// Remove `holder` from `target`'s inverse property `q`
pub(crate) fn detach(
    graph: &mut Graph,
    target: InstanceId,
    q: &PropertyId,
    holder: InstanceId,
) -> Result<()> {
    graph.with_context(MutationContext::Inverse, |g| {
        let entity = g.descriptor_of(target)?;
        let qp = property_of(&entity, q.as_str())?;
        tracing::trace!(
            instance_id = %target,
            property_id = %q,
            holder = %holder,
            "detach inverse"
        );
        if qp.is_single() {
            if dispatch::current(g, target, qp)?.as_instance() != Some(holder) {
                return Ok(());
            }
            dispatch::set_impl(g, target, q.as_str(), Value::Null, Some(holder))
        } else {
            dispatch::remove_impl(g, target, q.as_str(), Value::Ref(holder), Some(holder))
        }
    })
}
