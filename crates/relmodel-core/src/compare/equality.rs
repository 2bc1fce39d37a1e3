//! Structural equality
//!
//! Two instances are structurally equal when they share an entity and every
//! relevant property compares equal: scalars by value, references
//! recursively, lists positionally.

use relmodel_core_types::InstanceId;
use std::collections::HashSet;

use crate::errors::Result;
use crate::graph::Graph;
use crate::ops::dispatch;
use crate::value::Value;

/// Compare two instances structurally
///
/// Cycles are handled with a seen set: a pair already under comparison is
/// assumed equal.
///
/// # Errors
///
/// Returns `InstanceNotFound` when either id (or anything reachable from
/// it) is not in the graph.
pub fn structural_equals(graph: &Graph, a: InstanceId, b: InstanceId) -> Result<bool> {
    let mut seen = HashSet::new();
    let equal = instances_equal(graph, a, b, &mut seen)?;
    tracing::trace!(left = %a, right = %b, equal, "structural_equals");
    Ok(equal)
}

fn instances_equal(
    graph: &Graph,
    a: InstanceId,
    b: InstanceId,
    seen: &mut HashSet<(InstanceId, InstanceId)>,
) -> Result<bool> {
    if a == b {
        return Ok(true);
    }
    if !seen.insert((a, b)) {
        return Ok(true);
    }

    let left = graph.descriptor_of(a)?;
    let right = graph.descriptor_of(b)?;
    if left.id != right.id {
        return Ok(false);
    }

    for pd in left.relevant_properties() {
        let va = dispatch::current(graph, a, pd)?;
        let vb = dispatch::current(graph, b, pd)?;
        let equal = if pd.is_entity_typed() {
            values_equal(graph, &va, &vb, seen)?
        } else {
            va == vb
        };
        if !equal {
            tracing::trace!(left = %a, right = %b, property_id = %pd.id, "property differs");
            return Ok(false);
        }
    }
    Ok(true)
}

fn values_equal(
    graph: &Graph,
    va: &Value,
    vb: &Value,
    seen: &mut HashSet<(InstanceId, InstanceId)>,
) -> Result<bool> {
    match (va, vb) {
        (Value::Ref(x), Value::Ref(y)) => instances_equal(graph, *x, *y, seen),
        (Value::List(xs), Value::List(ys)) => {
            if xs.len() != ys.len() {
                return Ok(false);
            }
            for (x, y) in xs.iter().zip(ys) {
                if !values_equal(graph, x, y, seen)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (x, y) => Ok(x == y),
    }
}
