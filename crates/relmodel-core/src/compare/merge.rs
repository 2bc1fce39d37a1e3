//! In-place structural merge
//!
//! `update_with(a, b)` mutates `a` until it is structurally equal to `b`,
//! reusing what already matches. Every write goes through the dispatcher, so
//! inverse properties stay in sync and subscribers see each change.

use indexmap::IndexSet;
use relmodel_core_types::InstanceId;
use std::collections::HashMap;
use std::time::Instant;

use super::distance::distance_with;
use super::matching::{reconcile, ListMatching};
use crate::clone::{clone_all_impl, write};
use crate::errors::{ModelError, Result};
use crate::graph::{Graph, MutationContext};
use crate::meta::PropertyDescriptor;
use crate::ops::dispatch;
use crate::value::Value;
use crate::{log_op_end, log_op_error, log_op_start};

/// Merge `b` into `a`
///
/// Owned values (CLONE strategy) are merged recursively or replaced by
/// clones of `b`'s values; references are shared with `b`.
///
/// # Errors
///
/// * `EntityMismatch` - `a` and `b` are instances of different entities
/// * `InstanceNotFound` and dispatcher errors; the merge is not rolled back
pub fn update_with(graph: &mut Graph, a: InstanceId, b: InstanceId) -> Result<()> {
    log_op_start!("update_with", instance_id = %a, source = %b);
    let start = Instant::now();
    let mut merger = Merger::default();
    graph
        .with_context(MutationContext::Merging, |g| merger.merge(g, a, b))
        .map_err(|e| {
            log_op_error!(
                "update_with",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;
    log_op_end!(
        "update_with",
        duration_ms = start.elapsed().as_millis() as u64,
        visited = merger.visited.len()
    );
    Ok(())
}

#[derive(Default)]
struct Merger {
    /// Instance of `a`'s graph → the instance of `b`'s it is being merged with
    visited: HashMap<InstanceId, InstanceId>,
}

impl Merger {
    fn corresponds(&self, x: InstanceId, y: InstanceId) -> bool {
        x == y || self.visited.get(&x) == Some(&y)
    }

    fn merge(&mut self, graph: &mut Graph, a: InstanceId, b: InstanceId) -> Result<()> {
        if self.corresponds(a, b) {
            return Ok(());
        }
        let entity = graph.descriptor_of(a)?;
        let source = graph.descriptor_of(b)?;
        if entity.id != source.id {
            return Err(ModelError::EntityMismatch {
                left: entity.id.clone(),
                right: source.id.clone(),
            });
        }
        self.visited.insert(a, b);
        tracing::debug!(instance_id = %a, source = %b, entity_id = %entity.id, "merging");

        for pd in entity.relevant_properties() {
            if pd.is_single() {
                self.single(graph, a, b, pd)?;
            } else {
                self.list(graph, a, b, pd)?;
            }
        }
        Ok(())
    }

    fn single(
        &mut self,
        graph: &mut Graph,
        a: InstanceId,
        b: InstanceId,
        pd: &PropertyDescriptor,
    ) -> Result<()> {
        let property = pd.id.as_str();
        let va = dispatch::current(graph, a, pd)?;
        let vb = dispatch::current(graph, b, pd)?;

        if !pd.is_entity_typed() {
            if va != vb {
                dispatch::set_impl(graph, a, property, vb, None)?;
            }
            return Ok(());
        }

        match (va.as_instance(), vb.as_instance()) {
            (_, None) => {
                if !va.is_null() {
                    dispatch::set_impl(graph, a, property, Value::Null, None)?;
                }
            }
            (Some(x), Some(y)) if self.corresponds(x, y) => {}
            (Some(x), Some(y)) if pd.is_owned() && same_entity(graph, x, y)? => {
                self.merge(graph, x, y)?;
            }
            (_, Some(y)) => {
                let replacement = self.replacement(graph, pd, y)?;
                dispatch::set_impl(graph, a, property, Value::Ref(replacement), None)?;
            }
        }
        Ok(())
    }

    /// Value standing in for `y` on `a`'s side
    ///
    /// Owned values are cloned and merged against their source; references
    /// are shared.
    fn replacement(
        &mut self,
        graph: &mut Graph,
        pd: &PropertyDescriptor,
        y: InstanceId,
    ) -> Result<InstanceId> {
        if !pd.is_owned() {
            return Ok(y);
        }
        let table = clone_all_impl(graph, &[y], &IndexSet::new())?;
        let copy = table.get(&y).copied().ok_or_else(|| ModelError::Internal {
            message: format!("clone of {} missing from translation table", y),
        })?;
        self.merge(graph, copy, y)?;
        Ok(copy)
    }

    fn list(
        &mut self,
        graph: &mut Graph,
        a: InstanceId,
        b: InstanceId,
        pd: &PropertyDescriptor,
    ) -> Result<()> {
        let property = pd.id.as_str();
        let xs = into_items(dispatch::current(graph, a, pd)?);
        let ys = into_items(dispatch::current(graph, b, pd)?);
        let matching = self.reconcile(graph, pd, &xs, &ys)?;
        tracing::trace!(
            instance_id = %a,
            property_id = %pd.id,
            matched = matching.matched.len(),
            added = matching.added.len(),
            removed = matching.removed.len(),
            "reconciled list"
        );

        for index in matching.removed.iter().rev() {
            dispatch::remove_at_impl(graph, a, property, *index, None)?;
        }

        let mut placed: HashMap<usize, Value> = HashMap::new();
        for (earlier, addition) in matching.added.iter().enumerate() {
            let source = &ys[addition.right_index];
            let value = match source.as_instance() {
                Some(y) => Value::Ref(self.replacement(graph, pd, y)?),
                None => source.clone(),
            };
            let len = into_items(dispatch::current(graph, a, pd)?).len();
            let at = (addition.insert_at + earlier).min(len);
            dispatch::add_impl(graph, a, property, value.clone(), Some(at), None)?;
            placed.insert(addition.right_index, value);
        }

        if pd.is_owned() {
            for (i, j) in &matching.matched {
                if let (Some(x), Some(y)) = (xs[*i].as_instance(), ys[*j].as_instance()) {
                    self.merge(graph, x, y)?;
                }
            }
        }

        let partners: HashMap<usize, usize> =
            matching.matched.iter().map(|(i, j)| (*j, *i)).collect();
        let desired: Option<Vec<Value>> = (0..ys.len())
            .map(|j| match partners.get(&j) {
                Some(i) => Some(xs[*i].clone()),
                None => placed.get(&j).cloned(),
            })
            .collect();
        match desired {
            Some(desired) => write(graph, a, pd, Value::List(desired)),
            None => Err(ModelError::Internal {
                message: format!("incomplete reconciliation of {}", pd.id),
            }),
        }
    }

    /// Owned lists match by distance, reference lists by identity, scalar
    /// lists by equality
    fn reconcile(
        &self,
        graph: &Graph,
        pd: &PropertyDescriptor,
        xs: &[Value],
        ys: &[Value],
    ) -> Result<ListMatching> {
        let threshold = graph.config().match_threshold;
        if !pd.is_owned() {
            return reconcile(xs, ys, threshold, |x, y| Ok((x == y).then_some(0.0)));
        }
        reconcile(xs, ys, threshold, |x, y| {
            let (Some(p), Some(q)) = (x.as_instance(), y.as_instance()) else {
                return Ok(None);
            };
            if self.corresponds(p, q) {
                return Ok(Some(0.0));
            }
            if !same_entity(graph, p, q)? {
                return Ok(None);
            }
            distance_with(graph, p, q, &self.visited).map(Some)
        })
    }
}

fn same_entity(graph: &Graph, x: InstanceId, y: InstanceId) -> Result<bool> {
    Ok(graph.descriptor_of(x)?.id == graph.descriptor_of(y)?.id)
}

fn into_items(value: Value) -> Vec<Value> {
    match value {
        Value::List(items) => items,
        _ => Vec::new(),
    }
}
