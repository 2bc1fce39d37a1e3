//! Embedding closures
//!
//! A closure is the set of instances reachable from a set of roots through
//! embedding properties, plus an externally supplied context. Conditional
//! (when-resolved) candidates are evaluated once, in worklist order, and
//! discarded if their companions are not yet resolved.

use indexmap::IndexSet;
use relmodel_core_types::InstanceId;
use std::collections::VecDeque;

use super::dispatch::peek;
use crate::errors::Result;
use crate::graph::Graph;
use crate::meta::{EmbeddingRule, PropertyDescriptor};

/// Which embedding rule the closure follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureKind {
    /// Structural embedding; used by clone
    Structural,
    /// Deletion embedding; used by delete
    Deletion,
}

impl ClosureKind {
    fn rule<'p>(&self, pd: &'p PropertyDescriptor) -> &'p EmbeddingRule {
        match self {
            ClosureKind::Structural => &pd.embed,
            ClosureKind::Deletion => &pd.delete_embed,
        }
    }
}

/// Compute the closure of `roots` together with `context`
///
/// The result contains the context, then the roots, then reached instances in
/// discovery order.
///
/// # Errors
///
/// Returns `InstanceNotFound` if a root, context member or reference is not in the graph.
pub fn compute_closure(
    graph: &Graph,
    roots: &[InstanceId],
    context: &IndexSet<InstanceId>,
    kind: ClosureKind,
) -> Result<IndexSet<InstanceId>> {
    let mut closure: IndexSet<InstanceId> = context.clone();
    closure.extend(roots.iter().copied());
    let mut queue: VecDeque<InstanceId> = closure.iter().copied().collect();

    while let Some(current) = queue.pop_front() {
        let entity = graph.descriptor_of(current)?;
        for pd in entity.entity_properties() {
            let rule = kind.rule(pd);
            if rule.is_none() {
                continue;
            }
            for candidate in peek(graph, current, pd.id.as_str())?.refs() {
                if closure.contains(&candidate) {
                    continue;
                }
                if companions_resolved(graph, candidate, rule, &closure)? {
                    tracing::trace!(instance_id = %candidate, via = %pd.id, "embedded");
                    closure.insert(candidate);
                    queue.push_back(candidate);
                }
            }
        }
    }

    tracing::debug!(
        roots = roots.len(),
        closure_len = closure.len(),
        kind = ?kind,
        "closure computed"
    );
    Ok(closure)
}

fn companions_resolved(
    graph: &Graph,
    candidate: InstanceId,
    rule: &EmbeddingRule,
    closure: &IndexSet<InstanceId>,
) -> Result<bool> {
    for companion in rule.companions() {
        let refs = peek(graph, candidate, companion.as_str())?.refs();
        if refs.is_empty() || !refs.iter().all(|r| closure.contains(r)) {
            return Ok(false);
        }
    }
    Ok(true)
}
