use crate::errors::{ModelError, Result};
use crate::graph::Graph;

use super::invariants::{self, Violation};

fn into_error(violation: Violation) -> ModelError {
    ModelError::IntegrityViolation {
        instance: violation.instance,
        property: violation.property,
        reason: violation.reason,
    }
}

/// Validate every live instance of the graph
///
/// Dangling references are checked before inverse symmetry.
///
/// # Errors
///
/// Returns the first violation as `IntegrityViolation`. For exhaustive
/// reporting, call the individual invariant functions directly.
pub fn validate_graph(graph: &Graph) -> Result<()> {
    if let Some(violation) = invariants::find_dangling_references(graph)?.into_iter().next() {
        return Err(into_error(violation));
    }
    if let Some(violation) = invariants::find_inverse_violations(graph)?.into_iter().next() {
        return Err(into_error(violation));
    }
    tracing::debug!(instances = graph.len(), "graph validated");
    Ok(())
}
