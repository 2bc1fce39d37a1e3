use relmodel_core_types::{InstanceId, PropertyId};

use crate::errors::Result;
use crate::graph::Graph;
use crate::ops::dispatch::peek;
use crate::value::Value;

/// One broken structural rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub instance: InstanceId,
    pub property: PropertyId,
    pub reason: String,
}

/// Find references whose inverse does not point back
///
/// Only live holders and live targets are checked; missing or deleted
/// targets are reported by [`find_dangling_references`].
///
/// Returns violations in instance allocation order.
pub fn find_inverse_violations(graph: &Graph) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();

    for holder in graph.live_instance_ids() {
        let entity = graph.descriptor_of(holder)?;
        for pd in entity.entity_properties() {
            let Some(q) = &pd.inverse else {
                continue;
            };
            for target in peek(graph, holder, pd.id.as_str())?.refs() {
                if !graph.contains(target) || graph.is_deleted(target)? {
                    continue;
                }
                let back = peek(graph, target, q.as_str())?;
                let points_back = match &back {
                    Value::List(items) => items.contains(&Value::Ref(holder)),
                    other => other.as_instance() == Some(holder),
                };
                if !points_back {
                    violations.push(Violation {
                        instance: holder,
                        property: pd.id.clone(),
                        reason: format!("{}.{} does not point back", target, q),
                    });
                }
            }
        }
    }

    Ok(violations)
}

/// Find live instances referencing missing or deleted instances
pub fn find_dangling_references(graph: &Graph) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();

    for holder in graph.live_instance_ids() {
        let entity = graph.descriptor_of(holder)?;
        for pd in entity.entity_properties() {
            for target in peek(graph, holder, pd.id.as_str())?.refs() {
                let reason = if !graph.contains(target) {
                    format!("references missing instance {}", target)
                } else if graph.is_deleted(target)? {
                    format!("references deleted instance {}", target)
                } else {
                    continue;
                };
                violations.push(Violation {
                    instance: holder,
                    property: pd.id.clone(),
                    reason,
                });
            }
        }
    }

    Ok(violations)
}
