//! Normalized distance between instances of one entity
//!
//! `distance = Σ(weight · contribution) / Σ(weight)` over the relevant
//! properties where at least one side is non-empty. Scalars weigh 1, SINGLE
//! references weigh the target entity's relevant property count, lists
//! weigh their longer length.

use relmodel_core_types::InstanceId;
use std::collections::{HashMap, HashSet};

use super::matching::reconcile;
use crate::convert::ConverterTable;
use crate::errors::Result;
use crate::graph::Graph;
use crate::meta::PropertyDescriptor;
use crate::ops::dispatch;
use crate::value::{Value, ValueType};

/// Distance in `[0, 1]` between two instances
///
/// Instances of different entities are at distance 1. A pair already under
/// comparison counts as 0.
///
/// # Errors
///
/// Returns `InstanceNotFound` for ids missing from the graph, or a
/// definition error if a referenced entity fails to resolve.
pub fn distance(graph: &Graph, a: InstanceId, b: InstanceId) -> Result<f64> {
    let assumed = HashMap::new();
    let d = Distance::new(graph, &assumed).instances(a, b)?;
    tracing::trace!(left = %a, right = %b, distance = d, "distance");
    Ok(d)
}

/// Distance with pairs already known to correspond counted as 0
pub(crate) fn distance_with(
    graph: &Graph,
    a: InstanceId,
    b: InstanceId,
    assumed: &HashMap<InstanceId, InstanceId>,
) -> Result<f64> {
    Distance::new(graph, assumed).instances(a, b)
}

/// Levenshtein distance of the text forms, over the longer length
pub fn scalar_distance(
    converters: &ConverterTable,
    value_type: &ValueType,
    a: &Value,
    b: &Value,
) -> f64 {
    if a == b {
        return 0.0;
    }
    let left = converters.to_text(value_type, a);
    let right = converters.to_text(value_type, b);
    let longest = left.chars().count().max(right.chars().count());
    if longest == 0 {
        return 0.0;
    }
    strsim::levenshtein(&left, &right) as f64 / longest as f64
}

struct Distance<'g> {
    graph: &'g Graph,
    assumed: &'g HashMap<InstanceId, InstanceId>,
    in_progress: HashSet<(InstanceId, InstanceId)>,
}

impl<'g> Distance<'g> {
    fn new(graph: &'g Graph, assumed: &'g HashMap<InstanceId, InstanceId>) -> Self {
        Self {
            graph,
            assumed,
            in_progress: HashSet::new(),
        }
    }

    fn instances(&mut self, a: InstanceId, b: InstanceId) -> Result<f64> {
        if a == b || self.assumed.get(&a) == Some(&b) {
            return Ok(0.0);
        }
        let left = self.graph.descriptor_of(a)?;
        let right = self.graph.descriptor_of(b)?;
        if left.id != right.id {
            return Ok(1.0);
        }
        if !self.in_progress.insert((a, b)) {
            return Ok(0.0);
        }

        let result = self.weighted(a, b, &left.relevant_properties().collect::<Vec<_>>());
        self.in_progress.remove(&(a, b));
        result
    }

    fn weighted(
        &mut self,
        a: InstanceId,
        b: InstanceId,
        properties: &[&PropertyDescriptor],
    ) -> Result<f64> {
        let mut total = 0.0;
        let mut weights = 0.0;
        for pd in properties {
            let va = dispatch::current(self.graph, a, pd)?;
            let vb = dispatch::current(self.graph, b, pd)?;
            if va.is_empty() && vb.is_empty() {
                continue;
            }
            let (weight, contribution) = self.property(pd, &va, &vb)?;
            total += weight * contribution;
            weights += weight;
        }
        if weights == 0.0 {
            return Ok(0.0);
        }
        Ok(total / weights)
    }

    fn property(&mut self, pd: &PropertyDescriptor, va: &Value, vb: &Value) -> Result<(f64, f64)> {
        if pd.is_list() {
            let xs = va.as_list().unwrap_or(&[]);
            let ys = vb.as_list().unwrap_or(&[]);
            let weight = xs.len().max(ys.len()) as f64;
            return Ok((weight, self.lists(pd, xs, ys)?));
        }

        if let Some(target) = pd.target_entity() {
            let relevant = self
                .graph
                .registry()
                .resolve(target.as_str())?
                .relevant_properties()
                .count();
            let weight = relevant.max(1) as f64;
            let contribution = match (va.as_instance(), vb.as_instance()) {
                (Some(x), Some(y)) => self.instances(x, y)?,
                (None, None) => 0.0,
                _ => 1.0,
            };
            return Ok((weight, contribution));
        }

        let converters = self.graph.registry().converters();
        Ok((1.0, scalar_distance(converters, &pd.value_type, va, vb)))
    }

    /// Reconciliation cost of two lists
    fn lists(&mut self, pd: &PropertyDescriptor, xs: &[Value], ys: &[Value]) -> Result<f64> {
        let graph = self.graph;
        let threshold = graph.config().match_threshold;
        let converters = graph.registry().converters();
        let mut pair_distance = |x: &Value, y: &Value| -> Result<Option<f64>> {
            match (x.as_instance(), y.as_instance()) {
                (Some(p), Some(q)) => {
                    let same_entity = graph.descriptor_of(p)?.id == graph.descriptor_of(q)?.id;
                    if !same_entity {
                        return Ok(None);
                    }
                    self.instances(p, q).map(Some)
                }
                (None, None) => Ok(Some(scalar_distance(converters, &pd.value_type, x, y))),
                _ => Ok(None),
            }
        };
        let matching = reconcile(xs, ys, threshold, &mut pair_distance)?;

        let mut matched_cost = 0.0;
        for (i, j) in &matching.matched {
            matched_cost += pair_distance(&xs[*i], &ys[*j])?.unwrap_or(1.0);
        }
        let count = matching.matched.len() + matching.unmatched();
        if count == 0 {
            return Ok(0.0);
        }
        Ok((matched_cost + matching.unmatched() as f64) / count as f64)
    }
}
