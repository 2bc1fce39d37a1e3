//! Greedy list reconciliation
//!
//! Pairs elements of two lists by ascending distance, favoring earlier pairs
//! on ties. Not globally optimal; O(n³) in the worst case.

use crate::errors::Result;

/// An element of the right list with no partner on the left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addition {
    pub right_index: usize,
    /// Position in the left list after removals are applied
    pub insert_at: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListMatching {
    /// (left index, right index), ascending by left index
    pub matched: Vec<(usize, usize)>,
    /// Ascending by right index
    pub added: Vec<Addition>,
    /// Unmatched left indices, ascending
    pub removed: Vec<usize>,
}

impl ListMatching {
    pub fn unmatched(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

/// Reconcile `left` against `right`
///
/// `distance` returns `None` for incompatible pairs; only pairs strictly
/// below `threshold` are matched.
///
/// # Errors
///
/// Propagates the first error returned by `distance`.
pub fn reconcile<T, F>(
    left: &[T],
    right: &[T],
    threshold: f64,
    mut distance: F,
) -> Result<ListMatching>
where
    F: FnMut(&T, &T) -> Result<Option<f64>>,
{
    let mut matrix: Vec<Vec<Option<f64>>> = Vec::with_capacity(left.len());
    for l in left {
        let mut row = Vec::with_capacity(right.len());
        for r in right {
            row.push(distance(l, r)?);
        }
        matrix.push(row);
    }

    let mut left_partner: Vec<Option<usize>> = vec![None; left.len()];
    let mut right_taken = vec![false; right.len()];

    loop {
        let mut best: Option<(usize, usize, f64)> = None;
        for (i, row) in matrix.iter().enumerate() {
            if left_partner[i].is_some() {
                continue;
            }
            for (j, d) in row.iter().enumerate() {
                if right_taken[j] {
                    continue;
                }
                let Some(d) = *d else { continue };
                if d >= threshold {
                    continue;
                }
                if best.map(|(_, _, b)| d < b).unwrap_or(true) {
                    best = Some((i, j, d));
                }
            }
        }
        let Some((i, j, _)) = best else { break };
        left_partner[i] = Some(j);
        right_taken[j] = true;
    }

    let matched: Vec<(usize, usize)> = left_partner
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.map(|j| (i, j)))
        .collect();
    let removed: Vec<usize> = left_partner
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_none())
        .map(|(i, _)| i)
        .collect();

    let added = (0..right.len())
        .filter(|j| !right_taken[*j])
        .map(|j| {
            let anchor = matched
                .iter()
                .filter(|(_, rj)| *rj < j)
                .max_by_key(|(_, rj)| *rj)
                .map(|(li, _)| *li);
            let insert_at = match anchor {
                Some(li) => li - removed.iter().filter(|r| **r < li).count() + 1,
                None => 0,
            };
            Addition {
                right_index: j,
                insert_at,
            }
        })
        .collect();

    Ok(ListMatching {
        matched,
        added,
        removed,
    })
}
