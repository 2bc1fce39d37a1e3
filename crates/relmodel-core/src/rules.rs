//! Read-only structural checks over a graph

pub mod invariants;
pub mod validation;

pub use invariants::{find_dangling_references, find_inverse_violations, Violation};
pub use validation::validate_graph;
