//! Structural equality, distance and merge

pub mod distance;
pub mod equality;
pub mod matching;
pub mod merge;

pub use distance::{distance, scalar_distance};
pub use equality::structural_equals;
pub use matching::{reconcile, Addition, ListMatching};
pub use merge::update_with;
