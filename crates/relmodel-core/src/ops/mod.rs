//! Operations on instances
//!
//! All functions take the graph explicitly; nothing here holds state of its own.

pub mod closure;
pub mod dispatch;
mod inverse;
pub mod lifecycle;

pub use closure::{compute_closure, ClosureKind};
pub use dispatch::{add, add_at, get, read, read_refs, reindex, remove, remove_at, set};
pub use lifecycle::{
    before_serialize, begin_deserialize, clear_modified, create, create_for_deserialize, delete,
    delete_in_context, end_deserialize, initialize, undelete,
};
