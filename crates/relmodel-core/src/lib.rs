//! relmodel Core - Metamodel-driven object graph runtime
//!
//! This crate provides a declarative metamodel and the runtime that enforces
//! it over an in-memory graph of instances, including:
//! - Entity/property declarations with multiple inheritance, resolved into
//!   immutable descriptors by a shared registry
//! - A dispatcher that guards every property read and write
//! - Automatic inverse (bidirectional) relationship maintenance
//! - Embedding closures driving cascading delete and cycle-safe cloning
//! - Structural equality, normalized distance and in-place merge
//!
//! A [`Graph`] is single-threaded and mutated through `&mut`; a [`Registry`]
//! is shared across graphs behind an `Arc`.

pub use relmodel_core_types as core_types;

pub mod clone;
pub mod compare;
pub mod config;
pub mod convert;
pub mod errors;
pub mod graph;
pub mod logging_facility;
pub mod meta;
pub mod ops;
pub mod rules;
pub mod value;

// Re-export commonly used types
pub use clone::{clone_all, clone_instance, TranslationTable};
pub use compare::{distance, structural_equals, update_with};
pub use config::RuntimeConfig;
pub use convert::{ConverterTable, ScalarConverter};
pub use core_types::{EntityId, InstanceId, PropertyId};
pub use errors::{ExError, ExErrorKind, ModelError, Result};
pub use graph::{ChangeEvent, ChangeKind, EditLog, EditRecord, Graph, MutationContext};
pub use meta::{
    CloneStrategy, EmbeddingRule, EntityDecl, EntityDescriptor, HookKind, PropertyDecl,
    PropertyDescriptor, Registry, SchemaDocument,
};
pub use value::{Value, ValueType};
