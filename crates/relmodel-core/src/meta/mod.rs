//! Metamodel: declarations, canonical descriptors and the resolving registry

pub mod declaration;
pub mod descriptor;
pub mod registry;
mod resolve;

pub use declaration::{
    Accessors, Cardinality, CloneStrategy, EmbeddingRule, EntityDecl, PropertyDecl,
    SchemaDocument,
};
pub use descriptor::{EntityDescriptor, PropertyDescriptor};
pub use registry::{Hook, HookKind, Registry, RegistryBuilder};
