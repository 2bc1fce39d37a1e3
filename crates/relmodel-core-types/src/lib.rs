//! Core types shared across relmodel facilities
//!
//! This crate provides foundational types used by the metamodel, the
//! instance graph, and the error and logging facilities:
//!
//! - **Identifiers**: EntityId, PropertyId, InstanceId
//! - **Schema constants**: Canonical field keys and event names

pub mod ids;
pub mod schema;

pub use ids::{EntityId, InstanceId, PropertyId};
