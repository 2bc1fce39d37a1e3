use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use relmodel_core_types::{EntityId, InstanceId, PropertyId};
use std::sync::Arc;

use crate::meta::EntityDescriptor;
use crate::value::Value;

/// Lifecycle and re-entrancy flags of one instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceFlags {
    pub deleted: bool,
    pub deleting: bool,
    pub undeleting: bool,
    pub initializing: bool,
    pub initialized: bool,
    /// Set by persistent mutations; interpreted only by external codecs
    pub modified: bool,
    pub being_cloned: bool,
    pub deserializing: bool,
}

/// One object in a graph, bound to its entity for life
///
/// Values are written only through the dispatcher in [`crate::ops`].
#[derive(Debug, Clone)]
pub struct Instance {
    id: InstanceId,
    descriptor: Arc<EntityDescriptor>,
    pub(crate) values: IndexMap<PropertyId, Value>,
    pub(crate) flags: InstanceFlags,
    /// Entity-typed values captured at deletion, replayed by undelete
    pub(crate) deletion_snapshot: Vec<(PropertyId, Value)>,
    created_at: DateTime<Utc>,
}

impl Instance {
    pub(crate) fn new(id: InstanceId, descriptor: Arc<EntityDescriptor>) -> Self {
        Self {
            id,
            descriptor,
            values: IndexMap::new(),
            flags: InstanceFlags::default(),
            deletion_snapshot: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn entity(&self) -> &EntityId {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    pub fn flags(&self) -> &InstanceFlags {
        &self.flags
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.deleted
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Stored value, without materializing defaults
    pub fn stored(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }
}
