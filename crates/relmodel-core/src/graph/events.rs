//! Change notifications and edit records
//!
//! Subscribers observe individual mutations; an [`EditLog`] sink receives one
//! record per canonical mutation so an undo collaborator can invert it.

use relmodel_core_types::{EntityId, InstanceId, PropertyId};
use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::value::Value;

/// What happened to a property (or the instance as a whole)
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    Set { old: Value, new: Value },
    Added { value: Value, index: usize },
    Removed { value: Value, index: usize },
    Moved { value: Value, from: usize, to: usize },
    Deleted,
    Undeleted,
}

/// Notification delivered to an instance's subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub instance: InstanceId,
    /// `None` for whole-instance events (deletion, undeletion)
    pub property: Option<PropertyId>,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

pub type Subscriber = Box<dyn FnMut(&ChangeEvent)>;

/// One canonical mutation, with enough data to invert it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditRecord {
    Created {
        instance: InstanceId,
        entity: EntityId,
    },
    Set {
        instance: InstanceId,
        property: PropertyId,
        old: Value,
        new: Value,
    },
    Added {
        instance: InstanceId,
        property: PropertyId,
        value: Value,
        index: usize,
    },
    Removed {
        instance: InstanceId,
        property: PropertyId,
        value: Value,
        index: usize,
    },
    Moved {
        instance: InstanceId,
        property: PropertyId,
        value: Value,
        from: usize,
        to: usize,
    },
    Deleted {
        instance: InstanceId,
    },
    Undeleted {
        instance: InstanceId,
    },
}

impl EditRecord {
    pub fn instance(&self) -> InstanceId {
        match self {
            EditRecord::Created { instance, .. }
            | EditRecord::Set { instance, .. }
            | EditRecord::Added { instance, .. }
            | EditRecord::Removed { instance, .. }
            | EditRecord::Moved { instance, .. }
            | EditRecord::Deleted { instance }
            | EditRecord::Undeleted { instance } => *instance,
        }
    }

    pub(crate) fn from_change(event: &ChangeEvent) -> Option<Self> {
        let instance = event.instance;
        let record = match (&event.kind, &event.property) {
            (ChangeKind::Set { old, new }, Some(p)) => EditRecord::Set {
                instance,
                property: p.clone(),
                old: old.clone(),
                new: new.clone(),
            },
            (ChangeKind::Added { value, index }, Some(p)) => EditRecord::Added {
                instance,
                property: p.clone(),
                value: value.clone(),
                index: *index,
            },
            (ChangeKind::Removed { value, index }, Some(p)) => EditRecord::Removed {
                instance,
                property: p.clone(),
                value: value.clone(),
                index: *index,
            },
            (ChangeKind::Moved { value, from, to }, Some(p)) => EditRecord::Moved {
                instance,
                property: p.clone(),
                value: value.clone(),
                from: *from,
                to: *to,
            },
            (ChangeKind::Deleted, _) => EditRecord::Deleted { instance },
            (ChangeKind::Undeleted, _) => EditRecord::Undeleted { instance },
            _ => return None,
        };
        Some(record)
    }
}

/// Sink for edit records
pub trait EditLog {
    fn record(&mut self, record: EditRecord);
}

/// In-memory edit log; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct RecordingEditLog {
    records: Arc<Mutex<Vec<EditRecord>>>,
}

impl RecordingEditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        self.records.lock().map(|mut r| r.clear()).ok();
    }
}

impl EditLog for RecordingEditLog {
    fn record(&mut self, record: EditRecord) {
        self.records.lock().map(|mut r| r.push(record)).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_log_clones_share_buffer() {
        let log = RecordingEditLog::new();
        let mut sink = log.clone();
        let instance = InstanceId::new();
        sink.record(EditRecord::Deleted { instance });
        assert_eq!(log.records(), vec![EditRecord::Deleted { instance }]);
        log.clear();
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_set_event_maps_to_record() {
        let instance = InstanceId::new();
        let event = ChangeEvent {
            instance,
            property: Some(PropertyId::from("name")),
            kind: ChangeKind::Set {
                old: Value::Null,
                new: Value::from("a"),
            },
        };
        let record = EditRecord::from_change(&event).unwrap();
        assert_eq!(record.instance(), instance);
        assert!(matches!(record, EditRecord::Set { .. }));
    }

    #[test]
    fn test_record_serializes_with_kind_tag() {
        let record = EditRecord::Undeleted {
            instance: InstanceId::new(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "undeleted");
    }
}
