//! Instance arena for one object graph
//!
//! A `Graph` owns its instances and shares the registry. It is not internally
//! synchronized: every mutation takes `&mut Graph`.

pub mod events;
pub mod instance;

use relmodel_core_types::{InstanceId, PropertyId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::errors::{ModelError, Result};
use crate::meta::{EntityDescriptor, Registry};
use crate::value::Value;

pub use events::{
    ChangeEvent, ChangeKind, EditLog, EditRecord, RecordingEditLog, Subscriber, SubscriptionId,
};
pub use instance::{Instance, InstanceFlags};

/// Why the graph is currently being mutated
///
/// Every context other than `User` is privileged: write-accessor and
/// deleted-instance restrictions are lifted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationContext {
    User,
    Deserializing,
    Cloning,
    Deleting,
    Undeleting,
    Merging,
    Inverse,
}

pub struct Graph {
    registry: Arc<Registry>,
    config: RuntimeConfig,
    pub(crate) instances: HashMap<InstanceId, Instance>,
    context: Vec<MutationContext>,
    /// In-flight SINGLE writes, keyed by holder and property
    pub(crate) scheduled_sets: HashMap<(InstanceId, PropertyId), Value>,
    subscriptions: HashMap<InstanceId, Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: u64,
    edit_log: Option<Box<dyn EditLog>>,
}

impl Graph {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_config(registry, RuntimeConfig::default())
    }

    pub fn with_config(registry: Arc<Registry>, config: RuntimeConfig) -> Self {
        Self {
            registry,
            config,
            instances: HashMap::new(),
            context: Vec::new(),
            scheduled_sets: HashMap::new(),
            subscriptions: HashMap::new(),
            next_subscription: 0,
            edit_log: None,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Route edit records to `log`, replacing any previous sink
    pub fn set_edit_log(&mut self, log: impl EditLog + 'static) {
        self.edit_log = Some(Box::new(log));
    }

    pub fn clear_edit_log(&mut self) {
        self.edit_log = None;
    }

    /// Get an instance by ID, deleted or not
    ///
    /// # Errors
    ///
    /// Returns `InstanceNotFound` if the id was never allocated in this graph.
    pub fn instance(&self, id: InstanceId) -> Result<&Instance> {
        self.instances
            .get(&id)
            .ok_or(ModelError::InstanceNotFound { instance: id })
    }

    pub(crate) fn instance_mut(&mut self, id: InstanceId) -> Result<&mut Instance> {
        self.instances
            .get_mut(&id)
            .ok_or(ModelError::InstanceNotFound { instance: id })
    }

    pub(crate) fn insert(&mut self, instance: Instance) {
        self.instances.insert(instance.id(), instance);
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains_key(&id)
    }

    /// # Errors
    ///
    /// Returns `InstanceNotFound` for unknown ids.
    pub fn descriptor_of(&self, id: InstanceId) -> Result<Arc<EntityDescriptor>> {
        Ok(self.instance(id)?.descriptor().clone())
    }

    /// # Errors
    ///
    /// Returns `InstanceNotFound` for unknown ids.
    pub fn is_deleted(&self, id: InstanceId) -> Result<bool> {
        Ok(self.instance(id)?.flags.deleted)
    }

    /// # Errors
    ///
    /// Returns `InstanceNotFound` for unknown ids.
    pub fn is_modified(&self, id: InstanceId) -> Result<bool> {
        Ok(self.instance(id)?.flags.modified)
    }

    /// All instance ids, in allocation order
    pub fn instance_ids(&self) -> Vec<InstanceId> {
        let mut ids: Vec<InstanceId> = self.instances.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Ids of instances not deleted, in allocation order
    pub fn live_instance_ids(&self) -> Vec<InstanceId> {
        let mut ids: Vec<InstanceId> = self
            .instances
            .values()
            .filter(|i| !i.flags.deleted)
            .map(Instance::id)
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn current_context(&self) -> MutationContext {
        self.context.last().copied().unwrap_or(MutationContext::User)
    }

    pub fn is_privileged(&self) -> bool {
        self.current_context() != MutationContext::User
    }

    /// Run `f` with `context` pushed; the previous context is restored on any outcome
    pub(crate) fn with_context<T>(
        &mut self,
        context: MutationContext,
        f: impl FnOnce(&mut Graph) -> Result<T>,
    ) -> Result<T> {
        self.context.push(context);
        let result = f(self);
        self.context.pop();
        result
    }

    /// Receive change events for one instance until unsubscribed or deleted
    pub fn subscribe(
        &mut self,
        instance: InstanceId,
        callback: impl FnMut(&ChangeEvent) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscriptions
            .entry(instance)
            .or_default()
            .push((id, Box::new(callback)));
        id
    }

    /// Returns false when the subscription was not found
    pub fn unsubscribe(&mut self, instance: InstanceId, subscription: SubscriptionId) -> bool {
        let Some(subs) = self.subscriptions.get_mut(&instance) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|(id, _)| *id != subscription);
        before != subs.len()
    }

    pub(crate) fn release_subscriptions(&mut self, instance: InstanceId) {
        self.subscriptions.remove(&instance);
    }

    /// Deliver a change event to subscribers and the edit log
    ///
    /// Suppressed entirely while the instance is being deserialized.
    pub(crate) fn emit(&mut self, event: ChangeEvent) {
        let deserializing = self
            .instances
            .get(&event.instance)
            .map(|i| i.flags.deserializing)
            .unwrap_or(false);
        if deserializing {
            return;
        }
        if let Some(subs) = self.subscriptions.get_mut(&event.instance) {
            for (_, callback) in subs.iter_mut() {
                callback(&event);
            }
        }
        if let Some(record) = EditRecord::from_change(&event) {
            self.record(record);
        }
    }

    pub(crate) fn record(&mut self, record: EditRecord) {
        let deserializing = self
            .instances
            .get(&record.instance())
            .map(|i| i.flags.deserializing)
            .unwrap_or(false);
        if deserializing {
            return;
        }
        if let Some(log) = self.edit_log.as_mut() {
            log.record(record);
        }
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("instances", &self.instances.len())
            .field("context", &self.context)
            .field("config", &self.config)
            .finish()
    }
}
