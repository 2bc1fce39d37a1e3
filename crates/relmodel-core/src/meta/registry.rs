use indexmap::IndexMap;
use relmodel_core_types::{EntityId, InstanceId};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use super::declaration::{EntityDecl, SchemaDocument};
use super::descriptor::EntityDescriptor;
use super::resolve::{CombinedEntity, Resolver};
use crate::convert::{ConverterTable, ScalarConverter};
use crate::errors::{ModelError, Result};
use crate::graph::Graph;
use crate::{log_op_end, log_op_error, log_op_start};

/// Lifecycle points at which per-entity hooks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Initialize,
    BeforeSerialize,
    AfterDeserialize,
}

/// Callback registered for an entity and inherited by its descendants
pub type Hook = Arc<dyn Fn(&mut Graph, InstanceId) -> Result<()> + Send + Sync>;

/// Collects declarations, converters and hooks before building a [`Registry`]
#[derive(Default)]
pub struct RegistryBuilder {
    entities: Vec<EntityDecl>,
    converters: Option<ConverterTable>,
    hooks: Vec<(EntityId, HookKind, Hook)>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, decl: EntityDecl) -> Self {
        self.entities.push(decl);
        self
    }

    pub fn schema(mut self, document: SchemaDocument) -> Self {
        self.entities.extend(document.entities);
        self
    }

    /// Register a converter for a named custom scalar type
    pub fn converter(
        mut self,
        name: impl Into<String>,
        converter: Arc<dyn ScalarConverter>,
    ) -> Self {
        self.converters
            .get_or_insert_with(ConverterTable::with_defaults)
            .register(name, converter);
        self
    }

    pub fn hook<F>(mut self, entity: impl Into<EntityId>, kind: HookKind, hook: F) -> Self
    where
        F: Fn(&mut Graph, InstanceId) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.push((entity.into(), kind, Arc::new(hook)));
        self
    }

    /// Freeze the declarations into an immutable registry
    ///
    /// Entities are resolved lazily; only structural problems of the
    /// declaration set itself are reported here.
    ///
    /// # Errors
    ///
    /// * `DuplicateEntity` - an entity id is declared twice
    /// * `UnknownEntity` - a parent or hook names an undeclared entity
    pub fn build(self) -> Result<Registry> {
        let mut entities: IndexMap<EntityId, EntityDecl> = IndexMap::new();
        for decl in self.entities {
            if entities.contains_key(&decl.id) {
                return Err(ModelError::DuplicateEntity { entity: decl.id });
            }
            entities.insert(decl.id.clone(), decl);
        }

        for decl in entities.values() {
            if let Some(parent) = decl.parents.iter().find(|p| !entities.contains_key(*p)) {
                return Err(ModelError::UnknownEntity {
                    entity: parent.clone(),
                });
            }
        }

        let mut hooks: HashMap<(EntityId, HookKind), Vec<Hook>> = HashMap::new();
        for (entity, kind, hook) in self.hooks {
            if !entities.contains_key(&entity) {
                return Err(ModelError::UnknownEntity { entity });
            }
            hooks.entry((entity, kind)).or_default().push(hook);
        }

        tracing::debug!(entities = entities.len(), "registry built");

        Ok(Registry {
            entities,
            converters: self.converters.unwrap_or_else(ConverterTable::with_defaults),
            hooks,
            cache: RwLock::new(HashMap::new()),
            resolving: Mutex::new(HashMap::new()),
        })
    }
}

/// Immutable metamodel: declarations plus a cache of resolved descriptors
///
/// Shared as `Arc<Registry>`. Lookups hit a read-locked cache; resolution of
/// an entity not yet cached is serialized and the first result wins.
pub struct Registry {
    entities: IndexMap<EntityId, EntityDecl>,
    converters: ConverterTable,
    hooks: HashMap<(EntityId, HookKind), Vec<Hook>>,
    cache: RwLock<HashMap<EntityId, Arc<EntityDescriptor>>>,
    resolving: Mutex<HashMap<EntityId, Arc<CombinedEntity>>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn converters(&self) -> &ConverterTable {
        &self.converters
    }

    /// Declared entity ids, in declaration order
    pub fn entity_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.keys()
    }

    pub fn declaration(&self, id: &str) -> Option<&EntityDecl> {
        self.entities.get(id)
    }

    /// Resolve an entity into its canonical descriptor
    ///
    /// Repeated calls return the same `Arc`.
    ///
    /// # Errors
    ///
    /// Returns a definition error if the entity, any ancestor or any entity
    /// its inverses and embeddings refer to is malformed. Failed resolutions
    /// are not cached.
    pub fn resolve(&self, id: &str) -> Result<Arc<EntityDescriptor>> {
        if let Some(found) = self.cached(id)? {
            return Ok(found);
        }

        log_op_start!("resolve", entity_id = id);
        let start = Instant::now();
        let descriptor = self.resolve_slow(id).map_err(|e| {
            log_op_error!(
                "resolve",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;
        log_op_end!(
            "resolve",
            duration_ms = start.elapsed().as_millis() as u64,
            properties = descriptor.properties.len()
        );
        Ok(descriptor)
    }

    fn cached(&self, id: &str) -> Result<Option<Arc<EntityDescriptor>>> {
        let cache = self.cache.read().map_err(|_| ModelError::poisoned("registry cache"))?;
        Ok(cache.get(id).cloned())
    }

    fn resolve_slow(&self, id: &str) -> Result<Arc<EntityDescriptor>> {
        let mut combined = self
            .resolving
            .lock()
            .map_err(|_| ModelError::poisoned("registry resolution"))?;

        // another caller may have finished while we waited
        if let Some(found) = self.cached(id)? {
            return Ok(found);
        }

        let entity = EntityId::from(id);
        let descriptor = Resolver::new(&self.entities, &mut combined)
            .finalize(&entity, &self.converters)?;
        let descriptor = Arc::new(descriptor);

        let mut cache = self
            .cache
            .write()
            .map_err(|_| ModelError::poisoned("registry cache"))?;
        Ok(cache.entry(entity).or_insert(descriptor).clone())
    }

    /// Resolve every declared entity, in declaration order
    ///
    /// # Errors
    ///
    /// Returns the first definition error encountered.
    pub fn resolve_all(&self) -> Result<Vec<Arc<EntityDescriptor>>> {
        self.entities.keys().map(|id| self.resolve(id.as_str())).collect()
    }

    /// True if `entity` is `ancestor` or descends from it
    ///
    /// # Errors
    ///
    /// Returns a definition error if `entity` does not resolve.
    pub fn is_a(&self, entity: &str, ancestor: &str) -> Result<bool> {
        Ok(self.resolve(entity)?.is_a(&EntityId::from(ancestor)))
    }

    /// Entity types reachable from `entity` through structural embedding
    ///
    /// Computed once per entity and cached in its descriptor.
    ///
    /// # Errors
    ///
    /// Returns a definition error if any reached entity does not resolve.
    pub fn embedded_entities(&self, entity: &str) -> Result<BTreeSet<EntityId>> {
        let descriptor = self.resolve(entity)?;
        if let Some(found) = descriptor.embedded_cache().get() {
            return Ok(found.clone());
        }

        let mut reached = BTreeSet::new();
        let mut queue = VecDeque::from([descriptor.clone()]);
        while let Some(current) = queue.pop_front() {
            for pd in current.properties.values().filter(|p| !p.embed.is_none()) {
                if let Some(target) = pd.target_entity() {
                    if reached.insert(target.clone()) {
                        queue.push_back(self.resolve(target.as_str())?);
                    }
                }
            }
        }

        Ok(descriptor.embedded_cache().get_or_init(|| reached).clone())
    }

    /// Hooks of `kind` registered on the entity or its ancestors, ancestors first
    ///
    /// # Errors
    ///
    /// Returns a definition error if `entity` does not resolve.
    pub fn hooks_for(&self, entity: &str, kind: HookKind) -> Result<Vec<Hook>> {
        let descriptor = self.resolve(entity)?;
        Ok(descriptor
            .lineage
            .iter()
            .filter_map(|e| self.hooks.get(&(e.clone(), kind)))
            .flatten()
            .cloned()
            .collect())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entities", &self.entities.keys().collect::<Vec<_>>())
            .field("converters", &self.converters)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
