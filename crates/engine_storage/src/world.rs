//! The pool registry and live-entity index.
//!
//! The [`World`] maps each archetype to exactly one [`Pool`], creating pools
//! lazily the first time an archetype is requested and never removing them.
//! It also indexes every live entity by id and (optionally) by name, which is
//! what "destroying" an entity removes it from.

use std::collections::HashMap;
use std::rc::Rc;

use engine_component::{Archetype, ComponentCatalog, RecordLayout};
use tracing::{debug, trace};

use crate::builder::EntityBuilder;
use crate::config::StorageConfig;
use crate::entity::{EntityAllocator, EntityHandle, EntityId};
use crate::error::StorageError;
use crate::pool::Pool;
use crate::query::{Query, QueryDescriptor, QueryParam, RawQuery};

/// A live entity as seen by the index.
#[derive(Debug)]
struct LiveEntity {
    handle: EntityHandle,
    name: Option<String>,
}

/// Per-pool occupancy figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// The pool's archetype.
    pub archetype: Archetype,
    /// Size of one record in bytes.
    pub record_size: usize,
    /// Pages allocated.
    pub pages: usize,
    /// Records not on a free chain.
    pub live: usize,
    /// Total records across all pages.
    pub capacity: usize,
}

/// The storage core's entry point: catalog, pools, and live entities.
#[derive(Debug)]
pub struct World {
    catalog: ComponentCatalog,
    config: StorageConfig,
    allocator: EntityAllocator,
    /// Pools in creation order.
    pools: Vec<Rc<Pool>>,
    /// Exact archetype -> index into `pools`.
    pool_index: HashMap<Archetype, usize>,
    live: HashMap<EntityId, LiveEntity>,
    names: HashMap<String, EntityId>,
}

impl World {
    /// Create a world with the default [`StorageConfig`].
    #[must_use]
    pub fn new(catalog: ComponentCatalog) -> Self {
        Self {
            catalog,
            config: StorageConfig::default(),
            allocator: EntityAllocator::new(),
            pools: Vec::new(),
            pool_index: HashMap::new(),
            live: HashMap::new(),
            names: HashMap::new(),
        }
    }

    /// Create a world with an explicit config.
    ///
    /// # Errors
    ///
    /// Returns an error if the config fails validation.
    pub fn with_config(
        catalog: ComponentCatalog,
        config: StorageConfig,
    ) -> Result<Self, StorageError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new(catalog)
        })
    }

    /// The component catalog.
    #[must_use]
    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }

    /// The storage config.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Returns the pool for `archetype`, creating it if this is the first
    /// request for that exact archetype.
    ///
    /// # Errors
    ///
    /// Returns an error if the archetype names an unregistered kind or its
    /// pages would overflow the address space.
    pub fn pool_for(&mut self, archetype: Archetype) -> Result<Rc<Pool>, StorageError> {
        if let Some(&index) = self.pool_index.get(&archetype) {
            return Ok(Rc::clone(&self.pools[index]));
        }

        let layout = RecordLayout::compute(archetype, &self.catalog)?;
        let record_size = layout.record_size();
        let pool = Pool::new(layout, self.config.page_capacity).ok_or(
            StorageError::PageTooLarge {
                archetype,
                capacity: self.config.page_capacity,
            },
        )?;
        let pool = Rc::new(pool);

        self.pool_index.insert(archetype, self.pools.len());
        self.pools.push(Rc::clone(&pool));
        debug!(
            %archetype,
            record_size,
            page_capacity = self.config.page_capacity,
            pools = self.pools.len(),
            "created archetype pool"
        );
        Ok(pool)
    }

    /// Returns the pool for `archetype` if one exists.
    #[must_use]
    pub fn pool(&self, archetype: Archetype) -> Option<&Rc<Pool>> {
        self.pool_index
            .get(&archetype)
            .map(|&index| &self.pools[index])
    }

    /// Every pool, in creation order.
    #[must_use]
    pub fn pools(&self) -> &[Rc<Pool>] {
        &self.pools
    }

    /// Pools whose archetype contains every kind in `required`.
    #[must_use]
    pub fn matching_pools(&self, required: Archetype) -> Vec<Rc<Pool>> {
        self.matching(&QueryDescriptor {
            required,
            ..QueryDescriptor::new()
        })
    }

    fn matching(&self, descriptor: &QueryDescriptor) -> Vec<Rc<Pool>> {
        self.pools
            .iter()
            .filter(|pool| descriptor.matches(pool.archetype()))
            .cloned()
            .collect()
    }

    /// Start building an entity of `archetype`.
    ///
    /// # Errors
    ///
    /// Returns an error if no pool can be created for the archetype.
    pub fn create_entity(&mut self, archetype: Archetype) -> Result<EntityBuilder<'_>, StorageError> {
        let pool = self.pool_for(archetype)?;
        Ok(EntityBuilder::new(self, pool))
    }

    /// Logically destroy an entity.
    ///
    /// The entity leaves the id and name indexes and stops appearing in
    /// queries immediately. Its record is reclaimed once the last
    /// [`EntityHandle`] clone drops, which is right away unless the caller
    /// still holds one.
    ///
    /// # Panics
    ///
    /// Panics if the entity is not live in this world (for instance if it
    /// was already destroyed), or if `handle` belongs to another world whose
    /// entity happens to share its id.
    pub fn destroy(&mut self, handle: &EntityHandle) {
        let id = handle.id();
        if let Some(entry) = self.live.get(&id) {
            assert!(
                entry.handle.ptr_eq(handle),
                "{id} destroyed through a handle not owned by this world"
            );
        }
        self.destroy_id(id);
    }

    /// Logically destroy the entity with the given id.
    ///
    /// # Panics
    ///
    /// Panics if the entity is not live in this world.
    pub fn destroy_id(&mut self, id: EntityId) {
        let Some(entry) = self.live.remove(&id) else {
            panic!("{id} destroyed while not live");
        };
        if let Some(name) = &entry.name {
            self.names.remove(name);
        }

        let (page, slot) = entry.handle.location();
        entry.handle.pool().retire(page, slot);
        trace!(
            entity = %id,
            outstanding = entry.handle.handle_count() - 1,
            "destroyed entity"
        );
    }

    /// Returns `true` if the entity is live.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.live.contains_key(&id)
    }

    /// The handle of a live entity.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&EntityHandle> {
        self.live.get(&id).map(|entry| &entry.handle)
    }

    /// The handle of a live entity registered under `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&EntityHandle> {
        self.names.get(name).and_then(|id| self.entity(*id))
    }

    /// Iterate every live entity (in no particular order).
    pub fn entities(&self) -> impl Iterator<Item = &EntityHandle> {
        self.live.values().map(|entry| &entry.handle)
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.live.len()
    }

    /// Returns the number of archetype pools.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.pools.len()
    }

    /// Occupancy of every pool, in creation order.
    #[must_use]
    pub fn pool_stats(&self) -> Vec<PoolStats> {
        self.pools
            .iter()
            .map(|pool| PoolStats {
                archetype: pool.archetype(),
                record_size: pool.layout().record_size(),
                pages: pool.page_count(),
                live: pool.live_count(),
                capacity: pool.capacity(),
            })
            .collect()
    }

    /// Scan every occupied record of every pool matching `descriptor`.
    ///
    /// The set of pools is fixed when the query is created.
    #[must_use]
    pub fn query_raw(&self, descriptor: QueryDescriptor) -> RawQuery<'_> {
        RawQuery::new(self.matching(&descriptor), descriptor)
    }

    /// Typed scan. `Q` is a [`Ptr`](crate::Ptr), an `Option<Ptr<_>>`, or a
    /// tuple of those.
    #[must_use]
    pub fn query<Q: QueryParam>(&self) -> Query<'_, Q> {
        let descriptor = Q::describe(QueryDescriptor::new());
        Query::new(self.matching(&descriptor))
    }

    pub(crate) fn allocate_id(&mut self) -> EntityId {
        self.allocator.allocate()
    }

    pub(crate) fn insert_live(&mut self, handle: EntityHandle, name: Option<String>) {
        let id = handle.id();
        if let Some(name) = &name {
            self.names.insert(name.clone(), id);
        }
        self.live.insert(id, LiveEntity { handle, name });
    }
}
