//! Entity construction.
//!
//! Spawning acquires a record first and then places each component directly at
//! its offset. The record only becomes an entity once every kind of the
//! archetype holds a value; until then the builder owns it and gives it back
//! to the pool if construction is abandoned.

use std::ptr::NonNull;
use std::rc::Rc;

use engine_component::{Archetype, Component, ComponentTypeId, FieldLayout};
use tracing::trace;

use crate::entity::{EntityHandle, assert_field_type};
use crate::error::StorageError;
use crate::pool::{Pool, Slot};
use crate::world::World;

/// Places component values into a freshly acquired record.
///
/// Created by [`World::create_entity`]. Raw byte kinds that are never placed
/// are zero-filled at [`EntityBuilder::spawn`]; typed kinds must be placed.
#[must_use = "the record is released unless `spawn` is called"]
pub struct EntityBuilder<'w> {
    world: &'w mut World,
    pool: Rc<Pool>,
    slot: Slot,
    placed: Archetype,
    name: Option<String>,
    spawned: bool,
}

impl<'w> EntityBuilder<'w> {
    pub(crate) fn new(world: &'w mut World, pool: Rc<Pool>) -> Self {
        let slot = pool.acquire();
        Self {
            world,
            pool,
            slot,
            placed: Archetype::EMPTY,
            name: None,
            spawned: false,
        }
    }

    /// The archetype being built.
    pub fn archetype(&self) -> Archetype {
        self.pool.archetype()
    }

    /// Place component `T`.
    ///
    /// # Panics
    ///
    /// Panics if the archetype does not contain `T`.
    pub fn with<T: Component>(self, value: T) -> Self {
        self.with_kind(T::TYPE_ID, value)
    }

    /// Place a value of type `T` under an explicit kind.
    ///
    /// # Panics
    ///
    /// Panics if the archetype does not contain `kind` or if `kind` is not
    /// stored as `T`.
    pub fn with_kind<T: 'static>(mut self, kind: ComponentTypeId, value: T) -> Self {
        let field = self.own_field(kind);
        assert_field_type::<T>(&field);
        let ptr = self.field_ptr(&field).cast::<T>();

        if self.placed.contains(kind) {
            // SAFETY: The field already holds a `T` placed by this builder.
            drop(unsafe { ptr.as_ptr().replace(value) });
        } else {
            // SAFETY: The field lies inside the record and is aligned for `T`.
            unsafe { ptr.as_ptr().write(value) };
            self.placed = self.placed.with(kind);
        }
        self
    }

    /// Copy bytes into a raw kind.
    ///
    /// # Panics
    ///
    /// Panics if the archetype does not contain `kind`, if `kind` stores a Rust
    /// type, or if `bytes` is not exactly the kind's size.
    pub fn with_bytes(mut self, kind: ComponentTypeId, bytes: &[u8]) -> Self {
        let field = self.own_field(kind);
        assert!(
            field.rust_type.is_none(),
            "component kind {kind} stores a Rust type; place it with `with`"
        );
        assert_eq!(
            bytes.len(),
            field.size,
            "byte slice size mismatch for component kind {kind}"
        );
        let ptr = self.field_ptr(&field);
        // SAFETY: The field is `field.size` bytes inside the record and cannot
        // overlap a caller-provided slice.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), field.size) };
        self.placed = self.placed.with(kind);
        self
    }

    /// Register the entity under a unique name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Finish construction and add the entity to the world.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::MissingComponent`] if a typed kind was never
    /// placed, or [`StorageError::DuplicateName`] if the name is taken. The
    /// record is released in both cases.
    pub fn spawn(mut self) -> Result<EntityHandle, StorageError> {
        if let Some(name) = &self.name
            && self.world.find(name).is_some()
        {
            return Err(StorageError::DuplicateName(name.clone()));
        }

        let fields: Vec<FieldLayout> = self.pool.layout().fields().to_vec();
        for field in &fields {
            if self.placed.contains(field.kind) {
                continue;
            }
            if field.rust_type.is_some() {
                let name = self
                    .world
                    .catalog()
                    .meta(field.kind)
                    .map_or("<unregistered>", |meta| meta.name);
                return Err(StorageError::MissingComponent {
                    kind: field.kind,
                    name,
                });
            }
            // SAFETY: The field is `field.size` bytes inside the record.
            unsafe { self.field_ptr(field).as_ptr().write_bytes(0, field.size) };
            self.placed = self.placed.with(field.kind);
        }

        self.spawned = true;
        let id = self.world.allocate_id();
        let handle = EntityHandle::new(id, Rc::clone(&self.pool), self.slot);
        trace!(entity = %id, archetype = %self.archetype(), "spawned entity");
        self.world.insert_live(handle.clone(), self.name.take());
        Ok(handle)
    }

    /// The field that `kind` itself occupies; alias fallbacks are not
    /// accepted for construction.
    fn own_field(&self, kind: ComponentTypeId) -> FieldLayout {
        match self.pool.layout().field(kind) {
            Some(field) if field.kind == kind => *field,
            _ => panic!(
                "archetype {} has no component kind {kind}",
                self.archetype()
            ),
        }
    }

    fn field_ptr(&self, field: &FieldLayout) -> NonNull<u8> {
        // SAFETY: Field offsets lie inside the record.
        unsafe { self.slot.record.add(field.offset) }
    }
}

impl Drop for EntityBuilder<'_> {
    fn drop(&mut self) {
        if self.spawned {
            return;
        }
        for field in self.pool.layout().fields() {
            if self.placed.contains(field.kind)
                && let Some(drop_fn) = field.drop_fn
            {
                // SAFETY: The field holds a value placed by this builder.
                unsafe { drop_fn(self.field_ptr(field).as_ptr()) };
            }
        }
        self.pool.release(self.slot.page, self.slot.index);
        trace!(archetype = %self.archetype(), "abandoned entity construction");
    }
}
