//! Entity identifiers and handles.
//!
//! An [`EntityId`] is a plain `u64` name for an entity. An [`EntityHandle`] is
//! the shared-ownership binding between that entity and its record: while any
//! clone of the handle is alive the record stays allocated and readable, and
//! when the last clone drops the components are destroyed and the slot goes
//! back onto its page's free chain.

use std::any::TypeId;
use std::ptr::NonNull;
use std::rc::Rc;

use engine_component::{Archetype, Component, ComponentTypeId, FieldLayout};
use tracing::trace;

use crate::page::SlotState;
use crate::pool::{Pool, Slot};

/// Names an entity within the [`World`](crate::World) that issued it.
///
/// Ids are never reused by their world, and `0` is never issued. Two worlds
/// hand out the same sequence, so an id alone does not say which world an
/// entity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Placeholder id that no world issues.
    pub const NONE: EntityId = EntityId(0);

    /// The id as a plain integer.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns `true` for [`EntityId::NONE`].
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity #{}", self.0)
    }
}

/// Issues a world's entity ids in increasing order.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    issued: u64,
}

impl EntityAllocator {
    /// An allocator that has issued nothing yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { issued: 0 }
    }

    /// Issue the next id.
    ///
    /// # Panics
    ///
    /// Panics once the `u64` id space is used up.
    pub fn allocate(&mut self) -> EntityId {
        self.issued = self
            .issued
            .checked_add(1)
            .unwrap_or_else(|| panic!("entity id space exhausted"));
        EntityId(self.issued)
    }

    /// The most recently issued id, if any.
    #[must_use]
    pub fn last(&self) -> Option<EntityId> {
        (self.issued > 0).then_some(EntityId(self.issued))
    }
}

/// The shared state behind every clone of one [`EntityHandle`].
struct EntityRecord {
    id: EntityId,
    pool: Rc<Pool>,
    slot: Slot,
}

impl Drop for EntityRecord {
    fn drop(&mut self) {
        // SAFETY: Handles are only created for fully initialised records, and
        // this is the last owner.
        unsafe { self.pool.drop_components(self.slot.record) };
        self.pool.release(self.slot.page, self.slot.index);
        trace!(entity = %self.id, page = self.slot.page, slot = self.slot.index, "reclaimed entity record");
    }
}

/// A reference-counted handle to an entity's record.
///
/// Cloning is cheap and shares the record. Component access goes through the
/// owning pool's layout; asking for a kind the archetype lacks returns `None`
/// rather than a pointer into unrelated memory.
///
/// Handles are `!Send`: the storage core runs on a single thread.
#[derive(Clone)]
pub struct EntityHandle {
    inner: Rc<EntityRecord>,
}

impl EntityHandle {
    pub(crate) fn new(id: EntityId, pool: Rc<Pool>, slot: Slot) -> Self {
        Self {
            inner: Rc::new(EntityRecord { id, pool, slot }),
        }
    }

    /// The entity's identifier.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.inner.id
    }

    /// The entity's exact component set.
    #[must_use]
    pub fn archetype(&self) -> Archetype {
        self.inner.pool.archetype()
    }

    /// `(page, slot)` of the record inside its pool.
    #[must_use]
    pub fn location(&self) -> (u32, u32) {
        (self.inner.slot.page, self.inner.slot.index)
    }

    /// Start of the record. Stable for the lifetime of the handle.
    #[must_use]
    pub fn record_ptr(&self) -> NonNull<u8> {
        self.inner.slot.record
    }

    /// The pool that owns the record.
    #[must_use]
    pub fn pool(&self) -> &Rc<Pool> {
        &self.inner.pool
    }

    /// Returns `false` once the entity has been logically destroyed. The
    /// record stays readable until the last handle drops.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        let (page, slot) = self.location();
        self.inner.pool.slot_state(page, slot) == SlotState::Occupied
    }

    /// Number of live clones of this handle.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// Returns `true` if both handles share the same record.
    #[must_use]
    pub fn ptr_eq(&self, other: &EntityHandle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Untyped pointer to the bytes a lookup of `kind` resolves to.
    #[must_use]
    pub fn get_raw(&self, kind: ComponentTypeId) -> Option<NonNull<u8>> {
        let field = self.inner.pool.layout().field(kind)?;
        // SAFETY: Field offsets lie inside the record.
        Some(unsafe { self.inner.slot.record.add(field.offset) })
    }

    /// Typed pointer to component `T`, or `None` if the entity lacks it.
    #[must_use]
    pub fn get<T: Component>(&self) -> Option<NonNull<T>> {
        self.get_kind::<T>(T::TYPE_ID)
    }

    /// Typed pointer to the field a lookup of `kind` resolves to.
    ///
    /// # Panics
    ///
    /// Panics if the field does not store a `T`.
    #[must_use]
    pub fn get_kind<T: 'static>(&self, kind: ComponentTypeId) -> Option<NonNull<T>> {
        let field = self.inner.pool.layout().field(kind)?;
        assert_field_type::<T>(field);
        // SAFETY: Field offsets lie inside the record, and the record is
        // aligned for every field.
        Some(unsafe { self.inner.slot.record.add(field.offset) }.cast::<T>())
    }

    /// Typed pointer to component `T` where the caller already knows it
    /// exists.
    ///
    /// # Panics
    ///
    /// Panics if the entity's archetype does not contain `T`.
    #[must_use]
    pub fn raw_get<T: Component>(&self) -> NonNull<T> {
        self.get::<T>().unwrap_or_else(|| {
            panic!(
                "{} has no `{}` component (archetype {})",
                self.id(),
                T::type_name(),
                self.archetype()
            )
        })
    }

    /// Copy component `T` out of the record.
    #[must_use]
    pub fn read<T: Component + Copy>(&self) -> Option<T> {
        // SAFETY: The record is initialised while any handle is alive, and no
        // reference into it is held across this read.
        self.get::<T>().map(|ptr| unsafe { ptr.read() })
    }

    /// Replace component `T`, dropping the previous value.
    ///
    /// # Errors
    ///
    /// Returns the value back if the entity lacks `T`.
    pub fn set<T: Component>(&self, value: T) -> Result<(), T> {
        match self.get::<T>() {
            Some(ptr) => {
                // SAFETY: The slot holds an initialised `T`; `replace` moves the
                // old value out so it is dropped exactly once.
                drop(unsafe { ptr.as_ptr().replace(value) });
                Ok(())
            }
            None => Err(value),
        }
    }

    /// Shared reference to component `T`.
    ///
    /// # Safety
    ///
    /// No mutable reference to the same component (through any clone of this
    /// handle or through a query pointer) may exist while the returned
    /// reference is alive.
    #[must_use]
    pub unsafe fn get_ref<T: Component>(&self) -> Option<&T> {
        // SAFETY: Upheld by the caller.
        self.get::<T>().map(|ptr| unsafe { ptr.as_ref() })
    }

    /// Mutable reference to component `T`.
    ///
    /// # Safety
    ///
    /// No other reference to the same component may exist while the returned
    /// reference is alive.
    #[must_use]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut<T: Component>(&self) -> Option<&mut T> {
        // SAFETY: Upheld by the caller.
        self.get::<T>().map(|mut ptr| unsafe { ptr.as_mut() })
    }
}

impl std::fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityHandle")
            .field("id", &self.id())
            .field("archetype", &self.archetype())
            .field("location", &self.location())
            .finish()
    }
}

/// Fatal check that typed access matches the stored Rust type.
pub(crate) fn assert_field_type<T: 'static>(field: &FieldLayout) {
    assert!(
        field.rust_type == Some(TypeId::of::<T>()),
        "component kind {} is not stored as `{}`",
        field.kind,
        std::any::type_name::<T>()
    );
}
