//! Core [`Component`] trait and associated metadata.
//!
//! Component kinds form a small, fixed enumeration. Every kind has a stable
//! integer identity ([`ComponentTypeId`]) below [`MAX_COMPONENT_KINDS`] and a
//! fixed byte size. The storage core never interprets component bytes; it only
//! needs the size, the alignment, and (for typed kinds) a way to drop a value
//! in place.

use std::alloc::Layout;
use std::any::TypeId;

use serde::{Deserialize, Serialize};

/// Upper bound on the number of distinct component kinds.
///
/// Archetypes are stored as a `u16` bit-set, so this cannot exceed 16.
pub const MAX_COMPONENT_KINDS: usize = 16;

/// The stable identity of a component kind.
///
/// Identities are small integers shared process-wide. They also define the
/// packing order of a record: fields are laid out in ascending identity order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u8);

impl ComponentTypeId {
    /// Create an identity from its raw index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`MAX_COMPONENT_KINDS`].
    #[must_use]
    pub const fn new(index: u8) -> Self {
        assert!(
            (index as usize) < MAX_COMPONENT_KINDS,
            "component kind identity exceeds MAX_COMPONENT_KINDS"
        );
        Self(index)
    }

    /// Returns the identity as an array index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns `true` if the identity fits in the catalog.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        (self.0 as usize) < MAX_COMPONENT_KINDS
    }
}

impl std::fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Metadata about a component kind, used for type-erased storage.
#[derive(Debug, Clone, Copy)]
pub struct ComponentMeta {
    /// The kind's identity.
    pub type_id: ComponentTypeId,
    /// The human-readable name of the kind (e.g. `"Transform"`).
    pub name: &'static str,
    /// Size and alignment of one instance.
    pub layout: Layout,
    /// Function pointer to drop an instance in place. `None` for kinds that
    /// need no destructor.
    pub drop_fn: Option<unsafe fn(*mut u8)>,
    /// The Rust type stored under this kind, or `None` for raw byte kinds.
    pub rust_type: Option<TypeId>,
}

impl ComponentMeta {
    /// Describe the Rust type `T` stored under an explicit identity.
    #[must_use]
    pub fn of<T: 'static>(type_id: ComponentTypeId, name: &'static str) -> Self {
        Self {
            type_id,
            name,
            layout: Layout::new::<T>(),
            drop_fn: if std::mem::needs_drop::<T>() {
                Some(drop_erased::<T> as unsafe fn(*mut u8))
            } else {
                None
            },
            rust_type: Some(TypeId::of::<T>()),
        }
    }

    /// Describe a raw kind: `size` plain bytes with no destructor.
    ///
    /// Raw kinds are zero-filled when an entity is spawned without them.
    #[must_use]
    pub fn raw(type_id: ComponentTypeId, name: &'static str, size: usize) -> Self {
        Self {
            type_id,
            name,
            // Alignment 1 is always a power of two, so this cannot fail
            // unless `size` overflows `isize`.
            layout: Layout::from_size_align(size, 1).unwrap_or_else(|_| {
                panic!("raw component kind `{name}` is too large: {size} bytes")
            }),
            drop_fn: None,
            rust_type: None,
        }
    }

    /// Size of one instance in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Returns `true` if this kind stores plain bytes rather than a Rust type.
    #[must_use]
    pub fn is_raw(&self) -> bool {
        self.rust_type.is_none()
    }
}

/// Drop a `T` stored at `ptr`.
///
/// # Safety
///
/// `ptr` must point to a valid, initialised, suitably aligned `T` that is not
/// used again afterwards.
unsafe fn drop_erased<T>(ptr: *mut u8) {
    // SAFETY: Upheld by the caller.
    unsafe { std::ptr::drop_in_place(ptr.cast::<T>()) }
}

/// The core component trait.
///
/// A component is plain data with a fixed identity. The storage core places it
/// at a byte offset inside an archetype record and drops it there when the
/// owning entity is reclaimed.
///
/// # Examples
///
/// ```rust
/// use engine_component::{Component, ComponentTypeId};
///
/// #[derive(Debug, Clone)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {
///     const TYPE_ID: ComponentTypeId = ComponentTypeId::new(3);
///
///     fn type_name() -> &'static str { "Health" }
/// }
/// ```
pub trait Component: 'static + Sized {
    /// The kind identity this type is stored under.
    const TYPE_ID: ComponentTypeId;

    /// A human-readable name for this component kind.
    fn type_name() -> &'static str;

    /// Returns the [`ComponentMeta`] descriptor for this component kind.
    fn meta() -> ComponentMeta {
        ComponentMeta::of::<Self>(Self::TYPE_ID, Self::type_name())
    }
}
