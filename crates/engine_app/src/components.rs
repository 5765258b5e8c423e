//! Demo component kinds.
//!
//! The storage core only cares about size and identity; the meaning of these
//! fields lives entirely in the frame systems in [`crate::tick`].

use engine_component::{CatalogError, Component, ComponentCatalog, ComponentMeta, ComponentTypeId};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position, rotation, and scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Transform {
    /// World-space position.
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    /// Per-axis scale.
    pub scale: Vec3,
}

impl Transform {
    /// The identity transform: origin, no rotation, unit scale.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// A transform at `position` with identity rotation and scale.
    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Component for Transform {
    const TYPE_ID: ComponentTypeId = ComponentTypeId::new(0);

    fn type_name() -> &'static str {
        "Transform"
    }
}

/// Linear velocity in units per second.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Velocity(pub Vec3);

impl Component for Velocity {
    const TYPE_ID: ComponentTypeId = ComponentTypeId::new(1);

    fn type_name() -> &'static str {
        "Velocity"
    }
}

/// A renderable mesh reference.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mesh {
    /// Index into the mesh table.
    pub id: u32,
}

impl Component for Mesh {
    const TYPE_ID: ComponentTypeId = ComponentTypeId::new(2);

    fn type_name() -> &'static str {
        "Mesh"
    }
}

/// Stored as a [`Mesh`]; renderers asking for `Mesh` fall back to it.
pub const SKINNED_MESH: ComponentTypeId = ComponentTypeId::new(3);

/// Seconds left before the entity is destroyed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Lifetime {
    /// Remaining time in seconds.
    pub remaining: f32,
}

impl Component for Lifetime {
    const TYPE_ID: ComponentTypeId = ComponentTypeId::new(4);

    fn type_name() -> &'static str {
        "Lifetime"
    }
}

/// Opaque collision bytes owned by an external physics module.
pub const COLLIDER: ComponentTypeId = ComponentTypeId::new(5);

/// Size of the collider blob.
pub const COLLIDER_SIZE: usize = 32;

/// Build the catalog used by the demo.
///
/// # Errors
///
/// Returns an error if two kinds collide, which indicates a bug in this
/// module.
pub fn catalog() -> Result<ComponentCatalog, CatalogError> {
    let mut catalog = ComponentCatalog::new();
    catalog.register::<Transform>()?;
    catalog.register::<Velocity>()?;
    catalog.register::<Mesh>()?;
    catalog.register_as::<Mesh>(SKINNED_MESH, "SkinnedMesh")?;
    catalog.register::<Lifetime>()?;
    catalog.register_meta(ComponentMeta::raw(COLLIDER, "Collider", COLLIDER_SIZE))?;
    catalog.alias(Mesh::TYPE_ID, SKINNED_MESH)?;
    Ok(catalog)
}
