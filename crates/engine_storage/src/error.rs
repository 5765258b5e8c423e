//! Storage-layer error types.
//!
//! Only conditions a caller can reasonably act on are errors. Broken
//! invariants (double destroy, releasing a free slot, typed access with the
//! wrong Rust type) panic instead: continuing would corrupt a free list or
//! hand out a pointer into the wrong bytes.

use engine_component::{Archetype, ComponentTypeId, LayoutError};

/// Errors in a [`StorageConfig`](crate::StorageConfig).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Pages must hold at least one record.
    #[error("page capacity must be greater than zero")]
    ZeroPageCapacity,

    /// Slot indices must stay clear of the header sentinels.
    #[error("page capacity {requested} exceeds the maximum of {max}")]
    PageCapacityTooLarge {
        /// The configured capacity.
        requested: u32,
        /// The largest supported capacity.
        max: u32,
    },

    /// An environment override could not be parsed.
    #[error("invalid value `{value}` for {var}")]
    InvalidEnv {
        /// The environment variable.
        var: &'static str,
        /// Its raw value.
        value: String,
    },
}

/// Errors raised by the [`World`](crate::World) and its pools.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The storage configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The archetype could not be laid out.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// One page of this archetype would not fit in the address space.
    #[error("pages of archetype {archetype} with capacity {capacity} overflow the address space")]
    PageTooLarge {
        /// The archetype being pooled.
        archetype: Archetype,
        /// The configured page capacity.
        capacity: u32,
    },

    /// A typed component was not provided before spawning.
    #[error("component `{name}` ({kind}) was not provided at spawn")]
    MissingComponent {
        /// The missing kind.
        kind: ComponentTypeId,
        /// Its catalog name.
        name: &'static str,
    },

    /// Another live entity already uses this name.
    #[error("an entity named `{0}` already exists")]
    DuplicateName(String),
}
