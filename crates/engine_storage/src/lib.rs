//! # engine_storage
//!
//! Archetype storage for the engine: where entity records live and how they
//! are found again.
//!
//! This crate provides:
//!
//! - [`pool`]: a paged free-list allocator, one per archetype, whose records
//!   never move.
//! - [`world`]: the pool registry and live-entity index.
//! - [`entity`]: entity ids and reference-counted handles with deferred
//!   reclamation.
//! - [`builder`]: the spawn protocol that places components into a record.
//! - [`query`]: superset-matching scans across pools.
//! - [`config`]: storage configuration.
//! - [`error`]: storage-layer error types.
//!
//! Everything here is single-threaded: pools, handles and queries are
//! `!Send`.

pub mod builder;
pub mod config;
pub mod entity;
pub mod error;
pub mod page;
pub mod pool;
pub mod query;
pub mod world;

pub use builder::EntityBuilder;
pub use config::{DEFAULT_PAGE_CAPACITY, PAGE_CAPACITY_ENV, StorageConfig};
pub use entity::{EntityAllocator, EntityHandle, EntityId};
pub use error::{ConfigError, StorageError};
pub use page::{MAX_PAGE_CAPACITY, SlotState};
pub use pool::{Pool, Slot};
pub use query::{Ptr, Query, QueryDescriptor, QueryParam, RawQuery, RawRow};
pub use world::{PoolStats, World};
