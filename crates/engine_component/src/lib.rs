//! # engine_component
//!
//! The "C" in ECS: what a component kind is, how kinds combine into
//! archetypes, and where each kind lives inside an archetype's record.
//!
//! This crate provides:
//!
//! - [`Component`] trait and [`ComponentMeta`]: the contract and the
//!   type-erased descriptor of a component kind.
//! - [`ComponentCatalog`]: the fixed enumeration of kinds, plus the alias
//!   table for interchangeable kinds.
//! - [`Archetype`]: a bit-set over kind identities.
//! - [`RecordLayout`]: the layout calculator.

pub mod archetype;
pub mod catalog;
pub mod component;
pub mod error;
pub mod layout;

pub use archetype::Archetype;
pub use catalog::ComponentCatalog;
pub use component::{Component, ComponentMeta, ComponentTypeId, MAX_COMPONENT_KINDS};
pub use error::{CatalogError, LayoutError};
pub use layout::{FieldLayout, LINK_FIELD_SIZE, RecordLayout};
