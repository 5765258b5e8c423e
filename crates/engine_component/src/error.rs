//! Catalog and layout error types.

use crate::component::ComponentTypeId;

/// Errors raised while building a [`ComponentCatalog`](crate::ComponentCatalog).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// The identity does not fit below `MAX_COMPONENT_KINDS`.
    #[error("component kind {0} exceeds the catalog capacity")]
    OutOfRange(ComponentTypeId),

    /// Another kind is already registered under this identity.
    #[error("component kind {id} is already registered as `{existing}`")]
    DuplicateId {
        /// The contested identity.
        id: ComponentTypeId,
        /// Name of the kind already holding it.
        existing: &'static str,
    },

    /// Another kind already uses this name.
    #[error("component name `{0}` is already registered")]
    DuplicateName(&'static str),

    /// Kinds must own at least one byte.
    #[error("component kind `{0}` has zero size")]
    ZeroSized(&'static str),

    /// An alias refers to a kind that has not been registered.
    #[error("cannot alias unregistered component kind {0}")]
    UnknownKind(ComponentTypeId),

    /// Aliased kinds must share memory layout and Rust type.
    #[error("component kinds `{lookup}` and `{fallback}` are not interchangeable")]
    AliasMismatch {
        /// Name of the kind being looked up.
        lookup: &'static str,
        /// Name of the kind it falls back to.
        fallback: &'static str,
    },

    /// Aliases resolve in one step; a fallback cannot itself fall back.
    #[error("aliasing `{lookup}` to `{fallback}` would form an alias chain")]
    AliasChain {
        /// Name of the kind being looked up.
        lookup: &'static str,
        /// Name of the kind it would fall back to.
        fallback: &'static str,
    },
}

/// Errors raised by the layout calculator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// The archetype names a kind the catalog does not know.
    #[error("archetype contains unregistered component kind {0}")]
    UnregisteredKind(ComponentTypeId),
}
