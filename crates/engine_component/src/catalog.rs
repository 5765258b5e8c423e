//! The component catalog.
//!
//! The catalog is the process-wide enumeration of component kinds. It is built
//! once at startup and then shared read-only by every pool and layout.

use crate::archetype::Archetype;
use crate::component::{Component, ComponentMeta, ComponentTypeId, MAX_COMPONENT_KINDS};
use crate::error::CatalogError;

/// The fixed table of registered component kinds, indexed by identity.
///
/// Besides the kinds themselves the catalog holds a small alias table: a
/// lookup for an aliased kind on a record that lacks it falls back to another
/// kind with the same memory layout. This lets two kinds be treated as
/// interchangeable for access without any subtyping relationship.
#[derive(Debug, Clone)]
pub struct ComponentCatalog {
    kinds: [Option<ComponentMeta>; MAX_COMPONENT_KINDS],
    aliases: [Option<ComponentTypeId>; MAX_COMPONENT_KINDS],
}

impl ComponentCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kinds: [None; MAX_COMPONENT_KINDS],
            aliases: [None; MAX_COMPONENT_KINDS],
        }
    }

    /// Register the component type `T` under its own identity.
    ///
    /// # Errors
    ///
    /// See [`ComponentCatalog::register_meta`].
    pub fn register<T: Component>(&mut self) -> Result<ComponentTypeId, CatalogError> {
        self.register_meta(T::meta())
    }

    /// Register the component type `T` under an explicit identity and name.
    ///
    /// A Rust type may be registered under several identities; each is a
    /// separate kind that happens to share a memory layout.
    ///
    /// # Errors
    ///
    /// See [`ComponentCatalog::register_meta`].
    pub fn register_as<T: 'static>(
        &mut self,
        type_id: ComponentTypeId,
        name: &'static str,
    ) -> Result<ComponentTypeId, CatalogError> {
        self.register_meta(ComponentMeta::of::<T>(type_id, name))
    }

    /// Register a kind described by `meta`.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is out of range or taken, if the name
    /// is taken, or if the kind has zero size.
    pub fn register_meta(&mut self, meta: ComponentMeta) -> Result<ComponentTypeId, CatalogError> {
        let id = meta.type_id;
        if !id.is_valid() {
            return Err(CatalogError::OutOfRange(id));
        }
        if let Some(existing) = &self.kinds[id.index()] {
            return Err(CatalogError::DuplicateId {
                id,
                existing: existing.name,
            });
        }
        if self.lookup(meta.name).is_some() {
            return Err(CatalogError::DuplicateName(meta.name));
        }
        if meta.size() == 0 {
            return Err(CatalogError::ZeroSized(meta.name));
        }

        self.kinds[id.index()] = Some(meta);
        Ok(id)
    }

    /// Make lookups of `lookup` fall back to `fallback` on records that do
    /// not contain `lookup` themselves.
    ///
    /// # Errors
    ///
    /// Returns an error if either kind is unregistered, if the two kinds
    /// differ in layout or Rust type, or if the alias would form a chain
    /// (`fallback` is itself aliased, or `lookup` is already a fallback).
    pub fn alias(
        &mut self,
        lookup: ComponentTypeId,
        fallback: ComponentTypeId,
    ) -> Result<(), CatalogError> {
        let lookup_meta = self.meta(lookup).ok_or(CatalogError::UnknownKind(lookup))?;
        let fallback_meta = self
            .meta(fallback)
            .ok_or(CatalogError::UnknownKind(fallback))?;

        if lookup == fallback
            || lookup_meta.layout != fallback_meta.layout
            || lookup_meta.rust_type != fallback_meta.rust_type
        {
            return Err(CatalogError::AliasMismatch {
                lookup: lookup_meta.name,
                fallback: fallback_meta.name,
            });
        }

        let lookup_is_fallback = self.aliases.iter().any(|alias| *alias == Some(lookup));
        if self.aliases[fallback.index()].is_some() || lookup_is_fallback {
            return Err(CatalogError::AliasChain {
                lookup: lookup_meta.name,
                fallback: fallback_meta.name,
            });
        }

        self.aliases[lookup.index()] = Some(fallback);
        Ok(())
    }

    /// Returns the kind that lookups of `kind` fall back to, if any.
    #[must_use]
    pub fn alias_of(&self, kind: ComponentTypeId) -> Option<ComponentTypeId> {
        if !kind.is_valid() {
            return None;
        }
        self.aliases[kind.index()]
    }

    /// Returns the metadata registered under `kind`.
    #[must_use]
    pub fn meta(&self, kind: ComponentTypeId) -> Option<&ComponentMeta> {
        if !kind.is_valid() {
            return None;
        }
        self.kinds[kind.index()].as_ref()
    }

    /// Returns `true` if `kind` is registered.
    #[must_use]
    pub fn contains(&self, kind: ComponentTypeId) -> bool {
        self.meta(kind).is_some()
    }

    /// Find a kind by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ComponentTypeId> {
        self.iter().find(|meta| meta.name == name).map(|meta| meta.type_id)
    }

    /// Build an archetype from kind names.
    ///
    /// Returns the first unknown name as the error.
    pub fn archetype_of<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Archetype, &'a str> {
        names.into_iter().try_fold(Archetype::EMPTY, |archetype, name| {
            self.lookup(name).map(|kind| archetype.with(kind)).ok_or(name)
        })
    }

    /// The set of all registered kinds.
    #[must_use]
    pub fn registered(&self) -> Archetype {
        self.iter().map(|meta| meta.type_id).collect()
    }

    /// Iterate registered kinds in ascending identity order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentMeta> {
        self.kinds.iter().flatten()
    }

    /// Returns the number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns `true` if no kinds are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ComponentCatalog {
    fn default() -> Self {
        Self::new()
    }
}
