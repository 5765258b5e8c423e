//! Archetype bit-sets.
//!
//! An archetype is the exact set of component kinds a group of entities owns.
//! Equality selects a storage pool; the superset test selects the pools that
//! take part in a query.

use serde::{Deserialize, Serialize};

use crate::component::{ComponentTypeId, MAX_COMPONENT_KINDS};

const _: () = assert!(MAX_COMPONENT_KINDS <= u16::BITS as usize);

/// An immutable bit-set over component kind identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Archetype(u16);

impl Archetype {
    /// The archetype with no kinds.
    pub const EMPTY: Archetype = Archetype(0);

    /// Build an archetype from a raw bit mask.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Returns the raw bit mask.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Build an archetype from a list of kinds. Order and duplicates do not
    /// matter.
    ///
    /// # Panics
    ///
    /// Panics if a kind identity is out of range.
    #[must_use]
    pub fn from_kinds(kinds: impl IntoIterator<Item = ComponentTypeId>) -> Self {
        kinds.into_iter().fold(Self::EMPTY, Self::with)
    }

    /// Returns a copy of this archetype with `kind` added.
    ///
    /// # Panics
    ///
    /// Panics if `kind` is out of range.
    #[must_use]
    pub const fn with(self, kind: ComponentTypeId) -> Self {
        assert!(kind.is_valid(), "component kind identity out of range");
        Self(self.0 | (1 << kind.0))
    }

    /// Returns a copy of this archetype with `kind` removed.
    #[must_use]
    pub const fn without(self, kind: ComponentTypeId) -> Self {
        if !kind.is_valid() {
            return self;
        }
        Self(self.0 & !(1 << kind.0))
    }

    /// Returns `true` if this archetype contains `kind`.
    #[must_use]
    pub const fn contains(self, kind: ComponentTypeId) -> bool {
        kind.is_valid() && self.0 & (1 << kind.0) != 0
    }

    /// Returns `true` if every kind in `other` is present in `self`.
    #[must_use]
    pub const fn contains_all(self, other: Archetype) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if the two archetypes share at least one kind.
    #[must_use]
    pub const fn intersects(self, other: Archetype) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns the union of two archetypes.
    #[must_use]
    pub const fn union(self, other: Archetype) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns the number of kinds in this archetype.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Returns `true` if this archetype has no kinds.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate the kinds in ascending identity order.
    pub fn kinds(self) -> impl Iterator<Item = ComponentTypeId> {
        (0..MAX_COMPONENT_KINDS as u8)
            .map(ComponentTypeId)
            .filter(move |&kind| self.contains(kind))
    }
}

impl FromIterator<ComponentTypeId> for Archetype {
    fn from_iter<I: IntoIterator<Item = ComponentTypeId>>(iter: I) -> Self {
        Self::from_kinds(iter)
    }
}

impl std::fmt::Display for Archetype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, kind) in self.kinds().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", kind.0)?;
        }
        write!(f, "}}")
    }
}
