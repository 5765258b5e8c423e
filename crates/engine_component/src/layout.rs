//! The layout calculator.
//!
//! Maps an [`Archetype`] to the byte layout of one record: a pointer-sized
//! header followed by each kind's bytes in ascending identity order. The
//! result depends only on the archetype and the catalog, never on request
//! order or history, so every pool and handle for the same archetype agrees
//! on where each component lives.

use std::alloc::Layout;
use std::any::TypeId;

use crate::archetype::Archetype;
use crate::catalog::ComponentCatalog;
use crate::component::{ComponentTypeId, MAX_COMPONENT_KINDS};
use crate::error::LayoutError;

/// Size of the per-record header holding the free-list link or liveness tag.
pub const LINK_FIELD_SIZE: usize = size_of::<usize>();

/// Placement of one component kind inside a record.
#[derive(Debug, Clone, Copy)]
pub struct FieldLayout {
    /// The kind stored in this field.
    pub kind: ComponentTypeId,
    /// Size of the field in bytes.
    pub size: usize,
    /// Byte offset from the start of the record.
    pub offset: usize,
    /// Destructor for the value stored here, if it needs one.
    pub drop_fn: Option<unsafe fn(*mut u8)>,
    /// The Rust type stored here, or `None` for raw byte kinds.
    pub rust_type: Option<TypeId>,
}

/// The record layout of one archetype.
#[derive(Debug, Clone)]
pub struct RecordLayout {
    archetype: Archetype,
    /// Fields in ascending kind order.
    fields: Vec<FieldLayout>,
    /// Kind identity -> index into `fields`, including alias fallbacks.
    lookup: [Option<u8>; MAX_COMPONENT_KINDS],
    record_size: usize,
    align: usize,
}

impl RecordLayout {
    /// Compute the layout for `archetype`.
    ///
    /// Each field offset is rounded up to the kind's alignment and the record
    /// size to the record alignment (never less than pointer alignment, so
    /// the header is always addressable as a `usize`).
    ///
    /// The tight packing identity `record_size == LINK_FIELD_SIZE + sum of
    /// field sizes` is relaxed on purpose: it holds only when every kind's
    /// size is a multiple of the pointer size. A 3-byte raw kind still yields
    /// a 16-byte record on 64-bit targets.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnregisteredKind`] if the archetype names a kind
    /// missing from `catalog`.
    pub fn compute(
        archetype: Archetype,
        catalog: &ComponentCatalog,
    ) -> Result<Self, LayoutError> {
        let mut fields = Vec::with_capacity(archetype.len());
        let mut offset = LINK_FIELD_SIZE;
        let mut align = align_of::<usize>();

        for kind in archetype.kinds() {
            let meta = catalog
                .meta(kind)
                .ok_or(LayoutError::UnregisteredKind(kind))?;
            let kind_align = meta.layout.align();
            offset = offset.next_multiple_of(kind_align);
            fields.push(FieldLayout {
                kind,
                size: meta.size(),
                offset,
                drop_fn: meta.drop_fn,
                rust_type: meta.rust_type,
            });
            offset += meta.size();
            align = align.max(kind_align);
        }

        let mut lookup = [None; MAX_COMPONENT_KINDS];
        for (index, field) in fields.iter().enumerate() {
            lookup[field.kind.index()] = Some(index as u8);
        }
        for kind in 0..MAX_COMPONENT_KINDS {
            if lookup[kind].is_none()
                && let Some(fallback) = catalog.alias_of(ComponentTypeId(kind as u8))
            {
                lookup[kind] = lookup[fallback.index()];
            }
        }

        Ok(Self {
            archetype,
            fields,
            lookup,
            record_size: offset.next_multiple_of(align),
            align,
        })
    }

    /// The archetype this layout was computed for.
    #[must_use]
    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    /// Fields in ascending kind order.
    #[must_use]
    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    /// Total size of one record, header included.
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Alignment of every record.
    #[must_use]
    pub fn align(&self) -> usize {
        self.align
    }

    /// The field that a lookup of `kind` resolves to.
    ///
    /// Absence is an expected answer, not an error: it means records of this
    /// layout do not carry `kind` (nor a kind it is aliased to).
    #[must_use]
    pub fn field(&self, kind: ComponentTypeId) -> Option<&FieldLayout> {
        if !kind.is_valid() {
            return None;
        }
        self.lookup[kind.index()].map(|index| &self.fields[index as usize])
    }

    /// The byte offset a lookup of `kind` resolves to, or `None` if absent.
    #[must_use]
    pub fn offset_of(&self, kind: ComponentTypeId) -> Option<usize> {
        self.field(kind).map(|field| field.offset)
    }

    /// Memory layout of a page holding `capacity` records.
    ///
    /// Returns `None` if the page size overflows.
    #[must_use]
    pub fn page_layout(&self, capacity: usize) -> Option<Layout> {
        let size = self.record_size.checked_mul(capacity)?;
        Layout::from_size_align(size, self.align).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentMeta};

    const A: ComponentTypeId = ComponentTypeId(0);
    const B: ComponentTypeId = ComponentTypeId(1);
    const C: ComponentTypeId = ComponentTypeId(2);

    fn raw_catalog() -> ComponentCatalog {
        let mut catalog = ComponentCatalog::new();
        catalog.register_meta(ComponentMeta::raw(A, "A", 8)).unwrap();
        catalog.register_meta(ComponentMeta::raw(B, "B", 16)).unwrap();
        catalog.register_meta(ComponentMeta::raw(C, "C", 24)).unwrap();
        catalog
    }

    fn summary(layout: &RecordLayout) -> Vec<(ComponentTypeId, usize, usize)> {
        layout
            .fields()
            .iter()
            .map(|field| (field.kind, field.size, field.offset))
            .collect()
    }

    #[test]
    fn test_layout_deterministic() {
        let catalog = raw_catalog();
        for bits in 0u16..8 {
            let archetype = Archetype::from_bits(bits);
            let first = RecordLayout::compute(archetype, &catalog).unwrap();
            let second = RecordLayout::compute(archetype, &catalog).unwrap();
            assert_eq!(summary(&first), summary(&second));
            assert_eq!(first.record_size(), second.record_size());
        }
    }

    #[test]
    fn test_layout_independent_of_request_order() {
        let catalog = raw_catalog();
        let forward = RecordLayout::compute(Archetype::from_kinds([A, B, C]), &catalog).unwrap();
        let backward = RecordLayout::compute(Archetype::from_kinds([C, B, A]), &catalog).unwrap();
        assert_eq!(summary(&forward), summary(&backward));
    }

    #[test]
    fn test_offset_packing() {
        let catalog = raw_catalog();
        for bits in 0u16..8 {
            let archetype = Archetype::from_bits(bits);
            let layout = RecordLayout::compute(archetype, &catalog).unwrap();

            let total: usize = archetype
                .kinds()
                .map(|kind| catalog.meta(kind).unwrap().size())
                .sum();
            assert_eq!(layout.record_size(), LINK_FIELD_SIZE + total);
            assert!(layout.record_size() >= size_of::<usize>());

            let mut expected = LINK_FIELD_SIZE;
            for field in layout.fields() {
                assert_eq!(field.offset, expected);
                expected += field.size;
            }
            assert!(layout.fields().windows(2).all(|w| w[0].kind < w[1].kind));
        }
    }

    #[test]
    fn test_absent_kind_is_none() {
        let catalog = raw_catalog();
        let layout = RecordLayout::compute(Archetype::from_kinds([A, C]), &catalog).unwrap();
        assert_eq!(layout.offset_of(A), Some(LINK_FIELD_SIZE));
        assert_eq!(layout.offset_of(B), None);
        assert_eq!(layout.offset_of(C), Some(LINK_FIELD_SIZE + 8));
        assert_eq!(layout.offset_of(ComponentTypeId(15)), None);
        assert_eq!(layout.offset_of(ComponentTypeId(200)), None);
    }

    #[test]
    fn test_empty_archetype_is_header_only() {
        let layout = RecordLayout::compute(Archetype::EMPTY, &raw_catalog()).unwrap();
        assert_eq!(layout.record_size(), LINK_FIELD_SIZE);
        assert!(layout.fields().is_empty());
    }

    #[test]
    fn test_unregistered_kind_rejected() {
        let err = RecordLayout::compute(Archetype::EMPTY.with(ComponentTypeId(9)), &raw_catalog())
            .unwrap_err();
        assert_eq!(err, LayoutError::UnregisteredKind(ComponentTypeId(9)));
    }

    #[test]
    fn test_alignment_padding() {
        #[derive(Clone, Copy)]
        #[repr(align(32))]
        struct Wide {
            _bytes: [u8; 32],
        }

        impl Component for Wide {
            const TYPE_ID: ComponentTypeId = ComponentTypeId::new(5);

            fn type_name() -> &'static str {
                "Wide"
            }
        }

        let mut catalog = ComponentCatalog::new();
        catalog.register_meta(ComponentMeta::raw(A, "A", 3)).unwrap();
        catalog.register::<Wide>().unwrap();

        let layout =
            RecordLayout::compute(Archetype::from_kinds([A, Wide::TYPE_ID]), &catalog).unwrap();
        assert_eq!(layout.offset_of(A), Some(8));
        assert_eq!(layout.offset_of(Wide::TYPE_ID), Some(32));
        assert_eq!(layout.align(), 32);
        assert_eq!(layout.record_size(), 64);
    }

    #[test]
    fn test_alias_resolves_to_fallback_offset() {
        let mut catalog = ComponentCatalog::new();
        catalog.register_as::<u64>(A, "Mesh").unwrap();
        catalog.register_as::<u64>(B, "SkinnedMesh").unwrap();
        catalog.alias(A, B).unwrap();

        let skinned = RecordLayout::compute(Archetype::EMPTY.with(B), &catalog).unwrap();
        assert_eq!(skinned.offset_of(A), skinned.offset_of(B));
        assert_eq!(skinned.field(A).unwrap().kind, B);

        // A record that has the kind itself never falls back.
        let both = RecordLayout::compute(Archetype::from_kinds([A, B]), &catalog).unwrap();
        assert_eq!(both.field(A).unwrap().kind, A);

        // The reverse direction is not aliased.
        let plain = RecordLayout::compute(Archetype::EMPTY.with(A), &catalog).unwrap();
        assert_eq!(plain.offset_of(B), None);
    }

    #[test]
    fn test_unaligned_kind_pads_record() {
        let mut catalog = ComponentCatalog::new();
        catalog.register_meta(ComponentMeta::raw(A, "A", 3)).unwrap();
        let layout = RecordLayout::compute(Archetype::EMPTY.with(A), &catalog).unwrap();
        assert_eq!(layout.offset_of(A), Some(LINK_FIELD_SIZE));
        assert_eq!(
            layout.record_size(),
            (LINK_FIELD_SIZE + 3).next_multiple_of(align_of::<usize>())
        );
    }

    #[test]
    fn test_alias_resolution_independent_of_numbering() {
        const LOW: ComponentTypeId = ComponentTypeId(0);
        const HIGH: ComponentTypeId = ComponentTypeId(5);

        // Fallback numbered below the lookup kind.
        let mut downward = ComponentCatalog::new();
        downward.register_as::<u64>(LOW, "Low").unwrap();
        downward.register_as::<u64>(HIGH, "High").unwrap();
        downward.alias(HIGH, LOW).unwrap();
        let layout = RecordLayout::compute(Archetype::EMPTY.with(LOW), &downward).unwrap();
        assert_eq!(layout.offset_of(HIGH), Some(LINK_FIELD_SIZE));

        // Fallback numbered above the lookup kind.
        let mut upward = ComponentCatalog::new();
        upward.register_as::<u64>(LOW, "Low").unwrap();
        upward.register_as::<u64>(HIGH, "High").unwrap();
        upward.alias(LOW, HIGH).unwrap();
        let layout = RecordLayout::compute(Archetype::EMPTY.with(HIGH), &upward).unwrap();
        assert_eq!(layout.offset_of(LOW), Some(LINK_FIELD_SIZE));
    }

    #[test]
    fn test_page_layout() {
        let layout = RecordLayout::compute(Archetype::EMPTY.with(B), &raw_catalog()).unwrap();
        let page = layout.page_layout(4).unwrap();
        assert_eq!(page.size(), 4 * 24);
        assert_eq!(page.align(), align_of::<usize>());
        assert!(layout.page_layout(usize::MAX).is_none());
    }
}
