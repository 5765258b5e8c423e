//! The per-archetype pool: a paged free-list allocator.
//!
//! A [`Pool`] owns every page for one archetype. Pages are allocated on demand
//! and kept until the pool itself is dropped, so a record address stays valid
//! for as long as the record is held. Each page keeps its own free chain
//! threaded through the record headers; releasing a record pushes it onto the
//! front of that chain, so reuse within a page is LIFO.

use std::alloc::Layout;
use std::cell::RefCell;
use std::ptr::NonNull;

use engine_component::{Archetype, RecordLayout};
use tracing::debug;

use crate::page::{MAX_PAGE_CAPACITY, Page, SlotState, read_header, write_header};

/// A record handed out by [`Pool::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Start of the record (its header). Component fields follow at the
    /// offsets given by the pool's [`RecordLayout`].
    pub record: NonNull<u8>,
    /// Page index within the pool.
    pub page: u32,
    /// Slot index within the page.
    pub index: u32,
}

/// Allocator for the records of one archetype.
///
/// The pool is single-threaded: it is neither `Send` nor `Sync`, and the
/// free lists are mutated through shared references.
#[derive(Debug)]
pub struct Pool {
    layout: RecordLayout,
    page_capacity: u32,
    page_layout: Layout,
    pages: RefCell<Vec<Page>>,
}

impl Pool {
    /// Create an empty pool. No memory is allocated until the first
    /// [`Pool::acquire`].
    ///
    /// Returns `None` if a page of `page_capacity` records would overflow the
    /// address space.
    ///
    /// # Panics
    ///
    /// Panics if `page_capacity` is zero or above [`MAX_PAGE_CAPACITY`].
    #[must_use]
    pub fn new(layout: RecordLayout, page_capacity: u32) -> Option<Self> {
        assert!(
            page_capacity > 0 && page_capacity <= MAX_PAGE_CAPACITY,
            "invalid page capacity {page_capacity}"
        );
        let page_layout = layout.page_layout(page_capacity as usize)?;
        Some(Self {
            layout,
            page_capacity,
            page_layout,
            pages: RefCell::new(Vec::new()),
        })
    }

    /// The record layout shared by every record in this pool.
    #[must_use]
    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// The archetype this pool stores.
    #[must_use]
    pub fn archetype(&self) -> Archetype {
        self.layout.archetype()
    }

    /// Records per page.
    #[must_use]
    pub fn page_capacity(&self) -> u32 {
        self.page_capacity
    }

    /// Number of pages allocated so far.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.borrow().len()
    }

    /// Total number of records across all pages.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.page_count() * self.page_capacity as usize
    }

    /// Number of records not on a free chain (occupied or retired).
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.pages.borrow().iter().map(|page| page.live() as usize).sum()
    }

    /// Take a record off the first page with room, allocating a new page if
    /// every page is full.
    ///
    /// The record's header is marked occupied; its component bytes are
    /// uninitialised and must be written by the caller.
    pub fn acquire(&self) -> Slot {
        let mut pages = self.pages.borrow_mut();
        let record_size = self.layout.record_size();

        let page_index = match pages.iter().position(|page| page.free_head().is_some()) {
            Some(index) => index,
            None => {
                pages.push(Page::allocate(
                    self.page_layout,
                    record_size,
                    self.page_capacity,
                ));
                debug!(
                    archetype = %self.archetype(),
                    page = pages.len() - 1,
                    bytes = self.page_layout.size(),
                    "allocated pool page"
                );
                pages.len() - 1
            }
        };

        let page = &mut pages[page_index];
        let Some(index) = page.free_head() else {
            unreachable!("selected page has an empty free chain");
        };
        // SAFETY: Free chain entries are always below the page capacity.
        let record = unsafe { page.record(index, record_size) };
        // SAFETY: `record` is the start of a record in a live page.
        let next = match unsafe { read_header(record) } {
            SlotState::Free { next } => next,
            state => panic!("corrupted free chain: slot {index} of page {page_index} is {state:?}"),
        };
        page.set_free_head(next);
        page.add_live();
        // SAFETY: As above.
        unsafe { write_header(record, SlotState::Occupied) };

        Slot {
            record,
            page: page_index as u32,
            index,
        }
    }

    /// Push a record back onto the front of its page's free chain.
    ///
    /// Component values still stored in the record are not dropped; run
    /// [`Pool::drop_components`] first if they own resources.
    ///
    /// # Panics
    ///
    /// Panics if the slot is out of range or already free.
    pub fn release(&self, page_index: u32, index: u32) {
        let mut pages = self.pages.borrow_mut();
        let record_size = self.layout.record_size();
        let page = Self::checked_page(&mut pages, page_index, index, self.page_capacity);

        // SAFETY: `index` was checked against the page capacity.
        let record = unsafe { page.record(index, record_size) };
        // SAFETY: `record` is the start of a record in a live page.
        let state = unsafe { read_header(record) };
        assert!(
            !state.is_free(),
            "slot {index} of page {page_index} released while already free"
        );

        // SAFETY: As above.
        unsafe {
            write_header(
                record,
                SlotState::Free {
                    next: page.free_head(),
                },
            );
        }
        page.set_free_head(Some(index));
        page.remove_live();
    }

    /// Mark an occupied record as retired so queries skip it while its bytes
    /// stay owned.
    ///
    /// # Panics
    ///
    /// Panics if the slot is out of range or not occupied.
    pub fn retire(&self, page_index: u32, index: u32) {
        let mut pages = self.pages.borrow_mut();
        let record_size = self.layout.record_size();
        let page = Self::checked_page(&mut pages, page_index, index, self.page_capacity);

        // SAFETY: `index` was checked against the page capacity.
        let record = unsafe { page.record(index, record_size) };
        // SAFETY: `record` is the start of a record in a live page.
        let state = unsafe { read_header(record) };
        assert_eq!(
            state,
            SlotState::Occupied,
            "slot {index} of page {page_index} retired while not occupied"
        );
        // SAFETY: As above.
        unsafe { write_header(record, SlotState::Retired) };
    }

    /// The header state of a slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot is out of range.
    #[must_use]
    pub fn slot_state(&self, page_index: u32, index: u32) -> SlotState {
        let record = self.record_ptr(page_index, index);
        // SAFETY: `record_ptr` checked the slot.
        unsafe { read_header(record) }
    }

    /// Address of a slot's record.
    ///
    /// # Panics
    ///
    /// Panics if the slot is out of range.
    #[must_use]
    pub fn record_ptr(&self, page_index: u32, index: u32) -> NonNull<u8> {
        let mut pages = self.pages.borrow_mut();
        let page = Self::checked_page(&mut pages, page_index, index, self.page_capacity);
        // SAFETY: `index` was checked against the page capacity.
        unsafe { page.record(index, self.layout.record_size()) }
    }

    /// Base address of a page, or `None` past the last page.
    #[must_use]
    pub(crate) fn page_base(&self, page_index: usize) -> Option<NonNull<u8>> {
        self.pages.borrow().get(page_index).map(Page::base)
    }

    /// Run the destructor of every component stored in `record`.
    ///
    /// # Safety
    ///
    /// `record` must be a record of this pool whose every field holds an
    /// initialised value, and those values must not be used afterwards.
    pub unsafe fn drop_components(&self, record: NonNull<u8>) {
        for field in self.layout.fields() {
            if let Some(drop_fn) = field.drop_fn {
                // SAFETY: Upheld by the caller; `offset` lies inside the record.
                unsafe { drop_fn(record.add(field.offset).as_ptr()) };
            }
        }
    }

    fn checked_page<'p>(
        pages: &'p mut [Page],
        page_index: u32,
        index: u32,
        page_capacity: u32,
    ) -> &'p mut Page {
        assert!(
            index < page_capacity,
            "slot {index} out of range for page capacity {page_capacity}"
        );
        let page_count = pages.len();
        pages
            .get_mut(page_index as usize)
            .unwrap_or_else(|| panic!("page {page_index} out of range ({page_count} pages)"))
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        for page in self.pages.get_mut() {
            // SAFETY: Every page was allocated with `page_layout`, and the
            // pool is the sole owner of its pages.
            unsafe { page.deallocate(self.page_layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use engine_component::{ComponentCatalog, ComponentMeta, ComponentTypeId};

    use super::*;

    fn make_pool(capacity: u32) -> Pool {
        let mut catalog = ComponentCatalog::new();
        catalog
            .register_meta(ComponentMeta::raw(ComponentTypeId(0), "A", 8))
            .unwrap();
        let layout =
            RecordLayout::compute(Archetype::EMPTY.with(ComponentTypeId(0)), &catalog).unwrap();
        Pool::new(layout, capacity).unwrap()
    }

    #[test]
    fn test_first_acquire_allocates_page() {
        let pool = make_pool(8);
        assert_eq!(pool.page_count(), 0);
        let slot = pool.acquire();
        assert_eq!((slot.page, slot.index), (0, 0));
        assert_eq!(pool.page_count(), 1);
        assert_eq!(pool.live_count(), 1);
        assert_eq!(pool.slot_state(0, 0), SlotState::Occupied);
    }

    #[test]
    fn test_acquire_is_ascending_on_fresh_page() {
        let pool = make_pool(4);
        let indices: Vec<_> = (0..4).map(|_| pool.acquire().index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);

        let base = pool.record_ptr(0, 0).as_ptr() as usize;
        let second = pool.record_ptr(0, 1).as_ptr() as usize;
        assert_eq!(second - base, pool.layout().record_size());
    }

    #[test]
    fn test_round_trip_reuses_page() {
        let pool = make_pool(16);
        for _ in 0..3 {
            let slots: Vec<_> = (0..16).map(|_| pool.acquire()).collect();
            for slot in &slots {
                pool.release(slot.page, slot.index);
            }
            assert_eq!(pool.page_count(), 1);
            assert_eq!(pool.live_count(), 0);
        }
    }

    #[test]
    fn test_lifo_reuse() {
        let pool = make_pool(8);
        let r1 = pool.acquire();
        let r2 = pool.acquire();
        let _r3 = pool.acquire();

        pool.release(r1.page, r1.index);
        pool.release(r2.page, r2.index);

        assert_eq!(pool.acquire(), r2);
        assert_eq!(pool.acquire(), r1);
    }

    #[test]
    fn test_growth_adds_pages_and_fills_earliest_first() {
        let pool = make_pool(2);
        let slots: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        assert_eq!(pool.page_count(), 3);
        assert_eq!(pool.capacity(), 6);
        assert_eq!(slots[4].page, 2);

        // A hole on page 0 is filled before the spare record on page 2.
        pool.release(slots[1].page, slots[1].index);
        assert_eq!(pool.acquire(), slots[1]);
        assert_eq!(pool.acquire().page, 2);
        assert_eq!(pool.page_count(), 3);
    }

    #[test]
    fn test_pointer_stability() {
        let pool = make_pool(4);
        let other = make_pool(3);

        let kept: Vec<_> = (0..3).map(|_| pool.acquire()).collect();
        let addresses: Vec<_> = kept.iter().map(|slot| slot.record).collect();

        // Unrelated churn on both pools, spanning several new pages.
        let mut churn: Vec<(&Pool, Slot)> = Vec::new();
        for round in 0..50 {
            churn.push((&pool, pool.acquire()));
            churn.push((&other, other.acquire()));
            if round % 3 == 0 {
                let (owner, slot) = churn.remove(0);
                owner.release(slot.page, slot.index);
            }
        }
        assert!(pool.page_count() > 1);

        for (slot, address) in kept.iter().zip(&addresses) {
            assert_eq!(pool.record_ptr(slot.page, slot.index), *address);
            assert_eq!(pool.slot_state(slot.page, slot.index), SlotState::Occupied);
        }

        let unique: HashSet<_> = churn.iter().map(|(_, slot)| slot.record).collect();
        assert_eq!(unique.len(), churn.len());
    }

    #[test]
    fn test_retire_keeps_record_owned() {
        let pool = make_pool(4);
        let slot = pool.acquire();
        pool.retire(slot.page, slot.index);
        assert_eq!(pool.slot_state(slot.page, slot.index), SlotState::Retired);
        assert_eq!(pool.live_count(), 1);

        // A retired record is not on the free chain.
        assert_ne!(pool.acquire(), slot);

        pool.release(slot.page, slot.index);
        assert_eq!(pool.live_count(), 1);
        assert_eq!(pool.acquire(), slot);
    }

    #[test]
    #[should_panic(expected = "already free")]
    fn test_double_release_panics() {
        let pool = make_pool(4);
        let slot = pool.acquire();
        pool.release(slot.page, slot.index);
        pool.release(slot.page, slot.index);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_release_out_of_range_panics() {
        let pool = make_pool(4);
        let _ = pool.acquire();
        pool.release(0, 4);
    }

    #[test]
    fn test_oversized_page_rejected() {
        let mut catalog = ComponentCatalog::new();
        catalog
            .register_meta(ComponentMeta::raw(ComponentTypeId(0), "Huge", usize::MAX / 4))
            .unwrap();
        let layout =
            RecordLayout::compute(Archetype::EMPTY.with(ComponentTypeId(0)), &catalog).unwrap();
        assert!(Pool::new(layout, 16).is_none());
    }
}
