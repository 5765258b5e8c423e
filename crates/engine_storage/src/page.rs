//! Pages and slot headers.
//!
//! A page is one contiguous, never-moving block of identically sized records.
//! The first word of every record is its header:
//!
//! ```text
//! usize::MAX      occupied
//! usize::MAX - 1  retired (logically destroyed, bytes still owned)
//! usize::MAX - 2  free, last link of the page's free chain
//! n               free, next free record is slot n of the same page
//! ```
//!
//! Keeping "occupied" and "end of free chain" distinct means a liveness scan
//! can trust the header alone.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Largest page capacity whose slot indices cannot collide with a sentinel.
pub const MAX_PAGE_CAPACITY: u32 = u32::MAX - 3;

/// The state encoded in a record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Holds a live entity.
    Occupied,
    /// Holds a logically destroyed entity whose last reference is still alive.
    Retired,
    /// Available. `next` is the following free slot in the page, or `None`
    /// at the end of the chain.
    Free {
        /// Next free slot index.
        next: Option<u32>,
    },
}

impl SlotState {
    const OCCUPIED: usize = usize::MAX;
    const RETIRED: usize = usize::MAX - 1;
    const FREE_TERMINAL: usize = usize::MAX - 2;

    /// Encode into a header word.
    #[must_use]
    pub const fn encode(self) -> usize {
        match self {
            Self::Occupied => Self::OCCUPIED,
            Self::Retired => Self::RETIRED,
            Self::Free { next: None } => Self::FREE_TERMINAL,
            Self::Free { next: Some(index) } => index as usize,
        }
    }

    /// Decode a header word.
    #[must_use]
    pub const fn decode(word: usize) -> Self {
        match word {
            Self::OCCUPIED => Self::Occupied,
            Self::RETIRED => Self::Retired,
            Self::FREE_TERMINAL => Self::Free { next: None },
            index => Self::Free {
                next: Some(index as u32),
            },
        }
    }

    /// Returns `true` for [`SlotState::Free`].
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free { .. })
    }
}

/// Read the header of `record`.
///
/// # Safety
///
/// `record` must point to the start of a record inside a live page.
#[inline]
pub(crate) unsafe fn read_header(record: NonNull<u8>) -> SlotState {
    // SAFETY: Records are at least pointer-aligned and start with a
    // header word that is always initialised.
    SlotState::decode(unsafe { record.cast::<usize>().read() })
}

/// Overwrite the header of `record`.
///
/// # Safety
///
/// `record` must point to the start of a record inside a live page.
#[inline]
pub(crate) unsafe fn write_header(record: NonNull<u8>, state: SlotState) {
    // SAFETY: See `read_header`.
    unsafe { record.cast::<usize>().write(state.encode()) }
}

/// One page of records.
#[derive(Debug)]
pub(crate) struct Page {
    base: NonNull<u8>,
    free_head: Option<u32>,
    live: u32,
}

impl Page {
    /// Allocate a page and thread every record onto its free chain in
    /// ascending order.
    ///
    /// Allocation failure aborts via [`alloc::handle_alloc_error`].
    pub(crate) fn allocate(layout: Layout, record_size: usize, capacity: u32) -> Self {
        debug_assert!(capacity > 0 && capacity <= MAX_PAGE_CAPACITY);
        debug_assert_eq!(layout.size(), record_size * capacity as usize);

        // SAFETY: `layout` has non-zero size (records always carry a header
        // and capacity is at least one).
        let raw = unsafe { alloc::alloc(layout) };
        let Some(base) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };

        for index in 0..capacity {
            let next = index + 1;
            let state = SlotState::Free {
                next: (next < capacity).then_some(next),
            };
            // SAFETY: `index < capacity`, so the record lies inside the block.
            unsafe { write_header(base.add(index as usize * record_size), state) };
        }

        Self {
            base,
            free_head: Some(0),
            live: 0,
        }
    }

    /// Release the page's memory.
    ///
    /// # Safety
    ///
    /// `layout` must be the layout passed to [`Page::allocate`], and no
    /// pointer into the page may be used afterwards.
    pub(crate) unsafe fn deallocate(&mut self, layout: Layout) {
        // SAFETY: Upheld by the caller.
        unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
    }

    pub(crate) fn base(&self) -> NonNull<u8> {
        self.base
    }

    pub(crate) fn free_head(&self) -> Option<u32> {
        self.free_head
    }

    pub(crate) fn set_free_head(&mut self, head: Option<u32>) {
        self.free_head = head;
    }

    pub(crate) fn live(&self) -> u32 {
        self.live
    }

    pub(crate) fn add_live(&mut self) {
        self.live += 1;
    }

    pub(crate) fn remove_live(&mut self) {
        self.live -= 1;
    }

    /// Pointer to the record at `index`.
    ///
    /// # Safety
    ///
    /// `index` must be below the page's capacity.
    pub(crate) unsafe fn record(&self, index: u32, record_size: usize) -> NonNull<u8> {
        // SAFETY: Upheld by the caller.
        unsafe { self.base.add(index as usize * record_size) }
    }
}
