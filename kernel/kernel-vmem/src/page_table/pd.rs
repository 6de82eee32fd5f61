//! # Page Directory (L2)
//!
//! The directory is the top paging level on i386: CR3 points at it, and
//! each present entry points at one [`PageTable`](crate::PageTable)
//! covering 4 MiB of the linear address space.
//!
//! ## Invariants & Notes
//!
//! - [`PageDirectoryTable`] is 4 KiB-aligned and contains exactly 1024
//!   entries.
//! - 4 MiB pages are not used, so `PS` must stay 0 in every PDE.
//! - Raw constructors do not validate consistency; prefer the typed
//!   helpers.

use crate::PageEntryBits;
use crate::addresses::{LinearAddress, PhysicalAddress};

/// Index into the Page Directory (derived from linear address bits
/// `[31:22]`).
///
/// Strongly typed to avoid mixing with the table-level index. Range is
/// `0..1024` (checked in debug builds).
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PdIndex(u16);

/// A single Page Directory entry (PDE).
///
/// A present PDE points at the physical frame holding one page table;
/// its RW/US bits gate every mapping below it.
#[doc(alias = "PDE")]
#[repr(transparent)]
#[derive(Copy, Clone)]
pub struct PdEntry(PageEntryBits);

/// The Page Directory (L2): 1024 entries, 4 KiB-aligned.
#[doc(alias = "PD")]
#[repr(C, align(4096))]
pub struct PageDirectoryTable {
    entries: [PdEntry; 1024],
}

impl PdIndex {
    /// Build an index from a linear address (extracts bits `[31:22]`).
    #[inline]
    #[must_use]
    pub const fn from(la: LinearAddress) -> Self {
        Self::new(((la.as_u32() >> 22) & 0x3FF) as u16)
    }

    /// Construct from a raw `u16`.
    ///
    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!(v < 1024);
        Self(v)
    }

    /// Return the index as `usize` for table access.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Return the raw index value.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl PdEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// Return `true` if the entry is marked present.
    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    /// Expose the underlying bitfield for inspection.
    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    /// If present, return the physical base of the page table this entry
    /// points at.
    #[inline]
    #[must_use]
    pub fn page_table_base(self) -> Option<PhysicalAddress> {
        if !self.is_present() {
            return None;
        }
        debug_assert!(!self.0.large_page(), "PDE must have PS=0");
        Some(self.0.page_base())
    }

    /// Create a present PDE pointing at `table` with `flags`.
    ///
    /// Forces `PS=0` and `present=1`. The base must be 4 KiB-aligned.
    #[inline]
    #[must_use]
    pub const fn make_table(table: PhysicalAddress, mut flags: PageEntryBits) -> Self {
        flags.set_large_page(false);
        flags.set_present(true);
        flags.set_page_base(table);
        Self(flags)
    }

    /// Return the raw 32-bit value (flags + base).
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }
}

impl PageDirectoryTable {
    /// Create a fully zeroed directory (all entries non-present).
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PdEntry::zero(); 1024],
        }
    }

    /// Overwrite every entry with zero.
    #[inline]
    pub fn zero(&mut self) {
        self.entries = [PdEntry::zero(); 1024];
    }

    /// Read the entry at `i`. Plain load; no TLB implications.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: PdIndex) -> PdEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    ///
    /// The caller must handle TLB invalidation when changing an active
    /// address space.
    #[inline]
    pub const fn set(&mut self, i: PdIndex, e: PdEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Derive the directory index from a linear address.
    #[inline]
    #[must_use]
    pub const fn index_of(la: LinearAddress) -> PdIndex {
        PdIndex::from(la)
    }
}
