//! # Page Table (L1)
//!
//! The lowest paging level. Every present entry maps exactly one 4 KiB
//! page; there are no large pages in this kernel.
//!
//! Unlike the directory level, PTEs are mutated **field-wise** in place:
//! the fault handlers flip `present`/`writable`/`user` on existing
//! entries and re-point the base during copy-on-write, so the entry type
//! exposes setters next to the value-style constructors.
//!
//! ## Invariants & Notes
//!
//! - [`PageTable`] is 4 KiB-aligned and contains exactly 1024 entries.
//! - The base address stored in a PTE must be 4 KiB-aligned.
//! - After modifying an active mapping, the caller must invalidate the
//!   affected TLB entry.

use crate::PageEntryBits;
use crate::addresses::{LinearAddress, PhysicalAddress};

/// Index into a Page Table (derived from linear address bits `[21:12]`).
///
/// Strongly typed to avoid mixing with the directory index. Range is
/// `0..1024` (checked in debug builds).
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PtIndex(u16);

/// A single Page Table entry (PTE).
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone)]
pub struct PtEntry(PageEntryBits);

/// The Page Table (L1): 1024 entries, 4 KiB-aligned, covering 4 MiB.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PtEntry; 1024],
}

impl PtIndex {
    /// Build an index from a linear address (extracts bits `[21:12]`).
    #[inline]
    #[must_use]
    pub const fn from(la: LinearAddress) -> Self {
        Self::new(((la.as_u32() >> 12) & 0x3FF) as u16)
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
}

impl PtEntry {
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

    /// Return `true` if the entry allows writes.
    #[inline]
    #[must_use]
    pub const fn is_writable(self) -> bool {
        self.0.writable()
    }

    /// Return `true` if the entry allows ring-3 access.
    #[inline]
    #[must_use]
    pub const fn is_user_allowed(self) -> bool {
        self.0.user_access()
    }

    /// The physical page base stored in this entry (meaningful only when
    /// present).
    #[inline]
    #[must_use]
    pub const fn page_base(self) -> PhysicalAddress {
        self.0.page_base()
    }

    /// Expose the underlying bitfield for inspection.
    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    /// Point this entry at a physical page.
    #[inline]
    pub const fn set_page_base(&mut self, base: PhysicalAddress) {
        self.0.set_page_base(base);
    }

    /// Mark the entry present or absent.
    #[inline]
    pub const fn set_present(&mut self, present: bool) {
        self.0.set_present(present);
    }

    /// Allow or forbid writes through this entry.
    #[inline]
    pub const fn set_writable(&mut self, writable: bool) {
        self.0.set_writable(writable);
    }

    /// Allow or forbid ring-3 access through this entry.
    #[inline]
    pub const fn set_user_allowed(&mut self, allowed: bool) {
        self.0.set_user_access(allowed);
    }

    /// Create a present 4 KiB leaf PTE.
    ///
    /// Sets `present=1` and writes the page base. The base must be
    /// 4 KiB-aligned.
    #[inline]
    #[must_use]
    pub const fn make_page(page: PhysicalAddress, mut flags: PageEntryBits) -> Self {
        flags.set_large_page(false);
        flags.set_present(true);
        flags.set_page_base(page);
        Self(flags)
    }

    /// Return the raw 32-bit value (flags + base).
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }
}

impl PageTable {
    /// Create a fully zeroed table (all entries non-present).
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PtEntry::zero(); 1024],
        }
    }

    /// Overwrite every entry with zero.
    #[inline]
    pub fn zero(&mut self) {
        self.entries = [PtEntry::zero(); 1024];
    }

    /// Read the entry at `i`. Plain load; no TLB implications.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: PtIndex) -> PtEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    ///
    /// The caller must invalidate the TLB entry when changing an active
    /// mapping.
    #[inline]
    pub const fn set(&mut self, i: PtIndex, e: PtEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Mutable access to the entry at `i`, for field-wise updates.
    #[inline]
    #[must_use]
    pub const fn get_mut(&mut self, i: PtIndex) -> &mut PtEntry {
        &mut self.entries[i.as_usize()]
    }

    /// Derive the table index from a linear address.
    #[inline]
    #[must_use]
    pub const fn index_of(la: LinearAddress) -> PtIndex {
        PtIndex::from(la)
    }
}
