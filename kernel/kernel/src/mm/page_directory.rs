use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_alloc::{PhysicalPageRef, RingClass};
use kernel_registers::tlb;
use kernel_sync::SpinMutex;
use kernel_vmem::{LinearAddress, PageDirectoryTable, PdIndex, PhysMapper, PhysicalAddress};

/// One hardware address space: the frame holding the 1024-entry page
/// directory, plus the ownership map for the page tables hanging off it.
///
/// For every present non-zero PDE, `table_frames` holds the
/// [`PhysicalPageRef`] backing that page table — the **sole** strong
/// reference, so dropping the directory frees its tables. PDE 0 is the
/// exception: it points at the fixed, kernel-owned "page table zero"
/// shared by every address space, which is never freed.
pub struct PageDirectory {
    directory_page: PhysicalPageRef,
    table_frames: SpinMutex<BTreeMap<u16, PhysicalPageRef>>,
    kernel: bool,
    /// Whether this directory is the one loaded in CR3 right now.
    active: AtomicBool,
}

impl PageDirectory {
    /// Wrap the fixed bootstrap frame as the kernel directory.
    ///
    /// Used exactly once, at paging bring-up. The frame is eternal: it
    /// was never minted into a pool and is never freed.
    #[must_use]
    pub(crate) fn create_kernel_at(paddr: PhysicalAddress) -> Arc<Self> {
        log::debug!("mm: kernel page directory at {paddr}");
        Arc::new(Self {
            directory_page: PhysicalPageRef::new_eternal(paddr, RingClass::Supervisor),
            table_frames: SpinMutex::new(BTreeMap::new()),
            kernel: true,
            // The bootstrap loads this directory before anything else runs.
            active: AtomicBool::new(true),
        })
    }

    /// Wrap a freshly allocated supervisor frame as a user directory.
    ///
    /// The caller (the memory manager) zeroes the table and copies PDE 0
    /// from the kernel directory before handing the directory out.
    pub(crate) fn create_user(directory_page: PhysicalPageRef) -> Arc<Self> {
        Arc::new(Self {
            directory_page,
            table_frames: SpinMutex::new(BTreeMap::new()),
            kernel: false,
            active: AtomicBool::new(false),
        })
    }

    /// The physical base of the directory — the value CR3 takes when
    /// this address space is entered.
    #[inline]
    #[must_use]
    pub fn cr3(&self) -> PhysicalAddress {
        self.directory_page.base()
    }

    /// Whether this is the kernel's directory (the one whose PDE 0 owns
    /// page table zero).
    #[inline]
    #[must_use]
    pub const fn is_kernel(&self) -> bool {
        self.kernel
    }

    #[inline]
    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Invalidate the TLB entry for `laddr`, but only if this directory
    /// is the one currently installed — the TLB holds no entries for
    /// inactive address spaces.
    #[inline]
    pub fn flush(&self, laddr: LinearAddress) {
        if self.is_active() {
            unsafe { tlb::invalidate_page(laddr) };
        }
    }

    /// The directory table itself, reached through the physical mapper.
    ///
    /// # Safety
    /// The mapper must cover the directory frame, and the caller must
    /// serialize access (interrupts disabled).
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn table<'a, M: PhysMapper>(&self, mapper: &M) -> &'a mut PageDirectoryTable {
        unsafe { mapper.phys_to_mut::<PageDirectoryTable>(self.cr3()) }
    }

    /// Whether a page-table frame is already recorded for `index`.
    pub(crate) fn has_table_frame(&self, index: PdIndex) -> bool {
        self.table_frames.lock().contains_key(&index.as_u16())
    }

    /// Record the frame backing the page table at `index`.
    ///
    /// Asserts the slot was empty: a PDE can only be materialized once,
    /// and a double insert would leak the old table.
    pub(crate) fn record_table_frame(&self, index: PdIndex, frame: PhysicalPageRef) {
        let previous = self.table_frames.lock().insert(index.as_u16(), frame);
        assert!(
            previous.is_none(),
            "page table already recorded for PDE {}",
            index.as_u16()
        );
    }
}

impl Drop for PageDirectory {
    fn drop(&mut self) {
        // Dropping `table_frames` releases the sole references to the
        // page-table frames, returning them to the supervisor pool. The
        // kernel directory holds no recorded tables (its PDE 0 frame is
        // eternal) and is in practice never dropped.
        log::trace!("mm: dropping page directory {}", self.cr3());
    }
}
