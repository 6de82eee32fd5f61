use crate::fs::PagedInode;
use crate::mm::layout;
use crate::mm::page_directory::PageDirectory;
use crate::mm::page_fault::{PageFault, PageFaultResponse};
use crate::mm::region::{Region, RegionAccess};
use crate::mm::vm_object::VmObject;
use crate::process::Process;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use kernel_alloc::{PagePool, PhysicalPageRef, RingClass};
use kernel_registers::{Cr0, Cr3, LoadRegisterUnsafe, StoreRegisterUnsafe};
use kernel_sync::IrqGuard;
use kernel_sync::irq::{cli_stop_interrupts, interrupts_enabled, sti_enable_interrupts};
use kernel_vmem::{
    LinearAddress, PAGE_SIZE, PageEntryBits, PageTable, PdEntry, PdIndex, PhysMapper,
    PhysicalAddress, PtEntry, PtIndex, align_up,
};
use thiserror::Error;

/// Failure of [`MemoryManager::commit_region`].
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum CommitError {
    /// The user frame pool ran dry. Pages committed before the failure
    /// stay committed.
    #[error("out of physical pages")]
    OutOfMemory,
}

/// The process-wide memory manager.
///
/// Owns the two frame pools, the kernel page directory, the quickmap
/// slot, and the registries of live regions and VM objects; provides
/// allocation, region mapping, address-space switching, and the page
/// fault handlers.
///
/// `M` is the [`PhysMapper`] used to reach physical frames from kernel
/// code: [`IdentityMapper`](kernel_vmem::IdentityMapper) on the real
/// machine, an arena in hosted tests.
///
/// This is a single-CPU kernel. Every operation that mutates shared
/// state either runs with interrupts already disabled (the fault paths)
/// or takes its own [`IrqGuard`]; the guard nests, so callers may hold
/// one too.
pub struct MemoryManager<M: PhysMapper> {
    mapper: M,
    kernel_directory: Arc<PageDirectory>,
    active_directory: Arc<PageDirectory>,
    supervisor_pool: Arc<PagePool>,
    user_pool: Arc<PagePool>,
    quickmap_addr: LinearAddress,
    quickmap_busy: bool,
    regions: Vec<Weak<Region>>,
    vmos: Vec<Weak<VmObject>>,
}

impl<M: PhysMapper> MemoryManager<M> {
    /// Bring up paging: wrap the fixed kernel directory, build the
    /// protected null page and the supervisor identity map, mint both
    /// frame pools, reserve the quickmap slot, and enable CR0.PG.
    #[must_use]
    pub fn new(mapper: M) -> Self {
        let _irq = IrqGuard::new();
        let kernel_directory = PageDirectory::create_kernel_at(layout::KERNEL_DIRECTORY_BASE);
        let mut mm = Self {
            mapper,
            active_directory: Arc::clone(&kernel_directory),
            kernel_directory,
            supervisor_pool: PagePool::new(RingClass::Supervisor),
            user_pool: PagePool::new(RingClass::User),
            quickmap_addr: LinearAddress::from_u32(0),
            quickmap_busy: false,
            regions: Vec::new(),
            vmos: Vec::new(),
        };
        mm.initialize_paging();
        mm
    }

    fn initialize_paging(&mut self) {
        let kernel_directory = Arc::clone(&self.kernel_directory);
        unsafe {
            kernel_directory.table(&self.mapper).zero();
            self.mapper
                .phys_to_mut::<PageTable>(layout::PAGE_TABLE_ZERO_BASE)
                .zero();
        }

        // Make null dereferences crash.
        self.map_protected(layout::PROTECTED_NULL_BASE, PAGE_SIZE);

        // The bottom 4 MiB (except for the null page) are identity
        // mapped and supervisor-only. Every address space shares these
        // mappings through PDE 0.
        self.create_identity_mapping(
            &kernel_directory,
            layout::IDENTITY_BASE,
            layout::IDENTITY_END - PAGE_SIZE,
        );

        for base in
            (layout::SUPERVISOR_POOL_BASE..layout::SUPERVISOR_POOL_END).step_by(PAGE_SIZE as usize)
        {
            self.supervisor_pool.seed(PhysicalAddress::from_u32(base));
        }
        for base in (layout::USER_POOL_BASE..layout::USER_POOL_END).step_by(PAGE_SIZE as usize) {
            self.user_pool.seed(PhysicalAddress::from_u32(base));
        }

        // Reserve the tail frame of the user pool; its physical address
        // doubles as the linear address of the quickmap slot.
        let reserved = self
            .user_pool
            .allocate()
            .expect("user pool empty at bootstrap");
        self.quickmap_addr = LinearAddress::from_u32(reserved.base().as_u32());
        core::mem::forget(reserved);
        log::debug!("mm: quickmap slot at {}", self.quickmap_addr);

        unsafe {
            Cr3::from_directory_phys(self.kernel_directory.cr3()).store_unsafe();
            Cr0::load_unsafe().with_paging_enabled().store_unsafe();
        }
        log::info!(
            "mm: paging enabled, {} supervisor / {} user frames free",
            self.supervisor_pool.free_count(),
            self.user_pool.free_count()
        );
    }

    #[inline]
    #[must_use]
    pub fn kernel_directory(&self) -> &Arc<PageDirectory> {
        &self.kernel_directory
    }

    /// The linear address of the quickmap slot.
    #[inline]
    #[must_use]
    pub const fn quickmap_address(&self) -> LinearAddress {
        self.quickmap_addr
    }

    /// Drop every non-global TLB entry by reloading CR3.
    pub fn flush_entire_tlb(&self) {
        unsafe { kernel_registers::tlb::flush_all() };
    }

    #[must_use]
    pub fn free_user_pages(&self) -> usize {
        self.user_pool.free_count()
    }

    #[must_use]
    pub fn free_supervisor_pages(&self) -> usize {
        self.supervisor_pool.free_count()
    }

    /// Take a frame from the user pool. `None` when exhausted.
    #[must_use]
    pub fn allocate_physical_page(&self) -> Option<PhysicalPageRef> {
        self.user_pool.allocate()
    }

    /// Take a frame from the supervisor pool. `None` when exhausted.
    #[must_use]
    pub fn allocate_supervisor_physical_page(&self) -> Option<PhysicalPageRef> {
        self.supervisor_pool.allocate()
    }

    /// Create a fresh user address space: a zeroed directory whose PDE 0
    /// is copied from the kernel directory, so the first 4 MiB are
    /// present in every process.
    #[must_use]
    pub fn create_user_directory(&mut self) -> Arc<PageDirectory> {
        let _irq = IrqGuard::new();
        let frame = self
            .supervisor_pool
            .allocate()
            .expect("out of supervisor pages for a page directory");
        let directory = PageDirectory::create_user(frame);
        unsafe {
            let table = directory.table(&self.mapper);
            table.zero();
            let kernel_table = self.kernel_directory.table(&self.mapper);
            table.set(PdIndex::new(0), kernel_table.get(PdIndex::new(0)));
        }
        log::debug!("mm: new user page directory at {}", directory.cr3());
        directory
    }

    // ------------------------------------------------------------------
    // Page table walk
    // ------------------------------------------------------------------

    /// Walk to the PTE for `laddr` in `page_directory`, materializing
    /// the page table on demand.
    ///
    /// PDE 0 of the kernel directory gets the fixed "page table zero";
    /// any other absent PDE gets a freshly zeroed supervisor frame,
    /// recorded in the directory's ownership map. Running out of
    /// supervisor frames here is fatal.
    #[allow(clippy::mut_from_ref)]
    fn ensure_pte<'a>(
        &self,
        page_directory: &Arc<PageDirectory>,
        laddr: LinearAddress,
    ) -> &'a mut PtEntry {
        debug_assert!(!interrupts_enabled());
        let pd_index = PdIndex::from(laddr);
        let pt_index = PtIndex::from(laddr);
        let directory = unsafe { page_directory.table(&self.mapper) };

        let pde = directory.get(pd_index);
        let table_base = match pde.page_table_base() {
            Some(base) => base,
            None if pd_index.as_usize() == 0 => {
                assert!(
                    page_directory.is_kernel(),
                    "PDE 0 of a user directory must be inherited, not materialized"
                );
                directory.set(
                    pd_index,
                    PdEntry::make_table(
                        layout::PAGE_TABLE_ZERO_BASE,
                        PageEntryBits::new_supervisor_rw(),
                    ),
                );
                layout::PAGE_TABLE_ZERO_BASE
            }
            None => {
                assert!(
                    !page_directory.is_kernel(),
                    "kernel directory must not grow page tables past PDE 0"
                );
                assert!(!page_directory.has_table_frame(pd_index));
                let frame = self
                    .supervisor_pool
                    .allocate()
                    .expect("out of supervisor pages materializing a page table");
                let base = frame.base();
                unsafe { self.mapper.phys_to_mut::<PageTable>(base) }.zero();
                log::trace!(
                    "mm: materialized page table #{} for {laddr} at {base}",
                    pd_index.as_u16()
                );
                directory.set(pd_index, PdEntry::make_table(base, PageEntryBits::new_user_rw()));
                page_directory.record_table_frame(pd_index, frame);
                base
            }
        };

        let table = unsafe { self.mapper.phys_to_mut::<PageTable>(table_base) };
        table.get_mut(pt_index)
    }

    /// Read the PTE for `laddr` without materializing anything.
    ///
    /// `None` when the PDE is absent; the returned entry may itself be
    /// non-present.
    fn walk(&self, page_directory: &PageDirectory, laddr: LinearAddress) -> Option<PtEntry> {
        let directory = unsafe { page_directory.table(&self.mapper) };
        let table_base = directory.get(PdIndex::from(laddr)).page_table_base()?;
        let table = unsafe { self.mapper.phys_to_mut::<PageTable>(table_base) };
        Some(table.get(PtIndex::from(laddr)))
    }

    /// Translate `laddr` to a physical address through `page_directory`,
    /// if mapped.
    #[must_use]
    pub fn query(
        &self,
        page_directory: &PageDirectory,
        laddr: LinearAddress,
    ) -> Option<PhysicalAddress> {
        let pte = self.walk(page_directory, laddr)?;
        if !pte.is_present() {
            return None;
        }
        Some(pte.page_base().offset(laddr.as_u32() & (PAGE_SIZE - 1)))
    }

    /// Resolve a linear address in `page_directory` to a byte pointer
    /// the kernel can dereference.
    ///
    /// With paging live this is the identity the hardware provides —
    /// kernel code simply dereferences linear addresses. Hosted builds
    /// have no MMU, so the walk the MMU would do is emulated through the
    /// physical mapper instead.
    fn linear_ptr(&self, page_directory: &PageDirectory, laddr: LinearAddress) -> *mut u8 {
        #[cfg(target_arch = "x86")]
        {
            let _ = page_directory;
            laddr.as_u32() as usize as *mut u8
        }
        #[cfg(not(target_arch = "x86"))]
        {
            let pa = self
                .query(page_directory, laddr)
                .expect("linear address not mapped");
            core::ptr::from_mut(unsafe { self.mapper.phys_to_mut::<u8>(pa) })
        }
    }

    // ------------------------------------------------------------------
    // Kernel mappings
    // ------------------------------------------------------------------

    /// Program `[laddr, laddr + length)` in the kernel directory as
    /// protected: present=0, writable=0, supervisor. Touching the range
    /// faults — this is what turns page 0 into a null-dereference trap.
    pub fn map_protected(&mut self, laddr: LinearAddress, length: u32) {
        let _irq = IrqGuard::new();
        debug_assert!(laddr.is_page_aligned());
        let kernel_directory = Arc::clone(&self.kernel_directory);
        for offset in (0..length).step_by(PAGE_SIZE as usize) {
            let pte_address = laddr.offset(offset);
            let pte = self.ensure_pte(&kernel_directory, pte_address);
            pte.set_page_base(PhysicalAddress::from_u32(pte_address.as_u32()));
            pte.set_user_allowed(false);
            pte.set_present(false);
            pte.set_writable(false);
            kernel_directory.flush(pte_address);
        }
    }

    /// Identity-map `[laddr, laddr + size)` into `page_directory`,
    /// supervisor-only, read-write.
    pub fn create_identity_mapping(
        &mut self,
        page_directory: &Arc<PageDirectory>,
        laddr: LinearAddress,
        size: u32,
    ) {
        let _irq = IrqGuard::new();
        assert!(laddr.is_page_aligned());
        for offset in (0..size).step_by(PAGE_SIZE as usize) {
            let pte_address = laddr.offset(offset);
            let pte = self.ensure_pte(page_directory, pte_address);
            pte.set_page_base(PhysicalAddress::from_u32(pte_address.as_u32()));
            pte.set_user_allowed(false);
            pte.set_present(true);
            pte.set_writable(true);
            page_directory.flush(pte_address);
        }
    }

    /// Tear down a transient identity window created with
    /// [`create_identity_mapping`](Self::create_identity_mapping).
    pub fn remove_identity_mapping(
        &mut self,
        page_directory: &Arc<PageDirectory>,
        laddr: LinearAddress,
        size: u32,
    ) {
        let _irq = IrqGuard::new();
        assert!(laddr.is_page_aligned());
        for offset in (0..size).step_by(PAGE_SIZE as usize) {
            let pte_address = laddr.offset(offset);
            let pte = self.ensure_pte(page_directory, pte_address);
            pte.set_page_base(PhysicalAddress::from_u32(0));
            pte.set_present(false);
            pte.set_writable(false);
            pte.set_user_allowed(false);
            page_directory.flush(pte_address);
        }
    }

    // ------------------------------------------------------------------
    // Region mapping
    // ------------------------------------------------------------------

    /// Install `region` into `process`'s directory at the region's
    /// linear address, user-accessible.
    pub fn map_region(&mut self, process: &Process, region: &Arc<Region>) {
        self.map_region_at_address(
            process.page_directory(),
            region,
            region.linear_address(),
            true,
        );
    }

    fn map_region_at_address(
        &mut self,
        page_directory: &Arc<PageDirectory>,
        region: &Region,
        laddr: LinearAddress,
        user_allowed: bool,
    ) {
        let _irq = IrqGuard::new();
        region.attach(page_directory);
        log::trace!(
            "mm: mapping '{}' (VMO pages {}..={}) at {laddr}",
            region.name(),
            region.first_page_index(),
            region.last_page_index()
        );
        for i in 0..region.page_count() {
            let page_laddr = laddr.offset(i as u32 * PAGE_SIZE);
            let pte = self.ensure_pte(page_directory, page_laddr);
            let populated = region.vmo().pages()[region.first_page_index() + i]
                .as_ref()
                .map(PhysicalPageRef::base);
            if let Some(base) = populated {
                pte.set_page_base(base);
                pte.set_present(true);
                // A COW page reads fine but must fault on write.
                pte.set_writable(region.is_writable() && !region.is_cow(i));
            } else {
                // Fault on first touch.
                pte.set_page_base(PhysicalAddress::from_u32(0));
                pte.set_present(false);
                pte.set_writable(region.is_writable());
            }
            pte.set_user_allowed(user_allowed);
            page_directory.flush(page_laddr);
        }
    }

    /// Re-program every PTE of an installed region; used after
    /// permission or COW-map changes.
    pub fn remap_region(&mut self, region: &Region) {
        let _irq = IrqGuard::new();
        let page_directory = region.directory().expect("remap of a region never mapped");
        self.map_region_at_address(&page_directory, region, region.linear_address(), true);
    }

    /// Re-program the PTE of one region page from its (populated) VMO
    /// slot.
    pub fn remap_region_page(&mut self, region: &Region, page_index_in_region: usize, user_allowed: bool) {
        let _irq = IrqGuard::new();
        let page_directory = region.directory().expect("region not installed");
        let page_laddr = region.page_address(page_index_in_region);
        let base = region.vmo().pages()[region.first_page_index() + page_index_in_region]
            .as_ref()
            .expect("remap of an unpopulated page")
            .base();
        let pte = self.ensure_pte(&page_directory, page_laddr);
        pte.set_page_base(base);
        pte.set_present(true);
        if region.is_cow(page_index_in_region) {
            pte.set_writable(false);
        } else {
            pte.set_writable(region.is_writable());
        }
        pte.set_user_allowed(user_allowed);
        page_directory.flush(page_laddr);
        log::trace!(
            "mm: remapped '{}' {page_laddr} => {base}",
            region.name()
        );
    }

    /// Clear every PTE in the region's span and detach the region from
    /// its directory.
    pub fn unmap_region(&mut self, region: &Region) {
        let _irq = IrqGuard::new();
        let page_directory = region.directory().expect("unmap of a region never mapped");
        for i in 0..region.page_count() {
            let page_laddr = region.page_address(i);
            let pte = self.ensure_pte(&page_directory, page_laddr);
            pte.set_page_base(PhysicalAddress::from_u32(0));
            pte.set_present(false);
            pte.set_writable(false);
            pte.set_user_allowed(false);
            page_directory.flush(page_laddr);
        }
        region.detach();
    }

    /// Unmap (if installed) and drop the caller's reference to a region.
    pub fn release_region(&mut self, region: Arc<Region>) {
        let _irq = IrqGuard::new();
        if region.directory().is_some() {
            self.unmap_region(&region);
        }
        drop(region);
        self.prune_registries();
    }

    /// Eagerly back every empty slot in the region's window with fresh
    /// user frames.
    ///
    /// # Errors
    /// [`CommitError::OutOfMemory`] when the pool runs dry; pages
    /// committed before the failure are retained.
    pub fn commit_region(&mut self, region: &Region) -> Result<(), CommitError> {
        let _irq = IrqGuard::new();
        log::debug!(
            "mm: committing {} pages in '{}' at {}",
            region.page_count(),
            region.name(),
            region.linear_address()
        );
        for i in 0..region.page_count() {
            let slot_index = region.first_page_index() + i;
            if region.vmo().pages()[slot_index].is_some() {
                continue;
            }
            let Some(page) = self.user_pool.allocate() else {
                log::warn!("mm: commit was unable to allocate a physical page");
                return Err(CommitError::OutOfMemory);
            };
            region.vmo().pages()[slot_index] = Some(page);
            self.remap_region_page(region, i, true);
        }
        Ok(())
    }

    /// Fault in every absent page of an inode-backed region, remapping
    /// each page as it lands. Returns `false` on the first read failure.
    pub fn page_in_region(&mut self, region: &Region) -> bool {
        let _irq = IrqGuard::new();
        assert!(region.vmo().inode().is_some());
        log::debug!("mm: paging in {} pages of '{}'", region.page_count(), region.name());
        for i in 0..region.page_count() {
            let absent = region.vmo().pages()[region.first_page_index() + i].is_none();
            if absent && !self.page_in_from_inode(region, i) {
                return false;
            }
            self.remap_region_page(region, i, true);
        }
        true
    }

    // ------------------------------------------------------------------
    // Address-space switching, resolution, validation
    // ------------------------------------------------------------------

    /// Switch to `process`'s address space: save CR3 into the context
    /// and load it into the hardware.
    pub fn enter_process_paging_scope(&mut self, process: &mut Process) {
        let _irq = IrqGuard::new();
        let directory = Arc::clone(process.page_directory());
        process.set_saved_cr3(directory.cr3());
        self.active_directory.set_active(false);
        directory.set_active(true);
        unsafe { Cr3::from_directory_phys(directory.cr3()).store_unsafe() };
        self.active_directory = directory;
    }

    /// Find the region of `process` containing `laddr`.
    #[must_use]
    pub fn region_from_laddr(&self, process: &Process, laddr: LinearAddress) -> Option<Arc<Region>> {
        debug_assert!(!interrupts_enabled());
        // FIXME: linear scan; replace with an interval tree keyed by
        // linear address once processes carry more than a handful of
        // regions.
        process
            .regions()
            .iter()
            .find(|region| region.contains(laddr))
            .cloned()
    }

    /// Whether `process` may read one byte at `laddr`.
    #[must_use]
    pub fn validate_user_read(&self, process: &Process, laddr: LinearAddress) -> bool {
        let Some(pte) = self.walk(process.page_directory(), laddr) else {
            return false;
        };
        if !pte.is_present() {
            return false;
        }
        if process.is_ring3() && !pte.is_user_allowed() {
            return false;
        }
        true
    }

    /// Whether `process` may write one byte at `laddr`.
    #[must_use]
    pub fn validate_user_write(&self, process: &Process, laddr: LinearAddress) -> bool {
        let Some(pte) = self.walk(process.page_directory(), laddr) else {
            return false;
        };
        if !pte.is_present() {
            return false;
        }
        if process.is_ring3() && !pte.is_user_allowed() {
            return false;
        }
        pte.is_writable()
    }

    // ------------------------------------------------------------------
    // Quickmap
    // ------------------------------------------------------------------

    /// Map `page` at the reserved quickmap slot of the current address
    /// space and return the slot's linear address.
    ///
    /// Single-slot and non-reentrant: a second acquisition before
    /// [`unquickmap_page`](Self::unquickmap_page) is a fatal error.
    /// Interrupts must be disabled for the whole acquire/touch/release
    /// sequence.
    pub fn quickmap_page(&mut self, page: &PhysicalPageRef) -> LinearAddress {
        debug_assert!(!interrupts_enabled());
        assert!(!self.quickmap_busy, "quickmap slot is already in use");
        self.quickmap_busy = true;
        let page_laddr = self.quickmap_addr;
        let active = Arc::clone(&self.active_directory);
        let pte = self.ensure_pte(&active, page_laddr);
        pte.set_page_base(page.base());
        pte.set_present(true);
        pte.set_writable(true);
        active.flush(page_laddr);
        log::trace!("mm: quickmap {page_laddr} => {}", page.base());
        page_laddr
    }

    /// Release the quickmap slot, clearing its PTE.
    pub fn unquickmap_page(&mut self) {
        debug_assert!(!interrupts_enabled());
        assert!(self.quickmap_busy, "quickmap slot is not in use");
        let page_laddr = self.quickmap_addr;
        let active = Arc::clone(&self.active_directory);
        let pte = self.ensure_pte(&active, page_laddr);
        pte.set_page_base(PhysicalAddress::from_u32(0));
        pte.set_present(false);
        pte.set_writable(false);
        active.flush(page_laddr);
        self.quickmap_busy = false;
    }

    // ------------------------------------------------------------------
    // Page fault handling
    // ------------------------------------------------------------------

    /// Dispatch one page fault for the current process.
    ///
    /// Entry contract: interrupts disabled; `fault` carries CR2 and the
    /// CPU error code. The faulting address must never be the quickmap
    /// slot.
    pub fn handle_page_fault(&mut self, process: &Process, fault: &PageFault) -> PageFaultResponse {
        debug_assert!(!interrupts_enabled());
        assert!(
            fault.laddr() != self.quickmap_addr,
            "page fault at the quickmap slot"
        );
        log::debug!(
            "mm: page fault ({}) at {}",
            fault.code().explain(),
            fault.laddr()
        );
        let Some(region) = self.region_from_laddr(process, fault.laddr()) else {
            log::error!(
                "mm: {}({}) fault at invalid address {}",
                process.name(),
                process.pid(),
                fault.laddr()
            );
            return PageFaultResponse::ShouldCrash;
        };
        let page_index = region.page_index_from_address(fault.laddr());
        if fault.is_not_present() {
            if region.vmo().inode().is_some() {
                log::debug!("mm: NP(inode) fault in '{}' page {page_index}", region.name());
                if self.page_in_from_inode(&region, page_index) {
                    PageFaultResponse::Continue
                } else {
                    PageFaultResponse::ShouldCrash
                }
            } else {
                log::debug!("mm: NP(zero) fault in '{}' page {page_index}", region.name());
                self.zero_page(&region, page_index);
                PageFaultResponse::Continue
            }
        } else if region.is_cow(page_index) {
            log::debug!("mm: PV(cow) fault in '{}' page {page_index}", region.name());
            let success = self.copy_on_write(&region, page_index);
            assert!(success);
            PageFaultResponse::Continue
        } else {
            log::error!(
                "mm: PV(error) fault in '{}' page {page_index} ({}:{})",
                region.name(),
                process.name(),
                process.pid()
            );
            PageFaultResponse::ShouldCrash
        }
    }

    /// Back one region page with a zero-filled user frame.
    ///
    /// Pool exhaustion here is fatal — the fault path has nowhere to
    /// report failure yet.
    pub fn zero_page(&mut self, region: &Region, page_index_in_region: usize) -> bool {
        debug_assert!(!interrupts_enabled());
        let page = self
            .user_pool
            .allocate()
            .expect("zero_page: out of physical pages");
        log::trace!("mm: zero-filling {}", page.base());
        let dest_laddr = self.quickmap_page(&page);
        let active = Arc::clone(&self.active_directory);
        let dest = self.linear_ptr(&active, dest_laddr);
        unsafe { core::ptr::write_bytes(dest, 0, PAGE_SIZE as usize) };
        self.unquickmap_page();
        region.set_cow(page_index_in_region, false);
        region.vmo().pages()[region.first_page_index() + page_index_in_region] = Some(page);
        self.remap_region_page(region, page_index_in_region, true);
        true
    }

    /// Resolve a copy-on-write fault on one region page.
    ///
    /// If nobody shares the frame anymore the page simply flips back to
    /// read-write; otherwise the contents are copied into a fresh user
    /// frame through the quickmap and the VMO slot is repointed.
    pub fn copy_on_write(&mut self, region: &Region, page_index_in_region: usize) -> bool {
        debug_assert!(!interrupts_enabled());
        let slot_index = region.first_page_index() + page_index_in_region;
        let (shared, old_base) = {
            let pages = region.vmo().pages();
            let page = pages[slot_index]
                .as_ref()
                .expect("copy_on_write: slot is empty");
            (page.retain_count() > 1, page.base())
        };
        if !shared {
            log::debug!("mm: COW page no longer shared, remapping read-write");
            region.set_cow(page_index_in_region, false);
            self.remap_region_page(region, page_index_in_region, true);
            return true;
        }

        let replacement = self
            .user_pool
            .allocate()
            .expect("copy_on_write: out of physical pages");
        log::debug!("mm: COW {} <- {old_base}", replacement.base());
        // The source is still mapped (read-only) at the region's linear
        // address; the destination goes through the quickmap.
        let region_directory = region.directory().expect("region not installed");
        let src = self.linear_ptr(&region_directory, region.page_address(page_index_in_region));
        let dest_laddr = self.quickmap_page(&replacement);
        let active = Arc::clone(&self.active_directory);
        let dest = self.linear_ptr(&active, dest_laddr);
        unsafe { core::ptr::copy_nonoverlapping(src, dest, PAGE_SIZE as usize) };
        region.vmo().pages()[slot_index] = Some(replacement);
        self.unquickmap_page();
        region.set_cow(page_index_in_region, false);
        self.remap_region_page(region, page_index_in_region, true);
        true
    }

    /// Demand-page one region page from the VMO's inode.
    ///
    /// The only operation that runs with interrupts briefly enabled: the
    /// inode read may block or reschedule. Interrupts are masked again
    /// before any MM state is touched. Allocation or read failure is
    /// reported to the caller (whose `Continue` becomes `ShouldCrash`).
    pub fn page_in_from_inode(&mut self, region: &Region, page_index_in_region: usize) -> bool {
        let vmo = Arc::clone(region.vmo());
        let inode = Arc::clone(vmo.inode().expect("page_in_from_inode: VMO is not inode-backed"));
        let slot_index = region.first_page_index() + page_index_in_region;
        {
            let mut pages = vmo.pages();
            assert!(
                pages[slot_index].is_none(),
                "page_in_from_inode: slot already populated"
            );
            let Some(page) = self.user_pool.allocate() else {
                log::error!("mm: page_in_from_inode was unable to allocate a physical page");
                return false;
            };
            pages[slot_index] = Some(page);
        }
        self.remap_region_page(region, page_index_in_region, true);

        let region_directory = region.directory().expect("region not installed");
        let dest = self.linear_ptr(&region_directory, region.page_address(page_index_in_region));
        let dest_slice = unsafe { core::slice::from_raw_parts_mut(dest, PAGE_SIZE as usize) };
        let offset = vmo.inode_offset() + slot_index as u32 * PAGE_SIZE;

        // The inode driver may block or schedule; let interrupts back in
        // for the duration of the read, and no longer.
        sti_enable_interrupts();
        let nread = inode.read_bytes(offset, dest_slice);
        cli_stop_interrupts();

        match nread {
            Err(error) => {
                log::error!("mm: page_in_from_inode had an error while reading: {error}");
                false
            }
            Ok(nread) => {
                if nread < PAGE_SIZE as usize {
                    // Short read: zero the tail so no stale bytes leak.
                    dest_slice[nread..].fill(0);
                }
                true
            }
        }
    }

    // ------------------------------------------------------------------
    // VM object factories
    // ------------------------------------------------------------------

    /// An anonymous, demand-zero VMO of `size` bytes (page-aligned up).
    #[must_use]
    pub fn create_anonymous_vmo(&mut self, size: u32) -> Arc<VmObject> {
        let _irq = IrqGuard::new();
        let vmo = Arc::new(VmObject::new_anonymous(size));
        self.register_vmo(&vmo);
        vmo
    }

    /// The VMO caching `inode`'s pages, creating it on first use.
    ///
    /// An inode has at most one VMO at any time; a second call returns
    /// the first object. Check-and-install happens under the interrupt
    /// guard.
    #[must_use]
    pub fn create_file_backed_vmo(&mut self, inode: Arc<dyn PagedInode>, size: u32) -> Arc<VmObject> {
        let _irq = IrqGuard::new();
        if let Some(existing) = inode.vmo_cell().get() {
            return existing;
        }
        let vmo = Arc::new(VmObject::new_file_backed(Arc::clone(&inode), size, 0));
        inode.vmo_cell().set(&vmo);
        self.register_vmo(&vmo);
        vmo
    }

    /// Wrap the contiguous physical range at `paddr` (a framebuffer) in
    /// a VMO whose frames never enter any pool.
    #[must_use]
    pub fn create_framebuffer_vmo(&mut self, paddr: PhysicalAddress, size: u32) -> Arc<VmObject> {
        let _irq = IrqGuard::new();
        let vmo = Arc::new(VmObject::new_framebuffer_wrapper(paddr, size));
        self.register_vmo(&vmo);
        vmo
    }

    /// Shallow-copy `vmo`, sharing its frame references. Used only by
    /// the copy-on-write region clone.
    #[must_use]
    pub fn clone_vmo(&mut self, vmo: &Arc<VmObject>) -> Arc<VmObject> {
        let _irq = IrqGuard::new();
        let clone = Arc::new(vmo.clone_contents());
        self.register_vmo(&clone);
        clone
    }

    // ------------------------------------------------------------------
    // Region factories
    // ------------------------------------------------------------------

    /// An anonymous region of `size` bytes at `laddr`.
    #[must_use]
    pub fn allocate_region(
        &mut self,
        laddr: LinearAddress,
        size: u32,
        name: &str,
        access: RegionAccess,
    ) -> Arc<Region> {
        let _irq = IrqGuard::new();
        let size = align_up(size, PAGE_SIZE);
        let vmo = self.create_anonymous_vmo(size);
        vmo.set_name(name);
        let region = Arc::new(Region::new(
            laddr,
            size,
            vmo,
            0,
            String::from(name),
            access,
            false,
        ));
        self.register_region(&region);
        region
    }

    /// A region of `size` bytes at `laddr` backed by `inode`.
    #[must_use]
    pub fn allocate_file_backed_region(
        &mut self,
        laddr: LinearAddress,
        size: u32,
        inode: Arc<dyn PagedInode>,
        name: &str,
        access: RegionAccess,
    ) -> Arc<Region> {
        let _irq = IrqGuard::new();
        let size = align_up(size, PAGE_SIZE);
        let vmo = self.create_file_backed_vmo(inode, size);
        let region = Arc::new(Region::new(
            laddr,
            size,
            vmo,
            0,
            String::from(name),
            access,
            false,
        ));
        self.register_region(&region);
        region
    }

    /// A region windowing `vmo` at byte `offset_in_vmo`.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn allocate_region_with_vmo(
        &mut self,
        laddr: LinearAddress,
        size: u32,
        vmo: Arc<VmObject>,
        offset_in_vmo: u32,
        name: &str,
        access: RegionAccess,
        cow: bool,
    ) -> Arc<Region> {
        let _irq = IrqGuard::new();
        let size = align_up(size, PAGE_SIZE);
        let region = Arc::new(Region::new(
            laddr,
            size,
            vmo,
            offset_in_vmo,
            String::from(name),
            access,
            cow,
        ));
        self.register_region(&region);
        region
    }

    /// Clone a region for fork.
    ///
    /// Shared or read-only regions produce a sibling over the same VMO.
    /// Private writable regions take the copy-on-write path: the parent
    /// is remapped read-only with every COW bit set, and the child gets
    /// a shallow VMO clone with its COW map fully set. Both sides fault
    /// on their next write.
    #[must_use]
    pub fn clone_region(&mut self, region: &Arc<Region>) -> Arc<Region> {
        let _irq = IrqGuard::new();
        if region.is_shared() || (region.is_readable() && !region.is_writable()) {
            // A new region backed by the same VMObject.
            return self.allocate_region_with_vmo(
                region.linear_address(),
                region.size(),
                Arc::clone(region.vmo()),
                region.offset_in_vmo(),
                region.name(),
                region.access(),
                false,
            );
        }
        log::debug!(
            "mm: cowing '{}' at {}",
            region.name(),
            region.linear_address()
        );
        // The parent becomes COW as well.
        region.set_all_cow(true);
        self.remap_region(region);
        let vmo = self.clone_vmo(region.vmo());
        self.allocate_region_with_vmo(
            region.linear_address(),
            region.size(),
            vmo,
            region.offset_in_vmo(),
            region.name(),
            region.access(),
            true,
        )
    }

    // ------------------------------------------------------------------
    // Registries
    // ------------------------------------------------------------------

    fn register_vmo(&mut self, vmo: &Arc<VmObject>) {
        let _irq = IrqGuard::new();
        self.prune_registries();
        self.vmos.push(Arc::downgrade(vmo));
    }

    fn register_region(&mut self, region: &Arc<Region>) {
        let _irq = IrqGuard::new();
        self.prune_registries();
        self.regions.push(Arc::downgrade(region));
    }

    fn prune_registries(&mut self) {
        self.vmos.retain(|weak| weak.strong_count() > 0);
        self.regions.retain(|weak| weak.strong_count() > 0);
    }

    /// Number of live VM objects (diagnostics).
    #[must_use]
    pub fn vmo_count(&mut self) -> usize {
        let _irq = IrqGuard::new();
        self.prune_registries();
        self.vmos.len()
    }

    /// Number of live regions (diagnostics).
    #[must_use]
    pub fn region_count(&mut self) -> usize {
        let _irq = IrqGuard::new();
        self.prune_registries();
        self.regions.len()
    }
}
