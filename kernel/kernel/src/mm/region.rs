use crate::mm::bitmap::Bitmap;
use crate::mm::page_directory::PageDirectory;
use crate::mm::vm_object::VmObject;
use alloc::string::String;
use alloc::sync::Arc;
use bitflags::bitflags;
use kernel_sync::SpinMutex;
use kernel_vmem::{LinearAddress, PAGE_SIZE};

bitflags! {
    /// Access rights of a region.
    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    pub struct RegionAccess: u8 {
        /// Mapped readable.
        const READ = 1 << 0;
        /// Mapped writable (subject to the per-page COW override).
        const WRITE = 1 << 1;
        /// Shared on clone: children reference the same VMO instead of
        /// getting a copy-on-write split.
        const SHARED = 1 << 2;
    }
}

/// A window of a [`VmObject`] mapped at a linear address.
///
/// The region owns its identity — base, size, byte offset into the VMO,
/// permissions, name — plus the copy-on-write bitmap, one bit per
/// *region* page. The COW map is deliberately region-relative: the VMO
/// knows nothing about COW, and a region whose `offset_in_vmo` is
/// nonzero indexes its own pages from zero.
pub struct Region {
    linear_address: LinearAddress,
    /// Size in bytes; page-aligned.
    size: u32,
    offset_in_vmo: u32,
    vmo: Arc<VmObject>,
    name: String,
    access: RegionAccess,
    cow_map: SpinMutex<Bitmap>,
    /// The directory this region is currently installed in, if any.
    page_directory: SpinMutex<Option<Arc<PageDirectory>>>,
}

impl Region {
    pub(crate) fn new(
        linear_address: LinearAddress,
        size: u32,
        vmo: Arc<VmObject>,
        offset_in_vmo: u32,
        name: String,
        access: RegionAccess,
        cow: bool,
    ) -> Self {
        assert!(linear_address.is_page_aligned());
        assert!(size > 0 && size % PAGE_SIZE == 0);
        assert!(offset_in_vmo % PAGE_SIZE == 0);
        let page_count = (size / PAGE_SIZE) as usize;
        let first = (offset_in_vmo / PAGE_SIZE) as usize;
        assert!(
            first + page_count <= vmo.page_count(),
            "region window [{first}, {}) exceeds VMO page count {}",
            first + page_count,
            vmo.page_count()
        );
        Self {
            linear_address,
            size,
            offset_in_vmo,
            vmo,
            name,
            access,
            cow_map: SpinMutex::new(Bitmap::new(page_count, cow)),
            page_directory: SpinMutex::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub const fn linear_address(&self) -> LinearAddress {
        self.linear_address
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte offset into the VMO where this window begins.
    #[inline]
    #[must_use]
    pub const fn offset_in_vmo(&self) -> u32 {
        self.offset_in_vmo
    }

    #[inline]
    #[must_use]
    pub const fn access(&self) -> RegionAccess {
        self.access
    }

    #[inline]
    #[must_use]
    pub const fn is_readable(&self) -> bool {
        self.access.contains(RegionAccess::READ)
    }

    #[inline]
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.access.contains(RegionAccess::WRITE)
    }

    #[inline]
    #[must_use]
    pub const fn is_shared(&self) -> bool {
        self.access.contains(RegionAccess::SHARED)
    }

    /// The VM object this region windows into.
    #[inline]
    #[must_use]
    pub fn vmo(&self) -> &Arc<VmObject> {
        &self.vmo
    }

    /// Number of pages spanned by this region.
    #[inline]
    #[must_use]
    pub const fn page_count(&self) -> usize {
        (self.size / PAGE_SIZE) as usize
    }

    /// Index of the first VMO slot this region windows.
    #[inline]
    #[must_use]
    pub const fn first_page_index(&self) -> usize {
        (self.offset_in_vmo / PAGE_SIZE) as usize
    }

    /// Index of the last VMO slot this region windows (inclusive).
    #[inline]
    #[must_use]
    pub const fn last_page_index(&self) -> usize {
        self.first_page_index() + self.page_count() - 1
    }

    /// Whether `laddr` lies inside this region.
    #[must_use]
    pub fn contains(&self, laddr: LinearAddress) -> bool {
        laddr >= self.linear_address && laddr.as_u32() < self.linear_address.as_u32() + self.size
    }

    /// The region-relative page index of `laddr`.
    ///
    /// Precondition: `self.contains(laddr)`.
    #[must_use]
    pub fn page_index_from_address(&self, laddr: LinearAddress) -> usize {
        debug_assert!(self.contains(laddr));
        ((laddr.page_base() - self.linear_address) / PAGE_SIZE) as usize
    }

    /// The linear address of region page `index`.
    #[must_use]
    pub fn page_address(&self, index: usize) -> LinearAddress {
        debug_assert!(index < self.page_count());
        self.linear_address.offset(index as u32 * PAGE_SIZE)
    }

    /// Whether region page `index` is marked copy-on-write.
    #[must_use]
    pub fn is_cow(&self, index: usize) -> bool {
        self.cow_map.lock().get(index)
    }

    pub(crate) fn set_cow(&self, index: usize, value: bool) {
        self.cow_map.lock().set(index, value);
    }

    pub(crate) fn set_all_cow(&self, value: bool) {
        self.cow_map.lock().fill(value);
    }

    /// The directory this region is currently installed in.
    #[must_use]
    pub fn directory(&self) -> Option<Arc<PageDirectory>> {
        self.page_directory.lock().clone()
    }

    pub(crate) fn attach(&self, directory: &Arc<PageDirectory>) {
        *self.page_directory.lock() = Some(Arc::clone(directory));
    }

    pub(crate) fn detach(&self) {
        *self.page_directory.lock() = None;
    }

    /// Bytes of this region currently backed by frames.
    #[must_use]
    pub fn committed(&self) -> u32 {
        let pages = self.vmo.pages();
        let mut bytes = 0;
        for i in 0..self.page_count() {
            if pages[self.first_page_index() + i].is_some() {
                bytes += PAGE_SIZE;
            }
        }
        bytes
    }
}
