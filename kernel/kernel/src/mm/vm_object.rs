use crate::fs::PagedInode;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use kernel_alloc::{PhysicalPageRef, RingClass};
use kernel_sync::{SpinMutex, SpinMutexGuard};
use kernel_vmem::{PAGE_SIZE, PhysicalAddress, align_up};

/// What stands behind a VM object's pages.
pub(crate) enum Backing {
    /// Demand-zero memory; empty slots fill with zeroed frames on fault.
    Anonymous,
    /// A window of an inode; empty slots fill by reading the backing
    /// store at `offset + slot * PAGE_SIZE`.
    Inode {
        inode: Arc<dyn PagedInode>,
        offset: u32,
    },
    /// A raw physical window (framebuffers). All slots are populated at
    /// construction with eternal frames and never fault.
    Physical,
}

/// The contents of a memory object: an ordered array of optional,
/// reference-counted physical frames.
///
/// A VMO is shared by every region that windows into it; its lifetime is
/// that of the longest-lived holder. The page array is the unit of
/// sharing for copy-on-write: a clone references the same frames, and
/// the write-fault path replaces individual slots.
pub struct VmObject {
    /// Size in bytes, page-aligned upward.
    size: u32,
    backing: Backing,
    name: SpinMutex<Option<String>>,
    pages: SpinMutex<Vec<Option<PhysicalPageRef>>>,
}

impl VmObject {
    /// All slots empty; pages materialize on first touch.
    pub(crate) fn new_anonymous(size: u32) -> Self {
        let size = align_up(size, PAGE_SIZE);
        let count = (size / PAGE_SIZE) as usize;
        Self {
            size,
            backing: Backing::Anonymous,
            name: SpinMutex::new(None),
            pages: SpinMutex::new(vec![None; count]),
        }
    }

    /// All slots empty; pages fill from `inode` on fault.
    ///
    /// Callers go through the memory manager's factory, which enforces
    /// the one-VMO-per-inode rule before constructing.
    pub(crate) fn new_file_backed(inode: Arc<dyn PagedInode>, size: u32, offset: u32) -> Self {
        let size = align_up(size, PAGE_SIZE);
        let count = (size / PAGE_SIZE) as usize;
        Self {
            size,
            backing: Backing::Inode { inode, offset },
            name: SpinMutex::new(None),
            pages: SpinMutex::new(vec![None; count]),
        }
    }

    /// Wrap the contiguous physical range starting at `paddr`.
    ///
    /// The frames are minted here as eternal user-class tokens: mapped
    /// to userspace, but never part of any pool and never reclaimed.
    pub(crate) fn new_framebuffer_wrapper(paddr: PhysicalAddress, size: u32) -> Self {
        let size = align_up(size, PAGE_SIZE);
        let count = (size / PAGE_SIZE) as usize;
        let pages = (0..count)
            .map(|i| {
                Some(PhysicalPageRef::new_eternal(
                    paddr.offset(i as u32 * PAGE_SIZE),
                    RingClass::User,
                ))
            })
            .collect();
        Self {
            size,
            backing: Backing::Physical,
            name: SpinMutex::new(None),
            pages: SpinMutex::new(pages),
        }
    }

    /// Shallow copy sharing the frame references.
    ///
    /// This is the copy-on-write mechanism: both objects point at the
    /// same frames (each slot's reference count goes up by one), and a
    /// later write fault gives the writer a private replacement slot.
    pub(crate) fn clone_contents(&self) -> Self {
        let backing = match &self.backing {
            Backing::Anonymous => Backing::Anonymous,
            Backing::Inode { inode, offset } => Backing::Inode {
                inode: Arc::clone(inode),
                offset: *offset,
            },
            Backing::Physical => Backing::Physical,
        };
        Self {
            size: self.size,
            backing,
            name: SpinMutex::new(self.name.lock().clone()),
            pages: SpinMutex::new(self.pages.lock().clone()),
        }
    }

    /// Size in bytes (page-aligned).
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Number of page slots.
    #[inline]
    #[must_use]
    pub const fn page_count(&self) -> usize {
        (self.size / PAGE_SIZE) as usize
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self.backing, Backing::Anonymous)
    }

    /// The backing inode, for inode-backed objects.
    #[must_use]
    pub fn inode(&self) -> Option<&Arc<dyn PagedInode>> {
        match &self.backing {
            Backing::Inode { inode, .. } => Some(inode),
            _ => None,
        }
    }

    /// Byte offset into the inode where slot 0 begins.
    #[must_use]
    pub fn inode_offset(&self) -> u32 {
        match &self.backing {
            Backing::Inode { offset, .. } => *offset,
            _ => 0,
        }
    }

    pub fn set_name(&self, name: &str) {
        *self.name.lock() = Some(String::from(name));
    }

    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.name.lock().clone()
    }

    /// The page slot array. Held briefly, with interrupts disabled;
    /// never across a suspension point.
    pub(crate) fn pages(&self) -> SpinMutexGuard<'_, Vec<Option<PhysicalPageRef>>> {
        self.pages.lock()
    }

    /// Bytes currently backed by frames.
    #[must_use]
    pub fn committed_bytes(&self) -> u32 {
        let pages = self.pages.lock();
        pages.iter().filter(|slot| slot.is_some()).count() as u32 * PAGE_SIZE
    }
}

impl Drop for VmObject {
    fn drop(&mut self) {
        // An inode points back at its VMO only while that VMO is alive.
        if let Backing::Inode { inode, .. } = &self.backing {
            inode.vmo_cell().clear_if(core::ptr::from_ref(self));
        }
    }
}
