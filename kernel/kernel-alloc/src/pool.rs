use crate::physical_page::{PhysicalPage, PhysicalPageRef, RingClass};
use alloc::sync::Arc;
use alloc::vec::Vec;
use kernel_sync::{IrqGuard, SpinMutex};
use kernel_vmem::PhysicalAddress;

/// An ordered pool of unowned frames of one [`RingClass`].
///
/// Frames are appended in ascending address order at bootstrap and
/// vended LIFO from the tail, so the highest address goes out first.
/// Returned frames are pushed back onto the tail.
///
/// Every operation that mutates the pool runs with interrupts disabled:
/// page faults and the timer can re-enter the memory manager, and the
/// pools are shared process-wide state.
pub struct PagePool {
    class: RingClass,
    frames: SpinMutex<Vec<Arc<PhysicalPage>>>,
}

impl PagePool {
    /// Create an empty pool for `class`.
    #[must_use]
    pub fn new(class: RingClass) -> Arc<Self> {
        Arc::new(Self {
            class,
            frames: SpinMutex::new(Vec::new()),
        })
    }

    #[inline]
    #[must_use]
    pub fn class(&self) -> RingClass {
        self.class
    }

    /// Mint the frame at `base` into this pool.
    ///
    /// Called once per real frame at bootstrap, in ascending address
    /// order. The minted token carries a weak link back here so the last
    /// handle drop can return it.
    pub fn seed(self: &Arc<Self>, base: PhysicalAddress) {
        let _irq = IrqGuard::new();
        let page = Arc::new(PhysicalPage::new(
            base,
            self.class,
            true,
            Arc::downgrade(self),
        ));
        self.frames.lock().push(page);
    }

    /// Take one frame from the tail of the pool.
    ///
    /// Returns `None` when the pool is exhausted — the only ordinary
    /// recoverable failure in the whole subsystem.
    #[must_use]
    pub fn allocate(&self) -> Option<PhysicalPageRef> {
        let _irq = IrqGuard::new();
        let mut frames = self.frames.lock();
        let page = frames.pop()?;
        log::trace!(
            "pool: vending {} ({} remaining in {:?} pool)",
            page.base(),
            frames.len(),
            self.class
        );
        drop(frames);
        Some(PhysicalPageRef::from_arc(page))
    }

    /// Number of frames currently free in this pool.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.frames.lock().len()
    }

    /// Re-admit a frame whose last owner just dropped it.
    ///
    /// Only called from the [`PhysicalPageRef`] drop path, which already
    /// holds the interrupt guard and has verified this is the sole
    /// remaining reference.
    pub(crate) fn push_returned(&self, page: Arc<PhysicalPage>) {
        debug_assert_eq!(Arc::strong_count(&page), 1);
        debug_assert!(page.is_reclaimable());
        log::trace!("pool: {} released back to {:?} pool", page.base(), self.class);
        self.frames.lock().push(page);
    }
}
