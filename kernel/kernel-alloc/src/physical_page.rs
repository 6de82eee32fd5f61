use crate::pool::PagePool;
use alloc::sync::{Arc, Weak};
use core::fmt;
use kernel_sync::IrqGuard;
use kernel_vmem::PhysicalAddress;

/// The privilege class a frame belongs to.
///
/// A frame never changes class: supervisor frames back page tables and
/// kernel-only data, user frames back process memory. Each class has its
/// own pool.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum RingClass {
    Supervisor,
    User,
}

/// A token for one 4 KiB physical frame.
///
/// Carries the frame's base address, its [`RingClass`], whether it may
/// ever be returned to a pool, and a weak link to the pool it was minted
/// from. Framebuffer windows and the fixed bootstrap frames are
/// *eternal*: not reclaimable, with no origin pool.
pub struct PhysicalPage {
    base: PhysicalAddress,
    class: RingClass,
    reclaimable: bool,
    pub(crate) pool: Weak<PagePool>,
}

impl PhysicalPage {
    pub(crate) fn new(
        base: PhysicalAddress,
        class: RingClass,
        reclaimable: bool,
        pool: Weak<PagePool>,
    ) -> Self {
        debug_assert!(base.is_page_aligned());
        Self {
            base,
            class,
            reclaimable,
            pool,
        }
    }

    /// The frame's physical base address (4 KiB-aligned).
    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn class(&self) -> RingClass {
        self.class
    }

    /// Whether the frame may ever re-enter a pool.
    #[inline]
    #[must_use]
    pub const fn is_reclaimable(&self) -> bool {
        self.reclaimable
    }
}

impl fmt::Debug for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage({}, {:?})", self.base, self.class)
    }
}

/// Cloneable owning handle to a [`PhysicalPage`].
///
/// Cloning shares the frame (the mechanism behind copy-on-write
/// sharing); dropping the last handle pushes the frame back onto its
/// origin pool with its count reset to one. Eternal frames are simply
/// forgotten on last drop.
pub struct PhysicalPageRef {
    // `Some` until dropped; `Option` so `drop` can take the Arc out.
    page: Option<Arc<PhysicalPage>>,
}

impl PhysicalPageRef {
    pub(crate) fn from_arc(page: Arc<PhysicalPage>) -> Self {
        Self { page: Some(page) }
    }

    /// Wrap a frame that is never pool-managed: framebuffer windows and
    /// the fixed frames of the bootstrap memory map.
    #[must_use]
    pub fn new_eternal(base: PhysicalAddress, class: RingClass) -> Self {
        Self::from_arc(Arc::new(PhysicalPage::new(
            base,
            class,
            false,
            Weak::new(),
        )))
    }

    #[inline]
    fn page(&self) -> &Arc<PhysicalPage> {
        // Invariant: `page` is only `None` inside `drop`.
        self.page.as_ref().expect("PhysicalPageRef already dropped")
    }

    /// The frame's physical base address.
    #[inline]
    #[must_use]
    pub fn base(&self) -> PhysicalAddress {
        self.page().base()
    }

    #[inline]
    #[must_use]
    pub fn class(&self) -> RingClass {
        self.page().class()
    }

    #[inline]
    #[must_use]
    pub fn is_reclaimable(&self) -> bool {
        self.page().is_reclaimable()
    }

    /// Number of handles currently sharing this frame.
    ///
    /// The copy-on-write path uses `retain_count() == 1` to detect that
    /// nobody else shares a page and the write can proceed in place.
    #[inline]
    #[must_use]
    pub fn retain_count(&self) -> usize {
        Arc::strong_count(self.page())
    }

    /// Whether two handles refer to the same frame token.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self.page(), other.page())
    }
}

impl Clone for PhysicalPageRef {
    fn clone(&self) -> Self {
        Self {
            page: Some(Arc::clone(self.page())),
        }
    }
}

impl Drop for PhysicalPageRef {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        let _irq = IrqGuard::new();
        // Last holder: hand the frame back to the pool it was minted
        // from. Eternal frames have no pool and just disappear.
        if Arc::strong_count(&page) == 1 && page.is_reclaimable() {
            if let Some(pool) = page.pool.upgrade() {
                pool.push_returned(page);
            }
        }
    }
}

impl fmt::Debug for PhysicalPageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PhysicalPageRef({}, retain={})",
            self.base(),
            self.retain_count()
        )
    }
}
