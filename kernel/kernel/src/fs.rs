//! The inode interface the pager consumes.
//!
//! The filesystem proper lives outside this crate; demand paging only
//! needs a byte-range reader plus the back-pointer cell that enforces
//! the one-VMO-per-inode rule.

use crate::mm::VmObject;
use alloc::sync::{Arc, Weak};
use kernel_sync::SpinMutex;
use thiserror::Error;

/// Failure of a backing-store read.
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum InodeReadError {
    /// The underlying device or filesystem reported an error. The
    /// faulting process is crashed; there is no retry.
    #[error("backing store read failed")]
    Io,
}

/// A byte-addressable backing object for file-backed memory.
///
/// Implementations may block or schedule inside [`read_bytes`] — the
/// pager briefly re-enables interrupts around the call for exactly that
/// reason.
///
/// [`read_bytes`]: PagedInode::read_bytes
pub trait PagedInode: Send + Sync {
    /// Read up to `dest.len()` bytes starting at byte `offset`.
    ///
    /// A return of `Ok(n)` with `n < dest.len()` is a short read (end of
    /// file); the caller zero-fills the tail.
    ///
    /// # Errors
    /// [`InodeReadError::Io`] when the backing store fails.
    fn read_bytes(&self, offset: u32, dest: &mut [u8]) -> Result<usize, InodeReadError>;

    /// The back-pointer cell tying this inode to its (at most one) VMO.
    fn vmo_cell(&self) -> &InodeVmoCell;
}

/// Weak back-pointer from an inode to the VM object caching its pages.
///
/// The inode never owns the VMO (the relation is lookup-only); the VMO
/// retains the inode and clears this cell from its drop. At most one
/// VMO per inode exists at any time — the file-backed factory checks
/// and installs under the interrupt guard.
pub struct InodeVmoCell(SpinMutex<Option<Weak<VmObject>>>);

impl Default for InodeVmoCell {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeVmoCell {
    #[must_use]
    pub const fn new() -> Self {
        Self(SpinMutex::new(None))
    }

    /// The currently associated VMO, if one is still alive.
    #[must_use]
    pub fn get(&self) -> Option<Arc<VmObject>> {
        self.0.lock().as_ref()?.upgrade()
    }

    pub(crate) fn set(&self, vmo: &Arc<VmObject>) {
        *self.0.lock() = Some(Arc::downgrade(vmo));
    }

    /// Clear the cell, but only if it still designates `vmo`.
    ///
    /// A copy-on-write clone of a file-backed VMO shares the inode; when
    /// the clone dies it must not sever the inode's link to the original
    /// object.
    pub(crate) fn clear_if(&self, vmo: *const VmObject) {
        let mut slot = self.0.lock();
        if slot
            .as_ref()
            .is_some_and(|weak| core::ptr::eq(weak.as_ptr(), vmo))
        {
            *slot = None;
        }
    }
}
