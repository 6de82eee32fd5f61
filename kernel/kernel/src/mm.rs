//! # Virtual memory management
//!
//! The data model, leaves first:
//!
//! - a [`PhysicalPageRef`](kernel_alloc::PhysicalPageRef) owns a share
//!   of one 4 KiB frame;
//! - a [`VmObject`] is an ordered array of optional frames — the
//!   contents of a memory object (anonymous, inode-backed, or a raw
//!   physical window);
//! - a [`Region`] maps a window of a VMO at a linear address with
//!   permissions and a per-page copy-on-write bitmap;
//! - a [`PageDirectory`] is one hardware address space, owning the
//!   frames behind its page tables;
//! - the [`MemoryManager`] owns the frame pools, the kernel directory,
//!   the quickmap slot, and the fault handlers that tie it all together.
//!
//! Mutual exclusion is interrupt masking: this is a single-CPU kernel,
//! and every public operation that mutates shared state runs under an
//! [`IrqGuard`](kernel_sync::IrqGuard).

mod bitmap;
pub mod layout;
mod memory_manager;
mod page_directory;
mod page_fault;
mod region;
mod vm_object;

pub use bitmap::Bitmap;
pub use memory_manager::{CommitError, MemoryManager};
pub use page_directory::PageDirectory;
pub use page_fault::{PageFault, PageFaultCode, PageFaultResponse};
pub use region::{Region, RegionAccess};
pub use vm_object::VmObject;
