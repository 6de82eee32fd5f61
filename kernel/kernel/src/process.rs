//! The execution-context interface the memory manager consumes.
//!
//! The scheduler and task model live elsewhere; the MM only needs a
//! context's page directory, ring level, region list, and a place to
//! save CR3 on an address-space switch, plus name/pid for diagnostics.

use crate::mm::{PageDirectory, Region};
use crate::privilege::Ring;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use kernel_vmem::PhysicalAddress;

/// One schedulable execution context, as seen by the memory manager.
pub struct Process {
    name: String,
    pid: u32,
    ring: Ring,
    page_directory: Arc<PageDirectory>,
    regions: Vec<Arc<Region>>,
    /// CR3 as saved in the context's task state; written on
    /// address-space switch.
    saved_cr3: PhysicalAddress,
}

impl Process {
    #[must_use]
    pub fn new(name: &str, pid: u32, ring: Ring, page_directory: Arc<PageDirectory>) -> Self {
        Self {
            name: String::from(name),
            pid,
            ring,
            page_directory,
            regions: Vec::new(),
            saved_cr3: PhysicalAddress::from_u32(0),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    #[inline]
    #[must_use]
    pub const fn ring(&self) -> Ring {
        self.ring
    }

    /// Whether this context executes at user privilege.
    #[inline]
    #[must_use]
    pub fn is_ring3(&self) -> bool {
        self.ring == Ring::Ring3
    }

    #[inline]
    #[must_use]
    pub fn page_directory(&self) -> &Arc<PageDirectory> {
        &self.page_directory
    }

    /// The regions currently belonging to this context.
    #[inline]
    #[must_use]
    pub fn regions(&self) -> &[Arc<Region>] {
        &self.regions
    }

    pub fn add_region(&mut self, region: Arc<Region>) {
        self.regions.push(region);
    }

    /// Remove (and return) the region containing `region`'s base, if
    /// owned. The caller is responsible for unmapping.
    pub fn take_region(&mut self, region: &Arc<Region>) -> Option<Arc<Region>> {
        let index = self.regions.iter().position(|r| Arc::ptr_eq(r, region))?;
        Some(self.regions.remove(index))
    }

    #[inline]
    #[must_use]
    pub const fn saved_cr3(&self) -> PhysicalAddress {
        self.saved_cr3
    }

    pub(crate) fn set_saved_cr3(&mut self, cr3: PhysicalAddress) {
        self.saved_cr3 = cr3;
    }
}
