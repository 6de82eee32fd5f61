use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;
use kernel_vmem::PhysicalAddress;

/// CR3 — Page Directory Base Register (32-bit paging, no PCID).
///
/// Holds the physical base address of the current page directory and
/// cache-control flags for directory walks. The base must be 4 KiB
/// aligned.
#[bitfield(u32)]
pub struct Cr3 {
    /// Bits 0–2 — Reserved (must be 0).
    #[bits(3)]
    reserved0: u8,

    /// Bit 3 — PWT: Page-level Write-Through for directory accesses.
    pub pwt: bool,

    /// Bit 4 — PCD: Page-level Cache Disable for directory accesses.
    pub pcd: bool,

    /// Bits 5–11 — Reserved (must be 0 when written).
    #[bits(7)]
    reserved1: u8,

    /// Bits 12–31 — Page directory physical base >> 12.
    #[bits(20)]
    directory_base_4k: u32,
}

impl Cr3 {
    /// Create a `Cr3` value from a page directory physical base.
    ///
    /// `directory_phys` must be 4 KiB-aligned.
    #[must_use]
    pub fn from_directory_phys(directory_phys: PhysicalAddress) -> Self {
        debug_assert_eq!(
            directory_phys.as_u32() & 0xFFF,
            0,
            "page directory base must be 4K-aligned"
        );
        let mut cr3 = Self::new();
        cr3.set_directory_base_4k(directory_phys.as_u32() >> 12);
        cr3
    }

    /// Return the full physical address of the page directory base.
    #[must_use]
    pub const fn directory_phys(&self) -> PhysicalAddress {
        PhysicalAddress::from_u32(self.directory_base_4k() << 12)
    }
}

impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        #[cfg(target_arch = "x86")]
        {
            let cr3: u32;
            unsafe {
                core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
            }
            Self::from_bits(cr3)
        }
        #[cfg(not(target_arch = "x86"))]
        {
            Self::new()
        }
    }
}

impl StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        #[cfg(target_arch = "x86")]
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) self.into_bits(), options(nostack, preserves_flags));
        }
        #[cfg(not(target_arch = "x86"))]
        let _ = self;
    }
}
