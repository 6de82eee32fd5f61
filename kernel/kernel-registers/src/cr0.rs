use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;

/// CR0 — processor control flags.
///
/// Only the bits relevant to a 32-bit paging kernel are named; the
/// reserved ranges are kept opaque. Enabling paging means setting both
/// `PE` (bit 0) and `PG` (bit 31) — the `0x8000_0001` mask of the
/// bootstrap.
#[bitfield(u32)]
pub struct Cr0 {
    /// Bit 0 — PE: Protection Enable. Protected mode when set.
    pub protection_enable: bool,

    /// Bit 1 — MP: Monitor Coprocessor.
    pub monitor_coprocessor: bool,

    /// Bit 2 — EM: x87 Emulation.
    pub emulation: bool,

    /// Bit 3 — TS: Task Switched.
    pub task_switched: bool,

    /// Bit 4 — ET: Extension Type (hardwired on i486+).
    pub extension_type: bool,

    /// Bit 5 — NE: Numeric Error reporting.
    pub numeric_error: bool,

    /// Bits 6–15 — Reserved.
    #[bits(10)]
    reserved0: u16,

    /// Bit 16 — WP: Write Protect. When set, supervisor writes honor
    /// read-only PTEs. This kernel leaves it clear, which is what lets
    /// the copy-on-write fault path read through read-only mappings.
    pub write_protect: bool,

    /// Bit 17 — Reserved.
    reserved1: bool,

    /// Bit 18 — AM: Alignment Mask.
    pub alignment_mask: bool,

    /// Bits 19–28 — Reserved.
    #[bits(10)]
    reserved2: u16,

    /// Bit 29 — NW: Not Write-through.
    pub not_write_through: bool,

    /// Bit 30 — CD: Cache Disable.
    pub cache_disable: bool,

    /// Bit 31 — PG: Paging. Linear addresses are translated through the
    /// page tables once this is set (requires PE).
    pub paging: bool,
}

impl Cr0 {
    /// This value with protected mode and paging enabled, the state the
    /// bootstrap leaves the CPU in.
    #[inline]
    #[must_use]
    pub const fn with_paging_enabled(self) -> Self {
        self.with_protection_enable(true).with_paging(true)
    }
}

impl LoadRegisterUnsafe for Cr0 {
    unsafe fn load_unsafe() -> Self {
        #[cfg(target_arch = "x86")]
        {
            let cr0: u32;
            unsafe {
                core::arch::asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
            }
            Self::from_bits(cr0)
        }
        #[cfg(not(target_arch = "x86"))]
        {
            Self::new()
        }
    }
}

impl StoreRegisterUnsafe for Cr0 {
    unsafe fn store_unsafe(self) {
        #[cfg(target_arch = "x86")]
        unsafe {
            core::arch::asm!("mov cr0, {}", in(reg) self.into_bits(), options(nostack, preserves_flags));
        }
        #[cfg(not(target_arch = "x86"))]
        let _ = self;
    }
}
