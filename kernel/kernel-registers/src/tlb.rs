//! TLB maintenance.
//!
//! Two operations exist on i386: `invlpg` for one linear address, and a
//! CR3 reload to drop every non-global entry. Writes to a directory
//! that is *not* currently installed need neither — the TLB only caches
//! translations of the active address space.

use kernel_vmem::LinearAddress;

/// Invalidate the TLB entry for one linear address (`invlpg`).
///
/// # Safety
/// Must run at CPL 0. Inert on non-x86 targets.
#[inline]
pub unsafe fn invalidate_page(la: LinearAddress) {
    #[cfg(target_arch = "x86")]
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) la.as_u32(), options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "x86"))]
    let _ = la;
}

/// Flush the entire TLB by reloading CR3.
///
/// # Safety
/// Must run at CPL 0 with paging enabled. Inert on non-x86 targets.
#[inline]
pub unsafe fn flush_all() {
    #[cfg(target_arch = "x86")]
    unsafe {
        core::arch::asm!(
            "mov {tmp}, cr3",
            "mov cr3, {tmp}",
            tmp = out(reg) _,
            options(nostack, preserves_flags)
        );
    }
}
