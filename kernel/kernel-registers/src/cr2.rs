use crate::LoadRegisterUnsafe;
use kernel_vmem::LinearAddress;

/// CR2 — Page-Fault Linear Address.
///
/// The CPU latches the faulting linear address here before raising
/// vector 14; the trap prologue reads it and hands it to the memory
/// manager as part of the page-fault description.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Cr2(pub LinearAddress);

impl Cr2 {
    /// The faulting linear address.
    #[inline]
    #[must_use]
    pub const fn linear_address(self) -> LinearAddress {
        self.0
    }
}

impl LoadRegisterUnsafe for Cr2 {
    unsafe fn load_unsafe() -> Self {
        #[cfg(target_arch = "x86")]
        {
            let cr2: u32;
            unsafe {
                core::arch::asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags));
            }
            Self(LinearAddress::from_u32(cr2))
        }
        #[cfg(not(target_arch = "x86"))]
        {
            Self(LinearAddress::from_u32(0))
        }
    }
}
