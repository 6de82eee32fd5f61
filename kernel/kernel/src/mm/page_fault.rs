use bitfield_struct::bitfield;
use kernel_vmem::LinearAddress;

/// Page-fault error code layout (i386).
///
/// Pushed by the CPU when raising vector 14. Reference: Intel SDM
/// Vol. 3A, §6.15 "Interrupt 14—Page-Fault Exception (#PF)".
#[bitfield(u32)]
pub struct PageFaultCode {
    /// 0 = non-present page.
    /// 1 = protection violation (page present but access disallowed).
    pub present: bool, // bit 0

    /// 0 = read. 1 = write access.
    pub write: bool, // bit 1

    /// 0 = supervisor access. 1 = user-mode (CPL 3) access.
    pub user: bool, // bit 2

    /// 1 = a reserved bit was set in a paging structure.
    pub reserved_bit: bool, // bit 3

    #[bits(28)]
    __: u32, // reserved / ignored bits
}

impl PageFaultCode {
    /// One-line human classification for crash logs.
    #[must_use]
    pub fn explain(&self) -> &'static str {
        if !self.present() {
            "non-present page"
        } else if self.write() {
            "write access to protected page"
        } else {
            "read access to protected page"
        }
    }
}

/// One page fault, as delivered by the trap prologue: the faulting
/// linear address (from CR2) and the CPU's error code.
#[derive(Copy, Clone)]
pub struct PageFault {
    laddr: LinearAddress,
    code: PageFaultCode,
}

impl PageFault {
    #[must_use]
    pub const fn new(laddr: LinearAddress, code: PageFaultCode) -> Self {
        Self { laddr, code }
    }

    /// The faulting linear address.
    #[inline]
    #[must_use]
    pub const fn laddr(&self) -> LinearAddress {
        self.laddr
    }

    #[inline]
    #[must_use]
    pub const fn code(&self) -> PageFaultCode {
        self.code
    }

    /// The page was not present — demand-zero or demand-paging territory.
    #[inline]
    #[must_use]
    pub const fn is_not_present(&self) -> bool {
        !self.code.present()
    }

    /// The page was present but the access was disallowed — either a
    /// copy-on-write write or an illegal access.
    #[inline]
    #[must_use]
    pub const fn is_protection_violation(&self) -> bool {
        self.code.present()
    }

    #[inline]
    #[must_use]
    pub const fn is_write(&self) -> bool {
        self.code.write()
    }
}

/// What the trap prologue should do after the fault was handled.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PageFaultResponse {
    /// Retry the faulting instruction.
    Continue,
    /// Terminate the faulting process.
    ShouldCrash,
}
