use crate::addresses::PhysicalAddress;
use bitfield_struct::bitfield;

/// A single 32-bit x86 paging entry in its raw bitfield form.
///
/// This models the common superset of the two non-PAE levels (PDE, PTE).
/// Each bit corresponds to a hardware-defined flag or address field per
/// the Intel manuals (SDM Vol. 3A, §4.3 "32-Bit Paging").
///
/// ### Bit layout
///
/// | Bits  | Name / Mnemonic | Meaning |
/// |-------|-----------------|---------|
/// | 0     | `P` (present)   | Valid entry if set |
/// | 1     | `RW`            | Writable if set |
/// | 2     | `US`            | User-mode accessible if set |
/// | 3     | `PWT`           | Write-through caching |
/// | 4     | `PCD`           | Disable caching |
/// | 5     | `A`             | Accessed |
/// | 6     | `D`             | Dirty (PTE only) |
/// | 7     | `PS`/`PAT`      | 4 MiB page in a PDE; PAT in a PTE. Always 0 here |
/// | 8     | `G`             | Global (PTE only) |
/// | 9–11  | OS avail        | Reserved for OS use |
/// | 12–31 | `addr`          | Physical base bits [31:12] |
///
/// ### Notes
/// - 4 MiB pages are never used, so bit 7 stays clear at both levels.
/// - The physical base field omits the low 12 bits, implicitly zero due
///   to alignment.
///
/// ### Example
/// ```rust
/// # use kernel_vmem::{PageEntryBits, PhysicalAddress};
/// let mut e = PageEntryBits::new();
/// e.set_present(true);
/// e.set_writable(true);
/// e.set_page_base(PhysicalAddress::from_u32(0x0030_2000));
/// assert!(e.present());
/// assert_eq!(e.page_base().as_u32(), 0x0030_2000);
/// ```
#[bitfield(u32)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    ///
    /// Set if the entry points to a valid page table or maps a valid
    /// page. Clear entries fault on access, which is what demand paging
    /// relies on.
    pub present: bool,

    /// Writable (RW, bit 1).
    ///
    /// Set to allow writes. Clear for read-only; user-mode writes then
    /// fault, which is what copy-on-write relies on. Supervisor writes
    /// ignore this unless CR0.WP is set.
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    ///
    /// Set to allow user-mode (ring 3) access; clear restricts the
    /// mapping to supervisor code.
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU on first access.
    pub accessed: bool,

    /// Dirty (D, bit 6) — PTE only. Set by the CPU on first write.
    pub dirty: bool,

    /// Page Size / PAT (bit 7).
    ///
    /// In a PDE this selects a 4 MiB page; in a PTE it is the PAT bit.
    /// This kernel uses neither, so the bit must stay clear.
    pub large_page: bool,

    /// Global (G, bit 8) — PTE only; needs CR4.PGE to matter.
    pub global_translation: bool,

    /// OS-available (bits 9..=11). Ignored by hardware.
    #[bits(3)]
    pub os_available: u8,

    /// Physical base bits [31:12] (bits 12..=31).
    ///
    /// Stores the page-aligned physical base without its low 12 bits.
    #[bits(20)]
    page_base_bits_31_12: u32,
}

impl PageEntryBits {
    /// Store a 4 KiB-aligned physical base address.
    #[inline]
    pub const fn set_page_base(&mut self, phys: PhysicalAddress) {
        self.set_page_base_bits_31_12(phys.as_u32() >> 12);
    }

    /// The physical base address stored in this entry.
    #[inline]
    #[must_use]
    pub const fn page_base(&self) -> PhysicalAddress {
        PhysicalAddress::from_u32(self.page_base_bits_31_12() << 12)
    }

    /// Present, writable, supervisor-only. The flags of the identity map
    /// and of freshly installed kernel page tables.
    #[inline]
    #[must_use]
    pub const fn new_supervisor_rw() -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(false)
    }

    /// Present, writable, user-accessible. The flags of user page
    /// tables hanging off a process directory.
    #[inline]
    #[must_use]
    pub const fn new_user_rw() -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(true)
    }
}
