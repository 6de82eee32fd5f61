//! The fixed physical memory map.
//!
//! Bit-exact and small; the bootstrap reproduces it without consulting
//! any firmware map:
//!
//! ```text
//! 0x00000000 – 0x00001000   protected (null-dereference trap)
//! 0x00001000 – 0x00400000   identity-mapped, supervisor-only
//! 0x00100000 – 0x00200000   eternal kernel heap
//! 0x00200000 – 0x00300000   kernel heap
//! 0x00200000 – 0x00400000   supervisor frame pool
//! 0x00400000 – 0x02000000   user frame pool (one frame reserved
//!                           off the tail as the quickmap slot)
//! ```
//!
//! The supervisor pool deliberately overlaps the heap ranges: it is
//! seeded over the whole 2–4 MiB span and vended from the top down, so
//! the heap arenas at the front are the last frames it would ever hand
//! out.

use kernel_vmem::{LinearAddress, PAGE_SIZE, PhysicalAddress};

/// One mebibyte, for the constants below.
pub const MB: u32 = 1024 * 1024;

/// The protected null page: present=0 so that null dereferences fault.
pub const PROTECTED_NULL_BASE: LinearAddress = LinearAddress::from_u32(0);

/// First identity-mapped byte (the null page is skipped).
pub const IDENTITY_BASE: LinearAddress = LinearAddress::from_u32(PAGE_SIZE);

/// End of the identity-mapped, supervisor-only window. PDE 0 covers
/// exactly this span, and every address space shares that PDE.
pub const IDENTITY_END: u32 = 4 * MB;

/// `kmalloc_eternal` arena (never freed).
pub const KERNEL_HEAP_ETERNAL_BASE: u32 = MB;

/// Regular kernel heap arena.
pub const KERNEL_HEAP_BASE: u32 = 2 * MB;

/// Frames minted into the supervisor pool: `[2 MiB, 4 MiB)`.
pub const SUPERVISOR_POOL_BASE: u32 = 2 * MB;
pub const SUPERVISOR_POOL_END: u32 = 4 * MB;

/// Frames minted into the user pool: `[4 MiB, 32 MiB)`.
pub const USER_POOL_BASE: u32 = 4 * MB;
pub const USER_POOL_END: u32 = 32 * MB;

/// Physical base of the kernel page directory (fixed at boot).
pub const KERNEL_DIRECTORY_BASE: PhysicalAddress = PhysicalAddress::from_u32(0x4000);

/// Physical base of "page table zero", the kernel-owned table behind
/// PDE 0 that every address space shares.
pub const PAGE_TABLE_ZERO_BASE: PhysicalAddress = PhysicalAddress::from_u32(0x6000);
