//! Shared harness for the memory-manager scenario tests.
//!
//! Physical memory is a 32 MiB arena of 4 KiB-aligned frames; the
//! [`ArenaMapper`] implements [`PhysMapper`] over it, standing in for
//! the identity map of the running kernel. Faults are injected by
//! calling the handler directly with a hand-built [`PageFault`], and
//! byte-level reads/writes emulate what the MMU would do by translating
//! through the page tables first.

#![allow(dead_code)]

use kernel::fs::{InodeReadError, InodeVmoCell, PagedInode};
use kernel::mm::{MemoryManager, PageDirectory, PageFault, PageFaultCode, PageFaultResponse};
use kernel::privilege::Ring;
use kernel::process::Process;
use kernel_sync::IrqGuard;
use kernel_vmem::{LinearAddress, PhysMapper, PhysicalAddress};
use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 32 MiB of simulated RAM — the whole fixed memory map.
pub const ARENA_FRAMES: usize = 8192;

/// A 4 KiB-aligned frame of simulated physical memory.
#[repr(align(4096))]
struct Aligned4K(UnsafeCell<[u8; 4096]>);

struct ArenaBuf {
    frames: Vec<Aligned4K>,
}

// Safety: tests serialize access per memory manager; the cell only
// exists so the mapper can hand out pointers from a shared reference.
unsafe impl Send for ArenaBuf {}
unsafe impl Sync for ArenaBuf {}

/// [`PhysMapper`] over the arena. Cheap to clone; clones share the
/// frames, mirroring how kernel and tests both see one physical memory.
#[derive(Clone)]
pub struct ArenaMapper {
    buf: Arc<ArenaBuf>,
}

impl ArenaMapper {
    pub fn new() -> Self {
        let frames = (0..ARENA_FRAMES)
            .map(|_| Aligned4K(UnsafeCell::new([0; 4096])))
            .collect();
        Self {
            buf: Arc::new(ArenaBuf { frames }),
        }
    }

    fn frame_ptr(&self, index: usize) -> *mut u8 {
        assert!(index < ARENA_FRAMES, "physical address outside the arena");
        self.buf.frames[index].0.get().cast::<u8>()
    }

    fn byte_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let index = (pa.as_u32() >> 12) as usize;
        let offset = (pa.as_u32() & 0xFFF) as usize;
        unsafe { self.frame_ptr(index).add(offset) }
    }

    pub fn read_byte(&self, pa: PhysicalAddress) -> u8 {
        unsafe { *self.byte_ptr(pa) }
    }

    pub fn write_byte(&self, pa: PhysicalAddress, value: u8) {
        unsafe { *self.byte_ptr(pa) = value };
    }
}

impl PhysMapper for ArenaMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let offset = (pa.as_u32() & 0xFFF) as usize;
        assert!(
            offset + size_of::<T>() <= 4096,
            "access crosses a frame boundary"
        );
        unsafe { &mut *self.byte_ptr(pa).cast::<T>() }
    }
}

/// A fresh memory manager over a fresh arena, plus a handle to the
/// arena for byte-level inspection.
pub fn mm_with_arena() -> (MemoryManager<ArenaMapper>, ArenaMapper) {
    let arena = ArenaMapper::new();
    let mm = MemoryManager::new(arena.clone());
    (mm, arena)
}

/// A ring-3 process with a fresh user address space.
pub fn user_process(mm: &mut MemoryManager<ArenaMapper>, name: &str, pid: u32) -> Process {
    let directory = mm.create_user_directory();
    Process::new(name, pid, Ring::Ring3, directory)
}

/// Read one byte the way a load instruction would: translate through
/// the process's page tables, then touch physical memory.
pub fn read_byte(
    mm: &MemoryManager<ArenaMapper>,
    arena: &ArenaMapper,
    directory: &PageDirectory,
    laddr: u32,
) -> u8 {
    let pa = mm
        .query(directory, LinearAddress::from_u32(laddr))
        .expect("read through unmapped address");
    arena.read_byte(pa)
}

/// Write one byte the way a store instruction would.
pub fn write_byte(
    mm: &MemoryManager<ArenaMapper>,
    arena: &ArenaMapper,
    directory: &PageDirectory,
    laddr: u32,
    value: u8,
) {
    let pa = mm
        .query(directory, LinearAddress::from_u32(laddr))
        .expect("write through unmapped address");
    arena.write_byte(pa, value);
}

/// Deliver a fault the way the trap prologue does: the interrupt gate
/// enters the handler with interrupts disabled.
pub fn deliver_fault(
    mm: &mut MemoryManager<ArenaMapper>,
    process: &Process,
    fault: &PageFault,
) -> PageFaultResponse {
    let _irq = IrqGuard::new();
    mm.handle_page_fault(process, fault)
}

/// The fault a read of a non-present page raises.
pub fn not_present_read(laddr: u32) -> PageFault {
    PageFault::new(
        LinearAddress::from_u32(laddr),
        PageFaultCode::new().with_present(false).with_user(true),
    )
}

/// The fault a write to a non-present page raises.
pub fn not_present_write(laddr: u32) -> PageFault {
    PageFault::new(
        LinearAddress::from_u32(laddr),
        PageFaultCode::new()
            .with_present(false)
            .with_write(true)
            .with_user(true),
    )
}

/// The fault a write to a present read-only page raises.
pub fn protection_write(laddr: u32) -> PageFault {
    PageFault::new(
        LinearAddress::from_u32(laddr),
        PageFaultCode::new()
            .with_present(true)
            .with_write(true)
            .with_user(true),
    )
}

/// An in-memory inode for demand-paging tests.
pub struct MockInode {
    data: Vec<u8>,
    cell: InodeVmoCell,
    fail_reads: AtomicBool,
}

impl MockInode {
    pub fn new(data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            data,
            cell: InodeVmoCell::new(),
            fail_reads: AtomicBool::new(false),
        })
    }

    /// Byte pattern `i * 7 + 3 mod 251` of length `len` — distinctive
    /// and cheap to recompute in assertions.
    pub fn with_pattern(len: usize) -> Arc<Self> {
        Self::new((0..len).map(pattern_byte).collect())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

pub fn pattern_byte(i: usize) -> u8 {
    ((i * 7 + 3) % 251) as u8
}

impl PagedInode for MockInode {
    fn read_bytes(&self, offset: u32, dest: &mut [u8]) -> Result<usize, InodeReadError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(InodeReadError::Io);
        }
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Ok(0);
        }
        let n = dest.len().min(self.data.len() - offset);
        dest[..n].copy_from_slice(&self.data[offset..offset + n]);
        Ok(n)
    }

    fn vmo_cell(&self) -> &InodeVmoCell {
        &self.cell
    }
}
