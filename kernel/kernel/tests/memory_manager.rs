//! End-to-end scenarios against a simulated 32 MiB machine.

mod common;

use common::*;
use kernel::mm::{CommitError, PageFaultResponse, RegionAccess};
use kernel::privilege::Ring;
use kernel::process::Process;
use kernel_vmem::{LinearAddress, PAGE_SIZE};
use std::sync::Arc;

#[test]
fn bootstrap_pools_match_the_memory_map() {
    let (mm, _arena) = mm_with_arena();
    // 2..4 MiB of supervisor frames.
    assert_eq!(mm.free_supervisor_pages(), (2 * 1024 * 1024 / 4096) as usize);
    // 4..32 MiB of user frames, minus the reserved quickmap frame.
    assert_eq!(mm.free_user_pages(), (28 * 1024 * 1024 / 4096) as usize - 1);
    // The quickmap slot is the pool's former tail frame.
    assert_eq!(mm.quickmap_address().as_u32(), 32 * 1024 * 1024 - 4096);
}

#[test]
fn null_dereference_crashes_the_process() {
    let (mut mm, _arena) = mm_with_arena();
    let mut process = user_process(&mut mm, "crasher", 1);
    mm.enter_process_paging_scope(&mut process);

    let response = deliver_fault(&mut mm, &process, &not_present_read(0));
    assert_eq!(response, PageFaultResponse::ShouldCrash);
}

#[test]
fn demand_zero_fills_pages_one_fault_at_a_time() {
    let (mut mm, arena) = mm_with_arena();
    let mut process = user_process(&mut mm, "demo", 2);
    let region = mm.allocate_region(
        LinearAddress::from_u32(0x1000_0000),
        8192,
        "demo-heap",
        RegionAccess::READ | RegionAccess::WRITE,
    );
    process.add_region(Arc::clone(&region));
    mm.map_region(&process, &region);
    mm.enter_process_paging_scope(&mut process);

    // Dirty the frame that will back the first fault: it goes back to
    // the pool tail and is vended again next, so the zero-fill below is
    // actually doing work.
    let recycled = mm.allocate_physical_page().unwrap();
    arena.write_byte(recycled.base(), 0xDE);
    drop(recycled);

    let free_before = mm.free_user_pages();

    // Nothing is backed until the first touch.
    assert!(mm.query(process.page_directory(), LinearAddress::from_u32(0x1000_0000)).is_none());

    let response = deliver_fault(&mut mm, &process, &not_present_read(0x1000_0000));
    assert_eq!(response, PageFaultResponse::Continue);
    assert_eq!(read_byte(&mm, &arena, process.page_directory(), 0x1000_0000), 0);
    assert_eq!(mm.free_user_pages(), free_before - 1);

    let response = deliver_fault(&mut mm, &process, &not_present_read(0x1000_1000));
    assert_eq!(response, PageFaultResponse::Continue);
    assert_eq!(read_byte(&mm, &arena, process.page_directory(), 0x1000_1000), 0);
    assert_eq!(mm.free_user_pages(), free_before - 2);

    // Every byte of a demand-zeroed page reads zero.
    for offset in [0u32, 1, 2047, 4095] {
        assert_eq!(
            read_byte(&mm, &arena, process.page_directory(), 0x1000_0000 + offset),
            0
        );
    }
    assert_eq!(region.committed(), 8192);
}

#[test]
fn pde_zero_is_shared_between_address_spaces() {
    let (mut mm, arena) = mm_with_arena();
    let mut a = user_process(&mut mm, "a", 3);
    let mut b = user_process(&mut mm, "b", 4);

    mm.enter_process_paging_scope(&mut a);
    // A supervisor write into the identity-mapped range...
    write_byte(&mm, &arena, a.page_directory(), 0x0020_0000, 0x42);

    mm.enter_process_paging_scope(&mut b);
    // ...is visible through the other address space: both PDE 0 entries
    // point at the same page table zero.
    assert_eq!(read_byte(&mm, &arena, b.page_directory(), 0x0020_0000), 0x42);
    assert_eq!(
        mm.query(a.page_directory(), LinearAddress::from_u32(0x0020_0000)),
        mm.query(b.page_directory(), LinearAddress::from_u32(0x0020_0000)),
    );
}

#[test]
fn address_space_switch_saves_cr3() {
    let (mut mm, _arena) = mm_with_arena();
    let mut process = user_process(&mut mm, "switch", 5);
    assert_eq!(process.saved_cr3().as_u32(), 0);
    mm.enter_process_paging_scope(&mut process);
    assert_eq!(process.saved_cr3(), process.page_directory().cr3());
}

#[test]
fn validation_honors_ring_and_writability() {
    let (mut mm, _arena) = mm_with_arena();
    let mut process = user_process(&mut mm, "valid", 6);
    let region = mm.allocate_region(
        LinearAddress::from_u32(0x1200_0000),
        4096,
        "ro-data",
        RegionAccess::READ,
    );
    process.add_region(Arc::clone(&region));
    mm.map_region(&process, &region);
    mm.enter_process_paging_scope(&mut process);

    let laddr = LinearAddress::from_u32(0x1200_0000);

    // Not yet present: nothing validates.
    assert!(!mm.validate_user_read(&process, laddr));
    assert!(!mm.validate_user_write(&process, laddr));

    assert_eq!(
        deliver_fault(&mut mm, &process, &not_present_read(0x1200_0000)),
        PageFaultResponse::Continue
    );
    assert!(mm.validate_user_read(&process, laddr));
    // The region is read-only, so writes must not validate.
    assert!(!mm.validate_user_write(&process, laddr));

    // The identity-mapped window is supervisor-only: invisible to ring 3,
    // readable from ring 0.
    let kernel_range = LinearAddress::from_u32(0x0020_0000);
    assert!(!mm.validate_user_read(&process, kernel_range));
    let supervisor = Process::new(
        "kworker",
        0,
        Ring::Ring0,
        Arc::clone(process.page_directory()),
    );
    assert!(mm.validate_user_read(&supervisor, kernel_range));
    assert!(mm.validate_user_write(&supervisor, kernel_range));
}

#[test]
fn unmap_clears_every_pte_in_the_span() {
    let (mut mm, _arena) = mm_with_arena();
    let mut process = user_process(&mut mm, "unmap", 7);
    let region = mm.allocate_region(
        LinearAddress::from_u32(0x1300_0000),
        16384,
        "scratch",
        RegionAccess::READ | RegionAccess::WRITE,
    );
    process.add_region(Arc::clone(&region));
    mm.map_region(&process, &region);
    mm.enter_process_paging_scope(&mut process);
    mm.commit_region(&region).unwrap();

    for i in 0..4u32 {
        assert!(
            mm.query(
                process.page_directory(),
                LinearAddress::from_u32(0x1300_0000 + i * PAGE_SIZE)
            )
            .is_some()
        );
    }

    mm.unmap_region(&region);
    assert!(region.directory().is_none());
    for i in 0..4u32 {
        let laddr = LinearAddress::from_u32(0x1300_0000 + i * PAGE_SIZE);
        assert!(mm.query(process.page_directory(), laddr).is_none());
        assert!(!mm.validate_user_write(&process, laddr));
    }
}

#[test]
fn commit_backs_the_whole_region_up_front() {
    let (mut mm, _arena) = mm_with_arena();
    let mut process = user_process(&mut mm, "commit", 8);
    let region = mm.allocate_region(
        LinearAddress::from_u32(0x1400_0000),
        4 * PAGE_SIZE,
        "stack",
        RegionAccess::READ | RegionAccess::WRITE,
    );
    process.add_region(Arc::clone(&region));
    mm.map_region(&process, &region);
    mm.enter_process_paging_scope(&mut process);

    let free_before = mm.free_user_pages();
    mm.commit_region(&region).unwrap();
    assert_eq!(mm.free_user_pages(), free_before - 4);
    assert_eq!(region.committed(), 4 * PAGE_SIZE);

    // Committing again is a no-op.
    mm.commit_region(&region).unwrap();
    assert_eq!(mm.free_user_pages(), free_before - 4);
}

#[test]
fn commit_reports_exhaustion_and_keeps_partial_progress() {
    let (mut mm, _arena) = mm_with_arena();
    let mut process = user_process(&mut mm, "oom", 9);
    let region = mm.allocate_region(
        LinearAddress::from_u32(0x1500_0000),
        4 * PAGE_SIZE,
        "big",
        RegionAccess::READ | RegionAccess::WRITE,
    );
    process.add_region(Arc::clone(&region));
    mm.map_region(&process, &region);
    mm.enter_process_paging_scope(&mut process);

    // Drain the user pool down to two frames.
    let mut hoard = Vec::new();
    while mm.free_user_pages() > 2 {
        hoard.push(mm.allocate_physical_page().unwrap());
    }

    assert_eq!(mm.commit_region(&region), Err(CommitError::OutOfMemory));
    // The two frames that fit stayed committed.
    assert_eq!(region.committed(), 2 * PAGE_SIZE);
    assert_eq!(mm.free_user_pages(), 0);

    drop(hoard);
    assert!(mm.commit_region(&region).is_ok());
    assert_eq!(region.committed(), 4 * PAGE_SIZE);
}

#[test]
fn registries_track_live_objects() {
    let (mut mm, _arena) = mm_with_arena();
    assert_eq!(mm.region_count(), 0);
    assert_eq!(mm.vmo_count(), 0);

    let region = mm.allocate_region(
        LinearAddress::from_u32(0x1600_0000),
        4096,
        "tracked",
        RegionAccess::READ,
    );
    assert_eq!(mm.region_count(), 1);
    assert_eq!(mm.vmo_count(), 1);

    mm.release_region(region);
    assert_eq!(mm.region_count(), 0);
    assert_eq!(mm.vmo_count(), 0);
}

#[test]
fn framebuffer_frames_never_enter_a_pool() {
    let (mut mm, _arena) = mm_with_arena();
    let free_before = mm.free_user_pages();

    let vmo = mm.create_framebuffer_vmo(kernel_vmem::PhysicalAddress::from_u32(0x01E0_0000), 16384);
    assert_eq!(vmo.page_count(), 4);

    let mut process = user_process(&mut mm, "fb", 10);
    let region = mm.allocate_region_with_vmo(
        LinearAddress::from_u32(0xE000_0000),
        16384,
        Arc::clone(&vmo),
        0,
        "framebuffer",
        RegionAccess::READ | RegionAccess::WRITE,
        false,
    );
    process.add_region(Arc::clone(&region));
    mm.map_region(&process, &region);
    mm.enter_process_paging_scope(&mut process);

    // Wrapped frames map straight through to the physical window.
    assert_eq!(
        mm.query(process.page_directory(), LinearAddress::from_u32(0xE000_1000)),
        Some(kernel_vmem::PhysicalAddress::from_u32(0x01E0_1000))
    );

    mm.release_region(region);
    drop(vmo);
    // Dropping the wrapper must not leak eternal frames into the pool.
    assert_eq!(mm.free_user_pages(), free_before);
}
