//! Copy-on-write cloning: isolation, refcount collapse, and windows
//! with a nonzero VMO offset.

mod common;

use common::*;
use kernel::mm::{PageFaultResponse, RegionAccess};
use kernel_vmem::{LinearAddress, PAGE_SIZE};
use std::sync::Arc;

#[test]
fn cow_isolates_parent_and_child_after_fork() {
    let (mut mm, arena) = mm_with_arena();
    let mut parent = user_process(&mut mm, "parent", 1);
    let region = mm.allocate_region(
        LinearAddress::from_u32(0x2000_0000),
        4096,
        "data",
        RegionAccess::READ | RegionAccess::WRITE,
    );
    parent.add_region(Arc::clone(&region));
    mm.map_region(&parent, &region);
    mm.enter_process_paging_scope(&mut parent);

    // Parent touches the page and writes 0xAA.
    assert_eq!(
        deliver_fault(&mut mm, &parent, &not_present_write(0x2000_0000)),
        PageFaultResponse::Continue
    );
    write_byte(&mm, &arena, parent.page_directory(), 0x2000_0000, 0xAA);

    // Fork: the clone shares the frame, both sides read-only.
    let clone = mm.clone_region(&region);
    let mut child = user_process(&mut mm, "child", 2);
    child.add_region(Arc::clone(&clone));
    mm.map_region(&child, &clone);

    assert_eq!(read_byte(&mm, &arena, child.page_directory(), 0x2000_0000), 0xAA);
    // One frame underlies both mappings.
    assert_eq!(
        mm.query(parent.page_directory(), LinearAddress::from_u32(0x2000_0000)),
        mm.query(child.page_directory(), LinearAddress::from_u32(0x2000_0000)),
    );
    // Neither side may write without faulting.
    assert!(!mm.validate_user_write(&parent, LinearAddress::from_u32(0x2000_0000)));
    assert!(!mm.validate_user_write(&child, LinearAddress::from_u32(0x2000_0000)));

    // Parent writes 0xBB: the write fault splits the page.
    assert_eq!(
        deliver_fault(&mut mm, &parent, &protection_write(0x2000_0000)),
        PageFaultResponse::Continue
    );
    write_byte(&mm, &arena, parent.page_directory(), 0x2000_0000, 0xBB);

    // Child still sees 0xAA; parent sees 0xBB; two distinct frames now.
    assert_eq!(read_byte(&mm, &arena, child.page_directory(), 0x2000_0000), 0xAA);
    assert_eq!(read_byte(&mm, &arena, parent.page_directory(), 0x2000_0000), 0xBB);
    assert_ne!(
        mm.query(parent.page_directory(), LinearAddress::from_u32(0x2000_0000)),
        mm.query(child.page_directory(), LinearAddress::from_u32(0x2000_0000)),
    );
}

#[test]
fn cow_write_by_child_leaves_parent_untouched() {
    let (mut mm, arena) = mm_with_arena();
    let mut parent = user_process(&mut mm, "parent", 3);
    let region = mm.allocate_region(
        LinearAddress::from_u32(0x2100_0000),
        4096,
        "data",
        RegionAccess::READ | RegionAccess::WRITE,
    );
    parent.add_region(Arc::clone(&region));
    mm.map_region(&parent, &region);
    mm.enter_process_paging_scope(&mut parent);

    assert_eq!(
        deliver_fault(&mut mm, &parent, &not_present_write(0x2100_0000)),
        PageFaultResponse::Continue
    );
    write_byte(&mm, &arena, parent.page_directory(), 0x2100_0000, 0x5A);

    let clone = mm.clone_region(&region);
    let mut child = user_process(&mut mm, "child", 4);
    child.add_region(Arc::clone(&clone));
    mm.map_region(&child, &clone);
    mm.enter_process_paging_scope(&mut child);

    assert_eq!(
        deliver_fault(&mut mm, &child, &protection_write(0x2100_0000)),
        PageFaultResponse::Continue
    );
    write_byte(&mm, &arena, child.page_directory(), 0x2100_0000, 0xC3);

    assert_eq!(read_byte(&mm, &arena, child.page_directory(), 0x2100_0000), 0xC3);
    assert_eq!(read_byte(&mm, &arena, parent.page_directory(), 0x2100_0000), 0x5A);
}

#[test]
fn cow_collapses_in_place_when_the_clone_died_first() {
    let (mut mm, arena) = mm_with_arena();
    let mut parent = user_process(&mut mm, "parent", 5);
    let region = mm.allocate_region(
        LinearAddress::from_u32(0x2200_0000),
        4096,
        "data",
        RegionAccess::READ | RegionAccess::WRITE,
    );
    parent.add_region(Arc::clone(&region));
    mm.map_region(&parent, &region);
    mm.enter_process_paging_scope(&mut parent);

    assert_eq!(
        deliver_fault(&mut mm, &parent, &not_present_write(0x2200_0000)),
        PageFaultResponse::Continue
    );
    write_byte(&mm, &arena, parent.page_directory(), 0x2200_0000, 0x11);
    let frame_before = mm.query(parent.page_directory(), LinearAddress::from_u32(0x2200_0000));

    // Clone, then destroy the clone before anyone writes.
    let clone = mm.clone_region(&region);
    mm.release_region(clone);

    // The parent's next write must not allocate: the frame is private
    // again and just flips back to read-write.
    let free_before = mm.free_user_pages();
    assert_eq!(
        deliver_fault(&mut mm, &parent, &protection_write(0x2200_0000)),
        PageFaultResponse::Continue
    );
    assert_eq!(mm.free_user_pages(), free_before);
    assert_eq!(
        mm.query(parent.page_directory(), LinearAddress::from_u32(0x2200_0000)),
        frame_before
    );
    assert!(mm.validate_user_write(&parent, LinearAddress::from_u32(0x2200_0000)));
    write_byte(&mm, &arena, parent.page_directory(), 0x2200_0000, 0x22);
    assert_eq!(read_byte(&mm, &arena, parent.page_directory(), 0x2200_0000), 0x22);
}

#[test]
fn clone_of_shared_region_references_the_same_vmo() {
    let (mut mm, _arena) = mm_with_arena();
    let mut process = user_process(&mut mm, "sharer", 6);
    let region = mm.allocate_region(
        LinearAddress::from_u32(0x2300_0000),
        8192,
        "shm",
        RegionAccess::READ | RegionAccess::WRITE | RegionAccess::SHARED,
    );
    process.add_region(Arc::clone(&region));
    mm.map_region(&process, &region);
    mm.enter_process_paging_scope(&mut process);

    let clone = mm.clone_region(&region);
    assert!(Arc::ptr_eq(region.vmo(), clone.vmo()));
    // No COW split happened: the parent stays writable.
    assert!(!region.is_cow(0));
    assert!(!clone.is_cow(0));
}

#[test]
fn cow_window_with_nonzero_vmo_offset_uses_region_relative_bits() {
    let (mut mm, arena) = mm_with_arena();
    let mut parent = user_process(&mut mm, "parent", 7);

    // A 4-page VMO, windowed by a 2-page region starting at VMO page 2.
    let vmo = mm.create_anonymous_vmo(4 * PAGE_SIZE);
    let region = mm.allocate_region_with_vmo(
        LinearAddress::from_u32(0x2400_0000),
        2 * PAGE_SIZE,
        Arc::clone(&vmo),
        2 * PAGE_SIZE,
        "window",
        RegionAccess::READ | RegionAccess::WRITE,
        false,
    );
    assert_eq!(region.first_page_index(), 2);
    assert_eq!(region.last_page_index(), 3);

    parent.add_region(Arc::clone(&region));
    mm.map_region(&parent, &region);
    mm.enter_process_paging_scope(&mut parent);

    // Touch region page 0 (VMO slot 2) and mark it.
    assert_eq!(
        deliver_fault(&mut mm, &parent, &not_present_write(0x2400_0000)),
        PageFaultResponse::Continue
    );
    write_byte(&mm, &arena, parent.page_directory(), 0x2400_0000, 0x77);
    assert_eq!(region.committed(), PAGE_SIZE);

    let clone = mm.clone_region(&region);
    let mut child = user_process(&mut mm, "child", 8);
    child.add_region(Arc::clone(&clone));
    mm.map_region(&child, &clone);

    // The write fault lands on region page 0, which must resolve to VMO
    // slot 2 on both sides.
    assert_eq!(
        deliver_fault(&mut mm, &parent, &protection_write(0x2400_0000)),
        PageFaultResponse::Continue
    );
    write_byte(&mm, &arena, parent.page_directory(), 0x2400_0000, 0x99);

    assert_eq!(read_byte(&mm, &arena, child.page_directory(), 0x2400_0000), 0x77);
    assert_eq!(read_byte(&mm, &arena, parent.page_directory(), 0x2400_0000), 0x99);

    // Untouched region page 1 (VMO slot 3) still demand-zeroes cleanly.
    assert_eq!(
        deliver_fault(&mut mm, &parent, &not_present_read(0x2400_1000)),
        PageFaultResponse::Continue
    );
    assert_eq!(read_byte(&mm, &arena, parent.page_directory(), 0x2400_1000), 0);
}
