use super::*;
use crate::testing::{TestFrames, TestPhys};

const APP: u64 = 0xFFFF_8000_0040_0000;

/// A kernel root with one populated kernel-half entry.
fn kernel_root(phys: &TestPhys, frames: &mut TestFrames) -> RootPage {
    let root = alloc_zeroed(phys, frames).unwrap();
    let pdpt = alloc_zeroed(phys, frames).unwrap();
    table_mut(phys, root).set(
        0,
        PageEntryBits::new()
            .with_present(true)
            .with_writable(true)
            .with_frame(pdpt),
    );
    root
}

#[test]
fn create_copies_the_kernel_half_only() {
    let phys = TestPhys::new(16);
    let mut frames = phys.allocator();
    let kroot = kernel_root(&phys, &mut frames);
    table_mut(&phys, kroot).set(300, PageEntryBits::user_table(kroot));

    let space = AddressSpace::create(&phys, &mut frames, kroot).unwrap();
    let t = table_mut(&phys, space.root_page());
    assert_eq!(t.get(0), table_mut(&phys, kroot).get(0));
    assert!(!t.get(300).present());
    assert_eq!(t.present_count(), 1);
}

#[test]
fn mapped_pages_translate_and_hold_data() {
    let phys = TestPhys::new(32);
    let mut frames = phys.allocator();
    let kroot = kernel_root(&phys, &mut frames);
    let space = AddressSpace::create(&phys, &mut frames, kroot).unwrap();

    space
        .map_region(&mut frames, VirtualAddress::new(APP + 0x123), 2, true)
        .unwrap();

    let pa = space.translate(VirtualAddress::new(APP + 0x1234)).unwrap();
    assert_eq!(pa.as_u64() & 0xFFF, 0x234);
    assert!(space.translate(VirtualAddress::new(APP + 0x2000)).is_none());

    let leaf = space.leaf_entry(VirtualAddress::new(APP)).unwrap();
    assert!(leaf.writable() && leaf.user_access());

    // Straddle the page boundary.
    let va = VirtualAddress::new(APP + 0xFFE);
    space.write_bytes(va, b"hello").unwrap();
    let mut out = [0u8; 5];
    space.read_bytes(va, &mut out).unwrap();
    assert_eq!(&out, b"hello");

    space.zero_bytes(va, 3).unwrap();
    space.read_bytes(va, &mut out).unwrap();
    assert_eq!(&out, b"\0\0\0lo");

    assert_eq!(
        space.write_bytes(VirtualAddress::new(APP + 0x1FFF), b"xy"),
        Err(VmemError::NotMapped(VirtualAddress::new(APP + 0x2000)))
    );
}

#[test]
fn mapping_is_idempotent() {
    let phys = TestPhys::new(32);
    let mut frames = phys.allocator();
    let kroot = kernel_root(&phys, &mut frames);
    let space = AddressSpace::create(&phys, &mut frames, kroot).unwrap();
    let va = VirtualAddress::new(APP);

    space.map_region(&mut frames, va, 1, false).unwrap();
    space.write_bytes(va, &[0xAA]).unwrap();
    let before = frames.usage().allocated;
    let pa = space.translate(va);

    space.map_region(&mut frames, va, 1, true).unwrap();
    assert_eq!(frames.usage().allocated, before);
    assert_eq!(space.translate(va), pa);
    assert!(!space.leaf_entry(va).unwrap().writable());
    let mut b = [0u8; 1];
    space.read_bytes(va, &mut b).unwrap();
    assert_eq!(b[0], 0xAA);
}

#[test]
fn running_out_of_frames_reports_oom() {
    let phys = TestPhys::new(32);
    let mut frames = phys.allocator();
    let kroot = kernel_root(&phys, &mut frames);
    let space = AddressSpace::create(&phys, &mut frames, kroot).unwrap();

    // Three intermediate tables and one leaf fit, the second leaf does not.
    frames.limit(4);
    assert_eq!(
        space.map_region(&mut frames, VirtualAddress::new(APP), 2, true),
        Err(VmemError::OutOfMemory)
    );
    assert!(space.translate(VirtualAddress::new(APP)).is_some());
    frames.unlimit();
}

#[test]
fn region_overflow_is_rejected() {
    let phys = TestPhys::new(32);
    let mut frames = phys.allocator();
    let kroot = kernel_root(&phys, &mut frames);
    let space = AddressSpace::create(&phys, &mut frames, kroot).unwrap();
    let top = VirtualAddress::new(0xFFFF_FFFF_FFFF_F000);

    assert!(matches!(
        space.map_region(&mut frames, top, 2, true),
        Err(VmemError::RegionOverflow { pages: 2, .. })
    ));
    // The first page was mapped before the overflow was detected.
    assert!(space.translate(top).is_some());
}

#[test]
fn copies_share_frames_until_written() {
    let phys = TestPhys::new(64);
    let mut frames = phys.allocator();
    let kroot = kernel_root(&phys, &mut frames);

    let template = AddressSpace::create(&phys, &mut frames, kroot).unwrap();
    let va = VirtualAddress::new(APP + 0x1000);
    template.map_region(&mut frames, va, 1, true).unwrap();
    template.write_bytes(va, b"template").unwrap();

    let copy = AddressSpace::create(&phys, &mut frames, kroot).unwrap();
    copy.copy_app_half_from(&mut frames, template.root_page())
        .unwrap();

    // Same frame, read-only in the copy, source untouched.
    assert_eq!(copy.translate(va), template.translate(va));
    assert!(!copy.leaf_entry(va).unwrap().writable());
    assert!(template.leaf_entry(va).unwrap().writable());

    // Intermediate tables are never shared.
    let t_l4 = table_mut(&phys, template.root_page()).get(256);
    let c_l4 = table_mut(&phys, copy.root_page()).get(256);
    assert_ne!(t_l4.frame(), c_l4.frame());

    copy.resolve_copy_on_write(&mut frames, va).unwrap();
    assert_ne!(copy.translate(va), template.translate(va));
    assert!(copy.leaf_entry(va).unwrap().writable());

    let mut buf = [0u8; 8];
    copy.read_bytes(va, &mut buf).unwrap();
    assert_eq!(&buf, b"template");

    copy.write_bytes(va, b"private!").unwrap();
    template.read_bytes(va, &mut buf).unwrap();
    assert_eq!(&buf, b"template");
}

#[test]
fn copy_on_write_rejects_private_and_unmapped_pages() {
    let phys = TestPhys::new(32);
    let mut frames = phys.allocator();
    let kroot = kernel_root(&phys, &mut frames);
    let space = AddressSpace::create(&phys, &mut frames, kroot).unwrap();
    let va = VirtualAddress::new(APP);

    assert_eq!(
        space.resolve_copy_on_write(&mut frames, va),
        Err(VmemError::NotMapped(va))
    );
    space.map_region(&mut frames, va, 1, true).unwrap();
    assert_eq!(
        space.resolve_copy_on_write(&mut frames, va),
        Err(VmemError::NotShared(va))
    );
}

#[test]
fn teardown_returns_private_frames_and_keeps_the_template() {
    let phys = TestPhys::new(64);
    let mut frames = phys.allocator();
    let kroot = kernel_root(&phys, &mut frames);

    let template = AddressSpace::create(&phys, &mut frames, kroot).unwrap();
    template
        .map_region(&mut frames, VirtualAddress::new(APP), 3, false)
        .unwrap();
    let baseline = frames.usage().allocated;
    let shared = template.leaf_entry(VirtualAddress::new(APP)).unwrap().frame();

    let space = AddressSpace::create(&phys, &mut frames, kroot).unwrap();
    space
        .copy_app_half_from(&mut frames, template.root_page())
        .unwrap();
    space
        .resolve_copy_on_write(&mut frames, VirtualAddress::new(APP))
        .unwrap();
    space
        .map_region(&mut frames, VirtualAddress::new(0xFFFF_FFFF_FFFF_0000), 4, true)
        .unwrap();
    assert!(frames.usage().allocated > baseline);

    space.free_hierarchy(&mut frames).unwrap();
    assert_eq!(frames.usage().allocated, baseline);
    assert!(frames.is_allocated(shared));
    // The kernel half's table belongs to the kernel root.
    assert!(frames.is_allocated(table_mut(&phys, kroot).get(0).frame()));
}

#[test]
fn clean_region_frees_only_from_the_start_address() {
    let phys = TestPhys::new(64);
    let mut frames = phys.allocator();
    let kroot = kernel_root(&phys, &mut frames);
    let space = AddressSpace::create(&phys, &mut frames, kroot).unwrap();

    let low = VirtualAddress::new(APP);
    let high = VirtualAddress::new(APP + 0x4000);
    let far = VirtualAddress::new(0xFFFF_FFFF_FFFF_E000);
    space.map_region(&mut frames, low, 2, true).unwrap();
    space.map_region(&mut frames, high, 2, true).unwrap();
    space.map_region(&mut frames, far, 1, true).unwrap();

    space.clean_region(&mut frames, high).unwrap();
    assert!(space.translate(low).is_some());
    assert!(space.translate(low + 0x1000).is_some());
    assert!(space.translate(high).is_none());
    assert!(space.translate(high + 0x1000).is_none());
    assert!(space.translate(far).is_none());
}

#[test]
fn clean_region_from_the_app_base_restores_usage() {
    let phys = TestPhys::new(64);
    let mut frames = phys.allocator();
    let kroot = kernel_root(&phys, &mut frames);
    let space = AddressSpace::create(&phys, &mut frames, kroot).unwrap();
    let baseline = frames.usage().allocated;

    space
        .map_region(&mut frames, VirtualAddress::new(APP), 5, true)
        .unwrap();
    space
        .map_region(&mut frames, VirtualAddress::new(0xFFFF_FFFF_FFFF_F000), 1, true)
        .unwrap();

    space
        .clean_region(&mut frames, VirtualAddress::new(crate::info::APP_REGION_START))
        .unwrap();
    assert_eq!(frames.usage().allocated, baseline);
    assert_eq!(table_mut(&phys, space.root_page()).present_count(), 1);

    // A start in the kernel half never touches kernel entries.
    space.clean_region(&mut frames, VirtualAddress::zero()).unwrap();
    assert!(table_mut(&phys, space.root_page()).get(0).present());
}

#[test]
fn unmap_frees_private_pages_and_skips_holes() {
    let phys = TestPhys::new(32);
    let mut frames = phys.allocator();
    let kroot = kernel_root(&phys, &mut frames);
    let space = AddressSpace::create(&phys, &mut frames, kroot).unwrap();
    let va = VirtualAddress::new(APP);

    space.map_region(&mut frames, va, 1, true).unwrap();
    let before = frames.usage().allocated;
    space.unmap_region(&mut frames, va, 4).unwrap();
    assert_eq!(frames.usage().allocated, before - 1);
    assert!(space.translate(va).is_none());
}

#[test]
fn remapping_after_unmap_yields_zero_pages() {
    let phys = TestPhys::new(32);
    let mut frames = phys.allocator();
    let kroot = kernel_root(&phys, &mut frames);
    let space = AddressSpace::create(&phys, &mut frames, kroot).unwrap();
    let va = VirtualAddress::new(APP);

    space.map_region(&mut frames, va, 2, true).unwrap();
    space.write_bytes(va + 0xFF0, &[0x5A; 32]).unwrap();
    space.unmap_region(&mut frames, va, 2).unwrap();
    space.map_region(&mut frames, va, 2, true).unwrap();

    let mut buf = [0xFFu8; 32];
    space.read_bytes(va + 0xFF0, &mut buf).unwrap();
    assert_eq!(buf, [0; 32]);
}

#[test]
fn copy_hierarchy_leaves_entries_outside_the_slice_untouched() {
    let phys = TestPhys::new(64);
    let mut frames = phys.allocator();
    let kroot = kernel_root(&phys, &mut frames);
    let src = AddressSpace::create(&phys, &mut frames, kroot).unwrap();
    src.map_region(&mut frames, VirtualAddress::new(APP), 1, true)
        .unwrap();
    src.map_region(&mut frames, VirtualAddress::new(0xFFFF_FF80_0000_0000), 1, true)
        .unwrap();

    let dst = AddressSpace::create(&phys, &mut frames, kroot).unwrap();
    copy_hierarchy(&phys, &mut frames, dst.root_page(), src.root_page(), 4, 256..257)
        .unwrap();

    let d = table_mut(&phys, dst.root_page());
    assert!(d.get(256).present());
    assert!(!d.get(511).present());
    assert_eq!(d.get(0), table_mut(&phys, kroot).get(0));

    // Same structure below the copied entry, except for the leaf's writable bit.
    let src_leaf = src.leaf_entry(VirtualAddress::new(APP)).unwrap();
    let dst_leaf = dst.leaf_entry(VirtualAddress::new(APP)).unwrap();
    assert_eq!(dst_leaf, src_leaf.with_writable(false));
}
