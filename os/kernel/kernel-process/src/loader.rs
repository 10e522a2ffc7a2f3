//! Building an application's address space from its ELF image.

use crate::LoadError;
use crate::cache::AppLoadInfo;
use crate::elf::{ElfErr, ElfView, elf64_view};
use crate::fs::{DirectoryEntry, FileSystem};
use crate::process::{ProcessCtx, RootSwitch};
use alloc::vec;
use kernel_memory_addresses::{VirtualAddress, pages_for};
use kernel_vmem::{AddressSpace, FrameAlloc, PhysMapper, RootPage};
use log::{debug, info, trace};

/// Load `file` into a fresh address space and make it the task's root.
///
/// The first load of a file builds the segments into a template that is
/// kept in the app-load cache; every load, the first included, returns a
/// separate root that maps the template's frames read-only.
///
/// # Errors
/// - [`LoadError::InvalidFile`] if the file is not an ELF image.
/// - [`LoadError::InvalidFormat`] for anything but a well-formed x86-64
///   `ET_EXEC` image whose segments lie in the application half.
/// - [`LoadError::OutOfMemory`] if frames run out.
///
/// On error the task may be left running in a partially built root, which
/// the caller releases. Cached templates are never left installed.
pub fn load_app<M, A, C, F>(
    ctx: &mut ProcessCtx<'_, M, A, C>,
    fs: &F,
    file: &DirectoryEntry,
) -> Result<AppLoadInfo, LoadError>
where
    M: PhysMapper,
    A: FrameAlloc,
    C: RootSwitch,
    F: FileSystem + ?Sized,
{
    let root = setup_root(ctx)?;

    if let Some(cached) = ctx.cache.get(file.key()) {
        debug!("app cache hit, template {:?}", cached.root_table.base());
        AddressSpace::from_root(ctx.mapper, root)
            .copy_app_half_from(ctx.frames, cached.root_table)?;
        return Ok(cached.with_root(root));
    }

    let mut image = vec![0u8; file.file_size as usize];
    let read = fs.load_file(&mut image, file);
    image.truncate(read);

    let view = elf64_view(&image)?;
    let first = view.first_load_address();
    if !first.is_higher_half() {
        return Err(ElfErr::OutsideAppRegion(first).into());
    }

    let space = AddressSpace::from_root(ctx.mapper, root);
    let vaddr_end = load_segments(&space, ctx.frames, &view)?;
    let template = ctx.cache.insert(
        file.key(),
        AppLoadInfo {
            vaddr_end,
            entry_point: view.entry(),
            root_table: root,
        },
    );
    info!(
        "loaded {} bytes, entry {} end {vaddr_end}",
        image.len(),
        view.entry()
    );

    // The template now belongs to the cache.
    let kernel_root = ctx.kernel_root;
    ctx.install_root(kernel_root);

    let copy = setup_root(ctx)?;
    AddressSpace::from_root(ctx.mapper, copy).copy_app_half_from(ctx.frames, root)?;
    Ok(template.with_root(copy))
}

/// Create an empty address space sharing the kernel half and install it.
fn setup_root<M, A, C>(ctx: &mut ProcessCtx<'_, M, A, C>) -> Result<RootPage, LoadError>
where
    M: PhysMapper,
    A: FrameAlloc,
    C: RootSwitch,
{
    let space = AddressSpace::create(ctx.mapper, ctx.frames, ctx.kernel_root)?;
    let root = space.root_page();
    ctx.install_root(root);
    Ok(root)
}

/// Map and fill every `PT_LOAD` segment; returns the highest end address.
///
/// The template owns its frames, so they are mapped writable and a failed
/// load releases them with the rest of the root. Roots copied from the
/// template see them read-only.
fn load_segments<M: PhysMapper, A: FrameAlloc>(
    space: &AddressSpace<'_, M>,
    frames: &mut A,
    view: &ElfView<'_>,
) -> Result<VirtualAddress, LoadError> {
    let mut last = VirtualAddress::zero();
    for ph in view.iter_pt_load() {
        if !ph.p_vaddr.is_higher_half() {
            return Err(ElfErr::OutsideAppRegion(ph.p_vaddr).into());
        }
        let file_bytes = view.segment_file_bytes(&ph)?;
        if ph.p_memsz == 0 {
            continue;
        }
        let end = ph.vaddr_end()?;
        let pages = pages_for(ph.p_vaddr.page_offset() + ph.p_memsz);
        trace!(
            "PT_LOAD {} +{:#x} ({pages} pages, {})",
            ph.p_vaddr,
            ph.p_memsz,
            ph.p_flags
        );

        space.map_region(frames, ph.p_vaddr, pages, true)?;
        space.write_bytes(ph.p_vaddr, file_bytes)?;
        // A page shared with the previous segment is not fresh.
        let bss = usize::try_from(ph.p_memsz - ph.p_filesz).map_err(|_| ElfErr::BadPh)?;
        space.zero_bytes(ph.p_vaddr + ph.p_filesz, bss)?;

        last = last.max(end);
    }
    Ok(last)
}
