//! Running an application to completion in the current task.
//!
//! A launch has three phases. The first and last run inside one critical
//! section each (see [`LaunchHost::with_process`]); the application itself
//! runs with interrupts enabled and the kernel state unlocked.
//!
//! 1. Load the image, map the argument page and the stack, install the
//!    standard streams and set up the demand-paging and file-map windows.
//! 2. Enter user mode and wait for the application to return.
//! 3. Drop descriptors and mappings, release the application half and the
//!    root, and switch back to the kernel root.

use crate::args::ArgPage;
use crate::fs::{DirectoryEntry, FileSystem};
use crate::loader::load_app;
use crate::process::{ProcessCtx, RootSwitch};
use crate::ExecError;
use alloc::boxed::Box;
use core::fmt;
use kernel_info::memory::{APP_REGION_START, ARGS_FRAME, PAGE_SIZE, USER_STACK_PAGES};
use kernel_info::task::{USER_CS, USER_RPL, USER_SS};
use kernel_memory_addresses::{VirtualAddress, align_up};
use kernel_task::FileDescriptor;
use kernel_vmem::{FrameAlloc, PhysMapper, VmemError};
use log::{info, warn};

/// Where an application's argument page and stack go.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LaunchConfig {
    /// Page holding `argv`; the stack ends right below it.
    pub args_frame: VirtualAddress,
    pub stack_pages: u64,
    /// Number of standard streams installed before entry.
    pub std_streams: usize,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            args_frame: VirtualAddress::new(ARGS_FRAME),
            stack_pages: USER_STACK_PAGES,
            std_streams: 3,
        }
    }
}

impl LaunchConfig {
    /// Lowest address of the user stack.
    #[must_use]
    pub fn stack_bottom(&self) -> VirtualAddress {
        self.args_frame - self.stack_pages * PAGE_SIZE
    }
}

/// Register state for entering an application.
///
/// The layout is fixed so the entry code can read fields by offset.
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AppCall {
    pub argc: usize,
    pub argv: VirtualAddress,
    pub cs: u16,
    pub ss: u16,
    pub entry: VirtualAddress,
    /// Initial user stack pointer, 8 bytes below a 16-byte boundary.
    pub rsp: VirtualAddress,
    /// Where the kernel stack pointer is saved while the application runs.
    pub os_stack_pointer: *mut u64,
}

/// The kernel side of a launch.
pub trait LaunchHost {
    type Mapper: PhysMapper;
    type Frames: FrameAlloc;
    type Cpu: RootSwitch;

    /// Run `f` on the running task with the kernel state locked and
    /// interrupts masked.
    fn with_process<R>(
        &mut self,
        f: impl FnOnce(&mut ProcessCtx<'_, Self::Mapper, Self::Frames, Self::Cpu>) -> R,
    ) -> R;

    /// Enter user mode as described by `call` and return the application's
    /// exit code once it exits.
    ///
    /// # Safety
    /// The active root must map `call.entry`, `call.argv` and the stack
    /// below `call.rsp`, and `call.os_stack_pointer` must stay valid until
    /// the application returns.
    unsafe fn call_app(&mut self, call: &AppCall) -> i32;
}

/// Run `file` in the current task and report its exit code through `out`.
///
/// `stdio` creates each standard stream. Errors are reported through `out`
/// as `failed to exec file: <error>` as well as returned; whatever was set
/// up before the failure is released first.
///
/// # Errors
/// Any [`ExecError`]; see [`load_app`] for the loader's.
#[allow(clippy::too_many_arguments)]
pub fn execute_file<H, F, S, W>(
    host: &mut H,
    fs: &F,
    file: &DirectoryEntry,
    command: &str,
    args: &str,
    config: &LaunchConfig,
    mut stdio: S,
    out: &mut W,
) -> Result<i32, ExecError>
where
    H: LaunchHost,
    F: FileSystem + ?Sized,
    S: FnMut() -> Box<dyn FileDescriptor>,
    W: fmt::Write + ?Sized,
{
    let result = run(host, fs, file, command, args, config, &mut stdio, out);
    if let Err(e) = &result {
        warn!("{command}: {e}");
        if writeln!(out, "failed to exec file: {e}").is_err() {
            warn!("{command}: launch failure could not be reported");
        }
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn run<H, F, S, W>(
    host: &mut H,
    fs: &F,
    file: &DirectoryEntry,
    command: &str,
    args: &str,
    config: &LaunchConfig,
    stdio: &mut S,
    out: &mut W,
) -> Result<i32, ExecError>
where
    H: LaunchHost,
    F: FileSystem + ?Sized,
    S: FnMut() -> Box<dyn FileDescriptor>,
    W: fmt::Write + ?Sized,
{
    let call = host.with_process(|ctx| {
        prepare(ctx, fs, file, command, args, config, stdio).inspect_err(|_| {
            if let Err(e) = release_app(ctx) {
                warn!("{command}: cleanup after failed launch: {e}");
            }
        })
    })?;

    info!("{command}: entering at {} argc={}", call.entry, call.argc);
    // SAFETY: `prepare` mapped the image, the argument page and the stack in
    // the root it installed for this task; the task is boxed by the task
    // manager, so its saved stack pointer slot does not move.
    let ret = unsafe { host.call_app(&call) };
    info!("{command}: exited with {ret}");

    let printed = writeln!(out, "app exited. ret = {ret}");
    host.with_process(release_app)?;
    printed?;
    Ok(ret)
}

fn prepare<M, A, C, F, S>(
    ctx: &mut ProcessCtx<'_, M, A, C>,
    fs: &F,
    file: &DirectoryEntry,
    command: &str,
    args: &str,
    config: &LaunchConfig,
    stdio: &mut S,
) -> Result<AppCall, ExecError>
where
    M: PhysMapper,
    A: FrameAlloc,
    C: RootSwitch,
    F: FileSystem + ?Sized,
    S: FnMut() -> Box<dyn FileDescriptor>,
{
    let app = load_app(ctx, fs, file)?;
    let space = ctx.address_space();

    space.map_region(ctx.frames, config.args_frame, 1, true)?;
    let argv = ArgPage::build(config.args_frame, command, args)?;
    space.write_bytes(config.args_frame, argv.bytes())?;

    let stack_bottom = config.stack_bottom();
    space.map_region(ctx.frames, stack_bottom, config.stack_pages, true)?;

    let process = ctx.task.process_mut();
    for _ in 0..config.std_streams {
        process.files.install(stdio());
    }

    let heap = VirtualAddress::new(align_up(app.vaddr_end.as_u64(), PAGE_SIZE));
    process.dpaging_begin = heap;
    process.dpaging_end = heap;
    process.file_map_end = stack_bottom;

    Ok(AppCall {
        argc: argv.argc(),
        argv: argv.argv(),
        cs: USER_CS | USER_RPL,
        ss: USER_SS | USER_RPL,
        entry: app.entry_point,
        rsp: config.args_frame - 8,
        os_stack_pointer: &raw mut process.os_stack_pointer,
    })
}

/// Close the task's descriptors and file maps and, if it runs in an
/// address space of its own, release that and return to the kernel root.
fn release_app<M, A, C>(ctx: &mut ProcessCtx<'_, M, A, C>) -> Result<(), VmemError>
where
    M: PhysMapper,
    A: FrameAlloc,
    C: RootSwitch,
{
    ctx.task.process_mut().clear();
    if !ctx.has_app_root() {
        return Ok(());
    }
    let space = ctx.address_space();
    space.clean_region(ctx.frames, VirtualAddress::new(APP_REGION_START))?;
    let kernel_root = ctx.kernel_root;
    ctx.install_root(kernel_root);
    space.free_hierarchy(ctx.frames)
}

/// Look up the executable named by a shell command.
///
/// # Errors
/// - [`ExecError::NoSuchFile`] if nothing is found.
/// - [`ExecError::NotAFile`] for directories and for paths with a trailing
///   slash.
pub fn find_command<F: FileSystem + ?Sized>(
    fs: &F,
    command: &str,
) -> Result<DirectoryEntry, ExecError> {
    match fs.find_file(command) {
        (None, _) => Err(ExecError::NoSuchFile),
        (Some(entry), trailing_slash) if entry.is_directory() || trailing_slash => {
            Err(ExecError::NotAFile)
        }
        (Some(entry), _) => Ok(entry),
    }
}
