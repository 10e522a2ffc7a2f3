//! A simulated machine for launching applications on the host.

#![allow(dead_code)]

#[path = "../../src/test_image.rs"]
pub mod test_image;

use kernel_memory_addresses::VirtualAddress;
use kernel_process::fs::{Attributes, DirectoryEntry, FileSystem};
use kernel_process::{AppCall, AppLoadCache, LaunchHost, ProcessCtx, RootSwitch};
use kernel_task::{FdError, FileDescriptor, TaskConfig, TaskContext, TaskCpu, TaskManager};
use kernel_vmem::testing::{TestFrames, TestPhys};
use kernel_vmem::{AddressSpace, FrameAlloc, RootPage};
use std::cell::Cell;
use test_image::{ImageBuilder, PF_R, PF_W, PF_X};

pub const TEXT: u64 = 0xFFFF_8000_0000_0000;
pub const DATA: u64 = 0xFFFF_8000_0000_2000;
pub const ENTRY: u64 = TEXT + 0x10;
/// First page after the image's last segment.
pub const HEAP: u64 = 0xFFFF_8000_0000_4000;
/// A page mapped in the kernel half of every address space.
pub const KERNEL_PAGE: u64 = 0x20_0000;
/// Frames owned by the cached image of [`hello_image`]: root, three
/// tables, one text page and two data pages.
pub const HELLO_TEMPLATE_FRAMES: usize = 7;

/// A text segment and a data segment whose bss runs into a second page.
pub fn hello_image() -> Vec<u8> {
    ImageBuilder::new(ENTRY)
        .segment(TEXT, &[0xCC; 0x30], 0x30, PF_R | PF_X)
        .segment(DATA, b"counter=0", 0x1800, PF_R | PF_W)
        .build()
}

/// The scheduler never switches in these tests.
pub struct NoSwitch {
    root: u64,
}

impl TaskCpu for NoSwitch {
    fn read_cr3(&self) -> u64 {
        self.root
    }

    unsafe fn switch_context(&mut self, _next: *const TaskContext, _current: *mut TaskContext) {
        unreachable!("no task switches expected");
    }
}

/// Records every root table loaded into CR3.
#[derive(Default)]
pub struct Cr3Log {
    pub writes: Vec<u64>,
}

impl RootSwitch for Cr3Log {
    unsafe fn write_cr3(&mut self, root: RootPage) {
        self.writes.push(root.base().as_u64());
    }
}

pub struct Machine<'p> {
    pub phys: &'p TestPhys,
    pub frames: TestFrames,
    pub cache: AppLoadCache,
    pub tasks: TaskManager<NoSwitch>,
    pub kernel_root: RootPage,
    pub cpu: Cr3Log,
    /// Scratch space for simulated applications.
    pub notes: Vec<u64>,
}

impl<'p> Machine<'p> {
    pub fn new(phys: &'p TestPhys) -> Self {
        let mut frames = phys.allocator();
        let kernel_root = frames.alloc_4k().unwrap();
        AddressSpace::from_root(phys, kernel_root)
            .map_region(&mut frames, VirtualAddress::new(KERNEL_PAGE), 1, true)
            .unwrap();
        let tasks = TaskManager::new(
            NoSwitch {
                root: kernel_root.base().as_u64(),
            },
            TaskConfig::default(),
        );
        Self {
            phys,
            frames,
            cache: AppLoadCache::new(),
            tasks,
            kernel_root,
            cpu: Cr3Log::default(),
            notes: Vec::new(),
        }
    }

    pub fn with_process<R>(
        &mut self,
        f: impl FnOnce(&mut ProcessCtx<'_, TestPhys, TestFrames, Cr3Log>) -> R,
    ) -> R {
        let mut ctx = ProcessCtx {
            mapper: self.phys,
            frames: &mut self.frames,
            cache: &mut self.cache,
            task: self.tasks.current_task_mut(),
            kernel_root: self.kernel_root,
            cpu: &mut self.cpu,
        };
        f(&mut ctx)
    }

    pub fn allocated(&self) -> usize {
        self.frames.usage().allocated
    }

    pub fn task_cr3(&self) -> u64 {
        self.tasks.current_task().context().cr3
    }
}

/// What the simulated application does while it "runs".
pub type App = fn(&mut Machine<'_>, &AppCall) -> i32;

pub struct Host<'p> {
    pub machine: Machine<'p>,
    pub app: App,
    pub calls: Vec<AppCall>,
}

impl<'p> Host<'p> {
    pub fn new(phys: &'p TestPhys, app: App) -> Self {
        Self {
            machine: Machine::new(phys),
            app,
            calls: Vec::new(),
        }
    }
}

impl LaunchHost for Host<'_> {
    type Mapper = TestPhys;
    type Frames = TestFrames;
    type Cpu = Cr3Log;

    fn with_process<R>(
        &mut self,
        f: impl FnOnce(&mut ProcessCtx<'_, TestPhys, TestFrames, Cr3Log>) -> R,
    ) -> R {
        self.machine.with_process(f)
    }

    unsafe fn call_app(&mut self, call: &AppCall) -> i32 {
        self.calls.push(*call);
        (self.app)(&mut self.machine, call)
    }
}

/// A flat in-memory volume.
#[derive(Default)]
pub struct Disk {
    files: Vec<(String, DirectoryEntry, Vec<u8>)>,
    pub loads: Cell<usize>,
}

impl Disk {
    pub fn add(&mut self, name: &str, bytes: Vec<u8>) -> DirectoryEntry {
        self.insert(name, bytes, Attributes::new().with_archive(true))
    }

    pub fn add_dir(&mut self, name: &str) -> DirectoryEntry {
        self.insert(name, Vec::new(), Attributes::new().with_directory(true))
    }

    fn insert(&mut self, name: &str, bytes: Vec<u8>, attr: Attributes) -> DirectoryEntry {
        let mut short = [b' '; 11];
        for (dst, src) in short.iter_mut().zip(name.bytes().take(8)) {
            *dst = src.to_ascii_uppercase();
        }
        let entry = DirectoryEntry {
            name: short,
            attr,
            first_cluster: u32::try_from(self.files.len()).unwrap() + 2,
            file_size: u32::try_from(bytes.len()).unwrap(),
        };
        self.files.push((name.to_owned(), entry, bytes));
        entry
    }
}

impl FileSystem for Disk {
    fn find_file(&self, path: &str) -> (Option<DirectoryEntry>, bool) {
        let trailing_slash = path.ends_with('/');
        let name = path.trim_end_matches('/');
        let entry = self.files.iter().find(|f| f.0 == name).map(|f| f.1);
        (entry, trailing_slash)
    }

    fn load_file(&self, buf: &mut [u8], entry: &DirectoryEntry) -> usize {
        self.loads.set(self.loads.get() + 1);
        let Some((_, _, bytes)) = self
            .files
            .iter()
            .find(|f| f.1.first_cluster == entry.first_cluster)
        else {
            return 0;
        };
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        n
    }
}

/// A standard stream that swallows output and has no input.
pub struct NullFd;

impl FileDescriptor for NullFd {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, FdError> {
        Ok(0)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, FdError> {
        Ok(buf.len())
    }

    fn size(&self) -> usize {
        0
    }

    fn load(&mut self, _buf: &mut [u8], _offset: usize) -> Result<usize, FdError> {
        Ok(0)
    }
}

pub fn null_stdio() -> Box<dyn FileDescriptor> {
    Box::new(NullFd)
}

/// A regular file that can be memory-mapped.
pub struct MemFile(pub Vec<u8>);

impl FileDescriptor for MemFile {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, FdError> {
        Err(FdError::Unsupported)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<usize, FdError> {
        Err(FdError::Unsupported)
    }

    fn size(&self) -> usize {
        self.0.len()
    }

    fn load(&mut self, buf: &mut [u8], offset: usize) -> Result<usize, FdError> {
        let src = self.0.get(offset..).unwrap_or_default();
        let n = src.len().min(buf.len());
        buf[..n].copy_from_slice(&src[..n]);
        Ok(n)
    }
}
