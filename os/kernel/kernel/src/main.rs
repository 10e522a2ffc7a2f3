//! # Kernel Entry Point

#![cfg_attr(target_os = "none", no_std, no_main)]
#![allow(unsafe_code)]

#[cfg(not(target_os = "none"))]
fn main() {}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod bare_metal {
    use kernel::arch;
    use kernel::boot::BootInfo;
    use kernel_alloc::KernelHeap;
    use kernel_qemu::{QemuLogger, qemu_trace};
    use log::{LevelFilter, error, info};

    #[global_allocator]
    static ALLOCATOR: KernelHeap = KernelHeap;

    const BOOT_STACK_SIZE: usize = 64 * 1024;

    #[repr(align(16))]
    struct Aligned<const N: usize>([u8; N]);

    #[unsafe(link_section = ".bss.boot")]
    static mut BOOT_STACK: Aligned<BOOT_STACK_SIZE> = Aligned([0; BOOT_STACK_SIZE]);

    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo) -> ! {
        error!("{info}");
        arch::halt()
    }

    /// The kernel entry point.
    ///
    /// The loader jumps here with interrupts masked and `boot_info` in `RDI`.
    /// The stack is replaced before any Rust code runs, with a dummy return
    /// address so that `kernel_entry` sees a regular call frame.
    #[unsafe(no_mangle)]
    #[unsafe(naked)]
    pub extern "sysv64" fn _start_kernel(_boot_info: *const BootInfo) {
        core::arch::naked_asm!(
            "cli",
            "lea rax, [rip + {stack}]",
            "add rax, {size}",
            "and rax, -16",
            "mov rsp, rax",
            "push 0",
            "xor ebp, ebp",
            "jmp {entry}",
            stack = sym BOOT_STACK,
            size = const BOOT_STACK_SIZE,
            entry = sym kernel_entry,
        );
    }

    extern "sysv64" fn kernel_entry(boot_info: *const BootInfo) -> ! {
        if QemuLogger::new(LevelFilter::Info).init().is_err() {
            qemu_trace!("kernel: logger already installed\n");
            arch::halt();
        }
        // SAFETY: the loader passes a valid pointer that outlives the call.
        let Some(boot_info) = (unsafe { boot_info.as_ref() }) else {
            error!("no boot info");
            arch::halt();
        };

        let kernel = arch::init(boot_info);
        info!("kernel up, {} task(s)", kernel.lock_irq().tasks.len());

        // SAFETY: the kernel singleton exists, so the interrupt handlers
        // have everything they need.
        unsafe { core::arch::asm!("sti", options(nomem, nostack)) };
        loop {
            arch::wait_for_interrupt();
        }
    }
}
