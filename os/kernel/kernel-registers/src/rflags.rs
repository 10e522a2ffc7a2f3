use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;

/// RFLAGS as seen by the scheduler.
///
/// Only the interrupt flag matters to the task layer; the arithmetic flags
/// are modelled so that a saved image can be inspected in tests and logs.
#[bitfield(u64, order = Lsb)]
pub struct Rflags {
    /// Carry Flag
    pub cf_carry: bool, // 0

    /// Always 1 in 64-bit mode.
    #[bits(default = true)]
    _always1: bool, // 1

    /// Parity Flag
    pub pf_parity: bool, // 2

    #[bits(default = false)]
    _rsvd3: bool, // 3

    /// Adjust Flag
    pub af_adjust: bool, // 4

    #[bits(default = false)]
    _rsvd5: bool, // 5

    /// Zero Flag
    pub zf_zero: bool, // 6

    /// Sign Flag
    pub sf_sign: bool, // 7

    /// Trap Flag
    pub tf_trap: bool, // 8

    /// Interrupt Enable Flag
    pub if_interrupt_enable: bool, // 9

    /// Direction Flag
    pub df_direction: bool, // 10

    /// Overflow Flag
    pub of_overflow: bool, // 11

    /// I/O privilege level and everything above it.
    #[bits(52)]
    _upper: u64,
}

impl Rflags {
    /// Flags a freshly initialised task starts with: reserved bit 1 and IF.
    #[must_use]
    pub const fn initial_task() -> Self {
        Self::new().with_if_interrupt_enable(true)
    }
}

#[cfg(feature = "asm")]
impl LoadRegisterUnsafe for Rflags {
    unsafe fn load_unsafe() -> Self {
        let rflags: u64;
        unsafe {
            core::arch::asm!("pushfq; pop {}", out(reg) rflags, options(nomem, preserves_flags));
        }
        Self::from_bits(rflags)
    }
}

#[cfg(feature = "asm")]
impl StoreRegisterUnsafe for Rflags {
    unsafe fn store_unsafe(self) {
        let rflags = self.into_bits();
        unsafe {
            core::arch::asm!("push {}; popfq", in(reg) rflags, options(nomem));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_task_flags_are_0x202() {
        assert_eq!(Rflags::initial_task().into_bits(), 0x202);
    }

    #[test]
    fn interrupt_flag_is_bit_9() {
        let f = Rflags::from_bits(0x246);
        assert!(f.if_interrupt_enable());
        assert!(f.zf_zero());
        assert!(f.pf_parity());
        assert!(!f.cf_carry());
    }
}
