use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU8, Ordering};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const FULL: u8 = 2;

/// A write-once cell for kernel singletons built during boot.
///
/// Readers never block once the value is published. A reader that races
/// the writer in [`get_or_init`](Self::get_or_init) spins until the value
/// is there.
pub struct SyncOnceCell<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Default for SyncOnceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncOnceCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    #[inline]
    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == FULL {
            // SAFETY: FULL is only stored after the value was written.
            Some(unsafe { self.value_unchecked() })
        } else {
            None
        }
    }

    /// Store `value` if the cell is empty.
    ///
    /// # Errors
    /// Hands `value` back if the cell is already set or being set.
    pub fn set(&self, value: T) -> Result<(), T> {
        if self.claim() {
            self.publish(value);
            Ok(())
        } else {
            Err(value)
        }
    }

    /// The value, running `init` first if the cell is empty.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        if let Some(v) = self.get() {
            return v;
        }
        if self.claim() {
            self.publish(init());
        } else {
            while self.state.load(Ordering::Acquire) != FULL {
                spin_loop();
            }
        }
        // SAFETY: FULL was observed or stored by this thread.
        unsafe { self.value_unchecked() }
    }

    /// Move from empty to writing. `true` if this caller is the writer.
    fn claim(&self) -> bool {
        self.state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn publish(&self, value: T) {
        // SAFETY: the caller won `claim`, so nobody else touches the slot.
        unsafe { (*self.value.get()).write(value) };
        self.state.store(FULL, Ordering::Release);
    }

    /// # Safety
    /// The state must be `FULL`.
    const unsafe fn value_unchecked(&self) -> &T {
        // SAFETY: forwarded from the caller.
        unsafe { (*self.value.get()).assume_init_ref() }
    }
}

impl<T> Drop for SyncOnceCell<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == FULL {
            // SAFETY: FULL means initialised, and `&mut self` rules out readers.
            unsafe { self.value.get_mut().assume_init_drop() }
        }
    }
}

// SAFETY: the value is written once before FULL and only shared afterwards.
unsafe impl<T: Sync + Send> Sync for SyncOnceCell<T> {}
unsafe impl<T: Send> Send for SyncOnceCell<T> {}
