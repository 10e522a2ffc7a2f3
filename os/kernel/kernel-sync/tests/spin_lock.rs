use kernel_sync::{SpinLock, interrupts_enabled};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, mpsc};
use std::{panic, thread};

#[test]
fn guard_releases_on_drop() {
    let queue = SpinLock::new(VecDeque::from([1u64]));
    {
        let mut q = queue.lock();
        q.push_back(2);
        assert!(queue.try_lock().is_none());
    }
    let mut q = queue.try_lock().expect("lock released by the first guard");
    q.rotate_left(1);
    assert_eq!(q.front(), Some(&2));
}

#[test]
fn closures_see_the_guarded_value() {
    let ticks = SpinLock::new(0u64);
    let due = ticks.with_lock(|t| {
        *t += 3;
        *t + 2
    });
    assert_eq!(due, 5);
    assert_eq!(ticks.with_lock_irq(|t| *t), 3);
}

#[test]
fn exclusive_access_needs_no_locking() {
    let mut frames = SpinLock::new(vec![0u8; 4]);
    frames.get_mut()[2] = 1;
    assert_eq!(frames.lock().iter().filter(|&&b| b == 1).count(), 1);
}

#[test]
fn contended_ticks_are_counted_exactly() {
    const THREADS: usize = 8;
    const TICKS: usize = 5_000;

    let clock = Arc::new(SpinLock::new(0usize));
    let inside = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let clock = Arc::clone(&clock);
            let inside = Arc::clone(&inside);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..TICKS {
                    clock.with_lock(|t| {
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        *t += 1;
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                    thread::yield_now();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(clock.with_lock(|t| *t), THREADS * TICKS);
}

#[test]
fn a_panicking_critical_section_releases_the_lock() {
    let l = SpinLock::new(0u32);
    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 123;
            panic!("fault while locked");
        });
    }));
    assert!(res.is_err());
    assert_eq!(l.with_lock(|v| *v), 123);
}

#[test]
fn lock_irq_masks_interrupts_until_dropped() {
    let l = SpinLock::new(0u32);
    assert!(interrupts_enabled());
    {
        let mut g = l.lock_irq();
        assert!(!interrupts_enabled());
        assert!(l.try_lock().is_none());
        *g = 7;
    }
    assert!(interrupts_enabled());
    assert_eq!(l.with_lock(|v| *v), 7);
}

#[test]
fn lock_irq_nested_inside_masked_section_keeps_interrupts_off() {
    let a = SpinLock::new(1u8);
    let b = SpinLock::new(2u8);
    let ga = a.lock_irq();
    {
        let gb = b.lock_irq();
        assert_eq!(*ga + *gb, 3);
    }
    assert!(!interrupts_enabled());
    drop(ga);
    assert!(interrupts_enabled());
}

#[test]
fn a_lock_taken_on_one_thread_can_be_released_on_another() {
    let lock = Arc::new(SpinLock::new(0u8));
    let (tx, rx) = mpsc::channel();

    let owner = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            let mut g = lock.lock();
            *g = 1;
            core::mem::forget(g);
            tx.send(()).unwrap();
        })
    };
    rx.recv().unwrap();
    owner.join().unwrap();
    assert!(lock.try_lock().is_none());

    // SAFETY: the forgotten guard is never used again.
    unsafe { lock.force_unlock() };
    assert_eq!(lock.with_lock(|v| *v), 1);
}

#[test]
fn spinlock_is_sync_for_send_t() {
    fn takes_sync<S: Sync>(_s: &S) {}
    takes_sync(&SpinLock::new(VecDeque::<u64>::new()));
}
