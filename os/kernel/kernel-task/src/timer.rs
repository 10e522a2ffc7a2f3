//! # Timer Manager
//!
//! Tick bookkeeping driven by the periodic timer interrupt. One-shot timers
//! deliver [`Message::TimerTimeout`] to the task that registered them; the
//! task-switch timer re-arms itself every [`TASK_TIMER_PERIOD`] ticks and is
//! reported to the caller so the interrupt path can preempt.

use crate::message::Message;
use crate::task::TaskId;
use alloc::collections::BinaryHeap;
use core::cmp::{Ordering, Reverse};
use kernel_info::task::{TASK_TIMER_PERIOD, TASK_TIMER_VALUE};
use log::trace;

/// A one-shot timer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Timer {
    timeout: u64,
    value: i32,
    task_id: TaskId,
}

impl Timer {
    #[must_use]
    pub const fn new(timeout: u64, value: i32, task_id: TaskId) -> Self {
        Self {
            timeout,
            value,
            task_id,
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> u64 {
        self.timeout
    }

    #[must_use]
    pub const fn value(&self) -> i32 {
        self.value
    }

    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    const fn is_task_timer(&self) -> bool {
        self.value == TASK_TIMER_VALUE
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timeout
            .cmp(&other.timeout)
            .then(self.task_id.cmp(&other.task_id))
            .then(self.value.cmp(&other.value))
    }
}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of pending timers plus the tick counter.
#[derive(Debug, Default)]
pub struct TimerManager {
    tick: u64,
    timers: BinaryHeap<Reverse<Timer>>,
}

impl TimerManager {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tick: 0,
            timers: BinaryHeap::new(),
        }
    }

    /// Arm the periodic task-switch timer, owned by the main task.
    pub fn start_task_timer(&mut self) {
        self.add_timer(Timer::new(
            self.tick + TASK_TIMER_PERIOD,
            TASK_TIMER_VALUE,
            TaskId::MAIN,
        ));
    }

    pub fn add_timer(&mut self, timer: Timer) {
        self.timers.push(Reverse(timer));
    }

    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Number of armed timers, the task timer included.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Advance one tick and fire every timer that is due, in deadline order.
    ///
    /// `deliver` receives the owner and the [`Message::TimerTimeout`] of each
    /// expired one-shot timer. Returns `true` if the task-switch timer expired.
    pub fn tick(&mut self, mut deliver: impl FnMut(TaskId, Message)) -> bool {
        self.tick += 1;
        let mut task_timer_timeout = false;
        while let Some(Reverse(t)) = self.timers.peek().copied() {
            if t.timeout > self.tick {
                break;
            }
            self.timers.pop();
            if t.is_task_timer() {
                task_timer_timeout = true;
                self.add_timer(Timer::new(
                    self.tick + TASK_TIMER_PERIOD,
                    TASK_TIMER_VALUE,
                    t.task_id,
                ));
                continue;
            }
            trace!("timer {} for {:?} fired", t.value, t.task_id);
            deliver(
                t.task_id,
                Message::TimerTimeout {
                    timeout: t.timeout,
                    value: t.value,
                },
            );
        }
        task_timer_timeout
    }
}
