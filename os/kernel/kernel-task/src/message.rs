//! Messages delivered to task inboxes.

use bitfield_struct::bitfield;

/// Keyboard modifier state in USB HID boot-protocol order.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct Modifiers {
    pub left_control: bool,
    pub left_shift: bool,
    pub left_alt: bool,
    pub left_gui: bool,
    pub right_control: bool,
    pub right_shift: bool,
    pub right_alt: bool,
    pub right_gui: bool,
}

impl Modifiers {
    /// Either control key is held.
    #[inline]
    #[must_use]
    pub const fn control(&self) -> bool {
        self.left_control() || self.right_control()
    }
}

/// HID usage ID of the `D` key.
pub const KEYCODE_D: u8 = 7;

/// A message in a task's inbox.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Message {
    /// A one-shot timer registered by the task expired.
    TimerTimeout {
        /// Tick at which the timer was due.
        timeout: u64,
        /// Value supplied when the timer was registered.
        value: i32,
    },
    /// A key was pressed or released.
    KeyPush {
        modifier: Modifiers,
        keycode: u8,
        ascii: u8,
        press: bool,
    },
}

impl Message {
    /// A key press without modifiers.
    #[must_use]
    pub const fn key_press(keycode: u8, ascii: u8) -> Self {
        Self::KeyPush {
            modifier: Modifiers::new(),
            keycode,
            ascii,
            press: true,
        }
    }
}
