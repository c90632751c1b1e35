//! Console Interface
//!
//! The syscall layer writes user output to, and reads keyboard input
//! from, a [`Console`]. The hardware behind it is not our concern;
//! [`MemConsole`] is a buffered implementation for hosted runs.
//!
//! # Security Considerations
//! - Output is taken as raw bytes; nothing is interpreted
//! - Uses spinlocks for thread-safe access

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use spin::Mutex;

/// Console device consumed by the syscall layer.
pub trait Console: Sync {
    /// Write all of `buf` to the display.
    fn write_bytes(&self, buf: &[u8]);

    /// Block until a key is available and return it.
    fn read_byte(&self) -> u8;
}

/// `fmt::Write` adapter so kernel messages can be formatted straight
/// onto a console without an intermediate allocation.
pub struct ConsoleWriter<'a, C: ?Sized>(pub &'a C);

impl<C: Console + ?Sized> fmt::Write for ConsoleWriter<'_, C> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_bytes(s.as_bytes());
        Ok(())
    }
}

/// Console that records output and serves queued input.
#[derive(Debug, Default)]
pub struct MemConsole {
    output: Mutex<Vec<u8>>,
    input: Mutex<VecDeque<u8>>,
}

impl MemConsole {
    /// Create a console with no output and no pending input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue keystrokes for `read_byte`.
    pub fn push_input(&self, bytes: &[u8]) {
        self.input.lock().extend(bytes.iter().copied());
    }

    /// Everything written so far.
    pub fn output(&self) -> Vec<u8> {
        self.output.lock().clone()
    }

    /// Everything written so far, as text.
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output.lock()).into_owned()
    }

    /// Take and clear the output buffer.
    pub fn take_output(&self) -> Vec<u8> {
        core::mem::take(&mut *self.output.lock())
    }
}

impl Console for MemConsole {
    fn write_bytes(&self, buf: &[u8]) {
        self.output.lock().extend_from_slice(buf);
    }

    fn read_byte(&self) -> u8 {
        loop {
            if let Some(byte) = self.input.lock().pop_front() {
                return byte;
            }
            core::hint::spin_loop();
        }
    }
}
