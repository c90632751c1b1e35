//! Device interfaces used by the syscall layer
//!
//! All drivers follow these security principles:
//! - Minimal unsafe code, well-documented
//! - Input validation on all public interfaces
//! - No panics on invalid input (return errors)

pub mod console;

pub use console::{Console, ConsoleWriter, MemConsole};
