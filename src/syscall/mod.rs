//! System Call Interface
//!
//! The user-facing surface of the kernel: a trapping process's stack is
//! decoded into a [`Syscall`] and run by [`Kernel::dispatch`].
//!
//! # Security Model
//! - Whitelist approach: only the numbers in [`decode::numbers`] exist
//! - Every user pointer is validated before the kernel reads through it
//! - Invalid pointers terminate the caller; they never panic the kernel
//!
//! # Syscalls
//! halt, exit, exec, wait, create, remove, open, filesize, read, write,
//! seek, tell, close, and the `null` practice call.

pub mod decode;
pub mod handler;
pub mod validate;

pub use decode::{decode, DecodeError, Syscall};
pub use handler::{Disposition, Kernel};
pub use validate::{
    check_user_range, is_user_readable, Access, UserBuffer, UserBufferMut, UserMemError,
};
