//! usergate - System-Call Trap Handler for a Small Teaching Kernel
//!
//! The boundary between user programs and the kernel: everything that
//! happens between a process executing `int $0x30` and control returning
//! to it (or the process being torn down).
//!
//! # Components
//! - [`syscall::validate`]: user pointer and buffer validation
//! - [`syscall::decode`]: stack words to a typed [`syscall::Syscall`]
//! - [`syscall::Kernel`]: per-syscall execution
//! - [`fd`]: per-process descriptor tables
//! - [`fs`]: the filesystem interface and its kernel-wide lock
//! - [`process`]: exit status publication and termination
//! - [`trap`]: the trap entry the interrupt stub calls
//!
//! # Security Features
//! - User pointers are validated page by page before any dereference
//! - Descriptor ids are bounds-checked newtypes, never raw indices
//! - Filesystem access is only reachable through the lock guard
//! - A faulting process is terminated; the kernel never panics for it
//!
//! # Collaborators
//! The scheduler, loader, page tables, filesystem and console belong to
//! the rest of the kernel and are reached through traits
//! ([`process::ProcessControl`], [`mm::AddressSpace`], [`fs::FileSystem`],
//! [`drivers::Console`]). In-memory implementations of the last three
//! ship with the crate for hosted use.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod config;
pub mod drivers;
pub mod fd;
pub mod fs;
pub mod mm;
pub mod process;
pub mod syscall;
pub mod trap;

#[cfg(test)]
mod testutil;

pub use syscall::{Disposition, Kernel};
pub use trap::{syscall_handler, TrapFrame};
