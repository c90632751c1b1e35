//! Memory management module
//!
//! Provides the pieces of virtual memory the syscall layer depends on:
//! - User address type
//! - Page attributes and the translation contract
//! - A software page directory for hosted address spaces
//!
//! # Security Principles
//! - User addresses are opaque until validated
//! - Translation is the only route from a user address to kernel memory
//! - Unsafe code is minimal and audited

pub mod address;
pub mod pagedir;
pub mod paging;

pub use address::UserAddr;
pub use pagedir::PageDirectory;
pub use paging::{AddressSpace, MappingError, PageFlags, Translation};
