//! Per-Process File Descriptors
//!
//! Maps the small integers user programs pass to `read`, `write` and
//! friends onto open file handles.
//!
//! # Security Properties
//! - Raw integers never index the table; they become [`Fd`] first
//! - The console ids 0 and 1 can never be bound to a file
//! - Table size is bounded by `MAX_FD`

pub mod table;

pub use table::{Fd, FdAllocError, FdError, FdTable};
