//! Kernel Configuration Constants
//!
//! Compile-time parameters of the user/kernel boundary and the syscall ABI.
//! Everything the trap handler treats as a fixed limit lives here.

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;
/// Bits to shift for page number
pub const PAGE_SHIFT: usize = 12;

/// Software interrupt vector the syscall trap is registered against
pub const SYSCALL_VECTOR: u32 = 0x30;

/// Virtual address layout of a user process.
pub mod regions {
    /// First byte of the kernel half of every address space.
    ///
    /// User addresses lie strictly below this boundary.
    pub const PHYS_BASE: u32 = 0xC000_0000;
}

/// Resource limits enforced by the syscall layer.
pub mod limits {
    /// Number of descriptor ids a process may use (ids are `0..MAX_FD`).
    pub const MAX_FD: usize = 128;

    /// First descriptor id handed out by `open`; 0 and 1 are the console.
    pub const FIRST_FILE_FD: usize = 2;

    /// Longest NUL-terminated string (including the NUL) copied from user space.
    pub const MAX_USER_STRING: usize = super::PAGE_SIZE;

    /// Size of one argument word on the user stack.
    pub const WORD_SIZE: usize = 4;

    /// Largest file the in-memory filesystem will hold (8 MiB).
    pub const MAX_FILE_SIZE: usize = 8 * 1024 * 1024;
}
