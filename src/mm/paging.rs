//! Page Flags and Address Translation
//!
//! The syscall layer never walks page tables itself. It consumes a single
//! primitive from the virtual-memory subsystem: translate a user address to
//! the kernel address that backs it, or fail. This module defines that
//! contract ([`AddressSpace`]) and the page attributes it reports.
//!
//! # Security Properties
//! - A translation is only trusted for the remainder of one page
//! - User accessibility is reported explicitly, never inferred from the address
//! - Implementors vouch for pointer validity through an `unsafe` trait

use core::ptr::NonNull;

use super::address::UserAddr;

bitflags::bitflags! {
    /// Page table entry flags (i386 PTE layout, low 12 bits).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageFlags: u32 {
        /// Entry maps a page.
        const PRESENT = 1 << 0;
        /// Page may be written.
        const WRITABLE = 1 << 1;
        /// Page is reachable from ring 3.
        const USER = 1 << 2;
        /// Set by hardware on first access.
        const ACCESSED = 1 << 5;
        /// Set by hardware on first write.
        const DIRTY = 1 << 6;

        /// User code and read-only data.
        const USER_RO = Self::PRESENT.bits() | Self::USER.bits();
        /// User data, heap and stack.
        const USER_RW = Self::PRESENT.bits() | Self::USER.bits() | Self::WRITABLE.bits();
        /// Kernel-only data.
        const KERNEL_RW = Self::PRESENT.bits() | Self::WRITABLE.bits();
    }
}

impl PageFlags {
    /// Check if user code may read through this mapping.
    #[inline]
    pub const fn user_readable(self) -> bool {
        self.contains(Self::USER_RO)
    }

    /// Check if user code may write through this mapping.
    #[inline]
    pub const fn user_writable(self) -> bool {
        self.contains(Self::USER_RW)
    }
}

/// Result of translating one user address.
#[derive(Debug, Clone, Copy)]
pub struct Translation {
    /// Kernel address of the byte the user address refers to.
    pub kaddr: NonNull<u8>,
    /// Attributes of the page containing it.
    pub flags: PageFlags,
}

/// A process address mapping, as seen from the kernel.
///
/// # Safety
/// Implementors guarantee that when `translate(addr)` returns
/// `Some(t)`, `t.kaddr` is valid for reads of
/// `addr.bytes_to_page_end()` bytes (and for writes when
/// `t.flags` contains `WRITABLE`) until the mapping is next modified.
/// The syscall layer never modifies a mapping while it holds a
/// translation.
pub unsafe trait AddressSpace {
    /// Translate a user address in this mapping, or `None` if unmapped.
    fn translate(&self, addr: UserAddr) -> Option<Translation>;
}

/// Error type for page mapping operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingError {
    /// The virtual address is already mapped.
    AlreadyMapped,
    /// The virtual address is not mapped.
    NotMapped,
    /// The address is not properly aligned.
    MisalignedAddress,
    /// Attempted to map a kernel-half address into a user directory.
    InvalidPermissions,
}

impl core::fmt::Display for MappingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadyMapped => write!(f, "virtual address already mapped"),
            Self::NotMapped => write!(f, "virtual address not mapped"),
            Self::MisalignedAddress => write!(f, "address not properly aligned"),
            Self::InvalidPermissions => write!(f, "kernel address in user mapping"),
        }
    }
}
