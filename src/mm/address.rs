//! User Virtual Address Type
//!
//! Type-safe wrapper for addresses that come out of a user process.
//! A `UserAddr` is never trusted: holding one says nothing about whether
//! it may be dereferenced. Only the validator in `syscall::validate`
//! turns it into something the kernel can read.
//!
//! # Security Properties
//! - No conversion to a pointer exists on this type
//! - All arithmetic is checked; wrapping past 4 GiB is reported, not hidden
//! - Kernel-half addresses are recognised at the type level

use core::fmt;

use crate::config::regions::PHYS_BASE;
use crate::config::{PAGE_MASK, PAGE_SHIFT, PAGE_SIZE};

/// A 32-bit virtual address in the calling process's address space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct UserAddr(u32);

impl UserAddr {
    /// The null address.
    pub const NULL: Self = Self(0);

    /// Wrap a raw address taken from a register or the user stack.
    #[inline]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get the raw address as usize (for page arithmetic).
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Check for the null address.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check if this address lies in the user half (below `PHYS_BASE`).
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 < PHYS_BASE
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.as_usize() & PAGE_MASK == 0
    }

    /// Align the address down to the start of its page.
    #[inline]
    pub const fn page_base(self) -> Self {
        Self(self.0 & !(PAGE_MASK as u32))
    }

    /// Offset of this address within its page.
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.as_usize() & PAGE_MASK
    }

    /// Virtual page number.
    #[inline]
    pub const fn page_number(self) -> u32 {
        self.0 >> PAGE_SHIFT
    }

    /// Bytes from this address to the end of its page.
    #[inline]
    pub const fn bytes_to_page_end(self) -> usize {
        PAGE_SIZE - self.page_offset()
    }

    /// Add a byte offset, returning `None` on overflow past 4 GiB.
    #[inline]
    pub fn checked_add(self, offset: usize) -> Option<Self> {
        let offset = u32::try_from(offset).ok()?;
        self.0.checked_add(offset).map(Self)
    }

    /// Address of the last byte of a `len`-byte access starting here.
    ///
    /// Returns `None` for an empty access or when the access wraps.
    #[inline]
    pub fn last_byte(self, len: usize) -> Option<Self> {
        let span = len.checked_sub(1)?;
        self.checked_add(span)
    }
}

impl From<u32> for UserAddr {
    fn from(addr: u32) -> Self {
        Self(addr)
    }
}

impl fmt::Debug for UserAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserAddr({:#010x})", self.0)
    }
}

impl fmt::Display for UserAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
