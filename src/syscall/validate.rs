//! User Memory Validation
//!
//! Every address a user process hands the kernel is untrusted. This module
//! is the only code that turns a [`UserAddr`] into kernel-readable memory.
//!
//! # Security Principles
//! - Validate ALL inputs before use, including pointers read out of
//!   other validated words
//! - Fail-secure: an address is bad unless every check passes
//! - Every page an access touches is checked, not just the first and last
//! - No byte of a range is touched until the whole range is validated

use alloc::vec::Vec;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::config::limits::{MAX_USER_STRING, WORD_SIZE};
use crate::mm::{AddressSpace, UserAddr};

/// Kind of access the kernel is about to perform on user memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Kernel reads user memory (write, exec, create...).
    Read,
    /// Kernel writes user memory (read).
    Write,
}

/// Reasons a user address range is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserMemError {
    /// The address is null.
    Null,
    /// Part of the access lies at or above `PHYS_BASE`.
    KernelAddress(UserAddr),
    /// The access wraps around the top of the address space.
    Overflow,
    /// A page of the access is not mapped in this process.
    Unmapped(UserAddr),
    /// The kernel would write to a page the user may not write.
    ReadOnly(UserAddr),
    /// No NUL terminator within the string length limit.
    Unterminated,
}

impl fmt::Display for UserMemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null user pointer"),
            Self::KernelAddress(a) => write!(f, "kernel address {} from user", a),
            Self::Overflow => write!(f, "user range wraps address space"),
            Self::Unmapped(a) => write!(f, "unmapped user address {}", a),
            Self::ReadOnly(a) => write!(f, "read-only user page at {}", a),
            Self::Unterminated => write!(f, "unterminated user string"),
        }
    }
}

/// One page-bounded piece of a validated user range.
#[derive(Debug, Clone, Copy)]
struct Segment {
    ptr: NonNull<u8>,
    len: usize,
}

/// Check one page of an access and return its kernel segment.
fn check_page<A: AddressSpace + ?Sized>(
    space: &A,
    addr: UserAddr,
    len: usize,
    access: Access,
) -> Result<Segment, UserMemError> {
    let t = space.translate(addr).ok_or(UserMemError::Unmapped(addr))?;
    if !t.flags.user_readable() {
        return Err(UserMemError::Unmapped(addr));
    }
    if access == Access::Write && !t.flags.user_writable() {
        return Err(UserMemError::ReadOnly(addr));
    }
    Ok(Segment { ptr: t.kaddr, len })
}

/// Validate `[addr, addr + len)` and collect its per-page kernel segments.
///
/// A zero-length range still requires `addr` itself to be a valid user
/// byte, but yields no segments.
fn collect_segments<A: AddressSpace + ?Sized>(
    space: &A,
    addr: UserAddr,
    len: usize,
    access: Access,
) -> Result<Vec<Segment>, UserMemError> {
    if addr.is_null() {
        return Err(UserMemError::Null);
    }
    let last = addr
        .last_byte(len.max(1))
        .ok_or(UserMemError::Overflow)?;
    if !addr.is_user() {
        return Err(UserMemError::KernelAddress(addr));
    }
    if !last.is_user() {
        return Err(UserMemError::KernelAddress(last));
    }

    if len == 0 {
        check_page(space, addr, 0, access)?;
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    let mut cur = addr;
    let mut remaining = len;
    loop {
        let n = remaining.min(cur.bytes_to_page_end());
        segments.push(check_page(space, cur, n, access)?);
        remaining -= n;
        if remaining == 0 {
            break;
        }
        // Cannot overflow: cur + n <= last < PHYS_BASE.
        cur = cur.checked_add(n).ok_or(UserMemError::Overflow)?;
    }
    Ok(segments)
}

/// Check that `len` bytes at `addr` may be accessed on behalf of the
/// current process.
///
/// # Security Checks
/// 1. Pointer is non-null
/// 2. `addr + len - 1` does not overflow
/// 3. First and last byte are below `PHYS_BASE`
/// 4. Every page in between is mapped and user-accessible
/// 5. For [`Access::Write`], every page is user-writable
pub fn check_user_range<A: AddressSpace + ?Sized>(
    space: &A,
    addr: UserAddr,
    len: usize,
    access: Access,
) -> Result<(), UserMemError> {
    collect_segments(space, addr, len, access).map(|_| ())
}

/// Whether one machine word at `addr` may be read.
///
/// Passing only vouches for this word; every other address must be
/// checked on its own.
pub fn is_user_readable<A: AddressSpace + ?Sized>(space: &A, addr: UserAddr) -> bool {
    check_user_range(space, addr, WORD_SIZE, Access::Read).is_ok()
}

/// Copy `dst.len()` bytes of user memory at `src` into a kernel buffer.
pub fn copy_from_user<A: AddressSpace + ?Sized>(
    space: &A,
    src: UserAddr,
    dst: &mut [u8],
) -> Result<(), UserMemError> {
    let buf = UserBuffer::new(space, src, dst.len())?;
    let mut done = 0;
    for chunk in buf.segments() {
        dst[done..done + chunk.len()].copy_from_slice(chunk);
        done += chunk.len();
    }
    Ok(())
}

/// Read one little-endian word from the user stack.
pub fn read_user_word<A: AddressSpace + ?Sized>(
    space: &A,
    addr: UserAddr,
) -> Result<u32, UserMemError> {
    let mut bytes = [0u8; WORD_SIZE];
    copy_from_user(space, addr, &mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Copy a NUL-terminated string out of user memory.
///
/// Each page is validated before any of its bytes are scanned, so a
/// string running into an unmapped page or the kernel half is refused.
/// The returned bytes exclude the terminator.
pub fn read_user_string<A: AddressSpace + ?Sized>(
    space: &A,
    addr: UserAddr,
) -> Result<Vec<u8>, UserMemError> {
    if addr.is_null() {
        return Err(UserMemError::Null);
    }

    let mut out = Vec::new();
    let mut cur = addr;
    loop {
        if !cur.is_user() {
            return Err(UserMemError::KernelAddress(cur));
        }
        let budget = MAX_USER_STRING - out.len();
        let n = cur.bytes_to_page_end().min(budget);
        let seg = check_page(space, cur, n, Access::Read)?;

        // SAFETY: check_page validated this page for reads and
        // n <= bytes_to_page_end(), which the AddressSpace contract covers.
        let chunk = unsafe { core::slice::from_raw_parts(seg.ptr.as_ptr(), seg.len) };
        if let Some(end) = chunk.iter().position(|&b| b == 0) {
            out.extend_from_slice(&chunk[..end]);
            return Ok(out);
        }
        out.extend_from_slice(chunk);

        if out.len() >= MAX_USER_STRING {
            return Err(UserMemError::Unterminated);
        }
        cur = cur.checked_add(n).ok_or(UserMemError::Overflow)?;
    }
}

/// A validated user-space buffer the kernel may read.
///
/// This type guarantees that:
/// - The whole range lies below `PHYS_BASE`
/// - The length doesn't overflow
/// - Every page of the range is mapped and user-readable
///
/// The borrow of the address space keeps the mapping from changing while
/// the buffer is alive.
#[derive(Debug)]
pub struct UserBuffer<'a> {
    addr: UserAddr,
    len: usize,
    segments: Vec<Segment>,
    _space: PhantomData<&'a ()>,
}

impl<'a> UserBuffer<'a> {
    /// Validate a user buffer for reading.
    pub fn new<A: AddressSpace + ?Sized>(
        space: &'a A,
        addr: UserAddr,
        len: usize,
    ) -> Result<Self, UserMemError> {
        let segments = collect_segments(space, addr, len, Access::Read)?;
        Ok(Self {
            addr,
            len,
            segments,
            _space: PhantomData,
        })
    }

    /// User address of the first byte.
    pub fn addr(&self) -> UserAddr {
        self.addr
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The buffer contents, one slice per page touched.
    ///
    /// The contents may change if the process writes them concurrently;
    /// copy before validating anything derived from them.
    pub fn segments(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.segments.iter().map(|seg| {
            // SAFETY: each segment was validated for reads and lies inside
            // one page, which the AddressSpace contract keeps valid while
            // the `'a` borrow of the space is alive.
            unsafe { core::slice::from_raw_parts(seg.ptr.as_ptr(), seg.len) }
        })
    }
}

/// A validated user-space buffer the kernel may write.
///
/// Same guarantees as [`UserBuffer`], plus every page is user-writable.
#[derive(Debug)]
pub struct UserBufferMut<'a> {
    addr: UserAddr,
    len: usize,
    segments: Vec<Segment>,
    _space: PhantomData<&'a ()>,
}

impl<'a> UserBufferMut<'a> {
    /// Validate a user buffer for writing.
    pub fn new<A: AddressSpace + ?Sized>(
        space: &'a A,
        addr: UserAddr,
        len: usize,
    ) -> Result<Self, UserMemError> {
        let segments = collect_segments(space, addr, len, Access::Write)?;
        Ok(Self {
            addr,
            len,
            segments,
            _space: PhantomData,
        })
    }

    /// User address of the first byte.
    pub fn addr(&self) -> UserAddr {
        self.addr
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The buffer as mutable slices, one per page touched.
    pub fn segments_mut(&mut self) -> impl Iterator<Item = &mut [u8]> + '_ {
        self.segments.iter().map(|seg| {
            // SAFETY: segments were validated writable, never overlap (one
            // per page), and the `&mut self` borrow makes these slices the
            // only kernel view of them.
            unsafe { core::slice::from_raw_parts_mut(seg.ptr.as_ptr(), seg.len) }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::regions::PHYS_BASE;
    use crate::config::PAGE_SIZE;
    use crate::mm::{PageDirectory, PageFlags};

    fn space() -> PageDirectory {
        let mut pd = PageDirectory::new();
        pd.map(UserAddr::new(0x1000), PageFlags::USER_RW).unwrap();
        pd.map(UserAddr::new(0x2000), PageFlags::USER_RO).unwrap();
        pd.map(UserAddr::new(PHYS_BASE - 0x1000), PageFlags::USER_RW)
            .unwrap();
        pd
    }

    #[test]
    fn test_null_pointer() {
        let pd = space();
        assert!(!is_user_readable(&pd, UserAddr::NULL));
        assert_eq!(
            check_user_range(&pd, UserAddr::NULL, 0, Access::Read),
            Err(UserMemError::Null)
        );
    }

    #[test]
    fn test_kernel_half_refused() {
        let pd = space();
        for addr in [PHYS_BASE, PHYS_BASE + 4, 0xFFFF_FFF0] {
            assert!(!is_user_readable(&pd, UserAddr::new(addr)));
        }
    }

    #[test]
    fn test_unmapped_refused() {
        let pd = space();
        assert!(!is_user_readable(&pd, UserAddr::new(0x5000)));
        assert_eq!(
            check_user_range(&pd, UserAddr::new(0x5000), 1, Access::Read),
            Err(UserMemError::Unmapped(UserAddr::new(0x5000)))
        );
    }

    #[test]
    fn test_mapped_user_addresses_pass() {
        let pd = space();
        for addr in [0x1000, 0x1004, 0x1ffc, 0x2000, 0x2abc] {
            assert!(is_user_readable(&pd, UserAddr::new(addr)), "{:#x}", addr);
        }
        assert!(is_user_readable(&pd, UserAddr::new(PHYS_BASE - 4)));
    }

    #[test]
    fn test_word_straddling_unmapped_page() {
        let pd = space();
        // 0x2ffe..0x3001 runs into unmapped 0x3000.
        assert!(!is_user_readable(&pd, UserAddr::new(0x2ffe)));
    }

    #[test]
    fn test_range_ending_past_boundary() {
        let pd = space();
        let addr = UserAddr::new(PHYS_BASE - 1);
        assert!(check_user_range(&pd, addr, 1, Access::Read).is_ok());
        assert_eq!(
            check_user_range(&pd, addr, 2, Access::Read),
            Err(UserMemError::KernelAddress(UserAddr::new(PHYS_BASE)))
        );
    }

    #[test]
    fn test_overflow() {
        let pd = space();
        assert_eq!(
            check_user_range(&pd, UserAddr::new(0x1000), usize::MAX, Access::Read),
            Err(UserMemError::Overflow)
        );
    }

    #[test]
    fn test_write_access_needs_writable_page() {
        let pd = space();
        assert!(check_user_range(&pd, UserAddr::new(0x1ff0), 0x20, Access::Read).is_ok());
        assert_eq!(
            check_user_range(&pd, UserAddr::new(0x1ff0), 0x20, Access::Write),
            Err(UserMemError::ReadOnly(UserAddr::new(0x2000)))
        );
    }

    #[test]
    fn test_kernel_only_page_is_unmapped_for_user() {
        let mut pd = space();
        pd.map(UserAddr::new(0x7000), PageFlags::KERNEL_RW).unwrap();
        assert!(!is_user_readable(&pd, UserAddr::new(0x7000)));
    }

    #[test]
    fn test_buffer_segments_split_at_page() {
        let mut pd = space();
        pd.copy_to_user(UserAddr::new(0x1ffe), b"abcd").unwrap();
        let buf = UserBuffer::new(&pd, UserAddr::new(0x1ffe), 4).unwrap();
        let parts: Vec<&[u8]> = buf.segments().collect();
        assert_eq!(parts, [&b"ab"[..], &b"cd"[..]]);
    }

    #[test]
    fn test_buffer_mut_writes_through() {
        let pd = space();
        {
            let mut buf = UserBufferMut::new(&pd, UserAddr::new(0x1800), 3).unwrap();
            for seg in buf.segments_mut() {
                seg.copy_from_slice(b"xyz");
            }
        }
        let mut out = [0u8; 3];
        pd.copy_from_user(UserAddr::new(0x1800), &mut out).unwrap();
        assert_eq!(&out, b"xyz");
    }

    #[test]
    fn test_read_word() {
        let mut pd = space();
        pd.copy_to_user(UserAddr::new(0x1ffe), &0xdead_beefu32.to_le_bytes())
            .unwrap();
        assert_eq!(read_user_word(&pd, UserAddr::new(0x1ffe)), Ok(0xdead_beef));
    }

    #[test]
    fn test_read_string() {
        let mut pd = space();
        pd.copy_to_user(UserAddr::new(0x1ffc), b"echo x\0").unwrap();
        assert_eq!(
            read_user_string(&pd, UserAddr::new(0x1ffc)).unwrap(),
            b"echo x".to_vec()
        );
    }

    #[test]
    fn test_string_into_unmapped_page() {
        let mut pd = space();
        pd.copy_to_user(UserAddr::new(0x2ffc), b"abcd").unwrap();
        assert_eq!(
            read_user_string(&pd, UserAddr::new(0x2ffc)),
            Err(UserMemError::Unmapped(UserAddr::new(0x3000)))
        );
    }

    #[test]
    fn test_string_without_terminator() {
        let mut pd = PageDirectory::new();
        pd.map_range(UserAddr::new(0x1000), 2 * PAGE_SIZE, PageFlags::USER_RW)
            .unwrap();
        pd.copy_to_user(UserAddr::new(0x1000), &[b'a'; 2 * PAGE_SIZE])
            .unwrap();
        assert_eq!(
            read_user_string(&pd, UserAddr::new(0x1000)),
            Err(UserMemError::Unterminated)
        );
    }
}
