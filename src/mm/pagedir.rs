//! Per-Process Page Directory
//!
//! A software page directory that maps user pages onto kernel-owned frames.
//! It is the address-space backend used when the syscall layer runs hosted
//! (unit tests, simulation), and the reference for what the real
//! hardware-walking implementation must report through [`AddressSpace`].
//!
//! # Security Properties
//! - Kernel-half addresses can never be mapped
//! - Every frame is zero-filled when mapped
//! - Kernel-side copies ignore user write protection but never unmapped pages

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use core::cell::UnsafeCell;
use core::ptr::{self, NonNull};

use super::address::UserAddr;
use super::paging::{AddressSpace, MappingError, PageFlags, Translation};
use crate::config::PAGE_SIZE;

/// One mapped user page.
struct UserPage {
    /// Backing frame. Interior mutability because user-visible writes
    /// arrive through translated pointers while the directory is shared.
    frame: Box<UnsafeCell<[u8; PAGE_SIZE]>>,
    flags: PageFlags,
}

/// Page directory of a single user process.
#[derive(Default)]
pub struct PageDirectory {
    /// Mapped pages keyed by virtual page number.
    pages: BTreeMap<u32, UserPage>,
}

impl PageDirectory {
    /// Create an empty directory (nothing mapped).
    pub fn new() -> Self {
        Self::default()
    }

    /// Map one zero-filled page at `upage`.
    ///
    /// `PRESENT` is implied; pass `PageFlags::USER_RO` or `USER_RW` for
    /// pages user code may touch.
    pub fn map(&mut self, upage: UserAddr, flags: PageFlags) -> Result<(), MappingError> {
        if !upage.is_aligned() {
            return Err(MappingError::MisalignedAddress);
        }
        if !upage.is_user() {
            return Err(MappingError::InvalidPermissions);
        }
        if self.pages.contains_key(&upage.page_number()) {
            return Err(MappingError::AlreadyMapped);
        }

        self.pages.insert(
            upage.page_number(),
            UserPage {
                frame: Box::new(UnsafeCell::new([0; PAGE_SIZE])),
                flags: flags | PageFlags::PRESENT,
            },
        );
        Ok(())
    }

    /// Map every page overlapping `[start, start + len)`.
    ///
    /// Pages already mapped are left as they are.
    pub fn map_range(
        &mut self,
        start: UserAddr,
        len: usize,
        flags: PageFlags,
    ) -> Result<(), MappingError> {
        let Some(last) = start.last_byte(len) else {
            return Ok(());
        };
        for vpn in start.page_number()..=last.page_number() {
            let upage = UserAddr::new(vpn << crate::config::PAGE_SHIFT);
            match self.map(upage, flags) {
                Ok(()) | Err(MappingError::AlreadyMapped) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Remove the page at `upage`, freeing its frame.
    pub fn unmap(&mut self, upage: UserAddr) -> Result<(), MappingError> {
        if !upage.is_aligned() {
            return Err(MappingError::MisalignedAddress);
        }
        self.pages
            .remove(&upage.page_number())
            .map(|_| ())
            .ok_or(MappingError::NotMapped)
    }

    /// Replace the attributes of a mapped page.
    pub fn protect(&mut self, upage: UserAddr, flags: PageFlags) -> Result<(), MappingError> {
        let page = self
            .pages
            .get_mut(&upage.page_number())
            .ok_or(MappingError::NotMapped)?;
        page.flags = flags | PageFlags::PRESENT;
        Ok(())
    }

    /// Check whether the page containing `addr` is mapped.
    pub fn is_mapped(&self, addr: UserAddr) -> bool {
        self.pages.contains_key(&addr.page_number())
    }

    /// Number of mapped pages.
    pub fn mapped_pages(&self) -> usize {
        self.pages.len()
    }

    /// Copy kernel bytes into user memory (loader / test staging path).
    ///
    /// Write protection is ignored; unmapped pages are not.
    pub fn copy_to_user(&mut self, dst: UserAddr, src: &[u8]) -> Result<(), MappingError> {
        let mut addr = dst;
        let mut rest = src;
        while !rest.is_empty() {
            let page = self
                .pages
                .get_mut(&addr.page_number())
                .ok_or(MappingError::NotMapped)?;
            let off = addr.page_offset();
            let n = rest.len().min(PAGE_SIZE - off);
            page.frame.get_mut()[off..off + n].copy_from_slice(&rest[..n]);
            rest = &rest[n..];
            if rest.is_empty() {
                break;
            }
            addr = addr.checked_add(n).ok_or(MappingError::NotMapped)?;
        }
        Ok(())
    }

    /// Copy user memory out into a kernel buffer.
    pub fn copy_from_user(&self, src: UserAddr, dst: &mut [u8]) -> Result<(), MappingError> {
        let mut addr = src;
        let mut done = 0;
        while done < dst.len() {
            let page = self
                .pages
                .get(&addr.page_number())
                .ok_or(MappingError::NotMapped)?;
            let off = addr.page_offset();
            let n = (dst.len() - done).min(PAGE_SIZE - off);
            // SAFETY: off + n <= PAGE_SIZE, so the source range lies in the
            // frame; no reference to the frame contents is alive here.
            unsafe {
                ptr::copy_nonoverlapping(
                    page.frame.get().cast::<u8>().add(off),
                    dst[done..].as_mut_ptr(),
                    n,
                );
            }
            done += n;
            if done == dst.len() {
                break;
            }
            addr = addr.checked_add(n).ok_or(MappingError::NotMapped)?;
        }
        Ok(())
    }
}

// SAFETY: frames are heap allocations owned by the directory; they live
// until `unmap`/drop, both of which need `&mut self` and so cannot overlap
// with a translation obtained through `&self`. `off < PAGE_SIZE` keeps the
// returned pointer inside its frame.
unsafe impl AddressSpace for PageDirectory {
    fn translate(&self, addr: UserAddr) -> Option<Translation> {
        let page = self.pages.get(&addr.page_number())?;
        // SAFETY: page_offset() < PAGE_SIZE, the frame's length.
        let kaddr = unsafe { page.frame.get().cast::<u8>().add(addr.page_offset()) };
        Some(Translation {
            kaddr: NonNull::new(kaddr)?,
            flags: page.flags,
        })
    }
}

impl core::fmt::Debug for PageDirectory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageDirectory")
            .field("mapped_pages", &self.pages.len())
            .finish()
    }
}
