//! File Descriptor Table
//!
//! A per-process table mapping small integer ids to open file handles.
//! It provides indexed access to handles via validated [`Fd`] values.
//!
//! # Design
//! - Growable array of slots, never larger than `MAX_FD`
//! - Ids 0 and 1 belong to the console and never hold a handle
//! - Allocation reuses the lowest free id before growing by one slot
//! - Every lookup is bounds-checked and returns `Option`/`Result`

use alloc::vec::Vec;
use core::fmt;

use crate::config::limits::{FIRST_FILE_FD, MAX_FD};
use crate::fs::FileSystem;

/// A descriptor id known to be in `[0, MAX_FD)`.
///
/// This is a newtype to prevent using arbitrary integers as table indices.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct Fd(u32);

impl Fd {
    /// Standard input (keyboard).
    pub const STDIN: Self = Self(0);

    /// Standard output (console).
    pub const STDOUT: Self = Self(1);

    /// First id `open` may hand out.
    pub const FIRST_FILE: Self = Self(FIRST_FILE_FD as u32);

    /// Create a descriptor id.
    ///
    /// Returns None if the value is negative or not below `MAX_FD`.
    #[inline]
    pub const fn new(raw: i32) -> Option<Self> {
        if raw >= 0 && (raw as usize) < MAX_FD {
            Some(Self(raw as u32))
        } else {
            None
        }
    }

    /// Interpret a raw user stack word as a descriptor id.
    #[inline]
    pub const fn from_word(word: u32) -> Option<Self> {
        Self::new(word as i32)
    }

    /// Get the index value.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Value returned to user space.
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0 as i32
    }

    /// Whether this id is one of the reserved console ids.
    #[inline]
    pub const fn is_console(self) -> bool {
        self.0 < FIRST_FILE_FD as u32
    }
}

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for descriptor table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    /// The id is 0 or 1, which never refer to a table entry.
    Reserved,
    /// No handle is open under this id.
    NotOpen,
    /// All `MAX_FD` ids are in use.
    TableFull,
    /// The slot array could not grow.
    OutOfMemory,
}

impl fmt::Display for FdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserved => write!(f, "reserved console descriptor"),
            Self::NotOpen => write!(f, "descriptor not open"),
            Self::TableFull => write!(f, "descriptor table full"),
            Self::OutOfMemory => write!(f, "out of memory for descriptor slot"),
        }
    }
}

/// Failed allocation; the handle is returned so the caller can close it.
#[derive(Debug)]
pub struct FdAllocError<H> {
    pub error: FdError,
    pub handle: H,
}

/// Open-file table of one process.
#[derive(Debug)]
pub struct FdTable<H> {
    /// Slot `i` holds the handle for id `i`; slots 0 and 1 stay empty.
    slots: Vec<Option<H>>,
}

impl<H> FdTable<H> {
    /// Create a table with only the console ids.
    pub fn new() -> Self {
        let mut slots = Vec::new();
        slots.resize_with(FIRST_FILE_FD, || None);
        Self { slots }
    }

    /// Number of ids the table currently spans (console ids included).
    #[inline]
    pub fn span(&self) -> usize {
        self.slots.len()
    }

    /// Number of open handles.
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Find the lowest free id that `open` may use.
    pub fn find_free(&self) -> Option<Fd> {
        self.slots
            .iter()
            .enumerate()
            .skip(FIRST_FILE_FD)
            .find(|(_, slot)| slot.is_none())
            .map(|(i, _)| Fd(i as u32))
    }

    /// Store a handle under the lowest free id >= 2.
    ///
    /// Grows the table by one slot when every existing slot is taken.
    pub fn allocate(&mut self, handle: H) -> Result<Fd, FdAllocError<H>> {
        if let Some(fd) = self.find_free() {
            self.slots[fd.index()] = Some(handle);
            return Ok(fd);
        }

        if self.slots.len() >= MAX_FD {
            return Err(FdAllocError {
                error: FdError::TableFull,
                handle,
            });
        }
        if self.slots.try_reserve(1).is_err() {
            return Err(FdAllocError {
                error: FdError::OutOfMemory,
                handle,
            });
        }

        let fd = Fd(self.slots.len() as u32);
        self.slots.push(Some(handle));
        Ok(fd)
    }

    /// Look up a handle.
    ///
    /// Returns the handle if the id is a file id within bounds and open.
    #[inline]
    pub fn lookup(&self, fd: Fd) -> Result<&H, FdError> {
        if fd.is_console() {
            return Err(FdError::Reserved);
        }
        self.slots
            .get(fd.index())
            .and_then(Option::as_ref)
            .ok_or(FdError::NotOpen)
    }

    /// Look up a handle for mutation (cursor moves, I/O).
    #[inline]
    pub fn lookup_mut(&mut self, fd: Fd) -> Result<&mut H, FdError> {
        if fd.is_console() {
            return Err(FdError::Reserved);
        }
        self.slots
            .get_mut(fd.index())
            .and_then(Option::as_mut)
            .ok_or(FdError::NotOpen)
    }

    /// Shorthand for [`lookup`](Self::lookup) as an `Option`.
    #[inline]
    pub fn get(&self, fd: Fd) -> Option<&H> {
        self.lookup(fd).ok()
    }

    /// Shorthand for [`lookup_mut`](Self::lookup_mut) as an `Option`.
    #[inline]
    pub fn get_mut(&mut self, fd: Fd) -> Option<&mut H> {
        self.lookup_mut(fd).ok()
    }

    /// Remove a handle from its slot without closing it.
    pub fn take(&mut self, fd: Fd) -> Result<H, FdError> {
        if fd.is_console() {
            return Err(FdError::Reserved);
        }
        self.slots
            .get_mut(fd.index())
            .and_then(Option::take)
            .ok_or(FdError::NotOpen)
    }

    /// Iterate over open descriptors.
    pub fn iter(&self) -> impl Iterator<Item = (Fd, &H)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|h| (Fd(i as u32), h)))
    }
}

impl<H> FdTable<H> {
    /// Close the handle under `fd` and free the slot for reuse.
    pub fn release<F>(&mut self, fd: Fd, fs: &mut F) -> Result<(), FdError>
    where
        F: FileSystem<File = H> + ?Sized,
    {
        let handle = self.take(fd)?;
        fs.close(handle);
        log::debug!("fd {} released", fd);
        Ok(())
    }

    /// Close every open handle. Returns how many were closed.
    pub fn drain<F>(&mut self, fs: &mut F) -> usize
    where
        F: FileSystem<File = H> + ?Sized,
    {
        let mut closed = 0;
        for slot in self.slots.iter_mut() {
            if let Some(handle) = slot.take() {
                fs.close(handle);
                closed += 1;
            }
        }
        closed
    }
}

impl<H> Default for FdTable<H> {
    fn default() -> Self {
        Self::new()
    }
}
