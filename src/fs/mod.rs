//! Filesystem Interface and Access Lock
//!
//! The syscall layer does not implement a filesystem. It calls into one
//! through [`FileSystem`], and only while holding the single kernel-wide
//! filesystem lock.
//!
//! # Design
//! - The filesystem value lives inside [`Filesys`]'s spinlock
//! - [`FsGuard`] is the only way to reach it, so no filesystem call can
//!   run unlocked
//! - File handles are plain values owned by descriptor tables; operating
//!   on one needs `&mut F`, which again needs the guard
//! - The guard releases on drop, so every early return unlocks

pub mod memfs;

use core::ops::{Deref, DerefMut};

use spin::{Mutex, MutexGuard};

/// Filesystem operations consumed by the syscall layer.
///
/// Every method runs with the filesystem lock held.
pub trait FileSystem {
    /// An open file: cursor plus reference to the underlying inode.
    type File;

    /// Create `name` with `initial_size` zero bytes. False if it exists
    /// or cannot be created.
    fn create(&mut self, name: &str, initial_size: u32) -> bool;

    /// Remove `name`. Open handles to it stay usable.
    fn remove(&mut self, name: &str) -> bool;

    /// Open `name`, positioned at offset 0.
    fn open(&mut self, name: &str) -> Option<Self::File>;

    /// Read at the cursor, advancing it. Returns bytes read.
    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> usize;

    /// Write at the cursor, advancing it. Returns bytes written.
    fn write(&mut self, file: &mut Self::File, buf: &[u8]) -> usize;

    /// File size in bytes.
    fn length(&self, file: &Self::File) -> u32;

    /// Move the cursor. Positions past the end are allowed.
    fn seek(&mut self, file: &mut Self::File, position: u32);

    /// Current cursor position.
    fn tell(&self, file: &Self::File) -> u32;

    /// Close the handle, releasing whatever it holds.
    fn close(&mut self, file: Self::File);
}

/// The kernel's filesystem, behind its access lock.
///
/// A kernel owns exactly one of these (typically in a `static`); all
/// processes share it.
pub struct Filesys<F> {
    inner: Mutex<F>,
}

impl<F> Filesys<F> {
    /// Wrap a mounted filesystem.
    pub const fn new(fs: F) -> Self {
        Self {
            inner: Mutex::new(fs),
        }
    }

    /// Acquire the filesystem lock, spinning while another thread holds it.
    pub fn lock(&self) -> FsGuard<'_, F> {
        FsGuard {
            guard: self.inner.lock(),
        }
    }

    /// Acquire the lock only if it is free.
    pub fn try_lock(&self) -> Option<FsGuard<'_, F>> {
        self.inner.try_lock().map(|guard| FsGuard { guard })
    }

    /// Whether some thread currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Unwrap the filesystem (unmount).
    pub fn into_inner(self) -> F {
        self.inner.into_inner()
    }
}

/// Scoped filesystem access.
///
/// Holding an `FsGuard` is holding the filesystem lock; dropping it
/// releases the lock.
pub struct FsGuard<'a, F> {
    guard: MutexGuard<'a, F>,
}

impl<F> Deref for FsGuard<'_, F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.guard
    }
}

impl<F> DerefMut for FsGuard<'_, F> {
    fn deref_mut(&mut self) -> &mut F {
        &mut self.guard
    }
}
