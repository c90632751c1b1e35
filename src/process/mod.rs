//! User Processes as Seen by the Syscall Layer
//!
//! The loader and scheduler are collaborators reached through
//! [`ProcessControl`]. What the syscall layer owns per process is small:
//! its name, its address space, its descriptor table, and the exit
//! status record shared with a waiting parent.

pub mod exit;

use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;

use spin::Once;

use crate::fd::FdTable;
use crate::fs::FileSystem;

pub use exit::terminate;

/// Longest process name kept (bytes), as printed in the exit line.
pub const NAME_MAX: usize = 15;

/// Process identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct Pid(i32);

impl Pid {
    /// Wrap a raw identifier.
    #[inline]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Value returned to user space.
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process management services provided by the rest of the kernel.
pub trait ProcessControl: Sync {
    /// Load and start `cmdline`. Returns the new pid once the child has
    /// loaded, or `None` if loading failed.
    fn execute(&self, cmdline: &str) -> Option<Pid>;

    /// Block until child `pid` exits and return its status; -1 if `pid`
    /// is not a child or was already waited for.
    fn wait(&self, pid: Pid) -> i32;

    /// End the calling thread of control.
    fn thread_exit(&self) -> !;

    /// Power the machine off.
    fn power_off(&self) -> !;
}

/// Exit status shared between a process and the parent waiting on it.
///
/// The status is published once; a reader observes either nothing or the
/// complete value.
pub struct ExitStatus {
    code: Once<i32>,
}

impl ExitStatus {
    /// Create an unrecorded status.
    pub const fn new() -> Self {
        Self { code: Once::new() }
    }

    /// Record `code`. Returns false (and leaves the first value) if a
    /// status was already recorded.
    pub fn record(&self, code: i32) -> bool {
        let mut recorded = false;
        self.code.call_once(|| {
            recorded = true;
            code
        });
        recorded
    }

    /// The status, if recorded.
    pub fn get(&self) -> Option<i32> {
        self.code.get().copied()
    }

    /// Spin until the status is recorded, then return it.
    pub fn wait(&self) -> i32 {
        *self.code.wait()
    }
}

impl Default for ExitStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExitStatus").field("code", &self.get()).finish()
    }
}

/// Take the program name out of a command line: first word, truncated
/// to `NAME_MAX` bytes on a character boundary.
pub fn program_name(cmdline: &str) -> &str {
    let word = cmdline.split_whitespace().next().unwrap_or("");
    if word.len() <= NAME_MAX {
        return word;
    }
    let mut end = NAME_MAX;
    while !word.is_char_boundary(end) {
        end -= 1;
    }
    &word[..end]
}

/// Per-process state the syscall layer works with.
pub struct Process<A, H> {
    pid: Pid,
    name: String,
    space: A,
    files: FdTable<H>,
    wait_status: Option<Arc<ExitStatus>>,
}

impl<A, H> Process<A, H> {
    /// Create a process running `cmdline` in address space `space`.
    pub fn new(pid: Pid, cmdline: &str, space: A) -> Self {
        Self {
            pid,
            name: String::from(program_name(cmdline)),
            space,
            files: FdTable::new(),
            wait_status: None,
        }
    }

    /// Attach the status record a parent will wait on.
    pub fn with_wait_status(mut self, status: Arc<ExitStatus>) -> Self {
        self.wait_status = Some(status);
        self
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn space(&self) -> &A {
        &self.space
    }

    pub fn space_mut(&mut self) -> &mut A {
        &mut self.space
    }

    pub fn files(&self) -> &FdTable<H> {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FdTable<H> {
        &mut self.files
    }

    pub fn wait_status(&self) -> Option<&Arc<ExitStatus>> {
        self.wait_status.as_ref()
    }

    /// Borrow the address space and the descriptor table at once.
    pub fn split(&mut self) -> (&A, &mut FdTable<H>) {
        (&self.space, &mut self.files)
    }

    /// Close every open descriptor (process teardown). The caller holds
    /// the filesystem lock.
    pub fn close_all<F>(&mut self, fs: &mut F) -> usize
    where
        F: FileSystem<File = H> + ?Sized,
    {
        let closed = self.files.drain(fs);
        if closed > 0 {
            log::debug!("pid {}: closed {} descriptors at exit", self.pid, closed);
        }
        closed
    }
}

impl<A, H> fmt::Debug for Process<A, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("open_files", &self.files.open_count())
            .finish()
    }
}
