//! Shared test fixtures: a fake process manager, a small user address
//! space layout, and helpers for staging syscall frames.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicI32, Ordering};

use spin::Mutex;

use crate::config::regions::PHYS_BASE;
use crate::config::PAGE_SIZE;
use crate::drivers::console::{Console, MemConsole};
use crate::fs::memfs::MemFs;
use crate::fs::{FileSystem, Filesys};
use crate::mm::{PageDirectory, PageFlags, UserAddr};
use crate::process::{program_name, ExitStatus, Pid, Process, ProcessControl};
use crate::syscall::{Disposition, Kernel};
use crate::trap::TrapFrame;

/// User page holding staged strings and buffers. Its first word is the
/// allocation cursor used by [`put_bytes`].
pub const DATA: u32 = 0x0804_8000;
/// Writable page tests use as a `read` destination.
pub const SCRATCH: u32 = DATA + PAGE_SIZE as u32;
/// Read-only user page.
pub const RODATA: u32 = DATA + 2 * PAGE_SIZE as u32;
/// A user address with nothing mapped around it.
pub const UNMAPPED: u32 = 0x2000_0000;
/// Where syscall frames are staged.
pub const FRAME_ESP: u32 = PHYS_BASE - 0x100;
/// `eax` value before dispatch, to detect calls that leave it alone.
pub const UNCHANGED: i32 = 0x5a5a_5a5a;

const CURSOR_START: u32 = DATA + 16;

/// Address space with a stack page under `PHYS_BASE`, the `DATA` and
/// `SCRATCH` pages, and a read-only `RODATA` page.
pub fn user_space() -> PageDirectory {
    let mut pd = PageDirectory::new();
    pd.map(UserAddr::new(PHYS_BASE - PAGE_SIZE as u32), PageFlags::USER_RW)
        .unwrap();
    pd.map_range(UserAddr::new(DATA), 2 * PAGE_SIZE, PageFlags::USER_RW)
        .unwrap();
    pd.map(UserAddr::new(RODATA), PageFlags::USER_RO).unwrap();
    pd
}

/// A process running `cmdline` in a fresh [`user_space`].
pub fn process<H>(pid: i32, cmdline: &str) -> Process<PageDirectory, H> {
    Process::new(Pid::new(pid), cmdline, user_space())
}

/// Copy `bytes` into the `DATA` page and return their user address.
pub fn put_bytes(space: &mut PageDirectory, bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    space.copy_from_user(UserAddr::new(DATA), &mut word).unwrap();
    let at = match u32::from_le_bytes(word) {
        0 => CURSOR_START,
        cursor => cursor,
    };
    let next = at + bytes.len() as u32;
    assert!(next <= DATA + PAGE_SIZE as u32, "DATA page exhausted");
    space.copy_to_user(UserAddr::new(at), bytes).unwrap();
    space
        .copy_to_user(UserAddr::new(DATA), &next.to_le_bytes())
        .unwrap();
    at
}

/// Copy `s` plus a NUL terminator into the `DATA` page.
pub fn put_str(space: &mut PageDirectory, s: &str) -> u32 {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    put_bytes(space, &bytes)
}

/// Write a syscall number and its arguments at [`FRAME_ESP`] and return
/// the stack pointer the trap would carry.
pub fn stage_call(space: &mut PageDirectory, words: &[u32]) -> u32 {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    space.copy_to_user(UserAddr::new(FRAME_ESP), &bytes).unwrap();
    FRAME_ESP
}

/// Stage `words`, dispatch them for `proc`, and return the disposition
/// together with the final `eax`.
pub fn invoke<F, P, C>(
    kernel: &Kernel<'_, F, P, C>,
    proc: &mut Process<PageDirectory, F::File>,
    words: &[u32],
) -> (Disposition, i32)
where
    F: FileSystem,
    P: ProcessControl,
    C: Console + ?Sized,
{
    let esp = stage_call(proc.space_mut(), words);
    let mut frame = TrapFrame::syscall(esp);
    frame.set_return(UNCHANGED);
    let disposition = kernel.dispatch(&mut frame, proc);
    (disposition, frame.return_value())
}

/// Process manager double.
///
/// `execute` fails for programs whose name starts with "missing"; other
/// children exit with 0 at once. Leaving a thread or powering off panics
/// with "thread_exit" / "power_off" so tests can observe it.
pub struct FakeProcs {
    children: Mutex<BTreeMap<i32, Arc<ExitStatus>>>,
    next_pid: AtomicI32,
}

impl FakeProcs {
    pub fn new() -> Self {
        Self {
            children: Mutex::new(BTreeMap::new()),
            next_pid: AtomicI32::new(100),
        }
    }

    /// Register `pid` as a child whose exit is published through `status`.
    pub fn adopt(&self, pid: Pid, status: Arc<ExitStatus>) {
        self.children.lock().insert(pid.as_i32(), status);
    }
}

impl ProcessControl for FakeProcs {
    fn execute(&self, cmdline: &str) -> Option<Pid> {
        if program_name(cmdline).starts_with("missing") {
            return None;
        }
        let pid = Pid::new(self.next_pid.fetch_add(1, Ordering::SeqCst));
        let status = Arc::new(ExitStatus::new());
        status.record(0);
        self.adopt(pid, status);
        Some(pid)
    }

    fn wait(&self, pid: Pid) -> i32 {
        let child = self.children.lock().remove(&pid.as_i32());
        match child {
            Some(status) => status.wait(),
            None => -1,
        }
    }

    fn thread_exit(&self) -> ! {
        panic!("thread_exit")
    }

    fn power_off(&self) -> ! {
        panic!("power_off")
    }
}

/// A kernel's worth of collaborators.
pub struct Rig {
    pub fs: Filesys<MemFs>,
    pub procs: FakeProcs,
    pub console: MemConsole,
}

impl Rig {
    pub fn new() -> Self {
        Self {
            fs: Filesys::new(MemFs::new()),
            procs: FakeProcs::new(),
            console: MemConsole::new(),
        }
    }

    pub fn kernel(&self) -> Kernel<'_, MemFs, FakeProcs, MemConsole> {
        Kernel::new(&self.fs, &self.procs, &self.console)
    }
}
