//! System Call Handler
//!
//! Dispatches decoded system calls and implements the individual
//! syscall handlers.
//!
//! # Security Considerations
//! - Execution only ever sees arguments [`decode`] has validated
//! - A bad pointer or a console descriptor used the wrong way
//!   terminates the caller with -1
//! - Unknown syscall numbers return -1 and the process continues
//! - Filesystem calls run under the filesystem lock, taken right before
//!   the call and released on every path out

use core::str;

use super::decode::{decode, ReadSource, Syscall, WriteSink};
use super::validate::{UserBuffer, UserBufferMut};
use crate::drivers::console::Console;
use crate::fd::{Fd, FdAllocError, FdTable};
use crate::fs::{FileSystem, Filesys};
use crate::mm::{AddressSpace, UserAddr};
use crate::process::exit::{terminate, KILLED};
use crate::process::{Pid, Process, ProcessControl};
use crate::trap::TrapFrame;

/// What the trap entry must do once a syscall has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Resume the process; `eax` holds the result if there is one.
    Return,
    /// The process terminated with this status.
    Exit(i32),
    /// Power the machine off.
    Halt,
}

/// Result of running one syscall, before termination is applied.
enum Outcome {
    Return(i32),
    /// Resume without touching `eax`.
    Unchanged,
    Exit(i32),
    Halt,
}

/// The kernel services syscalls run against.
pub struct Kernel<'k, F, P, C: ?Sized> {
    fs: &'k Filesys<F>,
    procs: &'k P,
    console: &'k C,
}

impl<'k, F, P, C> Kernel<'k, F, P, C>
where
    F: FileSystem,
    P: ProcessControl,
    C: Console + ?Sized,
{
    pub fn new(fs: &'k Filesys<F>, procs: &'k P, console: &'k C) -> Self {
        Self { fs, procs, console }
    }

    pub fn fs(&self) -> &'k Filesys<F> {
        self.fs
    }

    pub fn procs(&self) -> &'k P {
        self.procs
    }

    pub fn console(&self) -> &'k C {
        self.console
    }

    /// Decode and run the syscall trapped in `frame` on behalf of `proc`.
    ///
    /// Results are stored in `frame.eax`. A returned
    /// [`Disposition::Exit`] means the exit line has been printed and the
    /// status published; closing descriptors and ending the thread is
    /// left to the trap entry.
    pub fn dispatch<A>(
        &self,
        frame: &mut TrapFrame,
        proc: &mut Process<A, F::File>,
    ) -> Disposition
    where
        A: AddressSpace,
    {
        let pid = proc.pid();
        let outcome = {
            let (space, files) = proc.split();
            match decode(space, UserAddr::new(frame.esp)) {
                Ok(call) => {
                    log::trace!("pid {}: {}", pid, call.name());
                    self.execute(pid, call, files)
                }
                Err(err) if err.is_fatal() => {
                    log::warn!("pid {}: killed, {}", pid, err);
                    Outcome::Exit(KILLED)
                }
                Err(err) => {
                    log::warn!("pid {}: {}", pid, err);
                    Outcome::Return(-1)
                }
            }
        };

        match outcome {
            Outcome::Return(value) => {
                frame.set_return(value);
                Disposition::Return
            }
            Outcome::Unchanged => Disposition::Return,
            Outcome::Exit(status) => terminate(self, proc, frame, status),
            Outcome::Halt => {
                log::info!("pid {}: halt", pid);
                Disposition::Halt
            }
        }
    }

    fn execute(&self, pid: Pid, call: Syscall<'_>, files: &mut FdTable<F::File>) -> Outcome {
        match call {
            Syscall::Halt => Outcome::Halt,
            Syscall::Exit { status } => Outcome::Exit(status),
            Syscall::Exec { cmdline } => Outcome::Return(self.sys_exec(&cmdline)),
            Syscall::Wait { pid: child } => Outcome::Return(self.procs.wait(Pid::new(child))),
            Syscall::Create { name, initial_size } => {
                Outcome::Return(self.sys_create(&name, initial_size))
            }
            Syscall::Remove { name } => Outcome::Return(self.sys_remove(&name)),
            Syscall::Open { name } => Outcome::Return(self.sys_open(pid, &name, files)),
            Syscall::Filesize { fd } => Outcome::Return(self.sys_filesize(fd, files)),
            Syscall::Read { source, buf } => Outcome::Return(self.sys_read(source, buf, files)),
            Syscall::Write { sink, buf } => Outcome::Return(self.sys_write(sink, buf, files)),
            Syscall::Seek { fd, position } => self.sys_seek(fd, position, files),
            Syscall::Tell { fd } => Outcome::Return(self.sys_tell(fd, files)),
            Syscall::Close { fd } => Outcome::Return(self.sys_close(fd, files)),
            Syscall::Null { value } => Outcome::Return(value.wrapping_add(1)),
        }
    }

    fn sys_exec(&self, cmdline: &[u8]) -> i32 {
        let Ok(cmdline) = str::from_utf8(cmdline) else {
            return -1;
        };
        match self.procs.execute(cmdline) {
            Some(child) => child.as_i32(),
            None => {
                log::debug!("exec {:?} failed", cmdline);
                -1
            }
        }
    }

    fn sys_create(&self, name: &[u8], initial_size: u32) -> i32 {
        let Ok(name) = str::from_utf8(name) else {
            return 0;
        };
        let mut fs = self.fs.lock();
        fs.create(name, initial_size) as i32
    }

    fn sys_remove(&self, name: &[u8]) -> i32 {
        let Ok(name) = str::from_utf8(name) else {
            return 0;
        };
        let mut fs = self.fs.lock();
        fs.remove(name) as i32
    }

    fn sys_open(&self, pid: Pid, name: &[u8], files: &mut FdTable<F::File>) -> i32 {
        let Ok(name) = str::from_utf8(name) else {
            return -1;
        };
        let mut fs = self.fs.lock();
        let Some(file) = fs.open(name) else {
            return -1;
        };
        match files.allocate(file) {
            Ok(fd) => {
                log::debug!("pid {}: opened {:?} as fd {}", pid, name, fd);
                fd.as_i32()
            }
            Err(FdAllocError { error, handle }) => {
                log::warn!("pid {}: open {:?}: {}", pid, name, error);
                fs.close(handle);
                -1
            }
        }
    }

    fn sys_filesize(&self, fd: Option<Fd>, files: &FdTable<F::File>) -> i32 {
        let fs = self.fs.lock();
        match fd.and_then(|fd| files.get(fd)) {
            Some(file) => fs.length(file) as i32,
            None => -1,
        }
    }

    fn sys_read(
        &self,
        source: ReadSource,
        mut buf: UserBufferMut<'_>,
        files: &mut FdTable<F::File>,
    ) -> i32 {
        log::trace!("read {:?}: {} bytes into {}", source, buf.len(), buf.addr());
        let mut fs = self.fs.lock();
        match source {
            ReadSource::Keyboard => {
                for chunk in buf.segments_mut() {
                    for byte in chunk.iter_mut() {
                        *byte = self.console.read_byte();
                    }
                }
                buf.len() as i32
            }
            ReadSource::File(fd) => {
                let Some(file) = files.get_mut(fd) else {
                    return -1;
                };
                let mut total = 0;
                for chunk in buf.segments_mut() {
                    let n = fs.read(file, chunk);
                    total += n;
                    if n < chunk.len() {
                        break;
                    }
                }
                total as i32
            }
        }
    }

    /// Console output holds the filesystem lock across every page of the
    /// buffer, so one `write(1, ...)` reaches the console unbroken.
    fn sys_write(&self, sink: WriteSink, buf: UserBuffer<'_>, files: &mut FdTable<F::File>) -> i32 {
        log::trace!("write {:?}: {} bytes from {}", sink, buf.len(), buf.addr());
        let mut fs = self.fs.lock();
        match sink {
            WriteSink::Console => {
                for chunk in buf.segments() {
                    self.console.write_bytes(chunk);
                }
                buf.len() as i32
            }
            WriteSink::File(fd) => {
                let Some(file) = files.get_mut(fd) else {
                    return -1;
                };
                let mut total = 0;
                for chunk in buf.segments() {
                    let n = fs.write(file, chunk);
                    total += n;
                    if n < chunk.len() {
                        break;
                    }
                }
                total as i32
            }
        }
    }

    fn sys_seek(&self, fd: Option<Fd>, position: u32, files: &mut FdTable<F::File>) -> Outcome {
        let mut fs = self.fs.lock();
        match fd.and_then(|fd| files.get_mut(fd)) {
            Some(file) => {
                fs.seek(file, position);
                Outcome::Unchanged
            }
            None => Outcome::Return(-1),
        }
    }

    fn sys_tell(&self, fd: Option<Fd>, files: &FdTable<F::File>) -> i32 {
        let fs = self.fs.lock();
        match fd.and_then(|fd| files.get(fd)) {
            Some(file) => fs.tell(file) as i32,
            None => -1,
        }
    }

    /// Returns 0 when a file was closed and -1 otherwise; `eax` is always
    /// written.
    fn sys_close(&self, fd: Option<Fd>, files: &mut FdTable<F::File>) -> i32 {
        let Some(fd) = fd else {
            return -1;
        };
        let mut fs = self.fs.lock();
        match files.release(fd, &mut *fs) {
            Ok(()) => 0,
            Err(_) => -1,
        }
    }
}
