//! Syscall Decoding
//!
//! Turns the words on a trapping process's stack into a [`Syscall`]. All
//! user memory a call will touch is validated here, so execution works
//! on typed arguments and never sees a raw user pointer.

use alloc::vec::Vec;
use core::fmt;

use super::validate::{self, UserBuffer, UserBufferMut, UserMemError};
use crate::config::limits::WORD_SIZE;
use crate::fd::Fd;
use crate::mm::{AddressSpace, UserAddr};

/// System call numbers
pub mod numbers {
    pub const SYS_HALT: u32 = 0;
    pub const SYS_EXIT: u32 = 1;
    pub const SYS_EXEC: u32 = 2;
    pub const SYS_WAIT: u32 = 3;
    pub const SYS_CREATE: u32 = 4;
    pub const SYS_REMOVE: u32 = 5;
    pub const SYS_OPEN: u32 = 6;
    pub const SYS_FILESIZE: u32 = 7;
    pub const SYS_READ: u32 = 8;
    pub const SYS_WRITE: u32 = 9;
    pub const SYS_SEEK: u32 = 10;
    pub const SYS_TELL: u32 = 11;
    pub const SYS_CLOSE: u32 = 12;
    pub const SYS_NULL: u32 = 13;
}

use numbers::*;

/// Where `read` takes its bytes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Keyboard,
    File(Fd),
}

/// Where `write` sends its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSink {
    Console,
    File(Fd),
}

/// A decoded system call.
///
/// Descriptor arguments of calls that tolerate bad descriptors are
/// `Option<Fd>`: `None` means the user passed an id outside the table's
/// range, which behaves like a closed descriptor.
#[derive(Debug)]
pub enum Syscall<'a> {
    Halt,
    Exit { status: i32 },
    Exec { cmdline: Vec<u8> },
    Wait { pid: i32 },
    Create { name: Vec<u8>, initial_size: u32 },
    Remove { name: Vec<u8> },
    Open { name: Vec<u8> },
    Filesize { fd: Option<Fd> },
    Read { source: ReadSource, buf: UserBufferMut<'a> },
    Write { sink: WriteSink, buf: UserBuffer<'a> },
    Seek { fd: Option<Fd>, position: u32 },
    Tell { fd: Option<Fd> },
    Close { fd: Option<Fd> },
    Null { value: i32 },
}

impl Syscall<'_> {
    /// Syscall name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Halt => "halt",
            Self::Exit { .. } => "exit",
            Self::Exec { .. } => "exec",
            Self::Wait { .. } => "wait",
            Self::Create { .. } => "create",
            Self::Remove { .. } => "remove",
            Self::Open { .. } => "open",
            Self::Filesize { .. } => "filesize",
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::Seek { .. } => "seek",
            Self::Tell { .. } => "tell",
            Self::Close { .. } => "close",
            Self::Null { .. } => "null",
        }
    }
}

/// Why a trap could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The stack, an argument, or pointed-to memory failed validation.
    BadAddress(UserMemError),
    /// `read`/`write` named an id outside the table or the wrong console
    /// direction.
    BadDescriptor(i32),
    /// The syscall number is not in the table.
    UnknownSyscall(u32),
}

impl DecodeError {
    /// Whether the process must be terminated for this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnknownSyscall(_))
    }
}

impl From<UserMemError> for DecodeError {
    fn from(err: UserMemError) -> Self {
        Self::BadAddress(err)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadAddress(e) => write!(f, "bad address: {}", e),
            Self::BadDescriptor(fd) => write!(f, "bad descriptor {} for console I/O", fd),
            Self::UnknownSyscall(nr) => write!(f, "unknown syscall {}", nr),
        }
    }
}

/// Reads syscall words off a user stack, validating each before use.
struct Args<'a, A: ?Sized> {
    space: &'a A,
    esp: UserAddr,
}

impl<'a, A: AddressSpace + ?Sized> Args<'a, A> {
    /// Word `k` of the frame: 0 is the syscall number, 1.. the arguments.
    fn word(&self, k: usize) -> Result<u32, UserMemError> {
        let addr = self
            .esp
            .checked_add(k * WORD_SIZE)
            .ok_or(UserMemError::Overflow)?;
        validate::read_user_word(self.space, addr)
    }

    fn int(&self, k: usize) -> Result<i32, UserMemError> {
        self.word(k).map(|w| w as i32)
    }

    fn ptr(&self, k: usize) -> Result<UserAddr, UserMemError> {
        self.word(k).map(UserAddr::new)
    }

    fn string(&self, k: usize) -> Result<Vec<u8>, UserMemError> {
        validate::read_user_string(self.space, self.ptr(k)?)
    }

    fn fd(&self, k: usize) -> Result<Option<Fd>, UserMemError> {
        self.word(k).map(Fd::from_word)
    }

    fn buffer(&self, k: usize) -> Result<UserBuffer<'a>, UserMemError> {
        let addr = self.ptr(k)?;
        let len = self.word(k + 1)? as usize;
        UserBuffer::new(self.space, addr, len)
    }

    fn buffer_mut(&self, k: usize) -> Result<UserBufferMut<'a>, UserMemError> {
        let addr = self.ptr(k)?;
        let len = self.word(k + 1)? as usize;
        UserBufferMut::new(self.space, addr, len)
    }
}

/// Decode the syscall whose frame starts at user address `esp`.
pub fn decode<A>(space: &A, esp: UserAddr) -> Result<Syscall<'_>, DecodeError>
where
    A: AddressSpace + ?Sized,
{
    let args = Args { space, esp };
    let nr = args.word(0)?;

    let call = match nr {
        SYS_HALT => Syscall::Halt,
        SYS_EXIT => Syscall::Exit {
            status: args.int(1)?,
        },
        SYS_EXEC => Syscall::Exec {
            cmdline: args.string(1)?,
        },
        SYS_WAIT => Syscall::Wait { pid: args.int(1)? },
        SYS_CREATE => Syscall::Create {
            name: args.string(1)?,
            initial_size: args.word(2)?,
        },
        SYS_REMOVE => Syscall::Remove {
            name: args.string(1)?,
        },
        SYS_OPEN => Syscall::Open {
            name: args.string(1)?,
        },
        SYS_FILESIZE => Syscall::Filesize { fd: args.fd(1)? },
        SYS_READ => {
            let raw = args.int(1)?;
            let source = match Fd::new(raw) {
                Some(Fd::STDIN) => ReadSource::Keyboard,
                Some(fd) if fd != Fd::STDOUT => ReadSource::File(fd),
                _ => return Err(DecodeError::BadDescriptor(raw)),
            };
            Syscall::Read {
                source,
                buf: args.buffer_mut(2)?,
            }
        }
        SYS_WRITE => {
            let raw = args.int(1)?;
            let sink = match Fd::new(raw) {
                Some(Fd::STDOUT) => WriteSink::Console,
                Some(fd) if fd != Fd::STDIN => WriteSink::File(fd),
                _ => return Err(DecodeError::BadDescriptor(raw)),
            };
            Syscall::Write {
                sink,
                buf: args.buffer(2)?,
            }
        }
        SYS_SEEK => Syscall::Seek {
            fd: args.fd(1)?,
            position: args.word(2)?,
        },
        SYS_TELL => Syscall::Tell { fd: args.fd(1)? },
        SYS_CLOSE => Syscall::Close { fd: args.fd(1)? },
        SYS_NULL => Syscall::Null { value: args.int(1)? },
        _ => return Err(DecodeError::UnknownSyscall(nr)),
    };
    Ok(call)
}
