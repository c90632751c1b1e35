//! Syscall Trap Entry
//!
//! The interrupt stub saves the user's registers into a [`TrapFrame`] and
//! calls [`syscall_handler`] for every `int $0x30`.
//!
//! # Calling Convention
//! - `esp` points at the syscall number; argument *k* is the word at
//!   `esp + 4k`
//! - The result goes back in `eax`
//!
//! # Security Considerations
//! - The frame's `esp` is user-controlled and validated like any pointer
//! - Frames arriving on any other vector are refused
//! - A process leaving through this path has its descriptors closed
//!   before its thread ends

use crate::config::SYSCALL_VECTOR;
use crate::drivers::console::Console;
use crate::fs::FileSystem;
use crate::mm::AddressSpace;
use crate::process::{Process, ProcessControl};
use crate::syscall::{Disposition, Kernel};

/// Register state saved by the interrupt stub, in push order.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    /// Kernel esp pushed by `pusha`; ignored.
    pub esp_dummy: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    /// Syscall result.
    pub eax: u32,
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
    /// Interrupt vector number.
    pub vec_no: u32,
    /// Error code pushed by the CPU or the stub (0 for software traps).
    pub error_code: u32,
    pub frame_pointer: u32,
    /// Interrupted user instruction.
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    /// User stack pointer at the trap.
    pub esp: u32,
    pub ss: u32,
}

impl TrapFrame {
    /// Frame for a syscall trap taken with user stack pointer `esp`.
    pub fn syscall(esp: u32) -> Self {
        Self {
            vec_no: SYSCALL_VECTOR,
            esp,
            ..Self::default()
        }
    }

    /// Store a syscall result in `eax`.
    #[inline]
    pub fn set_return(&mut self, value: i32) {
        self.eax = value as u32;
    }

    /// The value in `eax`, as user space will see it.
    #[inline]
    pub fn return_value(&self) -> i32 {
        self.eax as i32
    }
}

/// Handle one syscall trap for `proc`.
///
/// Returns normally when the process should resume. Exiting processes
/// have their descriptors closed and never come back; a halt powers the
/// machine off.
pub fn syscall_handler<A, F, P, C>(
    kernel: &Kernel<'_, F, P, C>,
    frame: &mut TrapFrame,
    proc: &mut Process<A, F::File>,
) where
    A: AddressSpace,
    F: FileSystem,
    P: ProcessControl,
    C: Console + ?Sized,
{
    if frame.vec_no != SYSCALL_VECTOR {
        log::error!(
            "syscall handler entered for vector {:#x}, eip {:#010x}",
            frame.vec_no,
            frame.eip
        );
        return;
    }

    match kernel.dispatch(frame, proc) {
        Disposition::Return => {}
        Disposition::Exit(_) => {
            proc.close_all(&mut *kernel.fs().lock());
            kernel.procs().thread_exit()
        }
        Disposition::Halt => kernel.procs().power_off(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::decode::numbers::*;
    use crate::testutil::{self, Rig};
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_syscall_frame() {
        let mut frame = TrapFrame::syscall(0xbfff_ff00);
        assert_eq!(frame.vec_no, 0x30);
        frame.set_return(-1);
        assert_eq!(frame.eax, u32::MAX);
        assert_eq!(frame.return_value(), -1);
    }

    #[test]
    fn test_wrong_vector_refused() {
        let rig = Rig::new();
        let mut proc = testutil::process(1, "p");
        let esp = testutil::stage_call(proc.space_mut(), &[SYS_NULL, 1]);
        let mut frame = TrapFrame::syscall(esp);
        frame.vec_no = 0x0e;
        frame.eax = 7;

        syscall_handler(&rig.kernel(), &mut frame, &mut proc);
        assert_eq!(frame.eax, 7);
    }

    #[test]
    fn test_return_resumes_process() {
        let rig = Rig::new();
        let mut proc = testutil::process(1, "p");
        let esp = testutil::stage_call(proc.space_mut(), &[SYS_NULL, 41]);
        let mut frame = TrapFrame::syscall(esp);

        syscall_handler(&rig.kernel(), &mut frame, &mut proc);
        assert_eq!(frame.return_value(), 42);
    }

    #[test]
    fn test_exit_closes_files_then_leaves_thread() {
        let rig = Rig::new();
        rig.fs.lock().create("log", 0);
        let mut proc = testutil::process(1, "writer");
        let name = testutil::put_str(proc.space_mut(), "log");
        for _ in 0..3 {
            let (_, fd) = testutil::invoke(&rig.kernel(), &mut proc, &[SYS_OPEN, name]);
            assert!(fd >= 2);
        }
        assert_eq!(rig.fs.lock().open_handles(), 3);

        let esp = testutil::stage_call(proc.space_mut(), &[SYS_EXIT, 0]);
        let mut frame = TrapFrame::syscall(esp);
        let left = catch_unwind(AssertUnwindSafe(|| {
            syscall_handler(&rig.kernel(), &mut frame, &mut proc)
        }));

        let panic = left.unwrap_err();
        assert_eq!(panic.downcast_ref::<&str>(), Some(&"thread_exit"));
        assert_eq!(rig.fs.lock().open_handles(), 0);
        assert!(!rig.fs.is_locked());
        assert_eq!(proc.files().open_count(), 0);
        assert_eq!(rig.console.output_string(), "writer: exit(0)\n");
    }

    #[test]
    #[should_panic(expected = "power_off")]
    fn test_halt_powers_off() {
        let rig = Rig::new();
        let mut proc = testutil::process(1, "p");
        let esp = testutil::stage_call(proc.space_mut(), &[SYS_HALT]);
        let mut frame = TrapFrame::syscall(esp);
        syscall_handler(&rig.kernel(), &mut frame, &mut proc);
    }
}
