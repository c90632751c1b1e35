//! Process Termination
//!
//! Every syscall-triggered exit, whether the user asked for it or the
//! kernel refused a bad pointer, goes through [`terminate`].

use core::fmt::Write;

use super::{Process, ProcessControl};
use crate::drivers::console::{Console, ConsoleWriter};
use crate::fs::FileSystem;
use crate::syscall::{Disposition, Kernel};
use crate::trap::TrapFrame;

/// Status reported for processes killed by the kernel.
pub const KILLED: i32 = -1;

/// Terminate `proc` with `status`.
///
/// Publishes the status to a waiting parent, prints the exit line, and
/// leaves `status` in the frame's return register. The caller finishes
/// the job (closing descriptors, leaving the thread) when it sees the
/// returned [`Disposition::Exit`].
///
/// The exit line is written under the filesystem lock, the same lock
/// console `write` holds, so it never lands inside another process's
/// output. The caller must not hold that lock.
pub fn terminate<A, F, P, C>(
    kernel: &Kernel<'_, F, P, C>,
    proc: &Process<A, F::File>,
    frame: &mut TrapFrame,
    status: i32,
) -> Disposition
where
    F: FileSystem,
    P: ProcessControl,
    C: Console + ?Sized,
{
    if let Some(record) = proc.wait_status() {
        if !record.record(status) {
            log::warn!(
                "pid {}: exit({}) ignored, status already {:?}",
                proc.pid(),
                status,
                record.get()
            );
        }
    }

    {
        let _console = kernel.fs().lock();
        // The console never fails a write.
        let _ = writeln!(
            ConsoleWriter(kernel.console()),
            "{}: exit({})",
            proc.name(),
            status
        );
    }

    frame.set_return(status);
    log::info!("pid {} ({}) exited with {}", proc.pid(), proc.name(), status);
    Disposition::Exit(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ExitStatus;
    use crate::testutil::{self, Rig};
    use alloc::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_terminate_publishes_status() {
        let rig = Rig::new();
        let status = Arc::new(ExitStatus::new());
        let proc = testutil::process(3, "child arg").with_wait_status(Arc::clone(&status));
        let mut frame = TrapFrame::default();

        let d = terminate(&rig.kernel(), &proc, &mut frame, 42);

        assert_eq!(d, Disposition::Exit(42));
        assert_eq!(frame.eax, 42);
        assert_eq!(status.get(), Some(42));
        assert_eq!(rig.console.output_string(), "child: exit(42)\n");
        assert!(!rig.fs.is_locked());
    }

    #[test]
    fn test_first_status_wins() {
        let rig = Rig::new();
        let status = Arc::new(ExitStatus::new());
        let proc = testutil::process(4, "twice").with_wait_status(Arc::clone(&status));
        let mut frame = TrapFrame::default();

        terminate(&rig.kernel(), &proc, &mut frame, 1);
        terminate(&rig.kernel(), &proc, &mut frame, KILLED);
        assert_eq!(status.get(), Some(1));
    }

    #[test]
    fn test_orphan_still_prints() {
        let rig = Rig::new();
        let proc = testutil::process(5, "orphan");
        let mut frame = TrapFrame::default();

        terminate(&rig.kernel(), &proc, &mut frame, KILLED);
        assert_eq!(frame.return_value(), -1);
        assert_eq!(rig.console.output_string(), "orphan: exit(-1)\n");
    }

    #[test]
    fn test_exit_line_waits_for_console_writer() {
        let rig = Rig::new();
        let kernel = &rig.kernel();
        let proc = testutil::process(6, "late");

        thread::scope(|s| {
            let writer = rig.fs.lock();
            let exiting = s.spawn(move || {
                let mut frame = TrapFrame::default();
                terminate(kernel, &proc, &mut frame, 0)
            });
            thread::sleep(Duration::from_millis(20));
            assert!(rig.console.output().is_empty());
            rig.console.write_bytes(b"held ");
            drop(writer);
            assert_eq!(exiting.join().unwrap(), Disposition::Exit(0));
        });
        assert_eq!(rig.console.output_string(), "held late: exit(0)\n");
    }
}
