//! Multiplexed readiness wait over a batch of device handles.

use std::{io, os::fd::RawFd, time::Duration};

/// Readiness flags as reported in `revents`.
pub use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL};

/// One monitored handle. A negative `fd` marks an empty slot that the kernel
/// skips; it always reports no events.
pub type PollSlot = libc::pollfd;

/// Builds a slot armed for readability.
pub fn readable_slot(fd: RawFd) -> PollSlot {
    PollSlot {
        fd,
        events: POLLIN,
        revents: 0,
    }
}

/// A slot for a handle that could not be opened this cycle.
pub fn empty_slot() -> PollSlot {
    PollSlot {
        fd: -1,
        events: 0,
        revents: 0,
    }
}

/// Blocks until at least one slot is ready or the timeout elapses.
///
/// Returns the number of slots with non-zero `revents`; zero means the
/// timeout elapsed.
pub trait Multiplexer {
    fn wait(&mut self, slots: &mut [PollSlot], timeout: Duration) -> io::Result<usize>;
}

/// `poll(2)` backed multiplexer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPoll;

impl Multiplexer for SystemPoll {
    fn wait(&mut self, slots: &mut [PollSlot], timeout: Duration) -> io::Result<usize> {
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        // SAFETY: `slots` is a valid, exclusively borrowed array of pollfd for
        // the duration of the call.
        let ret =
            unsafe { libc::poll(slots.as_mut_ptr(), slots.len() as libc::nfds_t, timeout_ms) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ret as usize)
    }
}

/// Blocks SIGINT and SIGTERM for the calling thread.
///
/// The acquisition thread calls this before polling so termination signals
/// are delivered to the runtime's handlers and never interrupt a wait.
pub fn block_termination_signals() -> io::Result<()> {
    // SAFETY: `set` is initialised by `sigemptyset` before use and both
    // pointers passed to `pthread_sigmask` are valid for the call.
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGINT);
        libc::sigaddset(&mut set, libc::SIGTERM);
        match libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut()) {
            0 => Ok(()),
            errno => Err(io::Error::from_raw_os_error(errno)),
        }
    }
}
