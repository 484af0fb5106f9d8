//! Input stream with read deadlines
//!
//! Files have no deadline support, so a read first polls the terminal
//! together with an internal wake socket. Setting a deadline writes to the
//! wake socket, which makes an in-flight read re-check the deadline and
//! return `TimedOut` once it has passed. The stream itself is never closed.

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

pub(crate) struct DeadlineInput {
    file: File,
    deadline: Mutex<Option<Instant>>,
    wake_rx: UnixStream,
    wake_tx: UnixStream,
}

enum Ready {
    Input,
    Wake,
    Timeout,
}

impl DeadlineInput {
    pub(crate) fn new(file: File) -> io::Result<Self> {
        let (wake_rx, wake_tx) = UnixStream::pair()?;
        wake_rx.set_nonblocking(true)?;
        wake_tx.set_nonblocking(true)?;
        Ok(Self {
            file,
            deadline: Mutex::new(None),
            wake_rx,
            wake_tx,
        })
    }

    /// Set or clear the read deadline. A deadline wakes any blocked read.
    pub(crate) fn set_deadline(&self, deadline: Option<Instant>) {
        let mut guard = self.deadline.lock();
        *guard = deadline;
        if deadline.is_some() {
            match (&self.wake_tx).write(&[1]) {
                Ok(_) => {}
                // A queued wake byte is already enough.
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => tracing::warn!("Failed to wake pending read: {}", e),
            }
        } else {
            self.clear_wakes();
        }
    }

    /// Read available bytes, failing with `TimedOut` once the deadline passes.
    pub(crate) fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let remaining = match *self.deadline.lock() {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline <= now {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "read deadline exceeded",
                        ));
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            match self.wait(remaining)? {
                Ready::Input => return (&self.file).read(buf),
                Ready::Wake => self.clear_wakes(),
                Ready::Timeout => {}
            }
        }
    }

    fn wait(&self, remaining: Option<Duration>) -> io::Result<Ready> {
        let timeout = match remaining {
            // Round up so a sub-millisecond remainder does not spin.
            Some(d) => PollTimeout::from((d.as_millis() + 1).min(u16::MAX as u128) as u16),
            None => PollTimeout::NONE,
        };

        let mut fds = [
            PollFd::new(self.wake_rx.as_fd(), PollFlags::POLLIN),
            PollFd::new(self.file.as_fd(), PollFlags::POLLIN),
        ];

        let ready = match poll(&mut fds, timeout) {
            Ok(n) => n,
            Err(Errno::EINTR) => return Ok(Ready::Wake),
            Err(e) => return Err(e.into()),
        };
        if ready == 0 {
            return Ok(Ready::Timeout);
        }

        if is_ready(fds[0].revents()) {
            return Ok(Ready::Wake);
        }
        if is_ready(fds[1].revents()) {
            return Ok(Ready::Input);
        }
        Ok(Ready::Timeout)
    }

    fn clear_wakes(&self) {
        let mut buf = [0u8; 16];
        loop {
            match (&self.wake_rx).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }
}

impl AsFd for DeadlineInput {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

/// Readable, hung up, or in error: any of these means a read will not block.
pub(crate) fn is_ready(revents: Option<PollFlags>) -> bool {
    revents.is_some_and(|r| {
        r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
    })
}
