//! Background resize listener
//!
//! One thread per start/stop cycle. It blocks in `poll` on the resize
//! subscription and a one-shot shutdown socket. Shutdown is checked first on
//! every wake, and once seen the thread exits without invoking the callback.

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use parking_lot::Mutex;
use std::io;
use std::net::Shutdown;
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::input::is_ready;
use super::resize::ResizeReceiver;

/// Callback invoked after each window size change.
pub type ResizeCallback = Arc<dyn Fn() + Send + Sync>;

/// The single callback slot shared by the device and its listener.
pub(crate) type CallbackSlot = Arc<Mutex<Option<ResizeCallback>>>;

/// Firing half of the one-shot shutdown broadcast.
pub(crate) struct ShutdownSignal {
    sender: Option<UnixStream>,
}

impl ShutdownSignal {
    /// Broadcast shutdown by closing the socket. Later calls do nothing.
    pub(crate) fn fire(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for ShutdownSignal {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Observing half; becomes readable (EOF) once the signal fires.
pub(crate) struct ShutdownListener {
    receiver: UnixStream,
}

pub(crate) fn shutdown_pair() -> io::Result<(ShutdownSignal, ShutdownListener)> {
    let (sender, receiver) = UnixStream::pair()?;
    Ok((
        ShutdownSignal {
            sender: Some(sender),
        },
        ShutdownListener { receiver },
    ))
}

#[derive(Debug, PartialEq, Eq)]
enum Wake {
    Shutdown,
    Resize,
}

pub(crate) fn spawn(
    resize: ResizeReceiver,
    shutdown: ShutdownListener,
    callback: CallbackSlot,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("tty-resize".to_string())
        .spawn(move || run(resize, shutdown, callback))
}

fn run(mut resize: ResizeReceiver, shutdown: ShutdownListener, callback: CallbackSlot) {
    tracing::debug!("Resize listener started");
    let mut subscribed = true;

    loop {
        match wait(&resize, subscribed, &shutdown) {
            Ok(Wake::Shutdown) => break,
            Ok(Wake::Resize) => {
                let drained = resize.drain();
                if drained.closed {
                    // The notifier went away; keep waiting for shutdown only.
                    tracing::debug!("Resize subscription closed");
                    subscribed = false;
                }
                if drained.pending == 0 {
                    continue;
                }

                tracing::trace!("Window resize ({} notifications)", drained.pending);
                let current = callback.lock().clone();
                if let Some(cb) = current {
                    cb();
                }
            }
            Err(e) => {
                tracing::warn!("Resize listener poll failed: {}", e);
                break;
            }
        }
    }

    tracing::debug!("Resize listener exiting");
}

fn wait(
    resize: &ResizeReceiver,
    subscribed: bool,
    shutdown: &ShutdownListener,
) -> nix::Result<Wake> {
    loop {
        let mut fds = vec![PollFd::new(shutdown.receiver.as_fd(), PollFlags::POLLIN)];
        if subscribed {
            fds.push(PollFd::new(resize.as_fd(), PollFlags::POLLIN));
        }

        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }

        if is_ready(fds[0].revents()) {
            return Ok(Wake::Shutdown);
        }
        if fds.get(1).is_some_and(|fd| is_ready(fd.revents())) {
            return Ok(Wake::Resize);
        }
    }
}
