//! Terminal device controller
//!
//! `TerminalDevice` owns a terminal's input and output descriptors, moves the
//! line discipline between its original mode and raw mode, and runs one
//! resize listener thread between `start` and `stop`.
//!
//! Locking:
//! - `state` serializes start, stop, drain and close.
//! - The callback slot has its own lock so a callback may call
//!   `notify_resize` or `stop` from the listener thread.
//! - `read` and `write` take neither lock.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::input::DeadlineInput;
use super::listener::{self, CallbackSlot, ResizeCallback, ShutdownSignal};
use super::mode::{self, ModeSnapshot};
use super::resize::{ResizeNotifier, SigwinchNotifier, SubscriptionGuard};
use super::size::{self, WindowSize};
use super::{Tty, TtyError};
use crate::config::TtyConfig;

/// Resources held only while the device is started.
struct Running {
    subscription: SubscriptionGuard,
    shutdown: ShutdownSignal,
    listener: JoinHandle<()>,
}

#[derive(Default)]
struct DeviceState {
    running: Option<Running>,
    closed: bool,
}

/// A terminal exposed as a raw byte stream with resize notification.
pub struct TerminalDevice {
    input: DeadlineInput,
    output: File,
    saved_mode: ModeSnapshot,
    callback: CallbackSlot,
    state: Mutex<DeviceState>,
    notifier: Arc<dyn ResizeNotifier>,
    mirror: Option<SyncSender<Vec<u8>>>,
    config: TtyConfig,
}

impl TerminalDevice {
    /// Open the process's stdin/stdout as a terminal device.
    pub fn open(config: TtyConfig) -> Result<Self, TtyError> {
        Self::open_stdio(config, None)
    }

    /// Like [`TerminalDevice::open`], also sending a copy of every byte read to `mirror`.
    pub fn open_mirrored(
        config: TtyConfig,
        mirror: SyncSender<Vec<u8>>,
    ) -> Result<Self, TtyError> {
        Self::open_stdio(config, Some(mirror))
    }

    /// Open the controlling terminal through `/dev/tty`, for hosts whose
    /// stdin or stdout is redirected.
    pub fn open_dev_tty(config: TtyConfig) -> Result<Self, TtyError> {
        let tty = OpenOptions::new().read(true).write(true).open("/dev/tty")?;
        let output = tty.try_clone()?;
        Self::from_parts(tty, output, Arc::new(SigwinchNotifier), config, None)
    }

    fn open_stdio(
        config: TtyConfig,
        mirror: Option<SyncSender<Vec<u8>>>,
    ) -> Result<Self, TtyError> {
        // Duplicates, so dropping the device never closes the real stdio.
        let input = File::from(io::stdin().as_fd().try_clone_to_owned()?);
        let output = File::from(io::stdout().as_fd().try_clone_to_owned()?);
        Self::from_parts(input, output, Arc::new(SigwinchNotifier), config, mirror)
    }

    /// Build a device over arbitrary descriptors.
    ///
    /// `input` must be a terminal; its current mode becomes the snapshot that
    /// `stop` restores. `config` is validated first.
    pub fn from_parts(
        input: File,
        output: File,
        notifier: Arc<dyn ResizeNotifier>,
        config: TtyConfig,
        mirror: Option<SyncSender<Vec<u8>>>,
    ) -> Result<Self, TtyError> {
        config.validate()?;
        if !mode::is_terminal(input.as_fd()) {
            return Err(TtyError::NotATerminal);
        }
        let saved_mode = ModeSnapshot::capture(&input).map_err(TtyError::ModeTransition)?;
        tracing::debug!(
            "Opened terminal device (mirror: {}, saved raw: {})",
            mirror.is_some(),
            saved_mode.is_raw()
        );

        Ok(Self {
            input: DeadlineInput::new(input)?,
            output,
            saved_mode,
            callback: Arc::new(Mutex::new(None)),
            state: Mutex::new(DeviceState::default()),
            notifier,
            mirror,
            config,
        })
    }

    /// Enter raw mode and start the resize listener.
    ///
    /// Fails with [`TtyError::AlreadyStarted`] rather than spawning a second
    /// listener.
    pub fn start(&self) -> Result<(), TtyError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TtyError::Closed);
        }
        if state.running.is_some() {
            return Err(TtyError::AlreadyStarted);
        }

        let fd = self.input.as_fd();
        if !mode::is_terminal(fd) {
            return Err(TtyError::NotATerminal);
        }

        self.input.set_deadline(None);
        mode::enter_raw(fd).map_err(TtyError::ModeTransition)?;

        match self.spawn_listener() {
            Ok(running) => {
                state.running = Some(running);
                tracing::debug!("Terminal device started");
                Ok(())
            }
            Err(e) => {
                if let Err(restore_err) = self.saved_mode.restore(fd) {
                    tracing::warn!(
                        "Failed to restore terminal after start error: {}",
                        restore_err
                    );
                }
                Err(e)
            }
        }
    }

    fn spawn_listener(&self) -> Result<Running, TtyError> {
        let (receiver, subscription) = self.notifier.subscribe()?.into_parts();
        let (shutdown, shutdown_listener) = listener::shutdown_pair()?;
        let listener = listener::spawn(receiver, shutdown_listener, Arc::clone(&self.callback))?;
        Ok(Running {
            subscription,
            shutdown,
            listener,
        })
    }

    /// Restore the saved mode, stop the listener and wait for it to exit.
    ///
    /// Stopping a device that is not started does nothing. If the restore is
    /// rejected the device stays started and the call may be retried.
    pub fn stop(&self) -> Result<(), TtyError> {
        let listener = {
            let mut state = self.state.lock();
            let Some(running) = state.running.take() else {
                return Ok(());
            };

            if let Err(e) = self.saved_mode.restore(self.input.as_fd()) {
                tracing::warn!("Failed to restore terminal mode, still raw: {}", e);
                state.running = Some(running);
                return Err(TtyError::ModeTransition(e));
            }

            self.shut_down(running)
        };

        join_listener(listener);
        tracing::debug!("Terminal device stopped");
        Ok(())
    }

    /// Wake readers, end resize delivery and signal the listener to exit.
    /// Called with the state lock held; the returned thread is joined after
    /// the lock is released.
    fn shut_down(&self, mut running: Running) -> JoinHandle<()> {
        self.input.set_deadline(Some(Instant::now()));
        running.subscription.cancel();
        running.shutdown.fire();
        running.listener
    }

    /// Abandon pending input: wake any blocked read and make further reads
    /// return immediately (VMIN=0, VTIME=0).
    pub fn drain(&self) -> Result<(), TtyError> {
        let _state = self.state.lock();
        self.input.set_deadline(Some(Instant::now()));
        mode::set_buffering(self.input.as_fd(), 0, 0).map_err(TtyError::ModeTransition)
    }

    /// Read available bytes; the same bytes are then sent to the mirror, if any.
    ///
    /// The mirror send blocks, so a slow mirror consumer paces input.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.input.read(buf)?;
        if n > 0 {
            if let Some(mirror) = &self.mirror {
                if mirror.send(buf[..n].to_vec()).is_err() {
                    tracing::warn!("Mirror receiver dropped, {} bytes not mirrored", n);
                }
            }
        }
        Ok(n)
    }

    /// Write bytes verbatim to the terminal.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        (&self.output).write(buf)
    }

    /// Current geometry; never fails.
    ///
    /// Zero dimensions fall back to `COLUMNS`/`LINES`, then to the configured
    /// default (80x25 unless overridden).
    pub fn window_size(&self) -> WindowSize {
        let os = size::query_os(self.input.as_fd());
        size::resolve(os, &self.config, |key| std::env::var(key).ok())
    }

    /// Replace the resize callback. `None` disables notification.
    pub fn notify_resize(&self, callback: Option<ResizeCallback>) {
        *self.callback.lock() = callback;
    }

    /// Release everything `stop` has not. Never fails; a failed implicit stop
    /// is only logged.
    ///
    /// If the mode cannot be restored the listener and subscription are still
    /// released, leaving the terminal in whatever mode it is in.
    pub fn close(&self) -> Result<(), TtyError> {
        let stop_failed = match self.stop() {
            Ok(()) => false,
            Err(e) => {
                tracing::warn!("Failed to stop terminal device on close: {}", e);
                true
            }
        };

        let listener = {
            let mut state = self.state.lock();
            let listener = if stop_failed {
                state.running.take().map(|running| self.shut_down(running))
            } else {
                None
            };
            if !state.closed {
                state.closed = true;
                tracing::debug!("Terminal device closed");
            }
            listener
        };

        if let Some(listener) = listener {
            join_listener(listener);
        }
        Ok(())
    }

    /// True between a successful `start` and `stop`.
    pub fn is_started(&self) -> bool {
        self.state.lock().running.is_some()
    }

    /// Mode captured when the device was opened.
    pub fn saved_mode(&self) -> &ModeSnapshot {
        &self.saved_mode
    }

    pub fn config(&self) -> &TtyConfig {
        &self.config
    }
}

/// Wait for the listener to exit, unless this is the listener thread itself
/// (a callback that stops or closes the device), which exits on its own once
/// the callback returns.
fn join_listener(listener: JoinHandle<()>) {
    if listener.thread().id() == thread::current().id() {
        tracing::debug!("Resize listener shut down from its own callback");
        return;
    }
    if listener.join().is_err() {
        tracing::warn!("Resize listener panicked");
    }
}

impl Drop for TerminalDevice {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl Tty for TerminalDevice {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        TerminalDevice::read(self, buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        TerminalDevice::write(self, buf)
    }

    fn start(&self) -> Result<(), TtyError> {
        TerminalDevice::start(self)
    }

    fn stop(&self) -> Result<(), TtyError> {
        TerminalDevice::stop(self)
    }

    fn drain(&self) -> Result<(), TtyError> {
        TerminalDevice::drain(self)
    }

    fn close(&self) -> Result<(), TtyError> {
        TerminalDevice::close(self)
    }

    fn window_size(&self) -> WindowSize {
        TerminalDevice::window_size(self)
    }

    fn notify_resize(&self, callback: Option<ResizeCallback>) {
        TerminalDevice::notify_resize(self, callback)
    }
}

impl Read for &TerminalDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        TerminalDevice::read(self, buf)
    }
}

impl Write for &TerminalDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        TerminalDevice::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&self.output).flush()
    }
}
