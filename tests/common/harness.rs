//! Pseudo terminal harness for exercising `TerminalDevice`
//!
//! The device is built over the slave side of a fresh pty and a
//! `ManualNotifier`, so tests control both the bytes the device reads and the
//! resize notifications it sees, without touching the test runner's terminal.

use fresh_tty::{ManualNotifier, ModeSnapshot, ResizeCallback, TerminalDevice, TtyConfig};
use nix::pty::{openpty, Winsize};
use std::fs::File;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct PtyHarness {
    pub device: Arc<TerminalDevice>,
    pub notifier: ManualNotifier,
    /// Master side: bytes written here are read by the device.
    /// `None` after `hang_up`.
    master: Option<File>,
    /// Extra handle on the slave for inspecting its mode.
    probe: File,
}

impl PtyHarness {
    pub fn new() -> Self {
        Self::build(100, 30, TtyConfig::default(), None)
    }

    pub fn with_size(cols: u16, rows: u16) -> Self {
        Self::build(cols, rows, TtyConfig::default(), None)
    }

    pub fn with_config(config: TtyConfig) -> Self {
        Self::build(100, 30, config, None)
    }

    pub fn mirrored(mirror: SyncSender<Vec<u8>>) -> Self {
        Self::build(100, 30, TtyConfig::default(), Some(mirror))
    }

    pub fn build(
        cols: u16,
        rows: u16,
        config: TtyConfig,
        mirror: Option<SyncSender<Vec<u8>>>,
    ) -> Self {
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let pty = openpty(Some(&winsize), None).expect("openpty");

        let slave = File::from(pty.slave);
        let probe = slave.try_clone().expect("dup slave");
        let output = slave.try_clone().expect("dup slave");
        let notifier = ManualNotifier::new();

        let device = TerminalDevice::from_parts(
            slave,
            output,
            Arc::new(notifier.clone()),
            config,
            mirror,
        )
        .expect("pty slave is a terminal");

        Self {
            device: Arc::new(device),
            notifier,
            master: Some(File::from(pty.master)),
            probe,
        }
    }

    /// Current line discipline settings of the slave.
    pub fn mode(&self) -> ModeSnapshot {
        ModeSnapshot::capture(&self.probe).expect("tcgetattr")
    }

    /// Send bytes as if typed at the terminal.
    pub fn type_input(&mut self, bytes: &[u8]) {
        self.master_mut().write_all(bytes).expect("write to master");
    }

    /// Read whatever the device wrote to the terminal.
    pub fn read_output(&mut self, buf: &mut [u8]) -> usize {
        self.master_mut().read(buf).expect("read from master")
    }

    /// Close the master side. Mode changes on the slave then fail with EIO.
    pub fn hang_up(&mut self) {
        self.master = None;
    }

    fn master_mut(&mut self) -> &mut File {
        self.master.as_mut().expect("terminal was hung up")
    }

    /// Install a callback that counts invocations.
    pub fn counting_callback(&self) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        self.device.notify_resize(Some(counter(&count)));
        count
    }
}

/// A resize callback that increments `count`.
pub fn counter(count: &Arc<AtomicUsize>) -> ResizeCallback {
    let count = Arc::clone(count);
    Arc::new(move || {
        count.fetch_add(1, Ordering::SeqCst);
    })
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
