//! Raw terminal device
//!
//! This module exposes a terminal as a raw byte stream for a rendering
//! layer, handling the parts that are easy to get wrong:
//! - switching between canonical and raw mode and restoring the original mode
//! - delivering window resize notifications from a background thread
//! - shutting that thread down while other threads read and write
//!
//! # Architecture
//!
//! - `device.rs` - `TerminalDevice`, the controller
//! - `mode.rs` - termios snapshots, raw mode, VMIN/VTIME
//! - `input.rs` - input stream with read deadlines
//! - `listener.rs` - resize listener thread and its shutdown signal
//! - `resize.rs` - resize notification sources (SIGWINCH, manual)
//! - `size.rs` - window size query and fallbacks

mod device;
mod input;
mod listener;
mod mode;
mod resize;
mod size;

use std::io;

use crate::config::ConfigError;

pub use device::TerminalDevice;
pub use listener::ResizeCallback;
pub use mode::ModeSnapshot;
pub use resize::{
    ManualNotifier, ResizeNotifier, ResizeSubscription, SigwinchNotifier, SubscriptionGuard,
};
pub use size::{resolve as resolve_window_size, WindowSize};

/// Errors from terminal device control operations.
///
/// Stream errors from `read`/`write` are returned as plain `io::Error`.
#[derive(Debug, thiserror::Error)]
pub enum TtyError {
    #[error("device is not a terminal")]
    NotATerminal,
    #[error("terminal mode change rejected: {0}")]
    ModeTransition(#[source] nix::Error),
    #[error("terminal device already started")]
    AlreadyStarted,
    #[error("terminal device is closed")]
    Closed,
    #[error("invalid terminal configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The operations a rendering layer needs from a terminal.
pub trait Tty: Send + Sync {
    /// Read available input bytes.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write bytes verbatim.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Enter raw mode and begin resize notification.
    fn start(&self) -> Result<(), TtyError>;

    /// Restore the original mode and end resize notification.
    fn stop(&self) -> Result<(), TtyError>;

    /// Abandon pending input without stopping.
    fn drain(&self) -> Result<(), TtyError>;

    /// Release remaining resources.
    fn close(&self) -> Result<(), TtyError>;

    /// Current geometry, with fallbacks; never fails.
    fn window_size(&self) -> WindowSize;

    /// Replace the resize callback; `None` disables it.
    fn notify_resize(&self, callback: Option<ResizeCallback>);
}
