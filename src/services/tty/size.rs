//! Window size query with environment and default fallbacks

use serde::{Deserialize, Serialize};
use std::os::fd::{AsRawFd, BorrowedFd};

use crate::config::TtyConfig;

/// Terminal geometry in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub cols: u16,
    pub rows: u16,
}

/// Ask the terminal driver for its geometry. Failures read as `(0, 0)`.
pub(crate) fn query_os(fd: BorrowedFd<'_>) -> (u16, u16) {
    let mut ws = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };

    // SAFETY: fd is a valid open descriptor for the duration of the call and
    // `ws` is a properly sized winsize that TIOCGWINSZ writes into.
    let rc = unsafe { libc::ioctl(fd.as_raw_fd(), libc::TIOCGWINSZ, &mut ws) };
    if rc == -1 {
        tracing::debug!(
            "TIOCGWINSZ failed: {}, falling back",
            std::io::Error::last_os_error()
        );
        return (0, 0);
    }

    (ws.ws_col, ws.ws_row)
}

/// Resolve the final geometry from the driver's answer.
///
/// Each zero dimension is replaced by `COLUMNS`/`LINES` (via `env`) when the
/// config allows it, then by the configured default.
pub fn resolve<F>(os: (u16, u16), config: &TtyConfig, env: F) -> WindowSize
where
    F: Fn(&str) -> Option<String>,
{
    let (mut cols, mut rows) = os;

    if config.respect_env_size {
        if cols == 0 {
            cols = env_dimension(env("COLUMNS")).unwrap_or(0);
        }
        if rows == 0 {
            rows = env_dimension(env("LINES")).unwrap_or(0);
        }
    }

    let fallback = config.default_size();
    if cols == 0 {
        cols = fallback.cols;
    }
    if rows == 0 {
        rows = fallback.rows;
    }

    WindowSize { cols, rows }
}

fn env_dimension(value: Option<String>) -> Option<u16> {
    value?.trim().parse::<u16>().ok().filter(|n| *n > 0)
}
