//! Terminal line discipline modes
//!
//! Wraps the termios calls the device needs: capturing a snapshot of the
//! current settings, switching to raw mode, restoring a snapshot, and
//! adjusting the VMIN/VTIME buffering parameters.

use nix::sys::termios::{self, LocalFlags, SetArg, SpecialCharacterIndices, Termios};
use std::fmt;
use std::os::fd::{AsFd, BorrowedFd};

/// Opaque capture of every line discipline setting needed to restore a terminal.
///
/// Holds the plain `libc::termios` rather than nix's `Termios`, which is not
/// `Sync`, so a device holding a snapshot can be shared across threads.
#[derive(Clone, Copy)]
pub struct ModeSnapshot {
    termios: libc::termios,
}

impl ModeSnapshot {
    /// Capture the current settings of the terminal behind `fd`.
    pub fn capture<Fd: AsFd>(fd: Fd) -> nix::Result<Self> {
        Ok(Self {
            termios: libc::termios::from(termios::tcgetattr(fd)?),
        })
    }

    /// Apply this snapshot to `fd` immediately.
    pub(crate) fn restore(&self, fd: BorrowedFd<'_>) -> nix::Result<()> {
        termios::tcsetattr(fd, SetArg::TCSANOW, &Termios::from(self.termios))
    }

    /// True when canonical processing, echo and signal characters are all off.
    pub fn is_raw(&self) -> bool {
        !self
            .local_flags()
            .intersects(LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::ISIG)
    }

    /// Minimum number of characters a non-canonical read waits for (VMIN).
    pub fn min_chars(&self) -> u8 {
        self.termios.c_cc[SpecialCharacterIndices::VMIN as usize] as u8
    }

    /// Inter-byte timeout of a non-canonical read in tenths of a second (VTIME).
    pub fn min_wait(&self) -> u8 {
        self.termios.c_cc[SpecialCharacterIndices::VTIME as usize] as u8
    }

    fn local_flags(&self) -> LocalFlags {
        LocalFlags::from_bits_truncate(self.termios.c_lflag)
    }
}

impl fmt::Debug for ModeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeSnapshot")
            .field("raw", &self.is_raw())
            .field("local_flags", &self.local_flags())
            .field("vmin", &self.min_chars())
            .field("vtime", &self.min_wait())
            .finish()
    }
}

impl PartialEq for ModeSnapshot {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (&self.termios, &other.termios);
        a.c_iflag == b.c_iflag
            && a.c_oflag == b.c_oflag
            && a.c_cflag == b.c_cflag
            && a.c_lflag == b.c_lflag
            && a.c_cc == b.c_cc
    }
}

impl Eq for ModeSnapshot {}

/// Check whether `fd` refers to an interactive terminal.
pub(crate) fn is_terminal(fd: BorrowedFd<'_>) -> bool {
    nix::unistd::isatty(fd).unwrap_or(false)
}

/// Switch `fd` to raw mode with blocking single-byte reads (VMIN=1, VTIME=0).
///
/// The raw settings are derived from the terminal's current settings, so this
/// also undoes any buffering parameters left behind by a previous drain.
pub(crate) fn enter_raw(fd: BorrowedFd<'_>) -> nix::Result<()> {
    let mut raw = termios::tcgetattr(fd)?;
    termios::cfmakeraw(&mut raw);
    raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    termios::tcsetattr(fd, SetArg::TCSANOW, &raw)
}

/// Set the minimum character count and minimum wait time of the line discipline.
///
/// Pending output is drained before the change takes effect.
pub(crate) fn set_buffering(fd: BorrowedFd<'_>, min_chars: u8, min_wait: u8) -> nix::Result<()> {
    let mut tio = termios::tcgetattr(fd)?;
    tio.control_chars[SpecialCharacterIndices::VMIN as usize] = min_chars as _;
    tio.control_chars[SpecialCharacterIndices::VTIME as usize] = min_wait as _;
    termios::tcsetattr(fd, SetArg::TCSADRAIN, &tio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::pty::openpty;

    #[test]
    fn test_raw_mode_round_trip() {
        let pty = openpty(None, None).unwrap();
        let fd = pty.slave.as_fd();

        let before = ModeSnapshot::capture(fd).unwrap();
        assert!(!before.is_raw(), "fresh pty should start in canonical mode");

        enter_raw(fd).unwrap();
        let raw = ModeSnapshot::capture(fd).unwrap();
        assert!(raw.is_raw());
        assert_eq!(raw.min_chars(), 1);
        assert_eq!(raw.min_wait(), 0);
        assert_ne!(raw, before);

        before.restore(fd).unwrap();
        assert_eq!(ModeSnapshot::capture(fd).unwrap(), before);
    }

    #[test]
    fn test_set_buffering_then_enter_raw_resets_blocking() {
        let pty = openpty(None, None).unwrap();
        let fd = pty.slave.as_fd();

        enter_raw(fd).unwrap();
        set_buffering(fd, 0, 0).unwrap();
        let drained = ModeSnapshot::capture(fd).unwrap();
        assert_eq!(drained.min_chars(), 0);
        assert_eq!(drained.min_wait(), 0);

        enter_raw(fd).unwrap();
        assert_eq!(ModeSnapshot::capture(fd).unwrap().min_chars(), 1);
    }

    #[test]
    fn test_is_terminal() {
        let pty = openpty(None, None).unwrap();
        assert!(is_terminal(pty.slave.as_fd()));

        let file = tempfile::tempfile().unwrap();
        assert!(!is_terminal(file.as_fd()));
    }

    #[test]
    fn test_capture_fails_on_regular_file() {
        let file = tempfile::tempfile().unwrap();
        assert!(ModeSnapshot::capture(&file).is_err());
    }
}
