//! Raw-mode handling for the real terminal: save the original termios on
//! entry, switch stdin to raw mode, and restore it unconditionally on
//! drop so a crash never leaves the user's terminal in a broken state.

use std::os::fd::{AsFd, BorrowedFd};

use rustix::termios::{isatty, tcgetattr, tcgetwinsize, tcsetattr, OptionalActions, Termios, Winsize};

pub fn stdin_is_tty() -> bool {
    isatty(std::io::stdin())
}

pub fn winsize(fd: BorrowedFd<'_>) -> rustix::io::Result<Winsize> {
    tcgetwinsize(fd)
}

/// Best-effort name of the real terminal device, used to fill the
/// `ttys` field of hook payloads.
pub fn tty_name() -> String {
    std::fs::read_link("/proc/self/fd/0")
        .ok()
        .and_then(|p| p.to_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Puts the real terminal into raw mode for the lifetime of this guard,
/// restoring the original settings on drop.
pub struct RawModeGuard {
    original: Termios,
}

impl RawModeGuard {
    pub fn enable() -> rustix::io::Result<Self> {
        let stdin = std::io::stdin();
        let original = tcgetattr(stdin.as_fd())?;
        let mut raw = original.clone();
        raw.make_raw();
        tcsetattr(stdin.as_fd(), OptionalActions::Flush, &raw)?;
        Ok(RawModeGuard { original })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let stdin = std::io::stdin();
        let _ = tcsetattr(stdin.as_fd(), OptionalActions::Flush, &self.original);
    }
}
