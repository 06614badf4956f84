//! Signal handling for the proxy loop.
//!
//! Per spec.md §9's design note: handlers do nothing but flip an atomic
//! flag, and the main loop reacts to the flag on its next iteration. This
//! keeps the handlers themselves async-signal-safe, which matters most for
//! `SIGABRT`/`SIGSEGV` arriving mid-syscall.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct Signals {
    winch: Arc<AtomicBool>,
    abrt: Arc<AtomicBool>,
    segv: Arc<AtomicBool>,
}

impl Signals {
    pub fn install() -> std::io::Result<Self> {
        let winch = Arc::new(AtomicBool::new(false));
        let abrt = Arc::new(AtomicBool::new(false));
        let segv = Arc::new(AtomicBool::new(false));

        signal_hook::flag::register(signal_hook::consts::SIGWINCH, Arc::clone(&winch))?;
        signal_hook::flag::register(signal_hook::consts::SIGABRT, Arc::clone(&abrt))?;
        signal_hook::flag::register(signal_hook::consts::SIGSEGV, Arc::clone(&segv))?;

        Ok(Signals { winch, abrt, segv })
    }

    /// Consume a pending `SIGWINCH`, if one arrived since the last check.
    pub fn take_winch(&self) -> bool {
        self.winch.swap(false, Ordering::Relaxed)
    }

    /// Whether a fatal signal landed. Once true this never clears; the
    /// caller is expected to tear down and fall back to a plain shell.
    pub fn crashed(&self) -> bool {
        self.abrt.load(Ordering::Relaxed) || self.segv.load(Ordering::Relaxed)
    }
}
