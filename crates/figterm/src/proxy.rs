//! The PTY proxy loop: fan-in from {real stdin, the insertion-request
//! listener, an accepted insertion client} to the PTY, and fan-out from
//! the PTY to {the shadow screen model, real stdout}, per spec.md §4.4.
//! Grounded on the poll-based loop structure in
//! `other_examples/.../pty-proxy/src/main.rs` (fd set, 100ms timeout,
//! EINTR retry), rewritten against this workspace's `rustix`/`signal-hook`
//! stack instead of `nix`.

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::PathBuf;

use rustix::event::{poll, PollFd, PollFlags};

use ipc::{HookContext, HookEnvelope, HookKind, HookSocket, InsertionListener, LegacySocket};
use pty::Pty;
use terminal::{Screen, ScreenEvent};

use crate::env;
use crate::signals::Signals;
use crate::tty;
use crate::LogReloadHandle;

/// Per-session facts threaded into every published hook.
pub struct ProxyContext {
    pub session_id: String,
    pub integration_version: String,
    pub pid: String,
    pub hostname: String,
    pub tty_name: String,
    pub term_bundle: String,
    pub history_path: PathBuf,
}

pub struct ProxyLoop {
    pty: Pty,
    screen: Screen,
    hook_socket: HookSocket,
    legacy_socket: LegacySocket,
    insertion: InsertionListener,
    signals: Signals,
    context: ProxyContext,
    sent_init: bool,
    sent_start_text: bool,
    start_text: Option<String>,
    log_reload: LogReloadHandle,
}

impl ProxyLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pty: Pty,
        screen: Screen,
        hook_socket: HookSocket,
        legacy_socket: LegacySocket,
        insertion: InsertionListener,
        signals: Signals,
        context: ProxyContext,
        start_text: Option<String>,
        log_reload: LogReloadHandle,
    ) -> Self {
        ProxyLoop {
            pty,
            screen,
            hook_socket,
            legacy_socket,
            insertion,
            signals,
            context,
            sent_init: false,
            sent_start_text: false,
            start_text,
            log_reload,
        }
    }

    fn hook_context(&self) -> HookContext {
        HookContext {
            session_id: self.context.session_id.clone(),
            pid: self.context.pid.clone(),
            hostname: self.context.hostname.clone(),
            ttys: self.context.tty_name.clone(),
            integration_version: self.context.integration_version.clone(),
        }
    }

    fn publish(&mut self, kind: HookKind) {
        if let Err(e) = self.hook_socket.send_hook(&HookEnvelope::new(kind)) {
            tracing::warn!(error = %e, "failed to encode hook payload");
        }
    }

    fn send_init_once(&mut self) {
        if self.sent_init {
            return;
        }
        self.sent_init = true;
        self.publish(HookKind::Init { context: self.hook_context(), bundle: self.context.term_bundle.clone() });
    }

    /// Run until the child exits, stdin hits EOF, or a fatal signal lands.
    pub fn run(&mut self) -> io::Result<()> {
        self.send_init_once();

        let stdin = io::stdin();
        let stdin_fd = stdin.as_raw_fd();
        let mut stdout = io::stdout();
        let mut read_buf = [0u8; 4096];

        loop {
            if self.pty.try_wait().is_some() {
                self.drain_remaining_pty_output(&mut stdout)?;
                return Ok(());
            }

            if self.signals.crashed() {
                return Err(io::Error::other("child terminated by a fatal signal"));
            }

            if self.signals.take_winch() {
                self.handle_resize()?;
            }

            let pty_fd = self.pty.as_raw_fd();
            let listener_fd = self.insertion.listener_fd();
            let client_fd = self.insertion.client_fd();

            let stdin_pollfd = unsafe { BorrowedFd::borrow_raw(stdin_fd) };
            let pty_pollfd = unsafe { BorrowedFd::borrow_raw(pty_fd) };
            let listener_pollfd = unsafe { BorrowedFd::borrow_raw(listener_fd) };
            let client_pollfd = client_fd.map(|fd| unsafe { BorrowedFd::borrow_raw(fd) });

            let mut fds = vec![
                PollFd::new(&stdin_pollfd, PollFlags::IN),
                PollFd::new(&pty_pollfd, PollFlags::IN),
                PollFd::new(&listener_pollfd, PollFlags::IN),
            ];
            if let Some(ref fd) = client_pollfd {
                fds.push(PollFd::new(fd, PollFlags::IN));
            }

            match poll(&mut fds, 100) {
                Ok(_) => {}
                Err(e) if e == rustix::io::Errno::INTR => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e.raw_os_error())),
            }

            if fds[0].revents().contains(PollFlags::IN) {
                let n = stdin.lock().read(&mut read_buf)?;
                if n == 0 {
                    return Ok(());
                }
                self.forward_to_pty(&read_buf[..n])?;
            }

            if fds[1].revents().intersects(PollFlags::IN | PollFlags::HUP) {
                let n = self.pty.read(&mut read_buf).map_err(io::Error::other)?;
                if n > 0 {
                    self.handle_pty_output(&read_buf[..n], &mut stdout)?;
                }
            }

            if fds[2].revents().contains(PollFlags::IN) {
                let _ = self.insertion.accept();
            }

            if fds.len() > 3 && fds[3].revents().intersects(PollFlags::IN | PollFlags::HUP) {
                if let Some(Ok(bytes)) = self.insertion.read_and_close() {
                    if !bytes.is_empty() {
                        self.forward_to_pty(&bytes)?;
                    }
                }
            }
        }
    }

    fn forward_to_pty(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut offset = 0;
        while offset < bytes.len() {
            match self.pty.write(&bytes[offset..]).map_err(io::Error::other)? {
                0 => break,
                n => offset += n,
            }
        }
        Ok(())
    }

    /// The shadow grid must see shell output before it reaches the real
    /// terminal, so extraction stays in sync with what the user sees.
    fn handle_pty_output(&mut self, bytes: &[u8], stdout: &mut impl Write) -> io::Result<()> {
        let events = self.screen.feed(bytes);
        stdout.write_all(bytes)?;
        stdout.flush()?;

        let had_prompt = events.iter().any(|e| matches!(e, ScreenEvent::Prompt));

        for event in events {
            match event {
                ScreenEvent::Prompt => self.publish(HookKind::Prompt { context: self.hook_context() }),
                ScreenEvent::PreExec => {
                    self.legacy_socket
                        .send_command(&format!("fig bg:exec {} {}", self.context.pid, self.context.tty_name));
                    self.publish(HookKind::PreExec { context: self.hook_context() });
                }
                ScreenEvent::HistoryFlush(entry) => {
                    if let Err(e) = terminal::history::write_history_entry(&self.context.history_path, &entry) {
                        tracing::warn!(error = %e, "failed to append history entry");
                    }
                }
                ScreenEvent::Dir(path) => {
                    if self.screen.shell_state.in_ssh {
                        tracing::debug!(%path, "ignoring Dir= under ssh");
                    } else if let Err(e) = rustix::process::chdir(&path) {
                        tracing::warn!(error = %e, %path, "chdir to shell cwd failed");
                    }
                }
                ScreenEvent::ResyncCwd => self.resync_cwd(),
                ScreenEvent::LogLevel(level) => {
                    let directive = env::log_level_directive(&level);
                    if let Err(e) = self.log_reload.reload(tracing_subscriber::EnvFilter::new(directive)) {
                        tracing::warn!(error = %e, %level, "failed to reconfigure log level");
                    }
                }
            }
        }

        if had_prompt && !self.sent_start_text {
            self.sent_start_text = true;
            if let Some(text) = self.start_text.take() {
                self.forward_to_pty(format!("{text}\n").as_bytes())?;
            }
        }

        if let Some((text, cursor)) = self.screen.edit_buffer() {
            self.publish(HookKind::EditBuffer { text, cursor, context: self.hook_context() });
        }

        Ok(())
    }

    /// Re-derives the figterm process's cwd from the shell child's actual
    /// cwd via `/proc/<pid>/cwd`, catching `cd`s from scripts that never
    /// emit `Dir=` (spec.md §4.2's cursor-move hook).
    fn resync_cwd(&mut self) {
        let proc_cwd = PathBuf::from(format!("/proc/{}/cwd", self.pty.child_pid()));
        let cwd = match std::fs::read_link(&proc_cwd) {
            Ok(cwd) => cwd,
            Err(e) => {
                tracing::debug!(error = %e, "failed to read shell cwd");
                return;
            }
        };
        if let Err(e) = rustix::process::chdir(&cwd) {
            tracing::warn!(error = %e, cwd = %cwd.display(), "chdir to resynced shell cwd failed");
            return;
        }
        self.screen.shell_state.cwd = cwd.to_string_lossy().into_owned();
    }

    fn handle_resize(&mut self) -> io::Result<()> {
        use std::os::fd::AsFd;
        let stdin = io::stdin();
        let ws = tty::winsize(stdin.as_fd()).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))?;
        self.pty.resize(ws.ws_col, ws.ws_row).map_err(io::Error::other)?;
        self.screen.resize(ws.ws_row as usize, ws.ws_col as usize);
        Ok(())
    }

    fn drain_remaining_pty_output(&mut self, stdout: &mut impl Write) -> io::Result<()> {
        let mut buf = [0u8; 4096];
        loop {
            match self.pty.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => {
                    let _ = self.screen.feed(&buf[..n]);
                    stdout.write_all(&buf[..n])?;
                }
                Err(_) => return Ok(()),
            }
        }
    }
}
