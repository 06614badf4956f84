//! PTY (pseudo-terminal) management.
//!
//! Opens a PTY master/slave pair, spawns a child attached to the slave as
//! its controlling terminal, and exposes non-blocking read/write on the
//! master plus window-size updates.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, FromRawFd, IntoRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};

use rustix::termios::{tcsetwinsize, Winsize};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("failed to open PTY: {0}")]
    Open(std::io::Error),

    #[error("failed to spawn child: {0}")]
    Spawn(std::io::Error),

    #[error("failed to set window size: {0}")]
    Winsize(rustix::io::Errno),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A PTY pair with a child process attached to the slave side.
pub struct Pty {
    master: File,
    child: Child,
    winsize: Winsize,
    exited: bool,
}

impl Pty {
    /// Open a PTY and spawn `program` with `args`, attached as its
    /// controlling terminal. `env` replaces the child's entire environment
    /// (the caller is responsible for building the environment it wants the
    /// child to see, per the shell-launch rules of the lifecycle
    /// controller).
    pub fn spawn(
        program: &str,
        args: &[String],
        env: &HashMap<String, String>,
        cols: u16,
        rows: u16,
    ) -> Result<Self, PtyError> {
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        let master_fd = rustix::pty::openpt(
            rustix::pty::OpenptFlags::RDWR | rustix::pty::OpenptFlags::NOCTTY,
        )
        .map_err(|e| PtyError::Open(std::io::Error::from_raw_os_error(e.raw_os_error())))?;

        rustix::pty::grantpt(&master_fd)
            .map_err(|e| PtyError::Open(std::io::Error::from_raw_os_error(e.raw_os_error())))?;
        rustix::pty::unlockpt(&master_fd)
            .map_err(|e| PtyError::Open(std::io::Error::from_raw_os_error(e.raw_os_error())))?;

        let slave_name_buf = [0u8; 256];
        let slave_name = rustix::pty::ptsname(&master_fd, slave_name_buf)
            .map_err(|e| PtyError::Open(std::io::Error::from_raw_os_error(e.raw_os_error())))?;
        let slave_path = slave_name.to_str().map_err(|_| {
            PtyError::Open(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "invalid PTY slave name",
            ))
        })?;

        tcsetwinsize(&master_fd, winsize).map_err(PtyError::Winsize)?;

        let slave = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(slave_path)
            .map_err(PtyError::Open)?;
        let slave_fd = slave.into_raw_fd();

        let slave_fd_out = unsafe { libc::dup(slave_fd) };
        let slave_fd_err = unsafe { libc::dup(slave_fd) };
        if slave_fd_out < 0 || slave_fd_err < 0 {
            unsafe {
                libc::close(slave_fd);
                if slave_fd_out >= 0 {
                    libc::close(slave_fd_out);
                }
            }
            return Err(PtyError::Open(std::io::Error::last_os_error()));
        }

        let child = unsafe {
            Command::new(program)
                .args(args)
                .env_clear()
                .envs(env.iter())
                .stdin(Stdio::from_raw_fd(slave_fd))
                .stdout(Stdio::from_raw_fd(slave_fd_out))
                .stderr(Stdio::from_raw_fd(slave_fd_err))
                .pre_exec(move || {
                    libc::setsid();
                    libc::ioctl(slave_fd, libc::TIOCSCTTY, 0);
                    Ok(())
                })
                .spawn()
                .map_err(PtyError::Spawn)?
        };

        let master = unsafe { File::from_raw_fd(master_fd.as_raw_fd()) };
        std::mem::forget(master_fd);

        Ok(Self {
            master,
            child,
            winsize,
            exited: false,
        })
    }

    /// Update the PTY's window size and notify the child with `SIGWINCH`.
    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        tcsetwinsize(self.master.as_fd(), self.winsize).map_err(PtyError::Winsize)?;
        unsafe {
            libc::kill(self.child.id() as i32, libc::SIGWINCH);
        }
        Ok(())
    }

    /// Read available data from the PTY master without blocking. Returns
    /// `Ok(0)` if nothing is currently available.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, PtyError> {
        let flags = rustix::fs::fcntl_getfl(self.master.as_fd())
            .map_err(|e| std::io::Error::from_raw_os_error(e.raw_os_error()))?;
        rustix::fs::fcntl_setfl(self.master.as_fd(), flags | rustix::fs::OFlags::NONBLOCK)
            .map_err(|e| std::io::Error::from_raw_os_error(e.raw_os_error()))?;

        let result = self.master.read(buf);

        rustix::fs::fcntl_setfl(self.master.as_fd(), flags)
            .map_err(|e| std::io::Error::from_raw_os_error(e.raw_os_error()))?;

        match result {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(PtyError::Io(e)),
        }
    }

    /// Write data to the PTY master without blocking. Returns the number
    /// of bytes actually written; the caller must buffer and retry any
    /// remainder.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, PtyError> {
        let flags = rustix::fs::fcntl_getfl(&self.master)
            .map_err(|e| std::io::Error::from_raw_os_error(e.raw_os_error()))?;
        rustix::fs::fcntl_setfl(&self.master, flags | rustix::fs::OFlags::NONBLOCK)
            .map_err(|e| std::io::Error::from_raw_os_error(e.raw_os_error()))?;

        let result = self.master.write(data);

        rustix::fs::fcntl_setfl(&self.master, flags)
            .map_err(|e| std::io::Error::from_raw_os_error(e.raw_os_error()))?;

        match result {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(PtyError::Io(e)),
        }
    }

    /// Raw fd of the PTY master, for use with a readiness primitive.
    pub fn as_raw_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }

    /// Non-blocking check of whether the child is still alive. Returns
    /// `false` (and caches the result) once the child has exited.
    pub fn try_wait(&mut self) -> Option<std::process::ExitStatus> {
        if self.exited {
            return None;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exited = true;
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("error checking child status: {e:?}");
                self.exited = true;
                None
            }
        }
    }

    pub fn winsize(&self) -> (u16, u16) {
        (self.winsize.ws_col, self.winsize.ws_row)
    }

    pub fn child_pid(&self) -> i32 {
        self.child.id() as i32
    }
}

impl Drop for Pty {
    fn drop(&mut self) {
        if self.exited {
            return;
        }

        let pid = self.child.id() as i32;
        unsafe {
            libc::kill(pid, libc::SIGHUP);
        }

        let start = std::time::Instant::now();
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => {
                    if start.elapsed() > std::time::Duration::from_millis(500) {
                        break;
                    }
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
                Err(_) => break,
            }
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_env() -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("TERM".to_string(), "xterm-256color".to_string());
        env
    }

    #[test]
    fn can_spawn_shell() {
        if std::env::var("CI").is_ok() {
            return;
        }
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        let pty = Pty::spawn(&shell, &[], &base_env(), 80, 24);
        assert!(pty.is_ok());
    }

    #[test]
    fn resize_updates_winsize() {
        if std::env::var("CI").is_ok() {
            return;
        }
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        let mut pty = Pty::spawn(&shell, &[], &base_env(), 80, 24).unwrap();

        let (cols, rows) = pty.winsize();
        assert_eq!(cols, 80);
        assert_eq!(rows, 24);

        pty.resize(100, 42).unwrap();

        let (cols, rows) = pty.winsize();
        assert_eq!(cols, 100);
        assert_eq!(rows, 42);
    }

    #[test]
    fn resize_updates_pty_size_immediately() {
        if std::env::var("CI").is_ok() {
            return;
        }
        let mut env = base_env();
        env.insert("PATH".to_string(), std::env::var("PATH").unwrap_or_default());

        let mut pty = Pty::spawn(
            "/bin/sh",
            &["-c".to_string(), "sleep 0.1 && stty size".to_string()],
            &env,
            100,
            42,
        )
        .unwrap();

        let mut output = String::new();
        let mut buf = [0u8; 256];
        std::thread::sleep(std::time::Duration::from_millis(300));

        loop {
            match pty.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    output.push_str(&String::from_utf8_lossy(&buf[..n]));
                    if output.contains('\n') {
                        break;
                    }
                }
                Err(_) => break,
            }
        }

        let parts: Vec<&str> = output.split_whitespace().collect();
        if parts.len() >= 2 {
            let rows: u16 = parts[0].parse().unwrap_or(0);
            let cols: u16 = parts[1].parse().unwrap_or(0);
            assert_eq!(rows, 42, "stty should report 42 rows, got {rows}");
            assert_eq!(cols, 100, "stty should report 100 cols, got {cols}");
        }
    }

    #[test]
    fn spawn_does_not_leak_unwanted_environment() {
        if std::env::var("CI").is_ok() {
            return;
        }
        std::env::set_var("PTY_TEST_VAR", "should_not_appear");

        let mut env = base_env();
        env.insert("PATH".to_string(), std::env::var("PATH").unwrap_or_default());

        let mut pty = Pty::spawn(
            "/bin/sh",
            &["-c".to_string(), "echo got=$PTY_TEST_VAR".to_string()],
            &env,
            80,
            24,
        )
        .unwrap();

        std::env::remove_var("PTY_TEST_VAR");

        let mut output = String::new();
        let mut buf = [0u8; 256];
        std::thread::sleep(std::time::Duration::from_millis(200));
        for _ in 0..10 {
            match pty.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    output.push_str(&String::from_utf8_lossy(&buf[..n]));
                    if output.contains("got=") {
                        break;
                    }
                }
                Err(_) => break,
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }

        assert!(output.contains("got=\n") || output.trim_end().ends_with("got="));
    }
}
