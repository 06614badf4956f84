//! The three AF_UNIX sockets: two outbound (reconnect-on-failure, shared
//! shape) and one inbound insertion listener.

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;

use thiserror::Error;

use crate::framing::{frame_hook_payload, frame_legacy_command};
use crate::hooks::HookEnvelope;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode hook payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// An outbound socket that connects lazily and drops its cached
/// connection on any write failure so the next send reconnects, per
/// spec.md §4.4/§4.5 (broken-pipe recovery, never fatal to the loop).
struct ReconnectingSocket {
    path: PathBuf,
    stream: Option<UnixStream>,
}

impl ReconnectingSocket {
    fn new(path: PathBuf) -> Self {
        ReconnectingSocket { path, stream: None }
    }

    fn send(&mut self, bytes: &[u8]) {
        if self.stream.is_none() {
            self.stream = UnixStream::connect(&self.path).ok().and_then(|s| {
                s.set_nonblocking(true).ok()?;
                Some(s)
            });
        }
        let Some(stream) = self.stream.as_mut() else {
            tracing::debug!(path = %self.path.display(), "socket unavailable; dropping send");
            return;
        };
        if let Err(e) = stream.write_all(bytes) {
            tracing::warn!(path = %self.path.display(), error = %e, "socket send failed; will reconnect");
            self.stream = None;
        }
    }
}

/// Outbound JSON hook channel at `$TMPDIR/fig.socket`.
pub struct HookSocket(ReconnectingSocket);

impl HookSocket {
    pub fn new(path: PathBuf) -> Self {
        HookSocket(ReconnectingSocket::new(path))
    }

    pub fn send_hook(&mut self, envelope: &HookEnvelope) -> Result<(), IpcError> {
        let payload = serde_json::to_vec(envelope)?;
        self.0.send(&frame_hook_payload(&payload));
        Ok(())
    }
}

/// Outbound legacy base64-framed channel at `/tmp/fig.socket`.
pub struct LegacySocket(ReconnectingSocket);

impl LegacySocket {
    pub fn new(path: PathBuf) -> Self {
        LegacySocket(ReconnectingSocket::new(path))
    }

    pub fn send_command(&mut self, command: &str) {
        self.0.send(&frame_legacy_command(command));
    }
}

/// Inbound text-insertion listener. Accepts at most one client at a
/// time; a read from the client is forwarded verbatim into the PTY and
/// the client is then closed.
pub struct InsertionListener {
    listener: UnixListener,
    path: PathBuf,
    client: Option<UnixStream>,
}

impl InsertionListener {
    pub fn bind(path: PathBuf) -> io::Result<Self> {
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        listener.set_nonblocking(true)?;
        Ok(InsertionListener { listener, path, client: None })
    }

    pub fn listener_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    /// Accept a pending connection, replacing any previously accepted
    /// (but not yet read) client.
    pub fn accept(&mut self) -> io::Result<()> {
        let (stream, _) = self.listener.accept()?;
        stream.set_nonblocking(true)?;
        self.client = Some(stream);
        Ok(())
    }

    pub fn client_fd(&self) -> Option<RawFd> {
        self.client.as_ref().map(|c| c.as_raw_fd())
    }

    /// Read whatever is available from the accepted client, then close
    /// it. Returns `None` if there is no client.
    pub fn read_and_close(&mut self) -> Option<io::Result<Vec<u8>>> {
        let mut client = self.client.take()?;
        let mut buf = Vec::new();
        let result = match client.read_to_end(&mut buf) {
            Ok(_) => Ok(buf),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(buf),
            Err(e) => Err(e),
        };
        Some(result)
    }
}

impl Drop for InsertionListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{HookContext, HookKind};

    #[test]
    fn insertion_listener_round_trip() {
        let path = std::env::temp_dir().join(format!("figterm-ipc-test-{}.socket", std::process::id()));
        let mut listener = InsertionListener::bind(path.clone()).unwrap();

        let mut client = UnixStream::connect(&path).unwrap();
        client.write_all(b"ls\n").unwrap();
        drop(client);

        std::thread::sleep(std::time::Duration::from_millis(20));
        listener.accept().unwrap();
        let bytes = listener.read_and_close().unwrap().unwrap();
        assert_eq!(bytes, b"ls\n");
        assert!(listener.client_fd().is_none());
    }

    #[test]
    fn insertion_listener_unlinks_socket_on_drop() {
        let path = std::env::temp_dir().join(format!("figterm-ipc-test2-{}.socket", std::process::id()));
        {
            let _listener = InsertionListener::bind(path.clone()).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn hook_socket_send_does_not_panic_without_listener() {
        let mut socket = HookSocket::new(std::env::temp_dir().join("figterm-ipc-nobody.socket"));
        let context = HookContext {
            session_id: "s".into(),
            pid: "1".into(),
            hostname: "h".into(),
            ttys: "t".into(),
            integration_version: "9".into(),
        };
        socket.send_hook(&HookEnvelope::new(HookKind::Prompt { context })).unwrap();
    }
}
