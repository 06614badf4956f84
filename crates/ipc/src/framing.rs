//! Wire framing for the two outbound sockets: the JSON hook channel's
//! fixed prefix plus big-endian length, and the legacy channel's
//! base64-encoded newline-terminated line.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// `0x1B '@' 'f' 'i' 'g' '-' 'j' 's' 'o' 'n'`, 10 bytes.
pub const JSON_SOCKET_PREFIX: &[u8; 10] = b"\x1b@fig-json";

/// Prefix the payload with the literal marker and its big-endian length.
pub fn frame_hook_payload(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(JSON_SOCKET_PREFIX.len() + 8 + payload.len());
    framed.extend_from_slice(JSON_SOCKET_PREFIX);
    framed.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}

/// Base64-encode `command` and terminate it with a newline, matching the
/// legacy `/tmp/fig.socket` channel.
pub fn frame_legacy_command(command: &str) -> Vec<u8> {
    let mut line = STANDARD.encode(command);
    line.push('\n');
    line.into_bytes()
}
