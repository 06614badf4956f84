//! Well-known socket paths, grounded in spec.md §4.5 / §6.

use std::path::PathBuf;

pub fn legacy_command_socket_path() -> PathBuf {
    PathBuf::from("/tmp/fig.socket")
}

/// `$TMPDIR/fig.socket`, falling back to the system temp directory.
pub fn json_hook_socket_path() -> PathBuf {
    let tmpdir = std::env::var("TMPDIR").map(PathBuf::from).unwrap_or_else(|_| std::env::temp_dir());
    tmpdir.join("fig.socket")
}

pub fn insertion_socket_path(session_id: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/figterm-{session_id}.socket"))
}

/// `~/.fig/insertion-lock`; presence mutes edit-buffer publication (spec.md
/// §6's file-system table, `fig_path("insertion-lock")` in the original).
pub fn insertion_lock_path() -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/tmp"));
    home.join(".fig").join("insertion-lock")
}
