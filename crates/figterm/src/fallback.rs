//! Fallback path: if any lifecycle precondition fails, or the proxy loop
//! itself hits an unrecoverable error, hand control straight to the
//! user's shell instead of leaving them stranded without one.

use std::collections::HashMap;
use std::os::unix::process::CommandExt;
use std::process::Command;

/// Exec `shell` in place of the current process. Only returns (with the
/// `io::Error`) if the exec itself failed; on success this never returns.
pub fn fallback_exec(shell: &str, args: &[String], env: &HashMap<String, String>) -> std::io::Error {
    Command::new(shell).args(args).env_clear().envs(env.iter()).exec()
}
