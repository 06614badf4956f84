//! History-file writer: appends command records to `~/.fig/history` in a
//! YAML-like text format, advisory-locked with `flock` so multiple
//! sessions can append concurrently. Ported from `history.c`.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::fd::AsRawFd;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub command: String,
    pub shell: String,
    pub session_id: String,
    pub cwd: String,
    pub time: u64,
    pub in_ssh: bool,
    pub in_docker: bool,
    pub hostname: String,
    pub exit_code: u32,
}

/// Ctrl-C exit status; entries with this code are discarded.
const EXIT_CODE_SIGINT: u32 = 130;

fn escape(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    for c in src.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}

/// Appends `entry` to the history file at `path`. No-op if the command was
/// interrupted with Ctrl-C (exit code 130).
pub fn write_history_entry(path: &Path, entry: &HistoryEntry) -> std::io::Result<()> {
    if entry.exit_code == EXIT_CODE_SIGINT {
        return Ok(());
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut record = format!(
        "\n- command: {}\n  exit_code: {}\n  shell: {}\n  session_id: {}\n  cwd: {}\n  time: {}",
        escape(&entry.command),
        entry.exit_code,
        entry.shell,
        entry.session_id,
        entry.cwd,
        entry.time,
    );

    if entry.in_ssh || entry.in_docker {
        if entry.in_docker {
            record.push_str("\n  docker: true");
        }
        if entry.in_ssh {
            record.push_str("\n  ssh: true");
        }
        record.push_str("\n  hostname: ");
        record.push_str(&entry.hostname);
    }

    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_EX);
    }
    let result = file.write_all(record.as_bytes());
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discards_ctrl_c_entries() {
        let dir = std::env::temp_dir().join(format!("figterm-history-test-{}", std::process::id()));
        let entry = HistoryEntry {
            command: "echo hi".into(),
            shell: "bash".into(),
            session_id: "s1".into(),
            cwd: "/tmp".into(),
            time: 0,
            in_ssh: false,
            in_docker: false,
            hostname: "host".into(),
            exit_code: 130,
        };
        write_history_entry(&dir, &entry).unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn writes_escaped_command() {
        let dir = std::env::temp_dir().join(format!("figterm-history-test2-{}", std::process::id()));
        let entry = HistoryEntry {
            command: "echo \"hi\"".into(),
            shell: "bash".into(),
            session_id: "s1".into(),
            cwd: "/tmp".into(),
            time: 42,
            in_ssh: false,
            in_docker: false,
            hostname: "host".into(),
            exit_code: 0,
        };
        write_history_entry(&dir, &entry).unwrap();
        let contents = std::fs::read_to_string(&dir).unwrap();
        assert!(contents.contains("command: echo \\\"hi\\\""));
        std::fs::remove_file(&dir).ok();
    }
}
