//! The recognised-shell record and the prompt-cursor position, updated
//! solely by the OSC handler and the cursor-movement callback.

use crate::colour::Colour;
use crate::grid::Pos;

/// Sentinel meaning "no prompt seen yet".
pub const SENTINEL: Pos = Pos { row: usize::MAX, col: usize::MAX };

/// `{row, col}` with the sentinel `(-1,-1)` from spec.md represented as
/// [`SENTINEL`] since grid positions are unsigned here.
pub type PromptCursor = Pos;

pub fn is_sentinel(pos: Pos) -> bool {
    pos == SENTINEL
}

#[derive(Debug, Clone, Default)]
pub struct ShellState {
    pub tty: String,
    pub pid: String,
    pub session_id: String,
    pub hostname: String,
    pub shell_name: String,
    pub cwd: String,
    pub in_ssh: bool,
    pub in_docker: bool,
    pub in_prompt: bool,
    pub preexec: bool,
    pub fish_suggestion_colour: Option<Colour>,
    pub fish_suggestion_colour_text: Option<String>,
    pub seen_first_prompt: bool,
}

impl ShellState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gating logic from `figterm_can_send_buffer`: only bash/fish, or zsh
    /// under ssh/docker, with no insertion lock and not mid-command.
    pub fn can_send_buffer(&self, insertion_locked: bool) -> bool {
        let in_ssh_or_docker = self.in_ssh || self.in_docker;
        let shell_enabled = self.shell_name == "bash"
            || self.shell_name == "fish"
            || (in_ssh_or_docker && self.shell_name == "zsh");
        shell_enabled && !insertion_locked && !self.preexec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bash_is_always_enabled() {
        let mut s = ShellState::new();
        s.shell_name = "bash".into();
        assert!(s.can_send_buffer(false));
    }

    #[test]
    fn zsh_requires_ssh_or_docker() {
        let mut s = ShellState::new();
        s.shell_name = "zsh".into();
        assert!(!s.can_send_buffer(false));
        s.in_ssh = true;
        assert!(s.can_send_buffer(false));
    }

    #[test]
    fn preexec_mutes_sending() {
        let mut s = ShellState::new();
        s.shell_name = "bash".into();
        s.preexec = true;
        assert!(!s.can_send_buffer(false));
    }

    #[test]
    fn insertion_lock_mutes_sending() {
        let mut s = ShellState::new();
        s.shell_name = "fish".into();
        assert!(!s.can_send_buffer(true));
    }
}
