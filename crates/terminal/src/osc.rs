//! OSC 697 fragment assembly and directive parsing.
//!
//! The underlying `vte` parser already assembles a complete OSC string
//! before calling back, unlike the libvterm-based original which delivered
//! raw fragments with `initial`/`final` flags. [`OscAssembler`] reproduces
//! that fragment-accumulation behaviour as a standalone, independently
//! testable piece (see scenario S6 in spec.md §8); in production it is fed
//! the whole payload as a single initial-and-final fragment.

/// Bound from spec.md §9: drop assemblies that exceed this size rather than
/// growing without limit.
const MAX_OSC_PAYLOAD: usize = 8 * 1024;

#[derive(Default)]
pub struct OscAssembler {
    buffer: Vec<u8>,
    overflowed: bool,
}

impl OscAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment. Returns the assembled payload once a `final`
    /// fragment completes it (or `None` if oversized and dropped).
    pub fn feed(&mut self, fragment: &[u8], initial: bool, is_final: bool) -> Option<Vec<u8>> {
        if initial {
            self.buffer.clear();
            self.overflowed = false;
        }

        if self.buffer.len() + fragment.len() > MAX_OSC_PAYLOAD {
            self.overflowed = true;
        } else {
            self.buffer.extend_from_slice(fragment);
        }

        if is_final {
            let overflowed = self.overflowed;
            self.overflowed = false;
            let payload = std::mem::take(&mut self.buffer);
            if overflowed {
                None
            } else {
                Some(payload)
            }
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    NewCmd,
    StartPrompt,
    EndPrompt,
    PreExec,
    Dir(String),
    ExitCode(u32),
    Shell(String),
    FishSuggestionColor(String),
    Tty(String),
    Pid(String),
    SessionId(String),
    Hostname(String),
    Docker(bool),
    Ssh(bool),
    Log(String),
    /// Empty payload: explicit no-op.
    Noop,
    Unknown(String),
}

fn parse_bool_flag(value: &str) -> bool {
    value.trim() == "1"
}

/// Parse one assembled OSC 697 payload into a directive, per the table in
/// spec.md §4.2.
pub fn parse_directive(payload: &str) -> Directive {
    if payload.is_empty() {
        return Directive::Noop;
    }
    match payload {
        "NewCmd" => return Directive::NewCmd,
        "StartPrompt" => return Directive::StartPrompt,
        "EndPrompt" => return Directive::EndPrompt,
        "PreExec" => return Directive::PreExec,
        _ => {}
    }

    if let Some((key, value)) = payload.split_once('=') {
        return match key {
            "Dir" => Directive::Dir(value.to_string()),
            "ExitCode" => value
                .parse()
                .map(Directive::ExitCode)
                .unwrap_or_else(|_| Directive::Unknown(payload.to_string())),
            "Shell" => Directive::Shell(value.to_string()),
            "FishSuggestionColor" => Directive::FishSuggestionColor(value.to_string()),
            "TTY" => Directive::Tty(value.to_string()),
            "PID" => Directive::Pid(value.to_string()),
            "SessionId" => Directive::SessionId(value.to_string()),
            "Hostname" => Directive::Hostname(value.to_string()),
            "Docker" => Directive::Docker(parse_bool_flag(value)),
            "SSH" => Directive::Ssh(parse_bool_flag(value)),
            "Log" => Directive::Log(value.to_string()),
            _ => Directive::Unknown(payload.to_string()),
        };
    }

    Directive::Unknown(payload.to_string())
}
