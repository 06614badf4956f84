//! Environment parsing and the launch decision: which shell to exec, with
//! what arguments, and under which child environment. Ported from the
//! precondition checks and env cleanup in the original `figterm.c` `main`.

use std::collections::HashMap;

pub const FIGTERM_VERSION: &str = "3";

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub shell: String,
    pub login: bool,
    pub extra_args: Vec<String>,
    pub start_text: Option<String>,
    pub log_level: Option<String>,
    pub session_id: String,
    pub integration_version: String,
    pub tmux: bool,
}

#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum PreconditionError {
    #[error("TERM_SESSION_ID is not set")]
    MissingSessionId,
    #[error("FIG_INTEGRATION_VERSION is not set")]
    MissingIntegrationVersion,
    #[error("FIG_SHELL is not set")]
    MissingShell,
}

pub fn getenv(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_bool(value: &str) -> bool {
    value == "1"
}

/// Maps the FATAL/ERROR/WARN/INFO/DEBUG scale from spec.md §6 to a
/// `tracing_subscriber::EnvFilter` directive. `FATAL` has no tracing
/// equivalent, so it collapses to `error`, the closest level that still
/// prints.
pub fn log_level_directive(level: &str) -> &'static str {
    match level.to_ascii_uppercase().as_str() {
        "FATAL" | "ERROR" => "error",
        "WARN" => "warn",
        "INFO" => "info",
        "DEBUG" => "debug",
        _ => "warn",
    }
}

/// Parse the launch configuration from the process environment, failing
/// closed on anything the lifecycle controller requires before it can
/// safely intercept the shell.
pub fn parse_launch_config<F>(getenv: F) -> Result<LaunchConfig, PreconditionError>
where
    F: Fn(&str) -> Option<String>,
{
    let shell = getenv("FIG_SHELL").ok_or(PreconditionError::MissingShell)?;
    let session_id = getenv("TERM_SESSION_ID").ok_or(PreconditionError::MissingSessionId)?;
    let integration_version =
        getenv("FIG_INTEGRATION_VERSION").ok_or(PreconditionError::MissingIntegrationVersion)?;

    let login = getenv("FIG_IS_LOGIN_SHELL").as_deref().is_some_and(env_bool);
    let extra_args = getenv("FIG_SHELL_EXTRA_ARGS")
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let start_text = getenv("FIG_START_TEXT");
    let log_level = getenv("FIG_LOG_LEVEL");
    let tmux = getenv("TMUX").is_some();

    Ok(LaunchConfig { shell, login, extra_args, start_text, log_level, session_id, integration_version, tmux })
}

/// Build the environment the child shell should see: every `FIG_*`
/// variable the parent process carried stripped, then figterm's own
/// markers layered on top.
pub fn child_env(config: &LaunchConfig, crashed: bool) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().filter(|(k, _)| !k.starts_with("FIG_")).collect();
    env.insert("FIG_TERM".to_string(), "1".to_string());
    env.insert("FIG_TERM_VERSION".to_string(), FIGTERM_VERSION.to_string());
    if config.tmux {
        env.insert("FIG_TERM_TMUX".to_string(), "1".to_string());
    }
    if crashed {
        env.insert("FIG_TERM_CRASHED".to_string(), "1".to_string());
    }
    env
}

/// The argv the shell should be launched with: `--login` when the parent
/// shell was a login shell, plus any extra arguments the parent passed
/// along.
pub fn shell_args(config: &LaunchConfig) -> Vec<String> {
    let mut args = Vec::new();
    if config.login {
        args.push("--login".to_string());
    }
    args.extend(config.extra_args.iter().cloned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn parses_minimal_config() {
        let config =
            parse_launch_config(env(&[("FIG_SHELL", "/bin/bash"), ("TERM_SESSION_ID", "abc"), ("FIG_INTEGRATION_VERSION", "9")]))
                .unwrap();
        assert_eq!(config.shell, "/bin/bash");
        assert!(!config.login);
        assert!(config.extra_args.is_empty());
    }

    #[test]
    fn missing_session_id_fails_closed() {
        let err = parse_launch_config(env(&[("FIG_SHELL", "/bin/bash")]));
        assert!(matches!(err, Err(PreconditionError::MissingSessionId)));
    }

    #[test]
    fn login_shell_and_extra_args() {
        let config = parse_launch_config(env(&[
            ("FIG_SHELL", "/bin/zsh"),
            ("TERM_SESSION_ID", "abc"),
            ("FIG_INTEGRATION_VERSION", "9"),
            ("FIG_IS_LOGIN_SHELL", "1"),
            ("FIG_SHELL_EXTRA_ARGS", "-o histexpand"),
        ]))
        .unwrap();
        assert_eq!(shell_args(&config), vec!["--login", "-o", "histexpand"]);
    }

    #[test]
    fn child_env_strips_fig_vars_and_sets_markers() {
        std::env::set_var("FIG_SOME_STALE_VAR", "x");
        let config =
            parse_launch_config(env(&[("FIG_SHELL", "/bin/bash"), ("TERM_SESSION_ID", "abc"), ("FIG_INTEGRATION_VERSION", "9")]))
                .unwrap();
        let env = child_env(&config, false);
        std::env::remove_var("FIG_SOME_STALE_VAR");
        assert!(!env.contains_key("FIG_SOME_STALE_VAR"));
        assert_eq!(env.get("FIG_TERM").map(String::as_str), Some("1"));
        assert!(!env.contains_key("FIG_TERM_CRASHED"));
    }

    #[test]
    fn log_level_directive_maps_fatal_to_error() {
        assert_eq!(log_level_directive("FATAL"), "error");
        assert_eq!(log_level_directive("debug"), "debug");
        assert_eq!(log_level_directive("bogus"), "warn");
    }

    #[test]
    fn crashed_flag_is_set_on_fallback() {
        let config =
            parse_launch_config(env(&[("FIG_SHELL", "/bin/bash"), ("TERM_SESSION_ID", "abc"), ("FIG_INTEGRATION_VERSION", "9")]))
                .unwrap();
        let env = child_env(&config, true);
        assert_eq!(env.get("FIG_TERM_CRASHED").map(String::as_str), Some("1"));
    }
}
