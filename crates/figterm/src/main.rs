//! figterm: a transparent PTY wrapper that sits between a terminal
//! emulator and the user's login shell, tracking the shell's screen
//! contents well enough to extract the current command line.
//!
//! Any failure before or during the proxy loop falls back to exec'ing the
//! plain shell directly, so a bug here never strands the user without a
//! working terminal.

mod env;
mod fallback;
mod proxy;
mod signals;
mod tty;

use std::path::PathBuf;

use ipc::paths;
use ipc::sockets::{HookSocket, InsertionListener, LegacySocket};
use terminal::Screen;

/// Handle used to reconfigure logging verbosity at runtime from an OSC 697
/// `Log=LEVEL` directive (spec.md §4.2), without tearing down the
/// subscriber the rest of the process is using.
pub type LogReloadHandle = tracing_subscriber::reload::Handle<tracing_subscriber::EnvFilter, tracing_subscriber::Registry>;

fn init_logging(log_level: Option<&str>) -> LogReloadHandle {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let directive = log_level.map(env::log_level_directive).unwrap_or("warn");
    let (filter_layer, handle) = tracing_subscriber::reload::Layer::new(tracing_subscriber::EnvFilter::new(directive));
    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
    handle
}

fn hostname() -> String {
    let mut buf = [0u8; 256];
    unsafe {
        if libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) == 0 {
            let cstr = std::ffi::CStr::from_ptr(buf.as_ptr() as *const libc::c_char);
            return cstr.to_string_lossy().into_owned();
        }
    }
    "unknown".to_string()
}

fn history_path() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/tmp")).join(".fig").join("history")
}

fn main() {
    if std::env::args().skip(1).any(|arg| arg == "-v" || arg == "--version") {
        println!("{}", env::FIGTERM_VERSION);
        return;
    }

    let config = match env::parse_launch_config(env::getenv) {
        Ok(config) => config,
        Err(e) => {
            let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
            eprintln!("figterm: {e}, falling back to {shell}");
            let err = fallback::fallback_exec(&shell, &[], &std::env::vars().collect());
            eprintln!("figterm: fallback exec failed: {err}");
            std::process::exit(1);
        }
    };

    let log_reload = init_logging(config.log_level.as_deref());

    if let Err(e) = run(&config, log_reload) {
        tracing::error!(error = %e, "figterm failed, falling back to plain shell");
        let env = env::child_env(&config, true);
        let args = env::shell_args(&config);
        let err = fallback::fallback_exec(&config.shell, &args, &env);
        eprintln!("figterm: fallback exec failed: {err}");
        std::process::exit(1);
    }
}

fn run(config: &env::LaunchConfig, log_reload: LogReloadHandle) -> anyhow::Result<()> {
    use anyhow::Context;
    use std::os::fd::AsFd;

    if !tty::stdin_is_tty() {
        anyhow::bail!("stdin is not a tty");
    }

    let stdin = std::io::stdin();
    let winsize = tty::winsize(stdin.as_fd()).context("reading window size")?;
    let _raw_guard = tty::RawModeGuard::enable().context("entering raw mode")?;

    let colour_support = terminal::colour::detect_colour_support(env::getenv);
    let term_bundle = terminal::term_bundle::get_term_bundle(env::getenv);

    let pid = std::process::id().to_string();
    let hostname = hostname();
    let tty_name = tty::tty_name();

    let insertion = InsertionListener::bind(paths::insertion_socket_path(&config.session_id))
        .context("binding insertion socket")?;

    let pty_env = env::child_env(config, false);
    let shell_args = env::shell_args(config);
    let pty = pty::Pty::spawn(&config.shell, &shell_args, &pty_env, winsize.ws_col, winsize.ws_row)
        .context("spawning pty")?;

    let screen =
        Screen::new(winsize.ws_row as usize, winsize.ws_col as usize, colour_support, paths::insertion_lock_path());

    let hook_socket = HookSocket::new(paths::json_hook_socket_path());
    let legacy_socket = LegacySocket::new(paths::legacy_command_socket_path());

    let signals = signals::Signals::install().context("installing signal handlers")?;

    let context = proxy::ProxyContext {
        session_id: config.session_id.clone(),
        integration_version: config.integration_version.clone(),
        pid,
        hostname,
        tty_name,
        term_bundle,
        history_path: history_path(),
    };

    let mut proxy_loop = proxy::ProxyLoop::new(
        pty,
        screen,
        hook_socket,
        legacy_socket,
        insertion,
        signals,
        context,
        config.start_text.clone(),
        log_reload,
    );

    proxy_loop.run()?;
    Ok(())
}
