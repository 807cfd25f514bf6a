use std::fmt::Display;
use std::future::Future;
use std::str::FromStr;

use anyhow::anyhow;

/// Source of environment variables, swappable in tests.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Read a variable from the process environment. Empty values count as unset.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Parse the value of variable `name`, naming it in the error.
pub fn parse_var<T>(name: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("invalid value {raw:?} for {name}: {e}"))
}

/// Look up `name` and parse it if present.
pub fn env_parse<T>(env: EnvLookup<'_>, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    env(name).map(|raw| parse_var(name, &raw)).transpose()
}

/// Listen for the signals that ask the process to stop.
///
/// Handlers are installed before this returns, so a signal delivered
/// between the call and the first poll is not lost. The future resolves
/// with the name of the signal that arrived.
#[cfg(unix)]
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = quit.recv() => "SIGQUIT",
        }
    })
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl-c",
            Err(_) => "ctrl-c listener failure",
        }
    })
}

/// One startup line naming the binary and its build.
pub fn build_info(binary: &str) -> String {
    format!(
        "{binary} {} ({} build)",
        env!("CARGO_PKG_VERSION"),
        if cfg!(debug_assertions) { "debug" } else { "release" }
    )
}
