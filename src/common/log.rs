//! Logging helpers
//!
//! Handlers log through the `log` facade; binaries call [`init_logger`] once.

/// Initialise the global logger
///
/// `RUST_LOG` takes precedence over `level` when it is set.
///
/// # Parameters
///
/// * `level` - Default filter, e.g. `info` or `tcpip_forward=debug`
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A logger may already be installed by an embedding application or another test.
    let _ = env_logger::Builder::from_env(env).try_init();
}
