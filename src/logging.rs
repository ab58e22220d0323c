//! Tracing subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the log filter.
pub const LOG_ENV: &str = "SNAPIMPACT_LOG";

/// Installs a stderr `fmt` subscriber.
///
/// `SNAPIMPACT_LOG` takes precedence; otherwise the level is `debug` when
/// `verbose` is set and `info` when it is not. Calling this twice is a no-op.
pub fn init(verbose: bool) {
    let default = if verbose { "snapimpact=debug" } else { "snapimpact=info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
