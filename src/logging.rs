//! Process-wide log output.
//!
//! The library only emits `tracing` events; binaries (and the launcher)
//! call [`init`] once to print them to stderr. The filter comes from the
//! `DAGFLOW_LOG` environment variable using `EnvFilter` syntax, e.g.
//! `DAGFLOW_LOG=dagflow=debug`.

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "DAGFLOW_LOG";

static INIT: OnceLock<()> = OnceLock::new();

/// Install the stderr subscriber with the filter from [`LOG_ENV`], falling
/// back to `info`. Later calls are no-ops.
pub fn init() {
    init_with_default("info");
}

/// Like [`init`], with `default` used when [`LOG_ENV`] is unset or invalid.
pub fn init_with_default(default: &str) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
        // another subscriber may already be installed by the host application
        let _ = tracing_fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .with_thread_names(true)
            .try_init();
    });
}
