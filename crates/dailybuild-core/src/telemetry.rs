//! Centralised tracing initialisation for dailybuild binaries.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.
//!
//! Logs go to stderr. Stdout is reserved for the final run report.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Tracing target used for echoed child-process output.
pub const OUTPUT_TARGET: &str = "dailybuild::output";

/// Crates whose internals stay at `warn` unless `RUST_LOG` says otherwise.
const QUIET_DEPENDENCIES: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

/// Filter directives used when `RUST_LOG` is not set.
///
/// Command output under [`OUTPUT_TARGET`] always stays visible at `info` so
/// build logs keep the compiler output even when `level` is stricter.
pub fn default_directives(level: Level) -> String {
    let mut directives = vec![level.as_str().to_ascii_lowercase()];
    if level < Level::INFO {
        directives.push(format!("{OUTPUT_TARGET}=info"));
    }
    directives.extend(QUIET_DEPENDENCIES.iter().map(|c| format!("{c}=warn")));
    directives.join(",")
}

/// Initialise the global tracing subscriber.
///
/// * `json` - emit newline-delimited JSON log lines.
/// * `level` - default verbosity when `RUST_LOG` is not set.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .ok();
    } else {
        // Echoed output reads like a build log, so the target is only
        // useful for the lifecycle events.
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
