//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor `--log-level` yield a valid directive.
const FALLBACK_FILTER: &str = "info";

/// Build the filter: `RUST_LOG` first, then the CLI level.
pub fn filter(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER))
}

/// Install the global subscriber writing to stderr, as JSON lines when `json` is set.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(level: &str, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_writer(std::io::stderr);

    let _ = if json {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.try_init()
    };
}
