//! Structured logging.
//!
//! Logs always go to stderr: stdout of a process worker is its result channel. The filter comes
//! from `RUST_LOG` (default `zoomreel=info`), and `ZOOMREEL_LOG_FORMAT=json` switches to JSON
//! lines.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "zoomreel=info";
pub const FORMAT_ENV: &str = "ZOOMREEL_LOG_FORMAT";

/// Install the global subscriber. Later calls are no-ops.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(true);

    if wants_json(std::env::var(FORMAT_ENV).ok().as_deref()) {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}

fn wants_json(format: Option<&str>) -> bool {
    format.is_some_and(|v| v.trim().eq_ignore_ascii_case("json"))
}
