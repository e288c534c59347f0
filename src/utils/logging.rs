use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Map a configured level name to a filter. Unknown names mean `info`.
pub fn level_filter(level: &str) -> LevelFilter {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" => LevelFilter::OFF,
        "error" => LevelFilter::ERROR,
        "warn" | "warning" => LevelFilter::WARN,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    }
}

/// Install the fmt subscriber for the CLI and tests.
///
/// `RUST_LOG` wins over `level` when set, so per-module filters such as
/// `mqsim::broker=debug` work without touching the config.
pub fn init(level: &str) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_filter(level).into())
        .from_env_lossy();

    // try_init: tests and the CLI may both call this
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
