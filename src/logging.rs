use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber. Safe to call more than once.
///
/// `RUST_LOG` overrides the default filter, which is `debug` in debug builds
/// and `warn` in release builds so per-task chatter stays out of timed runs.
pub fn init() {
    let default_level = if cfg!(debug_assertions) { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
