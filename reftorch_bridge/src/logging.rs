use tracing_subscriber::EnvFilter;

/// The filter a session logs with. `RUST_LOG` overrides `configured`, and an
/// unparsable filter falls back to `info`.
pub fn log_filter(configured: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a fmt subscriber writing to stderr, filtered by
/// [`log_filter`]. Returns false when a global subscriber was already set,
/// which is not an error.
pub fn init_logging(configured: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(configured))
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}
