use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,icrs=debug,lifecycle_block=debug";

/// JSON logs for CloudWatch, filtered by `RUST_LOG`. Safe to call more than
/// once; later calls are no-ops.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(false)
        .with_current_span(false)
        .with_ansi(false)
        .without_time()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_workspace_crates() {
        let filter = EnvFilter::try_new(DEFAULT_FILTER).unwrap().to_string();
        assert!(filter.contains("icrs=debug"));
        assert!(filter.contains("lifecycle_block=debug"));
    }
}
