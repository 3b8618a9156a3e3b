use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset or cannot be parsed.
pub const DEFAULT_DIRECTIVE: &str = "billing_service=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter())
}

fn default_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_DIRECTIVE)
}

/// Install the fmt subscriber for the bins. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .try_init();
}
