use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Takes precedence over `RUST_LOG`.
pub const LOG_ENV: &str = "SOCIAL_CONTENT_DL_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Plain,
    /// One JSON object per line, RFC 3339 UTC timestamps.
    Json,
}

/// Installs the global stderr subscriber. Returns `false` if one was already installed.
pub fn init_logging(format: LogFormat) -> bool {
    let filter = first_valid_filter([std::env::var(LOG_ENV).ok(), std::env::var("RUST_LOG").ok()]);
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Plain => registry.with(layer.with_target(false)).try_init(),
        LogFormat::Json => registry
            .with(layer.json().with_timer(UtcTime::rfc_3339()))
            .try_init(),
    };
    installed.is_ok()
}

fn first_valid_filter<const N: usize>(directives: [Option<String>; N]) -> EnvFilter {
    directives
        .into_iter()
        .flatten()
        .filter(|d| !d.trim().is_empty())
        .find_map(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}
