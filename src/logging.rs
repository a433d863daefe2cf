use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Crate-level default when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "agentstream=info";

/// Install the global subscriber for the CLI.
///
/// Logs go to stderr; stdout is reserved for the streamed reply so it can be
/// piped. `log_json` switches to one JSON object per line.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let plain = (!log_json).then(|| fmt::layer().with_writer(std::io::stderr).with_target(false));
    let json = log_json.then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();
}
