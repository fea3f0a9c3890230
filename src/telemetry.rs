use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter from `RUST_LOG`, falling back to `default_level`
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialise structured logging.
///
/// Events are written to stdout as JSON. Calling this a second time (for
/// example from several tests) leaves the first subscriber in place.
pub fn init_telemetry(default_level: &str) {
    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .json();

    let _ = tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(formatting_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_init_is_repeatable() {
        init_telemetry("debug");
        init_telemetry("info");
        tracing::info!("telemetry initialised");
    }
}
