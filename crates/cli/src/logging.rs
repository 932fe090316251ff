use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

/// Environment variable holding a filter directive, e.g. `braid_core=debug`.
pub const LOG_ENV: &str = "BRAID_LOG";

/// Install the stderr subscriber. `BRAID_LOG` wins over `level`.
pub fn init_tracing(level: &str) -> Result<(), String> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| format!("invalid log level '{}': {}", level, e))?;

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| e.to_string())
}
