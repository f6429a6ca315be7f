//! provides logging helpers

use std::str::FromStr;

use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// Environment variable holding the default log level (`RUST_LOG` still wins).
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Resolves the default level from `LOG_LEVEL`, falling back to INFO.
pub fn default_level(value: Option<&str>) -> filter::LevelFilter {
    value
        .and_then(|v| filter::LevelFilter::from_str(v.trim()).ok())
        .unwrap_or(filter::LevelFilter::INFO)
}

/// initiate the global tracing subscriber
pub fn init() {
    let level = default_level(std::env::var(LOG_LEVEL_ENV).ok().as_deref());
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let fmt_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter);

    registry().with(fmt_layer).init();
    tracing::info!("Logging initialized at level: {level}");
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn level_is_parsed_case_insensitively() {
        assert_eq!(default_level(Some("debug")), filter::LevelFilter::DEBUG);
        assert_eq!(default_level(Some("WARN")), filter::LevelFilter::WARN);
    }

    #[test]
    fn unknown_or_missing_level_falls_back_to_info() {
        assert_eq!(default_level(Some("chatty")), filter::LevelFilter::INFO);
        assert_eq!(default_level(None), filter::LevelFilter::INFO);
    }
}
