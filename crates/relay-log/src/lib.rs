//! Logging setup for the relay.
//!
//! Console output with uptime and module paths, plus a JSON log file in debug
//! builds. The level comes from `RUST_LOG` when set, otherwise from the
//! config's `debug.log_level`.

use relay_config::Config;
use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Name of the JSON log file written in debug builds.
pub const LOG_FILE: &str = "bedrock-relay.log";

const DEFAULT_FILTER: &str = "info";

/// Filter directives from the config, falling back to `info`.
pub fn filter_directives(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.trim().is_empty() => {
            config.debug.log_level.clone()
        }
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Install the global tracing subscriber.
///
/// * `log_dir` - Directory for the JSON log file (debug builds only)
/// * `debug_build` - Whether to write the JSON log file
/// * `config` - Source of the default log level
///
/// ```no_run
/// use relay_config::Config;
/// use relay_log::init_logging;
///
/// let config = Config::default();
/// init_logging(Some(std::path::Path::new("./logs")), true, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let directives = filter_directives(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(filter_directives(None), "info");
        let mut config = Config::default();
        config.debug.log_level = "  ".into();
        assert_eq!(filter_directives(Some(&config)), "info");
    }

    #[test]
    fn test_config_level_is_used() {
        let mut config = Config::default();
        config.debug.log_level = "info,relay_proxy=debug".into();
        let directives = filter_directives(Some(&config));
        assert_eq!(directives, "info,relay_proxy=debug");
        let filter = EnvFilter::new(&directives);
        assert!(filter.to_string().contains("relay_proxy=debug"));
    }

    #[test]
    fn test_env_filter_parsing() {
        for directives in [
            "info",
            "debug,relay_world=trace",
            "warn,relay_proxy::packet_logger=debug",
        ] {
            assert!(
                EnvFilter::try_new(directives).is_ok(),
                "Failed to parse filter: {directives}"
            );
        }
    }
}
