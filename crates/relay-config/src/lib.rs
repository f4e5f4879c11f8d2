//! Configuration for the relay.
//!
//! Settings persist to disk as a RON file and can be overridden from the
//! command line. Missing sections and fields fall back to defaults, unknown
//! ones are ignored.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    APP_DIR_NAME, CONFIG_FILE, CaptureConfig, Config, DebugConfig, NetworkConfig,
    default_config_dir,
};
pub use error::ConfigError;
