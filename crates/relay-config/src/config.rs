//! Configuration structs with defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Directory name under the platform config dir.
pub const APP_DIR_NAME: &str = "bedrock-relay";

pub const CONFIG_FILE: &str = "config.ron";

/// `<platform config dir>/bedrock-relay`, or the working directory when the
/// platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    /// World capture settings.
    pub capture: CaptureConfig,
    pub debug: DebugConfig,
}

/// Where the proxy listens and what it dials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the game client connects to.
    pub listen_address: String,
    /// Real server, `host:port`.
    pub server_address: String,
    /// Give up dialing the server after this many seconds.
    pub connect_timeout_seconds: u64,
}

/// World capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Parent directory of captured worlds.
    pub output_dir: PathBuf,
    /// Entity types never saved, e.g. `minecraft:zombie`.
    pub exclude_mobs: Vec<String>,
    /// Save worlds with an empty flat generator.
    pub void_gen: bool,
    /// Keep buffering after the world opens until capture is resumed.
    pub deferred: bool,
    /// Chunk radius kept on resume; negative keeps everything.
    pub resume_radius: i32,
    /// LZ4-compress stored records.
    pub compress: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level filter (e.g., "debug", "info", "warn"). `RUST_LOG` wins.
    pub log_level: String,
    /// Mirror every packet into dump files.
    pub extra_debug: bool,
    /// Passphrase of the encrypted packet dump. Empty disables it.
    pub log_passphrase: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:19132".to_string(),
            server_address: String::new(),
            connect_timeout_seconds: 10,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("worlds"),
            exclude_mobs: Vec::new(),
            void_gen: true,
            deferred: false,
            resume_radius: -1,
            compress: true,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            extra_debug: false,
            log_passphrase: String::new(),
        }
    }
}

// --- Persistence ---

impl Config {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        ron::from_str(&text).map_err(ConfigError::ParseError)
    }

    /// Read `config.ron` from `config_dir`, writing the defaults there first
    /// when the file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if !path.exists() {
            let defaults = Config::default();
            defaults.save(config_dir)?;
            log::info!("wrote default settings to {}", path.display());
            return Ok(defaults);
        }
        let loaded = Self::read(&path)?;
        log::info!("settings loaded from {}", path.display());
        Ok(loaded)
    }

    /// Write `config.ron` into `config_dir`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;
        let text = ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::new()
                .depth_limit(3)
                .enumerate_arrays(false),
        )
        .map_err(ConfigError::SerializeError)?;
        std::fs::write(config_dir.join(CONFIG_FILE), text).map_err(ConfigError::WriteError)
    }

    /// Check the settings the relay cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.server_address.trim().is_empty() {
            return Err(ConfigError::MissingServer);
        }
        Ok(())
    }

    /// Re-read `config.ron`. `None` when nothing changed.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = Self::read(&config_dir.join(CONFIG_FILE))?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("settings changed on disk");
        Ok(Some(fresh))
    }
}
