//! Directory layout of the relay.
//!
//! The config file lives in the platform config dir, logs and packet dumps
//! next to it under `logs/`. Captured worlds go wherever the capture config
//! points, resolved against the working directory when relative.

use std::path::{Path, PathBuf};
use std::{fmt, io};

use relay_config::{APP_DIR_NAME, default_config_dir};

/// Errors that can occur while preparing directories.
#[derive(Debug)]
pub enum PlatformError {
    /// The working directory could not be determined.
    NoWorkingDir(io::Error),
    /// A directory could not be created.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoWorkingDir(e) => write!(f, "could not determine working directory: {e}"),
            Self::Io { path, source } => write!(f, "creating {}: {source}", path.display()),
        }
    }
}

impl std::error::Error for PlatformError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NoWorkingDir(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

/// Resolved directories for one run.
#[derive(Clone, Debug, PartialEq)]
pub struct AppDirs {
    /// Holds `config.ron`.
    pub config_dir: PathBuf,
    /// Log file and packet dumps.
    pub log_dir: PathBuf,
    /// Parent of captured world folders.
    pub worlds_dir: PathBuf,
}

impl AppDirs {
    /// Resolve directories without touching the disk.
    ///
    /// `config_override` replaces the platform config dir; `output_dir` is
    /// taken as-is when absolute, otherwise relative to the working directory.
    pub fn resolve(
        config_override: Option<&Path>,
        output_dir: &Path,
    ) -> Result<Self, PlatformError> {
        let config_dir = config_override
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_dir);
        let worlds_dir = if output_dir.is_absolute() {
            output_dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(PlatformError::NoWorkingDir)?
                .join(output_dir)
        };
        Ok(Self::with_root(&config_dir, worlds_dir))
    }

    /// Directories rooted at `config_dir`, for tests and portable installs.
    pub fn with_root(config_dir: &Path, worlds_dir: PathBuf) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            log_dir: config_dir.join("logs"),
            worlds_dir,
        }
    }

    /// Create every directory.
    pub fn create_dirs(&self) -> Result<(), PlatformError> {
        for dir in [&self.config_dir, &self.log_dir, &self.worlds_dir] {
            std::fs::create_dir_all(dir).map_err(|source| PlatformError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

impl fmt::Display for AppDirs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{APP_DIR_NAME}: config {}, logs {}, worlds {}",
            self.config_dir.display(),
            self.log_dir.display(),
            self.worlds_dir.display()
        )
    }
}
