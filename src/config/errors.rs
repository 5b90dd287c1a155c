use std::path::PathBuf;

use thiserror::Error;

/// Errors that may occur while loading or saving timeline settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to create the settings directory.
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        /// Directory path that failed to create.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to read a settings file.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to write a settings file.
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Path that failed to write.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse TOML settings.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML parse error.
        source: toml::de::Error,
    },
    /// Failed to serialize settings to TOML.
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML serialization error.
        source: toml::ser::Error,
    },
}
