//! Configuration loading for geohis-core.
//!
//! This module handles:
//! - Engine config resolution order (CLI > env > XDG > system > defaults)
//! - Parsing JSON or TOML config files
//! - Semantic validation (ramps, matrices, tallies, thresholds)
//! - Config snapshot generation for analysis results

pub use geohis_config::{
    resolve_config, validate_engine_config, ConfigPaths, ConfigSnapshot, ConfigSource,
    EngineConfig, ValidationError,
};

use geohis_common::Error;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Semantic validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("I/O error reading {path}: {message}")]
    IoError { path: PathBuf, message: String },
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Configuration resolution options.
#[derive(Debug, Default, Clone)]
pub struct ConfigOptions {
    /// Explicit config file path (highest priority).
    pub config_path: Option<PathBuf>,
}

/// Resolved configuration with provenance information.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub engine: EngineConfig,
    pub paths: ConfigPaths,
    /// Raw file content (None if using defaults).
    pub raw: Option<String>,
}

impl ResolvedConfig {
    /// Built-in defaults with no file behind them.
    pub fn defaults() -> Self {
        ResolvedConfig {
            engine: EngineConfig::default(),
            paths: ConfigPaths::default(),
            raw: None,
        }
    }

    /// Create a config snapshot for the analysis result.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot::new(&self.engine, &self.paths, self.raw.as_deref())
    }

    pub fn using_defaults(&self) -> bool {
        self.paths.engine.is_none()
    }
}

/// Load configuration with the standard resolution order.
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, ConfigError> {
    let paths = resolve_config(options.config_path.as_deref());

    let Some(path) = paths.engine.clone() else {
        let resolved = ResolvedConfig {
            engine: EngineConfig::default(),
            paths,
            raw: None,
        };
        validate_engine_config(&resolved.engine)?;
        return Ok(resolved);
    };

    if !path.exists() {
        return Err(ConfigError::NotFound { path });
    }

    let (engine, raw) = EngineConfig::from_file(&path).map_err(|e| match e {
        ValidationError::IoError(message) => ConfigError::IoError {
            path: path.clone(),
            message,
        },
        ValidationError::ParseError(message) => ConfigError::ParseError {
            path: path.clone(),
            message,
        },
        other => ConfigError::ValidationError(other),
    })?;

    validate_engine_config(&engine)?;
    tracing::debug!(path = %path.display(), source = %paths.source, "loaded engine config");

    Ok(ResolvedConfig {
        engine,
        paths,
        raw: Some(raw),
    })
}
