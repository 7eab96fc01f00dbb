//! Configuration snapshots for reproducibility.
//!
//! A snapshot captures the exact configuration an analysis ran with. The
//! `config_hash` is computed over the canonical JSON of the effective
//! configuration, so built-in defaults and an identical file hash equally.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::engine::EngineConfig;
use crate::resolve::{ConfigPaths, ConfigSource};

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// Path the configuration was loaded from.
    #[serde(default)]
    pub config_path: Option<String>,

    /// Source of the configuration.
    pub source: String,

    /// SHA-256 of the raw file content, when loaded from a file.
    #[serde(default)]
    pub file_hash: Option<String>,

    /// SHA-256 of the canonical JSON of the effective configuration.
    pub config_hash: String,

    /// Key configuration values for quick reference.
    pub summary: ConfigSummary,
}

/// Summary of key configuration values.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConfigSummary {
    pub flood_factors: Vec<String>,
    pub landslide_factors: Vec<String>,
    pub bootstrap_b: usize,
    pub decision_threshold: f64,
    pub cv_folds: usize,
    pub study_area: String,
}

impl ConfigSnapshot {
    /// Create a snapshot of a loaded configuration.
    pub fn new(config: &EngineConfig, paths: &ConfigPaths, raw_content: Option<&str>) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: config.schema_version.clone(),
            config_path: paths.engine.as_ref().map(|p| p.display().to_string()),
            source: paths.source.to_string(),
            file_hash: raw_content.map(hash_content),
            config_hash: config_hash(config),
            summary: build_summary(config),
        }
    }

    /// Snapshot of the built-in defaults.
    pub fn defaults_only() -> Self {
        let config = EngineConfig::default();
        let paths = ConfigPaths {
            engine: None,
            source: ConfigSource::BuiltinDefault,
        };
        Self::new(&config, &paths, None)
    }

    /// Serialize snapshot to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if this snapshot matches another (same effective config).
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.config_hash == other.config_hash
    }

    /// Get a short identifier for this snapshot (first 12 chars of hash).
    pub fn short_id(&self) -> &str {
        &self.config_hash[..12.min(self.config_hash.len())]
    }
}

fn build_summary(config: &EngineConfig) -> ConfigSummary {
    ConfigSummary {
        flood_factors: config
            .flood
            .pairwise
            .factors
            .iter()
            .map(|k| k.to_string())
            .collect(),
        landslide_factors: config
            .landslide
            .factors
            .iter()
            .map(|k| k.to_string())
            .collect(),
        bootstrap_b: config.uncertainty.bootstrap_b,
        decision_threshold: config.validation.decision_threshold,
        cv_folds: config.validation.cv_folds,
        study_area: config.study_area.name.clone(),
    }
}

/// SHA-256 over the canonical JSON form of `config`.
pub fn config_hash(config: &EngineConfig) -> String {
    let canonical = serde_json::to_string(config).unwrap_or_default();
    hash_content(&canonical)
}

/// Hash content with SHA-256 and return hex string.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
