//! GeoHIS engine configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for the engine configuration (JSON or TOML)
//! - Built-in defaults with source citations for every scoring rule
//! - Config resolution (CLI → env → XDG → system → defaults)
//! - Semantic validation
//! - Config snapshots echoed into every analysis result

pub mod defaults;
pub mod engine;
pub mod resolve;
pub mod snapshot;
pub mod validate;

pub use engine::{
    ClassBreak, ClassTally, ClassificationConfig, EngineConfig, FactorConfig, FloodModelConfig,
    LandslideModelConfig, PairwiseConfig, ScoringRule, UncertaintyConfig, ValidationDefaults,
};
pub use resolve::{resolve_config, ConfigPaths, ConfigSource};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_engine_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
