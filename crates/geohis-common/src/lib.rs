//! GeoHIS common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the engine crates:
//! - Geographic primitives (points, study areas)
//! - Factor kinds, raw values and scores
//! - Hazard and band enumerations
//! - Ordered weight vectors
//! - Session and point identifiers
//! - The unified error type and its structured JSON form
//! - Significant-figure rounding for persisted output

pub mod error;
pub mod factor;
pub mod geo;
pub mod hazard;
pub mod id;
pub mod numeric;
pub mod output;
pub mod weights;

pub use error::{Error, ErrorKind, ErrorRecord, Result, Stage, StructuredError};
pub use factor::{FactorKind, FactorScore, FactorValue, RawValue};
pub use geo::{assign_point_ids, Point, StudyArea};
pub use hazard::{Band, Hazard};
pub use id::{PointId, SessionId};
pub use output::OutputFormat;
pub use weights::{WeightEntry, WeightVector};

/// Schema version stamped on every persisted analysis result.
pub const SCHEMA_VERSION: &str = "1.0.0";
