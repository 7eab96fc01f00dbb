//! GeoHIS Core Library
//!
//! Flood and landslide susceptibility for point sets:
//! - Factor sampling and scoring
//! - AHP weighting (flood) and frequency ratios (landslide)
//! - Susceptibility indices, bands and combined risk
//! - Bootstrap intervals and one-at-a-time sensitivity
//! - ROC/AUC validation with spatial cross-validation
//! - The analysis coordinator that sequences all of the above
//!
//! The binary entry point is in `main.rs`.

pub mod ahp;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod exit_codes;
pub mod frequency_ratio;
pub mod logging;
pub mod request;
pub mod result;
pub mod sampler;
pub mod schema;
pub mod scoring;
pub mod susceptibility;
pub mod uncertainty;
pub mod validation;

pub use coordinator::{AnalysisCoordinator, AnalysisFailure, CancellationToken};
pub use request::{AnalysisInput, AnalysisOptions, AnalysisRequest, WeightsOverride};
pub use result::{AnalysisResult, AnalysisState};
