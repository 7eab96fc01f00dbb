//! Error types for the GeoHIS engine.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - The error-kind taxonomy surfaced in every analysis response
//! - The pipeline stage an error originated from
//! - Recoverability hints (per-factor drops vs. terminal failures)
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Inconsistent Pairwise Judgments
//!   Reason: inconsistent pairwise judgments: CR=0.2143 exceeds 0.10
//!   Fix: Revisit the pairwise comparisons ...
//! ```
//!
//! # Machine-Facing Output
//!
//! ```json
//! {
//!   "code": 30,
//!   "kind": "InconsistentJudgments",
//!   "message": "inconsistent pairwise judgments: CR=0.2143 exceeds 0.10",
//!   "recoverable": false,
//!   "context": { "cr": 0.2143 }
//! }
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::factor::FactorKind;

/// Result type alias for GeoHIS operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the engine core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ErrorKind {
    /// Bad coordinates, empty point sets, malformed matrices or overrides.
    MalformedInput,
    /// Every factor layer was unavailable for a point.
    SamplingError,
    /// AHP consistency ratio above 0.10.
    InconsistentJudgments,
    /// Categorical factor value missing from the configured mapping.
    UnknownClass,
    /// Frequency-ratio denominator is zero for a factor.
    NoEvidence,
    /// Validation preconditions not met.
    InsufficientSamples,
    /// The analysis was cancelled or timed out.
    Cancelled,
    /// An internal invariant was violated.
    InternalError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::MalformedInput => "MalformedInput",
            ErrorKind::SamplingError => "SamplingError",
            ErrorKind::InconsistentJudgments => "InconsistentJudgments",
            ErrorKind::UnknownClass => "UnknownClass",
            ErrorKind::NoEvidence => "NoEvidence",
            ErrorKind::InsufficientSamples => "InsufficientSamples",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::InternalError => "InternalError",
        };
        write!(f, "{}", name)
    }
}

/// Pipeline stage of the analysis coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validating,
    Sampling,
    Scoring,
    Weighting,
    Combining,
    Classifying,
    Quantifying,
    ValidatingResults,
}

impl Stage {
    /// All stages in execution order.
    pub const ORDERED: [Stage; 8] = [
        Stage::Validating,
        Stage::Sampling,
        Stage::Scoring,
        Stage::Weighting,
        Stage::Combining,
        Stage::Classifying,
        Stage::Quantifying,
        Stage::ValidatingResults,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validating => "validating",
            Stage::Sampling => "sampling",
            Stage::Scoring => "scoring",
            Stage::Weighting => "weighting",
            Stage::Combining => "combining",
            Stage::Classifying => "classifying",
            Stage::Quantifying => "quantifying",
            Stage::ValidatingResults => "validating_results",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type for the GeoHIS engine.
#[derive(Error, Debug)]
pub enum Error {
    // Input errors (10-19)
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("sampling failed for point {point_id}: {detail}")]
    Sampling { point_id: String, detail: String },

    // Model errors (30-39)
    #[error("inconsistent pairwise judgments: CR={cr:.4} exceeds 0.10")]
    InconsistentJudgments { cr: f64, matrix: Vec<Vec<f64>> },

    #[error("unknown class '{class_label}' for factor {kind}")]
    UnknownClass {
        kind: FactorKind,
        class_label: String,
    },

    #[error("no evidence recorded for factor {kind}")]
    NoEvidence { kind: FactorKind },

    // Validation errors (40-49)
    #[error(
        "insufficient samples: {positives} positives and {negatives} negatives (minimum {min_required} each)"
    )]
    InsufficientSamples {
        positives: usize,
        negatives: usize,
        min_required: usize,
    },

    // Control flow (50-59)
    #[error("analysis cancelled")]
    Cancelled,

    // Internal / I/O errors (60-69)
    #[error("internal invariant '{invariant}' violated: {detail}")]
    Internal { invariant: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for an internal invariant violation.
    pub fn internal(invariant: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Internal {
            invariant: invariant.into(),
            detail: detail.into(),
        }
    }

    /// Returns the stable error code for this error.
    ///
    /// - 10-19: Input and configuration errors
    /// - 30-39: Model errors
    /// - 40-49: Validation errors
    /// - 50-59: Control flow
    /// - 60-69: Internal and I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::MalformedInput(_) => 10,
            Error::Config(_) => 11,
            Error::Sampling { .. } => 12,
            Error::InconsistentJudgments { .. } => 30,
            Error::UnknownClass { .. } => 31,
            Error::NoEvidence { .. } => 32,
            Error::InsufficientSamples { .. } => 40,
            Error::Cancelled => 50,
            Error::Internal { .. } => 60,
            Error::Io(_) => 61,
            Error::Json(_) => 62,
        }
    }

    /// Maps this error onto the response error-kind taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedInput(_) | Error::Config(_) | Error::Json(_) => {
                ErrorKind::MalformedInput
            }
            Error::Sampling { .. } => ErrorKind::SamplingError,
            Error::InconsistentJudgments { .. } => ErrorKind::InconsistentJudgments,
            Error::UnknownClass { .. } => ErrorKind::UnknownClass,
            Error::NoEvidence { .. } => ErrorKind::NoEvidence,
            Error::InsufficientSamples { .. } => ErrorKind::InsufficientSamples,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Internal { .. } | Error::Io(_) => ErrorKind::InternalError,
        }
    }

    /// Returns whether the coordinator may recover by dropping a factor.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::UnknownClass { .. } | Error::NoEvidence { .. })
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::MalformedInput(_) => {
                "Check point coordinates, the study-area bounding box and any weight overrides."
            }
            Error::Config(_) => {
                "Run 'geohis config validate' to locate the offending configuration field."
            }
            Error::Sampling { .. } => {
                "Provide at least one factor value per point or mark the missing layers available."
            }
            Error::InconsistentJudgments { .. } => {
                "Revisit the pairwise comparisons; a consistency ratio above 0.10 indicates contradictory judgments."
            }
            Error::UnknownClass { .. } => {
                "Add the category to the factor lookup table or correct the input value."
            }
            Error::NoEvidence { .. } => {
                "Supply class tallies with a non-zero evidence count for the factor."
            }
            Error::InsufficientSamples { .. } => {
                "Label at least 10 hazard and 10 non-hazard points inside the study area."
            }
            Error::Cancelled => "Increase --timeout or rerun the analysis.",
            Error::Internal { .. } => {
                "Internal invariant failure. Report the request and configuration that triggered it."
            }
            Error::Io(_) => "Check that the input and output paths exist and are writable.",
            Error::Json(_) => "Check the JSON syntax of the input and configuration files.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::MalformedInput(_) => "Malformed Input",
            Error::Config(_) => "Configuration Error",
            Error::Sampling { .. } => "Factor Sampling Failed",
            Error::InconsistentJudgments { .. } => "Inconsistent Pairwise Judgments",
            Error::UnknownClass { .. } => "Unknown Factor Class",
            Error::NoEvidence { .. } => "No Frequency-Ratio Evidence",
            Error::InsufficientSamples { .. } => "Insufficient Validation Samples",
            Error::Cancelled => "Analysis Cancelled",
            Error::Internal { .. } => "Internal Error",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error kind from the response taxonomy.
    pub kind: ErrorKind,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is recoverable per factor.
    pub recoverable: bool,

    /// Additional structured context (e.g., CR value, factor kind).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = BTreeMap::new();

        match err {
            Error::InconsistentJudgments { cr, matrix } => {
                context.insert("cr".to_string(), serde_json::json!(cr));
                context.insert("matrix".to_string(), serde_json::json!(matrix));
            }
            Error::UnknownClass { kind, class_label } => {
                context.insert("factor".to_string(), serde_json::json!(kind));
                context.insert("class_label".to_string(), serde_json::json!(class_label));
            }
            Error::NoEvidence { kind } => {
                context.insert("factor".to_string(), serde_json::json!(kind));
            }
            Error::Sampling { point_id, .. } => {
                context.insert("point_id".to_string(), serde_json::json!(point_id));
            }
            Error::InsufficientSamples {
                positives,
                negatives,
                min_required,
            } => {
                context.insert("positives".to_string(), serde_json::json!(positives));
                context.insert("negatives".to_string(), serde_json::json!(negatives));
                context.insert("min_required".to_string(), serde_json::json!(min_required));
            }
            Error::Internal { invariant, .. } => {
                context.insert("invariant".to_string(), serde_json::json!(invariant));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            kind: err.kind(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// One entry of the error vector carried by every analysis response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_point_ids: Option<Vec<String>>,
    /// True for per-factor drops recorded as warnings.
    pub recoverable: bool,
}

impl ErrorRecord {
    /// Build a record from an error raised at `stage`.
    pub fn from_error(err: &Error, stage: Stage) -> Self {
        ErrorRecord {
            kind: err.kind(),
            stage,
            detail: err.to_string(),
            affected_point_ids: None,
            recoverable: err.is_recoverable(),
        }
    }

    pub fn with_points(mut self, point_ids: Vec<String>) -> Self {
        if !point_ids.is_empty() {
            self.affected_point_ids = Some(point_ids);
        }
        self
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}
