//! Configuration validation errors and semantic validation.

use geohis_common::factor::normalize_category;
use geohis_common::FactorKind;
use std::collections::HashSet;
use thiserror::Error;

use crate::engine::{
    ClassBreak, ClassificationConfig, EngineConfig, LandslideModelConfig, PairwiseConfig,
    ScoringRule, UncertaintyConfig, ValidationDefaults,
};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Largest matrix Saaty's random-index table covers.
pub const MAX_PAIRWISE_ORDER: usize = 15;

/// Reciprocity tolerance: |M[i][j] · M[j][i] − 1|.
pub const RECIPROCITY_TOLERANCE: f64 = 1e-9;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::MissingField(_) => 64,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

/// Validate an engine configuration semantically.
pub fn validate_engine_config(config: &EngineConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    for (kind, factor) in &config.factors {
        if !factor.class_breaks.is_empty() {
            if kind.is_categorical() {
                return Err(invalid(
                    format!("factors.{}.class_breaks", kind),
                    "categorical factors are classified by category, not breaks",
                ));
            }
            validate_class_breaks(&format!("factors.{}.class_breaks", kind), &factor.class_breaks)?;
        }
        if let Some(rule) = &factor.rule {
            validate_rule(*kind, rule)?;
        }
    }

    validate_pairwise("flood.pairwise", &config.flood.pairwise)?;
    for kind in &config.flood.pairwise.factors {
        let has_rule = config
            .factor(*kind)
            .map(|f| f.rule.is_some())
            .unwrap_or(false);
        if !has_rule {
            return Err(ValidationError::MissingField(format!("factors.{}.rule", kind)));
        }
    }

    validate_landslide(config)?;
    validate_uncertainty(&config.uncertainty)?;
    validate_classification(&config.classification)?;
    validate_validation_defaults(&config.validation)?;

    config
        .study_area
        .validate()
        .map_err(|e| invalid("study_area", e.to_string()))?;

    Ok(())
}

/// Ascending exclusive upper bounds; only the last class is unbounded.
fn validate_class_breaks(field: &str, class_breaks: &[ClassBreak]) -> ValidationResult<()> {
    let mut labels = HashSet::new();
    let mut prev: Option<f64> = None;
    for (i, brk) in class_breaks.iter().enumerate() {
        let is_last = i + 1 == class_breaks.len();
        if brk.label.trim().is_empty() {
            return Err(invalid(format!("{}[{}].label", field, i), "must not be empty"));
        }
        if !labels.insert(brk.label.as_str()) {
            return Err(invalid(
                format!("{}[{}].label", field, i),
                format!("duplicate class label '{}'", brk.label),
            ));
        }
        match (brk.upper, is_last) {
            (None, true) => {}
            (None, false) => {
                return Err(invalid(
                    format!("{}[{}].upper", field, i),
                    "only the last class may be unbounded",
                ))
            }
            (Some(_), true) => {
                return Err(invalid(
                    format!("{}[{}].upper", field, i),
                    "the last class must be unbounded",
                ))
            }
            (Some(upper), false) => {
                if !upper.is_finite() {
                    return Err(invalid(format!("{}[{}].upper", field, i), "must be finite"));
                }
                if let Some(p) = prev {
                    if upper <= p {
                        return Err(invalid(
                            format!("{}[{}].upper", field, i),
                            format!("class breaks must increase ({} <= {})", upper, p),
                        ));
                    }
                }
                prev = Some(upper);
            }
        }
    }
    Ok(())
}

fn validate_rule(kind: FactorKind, rule: &ScoringRule) -> ValidationResult<()> {
    let field = format!("factors.{}.rule", kind);
    if rule.source().trim().is_empty() {
        return Err(ValidationError::MissingField(format!("{}.source", field)));
    }
    match rule {
        ScoringRule::Ramp { breakpoints, .. } => {
            if kind.is_categorical() {
                return Err(invalid(&field, "categorical factors need a lookup table"));
            }
            if breakpoints.is_empty() {
                return Err(invalid(&field, "ramp needs at least one breakpoint"));
            }
            for (i, [raw, score]) in breakpoints.iter().enumerate() {
                if !raw.is_finite() || !score.is_finite() || !(0.0..=1.0).contains(score) {
                    return Err(invalid(
                        format!("{}.breakpoints[{}]", field, i),
                        format!("need a finite raw value and a score in [0, 1], got [{}, {}]", raw, score),
                    ));
                }
            }
            let ascending_raw = breakpoints.windows(2).all(|w| w[0][0] < w[1][0]);
            if !ascending_raw {
                return Err(invalid(&field, "breakpoints must be sorted by strictly increasing raw value"));
            }
            let non_increasing = breakpoints.windows(2).all(|w| w[0][1] >= w[1][1]);
            let non_decreasing = breakpoints.windows(2).all(|w| w[0][1] <= w[1][1]);
            if !(non_increasing || non_decreasing) {
                return Err(invalid(&field, "ramp scores must be monotonic"));
            }
        }
        ScoringRule::Lookup { table, .. } => {
            if kind.is_continuous() {
                return Err(invalid(&field, "continuous factors need a ramp"));
            }
            if table.is_empty() {
                return Err(invalid(&field, "lookup table must not be empty"));
            }
            for (label, score) in table {
                if normalize_category(label) != *label {
                    return Err(invalid(
                        format!("{}.table.{}", field, label),
                        "category labels must be lower-case with '_' for spaces",
                    ));
                }
                if !score.is_finite() || !(0.0..=1.0).contains(score) {
                    return Err(invalid(
                        format!("{}.table.{}", field, label),
                        format!("score must be in [0, 1], got {}", score),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Structural checks on a pairwise matrix. Consistency (CR) is checked by
/// the AHP solver.
pub fn validate_pairwise(field: &str, pairwise: &PairwiseConfig) -> ValidationResult<()> {
    let n = pairwise.factors.len();
    if n == 0 || n > MAX_PAIRWISE_ORDER {
        return Err(invalid(
            format!("{}.factors", field),
            format!("need between 1 and {} factors, got {}", MAX_PAIRWISE_ORDER, n),
        ));
    }
    let unique: HashSet<FactorKind> = pairwise.factors.iter().copied().collect();
    if unique.len() != n {
        return Err(invalid(format!("{}.factors", field), "factor kinds must be unique"));
    }
    if pairwise.matrix.len() != n || pairwise.matrix.iter().any(|row| row.len() != n) {
        return Err(invalid(
            format!("{}.matrix", field),
            format!("must be {}x{} to match the factor list", n, n),
        ));
    }
    for i in 0..n {
        for j in 0..n {
            let v = pairwise.matrix[i][j];
            if !v.is_finite() || v <= 0.0 {
                return Err(invalid(
                    format!("{}.matrix[{}][{}]", field, i, j),
                    format!("entries must be positive and finite, got {}", v),
                ));
            }
        }
        if (pairwise.matrix[i][i] - 1.0).abs() > RECIPROCITY_TOLERANCE {
            return Err(invalid(
                format!("{}.matrix[{}][{}]", field, i, i),
                "diagonal entries must be 1",
            ));
        }
        for j in (i + 1)..n {
            let product = pairwise.matrix[i][j] * pairwise.matrix[j][i];
            if (product - 1.0).abs() > RECIPROCITY_TOLERANCE {
                return Err(invalid(
                    format!("{}.matrix[{}][{}]", field, j, i),
                    format!("must equal 1/matrix[{}][{}]", i, j),
                ));
            }
        }
    }
    Ok(())
}

fn validate_landslide(config: &EngineConfig) -> ValidationResult<()> {
    let ls: &LandslideModelConfig = &config.landslide;
    if ls.factors.is_empty() {
        return Err(invalid("landslide.factors", "must name at least one factor"));
    }
    let unique: HashSet<FactorKind> = ls.factors.iter().copied().collect();
    if unique.len() != ls.factors.len() {
        return Err(invalid("landslide.factors", "factor kinds must be unique"));
    }

    for kind in &ls.factors {
        let tallies = ls
            .tallies
            .get(kind)
            .ok_or_else(|| ValidationError::MissingField(format!("landslide.tallies.{}", kind)))?;
        if tallies.is_empty() {
            return Err(invalid(format!("landslide.tallies.{}", kind), "must list at least one class"));
        }
        let mut labels = HashSet::new();
        for t in tallies {
            if !labels.insert(t.class_label.as_str()) {
                return Err(invalid(
                    format!("landslide.tallies.{}", kind),
                    format!("duplicate class '{}'", t.class_label),
                ));
            }
        }
        if kind.is_continuous() {
            let has_breaks = config
                .factor(*kind)
                .map(|f| !f.class_breaks.is_empty())
                .unwrap_or(false);
            if !has_breaks {
                return Err(ValidationError::MissingField(format!(
                    "factors.{}.class_breaks",
                    kind
                )));
            }
        }
    }

    if let Some(weights) = &ls.weights {
        let normalized = weights
            .normalized()
            .map_err(|e| invalid("landslide.weights", e.to_string()))?;
        let keys: HashSet<FactorKind> = normalized.kinds().into_iter().collect();
        if keys != unique {
            return Err(invalid(
                "landslide.weights",
                "weights must name exactly the landslide factors",
            ));
        }
    }
    Ok(())
}

fn validate_uncertainty(u: &UncertaintyConfig) -> ValidationResult<()> {
    if !u.default_sigma.is_finite() || u.default_sigma < 0.0 {
        return Err(invalid(
            "uncertainty.default_sigma",
            format!("must be non-negative, got {}", u.default_sigma),
        ));
    }
    for (kind, sigma) in &u.sigma {
        if !sigma.is_finite() || *sigma < 0.0 {
            return Err(invalid(
                format!("uncertainty.sigma.{}", kind),
                format!("must be non-negative, got {}", sigma),
            ));
        }
    }
    Ok(())
}

fn validate_cutoffs(field: &str, cutoffs: &[f64]) -> ValidationResult<()> {
    if cutoffs.len() != 4 {
        return Err(invalid(field, format!("need 4 cut-offs for 5 bands, got {}", cutoffs.len())));
    }
    if cutoffs.iter().any(|c| !c.is_finite() || !(0.0..=100.0).contains(c)) {
        return Err(invalid(field, "cut-offs must lie in [0, 100]"));
    }
    if !cutoffs.windows(2).all(|w| w[0] < w[1]) {
        return Err(invalid(field, "cut-offs must be strictly increasing"));
    }
    Ok(())
}

fn validate_classification(c: &ClassificationConfig) -> ValidationResult<()> {
    validate_cutoffs("classification.percentiles", &c.percentiles)?;
    validate_cutoffs("classification.absolute_thresholds", &c.absolute_thresholds)
}

fn validate_validation_defaults(v: &ValidationDefaults) -> ValidationResult<()> {
    if !v.decision_threshold.is_finite() || !(0.0..=100.0).contains(&v.decision_threshold) {
        return Err(invalid("validation.decision_threshold", "must lie in [0, 100]"));
    }
    if v.cv_folds < 2 {
        return Err(invalid("validation.cv_folds", "need at least 2 folds"));
    }
    if v.min_class_samples == 0 {
        return Err(invalid("validation.min_class_samples", "must be at least 1"));
    }
    if !(v.grid_cell_deg.is_finite() && v.grid_cell_deg > 0.0) {
        return Err(invalid("validation.grid_cell_deg", "must be positive"));
    }
    Ok(())
}
