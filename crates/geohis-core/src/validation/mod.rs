//! Validation of susceptibility scores against a labelled hazard inventory.
//!
//! Computes discrimination (AUC with a bias-corrected bootstrap interval),
//! threshold metrics at `SI ≥ decision_threshold`, and optional spatial
//! k-fold cross-validation.

pub mod cv;
pub mod metrics;

use geohis_common::{Error, Hazard};
use rand::rngs::StdRng;
use rand::SeedableRng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use cv::{assign_folds, spatial_cv, FoldScore, SpatialGrouping};
pub use metrics::{
    auc_confidence_interval, rank_sum_auc, trapezoid_auc, ConfusionMatrix, ThresholdMetrics,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error(
        "insufficient samples: {positives} positives and {negatives} negatives (minimum {min_required} each)"
    )]
    InsufficientSamples {
        positives: usize,
        negatives: usize,
        min_required: usize,
    },
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InsufficientSamples {
                positives,
                negatives,
                min_required,
            } => Error::InsufficientSamples {
                positives,
                negatives,
                min_required,
            },
        }
    }
}

/// One labelled, in-area point.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationSample {
    pub point_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub si: f64,
    /// True for a recorded hazard occurrence.
    pub label: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOptions {
    pub decision_threshold: f64,
    /// `0` or `1` disables cross-validation.
    pub cv_folds: usize,
    pub auc_bootstrap_b: usize,
    pub min_class_samples: usize,
    pub grid_cell_deg: f64,
    /// Built-in grid when `None`.
    pub spatial_grouping: Option<SpatialGrouping>,
    pub seed: u64,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        ValidationOptions {
            decision_threshold: 60.0,
            cv_folds: 5,
            auc_bootstrap_b: 1000,
            min_class_samples: 10,
            grid_cell_deg: 0.05,
            spatial_grouping: None,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationReport {
    pub hazard: Hazard,
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub auc: f64,
    /// Trapezoidal ROC integral; agrees with `auc` to rounding.
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub auc_trapezoid: f64,
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub auc_ci_low: f64,
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub auc_ci_high: f64,
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub accuracy: f64,
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub recall: f64,
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub precision: f64,
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub f1: f64,
    /// `[[tn, fp], [fn, tp]]`.
    pub confusion_matrix: [[u64; 2]; 2],
    pub n_samples: usize,
    pub n_positive: usize,
    pub n_negative: usize,
    pub decision_threshold: f64,
    pub fold_scores: Vec<FoldScore>,
    #[serde(serialize_with = "geohis_common::numeric::sig6_opt")]
    pub cv_mean_auc: Option<f64>,
}

/// Validate SI values of one hazard against inventory labels.
///
/// Samples are sorted by point id first, so the report does not depend on
/// input order.
pub fn validate(
    hazard: Hazard,
    samples: &[ValidationSample],
    options: &ValidationOptions,
) -> Result<ValidationReport, ValidationError> {
    let mut samples = samples.to_vec();
    samples.sort_by(|a, b| a.point_id.cmp(&b.point_id));

    let n_positive = samples.iter().filter(|s| s.label).count();
    let n_negative = samples.len() - n_positive;
    if n_positive < options.min_class_samples || n_negative < options.min_class_samples {
        return Err(ValidationError::InsufficientSamples {
            positives: n_positive,
            negatives: n_negative,
            min_required: options.min_class_samples,
        });
    }

    let scored: Vec<(f64, bool)> = samples.iter().map(|s| (s.si, s.label)).collect();
    // Both classes are present once the minimum-count check passes, but a
    // zero minimum may still admit a one-class set.
    let auc = rank_sum_auc(&scored).unwrap_or(0.5);
    let auc_trapezoid = trapezoid_auc(&scored).unwrap_or(0.5);

    let mut rng = StdRng::seed_from_u64(options.seed);
    let (auc_ci_low, auc_ci_high) =
        auc_confidence_interval(&scored, auc, options.auc_bootstrap_b, &mut rng);

    let confusion = ConfusionMatrix::at_threshold(&scored, options.decision_threshold);
    let threshold_metrics = ThresholdMetrics::from_confusion(&confusion);

    let (fold_scores, cv_mean_auc) = if options.cv_folds >= 2 {
        let grouping = options
            .spatial_grouping
            .clone()
            .unwrap_or(SpatialGrouping::Grid { cell_deg: None });
        spatial_cv(
            &samples,
            &grouping,
            options.cv_folds,
            options.decision_threshold,
            options.seed,
            options.grid_cell_deg,
        )
    } else {
        (Vec::new(), None)
    };

    debug!(
        hazard = %hazard,
        auc,
        n_positive,
        n_negative,
        folds = fold_scores.len(),
        "validation complete"
    );

    Ok(ValidationReport {
        hazard,
        auc,
        auc_trapezoid,
        auc_ci_low,
        auc_ci_high,
        accuracy: threshold_metrics.accuracy,
        recall: threshold_metrics.recall,
        precision: threshold_metrics.precision,
        f1: threshold_metrics.f1,
        confusion_matrix: confusion.as_rows(),
        n_samples: samples.len(),
        n_positive,
        n_negative,
        decision_threshold: options.decision_threshold,
        fold_scores,
        cv_mean_auc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable(p: usize, n: usize) -> Vec<ValidationSample> {
        let mut out = Vec::new();
        for i in 0..p {
            out.push(ValidationSample {
                point_id: format!("pos{:03}", i),
                latitude: 5.5 + 0.02 * i as f64,
                longitude: -0.3,
                si: 80.0,
                label: true,
            });
        }
        for i in 0..n {
            out.push(ValidationSample {
                point_id: format!("neg{:03}", i),
                latitude: 5.5 + 0.02 * i as f64,
                longitude: -0.1,
                si: 20.0,
                label: false,
            });
        }
        out
    }

    #[test]
    fn test_separable_report() {
        let report = validate(Hazard::Flood, &separable(12, 14), &ValidationOptions::default())
            .unwrap();
        assert_eq!(report.auc, 1.0);
        assert_eq!(report.auc_trapezoid, 1.0);
        assert_eq!(report.confusion_matrix, [[14, 0], [0, 12]]);
        assert_eq!(report.n_samples, 26);
        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.fold_scores.len(), 5);
        assert!(report.auc_ci_low <= 1.0 && report.auc_ci_high == 1.0);
    }

    #[test]
    fn test_insufficient_samples() {
        let err = validate(Hazard::Landslide, &separable(9, 30), &ValidationOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InsufficientSamples {
                positives: 9,
                negatives: 30,
                min_required: 10
            }
        );
        assert_eq!(Error::from(err).code(), 40);
    }

    #[test]
    fn test_order_independent() {
        let samples = separable(10, 10);
        let mut reversed = samples.clone();
        reversed.reverse();
        let opts = ValidationOptions {
            seed: 17,
            ..Default::default()
        };
        let a = validate(Hazard::Flood, &samples, &opts).unwrap();
        let b = validate(Hazard::Flood, &reversed, &opts).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cv_disabled() {
        let opts = ValidationOptions {
            cv_folds: 0,
            ..Default::default()
        };
        let report = validate(Hazard::Flood, &separable(10, 10), &opts).unwrap();
        assert!(report.fold_scores.is_empty());
        assert_eq!(report.cv_mean_auc, None);
    }
}
