//! Discrimination and threshold metrics.
//!
//! AUC is computed twice: by the Mann–Whitney rank sum with mid-ranks (ties
//! count one half) and by trapezoidal integration of the ROC curve with
//! tied scores forming one diagonal segment. The two agree to rounding.

use geohis_math::{mid_ranks, normal_cdf, normal_quantile, percentile_sorted, sort_floats};
use rand::rngs::StdRng;
use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Redraws allowed for a bootstrap resample that lacks one class.
const MAX_REDRAWS: usize = 100;

/// Confusion matrix at a decision threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub tn: u64,
    pub fp: u64,
    pub fn_: u64,
    pub tp: u64,
}

impl ConfusionMatrix {
    /// Count predictions `score ≥ threshold` against labels.
    pub fn at_threshold(samples: &[(f64, bool)], threshold: f64) -> Self {
        let mut m = ConfusionMatrix::default();
        for (score, actual) in samples {
            match (*score >= threshold, *actual) {
                (true, true) => m.tp += 1,
                (true, false) => m.fp += 1,
                (false, true) => m.fn_ += 1,
                (false, false) => m.tn += 1,
            }
        }
        m
    }

    /// `[[tn, fp], [fn, tp]]`.
    pub fn as_rows(&self) -> [[u64; 2]; 2] {
        [[self.tn, self.fp], [self.fn_, self.tp]]
    }

    pub fn total(&self) -> u64 {
        self.tn + self.fp + self.fn_ + self.tp
    }
}

/// Threshold metrics derived from a confusion matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ThresholdMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl ThresholdMetrics {
    pub fn from_confusion(m: &ConfusionMatrix) -> Self {
        let ratio = |num: u64, den: u64| if den > 0 { num as f64 / den as f64 } else { 0.0 };
        let accuracy = ratio(m.tp + m.tn, m.total());
        let precision = ratio(m.tp, m.tp + m.fp);
        let recall = ratio(m.tp, m.tp + m.fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        ThresholdMetrics {
            accuracy,
            precision,
            recall,
            f1,
        }
    }
}

fn class_counts(samples: &[(f64, bool)]) -> (usize, usize) {
    let positives = samples.iter().filter(|(_, y)| *y).count();
    (positives, samples.len() - positives)
}

/// Mann–Whitney AUC; `None` unless both classes are present.
pub fn rank_sum_auc(samples: &[(f64, bool)]) -> Option<f64> {
    let (n_pos, n_neg) = class_counts(samples);
    if n_pos == 0 || n_neg == 0 {
        return None;
    }
    let scores: Vec<f64> = samples.iter().map(|(s, _)| *s).collect();
    let ranks = mid_ranks(&scores);
    let rank_sum: f64 = ranks
        .iter()
        .zip(samples)
        .filter(|(_, (_, y))| *y)
        .map(|(r, _)| r)
        .sum();
    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Trapezoidal ROC AUC; `None` unless both classes are present.
pub fn trapezoid_auc(samples: &[(f64, bool)]) -> Option<f64> {
    let (n_pos, n_neg) = class_counts(samples);
    if n_pos == 0 || n_neg == 0 {
        return None;
    }
    let mut sorted: Vec<(f64, bool)> = samples.to_vec();
    sorted.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut area = 0.0;
    let (mut tp, mut fp) = (0.0, 0.0);
    let mut i = 0;
    while i < sorted.len() {
        let (prev_tp, prev_fp) = (tp, fp);
        let score = sorted[i].0;
        while i < sorted.len() && sorted[i].0 == score {
            if sorted[i].1 {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            i += 1;
        }
        area += (fp - prev_fp) * (tp + prev_tp) / 2.0;
    }
    Some(area / (n_pos as f64 * n_neg as f64))
}

/// Bias-corrected percentile bootstrap 95% interval for the AUC.
///
/// Resamples lacking a class are redrawn. `b == 0` collapses the interval
/// onto `auc`.
pub fn auc_confidence_interval(
    samples: &[(f64, bool)],
    auc: f64,
    b: usize,
    rng: &mut StdRng,
) -> (f64, f64) {
    if b == 0 || samples.is_empty() {
        return (auc, auc);
    }
    let n = samples.len();
    let mut resample: Vec<(f64, bool)> = Vec::with_capacity(n);
    let mut draws: Vec<f64> = Vec::with_capacity(b);
    for _ in 0..b {
        for _ in 0..MAX_REDRAWS {
            resample.clear();
            resample.extend((0..n).map(|_| samples[rng.random_range(0..n)]));
            if let Some(a) = rank_sum_auc(&resample) {
                draws.push(a);
                break;
            }
        }
    }
    if draws.is_empty() {
        return (auc, auc);
    }

    // Ties with the estimate count half, so a degenerate bootstrap
    // distribution gives z0 = 0.
    let below = draws.iter().filter(|d| **d < auc).count() as f64;
    let equal = draws.iter().filter(|d| **d == auc).count() as f64;
    let m = draws.len() as f64;
    let p0 = ((below + 0.5 * equal) / m).clamp(0.5 / m, 1.0 - 0.5 / m);
    let z0 = normal_quantile(p0);
    let z_lo = normal_quantile(0.025);
    let z_hi = normal_quantile(0.975);
    let a_lo = normal_cdf(2.0 * z0 + z_lo);
    let a_hi = normal_cdf(2.0 * z0 + z_hi);

    sort_floats(&mut draws);
    let lo = percentile_sorted(&draws, 100.0 * a_lo);
    let hi = percentile_sorted(&draws, 100.0 * a_hi);
    (lo.min(auc).clamp(0.0, 1.0), hi.max(auc).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn separable(p: usize, n: usize) -> Vec<(f64, bool)> {
        let mut s: Vec<(f64, bool)> = (0..p).map(|_| (80.0, true)).collect();
        s.extend((0..n).map(|_| (20.0, false)));
        s
    }

    #[test]
    fn test_separable_auc_and_confusion() {
        let samples = separable(12, 15);
        assert_eq!(rank_sum_auc(&samples), Some(1.0));
        assert_eq!(trapezoid_auc(&samples), Some(1.0));
        let m = ConfusionMatrix::at_threshold(&samples, 60.0);
        assert_eq!(m.as_rows(), [[15, 0], [0, 12]]);
        let t = ThresholdMetrics::from_confusion(&m);
        assert_eq!(t.accuracy, 1.0);
        assert_eq!(t.f1, 1.0);
    }

    #[test]
    fn test_ties_count_half() {
        let samples = vec![(50.0, true), (50.0, false)];
        assert_eq!(rank_sum_auc(&samples), Some(0.5));
        assert_eq!(trapezoid_auc(&samples), Some(0.5));
    }

    #[test]
    fn test_rank_sum_matches_trapezoid() {
        let samples = vec![
            (10.0, false),
            (20.0, true),
            (20.0, false),
            (35.0, false),
            (40.0, true),
            (55.0, true),
            (55.0, false),
            (70.0, true),
        ];
        let a = rank_sum_auc(&samples).unwrap();
        let b = trapezoid_auc(&samples).unwrap();
        assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
    }

    #[test]
    fn test_single_class_has_no_auc() {
        assert_eq!(rank_sum_auc(&[(1.0, true), (2.0, true)]), None);
        assert_eq!(trapezoid_auc(&[]), None);
    }

    #[test]
    fn test_threshold_metrics_without_predictions() {
        let m = ConfusionMatrix::at_threshold(&[(10.0, true), (5.0, false)], 60.0);
        let t = ThresholdMetrics::from_confusion(&m);
        assert_eq!(t.precision, 0.0);
        assert_eq!(t.recall, 0.0);
        assert_eq!(t.f1, 0.0);
        assert_eq!(t.accuracy, 0.5);
    }

    #[test]
    fn test_bootstrap_ci_brackets_estimate() {
        let mut samples = Vec::new();
        for i in 0..30 {
            samples.push((40.0 + i as f64, true));
            samples.push((20.0 + i as f64, false));
        }
        let auc = rank_sum_auc(&samples).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let (lo, hi) = auc_confidence_interval(&samples, auc, 300, &mut rng);
        assert!(lo <= auc && auc <= hi);
        assert!(lo >= 0.0 && hi <= 1.0);
        assert!(hi > lo);

        let sep = separable(10, 10);
        let (lo, hi) = auc_confidence_interval(&sep, 1.0, 100, &mut rng);
        assert_eq!((lo, hi), (1.0, 1.0));
    }
}
