//! Bootstrap confidence intervals and one-at-a-time sensitivity.
//!
//! Every bootstrap draw perturbs each used factor contribution by a normal
//! error truncated to [0, 1] and recomputes the SI. The RNG for a point is
//! seeded from SHA-256(seed, hazard, point_id), so draws depend only on the
//! point itself and not on its position in the input.

use geohis_common::{FactorKind, Hazard, PointId, WeightVector};
use geohis_config::UncertaintyConfig;
use geohis_math::{percentile_sorted, sort_floats};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::f64::consts::PI;

/// Rejected truncated-normal proposals before clamping.
pub const MAX_REJECTIONS: usize = 32;

pub const CI_LOW_PERCENTILE: f64 = 2.5;
pub const CI_HIGH_PERCENTILE: f64 = 97.5;

/// Deterministic per-point RNG.
pub fn point_rng(seed: u64, hazard: Hazard, point_id: &PointId) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(hazard.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(point_id.as_str().as_bytes());
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    StdRng::from_seed(key)
}

/// Standard normal deviate (Box–Muller).
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// N(mean, sigma) truncated to [0, 1] by rejection; clamps after
/// [`MAX_REJECTIONS`] misses.
pub fn truncated_normal<R: Rng + ?Sized>(rng: &mut R, mean: f64, sigma: f64) -> f64 {
    if sigma <= 0.0 {
        return mean.clamp(0.0, 1.0);
    }
    let mut x = mean;
    for _ in 0..MAX_REJECTIONS {
        x = mean + sigma * standard_normal(rng);
        if (0.0..=1.0).contains(&x) {
            return x;
        }
    }
    x.clamp(0.0, 1.0)
}

/// Percentile interval of `b` draws, widened to contain `estimate`.
/// `b == 0` disables the bootstrap: the interval collapses onto `estimate`.
pub fn bootstrap_interval<F>(estimate: f64, b: usize, mut draw: F) -> (f64, f64)
where
    F: FnMut() -> Option<f64>,
{
    if b == 0 {
        return (estimate, estimate);
    }
    let mut draws: Vec<f64> = (0..b).filter_map(|_| draw()).collect();
    if draws.is_empty() {
        return (estimate, estimate);
    }
    sort_floats(&mut draws);
    let low = percentile_sorted(&draws, CI_LOW_PERCENTILE);
    let high = percentile_sorted(&draws, CI_HIGH_PERCENTILE);
    (low.min(estimate), high.max(estimate))
}

/// A factor's contribution at one point, in the [0, 1] space that is
/// perturbed. `scale` maps it back to model units (1 for flood scores,
/// the factor's maximum class FR for landslide ratios).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    pub kind: FactorKind,
    pub normalized: f64,
    pub scale: f64,
}

impl Contribution {
    pub fn value(&self) -> f64 {
        self.normalized * self.scale
    }
}

/// Bootstrap interval for one point.
///
/// `si_of` turns model-unit contributions into an SI (weighted mean and,
/// for landslide, rescaling).
pub fn bootstrap_point<F>(
    estimate: f64,
    contributions: &[Contribution],
    config: &UncertaintyConfig,
    b: usize,
    rng: &mut StdRng,
    si_of: F,
) -> (f64, f64)
where
    F: Fn(&[(FactorKind, f64)]) -> Option<f64>,
{
    let mut perturbed: Vec<(FactorKind, f64)> = Vec::with_capacity(contributions.len());
    bootstrap_interval(estimate, b, || {
        perturbed.clear();
        for c in contributions {
            let x = truncated_normal(rng, c.normalized, config.sigma_for(c.kind));
            perturbed.push((c.kind, x * c.scale));
        }
        si_of(&perturbed)
    })
}

/// SI with one factor removed and the remaining weights renormalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SensitivityEntry {
    pub factor: FactorKind,
    /// `None` when the factor was the only one used.
    #[serde(serialize_with = "geohis_common::numeric::sig6_opt")]
    pub si_without: Option<f64>,
    #[serde(serialize_with = "geohis_common::numeric::sig6_opt")]
    pub delta_si: Option<f64>,
}

/// One-at-a-time sensitivity for every used factor, in contribution order.
pub fn oat_sensitivity<F>(
    si: f64,
    contributions: &[(FactorKind, f64)],
    weights: &WeightVector,
    si_of: F,
) -> Vec<SensitivityEntry>
where
    F: Fn(&[(FactorKind, f64)], &WeightVector) -> Option<f64>,
{
    contributions
        .iter()
        .map(|(kind, _)| {
            let rest: Vec<(FactorKind, f64)> = contributions
                .iter()
                .filter(|(k, _)| k != kind)
                .copied()
                .collect();
            let remaining: Vec<FactorKind> = rest.iter().map(|(k, _)| *k).collect();
            let si_without = weights
                .restricted_to(&remaining)
                .and_then(|w| si_of(&rest, &w));
            SensitivityEntry {
                factor: *kind,
                si_without,
                delta_si: si_without.map(|s| s - si),
            }
        })
        .collect()
}

/// Mean |ΔSI| for one factor over the in-area points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FactorSensitivity {
    pub factor: FactorKind,
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub mean_abs_delta_si: f64,
    pub n_points: usize,
}

/// Analysis-wide sensitivity, per hazard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SensitivitySummary {
    pub flood: Vec<FactorSensitivity>,
    pub landslide: Vec<FactorSensitivity>,
}

/// Summarize per-point entries of in-area points, ordered by `kinds`.
pub fn summarize<'a, I>(kinds: &[FactorKind], per_point: I) -> Vec<FactorSensitivity>
where
    I: IntoIterator<Item = &'a [SensitivityEntry]>,
{
    let mut sums = vec![0.0; kinds.len()];
    let mut counts = vec![0usize; kinds.len()];
    for entries in per_point {
        for entry in entries {
            let (Some(idx), Some(delta)) = (
                kinds.iter().position(|k| *k == entry.factor),
                entry.delta_si,
            ) else {
                continue;
            };
            sums[idx] += delta.abs();
            counts[idx] += 1;
        }
    }
    kinds
        .iter()
        .zip(sums.iter().zip(&counts))
        .filter(|(_, (_, n))| **n > 0)
        .map(|(kind, (sum, n))| FactorSensitivity {
            factor: *kind,
            mean_abs_delta_si: sum / *n as f64,
            n_points: *n,
        })
        .collect()
}
