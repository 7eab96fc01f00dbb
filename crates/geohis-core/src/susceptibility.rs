//! Susceptibility indices, classification and combined-risk fusion.
//!
//! Flood SI is the weighted mean of factor scores scaled to 0–100. Landslide
//! raw scores are weighted sums of frequency ratios, min-max rescaled over
//! the in-area points. Bands come from percentile cut-offs of the in-area SI
//! distribution, or fixed thresholds when fewer than two points are in area
//! or the in-area SI values are all equal.

use geohis_common::{Band, FactorKind, WeightVector};
use geohis_config::ClassificationConfig;
use geohis_math::{percentile_sorted, sort_floats};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Ranges narrower than this are treated as degenerate.
pub const DEGENERATE_RANGE: f64 = 1e-12;

/// SI assigned when neither the observed nor the theoretical landslide
/// range can separate points.
pub const FLAT_RANGE_SI: f64 = 50.0;

/// Σ w·x / Σ w over the contributions whose factor carries a weight.
///
/// Weights of absent factors drop out, which renormalizes the remaining
/// weights per point. `None` when no contribution is weighted.
pub fn weighted_mean(contributions: &[(FactorKind, f64)], weights: &WeightVector) -> Option<f64> {
    let mut num = 0.0;
    let mut den = 0.0;
    for (kind, x) in contributions {
        if let Some(w) = weights.get(*kind) {
            num += w * x;
            den += w;
        }
    }
    (den > 0.0).then(|| num / den)
}

/// Flood SI in [0, 100] from factor scores in [0, 1].
pub fn flood_si(scores: &[(FactorKind, f64)], weights: &WeightVector) -> Option<f64> {
    weighted_mean(scores, weights).map(|m| (100.0 * m).clamp(0.0, 100.0))
}

/// Raw landslide score: weighted mean of frequency ratios.
pub fn landslide_raw(ratios: &[(FactorKind, f64)], weights: &WeightVector) -> Option<f64> {
    weighted_mean(ratios, weights)
}

/// Min-max rescaling of raw landslide scores onto 0–100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LandslideScaler {
    pub low: f64,
    pub high: f64,
    /// True when the theoretical range replaced a degenerate observed one.
    pub theoretical: bool,
}

impl LandslideScaler {
    /// Scale over the observed in-area raw scores, falling back to the
    /// theoretical range Σw·min FR … Σw·max FR when the observed range is
    /// degenerate or empty.
    pub fn fit(in_area_raw: &[f64], theoretical: (f64, f64)) -> Self {
        let low = in_area_raw.iter().copied().fold(f64::INFINITY, f64::min);
        let high = in_area_raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if high - low >= DEGENERATE_RANGE {
            LandslideScaler {
                low,
                high,
                theoretical: false,
            }
        } else {
            LandslideScaler {
                low: theoretical.0,
                high: theoretical.1,
                theoretical: true,
            }
        }
    }

    pub fn rescale(&self, raw: f64) -> f64 {
        let span = self.high - self.low;
        if !(span >= DEGENERATE_RANGE) {
            return FLAT_RANGE_SI;
        }
        (100.0 * (raw - self.low) / span).clamp(0.0, 100.0)
    }
}

/// How band cut-offs were derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CutoffMode {
    Percentile,
    Absolute,
}

/// Maps SI values onto the five ordered bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Classifier {
    pub mode: CutoffMode,
    #[serde(serialize_with = "serialize_cutoffs")]
    pub cutoffs: Vec<f64>,
}

fn serialize_cutoffs<S: serde::Serializer>(v: &[f64], s: S) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeSeq;
    let mut seq = s.serialize_seq(Some(v.len()))?;
    for x in v {
        seq.serialize_element(&geohis_common::numeric::round_sig(*x, 6))?;
    }
    seq.end()
}

impl Classifier {
    /// Percentile cut-offs with two or more in-area points spanning a
    /// non-degenerate SI range, absolute thresholds otherwise.
    pub fn from_in_area(in_area_si: &[f64], config: &ClassificationConfig) -> Self {
        let mut sorted = in_area_si.to_vec();
        sort_floats(&mut sorted);
        let spread = match (sorted.first(), sorted.last()) {
            (Some(lo), Some(hi)) => hi - lo,
            _ => 0.0,
        };
        if sorted.len() >= 2 && spread >= DEGENERATE_RANGE {
            Classifier {
                mode: CutoffMode::Percentile,
                cutoffs: config
                    .percentiles
                    .iter()
                    .map(|p| percentile_sorted(&sorted, *p))
                    .collect(),
            }
        } else {
            Self::absolute(config)
        }
    }

    pub fn absolute(config: &ClassificationConfig) -> Self {
        Classifier {
            mode: CutoffMode::Absolute,
            cutoffs: config.absolute_thresholds.clone(),
        }
    }

    /// Band index = number of cut-offs ≤ SI.
    ///
    /// When SI sits on a cut-off value shared by several percentiles, the
    /// point takes the middle of the band span those cut-offs cover.
    pub fn band(&self, si: f64) -> Band {
        let upper = self.cutoffs.iter().filter(|c| **c <= si).count();
        let lower = self.cutoffs.iter().filter(|c| **c < si).count();
        if upper - lower > 1 {
            Band::from_index((lower + upper) / 2)
        } else {
            Band::from_index(upper)
        }
    }
}

/// Combined flood/landslide risk: Critical if either is Critical, High if
/// both are at least High, otherwise the higher of the two.
pub fn fuse(flood: Band, landslide: Band) -> Band {
    if flood == Band::Critical || landslide == Band::Critical {
        Band::Critical
    } else if flood >= Band::High && landslide >= Band::High {
        Band::High
    } else {
        flood.max(landslide)
    }
}
