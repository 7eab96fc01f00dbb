//! Spatial k-fold cross-validation.
//!
//! Points are grouped into spatial clusters; whole clusters are withheld
//! together so that neighbouring, autocorrelated points never straddle a
//! fold boundary. Fold assignment is a seeded shuffle of the sorted cluster
//! ids followed by round-robin dealing.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::metrics::{rank_sum_auc, ConfusionMatrix, ThresholdMetrics};
use super::ValidationSample;

/// How points are grouped into spatial clusters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpatialGrouping {
    /// Regular lat/lon grid; `cell_deg` defaults to the configured size.
    Grid {
        #[serde(default)]
        cell_deg: Option<f64>,
    },
    /// Explicit point id → cluster id. Unlisted points form their own cluster.
    Clusters { assignments: BTreeMap<String, String> },
}

impl SpatialGrouping {
    pub fn cluster_of(&self, sample: &ValidationSample, default_cell_deg: f64) -> String {
        match self {
            SpatialGrouping::Grid { cell_deg } => {
                let cell = cell_deg.unwrap_or(default_cell_deg);
                let row = (sample.latitude / cell).floor() as i64;
                let col = (sample.longitude / cell).floor() as i64;
                format!("{}_{}", row, col)
            }
            SpatialGrouping::Clusters { assignments } => assignments
                .get(&sample.point_id)
                .cloned()
                .unwrap_or_else(|| format!("point:{}", sample.point_id)),
        }
    }
}

/// Metrics on one withheld fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FoldScore {
    pub fold: usize,
    pub n_clusters: usize,
    pub n_samples: usize,
    pub n_positive: usize,
    pub n_negative: usize,
    /// `None` when the fold lacks a class.
    #[serde(serialize_with = "geohis_common::numeric::sig6_opt")]
    pub auc: Option<f64>,
    #[serde(serialize_with = "geohis_common::numeric::sig6_opt")]
    pub accuracy: Option<f64>,
}

/// Fold index per cluster id.
pub fn assign_folds(clusters: &BTreeSet<String>, k: usize, seed: u64) -> BTreeMap<String, usize> {
    let mut ids: Vec<&String> = clusters.iter().collect();
    let mut rng = StdRng::seed_from_u64(seed);
    ids.shuffle(&mut rng);
    ids.into_iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), i % k.max(1)))
        .collect()
}

/// Run k-fold spatial CV. Returns per-fold scores and the mean of the
/// defined fold AUCs.
pub fn spatial_cv(
    samples: &[ValidationSample],
    grouping: &SpatialGrouping,
    k: usize,
    threshold: f64,
    seed: u64,
    default_cell_deg: f64,
) -> (Vec<FoldScore>, Option<f64>) {
    let clusters: Vec<String> = samples
        .iter()
        .map(|s| grouping.cluster_of(s, default_cell_deg))
        .collect();
    let unique: BTreeSet<String> = clusters.iter().cloned().collect();
    let folds = assign_folds(&unique, k, seed);

    let mut scores = Vec::with_capacity(k);
    for fold in 0..k {
        let held: Vec<(f64, bool)> = samples
            .iter()
            .zip(&clusters)
            .filter(|(_, c)| folds.get(*c) == Some(&fold))
            .map(|(s, _)| (s.si, s.label))
            .collect();
        let n_positive = held.iter().filter(|(_, y)| *y).count();
        let accuracy = (!held.is_empty()).then(|| {
            ThresholdMetrics::from_confusion(&ConfusionMatrix::at_threshold(&held, threshold))
                .accuracy
        });
        scores.push(FoldScore {
            fold,
            n_clusters: folds.values().filter(|f| **f == fold).count(),
            n_samples: held.len(),
            n_positive,
            n_negative: held.len() - n_positive,
            auc: rank_sum_auc(&held),
            accuracy,
        });
    }

    let defined: Vec<f64> = scores.iter().filter_map(|s| s.auc).collect();
    let mean = (!defined.is_empty()).then(|| defined.iter().sum::<f64>() / defined.len() as f64);
    (scores, mean)
}
