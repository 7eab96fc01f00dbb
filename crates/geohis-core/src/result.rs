//! Analysis result types.
//!
//! Results are immutable values serialized with stable key order. SI values
//! carry 6 significant figures, frequency ratios 4 and weights 3.

use chrono::{DateTime, Utc};
use geohis_common::{
    Band, ErrorRecord, FactorKind, Hazard, SessionId, Stage, StudyArea, WeightVector,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ahp::Consistency;
use crate::frequency_ratio::{ChiSquareTest, FrClassEntry};
use crate::susceptibility::{Classifier, LandslideScaler};
use crate::uncertainty::{SensitivityEntry, SensitivitySummary};
use crate::validation::ValidationReport;

/// Coordinator state. The last four are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisState {
    Idle,
    Validating,
    Sampling,
    Scoring,
    Weighting,
    Combining,
    Classifying,
    Quantifying,
    ValidatingResults,
    Done,
    RejectedInput,
    InconsistentWeights,
    InternalError,
    Cancelled,
}

impl AnalysisState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisState::Done
                | AnalysisState::RejectedInput
                | AnalysisState::InconsistentWeights
                | AnalysisState::InternalError
                | AnalysisState::Cancelled
        )
    }
}

impl From<Stage> for AnalysisState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Validating => AnalysisState::Validating,
            Stage::Sampling => AnalysisState::Sampling,
            Stage::Scoring => AnalysisState::Scoring,
            Stage::Weighting => AnalysisState::Weighting,
            Stage::Combining => AnalysisState::Combining,
            Stage::Classifying => AnalysisState::Classifying,
            Stage::Quantifying => AnalysisState::Quantifying,
            Stage::ValidatingResults => AnalysisState::ValidatingResults,
        }
    }
}

/// SI of one point for one hazard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SusceptibilityScore {
    pub hazard: Hazard,
    pub point_id: String,
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub si: f64,
    pub band: Band,
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub ci_low: f64,
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub ci_high: f64,
    pub in_area: bool,
    pub factors_used: Vec<FactorKind>,
    pub sensitivity: Vec<SensitivityEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CombinedRisk {
    pub point_id: String,
    pub flood_band: Band,
    pub landslide_band: Band,
    pub band: Band,
}

/// Chi-square test of one landslide factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FactorSignificance {
    pub factor: FactorKind,
    pub smoothed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chi_square: Option<ChiSquareTest>,
}

/// Distribution statistics of one hazard over in-area points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HazardSummary {
    pub scored_points: usize,
    pub in_area_points: usize,
    #[serde(serialize_with = "geohis_common::numeric::sig6_opt")]
    pub mean_si: Option<f64>,
    #[serde(serialize_with = "geohis_common::numeric::sig6_opt")]
    pub min_si: Option<f64>,
    #[serde(serialize_with = "geohis_common::numeric::sig6_opt")]
    pub max_si: Option<f64>,
    /// Band counts over in-area points.
    pub band_counts: BTreeMap<Band, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<Classifier>,
}

impl HazardSummary {
    /// Summarize `(si, band, in_area)` triples.
    pub fn from_scores(scores: &[SusceptibilityScore], classifier: Option<Classifier>) -> Self {
        let in_area: Vec<&SusceptibilityScore> = scores.iter().filter(|s| s.in_area).collect();
        let mut band_counts: BTreeMap<Band, usize> = Band::ALL.iter().map(|b| (*b, 0)).collect();
        for s in &in_area {
            *band_counts.entry(s.band).or_insert(0) += 1;
        }
        let mut si: Vec<f64> = in_area.iter().map(|s| s.si).collect();
        geohis_math::sort_floats(&mut si);
        HazardSummary {
            scored_points: scores.len(),
            in_area_points: in_area.len(),
            mean_si: (!si.is_empty()).then(|| geohis_math::stable_mean(&si)),
            min_si: si.first().copied(),
            max_si: si.last().copied(),
            band_counts,
            classifier,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisSummary {
    pub flood: HazardSummary,
    pub landslide: HazardSummary,
    /// Combined-risk band counts over in-area points.
    pub combined_band_counts: BTreeMap<Band, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landslide_scaler: Option<LandslideScaler>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub significance: Vec<FactorSignificance>,
}

/// The engine response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    pub session_id: SessionId,
    /// The request's `requested_at`; null when the request carried none.
    pub timestamp: Option<DateTime<Utc>>,
    pub seed: u64,
    pub state: AnalysisState,
    pub cancelled: bool,
    pub study_area: StudyArea,
    pub in_area_count: usize,
    pub flood_weights: Option<WeightVector>,
    pub landslide_weights: Option<WeightVector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flood_consistency: Option<Consistency>,
    pub flood_scores: Vec<SusceptibilityScore>,
    pub landslide_scores: Vec<SusceptibilityScore>,
    pub combined_risk: Vec<CombinedRisk>,
    pub frequency_ratios: Vec<FrClassEntry>,
    pub summary: AnalysisSummary,
    pub sensitivity_summary: SensitivitySummary,
    pub validation: Option<ValidationReport>,
    pub errors: Vec<ErrorRecord>,
    pub config_hash: String,
}

impl AnalysisResult {
    /// Pretty JSON as persisted to disk.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.errors.iter().filter(|e| e.recoverable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(si: f64, band: Band, in_area: bool) -> SusceptibilityScore {
        SusceptibilityScore {
            hazard: Hazard::Flood,
            point_id: format!("p{}", si),
            si,
            band,
            ci_low: si,
            ci_high: si,
            in_area,
            factors_used: vec![FactorKind::Slope],
            sensitivity: Vec::new(),
        }
    }

    #[test]
    fn test_summary_ignores_out_of_area() {
        let scores = vec![
            score(10.0, Band::VeryLow, true),
            score(90.0, Band::Critical, true),
            score(99.0, Band::Critical, false),
        ];
        let summary = HazardSummary::from_scores(&scores, None);
        assert_eq!(summary.scored_points, 3);
        assert_eq!(summary.in_area_points, 2);
        assert_eq!(summary.mean_si, Some(50.0));
        assert_eq!(summary.max_si, Some(90.0));
        assert_eq!(summary.band_counts[&Band::Critical], 1);
        assert_eq!(summary.band_counts[&Band::Moderate], 0);
    }

    #[test]
    fn test_score_serializes_rounded() {
        let s = score(50.123456789, Band::Moderate, true);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["si"], serde_json::json!(50.1235));
        assert_eq!(json["hazard"], serde_json::json!("flood"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(AnalysisState::Done.is_terminal());
        assert!(AnalysisState::Cancelled.is_terminal());
        assert!(!AnalysisState::Quantifying.is_terminal());
        assert_eq!(
            AnalysisState::from(Stage::ValidatingResults),
            AnalysisState::ValidatingResults
        );
    }
}
