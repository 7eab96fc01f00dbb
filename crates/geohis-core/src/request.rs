//! Analysis request types.
//!
//! [`AnalysisRequest`] is the typed engine input. [`AnalysisInput`] is the
//! document the CLI reads: the same request with factor values inlined per
//! point and an optional session id.

use chrono::{DateTime, Utc};
use geohis_common::{assign_point_ids, FactorKind, Hazard, Point, RawValue, SessionId, StudyArea};
use geohis_common::{Error, WeightVector};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::sampler::TableSource;
use crate::validation::SpatialGrouping;

/// A replacement pairwise comparison matrix for the flood model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PairwiseOverride {
    pub factors: Vec<FactorKind>,
    pub matrix: Vec<Vec<f64>>,
}

/// Caller-supplied weights. Vectors are renormalized when Σ ≠ 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WeightsOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flood: Option<WeightVector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landslide: Option<WeightVector>,
    /// Mutually exclusive with `flood`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flood_pairwise: Option<PairwiseOverride>,
}

impl WeightsOverride {
    pub fn is_empty(&self) -> bool {
        self.flood.is_none() && self.landslide.is_none() && self.flood_pairwise.is_none()
    }
}

fn default_validation_hazard() -> Hazard {
    Hazard::Flood
}

fn default_true() -> bool {
    true
}

/// Per-request knobs; `None` falls back to the engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_b: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_folds: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_threshold: Option<f64>,
    /// Attach chi-square tests to the frequency-ratio fit.
    #[serde(default)]
    pub enable_significance_test: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auc_bootstrap_b: Option<usize>,
    /// Hazard whose SI is validated against the inventory.
    #[serde(default = "default_validation_hazard")]
    pub validation_hazard: Hazard,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_grouping: Option<SpatialGrouping>,
    #[serde(default = "default_true")]
    pub enable_sensitivity: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            bootstrap_b: None,
            cv_folds: None,
            decision_threshold: None,
            enable_significance_test: false,
            auc_bootstrap_b: None,
            validation_hazard: default_validation_hazard(),
            spatial_grouping: None,
            enable_sensitivity: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisRequest {
    pub session_id: SessionId,
    pub points: Vec<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_area: Option<StudyArea>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights_override: Option<WeightsOverride>,
    /// Point id → 1 (hazard observed) or 0 (no hazard).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<BTreeMap<String, u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Stamped into the result; the current time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub options: AnalysisOptions,
}

impl AnalysisRequest {
    pub fn new(session_id: SessionId, points: Vec<Point>) -> Self {
        AnalysisRequest {
            session_id,
            points,
            study_area: None,
            weights_override: None,
            inventory: None,
            seed: None,
            requested_at: None,
            options: AnalysisOptions::default(),
        }
    }

    /// The explicit seed, or one derived from the session id.
    pub fn resolved_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| {
            let bytes = self.session_id.0.as_bytes();
            let mut head = [0u8; 8];
            head.copy_from_slice(&bytes[..8]);
            u64::from_le_bytes(head)
        })
    }
}

/// A point together with its factor values, as read from an input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InputPoint {
    #[serde(flatten)]
    pub point: Point,
    #[serde(default)]
    pub factors: BTreeMap<FactorKind, RawValue>,
}

/// The `geohis analyze --input` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisInput {
    /// Generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub points: Vec<InputPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_area: Option<StudyArea>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights_override: Option<WeightsOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<BTreeMap<String, u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub options: AnalysisOptions,
}

impl AnalysisInput {
    pub fn from_json_str(content: &str) -> Result<Self, Error> {
        serde_json::from_str(content)
            .map_err(|e| Error::MalformedInput(format!("input document: {}", e)))
    }

    /// Split into the engine request and a table source keyed by the ids
    /// the engine will assign.
    pub fn into_request(self) -> (AnalysisRequest, TableSource) {
        let points: Vec<Point> = self.points.iter().map(|p| p.point.clone()).collect();
        let ids = assign_point_ids(&points);
        let mut table = TableSource::new();
        for (id, input) in ids.into_iter().zip(self.points) {
            table.insert_row(id, input.factors);
        }
        let request = AnalysisRequest {
            session_id: self.session_id.unwrap_or_default(),
            points,
            study_area: self.study_area,
            weights_override: self.weights_override,
            inventory: self.inventory,
            seed: self.seed,
            requested_at: self.requested_at,
            options: self.options,
        };
        (request, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::FactorSource;
    use geohis_common::PointId;

    #[test]
    fn test_input_document_round_trip_to_request() {
        let json = r#"{
            "session_id": "6f1d2c34-5a6b-4c7d-8e9f-0a1b2c3d4e5f",
            "points": [
                {"latitude": 5.6, "longitude": -0.2, "id": "kaneshie",
                 "factors": {"elevation": 12.0, "land_use": "Built Up"}},
                {"latitude": 5.65, "longitude": -0.18,
                 "factors": {"slope": 3.5}}
            ],
            "inventory": {"kaneshie": 1},
            "seed": 7
        }"#;
        let input = AnalysisInput::from_json_str(json).unwrap();
        let (request, table) = input.into_request();
        assert_eq!(request.points.len(), 2);
        assert_eq!(request.resolved_seed(), 7);
        assert!(request.options.enable_sensitivity);
        assert_eq!(request.options.validation_hazard, Hazard::Flood);

        let second = PointId::from_coordinates(5.65, -0.18);
        assert_eq!(
            table.sample(&request.points[1], &second, FactorKind::Slope),
            Some(RawValue::Numeric(3.5))
        );
        assert_eq!(
            table.sample(&request.points[0], &PointId::from("kaneshie"), FactorKind::LandUse),
            Some(RawValue::Categorical("Built Up".to_string()))
        );
    }

    #[test]
    fn test_seed_derived_from_session() {
        let session = SessionId::parse("00000000-0000-0000-0000-000000000000").unwrap();
        let request = AnalysisRequest::new(session, vec![Point::new(0.0, 0.0)]);
        assert_eq!(request.resolved_seed(), 0);
        let other = AnalysisRequest::new(SessionId::new(), vec![Point::new(0.0, 0.0)]);
        assert_eq!(other.resolved_seed(), other.resolved_seed());
    }

    #[test]
    fn test_malformed_document() {
        let err = AnalysisInput::from_json_str(r#"{"points": 3}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }
}
