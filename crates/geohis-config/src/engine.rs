//! Engine configuration types.
//!
//! Per-factor configuration is a keyed record indexed by [`FactorKind`].
//! Every scoring rule and tally set carries a `source` citation.

use geohis_common::{FactorKind, StudyArea, WeightVector};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::validate::{ValidationError, ValidationResult};

/// Complete engine configuration, captured by value at analysis start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EngineConfig {
    pub schema_version: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Class breaks and scoring rule per factor.
    pub factors: BTreeMap<FactorKind, FactorConfig>,

    pub flood: FloodModelConfig,

    pub landslide: LandslideModelConfig,

    #[serde(default)]
    pub uncertainty: UncertaintyConfig,

    #[serde(default)]
    pub classification: ClassificationConfig,

    #[serde(default)]
    pub validation: ValidationDefaults,

    /// Study area used when a request does not supply one.
    pub study_area: StudyArea,
}

/// Configuration of a single conditioning factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FactorConfig {
    /// Class breaks for continuous kinds, ascending; the last is unbounded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub class_breaks: Vec<ClassBreak>,

    /// Rule mapping raw values to a [0, 1] contribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<ScoringRule>,
}

/// A class whose values lie below the exclusive `upper` bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassBreak {
    pub label: String,
    /// `None` marks the unbounded last class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
}

/// Scoring rule for one factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoringRule {
    /// Monotonic piecewise-linear ramp of `[raw, score]` breakpoints,
    /// sorted by raw value.
    Ramp {
        breakpoints: Vec<[f64; 2]>,
        source: String,
    },
    /// Category → score table, keyed by normalized category label.
    Lookup {
        table: BTreeMap<String, f64>,
        source: String,
    },
}

impl ScoringRule {
    pub fn source(&self) -> &str {
        match self {
            ScoringRule::Ramp { source, .. } | ScoringRule::Lookup { source, .. } => source,
        }
    }
}

/// Flood (AHP) model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FloodModelConfig {
    pub pairwise: PairwiseConfig,
}

/// A reciprocal pairwise comparison matrix over `factors` (column order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PairwiseConfig {
    pub factors: Vec<FactorKind>,
    pub matrix: Vec<Vec<f64>>,
    #[serde(default)]
    pub source: String,
}

/// Landslide (frequency-ratio) model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LandslideModelConfig {
    pub factors: Vec<FactorKind>,

    /// Per-factor weights; uniform over `factors` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<WeightVector>,

    /// Evidence and hazard tallies per class of each factor.
    pub tallies: BTreeMap<FactorKind, Vec<ClassTally>>,

    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassTally {
    pub class_label: String,
    pub evidence_count: u64,
    pub hazard_count: u64,
}

/// Bootstrap settings and per-factor score standard deviations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UncertaintyConfig {
    pub bootstrap_b: usize,
    pub default_sigma: f64,
    #[serde(default)]
    pub sigma: BTreeMap<FactorKind, f64>,
}

impl UncertaintyConfig {
    pub fn sigma_for(&self, kind: FactorKind) -> f64 {
        self.sigma.get(&kind).copied().unwrap_or(self.default_sigma)
    }
}

impl Default for UncertaintyConfig {
    fn default() -> Self {
        UncertaintyConfig {
            bootstrap_b: 500,
            default_sigma: 0.05,
            sigma: BTreeMap::new(),
        }
    }
}

/// Band cut-offs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassificationConfig {
    /// Percentiles of the in-area SI distribution used for multi-point runs.
    pub percentiles: Vec<f64>,
    /// Fixed SI thresholds used when fewer than two points are in area.
    pub absolute_thresholds: Vec<f64>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        ClassificationConfig {
            percentiles: vec![20.0, 40.0, 60.0, 80.0],
            absolute_thresholds: vec![20.0, 40.0, 60.0, 80.0],
        }
    }
}

/// Validator defaults; requests may override most of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationDefaults {
    pub decision_threshold: f64,
    pub cv_folds: usize,
    pub auc_bootstrap_b: usize,
    /// Minimum positives and minimum negatives.
    pub min_class_samples: usize,
    /// Grid cell size in degrees for the built-in spatial grouping.
    pub grid_cell_deg: f64,
}

impl Default for ValidationDefaults {
    fn default() -> Self {
        ValidationDefaults {
            decision_threshold: 60.0,
            cv_folds: 5,
            auc_bootstrap_b: 1000,
            min_class_samples: 10,
            grid_cell_deg: 0.05,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON or TOML file (by extension; JSON
    /// otherwise). Returns the parsed config and the raw file content.
    pub fn from_file(path: &Path) -> ValidationResult<(Self, String)> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ValidationError::IoError(format!("{}: {}", path.display(), e)))?;
        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);
        let config = if is_toml {
            Self::from_toml_str(&content)?
        } else {
            Self::from_json_str(&content)?
        };
        Ok((config, content))
    }

    pub fn from_json_str(content: &str) -> ValidationResult<Self> {
        serde_json::from_str(content).map_err(|e| ValidationError::ParseError(e.to_string()))
    }

    pub fn from_toml_str(content: &str) -> ValidationResult<Self> {
        toml::from_str(content).map_err(|e| ValidationError::ParseError(e.to_string()))
    }

    pub fn factor(&self, kind: FactorKind) -> Option<&FactorConfig> {
        self.factors.get(&kind)
    }

    /// Landslide weights, uniform when not configured.
    pub fn landslide_weights(&self) -> Option<WeightVector> {
        match &self.landslide.weights {
            Some(w) => w.normalized().ok(),
            None => WeightVector::uniform(&self.landslide.factors).ok(),
        }
    }

    /// Every factor kind either model reads, flood first, in config order.
    pub fn used_factors(&self) -> Vec<FactorKind> {
        let mut out: Vec<FactorKind> = Vec::new();
        for kind in self
            .flood
            .pairwise
            .factors
            .iter()
            .chain(self.landslide.factors.iter())
        {
            if !out.contains(kind) {
                out.push(*kind);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoring_rule_tagged_json() {
        let rule: ScoringRule = serde_json::from_str(
            r#"{"type":"lookup","table":{"forest":0.2},"source":"test"}"#,
        )
        .unwrap();
        assert_eq!(rule.source(), "test");
        assert!(matches!(rule, ScoringRule::Lookup { .. }));
    }

    #[test]
    fn test_sigma_fallback() {
        let mut u = UncertaintyConfig::default();
        u.sigma.insert(FactorKind::Slope, 0.1);
        assert_eq!(u.sigma_for(FactorKind::Slope), 0.1);
        assert_eq!(u.sigma_for(FactorKind::Rainfall), 0.05);
    }

    #[test]
    fn test_used_factors_dedups() {
        let config = EngineConfig::default();
        let used = config.used_factors();
        assert_eq!(used[0], FactorKind::Elevation);
        assert_eq!(
            used.iter().filter(|k| **k == FactorKind::Slope).count(),
            1
        );
    }

    #[test]
    fn test_json_roundtrip_of_defaults() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back = EngineConfig::from_json_str(&json).unwrap();
        assert_eq!(back.factors, config.factors);
        assert_eq!(back.flood, config.flood);
    }
}
