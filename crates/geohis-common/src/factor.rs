//! Conditioning factors, sampled values and normalized scores.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Conditioning factor kinds known to the engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    Elevation,
    Slope,
    Aspect,
    DrainageProximity,
    LandUse,
    SoilPermeability,
    Geology,
    LandCover,
    Rainfall,
}

impl FactorKind {
    pub const ALL: [FactorKind; 9] = [
        FactorKind::Elevation,
        FactorKind::Slope,
        FactorKind::Aspect,
        FactorKind::DrainageProximity,
        FactorKind::LandUse,
        FactorKind::SoilPermeability,
        FactorKind::Geology,
        FactorKind::LandCover,
        FactorKind::Rainfall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactorKind::Elevation => "elevation",
            FactorKind::Slope => "slope",
            FactorKind::Aspect => "aspect",
            FactorKind::DrainageProximity => "drainage_proximity",
            FactorKind::LandUse => "land_use",
            FactorKind::SoilPermeability => "soil_permeability",
            FactorKind::Geology => "geology",
            FactorKind::LandCover => "land_cover",
            FactorKind::Rainfall => "rainfall",
        }
    }

    /// Continuous kinds are scored by ramps; the rest by lookup tables.
    pub fn is_continuous(&self) -> bool {
        matches!(
            self,
            FactorKind::Elevation
                | FactorKind::Slope
                | FactorKind::Aspect
                | FactorKind::DrainageProximity
                | FactorKind::Rainfall
        )
    }

    pub fn is_categorical(&self) -> bool {
        !self.is_continuous()
    }
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FactorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace('-', "_");
        FactorKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == needle)
            .ok_or_else(|| format!("unknown factor kind: {}", s))
    }
}

/// A raw sampled value: numeric for continuous layers, a category otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RawValue {
    Numeric(f64),
    Categorical(String),
}

impl RawValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Numeric(v) => Some(*v),
            RawValue::Categorical(_) => None,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            RawValue::Numeric(_) => None,
            RawValue::Categorical(s) => Some(s),
        }
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Numeric(v)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Categorical(s.to_string())
    }
}

/// Normalize a category label: trimmed, lower-case, spaces replaced by `_`.
pub fn normalize_category(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// One sampled factor for one point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FactorValue {
    pub kind: FactorKind,
    /// `None` marks an unavailable layer; scorers skip it.
    pub raw_value: Option<RawValue>,
    pub class_label: Option<String>,
}

impl FactorValue {
    pub fn unavailable(kind: FactorKind) -> Self {
        FactorValue {
            kind,
            raw_value: None,
            class_label: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.raw_value.is_some()
    }
}

/// A factor value mapped into a [0, 1] susceptibility contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FactorScore {
    pub kind: FactorKind,
    pub normalized: f64,
    pub class_label: Option<String>,
}
