//! Frequency-ratio model for landslide susceptibility.
//!
//! For each class c of a factor, FR_c = (h_c / Σh) / (e_c / Σe), where e is
//! the evidence (area) count and h the hazard count. FR > 1 marks classes
//! where hazards are over-represented. When any class of a factor has a
//! zero hazard or evidence count, add-one smoothing is applied to both
//! counts of every class of that factor.

use geohis_common::{Error, FactorKind};
use geohis_config::ClassTally;
use geohis_math::chi_square_sf;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrError {
    #[error("no evidence recorded for factor {kind}")]
    NoEvidence { kind: FactorKind },

    #[error("unknown class '{class_label}' for factor {kind}")]
    UnknownClass {
        kind: FactorKind,
        class_label: String,
    },
}

impl From<FrError> for Error {
    fn from(err: FrError) -> Self {
        match err {
            FrError::NoEvidence { kind } => Error::NoEvidence { kind },
            FrError::UnknownClass { kind, class_label } => Error::UnknownClass { kind, class_label },
        }
    }
}

/// One class row of a fitted factor, as reported in results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrClassEntry {
    pub factor_kind: FactorKind,
    pub class_label: String,
    /// Raw (unsmoothed) counts.
    pub evidence_count: u64,
    pub hazard_count: u64,
    #[serde(serialize_with = "geohis_common::numeric::sig4")]
    pub fr_value: f64,
    #[serde(serialize_with = "geohis_common::numeric::sig4")]
    pub log_fr: f64,
}

/// Goodness-of-fit of hazard counts against evidence-proportional
/// expectation. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChiSquareTest {
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub statistic: f64,
    pub df: u32,
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub p_value: f64,
}

/// Fitted frequency ratios for one factor.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorFrequencyRatio {
    pub kind: FactorKind,
    pub classes: Vec<FrClassEntry>,
    pub smoothed: bool,
    pub chi_square: Option<ChiSquareTest>,
}

impl FactorFrequencyRatio {
    /// FR of the class labelled `label`.
    pub fn contribution(&self, label: &str) -> Result<f64, FrError> {
        self.classes
            .iter()
            .find(|c| c.class_label == label)
            .map(|c| c.fr_value)
            .ok_or_else(|| FrError::UnknownClass {
                kind: self.kind,
                class_label: label.to_string(),
            })
    }

    pub fn min_fr(&self) -> f64 {
        self.classes
            .iter()
            .map(|c| c.fr_value)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn max_fr(&self) -> f64 {
        self.classes.iter().map(|c| c.fr_value).fold(0.0, f64::max)
    }
}

/// Fit frequency ratios for one factor from its class tallies.
pub fn fit(kind: FactorKind, tallies: &[ClassTally]) -> Result<FactorFrequencyRatio, FrError> {
    let evidence_total: u64 = tallies.iter().map(|t| t.evidence_count).sum();
    if tallies.is_empty() || evidence_total == 0 {
        return Err(FrError::NoEvidence { kind });
    }

    let smoothed = tallies
        .iter()
        .any(|t| t.hazard_count == 0 || t.evidence_count == 0);
    let bump = if smoothed { 1.0 } else { 0.0 };

    let e: Vec<f64> = tallies.iter().map(|t| t.evidence_count as f64 + bump).collect();
    let h: Vec<f64> = tallies.iter().map(|t| t.hazard_count as f64 + bump).collect();
    let e_sum: f64 = e.iter().sum();
    let h_sum: f64 = h.iter().sum();

    let classes = tallies
        .iter()
        .zip(e.iter().zip(&h))
        .map(|(t, (ec, hc))| {
            let fr = (hc / h_sum) / (ec / e_sum);
            FrClassEntry {
                factor_kind: kind,
                class_label: t.class_label.clone(),
                evidence_count: t.evidence_count,
                hazard_count: t.hazard_count,
                fr_value: fr,
                log_fr: fr.ln(),
            }
        })
        .collect();

    Ok(FactorFrequencyRatio {
        kind,
        classes,
        smoothed,
        chi_square: None,
    })
}

/// Fit and attach the chi-square goodness-of-fit test.
pub fn fit_with_test(
    kind: FactorKind,
    tallies: &[ClassTally],
) -> Result<FactorFrequencyRatio, FrError> {
    let mut fitted = fit(kind, tallies)?;
    fitted.chi_square = chi_square_test(tallies);
    Ok(fitted)
}

/// Pearson chi-square of raw hazard counts against the evidence-proportional
/// expectation, df = C − 1. `None` with fewer than two classes or no hazards.
pub fn chi_square_test(tallies: &[ClassTally]) -> Option<ChiSquareTest> {
    if tallies.len() < 2 {
        return None;
    }
    let e_sum: f64 = tallies.iter().map(|t| t.evidence_count as f64).sum();
    let h_sum: f64 = tallies.iter().map(|t| t.hazard_count as f64).sum();
    if e_sum <= 0.0 || h_sum <= 0.0 {
        return None;
    }
    let statistic: f64 = tallies
        .iter()
        .filter(|t| t.evidence_count > 0)
        .map(|t| {
            let expected = h_sum * t.evidence_count as f64 / e_sum;
            let diff = t.hazard_count as f64 - expected;
            diff * diff / expected
        })
        .sum();
    let df = (tallies.len() - 1) as u32;
    Some(ChiSquareTest {
        statistic,
        df,
        p_value: chi_square_sf(statistic, df),
    })
}
