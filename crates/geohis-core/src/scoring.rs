//! Factor scoring: maps sampled values into [0, 1] flood contributions.
//!
//! Continuous factors use a monotonic piecewise-linear ramp; values outside
//! the breakpoint range clamp to the endpoint score. Categorical factors use
//! a lookup table keyed by normalized category. An unmapped category is an
//! explicit [`ScoringError::UnknownClass`], never a silent zero.

use geohis_common::factor::normalize_category;
use geohis_common::{Error, FactorKind, FactorScore, FactorValue, RawValue};
use geohis_config::{EngineConfig, ScoringRule};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoringError {
    #[error("unknown class '{class_label}' for factor {kind}")]
    UnknownClass {
        kind: FactorKind,
        class_label: String,
    },

    #[error("no scoring rule configured for factor {kind}")]
    NoRule { kind: FactorKind },

    #[error("factor {kind}: value does not match its {rule} rule")]
    RuleMismatch { kind: FactorKind, rule: &'static str },
}

impl From<ScoringError> for Error {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::UnknownClass { kind, class_label } => {
                Error::UnknownClass { kind, class_label }
            }
            ScoringError::NoRule { .. } => Error::Config(err.to_string()),
            ScoringError::RuleMismatch { .. } => Error::MalformedInput(err.to_string()),
        }
    }
}

/// Result of scoring one value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Scored(FactorScore),
    /// The layer was unavailable; the factor is skipped, not imputed.
    Skipped(FactorKind),
}

/// A scoring rule with lookup keys normalized.
#[derive(Debug, Clone, PartialEq)]
enum CompiledRule {
    Ramp(Vec<(f64, f64)>),
    Lookup(BTreeMap<String, f64>),
}

/// Evaluate a ramp of `(raw, score)` breakpoints sorted by raw value.
pub fn ramp_score(breakpoints: &[(f64, f64)], x: f64) -> f64 {
    let (Some(first), Some(last)) = (breakpoints.first(), breakpoints.last()) else {
        return 0.0;
    };
    if x <= first.0 {
        return first.1;
    }
    if x >= last.0 {
        return last.1;
    }
    for pair in breakpoints.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if x <= x1 {
            let t = (x - x0) / (x1 - x0);
            return y0 + t * (y1 - y0);
        }
    }
    last.1
}

/// Scores factor values with the configured rules.
#[derive(Debug, Clone, Default)]
pub struct FactorScorer {
    rules: BTreeMap<FactorKind, CompiledRule>,
}

impl FactorScorer {
    pub fn new(config: &EngineConfig) -> Self {
        let rules = config
            .factors
            .iter()
            .filter_map(|(kind, factor)| {
                let compiled = match factor.rule.as_ref()? {
                    ScoringRule::Ramp { breakpoints, .. } => {
                        CompiledRule::Ramp(breakpoints.iter().map(|p| (p[0], p[1])).collect())
                    }
                    ScoringRule::Lookup { table, .. } => CompiledRule::Lookup(
                        table
                            .iter()
                            .map(|(label, score)| (normalize_category(label), *score))
                            .collect(),
                    ),
                };
                Some((*kind, compiled))
            })
            .collect();
        FactorScorer { rules }
    }

    pub fn has_rule(&self, kind: FactorKind) -> bool {
        self.rules.contains_key(&kind)
    }

    pub fn score(&self, value: &FactorValue) -> Result<ScoreOutcome, ScoringError> {
        let Some(raw) = &value.raw_value else {
            return Ok(ScoreOutcome::Skipped(value.kind));
        };
        let rule = self
            .rules
            .get(&value.kind)
            .ok_or(ScoringError::NoRule { kind: value.kind })?;

        let normalized = match (rule, raw) {
            (CompiledRule::Ramp(points), RawValue::Numeric(x)) => ramp_score(points, *x),
            (CompiledRule::Lookup(table), RawValue::Categorical(s)) => {
                let label = value
                    .class_label
                    .clone()
                    .unwrap_or_else(|| normalize_category(s));
                *table.get(&label).ok_or(ScoringError::UnknownClass {
                    kind: value.kind,
                    class_label: label,
                })?
            }
            (CompiledRule::Ramp(_), _) => {
                return Err(ScoringError::RuleMismatch {
                    kind: value.kind,
                    rule: "ramp",
                })
            }
            (CompiledRule::Lookup(_), _) => {
                return Err(ScoringError::RuleMismatch {
                    kind: value.kind,
                    rule: "lookup",
                })
            }
        };

        Ok(ScoreOutcome::Scored(FactorScore {
            kind: value.kind,
            normalized: normalized.clamp(0.0, 1.0),
            class_label: value.class_label.clone(),
        }))
    }
}
