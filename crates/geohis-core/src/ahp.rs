//! Analytic Hierarchy Process: weights from a pairwise comparison matrix.
//!
//! Weights are the principal right eigenvector of the reciprocal matrix,
//! found by power iteration and normalized to Σ = 1. Consistency follows
//! Saaty: CI = (λ_max − n)/(n − 1) and CR = CI / RI(n). Judgments with
//! CR > 0.10 are rejected.

use geohis_common::{Error, FactorKind, WeightVector};
use geohis_config::validate::{MAX_PAIRWISE_ORDER, RECIPROCITY_TOLERANCE};
use geohis_config::PairwiseConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest acceptable consistency ratio.
pub const MAX_CONSISTENCY_RATIO: f64 = 0.10;

/// Power iteration stops once successive weight vectors differ by less.
pub const CONVERGENCE_TOLERANCE: f64 = 1e-14;

pub const MAX_ITERATIONS: usize = 10_000;

/// |CI| below this is reported as exactly zero.
const CI_ZERO: f64 = 1e-12;

/// Saaty's random consistency index for n = 1..=15.
const RANDOM_INDEX: [f64; MAX_PAIRWISE_ORDER] = [
    0.0, 0.0, 0.58, 0.90, 1.12, 1.24, 1.32, 1.41, 1.45, 1.49, 1.51, 1.48, 1.56, 1.57, 1.59,
];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AhpError {
    #[error("malformed pairwise matrix: {0}")]
    MalformedMatrix(String),

    #[error("inconsistent pairwise judgments: CR={cr:.4} exceeds 0.10")]
    InconsistentJudgments { cr: f64, matrix: Vec<Vec<f64>> },
}

impl From<AhpError> for Error {
    fn from(err: AhpError) -> Self {
        match err {
            AhpError::MalformedMatrix(detail) => {
                Error::MalformedInput(format!("pairwise matrix: {}", detail))
            }
            AhpError::InconsistentJudgments { cr, matrix } => {
                Error::InconsistentJudgments { cr, matrix }
            }
        }
    }
}

/// Random index for a matrix of order `n` (1..=15).
pub fn random_index(n: usize) -> Option<f64> {
    n.checked_sub(1).and_then(|i| RANDOM_INDEX.get(i)).copied()
}

/// A validated reciprocal pairwise comparison matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct PairwiseMatrix {
    kinds: Vec<FactorKind>,
    values: Vec<Vec<f64>>,
}

impl PairwiseMatrix {
    /// Validate shape, positivity, unit diagonal and reciprocity.
    pub fn new(kinds: Vec<FactorKind>, values: Vec<Vec<f64>>) -> Result<Self, AhpError> {
        let n = values.len();
        if n == 0 || n > MAX_PAIRWISE_ORDER {
            return Err(AhpError::MalformedMatrix(format!(
                "order must be between 1 and {}, got {}",
                MAX_PAIRWISE_ORDER, n
            )));
        }
        if kinds.len() != n {
            return Err(AhpError::MalformedMatrix(format!(
                "{} factor kinds for a {}x{} matrix",
                kinds.len(),
                n,
                n
            )));
        }
        for (i, kind) in kinds.iter().enumerate() {
            if kinds[..i].contains(kind) {
                return Err(AhpError::MalformedMatrix(format!(
                    "factor {} appears twice",
                    kind
                )));
            }
        }
        for (i, row) in values.iter().enumerate() {
            if row.len() != n {
                return Err(AhpError::MalformedMatrix(format!(
                    "row {} has {} entries, expected {}",
                    i,
                    row.len(),
                    n
                )));
            }
            if let Some(v) = row.iter().find(|v| !v.is_finite() || **v <= 0.0) {
                return Err(AhpError::MalformedMatrix(format!(
                    "row {} holds {}; entries must be finite and positive",
                    i, v
                )));
            }
        }
        for i in 0..n {
            if (values[i][i] - 1.0).abs() > RECIPROCITY_TOLERANCE {
                return Err(AhpError::MalformedMatrix(format!(
                    "diagonal entry [{}][{}] is {}, expected 1",
                    i, i, values[i][i]
                )));
            }
            for j in (i + 1)..n {
                if (values[i][j] * values[j][i] - 1.0).abs() > RECIPROCITY_TOLERANCE {
                    return Err(AhpError::MalformedMatrix(format!(
                        "entries [{}][{}]={} and [{}][{}]={} are not reciprocal",
                        i, j, values[i][j], j, i, values[j][i]
                    )));
                }
            }
        }
        Ok(PairwiseMatrix { kinds, values })
    }

    pub fn from_config(config: &PairwiseConfig) -> Result<Self, AhpError> {
        Self::new(config.factors.clone(), config.matrix.clone())
    }

    /// The perfectly consistent matrix `M[i][j] = w_i / w_j`.
    pub fn consistent(weights: &WeightVector) -> Result<Self, AhpError> {
        let w: Vec<f64> = weights.iter().map(|e| e.weight).collect();
        let values = w
            .iter()
            .map(|wi| w.iter().map(|wj| wi / wj).collect())
            .collect();
        Self::new(weights.kinds(), values)
    }

    pub fn order(&self) -> usize {
        self.values.len()
    }

    pub fn kinds(&self) -> &[FactorKind] {
        &self.kinds
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.values
    }

    fn multiply(&self, w: &[f64]) -> Vec<f64> {
        self.values
            .iter()
            .map(|row| row.iter().zip(w).map(|(m, x)| m * x).sum())
            .collect()
    }
}

/// Consistency diagnostics of a solved matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Consistency {
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub lambda_max: f64,
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub ci: f64,
    #[serde(serialize_with = "geohis_common::numeric::sig6")]
    pub cr: f64,
}

/// Derived weights with diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct AhpSolution {
    pub weights: WeightVector,
    pub consistency: Consistency,
    pub iterations: usize,
    pub converged: bool,
}

impl AhpSolution {
    pub fn cr(&self) -> f64 {
        self.consistency.cr
    }
}

/// Validate `matrix` over `kinds` and solve it.
pub fn solve(matrix: &[Vec<f64>], kinds: &[FactorKind]) -> Result<AhpSolution, AhpError> {
    let m = PairwiseMatrix::new(kinds.to_vec(), matrix.to_vec())?;
    solve_matrix(&m)
}

/// Solve an already validated matrix.
pub fn solve_matrix(matrix: &PairwiseMatrix) -> Result<AhpSolution, AhpError> {
    let n = matrix.order();
    if n == 1 {
        return Ok(AhpSolution {
            weights: weights_from(matrix.kinds(), &[1.0])?,
            consistency: Consistency {
                lambda_max: 1.0,
                ci: 0.0,
                cr: 0.0,
            },
            iterations: 0,
            converged: true,
        });
    }

    let mut w = vec![1.0 / n as f64; n];
    let mut iterations = 0;
    let mut converged = false;
    while iterations < MAX_ITERATIONS {
        iterations += 1;
        let mut next = matrix.multiply(&w);
        let total: f64 = next.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(AhpError::MalformedMatrix(
                "power iteration diverged".to_string(),
            ));
        }
        for x in next.iter_mut() {
            *x /= total;
        }
        let delta = next
            .iter()
            .zip(&w)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        w = next;
        if delta < CONVERGENCE_TOLERANCE {
            converged = true;
            break;
        }
    }
    if !converged {
        tracing::debug!(n, iterations, "power iteration hit the iteration cap");
    }

    let mw = matrix.multiply(&w);
    let lambda_max = mw.iter().zip(&w).map(|(a, b)| a / b).sum::<f64>() / n as f64;

    let (ci, cr) = if n == 2 {
        (0.0, 0.0)
    } else {
        let mut ci = (lambda_max - n as f64) / (n as f64 - 1.0);
        if ci.abs() < CI_ZERO {
            ci = 0.0;
        }
        let ri = random_index(n).unwrap_or(RANDOM_INDEX[MAX_PAIRWISE_ORDER - 1]);
        (ci, ci / ri)
    };

    if cr > MAX_CONSISTENCY_RATIO {
        return Err(AhpError::InconsistentJudgments {
            cr,
            matrix: matrix.rows().to_vec(),
        });
    }

    Ok(AhpSolution {
        weights: weights_from(matrix.kinds(), &w)?,
        consistency: Consistency { lambda_max, ci, cr },
        iterations,
        converged,
    })
}

fn weights_from(kinds: &[FactorKind], w: &[f64]) -> Result<WeightVector, AhpError> {
    WeightVector::new(kinds.iter().copied().zip(w.iter().copied()))
        .map_err(|e| AhpError::MalformedMatrix(e.to_string()))
}
