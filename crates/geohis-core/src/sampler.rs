//! Factor sampling: reads raw factor values for a point from its layers.
//!
//! Layers are backed by a [`FactorSource`] collaborator (raster readers,
//! table lookups, remote services). The sampler attaches a class label to
//! every available value: continuous values are binned by the configured
//! class breaks and categorical values use their normalized category string.

use geohis_common::factor::normalize_category;
use geohis_common::{Error, FactorKind, FactorValue, Point, PointId, RawValue};
use geohis_config::{ClassBreak, EngineConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while sampling one point.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SamplingError {
    #[error("no factor layer is available for point {point_id}")]
    AllLayersUnavailable { point_id: String },

    #[error("point {point_id}: {kind} expects a {expected} value, got {got}")]
    TypeMismatch {
        point_id: String,
        kind: FactorKind,
        expected: &'static str,
        got: String,
    },

    #[error("point {point_id}: {kind} value is not finite")]
    NonFinite { point_id: String, kind: FactorKind },
}

impl SamplingError {
    pub fn point_id(&self) -> &str {
        match self {
            SamplingError::AllLayersUnavailable { point_id }
            | SamplingError::TypeMismatch { point_id, .. }
            | SamplingError::NonFinite { point_id, .. } => point_id,
        }
    }
}

impl From<SamplingError> for Error {
    fn from(err: SamplingError) -> Self {
        match err {
            SamplingError::AllLayersUnavailable { point_id } => Error::Sampling {
                point_id,
                detail: "every factor layer is unavailable".to_string(),
            },
            other => Error::MalformedInput(other.to_string()),
        }
    }
}

/// Provider of raw factor values.
///
/// Implementations must be deterministic and free of side effects visible to
/// the engine. `point_id` is the id the engine resolved for `point`, so
/// table-backed sources can key by it.
pub trait FactorSource: Send + Sync {
    fn sample(&self, point: &Point, point_id: &PointId, kind: FactorKind) -> Option<RawValue>;
}

/// A factor layer: one kind, its availability and the source behind it.
#[derive(Clone)]
pub struct FactorLayer {
    pub kind: FactorKind,
    pub available: bool,
    pub source: Arc<dyn FactorSource>,
}

impl FactorLayer {
    pub fn new(kind: FactorKind, source: Arc<dyn FactorSource>) -> Self {
        FactorLayer {
            kind,
            available: true,
            source,
        }
    }

    pub fn unavailable(kind: FactorKind, source: Arc<dyn FactorSource>) -> Self {
        FactorLayer {
            kind,
            available: false,
            source,
        }
    }
}

impl std::fmt::Debug for FactorLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactorLayer")
            .field("kind", &self.kind)
            .field("available", &self.available)
            .finish_non_exhaustive()
    }
}

/// In-memory source keyed by point id.
#[derive(Debug, Clone, Default)]
pub struct TableSource {
    rows: BTreeMap<PointId, BTreeMap<FactorKind, RawValue>>,
}

impl TableSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, point_id: PointId, kind: FactorKind, value: RawValue) {
        self.rows.entry(point_id).or_default().insert(kind, value);
    }

    pub fn insert_row(&mut self, point_id: PointId, row: BTreeMap<FactorKind, RawValue>) {
        self.rows.entry(point_id).or_default().extend(row);
    }

    /// Whether any row carries `kind`.
    pub fn provides(&self, kind: FactorKind) -> bool {
        self.rows.values().any(|row| row.contains_key(&kind))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FactorSource for TableSource {
    fn sample(&self, _point: &Point, point_id: &PointId, kind: FactorKind) -> Option<RawValue> {
        self.rows.get(point_id)?.get(&kind).cloned()
    }
}

/// One layer per factor kind over a shared table. Kinds the table never
/// provides are marked unavailable.
pub fn table_layers(table: Arc<TableSource>) -> Vec<FactorLayer> {
    FactorKind::ALL
        .iter()
        .map(|kind| {
            let source: Arc<dyn FactorSource> = table.clone();
            if table.provides(*kind) {
                FactorLayer::new(*kind, source)
            } else {
                FactorLayer::unavailable(*kind, source)
            }
        })
        .collect()
}

/// Class label for a continuous value: the first break whose exclusive
/// upper bound exceeds `value`, or the unbounded last class.
pub fn classify_value(breaks: &[ClassBreak], value: f64) -> Option<String> {
    breaks
        .iter()
        .find(|b| b.upper.map_or(true, |upper| value < upper))
        .or_else(|| breaks.last())
        .map(|b| b.label.clone())
}

/// Samples every configured layer for a point.
#[derive(Debug, Clone)]
pub struct FactorSampler {
    layers: Vec<FactorLayer>,
    breaks: BTreeMap<FactorKind, Vec<ClassBreak>>,
}

impl FactorSampler {
    pub fn new(layers: Vec<FactorLayer>, config: &EngineConfig) -> Self {
        let breaks = config
            .factors
            .iter()
            .filter(|(_, f)| !f.class_breaks.is_empty())
            .map(|(kind, f)| (*kind, f.class_breaks.clone()))
            .collect();
        FactorSampler { layers, breaks }
    }

    pub fn layers(&self) -> &[FactorLayer] {
        &self.layers
    }

    /// One [`FactorValue`] per layer, in layer order.
    pub fn sample(
        &self,
        point: &Point,
        point_id: &PointId,
    ) -> Result<Vec<FactorValue>, SamplingError> {
        let mut values = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let raw = if layer.available {
                layer.source.sample(point, point_id, layer.kind)
            } else {
                None
            };
            let value = match raw {
                None => FactorValue::unavailable(layer.kind),
                Some(raw) => self.label(point_id, layer.kind, raw)?,
            };
            values.push(value);
        }

        if values.iter().all(|v| !v.is_available()) {
            return Err(SamplingError::AllLayersUnavailable {
                point_id: point_id.to_string(),
            });
        }
        Ok(values)
    }

    fn label(
        &self,
        point_id: &PointId,
        kind: FactorKind,
        raw: RawValue,
    ) -> Result<FactorValue, SamplingError> {
        let class_label = match (&raw, kind.is_continuous()) {
            (RawValue::Numeric(x), true) => {
                if !x.is_finite() {
                    return Err(SamplingError::NonFinite {
                        point_id: point_id.to_string(),
                        kind,
                    });
                }
                self.breaks
                    .get(&kind)
                    .and_then(|breaks| classify_value(breaks, *x))
            }
            (RawValue::Categorical(s), false) => Some(normalize_category(s)),
            (RawValue::Categorical(s), true) => {
                return Err(SamplingError::TypeMismatch {
                    point_id: point_id.to_string(),
                    kind,
                    expected: "numeric",
                    got: format!("'{}'", s),
                })
            }
            (RawValue::Numeric(x), false) => {
                return Err(SamplingError::TypeMismatch {
                    point_id: point_id.to_string(),
                    kind,
                    expected: "categorical",
                    got: x.to_string(),
                })
            }
        };
        Ok(FactorValue {
            kind,
            raw_value: Some(raw),
            class_label,
        })
    }
}
