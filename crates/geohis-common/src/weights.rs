//! Ordered factor weight vectors.
//!
//! A `WeightVector` keeps its entries in insertion order (AHP column order or
//! document order for overrides). It serializes as a JSON object in that
//! order, with weights rounded to 3 significant figures.

use schemars::JsonSchema;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;

use crate::error::{Error, Result};
use crate::factor::FactorKind;
use crate::numeric::round_sig;

/// Tolerance on Σw = 1.
pub const SUM_TOLERANCE: f64 = 1e-6;

/// Weights closer than this keep insertion order when ranked.
pub const TIE_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightEntry {
    pub kind: FactorKind,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeightVector {
    entries: Vec<WeightEntry>,
}

impl WeightVector {
    /// Build a validated vector, renormalizing to Σ = 1.
    ///
    /// Fails with `MalformedInput` on an empty list, duplicate kinds, or any
    /// weight that is not finite and strictly positive.
    pub fn new<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (FactorKind, f64)>,
    {
        let raw = WeightVector {
            entries: pairs
                .into_iter()
                .map(|(kind, weight)| WeightEntry { kind, weight })
                .collect(),
        };
        raw.normalized()
    }

    /// Validate and renormalize a vector taken as-is from a document.
    pub fn normalized(&self) -> Result<Self> {
        if self.entries.is_empty() {
            return Err(Error::MalformedInput(
                "weight vector must name at least one factor".to_string(),
            ));
        }
        for (i, e) in self.entries.iter().enumerate() {
            if self.entries[..i].iter().any(|prev| prev.kind == e.kind) {
                return Err(Error::MalformedInput(format!(
                    "weight vector names factor {} twice",
                    e.kind
                )));
            }
            if !(e.weight.is_finite() && e.weight > 0.0) {
                return Err(Error::MalformedInput(format!(
                    "weight for {} must be a positive finite number, got {}",
                    e.kind, e.weight
                )));
            }
        }
        let total: f64 = self.entries.iter().map(|e| e.weight).sum();
        Ok(WeightVector {
            entries: self
                .entries
                .iter()
                .map(|e| WeightEntry {
                    kind: e.kind,
                    weight: e.weight / total,
                })
                .collect(),
        })
    }

    /// Uniform weights over `kinds`.
    pub fn uniform(kinds: &[FactorKind]) -> Result<Self> {
        Self::new(kinds.iter().map(|k| (*k, 1.0)))
    }

    pub fn get(&self, kind: FactorKind) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| e.weight)
    }

    pub fn contains(&self, kind: FactorKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn kinds(&self) -> Vec<FactorKind> {
        self.entries.iter().map(|e| e.kind).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WeightEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() <= SUM_TOLERANCE
    }

    /// Restrict to `kinds` (keeping this vector's order) and renormalize.
    /// Returns `None` when no kind survives.
    pub fn restricted_to(&self, kinds: &[FactorKind]) -> Option<Self> {
        let kept: Vec<WeightEntry> = self
            .entries
            .iter()
            .filter(|e| kinds.contains(&e.kind))
            .copied()
            .collect();
        let total: f64 = kept.iter().map(|e| e.weight).sum();
        if kept.is_empty() || total <= 0.0 {
            return None;
        }
        Some(WeightVector {
            entries: kept
                .into_iter()
                .map(|e| WeightEntry {
                    kind: e.kind,
                    weight: e.weight / total,
                })
                .collect(),
        })
    }

    /// Canonical ranking: descending weight, insertion order among ties.
    pub fn ranked(&self) -> Vec<WeightEntry> {
        let mut out: Vec<WeightEntry> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let pos = out
                .iter()
                .position(|e| entry.weight > e.weight + TIE_TOLERANCE)
                .unwrap_or(out.len());
            out.insert(pos, *entry);
        }
        out
    }
}

impl Serialize for WeightVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for e in &self.entries {
            map.serialize_entry(&e.kind, &round_sig(e.weight, 3))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for WeightVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = WeightVector;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of factor kind to weight")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((kind, weight)) = access.next_entry::<FactorKind, f64>()? {
                    entries.push(WeightEntry { kind, weight });
                }
                Ok(WeightVector { entries })
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

impl JsonSchema for WeightVector {
    fn schema_name() -> Cow<'static, str> {
        "WeightVector".into()
    }

    fn json_schema(_generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        schemars::json_schema!({
            "type": "object",
            "description": "Factor kind to weight, in document order",
            "additionalProperties": { "type": "number", "exclusiveMinimum": 0 }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_renormalizes() {
        let w = WeightVector::new([(FactorKind::Slope, 2.0), (FactorKind::Geology, 6.0)]).unwrap();
        assert!((w.get(FactorKind::Slope).unwrap() - 0.25).abs() < 1e-12);
        assert!(w.is_normalized());
    }

    #[test]
    fn test_rejects_bad_weights() {
        assert!(WeightVector::new([]).is_err());
        assert!(WeightVector::new([(FactorKind::Slope, 0.0)]).is_err());
        assert!(WeightVector::new([(FactorKind::Slope, f64::NAN)]).is_err());
        assert!(WeightVector::new([(FactorKind::Slope, 1.0), (FactorKind::Slope, 2.0)]).is_err());
    }

    #[test]
    fn test_json_preserves_document_order() {
        let w: WeightVector =
            serde_json::from_str(r#"{"rainfall": 1, "aspect": 1, "elevation": 2}"#).unwrap();
        assert_eq!(
            w.kinds(),
            vec![FactorKind::Rainfall, FactorKind::Aspect, FactorKind::Elevation]
        );
        let w = w.normalized().unwrap();
        assert_eq!(
            serde_json::to_string(&w).unwrap(),
            r#"{"rainfall":0.25,"aspect":0.25,"elevation":0.5}"#
        );
    }

    #[test]
    fn test_ranked_keeps_insertion_order_on_ties() {
        let w = WeightVector::new([
            (FactorKind::Slope, 1.0),
            (FactorKind::Elevation, 2.0),
            (FactorKind::Aspect, 1.0),
            (FactorKind::Rainfall, 2.0),
        ])
        .unwrap();
        let order: Vec<FactorKind> = w.ranked().iter().map(|e| e.kind).collect();
        assert_eq!(
            order,
            vec![
                FactorKind::Elevation,
                FactorKind::Rainfall,
                FactorKind::Slope,
                FactorKind::Aspect
            ]
        );
    }

    #[test]
    fn test_restricted_to() {
        let w = WeightVector::uniform(&[FactorKind::Slope, FactorKind::Aspect, FactorKind::Geology])
            .unwrap();
        let r = w
            .restricted_to(&[FactorKind::Geology, FactorKind::Slope])
            .unwrap();
        assert_eq!(r.kinds(), vec![FactorKind::Slope, FactorKind::Geology]);
        assert!((r.get(FactorKind::Geology).unwrap() - 0.5).abs() < 1e-12);
        assert!(w.restricted_to(&[FactorKind::Rainfall]).is_none());
    }
}
