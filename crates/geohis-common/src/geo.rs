//! Geographic primitives: points and the study-area bounding box.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::id::PointId;

/// An input location. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Point {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Point {
            latitude,
            longitude,
            name: None,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Check coordinate ranges.
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::MalformedInput(format!(
                "latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::MalformedInput(format!(
                "longitude {} outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// Assign a stable id to every point, in input order.
///
/// Explicit ids are kept. Other points get `"{lat:.6}_{lon:.6}"`; the n-th
/// repeat of the same base id (n ≥ 2) is suffixed with `#n`.
pub fn assign_point_ids(points: &[Point]) -> Vec<PointId> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for p in points {
        if let Some(id) = &p.id {
            *seen.entry(id.clone()).or_insert(0) += 1;
        }
    }

    let mut generated: HashMap<String, usize> = HashMap::new();
    points
        .iter()
        .map(|p| match &p.id {
            Some(id) => PointId(id.clone()),
            None => {
                let base = PointId::from_coordinates(p.latitude, p.longitude).0;
                let taken = seen.get(&base).copied().unwrap_or(0);
                let n = generated.entry(base.clone()).or_insert(taken);
                *n += 1;
                if *n == 1 {
                    PointId(base)
                } else {
                    PointId(format!("{}#{}", base, n))
                }
            }
        })
        .collect()
}

/// Axis-aligned bounding box defining the region of analytical validity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StudyArea {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_km2: Option<f64>,
}

impl StudyArea {
    pub fn new(
        name: impl Into<String>,
        min_lat: f64,
        max_lat: f64,
        min_lon: f64,
        max_lon: f64,
    ) -> Result<Self> {
        let area = StudyArea {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
            name: name.into(),
            area_km2: None,
        };
        area.validate()?;
        Ok(area)
    }

    /// Parse `"min_lat,max_lat,min_lon,max_lon"`.
    pub fn parse_bbox(name: impl Into<String>, spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(Error::MalformedInput(format!(
                "study area must be 'min_lat,max_lat,min_lon,max_lon', got '{}'",
                spec
            )));
        }
        let mut vals = [0.0f64; 4];
        for (slot, part) in vals.iter_mut().zip(&parts) {
            *slot = part.parse::<f64>().map_err(|_| {
                Error::MalformedInput(format!("study area bound '{}' is not a number", part))
            })?;
        }
        Self::new(name, vals[0], vals[1], vals[2], vals[3])
    }

    pub fn with_area_km2(mut self, area_km2: f64) -> Self {
        self.area_km2 = Some(area_km2);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let bounds = [self.min_lat, self.max_lat, self.min_lon, self.max_lon];
        if bounds.iter().any(|b| !b.is_finite()) {
            return Err(Error::MalformedInput(
                "study area bounds must be finite".to_string(),
            ));
        }
        if self.min_lat < -90.0 || self.max_lat > 90.0 {
            return Err(Error::MalformedInput(
                "study area latitude outside [-90, 90]".to_string(),
            ));
        }
        if self.min_lon < -180.0 || self.max_lon > 180.0 {
            return Err(Error::MalformedInput(
                "study area longitude outside [-180, 180]".to_string(),
            ));
        }
        if self.min_lat >= self.max_lat {
            return Err(Error::MalformedInput(format!(
                "study area min_lat {} must be below max_lat {}",
                self.min_lat, self.max_lat
            )));
        }
        if self.min_lon >= self.max_lon {
            return Err(Error::MalformedInput(format!(
                "study area min_lon {} must be below max_lon {}",
                self.min_lon, self.max_lon
            )));
        }
        if let Some(a) = self.area_km2 {
            if !(a.is_finite() && a > 0.0) {
                return Err(Error::MalformedInput(format!(
                    "study area area_km2 must be positive, got {}",
                    a
                )));
            }
        }
        Ok(())
    }

    /// Inclusive on every edge.
    pub fn contains(&self, p: &Point) -> bool {
        p.latitude >= self.min_lat
            && p.latitude <= self.max_lat
            && p.longitude >= self.min_lon
            && p.longitude <= self.max_lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accra() -> StudyArea {
        StudyArea::new("Greater Accra", 5.45, 6.10, -0.55, 0.70).unwrap()
    }

    #[test]
    fn test_contains_is_inclusive() {
        let area = accra();
        assert!(area.contains(&Point::new(5.45, -0.55)));
        assert!(area.contains(&Point::new(6.10, 0.70)));
        assert!(area.contains(&Point::new(5.60, -0.19)));
        assert!(!area.contains(&Point::new(6.11, 0.0)));
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        assert!(StudyArea::new("bad", 6.0, 5.0, 0.0, 1.0).is_err());
        assert!(StudyArea::new("flat", 5.0, 5.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_parse_bbox() {
        let area = StudyArea::parse_bbox("cli", "5.45, 6.10, -0.55, 0.70").unwrap();
        assert_eq!(area.name, "cli");
        assert_eq!(area.min_lon, accra().min_lon);
        assert_eq!(area.max_lat, 6.10);
        assert!(StudyArea::parse_bbox("cli", "1,2,3").is_err());
        assert!(StudyArea::parse_bbox("cli", "a,2,3,4").is_err());
    }

    #[test]
    fn test_point_validation() {
        assert!(Point::new(91.0, 0.0).validate().is_err());
        assert!(Point::new(0.0, -180.5).validate().is_err());
        assert!(Point::new(f64::NAN, 0.0).validate().is_err());
        assert!(Point::new(-90.0, 180.0).validate().is_ok());
    }

    #[test]
    fn test_assign_point_ids_suffixes_repeats() {
        let points = vec![
            Point::new(5.6, -0.2),
            Point::new(5.7, -0.1).with_id("station-a"),
            Point::new(5.6, -0.2),
            Point::new(5.6, -0.2),
        ];
        let ids = assign_point_ids(&points);
        assert_eq!(ids[0].as_str(), "5.600000_-0.200000");
        assert_eq!(ids[1].as_str(), "station-a");
        assert_eq!(ids[2].as_str(), "5.600000_-0.200000#2");
        assert_eq!(ids[3].as_str(), "5.600000_-0.200000#3");
    }
}
