//! Built-in defaults for the Greater Accra Metropolitan Area.
//!
//! Flood scoring ramps and lookups follow the multi-criteria flood hazard
//! literature (Kazakis et al. 2015; Das 2019). The flood pairwise matrix uses
//! Saaty's 1–9 scale (Saaty 1980). Landslide class tallies are placeholders
//! in the shape of an inventory-derived frequency-ratio table
//! (Lee & Pradhan 2007) and should be replaced with counts from a real
//! inventory before operational use.

use geohis_common::{FactorKind, StudyArea};
use std::collections::BTreeMap;

use crate::engine::{
    ClassBreak, ClassTally, ClassificationConfig, EngineConfig, FactorConfig, FloodModelConfig,
    LandslideModelConfig, PairwiseConfig, ScoringRule, UncertaintyConfig, ValidationDefaults,
};

const SRC_FLOOD_RAMPS: &str = "Kazakis, Kougias & Patsialis (2015), Sci. Total Environ. 538; Das (2019), Remote Sens. Appl. 14";
const SRC_LAND_USE: &str = "Kazakis et al. (2015) land-use runoff ranking";
const SRC_SOIL: &str = "USDA NRCS hydrologic soil groups A–D, rescaled to [0,1]";
const SRC_AHP: &str = "Saaty (1980), The Analytic Hierarchy Process; GeoHIS default flood judgments";
const SRC_FR: &str = "Lee & Pradhan (2007), Landslides 4; illustrative tallies for Greater Accra";

/// Greater Accra Metropolitan Area bounding box.
pub fn default_study_area() -> StudyArea {
    StudyArea {
        min_lat: 5.45,
        max_lat: 6.10,
        min_lon: -0.55,
        max_lon: 0.70,
        name: "Greater Accra Metropolitan Area".to_string(),
        area_km2: Some(3245.0),
    }
}

fn breaks(spec: &[(&str, Option<f64>)]) -> Vec<ClassBreak> {
    spec.iter()
        .map(|(label, upper)| ClassBreak {
            label: label.to_string(),
            upper: *upper,
        })
        .collect()
}

fn ramp(points: &[(f64, f64)], source: &str) -> Option<ScoringRule> {
    Some(ScoringRule::Ramp {
        breakpoints: points.iter().map(|(raw, score)| [*raw, *score]).collect(),
        source: source.to_string(),
    })
}

fn lookup(entries: &[(&str, f64)], source: &str) -> Option<ScoringRule> {
    Some(ScoringRule::Lookup {
        table: entries
            .iter()
            .map(|(label, score)| (label.to_string(), *score))
            .collect(),
        source: source.to_string(),
    })
}

/// Default per-factor class breaks and scoring rules.
pub fn default_factors() -> BTreeMap<FactorKind, FactorConfig> {
    let mut factors = BTreeMap::new();

    // Elevation (m a.s.l.): low-lying ground floods first.
    factors.insert(
        FactorKind::Elevation,
        FactorConfig {
            class_breaks: breaks(&[
                ("lowland", Some(10.0)),
                ("coastal_plain", Some(25.0)),
                ("plain", Some(50.0)),
                ("upland", Some(100.0)),
                ("highland", None),
            ]),
            rule: ramp(
                &[(0.0, 1.0), (10.0, 0.8), (25.0, 0.5), (50.0, 0.2), (100.0, 0.0)],
                SRC_FLOOD_RAMPS,
            ),
        },
    );

    // Slope (degrees): flat terrain accumulates water, steep terrain fails.
    factors.insert(
        FactorKind::Slope,
        FactorConfig {
            class_breaks: breaks(&[
                ("flat", Some(5.0)),
                ("gentle", Some(15.0)),
                ("moderate", Some(25.0)),
                ("steep", Some(35.0)),
                ("very_steep", None),
            ]),
            rule: ramp(
                &[(0.0, 1.0), (2.0, 0.8), (5.0, 0.5), (15.0, 0.1), (30.0, 0.0)],
                SRC_FLOOD_RAMPS,
            ),
        },
    );

    // Aspect (degrees from north).
    factors.insert(
        FactorKind::Aspect,
        FactorConfig {
            class_breaks: breaks(&[
                ("north_east", Some(90.0)),
                ("south_east", Some(180.0)),
                ("south_west", Some(270.0)),
                ("north_west", None),
            ]),
            rule: None,
        },
    );

    // Distance to the nearest drainage line (m).
    factors.insert(
        FactorKind::DrainageProximity,
        FactorConfig {
            class_breaks: breaks(&[
                ("very_near", Some(100.0)),
                ("near", Some(250.0)),
                ("moderate", Some(500.0)),
                ("far", Some(1000.0)),
                ("very_far", None),
            ]),
            rule: ramp(
                &[(0.0, 1.0), (100.0, 0.8), (250.0, 0.5), (500.0, 0.2), (1000.0, 0.0)],
                SRC_FLOOD_RAMPS,
            ),
        },
    );

    factors.insert(
        FactorKind::LandUse,
        FactorConfig {
            class_breaks: Vec::new(),
            rule: lookup(
                &[
                    ("water", 1.0),
                    ("wetland", 1.0),
                    ("built_up", 0.9),
                    ("bare_soil", 0.8),
                    ("agriculture", 0.6),
                    ("grassland", 0.5),
                    ("shrubland", 0.35),
                    ("forest", 0.2),
                ],
                SRC_LAND_USE,
            ),
        },
    );

    factors.insert(
        FactorKind::SoilPermeability,
        FactorConfig {
            class_breaks: Vec::new(),
            rule: lookup(
                &[
                    ("very_low", 1.0),
                    ("low", 0.8),
                    ("moderate", 0.5),
                    ("high", 0.3),
                    ("very_high", 0.1),
                ],
                SRC_SOIL,
            ),
        },
    );

    factors.insert(
        FactorKind::Geology,
        FactorConfig {
            class_breaks: Vec::new(),
            rule: None,
        },
    );

    factors.insert(
        FactorKind::LandCover,
        FactorConfig {
            class_breaks: Vec::new(),
            rule: None,
        },
    );

    // Mean annual rainfall (mm).
    factors.insert(
        FactorKind::Rainfall,
        FactorConfig {
            class_breaks: breaks(&[
                ("low", Some(800.0)),
                ("moderate", Some(1000.0)),
                ("high", Some(1200.0)),
                ("very_high", None),
            ]),
            rule: None,
        },
    );

    factors
}

/// Default flood pairwise matrix over
/// [elevation, slope, drainage_proximity, land_use, soil_permeability].
///
/// Yields weights ≈ (0.298, 0.158, 0.298, 0.089, 0.158) with CR ≈ 0.003.
pub fn default_flood_pairwise() -> PairwiseConfig {
    PairwiseConfig {
        factors: vec![
            FactorKind::Elevation,
            FactorKind::Slope,
            FactorKind::DrainageProximity,
            FactorKind::LandUse,
            FactorKind::SoilPermeability,
        ],
        matrix: vec![
            vec![1.0, 2.0, 1.0, 3.0, 2.0],
            vec![0.5, 1.0, 0.5, 2.0, 1.0],
            vec![1.0, 2.0, 1.0, 3.0, 2.0],
            vec![1.0 / 3.0, 0.5, 1.0 / 3.0, 1.0, 0.5],
            vec![0.5, 1.0, 0.5, 2.0, 1.0],
        ],
        source: SRC_AHP.to_string(),
    }
}

fn tallies(rows: &[(&str, u64, u64)]) -> Vec<ClassTally> {
    rows.iter()
        .map(|(label, evidence, hazard)| ClassTally {
            class_label: label.to_string(),
            evidence_count: *evidence,
            hazard_count: *hazard,
        })
        .collect()
}

/// Default landslide model: uniform weights over five factors.
pub fn default_landslide() -> LandslideModelConfig {
    let mut t = BTreeMap::new();
    t.insert(
        FactorKind::Slope,
        tallies(&[
            ("flat", 5200, 2),
            ("gentle", 2600, 9),
            ("moderate", 900, 14),
            ("steep", 280, 17),
            ("very_steep", 90, 11),
        ]),
    );
    t.insert(
        FactorKind::Aspect,
        tallies(&[
            ("north_east", 2250, 10),
            ("south_east", 2300, 14),
            ("south_west", 2350, 17),
            ("north_west", 2170, 12),
        ]),
    );
    t.insert(
        FactorKind::Geology,
        tallies(&[
            ("dahomeyan_gneiss", 3100, 12),
            ("togo_quartzite", 1400, 24),
            ("accraian_sandstone", 2300, 15),
            ("alluvium", 2270, 2),
        ]),
    );
    t.insert(
        FactorKind::LandCover,
        tallies(&[
            ("forest", 1200, 4),
            ("shrubland", 1900, 14),
            ("grassland", 2100, 12),
            ("cropland", 1800, 11),
            ("built_up", 1700, 9),
            ("bare", 370, 3),
            ("water", 10, 0),
        ]),
    );
    t.insert(
        FactorKind::Rainfall,
        tallies(&[
            ("low", 3600, 8),
            ("moderate", 3100, 16),
            ("high", 1900, 19),
            ("very_high", 470, 10),
        ]),
    );

    LandslideModelConfig {
        factors: vec![
            FactorKind::Slope,
            FactorKind::Aspect,
            FactorKind::Geology,
            FactorKind::LandCover,
            FactorKind::Rainfall,
        ],
        weights: None,
        tallies: t,
        source: SRC_FR.to_string(),
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            description: Some("GeoHIS built-in defaults (Greater Accra)".to_string()),
            factors: default_factors(),
            flood: FloodModelConfig {
                pairwise: default_flood_pairwise(),
            },
            landslide: default_landslide(),
            uncertainty: UncertaintyConfig::default(),
            classification: ClassificationConfig::default(),
            validation: ValidationDefaults::default(),
            study_area: default_study_area(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        crate::validate::validate_engine_config(&config).unwrap();
    }

    #[test]
    fn test_every_rule_is_cited() {
        for (kind, factor) in default_factors() {
            if let Some(rule) = &factor.rule {
                assert!(!rule.source().is_empty(), "{} rule lacks a source", kind);
            }
        }
    }

    #[test]
    fn test_landslide_tallies_cover_configured_factors() {
        let ls = default_landslide();
        for kind in &ls.factors {
            assert!(ls.tallies.contains_key(kind), "missing tallies for {}", kind);
        }
    }

    #[test]
    fn test_study_area_is_valid() {
        let area = default_study_area();
        area.validate().unwrap();
        assert!(area.contains(&geohis_common::Point::new(5.6037, -0.1870)));
    }
}
