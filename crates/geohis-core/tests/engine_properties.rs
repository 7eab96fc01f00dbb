//! Property-based tests for engine invariants.

use chrono::{TimeZone, Utc};
use geohis_common::{Band, FactorKind, Hazard, Point, PointId, RawValue, SessionId, WeightVector};
use geohis_config::{ClassificationConfig, EngineConfig, UncertaintyConfig};
use geohis_core::ahp::{solve_matrix, PairwiseMatrix, MAX_CONSISTENCY_RATIO};
use geohis_core::coordinator::{AnalysisCoordinator, CancellationToken};
use geohis_core::request::AnalysisRequest;
use geohis_core::sampler::{table_layers, TableSource};
use geohis_core::susceptibility::{flood_si, fuse, Classifier};
use geohis_core::uncertainty::{bootstrap_point, oat_sensitivity, point_rng, Contribution};
use geohis_core::validation::{rank_sum_auc, trapezoid_auc};
use proptest::prelude::*;
use std::sync::Arc;

const FLOOD_KINDS: [FactorKind; 5] = [
    FactorKind::Elevation,
    FactorKind::Slope,
    FactorKind::DrainageProximity,
    FactorKind::LandUse,
    FactorKind::SoilPermeability,
];

fn weight_vector(kinds: &[FactorKind], raw: &[f64]) -> WeightVector {
    WeightVector::new(kinds.iter().copied().zip(raw.iter().copied())).unwrap()
}

fn weights_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.05f64..10.0, 5)
}

// ============================================================================
// AHP
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Near-consistent reciprocal matrices yield positive weights summing to 1.
    #[test]
    fn ahp_weights_are_a_distribution(
        raw in weights_strategy(),
        noise in prop::collection::vec(-0.2f64..0.2, 10),
    ) {
        let n = FLOOD_KINDS.len();
        let mut m = vec![vec![1.0; n]; n];
        let mut k = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                let v = raw[i] / raw[j] * noise[k].exp();
                m[i][j] = v;
                m[j][i] = 1.0 / v;
                k += 1;
            }
        }
        let matrix = PairwiseMatrix::new(FLOOD_KINDS.to_vec(), m).unwrap();
        match solve_matrix(&matrix) {
            Ok(solution) => {
                prop_assert!((solution.weights.sum() - 1.0).abs() < 1e-9);
                prop_assert!(solution.weights.iter().all(|e| e.weight > 0.0));
                prop_assert!(solution.cr() <= MAX_CONSISTENCY_RATIO);
            }
            Err(err) => prop_assert!(err.to_string().contains("CR=")),
        }
    }

    /// The consistent matrix of w solves back to w with CR = 0.
    #[test]
    fn ahp_recovers_consistent_weights(raw in weights_strategy()) {
        let w = weight_vector(&FLOOD_KINDS, &raw);
        let matrix = PairwiseMatrix::consistent(&w).unwrap();
        let solution = solve_matrix(&matrix).unwrap();
        for entry in w.iter() {
            let got = solution.weights.get(entry.kind).unwrap();
            prop_assert!((got - entry.weight).abs() < 1e-6, "{} vs {}", got, entry.weight);
        }
        prop_assert_eq!(solution.cr(), 0.0);
    }
}

// ============================================================================
// Classification and fusion
// ============================================================================

proptest! {
    /// Bands cover [0, 100] without gaps and never decrease with SI.
    #[test]
    fn bands_are_monotone_partition(
        si in prop::collection::vec(0.0f64..=100.0, 0..40),
    ) {
        let classifier = Classifier::from_in_area(&si, &ClassificationConfig::default());
        let mut previous = Band::VeryLow;
        for step in 0..=1000 {
            let x = step as f64 / 10.0;
            let band = classifier.band(x);
            prop_assert!(band >= previous, "band dropped at {}", x);
            previous = band;
        }
        prop_assert_eq!(classifier.band(0.0) <= classifier.band(100.0), true);
    }

    /// Bootstrap intervals bracket the estimate and collapse when B = 0.
    #[test]
    fn bootstrap_interval_contains_estimate(
        scores in prop::collection::vec(0.0f64..=1.0, 5),
        raw in weights_strategy(),
        b in 1usize..200,
        seed in any::<u64>(),
    ) {
        let w = weight_vector(&FLOOD_KINDS, &raw);
        let pairs: Vec<(FactorKind, f64)> = FLOOD_KINDS.iter().copied().zip(scores.iter().copied()).collect();
        let contributions: Vec<Contribution> = pairs
            .iter()
            .map(|(kind, s)| Contribution { kind: *kind, normalized: *s, scale: 1.0 })
            .collect();
        let si = flood_si(&pairs, &w).unwrap();
        let config = UncertaintyConfig::default();
        let id = PointId::from("p");

        let mut rng = point_rng(seed, Hazard::Flood, &id);
        let (lo, hi) = bootstrap_point(si, &contributions, &config, b, &mut rng, |c| flood_si(c, &w));
        prop_assert!(lo <= si && si <= hi);
        prop_assert!(lo >= 0.0 && hi <= 100.0);

        let mut rng = point_rng(seed, Hazard::Flood, &id);
        let (lo0, hi0) = bootstrap_point(si, &contributions, &config, 0, &mut rng, |c| flood_si(c, &w));
        prop_assert_eq!((lo0, hi0), (si, si));
    }

    /// Removing a factor matches its one-at-a-time sensitivity entry.
    #[test]
    fn oat_matches_renormalized_removal(
        scores in prop::collection::vec(0.0f64..=1.0, 5),
        raw in weights_strategy(),
    ) {
        let w = weight_vector(&FLOOD_KINDS, &raw);
        let pairs: Vec<(FactorKind, f64)> = FLOOD_KINDS.iter().copied().zip(scores.iter().copied()).collect();
        let si = flood_si(&pairs, &w).unwrap();
        let entries = oat_sensitivity(si, &pairs, &w, flood_si);
        prop_assert_eq!(entries.len(), FLOOD_KINDS.len());

        for (k, entry) in entries.iter().enumerate() {
            let (num, den) = pairs
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != k)
                .fold((0.0, 0.0), |(num, den), (_, (kind, s))| {
                    let wj = w.get(*kind).unwrap();
                    (num + wj * s, den + wj)
                });
            let expected = 100.0 * num / den;
            let got = entry.si_without.unwrap();
            prop_assert!((got - expected).abs() < 1e-9, "{} vs {}", got, expected);
            prop_assert!((entry.delta_si.unwrap() - (expected - si)).abs() < 1e-9);
        }
    }

    /// Rank-sum AUC equals the trapezoidal ROC area.
    #[test]
    fn auc_rank_sum_equals_trapezoid(
        samples in prop::collection::vec(((0u32..20).prop_map(|x| x as f64 * 5.0), any::<bool>()), 2..120),
    ) {
        let rank = rank_sum_auc(&samples);
        let trap = trapezoid_auc(&samples);
        match (rank, trap) {
            (Some(a), Some(b)) => prop_assert!((a - b).abs() < 1e-9, "{} vs {}", a, b),
            (None, None) => {}
            other => prop_assert!(false, "definedness differs: {:?}", other),
        }
    }
}

#[test]
fn fusion_is_symmetric() {
    for a in Band::ALL {
        for b in Band::ALL {
            assert_eq!(fuse(a, b), fuse(b, a), "{:?} {:?}", a, b);
        }
    }
}

fn ci_widths(b: usize, seeds: u64) -> Vec<f64> {
    let w = weight_vector(&FLOOD_KINDS, &[1.0; 5]);
    let pairs: Vec<(FactorKind, f64)> = FLOOD_KINDS.iter().map(|k| (*k, 0.5)).collect();
    let contributions: Vec<Contribution> = pairs
        .iter()
        .map(|(kind, s)| Contribution { kind: *kind, normalized: *s, scale: 1.0 })
        .collect();
    let si = flood_si(&pairs, &w).unwrap();
    let config = UncertaintyConfig::default();
    let id = PointId::from("fixed");
    (0..seeds)
        .map(|seed| {
            let mut rng = point_rng(seed, Hazard::Flood, &id);
            let (lo, hi) =
                bootstrap_point(si, &contributions, &config, b, &mut rng, |c| flood_si(c, &w));
            hi - lo
        })
        .collect()
}

fn mean_and_sd(xs: &[f64]) -> (f64, f64) {
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

#[test]
fn bootstrap_interval_tightens_with_more_draws() {
    let (few_mean, few_sd) = mean_and_sd(&ci_widths(50, 40));
    let (many_mean, many_sd) = mean_and_sd(&ci_widths(2000, 40));
    assert!(few_mean > 0.0 && many_mean > 0.0);
    // Averaged over seeds, more draws never give a materially wider interval.
    assert!(
        many_mean <= few_mean * 1.25,
        "B=2000 mean width {} vs B=50 mean width {}",
        many_mean,
        few_mean
    );
    // And the interval endpoints settle: widths vary far less across seeds.
    assert!(
        many_sd < few_sd,
        "B=2000 width sd {} vs B=50 width sd {}",
        many_sd,
        few_sd
    );
}

// ============================================================================
// Whole-analysis properties
// ============================================================================

const LAND_USE: [&str; 5] = ["built_up", "agriculture", "forest", "wetland", "grassland"];
const GEOLOGY: [&str; 4] = [
    "dahomeyan_gneiss",
    "togo_quartzite",
    "accraian_sandstone",
    "alluvium",
];

#[derive(Debug, Clone)]
struct Site {
    lat: f64,
    lon: f64,
    elevation: f64,
    slope: f64,
    drainage: f64,
    land_use: usize,
    geology: usize,
    rainfall: f64,
}

fn site_strategy() -> impl Strategy<Value = Site> {
    (
        5.45f64..6.10,
        -0.55f64..0.70,
        0.0f64..150.0,
        0.0f64..45.0,
        0.0f64..1500.0,
        0usize..5,
        0usize..4,
        600.0f64..1400.0,
    )
        .prop_map(|(lat, lon, elevation, slope, drainage, land_use, geology, rainfall)| Site {
            lat,
            lon,
            elevation,
            slope,
            drainage,
            land_use,
            geology,
            rainfall,
        })
}

fn build(sites: &[Site]) -> (AnalysisCoordinator, AnalysisRequest) {
    let mut table = TableSource::new();
    let mut points = Vec::with_capacity(sites.len());
    for (i, s) in sites.iter().enumerate() {
        let id = format!("site-{:03}", i);
        let pid = PointId::from(id.as_str());
        table.insert(pid.clone(), FactorKind::Elevation, RawValue::Numeric(s.elevation));
        table.insert(pid.clone(), FactorKind::Slope, RawValue::Numeric(s.slope));
        table.insert(pid.clone(), FactorKind::DrainageProximity, RawValue::Numeric(s.drainage));
        table.insert(pid.clone(), FactorKind::LandUse, LAND_USE[s.land_use].into());
        table.insert(pid.clone(), FactorKind::SoilPermeability, "low".into());
        table.insert(pid.clone(), FactorKind::Aspect, RawValue::Numeric(s.slope * 8.0));
        table.insert(pid.clone(), FactorKind::Geology, GEOLOGY[s.geology].into());
        table.insert(pid.clone(), FactorKind::LandCover, "cropland".into());
        table.insert(pid, FactorKind::Rainfall, RawValue::Numeric(s.rainfall));
        points.push(Point::new(s.lat, s.lon).with_id(id));
    }
    let coordinator =
        AnalysisCoordinator::new(EngineConfig::default(), table_layers(Arc::new(table)));
    let session = SessionId::parse("0b6c2d7e-3f41-4a8e-9c55-1d2e3f4a5b6c").unwrap();
    let mut request = AnalysisRequest::new(session, points);
    request.requested_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    request.options.bootstrap_b = Some(40);
    (coordinator, request)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Same request and seed, byte-identical JSON.
    #[test]
    fn analysis_is_deterministic(
        sites in prop::collection::vec(site_strategy(), 1..12),
        seed in any::<u64>(),
    ) {
        let (coordinator, mut request) = build(&sites);
        request.seed = Some(seed);
        let a = coordinator.run(&request, &CancellationToken::new()).unwrap();
        let b = coordinator.run(&request, &CancellationToken::new()).unwrap();
        prop_assert_eq!(a.to_json_pretty().unwrap(), b.to_json_pretty().unwrap());
    }

    /// Reversing the input reverses the output and keeps summaries.
    #[test]
    fn reordering_points_reorders_output(
        sites in prop::collection::vec(site_strategy(), 2..12),
        seed in any::<u64>(),
    ) {
        let (coordinator, mut request) = build(&sites);
        request.seed = Some(seed);
        let mut reversed = request.clone();
        reversed.points.reverse();

        let forward = coordinator.run(&request, &CancellationToken::new()).unwrap();
        let backward = coordinator.run(&reversed, &CancellationToken::new()).unwrap();

        let n = forward.flood_scores.len();
        for i in 0..n {
            let f = &forward.flood_scores[i];
            let b = &backward.flood_scores[n - 1 - i];
            prop_assert_eq!(&f.point_id, &b.point_id);
            prop_assert!((f.si - b.si).abs() < 1e-9);
            prop_assert_eq!(f.band, b.band);
            prop_assert!((f.ci_low - b.ci_low).abs() < 1e-9);
            let fl = &forward.landslide_scores[i];
            let bl = &backward.landslide_scores[n - 1 - i];
            prop_assert!((fl.si - bl.si).abs() < 1e-9);
            prop_assert_eq!(
                forward.combined_risk[i].band,
                backward.combined_risk[n - 1 - i].band
            );
        }

        for (f, b) in [
            (&forward.summary.flood, &backward.summary.flood),
            (&forward.summary.landslide, &backward.summary.landslide),
        ] {
            prop_assert_eq!(&f.band_counts, &b.band_counts);
            prop_assert!((f.mean_si.unwrap() - b.mean_si.unwrap()).abs() < 1e-9);
            prop_assert_eq!(f.min_si, b.min_si);
            prop_assert_eq!(f.max_si, b.max_si);
        }
        prop_assert_eq!(
            &forward.summary.combined_band_counts,
            &backward.summary.combined_band_counts
        );
    }
}

#[test]
fn analysis_without_requested_at_is_reproducible() {
    let sites: Vec<Site> = (0..4)
        .map(|i| Site {
            lat: 5.5 + 0.1 * i as f64,
            lon: -0.2 + 0.1 * i as f64,
            elevation: 20.0 * i as f64,
            slope: 5.0 * i as f64,
            drainage: 200.0 * i as f64,
            land_use: i,
            geology: i,
            rainfall: 800.0 + 100.0 * i as f64,
        })
        .collect();
    let (coordinator, mut request) = build(&sites);
    request.requested_at = None;
    request.seed = Some(9);

    let first = coordinator.run(&request, &CancellationToken::new()).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = coordinator.run(&request, &CancellationToken::new()).unwrap();

    assert_eq!(first.timestamp, None);
    assert_eq!(first.to_json_pretty().unwrap(), second.to_json_pretty().unwrap());
}
