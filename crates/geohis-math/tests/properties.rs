//! Property-based tests for geohis-math numerical functions.
//!
//! Uses proptest to verify mathematical properties hold across many random inputs.

use geohis_math::{
    chi_square_sf, gamma_p, gamma_q, log_gamma, mid_ranks, normal_cdf,
    normal_quantile, percentile_sorted, sort_floats, stable_mean, stable_sum,
};
use proptest::prelude::*;

/// Extended tolerance for log_gamma where Lanczos approximation has some error.
const LGAMMA_TOL: f64 = 1e-8;

/// Helper to check approximate equality.
fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    if a.is_nan() && b.is_nan() {
        return true;
    }
    if a.is_nan() || b.is_nan() {
        return false;
    }
    (a - b).abs() <= tol.max(tol * a.abs().max(b.abs()))
}

// ============================================================================
// log_gamma properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Γ(z+1) = z Γ(z).
    #[test]
    fn log_gamma_recurrence(z in 1.0..100.0f64) {
        let lhs = log_gamma(z + 1.0);
        let rhs = z.ln() + log_gamma(z);
        prop_assert!(approx_eq(lhs, rhs, LGAMMA_TOL));
    }

    /// ln Γ(n+1) = ln n!.
    #[test]
    fn log_gamma_factorial(n in 2u64..20) {
        let expected: f64 = (1..=n).map(|k| (k as f64).ln()).sum();
        prop_assert!(approx_eq(log_gamma(n as f64 + 1.0), expected, LGAMMA_TOL));
    }
}

// ============================================================================
// Incomplete gamma / chi-square properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn gamma_p_q_complement(a in 0.1..50.0f64, x in 0.0..100.0f64) {
        let total = gamma_p(a, x) + gamma_q(a, x);
        prop_assert!(approx_eq(total, 1.0, 1e-9));
    }

    #[test]
    fn chi_square_sf_in_unit_interval(x in 0.0..200.0f64, df in 1u32..30) {
        let p = chi_square_sf(x, df);
        prop_assert!((0.0..=1.0).contains(&p));
    }

    /// Larger statistics are never more probable.
    #[test]
    fn chi_square_sf_monotone(x in 0.0..60.0f64, dx in 0.01..10.0f64, df in 1u32..20) {
        prop_assert!(chi_square_sf(x + dx, df) <= chi_square_sf(x, df) + 1e-12);
    }
}

// ============================================================================
// Normal distribution properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn normal_quantile_inverts_cdf(p in 0.001..0.999f64) {
        let z = normal_quantile(p);
        prop_assert!(approx_eq(normal_cdf(z), p, 1e-6));
    }

    #[test]
    fn normal_cdf_symmetric(z in -6.0..6.0f64) {
        prop_assert!(approx_eq(normal_cdf(z) + normal_cdf(-z), 1.0, 1e-6));
    }
}

// ============================================================================
// Percentile and rank properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn percentile_within_range(values in prop::collection::vec(-1e6..1e6f64, 1..200), p in 0.0..100.0f64) {
        let mut sorted = values.clone();
        sort_floats(&mut sorted);
        let q = percentile_sorted(&sorted, p);
        prop_assert!(q >= sorted[0] && q <= sorted[sorted.len() - 1]);
    }

    #[test]
    fn percentile_monotone_in_p(values in prop::collection::vec(0.0..100.0f64, 2..100), p in 0.0..99.0f64) {
        let mut sorted = values.clone();
        sort_floats(&mut sorted);
        prop_assert!(percentile_sorted(&sorted, p) <= percentile_sorted(&sorted, p + 1.0) + 1e-12);
    }

    /// Mid-ranks always sum to n(n+1)/2.
    #[test]
    fn mid_ranks_sum(values in prop::collection::vec(prop::sample::select(vec![0.0, 20.0, 40.0, 60.0, 80.0]), 1..100)) {
        let n = values.len() as f64;
        let total: f64 = mid_ranks(&values).iter().sum();
        prop_assert!(approx_eq(total, n * (n + 1.0) / 2.0, 1e-9));
    }

    #[test]
    fn stable_sum_order_invariant(mut values in prop::collection::vec(-1e3..1e3f64, 1..100)) {
        let forward = stable_sum(&values);
        values.reverse();
        prop_assert!(approx_eq(forward, stable_sum(&values), 1e-9));
        prop_assert!(stable_mean(&values).is_finite());
    }
}

// ============================================================================
// Known values
// ============================================================================

#[test]
fn known_values_chi_square() {
    // Goodness-of-fit example with 3 classes: X² = 10.0, df = 2.
    assert!(approx_eq(chi_square_sf(10.0, 2), (-5.0f64).exp(), 1e-10));
}
