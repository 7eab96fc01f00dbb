//! Percentiles and rank statistics.

use std::cmp::Ordering;

/// Linear-interpolated percentile of a sorted slice; `p` in [0, 100].
///
/// Rank is `p/100 · (n − 1)` between the two bracketing order statistics.
/// Returns NaN for empty input.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() || p.is_nan() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Sort a copy of `values` (NaNs last) and take the percentile.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    let mut sorted = values.to_vec();
    sort_floats(&mut sorted);
    percentile_sorted(&sorted, p)
}

/// Ascending sort using total ordering.
pub fn sort_floats(values: &mut [f64]) {
    values.sort_by(|a, b| a.total_cmp(b));
}

/// Mid-ranks (1-based) of `values`; tied values share their average rank.
pub fn mid_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(Ordering::Equal)
    });

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Positions i..=j hold ties; their 1-based ranks average to this.
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates() {
        let v = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile_sorted(&v, 0.0), 10.0);
        assert_eq!(percentile_sorted(&v, 50.0), 30.0);
        assert_eq!(percentile_sorted(&v, 100.0), 50.0);
        assert!((percentile_sorted(&v, 20.0) - 18.0).abs() < 1e-12);
        assert!((percentile_sorted(&v, 97.5) - 49.0).abs() < 1e-12);
    }

    #[test]
    fn percentile_empty_and_single() {
        assert!(percentile_sorted(&[], 50.0).is_nan());
        assert_eq!(percentile_sorted(&[7.0], 80.0), 7.0);
    }

    #[test]
    fn percentile_unsorted_input() {
        assert_eq!(percentile(&[3.0, 1.0, 2.0], 50.0), 2.0);
    }

    #[test]
    fn mid_ranks_average_ties() {
        let ranks = mid_ranks(&[20.0, 80.0, 20.0, 50.0]);
        assert_eq!(ranks, vec![1.5, 4.0, 1.5, 3.0]);
    }
}
