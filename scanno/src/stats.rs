//! Statistics functions

use ndarray::Array1;
use ndarray_stats::interpolate::Linear;
use ndarray_stats::Quantile1dExt;
use noisy_float::prelude::n64;

/// Assign average-tie ranks (1-based) to `data`. Tied values receive the
/// mean of their would-be ranks, the standard transform for Spearman
/// correlation.
pub fn rank_average(data: &[f64]) -> Vec<f64> {
    let n = data.len();
    let mut indexed: Vec<(f64, usize)> = data.iter().copied().enumerate().map(|(i, v)| (v, i)).collect();
    indexed.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && indexed[j].0.total_cmp(&indexed[i].0).is_eq() {
            j += 1;
        }
        // ranks in the tie group are (i+1)..=j
        let rank_val = (i + 1 + j) as f64 / 2.0;
        for k in i..j {
            ranks[indexed[k].1] = rank_val;
        }
        i = j;
    }
    ranks
}

/// Pearson product-moment correlation. Returns 0.0 when either input has
/// zero variance. Inputs must have equal length >= 2.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    debug_assert!(x.len() >= 2);

    let n = x.len() as f64;
    let mean_x: f64 = x.iter().sum::<f64>() / n;
    let mean_y: f64 = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    cov / denom
}

/// Spearman rank correlation: Pearson correlation of the average-tie ranks.
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    let rx = rank_average(x);
    let ry = rank_average(y);
    pearson(&rx, &ry)
}

/// The `pct` percentile (0-100) of pre-sorted samples, with linear
/// interpolation between adjacent order statistics.
pub fn percentile_of_sorted(sorted: &[f64], pct: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    debug_assert!((0.0..=100.0).contains(&pct));
    if sorted.len() == 1 {
        return sorted[0];
    }
    if pct == 100.0 {
        return sorted[sorted.len() - 1];
    }
    let length = (sorted.len() - 1) as f64;
    let rank = (pct / 100.0) * length;
    let l_rank = rank.floor();
    let d = rank - l_rank;
    let n = l_rank as usize;
    let lo = sorted[n];
    let hi = sorted[n + 1];
    lo + (hi - lo) * d
}

/// Median of `data` (unsorted).
pub fn median(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(percentile_of_sorted(&sorted, 50.0))
}

/// Tukey lower outlier fence Q1 - 1.5 * IQR of `data`. `None` on empty input.
pub fn tukey_lower_fence(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut xs = Array1::from_iter(data.iter().map(|&x| n64(x)));
    let q1 = xs.quantile_mut(n64(0.25), &Linear).ok()?;
    let q3 = xs.quantile_mut(n64(0.75), &Linear).ok()?;
    let iqr = q3 - q1;
    Some((q1 - n64(1.5) * iqr).raw())
}
