//! Two-component Gaussian mixture fit over one gene set's score column.
//!
//! A descriptive aid for picking a per-set activity threshold when the score
//! distribution is bimodal. Fitting is by expectation-maximization with a
//! median-split initialization; non-convergence is reported, never fatal to
//! a scoring pass.

use crate::error::ScoreError;
use crate::set_score::ScoreMatrix;
use crate::stats::median;
use log::warn;

/// EM iteration cap used by [`suggest_thresholds`].
pub const DEFAULT_MAX_ITERS: usize = 200;

/// Log-likelihood convergence tolerance used by [`suggest_thresholds`].
pub const DEFAULT_TOL: f64 = 1e-6;

// component variances below this are treated as a collapse onto a point
const VAR_FLOOR: f64 = 1e-12;

/// A converged two-component fit. Component 0 is the lower-mean component.
#[derive(Clone, Debug)]
pub struct MixtureFit {
    /// mixing weights, summing to 1
    pub weights: [f64; 2],
    /// component means, `means[0] <= means[1]`
    pub means: [f64; 2],
    /// component variances
    pub variances: [f64; 2],
    /// score value where the two weighted component densities cross,
    /// between the means; the proposed activity threshold
    pub threshold: f64,
    /// EM iterations performed
    pub iterations: usize,
}

/// Fit a two-component 1-D Gaussian mixture to `scores` by EM and propose a
/// bimodality threshold. Fails with [`ScoreError::NonConvergentFit`] when the
/// log-likelihood has not settled within `max_iters`, when a component
/// collapses, or when there are too few points to fit.
pub fn fit_bimodal_threshold(scores: &[f64], max_iters: usize, tol: f64) -> Result<MixtureFit, ScoreError> {
    if scores.len() < 4 {
        return Err(ScoreError::NonConvergentFit { iterations: 0 });
    }

    // median-split initialization
    let split = median(scores).unwrap_or(0.0);
    let (lo, hi): (Vec<f64>, Vec<f64>) = scores.iter().copied().partition(|&x| x <= split);
    let mut weights = [lo.len() as f64 / scores.len() as f64, hi.len() as f64 / scores.len() as f64];
    let mut means = [mean_of(&lo), mean_of(&hi)];
    let mut variances = [var_of(&lo, means[0]), var_of(&hi, means[1])];
    if variances.iter().any(|&v| !v.is_finite() || v < VAR_FLOOR) {
        return Err(ScoreError::NonConvergentFit { iterations: 0 });
    }

    let n = scores.len() as f64;
    let mut resp = vec![0.0; scores.len()];
    let mut prev_ll = f64::NEG_INFINITY;

    for iter in 1..=max_iters {
        // E-step: responsibility of component 1 for each point
        let mut ll = 0.0;
        for (r, &x) in resp.iter_mut().zip(scores.iter()) {
            let p0 = weights[0] * normal_pdf(x, means[0], variances[0]);
            let p1 = weights[1] * normal_pdf(x, means[1], variances[1]);
            let total = p0 + p1;
            if total <= 0.0 || !total.is_finite() {
                return Err(ScoreError::NonConvergentFit { iterations: iter });
            }
            *r = p1 / total;
            ll += total.ln();
        }

        // M-step
        let n1: f64 = resp.iter().sum();
        let n0 = n - n1;
        if n0 < f64::EPSILON || n1 < f64::EPSILON {
            return Err(ScoreError::NonConvergentFit { iterations: iter });
        }
        weights = [n0 / n, n1 / n];
        means = [
            resp.iter().zip(scores).map(|(r, &x)| (1.0 - r) * x).sum::<f64>() / n0,
            resp.iter().zip(scores).map(|(r, &x)| r * x).sum::<f64>() / n1,
        ];
        variances = [
            resp.iter()
                .zip(scores)
                .map(|(r, &x)| (1.0 - r) * (x - means[0]).powi(2))
                .sum::<f64>()
                / n0,
            resp.iter().zip(scores).map(|(r, &x)| r * (x - means[1]).powi(2)).sum::<f64>() / n1,
        ];
        if variances.iter().any(|&v| !v.is_finite() || v < VAR_FLOOR) {
            return Err(ScoreError::NonConvergentFit { iterations: iter });
        }

        if (ll - prev_ll).abs() < tol {
            return Ok(finish(weights, means, variances, iter));
        }
        prev_ll = ll;
    }

    Err(ScoreError::NonConvergentFit { iterations: max_iters })
}

/// Propose a threshold for every set column of `scores`. Sets whose fit does
/// not converge yield `None` and a warning; the scoring pass itself never
/// fails here.
pub fn suggest_thresholds(scores: &ScoreMatrix) -> Vec<Option<f64>> {
    scores
        .set_names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let column = scores.scores.column(j).to_vec();
            match fit_bimodal_threshold(&column, DEFAULT_MAX_ITERS, DEFAULT_TOL) {
                Ok(fit) => Some(fit.threshold),
                Err(err) => {
                    warn!("no activity threshold for gene set {name:?}: {err}");
                    None
                }
            }
        })
        .collect()
}

fn finish(weights: [f64; 2], means: [f64; 2], variances: [f64; 2], iterations: usize) -> MixtureFit {
    // order components by mean
    let (weights, means, variances) = if means[0] <= means[1] {
        (weights, means, variances)
    } else {
        (
            [weights[1], weights[0]],
            [means[1], means[0]],
            [variances[1], variances[0]],
        )
    };
    let threshold = crossover(weights, means, variances);
    MixtureFit {
        weights,
        means,
        variances,
        threshold,
        iterations,
    }
}

/// Point between the means where the weighted densities are equal. Equating
/// the two log densities gives a quadratic in x; if no root falls between
/// the means (e.g. one component envelops the other), the midpoint is used.
fn crossover(weights: [f64; 2], means: [f64; 2], variances: [f64; 2]) -> f64 {
    let [w0, w1] = weights;
    let [m0, m1] = means;
    let [v0, v1] = variances;
    let midpoint = 0.5 * (m0 + m1);

    let a = 1.0 / (2.0 * v1) - 1.0 / (2.0 * v0);
    let b = m0 / v0 - m1 / v1;
    let c = m1 * m1 / (2.0 * v1) - m0 * m0 / (2.0 * v0) + (w0 / w1).ln() + 0.5 * (v1 / v0).ln();

    let in_between = |x: f64| x.is_finite() && x >= m0 && x <= m1;

    if a.abs() < f64::EPSILON {
        // equal variances: the crossing is linear
        if b.abs() < f64::EPSILON {
            return midpoint;
        }
        let x = -c / b;
        return if in_between(x) { x } else { midpoint };
    }

    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return midpoint;
    }
    let sq = disc.sqrt();
    for x in [(-b + sq) / (2.0 * a), (-b - sq) / (2.0 * a)] {
        if in_between(x) {
            return x;
        }
    }
    midpoint
}

fn normal_pdf(x: f64, mean: f64, variance: f64) -> f64 {
    let d = x - mean;
    (-d * d / (2.0 * variance)).exp() / (2.0 * std::f64::consts::PI * variance).sqrt()
}

fn mean_of(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn var_of(xs: &[f64], mean: f64) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::Array2;

    fn bimodal_sample() -> Vec<f64> {
        // two tight clusters around 0.2 and 0.8
        let mut xs = Vec::new();
        for i in 0..20 {
            xs.push(0.2 + 0.01 * (i % 5) as f64);
            xs.push(0.8 + 0.01 * (i % 5) as f64);
        }
        xs
    }

    #[test]
    fn test_bimodal_threshold_between_modes() {
        let fit = fit_bimodal_threshold(&bimodal_sample(), DEFAULT_MAX_ITERS, DEFAULT_TOL).unwrap();
        assert!(fit.means[0] < fit.means[1]);
        assert!(fit.threshold > 0.3 && fit.threshold < 0.7, "threshold {}", fit.threshold);
        assert!(fit.iterations <= DEFAULT_MAX_ITERS);
        assert!((fit.weights[0] + fit.weights[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_scores_do_not_converge() {
        let xs = vec![0.5; 30];
        assert!(matches!(
            fit_bimodal_threshold(&xs, DEFAULT_MAX_ITERS, DEFAULT_TOL),
            Err(ScoreError::NonConvergentFit { .. })
        ));
    }

    #[test]
    fn test_too_few_points() {
        assert!(matches!(
            fit_bimodal_threshold(&[0.1, 0.9], DEFAULT_MAX_ITERS, DEFAULT_TOL),
            Err(ScoreError::NonConvergentFit { iterations: 0 })
        ));
    }

    #[test]
    fn test_suggest_thresholds_degrades_per_set() {
        let n = 40;
        let mut scores = Array2::zeros((n, 2));
        for i in 0..n {
            // column 0 bimodal, column 1 constant
            scores[(i, 0)] = if i < n / 2 { 0.1 + 0.001 * i as f64 } else { 0.9 - 0.001 * i as f64 };
            scores[(i, 1)] = 0.4;
        }
        let matrix = ScoreMatrix {
            barcodes: (0..n).map(|i| format!("bc{i}")).collect(),
            set_names: vec!["bimodal".into(), "flat".into()],
            scores,
        };

        let thresholds = suggest_thresholds(&matrix);
        assert_eq!(thresholds.len(), 2);
        let t = thresholds[0].expect("bimodal column should fit");
        assert!(t > 0.12 && t < 0.88, "threshold {t}");
        assert!(thresholds[1].is_none());
    }
}
