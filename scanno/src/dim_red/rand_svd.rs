#![allow(non_snake_case)]

use super::{check_rank, DataMat, Pca, PcaResult};
use crate::error::DimRedError;
use ndarray::linalg::Dot;
use ndarray::{s, Array2, ArrayView2};
use ndarray_linalg::svddc::JobSvd;
use ndarray_linalg::{SVDDCInto, QR};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// Settings for randomized SVD. The `seed` fully determines the random
/// projections, so results are bit-reproducible for a fixed seed; it is
/// never drawn from ambient RNG state.
pub struct RandSvd {
    /// Multiple of the requested k to use in randomized projections
    pub l_multiplier: f64,

    /// Number of power iterations to perform
    pub n_iter: usize,

    /// Seed for the projection RNG
    pub seed: u64,
}

impl RandSvd {
    /// Create a new RandSvd with default settings and the given seed.
    pub fn new(seed: u64) -> RandSvd {
        RandSvd {
            l_multiplier: 10.0,
            n_iter: 2,
            seed,
        }
    }
}

impl<T> Pca<T, f64> for RandSvd
where
    T: DataMat + for<'a> Dot<ArrayView2<'a, f64>, Output = Array2<f64>> + Dot<Array2<f64>, Output = Array2<f64>>,
    for<'a> ArrayView2<'a, f64>: Dot<T, Output = Array2<f64>>,
    Array2<f64>: Dot<T, Output = Array2<f64>>,
    Array2<f64>: Dot<Array2<f64>, Output = Array2<f64>>,
{
    fn run_pca(&self, array: &T, k: usize) -> Result<PcaResult, DimRedError> {
        let l = std::cmp::max(k + 4, ((k as f64) * self.l_multiplier) as usize);
        let (u, s, vt) = svd_rand(array, k, l, self.n_iter, self.seed)?;
        Ok((u, s, vt.reversed_axes()))
    }
}

/// Perform an SVD of matrix `A`, making a rank `k` approximation. Use `l`
/// projection dimensions, `n_iter` power iterations and the RNG seed `seed`.
#[inline(never)]
pub fn svd_rand<T>(
    A: &T,
    k: usize, // svd rank
    l: usize,
    n_iter: usize, // power iterations
    seed: u64,
) -> Result<PcaResult, DimRedError>
where
    T: DataMat + for<'a> Dot<ArrayView2<'a, f64>, Output = Array2<f64>> + Dot<Array2<f64>, Output = Array2<f64>>,
    for<'a> ArrayView2<'a, f64>: Dot<T, Output = Array2<f64>>,
    Array2<f64>: Dot<T, Output = Array2<f64>>,
    Array2<f64>: Dot<Array2<f64>, Output = Array2<f64>>,
{
    let m = A.shape()[0];
    let n = A.shape()[1];

    check_rank(k, m, n)?;

    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let unif = Uniform::new(-1.0, 1.0);

    if m >= n {
        let omega = Array2::random_using((n, l), unif, &mut rng);
        let mut Q: Array2<f64> = A.dot(&omega).qr()?.0;

        for _ in 0..n_iter {
            Q = Q.t().dot(A).reversed_axes().qr()?.0;
            Q = A.dot(&Q).qr()?.0;
        }

        let (U, sigma, Va) = {
            let B = Q.t().dot(A);
            let svd = B.svddc_into(JobSvd::Some)?;
            (
                svd.0.unwrap().slice(s![.., ..k]).to_owned(),
                svd.1.slice(s![..k]).to_owned(),
                svd.2.unwrap().slice(s![..k, ..]).to_owned(),
            )
        };

        let U = Q.dot(&U);
        Ok((U, sigma, Va))
    } else {
        // n > m
        let omega = Array2::random_using((l, m), unif, &mut rng);
        let mut Q = omega.dot(A).reversed_axes().qr()?.0;

        for _ in 0..n_iter {
            Q = A.dot(&Q).qr()?.0;
            Q = Q.t().dot(A).reversed_axes().qr()?.0;
        }

        let (U, sigma, Va) = {
            let B = A.dot(&Q);
            let svd = B.svddc_into(JobSvd::Some)?;
            (
                svd.0.unwrap().slice(s![.., ..k]).to_owned(),
                svd.1.slice(s![..k]).to_owned(),
                svd.2.unwrap().slice(s![..k, ..]).to_owned(),
            )
        };

        let Va = Va.dot(&Q.t());
        Ok((U, sigma, Va))
    }
}
