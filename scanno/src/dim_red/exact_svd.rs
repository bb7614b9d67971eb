#![allow(non_snake_case)]

use super::{check_rank, DataMat, Pca, PcaResult};
use crate::error::DimRedError;
use ndarray::linalg::Dot;
use ndarray::{s, Array2};
use ndarray_linalg::svddc::JobSvd;
use ndarray_linalg::SVDDCInto;

/// Exact truncated SVD via the divide-and-conquer driver. Deterministic,
/// intended for small-to-medium matrices; prefer [`super::rand_svd::RandSvd`]
/// when the input is large and `k` is small.
pub struct ExactSvd;

impl ExactSvd {
    /// Create a new ExactSvd.
    pub fn new() -> ExactSvd {
        ExactSvd
    }
}

impl Default for ExactSvd {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pca<T, f64> for ExactSvd
where
    T: DataMat + Dot<Array2<f64>, Output = Array2<f64>>,
{
    fn run_pca(&self, array: &T, k: usize) -> Result<PcaResult, DimRedError> {
        let [m, n] = array.shape();
        check_rank(k, m, n)?;

        // densify through an identity multiply, which is the one operation
        // every DataMat backend supports
        let dense = array.dot(&Array2::<f64>::eye(n));
        let svd = dense.svddc_into(JobSvd::Some)?;
        let U = svd.0.unwrap().slice(s![.., ..k]).to_owned();
        let sigma = svd.1.slice(s![..k]).to_owned();
        let Va = svd.2.unwrap().slice(s![..k, ..]).to_owned();

        Ok((U, sigma, Va.reversed_axes()))
    }
}
