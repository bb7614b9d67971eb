#![allow(non_snake_case)]

//! Low-rank projection of expression matrices.
//!
//! The SVD methods are written generically over the raw data matrix: for a
//! data matrix `A` and query matrix `b` they only need `A * b` and `b * A`
//! (via `ndarray::linalg::Dot` bounds declared per method). This keeps the
//! decomposition code independent of the matrix representation, so a sparse
//! or otherwise compressed backend can implement the same contract without
//! touching the algorithms.

use crate::error::DimRedError;
use ndarray::{Array1, Array2, ArrayView2};

/// Exact truncated SVD
pub mod exact_svd;

/// Randomized SVD method
pub mod rand_svd;

mod project;

pub use project::{project, Component, Embedding, SvdMethod};


/// `(U, sigma, V)` of a rank-`k` approximation: `U` is features x k,
/// `sigma` the top `k` singular values in decreasing order, `V` barcodes x k.
pub type PcaResult = (Array2<f64>, Array1<f64>, Array2<f64>);

/// Trait for getting the dimensions of a matrix
pub trait DataMat {
    /// Get the shape of the matrix
    fn shape(&self) -> [usize; 2];
}

impl DataMat for ArrayView2<'_, f64> {
    fn shape(&self) -> [usize; 2] {
        [self.shape()[0], self.shape()[1]]
    }
}

impl DataMat for Array2<f64> {
    fn shape(&self) -> [usize; 2] {
        [self.shape()[0], self.shape()[1]]
    }
}

/// Perform a truncated SVD of a `matrix`, retaining `k` components.
/// This trait always performs the pure SVD of the matrix. Special cases of
/// SVD such as PCA are achieved by the appropriate shifts and scaling of
/// `matrix` (see [`project`]).
pub trait Pca<T, N> {
    /// Compute a rank `k` truncated SVD of `matrix`
    fn run_pca(&self, matrix: &T, k: usize) -> Result<PcaResult, DimRedError>;
}

pub(crate) fn check_rank(k: usize, m: usize, n: usize) -> Result<(), DimRedError> {
    // a valid rank leaves at least one component unretained, so 2x2 is the
    // smallest decomposable shape
    if k == 0 || k >= std::cmp::min(m, n) {
        return Err(DimRedError::InvalidRank {
            rank: k,
            n_features: m,
            n_barcodes: n,
        });
    }
    Ok(())
}

/// Mean-squared value of cells in `a`
pub fn frobenius(a: &ArrayView2<f64>) -> f64 {
    let mut acc = 0.0;
    for v in a {
        acc += v * v;
    }

    let sz = (a.shape()[0] * a.shape()[1]) as f64;
    acc.sqrt() / sz
}
