use super::exact_svd::ExactSvd;
use super::rand_svd::RandSvd;
use super::Pca;
use crate::error::DimRedError;
use log::debug;
use ndarray::{Array1, Array2, Axis};
use scanno_types::ExpressionMatrix;

/// Which SVD backend computes the decomposition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SvdMethod {
    /// Deterministic divide-and-conquer SVD.
    Exact,
    /// Randomized range-finder SVD; bit-reproducible for a fixed seed.
    Randomized {
        /// seed for the projection RNG
        seed: u64,
    },
}

/// One principal component of an [`Embedding`].
#[derive(Clone, Debug)]
pub struct Component {
    /// Percent of the total variance of the centered matrix captured by
    /// this component.
    pub variance_pct: f64,
    /// Coordinate of every barcode along this component (sigma * v).
    pub coords: Array1<f64>,
}

/// A truncated principal-component embedding of the barcodes. Components are
/// ordered by non-increasing `variance_pct`.
#[derive(Clone, Debug)]
pub struct Embedding {
    components: Vec<Component>,
}

impl Embedding {
    /// Components in decreasing variance-explained order.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Number of retained components.
    pub fn rank(&self) -> usize {
        self.components.len()
    }

    /// Barcode coordinates as a barcodes x rank matrix, component order
    /// preserved.
    pub fn coords_matrix(&self) -> Array2<f64> {
        let n = self.components.first().map_or(0, |c| c.coords.len());
        let mut out = Array2::zeros((n, self.components.len()));
        for (i, c) in self.components.iter().enumerate() {
            out.index_axis_mut(Axis(1), i).assign(&c.coords);
        }
        out
    }
}

/// Compute a rank-`rank` principal-component embedding of `matrix`.
///
/// Each feature row (optionally restricted to `feature_subset`) is centered
/// by its mean, then the truncated SVD of the centered matrix is taken with
/// the chosen `method`. Variance-explained percentages are relative to the
/// total variance of the centered matrix (its squared Frobenius norm, the
/// exact trace of AᵀA), so they are comparable across `rank` choices and sum
/// to <= 100.
pub fn project(
    matrix: &ExpressionMatrix,
    rank: usize,
    feature_subset: Option<&[usize]>,
    method: SvdMethod,
) -> Result<Embedding, DimRedError> {
    let [m, n] = matrix.shape();

    let centered = match feature_subset {
        Some(subset) => {
            if subset.is_empty() {
                return Err(DimRedError::EmptyFeatureSet { n_features: m });
            }
            if let Some(&index) = subset.iter().find(|&&i| i >= m) {
                return Err(DimRedError::FeatureIndexOutOfBounds { index, n_features: m });
            }
            center_features(matrix.matrix.select(Axis(0), subset))
        }
        None => center_features(matrix.matrix.clone()),
    };

    super::check_rank(rank, centered.nrows(), n)?;

    // exact trace of AᵀA, no decomposition needed
    let total_var: f64 = centered.iter().map(|v| v * v).sum();

    debug!(
        "projecting {} features x {} barcodes onto {} components ({method:?})",
        centered.nrows(),
        n,
        rank
    );

    let (_u, sigma, v) = match method {
        SvdMethod::Exact => ExactSvd::new().run_pca(&centered, rank)?,
        SvdMethod::Randomized { seed } => RandSvd::new(seed).run_pca(&centered, rank)?,
    };

    let components = sigma
        .iter()
        .enumerate()
        .map(|(i, &s)| Component {
            variance_pct: if total_var > 0.0 { s * s / total_var * 100.0 } else { 0.0 },
            coords: v.index_axis(Axis(1), i).mapv(|x| x * s),
        })
        .collect();

    Ok(Embedding { components })
}

/// Subtract each feature row's mean in place.
fn center_features(mut a: Array2<f64>) -> Array2<f64> {
    for mut row in a.axis_iter_mut(Axis(0)) {
        let mean = row.sum() / row.len() as f64;
        row.mapv_inplace(|x| x - mean);
    }
    a
}
