use ndarray_linalg::error::LinalgError;
use thiserror::Error;

/// Errors from the low-rank projector.
#[derive(Debug, Error)]
pub enum DimRedError {
    /// The requested rank is zero or not strictly below the smaller matrix dimension.
    #[error("invalid rank {rank}: must satisfy 1 <= rank < min(features = {n_features}, barcodes = {n_barcodes})")]
    InvalidRank {
        /// requested rank
        rank: usize,
        /// number of (selected) feature rows
        n_features: usize,
        /// number of barcode columns
        n_barcodes: usize,
    },

    /// The feature subset selected no rows.
    #[error("feature subset excludes all {n_features} features")]
    EmptyFeatureSet {
        /// number of features in the matrix
        n_features: usize,
    },

    /// A feature-subset index is out of range.
    #[error("feature index {index} out of bounds for {n_features} features")]
    FeatureIndexOutOfBounds {
        /// offending index
        index: usize,
        /// number of features in the matrix
        n_features: usize,
    },

    /// Failure in the underlying decomposition.
    #[error(transparent)]
    Linalg(#[from] LinalgError),
}

/// Errors from the reference label classifier.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// A label pair has no marker genes, so the pair cannot be distinguished.
    #[error("no marker genes defined for label pair ({first:?}, {second:?})")]
    EmptyMarkerSet {
        /// first label of the pair, in definition order
        first: String,
        /// second label of the pair
        second: String,
    },

    /// Query and reference share too few genes of the marker union.
    #[error("query and reference share {shared} of {union} marker-union genes; at least 2 required")]
    NoGeneOverlap {
        /// number of marker-union genes present in both gene universes
        shared: usize,
        /// size of the full marker union
        union: usize,
    },

    /// A marker definition names a label absent from the reference.
    #[error("unknown label {label:?}")]
    UnknownLabel {
        /// offending label
        label: String,
    },

    /// Marker table and reference were built over different label sets.
    #[error("marker table labels do not match reference labels")]
    LabelMismatch,
}

/// Errors from the rank-based set scorer and its mixture diagnostic.
#[derive(Debug, Error)]
pub enum ScoreError {
    /// An empty gene set was passed to the scorer.
    #[error("gene set {name:?} is empty")]
    DegenerateGeneSet {
        /// name of the offending set
        name: String,
    },

    /// The top fraction must lie in (0, 1].
    #[error("top fraction {fraction} outside (0, 1]")]
    InvalidTopFraction {
        /// offending fraction
        fraction: f64,
    },

    /// The mixture fit did not converge. Diagnostic only, never fatal to a
    /// scoring pass.
    #[error("mixture fit did not converge after {iterations} iterations")]
    NonConvergentFit {
        /// iterations performed before giving up
        iterations: usize,
    },
}
