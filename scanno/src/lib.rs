//! # scanno: single-cell annotation numerics in Rust
//!
//! Three independent components over labeled expression matrices:
//! low-rank projection (PCA), reference-based label transfer, and
//! rank-based gene set scoring.

#![deny(missing_docs)]
#![deny(warnings)]

/// Dimensionality reduction methods
pub mod dim_red;

/// Typed error taxonomy
pub mod error;

/// Reference-based label transfer with fine-tuning
pub mod label_transfer;

/// Two-component mixture diagnostic for score bimodality
pub mod mixture;

/// Rank-based gene set scoring
pub mod set_score;

/// Statistics functions
pub mod stats;
