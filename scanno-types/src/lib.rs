//! Shared data types for the scanno workspace: labeled expression matrices,
//! reference profile sets and gene set collections.

pub mod gene_sets;
pub mod matrix;
pub mod reference;

pub use gene_sets::{GeneSet, GeneSetCollection};
pub use matrix::ExpressionMatrix;
pub use reference::ReferenceProfileSet;
