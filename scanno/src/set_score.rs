//! Rank-based gene set scoring.
//!
//! Each cell's genes are ranked by descending expression (ties broken
//! lexicographically by gene id, so rankings are reproducible for identical
//! inputs). A gene set's score is the normalized area under the
//! members-seen-vs-rank curve over the top fraction of the ranking: 1.0 when
//! the set occupies the full top prefix, 0.0 when it is disjoint from the
//! top fraction.

use crate::error::ScoreError;
use log::info;
use ndarray::parallel::prelude::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use ndarray::{Array2, Axis};
use scanno_types::{ExpressionMatrix, GeneSet, GeneSetCollection};
use std::collections::HashSet;

/// Default top fraction of the ranking over which the curve is accumulated.
pub const DEFAULT_TOP_FRACTION: f64 = 0.05;

/// One cell's total gene ordering by descending expression.
#[derive(Clone, Debug)]
pub struct CellRanking {
    /// barcode this ranking belongs to
    pub barcode: String,
    genes: Vec<String>,
}

impl CellRanking {
    /// Gene ids from rank 1 downward.
    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    /// Number of ranked genes.
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    /// True when no genes were ranked.
    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

/// Rank every cell's genes by descending expression value; ties break
/// lexicographically on gene id.
pub fn rank_genes(matrix: &ExpressionMatrix) -> Vec<CellRanking> {
    let [m, n] = matrix.shape();
    (0..n)
        .map(|j| {
            let col = matrix.barcode_column(j);
            let mut order: Vec<usize> = (0..m).collect();
            order.sort_by(|&a, &b| {
                col[b]
                    .total_cmp(&col[a])
                    .then_with(|| matrix.feature_ids[a].cmp(&matrix.feature_ids[b]))
            });
            CellRanking {
                barcode: matrix.barcodes[j].clone(),
                genes: order.into_iter().map(|i| matrix.feature_ids[i].clone()).collect(),
            }
        })
        .collect()
}

/// Normalized AUC of `set` over the top `top_fraction` of `ranking`.
pub fn auc_score(ranking: &CellRanking, set: &GeneSet, top_fraction: f64) -> Result<f64, ScoreError> {
    check_fraction(top_fraction)?;
    check_set(set)?;
    let cutoff = cutoff_rank(ranking.len(), top_fraction);
    Ok(auc_at_cutoff(ranking.genes(), &set.member_set(), cutoff))
}

/// Cell x set score matrix for every set in `collection`, computed in
/// parallel across cells. Column order follows the collection's definition
/// order.
#[derive(Clone, Debug)]
pub struct ScoreMatrix {
    /// row labels (cells)
    pub barcodes: Vec<String>,
    /// column labels (gene sets)
    pub set_names: Vec<String>,
    /// AUC scores, each in [0, 1]
    pub scores: Array2<f64>,
}

/// Score every (cell, gene set) pair of `matrix` x `collection`.
pub fn score_collection(
    matrix: &ExpressionMatrix,
    collection: &GeneSetCollection,
    top_fraction: f64,
) -> Result<ScoreMatrix, ScoreError> {
    check_fraction(top_fraction)?;
    for set in collection.sets() {
        check_set(set)?;
    }

    let rankings = rank_genes(matrix);
    let members: Vec<HashSet<&str>> = collection.sets().iter().map(GeneSet::member_set).collect();
    let cutoff = cutoff_rank(matrix.shape()[0], top_fraction);

    info!(
        "scoring {} cells x {} gene sets over the top {} of {} ranks",
        rankings.len(),
        collection.len(),
        cutoff,
        matrix.shape()[0]
    );

    let mut scores = Array2::zeros((rankings.len(), collection.len()));
    scores
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            for (j, m) in members.iter().enumerate() {
                row[j] = auc_at_cutoff(rankings[i].genes(), m, cutoff);
            }
        });

    Ok(ScoreMatrix {
        barcodes: rankings.into_iter().map(|r| r.barcode).collect(),
        set_names: collection.names(),
        scores,
    })
}

fn check_fraction(top_fraction: f64) -> Result<(), ScoreError> {
    if !(top_fraction > 0.0 && top_fraction <= 1.0) {
        return Err(ScoreError::InvalidTopFraction {
            fraction: top_fraction,
        });
    }
    Ok(())
}

fn check_set(set: &GeneSet) -> Result<(), ScoreError> {
    if set.is_empty() {
        return Err(ScoreError::DegenerateGeneSet { name: set.name.clone() });
    }
    Ok(())
}

fn cutoff_rank(n_genes: usize, top_fraction: f64) -> usize {
    ((top_fraction * n_genes as f64).floor() as usize).clamp(1, n_genes.max(1))
}

/// Unit-step Riemann sum of the members-seen curve over ranks 1..=cutoff,
/// normalized by the maximum achievable area for the members present in the
/// ranking.
fn auc_at_cutoff(ranked: &[String], members: &HashSet<&str>, cutoff: usize) -> f64 {
    // members absent from the gene universe cannot contribute to the curve
    let k = ranked
        .iter()
        .filter(|g| members.contains(g.as_str()))
        .count()
        .min(cutoff);
    if k == 0 {
        return 0.0;
    }

    let mut seen = 0usize;
    let mut area = 0usize;
    for g in &ranked[..cutoff] {
        if members.contains(g.as_str()) {
            seen += 1;
        }
        area += seen;
    }

    // best case: all k members occupy ranks 1..=k
    let max_area = k * (k + 1) / 2 + k * (cutoff - k);
    area as f64 / max_area as f64
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::Array2;
    use scanno_types::GeneSetCollection;

    /// One cell over 10 genes with strictly decreasing expression, so the
    /// ranking is g0, g1, ..., g9.
    fn ladder_matrix() -> ExpressionMatrix {
        let genes: Vec<String> = (0..10).map(|i| format!("g{i}")).collect();
        let values = Array2::from_shape_fn((10, 1), |(i, _)| 10.0 - i as f64);
        ExpressionMatrix::new(genes, vec!["bc0".into()], values).unwrap()
    }

    #[test]
    fn test_prefix_set_scores_one() {
        let rankings = rank_genes(&ladder_matrix());
        let set = GeneSet::new("prefix", (0..3).map(|i| format!("g{i}")));
        // topFraction 0.5 of 10 genes = 5 ranks
        let auc = auc_score(&rankings[0], &set, 0.5).unwrap();
        assert_approx_eq!(auc, 1.0, 1e-12);
    }

    #[test]
    fn test_disjoint_set_scores_zero() {
        let rankings = rank_genes(&ladder_matrix());
        let set = GeneSet::new("tail", (5..10).map(|i| format!("g{i}")));
        let auc = auc_score(&rankings[0], &set, 0.5).unwrap();
        assert_eq!(auc, 0.0);
    }

    #[test]
    fn test_partial_overlap() {
        let rankings = rank_genes(&ladder_matrix());
        // member at ranks 1 and 4: curve is 1,1,1,2,2 -> area 7, max 9
        let set = GeneSet::new("mixed", ["g0".to_string(), "g3".to_string()]);
        let auc = auc_score(&rankings[0], &set, 0.5).unwrap();
        assert_approx_eq!(auc, 7.0 / 9.0, 1e-12);
    }

    #[test]
    fn test_members_outside_universe_ignored() {
        let rankings = rank_genes(&ladder_matrix());
        let set = GeneSet::new("alien", ["g0".to_string(), "nope".to_string()]);
        // only g0 is rankable; it sits at rank 1, so the score is maximal
        let auc = auc_score(&rankings[0], &set, 0.5).unwrap();
        assert_approx_eq!(auc, 1.0, 1e-12);
    }

    #[test]
    fn test_ties_break_lexicographically() {
        let genes = vec!["zeta".to_string(), "alpha".to_string(), "mid".to_string()];
        let values = Array2::from_shape_vec((3, 1), vec![5.0, 5.0, 1.0]).unwrap();
        let m = ExpressionMatrix::new(genes, vec!["bc0".into()], values).unwrap();

        let rankings = rank_genes(&m);
        let expected: Vec<String> = ["alpha", "zeta", "mid"].iter().map(|s| s.to_string()).collect();
        assert_eq!(rankings[0].genes(), expected.as_slice());
    }

    #[test]
    fn test_degenerate_set_and_bad_fraction() {
        let rankings = rank_genes(&ladder_matrix());
        let empty = GeneSet::new("empty", Vec::<String>::new());
        assert!(matches!(
            auc_score(&rankings[0], &empty, 0.5),
            Err(ScoreError::DegenerateGeneSet { .. })
        ));

        let set = GeneSet::new("s", ["g0".to_string()]);
        for bad in [0.0, -0.5, 1.5] {
            assert!(matches!(
                auc_score(&rankings[0], &set, bad),
                Err(ScoreError::InvalidTopFraction { .. })
            ));
        }
    }

    #[test]
    fn test_score_collection_matrix() {
        let genes: Vec<String> = (0..10).map(|i| format!("g{i}")).collect();
        // two cells with opposite expression ladders
        let values = Array2::from_shape_fn((10, 2), |(i, j)| if j == 0 { 10.0 - i as f64 } else { i as f64 });
        let m = ExpressionMatrix::new(genes, vec!["bc0".into(), "bc1".into()], values).unwrap();

        let mut collection = GeneSetCollection::new();
        collection.push(GeneSet::new("head", (0..3).map(|i| format!("g{i}")))).unwrap();
        collection.push(GeneSet::new("tail", (7..10).map(|i| format!("g{i}")))).unwrap();

        let result = score_collection(&m, &collection, 0.5).unwrap();
        assert_eq!(result.scores.shape(), &[2, 2]);
        assert_eq!(result.set_names, vec!["head".to_string(), "tail".to_string()]);

        // bc0 ranks g0..g9 descending: head on top, tail disjoint
        assert_approx_eq!(result.scores[(0, 0)], 1.0, 1e-12);
        assert_eq!(result.scores[(0, 1)], 0.0);
        // bc1 is reversed
        assert_eq!(result.scores[(1, 0)], 0.0);
        assert_approx_eq!(result.scores[(1, 1)], 1.0, 1e-12);
    }

    #[test]
    fn test_cutoff_is_at_least_one() {
        let rankings = rank_genes(&ladder_matrix());
        let set = GeneSet::new("top", ["g0".to_string()]);
        // 0.01 * 10 genes rounds down to 0; the cutoff clamps to rank 1
        let auc = auc_score(&rankings[0], &set, 0.01).unwrap();
        assert_approx_eq!(auc, 1.0, 1e-12);
    }
}
