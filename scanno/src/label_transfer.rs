//! Reference-based label transfer.
//!
//! Each query barcode is scored by Spearman rank correlation against every
//! reference profile, restricted to the union of pairwise marker genes, then
//! iteratively fine-tuned: labels within a score margin of the best stay in
//! the candidate set, correlations are recomputed over only the markers that
//! distinguish the remaining candidates, and the process repeats until one
//! label remains, the candidate set stops shrinking, or the iteration cap is
//! reached.

use crate::error::ClassifyError;
use crate::stats::{spearman, tukey_lower_fence};
use itertools::Itertools;
use log::info;
use ndarray::parallel::prelude::{IntoParallelIterator, ParallelIterator};
use ndarray::ArrayView1;
use scanno_types::{ExpressionMatrix, ReferenceProfileSet};
use std::collections::{BTreeSet, HashMap};

/// Marker genes per unordered pair of reference labels.
#[derive(Clone, Debug)]
pub struct PairwiseMarkers {
    labels: Vec<String>,
    markers: HashMap<(usize, usize), Vec<String>>,
}

impl PairwiseMarkers {
    /// A marker table over `labels`, in the reference's definition order.
    pub fn new(labels: Vec<String>) -> PairwiseMarkers {
        PairwiseMarkers {
            labels,
            markers: HashMap::new(),
        }
    }

    /// Labels this table was defined over.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Set the markers distinguishing labels `a` and `b` (order irrelevant).
    pub fn insert(
        &mut self,
        a: &str,
        b: &str,
        genes: impl IntoIterator<Item = String>,
    ) -> Result<(), ClassifyError> {
        let i = self.label_index(a)?;
        let j = self.label_index(b)?;
        let key = (i.min(j), i.max(j));
        self.markers.insert(key, genes.into_iter().collect());
        Ok(())
    }

    fn label_index(&self, label: &str) -> Result<usize, ClassifyError> {
        self.labels
            .iter()
            .position(|l| l == label)
            .ok_or_else(|| ClassifyError::UnknownLabel {
                label: label.to_string(),
            })
    }

    /// Every label pair must carry at least one marker, otherwise that pair
    /// cannot be distinguished.
    pub fn validate_complete(&self) -> Result<(), ClassifyError> {
        for (i, j) in (0..self.labels.len()).tuple_combinations() {
            if self.markers.get(&(i, j)).map_or(true, Vec::is_empty) {
                return Err(ClassifyError::EmptyMarkerSet {
                    first: self.labels[i].clone(),
                    second: self.labels[j].clone(),
                });
            }
        }
        Ok(())
    }

    /// Sorted, de-duplicated union of the markers over all pairs drawn from
    /// `candidates`. Sorting keeps the gene order deterministic regardless of
    /// insertion order.
    fn union_for(&self, candidates: &[usize]) -> Vec<&str> {
        let mut union = BTreeSet::new();
        for (&i, &j) in candidates.iter().tuple_combinations() {
            if let Some(genes) = self.markers.get(&(i.min(j), i.max(j))) {
                union.extend(genes.iter().map(String::as_str));
            }
        }
        union.into_iter().collect()
    }
}

/// Tunable constants for [`classify`].
#[derive(Clone, Debug)]
pub struct ClassifySettings {
    /// Labels scoring within this margin of the best stay candidates during
    /// fine-tuning.
    pub fine_tune_margin: f64,
    /// Cap on fine-tuning iterations per barcode.
    pub max_fine_tune_iters: usize,
    /// Absolute score below which an assignment is marked pruned. When
    /// `None`, the Tukey lower fence of the barcode's own score vector is
    /// used instead.
    pub prune_threshold: Option<f64>,
}

impl Default for ClassifySettings {
    fn default() -> Self {
        ClassifySettings {
            fine_tune_margin: 0.05,
            max_fine_tune_iters: 10,
            prune_threshold: None,
        }
    }
}

/// The classification of one query barcode.
#[derive(Clone, Debug)]
pub struct LabelAssignment {
    /// query barcode
    pub barcode: String,
    /// final (fine-tuned) label
    pub label: String,
    /// pre-fine-tuning Spearman score of every reference label, in the
    /// reference's definition order
    pub scores: Vec<f64>,
    /// low-confidence flag; the raw scores are retained either way
    pub pruned: bool,
}

/// Assign a reference label to every barcode of `query`.
///
/// Fails with [`ClassifyError::EmptyMarkerSet`] if any label pair lacks
/// markers, and with [`ClassifyError::NoGeneOverlap`] if fewer than two
/// marker-union genes are present in both gene universes. Classification is
/// independent per barcode and runs in parallel across barcodes.
pub fn classify(
    query: &ExpressionMatrix,
    reference: &ReferenceProfileSet,
    markers: &PairwiseMarkers,
    settings: &ClassifySettings,
) -> Result<Vec<LabelAssignment>, ClassifyError> {
    if markers.labels() != reference.labels.as_slice() {
        return Err(ClassifyError::LabelMismatch);
    }
    markers.validate_complete()?;

    let n_labels = reference.n_labels();
    let all_labels: Vec<usize> = (0..n_labels).collect();
    let union = markers.union_for(&all_labels);

    // gene id -> (query row, reference row), for markers present in both
    let query_rows = query.feature_index();
    let reference_rows: HashMap<&str, usize> = reference
        .feature_ids
        .iter()
        .enumerate()
        .map(|(i, f)| (f.as_str(), i))
        .collect();
    let gene_rows: HashMap<&str, (usize, usize)> = union
        .iter()
        .filter_map(|&g| match (query_rows.get(g), reference_rows.get(g)) {
            (Some(&q), Some(&r)) => Some((g, (q, r))),
            _ => None,
        })
        .collect();

    let shared: Vec<(usize, usize)> = union.iter().filter_map(|&g| gene_rows.get(g).copied()).collect();
    if shared.len() < 2 {
        return Err(ClassifyError::NoGeneOverlap {
            shared: shared.len(),
            union: union.len(),
        });
    }

    let n_barcodes = query.shape()[1];
    info!(
        "classifying {} barcodes against {} labels over {} shared marker genes",
        n_barcodes,
        n_labels,
        shared.len()
    );

    let assignments = (0..n_barcodes)
        .into_par_iter()
        .map(|b| classify_one(b, query, reference, markers, settings, &shared, &gene_rows))
        .collect();

    Ok(assignments)
}

fn classify_one(
    barcode: usize,
    query: &ExpressionMatrix,
    reference: &ReferenceProfileSet,
    markers: &PairwiseMarkers,
    settings: &ClassifySettings,
    shared: &[(usize, usize)],
    gene_rows: &HashMap<&str, (usize, usize)>,
) -> LabelAssignment {
    let n_labels = reference.n_labels();
    let col = query.barcode_column(barcode);

    // full score vector over all labels, reported to the caller unmodified
    let scores: Vec<f64> = (0..n_labels)
        .map(|l| restricted_spearman(&col, &reference.profile(l), shared))
        .collect();

    let mut candidates: Vec<usize> = (0..n_labels).collect();
    let mut cand_scores = scores.clone();

    for _ in 0..settings.max_fine_tune_iters {
        if candidates.len() <= 1 {
            break;
        }
        let best = max_score(&cand_scores);
        let keep: Vec<usize> = (0..candidates.len())
            .filter(|&i| cand_scores[i] >= best - settings.fine_tune_margin)
            .collect();
        if keep.len() == candidates.len() {
            // fixed point, no further narrowing possible
            break;
        }
        cand_scores = keep.iter().map(|&i| cand_scores[i]).collect();
        candidates = keep.iter().map(|&i| candidates[i]).collect();
        if candidates.len() == 1 {
            break;
        }

        // rescore over only the markers separating the remaining candidates
        let rows: Vec<(usize, usize)> = markers
            .union_for(&candidates)
            .iter()
            .filter_map(|&g| gene_rows.get(g).copied())
            .collect();
        if rows.len() < 2 {
            break;
        }
        cand_scores = candidates
            .iter()
            .map(|&l| restricted_spearman(&col, &reference.profile(l), &rows))
            .collect();
    }

    // argmax with first-wins keeps the earliest label in definition order on
    // ties (candidates stay sorted by construction)
    let winner = candidates[argmax(&cand_scores)];

    let best_initial = max_score(&scores);
    let threshold = settings.prune_threshold.or_else(|| tukey_lower_fence(&scores));
    let pruned = threshold.map_or(false, |t| best_initial < t);

    LabelAssignment {
        barcode: query.barcodes[barcode].clone(),
        label: reference.labels[winner].clone(),
        scores,
        pruned,
    }
}

/// Spearman correlation of a query column and a reference profile over the
/// paired row indices in `rows`.
fn restricted_spearman(query: &ArrayView1<'_, f64>, profile: &ArrayView1<'_, f64>, rows: &[(usize, usize)]) -> f64 {
    let x: Vec<f64> = rows.iter().map(|&(q, _)| query[q]).collect();
    let y: Vec<f64> = rows.iter().map(|&(_, r)| profile[r]).collect();
    spearman(&x, &y)
}

fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate() {
        if s > scores[best] {
            best = i;
        }
    }
    best
}

fn max_score(scores: &[f64]) -> f64 {
    scores.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::Array2;

    /// 3-label reference over 9 genes: one-hot-like profiles with 3 markers
    /// per label.
    fn toy_reference() -> ReferenceProfileSet {
        let genes: Vec<String> = (0..9).map(|i| format!("g{i}")).collect();
        let labels = vec!["alpha".to_string(), "beta".to_string(), "delta".to_string()];
        let mut profiles = Array2::zeros((9, 3));
        for l in 0..3 {
            for g in 0..3 {
                profiles[(3 * l + g, l)] = 1.0;
            }
        }
        ReferenceProfileSet::new(genes, labels, profiles).unwrap()
    }

    fn toy_markers(reference: &ReferenceProfileSet) -> PairwiseMarkers {
        // the markers separating a pair are the 6 genes specific to either
        let genes = |idx: &[usize]| -> Vec<String> { idx.iter().map(|i| format!("g{i}")).collect() };
        let mut markers = PairwiseMarkers::new(reference.labels.clone());
        markers.insert("alpha", "beta", genes(&[0, 1, 2, 3, 4, 5])).unwrap();
        markers.insert("alpha", "delta", genes(&[0, 1, 2, 6, 7, 8])).unwrap();
        markers.insert("beta", "delta", genes(&[3, 4, 5, 6, 7, 8])).unwrap();
        markers
    }

    /// Six query barcodes, each an exact copy of one reference profile.
    fn toy_query(reference: &ReferenceProfileSet) -> ExpressionMatrix {
        let origins = [0usize, 1, 2, 2, 0, 1];
        let mut m = Array2::zeros((9, origins.len()));
        for (j, &l) in origins.iter().enumerate() {
            for i in 0..9 {
                m[(i, j)] = reference.profiles[(i, l)];
            }
        }
        ExpressionMatrix::new(
            reference.feature_ids.clone(),
            (0..origins.len()).map(|j| format!("bc{j}")).collect(),
            m,
        )
        .unwrap()
    }

    #[test]
    fn test_exact_profile_recovery() {
        let reference = toy_reference();
        let markers = toy_markers(&reference);
        let query = toy_query(&reference);

        let assignments = classify(&query, &reference, &markers, &ClassifySettings::default()).unwrap();
        assert_eq!(assignments.len(), 6);

        let expected = ["alpha", "beta", "delta", "delta", "alpha", "beta"];
        for (a, &want) in assignments.iter().zip(expected.iter()) {
            assert_eq!(a.label, want, "barcode {}", a.barcode);
            assert_eq!(a.scores.len(), 3);
            // a query identical to its reference profile correlates at 1.0
            let own = reference.label_index(want).unwrap();
            assert_approx_eq!(a.scores[own], 1.0, 1e-12);
            assert!(!a.pruned);
        }
    }

    #[test]
    fn test_tie_breaks_to_definition_order() {
        let genes: Vec<String> = (0..4).map(|i| format!("g{i}")).collect();
        // two identical profiles: any query ties, and the first label wins
        let profiles = ndarray::array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [0.0, 0.0]];
        let reference = ReferenceProfileSet::new(genes.clone(), vec!["first".into(), "second".into()], profiles).unwrap();
        let mut markers = PairwiseMarkers::new(reference.labels.clone());
        markers.insert("first", "second", genes.clone()).unwrap();

        let query = ExpressionMatrix::new(
            genes,
            vec!["bc0".into()],
            ndarray::array![[1.0], [2.0], [3.0], [0.5]],
        )
        .unwrap();

        let assignments = classify(&query, &reference, &markers, &ClassifySettings::default()).unwrap();
        assert_eq!(assignments[0].label, "first");
        assert_eq!(assignments[0].scores[0], assignments[0].scores[1]);
    }

    #[test]
    fn test_fine_tune_terminates_under_wide_margin() {
        // margin 2.0 keeps every candidate: the loop must hit its fixed
        // point immediately rather than spin to the iteration cap
        let reference = toy_reference();
        let markers = toy_markers(&reference);
        let query = toy_query(&reference);
        let settings = ClassifySettings {
            fine_tune_margin: 2.0,
            ..Default::default()
        };

        let assignments = classify(&query, &reference, &markers, &settings).unwrap();
        assert_eq!(assignments[0].label, "alpha");
    }

    #[test]
    fn test_fine_tune_zero_margin_narrows_to_best() {
        let reference = toy_reference();
        let markers = toy_markers(&reference);
        let query = toy_query(&reference);
        let settings = ClassifySettings {
            fine_tune_margin: 0.0,
            ..Default::default()
        };

        let assignments = classify(&query, &reference, &markers, &settings).unwrap();
        let expected = ["alpha", "beta", "delta", "delta", "alpha", "beta"];
        for (a, &want) in assignments.iter().zip(expected.iter()) {
            assert_eq!(a.label, want);
        }
    }

    #[test]
    fn test_absolute_prune_threshold() {
        let reference = toy_reference();
        let markers = toy_markers(&reference);
        let query = toy_query(&reference);
        // every score is <= 1.0, so this threshold prunes everything
        let settings = ClassifySettings {
            prune_threshold: Some(1.5),
            ..Default::default()
        };

        let assignments = classify(&query, &reference, &markers, &settings).unwrap();
        assert!(assignments.iter().all(|a| a.pruned));
    }

    #[test]
    fn test_empty_marker_set() {
        let reference = toy_reference();
        let mut markers = PairwiseMarkers::new(reference.labels.clone());
        markers.insert("alpha", "beta", (0..6).map(|i| format!("g{i}"))).unwrap();
        // (alpha, delta) and (beta, delta) undefined
        let query = toy_query(&reference);

        match classify(&query, &reference, &markers, &ClassifySettings::default()) {
            Err(ClassifyError::EmptyMarkerSet { first, second }) => {
                assert_eq!((first.as_str(), second.as_str()), ("alpha", "delta"));
            }
            other => panic!("expected EmptyMarkerSet, got {other:?}"),
        }
    }

    #[test]
    fn test_no_gene_overlap() {
        let reference = toy_reference();
        let markers = toy_markers(&reference);
        // same shape, disjoint gene universe
        let query = ExpressionMatrix::new(
            (0..9).map(|i| format!("x{i}")).collect(),
            vec!["bc0".into()],
            Array2::ones((9, 1)),
        )
        .unwrap();

        assert!(matches!(
            classify(&query, &reference, &markers, &ClassifySettings::default()),
            Err(ClassifyError::NoGeneOverlap { shared: 0, .. })
        ));
    }

    #[test]
    fn test_unknown_label_and_mismatch() {
        let reference = toy_reference();
        let mut markers = PairwiseMarkers::new(reference.labels.clone());
        assert!(matches!(
            markers.insert("alpha", "gamma", vec!["g0".to_string()]),
            Err(ClassifyError::UnknownLabel { .. })
        ));

        let other = PairwiseMarkers::new(vec!["a".into(), "b".into()]);
        let query = toy_query(&reference);
        assert!(matches!(
            classify(&query, &reference, &other, &ClassifySettings::default()),
            Err(ClassifyError::LabelMismatch)
        ));
    }
}
