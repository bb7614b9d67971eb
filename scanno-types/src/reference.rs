use crate::matrix::check_unique;
use anyhow::{format_err, Error};
use ndarray::{Array2, ArrayView1, Axis};

/// Labeled reference profiles over a gene universe. One column per label;
/// label definition order is significant and is the tie-break order used by
/// the classifier.
#[derive(Clone, Debug)]
pub struct ReferenceProfileSet {
    pub feature_ids: Vec<String>,
    pub labels: Vec<String>,
    pub profiles: Array2<f64>,
}

impl ReferenceProfileSet {
    pub fn new(feature_ids: Vec<String>, labels: Vec<String>, profiles: Array2<f64>) -> Result<ReferenceProfileSet, Error> {
        if feature_ids.len() != profiles.nrows() {
            return Err(format_err!(
                "feature label count {} does not match profile rows {}",
                feature_ids.len(),
                profiles.nrows()
            ));
        }
        if labels.len() != profiles.ncols() {
            return Err(format_err!(
                "label count {} does not match profile columns {}",
                labels.len(),
                profiles.ncols()
            ));
        }
        if labels.is_empty() {
            return Err(format_err!("reference must define at least one label"));
        }
        check_unique(&feature_ids, "feature id")?;
        check_unique(&labels, "label")?;
        Ok(ReferenceProfileSet {
            feature_ids,
            labels,
            profiles,
        })
    }

    pub fn n_labels(&self) -> usize {
        self.labels.len()
    }

    /// Profile vector for label column `j`.
    pub fn profile(&self, j: usize) -> ArrayView1<'_, f64> {
        self.profiles.index_axis(Axis(1), j)
    }

    /// Index of a label in definition order.
    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }
}
