use anyhow::{format_err, Error};
use ndarray::{Array2, ArrayView1, Axis};
use std::collections::HashMap;

/// A dense expression matrix with row/column labels.
/// Rows are features (genes), columns are barcodes (cells).
#[derive(Clone, Debug)]
pub struct ExpressionMatrix {
    pub feature_ids: Vec<String>,
    pub barcodes: Vec<String>,
    pub matrix: Array2<f64>,
}

impl ExpressionMatrix {
    /// Build an `ExpressionMatrix`, checking that the label vectors match the
    /// matrix dimensions and that labels are unique within each axis.
    pub fn new(feature_ids: Vec<String>, barcodes: Vec<String>, matrix: Array2<f64>) -> Result<ExpressionMatrix, Error> {
        if feature_ids.len() != matrix.nrows() {
            return Err(format_err!(
                "feature label count {} does not match matrix rows {}",
                feature_ids.len(),
                matrix.nrows()
            ));
        }
        if barcodes.len() != matrix.ncols() {
            return Err(format_err!(
                "barcode count {} does not match matrix columns {}",
                barcodes.len(),
                matrix.ncols()
            ));
        }
        check_unique(&feature_ids, "feature id")?;
        check_unique(&barcodes, "barcode")?;
        Ok(ExpressionMatrix {
            feature_ids,
            barcodes,
            matrix,
        })
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.matrix.nrows(), self.matrix.ncols()]
    }

    /// Map from feature id to row index.
    pub fn feature_index(&self) -> HashMap<&str, usize> {
        self.feature_ids
            .iter()
            .enumerate()
            .map(|(i, f)| (f.as_str(), i))
            .collect()
    }

    /// Expression vector of a single barcode (one column).
    pub fn barcode_column(&self, j: usize) -> ArrayView1<'_, f64> {
        self.matrix.index_axis(Axis(1), j)
    }
}

pub(crate) fn check_unique(labels: &[String], what: &str) -> Result<(), Error> {
    let mut seen = HashMap::with_capacity(labels.len());
    for (i, l) in labels.iter().enumerate() {
        if let Some(prev) = seen.insert(l.as_str(), i) {
            return Err(format_err!("duplicate {what} {l:?} at positions {prev} and {i}"));
        }
    }
    Ok(())
}
