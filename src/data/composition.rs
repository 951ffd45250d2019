//! Strictly positive compositions, closed to 1 per sample.

use crate::error::{CodaError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Relative abundances of taxa (rows) in samples (columns).
///
/// Every entry is strictly positive and each column sums to 1. The sample
/// totals the composition was derived from are kept so the values can be put
/// back on the original count scale with [`CompositionMatrix::rescaled`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionMatrix {
    #[serde(skip)]
    data: DMatrix<f64>,
    taxon_ids: Vec<String>,
    sample_ids: Vec<String>,
    totals: Vec<f64>,
}

impl CompositionMatrix {
    /// Close positive values per sample.
    ///
    /// Fails with `UndefinedLogRatio` on any zero, negative or non-finite
    /// entry: compositions feed log-ratios, so zeros must be replaced first.
    pub fn from_positive(
        values: DMatrix<f64>,
        taxon_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (n_taxa, n_samples) = values.shape();
        if n_taxa != taxon_ids.len() {
            return Err(CodaError::DimensionMismatch {
                expected: n_taxa,
                actual: taxon_ids.len(),
            });
        }
        if n_samples != sample_ids.len() {
            return Err(CodaError::DimensionMismatch {
                expected: n_samples,
                actual: sample_ids.len(),
            });
        }
        if n_taxa == 0 || n_samples == 0 {
            return Err(CodaError::EmptyData("composition has no entries".to_string()));
        }
        check_positive(&values, &taxon_ids, &sample_ids)?;

        let totals: Vec<f64> = values.column_iter().map(|c| c.sum()).collect();
        let mut data = values;
        for (j, mut col) in data.column_iter_mut().enumerate() {
            col /= totals[j];
        }

        Ok(Self {
            data,
            taxon_ids,
            sample_ids,
            totals,
        })
    }

    /// Build from already-closed proportions and the totals they came from.
    pub(crate) fn from_parts(
        data: DMatrix<f64>,
        taxon_ids: Vec<String>,
        sample_ids: Vec<String>,
        totals: Vec<f64>,
    ) -> Result<Self> {
        check_positive(&data, &taxon_ids, &sample_ids)?;
        Ok(Self {
            data,
            taxon_ids,
            sample_ids,
            totals,
        })
    }

    /// Proportion of a taxon in a sample.
    #[inline]
    pub fn get(&self, taxon: usize, sample: usize) -> f64 {
        self.data[(taxon, sample)]
    }

    pub fn n_taxa(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    pub fn taxon_ids(&self) -> &[String] {
        &self.taxon_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Totals of the samples before closure.
    pub fn totals(&self) -> &[f64] {
        &self.totals
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Proportions of one sample.
    pub fn sample(&self, sample: usize) -> Vec<f64> {
        self.data.column(sample).iter().copied().collect()
    }

    /// Values scaled back so each sample sums to its original total.
    pub fn rescaled(&self) -> DMatrix<f64> {
        let mut out = self.data.clone();
        for (j, mut col) in out.column_iter_mut().enumerate() {
            col *= self.totals[j];
        }
        out
    }

    /// Natural logs of all proportions (taxa × samples).
    pub fn log_values(&self) -> DMatrix<f64> {
        self.data.map(f64::ln)
    }
}

fn check_positive(values: &DMatrix<f64>, taxon_ids: &[String], sample_ids: &[String]) -> Result<()> {
    for j in 0..values.ncols() {
        for i in 0..values.nrows() {
            let v = values[(i, j)];
            if !(v > 0.0 && v.is_finite()) {
                return Err(CodaError::UndefinedLogRatio(format!(
                    "value {} for taxon '{}' in sample '{}'; replace zeros first",
                    v, taxon_ids[i], sample_ids[j]
                )));
            }
        }
    }
    Ok(())
}
