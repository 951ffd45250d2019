//! Centered Log-Ratio (CLR) transformation for compositional data.

use crate::data::CompositionMatrix;
use crate::error::{CodaError, Result};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// CLR coordinates of taxa (rows) in samples (columns).
///
/// Each sample sums to zero: the transform projects log-proportions onto the
/// sum-zero subspace, where Euclidean geometry is Aitchison geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClrMatrix {
    #[serde(skip)]
    pub data: DMatrix<f64>,
    pub taxon_ids: Vec<String>,
    pub sample_ids: Vec<String>,
    /// Geometric mean of each sample's input values.
    pub geometric_means: Vec<f64>,
}

impl ClrMatrix {
    pub fn get(&self, taxon: usize, sample: usize) -> f64 {
        self.data[(taxon, sample)]
    }

    pub fn n_taxa(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    /// CLR vector of one sample.
    pub fn sample(&self, sample: usize) -> Vec<f64> {
        self.data.column(sample).iter().copied().collect()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }
}

/// CLR of a composition; positivity is already guaranteed by the type.
pub fn clr(composition: &CompositionMatrix) -> Result<ClrMatrix> {
    norm_clr(
        composition.matrix(),
        composition.taxon_ids().to_vec(),
        composition.sample_ids().to_vec(),
    )
}

/// Apply CLR to any positive taxa × samples table.
///
/// For sample j: CLR(x_ij) = ln(x_ij) - mean_i(ln(x_ij)). The input need not
/// be closed; CLR is scale invariant.
///
/// # Errors
/// `UndefinedLogRatio` naming the first zero, negative or non-finite cell.
pub fn norm_clr(
    data: &DMatrix<f64>,
    taxon_ids: Vec<String>,
    sample_ids: Vec<String>,
) -> Result<ClrMatrix> {
    let (n_taxa, n_samples) = data.shape();

    if n_taxa == 0 || n_samples == 0 {
        return Err(CodaError::EmptyData(
            "Cannot apply CLR to empty matrix".to_string(),
        ));
    }
    if n_taxa != taxon_ids.len() || n_samples != sample_ids.len() {
        return Err(CodaError::DimensionMismatch {
            expected: n_taxa * n_samples,
            actual: taxon_ids.len() * sample_ids.len(),
        });
    }

    for j in 0..n_samples {
        for i in 0..n_taxa {
            let val = data[(i, j)];
            if !(val > 0.0 && val.is_finite()) {
                return Err(CodaError::UndefinedLogRatio(format!(
                    "CLR needs positive values; found {} for taxon '{}' in sample '{}'",
                    val, taxon_ids[i], sample_ids[j]
                )));
            }
        }
    }

    let log_data: DMatrix<f64> = data.map(f64::ln);

    let mean_logs: Vec<f64> = (0..n_samples)
        .into_par_iter()
        .map(|j| log_data.column(j).sum() / n_taxa as f64)
        .collect();

    let mut clr_data = log_data;
    for (j, mut col) in clr_data.column_iter_mut().enumerate() {
        col.add_scalar_mut(-mean_logs[j]);
    }

    Ok(ClrMatrix {
        data: clr_data,
        taxon_ids,
        sample_ids,
        geometric_means: mean_logs.iter().map(|m| m.exp()).collect(),
    })
}
