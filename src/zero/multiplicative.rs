//! Multiplicative simple replacement of compositional zeros.
//!
//! Each taxon gets a detection limit equal to the smallest positive
//! proportion it reaches in any sample. A zero cell is imputed as
//! `fraction × detection limit`, and the observed proportions of that sample
//! are shrunk by one common factor so the sample still closes to 1. Ratios
//! between observed taxa are therefore untouched.

use crate::data::{CompositionMatrix, CountMatrix};
use crate::error::{CodaError, Result};
use log::debug;
use nalgebra::DMatrix;

/// Default fraction of the detection limit used as the substitute.
pub const DEFAULT_FRACTION: f64 = 0.65;

/// Replace zeros in a count table.
pub fn replace_zeros_multiplicative(counts: &CountMatrix, fraction: f64) -> Result<CompositionMatrix> {
    replace_zeros_multiplicative_dense(
        &counts.to_dense(),
        counts.taxon_ids().to_vec(),
        counts.sample_ids().to_vec(),
        fraction,
    )
}

/// Replace zeros in any non-negative taxa × samples table (counts or proportions).
///
/// # Errors
/// * `InvalidParameter` if `fraction` is outside (0, 1).
/// * `EmptyData` for a sample with zero total, `Numerical` for negative or
///   non-finite input.
/// * `UndefinedLogRatio` if a taxon has no positive value anywhere, or the
///   substitutes in one sample would use up the whole composition.
pub fn replace_zeros_multiplicative_dense(
    values: &DMatrix<f64>,
    taxon_ids: Vec<String>,
    sample_ids: Vec<String>,
    fraction: f64,
) -> Result<CompositionMatrix> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(CodaError::InvalidParameter(format!(
            "replacement fraction must lie in (0, 1), got {}",
            fraction
        )));
    }
    let (n_taxa, n_samples) = values.shape();
    if n_taxa != taxon_ids.len() || n_samples != sample_ids.len() {
        return Err(CodaError::DimensionMismatch {
            expected: n_taxa * n_samples,
            actual: taxon_ids.len() * sample_ids.len(),
        });
    }
    if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
        return Err(CodaError::Numerical(format!(
            "zero replacement requires finite non-negative values, found {}",
            bad
        )));
    }

    let totals: Vec<f64> = values.column_iter().map(|c| c.sum()).collect();
    if let Some(j) = totals.iter().position(|&t| t <= 0.0) {
        return Err(CodaError::EmptyData(format!(
            "sample '{}' has zero total; drop empty samples before zero replacement",
            sample_ids[j]
        )));
    }

    let mut proportions = values.clone();
    for (j, mut col) in proportions.column_iter_mut().enumerate() {
        col /= totals[j];
    }

    let mut substitutes = Vec::with_capacity(n_taxa);
    for i in 0..n_taxa {
        let detection_limit = proportions
            .row(i)
            .iter()
            .copied()
            .filter(|&p| p > 0.0)
            .fold(f64::INFINITY, f64::min);
        if !detection_limit.is_finite() {
            return Err(CodaError::UndefinedLogRatio(format!(
                "taxon '{}' is zero in every sample; no detection limit to impute from",
                taxon_ids[i]
            )));
        }
        substitutes.push(fraction * detection_limit);
    }

    let mut n_replaced = 0usize;
    for j in 0..n_samples {
        let imputed: f64 = (0..n_taxa)
            .filter(|&i| proportions[(i, j)] == 0.0)
            .map(|i| substitutes[i])
            .sum();
        if imputed >= 1.0 {
            return Err(CodaError::UndefinedLogRatio(format!(
                "substitutes for sample '{}' sum to {:.4}, leaving no mass for observed taxa",
                sample_ids[j], imputed
            )));
        }
        let shrink = 1.0 - imputed;
        for i in 0..n_taxa {
            let p = proportions[(i, j)];
            proportions[(i, j)] = if p == 0.0 {
                n_replaced += 1;
                substitutes[i]
            } else {
                p * shrink
            };
        }
    }
    debug!(
        "multiplicative replacement imputed {} of {} cells (fraction {})",
        n_replaced,
        n_taxa * n_samples,
        fraction
    );

    CompositionMatrix::from_parts(proportions, taxon_ids, sample_ids, totals)
}
