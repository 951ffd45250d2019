//! Pseudocount addition for zero handling.

use crate::data::{CompositionMatrix, CountMatrix};
use crate::error::{CodaError, Result};

/// Add a pseudocount to every cell and close each sample.
///
/// Unlike multiplicative replacement this also perturbs the ratios between
/// observed taxa; it is kept for comparison with count-based pipelines. The
/// recorded totals are the original sample totals.
///
/// # Common choices
/// - 0.5: Often used as a compromise
/// - 1.0: Laplace smoothing
/// - [`adaptive_pseudocount`]: half the smallest non-zero count
pub fn add_pseudocount(counts: &CountMatrix, pseudocount: f64) -> Result<CompositionMatrix> {
    if !(pseudocount > 0.0 && pseudocount.is_finite()) {
        return Err(CodaError::InvalidParameter(
            "Pseudocount must be positive".to_string(),
        ));
    }

    let totals: Vec<f64> = counts.sample_totals().iter().map(|&t| t as f64).collect();
    let shifted = counts.to_dense().add_scalar(pseudocount);
    let closed = CompositionMatrix::from_positive(
        shifted,
        counts.taxon_ids().to_vec(),
        counts.sample_ids().to_vec(),
    )?;
    CompositionMatrix::from_parts(
        closed.matrix().clone(),
        counts.taxon_ids().to_vec(),
        counts.sample_ids().to_vec(),
        totals,
    )
}

/// Half the smallest non-zero count in the table (0.5 if the table is empty).
pub fn adaptive_pseudocount(counts: &CountMatrix) -> f64 {
    let min_nonzero = counts
        .data()
        .iter()
        .map(|(&val, _)| val)
        .filter(|&val| val > 0)
        .min();

    match min_nonzero {
        Some(v) => v as f64 / 2.0,
        None => 0.5,
    }
}
