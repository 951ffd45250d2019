//! Removal of samples and taxa with no reads.

use crate::data::CountMatrix;
use crate::error::{CodaError, Result};
use log::{debug, warn};

/// Drop samples whose total is zero, then taxa whose total is zero.
///
/// # Errors
/// `EmptyData` if no sample or no taxon has any reads.
pub fn filter_empty(counts: &CountMatrix) -> Result<CountMatrix> {
    let sample_totals = counts.sample_totals();
    let keep_samples: Vec<usize> = sample_totals
        .iter()
        .enumerate()
        .filter(|&(_, &t)| t > 0)
        .map(|(i, _)| i)
        .collect();
    if keep_samples.is_empty() {
        return Err(CodaError::EmptyData("every sample has zero reads".to_string()));
    }
    if keep_samples.len() < counts.n_samples() {
        let dropped: Vec<&str> = sample_totals
            .iter()
            .zip(counts.sample_ids())
            .filter(|&(&t, _)| t == 0)
            .map(|(_, id)| id.as_str())
            .collect();
        warn!("dropping {} empty sample(s): {:?}", dropped.len(), dropped);
    }
    let by_sample = counts.subset_samples(&keep_samples)?;

    let keep_taxa: Vec<usize> = by_sample
        .taxon_totals()
        .iter()
        .enumerate()
        .filter(|&(_, &t)| t > 0)
        .map(|(i, _)| i)
        .collect();
    if keep_taxa.is_empty() {
        return Err(CodaError::EmptyData("every taxon has zero reads".to_string()));
    }
    debug!(
        "empty filter kept {} of {} samples and {} of {} taxa",
        keep_samples.len(),
        counts.n_samples(),
        keep_taxa.len(),
        counts.n_taxa()
    );
    by_sample.subset_taxa(&keep_taxa)
}
