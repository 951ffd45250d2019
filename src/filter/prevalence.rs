//! Prevalence-based taxon filtering.

use crate::data::CountMatrix;
use crate::error::{CodaError, Result};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Keep taxa present (count > 0) in at least a fraction `threshold` of samples.
///
/// A taxon survives when it is observed in `ceil(threshold * n_samples)` or
/// more samples. Run [`super::filter_empty`] first so zero-total samples do
/// not dilute prevalence.
///
/// # Errors
/// `InvalidParameter` if `threshold` is outside (0, 1);
/// `InsufficientPrevalence` if no taxon passes.
pub fn filter_prevalence(counts: &CountMatrix, threshold: f64) -> Result<CountMatrix> {
    if !(threshold > 0.0 && threshold < 1.0) {
        return Err(CodaError::InvalidParameter(format!(
            "prevalence threshold must lie in (0, 1), got {}",
            threshold
        )));
    }

    let n_samples = counts.n_samples();
    let min_samples = (threshold * n_samples as f64).ceil() as usize;

    let keep_indices: Vec<usize> = (0..counts.n_taxa())
        .into_par_iter()
        .filter(|&taxon| counts.prevalence_count(taxon) >= min_samples)
        .collect();

    debug!(
        "prevalence {:.3}: {} of {} taxa seen in >= {} samples",
        threshold,
        keep_indices.len(),
        counts.n_taxa(),
        min_samples
    );

    if keep_indices.is_empty() {
        return Err(CodaError::InsufficientPrevalence {
            threshold,
            n_samples,
        });
    }

    counts.subset_taxa(&keep_indices)
}

/// Result of prevalence filtering with statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    pub n_before: usize,
    pub n_after: usize,
    pub n_removed: usize,
    /// Proportion of taxa retained.
    pub retention_rate: f64,
}

impl std::fmt::Display for FilterResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Filter Result")?;
        writeln!(f, "  Before:    {} taxa", self.n_before)?;
        writeln!(f, "  After:     {} taxa", self.n_after)?;
        writeln!(f, "  Removed:   {} taxa", self.n_removed)?;
        writeln!(f, "  Retained:  {:.1}%", self.retention_rate * 100.0)?;
        Ok(())
    }
}

/// Filter with statistics about what was filtered.
pub fn filter_prevalence_with_stats(
    counts: &CountMatrix,
    threshold: f64,
) -> Result<(CountMatrix, FilterResult)> {
    let n_before = counts.n_taxa();
    let filtered = filter_prevalence(counts, threshold)?;
    let n_after = filtered.n_taxa();

    let result = FilterResult {
        n_before,
        n_after,
        n_removed: n_before - n_after,
        retention_rate: n_after as f64 / n_before as f64,
    };

    Ok((filtered, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    fn create_test_matrix() -> CountMatrix {
        // 5 taxa × 8 samples
        let mut tri_mat = TriMat::new((5, 8));
        for col in 0..8 {
            tri_mat.add_triplet(0, col, 10);
        }
        for col in 0..6 {
            tri_mat.add_triplet(1, col, 20);
        }
        for col in 0..4 {
            tri_mat.add_triplet(2, col, 30);
        }
        for col in 0..2 {
            tri_mat.add_triplet(3, col, 40);
        }
        tri_mat.add_triplet(4, 0, 50);

        let taxon_ids: Vec<String> = (0..5).map(|i| format!("taxon_{}", i)).collect();
        let sample_ids: Vec<String> = (0..8).map(|i| format!("S{}", i)).collect();
        CountMatrix::new(tri_mat.to_csr(), taxon_ids, sample_ids).unwrap()
    }

    #[test]
    fn test_filter_prevalence() {
        let counts = create_test_matrix();

        let filtered = filter_prevalence(&counts, 0.5).unwrap();
        assert_eq!(filtered.taxon_ids(), &["taxon_0", "taxon_1", "taxon_2"]);

        let filtered = filter_prevalence(&counts, 0.75).unwrap();
        assert_eq!(filtered.taxon_ids(), &["taxon_0", "taxon_1"]);
    }

    #[test]
    fn test_small_table_keeps_everything() {
        let counts = CountMatrix::from_sample_rows(
            &[
                vec![10, 0, 5],
                vec![0, 8, 2],
                vec![5, 5, 5],
                vec![1, 1, 8],
            ],
            vec!["t1".into(), "t2".into(), "t3".into()],
            vec!["S1".into(), "S2".into(), "S3".into(), "S4".into()],
        )
        .unwrap();

        let filtered = filter_prevalence(&counts, 0.5).unwrap();
        assert_eq!(filtered, counts);
    }

    #[test]
    fn test_filter_with_stats() {
        let counts = create_test_matrix();
        let (filtered, stats) = filter_prevalence_with_stats(&counts, 0.5).unwrap();

        assert_eq!(filtered.n_taxa(), 3);
        assert_eq!(stats.n_before, 5);
        assert_eq!(stats.n_removed, 2);
        assert!((stats.retention_rate - 0.6).abs() < 1e-10);
    }

    #[test]
    fn test_nothing_survives() {
        let counts = CountMatrix::from_sample_rows(
            &[vec![1, 0], vec![0, 1], vec![0, 0], vec![0, 0]],
            vec!["a".into(), "b".into()],
            (0..4).map(|i| format!("S{}", i)).collect(),
        )
        .unwrap();
        let result = filter_prevalence(&counts, 0.5);
        assert!(matches!(result, Err(CodaError::InsufficientPrevalence { .. })));
    }

    #[test]
    fn test_invalid_threshold() {
        let counts = create_test_matrix();
        assert!(filter_prevalence(&counts, 0.0).is_err());
        assert!(filter_prevalence(&counts, 1.0).is_err());
        assert!(filter_prevalence(&counts, -0.1).is_err());
        assert!(filter_prevalence(&counts, f64::NAN).is_err());
    }
}
