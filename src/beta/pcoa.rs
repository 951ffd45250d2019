//! Principal Coordinates Analysis (PCoA) of a distance matrix.
//!
//! # Algorithm
//!
//! 1. Gower double-centre the squared distances: G = -1/2 J D² J
//! 2. Symmetric eigendecomposition of G
//! 3. Treat eigenvalues at or below `1e-10 × max|λ|` as non-positive
//! 4. Keep positive axes in descending order, coordinates = eigenvector × √λ
//! 5. Variance explained = λ / Σ positive λ × 100
//!
//! Negative eigenvalues (non-Euclidean distances) are reported but never
//! enter the variance denominator.

use super::distance::DistanceMatrix;
use crate::error::{CodaError, Result};
use log::{debug, warn};
use nalgebra::SymmetricEigen;
use serde::{Deserialize, Serialize};

/// Relative size below which an eigenvalue counts as zero.
pub const EIGENVALUE_TOLERANCE: f64 = 1e-10;

/// PCoA ordination result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ordination {
    pub sample_ids: Vec<String>,
    /// Coordinates `[n_samples][n_axes]`.
    pub coordinates: Vec<Vec<f64>>,
    /// Eigenvalues of the retained axes, descending.
    pub eigenvalues: Vec<f64>,
    /// Percentage of variance per retained axis.
    pub variance_explained: Vec<f64>,
    /// Eigenvalues below the tolerance (zero or negative), descending.
    pub discarded_eigenvalues: Vec<f64>,
}

impl Ordination {
    pub fn n_axes(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Coordinates of one sample.
    pub fn sample(&self, sample_id: &str) -> Option<&[f64]> {
        self.sample_ids
            .iter()
            .position(|s| s == sample_id)
            .map(|i| self.coordinates[i].as_slice())
    }
}

/// Run PCoA on a distance matrix, keeping every positive axis.
///
/// Each axis is sign-normalised so its largest absolute coordinate is
/// positive, which makes output reproducible across eigen-solvers.
///
/// # Errors
/// `SingularDistanceMatrix` if no eigenvalue is positive (e.g. all samples
/// identical or fewer than two samples).
pub fn pcoa(distance: &DistanceMatrix) -> Result<Ordination> {
    let n = distance.n_samples();
    if n < 2 {
        return Err(CodaError::SingularDistanceMatrix { n_samples: n });
    }

    let centered = distance.gower_centered();
    let eigen = SymmetricEigen::new(centered);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let max_abs = eigen.eigenvalues.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let cutoff = EIGENVALUE_TOLERANCE * max_abs;
    let (kept, discarded): (Vec<usize>, Vec<usize>) =
        order.into_iter().partition(|&i| max_abs > 0.0 && eigen.eigenvalues[i] > cutoff);

    if kept.is_empty() {
        return Err(CodaError::SingularDistanceMatrix { n_samples: n });
    }

    let positive_sum: f64 = kept.iter().map(|&i| eigen.eigenvalues[i]).sum();
    let eigenvalues: Vec<f64> = kept.iter().map(|&i| eigen.eigenvalues[i]).collect();
    let variance_explained: Vec<f64> = eigenvalues.iter().map(|l| l / positive_sum * 100.0).collect();
    let discarded_eigenvalues: Vec<f64> = discarded.iter().map(|&i| eigen.eigenvalues[i]).collect();

    let significant_negative = discarded_eigenvalues.iter().filter(|&&l| l < -cutoff).count();
    if significant_negative > 0 {
        warn!(
            "PCoA: {} negative eigenvalue(s) discarded; distances are not Euclidean",
            significant_negative
        );
    }

    let mut coordinates = vec![vec![0.0; kept.len()]; n];
    for (axis, &col) in kept.iter().enumerate() {
        let vector = eigen.eigenvectors.column(col);
        let pivot = vector
            .iter()
            .copied()
            .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
        let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
        let scale = sign * eigenvalues[axis].sqrt();
        for sample in 0..n {
            coordinates[sample][axis] = vector[sample] * scale;
        }
    }
    debug!(
        "PCoA kept {} axes, leading variance explained {:?}",
        kept.len(),
        variance_explained.iter().take(3).collect::<Vec<_>>()
    );

    Ok(Ordination {
        sample_ids: distance.sample_ids().to_vec(),
        coordinates,
        eigenvalues,
        variance_explained,
        discarded_eigenvalues,
    })
}
