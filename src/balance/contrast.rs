//! Two-group log-contrast of taxa.

use crate::error::{CodaError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Disjoint numerator (B1) and denominator (B2) taxon sets over a fixed
/// taxon list.
///
/// The balance of a composition x is
/// `sqrt(r·s / (r + s)) · ln(gm(x_B1) / gm(x_B2))` with r = |B1|, s = |B2|.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    numerator: Vec<usize>,
    denominator: Vec<usize>,
    taxon_ids: Vec<String>,
}

impl Balance {
    /// Indices refer to `taxon_ids`; both sets are stored sorted.
    pub fn new(
        mut numerator: Vec<usize>,
        mut denominator: Vec<usize>,
        taxon_ids: Vec<String>,
    ) -> Result<Self> {
        if numerator.is_empty() || denominator.is_empty() {
            return Err(CodaError::InvalidParameter(
                "balance needs at least one numerator and one denominator taxon".to_string(),
            ));
        }
        numerator.sort_unstable();
        numerator.dedup();
        denominator.sort_unstable();
        denominator.dedup();

        let n = taxon_ids.len();
        if let Some(&bad) = numerator.iter().chain(&denominator).find(|&&t| t >= n) {
            return Err(CodaError::InvalidParameter(format!(
                "taxon index {} out of range for {} taxa",
                bad, n
            )));
        }
        if let Some(&shared) = numerator.iter().find(|&&t| denominator.binary_search(&t).is_ok()) {
            return Err(CodaError::InvalidParameter(format!(
                "taxon '{}' is in both balance sets",
                taxon_ids[shared]
            )));
        }

        Ok(Self {
            numerator,
            denominator,
            taxon_ids,
        })
    }

    /// Build from taxon identifiers.
    pub fn from_ids(numerator: &[&str], denominator: &[&str], taxon_ids: Vec<String>) -> Result<Self> {
        let lookup = |ids: &[&str]| -> Result<Vec<usize>> {
            ids.iter()
                .map(|id| {
                    taxon_ids.iter().position(|t| t == id).ok_or_else(|| {
                        CodaError::InvalidParameter(format!("unknown taxon '{}'", id))
                    })
                })
                .collect()
        };
        let num = lookup(numerator)?;
        let den = lookup(denominator)?;
        Self::new(num, den, taxon_ids)
    }

    pub fn numerator(&self) -> &[usize] {
        &self.numerator
    }

    pub fn denominator(&self) -> &[usize] {
        &self.denominator
    }

    pub fn numerator_ids(&self) -> Vec<String> {
        self.numerator.iter().map(|&t| self.taxon_ids[t].clone()).collect()
    }

    pub fn denominator_ids(&self) -> Vec<String> {
        self.denominator.iter().map(|&t| self.taxon_ids[t].clone()).collect()
    }

    pub fn taxon_ids(&self) -> &[String] {
        &self.taxon_ids
    }

    pub fn n_taxa(&self) -> usize {
        self.taxon_ids.len()
    }

    /// Taxa in either set.
    pub fn size(&self) -> usize {
        self.numerator.len() + self.denominator.len()
    }

    /// +1 for B1, -1 for B2, 0 otherwise, one entry per taxon.
    pub fn partition(&self) -> Vec<i8> {
        let mut signs = vec![0i8; self.n_taxa()];
        for &t in &self.numerator {
            signs[t] = 1;
        }
        for &t in &self.denominator {
            signs[t] = -1;
        }
        signs
    }

    /// sqrt(r·s / (r + s)).
    pub fn normalizing_constant(&self) -> f64 {
        contrast_constant(self.numerator.len(), self.denominator.len())
    }

    /// Balance of one sample given its log-abundances (natural log).
    pub fn value_from_logs(&self, log_sample: &[f64]) -> f64 {
        let r = self.numerator.len() as f64;
        let s = self.denominator.len() as f64;
        let num: f64 = self.numerator.iter().map(|&t| log_sample[t]).sum::<f64>() / r;
        let den: f64 = self.denominator.iter().map(|&t| log_sample[t]).sum::<f64>() / s;
        self.normalizing_constant() * (num - den)
    }

    /// Balance of one strictly positive sample.
    pub fn value(&self, sample: &[f64]) -> f64 {
        let logs: Vec<f64> = sample.iter().map(|v| v.ln()).collect();
        self.value_from_logs(&logs)
    }

    /// Same sets with numerator and denominator swapped.
    pub fn flipped(&self) -> Self {
        Self {
            numerator: self.denominator.clone(),
            denominator: self.numerator.clone(),
            taxon_ids: self.taxon_ids.clone(),
        }
    }

    /// Unit CLR-space direction whose inner product with a CLR vector is the
    /// balance value.
    pub fn direction(&self) -> DVector<f64> {
        let mut v = DVector::zeros(self.n_taxa());
        let c = self.normalizing_constant();
        let r = self.numerator.len() as f64;
        let s = self.denominator.len() as f64;
        for &t in &self.numerator {
            v[t] = c / r;
        }
        for &t in &self.denominator {
            v[t] = -c / s;
        }
        v
    }

    /// Orthonormal basis (taxa × axes) of the subspace spanned by contrasts
    /// among the balance taxa.
    ///
    /// Column 0 is `direction()`. The remaining columns are sequential
    /// sub-balances within B1 then within B2: for a set `[g1..gm]`, axis k
    /// contrasts `{g_k}` against `{g_k+1..g_m}`.
    pub fn basis(&self) -> DMatrix<f64> {
        let n_axes = self.size() - 1;
        let mut basis = DMatrix::zeros(self.n_taxa(), n_axes);
        basis.set_column(0, &self.direction());

        let mut axis = 1;
        for group in [&self.numerator, &self.denominator] {
            for k in 0..group.len().saturating_sub(1) {
                let rest = &group[k + 1..];
                let c = contrast_constant(1, rest.len());
                basis[(group[k], axis)] = c;
                for &t in rest {
                    basis[(t, axis)] = -c / rest.len() as f64;
                }
                axis += 1;
            }
        }
        basis
    }

    /// Names of the basis columns.
    pub fn basis_labels(&self) -> Vec<String> {
        let mut labels = vec!["balance".to_string()];
        for (prefix, group) in [("numerator", &self.numerator), ("denominator", &self.denominator)] {
            for &t in group.iter().take(group.len().saturating_sub(1)) {
                labels.push(format!("{}:{}", prefix, self.taxon_ids[t]));
            }
        }
        labels
    }
}

impl std::fmt::Display for Balance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] / [{}]",
            self.numerator_ids().join(", "),
            self.denominator_ids().join(", ")
        )
    }
}

pub(crate) fn contrast_constant(r: usize, s: usize) -> f64 {
    let (r, s) = (r as f64, s as f64);
    (r * s / (r + s)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t{}", i)).collect()
    }

    #[test]
    fn test_single_pair_value() {
        let b = Balance::new(vec![0], vec![2], ids(3)).unwrap();
        let x = [0.6, 0.3, 0.1];
        assert_relative_eq!(b.value(&x), (0.5_f64).sqrt() * (0.6_f64 / 0.1).ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_geometric_mean_value() {
        let b = Balance::new(vec![0, 1], vec![2], ids(4)).unwrap();
        let x = [0.2, 0.4, 0.1, 0.3];
        let gm1 = (0.2_f64 * 0.4).sqrt();
        let expected = (2.0_f64 / 3.0).sqrt() * (gm1 / 0.1).ln();
        assert_relative_eq!(b.value(&x), expected, epsilon = 1e-12);
        // scale invariant
        let scaled: Vec<f64> = x.iter().map(|v| v * 7.0).collect();
        assert_relative_eq!(b.value(&scaled), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_partition_and_validation() {
        let b = Balance::from_ids(&["t3", "t1"], &["t0"], ids(5)).unwrap();
        assert_eq!(b.partition(), vec![-1, 1, 0, 1, 0]);
        assert_eq!(b.numerator(), &[1, 3]);
        assert_eq!(b.to_string(), "[t1, t3] / [t0]");

        assert!(Balance::new(vec![], vec![1], ids(3)).is_err());
        assert!(Balance::new(vec![0, 1], vec![1], ids(3)).is_err());
        assert!(Balance::new(vec![0], vec![5], ids(3)).is_err());
        assert!(Balance::from_ids(&["zz"], &["t0"], ids(3)).is_err());
    }

    #[test]
    fn test_direction_matches_value() {
        let b = Balance::new(vec![0, 3], vec![1, 2, 4], ids(6)).unwrap();
        let x: [f64; 6] = [0.1, 0.2, 0.05, 0.3, 0.15, 0.2];
        let logs: Vec<f64> = x.iter().map(|v| v.ln()).collect();
        let mean = logs.iter().sum::<f64>() / logs.len() as f64;
        let clr = DVector::from_iterator(6, logs.iter().map(|l| l - mean));
        assert_relative_eq!(b.direction().dot(&clr), b.value(&x), epsilon = 1e-12);
        assert_relative_eq!(b.direction().norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_basis_orthonormal() {
        let b = Balance::new(vec![0, 2, 5], vec![1, 4], ids(7)).unwrap();
        let basis = b.basis();
        assert_eq!(basis.ncols(), 4);
        assert_eq!(b.basis_labels().len(), 4);
        let gram = basis.transpose() * &basis;
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(gram[(i, j)], expected, epsilon = 1e-12);
            }
            // contrasts: each column sums to zero
            assert!(basis.column(i).sum().abs() < 1e-12);
        }
        // taxa outside the balance carry no weight
        assert!(basis.row(3).iter().all(|&v| v == 0.0));
        assert!(basis.row(6).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_flipped_negates() {
        let b = Balance::new(vec![0], vec![1, 2], ids(3)).unwrap();
        let x: [f64; 3] = [0.5, 0.2, 0.3];
        assert_relative_eq!(b.flipped().value(&x), -b.value(&x), epsilon = 1e-12);
    }
}
