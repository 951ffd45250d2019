//! Design matrix for regressing balance coordinates on a categorical outcome.

use crate::data::Grouping;
use crate::error::{CodaError, Result};
use nalgebra::DMatrix;

/// A design matrix for linear modeling (samples × coefficients).
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    matrix: DMatrix<f64>,
    coefficient_names: Vec<String>,
    sample_ids: Vec<String>,
    levels: Vec<String>,
}

impl DesignMatrix {
    /// Treatment coding: an intercept plus one indicator per non-reference
    /// level, named `{outcome}{level}`.
    pub fn from_grouping(grouping: &Grouping, outcome: &str) -> Result<Self> {
        let n_samples = grouping.n_samples();
        let levels = grouping.levels();
        if levels.len() < 2 {
            return Err(CodaError::InvalidVariableType {
                column: outcome.to_string(),
                reason: format!("need at least 2 outcome levels, found {}", levels.len()),
            });
        }

        let mut coefficient_names = vec!["(Intercept)".to_string()];
        let mut matrix = DMatrix::zeros(n_samples, levels.len());
        for row in 0..n_samples {
            matrix[(row, 0)] = 1.0;
        }
        for (level_idx, level) in levels.iter().enumerate().skip(1) {
            coefficient_names.push(format!("{}{}", outcome, level));
            for (row, &label) in grouping.labels().iter().enumerate() {
                if label == level_idx {
                    matrix[(row, level_idx)] = 1.0;
                }
            }
        }

        Ok(Self {
            matrix,
            coefficient_names,
            sample_ids: grouping.sample_ids().to_vec(),
            levels: levels.to_vec(),
        })
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn coefficient_names(&self) -> &[String] {
        &self.coefficient_names
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_coefficients(&self) -> usize {
        self.matrix.ncols()
    }

    /// The level absorbed into the intercept.
    pub fn reference_level(&self) -> &str {
        &self.levels[0]
    }

    /// Outcome levels; column `i` (for `i >= 1`) is the indicator of `levels()[i]`.
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn coefficient_index(&self, name: &str) -> Option<usize> {
        self.coefficient_names.iter().position(|n| n == name)
    }
}
