//! Aitchison distance between samples.

use crate::error::{CodaError, Result};
use crate::normalize::ClrMatrix;
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Symmetric sample × sample distance matrix with a zero diagonal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceMatrix {
    sample_ids: Vec<String>,
    #[serde(skip)]
    data: DMatrix<f64>,
}

impl DistanceMatrix {
    /// Wrap an externally computed distance matrix after checking it is
    /// square, symmetric, non-negative and zero on the diagonal.
    pub fn from_matrix(data: DMatrix<f64>, sample_ids: Vec<String>) -> Result<Self> {
        let n = sample_ids.len();
        if data.nrows() != n || data.ncols() != n {
            return Err(CodaError::DimensionMismatch {
                expected: n,
                actual: data.nrows().max(data.ncols()),
            });
        }
        for i in 0..n {
            if data[(i, i)].abs() > 1e-12 {
                return Err(CodaError::Numerical(format!(
                    "distance of sample '{}' to itself is {}",
                    sample_ids[i],
                    data[(i, i)]
                )));
            }
            for j in (i + 1)..n {
                let (a, b) = (data[(i, j)], data[(j, i)]);
                if !(a >= 0.0 && a.is_finite()) || (a - b).abs() > 1e-9 * a.abs().max(1.0) {
                    return Err(CodaError::Numerical(format!(
                        "distances between '{}' and '{}' are not symmetric and non-negative ({}, {})",
                        sample_ids[i], sample_ids[j], a, b
                    )));
                }
            }
        }
        Ok(Self { sample_ids, data })
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[(i, j)]
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Gower's centred matrix G = -1/2 (I - 11'/n) D² (I - 11'/n).
    pub fn gower_centered(&self) -> DMatrix<f64> {
        let n = self.n_samples();
        let a = self.data.map(|d| -0.5 * d * d);
        let row_means: Vec<f64> = (0..n).map(|i| a.row(i).sum() / n as f64).collect();
        let grand_mean = row_means.iter().sum::<f64>() / n as f64;
        DMatrix::from_fn(n, n, |i, j| a[(i, j)] - row_means[i] - row_means[j] + grand_mean)
    }
}

/// Pairwise Euclidean distances between CLR sample vectors.
pub fn aitchison_distance(clr: &ClrMatrix) -> DistanceMatrix {
    let n = clr.n_samples();
    let columns: Vec<Vec<f64>> = (0..n).map(|j| clr.sample(j)).collect();

    let upper: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..n)
                .map(|j| euclidean(&columns[i], &columns[j]))
                .collect()
        })
        .collect();

    let mut data = DMatrix::zeros(n, n);
    for (i, row) in upper.iter().enumerate() {
        for (offset, &d) in row.iter().enumerate() {
            let j = i + 1 + offset;
            data[(i, j)] = d;
            data[(j, i)] = d;
        }
    }

    DistanceMatrix {
        sample_ids: clr.sample_ids.clone(),
        data,
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
