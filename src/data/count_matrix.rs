//! Sparse taxon count table.

use crate::error::{CodaError, Result};
use rayon::prelude::*;
use sprs::{CsMat, TriMat};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Read counts of taxa across samples.
///
/// Rows are taxa, columns are samples. Stored in CSR form so per-taxon
/// prevalence is a cheap `nnz` lookup; per-sample access goes through
/// [`CountMatrix::sample_counts`].
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Sparse matrix in CSR format (taxa × samples)
    data: CsMat<u64>,
    /// Taxon identifiers (row names)
    taxon_ids: Vec<String>,
    /// Sample identifiers (column names)
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new CountMatrix from a sparse matrix and identifiers.
    pub fn new(data: CsMat<u64>, taxon_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != taxon_ids.len() {
            return Err(CodaError::DimensionMismatch {
                expected: nrows,
                actual: taxon_ids.len(),
            });
        }
        if ncols != sample_ids.len() {
            return Err(CodaError::DimensionMismatch {
                expected: ncols,
                actual: sample_ids.len(),
            });
        }
        let mut seen = HashMap::with_capacity(sample_ids.len());
        for id in &sample_ids {
            if seen.insert(id.as_str(), ()).is_some() {
                return Err(CodaError::SampleMismatch(format!(
                    "duplicate sample identifier '{}'",
                    id
                )));
            }
        }
        Ok(Self {
            data,
            taxon_ids,
            sample_ids,
        })
    }

    /// Build from per-sample rows (samples × taxa), the orientation most
    /// loaders hand over.
    pub fn from_sample_rows(
        rows: &[Vec<u64>],
        taxon_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        if rows.len() != sample_ids.len() {
            return Err(CodaError::DimensionMismatch {
                expected: sample_ids.len(),
                actual: rows.len(),
            });
        }
        let n_taxa = taxon_ids.len();
        let mut tri_mat = TriMat::new((n_taxa, rows.len()));
        for (col, row) in rows.iter().enumerate() {
            if row.len() != n_taxa {
                return Err(CodaError::DimensionMismatch {
                    expected: n_taxa,
                    actual: row.len(),
                });
            }
            for (taxon, &value) in row.iter().enumerate() {
                if value > 0 {
                    tri_mat.add_triplet(taxon, col, value);
                }
            }
        }
        Self::new(tri_mat.to_csr(), taxon_ids, sample_ids)
    }

    /// Load a count matrix from a TSV file.
    ///
    /// Expected format:
    /// - First row: header with sample IDs (first column is the taxon ID header)
    /// - Subsequent rows: taxon ID followed by counts
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| CodaError::EmptyData("Empty TSV file".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(CodaError::EmptyData(
                "TSV must have at least one sample".to_string(),
            ));
        }
        let sample_ids: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();
        let n_samples = sample_ids.len();

        let mut triplets: Vec<(usize, usize, u64)> = Vec::new();
        let mut taxon_ids: Vec<String> = Vec::new();

        for line_result in lines {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let row_idx = taxon_ids.len();
            let fields: Vec<&str> = line.split('\t').collect();
            taxon_ids.push(fields[0].to_string());

            for (col_idx, value_str) in fields[1..].iter().enumerate() {
                if col_idx >= n_samples {
                    break;
                }
                let value: u64 = value_str.trim().parse().map_err(|_| CodaError::InvalidCount {
                    value: value_str.to_string(),
                    row: row_idx,
                    col: col_idx,
                })?;
                if value > 0 {
                    triplets.push((row_idx, col_idx, value));
                }
            }
        }

        let n_taxa = taxon_ids.len();
        if n_taxa == 0 {
            return Err(CodaError::EmptyData("No taxa in TSV".to_string()));
        }

        let mut tri_mat = TriMat::new((n_taxa, n_samples));
        for (row, col, val) in triplets {
            tri_mat.add_triplet(row, col, val);
        }

        Self::new(tri_mat.to_csr(), taxon_ids, sample_ids)
    }

    /// Write the count matrix to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "taxon_id")?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        writeln!(writer)?;

        for (row_idx, taxon_id) in self.taxon_ids.iter().enumerate() {
            write!(writer, "{}", taxon_id)?;
            for value in self.taxon_counts(row_idx) {
                write!(writer, "\t{}", value)?;
            }
            writeln!(writer)?;
        }

        Ok(())
    }

    /// Get the value at (taxon, sample), returning 0 for missing entries.
    #[inline]
    pub fn get(&self, taxon: usize, sample: usize) -> u64 {
        self.data.get(taxon, sample).copied().unwrap_or(0)
    }

    /// Number of taxa (rows).
    #[inline]
    pub fn n_taxa(&self) -> usize {
        self.data.rows()
    }

    /// Number of samples (columns).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.cols()
    }

    #[inline]
    pub fn taxon_ids(&self) -> &[String] {
        &self.taxon_ids
    }

    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get the underlying sparse matrix.
    #[inline]
    pub fn data(&self) -> &CsMat<u64> {
        &self.data
    }

    /// Position of a sample by identifier.
    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|s| s == sample_id)
    }

    /// Number of samples in which a taxon has a positive count.
    pub fn prevalence_count(&self, taxon: usize) -> usize {
        self.data.outer_view(taxon).map(|v| v.nnz()).unwrap_or(0)
    }

    /// Dense counts of one taxon across samples.
    pub fn taxon_counts(&self, taxon: usize) -> Vec<u64> {
        let mut dense = vec![0u64; self.n_samples()];
        if let Some(row_vec) = self.data.outer_view(taxon) {
            for (col, &val) in row_vec.iter() {
                dense[col] = val;
            }
        }
        dense
    }

    /// Dense counts of one sample across taxa.
    pub fn sample_counts(&self, sample: usize) -> Vec<u64> {
        (0..self.n_taxa()).map(|taxon| self.get(taxon, sample)).collect()
    }

    /// All samples as dense count vectors, in sample order.
    pub fn sample_columns(&self) -> Vec<Vec<u64>> {
        let mut columns = vec![vec![0u64; self.n_taxa()]; self.n_samples()];
        for (taxon, row_vec) in self.data.outer_iterator().enumerate() {
            for (col, &val) in row_vec.iter() {
                columns[col][taxon] = val;
            }
        }
        columns
    }

    /// Total counts per taxon.
    pub fn taxon_totals(&self) -> Vec<u64> {
        (0..self.n_taxa())
            .into_par_iter()
            .map(|row| {
                self.data
                    .outer_view(row)
                    .map(|v| v.iter().map(|(_, &val)| val).sum())
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Total counts per sample (sequencing depth).
    pub fn sample_totals(&self) -> Vec<u64> {
        let mut sums = vec![0u64; self.n_samples()];
        for row_vec in self.data.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                sums[col] += val;
            }
        }
        sums
    }

    /// Restrict to the given taxa (by index), keeping their order.
    pub fn subset_taxa(&self, indices: &[usize]) -> Result<Self> {
        let n_samples = self.n_samples();
        let mut tri_mat = TriMat::new((indices.len(), n_samples));
        let mut new_taxon_ids = Vec::with_capacity(indices.len());

        for (new_row, &old_row) in indices.iter().enumerate() {
            if old_row >= self.n_taxa() {
                return Err(CodaError::InvalidParameter(format!(
                    "Taxon index {} out of bounds",
                    old_row
                )));
            }
            new_taxon_ids.push(self.taxon_ids[old_row].clone());
            if let Some(row_vec) = self.data.outer_view(old_row) {
                for (col, &val) in row_vec.iter() {
                    tri_mat.add_triplet(new_row, col, val);
                }
            }
        }

        Self::new(tri_mat.to_csr(), new_taxon_ids, self.sample_ids.clone())
    }

    /// Restrict to the given samples (by index), keeping their order.
    pub fn subset_samples(&self, indices: &[usize]) -> Result<Self> {
        let col_map: HashMap<usize, usize> = indices
            .iter()
            .enumerate()
            .map(|(new_idx, &old_idx)| (old_idx, new_idx))
            .collect();

        let mut new_sample_ids = Vec::with_capacity(indices.len());
        for &old_col in indices {
            if old_col >= self.n_samples() {
                return Err(CodaError::InvalidParameter(format!(
                    "Sample index {} out of bounds",
                    old_col
                )));
            }
            new_sample_ids.push(self.sample_ids[old_col].clone());
        }

        let mut tri_mat = TriMat::new((self.n_taxa(), indices.len()));
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (old_col, &val) in row_vec.iter() {
                if let Some(&new_col) = col_map.get(&old_col) {
                    tri_mat.add_triplet(row, new_col, val);
                }
            }
        }

        Self::new(tri_mat.to_csr(), self.taxon_ids.clone(), new_sample_ids)
    }

    /// Convert to a dense matrix (f64), taxa × samples.
    pub fn to_dense(&self) -> nalgebra::DMatrix<f64> {
        let mut dense = nalgebra::DMatrix::zeros(self.n_taxa(), self.n_samples());
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (col, &val) in row_vec.iter() {
                dense[(row, col)] = val as f64;
            }
        }
        dense
    }
}

impl PartialEq for CountMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.taxon_ids == other.taxon_ids
            && self.sample_ids == other.sample_ids
            && self.sample_columns() == other.sample_columns()
    }
}
