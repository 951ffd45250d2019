//! Sequencing coverage (reads per sample) of a count matrix.

use crate::data::CountMatrix;
use serde::{Deserialize, Serialize};

/// Per-sample read totals and their spread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageProfile {
    pub sample_ids: Vec<String>,
    /// Total reads per sample.
    pub coverage: Vec<u64>,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: u64,
    pub max: u64,
    /// Coefficient of variation (std_dev / mean).
    pub cv: f64,
    /// log2(max / min).
    pub log2_fold_range: f64,
}

impl CoverageProfile {
    /// Check if coverage is highly variable (CV > 0.5).
    pub fn is_highly_variable(&self) -> bool {
        self.cv > 0.5
    }

    /// Largest depth every sample can be rarefied to.
    pub fn rarefaction_depth(&self) -> u64 {
        self.min
    }

    /// Samples with fewer than `depth` reads.
    pub fn samples_below(&self, depth: u64) -> Vec<&str> {
        self.sample_ids
            .iter()
            .zip(&self.coverage)
            .filter(|&(_, &c)| c < depth)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Coverage as floats, in sample order.
    pub fn as_column(&self) -> Vec<f64> {
        self.coverage.iter().map(|&c| c as f64).collect()
    }
}

impl std::fmt::Display for CoverageProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Coverage Profile")?;
        writeln!(f, "  Samples: {}", self.sample_ids.len())?;
        writeln!(f, "  Mean:    {:.0}", self.mean)?;
        writeln!(f, "  Median:  {:.0}", self.median)?;
        writeln!(f, "  Std Dev: {:.0}", self.std_dev)?;
        writeln!(f, "  Min:     {}", self.min)?;
        writeln!(f, "  Max:     {}", self.max)?;
        writeln!(f, "  CV:      {:.2}", self.cv)?;
        writeln!(f, "  Log2 fold range: {:.2}", self.log2_fold_range)?;
        Ok(())
    }
}

/// Profile the per-sample read totals of a count matrix.
pub fn profile_coverage(counts: &CountMatrix) -> CoverageProfile {
    let coverage = counts.sample_totals();
    let n = coverage.len();
    if n == 0 {
        return CoverageProfile {
            sample_ids: vec![],
            coverage,
            mean: 0.0,
            median: 0.0,
            std_dev: 0.0,
            min: 0,
            max: 0,
            cv: 0.0,
            log2_fold_range: 0.0,
        };
    }

    let mean = coverage.iter().sum::<u64>() as f64 / n as f64;
    let variance = coverage
        .iter()
        .map(|&x| (x as f64 - mean).powi(2))
        .sum::<f64>()
        / n as f64;
    let std_dev = variance.sqrt();

    let min = coverage.iter().copied().min().unwrap_or(0);
    let max = coverage.iter().copied().max().unwrap_or(0);
    let log2_fold_range = if min > 0 {
        (max as f64 / min as f64).log2()
    } else {
        f64::MAX
    };

    CoverageProfile {
        sample_ids: counts.sample_ids().to_vec(),
        median: median_u64(&coverage),
        coverage,
        mean,
        std_dev,
        min,
        max,
        cv: if mean > 0.0 { std_dev / mean } else { 0.0 },
        log2_fold_range,
    }
}

fn median_u64(values: &[u64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0
    } else {
        sorted[n / 2] as f64
    }
}
