//! Alpha diversity indices computed on a vector of counts.

use serde::{Deserialize, Serialize};

/// Which within-sample diversity index to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiversityIndex {
    /// Shannon entropy, natural log.
    #[default]
    Shannon,
    /// Gini-Simpson, 1 - Σ p².
    Simpson,
    /// Number of taxa with a positive count.
    Observed,
}

impl DiversityIndex {
    pub fn compute(&self, counts: &[u64]) -> f64 {
        match self {
            DiversityIndex::Shannon => shannon(counts),
            DiversityIndex::Simpson => simpson(counts),
            DiversityIndex::Observed => observed(counts),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DiversityIndex::Shannon => "shannon",
            DiversityIndex::Simpson => "simpson",
            DiversityIndex::Observed => "observed",
        }
    }
}

/// Shannon entropy: H = -Σ p_i ln(p_i), zero counts contribute nothing.
pub fn shannon(counts: &[u64]) -> f64 {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.ln()
        })
        .sum()
}

/// Gini-Simpson index: 1 - Σ p_i².
pub fn simpson(counts: &[u64]) -> f64 {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

/// Observed richness.
pub fn observed(counts: &[u64]) -> f64 {
    counts.iter().filter(|&&c| c > 0).count() as f64
}
