//! Zero handling so that log-ratios are defined.

pub mod multiplicative;
pub mod pseudocount;

use crate::data::{CompositionMatrix, CountMatrix};
use crate::error::Result;
use serde::{Deserialize, Serialize};

pub use multiplicative::{replace_zeros_multiplicative, replace_zeros_multiplicative_dense};
pub use pseudocount::{adaptive_pseudocount, add_pseudocount};

/// How zeros are removed before any log-ratio step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ZeroStrategy {
    /// Multiplicative simple replacement at `fraction` of each taxon's detection limit.
    Multiplicative { fraction: f64 },
    /// Add a constant to every cell, then close.
    Pseudocount { value: f64 },
    /// Pseudocount of half the smallest non-zero count in the table.
    AdaptivePseudocount,
}

impl Default for ZeroStrategy {
    fn default() -> Self {
        ZeroStrategy::Multiplicative {
            fraction: multiplicative::DEFAULT_FRACTION,
        }
    }
}

impl ZeroStrategy {
    pub fn apply(&self, counts: &CountMatrix) -> Result<CompositionMatrix> {
        match *self {
            ZeroStrategy::Multiplicative { fraction } => replace_zeros_multiplicative(counts, fraction),
            ZeroStrategy::Pseudocount { value } => add_pseudocount(counts, value),
            ZeroStrategy::AdaptivePseudocount => add_pseudocount(counts, adaptive_pseudocount(counts)),
        }
    }
}
