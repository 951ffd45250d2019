//! Analysis configuration, loadable from YAML.

use crate::balance::SelectionConfig;
use crate::diversity::DiversityIndex;
use crate::error::{CodaError, Result};
use crate::zero::ZeroStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Rarefaction settings for alpha diversity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RarefactionSettings {
    /// Reads per sample; defaults to the smallest sample total.
    pub depth: Option<u64>,
    pub repetitions: usize,
    pub index: DiversityIndex,
}

impl Default for RarefactionSettings {
    fn default() -> Self {
        Self {
            depth: None,
            repetitions: 10,
            index: DiversityIndex::Shannon,
        }
    }
}

/// Full configuration of [`run_analysis`](super::run_analysis).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Categorical metadata column to explain.
    pub outcome: String,
    /// Minimum fraction of samples a taxon must be present in.
    pub prevalence_threshold: f64,
    pub zero_strategy: ZeroStrategy,
    pub rarefaction: RarefactionSettings,
    /// PERMANOVA label permutations.
    pub permutations: usize,
    pub balance: SelectionConfig,
    /// Base seed for rarefaction and permutations.
    pub seed: u64,
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            outcome: "group".to_string(),
            prevalence_threshold: 0.1,
            zero_strategy: ZeroStrategy::default(),
            rarefaction: RarefactionSettings::default(),
            permutations: 999,
            balance: SelectionConfig::default(),
            seed: 42,
            parallel: true,
        }
    }
}

impl AnalysisConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(CodaError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(CodaError::from)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Reject configuration problems before any data is touched.
    pub fn validate(&self) -> Result<()> {
        if self.outcome.trim().is_empty() {
            return Err(CodaError::InvalidParameter(
                "outcome column must be named".to_string(),
            ));
        }
        if !(self.prevalence_threshold > 0.0 && self.prevalence_threshold < 1.0) {
            return Err(CodaError::InvalidParameter(format!(
                "prevalence threshold must lie in (0, 1), got {}",
                self.prevalence_threshold
            )));
        }
        match self.zero_strategy {
            ZeroStrategy::Multiplicative { fraction } if !(fraction > 0.0 && fraction < 1.0) => {
                return Err(CodaError::InvalidParameter(format!(
                    "multiplicative replacement fraction must lie in (0, 1), got {}",
                    fraction
                )));
            }
            ZeroStrategy::Pseudocount { value } if !(value > 0.0 && value.is_finite()) => {
                return Err(CodaError::InvalidParameter(format!(
                    "pseudocount must be positive, got {}",
                    value
                )));
            }
            _ => {}
        }
        if self.rarefaction.depth == Some(0) {
            return Err(CodaError::InvalidParameter(
                "rarefaction depth must be at least 1".to_string(),
            ));
        }
        if self.rarefaction.repetitions == 0 {
            return Err(CodaError::InvalidParameter(
                "rarefaction repetitions must be at least 1".to_string(),
            ));
        }
        if self.permutations == 0 {
            return Err(CodaError::InvalidParameter(
                "permutation count must be at least 1".to_string(),
            ));
        }
        self.balance.validate()
    }
}
