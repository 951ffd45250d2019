//! Categorical outcome labels joined to samples by identifier.

use crate::data::{Metadata, Variable};
use crate::error::{CodaError, Result};
use serde::{Deserialize, Serialize};

/// Group membership of an ordered list of samples.
///
/// `labels[i]` indexes into `levels` and belongs to `sample_ids[i]`. Levels
/// are sorted, so the first level is the reference for model contrasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grouping {
    sample_ids: Vec<String>,
    labels: Vec<usize>,
    levels: Vec<String>,
}

impl Grouping {
    /// Build directly from labels; levels are derived and sorted.
    ///
    /// Levels sort lexically unless every level is a number, in which case
    /// they sort numerically ("2" before "10").
    pub fn new(sample_ids: Vec<String>, labels: &[&str]) -> Result<Self> {
        if sample_ids.len() != labels.len() {
            return Err(CodaError::DimensionMismatch {
                expected: sample_ids.len(),
                actual: labels.len(),
            });
        }
        let mut levels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        levels.sort();
        levels.dedup();
        let numeric: Option<Vec<f64>> = levels
            .iter()
            .map(|l| l.parse::<f64>().ok().filter(|v| v.is_finite()))
            .collect();
        if let Some(keys) = numeric {
            let mut keyed: Vec<(f64, String)> = keys.into_iter().zip(levels).collect();
            keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
            levels = keyed.into_iter().map(|(_, level)| level).collect();
        }
        let labels = labels
            .iter()
            .map(|l| levels.iter().position(|lv| lv == l).unwrap_or(0))
            .collect();
        Ok(Self {
            sample_ids,
            labels,
            levels,
        })
    }

    /// Keyed join of an outcome column onto `sample_ids`.
    ///
    /// Every sample must have a non-missing categorical (or ordinal) value.
    pub fn from_metadata(metadata: &Metadata, column: &str, sample_ids: &[String]) -> Result<Self> {
        if !metadata.has_column(column) {
            return Err(CodaError::MissingColumn(column.to_string()));
        }
        let mut raw = Vec::with_capacity(sample_ids.len());
        for sid in sample_ids {
            let var = metadata.get(sid, column).ok_or_else(|| {
                CodaError::SampleMismatch(format!("Sample '{}' not found in metadata", sid))
            })?;
            let label = match var {
                Variable::Categorical(s) => s.clone(),
                Variable::Ordinal(v) => v.to_string(),
                Variable::Missing => {
                    return Err(CodaError::InvalidVariableType {
                        column: column.to_string(),
                        reason: format!("missing outcome for sample '{}'", sid),
                    })
                }
                Variable::Continuous(_) => {
                    return Err(CodaError::InvalidVariableType {
                        column: column.to_string(),
                        reason: "outcome must be categorical; override the column type".to_string(),
                    })
                }
            };
            raw.push(label);
        }
        let refs: Vec<&str> = raw.iter().map(String::as_str).collect();
        Self::new(sample_ids.to_vec(), &refs)
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Level index per sample.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }

    pub fn n_groups(&self) -> usize {
        self.levels.len()
    }

    /// Samples per level.
    pub fn group_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.levels.len()];
        for &l in &self.labels {
            sizes[l] += 1;
        }
        sizes
    }

    /// Fail unless `sample_ids` matches this grouping position by position.
    pub fn check_aligned(&self, sample_ids: &[String]) -> Result<()> {
        if self.sample_ids.as_slice() != sample_ids {
            return Err(CodaError::SampleMismatch(
                "grouping and data are not ordered by the same sample identifiers".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::VariableType;
    use std::collections::HashMap;

    #[test]
    fn test_levels_sorted_reference_first() {
        let g = Grouping::new(
            vec!["a".into(), "b".into(), "c".into()],
            &["treatment", "control", "treatment"],
        )
        .unwrap();
        assert_eq!(g.levels(), &["control", "treatment"]);
        assert_eq!(g.labels(), &[1, 0, 1]);
        assert_eq!(g.group_sizes(), vec![1, 2]);
    }

    #[test]
    fn test_numeric_levels_sort_numerically() {
        let ids: Vec<String> = (0..4).map(|i| format!("S{}", i)).collect();
        let g = Grouping::new(ids.clone(), &["2", "10", "1", "2"]).unwrap();
        assert_eq!(g.levels(), &["1", "2", "10"]);
        assert_eq!(g.labels(), &[1, 2, 0, 1]);

        // Mixed labels stay lexical.
        let g = Grouping::new(ids, &["10", "2", "b", "a"]).unwrap();
        assert_eq!(g.levels(), &["10", "2", "a", "b"]);
    }

    #[test]
    fn test_ordinal_outcome_levels() {
        let meta = Metadata::from_categorical(
            "stage",
            &[("S1", "3"), ("S2", "12"), ("S3", "3"), ("S4", "1")],
        )
        .unwrap()
        .with_column_types(HashMap::from([("stage".to_string(), VariableType::Ordinal)]));
        let order: Vec<String> = (1..=4).map(|i| format!("S{}", i)).collect();
        let g = Grouping::from_metadata(&meta, "stage", &order).unwrap();
        assert_eq!(g.levels(), &["1", "3", "12"]);
        assert_eq!(g.labels(), &[1, 2, 1, 0]);
    }

    #[test]
    fn test_from_metadata_keyed() {
        let meta = Metadata::from_categorical(
            "diagnosis",
            &[("S2", "CD"), ("S1", "nonIBD"), ("S3", "CD")],
        )
        .unwrap();
        let order: Vec<String> = vec!["S1".into(), "S2".into(), "S3".into()];
        let g = Grouping::from_metadata(&meta, "diagnosis", &order).unwrap();
        assert_eq!(g.levels(), &["CD", "nonIBD"]);
        assert_eq!(g.labels(), &[1, 0, 0]);
    }

    #[test]
    fn test_from_metadata_missing_sample() {
        let meta = Metadata::from_categorical("diagnosis", &[("S1", "CD")]).unwrap();
        let order: Vec<String> = vec!["S1".into(), "S2".into()];
        assert!(Grouping::from_metadata(&meta, "diagnosis", &order).is_err());
        assert!(Grouping::from_metadata(&meta, "nope", &order).is_err());
    }
}
