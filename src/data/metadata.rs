//! Per-sample metadata keyed by sample identifier.

use crate::error::{CodaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A variable value that can be categorical, continuous, or ordinal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Categorical variable with string levels.
    Categorical(String),
    /// Continuous numeric variable.
    Continuous(f64),
    /// Ordinal variable with integer rank.
    Ordinal(i64),
    /// Missing value.
    Missing,
}

impl Variable {
    pub fn is_missing(&self) -> bool {
        matches!(self, Variable::Missing)
    }

    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            Variable::Categorical(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_continuous(&self) -> Option<f64> {
        match self {
            Variable::Continuous(v) => Some(*v),
            _ => None,
        }
    }

    fn parse_as(raw: &str, var_type: VariableType) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == "NA" || raw == "na" {
            return Variable::Missing;
        }
        match var_type {
            VariableType::Continuous => raw
                .parse::<f64>()
                .map(Variable::Continuous)
                .unwrap_or(Variable::Missing),
            VariableType::Ordinal => raw
                .parse::<i64>()
                .map(Variable::Ordinal)
                .unwrap_or(Variable::Missing),
            VariableType::Categorical => Variable::Categorical(raw.to_string()),
        }
    }

    fn render(&self) -> Option<String> {
        match self {
            Variable::Categorical(s) => Some(s.clone()),
            Variable::Continuous(v) => Some(v.to_string()),
            Variable::Ordinal(v) => Some(v.to_string()),
            Variable::Missing => None,
        }
    }
}

/// Type hint for columns when loading metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    Categorical,
    Continuous,
    Ordinal,
}

/// Sample metadata: one record per sample.
///
/// Records are addressed by sample identifier only. Row order in the source
/// file carries no meaning; use [`Metadata::align_to`] to obtain a view in the
/// sample order of a count table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Sample IDs in order.
    sample_ids: Vec<String>,
    /// Column names.
    column_names: Vec<String>,
    /// Data stored as sample_id -> column_name -> Variable.
    data: HashMap<String, HashMap<String, Variable>>,
    /// Type hints for each column.
    column_types: HashMap<String, VariableType>,
}

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self {
            sample_ids: Vec::new(),
            column_names: Vec::new(),
            data: HashMap::new(),
            column_types: HashMap::new(),
        }
    }

    /// Build metadata holding a single categorical column.
    pub fn from_categorical(column: &str, records: &[(&str, &str)]) -> Result<Self> {
        let mut metadata = Self::new();
        metadata.column_names.push(column.to_string());
        metadata
            .column_types
            .insert(column.to_string(), VariableType::Categorical);
        for (sample_id, level) in records {
            if metadata.data.contains_key(*sample_id) {
                return Err(CodaError::SampleMismatch(format!(
                    "duplicate sample identifier '{}' in metadata",
                    sample_id
                )));
            }
            metadata.sample_ids.push(sample_id.to_string());
            let mut record = HashMap::new();
            record.insert(
                column.to_string(),
                Variable::parse_as(level, VariableType::Categorical),
            );
            metadata.data.insert(sample_id.to_string(), record);
        }
        Ok(metadata)
    }

    /// Load metadata from a TSV file.
    ///
    /// The first column holds sample IDs. Columns whose values all parse as
    /// numbers are read as continuous, everything else as categorical. Use
    /// [`Metadata::with_column_types`] to force a numerically coded outcome
    /// (e.g. `0`/`1` diagnosis) to categorical.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| CodaError::EmptyData("Empty metadata file".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(CodaError::EmptyData(
                "Metadata must have at least one variable column".to_string(),
            ));
        }
        let column_names: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();

        let mut raw_data: Vec<(String, Vec<String>)> = Vec::new();
        for line_result in lines {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let values: Vec<String> = fields[1..].iter().map(|s| s.to_string()).collect();
            raw_data.push((fields[0].trim().to_string(), values));
        }

        if raw_data.is_empty() {
            return Err(CodaError::EmptyData("No samples in metadata".to_string()));
        }

        let mut column_types = HashMap::new();
        for (col_idx, col_name) in column_names.iter().enumerate() {
            let all_numeric = raw_data.iter().all(|(_, values)| {
                values.get(col_idx).map_or(true, |v| {
                    let v = v.trim();
                    v.is_empty() || v == "NA" || v == "na" || v.parse::<f64>().is_ok()
                })
            });
            let var_type = if all_numeric {
                VariableType::Continuous
            } else {
                VariableType::Categorical
            };
            column_types.insert(col_name.clone(), var_type);
        }

        let mut sample_ids = Vec::new();
        let mut data = HashMap::new();

        for (sample_id, values) in raw_data {
            if data.contains_key(&sample_id) {
                return Err(CodaError::SampleMismatch(format!(
                    "duplicate sample identifier '{}' in metadata",
                    sample_id
                )));
            }
            let mut record = HashMap::new();
            for (col_idx, col_name) in column_names.iter().enumerate() {
                let var = match values.get(col_idx) {
                    Some(raw) => Variable::parse_as(raw, column_types[col_name]),
                    None => Variable::Missing,
                };
                record.insert(col_name.clone(), var);
            }
            sample_ids.push(sample_id.clone());
            data.insert(sample_id, record);
        }

        Ok(Self {
            sample_ids,
            column_names,
            data,
            column_types,
        })
    }

    /// Re-interpret columns under new type hints.
    pub fn with_column_types(mut self, types: HashMap<String, VariableType>) -> Self {
        for (col_name, var_type) in types {
            for record in self.data.values_mut() {
                if let Some(var) = record.get_mut(&col_name) {
                    *var = match var.render() {
                        Some(raw) => Variable::parse_as(&raw, var_type),
                        None => Variable::Missing,
                    };
                }
            }
            self.column_types.insert(col_name, var_type);
        }
        self
    }

    /// Attach a derived numeric column (coverage, diversity, balance...).
    ///
    /// `sample_ids` and `values` are paired by position; every identifier must
    /// already exist in the metadata. Samples not listed get `Missing`.
    pub fn with_numeric_column(
        mut self,
        column: &str,
        sample_ids: &[String],
        values: &[f64],
    ) -> Result<Self> {
        if sample_ids.len() != values.len() {
            return Err(CodaError::DimensionMismatch {
                expected: sample_ids.len(),
                actual: values.len(),
            });
        }
        for sid in sample_ids {
            if !self.data.contains_key(sid) {
                return Err(CodaError::SampleMismatch(format!(
                    "Sample '{}' not found in metadata",
                    sid
                )));
            }
        }
        for record in self.data.values_mut() {
            record.insert(column.to_string(), Variable::Missing);
        }
        for (sid, &value) in sample_ids.iter().zip(values) {
            if let Some(record) = self.data.get_mut(sid) {
                record.insert(column.to_string(), Variable::Continuous(value));
            }
        }
        if !self.has_column(column) {
            self.column_names.push(column.to_string());
        }
        self.column_types
            .insert(column.to_string(), VariableType::Continuous);
        Ok(self)
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Get a variable value for a specific sample and column.
    pub fn get(&self, sample_id: &str, column: &str) -> Option<&Variable> {
        self.data.get(sample_id).and_then(|m| m.get(column))
    }

    /// All values for a column, in metadata sample order.
    pub fn column(&self, column: &str) -> Result<Vec<&Variable>> {
        if !self.has_column(column) {
            return Err(CodaError::MissingColumn(column.to_string()));
        }
        Ok(self
            .sample_ids
            .iter()
            .map(|sid| {
                self.data
                    .get(sid)
                    .and_then(|m| m.get(column))
                    .unwrap_or(&Variable::Missing)
            })
            .collect())
    }

    pub fn column_type(&self, column: &str) -> Option<VariableType> {
        self.column_types.get(column).copied()
    }

    /// Sorted unique levels of a categorical column.
    pub fn levels(&self, column: &str) -> Result<Vec<String>> {
        let values = self.column(column)?;
        let levels: BTreeSet<String> = values
            .iter()
            .filter_map(|v| v.as_categorical().map(String::from))
            .collect();
        Ok(levels.into_iter().collect())
    }

    /// Subset metadata to the given samples, in the given order.
    pub fn subset_samples(&self, sample_ids: &[String]) -> Result<Self> {
        let mut new_data = HashMap::new();
        let mut new_sample_ids = Vec::new();

        for sid in sample_ids {
            let record = self.data.get(sid).ok_or_else(|| {
                CodaError::SampleMismatch(format!("Sample '{}' not found in metadata", sid))
            })?;
            new_data.insert(sid.clone(), record.clone());
            new_sample_ids.push(sid.clone());
        }

        Ok(Self {
            sample_ids: new_sample_ids,
            column_names: self.column_names.clone(),
            data: new_data,
            column_types: self.column_types.clone(),
        })
    }

    /// Strict keyed join: the metadata must describe exactly `sample_ids`.
    ///
    /// Fails when a count-table sample is absent from the metadata or the
    /// metadata describes samples the count table does not contain. The result
    /// is ordered like `sample_ids`.
    pub fn align_to(&self, sample_ids: &[String]) -> Result<Self> {
        let wanted: HashSet<&str> = sample_ids.iter().map(String::as_str).collect();
        let missing: Vec<&str> = sample_ids
            .iter()
            .filter(|sid| !self.data.contains_key(sid.as_str()))
            .map(String::as_str)
            .collect();
        let extra: Vec<&str> = self
            .sample_ids
            .iter()
            .filter(|sid| !wanted.contains(sid.as_str()))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() || !extra.is_empty() {
            return Err(CodaError::SampleMismatch(format!(
                "count table and metadata disagree: missing from metadata {:?}, absent from counts {:?}",
                missing, extra
            )));
        }
        self.subset_samples(sample_ids)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}
