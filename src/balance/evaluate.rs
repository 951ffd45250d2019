//! Per-sample balance values and back-projection of model coefficients onto taxa.

use super::contrast::Balance;
use crate::data::CompositionMatrix;
use crate::error::{CodaError, Result};
use crate::model::LinearAssociationModel;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// One value per taxon for a chosen outcome level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonContributions {
    pub taxon_ids: Vec<String>,
    /// Non-reference level the values contrast against the reference.
    pub level: String,
    pub values: Vec<f64>,
}

impl TaxonContributions {
    pub fn get(&self, taxon_id: &str) -> Option<f64> {
        self.taxon_ids
            .iter()
            .position(|t| t == taxon_id)
            .map(|i| self.values[i])
    }
}

/// Balance value of every sample of `composition`.
pub fn balance_values(composition: &CompositionMatrix, balance: &Balance) -> Result<Vec<f64>> {
    if composition.taxon_ids() != balance.taxon_ids() {
        return Err(CodaError::DimensionMismatch {
            expected: balance.n_taxa(),
            actual: composition.n_taxa(),
        });
    }
    let logs = composition.log_values();
    Ok((0..composition.n_samples())
        .map(|s| {
            let column: Vec<f64> = logs.column(s).iter().copied().collect();
            balance.value_from_logs(&column)
        })
        .collect())
}

fn level_coefficients(model: &LinearAssociationModel, balance: &Balance, level: &str) -> Result<DVector<f64>> {
    let n_axes = balance.size() - 1;
    if model.n_axes() != n_axes {
        return Err(CodaError::DimensionMismatch {
            expected: n_axes,
            actual: model.n_axes(),
        });
    }
    let coefficients = model.coefficients_for_level(level).ok_or_else(|| {
        CodaError::InvalidParameter(format!(
            "'{}' is not a non-reference outcome level (reference '{}')",
            level,
            model.reference_level()
        ))
    })?;
    Ok(DVector::from_vec(coefficients))
}

/// Per-taxon CLR mean difference between `level` and the reference level,
/// reconstructed as basis × coefficients. Taxa outside the balance get 0.
pub fn clr_difference(
    model: &LinearAssociationModel,
    balance: &Balance,
    level: &str,
) -> Result<TaxonContributions> {
    let beta = level_coefficients(model, balance, level)?;
    let values = balance.basis() * beta;
    Ok(TaxonContributions {
        taxon_ids: balance.taxon_ids().to_vec(),
        level: level.to_string(),
        values: values.iter().copied().collect(),
    })
}

/// Projection of the CLR difference onto the unit balance direction.
///
/// Every numerator taxon shares one value and every denominator taxon
/// shares another; their weighted contrast recovers the primary coefficient.
pub fn approximate_difference(
    model: &LinearAssociationModel,
    balance: &Balance,
    level: &str,
) -> Result<TaxonContributions> {
    let full = clr_difference(model, balance, level)?;
    let direction = balance.direction();
    let along = direction.dot(&DVector::from_column_slice(&full.values));
    Ok(TaxonContributions {
        values: (direction * along).iter().copied().collect(),
        ..full
    })
}
