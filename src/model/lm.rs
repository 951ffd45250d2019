//! Linear association model: OLS of balance coordinates on the outcome design.

use crate::data::DesignMatrix;
use crate::error::{CodaError, Result};
use log::debug;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

/// OLS fit of one response axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisFit {
    /// Axis identifier.
    pub axis_id: String,
    /// Estimated coefficients, in design column order.
    pub coefficients: Vec<f64>,
    /// Standard errors of coefficients.
    pub std_errors: Vec<f64>,
    /// Residuals.
    #[serde(skip)]
    pub residuals: Vec<f64>,
    /// Residual standard error (sigma).
    pub sigma: f64,
    pub r_squared: f64,
    /// Overall F statistic against the intercept-only model.
    pub f_statistic: f64,
    pub f_p_value: f64,
    /// Degrees of freedom (residual).
    pub df_residual: usize,
}

impl AxisFit {
    /// t-statistic for a coefficient.
    pub fn t_statistic(&self, index: usize) -> Option<f64> {
        let coef = self.coefficients.get(index)?;
        let se = self.std_errors.get(index)?;
        if *se > 0.0 {
            Some(coef / se)
        } else {
            None
        }
    }
}

/// Fitted regression of one or more orthogonal balance coordinates on the
/// outcome design. The first axis is always the primary balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearAssociationModel {
    pub fits: Vec<AxisFit>,
    /// Coefficient names from the design matrix.
    pub coefficient_names: Vec<String>,
    /// Outcome levels, reference first.
    pub levels: Vec<String>,
    pub n_samples: usize,
}

impl LinearAssociationModel {
    pub fn coefficient_index(&self, name: &str) -> Option<usize> {
        self.coefficient_names.iter().position(|n| n == name)
    }

    /// One coefficient per axis for the named design column.
    pub fn coefficients_for(&self, coefficient_name: &str) -> Option<Vec<f64>> {
        let idx = self.coefficient_index(coefficient_name)?;
        Some(
            self.fits
                .iter()
                .map(|f| f.coefficients.get(idx).copied().unwrap_or(f64::NAN))
                .collect(),
        )
    }

    pub fn reference_level(&self) -> &str {
        &self.levels[0]
    }

    /// Design column of a non-reference outcome level.
    pub fn level_index(&self, level: &str) -> Option<usize> {
        self.levels
            .iter()
            .skip(1)
            .position(|l| l == level)
            .map(|i| i + 1)
    }

    /// One coefficient per axis for a non-reference outcome level.
    pub fn coefficients_for_level(&self, level: &str) -> Option<Vec<f64>> {
        let idx = self.level_index(level)?;
        Some(
            self.fits
                .iter()
                .map(|f| f.coefficients.get(idx).copied().unwrap_or(f64::NAN))
                .collect(),
        )
    }

    pub fn n_axes(&self) -> usize {
        self.fits.len()
    }

    pub fn n_coefficients(&self) -> usize {
        self.coefficient_names.len()
    }

    /// Fit of the primary balance.
    pub fn primary(&self) -> Option<&AxisFit> {
        self.fits.first()
    }
}

/// Fit OLS for every row of `response` (axes × samples) against `design`.
///
/// (X'X)^-1 is computed once and shared across axes.
pub fn model_lm(
    response: &DMatrix<f64>,
    axis_ids: &[String],
    design: &DesignMatrix,
) -> Result<LinearAssociationModel> {
    let n_axes = response.nrows();
    let n_samples = response.ncols();
    let n_coef = design.n_coefficients();

    if axis_ids.len() != n_axes {
        return Err(CodaError::DimensionMismatch {
            expected: n_axes,
            actual: axis_ids.len(),
        });
    }
    if design.n_samples() != n_samples {
        return Err(CodaError::DimensionMismatch {
            expected: n_samples,
            actual: design.n_samples(),
        });
    }

    let df_residual = n_samples.saturating_sub(n_coef);
    if df_residual == 0 {
        return Err(CodaError::Numerical(
            "Model is saturated (n_samples <= n_coefficients)".to_string(),
        ));
    }

    let x = design.matrix();
    let xtx = x.transpose() * x;
    let xtx_inv = xtx.try_inverse().ok_or_else(|| {
        CodaError::Numerical("Design matrix is singular (X'X not invertible)".to_string())
    })?;

    let fits: Vec<AxisFit> = (0..n_axes)
        .into_par_iter()
        .map(|i| {
            let y: Vec<f64> = response.row(i).iter().copied().collect();
            fit_axis(&y, &axis_ids[i], x, &xtx_inv, df_residual)
        })
        .collect();
    debug!(
        "Fitted {} axes on {} samples ({} coefficients)",
        n_axes, n_samples, n_coef
    );

    Ok(LinearAssociationModel {
        fits,
        coefficient_names: design.coefficient_names().to_vec(),
        levels: design.levels().to_vec(),
        n_samples,
    })
}

fn fit_axis(
    y: &[f64],
    axis_id: &str,
    x: &DMatrix<f64>,
    xtx_inv: &DMatrix<f64>,
    df_residual: usize,
) -> AxisFit {
    let n_samples = y.len();
    let n_coef = x.ncols();
    let y_vec = DVector::from_column_slice(y);

    // beta = (X'X)^-1 X'y
    let beta = xtx_inv * (x.transpose() * &y_vec);
    let coefficients: Vec<f64> = beta.iter().copied().collect();

    let residuals_vec = &y_vec - x * &beta;
    let residuals: Vec<f64> = residuals_vec.iter().copied().collect();
    let rss: f64 = residuals.iter().map(|e| e * e).sum();

    let sigma = (rss / df_residual as f64).sqrt();
    let std_errors: Vec<f64> = (0..n_coef)
        .map(|j| sigma * xtx_inv[(j, j)].sqrt())
        .collect();

    let y_mean = y.iter().sum::<f64>() / n_samples as f64;
    let tss: f64 = y.iter().map(|yi| (yi - y_mean).powi(2)).sum();
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };

    let df_model = n_coef.saturating_sub(1);
    let (f_statistic, f_p_value) = overall_f(tss, rss, df_model, df_residual);

    AxisFit {
        axis_id: axis_id.to_string(),
        coefficients,
        std_errors,
        residuals,
        sigma,
        r_squared,
        f_statistic,
        f_p_value,
        df_residual,
    }
}

/// Overall F test of the model against the intercept-only model.
///
/// An exact fit reports `(f64::MAX, 0.0)`.
pub fn overall_f(tss: f64, rss: f64, df_model: usize, df_residual: usize) -> (f64, f64) {
    if df_model == 0 || df_residual == 0 || tss <= 0.0 {
        return (0.0, 1.0);
    }
    let explained = (tss - rss).max(0.0);
    if rss <= f64::EPSILON * tss {
        return (f64::MAX, 0.0);
    }
    let f = (explained / df_model as f64) / (rss / df_residual as f64);
    let p = FisherSnedecor::new(df_model as f64, df_residual as f64)
        .map(|dist| dist.sf(f))
        .unwrap_or(f64::NAN);
    (f, p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Grouping, Metadata};
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_grouping() -> Grouping {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id\tgroup").unwrap();
        writeln!(file, "S1\tcontrol").unwrap();
        writeln!(file, "S2\ttreatment").unwrap();
        writeln!(file, "S3\tcontrol").unwrap();
        writeln!(file, "S4\ttreatment").unwrap();
        writeln!(file, "S5\tcontrol").unwrap();
        writeln!(file, "S6\ttreatment").unwrap();
        file.flush().unwrap();
        let metadata = Metadata::from_tsv(file.path()).unwrap();
        let ids: Vec<String> = (1..=6).map(|i| format!("S{}", i)).collect();
        Grouping::from_metadata(&metadata, "group", &ids).unwrap()
    }

    fn create_test_response() -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 6, &[
            1.0, 1.1, 1.2, 0.9, 0.9, 1.1, // equal group means
            1.0, 3.0, 1.2, 2.8, 0.9, 3.1, // treatment ~+2
        ])
    }

    fn axis_ids() -> Vec<String> {
        vec!["balance".into(), "sub_1".into()]
    }

    #[test]
    fn test_model_lm_basic() {
        let design = DesignMatrix::from_grouping(&create_test_grouping(), "group").unwrap();
        let model = model_lm(&create_test_response(), &axis_ids(), &design).unwrap();

        assert_eq!(model.n_axes(), 2);
        assert_eq!(model.n_coefficients(), 2);
        assert_eq!(model.coefficient_names, vec!["(Intercept)", "grouptreatment"]);
        assert_eq!(model.reference_level(), "control");
        assert_eq!(model.level_index("treatment"), Some(1));
        assert_eq!(model.level_index("control"), None);
        assert_eq!(model.fits[0].df_residual, 4);
    }

    #[test]
    fn test_coefficients_are_group_mean_differences() {
        let design = DesignMatrix::from_grouping(&create_test_grouping(), "group").unwrap();
        let model = model_lm(&create_test_response(), &axis_ids(), &design).unwrap();

        let effect = model.coefficients_for("grouptreatment").unwrap();
        // treatment mean 2.9667, control mean 1.0333
        assert_relative_eq!(effect[1], 2.9666666666 - 1.0333333333, epsilon = 1e-8);
        assert!(effect[0].abs() < 0.5);
        assert_relative_eq!(model.fits[1].coefficients[0], 1.0333333333, epsilon = 1e-8);
    }

    #[test]
    fn test_f_test() {
        let design = DesignMatrix::from_grouping(&create_test_grouping(), "group").unwrap();
        let model = model_lm(&create_test_response(), &axis_ids(), &design).unwrap();

        let strong = &model.fits[1];
        assert!(strong.r_squared > 0.9);
        assert!(strong.f_p_value < 0.001);
        // with one non-intercept column, F = t²
        let t = strong.t_statistic(1).unwrap();
        assert_relative_eq!(strong.f_statistic, t * t, epsilon = 1e-6);

        // both groups average 1.0333
        let flat = &model.fits[0];
        assert_relative_eq!(flat.coefficients[1], 0.0, epsilon = 1e-12);
        assert!(flat.f_statistic < 1e-12);
        assert!(flat.f_p_value > 0.99);
    }

    #[test]
    fn test_dimension_mismatch() {
        let design = DesignMatrix::from_grouping(&create_test_grouping(), "group").unwrap();
        let response = DMatrix::from_row_slice(1, 4, &[1.0, 1.0, 2.0, 2.0]);
        assert!(model_lm(&response, &["a".to_string()], &design).is_err());
        assert!(model_lm(&create_test_response(), &["a".to_string()], &design).is_err());
    }
}
