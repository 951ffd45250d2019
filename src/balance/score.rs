//! Scoring rules for candidate balances against a categorical outcome.

use crate::data::Grouping;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Association between per-sample balance values and the outcome groups.
/// Larger is better; a balance with no association scores 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringRule {
    /// One-way ANOVA F statistic.
    #[default]
    FStatistic,
    /// Between-group share of the total sum of squares.
    RSquared,
    /// Kruskal-Wallis H on ranks, tie corrected.
    KruskalWallis,
}

impl ScoringRule {
    pub fn score(&self, values: &[f64], grouping: &Grouping) -> f64 {
        match self {
            ScoringRule::FStatistic => f_statistic(values, grouping),
            ScoringRule::RSquared => r_squared(values, grouping),
            ScoringRule::KruskalWallis => kruskal_wallis(values, grouping),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScoringRule::FStatistic => "F statistic",
            ScoringRule::RSquared => "R²",
            ScoringRule::KruskalWallis => "Kruskal-Wallis H",
        }
    }
}

/// True when the spread of `values` is within rounding of a constant.
///
/// The grand mean is inexact, so a constant balance can leave a residual
/// total sum of squares on the order of n·ε²·max(v²); anything below
/// n·ε·max(v²) is treated as no variation at all.
fn is_constant(values: &[f64], ss_total: f64) -> bool {
    let scale = values.iter().fold(0.0_f64, |m, v| m.max(v * v));
    ss_total <= values.len() as f64 * f64::EPSILON * scale
}

/// Between- and total sums of squares of `values` under `grouping`.
fn sums_of_squares(values: &[f64], grouping: &Grouping) -> (f64, f64) {
    let k = grouping.n_groups();
    let mut sums = vec![0.0; k];
    let mut sizes = vec![0usize; k];
    for (&v, &g) in values.iter().zip(grouping.labels()) {
        sums[g] += v;
        sizes[g] += 1;
    }
    let n = values.len() as f64;
    let grand_mean = values.iter().sum::<f64>() / n;
    let ss_total: f64 = values.iter().map(|v| (v - grand_mean).powi(2)).sum();
    let ss_between: f64 = sums
        .iter()
        .zip(&sizes)
        .filter(|&(_, &size)| size > 0)
        .map(|(s, &size)| size as f64 * (s / size as f64 - grand_mean).powi(2))
        .sum();
    (ss_between, ss_total)
}

/// One-way ANOVA F. A perfectly separating balance scores `f64::MAX`.
pub fn f_statistic(values: &[f64], grouping: &Grouping) -> f64 {
    let n = values.len();
    let k = grouping.n_groups();
    if k < 2 || n <= k {
        return 0.0;
    }
    let (ss_between, ss_total) = sums_of_squares(values, grouping);
    if is_constant(values, ss_total) {
        return 0.0;
    }
    let ss_within = (ss_total - ss_between).max(0.0);
    if ss_within <= f64::EPSILON * ss_total {
        return f64::MAX;
    }
    (ss_between / (k - 1) as f64) / (ss_within / (n - k) as f64)
}

pub fn r_squared(values: &[f64], grouping: &Grouping) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let (ss_between, ss_total) = sums_of_squares(values, grouping);
    if is_constant(values, ss_total) {
        return 0.0;
    }
    (ss_between / ss_total).clamp(0.0, 1.0)
}

/// Average ranks (1-based) with ties sharing their mean rank.
fn ranks(values: &[f64]) -> (Vec<f64>, f64) {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && values[order[j]] == values[order[i]] {
            j += 1;
        }
        let avg = (i + j + 1) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = avg;
        }
        let t = (j - i) as f64;
        tie_term += t * t * t - t;
        i = j;
    }
    (ranks, tie_term)
}

/// Kruskal-Wallis H statistic with the standard tie correction.
pub fn kruskal_wallis(values: &[f64], grouping: &Grouping) -> f64 {
    let n = values.len();
    if n < 2 || grouping.n_groups() < 2 {
        return 0.0;
    }
    let (ranks, tie_term) = ranks(values);
    let nf = n as f64;
    let correction = 1.0 - tie_term / (nf * nf * nf - nf);
    if correction <= 0.0 {
        return 0.0;
    }

    let k = grouping.n_groups();
    let mut rank_sums = vec![0.0; k];
    let mut sizes = vec![0usize; k];
    for (&r, &g) in ranks.iter().zip(grouping.labels()) {
        rank_sums[g] += r;
        sizes[g] += 1;
    }
    let sum: f64 = rank_sums
        .iter()
        .zip(&sizes)
        .filter(|&(_, &size)| size > 0)
        .map(|(r, &size)| r * r / size as f64)
        .sum();
    let h = 12.0 / (nf * (nf + 1.0)) * sum - 3.0 * (nf + 1.0);
    (h / correction).max(0.0)
}

/// Asymptotic chi-squared p-value of a Kruskal-Wallis H with `n_groups` groups.
pub fn kruskal_wallis_p_value(h: f64, n_groups: usize) -> f64 {
    if n_groups < 2 {
        return 1.0;
    }
    ChiSquared::new((n_groups - 1) as f64)
        .map(|dist| dist.sf(h))
        .unwrap_or(f64::NAN)
}
