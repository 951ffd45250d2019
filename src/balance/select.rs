//! Greedy stepwise search for the balance most associated with the outcome.
//!
//! # Algorithm
//!
//! 1. Score every unordered taxon pair as B1 = {i}, B2 = {j} and keep the best
//! 2. Repeatedly try adding each unassigned taxon to B1, then to B2, and
//!    commit the best candidate if it beats the current score by more than
//!    `min_improvement`
//! 3. Stop on no improvement, `max_taxa`, exhausted candidates or the
//!    iteration cap
//! 4. Orient the balance so the first non-reference level has a
//!    non-negative mean difference and fit the association model on the
//!    balance basis
//!
//! Per-sample log sums of B1 and B2 are cached in [`PartitionState`], so a
//! candidate costs O(samples) to score.

use super::contrast::{contrast_constant, Balance};
use super::score::{kruskal_wallis, kruskal_wallis_p_value, ScoringRule};
use crate::data::{CompositionMatrix, DesignMatrix, Grouping};
use crate::error::{CodaError, Result};
use crate::model::{model_lm, LinearAssociationModel};
use log::{debug, info, warn};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Relative band within which two scores count as tied.
const TIE_TOLERANCE: f64 = 1e-12;

/// Configuration for balance selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub rule: ScoringRule,
    /// Minimum score gain required to commit a step.
    pub min_improvement: f64,
    /// Upper bound on |B1| + |B2|.
    pub max_taxa: Option<usize>,
    /// Upper bound on growth steps after the initial pair.
    pub max_iterations: usize,
    /// Accept a search stopped by the iteration cap instead of failing.
    pub accept_partial: bool,
    /// Score candidates on the rayon pool; set by the caller, not by config files.
    #[serde(skip)]
    pub parallel: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            rule: ScoringRule::FStatistic,
            min_improvement: 1e-3,
            max_taxa: None,
            max_iterations: 100,
            accept_partial: false,
            parallel: true,
        }
    }
}

impl SelectionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_improvement >= 0.0 && self.min_improvement.is_finite()) {
            return Err(CodaError::InvalidParameter(format!(
                "min_improvement must be a non-negative number, got {}",
                self.min_improvement
            )));
        }
        if let Some(max_taxa) = self.max_taxa {
            if max_taxa < 2 {
                return Err(CodaError::InvalidParameter(format!(
                    "max_taxa must be at least 2, got {}",
                    max_taxa
                )));
            }
        }
        Ok(())
    }
}

/// Which set a candidate taxon joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Numerator,
    Denominator,
}

/// A proposed single-taxon extension of the current partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub taxon: usize,
    pub side: Side,
}

/// Current B1/B2 with cached per-sample log sums.
#[derive(Debug, Clone)]
pub struct PartitionState<'a> {
    log_values: &'a DMatrix<f64>,
    numerator: Vec<usize>,
    denominator: Vec<usize>,
    numerator_sums: Vec<f64>,
    denominator_sums: Vec<f64>,
    assigned: Vec<bool>,
}

impl<'a> PartitionState<'a> {
    /// Start from B1 = {i}, B2 = {j}; `log_values` is taxa × samples.
    pub fn pair(log_values: &'a DMatrix<f64>, i: usize, j: usize) -> Self {
        let mut assigned = vec![false; log_values.nrows()];
        assigned[i] = true;
        assigned[j] = true;
        Self {
            log_values,
            numerator: vec![i],
            denominator: vec![j],
            numerator_sums: log_values.row(i).iter().copied().collect(),
            denominator_sums: log_values.row(j).iter().copied().collect(),
            assigned,
        }
    }

    pub fn size(&self) -> usize {
        self.numerator.len() + self.denominator.len()
    }

    pub fn is_assigned(&self, taxon: usize) -> bool {
        self.assigned[taxon]
    }

    /// Unassigned taxa in taxon order, each offered to B1 then B2.
    pub fn candidates(&self) -> Vec<Candidate> {
        (0..self.assigned.len())
            .filter(|&t| !self.assigned[t])
            .flat_map(|taxon| {
                [
                    Candidate { taxon, side: Side::Numerator },
                    Candidate { taxon, side: Side::Denominator },
                ]
            })
            .collect()
    }

    /// Balance values of the current partition.
    pub fn values(&self) -> Vec<f64> {
        balance_from_sums(
            &self.numerator_sums,
            self.numerator.len(),
            &self.denominator_sums,
            self.denominator.len(),
        )
    }

    /// Balance values if `candidate` were committed; the state is unchanged.
    pub fn candidate_values(&self, candidate: Candidate) -> Vec<f64> {
        let row = self.log_values.row(candidate.taxon);
        let r = self.numerator.len();
        let s = self.denominator.len();
        match candidate.side {
            Side::Numerator => {
                let num: Vec<f64> = self.numerator_sums.iter().zip(row.iter()).map(|(a, b)| a + b).collect();
                balance_from_sums(&num, r + 1, &self.denominator_sums, s)
            }
            Side::Denominator => {
                let den: Vec<f64> = self.denominator_sums.iter().zip(row.iter()).map(|(a, b)| a + b).collect();
                balance_from_sums(&self.numerator_sums, r, &den, s + 1)
            }
        }
    }

    pub fn commit(&mut self, candidate: Candidate) {
        let row = self.log_values.row(candidate.taxon);
        let (set, sums) = match candidate.side {
            Side::Numerator => (&mut self.numerator, &mut self.numerator_sums),
            Side::Denominator => (&mut self.denominator, &mut self.denominator_sums),
        };
        set.push(candidate.taxon);
        for (sum, v) in sums.iter_mut().zip(row.iter()) {
            *sum += v;
        }
        self.assigned[candidate.taxon] = true;
    }

    fn into_balance(self, taxon_ids: Vec<String>) -> Result<Balance> {
        Balance::new(self.numerator, self.denominator, taxon_ids)
    }
}

fn balance_from_sums(num: &[f64], r: usize, den: &[f64], s: usize) -> Vec<f64> {
    let c = contrast_constant(r, s);
    let (r, s) = (r as f64, s as f64);
    num.iter().zip(den).map(|(a, b)| c * (a / r - b / s)).collect()
}

/// Score of `candidate` against the current state; a pure function of its inputs.
pub fn score_candidate(
    state: &PartitionState<'_>,
    candidate: Candidate,
    grouping: &Grouping,
    rule: ScoringRule,
) -> f64 {
    rule.score(&state.candidate_values(candidate), grouping)
}

/// Index of the best score; ties within the relative band keep the earliest.
fn best_index(scores: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            None => best = Some(i),
            Some(b) => {
                let current = scores[b];
                if score - current > TIE_TOLERANCE * current.abs().max(f64::MIN_POSITIVE) {
                    best = Some(i);
                }
            }
        }
    }
    best
}

fn score_all<T, F>(items: &[T], parallel: bool, score: F) -> Vec<f64>
where
    T: Sync,
    F: Fn(&T) -> f64 + Sync + Send,
{
    if parallel {
        items.par_iter().map(&score).collect()
    } else {
        items.iter().map(&score).collect()
    }
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStatus {
    /// No candidate improved the score enough.
    NoImprovement,
    MaxTaxaReached,
    CandidatesExhausted,
    /// `max_iterations` reached while an improving move still existed.
    IterationCapReached,
}

impl SelectionStatus {
    pub fn is_converged(&self) -> bool {
        !matches!(self, SelectionStatus::IterationCapReached)
    }
}

/// One committed step of the search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionStep {
    pub taxon_id: String,
    pub side: Side,
    pub score: f64,
}

/// Outcome of balance selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSelection {
    pub balance: Balance,
    pub rule: ScoringRule,
    /// Score of the final balance.
    pub score: f64,
    pub status: SelectionStatus,
    /// Growth steps taken after the initial pair.
    pub iterations: usize,
    /// Initial pair followed by each committed extension, before orientation.
    pub steps: Vec<SelectionStep>,
    pub sample_ids: Vec<String>,
    /// Oriented balance value per sample.
    pub values: Vec<f64>,
    /// Kruskal-Wallis H and p-value of the final balance.
    pub kruskal_wallis: f64,
    pub kruskal_wallis_p_value: f64,
    pub model: LinearAssociationModel,
}

impl BalanceSelection {
    pub fn is_converged(&self) -> bool {
        self.status.is_converged()
    }

    /// Fail with `NonConvergence` if the search was stopped by the iteration cap.
    pub fn into_converged(self) -> Result<Self> {
        if self.is_converged() {
            Ok(self)
        } else {
            Err(CodaError::NonConvergence {
                iterations: self.iterations,
            })
        }
    }
}

impl std::fmt::Display for BalanceSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Balance selection ({})", self.rule.name())?;
        writeln!(f, "  Balance:    {}", self.balance)?;
        writeln!(f, "  Score:      {:.4}", self.score)?;
        writeln!(f, "  Status:     {:?} after {} iterations", self.status, self.iterations)?;
        if let Some(primary) = self.model.primary() {
            writeln!(f, "  Model R²:   {:.4} (F p = {:.4e})", primary.r_squared, primary.f_p_value)?;
        }
        Ok(())
    }
}

/// Discover the balance of `composition` most associated with `grouping`.
///
/// `outcome` names the design columns of the fitted model.
///
/// # Errors
/// * `SampleMismatch` if the grouping is not aligned with the composition
/// * `InvalidParameter` for fewer than 2 taxa or 2 outcome levels
/// * `EmptyBalanceSets` if no pair beats the null score
pub fn select_balance(
    composition: &CompositionMatrix,
    grouping: &Grouping,
    outcome: &str,
    config: &SelectionConfig,
) -> Result<BalanceSelection> {
    config.validate()?;
    grouping.check_aligned(composition.sample_ids())?;
    let n_taxa = composition.n_taxa();
    if n_taxa < 2 {
        return Err(CodaError::InvalidParameter(format!(
            "balance selection needs at least 2 taxa, found {}",
            n_taxa
        )));
    }
    if grouping.n_groups() < 2 {
        return Err(CodaError::InvalidParameter(format!(
            "balance selection needs at least 2 outcome levels, found {}",
            grouping.n_groups()
        )));
    }

    let log_values = composition.log_values();
    let rule = config.rule;

    // Initial pair
    let pairs: Vec<(usize, usize)> = (0..n_taxa)
        .flat_map(|i| ((i + 1)..n_taxa).map(move |j| (i, j)))
        .collect();
    let pair_scores = score_all(&pairs, config.parallel, |&(i, j)| {
        rule.score(&PartitionState::pair(&log_values, i, j).values(), grouping)
    });
    let best_pair = best_index(&pair_scores).map(|b| (pairs[b], pair_scores[b]));
    let ((i, j), mut score) = match best_pair {
        Some(found) if found.1 > config.min_improvement => found,
        other => {
            return Err(CodaError::EmptyBalanceSets {
                best_score: other.map(|(_, s)| s).unwrap_or(0.0),
            })
        }
    };
    debug!(
        "Initial pair {} / {} scores {}",
        composition.taxon_ids()[i],
        composition.taxon_ids()[j],
        score
    );

    let mut state = PartitionState::pair(&log_values, i, j);
    let mut steps = vec![
        SelectionStep {
            taxon_id: composition.taxon_ids()[i].clone(),
            side: Side::Numerator,
            score,
        },
        SelectionStep {
            taxon_id: composition.taxon_ids()[j].clone(),
            side: Side::Denominator,
            score,
        },
    ];

    // Growth
    let mut iterations = 0;
    let status = loop {
        if config.max_taxa.is_some_and(|m| state.size() >= m) {
            break SelectionStatus::MaxTaxaReached;
        }
        let candidates = state.candidates();
        if candidates.is_empty() {
            break SelectionStatus::CandidatesExhausted;
        }
        let scores = score_all(&candidates, config.parallel, |&c| {
            score_candidate(&state, c, grouping, rule)
        });
        let best = match best_index(&scores) {
            Some(b) if scores[b] - score > config.min_improvement => b,
            _ => break SelectionStatus::NoImprovement,
        };
        if iterations >= config.max_iterations {
            break SelectionStatus::IterationCapReached;
        }

        let chosen = candidates[best];
        state.commit(chosen);
        score = scores[best];
        iterations += 1;
        debug!(
            "Step {}: {} joins {:?}, score {}",
            iterations,
            composition.taxon_ids()[chosen.taxon],
            chosen.side,
            score
        );
        steps.push(SelectionStep {
            taxon_id: composition.taxon_ids()[chosen.taxon].clone(),
            side: chosen.side,
            score,
        });
    };

    if status == SelectionStatus::IterationCapReached {
        warn!(
            "Balance search stopped at the iteration cap ({}) with improving moves left",
            config.max_iterations
        );
    }

    let balance = state.into_balance(composition.taxon_ids().to_vec())?;
    let (balance, values) = orient(balance, &log_values, grouping);
    let model = fit_association_model(&balance, &log_values, grouping, outcome)?;
    let kw = kruskal_wallis(&values, grouping);

    info!(
        "Selected balance {} ({} taxa, {} = {:.4}, {:?})",
        balance,
        balance.size(),
        rule.name(),
        score,
        status
    );

    Ok(BalanceSelection {
        balance,
        rule,
        score,
        status,
        iterations,
        steps,
        sample_ids: composition.sample_ids().to_vec(),
        values,
        kruskal_wallis: kw,
        kruskal_wallis_p_value: kruskal_wallis_p_value(kw, grouping.n_groups()),
        model,
    })
}

fn sample_values(balance: &Balance, log_values: &DMatrix<f64>) -> Vec<f64> {
    (0..log_values.ncols())
        .map(|s| {
            let column: Vec<f64> = log_values.column(s).iter().copied().collect();
            balance.value_from_logs(&column)
        })
        .collect()
}

/// Flip the balance if the first non-reference level has a lower mean than
/// the reference.
fn orient(balance: Balance, log_values: &DMatrix<f64>, grouping: &Grouping) -> (Balance, Vec<f64>) {
    let values = sample_values(&balance, log_values);
    let mean_of = |level: usize| {
        let (sum, count) = values
            .iter()
            .zip(grouping.labels())
            .filter(|&(_, &l)| l == level)
            .fold((0.0, 0usize), |(s, c), (v, _)| (s + v, c + 1));
        if count > 0 {
            sum / count as f64
        } else {
            0.0
        }
    };
    if mean_of(1) < mean_of(0) {
        let flipped = balance.flipped();
        let values = values.iter().map(|v| -v).collect();
        (flipped, values)
    } else {
        (balance, values)
    }
}

/// Regress every basis coordinate of the balance on the outcome design.
pub fn fit_association_model(
    balance: &Balance,
    log_values: &DMatrix<f64>,
    grouping: &Grouping,
    outcome: &str,
) -> Result<LinearAssociationModel> {
    let basis = balance.basis();
    // Basis columns are contrasts, so projecting raw logs equals projecting CLR.
    let response = basis.transpose() * log_values;
    let design = DesignMatrix::from_grouping(grouping, outcome)?;
    model_lm(&response, &balance.basis_labels(), &design)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Multiplicative log-scale noise per taxon and sample.
    const NOISE: [[f64; 12]; 5] = [
        [-0.11, 0.10, 0.08, -0.07, 0.00, -0.02, 0.05, 0.09, -0.12, -0.14, 0.10, -0.02],
        [0.08, -0.15, -0.02, 0.07, -0.08, 0.13, 0.12, -0.14, -0.14, 0.01, 0.13, -0.04],
        [-0.09, -0.02, -0.14, -0.08, -0.02, 0.00, -0.08, -0.08, -0.08, -0.01, -0.06, -0.14],
        [0.10, 0.02, 0.04, -0.09, 0.15, 0.11, -0.11, -0.05, 0.07, 0.06, 0.13, -0.02],
        [0.10, 0.05, -0.06, 0.03, 0.11, 0.10, 0.00, 0.03, -0.14, -0.08, 0.09, -0.03],
    ];

    /// 5 taxa × 12 samples. t0 is enriched and t3 depleted in "case"
    /// (six-fold each way); t1, t2 and t4 only carry noise.
    fn create_test_data() -> (CompositionMatrix, Grouping) {
        let n = 12;
        let mut values = DMatrix::zeros(5, n);
        for s in 0..n {
            let case = s >= n / 2;
            let base = [
                if case { 0.30 } else { 0.05 },
                0.20,
                0.15,
                if case { 0.05 } else { 0.30 },
                0.10,
            ];
            for t in 0..5 {
                values[(t, s)] = base[t] * f64::exp(NOISE[t][s]);
            }
        }
        let sample_ids: Vec<String> = (0..n).map(|s| format!("S{}", s)).collect();
        let composition = CompositionMatrix::from_positive(
            values,
            (0..5).map(|t| format!("t{}", t)).collect(),
            sample_ids.clone(),
        )
        .unwrap();
        let labels: Vec<&str> = (0..n).map(|s| if s >= n / 2 { "case" } else { "control" }).collect();
        (composition, Grouping::new(sample_ids, &labels).unwrap())
    }

    #[test]
    fn test_finds_signal_pair() {
        let (comp, groups) = create_test_data();
        let sel = select_balance(&comp, &groups, "status", &SelectionConfig::default()).unwrap();

        let partition = sel.balance.partition();
        assert_ne!(partition[0], 0);
        assert_ne!(partition[3], 0);
        assert_eq!(partition[0], -partition[3]);
        // the search starts from the signal pair
        assert_eq!(sel.steps[0].taxon_id, "t0");
        assert_eq!(sel.steps[1].taxon_id, "t3");
        assert!(sel.score.is_finite() && sel.score < f64::MAX);
        assert!(sel.is_converged());
        assert!(sel.kruskal_wallis_p_value < 0.01);
    }

    #[test]
    fn test_orientation_non_reference_positive() {
        let (comp, groups) = create_test_data();
        let sel = select_balance(&comp, &groups, "status", &SelectionConfig::default()).unwrap();

        // levels are sorted: "case" is the reference, "control" the first contrast
        assert_eq!(sel.model.reference_level(), "case");
        let coef = sel.model.coefficients_for_level("control").unwrap();
        assert!(coef[0] >= 0.0);
        // control is richer in t3, so t3 must sit in the numerator
        assert_eq!(sel.balance.partition()[3], 1);
    }

    #[test]
    fn test_values_match_balance() {
        let (comp, groups) = create_test_data();
        let sel = select_balance(&comp, &groups, "status", &SelectionConfig::default()).unwrap();
        for s in 0..comp.n_samples() {
            assert_relative_eq!(sel.values[s], sel.balance.value(&comp.sample(s)), epsilon = 1e-10);
        }
        assert_eq!(sel.model.n_axes(), sel.balance.size() - 1);
    }

    #[test]
    fn test_cached_sums_match_direct() {
        let (comp, _) = create_test_data();
        let logs = comp.log_values();
        let mut state = PartitionState::pair(&logs, 0, 3);
        let cand = Candidate { taxon: 2, side: Side::Denominator };
        let predicted = state.candidate_values(cand);
        state.commit(cand);
        let direct = Balance::new(vec![0], vec![2, 3], comp.taxon_ids().to_vec()).unwrap();
        for s in 0..comp.n_samples() {
            assert_relative_eq!(predicted[s], direct.value(&comp.sample(s)), epsilon = 1e-12);
            assert_relative_eq!(state.values()[s], predicted[s], epsilon = 1e-12);
        }
        assert!(state.is_assigned(2));
        assert_eq!(state.candidates().len(), 4);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (comp, groups) = create_test_data();
        let mut config = SelectionConfig {
            rule: ScoringRule::RSquared,
            min_improvement: 0.0,
            ..Default::default()
        };
        let par = select_balance(&comp, &groups, "status", &config).unwrap();
        config.parallel = false;
        let seq = select_balance(&comp, &groups, "status", &config).unwrap();
        assert_eq!(par.balance, seq.balance);
        assert_eq!(par.score, seq.score);
    }

    #[test]
    fn test_max_taxa_respected() {
        let (comp, groups) = create_test_data();
        let config = SelectionConfig {
            rule: ScoringRule::RSquared,
            min_improvement: 0.0,
            max_taxa: Some(2),
            ..Default::default()
        };
        let sel = select_balance(&comp, &groups, "status", &config).unwrap();
        assert_eq!(sel.balance.size(), 2);
        assert_eq!(sel.status, SelectionStatus::MaxTaxaReached);
    }

    #[test]
    fn test_iteration_cap() {
        // Every extra taxon carries more signal, so improving moves never run out.
        let n = 10;
        let mut values = DMatrix::zeros(6, n);
        for s in 0..n {
            let shift = if s >= n / 2 { 1.0 } else { 0.0 };
            for t in 0..6 {
                let noise = ((s * (t + 3) % 7) as f64 - 3.0) * 0.1;
                let effect = if t % 2 == 0 { shift } else { -shift };
                values[(t, s)] = (effect + noise).exp();
            }
        }
        let ids: Vec<String> = (0..n).map(|s| format!("S{}", s)).collect();
        let comp = CompositionMatrix::from_positive(
            values,
            (0..6).map(|t| format!("t{}", t)).collect(),
            ids.clone(),
        )
        .unwrap();
        let labels: Vec<&str> = (0..n).map(|s| if s >= n / 2 { "b" } else { "a" }).collect();
        let groups = Grouping::new(ids, &labels).unwrap();

        let config = SelectionConfig {
            rule: ScoringRule::RSquared,
            min_improvement: 0.0,
            max_iterations: 0,
            ..Default::default()
        };
        let sel = select_balance(&comp, &groups, "group", &config).unwrap();
        assert_eq!(sel.status, SelectionStatus::IterationCapReached);
        assert_eq!(sel.balance.size(), 2);
        assert!(matches!(
            sel.into_converged(),
            Err(CodaError::NonConvergence { iterations: 0 })
        ));
    }

    #[test]
    fn test_no_signal_fails() {
        // All samples share one composition.
        let values = DMatrix::from_fn(3, 6, |t, _| [0.2, 0.3, 0.5][t]);
        let ids: Vec<String> = (0..6).map(|s| format!("S{}", s)).collect();
        let comp = CompositionMatrix::from_positive(
            values,
            vec!["a".into(), "b".into(), "c".into()],
            ids.clone(),
        )
        .unwrap();
        let groups = Grouping::new(ids, &["x", "y", "x", "y", "x", "y"]).unwrap();
        for rule in [ScoringRule::FStatistic, ScoringRule::RSquared] {
            let config = SelectionConfig {
                rule,
                ..Default::default()
            };
            assert!(matches!(
                select_balance(&comp, &groups, "g", &config),
                Err(CodaError::EmptyBalanceSets { best_score }) if best_score == 0.0
            ));
        }
    }

    #[test]
    fn test_best_index_prefers_earliest_tie() {
        assert_eq!(best_index(&[1.0, 3.0, 3.0 * (1.0 + 1e-14), 2.0]), Some(1));
        assert_eq!(best_index(&[1.0, 3.0, 3.5]), Some(2));
        assert_eq!(best_index(&[]), None);
    }

    #[test]
    fn test_config_validation() {
        let bad = SelectionConfig {
            max_taxa: Some(1),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let negative = SelectionConfig {
            min_improvement: -1.0,
            ..Default::default()
        };
        assert!(negative.validate().is_err());
    }
}
