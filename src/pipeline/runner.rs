//! End-to-end analysis: filtering, diversity, ordination, PERMANOVA and balance discovery.

use super::config::AnalysisConfig;
use crate::balance::{
    approximate_difference, clr_difference, select_balance, BalanceSelection, TaxonContributions,
};
use crate::beta::{aitchison_distance, pcoa, Ordination};
use crate::data::{CountMatrix, Grouping, Metadata, VariableType};
use crate::diversity::{rarefied_diversity, AlphaDiversity, RarefactionConfig};
use crate::error::{CodaError, Result};
use crate::filter::{filter_empty, filter_prevalence_with_stats, FilterResult};
use crate::normalize::clr;
use crate::profile::{profile_coverage, CoverageProfile};
use crate::test::{permanova, PermanovaConfig, PermanovaResult};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Metadata column holding reads per sample.
pub const COVERAGE_COLUMN: &str = "coverage";
/// Metadata column holding rarefied alpha diversity.
pub const DIVERSITY_COLUMN: &str = "diversity";
/// Metadata column holding the selected balance value.
pub const BALANCE_COLUMN: &str = "balance";

/// Everything [`run_analysis`] produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub outcome: String,
    /// Taxon prevalence filtering.
    pub filter: FilterResult,
    /// Samples removed because they had no reads (before or after filtering).
    pub dropped_samples: Vec<String>,
    pub coverage: CoverageProfile,
    pub diversity: AlphaDiversity,
    pub ordination: Ordination,
    pub permanova: PermanovaResult,
    pub selection: BalanceSelection,
    /// Per-taxon CLR mean difference, one entry per non-reference level.
    pub clr_difference: Vec<TaxonContributions>,
    /// The same differences projected onto the balance direction.
    pub approximate_difference: Vec<TaxonContributions>,
    /// Input metadata restricted to analysed samples, plus derived columns.
    pub metadata: Metadata,
}

impl AnalysisReport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(CodaError::from)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl std::fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Analysis of '{}'", self.outcome)?;
        write!(f, "{}", self.filter)?;
        if !self.dropped_samples.is_empty() {
            writeln!(f, "  Dropped samples: {}", self.dropped_samples.join(", "))?;
        }
        writeln!(
            f,
            "Alpha diversity: {} at depth {} ({} repetitions)",
            self.diversity.index.name(),
            self.diversity.depth,
            self.diversity.repetitions
        )?;
        let leading: Vec<String> = self
            .ordination
            .variance_explained
            .iter()
            .take(2)
            .map(|v| format!("{:.1}%", v))
            .collect();
        writeln!(f, "PCoA: {} axes, leading {}", self.ordination.n_axes(), leading.join(", "))?;
        write!(f, "{}", self.permanova)?;
        write!(f, "{}", self.selection)?;
        Ok(())
    }
}

/// Run the full analysis.
///
/// Metadata is joined to counts strictly by sample identifier; any sample
/// present in only one of them is an error. Stages run in order:
/// empty filtering, prevalence filtering, coverage profiling, rarefied alpha
/// diversity (on all taxa of the analysed samples), zero replacement, CLR,
/// Aitchison distance, PCoA, PERMANOVA, balance selection and evaluation.
pub fn run_analysis(
    counts: &CountMatrix,
    metadata: &Metadata,
    config: &AnalysisConfig,
) -> Result<AnalysisReport> {
    config.validate()?;
    let aligned = metadata.align_to(counts.sample_ids())?;
    if !aligned.has_column(&config.outcome) {
        return Err(CodaError::MissingColumn(config.outcome.clone()));
    }
    // Numeric codes such as 0/1 are group labels.
    let aligned = aligned.with_column_types(HashMap::from([(
        config.outcome.clone(),
        VariableType::Categorical,
    )]));
    info!(
        "Starting analysis of '{}' on {} taxa × {} samples",
        config.outcome,
        counts.n_taxa(),
        counts.n_samples()
    );

    // Filtering
    let nonempty = filter_empty(counts)?;
    let (prevalent, filter) = filter_prevalence_with_stats(&nonempty, config.prevalence_threshold)?;
    info!(
        "Prevalence filter kept {} of {} taxa",
        filter.n_after, filter.n_before
    );
    let analysed = filter_empty(&prevalent)?;
    let dropped_samples: Vec<String> = counts
        .sample_ids()
        .iter()
        .filter(|sid| analysed.sample_index(sid).is_none())
        .cloned()
        .collect();
    if !dropped_samples.is_empty() {
        warn!("Dropped {} samples without reads: {:?}", dropped_samples.len(), dropped_samples);
    }
    let sample_ids = analysed.sample_ids().to_vec();
    let metadata = aligned.subset_samples(&sample_ids)?;

    // Alpha diversity on every taxon of the analysed samples
    let indices: Vec<usize> = sample_ids
        .iter()
        .filter_map(|sid| nonempty.sample_index(sid))
        .collect();
    let full_counts = nonempty.subset_samples(&indices)?;
    let coverage = profile_coverage(&full_counts);
    if coverage.is_highly_variable() {
        warn!(
            "Sequencing depth varies widely (CV {:.2}); rarefying to {} reads",
            coverage.cv, coverage.min
        );
    }
    let depth = config
        .rarefaction
        .depth
        .unwrap_or_else(|| coverage.rarefaction_depth());
    let shallow = coverage.samples_below(depth);
    if !shallow.is_empty() {
        warn!("{} samples fall below rarefaction depth {}: {:?}", shallow.len(), depth, shallow);
    }
    let rarefaction = RarefactionConfig {
        depth,
        repetitions: config.rarefaction.repetitions,
        seed: config.seed,
        index: config.rarefaction.index,
        parallel: config.parallel,
    };
    let diversity = rarefied_diversity(&full_counts, &rarefaction)?;

    // Aitchison geometry
    let composition = config.zero_strategy.apply(&analysed)?;
    let clr_matrix = clr(&composition)?;
    let distance = aitchison_distance(&clr_matrix);
    let ordination = pcoa(&distance)?;

    // Group separation
    let grouping = Grouping::from_metadata(&metadata, &config.outcome, &sample_ids)?;
    let permanova_config = PermanovaConfig {
        n_permutations: config.permutations,
        seed: config.seed,
        parallel: config.parallel,
    };
    let permanova_result = permanova(&distance, &grouping, &permanova_config)?;

    // Balance discovery
    let mut selection_config = config.balance.clone();
    selection_config.parallel = config.parallel;
    let selection = select_balance(&composition, &grouping, &config.outcome, &selection_config)?;
    let selection = if selection.is_converged() || !selection_config.accept_partial {
        selection.into_converged()?
    } else {
        warn!(
            "Accepting partial balance after {} iterations",
            selection.iterations
        );
        selection
    };

    let mut clr_differences = Vec::new();
    let mut approximate_differences = Vec::new();
    for level in grouping.levels().iter().skip(1) {
        clr_differences.push(clr_difference(&selection.model, &selection.balance, level)?);
        approximate_differences.push(approximate_difference(
            &selection.model,
            &selection.balance,
            level,
        )?);
    }

    let metadata = metadata
        .with_numeric_column(COVERAGE_COLUMN, &coverage.sample_ids, &coverage.as_column())?
        .with_numeric_column(DIVERSITY_COLUMN, &diversity.sample_ids, &diversity.values)?
        .with_numeric_column(BALANCE_COLUMN, &selection.sample_ids, &selection.values)?;

    info!("Analysis complete: {} samples, balance {}", sample_ids.len(), selection.balance);

    Ok(AnalysisReport {
        outcome: config.outcome.clone(),
        filter,
        dropped_samples,
        coverage,
        diversity,
        ordination,
        permanova: permanova_result,
        selection,
        clr_difference: clr_differences,
        approximate_difference: approximate_differences,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Variable;
    use crate::error::ErrorCategory;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// 6 taxa × 12 samples; t0 enriched and t1 depleted in "case"; t5 is rare.
    fn create_test_data() -> (CountMatrix, Metadata) {
        let mut rows = Vec::new();
        let mut records = Vec::new();
        for s in 0..12 {
            let case = s >= 6;
            let jitter = (s * 13 % 7) as u64;
            rows.push(vec![
                if case { 300 + 10 * jitter } else { 40 + jitter },
                if case { 40 + jitter } else { 300 + 5 * jitter },
                150 + 3 * jitter,
                if s % 3 == 0 { 0 } else { 80 + jitter },
                60 + 2 * jitter,
                if s == 4 { 3 } else { 0 },
            ]);
            records.push((format!("S{:02}", s), if case { "case" } else { "control" }));
        }
        let sample_ids: Vec<String> = records.iter().map(|(id, _)| id.clone()).collect();
        let counts = CountMatrix::from_sample_rows(
            &rows,
            (0..6).map(|t| format!("t{}", t)).collect(),
            sample_ids,
        )
        .unwrap();
        let pairs: Vec<(&str, &str)> = records.iter().map(|(id, l)| (id.as_str(), *l)).collect();
        (counts, Metadata::from_categorical("status", &pairs).unwrap())
    }

    fn quick_config() -> AnalysisConfig {
        AnalysisConfig {
            outcome: "status".into(),
            prevalence_threshold: 0.2,
            permutations: 199,
            ..Default::default()
        }
    }

    #[test]
    fn test_run_analysis() {
        let (counts, metadata) = create_test_data();
        let report = run_analysis(&counts, &metadata, &quick_config()).unwrap();

        // the rare taxon is filtered
        assert_eq!(report.filter.n_before, 6);
        assert_eq!(report.filter.n_after, 5);
        assert!(report.dropped_samples.is_empty());

        assert_eq!(report.diversity.depth, report.coverage.min);
        assert!(report.permanova.p_value < 0.05);

        let partition = report.selection.balance.partition();
        assert_ne!(partition[0], 0);
        assert_eq!(partition[0], -partition[1]);
        assert_eq!(report.clr_difference.len(), 1);
        assert_eq!(report.clr_difference[0].level, "control");
    }

    #[test]
    fn test_metadata_augmented() {
        let (counts, metadata) = create_test_data();
        let report = run_analysis(&counts, &metadata, &quick_config()).unwrap();

        for column in [COVERAGE_COLUMN, DIVERSITY_COLUMN, BALANCE_COLUMN] {
            assert!(report.metadata.has_column(column));
        }
        match report.metadata.get("S00", COVERAGE_COLUMN) {
            Some(Variable::Continuous(v)) => assert_eq!(*v, counts.sample_totals()[0] as f64),
            other => panic!("unexpected coverage value {:?}", other),
        }
        assert!(report.to_json().unwrap().contains("\"permanova\""));
    }

    #[test]
    fn test_reproducible() {
        let (counts, metadata) = create_test_data();
        let a = run_analysis(&counts, &metadata, &quick_config()).unwrap();
        let mut sequential = quick_config();
        sequential.parallel = false;
        let b = run_analysis(&counts, &metadata, &sequential).unwrap();
        assert_eq!(a.permanova.p_value, b.permanova.p_value);
        assert_eq!(a.diversity.values, b.diversity.values);
        assert_eq!(a.selection.balance, b.selection.balance);
    }

    #[test]
    fn test_metadata_mismatch_fails() {
        let (counts, _) = create_test_data();
        let short = Metadata::from_categorical("status", &[("S00", "case"), ("S01", "control")]).unwrap();
        let err = run_analysis(&counts, &short, &quick_config()).unwrap_err();
        assert!(matches!(err, CodaError::SampleMismatch(_)));
        assert_eq!(err.category(), ErrorCategory::Data);
    }

    #[test]
    fn test_missing_outcome_and_bad_depth() {
        let (counts, metadata) = create_test_data();
        let missing = AnalysisConfig {
            outcome: "diagnosis".into(),
            ..quick_config()
        };
        assert!(matches!(
            run_analysis(&counts, &metadata, &missing),
            Err(CodaError::MissingColumn(_))
        ));

        let mut too_deep = quick_config();
        too_deep.rarefaction.depth = Some(1_000_000);
        assert!(matches!(
            run_analysis(&counts, &metadata, &too_deep),
            Err(CodaError::RowSumTooLow { .. })
        ));
    }

    #[test]
    fn test_numeric_outcome_codes_are_groups() {
        let (counts, _) = create_test_data();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id\tstatus").unwrap();
        for s in 0..12 {
            writeln!(file, "S{:02}\t{}", s, if s >= 6 { 1 } else { 0 }).unwrap();
        }
        file.flush().unwrap();
        let metadata = Metadata::from_tsv(file.path()).unwrap();
        assert_eq!(metadata.column_type("status"), Some(VariableType::Continuous));

        let report = run_analysis(&counts, &metadata, &quick_config()).unwrap();
        assert_eq!(report.permanova.n_groups, 2);
        assert!(report.permanova.p_value < 0.05);
        assert_eq!(report.clr_difference[0].level, "1");
    }
}
