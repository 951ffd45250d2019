//! Integration tests for the full compositional analysis.

use composable_coda::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io::Write;
use tempfile::NamedTempFile;

const N_TAXA: usize = 20;
const N_SAMPLES: usize = 40;

/// Synthetic counts with known group effects (taxa as rows).
///
/// - Taxa 0-2: 4x higher in "disease"
/// - Taxa 3-5: 4x lower in "disease"
/// - Taxa 6-17: no effect, occasional dropouts
/// - Taxa 18-19: rare (one sample each)
fn create_synthetic_counts() -> (Vec<Vec<u64>>, Vec<String>) {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut rows = vec![vec![0u64; N_SAMPLES]; N_TAXA];
    for (taxon, row) in rows.iter_mut().enumerate() {
        for (sample, cell) in row.iter_mut().enumerate() {
            let disease = sample % 2 == 1;
            let base = match taxon {
                0..=2 => 60.0 * if disease { 4.0 } else { 1.0 },
                3..=5 => 240.0 * if disease { 0.25 } else { 1.0 },
                6..=17 => {
                    if rng.random::<f64>() < 0.1 {
                        0.0
                    } else {
                        120.0
                    }
                }
                _ => {
                    if sample == taxon - 18 {
                        30.0
                    } else {
                        0.0
                    }
                }
            };
            let noise = 0.8 + 0.4 * rng.random::<f64>();
            *cell = (base * noise).round() as u64;
        }
    }
    let labels = (0..N_SAMPLES)
        .map(|s| if s % 2 == 1 { "disease" } else { "healthy" }.to_string())
        .collect();
    (rows, labels)
}

fn write_counts_tsv(rows: &[Vec<u64>]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "taxon_id").unwrap();
    for s in 0..N_SAMPLES {
        write!(file, "\tsample_{:02}", s).unwrap();
    }
    writeln!(file).unwrap();
    for (t, row) in rows.iter().enumerate() {
        write!(file, "taxon_{:02}", t).unwrap();
        for v in row {
            write!(file, "\t{}", v).unwrap();
        }
        writeln!(file).unwrap();
    }
    file.flush().unwrap();
    file
}

fn write_metadata_tsv(labels: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "sample_id\tdiagnosis\tage").unwrap();
    // written in reverse order: the join is by identifier
    for (s, label) in labels.iter().enumerate().rev() {
        writeln!(file, "sample_{:02}\t{}\t{}", s, label, 30 + s).unwrap();
    }
    file.flush().unwrap();
    file
}

fn load() -> (CountMatrix, Metadata) {
    let (rows, labels) = create_synthetic_counts();
    let counts_file = write_counts_tsv(&rows);
    let metadata_file = write_metadata_tsv(&labels);
    (
        CountMatrix::from_tsv(counts_file.path()).unwrap(),
        Metadata::from_tsv(metadata_file.path()).unwrap(),
    )
}

fn config() -> AnalysisConfig {
    AnalysisConfig::from_yaml(
        "outcome: diagnosis\n\
         prevalence_threshold: 0.1\n\
         rarefaction:\n  repetitions: 5\n\
         permutations: 499\n\
         seed: 2024\n\
         balance:\n  rule: f_statistic\n  max_taxa: 10\n",
    )
    .unwrap()
}

#[test]
fn test_full_analysis_recovers_signal() {
    let (counts, metadata) = load();
    let report = run_analysis(&counts, &metadata, &config()).unwrap();

    // rare taxa removed, nothing else
    assert_eq!(report.filter.n_before, N_TAXA);
    assert_eq!(report.filter.n_after, N_TAXA - 2);

    // groups separate in Aitchison geometry
    assert!(report.permanova.p_value < 0.01);
    assert!(report.permanova.r_squared > 0.2);
    let total: f64 = report.ordination.variance_explained.iter().sum();
    assert!(total <= 100.0 + 1e-9);

    // the balance contrasts enriched against depleted taxa
    let balance = &report.selection.balance;
    assert!(balance.size() <= 10);
    let numerator = balance.numerator_ids();
    let denominator = balance.denominator_ids();
    let enriched = ["taxon_00", "taxon_01", "taxon_02"];
    let depleted = ["taxon_03", "taxon_04", "taxon_05"];
    // "disease" is the reference, so healthy-enriched taxa (3-5) sit in the numerator
    assert!(numerator.iter().any(|t| depleted.contains(&t.as_str())));
    assert!(denominator.iter().any(|t| enriched.contains(&t.as_str())));
    assert!(numerator.iter().all(|t| !enriched.contains(&t.as_str())));
    assert!(report.selection.model.primary().unwrap().f_p_value < 1e-6);
}

#[test]
fn test_balance_values_and_differences() {
    let (counts, metadata) = load();
    let report = run_analysis(&counts, &metadata, &config()).unwrap();
    let selection = &report.selection;

    // every healthy sample scores above every disease sample
    let (mut healthy, mut disease) = (Vec::new(), Vec::new());
    for (sid, &v) in selection.sample_ids.iter().zip(&selection.values) {
        let idx: usize = sid.trim_start_matches("sample_").parse().unwrap();
        if idx % 2 == 1 {
            disease.push(v);
        } else {
            healthy.push(v);
        }
    }
    let min_healthy = healthy.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_disease = disease.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    assert!(min_healthy > max_disease);

    // CLR differences point the same way as the simulated effects
    let diff = &report.clr_difference[0];
    assert_eq!(diff.level, "healthy");
    for taxon in ["taxon_03", "taxon_04", "taxon_05"] {
        if selection.balance.numerator_ids().iter().any(|t| t == taxon) {
            assert!(diff.get(taxon).unwrap() > 0.0);
        }
    }
    for taxon in ["taxon_00", "taxon_01", "taxon_02"] {
        if selection.balance.denominator_ids().iter().any(|t| t == taxon) {
            assert!(diff.get(taxon).unwrap() < 0.0);
        }
    }
    let approx = &report.approximate_difference[0];
    assert_eq!(approx.values.len(), report.filter.n_after);

    // the balance column equals a fresh evaluation of the balance
    let composition = ZeroStrategy::default()
        .apply(&filter_prevalence(&counts, 0.1).unwrap())
        .unwrap();
    let fresh = balance_values(&composition, &selection.balance).unwrap();
    for (a, b) in fresh.iter().zip(&selection.values) {
        assert!((a - b).abs() < 1e-9);
    }
    match report.metadata.get("sample_00", "balance") {
        Some(Variable::Continuous(v)) => assert!((v - selection.values[0]).abs() < 1e-12),
        other => panic!("balance column missing: {:?}", other),
    }
}

#[test]
fn test_report_json_written() {
    let (counts, metadata) = load();
    let report = run_analysis(&counts, &metadata, &config()).unwrap();
    let out = NamedTempFile::new().unwrap();
    report.write_json(out.path()).unwrap();

    let text = std::fs::read_to_string(out.path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(value["permanova"]["p_value"].as_f64().unwrap() < 0.01);
    let status = value["selection"]["status"].as_str().unwrap();
    assert_ne!(status, "iteration_cap_reached");
    assert_eq!(value["diversity"]["sample_ids"].as_array().unwrap().len(), N_SAMPLES);
}

#[test]
fn test_deterministic_across_runs() {
    let (counts, metadata) = load();
    let a = run_analysis(&counts, &metadata, &config()).unwrap();
    let b = run_analysis(&counts, &metadata, &config()).unwrap();
    assert_eq!(a.permanova.p_value, b.permanova.p_value);
    assert_eq!(a.diversity.values, b.diversity.values);
    assert_eq!(a.selection.balance, b.selection.balance);
}

#[test]
fn test_stage_properties_on_synthetic_data() {
    let (counts, _) = load();
    let counts = filter_prevalence(&filter_empty(&counts).unwrap(), 0.1).unwrap();

    let composition = replace_zeros_multiplicative(&counts, 0.65).unwrap();
    let original = counts.sample_totals();
    let rescaled = composition.rescaled();
    for s in 0..composition.n_samples() {
        assert!(composition.matrix().column(s).iter().all(|&v| v > 0.0));
        let total: f64 = rescaled.column(s).sum();
        assert!((total - original[s] as f64).abs() <= 1e-9 * original[s] as f64);
    }

    let clr_matrix = clr(&composition).unwrap();
    for s in 0..clr_matrix.n_samples() {
        assert!(clr_matrix.sample(s).iter().sum::<f64>().abs() < 1e-9);
    }

    let depth = profile_coverage(&counts).rarefaction_depth();
    let rarefied = rarefy(&counts, depth, 11).unwrap();
    assert!(rarefied.sample_totals().iter().all(|&t| t == depth));
}

#[test]
fn test_mismatched_metadata_rejected() {
    let (counts, _) = load();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "sample_id\tdiagnosis").unwrap();
    for s in 0..N_SAMPLES + 1 {
        writeln!(file, "sample_{:02}\thealthy", s).unwrap();
    }
    file.flush().unwrap();
    let metadata = Metadata::from_tsv(file.path()).unwrap();

    let err = run_analysis(&counts, &metadata, &config()).unwrap_err();
    assert!(matches!(err, CodaError::SampleMismatch(_)));
    assert_eq!(err.category(), ErrorCategory::Data);
}
