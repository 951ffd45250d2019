//! coda - compositional diversity analysis and balance discovery CLI.

use clap::{Parser, Subcommand};
use composable_coda::data::{CountMatrix, Metadata};
use composable_coda::diversity::{rarefied_diversity, DiversityIndex, RarefactionConfig};
use composable_coda::error::Result;
use composable_coda::pipeline::{run_analysis, AnalysisConfig};
use composable_coda::profile::profile_coverage;
use log::{info, warn};
use std::path::PathBuf;

/// Compositional microbiome analysis
#[derive(Parser)]
#[command(name = "coda")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Worker threads for parallel stages (default: all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis from a YAML configuration file
    Run {
        /// Path to analysis configuration YAML
        #[arg(long)]
        config: PathBuf,

        /// Path to count matrix TSV (taxa as rows)
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Path to metadata TSV
        #[arg(short, long)]
        metadata: PathBuf,

        /// Output path for the JSON report
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Rarefied alpha diversity per sample, as TSV on stdout
    Diversity {
        /// Path to count matrix TSV (taxa as rows)
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Reads per sample (default: smallest sample total)
        #[arg(short, long)]
        depth: Option<u64>,

        /// Subsamplings averaged per sample
        #[arg(short, long, default_value = "10")]
        repetitions: usize,

        /// Random seed
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Diversity index: shannon, simpson or observed
        #[arg(short, long, default_value = "shannon")]
        index: String,
    },

    /// Write a default configuration file
    Example {
        /// Output path for the YAML configuration
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Some(threads) = cli.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            warn!("Could not configure {} threads: {}", threads, e);
        }
    }

    let result = match cli.command {
        Commands::Run {
            config,
            counts,
            metadata,
            output,
        } => cmd_run(&config, &counts, &metadata, &output),

        Commands::Diversity {
            counts,
            depth,
            repetitions,
            seed,
            index,
        } => cmd_diversity(&counts, depth, repetitions, seed, &index),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error ({:?}): {}", e.category(), e);
        std::process::exit(1);
    }
}

/// Run the analysis from configuration
fn cmd_run(
    config_path: &PathBuf,
    counts_path: &PathBuf,
    metadata_path: &PathBuf,
    output_path: &PathBuf,
) -> Result<()> {
    info!("Loading configuration from {:?}", config_path);
    let config = AnalysisConfig::from_file(config_path)?;
    config.validate()?;

    let counts = CountMatrix::from_tsv(counts_path)?;
    let metadata = Metadata::from_tsv(metadata_path)?;
    info!(
        "Loaded {} taxa x {} samples",
        counts.n_taxa(),
        counts.n_samples()
    );

    let report = run_analysis(&counts, &metadata, &config)?;
    report.write_json(output_path)?;
    info!("Report written to {:?}", output_path);

    eprintln!("{}", report);
    Ok(())
}

/// Print rarefied alpha diversity
fn cmd_diversity(
    counts_path: &PathBuf,
    depth: Option<u64>,
    repetitions: usize,
    seed: u64,
    index: &str,
) -> Result<()> {
    let index: DiversityIndex = serde_yaml::from_str(index)?;
    let counts = CountMatrix::from_tsv(counts_path)?;
    let depth = depth.unwrap_or_else(|| profile_coverage(&counts).rarefaction_depth());
    info!(
        "Rarefying {} samples to {} reads ({} repetitions)",
        counts.n_samples(),
        depth,
        repetitions
    );

    let config = RarefactionConfig::new(depth, repetitions, seed).with_index(index);
    let diversity = rarefied_diversity(&counts, &config)?;

    println!("sample_id\t{}\tstd_dev", diversity.index.name());
    for ((sid, value), sd) in diversity
        .sample_ids
        .iter()
        .zip(&diversity.values)
        .zip(&diversity.std_devs)
    {
        println!("{}\t{:.6}\t{:.6}", sid, value, sd);
    }
    Ok(())
}

/// Write the default configuration
fn cmd_example(output_path: &PathBuf) -> Result<()> {
    let yaml = AnalysisConfig::default().to_yaml()?;
    std::fs::write(output_path, yaml)?;
    info!("Default configuration written to {:?}", output_path);
    Ok(())
}
