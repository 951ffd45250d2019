//! Repeated rarefaction to a common depth with averaged alpha diversity.
//!
//! # Algorithm
//!
//! 1. Check every sample has at least `depth` reads
//! 2. For repetition r, seed a ChaCha8 generator with `seed + r` on the
//!    rarefaction stream
//! 3. Per sample, draw `depth` distinct read positions without replacement
//!    and tally the taxa they fall in
//! 4. Compute the diversity index of each subsample
//! 5. Average the repetitions per sample (arithmetic mean)
//!
//! Because each repetition owns its generator, the result is the same
//! whether repetitions run on the rayon pool or sequentially.

use super::index::DiversityIndex;
use crate::data::CountMatrix;
use crate::error::{CodaError, Result};
use log::{debug, info};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration for rarefied alpha diversity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RarefactionConfig {
    /// Reads kept per sample.
    pub depth: u64,
    /// Independent subsamplings averaged per sample.
    pub repetitions: usize,
    /// Base seed; repetition r uses `seed + r`.
    pub seed: u64,
    pub index: DiversityIndex,
    /// Run repetitions on the rayon pool.
    pub parallel: bool,
}

impl RarefactionConfig {
    pub fn new(depth: u64, repetitions: usize, seed: u64) -> Self {
        Self {
            depth,
            repetitions,
            seed,
            index: DiversityIndex::Shannon,
            parallel: true,
        }
    }

    pub fn with_index(mut self, index: DiversityIndex) -> Self {
        self.index = index;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.depth == 0 {
            return Err(CodaError::InvalidParameter(
                "rarefaction depth must be at least 1".to_string(),
            ));
        }
        if self.repetitions == 0 {
            return Err(CodaError::InvalidParameter(
                "rarefaction repetitions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Averaged diversity per sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaDiversity {
    pub sample_ids: Vec<String>,
    /// Mean index over repetitions.
    pub values: Vec<f64>,
    /// Standard deviation over repetitions (0 for a single repetition).
    pub std_devs: Vec<f64>,
    pub index: DiversityIndex,
    pub depth: u64,
    pub repetitions: usize,
}

impl AlphaDiversity {
    pub fn get(&self, sample_id: &str) -> Option<f64> {
        self.sample_ids
            .iter()
            .position(|s| s == sample_id)
            .map(|i| self.values[i])
    }
}

/// Draw exactly `depth` reads without replacement from one sample.
///
/// Returns `None` if the sample holds fewer than `depth` reads.
pub fn subsample<R: Rng + ?Sized>(counts: &[u64], depth: u64, rng: &mut R) -> Option<Vec<u64>> {
    let total: u64 = counts.iter().sum();
    if total < depth {
        return None;
    }
    if total == depth {
        return Some(counts.to_vec());
    }

    let mut picks = index::sample(rng, total as usize, depth as usize).into_vec();
    picks.sort_unstable();

    let mut result = vec![0u64; counts.len()];
    let mut taxon = 0usize;
    let mut upper = counts.first().copied().unwrap_or(0) as usize;
    for pick in picks {
        while pick >= upper {
            taxon += 1;
            upper += counts[taxon] as usize;
        }
        result[taxon] += 1;
    }
    Some(result)
}

fn check_depth(counts: &CountMatrix, depth: u64) -> Result<()> {
    for (sid, &total) in counts.sample_ids().iter().zip(counts.sample_totals().iter()) {
        if total < depth {
            return Err(CodaError::RowSumTooLow {
                sample_id: sid.clone(),
                total,
                depth,
            });
        }
    }
    Ok(())
}

/// ChaCha stream reserved for rarefaction draws.
pub(crate) const RAREFACTION_STREAM: u64 = 1;

pub(crate) fn repetition_rng(seed: u64, rep: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(rep as u64));
    rng.set_stream(RAREFACTION_STREAM);
    rng
}

/// Rarefy every sample of a table once, with the draws of repetition 0.
pub fn rarefy(counts: &CountMatrix, depth: u64, seed: u64) -> Result<CountMatrix> {
    if depth == 0 {
        return Err(CodaError::InvalidParameter(
            "rarefaction depth must be at least 1".to_string(),
        ));
    }
    check_depth(counts, depth)?;
    let mut rng = repetition_rng(seed, 0);
    let rows: Vec<Vec<u64>> = counts
        .sample_columns()
        .iter()
        .map(|col| subsample(col, depth, &mut rng).unwrap_or_default())
        .collect();
    CountMatrix::from_sample_rows(
        &rows,
        counts.taxon_ids().to_vec(),
        counts.sample_ids().to_vec(),
    )
}

/// Rarefied alpha diversity averaged over `config.repetitions` draws.
///
/// # Errors
/// `InvalidParameter` for a zero depth or zero repetitions;
/// `RowSumTooLow` naming the first sample below the depth.
pub fn rarefied_diversity(counts: &CountMatrix, config: &RarefactionConfig) -> Result<AlphaDiversity> {
    config.validate()?;
    check_depth(counts, config.depth)?;

    let columns = counts.sample_columns();
    let one_repetition = |rep: usize| -> Vec<f64> {
        let mut rng = repetition_rng(config.seed, rep);
        columns
            .iter()
            .map(|col| {
                let drawn = subsample(col, config.depth, &mut rng).unwrap_or_default();
                config.index.compute(&drawn)
            })
            .collect()
    };

    let per_rep: Vec<Vec<f64>> = if config.parallel {
        (0..config.repetitions).into_par_iter().map(one_repetition).collect()
    } else {
        (0..config.repetitions).map(one_repetition).collect()
    };

    let n_samples = counts.n_samples();
    let reps = config.repetitions as f64;
    let mut values = vec![0.0; n_samples];
    let mut std_devs = vec![0.0; n_samples];
    for s in 0..n_samples {
        let mean = per_rep.iter().map(|r| r[s]).sum::<f64>() / reps;
        values[s] = mean;
        if config.repetitions > 1 {
            let var = per_rep.iter().map(|r| (r[s] - mean).powi(2)).sum::<f64>() / (reps - 1.0);
            std_devs[s] = var.sqrt();
        }
    }
    debug!("rarefaction per-sample std devs: {:?}", std_devs);
    info!(
        "{} diversity at depth {} over {} repetitions for {} samples",
        config.index.name(),
        config.depth,
        config.repetitions,
        n_samples
    );

    Ok(AlphaDiversity {
        sample_ids: counts.sample_ids().to_vec(),
        values,
        std_devs,
        index: config.index,
        depth: config.depth,
        repetitions: config.repetitions,
    })
}
