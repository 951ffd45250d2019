//! Composable Compositional Data Analysis (CoDA) Library
//!
//! Diversity analysis and balance discovery for microbiome count tables,
//! carried out in Aitchison geometry.
//!
//! # Overview
//!
//! The library is organized into composable modules, leaves first:
//!
//! - **data**: Core data structures (CountMatrix, Metadata, Grouping, CompositionMatrix)
//! - **profile**: Coverage profiling
//! - **filter**: Empty-sample/taxon and prevalence filtering
//! - **zero**: Zero replacement (multiplicative, pseudocount)
//! - **diversity**: Rarefied alpha diversity
//! - **normalize**: CLR transform
//! - **beta**: Aitchison distance and PCoA
//! - **test**: PERMANOVA
//! - **model**: Linear association model
//! - **balance**: Balance selection and evaluation
//! - **pipeline**: Configuration and end-to-end execution
//!
//! # Example
//!
//! ```no_run
//! use composable_coda::prelude::*;
//!
//! let counts = CountMatrix::from_tsv("counts.tsv").unwrap();
//! let metadata = Metadata::from_tsv("metadata.tsv").unwrap();
//!
//! let config = AnalysisConfig {
//!     outcome: "diagnosis".into(),
//!     ..Default::default()
//! };
//! let report = run_analysis(&counts, &metadata, &config).unwrap();
//! println!("{}", report.selection.balance);
//! ```

pub mod balance;
pub mod beta;
pub mod data;
pub mod diversity;
pub mod error;
pub mod filter;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod profile;
pub mod test;
pub mod zero;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::balance::{
        approximate_difference, balance_values, clr_difference, select_balance, Balance,
        BalanceSelection, ScoringRule, SelectionConfig, SelectionStatus, TaxonContributions,
    };
    pub use crate::beta::{aitchison_distance, pcoa, DistanceMatrix, Ordination};
    pub use crate::data::{
        CompositionMatrix, CountMatrix, DesignMatrix, Grouping, Metadata, Variable, VariableType,
    };
    pub use crate::diversity::{
        rarefied_diversity, rarefy, AlphaDiversity, DiversityIndex, RarefactionConfig,
    };
    pub use crate::error::{CodaError, ErrorCategory, Result};
    pub use crate::filter::{
        filter_empty, filter_prevalence, filter_prevalence_with_stats, FilterResult,
    };
    pub use crate::model::{model_lm, LinearAssociationModel};
    pub use crate::normalize::{clr, ClrMatrix};
    pub use crate::pipeline::{run_analysis, AnalysisConfig, AnalysisReport};
    pub use crate::profile::{profile_coverage, CoverageProfile};
    pub use crate::test::{permanova, PermanovaConfig, PermanovaResult};
    pub use crate::zero::{replace_zeros_multiplicative, ZeroStrategy};
}
