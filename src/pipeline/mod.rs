//! Analysis configuration and execution.

mod config;
mod runner;

pub use config::{AnalysisConfig, RarefactionSettings};
pub use runner::{run_analysis, AnalysisReport, BALANCE_COLUMN, COVERAGE_COLUMN, DIVERSITY_COLUMN};
