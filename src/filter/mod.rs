//! Filtering primitives for count matrices.

pub mod empty;
pub mod prevalence;

pub use empty::filter_empty;
pub use prevalence::{filter_prevalence, filter_prevalence_with_stats, FilterResult};
