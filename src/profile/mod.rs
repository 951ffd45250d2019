//! Data profiling of count matrices.

mod coverage;

pub use coverage::{profile_coverage, CoverageProfile};
