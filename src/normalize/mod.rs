//! Log-ratio transforms.

pub mod clr;

pub use clr::{clr, norm_clr, ClrMatrix};
