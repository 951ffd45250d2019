//! Permutation-based hypothesis tests.


pub use permanova::{permanova, PermanovaConfig, PermanovaResult};
