//! Alpha diversity under rarefaction.

pub mod index;
pub mod rarefaction;

pub use index::{observed, shannon, simpson, DiversityIndex};
pub use rarefaction::{rarefied_diversity, rarefy, subsample, AlphaDiversity, RarefactionConfig};
