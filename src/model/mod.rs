//! Linear association model between balance coordinates and the outcome.

pub mod lm;

pub use lm::{model_lm, overall_f, AxisFit, LinearAssociationModel};
