//! Data structures: counts, compositions, metadata and outcome groupings.

mod composition;
mod count_matrix;
mod design_matrix;
mod grouping;
mod metadata;

pub use composition::CompositionMatrix;
pub use count_matrix::CountMatrix;
pub use design_matrix::DesignMatrix;
pub use grouping::Grouping;
pub use metadata::{Metadata, Variable, VariableType};
