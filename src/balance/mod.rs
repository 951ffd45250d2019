//! Balance discovery: a log-contrast of two taxon groups that separates the outcome.

pub mod contrast;
pub mod evaluate;
pub mod score;
pub mod select;

pub use contrast::Balance;
pub use evaluate::{approximate_difference, balance_values, clr_difference, TaxonContributions};
pub use score::{kruskal_wallis_p_value, ScoringRule};
pub use select::{
    select_balance, BalanceSelection, SelectionConfig, SelectionStatus, SelectionStep, Side,
};
