//! Beta diversity in Aitchison geometry: distances and ordination.

pub mod distance;
pub mod pcoa;

pub use distance::{aitchison_distance, DistanceMatrix};
pub use pcoa::{pcoa, Ordination};
