// Plant model: tracked entities, their samples and derived status

mod category;
mod model;
mod status;

pub use category::{CareKind, Category};
pub use model::{Coordinate, Plant, PlantSummary, Sample, MAX_LEVEL, MIN_LEVEL};
pub use status::{Status, StatusThresholds};
