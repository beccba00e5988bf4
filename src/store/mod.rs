//! Plant persistence.
//!
//! Stores are the only shared mutable resource of the simulation. Writes are
//! optimistic: `save` succeeds only when the caller's `expected_version`
//! matches the stored one, and the store bumps the version on success.
//! Callers handle `SaveOutcome::Conflict` by re-reading and retrying
//! (see [`crate::retry`]).

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::plant::Plant;
use anyhow::Result;

/// Which plants `list_all` returns
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlantFilter {
    All,
    /// Plants with at least one history sample (backfill candidates)
    WithHistory,
}

impl PlantFilter {
    pub fn matches(&self, plant: &Plant) -> bool {
        match self {
            PlantFilter::All => true,
            PlantFilter::WithHistory => !plant.history.is_empty(),
        }
    }
}

/// Result of an optimistic write
#[derive(Clone, Debug, PartialEq)]
pub enum SaveOutcome {
    /// Written; carries the plant as stored, with its new version
    Saved(Plant),
    /// Another writer got there first
    Conflict { current_version: u64 },
    /// The plant no longer exists
    Missing,
}

pub trait PlantStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Plant>>;

    /// Write `plant` if the stored version still equals `expected_version`.
    fn save(&self, plant: &Plant, expected_version: u64) -> Result<SaveOutcome>;

    /// Plants matching `filter`, ordered by id.
    fn list_all(&self, filter: PlantFilter) -> Result<Vec<Plant>>;

    /// Register a new plant. Fails if the id already exists.
    fn insert(&self, plant: &Plant) -> Result<()>;

    /// Remove a plant. Returns whether it existed.
    fn delete(&self, id: &str) -> Result<bool>;
}
