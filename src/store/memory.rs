use crate::plant::Plant;
use crate::store::{PlantFilter, PlantStore, SaveOutcome};
use anyhow::{bail, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// In-memory plant store.
///
/// Version checks run under the DashMap shard lock, so a check and its write
/// are atomic with respect to other writers of the same plant.
pub struct MemoryStore {
    plants: DashMap<String, Plant>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            plants: DashMap::new(),
        }
    }

    /// Build a store pre-populated with `plants`, keeping their versions.
    pub fn with_plants(plants: impl IntoIterator<Item = Plant>) -> Self {
        let store = Self::new();
        for plant in plants {
            store.plants.insert(plant.id.clone(), plant);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.plants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plants.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PlantStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<Plant>> {
        Ok(self.plants.get(id).map(|p| p.clone()))
    }

    fn save(&self, plant: &Plant, expected_version: u64) -> Result<SaveOutcome> {
        let Some(mut stored) = self.plants.get_mut(&plant.id) else {
            return Ok(SaveOutcome::Missing);
        };

        if stored.version != expected_version {
            return Ok(SaveOutcome::Conflict {
                current_version: stored.version,
            });
        }

        let mut next = plant.clone();
        next.version = expected_version + 1;
        *stored = next.clone();
        Ok(SaveOutcome::Saved(next))
    }

    fn list_all(&self, filter: PlantFilter) -> Result<Vec<Plant>> {
        let mut plants: Vec<Plant> = self
            .plants
            .iter()
            .filter(|p| filter.matches(p.value()))
            .map(|p| p.value().clone())
            .collect();
        plants.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(plants)
    }

    fn insert(&self, plant: &Plant) -> Result<()> {
        match self.plants.entry(plant.id.clone()) {
            Entry::Occupied(_) => bail!("Plant '{}' already exists", plant.id),
            Entry::Vacant(slot) => {
                slot.insert(plant.clone());
                Ok(())
            }
        }
    }

    fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.plants.remove(id).is_some())
    }
}
