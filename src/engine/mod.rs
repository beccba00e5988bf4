//! Simulation engine.
//!
//! The engine is the only writer of plants. Every mutation is one optimistic
//! transaction (read, compute, `save` with the version that was read) run
//! through [`with_conflict_retry`], so scheduler ticks, startup backfill and
//! user care actions can race on the same plant without losing updates.

pub mod backfill;
pub mod scheduler;

pub use backfill::{BackfillPlan, BackfillSettings, BackfillSummary};
pub use scheduler::{Scheduler, SchedulerPhase, SchedulerSettings, TickReport};

use crate::broadcast::{publish_or_warn, Broadcaster, TOPIC_PLANT_UPDATED};
use crate::error::SimError;
use crate::history::DEFAULT_HISTORY_MAX;
use crate::plant::{CareKind, Plant, PlantSummary, Status, StatusThresholds};
use crate::retry::{with_conflict_retry, Commit, RetryPolicy};
use crate::store::{PlantStore, SaveOutcome};
use crate::transition::{self, apply_level_change};
use crate::weather::Weather;
use crate::zone::is_placeholder_name;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

#[cfg(test)]
mod tests;

/// Engine tuning shared by ticks, care actions and backfill
#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub thresholds: StatusThresholds,
    pub history_max: usize,
    pub retry: RetryPolicy,
    /// Fixed RNG seed for reproducible runs; entropy when `None`
    pub seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            thresholds: StatusThresholds::default(),
            history_max: DEFAULT_HISTORY_MAX,
            retry: RetryPolicy::default(),
            seed: None,
        }
    }
}

/// Result of a user care action
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CareOutcome {
    pub plant: Plant,
    /// Level actually gained after clamping
    pub gain: i32,
    pub kind: CareKind,
    /// Plant was critical before the action
    pub was_critical: bool,
}

#[derive(Serialize)]
struct PlantUpdated {
    plant: PlantSummary,
    gain: i32,
    kind: CareKind,
    was_critical: bool,
}

pub struct SimulationEngine {
    store: Arc<dyn PlantStore>,
    broadcaster: Arc<dyn Broadcaster>,
    settings: EngineSettings,
    rng: Mutex<StdRng>,
}

impl SimulationEngine {
    pub fn new(
        store: Arc<dyn PlantStore>,
        broadcaster: Arc<dyn Broadcaster>,
        settings: EngineSettings,
    ) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            store,
            broadcaster,
            settings,
            rng: Mutex::new(rng),
        }
    }

    pub fn store(&self) -> &Arc<dyn PlantStore> {
        &self.store
    }

    pub fn broadcaster(&self) -> &Arc<dyn Broadcaster> {
        &self.broadcaster
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Apply a level delta to one plant.
    ///
    /// Shares the tick primitive: clamped, reclassified, recorded in history.
    /// A delta that does not move the clamped level returns the plant as
    /// stored without writing.
    pub async fn apply_delta(&self, plant_id: &str, delta: i32) -> Result<Plant, SimError> {
        with_conflict_retry(&self.settings.retry, plant_id, || {
            let plant = self.load(plant_id)?;
            match self.level_change(&plant, delta) {
                Some(updated) => self.commit(&updated, plant.version),
                None => {
                    debug!(plant_id = %plant_id, delta, level = plant.level, "Delta is a no-op");
                    Ok(Commit::Done(plant))
                }
            }
        })
        .await
    }

    /// User care action (water, prune or treat depending on category).
    ///
    /// `amount` overrides the category's default gain. Publishes
    /// `plant_updated` once the write lands.
    pub async fn care(&self, plant_id: &str, amount: Option<i32>) -> Result<CareOutcome, SimError> {
        if let Some(amount) = amount {
            if amount <= 0 {
                return Err(SimError::invalid(
                    plant_id,
                    format!("care amount must be positive, got {}", amount),
                ));
            }
        }

        let outcome = with_conflict_retry(&self.settings.retry, plant_id, || {
            let plant = self.load(plant_id)?;
            let gain = amount.unwrap_or_else(|| plant.category.care_amount());
            let kind = plant.category.care_kind();
            let was_critical = plant.status == Status::Critical;

            let Some(updated) = self.level_change(&plant, gain) else {
                return Ok(Commit::Done(CareOutcome {
                    plant,
                    gain: 0,
                    kind,
                    was_critical,
                }));
            };

            let gained = i32::from(updated.level) - i32::from(plant.level);
            Ok(match self.commit(&updated, plant.version)? {
                Commit::Done(saved) => Commit::Done(CareOutcome {
                    plant: saved,
                    gain: gained,
                    kind,
                    was_critical,
                }),
                Commit::Conflict => Commit::Conflict,
            })
        })
        .await?;

        info!(
            plant_id = %plant_id,
            kind = ?outcome.kind,
            gain = outcome.gain,
            level = outcome.plant.level,
            "Care applied"
        );

        let payload = PlantUpdated {
            plant: outcome.plant.summary(),
            gain: outcome.gain,
            kind: outcome.kind,
            was_critical: outcome.was_critical,
        };
        publish_or_warn(self.broadcaster.as_ref(), TOPIC_PLANT_UPDATED, &payload).await;

        Ok(outcome)
    }

    /// Apply one tick of zone weather to a plant.
    ///
    /// Draws once against the plant's transition rule; retries reuse the
    /// draw so a conflict never re-rolls the dice. Also fills in the zone
    /// name when the plant has none. Returns the stored plant when something
    /// was written.
    pub async fn apply_weather(
        &self,
        plant_id: &str,
        weather: Weather,
        zone_name: Option<&str>,
    ) -> Result<Option<Plant>, SimError> {
        let category = self.load(plant_id)?.category;
        let rule = transition::rule(category, weather);
        let delta = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            transition::decide(&rule, &mut *rng)
        };

        with_conflict_retry(&self.settings.retry, plant_id, || {
            let plant = self.load(plant_id)?;

            let mut updated = delta
                .and_then(|delta| self.level_change(&plant, delta))
                .unwrap_or_else(|| plant.clone());

            let missing_name = plant
                .zone_name
                .as_deref()
                .map_or(true, is_placeholder_name);
            if missing_name {
                if let Some(name) = zone_name.filter(|name| !is_placeholder_name(name)) {
                    updated.zone_name = Some(name.to_string());
                }
            }

            if updated == plant {
                debug!(plant_id = %plant_id, weather = %weather, "No change this tick");
                return Ok(Commit::Done(None));
            }

            Ok(match self.commit(&updated, plant.version)? {
                Commit::Done(saved) => Commit::Done(Some(saved)),
                Commit::Conflict => Commit::Conflict,
            })
        })
        .await
    }

    fn level_change(&self, plant: &Plant, delta: i32) -> Option<Plant> {
        apply_level_change(
            plant,
            delta,
            Utc::now(),
            &self.settings.thresholds,
            self.settings.history_max,
        )
    }

    fn load(&self, plant_id: &str) -> Result<Plant, SimError> {
        self.store
            .get(plant_id)?
            .ok_or_else(|| SimError::invalid(plant_id, "not found"))
    }

    /// One optimistic save. Conflicts are handed back to the retry loop.
    fn commit(&self, plant: &Plant, expected_version: u64) -> Result<Commit<Plant>, SimError> {
        match self.store.save(plant, expected_version)? {
            SaveOutcome::Saved(saved) => Ok(Commit::Done(saved)),
            SaveOutcome::Conflict { current_version } => {
                debug!(
                    plant_id = %plant.id,
                    expected_version,
                    current_version,
                    "Stale write rejected"
                );
                Ok(Commit::Conflict)
            }
            SaveOutcome::Missing => Err(SimError::invalid(&plant.id, "deleted")),
        }
    }
}
