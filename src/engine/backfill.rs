//! Startup reconstruction of the downtime gap.
//!
//! While the process was down no ticks ran, so every plant's history stops at
//! the last sample written before shutdown. On startup each plant loses the
//! hydration it would have lost under continuous sunshine (the worst case),
//! spread over evenly spaced synthetic samples so charts show a gradual
//! decline instead of a cliff.

use super::SimulationEngine;
use crate::error::SimError;
use crate::history;
use crate::plant::{Plant, Sample, StatusThresholds};
use crate::retry::{with_conflict_retry, Commit};
use crate::store::PlantFilter;
use crate::transition::{clamp_level, sunny_permille};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Deserialize)]
pub struct BackfillSettings {
    /// Gaps shorter than this many ticks are treated as noise
    #[serde(default = "default_min_elapsed_ticks")]
    pub min_elapsed_ticks: u64,
    /// One synthetic sample per this many missed ticks
    #[serde(default = "default_ticks_per_point")]
    pub ticks_per_point: u64,
    #[serde(default = "default_max_points")]
    pub max_points: u64,
}

fn default_min_elapsed_ticks() -> u64 {
    3
}

fn default_ticks_per_point() -> u64 {
    6
}

fn default_max_points() -> u64 {
    24
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            min_elapsed_ticks: default_min_elapsed_ticks(),
            ticks_per_point: default_ticks_per_point(),
            max_points: default_max_points(),
        }
    }
}

/// Synthetic samples covering one plant's gap
#[derive(Clone, Debug, PartialEq)]
pub struct BackfillPlan {
    pub elapsed_ticks: u64,
    pub total_loss: u64,
    /// Ascending; the last one is at `now`
    pub points: Vec<Sample>,
}

impl BackfillPlan {
    /// Level the plant ends up at.
    pub fn final_level(&self) -> Option<u8> {
        self.points.last().map(|sample| sample.value)
    }

    /// Copy of `plant` with the plan merged into its history and its level,
    /// status and `last_updated` brought up to `now`.
    pub fn apply(
        &self,
        plant: &Plant,
        now: DateTime<Utc>,
        thresholds: &StatusThresholds,
        history_max: usize,
    ) -> Plant {
        let mut updated = plant.clone();
        for sample in &self.points {
            history::merge(&mut updated.history, sample.clone(), history_max);
        }
        if let Some(level) = self.final_level() {
            updated.level = level;
            updated.status = thresholds.classify(level);
        }
        updated.last_updated = now;
        updated
    }
}

/// Counts reported after a backfill pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    /// Plants with at least one sample
    pub examined: usize,
    pub backfilled: usize,
    /// Gap too short or no loss to apply
    pub skipped: usize,
    pub failed: usize,
}

/// Plan the backfill of one plant, or `None` when nothing should change.
pub fn plan(
    plant: &Plant,
    now: DateTime<Utc>,
    tick_interval: Duration,
    settings: &BackfillSettings,
) -> Option<BackfillPlan> {
    let last = plant.last_sample()?;

    let tick_ms = i64::try_from(tick_interval.as_millis()).ok()?;
    if tick_ms <= 0 {
        return None;
    }

    // A sample in the future (clock skew) counts as no gap
    let elapsed_ms = (now - last.timestamp).num_milliseconds().max(0);
    let elapsed_ticks = (elapsed_ms / tick_ms) as u64;
    if elapsed_ticks < settings.min_elapsed_ticks {
        return None;
    }

    let total_loss = elapsed_ticks * sunny_permille(plant.category) / 1000;
    if total_loss == 0 {
        return None;
    }

    let ticks_per_point = settings.ticks_per_point.max(1);
    let points = elapsed_ticks
        .div_ceil(ticks_per_point)
        .min(settings.max_points.max(1));

    let samples = (1..=points)
        .map(|i| {
            let timestamp = if i == points {
                now
            } else {
                let offset = elapsed_ms as i128 * i as i128 / points as i128;
                last.timestamp + ChronoDuration::milliseconds(offset as i64)
            };
            let lost = total_loss * i / points;
            let value = clamp_level(i64::from(last.value) - lost as i64);
            Sample::new(value, timestamp)
        })
        .collect();

    Some(BackfillPlan {
        elapsed_ticks,
        total_loss,
        points: samples,
    })
}

impl SimulationEngine {
    /// Backfill every plant with history, one retried save per plant.
    ///
    /// Fails only when the plant list cannot be read; per-plant failures are
    /// counted and logged.
    pub async fn backfill(
        &self,
        settings: &BackfillSettings,
        tick_interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<BackfillSummary, SimError> {
        let candidates = self.store().list_all(PlantFilter::WithHistory)?;
        let mut summary = BackfillSummary {
            examined: candidates.len(),
            ..Default::default()
        };

        for candidate in candidates {
            let plant_id = candidate.id;
            let result = with_conflict_retry(&self.settings().retry, &plant_id, || {
                let plant = self.load(&plant_id)?;
                let Some(plan) = plan(&plant, now, tick_interval, settings) else {
                    return Ok(Commit::Done(None));
                };

                let updated = plan.apply(
                    &plant,
                    now,
                    &self.settings().thresholds,
                    self.settings().history_max,
                );
                Ok(match self.commit(&updated, plant.version)? {
                    Commit::Done(_) => Commit::Done(Some(plan)),
                    Commit::Conflict => Commit::Conflict,
                })
            })
            .await;

            match result {
                Ok(Some(plan)) => {
                    debug!(
                        plant_id = %plant_id,
                        elapsed_ticks = plan.elapsed_ticks,
                        total_loss = plan.total_loss,
                        points = plan.points.len(),
                        "Backfilled plant"
                    );
                    summary.backfilled += 1;
                }
                Ok(None) => summary.skipped += 1,
                Err(e) => {
                    warn!(plant_id = %plant_id, error = %e, "Backfill failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            examined = summary.examined,
            backfilled = summary.backfilled,
            skipped = summary.skipped,
            failed = summary.failed,
            "Backfill complete"
        );

        Ok(summary)
    }
}
