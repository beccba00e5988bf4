//! Hydration transitions.
//!
//! A tick asks the table how likely a plant of a given category is to react
//! to the zone weather, draws once, and on success applies the weather delta
//! through [`apply_level_change`]. User care actions go through the same
//! primitive with an explicit delta, so clamping, status derivation and
//! history bookkeeping never diverge between the two paths.

mod table;

pub use table::{delta, odds, rule, sunny_permille, TransitionRule, WeatherOdds};

use crate::history;
use crate::plant::{Plant, Sample, StatusThresholds, MAX_LEVEL, MIN_LEVEL};
use chrono::{DateTime, Utc};
use rand::Rng;


/// Clamp an arbitrary level into `MIN_LEVEL..=MAX_LEVEL`.
pub fn clamp_level(level: i64) -> u8 {
    level.clamp(i64::from(MIN_LEVEL), i64::from(MAX_LEVEL)) as u8
}

/// Draw against a rule; returns the delta to apply when the plant reacts.
///
/// The draw is uniform in `[0, 1)` and fires when strictly below the
/// probability, so 1.0 always fires and 0.0 never does.
pub fn decide<R: Rng + ?Sized>(rule: &TransitionRule, rng: &mut R) -> Option<i32> {
    let draw: f64 = rng.gen();
    if draw < rule.probability {
        Some(rule.delta)
    } else {
        None
    }
}

/// Apply `delta` to a plant.
///
/// Returns the updated copy (new level, recomputed status, `last_updated`
/// set to `now`, sample merged into history), or `None` when the clamped
/// level does not change. Does not touch `version`; the store owns it.
pub fn apply_level_change(
    plant: &Plant,
    delta: i32,
    now: DateTime<Utc>,
    thresholds: &StatusThresholds,
    history_max: usize,
) -> Option<Plant> {
    let new_level = clamp_level(i64::from(plant.level) + i64::from(delta));
    if new_level == plant.level {
        return None;
    }

    let mut updated = plant.clone();
    updated.level = new_level;
    updated.status = thresholds.classify(new_level);
    updated.last_updated = now;
    history::merge(&mut updated.history, Sample::new(new_level, now), history_max);
    Some(updated)
}
