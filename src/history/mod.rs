//! Per-plant hydration history.
//!
//! History is a short chronological series used for charting. Writes are
//! bucketed per UTC minute: a second write in the bucket of the last sample
//! replaces it instead of appending, and the series is capped by evicting
//! the oldest samples.

use crate::plant::Sample;
use chrono::{DateTime, Utc};

/// Default cap on samples kept per plant
pub const DEFAULT_HISTORY_MAX: usize = 50;

/// Minute bucket of a timestamp (UTC, floor of unix seconds / 60).
pub fn minute_bucket(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp().div_euclid(60)
}

/// Merge `sample` into `history`.
///
/// Replaces the last sample when both fall in the same minute bucket,
/// appends otherwise, then drops from the front until `len <= cap`.
pub fn merge(history: &mut Vec<Sample>, sample: Sample, cap: usize) {
    let same_minute = history
        .last()
        .map(|last| minute_bucket(last.timestamp) == minute_bucket(sample.timestamp))
        .unwrap_or(false);

    if same_minute {
        if let Some(last) = history.last_mut() {
            *last = sample;
        }
    } else {
        history.push(sample);
    }

    if history.len() > cap {
        let excess = history.len() - cap;
        history.drain(..excess);
    }
}
