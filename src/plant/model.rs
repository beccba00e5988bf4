use crate::plant::{Category, Status, StatusThresholds};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_LEVEL: u8 = 0;
pub const MAX_LEVEL: u8 = 100;

/// Geographic position in decimal degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and inside the WGS84 range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// One timestamped hydration reading
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub value: u8,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(value: u8, timestamp: DateTime<Utc>) -> Self {
        Self { value, timestamp }
    }
}

/// Plant tracked by the simulation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    /// Unique plant identifier
    pub id: String,

    /// Display name (owned by the CRUD layer)
    #[serde(default)]
    pub name: String,

    pub category: Category,

    /// Missing for plants registered without a position; those are never zoned
    #[serde(default)]
    pub location: Option<Coordinate>,

    /// Human-readable zone name, resolved lazily by the weather resolver
    #[serde(default)]
    pub zone_name: Option<String>,

    /// Hydration level, always within `MIN_LEVEL..=MAX_LEVEL`
    pub level: u8,

    /// Derived from `level`; never set independently
    pub status: Status,

    pub last_updated: DateTime<Utc>,

    /// Ascending by timestamp, at most one sample per minute
    #[serde(default)]
    pub history: Vec<Sample>,

    /// Optimistic concurrency token, bumped by the store on every save
    #[serde(default)]
    pub version: u64,
}

impl Plant {
    /// Create a plant with an empty history at version 0.
    pub fn new(
        id: impl Into<String>,
        category: Category,
        location: Option<Coordinate>,
        level: u8,
        thresholds: &StatusThresholds,
        now: DateTime<Utc>,
    ) -> Self {
        let level = level.min(MAX_LEVEL);
        Self {
            id: id.into(),
            name: String::new(),
            category,
            location,
            zone_name: None,
            level,
            status: thresholds.classify(level),
            last_updated: now,
            history: Vec::new(),
            version: 0,
        }
    }

    pub fn last_sample(&self) -> Option<&Sample> {
        self.history.last()
    }

    /// Lightweight view without history, used in broadcast payloads.
    pub fn summary(&self) -> PlantSummary {
        PlantSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            category: self.category,
            location: self.location,
            zone_name: self.zone_name.clone(),
            level: self.level,
            status: self.status,
            last_updated: self.last_updated,
        }
    }
}

/// Plant without its history
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlantSummary {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub location: Option<Coordinate>,
    pub zone_name: Option<String>,
    pub level: u8,
    pub status: Status,
    pub last_updated: DateTime<Utc>,
}
