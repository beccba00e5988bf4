//! Geographic zoning.
//!
//! Plants are grouped into coarse buckets (coordinates rounded to one
//! decimal place, roughly 11 km) so that one weather lookup serves every
//! plant in the bucket.

use crate::plant::{Coordinate, Plant};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Marker stored while a zone name lookup is pending
pub const PENDING_ZONE_NAME: &str = "⏳ ...";

/// True when a zone name is missing in substance.
pub fn is_placeholder_name(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.is_empty() || trimmed == PENDING_ZONE_NAME
}

/// Coarse zone key in tenths of a degree
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneKey {
    lat_tenths: i32,
    lng_tenths: i32,
}

impl ZoneKey {
    /// Key for a coordinate, or `None` when the coordinate is unusable.
    pub fn from_coordinate(coord: &Coordinate) -> Option<Self> {
        if !coord.is_valid() {
            return None;
        }
        Some(Self {
            lat_tenths: (coord.lat * 10.0).round() as i32,
            lng_tenths: (coord.lng * 10.0).round() as i32,
        })
    }

    pub fn lat(&self) -> f64 {
        f64::from(self.lat_tenths) / 10.0
    }

    pub fn lng(&self) -> f64 {
        f64::from(self.lng_tenths) / 10.0
    }
}

impl fmt::Display for ZoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}_{:.1}", self.lat(), self.lng())
    }
}

impl Serialize for ZoneKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Plants sharing a zone key
#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    pub key: ZoneKey,
    /// Location of the first plant encountered in the zone
    pub representative: Coordinate,
    /// First real (non-placeholder) zone name carried by a member
    pub name: Option<String>,
    pub members: Vec<String>,
}

/// Group plants by zone.
///
/// Zones come back in order of first appearance, members in input order.
/// Plants without a usable location are left out.
pub fn partition(plants: &[Plant]) -> Vec<Zone> {
    let mut zones: Vec<Zone> = Vec::new();
    let mut index: HashMap<ZoneKey, usize> = HashMap::new();

    for plant in plants {
        let Some(location) = plant.location else {
            continue;
        };
        let Some(key) = ZoneKey::from_coordinate(&location) else {
            continue;
        };

        let known_name = plant
            .zone_name
            .as_deref()
            .filter(|name| !is_placeholder_name(name));

        let slot = *index.entry(key).or_insert_with(|| {
            zones.push(Zone {
                key,
                representative: location,
                name: None,
                members: Vec::new(),
            });
            zones.len() - 1
        });

        let zone = &mut zones[slot];
        if zone.name.is_none() {
            zone.name = known_name.map(str::to_string);
        }
        zone.members.push(plant.id.clone());
    }

    zones
}
