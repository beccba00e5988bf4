// Weather lookup and classification

mod nominatim;
mod open_meteo;
mod resolver;
mod throttle;

pub use nominatim::{NominatimClient, DEFAULT_BASE_URL as NOMINATIM_BASE_URL, UNKNOWN_PLACE};
pub use open_meteo::{OpenMeteoClient, DEFAULT_BASE_URL as OPEN_METEO_BASE_URL};
pub use resolver::{WeatherResolver, ZoneWeather};
pub use throttle::Throttle;

use crate::plant::Coordinate;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse weather class driving transitions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    Sunny,
    Cloudy,
    Rainy,
}

impl Weather {
    /// Classify a WMO weather interpretation code.
    ///
    /// 0-1 clear → sunny, 2-48 clouds and fog → cloudy, anything higher
    /// (drizzle, rain, snow, storms) → rainy.
    pub fn from_wmo_code(code: u16) -> Self {
        match code {
            0..=1 => Weather::Sunny,
            2..=48 => Weather::Cloudy,
            _ => Weather::Rainy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Weather::Sunny => "sunny",
            Weather::Cloudy => "cloudy",
            Weather::Rainy => "rainy",
        }
    }
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current-conditions provider keyed by coordinate.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Raw WMO weather code at `coord`.
    async fn weather_code(&self, coord: Coordinate) -> Result<u16>;
}

/// Reverse geocoding provider.
///
/// Callers are responsible for rate limiting; implementations issue one
/// request per call.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Human-readable place name at `coord`, if the provider knows one.
    async fn place_name(&self, coord: Coordinate) -> Result<Option<String>>;
}
