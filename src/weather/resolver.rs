use crate::error::SimError;
use crate::weather::{ForecastSource, ReverseGeocoder, Throttle, Weather};
use crate::zone::{is_placeholder_name, Zone, ZoneKey};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Outcome of resolving one zone for one tick
#[derive(Clone, Debug, PartialEq)]
pub struct ZoneWeather {
    pub key: ZoneKey,
    /// Zone name, if known or resolved this tick
    pub name: Option<String>,
    /// `None` when the forecast lookup failed; the zone is skipped
    pub weather: Option<Weather>,
}

impl ZoneWeather {
    /// Label used in the weather map.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("Zone {}", self.key),
        }
    }
}

/// Resolves weather and zone names for zones.
///
/// Zone names are cached per key for the life of the process, so the
/// reverse geocoder is hit at most once per zone unless it fails.
pub struct WeatherResolver {
    forecast: Arc<dyn ForecastSource>,
    geocoder: Arc<dyn ReverseGeocoder>,
    throttle: Throttle,
    names: DashMap<ZoneKey, String>,
    call_timeout: Duration,
}

impl WeatherResolver {
    pub fn new(
        forecast: Arc<dyn ForecastSource>,
        geocoder: Arc<dyn ReverseGeocoder>,
        geocode_min_interval: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            forecast,
            geocoder,
            throttle: Throttle::new(geocode_min_interval),
            names: DashMap::new(),
            call_timeout,
        }
    }

    /// Resolve name and weather for a zone. Never fails; failures are logged
    /// and reported as missing fields.
    pub async fn resolve(&self, zone: &Zone) -> ZoneWeather {
        let name = self.zone_name(zone).await;

        let weather = match self.fetch_weather(zone).await {
            Ok(weather) => Some(weather),
            Err(e) => {
                warn!(zone = %zone.key, error = %e, "Weather unavailable, skipping zone this tick");
                None
            }
        };

        ZoneWeather {
            key: zone.key,
            name,
            weather,
        }
    }

    /// Current weather class at the zone's representative coordinate.
    pub async fn fetch_weather(&self, zone: &Zone) -> Result<Weather, SimError> {
        let transient = |reason: String| SimError::TransientExternal {
            zone: zone.key.to_string(),
            reason,
        };

        match timeout(
            self.call_timeout,
            self.forecast.weather_code(zone.representative),
        )
        .await
        {
            Ok(Ok(code)) => {
                let weather = Weather::from_wmo_code(code);
                debug!(zone = %zone.key, code, weather = %weather, "Zone weather resolved");
                Ok(weather)
            }
            Ok(Err(e)) => Err(transient(format!("{:#}", e))),
            Err(_) => Err(transient(format!(
                "forecast timed out after {:?}",
                self.call_timeout
            ))),
        }
    }

    /// Cached zone name for a key, if one was resolved earlier.
    pub fn cached_name(&self, key: &ZoneKey) -> Option<String> {
        self.names.get(key).map(|name| name.clone())
    }

    async fn zone_name(&self, zone: &Zone) -> Option<String> {
        if let Some(name) = &zone.name {
            self.names.entry(zone.key).or_insert_with(|| name.clone());
            return Some(name.clone());
        }
        if let Some(name) = self.cached_name(&zone.key) {
            return Some(name);
        }

        self.throttle.acquire().await;

        match timeout(
            self.call_timeout,
            self.geocoder.place_name(zone.representative),
        )
        .await
        {
            Ok(Ok(Some(name))) if !is_placeholder_name(&name) => {
                debug!(zone = %zone.key, name = %name, "Zone name resolved");
                self.names.insert(zone.key, name.clone());
                Some(name)
            }
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                warn!(zone = %zone.key, error = %e, "Reverse geocoding failed");
                None
            }
            Err(_) => {
                warn!(zone = %zone.key, "Reverse geocoding timed out");
                None
            }
        }
    }
}
