pub mod env;
pub use env::{apply_env_overrides, apply_process_env};

use crate::engine::{BackfillSettings, EngineSettings, SchedulerSettings};
use crate::error::SimError;
use crate::history::DEFAULT_HISTORY_MAX;
use crate::plant::{Coordinate, StatusThresholds};
use crate::retry::RetryPolicy;
use crate::weather::{NOMINATIM_BASE_URL, OPEN_METEO_BASE_URL};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

// Re-export existing config types
pub use crate::nats::NatsConfig;

/// Default config file, overridden by `CHLOROPHYLL_CONFIG`
pub const DEFAULT_CONFIG_PATH: &str = "chlorophyll.toml";

/// Nominatim's usage policy allows at most one request per second
pub const MIN_GEOCODE_INTERVAL_MS: u64 = 1000;

/// Complete Chlorophyll configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChlorophyllConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub thresholds: StatusThresholds,
    #[serde(default)]
    pub backfill: BackfillSettings,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub home: HomeConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub nats: NatsConfig,
}

/// Tick cadence and history bounds
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_seconds: u64,
    #[serde(default = "default_history_max")]
    pub history_max: usize,
    /// Fixed RNG seed; unset means a fresh seed per process
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_tick_interval() -> u64 {
    600
}

fn default_history_max() -> usize {
    DEFAULT_HISTORY_MAX
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: default_tick_interval(),
            history_max: default_history_max(),
            seed: None,
        }
    }
}

/// External weather and geocoding services
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,
    #[serde(default = "default_geocode_url")]
    pub geocode_url: String,
    /// Sent with every request; Nominatim rejects anonymous clients
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Minimum spacing between reverse-geocode calls
    #[serde(default = "default_geocode_min_interval")]
    pub geocode_min_interval_ms: u64,
}

fn default_forecast_url() -> String {
    OPEN_METEO_BASE_URL.to_string()
}

fn default_geocode_url() -> String {
    NOMINATIM_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("chlorophyll/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    10
}

fn default_geocode_min_interval() -> u64 {
    MIN_GEOCODE_INTERVAL_MS
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            forecast_url: default_forecast_url(),
            geocode_url: default_geocode_url(),
            user_agent: default_user_agent(),
            request_timeout_seconds: default_request_timeout(),
            geocode_min_interval_ms: default_geocode_min_interval(),
        }
    }
}

impl WeatherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn geocode_min_interval(&self) -> Duration {
        Duration::from_millis(self.geocode_min_interval_ms)
    }
}

/// Location whose zone weather is published as `weather_update`
#[derive(Debug, Clone, Deserialize)]
pub struct HomeConfig {
    #[serde(default = "default_home_enabled")]
    pub enabled: bool,
    #[serde(default = "default_home_lat")]
    pub lat: f64,
    #[serde(default = "default_home_lng")]
    pub lng: f64,
}

fn default_home_enabled() -> bool {
    true
}

// Bologna
fn default_home_lat() -> f64 {
    44.4949
}

fn default_home_lng() -> f64 {
    11.3426
}

impl Default for HomeConfig {
    fn default() -> Self {
        Self {
            enabled: default_home_enabled(),
            lat: default_home_lat(),
            lng: default_home_lng(),
        }
    }
}

impl HomeConfig {
    pub fn coordinate(&self) -> Option<Coordinate> {
        self.enabled.then(|| Coordinate::new(self.lat, self.lng))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "chlorophyll.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl ChlorophyllConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.simulation.tick_interval_seconds)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            thresholds: self.thresholds,
            history_max: self.simulation.history_max,
            retry: self.retry.clone(),
            seed: self.simulation.seed,
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            tick_interval: self.tick_interval(),
            backfill: self.backfill.clone(),
            home: self.home.coordinate(),
        }
    }

    /// Reject settings the simulation cannot run with.
    pub fn validate(&self) -> Result<(), SimError> {
        let invalid = |msg: &str| Err(SimError::Configuration(msg.to_string()));

        if self.simulation.tick_interval_seconds == 0 {
            return invalid("simulation.tick_interval_seconds must be > 0");
        }
        if self.simulation.history_max == 0 {
            return invalid("simulation.history_max must be > 0");
        }
        if !self.thresholds.is_valid() {
            return Err(SimError::Configuration(format!(
                "thresholds must satisfy critical < healthy <= 100 (got critical={}, healthy={})",
                self.thresholds.critical, self.thresholds.healthy
            )));
        }
        if self.backfill.ticks_per_point == 0 || self.backfill.max_points == 0 {
            return invalid("backfill.ticks_per_point and backfill.max_points must be > 0");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be > 0");
        }
        if self.weather.forecast_url.trim().is_empty() || self.weather.geocode_url.trim().is_empty() {
            return invalid("weather.forecast_url and weather.geocode_url must not be empty");
        }
        if self.weather.request_timeout_seconds == 0 {
            return invalid("weather.request_timeout_seconds must be > 0");
        }
        if self.weather.geocode_min_interval_ms < MIN_GEOCODE_INTERVAL_MS {
            return Err(SimError::Configuration(format!(
                "weather.geocode_min_interval_ms must be >= {} (got {})",
                MIN_GEOCODE_INTERVAL_MS, self.weather.geocode_min_interval_ms
            )));
        }
        if self.home.enabled && !Coordinate::new(self.home.lat, self.home.lng).is_valid() {
            return invalid("home.lat/home.lng out of range");
        }
        if self.store.path.trim().is_empty() {
            return invalid("store.path must not be empty");
        }
        if self.nats.enabled && self.nats.url.trim().is_empty() {
            return invalid("nats.url must not be empty when nats is enabled");
        }
        Ok(())
    }
}

/// Load configuration from a TOML file. A missing file yields defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<ChlorophyllConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(ChlorophyllConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: ChlorophyllConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}
