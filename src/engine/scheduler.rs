use super::{BackfillSettings, SimulationEngine};
use crate::broadcast::{publish_or_warn, TOPIC_SIMULATION_TICK, TOPIC_WEATHER_UPDATE};
use crate::error::SimError;
use crate::plant::{Coordinate, Plant, PlantSummary};
use crate::store::PlantFilter;
use crate::weather::{Weather, WeatherResolver, ZoneWeather};
use crate::zone::{partition, Zone};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A zone counts as home when both coordinates are within this many degrees
const HOME_RADIUS_DEGREES: f64 = 0.2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    Idle,
    Backfilling,
    Running,
}

#[derive(Clone, Debug)]
pub struct SchedulerSettings {
    pub tick_interval: Duration,
    pub backfill: BackfillSettings,
    /// Coordinate whose zone weather is published as `weather_update`
    pub home: Option<Coordinate>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(600),
            backfill: BackfillSettings::default(),
            home: None,
        }
    }
}

/// Counts for one tick
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub zones: usize,
    /// Zones without a weather classification this tick
    pub skipped_zones: usize,
    /// Plants written this tick
    pub changed: usize,
    /// Plants in skipped zones or whose write failed
    pub skipped_plants: usize,
}

/// Batched notification published after every tick
#[derive(Serialize)]
struct SimulationTick<'a> {
    tick_id: Uuid,
    plants: Vec<PlantSummary>,
    weather: &'a BTreeMap<String, Weather>,
    report: &'a TickReport,
}

#[derive(Serialize)]
struct WeatherUpdate {
    zone: String,
    weather: Weather,
}

struct ZoneOutcome {
    resolved: ZoneWeather,
    representative: Coordinate,
    updated: Vec<Plant>,
    skipped: usize,
}

/// Clears the in-progress flag when a tick ends, however it ends.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives the simulation: backfill once, then periodic ticks.
///
/// Owns the latest weather map. Ticks never overlap: the loop awaits each
/// round, and `run_tick` refuses to start while another round is in
/// progress.
pub struct Scheduler {
    engine: Arc<SimulationEngine>,
    resolver: Arc<WeatherResolver>,
    settings: SchedulerSettings,
    phase: RwLock<SchedulerPhase>,
    ticking: AtomicBool,
    weather_map: RwLock<BTreeMap<String, Weather>>,
    home_weather: RwLock<Option<Weather>>,
}

impl Scheduler {
    pub fn new(
        engine: Arc<SimulationEngine>,
        resolver: Arc<WeatherResolver>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            engine,
            resolver,
            settings,
            phase: RwLock::new(SchedulerPhase::Idle),
            ticking: AtomicBool::new(false),
            weather_map: RwLock::new(BTreeMap::new()),
            home_weather: RwLock::new(None),
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        *self.phase.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Weather per zone label from the last completed tick; empty before
    /// the first one.
    pub fn weather_map(&self) -> BTreeMap<String, Weather> {
        self.weather_map
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn home_weather(&self) -> Option<Weather> {
        *self.home_weather.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Backfill, then tick forever.
    ///
    /// The first tick runs immediately after backfill. Ticks that fall
    /// behind are delayed rather than bursted.
    pub async fn run(&self) {
        self.set_phase(SchedulerPhase::Backfilling);
        if let Err(e) = self
            .engine
            .backfill(&self.settings.backfill, self.settings.tick_interval, Utc::now())
            .await
        {
            error!(error = %e, "Backfill failed, starting without it");
        }
        self.set_phase(SchedulerPhase::Running);

        info!(
            tick_interval_secs = self.settings.tick_interval.as_secs(),
            "Simulation scheduler running"
        );

        let mut ticker = interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(e) = self.run_tick().await {
                error!(error = %e, "Tick failed");
            }
        }
    }

    /// Run one simulation round.
    ///
    /// Returns `Ok(None)` when another round is already in progress.
    pub async fn run_tick(&self) -> Result<Option<TickReport>, SimError> {
        if self
            .ticking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Previous tick still running, skipping");
            return Ok(None);
        }
        let _guard = TickGuard(&self.ticking);

        let tick_id = Uuid::now_v7();
        let plants = self.engine.store().list_all(PlantFilter::All)?;
        let zones = partition(&plants);
        debug!(tick_id = %tick_id, plants = plants.len(), zones = zones.len(), "Tick started");

        let outcomes = join_all(zones.iter().map(|zone| self.process_zone(zone))).await;

        let mut report = TickReport {
            zones: zones.len(),
            ..Default::default()
        };
        let mut weather_map = BTreeMap::new();
        let mut home: Option<(f64, String, Weather)> = None;
        let mut updated: HashMap<String, Plant> = HashMap::new();

        for outcome in outcomes {
            report.skipped_plants += outcome.skipped;

            let Some(weather) = outcome.resolved.weather else {
                report.skipped_zones += 1;
                continue;
            };

            let label = outcome.resolved.label();
            if let Some(target) = self.settings.home {
                if let Some(distance) = home_distance(&outcome.representative, &target) {
                    if home.as_ref().map_or(true, |(best, _, _)| distance < *best) {
                        home = Some((distance, label.clone(), weather));
                    }
                }
            }
            weather_map.insert(label, weather);

            report.changed += outcome.updated.len();
            for plant in outcome.updated {
                updated.insert(plant.id.clone(), plant);
            }
        }

        *self.weather_map.write().unwrap_or_else(|e| e.into_inner()) = weather_map.clone();

        if let Some((_, zone, weather)) = home {
            *self.home_weather.write().unwrap_or_else(|e| e.into_inner()) = Some(weather);
            publish_or_warn(
                self.engine.broadcaster().as_ref(),
                TOPIC_WEATHER_UPDATE,
                &WeatherUpdate { zone, weather },
            )
            .await;
        }

        let summaries = plants
            .iter()
            .map(|plant| updated.get(&plant.id).unwrap_or(plant).summary())
            .collect();
        publish_or_warn(
            self.engine.broadcaster().as_ref(),
            TOPIC_SIMULATION_TICK,
            &SimulationTick {
                tick_id,
                plants: summaries,
                weather: &weather_map,
                report: &report,
            },
        )
        .await;

        info!(
            tick_id = %tick_id,
            zones = report.zones,
            skipped_zones = report.skipped_zones,
            changed = report.changed,
            skipped_plants = report.skipped_plants,
            "Tick complete"
        );

        Ok(Some(report))
    }

    async fn process_zone(&self, zone: &Zone) -> ZoneOutcome {
        let resolved = self.resolver.resolve(zone).await;

        let Some(weather) = resolved.weather else {
            return ZoneOutcome {
                resolved,
                representative: zone.representative,
                updated: Vec::new(),
                skipped: zone.members.len(),
            };
        };

        let name = resolved.name.as_deref();
        let results = join_all(
            zone.members
                .iter()
                .map(|plant_id| self.engine.apply_weather(plant_id, weather, name)),
        )
        .await;

        let mut updated = Vec::new();
        let mut skipped = 0;
        for (plant_id, result) in zone.members.iter().zip(results) {
            match result {
                Ok(Some(plant)) => updated.push(plant),
                Ok(None) => {}
                Err(e @ SimError::InvalidEntity { .. }) => {
                    debug!(plant_id = %plant_id, error = %e, "Plant skipped");
                    skipped += 1;
                }
                Err(e) if e.is_skippable() => {
                    warn!(plant_id = %plant_id, zone = %zone.key, error = %e, "Plant skipped this tick");
                    skipped += 1;
                }
                Err(e) => {
                    error!(plant_id = %plant_id, zone = %zone.key, error = %e, "Plant update failed");
                    skipped += 1;
                }
            }
        }

        ZoneOutcome {
            resolved,
            representative: zone.representative,
            updated,
            skipped,
        }
    }

    fn set_phase(&self, phase: SchedulerPhase) {
        *self.phase.write().unwrap_or_else(|e| e.into_inner()) = phase;
        debug!(phase = ?phase, "Scheduler phase changed");
    }
}

/// Chebyshev distance in degrees when within the home radius.
fn home_distance(zone: &Coordinate, home: &Coordinate) -> Option<f64> {
    let lat = (zone.lat - home.lat).abs();
    let lng = (zone.lng - home.lng).abs();
    (lat < HOME_RADIUS_DEGREES && lng < HOME_RADIUS_DEGREES).then_some(lat.max(lng))
}
