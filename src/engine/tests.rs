use super::backfill::plan;
use super::*;
use crate::broadcast::{ChannelBroadcaster, TOPIC_SIMULATION_TICK, TOPIC_WEATHER_UPDATE};
use crate::plant::{Category, Coordinate, Sample};
use crate::store::MemoryStore;
use crate::weather::{ForecastSource, ReverseGeocoder, WeatherResolver};
use crate::zone::ZoneKey;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration};
use std::collections::HashMap;
use std::time::Duration;

const TICK: Duration = Duration::from_secs(600);

fn ts(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}

fn plant(id: &str, category: Category, level: u8) -> Plant {
    Plant::new(
        id,
        category,
        None,
        level,
        &StatusThresholds::default(),
        Utc::now() - ChronoDuration::hours(1),
    )
}

fn located(id: &str, category: Category, level: u8, lat: f64, lng: f64) -> Plant {
    let mut p = plant(id, category, level);
    p.location = Some(Coordinate::new(lat, lng));
    p
}

fn with_last_sample(mut p: Plant, value: u8, at: DateTime<Utc>) -> Plant {
    p.history.push(Sample::new(value, at));
    p.level = value;
    p.status = StatusThresholds::default().classify(value);
    p
}

fn fast_settings() -> EngineSettings {
    EngineSettings {
        retry: RetryPolicy::new(3, Duration::from_millis(1)),
        seed: Some(42),
        ..Default::default()
    }
}

fn engine_with(
    plants: Vec<Plant>,
    settings: EngineSettings,
) -> (Arc<SimulationEngine>, Arc<MemoryStore>, Arc<ChannelBroadcaster>) {
    let store = Arc::new(MemoryStore::with_plants(plants));
    let broadcaster = Arc::new(ChannelBroadcaster::default());
    let engine = Arc::new(SimulationEngine::new(
        store.clone(),
        broadcaster.clone(),
        settings,
    ));
    (engine, store, broadcaster)
}

// ---------------------------------------------------------------------------
// apply_delta / care

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deltas_converge_to_sum() {
    let settings = EngineSettings {
        retry: RetryPolicy::new(10, Duration::from_millis(1)),
        ..fast_settings()
    };
    let (engine, store, _) = engine_with(vec![plant("shared", Category::Tree, 50)], settings);

    let mut handles = vec![];
    for _ in 0..10 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.apply_delta("shared", 1).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = store.get("shared").unwrap().unwrap();
    assert_eq!(stored.level, 60);
    assert_eq!(stored.version, 10);
}

#[tokio::test]
async fn test_apply_delta_updates_status_and_history() {
    let (engine, _, _) = engine_with(vec![plant("oak", Category::Tree, 61)], fast_settings());

    let updated = engine.apply_delta("oak", -2).await.unwrap();

    assert_eq!(updated.level, 59);
    assert_eq!(updated.status, Status::Thirsty);
    assert_eq!(updated.version, 1);
    assert_eq!(updated.history.last().unwrap().value, 59);
}

#[tokio::test]
async fn test_noop_delta_does_not_write() {
    let (engine, store, _) = engine_with(vec![plant("full", Category::Tree, 100)], fast_settings());

    let returned = engine.apply_delta("full", 5).await.unwrap();

    assert_eq!(returned.level, 100);
    assert_eq!(store.get("full").unwrap().unwrap().version, 0);
    assert!(returned.history.is_empty());
}

#[tokio::test]
async fn test_apply_delta_on_missing_plant() {
    let (engine, _, _) = engine_with(vec![], fast_settings());
    let result = engine.apply_delta("ghost", 1).await;
    assert!(matches!(result, Err(SimError::InvalidEntity { .. })));
}

#[tokio::test]
async fn test_care_uses_category_amount_and_publishes() {
    let (engine, _, broadcaster) =
        engine_with(vec![plant("pot", Category::Potted, 10)], fast_settings());
    let mut rx = broadcaster.subscribe();

    let outcome = engine.care("pot", None).await.unwrap();

    assert_eq!(outcome.gain, 40);
    assert_eq!(outcome.kind, CareKind::Treat);
    assert!(outcome.was_critical);
    assert_eq!(outcome.plant.level, 50);
    assert_eq!(outcome.plant.status, Status::Thirsty);

    let notification = rx.try_recv().unwrap();
    assert_eq!(notification.topic, TOPIC_PLANT_UPDATED);
    assert_eq!(notification.payload["plant"]["id"], "pot");
    assert_eq!(notification.payload["kind"], "treat");
    assert!(notification.payload["plant"].get("history").is_none());
}

#[tokio::test]
async fn test_care_gain_is_clamped() {
    let (engine, _, _) = engine_with(vec![plant("hedge", Category::Hedge, 90)], fast_settings());

    let outcome = engine.care("hedge", None).await.unwrap();

    assert_eq!(outcome.kind, CareKind::Prune);
    assert_eq!(outcome.gain, 10);
    assert_eq!(outcome.plant.level, 100);
    assert!(!outcome.was_critical);
}

#[tokio::test]
async fn test_care_explicit_amount_and_rejects_non_positive() {
    let (engine, _, _) = engine_with(vec![plant("elm", Category::Tree, 30)], fast_settings());

    let outcome = engine.care("elm", Some(5)).await.unwrap();
    assert_eq!(outcome.plant.level, 35);

    assert!(matches!(
        engine.care("elm", Some(0)).await,
        Err(SimError::InvalidEntity { .. })
    ));
}

// ---------------------------------------------------------------------------
// apply_weather

#[tokio::test]
async fn test_rainy_tree_at_five_stays_critical() {
    let (engine, _, _) = engine_with(vec![plant("oak", Category::Tree, 5)], fast_settings());

    let updated = engine
        .apply_weather("oak", Weather::Rainy, None)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.level, 8);
    assert_eq!(updated.status, Status::Critical);
}

#[tokio::test]
async fn test_weather_fills_missing_zone_name_only() {
    let mut named = plant("named", Category::Succulent, 50);
    named.zone_name = Some("Modena".to_string());
    let mut pending = plant("pending", Category::Succulent, 50);
    pending.zone_name = Some("⏳ ...".to_string());
    let (engine, store, _) = engine_with(vec![named, pending], fast_settings());

    // Succulents never react to cloudy weather, so only the name can change
    let untouched = engine
        .apply_weather("named", Weather::Cloudy, Some("Bologna"))
        .await
        .unwrap();
    assert!(untouched.is_none());
    assert_eq!(store.get("named").unwrap().unwrap().version, 0);

    let renamed = engine
        .apply_weather("pending", Weather::Cloudy, Some("Bologna"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renamed.zone_name.as_deref(), Some("Bologna"));
    assert_eq!(renamed.level, 50);
    assert!(renamed.history.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_weather_racing_user_actions_keeps_every_change() {
    let settings = EngineSettings {
        retry: RetryPolicy::new(10, Duration::from_millis(1)),
        ..fast_settings()
    };
    let trees: Vec<Plant> = (0..8)
        .map(|i| plant(&format!("tree-{}", i), Category::Tree, 50))
        .collect();
    let (engine, store, _) = engine_with(trees, settings);

    let mut handles = vec![];
    for i in 0..8 {
        let id = format!("tree-{}", i);
        let (e1, e2, e3) = (engine.clone(), engine.clone(), engine.clone());
        let (id1, id2, id3) = (id.clone(), id.clone(), id);
        handles.push(tokio::spawn(async move {
            e1.apply_weather(&id1, Weather::Rainy, None).await.map(|_| ())
        }));
        handles.push(tokio::spawn(async move {
            e2.care(&id2, Some(10)).await.map(|_| ())
        }));
        handles.push(tokio::spawn(async move {
            e3.apply_delta(&id3, -2).await.map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // rain +3, care +10, delta -2, in whatever order they committed
    for i in 0..8 {
        let stored = store.get(&format!("tree-{}", i)).unwrap().unwrap();
        assert_eq!(stored.level, 61);
        assert_eq!(stored.status, Status::Healthy);
        assert_eq!(stored.version, 3);
    }
}

// ---------------------------------------------------------------------------
// backfill

#[test]
fn test_plan_fifty_ticks_tree() {
    let last = ts("2024-06-01T00:00:00Z");
    let now = last + ChronoDuration::seconds(50 * 600);
    let p = with_last_sample(plant("oak", Category::Tree, 0), 80, last);

    let plan = plan(&p, now, TICK, &BackfillSettings::default()).unwrap();

    assert_eq!(plan.elapsed_ticks, 50);
    assert_eq!(plan.total_loss, 7);
    // ceil(50 / 6)
    assert_eq!(plan.points.len(), 9);
    assert_eq!(plan.final_level(), Some(73));

    let final_point = plan.points.last().unwrap();
    assert_eq!(final_point.timestamp, now);
    assert!(plan
        .points
        .windows(2)
        .all(|w| w[0].timestamp < w[1].timestamp && w[0].value >= w[1].value));
}

#[test]
fn test_plan_below_threshold_is_none() {
    let last = ts("2024-06-01T00:00:00Z");
    let p = with_last_sample(plant("oak", Category::Tree, 0), 80, last);

    let now = last + ChronoDuration::seconds(2 * 600 + 599);
    assert!(plan(&p, now, TICK, &BackfillSettings::default()).is_none());

    // Sample in the future
    let now = last - ChronoDuration::hours(5);
    assert!(plan(&p, now, TICK, &BackfillSettings::default()).is_none());
}

#[test]
fn test_plan_zero_loss_is_none() {
    let last = ts("2024-06-01T00:00:00Z");
    // 0.02 * 40 ticks floors to 0
    let p = with_last_sample(plant("aloe", Category::Succulent, 0), 50, last);
    let now = last + ChronoDuration::seconds(40 * 600);
    assert!(plan(&p, now, TICK, &BackfillSettings::default()).is_none());
}

#[test]
fn test_plan_caps_points_and_clamps_at_zero() {
    let last = ts("2024-06-01T00:00:00Z");
    let now = last + ChronoDuration::days(7);
    let p = with_last_sample(plant("pot", Category::Potted, 0), 3, last);

    let plan = plan(&p, now, TICK, &BackfillSettings::default()).unwrap();

    // 7 days = 1008 ticks
    assert_eq!(plan.elapsed_ticks, 1008);
    assert_eq!(plan.total_loss, 252);
    assert_eq!(plan.points.len(), 24);
    assert_eq!(plan.final_level(), Some(0));
    assert!(plan.points.iter().all(|s| s.value <= 3));
}

#[tokio::test]
async fn test_backfill_summary_and_versions() {
    let now = Utc::now();
    let stale = with_last_sample(
        plant("stale", Category::Tree, 0),
        80,
        now - ChronoDuration::seconds(50 * 600),
    );
    let fresh = with_last_sample(
        plant("fresh", Category::Tree, 0),
        80,
        now - ChronoDuration::seconds(600),
    );
    let no_history = plant("new", Category::Tree, 80);
    let (engine, store, _) = engine_with(vec![stale, fresh, no_history], fast_settings());

    let summary = engine
        .backfill(&BackfillSettings::default(), TICK, now)
        .await
        .unwrap();

    assert_eq!(
        summary,
        BackfillSummary {
            examined: 2,
            backfilled: 1,
            skipped: 1,
            failed: 0,
        }
    );

    let stale = store.get("stale").unwrap().unwrap();
    assert_eq!(stale.level, 73);
    assert_eq!(stale.status, Status::Healthy);
    assert_eq!(stale.last_updated, now);
    assert_eq!(stale.version, 1);
    assert_eq!(stale.history.len(), 10);

    let fresh = store.get("fresh").unwrap().unwrap();
    assert_eq!(fresh.version, 0);
    assert_eq!(fresh.history.len(), 1);
}

#[tokio::test]
async fn test_backfill_respects_history_cap() {
    let now = Utc::now();
    let mut p = plant("busy", Category::Flowerbed, 0);
    for i in 0..48 {
        p.history.push(Sample::new(
            90,
            now - ChronoDuration::days(3) - ChronoDuration::minutes(48 - i),
        ));
    }
    p.level = 90;
    let settings = EngineSettings {
        history_max: 50,
        ..fast_settings()
    };
    let (engine, store, _) = engine_with(vec![p], settings);

    engine
        .backfill(&BackfillSettings::default(), TICK, now)
        .await
        .unwrap();

    let stored = store.get("busy").unwrap().unwrap();
    assert_eq!(stored.history.len(), 50);
    assert_eq!(stored.history.last().unwrap().timestamp, now);
}

// ---------------------------------------------------------------------------
// scheduler

struct FakeForecast {
    codes: HashMap<String, u16>,
}

#[async_trait]
impl ForecastSource for FakeForecast {
    async fn weather_code(&self, coord: Coordinate) -> Result<u16> {
        let key = ZoneKey::from_coordinate(&coord)
            .map(|k| k.to_string())
            .unwrap_or_default();
        self.codes
            .get(&key)
            .copied()
            .ok_or_else(|| anyhow!("no forecast for {}", key))
    }
}

struct FakeGeocoder {
    names: HashMap<String, String>,
}

#[async_trait]
impl ReverseGeocoder for FakeGeocoder {
    async fn place_name(&self, coord: Coordinate) -> Result<Option<String>> {
        let key = ZoneKey::from_coordinate(&coord)
            .map(|k| k.to_string())
            .unwrap_or_default();
        Ok(self.names.get(&key).cloned())
    }
}

fn scheduler_for(
    engine: Arc<SimulationEngine>,
    codes: &[(&str, u16)],
    names: &[(&str, &str)],
) -> Scheduler {
    let forecast = FakeForecast {
        codes: codes.iter().map(|(k, c)| (k.to_string(), *c)).collect(),
    };
    let geocoder = FakeGeocoder {
        names: names
            .iter()
            .map(|(k, n)| (k.to_string(), n.to_string()))
            .collect(),
    };
    let resolver = Arc::new(WeatherResolver::new(
        Arc::new(forecast),
        Arc::new(geocoder),
        Duration::ZERO,
        Duration::from_secs(1),
    ));
    Scheduler::new(
        engine,
        resolver,
        SchedulerSettings {
            tick_interval: TICK,
            backfill: BackfillSettings::default(),
            home: Some(Coordinate::new(44.4949, 11.3426)),
        },
    )
}

#[tokio::test]
async fn test_tick_applies_zone_weather() {
    let plants = vec![
        located("bologna-oak", Category::Tree, 5, 44.49, 11.34),
        located("bologna-hedge", Category::Hedge, 40, 44.51, 11.33),
        located("milan-oak", Category::Tree, 50, 45.46, 9.19),
        plant("indoor", Category::Potted, 50),
    ];
    let (engine, store, broadcaster) = engine_with(plants, fast_settings());
    let mut rx = broadcaster.subscribe();

    // Milan has no forecast and is skipped
    let scheduler = scheduler_for(engine, &[("44.5_11.3", 61)], &[("44.5_11.3", "Bologna")]);
    assert!(scheduler.weather_map().is_empty());

    let report = scheduler.run_tick().await.unwrap().unwrap();

    assert_eq!(
        report,
        TickReport {
            zones: 2,
            skipped_zones: 1,
            changed: 2,
            skipped_plants: 1,
        }
    );

    let oak = store.get("bologna-oak").unwrap().unwrap();
    assert_eq!(oak.level, 8);
    assert_eq!(oak.status, Status::Critical);
    assert_eq!(oak.zone_name.as_deref(), Some("Bologna"));
    assert_eq!(store.get("bologna-hedge").unwrap().unwrap().level, 43);
    assert_eq!(store.get("milan-oak").unwrap().unwrap().version, 0);
    assert_eq!(store.get("indoor").unwrap().unwrap().version, 0);

    let map = scheduler.weather_map();
    assert_eq!(map.len(), 1);
    assert_eq!(map.get("Bologna"), Some(&Weather::Rainy));
    assert_eq!(scheduler.home_weather(), Some(Weather::Rainy));

    let weather_update = rx.try_recv().unwrap();
    assert_eq!(weather_update.topic, TOPIC_WEATHER_UPDATE);
    assert_eq!(weather_update.payload["weather"], "rainy");

    let tick = rx.try_recv().unwrap();
    assert_eq!(tick.topic, TOPIC_SIMULATION_TICK);
    assert_eq!(tick.payload["plants"].as_array().unwrap().len(), 4);
    assert_eq!(tick.payload["weather"]["Bologna"], "rainy");
    assert_eq!(tick.payload["report"]["changed"], 2);
}

#[tokio::test]
async fn test_unnamed_zone_uses_key_label() {
    let plants = vec![located("oak", Category::Tree, 50, 45.46, 9.19)];
    let (engine, store, _) = engine_with(plants, fast_settings());

    let scheduler = scheduler_for(engine, &[("45.5_9.2", 0)], &[]);
    scheduler.run_tick().await.unwrap().unwrap();

    assert_eq!(
        scheduler.weather_map().get("Zone 45.5_9.2"),
        Some(&Weather::Sunny)
    );
    assert_eq!(scheduler.home_weather(), None);
    assert_eq!(store.get("oak").unwrap().unwrap().zone_name, None);
}

#[tokio::test]
async fn test_weather_map_is_replaced_each_tick() {
    let plants = vec![located("oak", Category::Tree, 50, 44.49, 11.34)];
    let (engine, _, _) = engine_with(plants, fast_settings());

    let scheduler = scheduler_for(engine.clone(), &[("44.5_11.3", 3)], &[]);
    scheduler.run_tick().await.unwrap();
    assert_eq!(scheduler.weather_map().len(), 1);

    // Plant removed: next tick has no zones
    engine.store().delete("oak").unwrap();
    let report = scheduler.run_tick().await.unwrap().unwrap();
    assert_eq!(report.zones, 0);
    assert!(scheduler.weather_map().is_empty());
}

#[tokio::test]
async fn test_scheduler_starts_idle() {
    let (engine, _, _) = engine_with(vec![], fast_settings());
    let scheduler = scheduler_for(engine, &[], &[]);
    assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
}

/// Rain everywhere, after a delay long enough for a second tick to arrive
struct SlowForecast;

#[async_trait]
impl ForecastSource for SlowForecast {
    async fn weather_code(&self, _coord: Coordinate) -> Result<u16> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(61)
    }
}

#[tokio::test]
async fn test_overlapping_ticks_run_once() {
    let plants = vec![located("oak", Category::Tree, 5, 44.49, 11.34)];
    let (engine, store, _) = engine_with(plants, fast_settings());
    let resolver = Arc::new(WeatherResolver::new(
        Arc::new(SlowForecast),
        Arc::new(FakeGeocoder {
            names: HashMap::new(),
        }),
        Duration::ZERO,
        Duration::from_secs(1),
    ));
    let scheduler = Scheduler::new(engine, resolver, SchedulerSettings::default());

    let (first, second) = tokio::join!(scheduler.run_tick(), scheduler.run_tick());
    let first = first.unwrap();
    let second = second.unwrap();
    assert!(first.is_some() != second.is_some());

    let oak = store.get("oak").unwrap().unwrap();
    assert_eq!(oak.level, 8);
    assert_eq!(oak.version, 1);

    // The in-progress flag is cleared once the round finishes
    let third = scheduler.run_tick().await.unwrap();
    assert!(third.is_some());
    assert_eq!(store.get("oak").unwrap().unwrap().level, 11);
}
