use anyhow::{Context, Result};
use chlorophyll::broadcast::{Broadcaster, ChannelBroadcaster};
use chlorophyll::config::{self, DEFAULT_CONFIG_PATH};
use chlorophyll::engine::{Scheduler, SimulationEngine};
use chlorophyll::nats::{NatsBroadcaster, NatsClient};
use chlorophyll::store::SqliteStore;
use chlorophyll::weather::{NominatimClient, OpenMeteoClient, WeatherResolver};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chlorophyll=info".into()),
        )
        .init();

    info!("Chlorophyll starting...");

    let config_path =
        std::env::var("CHLOROPHYLL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = config::load_config(&config_path)?;
    config::apply_process_env(&mut config);
    if let Err(e) = config.validate() {
        error!(path = %config_path, error = %e, "Refusing to start");
        return Err(e.into());
    }

    info!(
        tick_interval_secs = config.simulation.tick_interval_seconds,
        db = %config.store.path,
        nats = config.nats.enabled,
        "Configuration loaded"
    );

    let store = Arc::new(
        SqliteStore::new(&config.store.path)?.with_thresholds(config.thresholds),
    );

    let broadcaster: Arc<dyn Broadcaster> = if config.nats.enabled {
        let client = NatsClient::connect(config.nats.clone()).await?;
        Arc::new(NatsBroadcaster::new(&client))
    } else {
        Arc::new(ChannelBroadcaster::default())
    };

    let weather = &config.weather;
    let forecast = OpenMeteoClient::new(
        weather.forecast_url.clone(),
        &weather.user_agent,
        weather.request_timeout(),
    )
    .context("Failed to build forecast client")?;
    let geocoder = NominatimClient::new(
        weather.geocode_url.clone(),
        &weather.user_agent,
        weather.request_timeout(),
    )
    .context("Failed to build geocoding client")?;
    let resolver = Arc::new(WeatherResolver::new(
        Arc::new(forecast),
        Arc::new(geocoder),
        weather.geocode_min_interval(),
        weather.request_timeout(),
    ));

    let engine = Arc::new(SimulationEngine::new(
        store,
        broadcaster,
        config.engine_settings(),
    ));
    let scheduler = Scheduler::new(engine, resolver, config.scheduler_settings());

    tokio::select! {
        _ = scheduler.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
    }

    info!("Chlorophyll stopped");
    Ok(())
}
