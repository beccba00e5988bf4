use super::ChlorophyllConfig;
use tracing::warn;

/// Apply environment overrides from the process environment.
pub fn apply_process_env(config: &mut ChlorophyllConfig) {
    apply_env_overrides(config, |key| std::env::var(key).ok());
}

/// Apply overrides from `lookup`, falling back to the file values.
///
/// Unparseable values are ignored with a warning.
pub fn apply_env_overrides<F>(config: &mut ChlorophyllConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("CHLOROPHYLL_DB_PATH") {
        config.store.path = v;
    }
    if let Some(v) = lookup("CHLOROPHYLL_TICK_INTERVAL_SECONDS") {
        match v.parse::<u64>() {
            Ok(n) => config.simulation.tick_interval_seconds = n,
            Err(_) => warn!(value = %v, "Ignoring invalid CHLOROPHYLL_TICK_INTERVAL_SECONDS"),
        }
    }
    if let Some(v) = lookup("CHLOROPHYLL_SEED") {
        match v.parse::<u64>() {
            Ok(n) => config.simulation.seed = Some(n),
            Err(_) => warn!(value = %v, "Ignoring invalid CHLOROPHYLL_SEED"),
        }
    }
    if let Some(v) = lookup("NATS_URL") {
        config.nats.url = v;
    }
    if let Some(v) = lookup("CHLOROPHYLL_NATS_ENABLED") {
        match v.parse::<bool>() {
            Ok(b) => config.nats.enabled = b,
            Err(_) => warn!(value = %v, "Ignoring invalid CHLOROPHYLL_NATS_ENABLED"),
        }
    }
}
