// Notification fan-out to observers

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

/// Batched tick result: plant summaries and the zone weather map
pub const TOPIC_SIMULATION_TICK: &str = "simulation_tick";
/// Weather of the configured home zone
pub const TOPIC_WEATHER_UPDATE: &str = "weather_update";
/// A single plant changed through a care action
pub const TOPIC_PLANT_UPDATED: &str = "plant_updated";

/// Fire-and-forget publisher.
///
/// Delivery is best effort; the simulation never waits for or depends on
/// observers receiving anything.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, topic: &str, payload: Value) -> Result<()>;
}

/// Serialize and publish, logging instead of failing.
pub async fn publish_or_warn<T: Serialize>(broadcaster: &dyn Broadcaster, topic: &str, payload: &T) {
    let value = match serde_json::to_value(payload) {
        Ok(value) => value,
        Err(e) => {
            warn!(topic = %topic, error = %e, "Failed to serialize notification");
            return;
        }
    };
    if let Err(e) = broadcaster.publish(topic, value).await {
        warn!(topic = %topic, error = %e, "Failed to publish notification");
    }
}

/// Message delivered to in-process subscribers
#[derive(Clone, Debug, Serialize)]
pub struct Notification {
    pub topic: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// In-process broadcaster backed by a tokio broadcast channel.
///
/// Publishing with no subscribers is not an error.
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<Notification>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Broadcaster for ChannelBroadcaster {
    async fn publish(&self, topic: &str, payload: Value) -> Result<()> {
        let _ = self.tx.send(Notification {
            topic: topic.to_string(),
            payload,
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
