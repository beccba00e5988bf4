use super::client::{NatsClient, NatsConfig};
use crate::broadcast::Broadcaster;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Broadcaster publishing JSON notifications on core NATS subjects
#[derive(Clone)]
pub struct NatsBroadcaster {
    client: async_nats::Client,
    config: NatsConfig,
}

impl NatsBroadcaster {
    pub fn new(nats: &NatsClient) -> Self {
        Self {
            client: nats.client().clone(),
            config: nats.config().clone(),
        }
    }
}

#[async_trait]
impl Broadcaster for NatsBroadcaster {
    /// Subject format: {prefix}.{topic}
    async fn publish(&self, topic: &str, payload: Value) -> Result<()> {
        let subject = self.config.subject_for(topic);
        let bytes = serde_json::to_vec(&payload).context("Failed to serialize notification")?;

        debug!(subject = %subject, size = bytes.len(), "Publishing notification to NATS");

        self.client
            .publish(subject.clone(), bytes.into())
            .await
            .with_context(|| format!("Failed to publish to subject '{}'", subject))?;

        Ok(())
    }
}
