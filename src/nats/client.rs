use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

/// NATS configuration
#[derive(Clone, Debug, Deserialize)]
pub struct NatsConfig {
    /// Publish notifications to NATS instead of the in-process channel
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_url")]
    pub url: String,
    /// Subjects are `{subject_prefix}.{topic}`
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

fn default_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_subject_prefix() -> String {
    "chlorophyll".to_string()
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_url(),
            subject_prefix: default_subject_prefix(),
        }
    }
}

impl NatsConfig {
    pub fn subject_for(&self, topic: &str) -> String {
        format!("{}.{}", self.subject_prefix, topic)
    }
}

/// Core NATS connection
pub struct NatsClient {
    client: async_nats::Client,
    config: NatsConfig,
}

impl NatsClient {
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        info!("Connecting to NATS at {}", config.url);

        let client = async_nats::connect(&config.url)
            .await
            .context("Failed to connect to NATS")?;

        Ok(Self { client, config })
    }

    /// Get underlying NATS client
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    pub fn config(&self) -> &NatsConfig {
        &self.config
    }
}
