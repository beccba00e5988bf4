use crate::plant::Coordinate;
use crate::weather::ReverseGeocoder;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// Name used when the provider answers but the address has no locality
pub const UNKNOWN_PLACE: &str = "Unknown zone";

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
}

impl Address {
    fn locality(self) -> Option<String> {
        self.city
            .or(self.town)
            .or(self.village)
            .or(self.municipality)
    }
}

/// HTTP client for Nominatim reverse geocoding.
///
/// Nominatim's usage policy requires an identifying User-Agent and at most
/// one request per second; the latter is enforced by the resolver's throttle.
pub struct NominatimClient {
    http_client: Client,
    base_url: String,
}

impl NominatimClient {
    pub fn new(base_url: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("Failed to build geocoding HTTP client")?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimClient {
    async fn place_name(&self, coord: Coordinate) -> Result<Option<String>> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("format", "json".to_string()),
                ("lat", coord.lat.to_string()),
                ("lon", coord.lng.to_string()),
            ])
            .send()
            .await
            .context("Failed to send reverse geocoding request")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Reverse geocoding API error: {}", status));
        }

        let body: ReverseResponse = response
            .json()
            .await
            .context("Failed to parse reverse geocoding response")?;

        let name = body
            .address
            .unwrap_or_default()
            .locality()
            .unwrap_or_else(|| UNKNOWN_PLACE.to_string());
        Ok(Some(name))
    }
}
