use crate::plant::Coordinate;
use crate::weather::ForecastSource;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: Option<CurrentWeather>,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    weathercode: u16,
}

/// HTTP client for the Open-Meteo forecast API (no key required).
pub struct OpenMeteoClient {
    http_client: Client,
    base_url: String,
}

impl OpenMeteoClient {
    /// Create a client against `base_url` (the mock server URL in tests).
    pub fn new(base_url: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("Failed to build forecast HTTP client")?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ForecastSource for OpenMeteoClient {
    async fn weather_code(&self, coord: Coordinate) -> Result<u16> {
        let url = format!("{}/v1/forecast", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("latitude", coord.lat.to_string()),
                ("longitude", coord.lng.to_string()),
                ("current_weather", "true".to_string()),
            ])
            .send()
            .await
            .context("Failed to send forecast request")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Forecast API error: {}", status));
        }

        let body: ForecastResponse = response
            .json()
            .await
            .context("Failed to parse forecast response")?;

        body.current_weather
            .map(|current| current.weathercode)
            .ok_or_else(|| anyhow!("Forecast response has no current_weather block"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client(url: String) -> OpenMeteoClient {
        OpenMeteoClient::new(url, "chlorophyll-test/1.0", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_weather_code() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/forecast")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("latitude".into(), "44.4949".into()),
                Matcher::UrlEncoded("longitude".into(), "11.3426".into()),
                Matcher::UrlEncoded("current_weather".into(), "true".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "latitude": 44.5,
                    "longitude": 11.34,
                    "current_weather": {
                        "temperature": 18.2,
                        "windspeed": 7.1,
                        "weathercode": 61
                    }
                }"#,
            )
            .create_async()
            .await;

        let code = client(server.url())
            .weather_code(Coordinate::new(44.4949, 11.3426))
            .await
            .unwrap();
        assert_eq!(code, 61);
    }

    #[tokio::test]
    async fn test_missing_current_weather_is_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/forecast")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"latitude": 44.5, "longitude": 11.34}"#)
            .create_async()
            .await;

        let err = client(server.url())
            .weather_code(Coordinate::new(44.5, 11.3))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("current_weather"));
    }

    #[tokio::test]
    async fn test_server_error_is_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/forecast")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let err = client(server.url())
            .weather_code(Coordinate::new(44.5, 11.3))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
