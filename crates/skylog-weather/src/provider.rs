use std::time::Duration;

use reqwest::{Client, StatusCode};
use skylog_core::{NetworkError, ReqwestErrorExt, Settings};

use crate::types::WeatherPayload;

/// Characters of a successful response body echoed to the log
const LOG_PREVIEW_CHARS: usize = 100;

/// Result of one fetch. Failures are a value, never an error.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Decoded payload, temperature still in Kelvin
    Received(WeatherPayload),
    /// Nothing usable this time
    NoData(NoDataReason),
}

#[derive(Debug, Clone)]
pub enum NoDataReason {
    /// The API answered with something other than 200
    Status(u16),
    /// Request never completed
    Network(NetworkError),
    /// 200 with a body that is not a weather payload
    Decode(String),
}

impl std::fmt::Display for NoDataReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoDataReason::Status(code) => write!(f, "weather API returned status {}", code),
            NoDataReason::Network(e) => write!(f, "{}", e),
            NoDataReason::Decode(e) => write!(f, "unreadable weather payload: {}", e),
        }
    }
}

/// Client for an OpenWeatherMap-style current-weather endpoint.
#[derive(Debug, Clone)]
pub struct WeatherProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl WeatherProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| e.into_network_error())?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, NetworkError> {
        Self::new(
            settings.api_url.clone(),
            settings.api_key.clone(),
            settings.request_timeout(),
        )
    }

    /// Fetch current conditions for `city`.
    ///
    /// Every failure is logged here and returned as [`FetchOutcome::NoData`].
    pub async fn fetch(&self, city: &str) -> FetchOutcome {
        tracing::debug!("Fetching weather for {}", city);

        let response = match self
            .client
            .get(&self.base_url)
            .query(&[("q", city), ("appid", self.api_key.as_str())])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                let err = e.into_network_error();
                tracing::error!("An error occurred while fetching weather data: {}", err);
                return FetchOutcome::NoData(NoDataReason::Network(err));
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            tracing::warn!(
                "Failed to fetch weather data for {}. Status code: {}",
                city,
                status.as_u16()
            );
            return FetchOutcome::NoData(NoDataReason::Status(status.as_u16()));
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                let err = e.into_network_error();
                tracing::error!("Failed to read weather response body: {}", err);
                return FetchOutcome::NoData(NoDataReason::Network(err));
            }
        };

        tracing::info!(
            "Successful response. Data: {}",
            body.chars().take(LOG_PREVIEW_CHARS).collect::<String>()
        );

        match serde_json::from_str::<WeatherPayload>(&body) {
            Ok(payload) => FetchOutcome::Received(payload),
            Err(e) => {
                tracing::error!("Weather response for {} could not be decoded: {}", city, e);
                FetchOutcome::NoData(NoDataReason::Decode(e.to_string()))
            }
        }
    }
}
