use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::models::{Location, Observation, OwmEntry, OwmErrorBody, OwmForecast};

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("weather provider returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("malformed weather response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("forecast entry {offset} has no icon code")]
    MissingIcon { offset: usize },

    #[error("forecast offset {offset} is beyond the {len} returned entries")]
    ForecastOffset { offset: usize, len: usize },
}

#[async_trait]
pub trait ObservationFetcher: Send + Sync {
    async fn current(&self, location: &Location) -> Result<Observation, WeatherError>;

    /// Forecast in 3 hour steps, nearest first.
    async fn forecast(&self, location: &Location) -> Result<Vec<Observation>, WeatherError>;
}

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

pub struct OpenWeatherMap {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    units: String,
}

impl OpenWeatherMap {
    pub fn new(base_url: &str, api_key: &str, units: &str) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("matrixfeed/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            units: units.to_string(),
        })
    }

    async fn get(&self, endpoint: &str, location: &Location) -> Result<String, WeatherError> {
        let (key, value) = location.query_pair();
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(%url, %location, "querying weather provider");
        let resp = self
            .client
            .get(&url)
            .query(&[(key, value.as_str()), ("units", self.units.as_str()), ("appid", self.api_key.as_str())])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl ObservationFetcher for OpenWeatherMap {
    async fn current(&self, location: &Location) -> Result<Observation, WeatherError> {
        parse_current(&self.get("weather", location).await?)
    }

    async fn forecast(&self, location: &Location) -> Result<Vec<Observation>, WeatherError> {
        parse_forecast(&self.get("forecast", location).await?)
    }
}

fn api_error(status: StatusCode, body: &str) -> WeatherError {
    let message = serde_json::from_str::<OwmErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());
    WeatherError::Api { status, message }
}

pub fn parse_current(body: &str) -> Result<Observation, WeatherError> {
    let entry: OwmEntry = serde_json::from_str(body)?;
    Ok(entry.into_observation())
}

// Entries without an icon are kept so offsets still line up with the provider's list.
pub fn parse_forecast(body: &str) -> Result<Vec<Observation>, WeatherError> {
    let forecast: OwmForecast = serde_json::from_str(body)?;
    Ok(forecast.list.into_iter().map(OwmEntry::into_observation).collect())
}
