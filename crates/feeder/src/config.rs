use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::models::Location;
use crate::weather::DEFAULT_BASE_URL;

/// Urayasu, JP
const DEFAULT_PLACE_ID: u64 = 1849186;
// Index into the 3-hourly forecast: 2 is 6 to 8 hours ahead.
const DEFAULT_FORECAST_OFFSET: usize = 2;

#[derive(Debug, Clone)]
pub struct FeederConfig {
    pub api_key: String,
    pub base_url: String,
    pub units: String,
    pub location: Location,
    pub forecast_offset: usize,
    /// `None` runs a single cycle and exits.
    pub interval: Option<Duration>,
    pub http_addr: Option<SocketAddr>,
    pub connect_timeout: Duration,
    pub dry_run: bool,
}

impl FeederConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("OPENWEATHERMAP_API_KEY")
            .ok_or_else(|| anyhow!("OPENWEATHERMAP_API_KEY is not set"))?;

        // an id wins over a name, as ids are unambiguous
        let location = match (get("FEEDER_PLACE_ID"), get("FEEDER_PLACE_NAME")) {
            (Some(id), _) => Location::Id(id.parse::<u64>().with_context(|| format!("invalid FEEDER_PLACE_ID {:?}", id))?),
            (None, Some(name)) => Location::Name(name),
            (None, None) => Location::Id(DEFAULT_PLACE_ID),
        };

        let forecast_offset = match get("FEEDER_FORECAST_OFFSET") {
            Some(v) => v.parse::<usize>().with_context(|| format!("invalid FEEDER_FORECAST_OFFSET {:?}", v))?,
            None => DEFAULT_FORECAST_OFFSET,
        };

        let interval = match get("FEEDER_INTERVAL_SECS") {
            Some(v) => {
                let secs: u64 = v.parse().with_context(|| format!("invalid FEEDER_INTERVAL_SECS {:?}", v))?;
                if secs == 0 {
                    bail!("FEEDER_INTERVAL_SECS must be greater than zero");
                }
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        let http_addr = get("FEEDER_HTTP_ADDR")
            .map(|v| v.parse::<SocketAddr>().with_context(|| format!("invalid FEEDER_HTTP_ADDR {:?}", v)))
            .transpose()?;

        let connect_timeout = get("FEEDER_CONNECT_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));

        let dry_run = get("FEEDER_DRY_RUN").map(|v| matches!(v.as_str(), "1" | "true" | "yes")).unwrap_or(false);

        Ok(Self {
            api_key,
            base_url: get("OPENWEATHERMAP_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            units: get("OPENWEATHERMAP_UNITS").unwrap_or_else(|| "metric".to_string()),
            location,
            forecast_offset,
            interval,
            http_addr,
            connect_timeout,
            dry_run,
        })
    }
}
