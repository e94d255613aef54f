use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// City name, optionally with a country code: `Urayasu,JP`.
    Name(String),
    /// OpenWeatherMap city id.
    Id(u64),
}

impl Location {
    pub fn query_pair(&self) -> (&'static str, String) {
        match self {
            Location::Name(name) => ("q", name.clone()),
            Location::Id(id) => ("id", id.to_string()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Name(name) => f.write_str(name),
            Location::Id(id) => write!(f, "city #{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    pub status: String,
    pub description: String,
    /// Provider icon code such as `10n`, when the provider sent one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

// ----- OpenWeatherMap response bodies -----

#[derive(Debug, Deserialize)]
pub struct OwmCondition {
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub description: String,
    pub icon: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OwmMain {
    pub temp: Option<f64>,
}

// Shared by `/weather` and each entry of `/forecast`'s `list`.
#[derive(Debug, Deserialize)]
pub struct OwmEntry {
    pub dt: Option<i64>,
    #[serde(default)]
    pub weather: Vec<OwmCondition>,
    pub main: Option<OwmMain>,
}

#[derive(Debug, Deserialize)]
pub struct OwmForecast {
    #[serde(default)]
    pub list: Vec<OwmEntry>,
}

#[derive(Debug, Deserialize)]
pub struct OwmErrorBody {
    pub message: String,
}

impl OwmEntry {
    // Only the first condition is kept, the provider lists the primary one first.
    pub fn into_observation(self) -> Observation {
        let (status, description, icon) = match self.weather.into_iter().next() {
            Some(c) => (c.main, c.description, c.icon.filter(|i| !i.is_empty())),
            None => (String::new(), String::new(), None),
        };
        Observation {
            time: self.dt.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            status,
            description,
            icon,
            temperature: self.main.and_then(|m| m.temp),
        }
    }
}
