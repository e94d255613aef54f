use anyhow::{Context, Result};
use matrixfeed_core::{BlinkRate, Command, IconCategory};
use matrixfeed_mqtt::{Dispatcher, Publisher};
use serde::Serialize;
use tracing::info;

use crate::models::{Location, Observation};
use crate::weather::{ObservationFetcher, WeatherError};

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub location: String,
    pub current: Observation,
    pub forecast: Observation,
    pub category: &'static str,
    /// Wire strings in publish order.
    pub published: Vec<String>,
}

pub struct FeederService<F, P> {
    fetcher: F,
    dispatcher: Dispatcher<P>,
    location: Location,
    forecast_offset: usize,
}

impl<F: ObservationFetcher, P: Publisher> FeederService<F, P> {
    pub fn new(fetcher: F, dispatcher: Dispatcher<P>, location: Location, forecast_offset: usize) -> Self {
        Self { fetcher, dispatcher, location, forecast_offset }
    }

    /// Fetch, map and publish once. An unmappable icon aborts the cycle before
    /// anything is published. A failed icon publish leaves the blink setting
    /// applied; nothing is rolled back.
    pub async fn run_once(&self) -> Result<CycleReport> {
        let current = self
            .fetcher
            .current(&self.location)
            .await
            .with_context(|| format!("fetching current weather for {}", self.location))?;
        info!(
            location = %self.location,
            status = %current.status,
            icon = current.icon.as_deref().unwrap_or("-"),
            temp = ?current.temperature,
            "current weather: {}",
            current.description
        );

        let forecast = self
            .fetcher
            .forecast(&self.location)
            .await
            .with_context(|| format!("fetching forecast for {}", self.location))?;
        let len = forecast.len();
        let ahead = forecast
            .into_iter()
            .nth(self.forecast_offset)
            .ok_or(WeatherError::ForecastOffset { offset: self.forecast_offset, len })?;

        let icon = ahead
            .icon
            .as_deref()
            .ok_or(WeatherError::MissingIcon { offset: self.forecast_offset })?;
        let category = IconCategory::from_icon_code(icon)
            .with_context(|| format!("forecast at {:?}", ahead.time))?;
        info!(icon, at = ?ahead.time, "It's {}.", category);

        let commands = [
            Command::SetBlinkRate(BlinkRate::AlwaysOn),
            Command::DisplayIcon(category.payload()),
        ];
        let mut published = Vec::with_capacity(commands.len());
        for command in &commands {
            self.dispatcher.send(command).await.with_context(|| format!("publishing {}", command))?;
            published.push(command.encode());
        }

        Ok(CycleReport {
            location: self.location.to_string(),
            current,
            forecast: ahead,
            category: category.as_str(),
            published,
        })
    }
}
