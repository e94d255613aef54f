use hostname::get as get_hostname;
use std::env;

use matrixfeed_core::{feed_topic, COMMAND_FEED, DEBUG_FEED};

use crate::error::MqttError;

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u16,
    pub clean_session: bool,
    pub command_feed: String,
    pub debug_feed: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        let host = "io.adafruit.com".to_string();
        let port = 1883;
        let client_id = default_client_id();
        let keep_alive_secs = 30;
        Self {
            host,
            port,
            client_id,
            username: None,
            password: None,
            keep_alive_secs,
            clean_session: true,
            command_feed: COMMAND_FEED.to_string(),
            debug_feed: DEBUG_FEED.to_string(),
        }
    }
}

impl MqttConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let mut cfg = MqttConfig::default();

        if let Some(v) = get("MQTT_BROKER_HOST") {
            cfg.host = v;
        }
        if let Some(p) = get("MQTT_BROKER_PORT").and_then(|v| v.parse::<u16>().ok()) {
            cfg.port = p;
        }
        if let Some(v) = get("MQTT_CLIENT_ID") {
            cfg.client_id = v;
        }
        // Adafruit IO names are accepted as a fallback for the generic ones
        cfg.username = get("MQTT_USERNAME").or_else(|| get("ADAFRUIT_IO_USERNAME"));
        cfg.password = get("MQTT_PASSWORD").or_else(|| get("ADAFRUIT_IO_KEY"));
        if let Some(s) = get("MQTT_KEEP_ALIVE_SECS").and_then(|v| v.parse::<u16>().ok()) {
            cfg.keep_alive_secs = s;
        }
        if let Some(v) = get("MATRIX_COMMAND_FEED") {
            cfg.command_feed = v;
        }
        if let Some(v) = get("MATRIX_DEBUG_FEED") {
            cfg.debug_feed = v;
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), MqttError> {
        if self.host.trim().is_empty() {
            return Err(MqttError::Config("broker host is empty".into()));
        }
        if self.port == 0 {
            return Err(MqttError::Config("broker port is 0".into()));
        }
        if self.client_id.trim().is_empty() {
            return Err(MqttError::Config("client id is empty".into()));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(MqttError::Config("username and password must be set together".into()));
        }
        if self.command_feed.is_empty() || self.debug_feed.is_empty() {
            return Err(MqttError::Config("feed names must not be empty".into()));
        }
        Ok(())
    }

    pub fn command_topic(&self) -> String {
        feed_topic(self.username.as_deref(), &self.command_feed)
    }

    pub fn debug_topic(&self) -> String {
        feed_topic(self.username.as_deref(), &self.debug_feed)
    }
}

fn default_client_id() -> String {
    let host = get_hostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    let pid = std::process::id();
    format!("matrixfeed-{}-{}", host, pid)
}
