use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("invalid MQTT configuration: {0}")]
    Config(String),

    #[error("MQTT event loop has stopped")]
    NotConnected,

    #[error("timed out after {0:?} waiting for the broker")]
    Timeout(Duration),
}
