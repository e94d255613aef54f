// Commands are fire-and-forget: QoS 0, never retained.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use matrixfeed_core::{BlinkRate, Brightness, Command, Rotation};
use rumqttc::QoS;
use tracing::{info, warn};

use crate::client::MqttService;
use crate::error::MqttError;

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish_text(&self, topic: &str, payload: String) -> Result<(), MqttError>;
}

#[async_trait]
impl Publisher for MqttService {
    async fn publish_text(&self, topic: &str, payload: String) -> Result<(), MqttError> {
        self.publish(topic, QoS::AtMostOnce, false, payload).await
    }
}

// Records publishes in memory. Used for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn payloads(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, payload)| payload).collect()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish_text(&self, topic: &str, payload: String) -> Result<(), MqttError> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((topic.to_string(), payload));
        Ok(())
    }
}

pub struct Dispatcher<P> {
    publisher: P,
    topic: String,
}

impl<P: Publisher> Dispatcher<P> {
    pub fn new(publisher: P, topic: impl Into<String>) -> Self {
        Self { publisher, topic: topic.into() }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub async fn send(&self, command: &Command) -> Result<(), MqttError> {
        let msg = command.encode();
        self.publisher.publish_text(&self.topic, msg.clone()).await?;
        info!(topic = %self.topic, opcode = command.opcode(), "published: {}", msg);
        Ok(())
    }

    // Out-of-range settings publish nothing and are not an error. Each returns
    // whether a command went out.

    pub async fn set_brightness(&self, brightness: i32) -> Result<bool, MqttError> {
        self.send_setting("brightness", brightness, Brightness::new(brightness).map(Command::SetBrightness)).await
    }

    pub async fn set_rotation(&self, rotation: i32) -> Result<bool, MqttError> {
        self.send_setting("rotation", rotation, Rotation::new(rotation).map(Command::SetRotation)).await
    }

    pub async fn set_blink_rate(&self, blink: i32) -> Result<bool, MqttError> {
        self.send_setting("blink rate", blink, BlinkRate::new(blink).map(Command::SetBlinkRate)).await
    }

    async fn send_setting(&self, name: &str, value: i32, command: Option<Command>) -> Result<bool, MqttError> {
        match command {
            Some(command) => self.send(&command).await.map(|_| true),
            None => {
                warn!(setting = name, value, "setting out of range, nothing published");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrixfeed_core::{IconCategory, TestPattern};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct FailingPublisher;

    #[async_trait]
    impl Publisher for FailingPublisher {
        async fn publish_text(&self, _topic: &str, _payload: String) -> Result<(), MqttError> {
            Err(MqttError::Timeout(Duration::from_secs(1)))
        }
    }

    #[tokio::test]
    async fn test_send_publishes_wire_string_on_topic() {
        let publisher = MemoryPublisher::new();
        let dispatcher = Dispatcher::new(publisher.clone(), "alice/feeds/matrix_command");

        dispatcher.send(&Command::Test(TestPattern::FaceSmiley)).await.unwrap();
        dispatcher.send(&Command::DisplayIcon(IconCategory::Sunny.payload())).await.unwrap();

        assert_eq!(
            publisher.sent(),
            vec![
                ("alice/feeds/matrix_command".to_string(), "0000".to_string()),
                ("alice/feeds/matrix_command".to_string(), "0108221C551C22080000".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_settings_in_range() {
        let publisher = MemoryPublisher::new();
        let dispatcher = Dispatcher::new(publisher.clone(), "matrix_command");

        assert!(dispatcher.set_brightness(15).await.unwrap());
        assert!(dispatcher.set_rotation(2).await.unwrap());
        assert!(dispatcher.set_blink_rate(0).await.unwrap());

        assert_eq!(publisher.payloads(), vec!["FF000F", "FF0102", "FF0200"]);
    }

    #[tokio::test]
    async fn test_settings_out_of_range_publish_nothing() {
        let publisher = MemoryPublisher::new();
        let dispatcher = Dispatcher::new(publisher.clone(), "matrix_command");

        assert!(!dispatcher.set_brightness(16).await.unwrap());
        assert!(!dispatcher.set_rotation(-1).await.unwrap());
        assert!(!dispatcher.set_blink_rate(4).await.unwrap());

        assert!(publisher.sent().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_is_returned() {
        let dispatcher = Dispatcher::new(FailingPublisher, "matrix_command");
        let err = dispatcher.send(&Command::Test(TestPattern::Standby)).await.unwrap_err();
        assert!(matches!(err, MqttError::Timeout(_)));
    }
}
