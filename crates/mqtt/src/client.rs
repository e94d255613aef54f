use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::time::Duration;
use std::collections::HashMap;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS};
use tokio::sync::{broadcast, watch, RwLock, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::MqttConfig;
use crate::error::MqttError;
use crate::state::{ConnectionState, Transition};

#[derive(Debug, Clone)]
pub enum MqttEvent {
    Connected,
    Disconnected,
    Publish { topic: String, payload: Vec<u8> },
}

/// Handle to the broker connection. Cloning shares the same connection.
#[derive(Clone)]
pub struct MqttService {
    client: Arc<Mutex<AsyncClient>>,
    state: watch::Receiver<ConnectionState>,
    events_tx: broadcast::Sender<MqttEvent>,
    subscriptions: Arc<RwLock<HashMap<String, QoS>>>,
    shutting_down: Arc<AtomicBool>,
    // We keep the join handle alive by storing it to ensure the loop isn't dropped
    _loop_handle: Arc<JoinHandle<()>>,
}

struct LoopShared {
    client: Arc<Mutex<AsyncClient>>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<MqttEvent>,
    subscriptions: Arc<RwLock<HashMap<String, QoS>>>,
    shutting_down: Arc<AtomicBool>,
}

impl LoopShared {
    fn transition(&self, transition: Transition) {
        self.state_tx.send_modify(|state| {
            let next = state.next(transition);
            if next != *state {
                debug!(from = %state, to = %next, ?transition, "MQTT state change");
            }
            *state = next;
        });
    }
}

impl MqttService {
    // Spawns the event loop and returns before the broker answers,
    // see wait_until_connected.
    pub async fn connect(config: MqttConfig) -> Result<Self, MqttError> {
        config.validate()?;
        let (client, eventloop) = build_client(&config);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (tx, _) = broadcast::channel(256);

        let shared = LoopShared {
            client: Arc::new(Mutex::new(client)),
            state_tx,
            events_tx: tx.clone(),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            shutting_down: Arc::new(AtomicBool::new(false)),
        };
        shared.transition(Transition::ConnectAttempt);
        info!(host = %config.host, port = config.port, client_id = %config.client_id, "Starting MQTT event loop");

        let service = Self {
            client: shared.client.clone(),
            state: state_rx,
            events_tx: tx,
            subscriptions: shared.subscriptions.clone(),
            shutting_down: shared.shutting_down.clone(),
            _loop_handle: Arc::new(tokio::spawn(run_eventloop(eventloop, shared, config))),
        };
        Ok(service)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state().can_publish()
    }

    pub fn events(&self) -> broadcast::Receiver<MqttEvent> {
        self.events_tx.subscribe()
    }

    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<ConnectionState, MqttError> {
        self.wait_for_state(timeout, |s| s.can_publish()).await
    }

    async fn wait_for_state(
        &self,
        timeout: Duration,
        done: impl FnMut(&ConnectionState) -> bool,
    ) -> Result<ConnectionState, MqttError> {
        let mut rx = self.state.clone();
        // the watch::Ref borrows rx, copy the state out before rx is dropped
        let result = match tokio::time::timeout(timeout, rx.wait_for(done)).await {
            Ok(Ok(state)) => Ok(*state),
            Ok(Err(_)) => Err(MqttError::NotConnected),
            Err(_) => Err(MqttError::Timeout(timeout)),
        };
        result
    }

    pub async fn publish<T: Into<Vec<u8>>>(&self, topic: &str, qos: QoS, retain: bool, payload: T) -> Result<(), MqttError> {
        let client = self.client.lock().await;
        client.publish(topic, qos, retain, payload).await?;
        Ok(())
    }

    pub async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), MqttError> {
        let client = self.client.lock().await;
        client.subscribe(topic, qos).await?;
        // Track successful subscriptions so they survive a reconnect
        let mut subs = self.subscriptions.write().await;
        subs.insert(topic.to_string(), qos);
        Ok(())
    }

    /// Request a clean disconnect. Requests queued before this one are
    /// still sent. The event loop stops instead of reconnecting.
    pub async fn disconnect(&self) -> Result<(), MqttError> {
        self.shutting_down.store(true, Ordering::Relaxed);
        let client = self.client.lock().await;
        client.disconnect().await?;
        Ok(())
    }

    // Disconnect and wait for the queued publishes to be flushed.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), MqttError> {
        self.disconnect().await?;
        self.wait_for_state(timeout, |s| *s == ConnectionState::Disconnected).await?;
        Ok(())
    }
}

fn build_client(config: &MqttConfig) -> (AsyncClient, EventLoop) {
    let mut opts = MqttOptions::new(&config.client_id, &config.host, config.port);
    opts.set_keep_alive(Duration::from_secs(config.keep_alive_secs as u64));
    opts.set_clean_session(config.clean_session);
    if let (Some(u), Some(p)) = (&config.username, &config.password) {
        opts.set_credentials(u.clone(), p.clone());
    }
    opts.set_request_channel_capacity(64);
    AsyncClient::new(opts, 64)
}

async fn run_eventloop(mut eventloop: EventLoop, shared: LoopShared, config: MqttConfig) {
    let mut backoff_secs = 1u64;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                info!(host = %config.host, "MQTT connected");
                shared.transition(Transition::ConnAck);
                let _ = shared.events_tx.send(MqttEvent::Connected);

                // Restore all tracked subscriptions after reconnection
                let subs = shared.subscriptions.read().await;
                let client = shared.client.lock().await;
                for (topic, qos) in subs.iter() {
                    debug!("Restoring subscription to {}", topic);
                    // try_subscribe: this task drains the request queue, so never block on it
                    if let Err(err) = client.try_subscribe(topic, *qos) {
                        warn!(?err, "Failed to restore subscription to {}", topic);
                    }
                }
                drop(client);
                drop(subs);

                backoff_secs = 1;
            }
            Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                debug!(pkid = ack.pkid, "MQTT subscription acknowledged");
                shared.transition(Transition::SubAck);
            }
            Ok(Event::Incoming(Incoming::Publish(p))) => {
                let topic = p.topic.to_string();
                let payload = p.payload.to_vec();
                let _ = shared.events_tx.send(MqttEvent::Publish { topic, payload });
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("MQTT disconnect requested");
                shared.transition(Transition::ConnectionLost);
                let _ = shared.events_tx.send(MqttEvent::Disconnected);
                if shared.shutting_down.load(Ordering::Relaxed) {
                    break;
                }
            }
            Ok(other) => {
                debug!(?other, "MQTT event");
            }
            Err(e) => {
                shared.transition(Transition::ConnectionLost);
                let _ = shared.events_tx.send(MqttEvent::Disconnected);
                if shared.shutting_down.load(Ordering::Relaxed) {
                    debug!(error = ?e, "MQTT event loop stopped during shutdown");
                    break;
                }
                error!(error = ?e, "MQTT error; will attempt reconnect");

                // Exponential backoff with cap
                let wait = backoff_secs.min(30);
                sleep(Duration::from_secs(wait)).await;
                backoff_secs = (backoff_secs * 2).min(60);
                if shared.shutting_down.load(Ordering::Relaxed) {
                    break;
                }

                // Replace both eventloop and client with fresh instances
                let (new_client, new_eventloop) = build_client(&config);
                eventloop = new_eventloop;
                {
                    let mut client_guard = shared.client.lock().await;
                    *client_guard = new_client;
                }
                shared.transition(Transition::ConnectAttempt);
                info!("MQTT client and eventloop rebuilt, attempting reconnection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let cfg = MqttConfig { host: String::new(), ..MqttConfig::default() };
        assert!(matches!(MqttService::connect(cfg).await, Err(MqttError::Config(_))));
    }

    #[tokio::test]
    async fn test_wait_times_out_without_broker() {
        // nothing listens on port 1
        let cfg = MqttConfig { host: "127.0.0.1".into(), port: 1, ..MqttConfig::default() };
        let Ok(mqtt) = MqttService::connect(cfg).await else {
            panic!("valid config rejected");
        };

        let err = mqtt.wait_until_connected(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, MqttError::Timeout(_)));
        assert!(!mqtt.is_ready());

        mqtt.shutdown(Duration::from_secs(5)).await.unwrap();
        assert_eq!(mqtt.state(), ConnectionState::Disconnected);
    }
}
