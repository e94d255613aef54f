use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use dotenvy::dotenv;
use matrixfeed_core::feed_name;
use matrixfeed_mqtt::{Dispatcher, MemoryPublisher, MqttConfig, MqttEvent, MqttService, Publisher};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use rumqttc::QoS;
use tokio::signal;
use tokio::sync::{broadcast, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod models;
mod services;
mod weather;

use config::FeederConfig;
use services::{CycleReport, FeederService};
use weather::{ObservationFetcher, OpenWeatherMap};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

struct Metrics {
    registry: Registry,
    mqtt_connected: IntGauge,
    cycles_total: IntCounter,
    cycle_failures_total: IntCounter,
    commands_published_total: IntCounter,
}

impl Metrics {
    fn new(registry: Registry) -> Result<Arc<Self>> {
        let mqtt_connected = IntGauge::new("matrixfeed_mqtt_connected", "MQTT connection status (1 connected, 0 otherwise)")?;
        let cycles_total = IntCounter::new("matrixfeed_cycles_total", "Feed cycles started")?;
        let cycle_failures_total = IntCounter::new("matrixfeed_cycle_failures_total", "Feed cycles that ended in an error")?;
        let commands_published_total = IntCounter::new("matrixfeed_commands_published_total", "Matrix commands handed to MQTT")?;

        registry.register(Box::new(mqtt_connected.clone()))?;
        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(cycle_failures_total.clone()))?;
        registry.register(Box::new(commands_published_total.clone()))?;

        Ok(Arc::new(Self { registry, mqtt_connected, cycles_total, cycle_failures_total, commands_published_total }))
    }

    fn render(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        Ok((encoder.format_type().to_string(), buf))
    }

    fn record(&self, result: &Result<CycleReport>) {
        self.cycles_total.inc();
        match result {
            Ok(report) => self.commands_published_total.inc_by(report.published.len() as u64),
            Err(_) => self.cycle_failures_total.inc(),
        }
    }
}

#[derive(Clone)]
struct OpsState {
    mqtt: MqttService,
    metrics: Arc<Metrics>,
    last_report: Arc<RwLock<Option<CycleReport>>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let cfg = FeederConfig::from_env()?;
    let mqtt_cfg = MqttConfig::from_env();
    let fetcher = OpenWeatherMap::new(&cfg.base_url, &cfg.api_key, &cfg.units)?;
    info!(location = %cfg.location, offset = cfg.forecast_offset, "Feeding forecast to matrix");

    if cfg.dry_run {
        let dispatcher = Dispatcher::new(MemoryPublisher::new(), mqtt_cfg.command_topic());
        let service = FeederService::new(fetcher, dispatcher, cfg.location.clone(), cfg.forecast_offset);
        let report = service.run_once().await?;
        info!(commands = ?report.published, "Dry run complete, nothing sent to the broker");
        return Ok(());
    }

    // MQTT setup
    tracing::info!(host = %mqtt_cfg.host, port = mqtt_cfg.port, "Configuring MQTT client");
    let mqtt = MqttService::connect(mqtt_cfg.clone()).await.context("Failed to initialize MQTT")?;
    let metrics = Metrics::new(prometheus::default_registry().clone())?;

    // Device debug output is only echoed to the log
    tokio::spawn(mqtt_consumer_loop(mqtt.events(), mqtt_cfg.debug_feed.clone(), metrics.clone()));
    if let Err(e) = mqtt.subscribe(&mqtt_cfg.debug_topic(), QoS::AtMostOnce).await {
        tracing::warn!(?e, "Failed to subscribe to debug feed");
    }
    let state = mqtt
        .wait_until_connected(cfg.connect_timeout)
        .await
        .context("MQTT broker did not accept the connection")?;
    info!(%state, "Listening for {} messages", mqtt_cfg.debug_feed);

    let service = FeederService::new(fetcher, Dispatcher::new(mqtt.clone(), mqtt_cfg.command_topic()), cfg.location.clone(), cfg.forecast_offset);

    let result = match cfg.interval {
        None => {
            let result = service.run_once().await;
            metrics.record(&result);
            result.map(|_| ())
        }
        Some(period) => {
            let ops = OpsState { mqtt: mqtt.clone(), metrics: metrics.clone(), last_report: Arc::new(RwLock::new(None)) };
            if let Some(addr) = cfg.http_addr {
                tokio::spawn(serve_ops(addr, ops.clone()));
            }
            tokio::select! {
                _ = run_periodic(&service, period, &metrics, &ops.last_report) => {},
                _ = shutdown_signal() => info!("Shutdown requested"),
            }
            Ok(())
        }
    };

    if let Err(e) = mqtt.shutdown(SHUTDOWN_TIMEOUT).await {
        warn!(?e, "MQTT did not disconnect cleanly");
    }
    result
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,axum=info,hyper=info,reqwest=info,rumqttc=warn"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// One cycle per tick. A slow cycle delays the next tick instead of
/// overlapping it; a failed cycle is logged and the next one still runs.
async fn run_periodic<F, P>(
    service: &FeederService<F, P>,
    period: Duration,
    metrics: &Metrics,
    last_report: &RwLock<Option<CycleReport>>,
) where
    F: ObservationFetcher,
    P: Publisher,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let result = service.run_once().await;
        metrics.record(&result);
        match result {
            Ok(report) => *last_report.write().await = Some(report),
            Err(e) => error!(error = ?e, "Feed cycle failed"),
        }
    }
}

async fn mqtt_consumer_loop(mut rx: broadcast::Receiver<MqttEvent>, debug_feed: String, metrics: Arc<Metrics>) {
    loop {
        match rx.recv().await {
            Ok(MqttEvent::Connected) => metrics.mqtt_connected.set(1),
            Ok(MqttEvent::Disconnected) => {
                metrics.mqtt_connected.set(0);
                warn!("Disconnected from MQTT broker");
            }
            Ok(MqttEvent::Publish { topic, payload }) => {
                if let Some(value) = debug_echo(&topic, &payload, &debug_feed) {
                    info!("Feed {} received new value: {}", debug_feed, value);
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "MQTT event consumer lagged"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

// Device debug output is echoed, anything else on the connection is ignored.
fn debug_echo(topic: &str, payload: &[u8], debug_feed: &str) -> Option<String> {
    (feed_name(topic) == debug_feed).then(|| String::from_utf8_lossy(payload).into_owned())
}

async fn serve_ops(addr: SocketAddr, state: OpsState) {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/version", get(version))
        .route("/metrics", get(metrics_handler))
        .route("/status", get(last_cycle))
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, error = ?e, "Failed to bind ops HTTP server");
            return;
        }
    };
    info!(%addr, "Starting ops HTTP server");
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = ?e, "Ops HTTP server stopped");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(?e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!(?e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn healthz() -> &'static str { "ok" }

async fn readyz(State(state): State<OpsState>) -> StatusCode {
    if state.mqtt.is_ready() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE }
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics_handler(State(state): State<OpsState>) -> Response {
    match state.metrics.render() {
        Ok((content_type, buf)) => (StatusCode::OK, [(CONTENT_TYPE, content_type)], buf).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn last_cycle(State(state): State<OpsState>) -> Response {
    let report = state.last_report.read().await;
    let body = serde_json::json!({
        "mqtt": state.mqtt.state().to_string(),
        "last_cycle": *report,
    });
    Json(body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, Observation};
    use crate::weather::WeatherError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn obs(icon: &str) -> Observation {
        Observation {
            time: None,
            status: "Rain".into(),
            description: "light rain".into(),
            icon: Some(icon.into()),
            temperature: None,
        }
    }

    /// Fails the second cycle only.
    #[derive(Default)]
    struct SecondCycleFails {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ObservationFetcher for SecondCycleFails {
        async fn current(&self, _location: &Location) -> Result<Observation, WeatherError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err(WeatherError::Api {
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                    message: "busy".into(),
                });
            }
            Ok(obs("10n"))
        }

        async fn forecast(&self, _location: &Location) -> Result<Vec<Observation>, WeatherError> {
            Ok(vec![obs("01d"), obs("01d"), obs("10n")])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_keeps_running_after_failed_cycle() {
        let metrics = Metrics::new(Registry::new()).unwrap();
        let publisher = MemoryPublisher::new();
        let service = FeederService::new(
            SecondCycleFails::default(),
            Dispatcher::new(publisher.clone(), "matrix_command"),
            Location::Id(1849186),
            2,
        );
        let last_report = RwLock::new(None);
        let period = Duration::from_secs(600);

        // ticks at 0, 600 and 1200 seconds
        let stopped = tokio::time::timeout(period * 2 + period / 2, run_periodic(&service, period, &metrics, &last_report)).await;
        assert!(stopped.is_err());

        assert_eq!(metrics.cycles_total.get(), 3);
        assert_eq!(metrics.cycle_failures_total.get(), 1);
        assert_eq!(metrics.commands_published_total.get(), 4);
        assert_eq!(publisher.payloads().len(), 4);
        assert_eq!(last_report.read().await.as_ref().map(|r| r.category), Some("rainy"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_keeps_last_report() {
        let metrics = Metrics::new(Registry::new()).unwrap();
        let service = FeederService::new(
            SecondCycleFails::default(),
            Dispatcher::new(MemoryPublisher::new(), "matrix_command"),
            Location::Id(1849186),
            2,
        );
        let last_report = RwLock::new(None);
        let period = Duration::from_secs(60);

        let _ = tokio::time::timeout(period + period / 2, run_periodic(&service, period, &metrics, &last_report)).await;

        assert_eq!(metrics.cycle_failures_total.get(), 1);
        assert!(last_report.read().await.is_some());
    }

    #[test]
    fn test_debug_echo_only_for_debug_feed() {
        assert_eq!(debug_echo("alice/feeds/matrix_debug", b"ok 01", "matrix_debug").as_deref(), Some("ok 01"));
        assert_eq!(debug_echo("matrix_debug", b"boot", "matrix_debug").as_deref(), Some("boot"));
        assert_eq!(debug_echo("alice/feeds/matrix_command", b"FF0200", "matrix_debug"), None);
    }

    #[tokio::test]
    async fn test_consumer_loop_tracks_connection() {
        let metrics = Metrics::new(Registry::new()).unwrap();
        let (tx, rx) = broadcast::channel(8);
        tx.send(MqttEvent::Connected).unwrap();
        tx.send(MqttEvent::Publish { topic: "matrix_debug".into(), payload: b"hello".to_vec() }).unwrap();
        drop(tx);

        mqtt_consumer_loop(rx, "matrix_debug".into(), metrics.clone()).await;
        assert_eq!(metrics.mqtt_connected.get(), 1);

        let (tx, rx) = broadcast::channel(8);
        tx.send(MqttEvent::Disconnected).unwrap();
        drop(tx);
        mqtt_consumer_loop(rx, "matrix_debug".into(), metrics.clone()).await;
        assert_eq!(metrics.mqtt_connected.get(), 0);
    }

    #[test]
    fn test_metrics_render() {
        let metrics = Metrics::new(Registry::new()).unwrap();
        metrics.record(&Err(anyhow::anyhow!("boom")));
        let (content_type, body) = metrics.render().unwrap();
        let body = String::from_utf8(body).unwrap();

        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("matrixfeed_cycles_total 1"));
        assert!(body.contains("matrixfeed_cycle_failures_total 1"));
    }
}
