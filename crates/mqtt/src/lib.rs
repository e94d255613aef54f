pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod state;

pub use client::{MqttEvent, MqttService};
pub use config::MqttConfig;
pub use dispatch::{Dispatcher, MemoryPublisher, Publisher};
pub use error::MqttError;
pub use state::{ConnectionState, Transition};
