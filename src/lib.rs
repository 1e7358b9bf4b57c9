// MIT License - Copyright (c) 2026 Peter Wright
//
//! # sector-alarm-bridge
//!
//! Bridge between the Sector Alarm cloud API and an MQTT broker, following
//! Home Assistant discovery conventions.
//!
//! The pieces:
//!
//! - [`CloudSession`] logs in (including two-factor verification), checks
//!   the bearer token and performs the authenticated API calls.
//! - [`Reconciler`] is the poll loop: it keeps the session authenticated,
//!   fetches the event log and housecheck readings, and publishes them.
//! - [`MqttBridge`] publishes discovery documents, retained state and
//!   availability; inbound commands reach the reconciler over a channel.
//! - [`Bridge`] is the shared context holding configuration, session and
//!   [`BridgeState`] under one lock, plus the latest [`Snapshot`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sector_alarm_bridge::{Bridge, ConfigStore, PasswordCipher, Reconciler, mqtt};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cipher = PasswordCipher::load_or_generate("secrets.key".as_ref())?;
//!     let bridge = Arc::new(Bridge::load(ConfigStore::new("sector2mqtt.toml", cipher))?);
//!
//!     let config = bridge.config();
//!     let (publisher, eventloop) = mqtt::connect(&config.mqtt);
//!     let (tx, rx) = mqtt::command::command_channel();
//!     tokio::spawn(mqtt::run_event_loop(eventloop, publisher.clone(), config.mqtt.prefix.clone(), None, tx));
//!
//!     let (_stop, shutdown) = tokio::sync::watch::channel(false);
//!     Reconciler::new(bridge, publisher, rx).run(shutdown).await;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod mqtt;
pub mod reconciler;
pub mod secret;
pub mod session;
pub mod state;
pub mod status;
pub mod web;

// Re-exports for convenience
pub use bridge::{Bridge, Core};
pub use config::{BridgeConfig, ConfigStore, ConfigUpdate, CloudSettings, MqttSettings};
pub use error::{BridgeError, Result};
pub use mqtt::{MqttBridge, Publisher, Topics};
pub use reconciler::Reconciler;
pub use secret::PasswordCipher;
pub use session::{ArmMode, CloudSession, LoginOutcome};
pub use state::BridgeState;
pub use status::{AlarmStatus, SensorReading, Snapshot};
