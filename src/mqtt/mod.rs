// MIT License - Copyright (c) 2026 Peter Wright
// MQTT side of the bridge: topics, publishing, connection event loop

pub mod command;
pub mod discovery;

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::config::MqttSettings;
use crate::error::Result;
use crate::status::{AlarmStatus, SensorReading};

use self::command::{CommandSender, route_publish};
use self::discovery::{SensorKind, alarm_panel_document, sensor_document, switch_document};

pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";

/// Anything that can put a message on the broker.
///
/// Implemented for [`rumqttc::AsyncClient`]; tests substitute a recorder.
pub trait Publisher: Clone + Send + Sync + 'static {
    fn publish(
        &self,
        topic: &str,
        payload: String,
        retain: bool,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Queues without waiting: while the broker is unreachable the request
/// channel fills up and further messages fail with `BridgeError::Mqtt`
/// instead of stalling the caller.
impl Publisher for AsyncClient {
    async fn publish(&self, topic: &str, payload: String, retain: bool) -> Result<()> {
        self.try_publish(topic, QoS::AtLeastOnce, retain, payload)?;
        Ok(())
    }
}

/// Topic layout for one panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
    discovery_prefix: String,
    panel_id: String,
}

impl Topics {
    pub fn new(settings: &MqttSettings, panel_id: &str) -> Self {
        Self {
            prefix: settings.prefix.trim_end_matches('/').to_string(),
            discovery_prefix: settings.discovery_prefix.trim_end_matches('/').to_string(),
            panel_id: panel_id.trim().to_string(),
        }
    }

    /// Topic-safe form of a device serial.
    pub fn object_id(serial: &str) -> String {
        serial
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect()
    }

    pub fn panel_id(&self) -> &str {
        &self.panel_id
    }

    pub fn availability(&self) -> String {
        availability_topic(&self.prefix)
    }

    pub fn command(&self) -> String {
        format!("{}/{}/set", self.prefix, self.panel_id)
    }

    pub fn switch_command(&self) -> String {
        format!("{}/{}/set_switch", self.prefix, self.panel_id)
    }

    pub fn state(&self) -> String {
        format!("{}/{}/state", self.prefix, self.panel_id)
    }

    pub fn switch_state(&self) -> String {
        format!("{}/{}/state_switch", self.prefix, self.panel_id)
    }

    pub fn sensor_state(&self, serial: &str) -> String {
        format!("{}/sensor/{}/state", self.prefix, Self::object_id(serial))
    }

    pub fn panel_config(&self) -> String {
        format!(
            "{}/alarm_control_panel/sa_{}/config",
            self.discovery_prefix, self.panel_id
        )
    }

    pub fn switch_config(&self) -> String {
        format!("{}/switch/sa_{}_switch/config", self.discovery_prefix, self.panel_id)
    }

    pub fn sensor_config(&self, serial: &str, kind: SensorKind) -> String {
        format!(
            "{}/sensor/sa_{}_{}/config",
            self.discovery_prefix,
            Self::object_id(serial),
            kind.suffix()
        )
    }
}

/// Availability topic for a prefix; independent of the panel.
pub fn availability_topic(prefix: &str) -> String {
    format!("{}/bridge/status", prefix.trim_end_matches('/'))
}

/// JSON body for a sensor state topic, holding only the present readings.
pub fn sensor_payload(reading: &SensorReading) -> Value {
    let mut body = Map::new();
    if let Some(t) = reading.temperature {
        body.insert("temperature".to_string(), Value::from(t));
    }
    if let Some(h) = reading.humidity {
        body.insert("humidity".to_string(), Value::from(h));
    }
    Value::Object(body)
}

/// Publishes discovery documents and retained state.
///
/// Publish failures are logged, never returned: a lost message is repaired
/// by the next tick.
#[derive(Clone)]
pub struct MqttBridge<P> {
    publisher: P,
    announced: Arc<Mutex<HashSet<String>>>,
}

impl<P: Publisher> MqttBridge<P> {
    pub fn new(publisher: P) -> Self {
        Self {
            publisher,
            announced: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Drop the record of announced discovery documents so they are all
    /// sent again. Called on broker (re)connect and on fresh tokens.
    pub fn forget_discovery(&self) {
        if let Ok(mut announced) = self.announced.lock() {
            announced.clear();
        }
    }

    /// Publish the panel and switch discovery documents unless already
    /// announced.
    pub async fn announce_panel(&self, topics: &Topics) {
        if topics.panel_id().is_empty() {
            return;
        }
        let panel = alarm_panel_document(topics);
        if self.first_announcement(&panel.unique_id) {
            let ok = self.publish_json(&topics.panel_config(), &panel, true).await;
            self.settle_announcement(&panel.unique_id, ok);
        }
        let switch = switch_document(topics);
        if self.first_announcement(&switch.unique_id) {
            let ok = self.publish_json(&topics.switch_config(), &switch, true).await;
            self.settle_announcement(&switch.unique_id, ok);
        }
    }

    /// Publish the discovery documents for each kind present in `reading`.
    pub async fn announce_sensor(&self, topics: &Topics, reading: &SensorReading) {
        for kind in SensorKind::present_in(reading) {
            let doc = sensor_document(topics, reading, kind);
            if self.first_announcement(&doc.unique_id) {
                let topic = topics.sensor_config(&reading.serial, kind);
                let ok = self.publish_json(&topic, &doc, true).await;
                self.settle_announcement(&doc.unique_id, ok);
            }
        }
    }

    /// Publish the alarm state and the mirrored switch state, retained.
    pub async fn publish_status(&self, topics: &Topics, status: AlarmStatus) {
        self.publish_raw(&topics.state(), status.ha_state(), true).await;
        self.publish_raw(&topics.switch_state(), status.switch_state(), true).await;
    }

    /// Publish one merged sensor reading, retained.
    pub async fn publish_sensor(&self, topics: &Topics, reading: &SensorReading) {
        let body = sensor_payload(reading);
        self.publish_json(&topics.sensor_state(&reading.serial), &body, true).await;
    }

    pub async fn publish_availability(&self, prefix: &str, online: bool) {
        let payload = if online { ONLINE } else { OFFLINE };
        self.publish_raw(&availability_topic(prefix), payload, true).await;
    }

    async fn publish_raw(&self, topic: &str, payload: &str, retain: bool) -> bool {
        match self.publisher.publish(topic, payload.to_string(), retain).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to publish to {topic}: {e}");
                false
            }
        }
    }

    async fn publish_json(&self, topic: &str, payload: &impl Serialize, retain: bool) -> bool {
        match serde_json::to_string(payload) {
            Ok(json) => self.publish_raw(topic, &json, retain).await,
            Err(e) => {
                error!("Failed to serialize MQTT payload for {topic}: {e}");
                false
            }
        }
    }

    fn first_announcement(&self, unique_id: &str) -> bool {
        match self.announced.lock() {
            Ok(mut announced) => announced.insert(unique_id.to_string()),
            Err(_) => true,
        }
    }

    fn settle_announcement(&self, unique_id: &str, published: bool) {
        if !published {
            if let Ok(mut announced) = self.announced.lock() {
                announced.remove(unique_id);
            }
        }
    }
}

/// Connection options with the `offline` last will on the availability topic.
pub fn mqtt_options(settings: &MqttSettings) -> MqttOptions {
    let mut options = MqttOptions::new(&settings.client_id, &settings.broker, settings.port);
    options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(5)));
    if let Some(username) = settings.username.as_deref().filter(|u| !u.is_empty()) {
        options.set_credentials(username, settings.password.clone().unwrap_or_default());
    }
    options.set_last_will(LastWill::new(
        availability_topic(&settings.prefix),
        OFFLINE,
        QoS::AtLeastOnce,
        true,
    ));
    options
}

/// Connect a client for `settings`. Network I/O starts once the returned
/// event loop is driven by [`run_event_loop`].
pub fn connect(settings: &MqttSettings) -> (MqttBridge<AsyncClient>, EventLoop) {
    let (client, eventloop) = AsyncClient::new(mqtt_options(settings), 256);
    (MqttBridge::new(client), eventloop)
}

/// Drive the MQTT connection until the client disconnects.
///
/// rumqttc reconnects on the next poll after an error but does not restore
/// subscriptions, so every ConnAck re-subscribes, re-announces availability
/// and forgets the discovery cache. Recognized commands are handed to the
/// reconciler through `commands`; this task never touches the session.
pub async fn run_event_loop(
    mut eventloop: EventLoop,
    bridge: MqttBridge<AsyncClient>,
    prefix: String,
    topics: Option<Topics>,
    commands: CommandSender,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT: connected");
                bridge.forget_discovery();
                bridge.publish_availability(&prefix, true).await;
                if let Some(topics) = &topics {
                    for topic in [topics.command(), topics.switch_command()] {
                        debug!("MQTT: subscribing to {topic}");
                        if let Err(e) = bridge.publisher().try_subscribe(&topic, QoS::AtLeastOnce) {
                            error!("Failed to subscribe to {topic}: {e}");
                        }
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(msg))) => {
                let Some(topics) = &topics else { continue };
                match route_publish(topics, &msg.topic, &msg.payload) {
                    Some(mode) => {
                        info!("MQTT command on {}: {mode:?}", msg.topic);
                        if let Err(e) = commands.try_send(mode) {
                            warn!("Dropping MQTT command {mode:?}: {e}");
                        }
                    }
                    None => debug!(
                        "Ignoring MQTT message on {}: {}",
                        msg.topic,
                        String::from_utf8_lossy(&msg.payload)
                    ),
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("MQTT: disconnected");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT event loop error: {e}");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
