// MIT License - Copyright (c) 2026 Peter Wright
// Home Assistant MQTT discovery documents

use serde::Serialize;

use crate::mqtt::{OFFLINE, ONLINE, Topics};
use crate::status::SensorReading;

const MANUFACTURER: &str = "Sector Alarm";

/// Device record that groups entities in Home Assistant.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via_device: Option<String>,
}

/// `alarm_control_panel` entity for the panel.
#[derive(Debug, Clone, Serialize)]
pub struct AlarmPanelDocument {
    pub name: String,
    pub unique_id: String,
    pub command_topic: String,
    pub state_topic: String,
    pub availability_topic: String,
    pub payload_available: &'static str,
    pub payload_not_available: &'static str,
    pub code_arm_required: bool,
    pub code_disarm_required: bool,
    pub supported_features: Vec<&'static str>,
    pub device: DeviceInfo,
}

/// On/off `switch` mirroring the armed state.
#[derive(Debug, Clone, Serialize)]
pub struct SwitchDocument {
    pub name: String,
    pub unique_id: String,
    pub command_topic: String,
    pub state_topic: String,
    pub availability_topic: String,
    pub payload_on: &'static str,
    pub payload_off: &'static str,
    pub state_on: &'static str,
    pub state_off: &'static str,
    pub icon: &'static str,
    pub device: DeviceInfo,
}

/// Temperature or humidity `sensor`.
#[derive(Debug, Clone, Serialize)]
pub struct SensorDocument {
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    pub availability_topic: String,
    pub unit_of_measurement: &'static str,
    pub device_class: &'static str,
    pub state_class: &'static str,
    pub value_template: String,
    pub device: DeviceInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Temperature,
    Humidity,
}

impl SensorKind {
    /// Suffix used in unique ids and config topics.
    pub fn suffix(self) -> &'static str {
        match self {
            SensorKind::Temperature => "temp",
            SensorKind::Humidity => "hum",
        }
    }

    /// Key in the sensor state JSON.
    pub fn key(self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
        }
    }

    fn unit(self) -> &'static str {
        match self {
            SensorKind::Temperature => "°C",
            SensorKind::Humidity => "%",
        }
    }

    fn label(self) -> &'static str {
        match self {
            SensorKind::Temperature => "Temperature",
            SensorKind::Humidity => "Humidity",
        }
    }

    /// Kinds present in a reading.
    pub fn present_in(reading: &SensorReading) -> Vec<SensorKind> {
        let mut kinds = Vec::with_capacity(2);
        if reading.temperature.is_some() {
            kinds.push(SensorKind::Temperature);
        }
        if reading.humidity.is_some() {
            kinds.push(SensorKind::Humidity);
        }
        kinds
    }
}

fn panel_device(topics: &Topics) -> DeviceInfo {
    DeviceInfo {
        identifiers: vec![format!("sa_{}", topics.panel_id())],
        name: "Sector Alarm".to_string(),
        manufacturer: MANUFACTURER,
        model: Some("Alarm panel"),
        via_device: None,
    }
}

pub fn alarm_panel_document(topics: &Topics) -> AlarmPanelDocument {
    AlarmPanelDocument {
        name: "Sector Alarm Panel".to_string(),
        unique_id: format!("sa_panel_{}", topics.panel_id()),
        command_topic: topics.command(),
        state_topic: topics.state(),
        availability_topic: topics.availability(),
        payload_available: ONLINE,
        payload_not_available: OFFLINE,
        code_arm_required: false,
        code_disarm_required: false,
        supported_features: vec!["arm_home", "arm_away"],
        device: panel_device(topics),
    }
}

pub fn switch_document(topics: &Topics) -> SwitchDocument {
    SwitchDocument {
        name: "Sector Alarm Armed".to_string(),
        unique_id: format!("sa_{}_switch", topics.panel_id()),
        command_topic: topics.switch_command(),
        state_topic: topics.switch_state(),
        availability_topic: topics.availability(),
        payload_on: "ON",
        payload_off: "OFF",
        state_on: "ON",
        state_off: "OFF",
        icon: "mdi:shield-home",
        device: panel_device(topics),
    }
}

pub fn sensor_document(topics: &Topics, reading: &SensorReading, kind: SensorKind) -> SensorDocument {
    let object_id = Topics::object_id(&reading.serial);
    SensorDocument {
        name: format!("{} {}", reading.name, kind.label()),
        unique_id: format!("sa_{object_id}_{}", kind.suffix()),
        state_topic: topics.sensor_state(&reading.serial),
        availability_topic: topics.availability(),
        unit_of_measurement: kind.unit(),
        device_class: kind.key(),
        state_class: "measurement",
        value_template: format!("{{{{ value_json.{} }}}}", kind.key()),
        device: DeviceInfo {
            identifiers: vec![format!("sa_dev_{object_id}")],
            name: reading.name.clone(),
            manufacturer: MANUFACTURER,
            model: None,
            via_device: Some(format!("sa_{}", topics.panel_id())),
        },
    }
}
