// MIT License - Copyright (c) 2026 Peter Wright
// Alarm/sensor snapshot model and the rules that derive it from API data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, Result};

/// Normalized arm state of the panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmStatus {
    Armed,
    Disarmed,
    #[serde(rename = "partialarmed")]
    PartialArmed,
    #[default]
    Unknown,
}

/// One entry of the status classification table.
#[derive(Debug, Clone, Copy)]
pub struct StatusRule {
    /// Substring that must be present in the event type.
    pub contains: &'static str,
    /// Substring that must be absent for the rule to match.
    pub unless: Option<&'static str>,
    pub status: AlarmStatus,
}

/// Event-type classification rules, evaluated top to bottom; the first match
/// wins. Anything that matches no rule is [`AlarmStatus::Disarmed`].
pub const STATUS_RULES: &[StatusRule] = &[
    StatusRule {
        contains: "partial",
        unless: None,
        status: AlarmStatus::PartialArmed,
    },
    StatusRule {
        contains: "armed",
        unless: Some("disarmed"),
        status: AlarmStatus::Armed,
    },
];

impl AlarmStatus {
    /// Classify a log entry's `EventType` text (case-insensitive).
    pub fn from_event_type(event_type: &str) -> Self {
        let text = event_type.to_lowercase();
        STATUS_RULES
            .iter()
            .find(|rule| {
                text.contains(rule.contains) && rule.unless.is_none_or(|u| !text.contains(u))
            })
            .map_or(AlarmStatus::Disarmed, |rule| rule.status)
    }

    /// Home Assistant `alarm_control_panel` state.
    pub fn ha_state(self) -> &'static str {
        match self {
            AlarmStatus::Armed => "armed_away",
            AlarmStatus::PartialArmed => "armed_home",
            AlarmStatus::Disarmed | AlarmStatus::Unknown => "disarmed",
        }
    }

    /// State of the mirrored on/off switch.
    pub fn switch_state(self) -> &'static str {
        match self {
            AlarmStatus::Armed | AlarmStatus::PartialArmed => "ON",
            AlarmStatus::Disarmed | AlarmStatus::Unknown => "OFF",
        }
    }
}

impl std::fmt::Display for AlarmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlarmStatus::Armed => "armed",
            AlarmStatus::Disarmed => "disarmed",
            AlarmStatus::PartialArmed => "partialarmed",
            AlarmStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Extract the event type of the most recent entry from a `GetLogs` response.
///
/// The response is an array ordered newest first. Returns `None` for an
/// empty log or an unexpected shape.
pub fn latest_event_type(logs: &Value) -> Option<&str> {
    logs.as_array()?.first()?.get("EventType")?.as_str()
}

/// Latest temperature/humidity of one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub serial: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<i64>,
}

/// The latest known alarm and sensor state, replaced wholesale per poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub status: AlarmStatus,
    pub sensors: Vec<SensorReading>,
    pub last_update: Option<DateTime<Utc>>,
}

// --- Housecheck response tree ---
//
// Both the temperature and the humidity endpoints answer with
// `Sections[].Places[].Components[]`.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HousecheckTree {
    #[serde(default)]
    sections: Vec<HousecheckSection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HousecheckSection {
    #[serde(default)]
    places: Vec<HousecheckPlace>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HousecheckPlace {
    #[serde(default)]
    components: Vec<HousecheckComponent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HousecheckComponent {
    #[serde(default)]
    serial_no: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    humidity: Option<f64>,
}

/// Accept numbers, numeric strings and null.
fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    })
}

fn parse_tree(tree: &Value) -> Result<HousecheckTree> {
    if !tree.is_object() {
        return Err(BridgeError::InvalidResponse {
            details: format!("expected housecheck object, got {tree}"),
        });
    }
    Ok(HousecheckTree::deserialize(tree)?)
}

/// Merges temperature and humidity readings into one entry per serial,
/// keeping first-seen order.
#[derive(Debug, Default)]
pub struct SensorMerge {
    readings: Vec<SensorReading>,
}

impl SensorMerge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every temperature found in a housecheck tree. Returns the
    /// serials touched.
    pub fn add_temperatures(&mut self, tree: &Value) -> Result<Vec<String>> {
        let mut touched = Vec::new();
        for component in components(parse_tree(tree)?) {
            if let (Some(serial), Some(value)) = (component.serial_no, component.temperature) {
                let name = component.label.unwrap_or_else(|| serial.clone());
                self.record_temperature(&serial, &name, value);
                touched.push(serial);
            }
        }
        Ok(touched)
    }

    /// Record every humidity found in a housecheck tree. Returns the serials
    /// touched.
    pub fn add_humidity(&mut self, tree: &Value) -> Result<Vec<String>> {
        let mut touched = Vec::new();
        for component in components(parse_tree(tree)?) {
            if let (Some(serial), Some(value)) = (component.serial_no, component.humidity) {
                let name = component.label.unwrap_or_else(|| serial.clone());
                #[allow(clippy::cast_possible_truncation)]
                self.record_humidity(&serial, &name, value.round() as i64);
                touched.push(serial);
            }
        }
        Ok(touched)
    }

    pub fn record_temperature(&mut self, serial: &str, name: &str, value: f64) {
        self.entry(serial, name).temperature = Some(value);
    }

    pub fn record_humidity(&mut self, serial: &str, name: &str, value: i64) {
        self.entry(serial, name).humidity = Some(value);
    }

    pub fn get(&self, serial: &str) -> Option<&SensorReading> {
        self.readings.iter().find(|r| r.serial == serial)
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn finish(self) -> Vec<SensorReading> {
        self.readings
    }

    fn entry(&mut self, serial: &str, name: &str) -> &mut SensorReading {
        let pos = match self.readings.iter().position(|r| r.serial == serial) {
            Some(pos) => pos,
            None => {
                self.readings.push(SensorReading {
                    serial: serial.to_string(),
                    name: name.to_string(),
                    temperature: None,
                    humidity: None,
                });
                self.readings.len() - 1
            }
        };
        &mut self.readings[pos]
    }
}

fn components(tree: HousecheckTree) -> impl Iterator<Item = HousecheckComponent> {
    tree.sections
        .into_iter()
        .flat_map(|s| s.places)
        .flat_map(|p| p.components)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(key: &str, entries: &[(&str, &str, Value)]) -> Value {
        let components: Vec<Value> = entries
            .iter()
            .map(|(serial, label, v)| json!({"SerialNo": serial, "Label": label, key: v}))
            .collect();
        json!({"Sections": [{"Places": [{"Components": components}]}]})
    }

    #[test]
    fn test_classify_event_types() {
        assert_eq!(AlarmStatus::from_event_type("armed"), AlarmStatus::Armed);
        assert_eq!(AlarmStatus::from_event_type("disarmed"), AlarmStatus::Disarmed);
        assert_eq!(AlarmStatus::from_event_type("partialarmed"), AlarmStatus::PartialArmed);
        assert_eq!(AlarmStatus::from_event_type("partial"), AlarmStatus::PartialArmed);
        assert_eq!(AlarmStatus::from_event_type("PartialArmed"), AlarmStatus::PartialArmed);
        assert_eq!(AlarmStatus::from_event_type("lowbattery"), AlarmStatus::Disarmed);
        assert_eq!(AlarmStatus::from_event_type(""), AlarmStatus::Disarmed);
    }

    #[test]
    fn test_partial_takes_precedence() {
        // Contains "partial", "armed" and even "disarmed"
        assert_eq!(
            AlarmStatus::from_event_type("partialdisarmed"),
            AlarmStatus::PartialArmed
        );
    }

    #[test]
    fn test_ha_mapping() {
        assert_eq!(AlarmStatus::Armed.ha_state(), "armed_away");
        assert_eq!(AlarmStatus::Armed.switch_state(), "ON");
        assert_eq!(AlarmStatus::PartialArmed.ha_state(), "armed_home");
        assert_eq!(AlarmStatus::PartialArmed.switch_state(), "ON");
        assert_eq!(AlarmStatus::Disarmed.ha_state(), "disarmed");
        assert_eq!(AlarmStatus::Disarmed.switch_state(), "OFF");
        assert_eq!(AlarmStatus::Unknown.ha_state(), "disarmed");
        assert_eq!(AlarmStatus::Unknown.switch_state(), "OFF");
    }

    #[test]
    fn test_latest_event_type() {
        let logs = json!([{"EventType": "armed"}, {"EventType": "disarmed"}]);
        assert_eq!(latest_event_type(&logs), Some("armed"));
        assert_eq!(latest_event_type(&json!([])), None);
        assert_eq!(latest_event_type(&json!({"EventType": "armed"})), None);
    }

    #[test]
    fn test_merge_by_serial() {
        let mut merge = SensorMerge::new();
        merge
            .add_temperatures(&tree("Temperature", &[("S1", "Hall", json!(21.5)), ("S2", "Attic", json!(4.0))]))
            .unwrap();
        merge.add_humidity(&tree("Humidity", &[("S1", "Hall", json!(40))])).unwrap();

        let sensors = merge.finish();
        assert_eq!(sensors.len(), 2);
        assert_eq!(
            sensors[0],
            SensorReading {
                serial: "S1".into(),
                name: "Hall".into(),
                temperature: Some(21.5),
                humidity: Some(40),
            }
        );
        assert_eq!(sensors[1].serial, "S2");
        assert_eq!(sensors[1].humidity, None);
    }

    #[test]
    fn test_string_values_and_missing_fields() {
        let mut merge = SensorMerge::new();
        let data = json!({"Sections": [{"Places": [{"Components": [
            {"SerialNo": "A", "Label": "Kitchen", "Temperature": "19,5"},
            {"SerialNo": "B", "Label": "Door"},
            {"Label": "No serial", "Temperature": 10},
            {"SerialNo": "C", "Temperature": null}
        ]}]}]});
        let touched = merge.add_temperatures(&data).unwrap();
        assert_eq!(touched, vec!["A".to_string()]);
        assert_eq!(merge.get("A").unwrap().temperature, Some(19.5));
    }

    #[test]
    fn test_unexpected_shape() {
        let mut merge = SensorMerge::new();
        assert!(merge.add_temperatures(&json!(true)).is_err());
        assert!(merge.add_humidity(&json!({"Sections": "nope"})).is_err());
        assert!(merge.is_empty());
    }

    #[test]
    fn test_snapshot_serialization() {
        let snap = Snapshot {
            status: AlarmStatus::PartialArmed,
            sensors: vec![SensorReading {
                serial: "S2".into(),
                name: "Attic".into(),
                temperature: Some(3.0),
                humidity: None,
            }],
            last_update: None,
        };
        let v = serde_json::to_value(&snap).unwrap();
        assert_eq!(v["status"], "partialarmed");
        assert!(v["sensors"][0].get("humidity").is_none());
    }
}
