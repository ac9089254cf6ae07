//! Home Assistant MQTT discovery documents
//!
//! Builds the retained `<discovery_prefix>/<component>/<device_id>/<entity>/config`
//! payloads that let Home Assistant auto-configure the vehicle's entities.
//! This module performs no I/O; the bridge publishes the returned map
//! verbatim, once, after the first successful connect.

use crate::config::DeviceConfig;
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Device identity shared by every discovery payload
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: String,
}

impl DeviceInfo {
    /// Build the device identity for a vehicle
    pub fn from_config(device: &DeviceConfig, vin: &str) -> Self {
        Self {
            identifiers: vec![format!("skoda_{}", vin)],
            name: device.name.clone(),
            manufacturer: device.manufacturer.clone(),
            model: device.model.clone(),
            sw_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn as_json(&self) -> Value {
        json!({
            "identifiers": self.identifiers,
            "name": self.name,
            "manufacturer": self.manufacturer,
            "model": self.model,
            "sw_version": self.sw_version,
        })
    }
}

/// Builder for the full discovery descriptor set
pub struct DiscoveryBuilder {
    device: DeviceInfo,
    device_id: String,
    topic_prefix: String,
    discovery_prefix: String,
}

impl DiscoveryBuilder {
    /// Create a builder for the given device and topic prefixes
    pub fn new(device: DeviceInfo, topic_prefix: &str, discovery_prefix: &str) -> Self {
        let device_id = device
            .identifiers
            .first()
            .cloned()
            .unwrap_or_else(|| "skoda_unknown".to_string());
        Self {
            device,
            device_id,
            topic_prefix: topic_prefix.trim_end_matches('/').to_string(),
            discovery_prefix: discovery_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// All discovery configurations, keyed by their config topic
    pub fn build(&self) -> BTreeMap<String, Value> {
        let mut configs = BTreeMap::new();
        configs.extend(self.sensor_configs());
        configs.extend(self.binary_sensor_configs());
        configs.extend(self.button_configs());
        configs
    }

    fn config_topic(&self, component: &str, entity: &str) -> String {
        format!(
            "{}/{}/{}/{}/config",
            self.discovery_prefix, component, self.device_id, entity
        )
    }

    fn state_topic(&self) -> String {
        format!("{}/state", self.topic_prefix)
    }

    fn availability_topic(&self) -> String {
        format!("{}/availability", self.topic_prefix)
    }

    fn sensor(&self, entity: &str, name: &str, template: &str, extra: Value) -> (String, Value) {
        let mut config = json!({
            "name": name,
            "unique_id": format!("{}_{}", self.device_id, entity),
            "state_topic": self.state_topic(),
            "value_template": template,
            "availability_topic": self.availability_topic(),
            "device": self.device.as_json(),
        });
        merge(&mut config, extra);
        (self.config_topic("sensor", entity), config)
    }

    fn binary_sensor(&self, entity: &str, name: &str, template: &str, extra: Value) -> (String, Value) {
        let mut config = json!({
            "name": name,
            "unique_id": format!("{}_{}", self.device_id, entity),
            "state_topic": self.state_topic(),
            "value_template": template,
            "payload_on": true,
            "payload_off": false,
            "availability_topic": self.availability_topic(),
            "device": self.device.as_json(),
        });
        merge(&mut config, extra);
        (self.config_topic("binary_sensor", entity), config)
    }

    fn button(&self, entity: &str, name: &str, icon: &str) -> (String, Value) {
        let config = json!({
            "name": name,
            "unique_id": format!("{}_{}", self.device_id, entity),
            "command_topic": format!("{}/cmd/{}", self.topic_prefix, entity),
            "payload_press": "PRESS",
            "availability_topic": self.availability_topic(),
            "device": self.device.as_json(),
            "icon": icon,
        });
        (self.config_topic("button", entity), config)
    }

    fn sensor_configs(&self) -> Vec<(String, Value)> {
        vec![
            self.sensor(
                "battery_soc",
                "Battery Level",
                "{{ value_json.battery.soc }}",
                json!({
                    "unit_of_measurement": "%",
                    "device_class": "battery",
                    "state_class": "measurement",
                }),
            ),
            self.sensor(
                "range",
                "Range",
                "{{ value_json.battery.range_km }}",
                json!({
                    "unit_of_measurement": "km",
                    "icon": "mdi:map-marker-distance",
                    "state_class": "measurement",
                }),
            ),
        ]
    }

    fn binary_sensor_configs(&self) -> Vec<(String, Value)> {
        vec![
            self.binary_sensor(
                "charging",
                "Charging",
                "{{ value_json.battery.charging }}",
                json!({"device_class": "battery_charging"}),
            ),
            self.binary_sensor(
                "plugged_in",
                "Plugged In",
                "{{ value_json.battery.plugged_in }}",
                json!({"device_class": "plug"}),
            ),
            // device_class lock reports ON for unlocked
            self.binary_sensor(
                "locked",
                "Locked",
                "{{ value_json.doors.locked }}",
                json!({
                    "device_class": "lock",
                    "payload_on": false,
                    "payload_off": true,
                }),
            ),
        ]
    }

    fn button_configs(&self) -> Vec<(String, Value)> {
        vec![
            self.button("start_charging", "Start Charging", "mdi:battery-charging"),
            self.button("stop_charging", "Stop Charging", "mdi:battery-off"),
            self.button("lock", "Lock Vehicle", "mdi:lock"),
            self.button("unlock", "Unlock Vehicle", "mdi:lock-open"),
        ]
    }
}

/// Overlay `extra`'s top-level keys onto `base`
fn merge(base: &mut Value, extra: Value) {
    if let (Value::Object(base_map), Value::Object(extra_map)) = (base, extra) {
        for (k, v) in extra_map {
            base_map.insert(k, v);
        }
    }
}
