//! Configuration management for enyaq2mqtt
//!
//! This module handles loading, validation, and management of the application
//! configuration from a JSON file with environment variable overrides.
//! Environment variables always win over file values.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Skoda Connect account and vehicle identity
    pub skoda: SkodaConfig,

    /// MQTT broker connection configuration
    pub mqtt: MqttConfig,

    /// Home Assistant discovery configuration
    pub discovery: DiscoveryConfig,

    /// Device identity used in discovery payloads
    pub device: DeviceConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Polling interval in seconds
    pub poll_interval_secs: u64,

    /// Backoff after a failed upstream call, in seconds
    pub error_cooldown_secs: u64,

    /// Timeout for individual vehicle API calls, in seconds
    pub command_timeout_secs: u64,
}

/// Skoda Connect credentials and vehicle identity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkodaConfig {
    /// Skoda Connect account username
    pub username: String,

    /// Skoda Connect account password
    pub password: String,

    /// Vehicle Identification Number
    pub vin: String,
}

/// MQTT broker connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker hostname or IP address
    pub broker: String,

    /// Broker TCP port (typically 1883)
    pub port: u16,

    /// Broker username (empty = anonymous)
    pub username: String,

    /// Broker password
    pub password: String,

    /// Prefix for all state/command topics
    pub topic_prefix: String,

    /// MQTT client identifier
    pub client_id: String,
}

/// Home Assistant MQTT discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Whether to publish discovery documents after connect
    pub enabled: bool,

    /// Discovery topic prefix
    pub prefix: String,
}

/// Device identity advertised through discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Human-readable device name
    pub name: String,

    /// Manufacturer string
    pub manufacturer: String,

    /// Model string
    pub model: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to the log directory or file; empty disables file logging
    pub file: String,

    /// Number of rotated log files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "127.0.0.1".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            topic_prefix: "skoda/enyaq".to_string(),
            client_id: "enyaq2mqtt".to_string(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: "homeassistant".to_string(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "Skoda Enyaq".to_string(),
            manufacturer: "Skoda".to_string(),
            model: "Enyaq iV".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: String::new(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skoda: SkodaConfig::default(),
            mqtt: MqttConfig::default(),
            discovery: DiscoveryConfig::default(),
            device: DeviceConfig::default(),
            logging: LoggingConfig::default(),
            poll_interval_secs: 300,
            error_cooldown_secs: 60,
            command_timeout_secs: 30,
        }
    }
}

fn override_string<F: Fn(&str) -> Option<String>>(get: &F, name: &str, target: &mut String) {
    if let Some(v) = get(name)
        && !v.is_empty()
    {
        *target = v;
    }
}

fn override_parse<T, F>(get: &F, name: &str, target: &mut T) -> Result<()>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = get(name)
        && !v.is_empty()
    {
        *target = v
            .parse()
            .map_err(|_| BridgeError::validation(name, "invalid value"))?;
    }
    Ok(())
}

fn override_bool<F: Fn(&str) -> Option<String>>(get: &F, name: &str, target: &mut bool) {
    if let Some(v) = get(name)
        && !v.is_empty()
    {
        *target = matches!(v.to_lowercase().as_str(), "true" | "1" | "yes");
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from an optional file plus environment
    /// overrides, then validate. This is the startup entry point.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides on top of the current values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, get: F) -> Result<()> {
        override_string(&get, "SKODA_USERNAME", &mut self.skoda.username);
        override_string(&get, "SKODA_PASSWORD", &mut self.skoda.password);
        override_string(&get, "SKODA_VIN", &mut self.skoda.vin);

        override_string(&get, "MQTT_BROKER", &mut self.mqtt.broker);
        override_parse(&get, "MQTT_PORT", &mut self.mqtt.port)?;
        override_string(&get, "MQTT_USERNAME", &mut self.mqtt.username);
        override_string(&get, "MQTT_PASSWORD", &mut self.mqtt.password);
        override_string(&get, "MQTT_TOPIC_PREFIX", &mut self.mqtt.topic_prefix);
        override_string(&get, "MQTT_CLIENT_ID", &mut self.mqtt.client_id);

        override_parse(&get, "POLL_INTERVAL", &mut self.poll_interval_secs)?;
        override_parse(&get, "ERROR_COOLDOWN", &mut self.error_cooldown_secs)?;
        override_parse(&get, "COMMAND_TIMEOUT", &mut self.command_timeout_secs)?;

        override_bool(&get, "HA_DISCOVERY", &mut self.discovery.enabled);
        override_string(&get, "HA_DISCOVERY_PREFIX", &mut self.discovery.prefix);
        override_string(&get, "DEVICE_NAME", &mut self.device.name);

        override_string(&get, "LOG_LEVEL", &mut self.logging.level);
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.skoda.username.is_empty() {
            return Err(BridgeError::validation(
                "skoda.username",
                "Skoda Connect username is required",
            ));
        }

        if self.skoda.password.is_empty() {
            return Err(BridgeError::validation(
                "skoda.password",
                "Skoda Connect password is required",
            ));
        }

        if self.skoda.vin.is_empty() {
            return Err(BridgeError::validation(
                "skoda.vin",
                "vehicle VIN is required",
            ));
        }

        if self.mqtt.broker.is_empty() {
            return Err(BridgeError::validation(
                "mqtt.broker",
                "broker address cannot be empty",
            ));
        }

        if self.mqtt.port == 0 {
            return Err(BridgeError::validation(
                "mqtt.port",
                "port must be greater than 0",
            ));
        }

        if self.mqtt.topic_prefix.is_empty() {
            return Err(BridgeError::validation(
                "mqtt.topic_prefix",
                "topic prefix cannot be empty",
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(BridgeError::validation(
                "poll_interval_secs",
                "must be greater than 0",
            ));
        }

        if self.error_cooldown_secs == 0 {
            return Err(BridgeError::validation(
                "error_cooldown_secs",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Summary for startup logging with credentials redacted
    pub fn summary(&self) -> String {
        format!(
            "broker={}:{} topic_prefix={} poll_interval={}s cooldown={}s discovery={} vin={}",
            self.mqtt.broker,
            self.mqtt.port,
            self.mqtt.topic_prefix,
            self.poll_interval_secs,
            self.error_cooldown_secs,
            self.discovery.enabled,
            redact_vin(&self.skoda.vin),
        )
    }
}

/// Keep only the last 4 characters of the VIN visible
fn redact_vin(vin: &str) -> String {
    if vin.len() <= 4 {
        return vin.to_string();
    }
    let tail: String = vin.chars().skip(vin.chars().count().saturating_sub(4)).collect();
    format!("***{}", tail)
}
