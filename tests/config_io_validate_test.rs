use enyaq2mqtt::config::Config;
use std::fs;

fn valid_config() -> Config {
    let mut config = Config::default();
    config.skoda.username = "user@example.com".to_string();
    config.skoda.password = "secret".to_string();
    config.skoda.vin = "TMBJB9NY0MF000000".to_string();
    config
}

#[test]
fn save_and_load_json_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.json");

    let mut config = valid_config();
    config.mqtt.broker = "10.0.0.5".to_string();
    config.mqtt.topic_prefix = "garage/enyaq".to_string();

    config.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.mqtt.broker, "10.0.0.5");
    assert_eq!(loaded.mqtt.topic_prefix, "garage/enyaq");
    assert_eq!(loaded.skoda.vin, config.skoda.vin);
}

#[test]
fn config_validation_errors() {
    let mut config = valid_config();
    assert!(config.validate().is_ok());

    // Missing identity fields are fatal
    config.skoda.username.clear();
    assert!(config.validate().is_err());

    config = valid_config();
    config.skoda.password.clear();
    assert!(config.validate().is_err());

    config = valid_config();
    config.skoda.vin.clear();
    assert!(config.validate().is_err());

    // Broker and intervals
    config = valid_config();
    config.mqtt.broker.clear();
    assert!(config.validate().is_err());

    config = valid_config();
    config.mqtt.port = 0;
    assert!(config.validate().is_err());

    config = valid_config();
    config.poll_interval_secs = 0;
    assert!(config.validate().is_err());

    config = valid_config();
    config.error_cooldown_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn from_file_with_invalid_json_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"{\"mqtt\": [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}

#[test]
fn overrides_win_over_file_values() {
    let mut config = valid_config();
    config.mqtt.broker = "from-file".to_string();

    let vars = [
        ("SKODA_USERNAME", "env-user@example.com"),
        ("MQTT_BROKER", "broker.lan"),
        ("MQTT_PORT", "8883"),
        ("POLL_INTERVAL", "120"),
        ("HA_DISCOVERY", "false"),
        ("LOG_LEVEL", "DEBUG"),
    ];
    config
        .apply_overrides(|name| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        })
        .unwrap();

    assert_eq!(config.skoda.username, "env-user@example.com");
    assert_eq!(config.mqtt.broker, "broker.lan");
    assert_eq!(config.mqtt.port, 8883);
    assert_eq!(config.poll_interval_secs, 120);
    assert!(!config.discovery.enabled);
    assert_eq!(config.logging.level, "DEBUG");
    // Untouched values survive
    assert_eq!(config.skoda.vin, "TMBJB9NY0MF000000");
}

#[test]
fn unparsable_override_is_rejected() {
    let mut config = valid_config();
    let err = config
        .apply_overrides(|name| (name == "MQTT_PORT").then(|| "not-a-port".to_string()))
        .unwrap_err();
    assert!(format!("{}", err).contains("MQTT_PORT"));
}

#[test]
fn empty_override_keeps_existing_value() {
    let mut config = valid_config();
    config
        .apply_overrides(|name| (name == "SKODA_USERNAME").then(String::new))
        .unwrap();
    assert_eq!(config.skoda.username, "user@example.com");
}
