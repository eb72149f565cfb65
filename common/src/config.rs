use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one relay pin must be configured")]
    NoRelays,
    #[error("topic prefix must not be empty")]
    EmptyPrefix,
    #[error("topic prefix `{0}` must not contain MQTT wildcards")]
    WildcardPrefix(String),
    #[error("mqtt port must be between 1 and 65535")]
    InvalidPort,
    #[error("mqtt client id must not be empty")]
    EmptyClientId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightsConfig {
    #[serde(rename = "topicPrefix")]
    pub topic_prefix: String,
    #[serde(rename = "relayPins")]
    pub relay_pins: Vec<i32>,
    #[serde(rename = "reconnectDelayMs")]
    pub reconnect_delay_ms: u64,
}

impl Default for LightsConfig {
    fn default() -> Self {
        Self {
            topic_prefix: "home/livingroom".to_string(),
            relay_pins: vec![16, 17, 18, 19],
            reconnect_delay_ms: 5_000,
        }
    }
}

impl LightsConfig {
    pub fn num_lights(&self) -> usize {
        self.relay_pins.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub client_id: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            client_id: "relay-lights-controller".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub lights: LightsConfig,
    pub timezone: String,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lights: LightsConfig::default(),
            timezone: "UTC".to_string(),
            network: NetworkConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        let prefix = self.lights.topic_prefix.trim().trim_end_matches('/');
        self.lights.topic_prefix = prefix.to_string();
        self.lights.reconnect_delay_ms = self.lights.reconnect_delay_ms.clamp(500, 60_000);
        self.network.client_id = self.network.client_id.trim().to_string();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lights.relay_pins.is_empty() {
            return Err(ConfigError::NoRelays);
        }

        let prefix = &self.lights.topic_prefix;
        if prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if prefix.contains(['+', '#']) {
            return Err(ConfigError::WildcardPrefix(prefix.clone()));
        }

        if self.network.mqtt_port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.network.client_id.is_empty() {
            return Err(ConfigError::EmptyClientId);
        }

        Ok(())
    }
}
