use derive_builder::{Builder, UninitializedFieldError};
use rumqttc::QoS;
use thiserror::Error;
use tracing::warn;

use crate::template::ValueTransform;

pub const DEFAULT_NAME: &str = "MQTT Switch";
pub const DEFAULT_PAYLOAD_ON: &str = "ON";
pub const DEFAULT_PAYLOAD_OFF: &str = "OFF";
pub const DEFAULT_OPTIMISTIC: bool = false;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Invalid topic {topic:?}: {reason}")]
    InvalidTopic { topic: String, reason: String },
    #[error("Invalid QoS level {0}, expected 0, 1 or 2")]
    InvalidQos(u8),
    #[error("Invalid value template: {0}")]
    InvalidTemplate(String),
    #[error("Duplicate switch name: {0}")]
    DuplicateName(String),
    #[error("Cannot parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<UninitializedFieldError> for ConfigError {
    fn from(e: UninitializedFieldError) -> Self {
        ConfigError::MissingField(e.field_name().to_string())
    }
}

/// Fully resolved configuration of one switch.
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate", error = "ConfigError"))]
pub struct SwitchConfig {
    #[builder(setter(into), default = "DEFAULT_NAME.to_string()")]
    pub name: String,
    /// Topic carrying the confirmed device state. Without it the switch is
    /// always optimistic.
    #[builder(setter(into, strip_option), default)]
    pub state_topic: Option<String>,
    #[builder(setter(into))]
    pub command_topic: String,
    #[builder(default = "QoS::AtMostOnce")]
    pub qos: QoS,
    #[builder(default)]
    pub retain: bool,
    #[builder(setter(into), default = "DEFAULT_PAYLOAD_ON.to_string()")]
    pub payload_on: String,
    #[builder(setter(into), default = "DEFAULT_PAYLOAD_OFF.to_string()")]
    pub payload_off: String,
    #[builder(default = "DEFAULT_OPTIMISTIC")]
    pub optimistic: bool,
    #[builder(setter(strip_option), default)]
    pub value_transform: Option<ValueTransform>,
}

impl SwitchConfig {
    pub fn builder() -> SwitchConfigBuilder {
        SwitchConfigBuilder::default()
    }
}

impl SwitchConfigBuilder {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(topic) = &self.command_topic {
            validate_publish_topic(topic)?;
        }
        if let Some(Some(topic)) = &self.state_topic {
            validate_subscribe_topic(topic)?;
        }
        if let (Some(on), Some(off)) = (&self.payload_on, &self.payload_off)
            && on == off
        {
            warn!("payload_on and payload_off are both {on:?}, inbound messages always resolve to on");
        }
        Ok(())
    }
}

pub fn qos_from_level(level: u8) -> Result<QoS, ConfigError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(ConfigError::InvalidQos(other)),
    }
}

fn invalid_topic(topic: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidTopic {
        topic: topic.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_publish_topic(topic: &str) -> Result<(), ConfigError> {
    if topic.is_empty() {
        return Err(invalid_topic(topic, "topic must not be empty"));
    }
    if topic.contains(['+', '#']) {
        return Err(invalid_topic(topic, "wildcards are not allowed when publishing"));
    }
    if topic.contains('\0') {
        return Err(invalid_topic(topic, "topic must not contain NUL"));
    }
    Ok(())
}

fn validate_subscribe_topic(filter: &str) -> Result<(), ConfigError> {
    if filter.is_empty() {
        return Err(invalid_topic(filter, "topic must not be empty"));
    }
    if filter.contains('\0') {
        return Err(invalid_topic(filter, "topic must not contain NUL"));
    }
    let levels: Vec<&str> = filter.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || i != levels.len() - 1) {
            return Err(invalid_topic(filter, "'#' must be the last level on its own"));
        }
        if level.contains('+') && *level != "+" {
            return Err(invalid_topic(filter, "'+' must occupy a whole level"));
        }
    }
    Ok(())
}
