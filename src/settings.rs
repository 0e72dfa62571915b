use std::collections::HashSet;
use std::time::Duration;

use rumqttc::MqttOptions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ConfigError, SwitchConfig, qos_from_level};
use crate::template::ValueTemplate;

const CLIENT_ID_PREFIX: &str = "MqttSwitch";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub broker: BrokerSettings,
    #[serde(default)]
    pub switches: Vec<SwitchSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Keep alive interval in seconds.
    pub keep_alive: u64,
    pub client_id_prefix: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        BrokerSettings {
            host: String::from("localhost"),
            port: 1883,
            user: None,
            password: None,
            keep_alive: 5,
            client_id_prefix: String::from(CLIENT_ID_PREFIX),
        }
    }
}

impl BrokerSettings {
    pub fn client_id(&self) -> String {
        let uuid = Uuid::new_v4();
        format!("{}_{}", self.client_id_prefix, uuid.to_string().to_uppercase())
    }

    pub fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id(), self.host.clone(), self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive));
        if let Some(user) = &self.user {
            options.set_credentials(user.clone(), self.password.clone().unwrap_or_default());
        }
        options
    }
}

/// One switch as written in the settings file. Everything except the
/// command topic falls back to a default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchSettings {
    pub name: Option<String>,
    pub state_topic: Option<String>,
    pub command_topic: Option<String>,
    pub qos: Option<u8>,
    pub retain: Option<bool>,
    pub payload_on: Option<String>,
    pub payload_off: Option<String>,
    pub optimistic: Option<bool>,
    pub value_template: Option<String>,
}

impl TryFrom<&SwitchSettings> for SwitchConfig {
    type Error = ConfigError;

    fn try_from(settings: &SwitchSettings) -> Result<Self, Self::Error> {
        let mut builder = SwitchConfig::builder();
        if let Some(name) = &settings.name {
            builder.name(name.clone());
        }
        if let Some(topic) = &settings.state_topic {
            builder.state_topic(topic.clone());
        }
        if let Some(topic) = &settings.command_topic {
            builder.command_topic(topic.clone());
        }
        if let Some(level) = settings.qos {
            builder.qos(qos_from_level(level)?);
        }
        if let Some(retain) = settings.retain {
            builder.retain(retain);
        }
        if let Some(payload) = &settings.payload_on {
            builder.payload_on(payload.clone());
        }
        if let Some(payload) = &settings.payload_off {
            builder.payload_off(payload.clone());
        }
        if let Some(optimistic) = settings.optimistic {
            builder.optimistic(optimistic);
        }
        if let Some(source) = &settings.value_template {
            let template = ValueTemplate::new(source.as_str())
                .map_err(|e| ConfigError::InvalidTemplate(e.to_string()))?;
            builder.value_transform(template.into());
        }
        builder.build()
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validates every switch and resolves its defaults.
    pub fn switch_configs(&self) -> Result<Vec<SwitchConfig>, ConfigError> {
        let mut names = HashSet::new();
        self.switches
            .iter()
            .map(|settings| {
                let config = SwitchConfig::try_from(settings)?;
                if !names.insert(config.name.clone()) {
                    return Err(ConfigError::DuplicateName(config.name));
                }
                Ok(config)
            })
            .collect()
    }
}
