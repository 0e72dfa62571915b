pub mod config;
pub mod hub;
pub mod logging;
pub mod settings;
pub mod switch;
pub mod template;
pub mod transport;

pub use config::{ConfigError, SwitchConfig, SwitchConfigBuilder};
pub use hub::{Hub, HubError};
pub use settings::{BrokerSettings, Settings, SwitchSettings};
pub use switch::{MqttSwitch, StateChange, StateNotifier, SwitchError};
pub use template::{TransformError, ValueTemplate, ValueTransform};
pub use transport::{RumqttTransport, Transport, TransportError, topic_matches};
