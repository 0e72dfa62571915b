mod notifier;
mod state;

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rumqttc::QoS;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SwitchConfig;
use crate::template::ValueTransform;
use crate::transport::{Transport, TransportError};
use state::SwitchState;

pub use notifier::{StateChange, StateNotifier};

const MESSAGE_CHANNEL_CAPACITY: usize = 32;

#[derive(Error, Debug)]
pub enum SwitchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Switch {0} is already attached")]
    AlreadyAttached(String),
}

/// Part of the switch shared with the state listener task.
struct SwitchCore {
    name: String,
    payload_on: String,
    payload_off: String,
    value_transform: Option<ValueTransform>,
    state: SwitchState,
    notifier: StateNotifier,
}

impl SwitchCore {
    fn on_message(&self, payload: &str) {
        let payload = match &self.value_transform {
            Some(transform) => match transform.apply(payload) {
                Ok(value) => Some(Cow::Owned(value)),
                Err(e) => {
                    warn!("Switch {}: cannot transform payload {payload:?}: {e}", self.name);
                    None
                }
            },
            None => Some(Cow::Borrowed(payload)),
        };

        match payload {
            Some(payload) if *payload == self.payload_on => self.set_on(true),
            Some(payload) if *payload == self.payload_off => self.set_on(false),
            Some(payload) => {
                debug!("Switch {}: ignoring unrecognized payload {payload:?}", self.name)
            }
            None => {}
        }
        self.refresh();
    }

    fn set_on(&self, on: bool) {
        let was_on = self.state.set_on(on);
        if was_on != on {
            info!(
                "Switch {} turned {}",
                self.name,
                if on { "on" } else { "off" }
            );
        }
    }

    fn refresh(&self) {
        self.notifier.notify(StateChange {
            name: self.name.clone(),
            is_on: self.state.is_on(),
            assumed_state: self.state.is_optimistic(),
        });
    }
}

/// A binary switch kept in sync with an MQTT device.
///
/// Inbound messages on the state topic drive `is_on`. Commands are published
/// on the command topic; in optimistic mode the local state follows the
/// command right away instead of waiting for the device to confirm it.
pub struct MqttSwitch<T: Transport> {
    core: Arc<SwitchCore>,
    transport: T,
    state_topic: Option<String>,
    command_topic: String,
    qos: QoS,
    retain: bool,
    attached: AtomicBool,
}

impl<T: Transport> MqttSwitch<T> {
    pub fn new(config: SwitchConfig, transport: T, notifier: StateNotifier) -> Self {
        let SwitchConfig {
            name,
            state_topic,
            command_topic,
            qos,
            retain,
            payload_on,
            payload_off,
            optimistic,
            value_transform,
        } = config;

        Self {
            core: Arc::new(SwitchCore {
                name,
                payload_on,
                payload_off,
                value_transform,
                state: SwitchState::new(optimistic),
                notifier,
            }),
            transport,
            state_topic,
            command_topic,
            qos,
            retain,
            attached: AtomicBool::new(false),
        }
    }

    /// Subscribes to the state topic, or switches to optimistic mode when
    /// there is none.
    ///
    /// Returns the handle of the task feeding inbound messages to
    /// [`MqttSwitch::on_message`]. A switch can only be attached once; a
    /// failed subscription leaves it detached.
    pub async fn attach(&self) -> Result<Option<JoinHandle<()>>, SwitchError> {
        if self.attached.swap(true, Ordering::AcqRel) {
            return Err(SwitchError::AlreadyAttached(self.core.name.clone()));
        }

        let Some(topic) = self.state_topic.as_deref() else {
            info!(
                "Switch {} has no state topic, forcing optimistic mode",
                self.core.name
            );
            self.core.state.force_optimistic();
            return Ok(None);
        };

        let (sender, mut receiver) = mpsc::channel::<String>(MESSAGE_CHANNEL_CAPACITY);
        if let Err(e) = self.transport.subscribe(topic, self.qos, sender).await {
            self.attached.store(false, Ordering::Release);
            return Err(e.into());
        }

        let core = Arc::clone(&self.core);
        let handle = tokio::spawn(async move {
            while let Some(payload) = receiver.recv().await {
                core.on_message(&payload);
            }
            debug!("State subscription of switch {} closed", core.name);
        });
        Ok(Some(handle))
    }

    /// Applies one inbound state message.
    pub fn on_message(&self, payload: &str) {
        self.core.on_message(payload);
    }

    pub async fn turn_on(&self) -> Result<(), TransportError> {
        self.send_command(true).await
    }

    pub async fn turn_off(&self) -> Result<(), TransportError> {
        self.send_command(false).await
    }

    async fn send_command(&self, on: bool) -> Result<(), TransportError> {
        let payload = if on {
            &self.core.payload_on
        } else {
            &self.core.payload_off
        };
        self.transport
            .publish(&self.command_topic, payload, self.qos, self.retain)
            .await?;

        if self.core.state.is_optimistic() {
            self.core.set_on(on);
            self.core.refresh();
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn is_on(&self) -> bool {
        self.core.state.is_on()
    }

    /// True when the reported state is a guess rather than confirmed by the
    /// device.
    pub fn is_assumed_state(&self) -> bool {
        self.core.state.is_optimistic()
    }

    pub fn should_poll(&self) -> bool {
        false
    }

    pub fn state_topic(&self) -> Option<&str> {
        self.state_topic.as_deref()
    }

    pub fn command_topic(&self) -> &str {
        &self.command_topic
    }
}
