use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::SwitchConfig;
use crate::switch::{MqttSwitch, StateChange, StateNotifier, SwitchError};
use crate::transport::{Transport, TransportError};

#[derive(Error, Debug)]
pub enum HubError {
    #[error("Unknown switch: {0}")]
    UnknownSwitch(String),
    #[error("Switch {0} is already registered")]
    DuplicateSwitch(String),
    #[error(transparent)]
    Switch(#[from] SwitchError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

struct Registered<T: Transport> {
    switch: Arc<MqttSwitch<T>>,
    listener: Option<JoinHandle<()>>,
}

/// Registry of switches sharing one transport.
///
/// Every switch reports its refreshes on the receiver returned by
/// [`Hub::new`].
pub struct Hub<T: Transport + Clone> {
    transport: T,
    notifier: StateNotifier,
    switches: DashMap<String, Registered<T>>,
}

impl<T: Transport + Clone> Hub<T> {
    pub fn new(transport: T) -> (Self, UnboundedReceiver<StateChange>) {
        let (notifier, receiver) = StateNotifier::channel();
        (
            Self {
                transport,
                notifier,
                switches: DashMap::new(),
            },
            receiver,
        )
    }

    /// Creates the switch, attaches it and registers it under its name.
    pub async fn add_switch(&self, config: SwitchConfig) -> Result<Arc<MqttSwitch<T>>, HubError> {
        let name = config.name.clone();
        if self.switches.contains_key(&name) {
            return Err(HubError::DuplicateSwitch(name));
        }

        let switch = Arc::new(MqttSwitch::new(
            config,
            self.transport.clone(),
            self.notifier.clone(),
        ));
        let listener = switch.attach().await?;

        match self.switches.entry(name.clone()) {
            Entry::Occupied(_) => {
                if let Some(listener) = listener {
                    listener.abort();
                }
                Err(HubError::DuplicateSwitch(name))
            }
            Entry::Vacant(entry) => {
                info!(
                    "Switch {name} added (state topic: {:?}, command topic: {})",
                    switch.state_topic(),
                    switch.command_topic()
                );
                entry.insert(Registered {
                    switch: Arc::clone(&switch),
                    listener,
                });
                Ok(switch)
            }
        }
    }

    /// Unregisters the switch and stops feeding it messages.
    pub fn remove_switch(&self, name: &str) -> Result<(), HubError> {
        let (_, registered) = self
            .switches
            .remove(name)
            .ok_or_else(|| HubError::UnknownSwitch(name.to_string()))?;
        if let Some(listener) = registered.listener {
            listener.abort();
        }
        info!("Switch {name} removed");
        Ok(())
    }

    pub fn switch(&self, name: &str) -> Option<Arc<MqttSwitch<T>>> {
        self.switches
            .get(name)
            .map(|entry| Arc::clone(&entry.value().switch))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.switches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub async fn turn_on(&self, name: &str) -> Result<(), HubError> {
        let switch = self
            .switch(name)
            .ok_or_else(|| HubError::UnknownSwitch(name.to_string()))?;
        Ok(switch.turn_on().await?)
    }

    pub async fn turn_off(&self, name: &str) -> Result<(), HubError> {
        let switch = self
            .switch(name)
            .ok_or_else(|| HubError::UnknownSwitch(name.to_string()))?;
        Ok(switch.turn_off().await?)
    }
}

impl<T: Transport + Clone> Drop for Hub<T> {
    fn drop(&mut self) {
        for entry in self.switches.iter() {
            if let Some(listener) = entry.value().listener.as_ref() {
                listener.abort();
            }
        }
    }
}
