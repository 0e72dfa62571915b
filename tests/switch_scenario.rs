use std::sync::Arc;

use async_trait::async_trait;
use mqtt_switch_rs::{
    Hub, MqttSwitch, Settings, StateNotifier, Transport, TransportError, topic_matches,
};
use rumqttc::QoS;
use tokio::sync::RwLock;
use tokio::sync::mpsc::Sender;

#[derive(Clone, Default)]
struct RecordingTransport {
    handlers: Arc<RwLock<Vec<(String, Sender<String>)>>>,
    published: Arc<RwLock<Vec<(String, String)>>>,
}

impl RecordingTransport {
    async fn deliver(&self, topic: &str, payload: &str) {
        let handlers: Vec<Sender<String>> = self
            .handlers
            .read()
            .await
            .iter()
            .filter(|(filter, _)| topic_matches(filter, topic))
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler.send(payload.to_string()).await.unwrap();
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn subscribe(
        &self,
        topic: &str,
        _qos: QoS,
        handler: Sender<String>,
    ) -> Result<(), TransportError> {
        self.handlers
            .write()
            .await
            .push((topic.to_string(), handler));
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &str,
        _qos: QoS,
        _retain: bool,
    ) -> Result<(), TransportError> {
        self.published
            .write()
            .await
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

const SETTINGS: &str = r#"{
    "broker": { "host": "broker.local" },
    "switches": [
        {
            "name": "Boiler",
            "state_topic": "home/boiler/state",
            "command_topic": "home/boiler/set",
            "value_template": "{{ value_json.relay }}",
            "payload_on": "closed",
            "payload_off": "open"
        },
        {
            "name": "Porch",
            "command_topic": "home/porch/set"
        }
    ]
}"#;

#[tokio::test]
async fn switch_follows_broker_messages() {
    let transport = RecordingTransport::default();
    let settings = Settings::from_json(SETTINGS).unwrap();
    let configs = settings.switch_configs().unwrap();
    let (notifier, mut changes) = StateNotifier::channel();
    let boiler = MqttSwitch::new(configs[0].clone(), transport.clone(), notifier);

    let listener = boiler.attach().await.unwrap();
    assert!(listener.is_some());

    transport
        .deliver("home/boiler/state", r#"{"relay":"closed"}"#)
        .await;
    let change = changes.recv().await.unwrap();
    assert_eq!(change.name, "Boiler");
    assert!(change.is_on);
    assert!(boiler.is_on());

    // Not JSON: the template fails, the state is kept and the host refreshed.
    transport.deliver("home/boiler/state", "open").await;
    let change = changes.recv().await.unwrap();
    assert!(change.is_on);
    assert!(boiler.is_on());

    transport
        .deliver("home/boiler/state", r#"{"relay":"open"}"#)
        .await;
    let change = changes.recv().await.unwrap();
    assert!(!change.is_on);
    assert!(!boiler.is_on());
    assert!(changes.try_recv().is_err());

    boiler.turn_on().await.unwrap();
    assert!(!boiler.is_on());
    assert_eq!(
        transport.published.read().await.as_slice(),
        &[("home/boiler/set".to_string(), "closed".to_string())]
    );
}

#[tokio::test]
async fn hub_drives_optimistic_switch() {
    let transport = RecordingTransport::default();
    let settings = Settings::from_json(SETTINGS).unwrap();
    let (hub, mut changes) = Hub::new(transport.clone());
    for config in settings.switch_configs().unwrap() {
        hub.add_switch(config).await.unwrap();
    }

    let porch = hub.switch("Porch").unwrap();
    assert!(porch.is_assumed_state());
    assert!(!porch.should_poll());

    hub.turn_on("Porch").await.unwrap();
    let change = changes.recv().await.unwrap();
    assert_eq!(change.name, "Porch");
    assert!(change.is_on);
    assert!(change.assumed_state);

    hub.turn_off("Porch").await.unwrap();
    assert!(!changes.recv().await.unwrap().is_on);

    let published = transport.published.read().await;
    assert_eq!(published[0], ("home/porch/set".to_string(), "ON".to_string()));
    assert_eq!(published[1], ("home/porch/set".to_string(), "OFF".to_string()));
}
