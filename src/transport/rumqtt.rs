use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::topic::topic_matches;
use super::{Transport, TransportError};

const REQUEST_CHANNEL_CAPACITY: usize = 10;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

struct Subscription {
    qos: QoS,
    handlers: Vec<Sender<String>>,
}

type Subscriptions = Arc<DashMap<String, Subscription>>;

/// [`Transport`] backed by a rumqttc connection.
///
/// The event loop runs on its own task; publishes received on a subscribed
/// filter are forwarded to every handler registered for it.
#[derive(Clone)]
pub struct RumqttTransport {
    client: AsyncClient,
    subscriptions: Subscriptions,
}

impl RumqttTransport {
    pub fn new(options: MqttOptions) -> (Self, JoinHandle<()>) {
        let (host, port) = options.broker_address();
        info!("Connecting to MQTT broker at {host}:{port}");
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let subscriptions: Subscriptions = Arc::new(DashMap::new());

        let client_clone = client.clone();
        let subscriptions_clone = Arc::clone(&subscriptions);
        let handle = tokio::spawn(async move {
            info!("Starting event loop");
            run_eventloop(eventloop, client_clone, subscriptions_clone).await
        });

        (
            RumqttTransport {
                client,
                subscriptions,
            },
            handle,
        )
    }

    pub async fn disconnect(&self) -> Result<(), TransportError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| TransportError::Connection(format!("Disconnect error: {e}")))
    }
}

#[async_trait]
impl Transport for RumqttTransport {
    async fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
        handler: Sender<String>,
    ) -> Result<(), TransportError> {
        self.subscriptions
            .entry(topic.to_string())
            .or_insert_with(|| Subscription {
                qos,
                handlers: vec![],
            })
            .handlers
            .push(handler.clone());

        if let Err(e) = self.client.subscribe(topic, qos).await {
            if let Some(mut subscription) = self.subscriptions.get_mut(topic) {
                subscription.handlers.retain(|h| !h.same_channel(&handler));
            }
            self.subscriptions
                .remove_if(topic, |_, subscription| subscription.handlers.is_empty());
            return Err(TransportError::Subscribe(format!(
                "Failed to subscribe to topic {topic}: {e}"
            )));
        }
        info!("Subscribed to topic: {topic}");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &str,
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError> {
        debug!("Publishing {payload} to {topic} (qos {qos:?}, retain {retain})");
        self.client
            .publish(topic, qos, retain, payload.as_bytes().to_vec())
            .await
            .map_err(|e| TransportError::Publish(format!("Failed to publish to {topic}: {e}")))
    }
}

async fn run_eventloop(mut eventloop: EventLoop, client: AsyncClient, subscriptions: Subscriptions) {
    let mut connections: u64 = 0;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                connections += 1;
                info!("Connected to MQTT broker (session present: {})", ack.session_present);
                if connections > 1 && !ack.session_present {
                    resubscribe(&client, &subscriptions);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                dispatch(&client, &subscriptions, &publish.topic, &publish.payload).await;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("Disconnected from MQTT broker");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("MQTT connection error: {e}, reconnecting");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
    info!("Event loop terminated");
}

// Runs on the event loop task, so it must not wait on the request channel.
fn resubscribe(client: &AsyncClient, subscriptions: &Subscriptions) {
    for entry in subscriptions.iter() {
        match client.try_subscribe(entry.key().as_str(), entry.value().qos) {
            Ok(()) => info!("Re-subscribed to topic: {}", entry.key()),
            Err(e) => error!("Failed to re-subscribe to topic {}: {e}", entry.key()),
        }
    }
}

async fn dispatch(client: &AsyncClient, subscriptions: &Subscriptions, topic: &str, payload: &[u8]) {
    let payload = match std::str::from_utf8(payload) {
        Ok(payload) => payload.to_string(),
        Err(e) => {
            warn!("Dropping non UTF-8 payload received on {topic}: {e}");
            return;
        }
    };

    let handlers: Vec<Sender<String>> = subscriptions
        .iter()
        .filter(|entry| topic_matches(entry.key(), topic))
        .flat_map(|entry| entry.value().handlers.clone())
        .collect();
    if handlers.is_empty() {
        debug!("No handler for message on {topic}");
        return;
    }

    let mut closed = false;
    for handler in handlers {
        if handler.send(payload.clone()).await.is_err() {
            closed = true;
        }
    }
    if closed {
        prune_closed(client, subscriptions);
    }
}

fn prune_closed(client: &AsyncClient, subscriptions: &Subscriptions) {
    for mut entry in subscriptions.iter_mut() {
        entry.value_mut().handlers.retain(|h| !h.is_closed());
    }
    let abandoned: Vec<String> = subscriptions
        .iter()
        .filter(|entry| entry.value().handlers.is_empty())
        .map(|entry| entry.key().clone())
        .collect();
    for filter in abandoned {
        subscriptions.remove(&filter);
        if let Err(e) = client.try_unsubscribe(filter.as_str()) {
            error!("Failed to unsubscribe from topic {filter}: {e}");
        } else {
            debug!("Unsubscribed from topic {filter}, no handler left");
        }
    }
}
