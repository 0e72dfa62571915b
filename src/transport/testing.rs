use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rumqttc::QoS;
use tokio::sync::RwLock;
use tokio::sync::mpsc::Sender;

use super::{Transport, TransportError};

/// In-memory transport recording every call.
#[derive(Clone, Default)]
pub struct FakeTransport {
    pub subscriptions: Arc<RwLock<Vec<(String, QoS, Sender<String>)>>>,
    pub published: Arc<RwLock<Vec<(String, String, QoS, bool)>>>,
    pub should_fail: Arc<AtomicBool>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            should_fail: Arc::new(AtomicBool::new(true)),
            ..Default::default()
        }
    }

    /// Delivers `payload` to every handler subscribed to `topic`.
    pub async fn deliver(&self, topic: &str, payload: &str) {
        let handlers: Vec<Sender<String>> = self
            .subscriptions
            .read()
            .await
            .iter()
            .filter(|(filter, _, _)| super::topic_matches(filter, topic))
            .map(|(_, _, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler.send(payload.to_string()).await.ok();
        }
    }

    pub async fn subscribed_topics(&self) -> Vec<String> {
        self.subscriptions
            .read()
            .await
            .iter()
            .map(|(topic, _, _)| topic.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
        handler: Sender<String>,
    ) -> Result<(), TransportError> {
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(TransportError::Subscribe("Fake error".to_string()));
        }
        self.subscriptions
            .write()
            .await
            .push((topic.to_string(), qos, handler));
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &str,
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError> {
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(TransportError::Publish("Fake error".to_string()));
        }
        self.published
            .write()
            .await
            .push((topic.to_string(), payload.to_string(), qos, retain));
        Ok(())
    }
}
