mod rumqtt;
mod topic;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use rumqttc::QoS;
use thiserror::Error;
use tokio::sync::mpsc::Sender;

pub use rumqtt::RumqttTransport;
pub use topic::topic_matches;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Subscribe failed: {0}")]
    Subscribe(String),
    #[error("Publishing failed: {0}")]
    Publish(String),
    #[error("Connection failed: {0}")]
    Connection(String),
}

/// Publish/subscribe primitives of the MQTT connection.
///
/// A subscription hands every payload received on `topic` to `handler`, in
/// delivery order. Publishing is fire-and-forget: success means the message
/// was queued on the connection.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
        handler: Sender<String>,
    ) -> Result<(), TransportError>;

    async fn publish(
        &self,
        topic: &str,
        payload: &str,
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError>;
}
