use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// Refresh notification sent to the host after state-relevant processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub name: String,
    pub is_on: bool,
    pub assumed_state: bool,
}

/// Sending half of the host refresh channel.
///
/// Sending never blocks, so message handling is never delayed by the host.
#[derive(Debug, Clone)]
pub struct StateNotifier {
    sender: UnboundedSender<StateChange>,
}

impl StateNotifier {
    pub fn channel() -> (Self, UnboundedReceiver<StateChange>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn notify(&self, change: StateChange) {
        if let Err(e) = self.sender.send(change) {
            debug!("Host stopped listening, dropping refresh for {}", e.0.name);
        }
    }
}
