use tokio::sync::broadcast;

use sowama_types::events::EngineEvent;

/// Fans committed engine events out to subscribers.
#[derive(Clone)]
pub struct Dispatcher {
    broadcast_tx: broadcast::Sender<EngineEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self { broadcast_tx }
    }

    /// Subscribe to engine events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn broadcast(&self, event: EngineEvent) {
        let _ = self.broadcast_tx.send(event);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
