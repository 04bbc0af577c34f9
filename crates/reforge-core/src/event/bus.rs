//! Engine event fan-out.
//!
//! The engine and its coordinator publish progress here; the CLI printer and
//! tests subscribe. Nobody listening is fine, events are simply dropped.

use reforge_types::event::EngineEvent;
use tokio::sync::broadcast;

/// Sender side shared by the engine and the coordinator. A receiver only sees
/// events published after it subscribed; a slow one gets `Lagged`.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
