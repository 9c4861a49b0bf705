use booking_engine::LifecycleEvent;
use tokio::sync::broadcast;

/// Pub/sub channel carrying lifecycle facts from the booking engine to the
/// notification dispatcher.
///
/// The engine publishes after its transaction commits; the notification
/// records are already durable by then, so a missing subscriber only skips
/// the live push. Delivery through the bus is therefore best-effort by
/// design while the pull API stays exact.
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` in-flight facts per
    /// subscriber before the slowest one starts lagging.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// The sending half handed to the booking engine.
    pub fn sender(&self) -> broadcast::Sender<LifecycleEvent> {
        self.sender.clone()
    }

    /// Subscribes a new consumer; it sees facts published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
