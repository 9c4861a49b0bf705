use std::sync::Arc;

use booking_engine::{BookingError, LifecycleEvent, NotificationEvent, ReservationStore};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::registry::ConnectionRegistry;

/// Delivers persisted lifecycle notifications to recipients.
///
/// Live delivery is best-effort immediate push to connected recipients; a
/// failed push is only logged, because the record was already committed with
/// its transition and remains retrievable through the pull API. Clients
/// deduplicate by event id after a reconnect.
pub struct Dispatcher {
    store: Arc<dyn ReservationStore>,
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    /// Creates a dispatcher over the notification store and the live
    /// connection registry.
    pub fn new(store: Arc<dyn ReservationStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    /// The live connection registry, shared with the HTTP layer.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Consumes lifecycle facts from the bus and pushes each persisted
    /// record to its recipient's open connections. Runs until the bus
    /// closes; intended to be spawned once per process.
    pub async fn run(&self, mut rx: broadcast::Receiver<LifecycleEvent>) {
        info!("Notification dispatcher started");
        loop {
            match rx.recv().await {
                Ok(fact) => self.deliver(&fact).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // The skipped records are durable; affected clients
                    // recover them through the pull API.
                    warn!("Dispatcher lagged, {skipped} facts not live-pushed");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Event bus closed, dispatcher stopping");
                    break;
                }
            }
        }
    }

    async fn deliver(&self, fact: &LifecycleEvent) {
        for event in &fact.events {
            let delivered = self.registry.push(event).await;
            if delivered == 0 {
                debug!(
                    "Delivery deferred for event {} to {}; recipient not connected",
                    event.id, event.recipient_id
                );
            }
        }
    }

    /// Pull API: a recipient's notifications in creation order, optionally
    /// only those after `since`.
    pub async fn list_notifications(
        &self,
        recipient_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<NotificationEvent>, BookingError> {
        self.store.list_notifications(recipient_id, since).await
    }

    /// Pull API: a recipient's unread notifications in creation order.
    /// Reconnecting live clients call this to close any push gap.
    pub async fn list_unread(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<NotificationEvent>, BookingError> {
        self.store.list_unread(recipient_id).await
    }

    /// Marks a notification read. Idempotent.
    pub async fn mark_read(
        &self,
        recipient_id: Uuid,
        event_id: Uuid,
    ) -> Result<(), BookingError> {
        self.store.mark_read(recipient_id, event_id).await
    }
}
