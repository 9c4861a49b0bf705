use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use booking_engine::NotificationEvent;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

/// How many undelivered events a single live connection may buffer before
/// pushes to it are deferred.
const CONNECTION_BUFFER: usize = 32;

/// Handle identifying one live connection within the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionId(u64);

/// Process-local registry of live push connections, keyed by recipient.
///
/// A recipient may hold several connections (one per open client); each gets
/// its own FIFO channel, so per-connection delivery order matches creation
/// order. The registry never blocks on a slow consumer: a full or closed
/// channel defers that delivery to the pull API.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Uuid, Vec<(ConnectionId, mpsc::Sender<NotificationEvent>)>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a live channel for a recipient, returning the handle used to
    /// close it and the receiving half the connection drains.
    pub async fn register(
        &self,
        recipient_id: Uuid,
    ) -> (ConnectionId, mpsc::Receiver<NotificationEvent>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);

        let mut connections = self.connections.write().await;
        connections.entry(recipient_id).or_default().push((id, tx));
        debug!("Recipient {recipient_id} connected ({:?})", id);
        (id, rx)
    }

    /// Closes a live channel. Safe to call after the peer disconnected.
    pub async fn unregister(&self, recipient_id: Uuid, id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(list) = connections.get_mut(&recipient_id) {
            list.retain(|(conn_id, _)| *conn_id != id);
            if list.is_empty() {
                connections.remove(&recipient_id);
            }
        }
    }

    /// Pushes an event to every open connection of its recipient, pruning
    /// connections whose peer has gone away. Returns how many connections
    /// accepted the event.
    pub async fn push(&self, event: &NotificationEvent) -> usize {
        let mut connections = self.connections.write().await;
        let Some(list) = connections.get_mut(&event.recipient_id) else {
            return 0;
        };

        let mut delivered = 0;
        list.retain(|(_, tx)| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Keep the connection; the client catches up via pull.
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if list.is_empty() {
            connections.remove(&event.recipient_id);
        }
        delivered
    }

    /// Number of currently connected recipients.
    pub async fn connected_recipients(&self) -> usize {
        self.connections.read().await.len()
    }
}
