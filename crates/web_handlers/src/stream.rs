use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use actix_web::web::Bytes;
use booking_engine::NotificationEvent;
use futures_util::Stream;
use tokio::sync::mpsc;
use uuid::Uuid;

use notification_services::{ConnectionId, ConnectionRegistry};

/// Interval between heartbeat comments on an otherwise idle stream.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Server-sent-events stream over one live notification connection.
///
/// Emits a `notification` event per pushed record and a comment heartbeat
/// while idle so proxies and clients can detect a dead connection. The
/// connection is unregistered when the stream drops.
pub struct NotificationStream {
    rx: mpsc::Receiver<NotificationEvent>,
    heartbeat: tokio::time::Interval,
    registry: Arc<ConnectionRegistry>,
    recipient_id: Uuid,
    connection_id: ConnectionId,
}

impl NotificationStream {
    /// Wraps the receiving half of a registered connection.
    pub fn new(
        rx: mpsc::Receiver<NotificationEvent>,
        registry: Arc<ConnectionRegistry>,
        recipient_id: Uuid,
        connection_id: ConnectionId,
    ) -> Self {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        // The first tick fires immediately; clients treat it as hello.
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Self {
            rx,
            heartbeat,
            registry,
            recipient_id,
            connection_id,
        }
    }

    fn frame(event: &NotificationEvent) -> Bytes {
        let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
        Bytes::from(format!("event: notification\ndata: {}\n\n", data))
    }
}

impl Stream for NotificationStream {
    type Item = Result<Bytes, actix_web::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => return Poll::Ready(Some(Ok(Self::frame(&event)))),
            Poll::Ready(None) => return Poll::Ready(None),
            Poll::Pending => {}
        }

        if this.heartbeat.poll_tick(cx).is_ready() {
            return Poll::Ready(Some(Ok(Bytes::from_static(b": heartbeat\n\n"))));
        }

        Poll::Pending
    }
}

impl Drop for NotificationStream {
    fn drop(&mut self) {
        let registry = self.registry.clone();
        let recipient_id = self.recipient_id;
        let connection_id = self.connection_id;
        tokio::spawn(async move {
            registry.unregister(recipient_id, connection_id).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures_util::StreamExt;

    fn sample_event(recipient_id: Uuid) -> NotificationEvent {
        NotificationEvent {
            id: Uuid::new_v4(),
            recipient_id,
            kind: booking_engine::NotificationKind::ReservationRequested,
            payload: serde_json::json!({"status": "pending"}),
            created_at: Utc::now(),
            read_at: None,
        }
    }

    #[tokio::test]
    async fn pushed_events_become_sse_frames() {
        let registry = Arc::new(ConnectionRegistry::new());
        let recipient = Uuid::new_v4();
        let (conn, rx) = registry.register(recipient).await;
        let mut stream = NotificationStream::new(rx, registry.clone(), recipient, conn);

        let event = sample_event(recipient);
        registry.push(&event).await;

        // The buffered event wins over the initial heartbeat tick.
        let frame = stream.next().await.unwrap().unwrap();
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("event: notification\ndata: "));
        assert!(text.contains(&event.id.to_string()));
        assert!(text.ends_with("\n\n"));

        // With the channel idle the stream falls back to heartbeats.
        let next = stream.next().await.unwrap().unwrap();
        assert_eq!(&next[..], b": heartbeat\n\n");
    }

    #[tokio::test]
    async fn dropping_the_stream_unregisters_the_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let recipient = Uuid::new_v4();
        let (conn, rx) = registry.register(recipient).await;
        assert_eq!(registry.connected_recipients().await, 1);

        let stream = NotificationStream::new(rx, registry.clone(), recipient, conn);
        drop(stream);
        // Unregistration is spawned; give it a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.connected_recipients().await, 0);
    }
}
