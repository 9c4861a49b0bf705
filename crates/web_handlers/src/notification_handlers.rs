use actix_web::{HttpResponse, Result, web};

use booking_engine::BookingError;
use notification_services::Dispatcher;

use crate::booking_types::*;
use crate::stream::NotificationStream;

/// Lists a recipient's notifications in creation order
pub async fn list_notifications(
    dispatcher: web::Data<Dispatcher>,
    query: web::Query<NotificationsQuery>,
) -> Result<HttpResponse, BookingError> {
    let notifications = dispatcher
        .list_notifications(query.recipient_id, query.since)
        .await?;

    Ok(HttpResponse::Ok().json(ListNotificationsResponse {
        total: notifications.len() as i64,
        notifications,
    }))
}

/// Lists a recipient's unread notifications; reconnecting live clients call
/// this to close any push gap
pub async fn list_unread_notifications(
    dispatcher: web::Data<Dispatcher>,
    query: web::Query<NotificationsQuery>,
) -> Result<HttpResponse, BookingError> {
    let notifications = dispatcher.list_unread(query.recipient_id).await?;

    Ok(HttpResponse::Ok().json(ListNotificationsResponse {
        total: notifications.len() as i64,
        notifications,
    }))
}

/// Marks a notification read; repeating the call is a no-op
pub async fn mark_notification_read(
    dispatcher: web::Data<Dispatcher>,
    path: web::Path<uuid::Uuid>,
    request: web::Json<MarkReadRequest>,
) -> Result<HttpResponse, BookingError> {
    dispatcher
        .mark_read(request.recipient_id, path.into_inner())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Subscribes to the live notification channel as a server-sent-events
/// stream with periodic heartbeats. Push order per connection matches
/// creation order; after a reconnect the client re-fetches unread records.
pub async fn stream_notifications(
    dispatcher: web::Data<Dispatcher>,
    query: web::Query<StreamQuery>,
) -> Result<HttpResponse, BookingError> {
    let registry = dispatcher.registry();
    let (connection_id, rx) = registry.register(query.recipient_id).await;

    log::info!("Live channel opened for recipient {}", query.recipient_id);
    let stream = NotificationStream::new(rx, registry, query.recipient_id, connection_id);

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream))
}
