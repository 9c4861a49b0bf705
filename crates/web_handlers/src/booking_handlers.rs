use actix_web::{HttpResponse, Result, web};
use validator::Validate;

use booking_engine::{
    BookingEngine, BookingError, DateRange, ReservationMeta, TransitionAction,
};

use crate::booking_types::*;

/// Creates a reservation request for a date range on a resource
pub async fn create_reservation(
    engine: web::Data<BookingEngine>,
    request: web::Json<CreateReservationRequest>,
) -> Result<HttpResponse, BookingError> {
    request
        .validate()
        .map_err(|e| BookingError::Validation(format!("Validation error: {}", e)))?;

    let range = DateRange::new(request.check_in, request.check_out)?;
    let meta = ReservationMeta {
        price_snapshot: request.price_snapshot,
        requires_deposit: request.requires_deposit,
        idempotency_key: request.idempotency_key.clone(),
    };

    let reservation = engine
        .create(request.resource_id, request.requester_id, range, meta)
        .await?;

    Ok(HttpResponse::Created().json(ReservationResponse::from(reservation)))
}

/// Applies a lifecycle transition to a reservation
pub async fn transition_reservation(
    engine: web::Data<BookingEngine>,
    path: web::Path<uuid::Uuid>,
    request: web::Json<TransitionRequest>,
) -> Result<HttpResponse, BookingError> {
    request
        .validate()
        .map_err(|e| BookingError::Validation(format!("Validation error: {}", e)))?;

    // The validator has already constrained the action set.
    let action = TransitionAction::parse(&request.action).ok_or_else(|| {
        BookingError::Validation(format!("Unknown action '{}'", request.action))
    })?;

    let reservation = engine
        .transition(
            path.into_inner(),
            request.actor_id,
            action,
            request.reason.clone(),
        )
        .await?;

    Ok(HttpResponse::Ok().json(ReservationResponse::from(reservation)))
}

/// Gets a reservation by id
pub async fn get_reservation(
    engine: web::Data<BookingEngine>,
    path: web::Path<uuid::Uuid>,
) -> Result<HttpResponse, BookingError> {
    let reservation = engine.get_reservation(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ReservationResponse::from(reservation)))
}

/// Lists reservations for a resource, newest first
pub async fn list_reservations(
    engine: web::Data<BookingEngine>,
    query: web::Query<ListReservationsQuery>,
) -> Result<HttpResponse, BookingError> {
    let reservations = engine.list_reservations(query.resource_id).await?;
    let reservations: Vec<ReservationResponse> =
        reservations.into_iter().map(ReservationResponse::from).collect();
    Ok(HttpResponse::Ok().json(reservations))
}
