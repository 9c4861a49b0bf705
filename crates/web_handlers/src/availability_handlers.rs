use actix_web::{HttpResponse, Result, web};
use validator::Validate;

use booking_engine::{BookingEngine, BookingError, DateRange};

use crate::booking_types::*;

/// Answers whether a date range is free on a resource
pub async fn check_availability(
    engine: web::Data<BookingEngine>,
    query: web::Query<AvailabilityQuery>,
) -> Result<HttpResponse, BookingError> {
    let range = DateRange::new(query.start, query.end)?;
    let answer = engine.check_availability(query.resource_id, range).await?;

    Ok(HttpResponse::Ok().json(AvailabilityResponse {
        free: answer.free,
        conflicts: answer.conflicts,
    }))
}

/// Blocks a date range on a resource (owner only)
pub async fn create_block(
    engine: web::Data<BookingEngine>,
    request: web::Json<BlockRequest>,
) -> Result<HttpResponse, BookingError> {
    request
        .validate()
        .map_err(|e| BookingError::Validation(format!("Validation error: {}", e)))?;

    let range = DateRange::new(request.check_in, request.check_out)?;
    let block = engine
        .block(
            request.resource_id,
            request.actor_id,
            range,
            request.reason.clone(),
            request.expires_at,
        )
        .await?;

    Ok(HttpResponse::Created().json(BlockResponse::from(block)))
}

/// Removes a block (owner only); removing an absent block succeeds
pub async fn delete_block(
    engine: web::Data<BookingEngine>,
    path: web::Path<uuid::Uuid>,
    query: web::Query<ActorQuery>,
) -> Result<HttpResponse, BookingError> {
    engine.unblock(path.into_inner(), query.actor_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
