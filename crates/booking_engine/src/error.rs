use crate::range::DateRange;

/// Custom error type for booking operations
#[derive(thiserror::Error, Debug)]
pub enum BookingError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed request (bad range, missing fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested range overlaps an existing reservation or block
    #[error("Requested dates are unavailable")]
    RangeUnavailable {
        /// Ranges already holding dates inside the request
        conflicts: Vec<DateRange>,
    },

    /// The requested action is not permitted from the current status
    #[error("Cannot move a {from} reservation to {action}")]
    InvalidTransition {
        /// Status the reservation was in
        from: &'static str,
        /// Target status that was attempted
        action: &'static str,
    },

    /// Per-resource lock could not be acquired in time; retryable
    #[error("Resource is busy, try again")]
    Busy,

    /// Reservation or block not found
    #[error("Not found")]
    NotFound,

    /// The actor holds no capability for this action
    #[error("Not allowed to perform this action")]
    Forbidden,
}

impl actix_web::ResponseError for BookingError {
    fn error_response(&self) -> actix_web::HttpResponse {
        use actix_web::HttpResponse;

        match self {
            BookingError::Validation(msg) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "validation_error",
                "message": msg
            })),
            BookingError::RangeUnavailable { conflicts } => {
                HttpResponse::Conflict().json(serde_json::json!({
                    "error": "range_unavailable",
                    "message": "The requested dates overlap an existing reservation or block",
                    "conflicts": conflicts
                }))
            }
            BookingError::InvalidTransition { from, action } => {
                HttpResponse::Conflict().json(serde_json::json!({
                    "error": "invalid_transition",
                    "message": format!("Cannot move a reservation from {} to {}", from, action)
                }))
            }
            BookingError::Busy => HttpResponse::ServiceUnavailable()
                .insert_header(("Retry-After", "1"))
                .json(serde_json::json!({
                    "error": "busy",
                    "message": "The resource is busy, please try again"
                })),
            BookingError::NotFound => HttpResponse::NotFound().json(serde_json::json!({
                "error": "not_found",
                "message": "Reservation or block not found"
            })),
            BookingError::Forbidden => HttpResponse::Forbidden().json(serde_json::json!({
                "error": "forbidden",
                "message": "You are not allowed to perform this action"
            })),
            BookingError::Database(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "internal_error",
                    "message": "An internal error occurred"
                }))
            }
        }
    }
}
