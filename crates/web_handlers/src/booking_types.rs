use booking_engine::{AvailabilityBlock, DateRange, NotificationEvent, Reservation};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Request structure for creating a reservation
#[derive(Debug, Deserialize, Validate)]
pub struct CreateReservationRequest {
    /// The property to book
    pub resource_id: Uuid,

    /// The guest requesting the stay
    pub requester_id: Uuid,

    /// Check-in date for the stay
    pub check_in: NaiveDate,

    /// Check-out date for the stay (exclusive)
    pub check_out: NaiveDate,

    /// Price quoted to the guest at request time
    pub price_snapshot: Option<f64>,

    /// Whether a deposit will be required on confirmation
    #[serde(default)]
    pub requires_deposit: bool,

    /// Idempotency key for safe retries of this request
    #[validate(length(min = 1, message = "Idempotency key must not be empty"))]
    pub idempotency_key: Option<String>,
}

/// Request structure for a lifecycle transition
#[derive(Debug, Deserialize, Validate)]
pub struct TransitionRequest {
    /// Who is performing the action
    pub actor_id: Uuid,

    /// The action to apply: confirm, reject, cancel, complete or dispute
    #[validate(custom(function = "validate_transition_action"))]
    pub action: String,

    /// Optional human-readable reason, recorded in the notification payload
    #[validate(length(min = 1, message = "Reason must not be empty"))]
    pub reason: Option<String>,
}

/// Query parameters for listing a resource's reservations
#[derive(Debug, Deserialize)]
pub struct ListReservationsQuery {
    /// The property whose reservations to list
    pub resource_id: Uuid,
}

/// Query parameters for an availability check
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    /// The property to check
    pub resource_id: Uuid,
    /// First date of the candidate range
    pub start: NaiveDate,
    /// End date of the candidate range (exclusive)
    pub end: NaiveDate,
}

/// Request structure for blocking a date range
#[derive(Debug, Deserialize, Validate)]
pub struct BlockRequest {
    /// The property to block
    pub resource_id: Uuid,

    /// Who is imposing the block (must be the owner)
    pub actor_id: Uuid,

    /// First blocked date
    pub check_in: NaiveDate,

    /// End of the blocked range (exclusive)
    pub check_out: NaiveDate,

    /// Optional reason, e.g. "maintenance"
    #[validate(length(min = 1, message = "Reason must not be empty"))]
    pub reason: Option<String>,

    /// When the block should expire and be cleaned up automatically
    pub expires_at: Option<DateTime<Utc>>,
}

/// Query parameters identifying the acting user
#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    /// Who is performing the action
    pub actor_id: Uuid,
}

/// Query parameters for listing notifications
#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    /// Whose notifications to list
    pub recipient_id: Uuid,
    /// Only return records created after this instant
    pub since: Option<DateTime<Utc>>,
}

/// Request structure for marking a notification read
#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    /// Whose notification record it is
    pub recipient_id: Uuid,
}

/// Query parameters for subscribing to the live channel
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Whose events to stream
    pub recipient_id: Uuid,
}

/// Response structure for a reservation
#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    /// Unique identifier for the reservation
    pub id: Uuid,
    /// The booked property
    pub resource_id: Uuid,
    /// The requesting guest
    pub requester_id: Uuid,
    /// Check-in date
    pub check_in: NaiveDate,
    /// Check-out date (exclusive)
    pub check_out: NaiveDate,
    /// Number of nights
    pub nights: i64,
    /// Current lifecycle status
    pub status: String,
    /// Price quoted at request time
    pub price_snapshot: Option<f64>,
    /// Whether a deposit is required on confirmation
    pub requires_deposit: bool,
    /// When the reservation was created
    pub created_at: DateTime<Utc>,
    /// When the reservation last changed status
    pub updated_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            resource_id: r.resource_id,
            requester_id: r.requester_id,
            check_in: r.range.start,
            check_out: r.range.end,
            nights: r.range.nights(),
            status: r.status.as_str().to_string(),
            price_snapshot: r.price_snapshot,
            requires_deposit: r.requires_deposit,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Response structure for an availability check
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    /// True when the queried range overlaps nothing
    pub free: bool,
    /// Ranges already holding dates inside the query
    pub conflicts: Vec<DateRange>,
}

/// Response structure for an availability block
#[derive(Debug, Serialize)]
pub struct BlockResponse {
    /// Unique identifier for the block
    pub id: Uuid,
    /// The blocked property
    pub resource_id: Uuid,
    /// First blocked date
    pub check_in: NaiveDate,
    /// End of the blocked range (exclusive)
    pub check_out: NaiveDate,
    /// Optional reason
    pub reason: Option<String>,
    /// When the block was created
    pub created_at: DateTime<Utc>,
    /// When the block expires, if ever
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<AvailabilityBlock> for BlockResponse {
    fn from(b: AvailabilityBlock) -> Self {
        Self {
            id: b.id,
            resource_id: b.resource_id,
            check_in: b.range.start,
            check_out: b.range.end,
            reason: b.reason,
            created_at: b.created_at,
            expires_at: b.expires_at,
        }
    }
}

/// Response structure for listing notifications
#[derive(Debug, Serialize)]
pub struct ListNotificationsResponse {
    /// The notification records in creation order
    pub notifications: Vec<NotificationEvent>,
    /// Total count returned
    pub total: i64,
}

/// Custom validation function for transition actions
fn validate_transition_action(action: &str) -> Result<(), validator::ValidationError> {
    match action {
        "confirm" | "reject" | "cancel" | "complete" | "dispute" => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_transition_action")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_request_rejects_unknown_actions() {
        let request = TransitionRequest {
            actor_id: Uuid::new_v4(),
            action: "archive".to_string(),
            reason: None,
        };
        assert!(request.validate().is_err());

        let request = TransitionRequest {
            actor_id: Uuid::new_v4(),
            action: "confirm".to_string(),
            reason: Some("looks good".to_string()),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn reservation_response_exposes_half_open_bounds() {
        use booking_engine::ReservationStatus;

        let range = DateRange::new(
            "2024-06-01".parse().unwrap(),
            "2024-06-05".parse().unwrap(),
        )
        .unwrap();
        let reservation = Reservation {
            id: Uuid::new_v4(),
            resource_id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            range,
            status: ReservationStatus::Pending,
            price_snapshot: None,
            requires_deposit: false,
            idempotency_key: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let response = ReservationResponse::from(reservation);
        assert_eq!(response.check_in, range.start);
        assert_eq!(response.check_out, range.end);
        assert_eq!(response.nights, 4);
        assert_eq!(response.status, "pending");
    }
}
