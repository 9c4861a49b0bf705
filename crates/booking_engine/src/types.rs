use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::range::DateRange;

/// Lifecycle status of a reservation.
///
/// `Pending` and `Confirmed` hold their date range against other writers;
/// every other status has released it (or, for `Disputed`, frozen it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Awaiting the owner's decision; provisionally holds the range
    Pending,
    /// Accepted by the owner; holds the range
    Confirmed,
    /// Stay finished (end date passed)
    Completed,
    /// Declined by the owner while pending
    Rejected,
    /// Withdrawn by the owner or the requester
    Cancelled,
    /// Frozen for manual resolution; the range stays held
    Disputed,
}

impl ReservationStatus {
    /// Stable string form used in the database and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Disputed => "disputed",
        }
    }

    /// Parses the database string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            "disputed" => Some(Self::Disputed),
            _ => None,
        }
    }

    /// True when no further transition is permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Rejected | Self::Cancelled | Self::Disputed
        )
    }

    /// True when the reservation's range blocks overlapping writers.
    pub fn holds_range(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::Disputed)
    }
}

/// A date-range claim against a resource with a lifecycle status.
///
/// Reservations are never physically deleted; cancelled and completed
/// records are retained for history and review eligibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique identifier for the reservation
    pub id: Uuid,
    /// The bookable property this reservation claims
    pub resource_id: Uuid,
    /// The guest who requested the stay
    pub requester_id: Uuid,
    /// Half-open occupancy interval
    pub range: DateRange,
    /// Current lifecycle status
    pub status: ReservationStatus,
    /// Price quoted at request time, if any; never recomputed
    pub price_snapshot: Option<f64>,
    /// Whether the payment collaborator requires a deposit after confirm
    pub requires_deposit: bool,
    /// Caller-supplied key to make create retries safe
    pub idempotency_key: Option<String>,
    /// When the reservation was created
    pub created_at: DateTime<Utc>,
    /// When the reservation last changed status
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied metadata for a reservation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservationMeta {
    /// Price quoted to the guest at request time
    pub price_snapshot: Option<f64>,
    /// Whether a deposit will be required on confirmation
    #[serde(default)]
    pub requires_deposit: bool,
    /// Idempotency key for safe retries of the same request
    pub idempotency_key: Option<String>,
}

/// An owner-imposed exclusion of a date range from booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityBlock {
    /// Unique identifier for the block
    pub id: Uuid,
    /// The property the block applies to
    pub resource_id: Uuid,
    /// Excluded date range
    pub range: DateRange,
    /// Optional owner-facing reason (e.g. "maintenance")
    pub reason: Option<String>,
    /// When the block was created
    pub created_at: DateTime<Utc>,
    /// When the block stops applying and becomes eligible for cleanup
    pub expires_at: Option<DateTime<Utc>>,
}

/// The kind of lifecycle fact a notification describes.
///
/// One kind per transition type; there is no generic status-updated kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A guest requested a stay (reservation born pending)
    ReservationRequested,
    /// The owner accepted the request
    ReservationConfirmed,
    /// The owner declined the request
    ReservationRejected,
    /// The owner or the requester withdrew the reservation
    ReservationCancelled,
    /// The stay finished
    ReservationCompleted,
    /// The reservation was frozen for manual resolution
    ReservationDisputed,
}

impl NotificationKind {
    /// Stable string form used in the database and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReservationRequested => "reservation_requested",
            Self::ReservationConfirmed => "reservation_confirmed",
            Self::ReservationRejected => "reservation_rejected",
            Self::ReservationCancelled => "reservation_cancelled",
            Self::ReservationCompleted => "reservation_completed",
            Self::ReservationDisputed => "reservation_disputed",
        }
    }

    /// Parses the database string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reservation_requested" => Some(Self::ReservationRequested),
            "reservation_confirmed" => Some(Self::ReservationConfirmed),
            "reservation_rejected" => Some(Self::ReservationRejected),
            "reservation_cancelled" => Some(Self::ReservationCancelled),
            "reservation_completed" => Some(Self::ReservationCompleted),
            "reservation_disputed" => Some(Self::ReservationDisputed),
            _ => None,
        }
    }
}

/// A persisted, per-recipient record of a lifecycle fact.
///
/// Derived projection of a reservation transition, not source of truth;
/// mutated only by marking it read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Unique identifier; clients deduplicate on this
    pub id: Uuid,
    /// The user this record belongs to
    pub recipient_id: Uuid,
    /// Which transition produced the record
    pub kind: NotificationKind,
    /// Reservation snapshot at transition time
    pub payload: serde_json::Value,
    /// When the record was created; pull ordering follows this
    pub created_at: DateTime<Utc>,
    /// When the recipient marked it read, if ever
    pub read_at: Option<DateTime<Utc>>,
}

impl NotificationEvent {
    /// Builds the per-recipient records for one lifecycle transition.
    ///
    /// Recipients are the resource owner and the requester, minus the actor
    /// who caused the transition; a system-driven transition (no actor)
    /// notifies both. Exactly one record per recipient.
    pub fn fan_out(
        kind: NotificationKind,
        reservation: &Reservation,
        owner_id: Uuid,
        actor_id: Option<Uuid>,
        reason: Option<&str>,
    ) -> Vec<NotificationEvent> {
        let payload = serde_json::json!({
            "reservation_id": reservation.id,
            "resource_id": reservation.resource_id,
            "requester_id": reservation.requester_id,
            "range": reservation.range,
            "status": reservation.status,
            "actor_id": actor_id,
            "reason": reason,
        });

        let mut recipients = vec![owner_id, reservation.requester_id];
        recipients.dedup();
        let created_at = Utc::now();

        recipients
            .into_iter()
            .filter(|recipient| Some(*recipient) != actor_id)
            .map(|recipient_id| NotificationEvent {
                id: Uuid::new_v4(),
                recipient_id,
                kind,
                payload: payload.clone(),
                created_at,
                read_at: None,
            })
            .collect()
    }
}

/// A lifecycle fact published on the event bus after its transaction
/// commits. Carries the already-persisted per-recipient events so the
/// dispatcher only has to push them.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    /// Which transition happened
    pub kind: NotificationKind,
    /// The reservation after the transition
    pub reservation: Reservation,
    /// Who caused the transition, `None` for system-driven transitions
    pub actor_id: Option<Uuid>,
    /// Persisted notification rows, one per recipient
    pub events: Vec<NotificationEvent>,
}

/// Answer to an availability query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityAnswer {
    /// True when the queried range overlaps nothing
    pub free: bool,
    /// Ranges already holding dates inside the query
    pub conflicts: Vec<DateRange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_forms_round_trip() {
        for status in [
            ReservationStatus::Pending,
            ReservationStatus::Confirmed,
            ReservationStatus::Completed,
            ReservationStatus::Rejected,
            ReservationStatus::Cancelled,
            ReservationStatus::Disputed,
        ] {
            assert_eq!(ReservationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReservationStatus::parse("paused"), None);
    }

    #[test]
    fn terminal_states_release_or_freeze() {
        assert!(!ReservationStatus::Pending.is_terminal());
        assert!(!ReservationStatus::Confirmed.is_terminal());
        assert!(ReservationStatus::Cancelled.is_terminal());
        assert!(ReservationStatus::Cancelled.holds_range().eq(&false));
        assert!(ReservationStatus::Disputed.is_terminal());
        // A dispute freezes the reservation without freeing the dates.
        assert!(ReservationStatus::Disputed.holds_range());
    }

    #[test]
    fn kind_string_forms_round_trip() {
        for kind in [
            NotificationKind::ReservationRequested,
            NotificationKind::ReservationConfirmed,
            NotificationKind::ReservationRejected,
            NotificationKind::ReservationCancelled,
            NotificationKind::ReservationCompleted,
            NotificationKind::ReservationDisputed,
        ] {
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
    }
}
