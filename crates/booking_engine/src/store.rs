use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::BookingError;
use crate::range::DateRange;
use crate::types::{AvailabilityBlock, NotificationEvent, Reservation, ReservationStatus};

/// Authoritative store for reservations, blocks and notification records.
///
/// The store is the single writer-of-record per resource. Mutating calls
/// commit atomically: a reservation change and its notification rows land in
/// one transaction, and every write is visible to reads issued after the
/// call returns.
#[async_trait::async_trait]
pub trait ReservationStore: Send + Sync {
    /// Returns the ranges already holding dates inside `range` for the
    /// resource: reservations in a range-holding status plus active blocks.
    async fn find_conflicts(
        &self,
        resource_id: Uuid,
        range: &DateRange,
    ) -> Result<Vec<DateRange>, BookingError>;

    /// Atomic check-and-insert of a pending reservation together with its
    /// notification rows. Fails with `RangeUnavailable` and no side effect
    /// when the range conflicts.
    async fn insert_reservation_if_free(
        &self,
        reservation: Reservation,
        events: Vec<NotificationEvent>,
    ) -> Result<Reservation, BookingError>;

    /// Applies a guarded status change plus its notification rows in one
    /// transaction. Fails with `InvalidTransition` when the stored status is
    /// not in `expected_from`, which also covers two racing transitions on
    /// the same reservation: only the first commits.
    async fn apply_transition(
        &self,
        reservation_id: Uuid,
        expected_from: &[ReservationStatus],
        to: ReservationStatus,
        events: Vec<NotificationEvent>,
    ) -> Result<Reservation, BookingError>;

    /// Fetches a reservation by id.
    async fn get_reservation(&self, id: Uuid) -> Result<Reservation, BookingError>;

    /// Lists all reservations for a resource, newest first.
    async fn list_reservations(&self, resource_id: Uuid)
    -> Result<Vec<Reservation>, BookingError>;

    /// Finds a prior reservation created with the same idempotency key.
    async fn find_by_idempotency_key(
        &self,
        resource_id: Uuid,
        key: &str,
    ) -> Result<Option<Reservation>, BookingError>;

    /// Inserts an availability block unless it overlaps a reservation that
    /// holds its range. Overlapping another block or a released reservation
    /// is allowed.
    async fn insert_block_if_free(
        &self,
        block: AvailabilityBlock,
    ) -> Result<AvailabilityBlock, BookingError>;

    /// Fetches a block by id, or `None` if it was already removed.
    async fn get_block(&self, block_id: Uuid) -> Result<Option<AvailabilityBlock>, BookingError>;

    /// Removes a block. Idempotent: removing an absent block is a no-op.
    async fn remove_block(&self, block_id: Uuid) -> Result<(), BookingError>;

    /// Removes blocks whose expiry has passed; returns how many went away.
    async fn remove_expired_blocks(&self, now: DateTime<Utc>) -> Result<u64, BookingError>;

    /// Lists confirmed reservations whose end date has passed and that the
    /// sweep should complete.
    async fn list_due_completions(&self, today: NaiveDate)
    -> Result<Vec<Reservation>, BookingError>;

    /// Lists a recipient's notification records in creation order,
    /// optionally only those created after `since`.
    async fn list_notifications(
        &self,
        recipient_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<NotificationEvent>, BookingError>;

    /// Lists a recipient's unread notification records in creation order.
    async fn list_unread(&self, recipient_id: Uuid)
    -> Result<Vec<NotificationEvent>, BookingError>;

    /// Marks a notification read. Idempotent: re-marking keeps the original
    /// read timestamp, and an unknown event id for this recipient is a no-op.
    async fn mark_read(&self, recipient_id: Uuid, event_id: Uuid) -> Result<(), BookingError>;
}
