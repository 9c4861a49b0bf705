use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::BookingError;
use crate::range::DateRange;
use crate::store::ReservationStore;
use crate::types::{AvailabilityBlock, NotificationEvent, Reservation, ReservationStatus};

/// In-memory implementation of [`ReservationStore`].
///
/// Backs the test suite and the `STORE=memory` development mode. A single
/// mutex over the whole state stands in for a database transaction, so the
/// atomicity and read-after-write guarantees of the trait hold here too.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    reservations: HashMap<Uuid, Reservation>,
    blocks: HashMap<Uuid, AvailabilityBlock>,
    /// Insertion order doubles as creation order for pull queries.
    notifications: Vec<NotificationEvent>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn conflicts_for(&self, resource_id: Uuid, range: &DateRange) -> Vec<DateRange> {
        let mut conflicts: Vec<DateRange> = self
            .reservations
            .values()
            .filter(|r| {
                r.resource_id == resource_id
                    && r.status.holds_range()
                    && r.range.overlaps(range)
            })
            .map(|r| r.range)
            .collect();

        conflicts.extend(
            self.blocks
                .values()
                .filter(|b| b.resource_id == resource_id && b.range.overlaps(range))
                .map(|b| b.range),
        );

        conflicts.sort_by_key(|r| r.start);
        conflicts
    }
}

#[async_trait::async_trait]
impl ReservationStore for MemoryStore {
    async fn find_conflicts(
        &self,
        resource_id: Uuid,
        range: &DateRange,
    ) -> Result<Vec<DateRange>, BookingError> {
        let inner = self.inner.lock().await;
        Ok(inner.conflicts_for(resource_id, range))
    }

    async fn insert_reservation_if_free(
        &self,
        reservation: Reservation,
        events: Vec<NotificationEvent>,
    ) -> Result<Reservation, BookingError> {
        let mut inner = self.inner.lock().await;

        let conflicts = inner.conflicts_for(reservation.resource_id, &reservation.range);
        if !conflicts.is_empty() {
            return Err(BookingError::RangeUnavailable { conflicts });
        }

        inner.reservations.insert(reservation.id, reservation.clone());
        inner.notifications.extend(events);
        Ok(reservation)
    }

    async fn apply_transition(
        &self,
        reservation_id: Uuid,
        expected_from: &[ReservationStatus],
        to: ReservationStatus,
        events: Vec<NotificationEvent>,
    ) -> Result<Reservation, BookingError> {
        let mut inner = self.inner.lock().await;

        let reservation = inner
            .reservations
            .get_mut(&reservation_id)
            .ok_or(BookingError::NotFound)?;

        if !expected_from.contains(&reservation.status) {
            return Err(BookingError::InvalidTransition {
                from: reservation.status.as_str(),
                action: to.as_str(),
            });
        }

        reservation.status = to;
        reservation.updated_at = Utc::now();
        let updated = reservation.clone();

        inner.notifications.extend(events);
        Ok(updated)
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Reservation, BookingError> {
        let inner = self.inner.lock().await;
        inner
            .reservations
            .get(&id)
            .cloned()
            .ok_or(BookingError::NotFound)
    }

    async fn list_reservations(
        &self,
        resource_id: Uuid,
    ) -> Result<Vec<Reservation>, BookingError> {
        let inner = self.inner.lock().await;
        let mut reservations: Vec<Reservation> = inner
            .reservations
            .values()
            .filter(|r| r.resource_id == resource_id)
            .cloned()
            .collect();
        reservations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reservations)
    }

    async fn find_by_idempotency_key(
        &self,
        resource_id: Uuid,
        key: &str,
    ) -> Result<Option<Reservation>, BookingError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .reservations
            .values()
            .find(|r| {
                r.resource_id == resource_id && r.idempotency_key.as_deref() == Some(key)
            })
            .cloned())
    }

    async fn insert_block_if_free(
        &self,
        block: AvailabilityBlock,
    ) -> Result<AvailabilityBlock, BookingError> {
        let mut inner = self.inner.lock().await;

        // Only reservations that hold their range stop a block; another
        // block or a released reservation does not.
        let mut conflicts: Vec<DateRange> = inner
            .reservations
            .values()
            .filter(|r| {
                r.resource_id == block.resource_id
                    && r.status.holds_range()
                    && r.range.overlaps(&block.range)
            })
            .map(|r| r.range)
            .collect();
        conflicts.sort_by_key(|r| r.start);

        if !conflicts.is_empty() {
            return Err(BookingError::RangeUnavailable { conflicts });
        }

        inner.blocks.insert(block.id, block.clone());
        Ok(block)
    }

    async fn get_block(&self, block_id: Uuid) -> Result<Option<AvailabilityBlock>, BookingError> {
        let inner = self.inner.lock().await;
        Ok(inner.blocks.get(&block_id).cloned())
    }

    async fn remove_block(&self, block_id: Uuid) -> Result<(), BookingError> {
        let mut inner = self.inner.lock().await;
        inner.blocks.remove(&block_id);
        Ok(())
    }

    async fn remove_expired_blocks(&self, now: DateTime<Utc>) -> Result<u64, BookingError> {
        let mut inner = self.inner.lock().await;
        let before = inner.blocks.len();
        inner
            .blocks
            .retain(|_, b| b.expires_at.is_none_or(|expiry| expiry > now));
        Ok((before - inner.blocks.len()) as u64)
    }

    async fn list_due_completions(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<Reservation>, BookingError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Confirmed && r.range.end <= today)
            .cloned()
            .collect())
    }

    async fn list_notifications(
        &self,
        recipient_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<NotificationEvent>, BookingError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .notifications
            .iter()
            .filter(|e| e.recipient_id == recipient_id)
            .filter(|e| since.is_none_or(|s| e.created_at > s))
            .cloned()
            .collect())
    }

    async fn list_unread(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<NotificationEvent>, BookingError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .notifications
            .iter()
            .filter(|e| e.recipient_id == recipient_id && e.read_at.is_none())
            .cloned()
            .collect())
    }

    async fn mark_read(&self, recipient_id: Uuid, event_id: Uuid) -> Result<(), BookingError> {
        let mut inner = self.inner.lock().await;
        if let Some(event) = inner
            .notifications
            .iter_mut()
            .find(|e| e.id == event_id && e.recipient_id == recipient_id)
        {
            if event.read_at.is_none() {
                event.read_at = Some(Utc::now());
            }
        }
        Ok(())
    }
}
