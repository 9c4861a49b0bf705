use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tracing::debug;
use uuid::Uuid;

use crate::error::BookingError;
use crate::range::DateRange;
use crate::store::ReservationStore;
use crate::types::{
    AvailabilityBlock, NotificationEvent, NotificationKind, Reservation, ReservationStatus,
};

/// Postgres-backed implementation of [`ReservationStore`].
///
/// Check-and-insert and guarded transitions run inside a transaction that
/// first takes `pg_advisory_xact_lock` keyed by the resource id, serializing
/// writers per resource across every process sharing the database.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a store over the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_resource(
        tx: &mut Transaction<'_, Postgres>,
        resource_id: Uuid,
    ) -> Result<(), BookingError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(resource_id.to_string())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn conflicts_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        resource_id: Uuid,
        range: &DateRange,
        include_blocks: bool,
    ) -> Result<Vec<DateRange>, BookingError> {
        let mut conflicts = Vec::new();

        let rows = sqlx::query(
            r#"
            SELECT check_in, check_out
            FROM reservations
            WHERE resource_id = $1
              AND status IN ('pending', 'confirmed', 'disputed')
              AND check_in < $3
              AND $2 < check_out
            ORDER BY check_in
            "#,
        )
        .bind(resource_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&mut **tx)
        .await?;

        for row in rows {
            conflicts.push(DateRange {
                start: row.get("check_in"),
                end: row.get("check_out"),
            });
        }

        if include_blocks {
            let rows = sqlx::query(
                r#"
                SELECT check_in, check_out
                FROM availability_blocks
                WHERE resource_id = $1
                  AND check_in < $3
                  AND $2 < check_out
                ORDER BY check_in
                "#,
            )
            .bind(resource_id)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&mut **tx)
            .await?;

            for row in rows {
                conflicts.push(DateRange {
                    start: row.get("check_in"),
                    end: row.get("check_out"),
                });
            }
            conflicts.sort_by_key(|r| r.start);
        }

        Ok(conflicts)
    }

    async fn insert_events_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        events: &[NotificationEvent],
    ) -> Result<(), BookingError> {
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO notification_events (id, recipient_id, kind, payload, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(event.id)
            .bind(event.recipient_id)
            .bind(event.kind.as_str())
            .bind(&event.payload)
            .bind(event.created_at)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

fn reservation_from_row(row: &PgRow) -> Result<Reservation, BookingError> {
    let status: String = row.get("status");
    let status = ReservationStatus::parse(&status)
        .ok_or_else(|| BookingError::Validation(format!("unknown status '{status}'")))?;

    Ok(Reservation {
        id: row.get("id"),
        resource_id: row.get("resource_id"),
        requester_id: row.get("requester_id"),
        range: DateRange {
            start: row.get("check_in"),
            end: row.get("check_out"),
        },
        status,
        price_snapshot: row.get("price_snapshot"),
        requires_deposit: row.get("requires_deposit"),
        idempotency_key: row.get("idempotency_key"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn event_from_row(row: &PgRow) -> Result<NotificationEvent, BookingError> {
    let kind: String = row.get("kind");
    let kind = NotificationKind::parse(&kind)
        .ok_or_else(|| BookingError::Validation(format!("unknown event kind '{kind}'")))?;

    Ok(NotificationEvent {
        id: row.get("id"),
        recipient_id: row.get("recipient_id"),
        kind,
        payload: row.get("payload"),
        created_at: row.get("created_at"),
        read_at: row.get("read_at"),
    })
}

const RESERVATION_COLUMNS: &str = "id, resource_id, requester_id, check_in, check_out, status, \
     price_snapshot, requires_deposit, idempotency_key, created_at, updated_at";

#[async_trait::async_trait]
impl ReservationStore for PgStore {
    async fn find_conflicts(
        &self,
        resource_id: Uuid,
        range: &DateRange,
    ) -> Result<Vec<DateRange>, BookingError> {
        let mut tx = self.pool.begin().await?;
        let conflicts = Self::conflicts_in_tx(&mut tx, resource_id, range, true).await?;
        tx.commit().await?;
        Ok(conflicts)
    }

    async fn insert_reservation_if_free(
        &self,
        reservation: Reservation,
        events: Vec<NotificationEvent>,
    ) -> Result<Reservation, BookingError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_resource(&mut tx, reservation.resource_id).await?;

        let conflicts =
            Self::conflicts_in_tx(&mut tx, reservation.resource_id, &reservation.range, true)
                .await?;
        if !conflicts.is_empty() {
            // Rolls back on drop; nothing was written.
            return Err(BookingError::RangeUnavailable { conflicts });
        }

        sqlx::query(
            r#"
            INSERT INTO reservations (
                id, resource_id, requester_id, check_in, check_out, status,
                price_snapshot, requires_deposit, idempotency_key, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.resource_id)
        .bind(reservation.requester_id)
        .bind(reservation.range.start)
        .bind(reservation.range.end)
        .bind(reservation.status.as_str())
        .bind(reservation.price_snapshot)
        .bind(reservation.requires_deposit)
        .bind(&reservation.idempotency_key)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *tx)
        .await?;

        Self::insert_events_in_tx(&mut tx, &events).await?;
        tx.commit().await?;

        debug!(
            "Inserted pending reservation {} on resource {}",
            reservation.id, reservation.resource_id
        );
        Ok(reservation)
    }

    async fn apply_transition(
        &self,
        reservation_id: Uuid,
        expected_from: &[ReservationStatus],
        to: ReservationStatus,
        events: Vec<NotificationEvent>,
    ) -> Result<Reservation, BookingError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1 FOR UPDATE"
        ))
        .bind(reservation_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(BookingError::NotFound)?;

        let current = reservation_from_row(&row)?;
        if !expected_from.contains(&current.status) {
            return Err(BookingError::InvalidTransition {
                from: current.status.as_str(),
                action: to.as_str(),
            });
        }

        let row = sqlx::query(&format!(
            "UPDATE reservations SET status = $1, updated_at = NOW() WHERE id = $2 \
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(to.as_str())
        .bind(reservation_id)
        .fetch_one(&mut *tx)
        .await?;
        let updated = reservation_from_row(&row)?;

        Self::insert_events_in_tx(&mut tx, &events).await?;
        tx.commit().await?;

        Ok(updated)
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Reservation, BookingError> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BookingError::NotFound)?;

        reservation_from_row(&row)
    }

    async fn list_reservations(
        &self,
        resource_id: Uuid,
    ) -> Result<Vec<Reservation>, BookingError> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE resource_id = $1 ORDER BY created_at DESC"
        ))
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(reservation_from_row).collect()
    }

    async fn find_by_idempotency_key(
        &self,
        resource_id: Uuid,
        key: &str,
    ) -> Result<Option<Reservation>, BookingError> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE resource_id = $1 AND idempotency_key = $2"
        ))
        .bind(resource_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(reservation_from_row).transpose()
    }

    async fn insert_block_if_free(
        &self,
        block: AvailabilityBlock,
    ) -> Result<AvailabilityBlock, BookingError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_resource(&mut tx, block.resource_id).await?;

        // Only range-holding reservations stop a block; existing blocks and
        // released reservations do not.
        let conflicts =
            Self::conflicts_in_tx(&mut tx, block.resource_id, &block.range, false).await?;
        if !conflicts.is_empty() {
            return Err(BookingError::RangeUnavailable { conflicts });
        }

        sqlx::query(
            r#"
            INSERT INTO availability_blocks (
                id, resource_id, check_in, check_out, reason, created_at, expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(block.id)
        .bind(block.resource_id)
        .bind(block.range.start)
        .bind(block.range.end)
        .bind(&block.reason)
        .bind(block.created_at)
        .bind(block.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(block)
    }

    async fn get_block(&self, block_id: Uuid) -> Result<Option<AvailabilityBlock>, BookingError> {
        let row = sqlx::query(
            "SELECT id, resource_id, check_in, check_out, reason, created_at, expires_at \
             FROM availability_blocks WHERE id = $1",
        )
        .bind(block_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| AvailabilityBlock {
            id: row.get("id"),
            resource_id: row.get("resource_id"),
            range: DateRange {
                start: row.get("check_in"),
                end: row.get("check_out"),
            },
            reason: row.get("reason"),
            created_at: row.get("created_at"),
            expires_at: row.get("expires_at"),
        }))
    }

    async fn remove_block(&self, block_id: Uuid) -> Result<(), BookingError> {
        sqlx::query("DELETE FROM availability_blocks WHERE id = $1")
            .bind(block_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_expired_blocks(&self, now: DateTime<Utc>) -> Result<u64, BookingError> {
        let result =
            sqlx::query("DELETE FROM availability_blocks WHERE expires_at IS NOT NULL AND expires_at <= $1")
                .bind(now)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn list_due_completions(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<Reservation>, BookingError> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE status = 'confirmed' AND check_out <= $1"
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(reservation_from_row).collect()
    }

    async fn list_notifications(
        &self,
        recipient_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<NotificationEvent>, BookingError> {
        let rows = sqlx::query(
            r#"
            SELECT id, recipient_id, kind, payload, created_at, read_at
            FROM notification_events
            WHERE recipient_id = $1
              AND ($2::timestamptz IS NULL OR created_at > $2)
            ORDER BY created_at, id
            "#,
        )
        .bind(recipient_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    async fn list_unread(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<NotificationEvent>, BookingError> {
        let rows = sqlx::query(
            r#"
            SELECT id, recipient_id, kind, payload, created_at, read_at
            FROM notification_events
            WHERE recipient_id = $1 AND read_at IS NULL
            ORDER BY created_at, id
            "#,
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    async fn mark_read(&self, recipient_id: Uuid, event_id: Uuid) -> Result<(), BookingError> {
        sqlx::query(
            r#"
            UPDATE notification_events
            SET read_at = NOW()
            WHERE id = $1 AND recipient_id = $2 AND read_at IS NULL
            "#,
        )
        .bind(event_id)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
