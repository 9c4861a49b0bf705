use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::directory::ResourceDirectory;
use crate::error::BookingError;
use crate::range::DateRange;
use crate::store::ReservationStore;
use crate::types::{
    AvailabilityAnswer, AvailabilityBlock, LifecycleEvent, NotificationEvent, NotificationKind,
    Reservation, ReservationMeta, ReservationStatus,
};

/// Lifecycle action requested through the transition endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    /// Owner accepts a pending request
    Confirm,
    /// Owner declines a pending request
    Reject,
    /// Owner or requester withdraws a pending or confirmed reservation
    Cancel,
    /// Owner closes out a confirmed stay whose end date has passed
    Complete,
    /// Owner or requester freezes a confirmed reservation for resolution
    Dispute,
}

impl TransitionAction {
    /// Parses the wire form of an action.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirm" => Some(Self::Confirm),
            "reject" => Some(Self::Reject),
            "cancel" => Some(Self::Cancel),
            "complete" => Some(Self::Complete),
            "dispute" => Some(Self::Dispute),
            _ => None,
        }
    }

    fn target(&self) -> ReservationStatus {
        match self {
            Self::Confirm => ReservationStatus::Confirmed,
            Self::Reject => ReservationStatus::Rejected,
            Self::Cancel => ReservationStatus::Cancelled,
            Self::Complete => ReservationStatus::Completed,
            Self::Dispute => ReservationStatus::Disputed,
        }
    }

    fn allowed_from(&self) -> &'static [ReservationStatus] {
        match self {
            Self::Confirm | Self::Reject => &[ReservationStatus::Pending],
            Self::Cancel => &[ReservationStatus::Pending, ReservationStatus::Confirmed],
            Self::Complete | Self::Dispute => &[ReservationStatus::Confirmed],
        }
    }

    fn kind(&self) -> NotificationKind {
        match self {
            Self::Confirm => NotificationKind::ReservationConfirmed,
            Self::Reject => NotificationKind::ReservationRejected,
            Self::Cancel => NotificationKind::ReservationCancelled,
            Self::Complete => NotificationKind::ReservationCompleted,
            Self::Dispute => NotificationKind::ReservationDisputed,
        }
    }
}

/// Tuning knobs for the booking engine.
#[derive(Debug, Clone)]
pub struct BookingConfig {
    /// How long a call may wait on the per-resource lock before `Busy`
    /// (default: 5 seconds)
    pub lock_timeout: Duration,

    /// Confirm reservations immediately on creation, acting as the owner
    /// (default: false)
    pub auto_confirm: bool,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            auto_confirm: false,
        }
    }
}

/// Outcome of one periodic sweep pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepOutcome {
    /// Confirmed reservations moved to completed
    pub completed: u64,
    /// Expired availability blocks removed
    pub expired_blocks: u64,
}

/// The reservation state machine and availability authority.
///
/// All mutating calls serialize per resource: an in-process lock registry
/// bounds waiting with `Busy`, and the Postgres store adds an advisory
/// transaction lock so the guarantee spans processes. Every successful
/// transition persists its notification records in the same transaction and
/// then publishes the fact on the event bus; publication is fire-and-forget
/// relative to the commit.
pub struct BookingEngine {
    store: Arc<dyn ReservationStore>,
    directory: Arc<dyn ResourceDirectory>,
    bus: broadcast::Sender<LifecycleEvent>,

    /// In-process lock per resource; entries are created on first use
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,

    config: BookingConfig,
}

impl BookingEngine {
    /// Creates an engine over a store, a resource directory and the sending
    /// half of the lifecycle event bus.
    pub fn new(
        store: Arc<dyn ReservationStore>,
        directory: Arc<dyn ResourceDirectory>,
        bus: broadcast::Sender<LifecycleEvent>,
        config: BookingConfig,
    ) -> Self {
        Self {
            store,
            directory,
            bus,
            locks: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Requests a stay. The check-free and insert-pending steps are atomic
    /// with respect to other create calls on the same resource: of two
    /// concurrent overlapping requests exactly one succeeds. A repeated call
    /// with the same idempotency key returns the original reservation.
    pub async fn create(
        &self,
        resource_id: Uuid,
        requester_id: Uuid,
        range: DateRange,
        meta: ReservationMeta,
    ) -> Result<Reservation, BookingError> {
        let owner_id = self.owner_of(resource_id).await?;

        let _guard = self.acquire_resource_lock(resource_id).await?;

        if let Some(key) = meta.idempotency_key.as_deref() {
            if let Some(existing) = self.store.find_by_idempotency_key(resource_id, key).await? {
                debug!(
                    "Create retry with idempotency key {key} returned reservation {}",
                    existing.id
                );
                return Ok(existing);
            }
        }

        let now = Utc::now();
        let reservation = Reservation {
            id: Uuid::new_v4(),
            resource_id,
            requester_id,
            range,
            status: ReservationStatus::Pending,
            price_snapshot: meta.price_snapshot,
            requires_deposit: meta.requires_deposit,
            idempotency_key: meta.idempotency_key,
            created_at: now,
            updated_at: now,
        };

        let events = NotificationEvent::fan_out(
            NotificationKind::ReservationRequested,
            &reservation,
            owner_id,
            Some(requester_id),
            None,
        );

        let reservation = self
            .store
            .insert_reservation_if_free(reservation, events.clone())
            .await?;

        info!(
            "Reservation {} requested on resource {} for {} to {}",
            reservation.id, resource_id, range.start, range.end
        );
        self.publish(NotificationKind::ReservationRequested, &reservation, requester_id, events);

        if self.config.auto_confirm {
            return self
                .apply_transition_locked(&reservation, owner_id, TransitionAction::Confirm, None)
                .await;
        }

        Ok(reservation)
    }

    /// Applies a lifecycle action on behalf of `actor_id`, enforcing the
    /// capability policy once per call: confirm/reject/complete are
    /// owner-only, cancel and dispute allow the owner or the requester.
    pub async fn transition(
        &self,
        reservation_id: Uuid,
        actor_id: Uuid,
        action: TransitionAction,
        reason: Option<String>,
    ) -> Result<Reservation, BookingError> {
        let reservation = self.store.get_reservation(reservation_id).await?;
        let owner_id = self.owner_of(reservation.resource_id).await?;

        let allowed = match action {
            TransitionAction::Confirm | TransitionAction::Reject | TransitionAction::Complete => {
                actor_id == owner_id
            }
            TransitionAction::Cancel | TransitionAction::Dispute => {
                actor_id == owner_id || actor_id == reservation.requester_id
            }
        };
        if !allowed {
            return Err(BookingError::Forbidden);
        }

        if action == TransitionAction::Complete
            && reservation.range.end > Utc::now().date_naive()
        {
            return Err(BookingError::Validation(
                "reservation cannot be completed before the stay ends".to_string(),
            ));
        }

        let _guard = self.acquire_resource_lock(reservation.resource_id).await?;
        self.apply_transition_locked(&reservation, actor_id, action, reason)
            .await
    }

    /// Answers whether a range is free, listing the conflicting ranges.
    pub async fn check_availability(
        &self,
        resource_id: Uuid,
        range: DateRange,
    ) -> Result<AvailabilityAnswer, BookingError> {
        let conflicts = self.store.find_conflicts(resource_id, &range).await?;
        Ok(AvailabilityAnswer {
            free: conflicts.is_empty(),
            conflicts,
        })
    }

    /// Fetches a single reservation.
    pub async fn get_reservation(&self, id: Uuid) -> Result<Reservation, BookingError> {
        self.store.get_reservation(id).await
    }

    /// Lists every reservation recorded for a resource, newest first.
    pub async fn list_reservations(
        &self,
        resource_id: Uuid,
    ) -> Result<Vec<Reservation>, BookingError> {
        self.store.list_reservations(resource_id).await
    }

    /// Owner-only: excludes a date range from booking. Fails with
    /// `RangeUnavailable` when the range overlaps a reservation that still
    /// holds its dates; the owner cannot retroactively block a committed
    /// stay.
    pub async fn block(
        &self,
        resource_id: Uuid,
        actor_id: Uuid,
        range: DateRange,
        reason: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<AvailabilityBlock, BookingError> {
        let owner_id = self.owner_of(resource_id).await?;
        if actor_id != owner_id {
            return Err(BookingError::Forbidden);
        }

        let _guard = self.acquire_resource_lock(resource_id).await?;

        let block = AvailabilityBlock {
            id: Uuid::new_v4(),
            resource_id,
            range,
            reason,
            created_at: Utc::now(),
            expires_at,
        };
        let block = self.store.insert_block_if_free(block).await?;
        info!(
            "Blocked {} to {} on resource {}",
            block.range.start, block.range.end, resource_id
        );
        Ok(block)
    }

    /// Owner-only removal of a block. Idempotent: removing a block that is
    /// already gone succeeds without effect.
    pub async fn unblock(&self, block_id: Uuid, actor_id: Uuid) -> Result<(), BookingError> {
        let Some(block) = self.store.get_block(block_id).await? else {
            return Ok(());
        };

        let owner_id = self.owner_of(block.resource_id).await?;
        if actor_id != owner_id {
            return Err(BookingError::Forbidden);
        }

        self.store.remove_block(block_id).await
    }

    /// One sweep pass: completes confirmed reservations whose end date has
    /// passed and purges expired blocks. Per-reservation failures are logged
    /// and the pass continues.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> Result<SweepOutcome, BookingError> {
        let mut outcome = SweepOutcome::default();

        for reservation in self.store.list_due_completions(now.date_naive()).await? {
            let _guard = self.acquire_resource_lock(reservation.resource_id).await?;
            match self
                .apply_transition_system(&reservation, TransitionAction::Complete)
                .await
            {
                Ok(_) => outcome.completed += 1,
                Err(BookingError::InvalidTransition { .. }) => {
                    // Raced with an explicit transition; the sweep moves on.
                }
                Err(e) => {
                    error!("Failed to complete reservation {}: {}", reservation.id, e);
                }
            }
        }

        outcome.expired_blocks = self.store.remove_expired_blocks(now).await?;
        if outcome.completed > 0 || outcome.expired_blocks > 0 {
            info!(
                "Sweep completed {} reservations, removed {} expired blocks",
                outcome.completed, outcome.expired_blocks
            );
        }
        Ok(outcome)
    }

    async fn owner_of(&self, resource_id: Uuid) -> Result<Uuid, BookingError> {
        self.directory
            .owner_of(resource_id)
            .await?
            .ok_or(BookingError::NotFound)
    }

    /// Acquires the in-process per-resource lock with a bounded wait. One
    /// internal retry with jitter before surfacing `Busy` to the caller.
    async fn acquire_resource_lock(
        &self,
        resource_id: Uuid,
    ) -> Result<OwnedMutexGuard<()>, BookingError> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(resource_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        if let Ok(guard) = timeout(self.config.lock_timeout, lock.clone().lock_owned()).await {
            return Ok(guard);
        }

        let jitter: u64 = rand::Rng::random_range(&mut rand::rng(), 10..100);
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        match timeout(self.config.lock_timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                warn!("Lock acquisition timed out for resource {resource_id}");
                Err(BookingError::Busy)
            }
        }
    }

    /// Transition body shared by actor-driven and system-driven paths; the
    /// caller holds the per-resource lock.
    async fn apply_transition_locked(
        &self,
        reservation: &Reservation,
        actor_id: Uuid,
        action: TransitionAction,
        reason: Option<String>,
    ) -> Result<Reservation, BookingError> {
        let owner_id = self.owner_of(reservation.resource_id).await?;

        let mut snapshot = reservation.clone();
        snapshot.status = action.target();
        let events = NotificationEvent::fan_out(
            action.kind(),
            &snapshot,
            owner_id,
            Some(actor_id),
            reason.as_deref(),
        );

        let updated = self
            .store
            .apply_transition(
                reservation.id,
                action.allowed_from(),
                action.target(),
                events.clone(),
            )
            .await?;

        info!(
            "Reservation {} moved to {} by {}",
            updated.id,
            updated.status.as_str(),
            actor_id
        );
        self.publish(action.kind(), &updated, actor_id, events);
        Ok(updated)
    }

    async fn apply_transition_system(
        &self,
        reservation: &Reservation,
        action: TransitionAction,
    ) -> Result<Reservation, BookingError> {
        let owner_id = self.owner_of(reservation.resource_id).await?;

        let mut snapshot = reservation.clone();
        snapshot.status = action.target();
        // No actor: both the owner and the requester are notified.
        let events =
            NotificationEvent::fan_out(action.kind(), &snapshot, owner_id, None, None);

        let updated = self
            .store
            .apply_transition(
                reservation.id,
                action.allowed_from(),
                action.target(),
                events.clone(),
            )
            .await?;

        self.publish_event(LifecycleEvent {
            kind: action.kind(),
            reservation: updated.clone(),
            actor_id: None,
            events,
        });
        Ok(updated)
    }

    fn publish(
        &self,
        kind: NotificationKind,
        reservation: &Reservation,
        actor_id: Uuid,
        events: Vec<NotificationEvent>,
    ) {
        self.publish_event(LifecycleEvent {
            kind,
            reservation: reservation.clone(),
            actor_id: Some(actor_id),
            events,
        });
    }

    fn publish_event(&self, event: LifecycleEvent) {
        // The records are already durable; a bus with no subscriber only
        // skips the live push.
        if self.bus.send(event).is_err() {
            debug!("No live subscribers for lifecycle event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::memory_store::MemoryStore;
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn r(start: &str, end: &str) -> DateRange {
        DateRange::new(d(start), d(end)).unwrap()
    }

    struct Fixture {
        engine: Arc<BookingEngine>,
        store: Arc<MemoryStore>,
        resource: Uuid,
        owner: Uuid,
    }

    fn fixture_with(config: BookingConfig) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let resource = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let mut directory = StaticDirectory::new();
        directory.insert(resource, owner);
        let (bus, _) = broadcast::channel(64);
        let engine = Arc::new(BookingEngine::new(
            store.clone(),
            Arc::new(directory),
            bus,
            config,
        ));
        Fixture {
            engine,
            store,
            resource,
            owner,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(BookingConfig::default())
    }

    #[tokio::test]
    async fn create_births_pending_and_rejects_overlap() {
        let f = fixture();
        let guest_a = Uuid::new_v4();
        let guest_b = Uuid::new_v4();

        let first = f
            .engine
            .create(f.resource, guest_a, r("2024-06-01", "2024-06-05"), Default::default())
            .await
            .unwrap();
        assert_eq!(first.status, ReservationStatus::Pending);

        let second = f
            .engine
            .create(f.resource, guest_b, r("2024-06-04", "2024-06-08"), Default::default())
            .await;
        assert!(matches!(second, Err(BookingError::RangeUnavailable { .. })));
    }

    #[tokio::test]
    async fn touching_boundary_is_not_a_conflict() {
        let f = fixture();
        f.engine
            .create(f.resource, Uuid::new_v4(), r("2024-06-01", "2024-06-05"), Default::default())
            .await
            .unwrap();
        let second = f
            .engine
            .create(f.resource, Uuid::new_v4(), r("2024-06-05", "2024-06-08"), Default::default())
            .await
            .unwrap();
        assert_eq!(second.status, ReservationStatus::Pending);
    }

    #[tokio::test]
    async fn concurrent_overlapping_creates_yield_one_success() {
        let f = fixture();
        let mut handles = Vec::new();
        for i in 0..8u32 {
            let engine = f.engine.clone();
            let resource = f.resource;
            handles.push(tokio::spawn(async move {
                let start = d("2024-06-01") + chrono::Duration::days(i as i64 % 3);
                let end = start + chrono::Duration::days(4);
                engine
                    .create(
                        resource,
                        Uuid::new_v4(),
                        DateRange::new(start, end).unwrap(),
                        Default::default(),
                    )
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(BookingError::RangeUnavailable { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        // All eight ranges pairwise overlap, so exactly one may win.
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn cancel_releases_the_range() {
        let f = fixture();
        let guest = Uuid::new_v4();
        let range = r("2024-06-01", "2024-06-05");

        let reservation = f
            .engine
            .create(f.resource, guest, range, Default::default())
            .await
            .unwrap();
        f.engine
            .transition(reservation.id, guest, TransitionAction::Cancel, None)
            .await
            .unwrap();

        let again = f
            .engine
            .create(f.resource, guest, range, Default::default())
            .await
            .unwrap();
        assert_eq!(again.status, ReservationStatus::Pending);
    }

    #[tokio::test]
    async fn confirm_requires_pending() {
        let f = fixture();
        let guest = Uuid::new_v4();
        let reservation = f
            .engine
            .create(f.resource, guest, r("2024-06-01", "2024-06-05"), Default::default())
            .await
            .unwrap();

        f.engine
            .transition(reservation.id, f.owner, TransitionAction::Reject, None)
            .await
            .unwrap();

        let confirm = f
            .engine
            .transition(reservation.id, f.owner, TransitionAction::Confirm, None)
            .await;
        assert!(matches!(
            confirm,
            Err(BookingError::InvalidTransition {
                from: "rejected",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn capability_policy_is_enforced() {
        let f = fixture();
        let guest = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let reservation = f
            .engine
            .create(f.resource, guest, r("2024-06-01", "2024-06-05"), Default::default())
            .await
            .unwrap();

        // Only the owner may confirm.
        let by_guest = f
            .engine
            .transition(reservation.id, guest, TransitionAction::Confirm, None)
            .await;
        assert!(matches!(by_guest, Err(BookingError::Forbidden)));

        // A third party may not cancel.
        let by_stranger = f
            .engine
            .transition(reservation.id, stranger, TransitionAction::Cancel, None)
            .await;
        assert!(matches!(by_stranger, Err(BookingError::Forbidden)));

        // The requester may cancel their own reservation.
        f.engine
            .transition(reservation.id, guest, TransitionAction::Cancel, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn block_respects_committed_reservations() {
        let f = fixture();
        let guest = Uuid::new_v4();
        let reservation = f
            .engine
            .create(f.resource, guest, r("2024-06-01", "2024-06-05"), Default::default())
            .await
            .unwrap();
        f.engine
            .transition(reservation.id, f.owner, TransitionAction::Confirm, None)
            .await
            .unwrap();

        // Blocking over a confirmed stay fails.
        let over_confirmed = f
            .engine
            .block(f.resource, f.owner, r("2024-06-03", "2024-06-06"), None, None)
            .await;
        assert!(matches!(
            over_confirmed,
            Err(BookingError::RangeUnavailable { .. })
        ));

        // Blocking over a cancelled stay succeeds.
        f.engine
            .transition(reservation.id, guest, TransitionAction::Cancel, None)
            .await
            .unwrap();
        f.engine
            .block(f.resource, f.owner, r("2024-06-03", "2024-06-06"), None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn blocked_range_refuses_reservations() {
        let f = fixture();
        f.engine
            .block(
                f.resource,
                f.owner,
                r("2024-07-01", "2024-07-10"),
                Some("maintenance".to_string()),
                None,
            )
            .await
            .unwrap();

        let attempt = f
            .engine
            .create(f.resource, Uuid::new_v4(), r("2024-07-05", "2024-07-06"), Default::default())
            .await;
        assert!(matches!(attempt, Err(BookingError::RangeUnavailable { .. })));
    }

    #[tokio::test]
    async fn unblock_is_idempotent_and_frees_the_range() {
        let f = fixture();
        let block = f
            .engine
            .block(f.resource, f.owner, r("2024-07-01", "2024-07-10"), None, None)
            .await
            .unwrap();

        f.engine.unblock(block.id, f.owner).await.unwrap();
        // Second removal is a no-op.
        f.engine.unblock(block.id, f.owner).await.unwrap();

        f.engine
            .create(f.resource, Uuid::new_v4(), r("2024-07-05", "2024-07-06"), Default::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn only_the_owner_may_block() {
        let f = fixture();
        let attempt = f
            .engine
            .block(f.resource, Uuid::new_v4(), r("2024-07-01", "2024-07-10"), None, None)
            .await;
        assert!(matches!(attempt, Err(BookingError::Forbidden)));
    }

    #[tokio::test]
    async fn transitions_notify_everyone_but_the_actor() {
        let f = fixture();
        let guest = Uuid::new_v4();
        let reservation = f
            .engine
            .create(f.resource, guest, r("2024-06-01", "2024-06-05"), Default::default())
            .await
            .unwrap();

        // The request notifies the owner only.
        let owner_events = f.store.list_notifications(f.owner, None).await.unwrap();
        assert_eq!(owner_events.len(), 1);
        assert_eq!(owner_events[0].kind, NotificationKind::ReservationRequested);
        assert!(f.store.list_notifications(guest, None).await.unwrap().is_empty());

        // The owner's confirm notifies the guest only.
        f.engine
            .transition(reservation.id, f.owner, TransitionAction::Confirm, None)
            .await
            .unwrap();
        let guest_events = f.store.list_notifications(guest, None).await.unwrap();
        assert_eq!(guest_events.len(), 1);
        assert_eq!(guest_events[0].kind, NotificationKind::ReservationConfirmed);
        assert_eq!(f.store.list_notifications(f.owner, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn idempotency_key_returns_the_original() {
        let f = fixture();
        let guest = Uuid::new_v4();
        let meta = ReservationMeta {
            idempotency_key: Some("retry-1".to_string()),
            ..Default::default()
        };

        let first = f
            .engine
            .create(f.resource, guest, r("2024-06-01", "2024-06-05"), meta.clone())
            .await
            .unwrap();
        let second = f
            .engine
            .create(f.resource, guest, r("2024-06-01", "2024-06-05"), meta)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        // No duplicate request notification either.
        assert_eq!(f.store.list_notifications(f.owner, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn auto_confirm_records_both_events() {
        let f = fixture_with(BookingConfig {
            auto_confirm: true,
            ..Default::default()
        });
        let guest = Uuid::new_v4();

        let reservation = f
            .engine
            .create(f.resource, guest, r("2024-06-01", "2024-06-05"), Default::default())
            .await
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Confirmed);

        let owner_events = f.store.list_notifications(f.owner, None).await.unwrap();
        assert_eq!(owner_events.len(), 1);
        assert_eq!(owner_events[0].kind, NotificationKind::ReservationRequested);

        let guest_events = f.store.list_notifications(guest, None).await.unwrap();
        assert_eq!(guest_events.len(), 1);
        assert_eq!(guest_events[0].kind, NotificationKind::ReservationConfirmed);
    }

    #[tokio::test]
    async fn dispute_keeps_the_range_held() {
        let f = fixture();
        let guest = Uuid::new_v4();
        let reservation = f
            .engine
            .create(f.resource, guest, r("2024-06-01", "2024-06-05"), Default::default())
            .await
            .unwrap();
        f.engine
            .transition(reservation.id, f.owner, TransitionAction::Confirm, None)
            .await
            .unwrap();
        f.engine
            .transition(reservation.id, guest, TransitionAction::Dispute, None)
            .await
            .unwrap();

        let attempt = f
            .engine
            .create(f.resource, Uuid::new_v4(), r("2024-06-02", "2024-06-04"), Default::default())
            .await;
        assert!(matches!(attempt, Err(BookingError::RangeUnavailable { .. })));
    }

    #[tokio::test]
    async fn sweep_completes_past_stays_and_purges_expired_blocks() {
        let f = fixture();
        let guest = Uuid::new_v4();

        let past = f
            .engine
            .create(f.resource, guest, r("2020-01-01", "2020-01-05"), Default::default())
            .await
            .unwrap();
        f.engine
            .transition(past.id, f.owner, TransitionAction::Confirm, None)
            .await
            .unwrap();

        // A pending past reservation is not completed by the sweep.
        f.engine
            .create(f.resource, guest, r("2020-02-01", "2020-02-05"), Default::default())
            .await
            .unwrap();

        f.engine
            .block(
                f.resource,
                f.owner,
                r("2020-03-01", "2020-03-10"),
                None,
                Some(Utc::now() - chrono::Duration::hours(1)),
            )
            .await
            .unwrap();

        let outcome = f.engine.run_sweep(Utc::now()).await.unwrap();
        assert_eq!(outcome.completed, 1);
        assert_eq!(outcome.expired_blocks, 1);

        let completed = f.engine.get_reservation(past.id).await.unwrap();
        assert_eq!(completed.status, ReservationStatus::Completed);
        // The system-driven completion notifies both parties.
        let guest_kinds: Vec<_> = f
            .store
            .list_notifications(guest, None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert!(guest_kinds.contains(&NotificationKind::ReservationCompleted));
    }

    #[tokio::test]
    async fn availability_reports_conflicts() {
        let f = fixture();
        f.engine
            .create(f.resource, Uuid::new_v4(), r("2024-06-01", "2024-06-05"), Default::default())
            .await
            .unwrap();

        let answer = f
            .engine
            .check_availability(f.resource, r("2024-06-04", "2024-06-08"))
            .await
            .unwrap();
        assert!(!answer.free);
        assert_eq!(answer.conflicts, vec![r("2024-06-01", "2024-06-05")]);

        let free = f
            .engine
            .check_availability(f.resource, r("2024-06-05", "2024-06-08"))
            .await
            .unwrap();
        assert!(free.free);
        assert!(free.conflicts.is_empty());
    }

    #[tokio::test]
    async fn list_reservations_covers_all_states() {
        let f = fixture();
        let guest = Uuid::new_v4();
        let kept = f
            .engine
            .create(f.resource, guest, r("2024-06-01", "2024-06-05"), Default::default())
            .await
            .unwrap();
        let dropped = f
            .engine
            .create(f.resource, guest, r("2024-07-01", "2024-07-05"), Default::default())
            .await
            .unwrap();
        f.engine
            .transition(dropped.id, guest, TransitionAction::Cancel, None)
            .await
            .unwrap();

        let listed = f.engine.list_reservations(f.resource).await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|res| res.id).collect();
        assert_eq!(listed.len(), 2);
        assert!(ids.contains(&kept.id));
        assert!(ids.contains(&dropped.id));
        assert!(f
            .engine
            .list_reservations(Uuid::new_v4())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unknown_resource_is_not_found() {
        let f = fixture();
        let attempt = f
            .engine
            .create(Uuid::new_v4(), Uuid::new_v4(), r("2024-06-01", "2024-06-05"), Default::default())
            .await;
        assert!(matches!(attempt, Err(BookingError::NotFound)));
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let f = fixture();
        f.engine
            .create(f.resource, Uuid::new_v4(), r("2024-06-01", "2024-06-05"), Default::default())
            .await
            .unwrap();

        let events = f.store.list_unread(f.owner).await.unwrap();
        assert_eq!(events.len(), 1);
        f.store.mark_read(f.owner, events[0].id).await.unwrap();
        let first_read = f.store.list_notifications(f.owner, None).await.unwrap()[0].read_at;
        assert!(first_read.is_some());

        f.store.mark_read(f.owner, events[0].id).await.unwrap();
        let second_read = f.store.list_notifications(f.owner, None).await.unwrap()[0].read_at;
        assert_eq!(first_read, second_read);
        assert!(f.store.list_unread(f.owner).await.unwrap().is_empty());
    }
}
