use std::collections::HashMap;

use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::BookingError;

/// Owner lookups supplied by the external listing collaborator.
///
/// The engine does not own resource metadata; it only needs to resolve a
/// resource to its owner for capability checks and notification fan-out.
#[async_trait::async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Resolves a resource to its owner, or `None` for an unknown resource.
    async fn owner_of(&self, resource_id: Uuid) -> Result<Option<Uuid>, BookingError>;
}

/// Directory over the `resources` table maintained by the listing service.
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    /// Creates a directory over the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ResourceDirectory for PgDirectory {
    async fn owner_of(&self, resource_id: Uuid) -> Result<Option<Uuid>, BookingError> {
        let row = sqlx::query("SELECT owner_id FROM resources WHERE id = $1")
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("owner_id")))
    }
}

/// Fixed resource-to-owner map for tests and memory-store development mode.
#[derive(Default)]
pub struct StaticDirectory {
    owners: HashMap<Uuid, Uuid>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource with its owner, replacing any prior entry.
    pub fn insert(&mut self, resource_id: Uuid, owner_id: Uuid) {
        self.owners.insert(resource_id, owner_id);
    }
}

#[async_trait::async_trait]
impl ResourceDirectory for StaticDirectory {
    async fn owner_of(&self, resource_id: Uuid) -> Result<Option<Uuid>, BookingError> {
        Ok(self.owners.get(&resource_id).copied())
    }
}
