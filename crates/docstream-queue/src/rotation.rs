//! Round-robin rotation pointer storage
//!
//! `last_served[stage]` lives in the queue substrate rather than any single
//! worker process, so horizontally scaled workers share one rotation
//! pointer. A single-process deployment may hold it in memory.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use docstream_meta_data::Stage;

use crate::error::{QueueError, QueueResult};

/// Storage for the per-stage last-served tenant pointer
#[async_trait]
pub trait RotationStore: Send + Sync {
    async fn last_served(&self, stage: Stage) -> QueueResult<Option<Uuid>>;

    async fn set_last_served(&self, stage: Stage, tenant_id: Uuid) -> QueueResult<()>;
}

/// `PostgreSQL` rotation store shared by all worker processes
#[derive(Clone)]
pub struct PostgresRotationStore {
    pool: PgPool,
}

impl PostgresRotationStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RotationStore for PostgresRotationStore {
    async fn last_served(&self, stage: Stage) -> QueueResult<Option<Uuid>> {
        let row = sqlx::query("SELECT last_served FROM scheduler_rotation WHERE stage = $1")
            .bind(stage.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QueueError::query("last_served", e))?;

        Ok(row.map(|r| r.get("last_served")))
    }

    async fn set_last_served(&self, stage: Stage, tenant_id: Uuid) -> QueueResult<()> {
        sqlx::query(
            r"
            INSERT INTO scheduler_rotation (stage, last_served)
            VALUES ($1, $2)
            ON CONFLICT (stage) DO UPDATE SET last_served = EXCLUDED.last_served
            ",
        )
        .bind(stage.to_string())
        .bind(tenant_id)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::query("set_last_served", e))?;

        Ok(())
    }
}

/// In-memory rotation store for tests and single-process deployments
#[derive(Default)]
pub struct InMemoryRotationStore {
    pointers: Mutex<HashMap<Stage, Uuid>>,
}

impl InMemoryRotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Stage, Uuid>> {
        self.pointers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RotationStore for InMemoryRotationStore {
    async fn last_served(&self, stage: Stage) -> QueueResult<Option<Uuid>> {
        Ok(self.lock().get(&stage).copied())
    }

    async fn set_last_served(&self, stage: Stage, tenant_id: Uuid) -> QueueResult<()> {
        self.lock().insert(stage, tenant_id);
        Ok(())
    }
}
