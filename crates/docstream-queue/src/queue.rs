//! Queue substrate: per-(tenant, stage) score-ordered job sets
//!
//! Fairness is enforced by the *scheduler's* choice of which set to pop
//! from, independent of arrival order; priority within a tenant is the
//! score (lower = earlier, ties broken by insertion time). Backoff is
//! encoded as a deferred score: `pop_min` only returns entries whose score
//! is at or below the caller's clock.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use docstream_meta_data::Stage;

use crate::error::{QueueError, QueueResult};

/// Current queue clock in fractional epoch seconds
///
/// Scores share this clock: a plain enqueue uses `now_score()`, a backoff
/// requeue uses `now_score() + 2^retry_count`.
pub fn now_score() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Ordered set family keyed by `(tenant_id, stage)`
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job to its tenant/stage set. Idempotent on `job_id`.
    async fn enqueue(
        &self,
        tenant_id: Uuid,
        stage: Stage,
        job_id: Uuid,
        score: f64,
    ) -> QueueResult<()>;

    /// Atomically remove and return the lowest-scoring ready job
    /// (`score <= now`), or None when the set has none.
    async fn pop_min(&self, tenant_id: Uuid, stage: Stage, now: f64) -> QueueResult<Option<Uuid>>;

    /// Tenants with at least one ready job at the stage
    async fn list_active_tenants(&self, stage: Stage, now: f64) -> QueueResult<Vec<Uuid>>;

    /// Number of entries (ready or deferred) in a tenant/stage set
    async fn len(&self, tenant_id: Uuid, stage: Stage) -> QueueResult<i64>;

    /// Remove specific jobs wherever they are queued; returns count removed.
    /// Used by cascading delete.
    async fn remove_jobs(&self, job_ids: &[Uuid]) -> QueueResult<u64>;
}

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

/// `PostgreSQL` implementation of the queue substrate
///
/// Pop uses a single-row `FOR UPDATE SKIP LOCKED` claim so concurrent
/// workers never double-serve an entry.
#[derive(Clone)]
pub struct PostgresJobQueue {
    pool: PgPool,
}

impl PostgresJobQueue {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(
        &self,
        tenant_id: Uuid,
        stage: Stage,
        job_id: Uuid,
        score: f64,
    ) -> QueueResult<()> {
        sqlx::query(
            r"
            INSERT INTO job_queue (job_id, tenant_id, stage, score)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (job_id) DO NOTHING
            ",
        )
        .bind(job_id)
        .bind(tenant_id)
        .bind(stage.to_string())
        .bind(score)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::query("enqueue", e))?;

        Ok(())
    }

    async fn pop_min(&self, tenant_id: Uuid, stage: Stage, now: f64) -> QueueResult<Option<Uuid>> {
        let row = sqlx::query(
            r"
            DELETE FROM job_queue
            WHERE job_id = (
                SELECT job_id FROM job_queue
                WHERE tenant_id = $1 AND stage = $2 AND score <= $3
                ORDER BY score, enqueued_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING job_id
            ",
        )
        .bind(tenant_id)
        .bind(stage.to_string())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::query("pop_min", e))?;

        Ok(row.map(|r| r.get("job_id")))
    }

    async fn list_active_tenants(&self, stage: Stage, now: f64) -> QueueResult<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT DISTINCT tenant_id FROM job_queue WHERE stage = $1 AND score <= $2",
        )
        .bind(stage.to_string())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::query("list_active_tenants", e))?;

        Ok(rows.iter().map(|r| r.get("tenant_id")).collect())
    }

    async fn len(&self, tenant_id: Uuid, stage: Stage) -> QueueResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM job_queue WHERE tenant_id = $1 AND stage = $2",
        )
        .bind(tenant_id)
        .bind(stage.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| QueueError::query("len", e))?;

        Ok(row.get("count"))
    }

    async fn remove_jobs(&self, job_ids: &[Uuid]) -> QueueResult<u64> {
        if job_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM job_queue WHERE job_id = ANY($1)")
            .bind(job_ids)
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::query("remove_jobs", e))?;

        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Set entry ordered by (score, insertion sequence)
///
/// Scores are non-negative epoch seconds, so the IEEE-754 bit pattern
/// preserves their ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    score_bits: u64,
    seq: u64,
    job_id: Uuid,
}

impl Entry {
    fn score(&self) -> f64 {
        f64::from_bits(self.score_bits)
    }
}

#[derive(Default)]
struct MemState {
    sets: HashMap<(Uuid, Stage), BTreeSet<Entry>>,
    // job_id -> set key + entry, for idempotent enqueue and targeted removal
    index: HashMap<Uuid, (Uuid, Stage, Entry)>,
    seq: u64,
}

/// In-memory implementation for tests and single-process deployments
#[derive(Default)]
pub struct InMemoryJobQueue {
    state: Mutex<MemState>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        tenant_id: Uuid,
        stage: Stage,
        job_id: Uuid,
        score: f64,
    ) -> QueueResult<()> {
        let mut state = self.lock();
        if state.index.contains_key(&job_id) {
            return Ok(());
        }
        state.seq += 1;
        let entry = Entry {
            score_bits: score.to_bits(),
            seq: state.seq,
            job_id,
        };
        state
            .sets
            .entry((tenant_id, stage))
            .or_default()
            .insert(entry);
        state.index.insert(job_id, (tenant_id, stage, entry));
        Ok(())
    }

    async fn pop_min(&self, tenant_id: Uuid, stage: Stage, now: f64) -> QueueResult<Option<Uuid>> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(set) = state.sets.get_mut(&(tenant_id, stage)) else {
            return Ok(None);
        };
        let Some(first) = set.iter().next().copied() else {
            return Ok(None);
        };
        if first.score() > now {
            return Ok(None);
        }
        set.remove(&first);
        state.index.remove(&first.job_id);
        Ok(Some(first.job_id))
    }

    async fn list_active_tenants(&self, stage: Stage, now: f64) -> QueueResult<Vec<Uuid>> {
        let state = self.lock();
        Ok(state
            .sets
            .iter()
            .filter(|((_, s), set)| *s == stage && set.iter().any(|e| e.score() <= now))
            .map(|((tenant, _), _)| *tenant)
            .collect())
    }

    async fn len(&self, tenant_id: Uuid, stage: Stage) -> QueueResult<i64> {
        let state = self.lock();
        Ok(state
            .sets
            .get(&(tenant_id, stage))
            .map_or(0, |set| set.len() as i64))
    }

    async fn remove_jobs(&self, job_ids: &[Uuid]) -> QueueResult<u64> {
        let mut state = self.lock();
        let mut removed = 0_u64;
        for job_id in job_ids {
            if let Some((tenant, stage, entry)) = state.index.remove(job_id) {
                if let Some(set) = state.sets.get_mut(&(tenant, stage)) {
                    set.remove(&entry);
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pop_min_returns_lowest_score_first() {
        let queue = InMemoryJobQueue::new();
        let tenant = Uuid::new_v4();
        let (low, high) = (Uuid::new_v4(), Uuid::new_v4());

        queue.enqueue(tenant, Stage::Extract, high, 200.0).await.unwrap();
        queue.enqueue(tenant, Stage::Extract, low, 100.0).await.unwrap();

        assert_eq!(
            queue.pop_min(tenant, Stage::Extract, 1e12).await.unwrap(),
            Some(low)
        );
        assert_eq!(
            queue.pop_min(tenant, Stage::Extract, 1e12).await.unwrap(),
            Some(high)
        );
        assert_eq!(queue.pop_min(tenant, Stage::Extract, 1e12).await.unwrap(), None);
    }

    #[tokio::test]
    async fn ties_break_by_insertion_order() {
        let queue = InMemoryJobQueue::new();
        let tenant = Uuid::new_v4();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

        queue.enqueue(tenant, Stage::Embed, first, 5.0).await.unwrap();
        queue.enqueue(tenant, Stage::Embed, second, 5.0).await.unwrap();

        assert_eq!(queue.pop_min(tenant, Stage::Embed, 10.0).await.unwrap(), Some(first));
        assert_eq!(queue.pop_min(tenant, Stage::Embed, 10.0).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn deferred_scores_are_invisible_until_due() {
        let queue = InMemoryJobQueue::new();
        let tenant = Uuid::new_v4();
        let job = Uuid::new_v4();

        // Backoff encoding: score in the future
        queue.enqueue(tenant, Stage::Extract, job, 100.0).await.unwrap();

        assert_eq!(queue.pop_min(tenant, Stage::Extract, 99.0).await.unwrap(), None);
        assert!(
            queue
                .list_active_tenants(Stage::Extract, 99.0)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            queue.pop_min(tenant, Stage::Extract, 100.0).await.unwrap(),
            Some(job)
        );
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_on_job_id() {
        let queue = InMemoryJobQueue::new();
        let tenant = Uuid::new_v4();
        let job = Uuid::new_v4();

        queue.enqueue(tenant, Stage::Chunk, job, 1.0).await.unwrap();
        queue.enqueue(tenant, Stage::Chunk, job, 2.0).await.unwrap();

        assert_eq!(queue.len(tenant, Stage::Chunk).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn remove_jobs_clears_queued_entries() {
        let queue = InMemoryJobQueue::new();
        let tenant = Uuid::new_v4();
        let jobs: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for (i, job) in jobs.iter().enumerate() {
            queue
                .enqueue(tenant, Stage::Embed, *job, i as f64)
                .await
                .unwrap();
        }

        let removed = queue.remove_jobs(&jobs[..2]).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(queue.len(tenant, Stage::Embed).await.unwrap(), 2);
        assert_eq!(
            queue.pop_min(tenant, Stage::Embed, 1e12).await.unwrap(),
            Some(jobs[2])
        );
    }
}
