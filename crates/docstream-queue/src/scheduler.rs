//! Weighted round-robin scheduler over the queue substrate
//!
//! For a given stage, chooses the next (tenant, job) to serve. Guarantees:
//!
//! 1. Round-robin fairness: the rotation resumes *after* the last served
//!    tenant, so continuously active tenants alternate with slack <= 1.
//! 2. No starvation: a job waits at most one full rotation of the active
//!    set before its tenant is offered a turn.
//! 3. Work conservation: if any tenant has ready work, a polling worker
//!    gets a job.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use docstream_meta_data::Stage;

use crate::error::QueueResult;
use crate::queue::{JobQueue, now_score};
use crate::rotation::RotationStore;

/// Per-process in-flight job counts, used for the optional per-tenant
/// concurrency cap. Counts are held as RAII guards by the workers.
#[derive(Clone, Default)]
pub struct InFlightTracker {
    counts: Arc<DashMap<(Uuid, Stage), usize>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, tenant_id: Uuid, stage: Stage) -> usize {
        self.counts
            .get(&(tenant_id, stage))
            .map_or(0, |entry| *entry)
    }

    /// Record a job as in flight until the returned guard drops
    pub fn begin(&self, tenant_id: Uuid, stage: Stage) -> InFlightGuard {
        *self.counts.entry((tenant_id, stage)).or_insert(0) += 1;
        InFlightGuard {
            tracker: Arc::clone(&self.counts),
            key: (tenant_id, stage),
        }
    }
}

/// Decrements the in-flight count on drop
pub struct InFlightGuard {
    tracker: Arc<DashMap<(Uuid, Stage), usize>>,
    key: (Uuid, Stage),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(mut entry) = self.tracker.get_mut(&self.key) {
            *entry = entry.saturating_sub(1);
        }
    }
}

/// Optional per-tenant in-flight caps, one per stage
///
/// Matches the tracker's per-(tenant, stage) granularity: an embed cap
/// throttles bulk embedding without touching extract or chunk turns.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantCaps {
    pub extract: Option<usize>,
    pub chunk: Option<usize>,
    pub embed: Option<usize>,
}

impl TenantCaps {
    pub const fn for_stage(&self, stage: Stage) -> Option<usize> {
        match stage {
            Stage::Extract => self.extract,
            Stage::Chunk => self.chunk,
            Stage::Embed => self.embed,
        }
    }
}

/// Chooses the next (tenant, job) pair for a stage
pub struct Scheduler {
    queue: Arc<dyn JobQueue>,
    rotation: Arc<dyn RotationStore>,
    in_flight: InFlightTracker,
    per_tenant_caps: TenantCaps,
}

impl Scheduler {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        rotation: Arc<dyn RotationStore>,
        in_flight: InFlightTracker,
        per_tenant_caps: TenantCaps,
    ) -> Self {
        Self {
            queue,
            rotation,
            in_flight,
            per_tenant_caps,
        }
    }

    pub const fn in_flight(&self) -> &InFlightTracker {
        &self.in_flight
    }

    /// Return the next `(tenant_id, job_id)` to process, or None when no
    /// tenant has ready work. Callers poll with backoff between Nones.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue substrate or rotation store fails.
    #[tracing::instrument(skip(self), fields(%stage))]
    pub async fn next_job(&self, stage: Stage) -> QueueResult<Option<(Uuid, Uuid)>> {
        let now = now_score();
        let mut tenants = self.queue.list_active_tenants(stage, now).await?;
        if tenants.is_empty() {
            return Ok(None);
        }
        tenants.sort_unstable();

        // Resume the rotation after the last served tenant, wrapping around.
        let start = match self.rotation.last_served(stage).await? {
            Some(last) => tenants
                .iter()
                .position(|t| *t > last)
                .unwrap_or(0),
            None => 0,
        };

        for offset in 0..tenants.len() {
            let index = (start + offset) % tenants.len();
            let Some(tenant) = tenants.get(index).copied() else {
                continue;
            };

            if let Some(cap) = self.per_tenant_caps.for_stage(stage) {
                if self.in_flight.count(tenant, stage) >= cap {
                    continue;
                }
            }

            // Pops race against other workers; the first success wins the
            // turn. If every pop loses, the caller retries from a fresh
            // snapshot.
            if let Some(job_id) = self.queue.pop_min(tenant, stage, now).await? {
                self.rotation.set_last_served(stage, tenant).await?;
                return Ok(Some((tenant, job_id)));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::queue::InMemoryJobQueue;
    use crate::rotation::InMemoryRotationStore;
    use std::collections::HashMap;

    fn scheduler_with_caps(caps: TenantCaps) -> (Scheduler, Arc<InMemoryJobQueue>) {
        let queue = Arc::new(InMemoryJobQueue::new());
        let scheduler = Scheduler::new(
            Arc::clone(&queue) as Arc<dyn JobQueue>,
            Arc::new(InMemoryRotationStore::new()),
            InFlightTracker::new(),
            caps,
        );
        (scheduler, queue)
    }

    async fn fill(queue: &InMemoryJobQueue, tenant: Uuid, stage: Stage, count: usize) {
        for i in 0..count {
            queue
                .enqueue(tenant, stage, Uuid::new_v4(), i as f64)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn alternates_between_continuously_active_tenants() {
        let (scheduler, queue) = scheduler_with_caps(TenantCaps::default());
        let mut tenants = [Uuid::new_v4(), Uuid::new_v4()];
        tenants.sort_unstable();

        fill(&queue, tenants[0], Stage::Extract, 4).await;
        fill(&queue, tenants[1], Stage::Extract, 4).await;

        let mut served = Vec::new();
        for _ in 0..8 {
            let (tenant, _) = scheduler.next_job(Stage::Extract).await.unwrap().unwrap();
            served.push(tenant);
        }

        // Strict alternation while both tenants stay active
        for pair in served.windows(2) {
            assert_ne!(pair[0], pair[1], "round-robin must alternate: {served:?}");
        }
    }

    #[tokio::test]
    async fn bulk_uploader_cannot_starve_a_newcomer() {
        // Tenant A enqueues 100 documents; tenant B enqueues 1 afterwards.
        // With one worker, B is served no later than the second cycle.
        let (scheduler, queue) = scheduler_with_caps(TenantCaps::default());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        fill(&queue, a, Stage::Extract, 100).await;
        fill(&queue, b, Stage::Extract, 1).await;

        let (first, _) = scheduler.next_job(Stage::Extract).await.unwrap().unwrap();
        let (second, _) = scheduler.next_job(Stage::Extract).await.unwrap().unwrap();
        assert!(
            first == b || second == b,
            "tenant B must be served within one rotation"
        );
    }

    #[tokio::test]
    async fn fairness_slack_is_at_most_one() {
        let (scheduler, queue) = scheduler_with_caps(TenantCaps::default());
        let tenants: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for tenant in &tenants {
            fill(&queue, *tenant, Stage::Embed, 10).await;
        }

        let mut completions: HashMap<Uuid, usize> = HashMap::new();
        for _ in 0..15 {
            let (tenant, _) = scheduler.next_job(Stage::Embed).await.unwrap().unwrap();
            *completions.entry(tenant).or_insert(0) += 1;
        }

        let max = completions.values().copied().max().unwrap();
        let min = completions.values().copied().min().unwrap();
        assert!(max - min <= 1, "round-robin slack exceeded: {completions:?}");
    }

    #[tokio::test]
    async fn work_conserving_when_one_tenant_drains() {
        let (scheduler, queue) = scheduler_with_caps(TenantCaps::default());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        fill(&queue, a, Stage::Chunk, 1).await;
        fill(&queue, b, Stage::Chunk, 3).await;

        let mut total = 0;
        while scheduler.next_job(Stage::Chunk).await.unwrap().is_some() {
            total += 1;
        }
        assert_eq!(total, 4, "all ready jobs must be served");
    }

    #[tokio::test]
    async fn concurrency_cap_skips_saturated_tenant() {
        let (scheduler, queue) = scheduler_with_caps(TenantCaps {
            extract: Some(1),
            ..TenantCaps::default()
        });
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        fill(&queue, a, Stage::Extract, 2).await;
        fill(&queue, b, Stage::Extract, 1).await;

        // Saturate A at its cap
        let _guard = scheduler.in_flight().begin(a, Stage::Extract);

        let (tenant, _) = scheduler.next_job(Stage::Extract).await.unwrap().unwrap();
        assert_eq!(tenant, b, "saturated tenant must be skipped in rotation");
    }

    #[tokio::test]
    async fn caps_apply_per_stage_not_globally() {
        // Only the extract stage is capped; the same tenant's chunk work
        // schedules freely while its extract slot is saturated.
        let (scheduler, queue) = scheduler_with_caps(TenantCaps {
            extract: Some(1),
            ..TenantCaps::default()
        });
        let tenant = Uuid::new_v4();
        fill(&queue, tenant, Stage::Extract, 1).await;
        fill(&queue, tenant, Stage::Chunk, 1).await;

        let _guard = scheduler.in_flight().begin(tenant, Stage::Extract);

        assert!(
            scheduler.next_job(Stage::Extract).await.unwrap().is_none(),
            "capped stage must be skipped"
        );
        assert!(
            scheduler.next_job(Stage::Chunk).await.unwrap().is_some(),
            "uncapped stage must still be served"
        );
    }

    #[tokio::test]
    async fn returns_none_when_no_ready_work() {
        let (scheduler, _queue) = scheduler_with_caps(TenantCaps::default());
        assert!(scheduler.next_job(Stage::Extract).await.unwrap().is_none());
    }
}
