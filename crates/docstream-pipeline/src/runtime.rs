//! Background worker runtime
//!
//! Runs three pools of workers (extract, chunk, embed) over the shared
//! scheduler. Each worker is an independent tokio task: poll the scheduler,
//! claim the job through the lease fence, run the stage under its
//! wall-clock budget, and hand failures to the retry policy.
//!
//! Designed with zero web framework dependencies so it can run inside the
//! API binary or be extracted into a standalone worker daemon.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info};

use docstream_config::PipelineConfig;
use docstream_meta_data::Stage;
use docstream_queue::Scheduler;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::recovery::recover_stale_jobs;
use crate::retry::handle_failure;
use crate::stages::run_stage;

/// How often the reclaimer sweeps for stranded processing jobs
const RECLAIM_INTERVAL: Duration = Duration::from_secs(60);

/// How often the reclaimer rechecks the shutdown flag between sweeps
const RECLAIM_POLL: Duration = Duration::from_millis(250);

/// Background worker runtime for the three stage pools
pub struct WorkerRuntime {
    ctx: PipelineContext,
    scheduler: Arc<Scheduler>,
    config: PipelineConfig,
    shutdown_signal: Arc<AtomicBool>,
}

impl WorkerRuntime {
    pub fn new(ctx: PipelineContext, scheduler: Arc<Scheduler>, config: PipelineConfig) -> Self {
        Self {
            ctx,
            scheduler,
            config,
            shutdown_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for signaling graceful shutdown
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_signal)
    }

    const fn pool_size(&self, stage: Stage) -> usize {
        match stage {
            Stage::Extract => self.config.extract_workers,
            Stage::Chunk => self.config.chunk_workers,
            Stage::Embed => self.config.embed_workers,
        }
    }

    const fn stage_budget(&self, stage: Stage) -> Duration {
        let secs = match stage {
            Stage::Extract => self.config.extract_budget_secs,
            Stage::Chunk => self.config.chunk_budget_secs,
            Stage::Embed => self.config.embed_budget_secs,
        };
        Duration::from_secs(secs)
    }

    /// Run all worker pools until shutdown is signaled, then drain
    ///
    /// In-flight jobs finish their current attempt; nothing new is claimed
    /// once the signal is set.
    pub async fn run(&self) {
        info!(
            extract = self.config.extract_workers,
            chunk = self.config.chunk_workers,
            embed = self.config.embed_workers,
            "pipeline workers starting"
        );

        let mut join_set = JoinSet::new();

        // Reclaimer: the processing -> pending leg of the job state
        // machine for workers that died holding a lease (crashed process,
        // drain deadline, kill -9). Jobs it resets re-enter the queue and
        // are claimed again through the normal fence.
        {
            let ctx = self.ctx.clone();
            let shutdown = Arc::clone(&self.shutdown_signal);
            let stale_after = self.config.stale_job_after_secs;
            join_set.spawn(async move {
                let mut since_sweep = Duration::ZERO;
                loop {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    sleep(RECLAIM_POLL).await;
                    since_sweep += RECLAIM_POLL;
                    if since_sweep < RECLAIM_INTERVAL {
                        continue;
                    }
                    since_sweep = Duration::ZERO;
                    if let Err(e) = recover_stale_jobs(&ctx, stale_after).await {
                        error!("stale job sweep failed: {e}");
                    }
                }
            });
        }

        for stage in Stage::ALL {
            for worker_id in 0..self.pool_size(stage) {
                let ctx = self.ctx.clone();
                let scheduler = Arc::clone(&self.scheduler);
                let shutdown = Arc::clone(&self.shutdown_signal);
                let budget = self.stage_budget(stage);
                let idle_poll = Duration::from_millis(self.config.idle_poll_ms);
                let idle_cap = Duration::from_millis(self.config.idle_poll_cap_ms);

                join_set.spawn(async move {
                    stage_worker(
                        worker_id, stage, ctx, scheduler, shutdown, budget, idle_poll, idle_cap,
                    )
                    .await;
                });
            }
        }

        while let Some(result) = join_set.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "worker task panicked");
            }
        }

        info!("pipeline workers stopped");
    }
}

/// One worker: poll, claim, process, repeat
#[allow(clippy::too_many_arguments)]
async fn stage_worker(
    worker_id: usize,
    stage: Stage,
    ctx: PipelineContext,
    scheduler: Arc<Scheduler>,
    shutdown: Arc<AtomicBool>,
    budget: Duration,
    idle_poll: Duration,
    idle_cap: Duration,
) {
    debug!("{stage} worker {worker_id} starting");

    let mut idle_backoff = idle_poll;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match scheduler.next_job(stage).await {
            Ok(Some((tenant_id, job_id))) => {
                idle_backoff = idle_poll;

                // Lease fence: losing the conditional update means another
                // worker already served this job.
                let claimed = match ctx.repository.claim_job(&job_id).await {
                    Ok(Some(job)) => job,
                    Ok(None) => {
                        debug!("{stage} worker {worker_id}: job {job_id} already claimed");
                        continue;
                    }
                    Err(e) => {
                        error!("{stage} worker {worker_id}: claim failed: {e}");
                        sleep(idle_poll).await;
                        continue;
                    }
                };

                let _guard = scheduler.in_flight().begin(tenant_id, stage);

                let outcome = match tokio::time::timeout(budget, run_stage(&ctx, &claimed)).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(PipelineError::BudgetExceeded {
                        budget_secs: budget.as_secs(),
                    }),
                };

                if let Err(failure) = outcome {
                    if let Err(e) = handle_failure(&ctx, &claimed, &failure).await {
                        // Bookkeeping failed; the job stays processing and
                        // an operator or reconciler picks it up.
                        error!(
                            "{stage} worker {worker_id}: failure handling for job {job_id} \
                             also failed: {e}"
                        );
                    }
                }
            }
            Ok(None) => {
                // No ready work anywhere: exponential idle backoff up to
                // the cap, reset on the next served job.
                sleep(idle_backoff).await;
                idle_backoff = (idle_backoff * 2).min(idle_cap);
            }
            Err(e) => {
                error!("{stage} worker {worker_id}: scheduler error: {e}");
                sleep(idle_cap).await;
            }
        }
    }

    debug!("{stage} worker {worker_id} shutting down");
}
