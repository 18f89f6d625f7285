//! Crash recovery for stranded jobs
//!
//! A worker that is killed mid-job leaves its claim in `processing` with no
//! one to finish it. The sweep moves every processing job whose lease has
//! gone quiet back to `pending` and re-enqueues it, so the normal
//! scheduling path picks it up again. Runs once at startup and
//! periodically from the worker runtime; the staleness threshold keeps it
//! from stealing jobs other replicas are still working on.

use chrono::Utc;
use tracing::info;

use docstream_queue::now_score;

use crate::context::PipelineContext;
use crate::error::PipelineResult;

/// Reset processing jobs untouched for at least `stale_after_secs` back to
/// pending and re-enqueue them. Returns the number recovered.
///
/// # Errors
///
/// Returns an error if the metadata store or queue substrate fails; the
/// sweep is idempotent and safe to retry.
pub async fn recover_stale_jobs(
    ctx: &PipelineContext,
    stale_after_secs: u64,
) -> PipelineResult<usize> {
    let cutoff = Utc::now() - chrono::Duration::seconds(stale_after_secs.min(i64::MAX as u64) as i64);

    let reset = ctx.repository.reset_stale_processing_jobs(cutoff).await?;
    for job in &reset {
        // Enqueue is idempotent on job id, so a sweep racing another
        // replica's sweep cannot double-queue.
        ctx.queue
            .enqueue(job.tenant_id, job.stage, job.job_id, now_score())
            .await?;
    }

    if !reset.is_empty() {
        info!(
            recovered = reset.len(),
            stale_after_secs, "returned stranded processing jobs to pending"
        );
    }
    Ok(reset.len())
}
