//! Retry and dead-letter handling
//!
//! Backoff is encoded as a deferred queue score rather than an in-process
//! timer: a failed job is re-enqueued with `score = now + 2^retry_count`
//! seconds, and the scheduler only pops entries whose score has come due.

use docstream_common::Retryable;
use docstream_meta_data::Job;
use docstream_queue::now_score;
use tracing::{error, warn};

use crate::context::PipelineContext;
use crate::error::{PipelineError, PipelineResult};

/// What became of a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Requeued with a backoff-deferred score
    Retried { retry_count: i32, delay_secs: u64 },
    /// Retries exhausted or error was permanent; job is dead and the
    /// document failed
    Dead,
}

/// Apply the failure policy to a job that errored while processing
///
/// # Errors
///
/// Returns an error only when the bookkeeping itself fails (metadata or
/// queue unavailable); the caller logs and moves on, and the job is
/// recovered by the next scheduling pass.
pub async fn handle_failure(
    ctx: &PipelineContext,
    job: &Job,
    failure: &PipelineError,
) -> PipelineResult<FailureOutcome> {
    let message = failure.to_string();

    if failure.is_transient() && job.retry_count < job.max_retries {
        let retry_count = ctx
            .repository
            .release_job_for_retry(&job.job_id, &message)
            .await?;

        let delay_secs = 2_u64.saturating_pow(retry_count.max(0) as u32);
        ctx.queue
            .enqueue(
                job.tenant_id,
                job.stage,
                job.job_id,
                now_score() + delay_secs as f64,
            )
            .await?;

        warn!(
            correlation_id = %job.payload.correlation_id(),
            job_id = %job.job_id,
            stage = %job.stage,
            retry_count,
            delay_secs,
            "job failed transiently, requeued with backoff: {message}"
        );
        Ok(FailureOutcome::Retried {
            retry_count,
            delay_secs,
        })
    } else {
        ctx.repository.mark_job_dead(&job.job_id, &message).await?;
        ctx.repository
            .mark_document_failed(&job.tenant_id, &job.document_id, &message)
            .await?;

        error!(
            correlation_id = %job.payload.correlation_id(),
            job_id = %job.job_id,
            stage = %job.stage,
            retry_count = job.retry_count,
            "job dead-lettered: {message}"
        );
        Ok(FailureOutcome::Dead)
    }
}
