//! Asynchronous three-stage ingestion pipeline
//!
//! Extract -> chunk -> embed, with per-tenant fair scheduling, retry with
//! backoff-by-deferred-score, snapshot checkpoints, and dead-lettering.

pub mod context;
pub mod delete;
pub mod error;
pub mod ingest;
pub mod recovery;
pub mod retry;
pub mod runtime;
pub mod stages;

pub use context::PipelineContext;
pub use delete::{DeleteOutcome, DeleteService};
pub use error::{PipelineError, PipelineResult};
pub use ingest::{IngestService, StageReport, StatusReport, UploadRequest};
pub use recovery::recover_stale_jobs;
pub use retry::{FailureOutcome, handle_failure};
pub use runtime::WorkerRuntime;
