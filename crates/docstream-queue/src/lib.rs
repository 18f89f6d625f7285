//! Queue substrate, scheduler, and rate limiter for docstream
//!
//! The substrate is a family of score-ordered sets keyed by
//! `(tenant_id, stage)`; the scheduler enforces round-robin fairness by
//! choosing which set to pop from; the rate limiter protects the API
//! surface that feeds the pipeline.

pub mod error;
pub mod queue;
pub mod rate_limit;
pub mod rotation;
pub mod scheduler;

pub use error::{QueueError, QueueResult};
pub use queue::{InMemoryJobQueue, JobQueue, PostgresJobQueue, now_score};
pub use rate_limit::{RateDecision, SlidingWindowLimiter};
pub use rotation::{InMemoryRotationStore, PostgresRotationStore, RotationStore};
pub use scheduler::{InFlightGuard, InFlightTracker, Scheduler, TenantCaps};
