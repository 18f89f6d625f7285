//! docstream metadata layer for `PostgreSQL` state management
//!
//! Source of truth for tenants, documents, chunks, and jobs, including
//! progress and retry counts. Status transitions are conditional updates so
//! concurrent workers and replays converge instead of clobbering state.

pub mod chunk_id;
pub mod error;
pub mod migrations;
pub mod mock;
pub mod models;
pub mod pool_manager;
pub mod repository;
pub mod traits;

pub use chunk_id::deterministic_chunk_id;
pub use error::{
    DatabaseError, DatabaseErrorExt, DatabaseOperation, DatabaseResult,
};
pub use migrations::run_migrations;
pub use mock::MockMetaRepository;
pub use models::{
    Chunk, Document, DocumentStatus, Job, JobPayload, JobStatus, NewDocument, NewJob, ServiceStats,
    Stage, Tenant, TenantMetrics,
};
pub use pool_manager::{PoolConfig, PoolManager};
pub use repository::PgMetaRepository;
pub use traits::MetaRepository;
