//! Application state for Axum handlers
//!
//! Shared services initialized once at startup and passed to all handlers
//! via dependency injection; no pools or clients are built per request.

use std::sync::Arc;

use docstream_config::ApplicationConfig;
use docstream_meta_data::MetaRepository;
use docstream_pipeline::{DeleteService, IngestService};
use docstream_queue::SlidingWindowLimiter;
use docstream_search::SearchService;
use docstream_vector_data::VectorIndex;

/// Application state containing all shared services
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn MetaRepository>,
    pub ingest: IngestService,
    pub delete: DeleteService,
    pub search: Arc<SearchService>,
    pub rate_limiter: Arc<SlidingWindowLimiter>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub config: Arc<ApplicationConfig>,
}
