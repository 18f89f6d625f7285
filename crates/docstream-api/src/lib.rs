//! docstream HTTP API
//!
//! The thin surface over the ingestion pipeline: authentication, rate
//! limiting, and dispatch into the queue. All heavy lifting happens in the
//! worker pipeline behind it.

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod routes;
pub mod state;

pub mod test_utils;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
