//! Embedding generation for docstream
//!
//! The embedding model is an external capability: the [`Embedder`] trait
//! abstracts it, [`HttpEmbedder`] talks to an OpenAI-compatible endpoint,
//! and [`DefaultEmbeddingService`] adds batching and statistics.

pub mod error;
pub mod http;
pub mod mock;
pub mod service;
pub mod traits;

pub use error::{EmbeddingError, EmbeddingResult};
pub use http::HttpEmbedder;
pub use mock::MockEmbedder;
pub use service::DefaultEmbeddingService;
pub use traits::{Embedder, EmbeddingService, EmbeddingStats};
