//! Vector index layer for docstream
//!
//! Approximate-nearest-neighbor storage of chunk embeddings with a
//! per-point tenant tag. Point ids are chunk ids, so upserts are
//! idempotent and replayed embed jobs converge.

pub mod error;
pub mod mock;
pub mod qdrant;
pub mod traits;

pub use error::{VectorDataError, VectorResult};
pub use mock::MockVectorIndex;
pub use qdrant::QdrantIndex;
pub use traits::{VectorIndex, VectorPayload, VectorPoint, VectorSearchHit};
