//! Deterministic chunk id generation
//!
//! Chunk ids are UUID v5 digests of `(document_id, chunk_index)`, so a
//! retried chunk job regenerates the same ids and inserts converge instead
//! of duplicating rows. The same ids key the vector index, which makes
//! point upserts idempotent as well.

use uuid::Uuid;

/// Derive the chunk id for a position within a document
pub fn deterministic_chunk_id(document_id: &Uuid, chunk_index: i32) -> Uuid {
    Uuid::new_v5(document_id, &chunk_index.to_le_bytes())
}
