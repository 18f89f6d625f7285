//! Columnar vector snapshot codec
//!
//! Snapshots are written by the embed worker before the vector index is
//! touched, making retries deterministic: a replayed job reads the snapshot
//! instead of re-embedding.
//!
//! Layout (little endian):
//!
//! ```text
//! u32 count | u32 dimension | count * 16B chunk ids | count * dimension * f32
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::error::{BlobError, BlobResult};

/// Serialize `(chunk_id, vector)` pairs into the columnar snapshot format
///
/// # Errors
///
/// Returns [`BlobError::CorruptSnapshot`] if the vectors do not all share
/// one dimension.
pub fn encode_snapshot(entries: &[(Uuid, Vec<f32>)]) -> BlobResult<Bytes> {
    let dimension = entries.first().map_or(0, |(_, v)| v.len());
    if entries.iter().any(|(_, v)| v.len() != dimension) {
        return Err(BlobError::CorruptSnapshot(
            "mixed vector dimensions in one snapshot".to_string(),
        ));
    }

    let count = entries.len();
    let mut buf = BytesMut::with_capacity(8 + count * (16 + dimension * 4));
    buf.put_u32_le(count as u32);
    buf.put_u32_le(dimension as u32);
    for (chunk_id, _) in entries {
        buf.put_slice(chunk_id.as_bytes());
    }
    for (_, vector) in entries {
        for value in vector {
            buf.put_f32_le(*value);
        }
    }
    Ok(buf.freeze())
}

/// Decode a columnar snapshot back into `(chunk_id, vector)` pairs
///
/// # Errors
///
/// Returns [`BlobError::CorruptSnapshot`] if the buffer is truncated or its
/// header is inconsistent with its length.
pub fn decode_snapshot(mut bytes: Bytes) -> BlobResult<Vec<(Uuid, Vec<f32>)>> {
    if bytes.remaining() < 8 {
        return Err(BlobError::CorruptSnapshot("missing header".to_string()));
    }
    let count = bytes.get_u32_le() as usize;
    let dimension = bytes.get_u32_le() as usize;

    let expected = count
        .checked_mul(16 + dimension * 4)
        .ok_or_else(|| BlobError::CorruptSnapshot("header overflow".to_string()))?;
    if bytes.remaining() != expected {
        return Err(BlobError::CorruptSnapshot(format!(
            "expected {expected} payload bytes, found {}",
            bytes.remaining()
        )));
    }

    let mut chunk_ids = Vec::with_capacity(count);
    for _ in 0..count {
        let mut raw = [0_u8; 16];
        bytes.copy_to_slice(&mut raw);
        chunk_ids.push(Uuid::from_bytes(raw));
    }

    let mut entries = Vec::with_capacity(count);
    for chunk_id in chunk_ids {
        let mut vector = Vec::with_capacity(dimension);
        for _ in 0..dimension {
            vector.push(bytes.get_f32_le());
        }
        entries.push((chunk_id, vector));
    }
    Ok(entries)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trip_preserves_ids_and_values() {
        let entries = vec![
            (Uuid::new_v4(), vec![0.25_f32, -1.0, 3.5]),
            (Uuid::new_v4(), vec![1.0_f32, 2.0, 3.0]),
        ];
        let encoded = encode_snapshot(&entries).unwrap();
        let decoded = decode_snapshot(encoded).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn empty_snapshot_is_valid() {
        let encoded = encode_snapshot(&[]).unwrap();
        assert!(decode_snapshot(encoded).unwrap().is_empty());
    }

    #[test]
    fn truncated_snapshot_is_rejected() {
        let entries = vec![(Uuid::new_v4(), vec![1.0_f32; 8])];
        let encoded = encode_snapshot(&entries).unwrap();
        let truncated = encoded.slice(0..encoded.len() - 3);
        assert!(matches!(
            decode_snapshot(truncated),
            Err(BlobError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let entries = vec![
            (Uuid::new_v4(), vec![1.0_f32; 4]),
            (Uuid::new_v4(), vec![1.0_f32; 8]),
        ];
        assert!(encode_snapshot(&entries).is_err());
    }
}
