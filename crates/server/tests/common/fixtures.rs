//! Test fixtures for generating test data.

use bytes::Bytes;
use futures::stream;
use parcel_storage::{ByteStream, StorageError};

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Split data into chunks of specified size.
pub fn split_into_chunks(data: &[u8], chunk_size: usize) -> Vec<Bytes> {
    data.chunks(chunk_size)
        .map(Bytes::copy_from_slice)
        .collect()
}

/// Wrap bytes as a single-item payload stream.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn payload(data: Bytes) -> ByteStream {
    Box::pin(stream::iter(vec![Ok::<_, StorageError>(data)]))
}

/// A payload that yields `prefix` and then fails mid-transfer.
#[allow(dead_code)]
pub fn broken_payload(prefix: Bytes) -> ByteStream {
    Box::pin(stream::iter(vec![
        Ok(prefix),
        Err(StorageError::Io(std::io::Error::other("connection reset"))),
    ]))
}
