//! Object store seam shared by the chunk store and the assembly engine.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// Fallible byte stream used for chunk payloads and artifact reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Flat key/value object storage.
///
/// Keys are relative `/`-separated paths such as `temp/<key>/00000003.part` or
/// `files/<key>`. Writes replace whole objects and are atomic: a reader sees
/// the old object or the complete new one, never a prefix.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Size of an object, `NotFound` if absent.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Whole object in memory. Small objects only.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Begin an incremental write. The object appears under `key` only when
    /// [`StreamingUpload::finish`] returns successfully; abort or drop leaves
    /// any previous object in place.
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Remove an object, `NotFound` if absent.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Keys starting with `prefix`, in lexicographic order.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Short backend identifier reported by the health endpoint.
    fn backend_name(&self) -> &'static str;

    /// Probe that the backend is usable; run at startup and on `/v1/health`.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Size information for a stored object.
#[derive(Clone, Copy, Debug)]
pub struct ObjectMeta {
    pub size: u64,
}

/// An in-progress incremental write started by [`ObjectStore::put_stream`].
#[async_trait]
pub trait StreamingUpload: Send {
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    fn bytes_written(&self) -> u64;

    /// Publish the object and return its size.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Discard everything written so far.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
