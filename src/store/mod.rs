//! Remote object store boundary and its backends.

mod http;
mod local;
mod memory;
mod sigv4;

pub use http::{HttpObjectStore, HttpStoreConfig};
pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;

use crate::error::MirrorError;
use crate::types::RemoteObjectMeta;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};

/// Content of one object, delivered as a stream of chunks.
pub struct ObjectBody {
    /// Entity tag reported by the store, quotes stripped.
    pub etag: Option<String>,
    /// Object bytes in order.
    pub stream: BoxStream<'static, Result<Bytes, MirrorError>>,
}

impl ObjectBody {
    /// Body backed by an in-memory buffer, delivered as one chunk.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            etag: None,
            stream: stream::once(async move { Ok(data) }).boxed(),
        }
    }

    /// Collects the full body into memory.
    pub async fn collect(mut self) -> Result<Vec<u8>, MirrorError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.stream.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    /// Collects at most `limit + 1` bytes and drops the rest of the stream,
    /// so an oversized body shows up as longer than `limit`.
    pub async fn collect_limited(mut self, limit: usize) -> Result<Vec<u8>, MirrorError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.stream.next().await {
            let chunk = chunk?;
            let room = limit + 1 - out.len();
            out.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if out.len() > limit {
                break;
            }
        }
        Ok(out)
    }
}

impl std::fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBody")
            .field("etag", &self.etag)
            .finish_non_exhaustive()
    }
}

/// A bucket of objects that can be listed and read.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable label identifying the store, for logs.
    fn label(&self) -> &str;

    /// Lists every object in the bucket, in store order.
    async fn list_objects(&self) -> Result<Vec<RemoteObjectMeta>, MirrorError>;

    /// Opens one object for streaming.
    async fn get_object(&self, key: &str) -> Result<ObjectBody, MirrorError>;
}
