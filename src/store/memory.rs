//! In-process object store.

use super::{ObjectBody, ObjectStore};
use crate::error::MirrorError;
use crate::types::RemoteObjectMeta;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

#[derive(Default)]
struct Inner {
    objects: Vec<(RemoteObjectMeta, Vec<u8>)>,
    failures: HashMap<String, u32>,
    etags: HashMap<String, String>,
    fetches: HashMap<String, u32>,
}

/// Object store held entirely in memory.
///
/// Listing order is insertion order. Reads can be made to fail a fixed
/// number of times per key, and every `get_object` call is counted.
#[derive(Default)]
pub struct MemoryObjectStore {
    inner: Mutex<Inner>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an object.
    pub fn insert(&self, key: &str, last_modified: SystemTime, data: impl Into<Vec<u8>>) {
        let data = data.into();
        let meta = RemoteObjectMeta {
            key: key.to_string(),
            last_modified,
            size: data.len() as u64,
        };
        let mut inner = self.lock();
        match inner.objects.iter_mut().find(|(m, _)| m.key == key) {
            Some(slot) => *slot = (meta, data),
            None => inner.objects.push((meta, data)),
        }
    }

    /// Makes the next `times` reads of `key` fail. `u32::MAX` fails forever.
    pub fn fail_reads(&self, key: &str, times: u32) {
        self.lock().failures.insert(key.to_string(), times);
    }

    /// ETag reported for `key` on every later read.
    pub fn set_etag(&self, key: &str, etag: &str) {
        self.lock().etags.insert(key.to_string(), etag.to_string());
    }

    /// Number of `get_object` calls seen for `key`.
    pub fn fetch_count(&self, key: &str) -> u32 {
        self.lock().fetches.get(key).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a test thread panicked mid-update.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    fn label(&self) -> &str {
        "memory"
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObjectMeta>, MirrorError> {
        Ok(self.lock().objects.iter().map(|(m, _)| m.clone()).collect())
    }

    async fn get_object(&self, key: &str) -> Result<ObjectBody, MirrorError> {
        let mut inner = self.lock();
        *inner.fetches.entry(key.to_string()).or_insert(0) += 1;

        if let Some(remaining) = inner.failures.get_mut(key) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(MirrorError::Store(format!("injected failure for {}", key)));
            }
        }

        let mut body = inner
            .objects
            .iter()
            .find(|(m, _)| m.key == key)
            .map(|(_, data)| ObjectBody::from_bytes(data.clone()))
            .ok_or_else(|| MirrorError::Store(format!("NoSuchKey: {}", key)))?;
        body.etag = inner.etags.get(key).cloned();
        Ok(body)
    }
}
