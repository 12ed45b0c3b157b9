//! Directory-backed object store, for mirrors exposed as a mounted path.

use super::{ObjectBody, ObjectStore};
use crate::error::MirrorError;
use crate::types::RemoteObjectMeta;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

const READ_CHUNK_SIZE: usize = 256 * 1024;

/// Treats the regular files of one directory as the objects of a bucket.
///
/// Keys are file names; listing is sorted by key.
pub struct LocalObjectStore {
    root: PathBuf,
    label: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let label = format!("file://{}", root.display());
        Self { root, label }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait::async_trait]
impl ObjectStore for LocalObjectStore {
    fn label(&self) -> &str {
        &self.label
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObjectMeta>, MirrorError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut objects = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let Some(key) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            objects.push(RemoteObjectMeta {
                key,
                last_modified: metadata.modified()?,
                size: metadata.len(),
            });
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn get_object(&self, key: &str) -> Result<ObjectBody, MirrorError> {
        if key.contains('/') || key.contains('\\') || key == ".." {
            return Err(MirrorError::UnsafeKey(key.to_string()));
        }
        let file = tokio::fs::File::open(self.root.join(key))
            .await
            .map_err(|e| MirrorError::Store(format!("cannot open {}: {}", key, e)))?;

        let chunks = stream::unfold(Some(file), |state| async move {
            let mut file = state?;
            let mut buffer = vec![0u8; READ_CHUNK_SIZE];
            match file.read(&mut buffer).await {
                Ok(0) => None,
                Ok(n) => {
                    buffer.truncate(n);
                    Some((Ok(Bytes::from(buffer)), Some(file)))
                }
                Err(e) => Some((Err(MirrorError::IoError(e)), None)),
            }
        });

        Ok(ObjectBody {
            etag: None,
            stream: chunks.boxed(),
        })
    }
}
