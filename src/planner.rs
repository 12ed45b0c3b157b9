//! Candidate selection: which listed objects need a local update.

use crate::download::destination_path;
use crate::types::{RemoteObjectMeta, SyncConfig, SyncMode};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// What the local directory holds for one file name, read on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalFileState {
    Absent,
    Present { modified: SystemTime },
}

/// The local mirror directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stats `name` under the root. Only `NotFound` maps to `Absent`; any
    /// other failure is returned.
    pub async fn state(&self, name: &str) -> io::Result<LocalFileState> {
        let path = destination_path(&self.root, name)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        match tokio::fs::metadata(path).await {
            Ok(metadata) => Ok(LocalFileState::Present {
                modified: metadata.modified()?,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(LocalFileState::Absent),
            Err(e) => Err(e),
        }
    }
}

/// Objects selected for retrieval, plus keys that could not be evaluated.
#[derive(Debug, Default)]
pub struct Plan {
    /// Candidates in listing order.
    pub candidates: Vec<RemoteObjectMeta>,
    /// `(key, reason)` for managed keys whose local state could not be read.
    pub errors: Vec<(String, String)>,
}

/// Selects the listed objects that should be fetched under `config.mode`.
///
/// - Archive mode: keys ending in the archive suffix. When `managed_keys` is
///   non-empty the base name (or the full key) must be in it.
/// - Allow-list mode: keys in `managed_keys` whose local copy is absent or
///   older than the remote object.
///
/// The listing is not modified and the result keeps its order.
pub async fn plan(listing: &[RemoteObjectMeta], config: &SyncConfig) -> Plan {
    let local = LocalStore::new(&config.local_directory);
    let mut plan = Plan::default();

    for object in listing {
        match config.mode {
            SyncMode::Archive => {
                if is_managed_archive(&object.key, config) {
                    plan.candidates.push(object.clone());
                }
            }
            SyncMode::AllowList => {
                if !config.managed_keys.contains(&object.key) {
                    continue;
                }
                match local.state(&object.key).await {
                    Ok(LocalFileState::Absent) => plan.candidates.push(object.clone()),
                    Ok(LocalFileState::Present { modified }) if modified < object.last_modified => {
                        plan.candidates.push(object.clone())
                    }
                    Ok(LocalFileState::Present { .. }) => {
                        debug!("{} is up to date", object.key);
                    }
                    Err(e) => plan.errors.push((object.key.clone(), e.to_string())),
                }
            }
        }
    }

    plan
}

fn is_managed_archive(key: &str, config: &SyncConfig) -> bool {
    let Some(base) = config.archive_base(key) else {
        return false;
    };
    config.managed_keys.is_empty()
        || config.managed_keys.contains(base)
        || config.managed_keys.contains(key)
}
