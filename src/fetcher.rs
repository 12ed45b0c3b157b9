//! Per-object retrieval: the archive-mode retry loop and the single-shot
//! allow-list download.

use crate::download::{
    create_destination, destination_path, part_path, stream_decompressed, stream_raw,
};
use crate::error::MirrorError;
use crate::jitter;
use crate::store::ObjectStore;
use crate::types::{FetchReport, FetchResult, RemoteObjectMeta, SyncConfig, SyncMode};
use crate::verify::{verify, ChecksumRecord, VerificationOutcome, MAX_CHECKSUM_RECORD_LEN};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, error, info, warn};

type AttemptResult = Result<FetchResult, RetryError<MirrorError>>;

/// Fetches candidates from a store into the local directory.
///
/// Holds no per-object state, so one fetcher can serve many concurrent
/// candidates; each call runs its own attempt counter.
#[derive(Clone)]
pub struct RetryingFetcher {
    store: Arc<dyn ObjectStore>,
    config: Arc<SyncConfig>,
}

impl RetryingFetcher {
    pub fn new(store: Arc<dyn ObjectStore>, config: Arc<SyncConfig>) -> Self {
        Self { store, config }
    }

    /// Fetches one candidate according to the configured mode.
    ///
    /// Never returns an error: every failure ends up as
    /// [`FetchResult::Failed`] in the report.
    pub async fn fetch(&self, candidate: &RemoteObjectMeta) -> FetchReport {
        match self.config.mode {
            SyncMode::Archive => self.fetch_archive(candidate).await,
            SyncMode::AllowList => self.fetch_allow_listed(candidate).await,
        }
    }

    async fn fetch_archive(&self, candidate: &RemoteObjectMeta) -> FetchReport {
        let key = candidate.key.as_str();
        let local_name = self.config.local_name(key);
        let destination = match destination_path(&self.config.local_directory, local_name) {
            Ok(path) => path,
            Err(e) => return failed(candidate, PathBuf::from(local_name), 0, e),
        };
        let checksum_key = self.config.checksum_key(key);
        let max_attempts = self.config.retry.max_attempts.max(1);

        let schedule = jitter::retry_schedule(&self.config.retry).map(|attempt| {
            debug!(
                "Waiting {:?} before attempt {}/{} for {}",
                attempt.delay,
                attempt.attempt_index + 1,
                max_attempts,
                key
            );
            attempt.delay
        });

        let mut attempts = 0u32;
        let result = Retry::spawn(schedule, || {
            attempts += 1;
            let attempt_number = attempts;
            let checksum_key = checksum_key.as_deref();
            let destination = destination.as_path();
            async move {
                debug!("Attempt {}/{} for {}", attempt_number, max_attempts, key);
                self.attempt_archive(key, checksum_key, destination).await
            }
        })
        .await;

        match result {
            Ok(outcome) => {
                info!(
                    "✅ Downloaded {} ({} bytes, last modified {}) after {} attempt(s)",
                    key,
                    candidate.size,
                    humantime::format_rfc3339_seconds(candidate.last_modified),
                    attempts
                );
                FetchReport {
                    key: key.to_string(),
                    local_path: destination,
                    attempts,
                    result: outcome,
                }
            }
            Err(e) => failed(candidate, destination, attempts, e),
        }
    }

    /// One archive attempt: checksum (best effort), stream-decode into the
    /// part file, compare, then rename into place.
    async fn attempt_archive(
        &self,
        key: &str,
        checksum_key: Option<&str>,
        destination: &Path,
    ) -> AttemptResult {
        let record = match checksum_key {
            Some(checksum_key) => self.fetch_checksum(checksum_key).await,
            None => None,
        };

        let body = match self.store.get_object(key).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Skipping attempt due to an issue downloading {}: {}", key, e);
                return RetryError::to_transient(e);
            }
        };

        let part = part_path(destination);
        let file = match create_destination(&part).await {
            Ok(file) => file,
            Err(e) => return RetryError::to_permanent(e),
        };

        let digest = match stream_decompressed(key, body, file).await {
            Ok(digest) => digest,
            Err(e) => {
                warn!("Failed to download {} due to error: {}", key, e);
                discard(&part).await;
                return RetryError::to_transient(e);
            }
        };

        let outcome = match verify(record.as_ref(), &digest) {
            VerificationOutcome::Match => {
                info!("🔍 SHA-256 verified for {}", key);
                FetchResult::Verified(digest)
            }
            VerificationOutcome::Skipped => {
                warn!("⚠️  No checksum available for {}; verification skipped", key);
                FetchResult::Unverified
            }
            VerificationOutcome::Mismatch => {
                let expected = record.map(|r| r.to_string()).unwrap_or_default();
                warn!(
                    "❌ Checksum mismatch for {}: expected {}, got {}. Possibly corrupted database file, trying again.",
                    key, expected, digest
                );
                discard(&part).await;
                return RetryError::to_transient(MirrorError::ChecksumMismatch {
                    key: key.to_string(),
                    expected,
                    computed: digest,
                });
            }
        };

        if let Err(e) = tokio::fs::rename(&part, destination).await {
            discard(&part).await;
            return RetryError::to_permanent(e.into());
        }
        Ok(outcome)
    }

    async fn fetch_checksum(&self, checksum_key: &str) -> Option<ChecksumRecord> {
        let body = match self.store.get_object(checksum_key).await {
            Ok(body) => body.collect_limited(MAX_CHECKSUM_RECORD_LEN).await,
            Err(e) => Err(e),
        };
        match body {
            Ok(bytes) => {
                let record = ChecksumRecord::parse(&bytes);
                if record.is_none() {
                    warn!("Checksum file {} is unreadable; proceeding without it", checksum_key);
                }
                record
            }
            Err(e) => {
                warn!(
                    "Hit an issue downloading checksum file {}: {}. Proceeding without checksum file.",
                    checksum_key, e
                );
                None
            }
        }
    }

    /// Allow-list mode: one jittered delay, one attempt, written to the
    /// destination path.
    async fn fetch_allow_listed(&self, candidate: &RemoteObjectMeta) -> FetchReport {
        let key = candidate.key.as_str();
        let destination = match destination_path(&self.config.local_directory, key) {
            Ok(path) => path,
            Err(e) => return failed(candidate, PathBuf::from(key), 0, e),
        };

        let delay = jitter::allow_list_delay(self.config.allow_list_jitter);
        debug!("Waiting {:?} before downloading {}", delay, key);
        tokio::time::sleep(delay).await;

        match self.download_direct(key, &destination).await {
            Ok(bytes) => {
                info!(
                    "✅ Downloaded {} ({} bytes, last modified {})",
                    key,
                    bytes,
                    humantime::format_rfc3339_seconds(candidate.last_modified)
                );
                FetchReport {
                    key: key.to_string(),
                    local_path: destination,
                    attempts: 1,
                    result: FetchResult::Unverified,
                }
            }
            Err(e) => failed(candidate, destination, 1, e),
        }
    }

    /// Streams straight into `destination` when nothing is there yet. An
    /// existing copy is replaced by rename only after a complete transfer,
    /// so a failure never costs the file that was already present.
    async fn download_direct(&self, key: &str, destination: &Path) -> Result<u64, MirrorError> {
        let body = self.store.get_object(key).await?;
        let has_copy = tokio::fs::try_exists(destination).await.unwrap_or(true);
        let target = if has_copy {
            part_path(destination)
        } else {
            destination.to_path_buf()
        };

        let file = create_destination(&target).await?;
        let written = match stream_raw(key, body, file).await {
            Ok(bytes) => bytes,
            Err(e) => {
                discard(&target).await;
                return Err(e);
            }
        };

        if has_copy {
            if let Err(e) = tokio::fs::rename(&target, destination).await {
                discard(&target).await;
                return Err(e.into());
            }
        }
        Ok(written)
    }
}

/// Removes a partial file, ignoring a file that is already gone.
async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove partial file {}: {}", path.display(), e);
        }
    }
}

fn failed(
    candidate: &RemoteObjectMeta,
    local_path: PathBuf,
    attempts: u32,
    e: MirrorError,
) -> FetchReport {
    error!(
        "Giving up on {} after {} attempt(s): {}",
        candidate.key, attempts, e
    );
    FetchReport {
        key: candidate.key.clone(),
        local_path,
        attempts,
        result: FetchResult::Failed(e.to_string()),
    }
}
