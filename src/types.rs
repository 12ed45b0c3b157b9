//! Data structures shared by the planner, fetcher and orchestrator.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// One entry of a bucket listing.
///
/// Snapshot of a single `list_objects` call; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObjectMeta {
    /// Object key inside the bucket (e.g. `"daily.cld.gz"`).
    pub key: String,
    /// Last-modified timestamp reported by the store.
    pub last_modified: SystemTime,
    /// Object size in bytes.
    pub size: u64,
}

/// Candidate selection and retrieval strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Compressed objects with a companion checksum object, fetched with
    /// bounded retries and streaming digest verification.
    #[default]
    Archive,
    /// Exact key matches that are newer than the local copy, fetched once
    /// without checksum verification.
    AllowList,
}

/// Bounds for the archive-mode attempt loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per object, including the first one.
    pub max_attempts: u32,
    /// Upper bound of the jitter grows by this much per attempt.
    pub jitter_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            jitter_step: Duration::from_secs(10),
        }
    }
}

/// Runtime configuration for one synchronization run.
///
/// Built once at start-up (see [`crate::config`]) and handed to the planner
/// and fetcher by reference.
///
/// # Example
///
/// ```
/// use sigmirror::{SyncConfig, SyncMode};
///
/// let config = SyncConfig {
///     mirror_bucket: "signatures".to_string(),
///     mode: SyncMode::AllowList,
///     ..SyncConfig::default()
/// }
/// .with_managed_keys(["main.cvd", "daily.cvd"]);
///
/// assert!(config.managed_keys.contains("main.cvd"));
/// ```
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Bucket (mirror source) identifier.
    pub mirror_bucket: String,
    /// Keys this mirror is authoritative for. Membership tests only.
    pub managed_keys: HashSet<String>,
    /// Directory verified files are written to.
    pub local_directory: PathBuf,
    /// Selection strategy.
    pub mode: SyncMode,
    /// Archive-mode retry bounds.
    pub retry: RetryPolicy,
    /// Exclusive upper bound of the single allow-list jitter delay.
    pub allow_list_jitter: Duration,
    /// Suffix that marks a compressed archive object.
    pub archive_suffix: String,
    /// Appended to an archive's base name to form its checksum object key.
    pub checksum_suffix: String,
    /// Maximum number of objects transferred at once (1 = sequential).
    pub max_concurrent_fetches: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mirror_bucket: String::new(),
            managed_keys: HashSet::new(),
            local_directory: PathBuf::from(crate::config::DEFAULT_LOCAL_DIRECTORY),
            mode: SyncMode::default(),
            retry: RetryPolicy::default(),
            allow_list_jitter: Duration::from_secs(5),
            archive_suffix: ".gz".to_string(),
            checksum_suffix: "_checksum.txt".to_string(),
            max_concurrent_fetches: 1,
        }
    }
}

impl SyncConfig {
    /// Replaces the managed key set.
    pub fn with_managed_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.managed_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Key of the companion checksum object for an archive key, if the key
    /// carries the archive suffix.
    pub fn checksum_key(&self, key: &str) -> Option<String> {
        self.archive_base(key)
            .map(|base| format!("{}{}", base, self.checksum_suffix))
    }

    /// Archive key with the archive suffix stripped.
    pub fn archive_base<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_suffix(self.archive_suffix.as_str())
            .filter(|base| !base.is_empty())
    }

    /// Local file name for a remote key under the current mode.
    pub fn local_name<'a>(&self, key: &'a str) -> &'a str {
        match self.mode {
            SyncMode::Archive => self.archive_base(key).unwrap_or(key),
            SyncMode::AllowList => key,
        }
    }
}

/// One scheduled attempt of an object's retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchAttempt {
    /// Zero-based attempt number.
    pub attempt_index: u32,
    /// Delay slept before this attempt.
    pub delay: Duration,
}

/// Final disposition of one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// Written after the computed digest matched the checksum record.
    Verified(String),
    /// Written without a checksum record to compare against.
    Unverified,
    /// Not written; the stale local copy (if any) is kept.
    Failed(String),
}

impl FetchResult {
    /// Whether the object was written to the local directory.
    pub fn is_written(&self) -> bool {
        !matches!(self, FetchResult::Failed(_))
    }
}

/// Outcome of processing one candidate.
#[derive(Debug, Clone)]
pub struct FetchReport {
    /// Remote key.
    pub key: String,
    /// Destination path in the local directory.
    pub local_path: PathBuf,
    /// Number of attempts made.
    pub attempts: u32,
    /// Final disposition.
    pub result: FetchResult,
}

/// Summary of a synchronization run.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Objects in the bucket listing.
    pub listed: usize,
    /// Objects selected by the planner.
    pub candidates: usize,
    /// One report per candidate, in listing order.
    pub reports: Vec<FetchReport>,
    /// Keys the planner could not evaluate, with the reason.
    pub plan_errors: Vec<(String, String)>,
}

impl SyncReport {
    /// Objects written after their checksum matched.
    pub fn verified(&self) -> usize {
        self.count(|r| matches!(r, FetchResult::Verified(_)))
    }

    /// Objects written without a checksum to compare against.
    pub fn unverified(&self) -> usize {
        self.count(|r| matches!(r, FetchResult::Unverified))
    }

    /// Objects left unfetched; any previous local copy is untouched.
    pub fn failed(&self) -> usize {
        self.count(|r| matches!(r, FetchResult::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&FetchResult) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.result)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_key_strips_archive_suffix() {
        let config = SyncConfig::default();
        assert_eq!(
            config.checksum_key("daily.cld.gz").as_deref(),
            Some("daily.cld_checksum.txt")
        );
        assert_eq!(config.checksum_key("daily.cld"), None);
        assert_eq!(config.checksum_key(".gz"), None);
    }

    #[test]
    fn test_local_name_depends_on_mode() {
        let mut config = SyncConfig::default();
        assert_eq!(config.local_name("db.cld.gz"), "db.cld");

        config.mode = SyncMode::AllowList;
        assert_eq!(config.local_name("db.cld.gz"), "db.cld.gz");
    }

    #[test]
    fn test_report_counts() {
        let report = SyncReport {
            reports: vec![
                FetchReport {
                    key: "a".into(),
                    local_path: "a".into(),
                    attempts: 1,
                    result: FetchResult::Verified("00".into()),
                },
                FetchReport {
                    key: "b".into(),
                    local_path: "b".into(),
                    attempts: 5,
                    result: FetchResult::Failed("mismatch".into()),
                },
            ],
            ..SyncReport::default()
        };
        assert_eq!(report.verified(), 1);
        assert_eq!(report.unverified(), 0);
        assert_eq!(report.failed(), 1);
    }
}
