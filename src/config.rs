//! Secrets file and environment loading.

use crate::error::MirrorError;
use crate::types::{SyncConfig, SyncMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the secrets file.
pub const SECRETS_FILE_ENV: &str = "CLAM_SECRETS_FILE";
/// Environment variable overriding the local mirror directory.
pub const LOCAL_DIRECTORY_ENV: &str = "CLAM_DB_DIRECTORY";
/// Secrets file used when [`SECRETS_FILE_ENV`] is unset.
pub const DEFAULT_SECRETS_FILE: &str = "/secrets/clam_update_config.json";
/// Local directory used when neither the file nor the environment set one.
pub const DEFAULT_LOCAL_DIRECTORY: &str = "/var/lib/clamav/";

/// Contents of the JSON secrets file.
///
/// Every field is optional in the file; a missing file yields the default
/// (empty) value and downstream session setup will fail instead.
#[derive(Deserialize, Default, Clone)]
#[serde(default)]
pub struct AppSecrets {
    #[serde(alias = "clam_mirror_bucket")]
    pub mirror_bucket: String,
    #[serde(alias = "clam_config_files")]
    pub managed_files: Vec<String>,
    #[serde(alias = "clam_config_dir")]
    pub local_directory: Option<String>,
    #[serde(alias = "clam_bucket_key_id")]
    pub key_id: String,
    #[serde(alias = "clam_bucket_key")]
    pub secret_key: String,
    #[serde(alias = "clam_bucket_region")]
    pub region: String,
    /// S3-compatible endpoint; AWS is assumed when unset.
    pub endpoint: Option<String>,
    pub mode: Option<SyncMode>,
    pub max_concurrent_fetches: Option<usize>,
}

impl std::fmt::Debug for AppSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSecrets")
            .field("mirror_bucket", &self.mirror_bucket)
            .field("managed_files", &self.managed_files)
            .field("local_directory", &self.local_directory)
            .field("key_id", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl AppSecrets {
    /// Reads and parses a secrets file.
    pub fn from_file(path: &Path) -> Result<Self, MirrorError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Loads the secrets file, logging and falling back to defaults on any
    /// read or parse failure.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::from_file(path) {
            Ok(secrets) => {
                info!("Loaded configuration from {}", path.display());
                secrets
            }
            Err(e) => {
                warn!("Error loading secrets json from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Secrets file path from the environment, or the fixed default.
pub fn secrets_path_from_env() -> PathBuf {
    std::env::var_os(SECRETS_FILE_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRETS_FILE))
}

/// Picks the local directory: explicit value, then `env_value`, then the
/// default. The result always ends with a separator.
pub fn resolve_local_directory(explicit: Option<&str>, env_value: Option<&str>) -> PathBuf {
    let dir = [explicit, env_value]
        .into_iter()
        .flatten()
        .find(|v| !v.is_empty())
        .unwrap_or(DEFAULT_LOCAL_DIRECTORY);

    if dir.ends_with('/') {
        PathBuf::from(dir)
    } else {
        PathBuf::from(format!("{}/", dir))
    }
}

impl SyncConfig {
    /// Builds the run configuration from loaded secrets and the process
    /// environment. The managed key set is built here, once.
    pub fn from_secrets(secrets: &AppSecrets) -> Self {
        let env_dir = std::env::var(LOCAL_DIRECTORY_ENV).ok();
        let local_directory =
            resolve_local_directory(secrets.local_directory.as_deref(), env_dir.as_deref());

        let defaults = SyncConfig::default();
        SyncConfig {
            mirror_bucket: secrets.mirror_bucket.clone(),
            local_directory,
            mode: secrets.mode.unwrap_or(defaults.mode),
            max_concurrent_fetches: secrets
                .max_concurrent_fetches
                .unwrap_or(defaults.max_concurrent_fetches)
                .max(1),
            ..defaults
        }
        .with_managed_keys(secrets.managed_files.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_legacy_field_names_are_accepted() {
        let json = r#"{
            "clam_mirror_bucket": "testclammirrorbucket",
            "clam_config_files": ["file1", "file2", "file3"],
            "clam_bucket_key_id": "testclambucketkeyid",
            "clam_bucket_key": "testclambucketkey",
            "clam_bucket_region": "us-east-1"
        }"#;
        let secrets: AppSecrets = serde_json::from_str(json).unwrap();
        assert_eq!(secrets.mirror_bucket, "testclammirrorbucket");
        assert_eq!(secrets.managed_files.len(), 3);
        assert_eq!(secrets.region, "us-east-1");
        assert!(secrets.local_directory.is_none());
    }

    #[test]
    fn test_mode_and_concurrency_from_file() {
        let json = r#"{"mirror_bucket": "b", "mode": "allow-list", "max_concurrent_fetches": 0}"#;
        let secrets: AppSecrets = serde_json::from_str(json).unwrap();
        let config = SyncConfig::from_secrets(&secrets);
        assert_eq!(config.mode, SyncMode::AllowList);
        assert_eq!(config.max_concurrent_fetches, 1);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = AppSecrets::load_or_default(&dir.path().join("absent.json"));
        assert!(secrets.mirror_bucket.is_empty());
        assert!(secrets.managed_files.is_empty());
    }

    #[test]
    fn test_unparseable_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let secrets = AppSecrets::load_or_default(file.path());
        assert!(secrets.key_id.is_empty());
    }

    #[test]
    fn test_local_directory_precedence_and_trailing_slash() {
        assert_eq!(
            resolve_local_directory(Some("/srv/clam"), Some("/env/dir")),
            PathBuf::from("/srv/clam/")
        );
        assert_eq!(
            resolve_local_directory(None, Some("/env/dir/")),
            PathBuf::from("/env/dir/")
        );
        assert_eq!(
            resolve_local_directory(Some(""), None),
            PathBuf::from(DEFAULT_LOCAL_DIRECTORY)
        );
    }

    #[test]
    fn test_managed_keys_built_once_as_set() {
        let secrets = AppSecrets {
            managed_files: vec!["a.cvd".into(), "b.cvd".into(), "a.cvd".into()],
            local_directory: Some("/tmp/mirror".into()),
            ..AppSecrets::default()
        };
        let config = SyncConfig::from_secrets(&secrets);
        assert_eq!(config.managed_keys.len(), 2);
        assert!(config.managed_keys.contains("b.cvd"));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let secrets = AppSecrets {
            key_id: "AKIAEXAMPLE".into(),
            secret_key: "supersecret".into(),
            ..AppSecrets::default()
        };
        let rendered = format!("{:?}", secrets);
        assert!(!rendered.contains("AKIAEXAMPLE"));
        assert!(!rendered.contains("supersecret"));
    }
}
