//! Sigmirror - keep a local signature-database directory in sync with a bucket
//!
//! This library lists an S3-compatible bucket, decides which objects need a
//! local update and fetches them, verifying content against a published
//! checksum while it is being decompressed.
//!
//! # Features
//!
//! - **Two selection modes**: compressed archives with companion checksum
//!   objects, or an explicit allow-list compared by modification time
//! - **Streaming verification**: SHA-256 computed over the decompressed bytes
//!   in the same pass that writes them to disk
//! - **Bounded retries with jitter**: randomized delays keep fleets of mirrors
//!   on the same schedule from hitting the bucket at once
//! - **Failure isolation**: one broken object never stops the others
//!
//! # Example
//!
//! ```no_run
//! use sigmirror::{sync_mirror, AppSecrets, HttpObjectStore, HttpStoreConfig, SyncConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let secrets = AppSecrets::load_or_default(&sigmirror::config::secrets_path_from_env());
//! let store = HttpObjectStore::new(HttpStoreConfig::from_secrets(&secrets))?;
//! let config = SyncConfig::from_secrets(&secrets);
//!
//! let report = sync_mirror(Arc::new(store), Arc::new(config)).await?;
//! println!("{} object(s) updated", report.verified() + report.unverified());
//! # Ok(())
//! # }
//! ```

pub mod config;
mod download;
pub mod error;
pub mod fetcher;
pub mod jitter;
pub mod orchestrator;
pub mod planner;
pub mod store;
pub mod types;
pub mod verify;

pub use config::AppSecrets;
pub use error::MirrorError;
pub use fetcher::RetryingFetcher;
pub use orchestrator::sync_mirror;
pub use planner::{plan, LocalFileState, LocalStore, Plan};
pub use store::{
    HttpObjectStore, HttpStoreConfig, LocalObjectStore, MemoryObjectStore, ObjectBody, ObjectStore,
};
pub use types::{
    FetchAttempt, FetchReport, FetchResult, RemoteObjectMeta, RetryPolicy, SyncConfig, SyncMode,
    SyncReport,
};
pub use verify::{verify, ChecksumRecord, VerificationOutcome};
