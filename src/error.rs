//! Error types for mirror operations.

use std::io;
use thiserror::Error;

/// Errors that can occur while listing, fetching or writing mirrored objects.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// HTTP request error talking to the object store.
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    /// Malformed listing document from the object store.
    #[error(transparent)]
    XmlError(#[from] quick_xml::DeError),

    /// The object store rejected or failed a request.
    #[error("Object store error: {0}")]
    Store(String),

    /// The compressed payload could not be decoded.
    #[error("Decompression failed for {key}: {source}")]
    Decompress {
        key: String,
        #[source]
        source: io::Error,
    },

    /// Decompressed content does not match the published checksum.
    #[error("Checksum mismatch for {key}: expected {expected}, got {computed}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        computed: String,
    },

    /// A remote key would resolve outside the local directory.
    #[error("Refusing unsafe object key: {0}")]
    UnsafeKey(String),

    /// A spawned fetch task panicked or was cancelled.
    #[error("Fetch task failed: {0}")]
    Join(String),
}
