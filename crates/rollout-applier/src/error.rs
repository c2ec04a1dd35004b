//! Error types for appliers, transports, and snapshots.
//!
//! Transport failures carry an explicit transient/permanent classification
//! so callers never have to guess from a string whether retrying makes
//! sense.

use std::time::Duration;

/// Device transport errors, classified at the transport boundary
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Worth retrying: connection reset, device briefly busy, ...
    #[error("transient transport failure: {0}")]
    Transient(String),

    /// Not worth retrying: auth rejected, unknown device, bad path, ...
    #[error("permanent transport failure: {0}")]
    Permanent(String),

    /// The operation did not return within its deadline
    #[error("transport timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Transient(_) | TransportError::Timeout(_))
    }
}

/// Snapshot capture and codec errors
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The device state read for the snapshot failed
    #[error("snapshot capture failed: {0}")]
    Capture(String),

    /// The stored checksum no longer matches the decompressed payload
    #[error("snapshot checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Compression or serialization failure
    #[error("snapshot codec failure: {0}")]
    Codec(String),
}

impl From<std::io::Error> for SnapshotError {
    fn from(err: std::io::Error) -> Self {
        SnapshotError::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        SnapshotError::Codec(err.to_string())
    }
}

/// Applier-level errors
#[derive(Debug, thiserror::Error)]
pub enum ApplierError {
    /// Bad change parameters; every violated constraint is listed
    #[error("validation failed: {0:?}")]
    Validation(Vec<String>),

    /// No applier registered for the requested domain
    #[error("unknown domain: {0}")]
    UnknownDomain(String),

    /// The domain applier does not support the requested operation
    #[error("unsupported operation {operation} for domain {domain}")]
    UnsupportedOperation { domain: String, operation: String },

    /// No device with that id in the registry
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Unexpected internal failure
    #[error("internal applier failure: {0}")]
    Internal(String),
}
