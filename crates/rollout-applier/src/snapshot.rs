//! Snapshot payload codec: gzip compression with a SHA-256 checksum of
//! the uncompressed payload.
//!
//! The checksum must verify on every read; rollback refuses to restore a
//! payload whose checksum no longer matches.

use crate::error::SnapshotError;
use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rollout_core::model::{DeviceId, DeviceSnapshot, SnapshotId};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

/// Compress a captured state document and compute its checksum.
///
/// Returns `(compressed payload, sha256 hex of the uncompressed bytes)`.
pub fn encode_payload(state: &Value) -> Result<(Vec<u8>, String), SnapshotError> {
    let raw = serde_json::to_vec(state)?;
    let checksum = hex_digest(&raw);

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    let payload = encoder.finish()?;

    Ok((payload, checksum))
}

/// Decompress a snapshot payload, verifying the stored checksum.
pub fn decode_payload(payload: &[u8], expected_checksum: &str) -> Result<Value, SnapshotError> {
    let mut decoder = GzDecoder::new(payload);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw)?;

    let actual = hex_digest(&raw);
    if actual != expected_checksum {
        return Err(SnapshotError::ChecksumMismatch {
            expected: expected_checksum.to_string(),
            actual,
        });
    }

    Ok(serde_json::from_slice(&raw)?)
}

/// Build a [`DeviceSnapshot`] from a freshly read state document.
pub fn capture(device_id: &DeviceId, state: &Value) -> Result<DeviceSnapshot, SnapshotError> {
    let (payload, checksum) = encode_payload(state)?;
    Ok(DeviceSnapshot {
        snapshot_id: SnapshotId::new(),
        device_id: device_id.clone(),
        taken_at: Utc::now(),
        payload,
        checksum,
    })
}

/// Restore the state document from a snapshot, verifying its checksum.
pub fn restore(snapshot: &DeviceSnapshot) -> Result<Value, SnapshotError> {
    decode_payload(&snapshot.payload, &snapshot.checksum)
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn round_trip_preserves_state() {
        let state = json!({
            "interfaces": {
                "wlan0": {"ssid": "corp", "running": true},
                "wlan1": {"ssid": "guest", "running": false},
            }
        });

        let snapshot = capture(&DeviceId::from("ap-1"), &state).unwrap();
        assert_eq!(restore(&snapshot).unwrap(), state);
    }

    #[test]
    fn payload_is_actually_compressed() {
        let big = json!({"rules": vec!["accept input established related"; 200]});
        let (payload, _) = encode_payload(&big).unwrap();
        let raw_len = serde_json::to_vec(&big).unwrap().len();
        assert!(payload.len() < raw_len);
    }

    #[test]
    fn tampered_payload_detected() {
        let state = json!({"ssid": "corp"});
        let mut snapshot = capture(&DeviceId::from("ap-1"), &state).unwrap();

        // flip checksum instead of payload: gzip may reject corrupt bytes
        // before the checksum is even computed
        snapshot.checksum = "0".repeat(64);
        assert!(matches!(
            restore(&snapshot),
            Err(SnapshotError::ChecksumMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_round_trip_checksum_holds(keys in proptest::collection::vec("[a-z]{1,12}", 0..20)) {
            let state = json!({
                "table": keys,
            });
            let (payload, checksum) = encode_payload(&state).unwrap();
            let restored = decode_payload(&payload, &checksum).unwrap();
            prop_assert_eq!(restored, state);
        }
    }
}
