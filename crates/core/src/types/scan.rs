//! Scan pipeline value types.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::barcode::Barcode;
use super::scope::UserScope;

/// A raw decode candidate produced by the decoder stream.
///
/// Transient and never persisted. `error` is the decoder's error estimate
/// for the frame: lower is better, and candidates above the debouncer's
/// acceptance threshold are dropped as noise.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanCandidate {
    /// Raw decoded string, unvalidated.
    pub code: String,
    /// Decoder error estimate for this frame.
    pub error: f32,
    /// Capture instant, used for cooldown arithmetic.
    pub at: Instant,
}

/// Where a confirmed scan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanSource {
    /// Debounced camera decode.
    Camera,
    /// Manual-entry submission.
    Manual,
}

/// A debounced, de-duplicated signal that a barcode should be resolved.
///
/// Camera candidates become confirmed scans by surviving the debouncer;
/// manual submissions enter here directly after validation. Downstream
/// logic treats both identically.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedScan {
    /// The validated barcode.
    pub barcode: Barcode,
    /// Origin of the scan.
    pub source: ScanSource,
    /// Confirmation instant.
    pub at: Instant,
}

/// Outcome status recorded for a scan attempt against the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// The barcode resolved to a catalog product.
    Matched,
    /// The barcode had no matching product.
    Unmatched,
}

/// An append-only audit row, written once per scan attempt that reached
/// the catalog. Never mutated or deleted by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewScanRecord {
    /// The scanned barcode.
    pub barcode: Barcode,
    /// Scope the scan belongs to.
    pub scope: UserScope,
    /// Resolution outcome.
    pub status: ScanStatus,
    /// Attempt timestamp.
    pub scanned_at: DateTime<Utc>,
}

/// A stored scan-log row; the store assigns the id on append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Row identity.
    pub id: super::id::ScanId,
    /// The scanned barcode.
    pub barcode: Barcode,
    /// Scope the scan belongs to.
    pub scope: UserScope,
    /// Resolution outcome.
    pub status: ScanStatus,
    /// Attempt timestamp.
    pub scanned_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_status_serializes_snake_case() {
        let json = serde_json::to_string(&ScanStatus::Unmatched).expect("serializable");
        assert_eq!(json, "\"unmatched\"");
    }

    #[test]
    fn test_scan_source_round_trip() {
        for source in [ScanSource::Camera, ScanSource::Manual] {
            let json = serde_json::to_string(&source).expect("serializable");
            let back: ScanSource = serde_json::from_str(&json).expect("deserializable");
            assert_eq!(back, source);
        }
    }
}
