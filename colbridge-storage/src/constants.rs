//! Option keys understood by storage tables.

/// Read the latest snapshot committed at or before this epoch-millisecond
/// timestamp.
pub const SCAN_TIMESTAMP_MILLIS: &str = "scan.timestamp-millis";

/// Read exactly this snapshot ID.
pub const SCAN_SNAPSHOT_ID: &str = "scan.snapshot-id";
