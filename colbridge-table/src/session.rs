//! Session-scoped dynamic table options.

use std::collections::BTreeMap;

use colbridge_result::{Error, Result};
use colbridge_storage::{SCAN_SNAPSHOT_ID, SCAN_TIMESTAMP_MILLIS};
use colbridge_types::SnapshotId;

/// Session property pinning reads to a point in time (epoch milliseconds).
pub const SCAN_TIMESTAMP: &str = "scan_timestamp_millis";

/// Session property pinning reads to a snapshot ID.
pub const SCAN_SNAPSHOT: &str = "scan_snapshot_id";

/// Time travel parameters a session can attach to every table it reads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionOptions {
    scan_timestamp_millis: Option<i64>,
    scan_snapshot_id: Option<SnapshotId>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan_timestamp_millis(mut self, millis: i64) -> Self {
        self.scan_timestamp_millis = Some(millis);
        self
    }

    pub fn with_scan_snapshot_id(mut self, snapshot_id: SnapshotId) -> Self {
        self.scan_snapshot_id = Some(snapshot_id);
        self
    }

    /// Parse from session properties. Unrelated properties are ignored.
    pub fn from_properties<'a, I>(properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut options = SessionOptions::default();
        for (key, value) in properties {
            match key {
                SCAN_TIMESTAMP => options.scan_timestamp_millis = Some(parse_long(key, value)?),
                SCAN_SNAPSHOT => options.scan_snapshot_id = Some(parse_long(key, value)?),
                _ => {}
            }
        }
        Ok(options)
    }

    pub fn scan_timestamp_millis(&self) -> Option<i64> {
        self.scan_timestamp_millis
    }

    pub fn scan_snapshot_id(&self) -> Option<SnapshotId> {
        self.scan_snapshot_id
    }

    pub fn is_empty(&self) -> bool {
        self.scan_timestamp_millis.is_none() && self.scan_snapshot_id.is_none()
    }

    /// Storage options for the live table. At most one time travel option
    /// may be set.
    pub fn dynamic_options(&self) -> Result<BTreeMap<String, String>> {
        if self.scan_timestamp_millis.is_some() && self.scan_snapshot_id.is_some() {
            return Err(Error::InvalidArgumentError(format!(
                "session properties {SCAN_TIMESTAMP} and {SCAN_SNAPSHOT} cannot both be set"
            )));
        }
        let mut options = BTreeMap::new();
        if let Some(millis) = self.scan_timestamp_millis {
            options.insert(SCAN_TIMESTAMP_MILLIS.to_string(), millis.to_string());
        }
        if let Some(id) = self.scan_snapshot_id {
            options.insert(SCAN_SNAPSHOT_ID.to_string(), id.to_string());
        }
        Ok(options)
    }
}

fn parse_long(key: &str, value: &str) -> Result<i64> {
    value.trim().parse::<i64>().map_err(|_| {
        Error::InvalidArgumentError(format!(
            "session property {key} must be a bigint, got '{value}'"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_properties() {
        let options = SessionOptions::from_properties([
            (SCAN_SNAPSHOT, "4"),
            ("query_max_memory", "1GB"),
        ])
        .unwrap();
        assert_eq!(options.scan_snapshot_id(), Some(4));
        assert_eq!(
            options.dynamic_options().unwrap(),
            BTreeMap::from([(SCAN_SNAPSHOT_ID.to_string(), "4".to_string())])
        );
        assert!(SessionOptions::from_properties([(SCAN_TIMESTAMP, "soon")]).is_err());
    }

    #[test]
    fn rejects_conflicting_pins() {
        let options = SessionOptions::new()
            .with_scan_snapshot_id(1)
            .with_scan_timestamp_millis(5);
        assert!(matches!(
            options.dynamic_options(),
            Err(Error::InvalidArgumentError(_))
        ));
        assert!(SessionOptions::new().dynamic_options().unwrap().is_empty());
    }
}
