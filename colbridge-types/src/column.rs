use std::fmt;

use serde::{Deserialize, Serialize};

use crate::logical::LogicalType;

/// Column reference handed out to the engine: a name plus its logical type.
///
/// This is the only column handle type the bridge produces, so consumers match
/// on its fields directly.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnHandle {
    pub name: String,
    pub logical_type: LogicalType,
}

impl ColumnHandle {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn logical_type(&self) -> &LogicalType {
        &self.logical_type
    }
}

impl fmt::Display for ColumnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.logical_type)
    }
}
