//! Shared type and value model for colbridge.
//!
//! Two type systems meet here: the engine's [`LogicalType`] and the storage
//! engine's [`DataType`]. Values have matching pairs ([`EngineValue`] and
//! [`StorageValue`]). Translating between them is the job of
//! `colbridge-plan`; this crate only defines the vocabulary.

pub mod column;
pub mod decimal;
pub mod ids;
pub mod logical;
pub mod storage;
pub mod temporal;
pub mod value;

pub use column::ColumnHandle;
pub use decimal::{DecimalError, DecimalValue, MAX_DECIMAL_PRECISION};
pub use ids::{FieldId, SchemaId, SnapshotId};
pub use logical::{LogicalType, RowField};
pub use storage::{DataField, DataType, MAX_LENGTH, MAX_TIME_PRECISION, RowType, TypeKind};
pub use temporal::{Timestamp, TimestampTz};
pub use value::{EngineValue, StorageTimestamp, StorageValue};
