//! Storage engine contract and an in-memory reference engine.
//!
//! The read path only talks to storage through the traits in [`table`]:
//! resolve a descriptor into a [`StorageTable`], enumerate or decode
//! [`Split`]s, and pull [`StorageRow`]s from a [`RecordReader`]. [`mem`]
//! implements the contract with snapshots, time travel and schema evolution
//! so the whole read path can run without external services.

pub mod constants;
pub mod mem;
pub mod table;

pub use constants::{SCAN_SNAPSHOT_ID, SCAN_TIMESTAMP_MILLIS};
pub use mem::{MemCatalog, MemTable, Snapshot};
pub use table::{
    ReadBuilder, ReadSpec, RecordReader, Split, StorageRow, StorageTable, TableDescriptor,
    TableIdentifier, TableResolver,
};
