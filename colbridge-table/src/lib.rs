//! Table handles and planner-side pushdown for colbridge.
//!
//! A [`TableHandle`] is what the planner hands to workers: table names, the
//! storage engine's opaque descriptor, the pushed filter and the projected
//! columns. It serializes without the live table, which each process
//! resolves lazily through a [`colbridge_storage::TableResolver`].

pub mod handle;
pub mod metadata;
pub mod pushdown;
pub mod session;

pub use handle::TableHandle;
pub use metadata::{ColumnMetadata, TableMetadata};
pub use pushdown::{FilterApplication, apply_filter, apply_projection};
pub use session::{SCAN_SNAPSHOT, SCAN_TIMESTAMP, SessionOptions};
