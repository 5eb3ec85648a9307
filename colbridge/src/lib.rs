//! colbridge: the read path between a SQL engine and a columnar table store.
//!
//! This crate is the entrypoint for the workspace. It re-exports the pieces a
//! connector needs to plan and execute reads against a snapshot-versioned,
//! schema-evolving table format.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use colbridge::storage::{MemCatalog, StorageTable, TableIdentifier};
//! use colbridge::types::{DataField, RowType, StorageValue, TypeKind};
//! use colbridge::{PageSourceProvider, SessionOptions, TableHandle};
//!
//! let catalog = Arc::new(MemCatalog::new());
//! let table = catalog
//!     .create_table(
//!         TableIdentifier::new("db", "t"),
//!         RowType::new(vec![DataField::new(0, "v", TypeKind::Int.nullable())]),
//!     )
//!     .unwrap();
//! table.commit(vec![vec![StorageValue::Int(7)]]).unwrap();
//! let table = table.refresh().unwrap();
//!
//! let handle = TableHandle::new("db", "t", table.descriptor().unwrap());
//! let columns = handle.column_handles(catalog.as_ref()).unwrap();
//! let split = table.splits().unwrap().remove(0).to_bytes().unwrap();
//!
//! let provider = PageSourceProvider::new(catalog.clone());
//! let mut source = provider
//!     .create_page_source(&SessionOptions::new(), &split, &handle, &columns)
//!     .unwrap();
//! let page = source.next_page().unwrap().unwrap();
//! assert_eq!(page.render_row(0).unwrap(), vec!["7"]);
//! ```
//!
//! # Architecture
//!
//! - **Types** (`colbridge-types`): engine logical types, storage data types
//!   and the values of both.
//! - **Constraints and predicates** (`colbridge-expr`): tuple domains on the
//!   engine side, predicate trees on the storage side.
//! - **Translation** (`colbridge-plan`): type mapping, filter conversion and
//!   projection resolution.
//! - **Storage** (`colbridge-storage`): the storage engine contract plus an
//!   in-memory engine with snapshots and schema evolution.
//! - **Table handles** (`colbridge-table`): serializable handles, session time
//!   travel and pushdown entry points.
//! - **Page sources** (`colbridge-scan`): per-split readers emitting Arrow
//!   pages.

pub use colbridge_result::{Error, Result};
pub use colbridge_scan::{
    CancelHandle, DEFAULT_PAGE_BATCH_SIZE, Page, PageSource, PageSourceOptions,
    PageSourceProvider, PageSourceState,
};
pub use colbridge_table::{
    ColumnMetadata, FilterApplication, SessionOptions, TableHandle, TableMetadata, apply_filter,
    apply_projection,
};

pub mod types {
    //! Logical types, storage types and values.
    pub use colbridge_types::*;
}

pub mod expr {
    //! Engine constraints and storage predicates.
    pub use colbridge_expr::*;
}

pub mod translation {
    //! Type mapping, filter conversion and projection resolution.
    pub use colbridge_plan::translation::*;
}

pub mod storage {
    //! Storage engine contract and the in-memory engine.
    pub use colbridge_storage::*;
}
