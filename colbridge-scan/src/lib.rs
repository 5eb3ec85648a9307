//! Page sources for the colbridge read path.
//!
//! A [`PageSourceProvider`] turns a serialized split and a
//! [`colbridge_table::TableHandle`] into a [`PageSource`]. The source opens one
//! storage record reader for the split, decodes every row under the table's
//! current schema and emits Arrow-backed [`Page`]s in the requested column
//! order.

pub mod columnar;
pub mod page;
pub mod provider;
pub mod source;

pub use columnar::{build_array, logical_to_arrow, value_from_array};
pub use page::{Page, page_schema};
pub use provider::{DEFAULT_PAGE_BATCH_SIZE, PageSourceOptions, PageSourceProvider};
pub use source::{CancelHandle, PageSource, PageSourceState};
