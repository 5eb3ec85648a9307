//! Error types and result definitions for colbridge.
//!
//! Every crate in the workspace returns [`Result<T>`] with the shared [`Error`]
//! enum, so failures cross crate boundaries with `?` and callers can match on
//! a single taxonomy.
//!
//! # Error Categories
//!
//! - **Descriptor failures** ([`Error::DescriptorCorrupt`]): a table handle's
//!   serialized descriptor cannot be resolved into a live table.
//! - **Type mapping failures** ([`Error::TypeMapping`]): a type or value has no
//!   exact representation on the other side of the type bridge.
//! - **Schema desync** ([`Error::UnknownColumn`]): a projection names a column
//!   the table does not have.
//! - **Split failures** ([`Error::ReadIo`], [`Error::Io`]): reader open/advance
//!   errors surfaced to the worker running the split.
//! - **Misuse and bugs** ([`Error::InvalidArgumentError`],
//!   [`Error::InvalidState`], [`Error::Internal`]).

pub mod error;
pub mod result;

pub use error::Error;
pub use result::Result;
