//! Translation layer between the engine and the storage engine.
//!
//! Everything here is pure: given schemas, types and constraints it produces
//! storage types, encoded values, predicates and projections. Nothing in this
//! crate touches a table or a reader.
//!
//! - [`translation::types`]: type mapping, value encoding/decoding and
//!   field-ID based schema evolution.
//! - [`translation::filter`]: tuple domain to storage predicate conversion.
//! - [`translation::projection`]: requested column list to field ordinals.

pub mod translation;

pub use translation::{
    ConversionReport, DropReason, FieldResolution, FilterConverter, Projection,
    resolve_projection,
};
