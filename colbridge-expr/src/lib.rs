//! Constraint and predicate models for colbridge.
//!
//! [`domain`] holds what the engine pushes down: per-column value sets.
//! [`predicate`] holds what the storage reader understands: a tree of filters
//! over stable field IDs.

pub mod domain;
pub mod predicate;

pub use domain::{TupleDomain, ValueSet, supports_ranges};
pub use predicate::{Expr, Filter, Operator};
