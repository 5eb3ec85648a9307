//! Identifiers shared across colbridge crates.
//!
//! These types live in `colbridge-types` so the translation layer can talk
//! about storage identity without depending on a storage implementation.

/// Stable identifier of a field in a storage schema.
///
/// Field IDs are assigned when a column is created and never change, even when
/// the column is renamed or moved. Data files written under an older schema
/// version are matched against the current schema by field ID, never by
/// ordinal position.
pub type FieldId = u32;

/// Identifier of a committed table snapshot.
///
/// Snapshots are numbered from `1` in commit order.
pub type SnapshotId = i64;

/// Identifier of a schema version.
///
/// Schema `0` is the schema a table was created with; every evolution step
/// allocates the next ID.
pub type SchemaId = u64;
