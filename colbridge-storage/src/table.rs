//! The storage engine contract consumed by the read path.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use colbridge_expr::Expr;
use colbridge_result::{Error, Result};
use colbridge_types::{RowType, SchemaId, SnapshotId, StorageValue};
use serde::{Deserialize, Serialize};

/// Fully qualified table name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableIdentifier {
    pub database: String,
    pub table: String,
}

impl TableIdentifier {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// One unit of read work: a single data file of a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Split {
    pub table: TableIdentifier,
    pub snapshot_id: SnapshotId,
    pub file_id: u64,
    /// Schema version the file was written with.
    pub schema_id: SchemaId,
    pub row_count: usize,
}

impl Split {
    /// Opaque wire form handed to the scheduler.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bitcode::serialize(self).map_err(|e| Error::Internal(format!("encode split: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bitcode::deserialize(bytes)
            .map_err(|e| Error::InvalidArgumentError(format!("malformed split descriptor: {e}")))
    }
}

/// A row produced by a [`RecordReader`].
///
/// `schema` describes `values` position by position. It is the projection of
/// the schema the row's data file was written with, so it can lack fields that
/// were added later and can carry narrower types than the current schema.
#[derive(Clone, Debug, PartialEq)]
pub struct StorageRow {
    pub schema: Arc<RowType>,
    pub values: Vec<StorageValue>,
}

/// Projection and filter for one read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadSpec {
    /// Ordinals into the table's row type, in output order. `None` reads all
    /// fields.
    pub projection: Option<Vec<usize>>,
    /// Rows for which the predicate is not known to be true are skipped.
    pub filter: Option<Expr>,
}

/// Builder for a [`ReadSpec`].
#[derive(Clone, Debug, Default)]
pub struct ReadBuilder {
    spec: ReadSpec,
}

impl ReadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projection(mut self, projection: Vec<usize>) -> Self {
        self.spec.projection = Some(projection);
        self
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.spec.filter = Some(filter);
        self
    }

    pub fn build(self) -> ReadSpec {
        self.spec
    }
}

/// Pull-based row iterator over one split.
pub trait RecordReader: Send {
    /// Next row, or `None` once the split is exhausted.
    fn next_row(&mut self) -> Result<Option<StorageRow>>;

    /// Release the reader's resources. Callers invoke this at most once.
    fn close(&mut self) -> Result<()>;
}

/// A live, readable view of a table bound to one snapshot.
pub trait StorageTable: Send + Sync + fmt::Debug {
    fn identifier(&self) -> &TableIdentifier;

    /// Schema of the bound snapshot.
    fn row_type(&self) -> &RowType;

    /// Options this view was created with.
    fn options(&self) -> &BTreeMap<String, String>;

    /// The snapshot reads are bound to, `None` for an empty table.
    fn snapshot_id(&self) -> Option<SnapshotId>;

    /// Copy of this table with `options` merged over its own. Time travel
    /// options rebind the copy to another snapshot.
    fn copy_with_options(
        &self,
        options: &BTreeMap<String, String>,
    ) -> Result<Arc<dyn StorageTable>>;

    /// Read work for the bound snapshot, one split per data file.
    fn splits(&self) -> Result<Vec<Split>>;

    /// Decode a split produced by [`Split::to_bytes`] and check it belongs to
    /// this table.
    fn decode_split(&self, bytes: &[u8]) -> Result<Split> {
        let split = Split::from_bytes(bytes)?;
        if &split.table != self.identifier() {
            return Err(Error::InvalidArgumentError(format!(
                "split for {} cannot be read from {}",
                split.table,
                self.identifier()
            )));
        }
        Ok(split)
    }

    fn new_read_builder(&self) -> ReadBuilder {
        ReadBuilder::new()
    }

    /// Open a reader over `split`.
    fn create_reader(&self, split: &Split, spec: &ReadSpec) -> Result<Box<dyn RecordReader>>;
}

/// Turns an opaque table descriptor into a live table.
pub trait TableResolver: Send + Sync {
    /// Fails with [`Error::DescriptorCorrupt`] when the descriptor cannot be
    /// decoded or names an unknown table.
    fn resolve(&self, descriptor: &[u8]) -> Result<Arc<dyn StorageTable>>;
}

/// Serializable table reference: identifier plus the options the table was
/// loaded with.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub identifier: TableIdentifier,
    pub options: BTreeMap<String, String>,
}

impl TableDescriptor {
    pub fn new(identifier: TableIdentifier) -> Self {
        Self {
            identifier,
            options: BTreeMap::new(),
        }
    }

    pub fn for_table(table: &dyn StorageTable) -> Self {
        Self {
            identifier: table.identifier().clone(),
            options: table.options().clone(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        bitcode::serialize(self).map_err(|e| Error::Internal(format!("encode descriptor: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bitcode::deserialize(bytes).map_err(Error::descriptor_corrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_wire_form() {
        let split = Split {
            table: TableIdentifier::new("db", "t"),
            snapshot_id: 3,
            file_id: 7,
            schema_id: 1,
            row_count: 2,
        };
        let bytes = split.to_bytes().unwrap();
        assert_eq!(Split::from_bytes(&bytes).unwrap(), split);
        assert!(Split::from_bytes(&[]).is_err());
    }

    #[test]
    fn garbage_descriptor_is_corrupt() {
        assert!(matches!(
            TableDescriptor::decode(&[]),
            Err(Error::DescriptorCorrupt(_))
        ));
    }

    #[test]
    fn read_builder_collects_parts() {
        let spec = ReadBuilder::new().with_projection(vec![2, 0]).build();
        assert_eq!(spec.projection, Some(vec![2, 0]));
        assert!(spec.filter.is_none());
    }
}
