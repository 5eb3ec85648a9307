//! Serializable table handle shared between planner and workers.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use colbridge_expr::TupleDomain;
use colbridge_plan::translation::storage_to_logical;
use colbridge_result::{Error, Result};
use colbridge_storage::{StorageTable, TableResolver};
use colbridge_types::{ColumnHandle, DataField};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::metadata::{ColumnMetadata, TableMetadata};
use crate::session::SessionOptions;

/// Everything a worker needs to read one table: names, the opaque storage
/// descriptor, the pushed-down filter and the projected columns.
///
/// A handle is immutable. [`TableHandle::with_filter`] and
/// [`TableHandle::with_projection`] return new handles. The live table behind
/// the descriptor is resolved on first use and memoized per handle instance;
/// the memo is not part of the wire form and takes no part in equality.
#[derive(Clone, Serialize, Deserialize)]
pub struct TableHandle {
    schema_name: String,
    table_name: String,
    descriptor: Arc<[u8]>,
    filter: TupleDomain<ColumnHandle>,
    projection: Option<Vec<ColumnHandle>>,
    #[serde(skip)]
    table: OnceLock<Arc<dyn StorageTable>>,
}

impl TableHandle {
    pub fn new(
        schema_name: impl Into<String>,
        table_name: impl Into<String>,
        descriptor: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            descriptor: descriptor.into(),
            filter: TupleDomain::all(),
            projection: None,
            table: OnceLock::new(),
        }
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn descriptor(&self) -> &[u8] {
        &self.descriptor
    }

    pub fn filter(&self) -> &TupleDomain<ColumnHandle> {
        &self.filter
    }

    /// Projected columns, `None` meaning every column.
    pub fn projection(&self) -> Option<&[ColumnHandle]> {
        self.projection.as_deref()
    }

    /// Copy of this handle with `filter` replacing the current one.
    pub fn with_filter(&self, filter: TupleDomain<ColumnHandle>) -> TableHandle {
        TableHandle {
            filter,
            ..self.clone()
        }
    }

    /// Copy of this handle with `projection` replacing the current one.
    pub fn with_projection(&self, projection: Option<Vec<ColumnHandle>>) -> TableHandle {
        TableHandle {
            projection,
            ..self.clone()
        }
    }

    /// Whether the live table was already resolved on this instance.
    pub fn is_resolved(&self) -> bool {
        self.table.get().is_some()
    }

    /// The live table named by the descriptor.
    ///
    /// Resolution happens at most once per handle instance from the caller's
    /// point of view: concurrent first callers may each resolve, but all of
    /// them observe the single table that won the cell.
    pub fn resolve_table(&self, resolver: &dyn TableResolver) -> Result<Arc<dyn StorageTable>> {
        if let Some(table) = self.table.get() {
            return Ok(Arc::clone(table));
        }
        let resolved = resolver.resolve(&self.descriptor).map_err(|e| match e {
            Error::DescriptorCorrupt(_) => e,
            other => Error::descriptor_corrupt(other),
        })?;
        debug!(
            schema = %self.schema_name,
            table = %self.table_name,
            snapshot = ?resolved.snapshot_id(),
            "resolved table descriptor"
        );
        Ok(Arc::clone(self.table.get_or_init(|| resolved)))
    }

    /// The live table with the session's time travel options applied. Without
    /// session options this is the memoized table itself.
    pub fn table_with_dynamic_options(
        &self,
        resolver: &dyn TableResolver,
        session: &SessionOptions,
    ) -> Result<Arc<dyn StorageTable>> {
        let table = self.resolve_table(resolver)?;
        let options = session.dynamic_options()?;
        if options.is_empty() {
            return Ok(table);
        }
        trace!(table = %self.table_name, ?options, "applying dynamic table options");
        table.copy_with_options(&options)
    }

    pub fn table_metadata(&self, resolver: &dyn TableResolver) -> Result<TableMetadata> {
        Ok(TableMetadata {
            schema_name: self.schema_name.clone(),
            table_name: self.table_name.clone(),
            columns: self.column_metadatas(resolver)?,
        })
    }

    /// One entry per field of the current schema, in schema order.
    pub fn column_metadatas(&self, resolver: &dyn TableResolver) -> Result<Vec<ColumnMetadata>> {
        let table = self.resolve_table(resolver)?;
        table
            .row_type()
            .fields()
            .iter()
            .map(|field| {
                Ok(ColumnMetadata {
                    name: field.name.clone(),
                    logical_type: storage_to_logical(&field.data_type)?,
                    nullable: field.data_type.is_nullable(),
                    comment: field.description.clone(),
                })
            })
            .collect()
    }

    /// Handle for the column called `name`.
    pub fn column_handle(&self, resolver: &dyn TableResolver, name: &str) -> Result<ColumnHandle> {
        let table = self.resolve_table(resolver)?;
        let row_type = table.row_type();
        let field = row_type
            .field_by_name(name)
            .ok_or_else(|| Error::unknown_column(name, row_type.field_names()))?;
        column_handle_for(field)
    }

    /// Handles for every column of the current schema, in schema order.
    pub fn column_handles(&self, resolver: &dyn TableResolver) -> Result<Vec<ColumnHandle>> {
        let table = self.resolve_table(resolver)?;
        table.row_type().fields().iter().map(column_handle_for).collect()
    }

    /// Wire form shipped to workers.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bitcode::serialize(self).map_err(|e| Error::Internal(format!("encode table handle: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bitcode::deserialize(bytes)
            .map_err(|e| Error::InvalidArgumentError(format!("malformed table handle: {e}")))
    }
}

fn column_handle_for(field: &DataField) -> Result<ColumnHandle> {
    Ok(ColumnHandle::new(
        field.name.clone(),
        storage_to_logical(&field.data_type)?,
    ))
}

impl PartialEq for TableHandle {
    fn eq(&self, other: &Self) -> bool {
        self.schema_name == other.schema_name
            && self.table_name == other.table_name
            && self.descriptor == other.descriptor
            && self.filter == other.filter
            && self.projection == other.projection
    }
}

impl Eq for TableHandle {}

impl Hash for TableHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.schema_name.hash(state);
        self.table_name.hash(state);
        self.descriptor.hash(state);
        self.filter.hash(state);
        self.projection.hash(state);
    }
}

impl fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle")
            .field("schema_name", &self.schema_name)
            .field("table_name", &self.table_name)
            .field("descriptor_len", &self.descriptor.len())
            .field("filter", &self.filter)
            .field("projection", &self.projection)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl fmt::Display for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema_name, self.table_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colbridge_expr::ValueSet;
    use colbridge_storage::{MemCatalog, TableIdentifier};
    use colbridge_types::{LogicalType, RowType, StorageValue, TypeKind};
    use std::collections::hash_map::DefaultHasher;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn catalog() -> (MemCatalog, Vec<u8>) {
        let catalog = MemCatalog::new();
        let schema = RowType::new(vec![
            DataField::new(0, "id", TypeKind::BigInt.not_null()).with_description("row id"),
            DataField::new(1, "name", TypeKind::VarChar(64).nullable()),
        ]);
        let table = catalog
            .create_table(TableIdentifier::new("db", "people"), schema)
            .unwrap();
        table
            .commit(vec![vec![StorageValue::BigInt(1), StorageValue::from("ada")]])
            .unwrap();
        let descriptor = table.descriptor().unwrap();
        (catalog, descriptor)
    }

    fn hash_of(handle: &TableHandle) -> u64 {
        let mut hasher = DefaultHasher::new();
        handle.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn metadata_mirrors_storage_schema() {
        let (catalog, descriptor) = catalog();
        let handle = TableHandle::new("db", "people", descriptor);
        let metadata = handle.table_metadata(&catalog).unwrap();
        assert_eq!(metadata.columns.len(), 2);
        let id = metadata.column("id").unwrap();
        assert_eq!(id.logical_type, LogicalType::BigInt);
        assert!(!id.nullable);
        assert_eq!(id.comment.as_deref(), Some("row id"));
        assert_eq!(
            metadata.column("name").unwrap().logical_type,
            LogicalType::VarChar(Some(64))
        );
    }

    #[test]
    fn column_handle_reports_unknown_columns() {
        let (catalog, descriptor) = catalog();
        let handle = TableHandle::new("db", "people", descriptor);
        let err = handle.column_handle(&catalog, "age").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot find field age in schema [\"id\", \"name\"]"
        );
    }

    #[test]
    fn copies_share_descriptor_and_differ_in_equality() {
        let (catalog, descriptor) = catalog();
        let handle = TableHandle::new("db", "people", descriptor);
        let id = handle.column_handle(&catalog, "id").unwrap();
        let filtered = handle.with_filter(TupleDomain::with_column_domains([(
            id.clone(),
            ValueSet::Equals(1i64.into()),
        )]));
        assert_ne!(handle, filtered);
        assert_eq!(handle.descriptor(), filtered.descriptor());
        assert!(handle.filter().is_all());

        let projected = handle.with_projection(Some(vec![id]));
        assert_ne!(handle, projected);
        assert_eq!(projected.with_projection(None), handle);
    }

    #[test]
    fn wire_form_drops_the_memo() {
        let (catalog, descriptor) = catalog();
        let handle = TableHandle::new("db", "people", descriptor);
        handle.resolve_table(&catalog).unwrap();
        assert!(handle.is_resolved());

        let decoded = TableHandle::from_bytes(&handle.to_bytes().unwrap()).unwrap();
        assert!(!decoded.is_resolved());
        assert_eq!(decoded, handle);
        assert_eq!(hash_of(&decoded), hash_of(&handle));
    }

    #[test]
    fn corrupt_descriptor_fails_resolution() {
        let (catalog, _) = catalog();
        let handle = TableHandle::new("db", "people", vec![0xff_u8; 3]);
        assert!(matches!(
            handle.resolve_table(&catalog),
            Err(Error::DescriptorCorrupt(_))
        ));
    }

    #[derive(Default)]
    struct CountingResolver {
        inner: MemCatalog,
        calls: AtomicUsize,
    }

    impl TableResolver for CountingResolver {
        fn resolve(&self, descriptor: &[u8]) -> Result<Arc<dyn StorageTable>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.resolve(descriptor)
        }
    }

    #[test]
    fn resolution_is_memoized() {
        let resolver = CountingResolver::default();
        let table = resolver
            .inner
            .create_table(
                TableIdentifier::new("db", "t"),
                RowType::new(vec![DataField::new(0, "a", TypeKind::Int.nullable())]),
            )
            .unwrap();
        let handle = TableHandle::new("db", "t", table.descriptor().unwrap());

        let first = handle.resolve_table(&resolver).unwrap();
        let second = handle.resolve_table(&resolver).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }
}
