//! In-memory storage engine.
//!
//! A [`MemCatalog`] owns tables; each table keeps every schema version, every
//! committed snapshot and one immutable data file per commit. Data files
//! remember the schema version they were written with, so reads after a
//! schema change see old files exactly as they were written.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use colbridge_expr::Expr;
use colbridge_result::{Error, Result};
use colbridge_types::{DataField, DataType, FieldId, RowType, SchemaId, SnapshotId, StorageValue};
use rustc_hash::{FxHashMap, FxHashSet};
use time::OffsetDateTime;
use tracing::{debug, trace};

use crate::constants::{SCAN_SNAPSHOT_ID, SCAN_TIMESTAMP_MILLIS};
use crate::table::{
    ReadSpec, RecordReader, Split, StorageRow, StorageTable, TableDescriptor, TableIdentifier,
    TableResolver,
};

/// Committed table version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub schema_id: SchemaId,
    /// Commit time in epoch milliseconds.
    pub commit_millis: i64,
    /// Data files visible in this snapshot, oldest first.
    pub files: Vec<u64>,
}

#[derive(Debug)]
struct DataFile {
    schema_id: SchemaId,
    rows: Vec<Vec<StorageValue>>,
}

#[derive(Debug, Default)]
struct TableState {
    schemas: Vec<Arc<RowType>>,
    snapshots: Vec<Snapshot>,
    files: FxHashMap<u64, Arc<DataFile>>,
    next_file_id: u64,
}

impl TableState {
    fn latest_schema_id(&self) -> SchemaId {
        self.schemas.len().saturating_sub(1) as SchemaId
    }

    fn schema(&self, id: SchemaId) -> Result<Arc<RowType>> {
        self.schemas
            .get(id as usize)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("schema {id} does not exist")))
    }

    fn snapshot(&self, id: SnapshotId) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.id == id)
    }
}

/// Catalog of in-memory tables. Also resolves table descriptors.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default)]
pub struct MemCatalog {
    tables: RwLock<FxHashMap<TableIdentifier, Arc<RwLock<TableState>>>>,
}

impl MemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with `schema` as schema version 0.
    pub fn create_table(&self, identifier: TableIdentifier, schema: RowType) -> Result<MemTable> {
        validate_schema(&schema)?;
        let mut tables = self
            .tables
            .write()
            .expect("MemCatalog tables write lock poisoned");
        if tables.contains_key(&identifier) {
            return Err(Error::InvalidArgumentError(format!(
                "table {identifier} already exists"
            )));
        }
        let state = Arc::new(RwLock::new(TableState {
            schemas: vec![Arc::new(schema)],
            ..TableState::default()
        }));
        tables.insert(identifier.clone(), Arc::clone(&state));
        debug!(table = %identifier, "created table");
        MemTable::bind(identifier, state, BTreeMap::new())
    }

    /// Latest view of an existing table.
    pub fn table(&self, identifier: &TableIdentifier) -> Result<MemTable> {
        self.table_with_options(identifier, BTreeMap::new())
    }

    pub fn table_with_options(
        &self,
        identifier: &TableIdentifier,
        options: BTreeMap<String, String>,
    ) -> Result<MemTable> {
        let state = {
            let tables = self
                .tables
                .read()
                .expect("MemCatalog tables read lock poisoned");
            tables.get(identifier).cloned()
        };
        let state = state.ok_or_else(|| {
            Error::InvalidArgumentError(format!("table {identifier} does not exist"))
        })?;
        MemTable::bind(identifier.clone(), state, options)
    }
}

impl TableResolver for MemCatalog {
    fn resolve(&self, descriptor: &[u8]) -> Result<Arc<dyn StorageTable>> {
        let descriptor = TableDescriptor::decode(descriptor)?;
        let table = self
            .table_with_options(&descriptor.identifier, descriptor.options)
            .map_err(Error::descriptor_corrupt)?;
        Ok(Arc::new(table))
    }
}

fn validate_schema(schema: &RowType) -> Result<()> {
    let mut ids = FxHashSet::default();
    let mut names = FxHashSet::default();
    for field in schema.fields() {
        if !ids.insert(field.id) {
            return Err(Error::InvalidArgumentError(format!(
                "duplicate field id {}",
                field.id
            )));
        }
        if !names.insert(field.name.as_str()) {
            return Err(Error::InvalidArgumentError(format!(
                "duplicate field name '{}'",
                field.name
            )));
        }
    }
    Ok(())
}

/// A table view bound to one snapshot (or to the empty table).
#[derive(Debug, Clone)]
pub struct MemTable {
    identifier: TableIdentifier,
    state: Arc<RwLock<TableState>>,
    options: BTreeMap<String, String>,
    snapshot: Option<Snapshot>,
    row_type: Arc<RowType>,
}

impl MemTable {
    fn bind(
        identifier: TableIdentifier,
        state: Arc<RwLock<TableState>>,
        options: BTreeMap<String, String>,
    ) -> Result<Self> {
        let (snapshot, row_type) = {
            let guard = state.read().expect("MemTable state read lock poisoned");
            let snapshot = select_snapshot(&guard, &options)?;
            let schema_id = snapshot
                .as_ref()
                .map_or_else(|| guard.latest_schema_id(), |s| s.schema_id);
            (snapshot, guard.schema(schema_id)?)
        };
        Ok(Self {
            identifier,
            state,
            options,
            snapshot,
            row_type,
        })
    }

    /// Fresh view of the latest snapshot, keeping this view's options other
    /// than time travel.
    pub fn refresh(&self) -> Result<MemTable> {
        let mut options = self.options.clone();
        options.remove(SCAN_SNAPSHOT_ID);
        options.remove(SCAN_TIMESTAMP_MILLIS);
        MemTable::bind(self.identifier.clone(), Arc::clone(&self.state), options)
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Every committed snapshot, oldest first.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.state
            .read()
            .expect("MemTable state read lock poisoned")
            .snapshots
            .clone()
    }

    pub fn descriptor(&self) -> Result<Vec<u8>> {
        TableDescriptor::for_table(self).encode()
    }

    /// Commit `rows` as one new data file, stamped with the current time.
    pub fn commit(&self, rows: Vec<Vec<StorageValue>>) -> Result<SnapshotId> {
        let now = OffsetDateTime::now_utc();
        let millis = (now.unix_timestamp_nanos() / 1_000_000) as i64;
        self.commit_at(rows, millis)
    }

    /// Commit `rows` as one new data file with an explicit commit time.
    ///
    /// Rows are written under the table's latest schema and must match it
    /// field for field.
    pub fn commit_at(
        &self,
        rows: Vec<Vec<StorageValue>>,
        commit_millis: i64,
    ) -> Result<SnapshotId> {
        let mut state = self
            .state
            .write()
            .expect("MemTable state write lock poisoned");
        let schema_id = state.latest_schema_id();
        let schema = state.schema(schema_id)?;
        for row in &rows {
            check_row(&schema, row)?;
        }
        if let Some(last) = state.snapshots.last()
            && commit_millis < last.commit_millis
        {
            return Err(Error::InvalidArgumentError(format!(
                "commit time {commit_millis} precedes snapshot {} at {}",
                last.id, last.commit_millis
            )));
        }

        let file_id = state.next_file_id;
        state.next_file_id += 1;
        state.files.insert(file_id, Arc::new(DataFile { schema_id, rows }));

        let mut files = state
            .snapshots
            .last()
            .map(|s| s.files.clone())
            .unwrap_or_default();
        files.push(file_id);
        let id = state.snapshots.len() as SnapshotId + 1;
        state.snapshots.push(Snapshot {
            id,
            schema_id,
            commit_millis,
            files,
        });
        debug!(table = %self.identifier, snapshot = id, file = file_id, "committed data file");
        Ok(id)
    }

    /// Install a new schema version.
    ///
    /// Field IDs are the identity of a column: a field keeping its ID keeps
    /// its data, a new ID starts out null for existing files. IDs of dropped
    /// fields are never reused.
    pub fn alter_schema(&self, schema: RowType) -> Result<SchemaId> {
        validate_schema(&schema)?;
        let mut state = self
            .state
            .write()
            .expect("MemTable state write lock poisoned");
        let retired: FxHashSet<FieldId> = state
            .schemas
            .iter()
            .flat_map(|s| s.fields().iter().map(|f| f.id))
            .collect();
        let current = state.schema(state.latest_schema_id())?;
        for field in schema.fields() {
            if retired.contains(&field.id) && current.field_by_id(field.id).is_none() {
                return Err(Error::InvalidArgumentError(format!(
                    "field id {} belonged to a dropped column",
                    field.id
                )));
            }
        }
        state.schemas.push(Arc::new(schema));
        let id = state.latest_schema_id();
        debug!(table = %self.identifier, schema = id, "altered schema");
        Ok(id)
    }

    /// Append a column with a fresh field ID.
    pub fn add_column(&self, name: impl Into<String>, data_type: DataType) -> Result<SchemaId> {
        let (current, next_id) = {
            let state = self
                .state
                .read()
                .expect("MemTable state read lock poisoned");
            let current = state.schema(state.latest_schema_id())?;
            let next_id = state
                .schemas
                .iter()
                .filter_map(|s| s.highest_field_id())
                .max()
                .map_or(0, |id| id + 1);
            (current, next_id)
        };
        let mut fields = current.fields().to_vec();
        fields.push(DataField::new(next_id, name, data_type));
        self.alter_schema(RowType::new(fields))
    }
}

fn check_row(schema: &RowType, row: &[StorageValue]) -> Result<()> {
    if row.len() != schema.field_count() {
        return Err(Error::InvalidArgumentError(format!(
            "row has {} values, schema has {} fields",
            row.len(),
            schema.field_count()
        )));
    }
    for (field, value) in schema.fields().iter().zip(row) {
        if value.is_null() && !field.data_type.is_nullable() {
            return Err(Error::InvalidArgumentError(format!(
                "null written to NOT NULL field '{}'",
                field.name
            )));
        }
    }
    Ok(())
}

fn parse_option<T: std::str::FromStr>(
    options: &BTreeMap<String, String>,
    key: &str,
) -> Result<Option<T>> {
    options
        .get(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| {
                Error::InvalidArgumentError(format!("option {key} has invalid value '{raw}'"))
            })
        })
        .transpose()
}

fn select_snapshot(
    state: &TableState,
    options: &BTreeMap<String, String>,
) -> Result<Option<Snapshot>> {
    let by_id = parse_option::<SnapshotId>(options, SCAN_SNAPSHOT_ID)?;
    let by_time = parse_option::<i64>(options, SCAN_TIMESTAMP_MILLIS)?;
    match (by_id, by_time) {
        (Some(_), Some(_)) => Err(Error::InvalidArgumentError(format!(
            "only one of {SCAN_SNAPSHOT_ID} and {SCAN_TIMESTAMP_MILLIS} may be set"
        ))),
        (Some(id), None) => state.snapshot(id).cloned().map(Some).ok_or_else(|| {
            Error::InvalidArgumentError(format!("snapshot {id} does not exist"))
        }),
        (None, Some(millis)) => state
            .snapshots
            .iter()
            .rev()
            .find(|s| s.commit_millis <= millis)
            .cloned()
            .map(Some)
            .ok_or_else(|| {
                Error::InvalidArgumentError(format!("no snapshot committed at or before {millis}"))
            }),
        (None, None) => Ok(state.snapshots.last().cloned()),
    }
}

impl StorageTable for MemTable {
    fn identifier(&self) -> &TableIdentifier {
        &self.identifier
    }

    fn row_type(&self) -> &RowType {
        &self.row_type
    }

    fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    fn snapshot_id(&self) -> Option<SnapshotId> {
        self.snapshot.as_ref().map(|s| s.id)
    }

    fn copy_with_options(
        &self,
        options: &BTreeMap<String, String>,
    ) -> Result<Arc<dyn StorageTable>> {
        let mut merged = self.options.clone();
        // Time travel keys replace each other so a later pin wins.
        if options.contains_key(SCAN_SNAPSHOT_ID) || options.contains_key(SCAN_TIMESTAMP_MILLIS) {
            merged.remove(SCAN_SNAPSHOT_ID);
            merged.remove(SCAN_TIMESTAMP_MILLIS);
        }
        merged.extend(options.iter().map(|(k, v)| (k.clone(), v.clone())));
        let table = MemTable::bind(self.identifier.clone(), Arc::clone(&self.state), merged)?;
        Ok(Arc::new(table))
    }

    fn splits(&self) -> Result<Vec<Split>> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(Vec::new());
        };
        let state = self
            .state
            .read()
            .expect("MemTable state read lock poisoned");
        snapshot
            .files
            .iter()
            .map(|file_id| {
                let file = state
                    .files
                    .get(file_id)
                    .ok_or_else(|| Error::Internal(format!("data file {file_id} is missing")))?;
                Ok(Split {
                    table: self.identifier.clone(),
                    snapshot_id: snapshot.id,
                    file_id: *file_id,
                    schema_id: file.schema_id,
                    row_count: file.rows.len(),
                })
            })
            .collect()
    }

    fn create_reader(&self, split: &Split, spec: &ReadSpec) -> Result<Box<dyn RecordReader>> {
        let (file, file_schema) = {
            let state = self
                .state
                .read()
                .expect("MemTable state read lock poisoned");
            let file = state.files.get(&split.file_id).cloned().ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("data file {} not found", split.file_id),
                ))
            })?;
            let schema = state.schema(file.schema_id)?;
            (file, schema)
        };

        // Requested fields of the bound schema, located in the file by ID.
        let requested: Vec<FieldId> = match &spec.projection {
            None => self.row_type.fields().iter().map(|f| f.id).collect(),
            Some(indices) => indices
                .iter()
                .map(|&idx| {
                    self.row_type.field(idx).map(|f| f.id).ok_or_else(|| {
                        Error::InvalidArgumentError(format!(
                            "projection index {idx} out of range for {} fields",
                            self.row_type.field_count()
                        ))
                    })
                })
                .collect::<Result<_>>()?,
        };
        let positions: Vec<usize> = requested
            .iter()
            .filter_map(|id| file_schema.field_by_id(*id).map(|(pos, _)| pos))
            .collect();
        let output_schema = Arc::new(file_schema.project(&positions));
        trace!(
            table = %self.identifier,
            file = split.file_id,
            fields = positions.len(),
            "opened data file reader"
        );

        Ok(Box::new(MemRecordReader {
            file: Some(file),
            file_schema,
            output_schema,
            positions,
            filter: spec.filter.clone(),
            cursor: 0,
        }))
    }
}

struct MemRecordReader {
    file: Option<Arc<DataFile>>,
    file_schema: Arc<RowType>,
    output_schema: Arc<RowType>,
    positions: Vec<usize>,
    filter: Option<Expr>,
    cursor: usize,
}

impl MemRecordReader {
    fn keep(&self, row: &[StorageValue]) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };
        let schema = &self.file_schema;
        filter.matches(&|id: FieldId| {
            schema
                .field_by_id(id)
                .and_then(|(pos, _)| row.get(pos))
        })
    }
}

impl RecordReader for MemRecordReader {
    fn next_row(&mut self) -> Result<Option<StorageRow>> {
        let Some(file) = self.file.clone() else {
            return Err(Error::InvalidState("reader is closed".into()));
        };
        while let Some(row) = file.rows.get(self.cursor) {
            self.cursor += 1;
            if !self.keep(row) {
                continue;
            }
            let values = self.positions.iter().map(|&pos| row[pos].clone()).collect();
            return Ok(Some(StorageRow {
                schema: Arc::clone(&self.output_schema),
                values,
            }));
        }
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        self.file = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colbridge_expr::{Filter, Operator};
    use colbridge_types::TypeKind;

    fn ident() -> TableIdentifier {
        TableIdentifier::new("db", "t")
    }

    fn base_schema() -> RowType {
        RowType::new(vec![
            DataField::new(0, "a", TypeKind::Int.not_null()),
            DataField::new(1, "b", TypeKind::TinyInt.nullable()),
        ])
    }

    fn read_all(table: &dyn StorageTable, spec: &ReadSpec) -> Vec<StorageRow> {
        let mut out = Vec::new();
        for split in table.splits().unwrap() {
            let mut reader = table.create_reader(&split, spec).unwrap();
            while let Some(row) = reader.next_row().unwrap() {
                out.push(row);
            }
            reader.close().unwrap();
        }
        out
    }

    #[test]
    fn old_files_keep_their_schema() {
        let catalog = MemCatalog::new();
        let table = catalog.create_table(ident(), base_schema()).unwrap();
        table
            .commit_at(vec![vec![StorageValue::Int(1), StorageValue::TinyInt(5)]], 10)
            .unwrap();
        table.add_column("c", TypeKind::SmallInt.nullable()).unwrap();
        let latest = table.refresh().unwrap();
        latest
            .commit_at(
                vec![vec![
                    StorageValue::Int(2),
                    StorageValue::TinyInt(6),
                    StorageValue::SmallInt(1),
                ]],
                20,
            )
            .unwrap();

        let latest = latest.refresh().unwrap();
        assert_eq!(latest.row_type().field_names(), vec!["a", "b", "c"]);
        let rows = read_all(&latest, &ReadSpec::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].schema.field_names(), vec!["a", "b"]);
        assert_eq!(rows[1].values.len(), 3);
    }

    #[test]
    fn projection_and_filter_use_field_ids() {
        let catalog = MemCatalog::new();
        let table = catalog.create_table(ident(), base_schema()).unwrap();
        table
            .commit_at(
                vec![
                    vec![StorageValue::Int(1), StorageValue::TinyInt(5)],
                    vec![StorageValue::Int(2), StorageValue::Null],
                ],
                10,
            )
            .unwrap();
        let table = table.refresh().unwrap();
        let spec = table
            .new_read_builder()
            .with_projection(vec![1, 0])
            .with_filter(Expr::Pred(Filter::new(
                1,
                "b",
                Operator::IsNotNull,
            )))
            .build();
        let rows = read_all(&table, &spec);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].schema.field_names(), vec!["b", "a"]);
        assert_eq!(rows[0].values, vec![StorageValue::TinyInt(5), StorageValue::Int(1)]);
    }

    #[test]
    fn time_travel_options() {
        let catalog = MemCatalog::new();
        let table = catalog.create_table(ident(), base_schema()).unwrap();
        table.commit_at(vec![vec![StorageValue::Int(1), StorageValue::Null]], 100).unwrap();
        table.commit_at(vec![vec![StorageValue::Int(2), StorageValue::Null]], 200).unwrap();
        let latest = table.refresh().unwrap();
        assert_eq!(latest.snapshot_id(), Some(2));

        let pinned = latest
            .copy_with_options(&BTreeMap::from([(SCAN_SNAPSHOT_ID.to_string(), "1".to_string())]))
            .unwrap();
        assert_eq!(pinned.snapshot_id(), Some(1));
        assert_eq!(read_all(pinned.as_ref(), &ReadSpec::default()).len(), 1);

        let as_of = latest
            .copy_with_options(&BTreeMap::from([(
                SCAN_TIMESTAMP_MILLIS.to_string(),
                "199".to_string(),
            )]))
            .unwrap();
        assert_eq!(as_of.snapshot_id(), Some(1));

        let too_early = latest.copy_with_options(&BTreeMap::from([(
            SCAN_TIMESTAMP_MILLIS.to_string(),
            "5".to_string(),
        )]));
        assert!(too_early.is_err());

        let both = catalog.table_with_options(
            &ident(),
            BTreeMap::from([
                (SCAN_TIMESTAMP_MILLIS.to_string(), "150".to_string()),
                (SCAN_SNAPSHOT_ID.to_string(), "1".to_string()),
            ]),
        );
        assert!(matches!(both, Err(Error::InvalidArgumentError(_))));
    }

    #[test]
    fn resolver_reports_corrupt_descriptors() {
        let catalog = MemCatalog::new();
        let table = catalog.create_table(ident(), base_schema()).unwrap();
        let resolved = catalog.resolve(&table.descriptor().unwrap()).unwrap();
        assert_eq!(resolved.identifier(), &ident());

        let unknown = TableDescriptor::new(TableIdentifier::new("db", "missing"))
            .encode()
            .unwrap();
        assert!(matches!(
            catalog.resolve(&unknown),
            Err(Error::DescriptorCorrupt(_))
        ));
    }

    #[test]
    fn rejects_bad_rows_and_reused_ids() {
        let catalog = MemCatalog::new();
        let table = catalog.create_table(ident(), base_schema()).unwrap();
        assert!(table.commit_at(vec![vec![StorageValue::Null, StorageValue::Null]], 1).is_err());
        assert!(table.commit_at(vec![vec![StorageValue::Int(1)]], 1).is_err());

        table
            .alter_schema(RowType::new(vec![DataField::new(0, "a", TypeKind::Int.not_null())]))
            .unwrap();
        let reuse = RowType::new(vec![
            DataField::new(0, "a", TypeKind::Int.not_null()),
            DataField::new(1, "b2", TypeKind::Int.nullable()),
        ]);
        assert!(table.alter_schema(reuse).is_err());
    }

    #[test]
    fn closed_reader_refuses_reads() {
        let catalog = MemCatalog::new();
        let table = catalog.create_table(ident(), base_schema()).unwrap();
        table.commit_at(vec![vec![StorageValue::Int(1), StorageValue::Null]], 1).unwrap();
        let table = table.refresh().unwrap();
        let split = table.splits().unwrap().remove(0);
        let bytes = split.to_bytes().unwrap();
        assert_eq!(table.decode_split(&bytes).unwrap(), split);
        let mut reader = table.create_reader(&split, &ReadSpec::default()).unwrap();
        reader.close().unwrap();
        assert!(matches!(reader.next_row(), Err(Error::InvalidState(_))));
    }
}
