//! The evolving all-types table.
//!
//! `default.t100` starts without its `smallint` column. Two rows are
//! committed, the column is added (third position, fresh field id), and a
//! third row carrying `smallint = 1` is committed. Every other column holds
//! the same value in all three rows.

use std::sync::Arc;

use colbridge_result::Result;
use colbridge_storage::{MemCatalog, MemTable, TableIdentifier};
use colbridge_table::TableHandle;
use colbridge_types::{
    DataField, DecimalValue, RowType, StorageTimestamp, StorageValue, TypeKind,
};

/// Columns of the current schema, in schema order.
pub const ALL_TYPES_COLUMNS: [&str; 19] = [
    "boolean",
    "tinyint",
    "smallint",
    "int",
    "bigint",
    "float",
    "double",
    "char",
    "varchar",
    "date",
    "timestamp_0",
    "timestamp_3",
    "timestamp_6",
    "timestamp_tz",
    "decimal",
    "varbinary",
    "array",
    "map",
    "row",
];

/// Field id given to `smallint` when it is added.
pub const SMALLINT_FIELD_ID: u32 = 19;

/// 2023-09-12T07:54:48Z in epoch milliseconds.
const LOCAL_MILLIS: i64 = 1_694_505_288_000;
/// 2023-09-11T23:54:48Z in epoch milliseconds.
const ZONED_MILLIS: i64 = 1_694_476_488_000;

pub struct AllTypesFixture {
    pub catalog: Arc<MemCatalog>,
    pub table: MemTable,
    pub handle: TableHandle,
}

fn original_fields() -> Vec<DataField> {
    let int = || TypeKind::Int.nullable();
    vec![
        DataField::new(0, "boolean", TypeKind::Boolean.nullable()),
        DataField::new(1, "tinyint", TypeKind::TinyInt.nullable()),
        DataField::new(3, "int", int()),
        DataField::new(4, "bigint", TypeKind::BigInt.nullable()),
        DataField::new(5, "float", TypeKind::Float.nullable()),
        DataField::new(6, "double", TypeKind::Double.nullable()),
        DataField::new(7, "char", TypeKind::Char(10).nullable()),
        DataField::new(8, "varchar", TypeKind::VarChar(10).nullable()),
        DataField::new(9, "date", TypeKind::Date.nullable()),
        DataField::new(10, "timestamp_0", TypeKind::Timestamp(0).nullable()),
        DataField::new(11, "timestamp_3", TypeKind::Timestamp(3).nullable()),
        DataField::new(12, "timestamp_6", TypeKind::Timestamp(6).nullable()),
        DataField::new(13, "timestamp_tz", TypeKind::LocalZonedTimestamp(3).nullable()),
        DataField::new(
            14,
            "decimal",
            TypeKind::Decimal {
                precision: 10,
                scale: 5,
            }
            .nullable(),
        ),
        DataField::new(15, "varbinary", TypeKind::VarBinary(10).nullable()),
        DataField::new(16, "array", TypeKind::Array(Box::new(int())).nullable()),
        DataField::new(
            17,
            "map",
            TypeKind::Map {
                key: Box::new(TypeKind::Int.not_null()),
                value: Box::new(int()),
            }
            .nullable(),
        ),
        DataField::new(
            18,
            "row",
            TypeKind::Row(vec![DataField::new(0, "a", int()), DataField::new(1, "b", int())])
                .nullable(),
        ),
    ]
}

/// One row of the table. `smallint` is `None` for rows written before the
/// column existed.
fn row(smallint: Option<i16>) -> Result<Vec<StorageValue>> {
    let one = || StorageValue::Int(1);
    let mut values = vec![
        StorageValue::Boolean(true),
        StorageValue::TinyInt(1),
        one(),
        StorageValue::BigInt(1),
        StorageValue::Float(1.0),
        StorageValue::Double(1.0),
        StorageValue::from("char1"),
        StorageValue::from("varchar1"),
        StorageValue::Date(0),
        StorageValue::Timestamp(StorageTimestamp::from_epoch_millis(LOCAL_MILLIS)),
        StorageValue::Timestamp(StorageTimestamp::from_epoch_millis(LOCAL_MILLIS + 1)),
        StorageValue::Timestamp(StorageTimestamp::new(LOCAL_MILLIS + 1, 1_000)),
        StorageValue::Timestamp(StorageTimestamp::from_epoch_millis(ZONED_MILLIS + 2)),
        StorageValue::Decimal(DecimalValue::new(10_000, 5)?),
        StorageValue::Binary(vec![1, 2, 3]),
        StorageValue::Array(vec![one(), one(), one()]),
        StorageValue::Map(vec![(one(), one())]),
        StorageValue::Row(vec![one(), one()]),
    ];
    if let Some(value) = smallint {
        values.insert(2, StorageValue::SmallInt(value));
    }
    Ok(values)
}

/// Build `default.t100` in a fresh catalog.
pub fn all_types_table() -> Result<AllTypesFixture> {
    let catalog = Arc::new(MemCatalog::new());
    let identifier = TableIdentifier::new("default", "t100");
    let table = catalog.create_table(identifier, RowType::new(original_fields()))?;
    table.commit_at(vec![row(None)?], LOCAL_MILLIS)?;
    table.commit_at(vec![row(None)?], LOCAL_MILLIS + 1_000)?;

    let mut evolved = original_fields();
    evolved.insert(
        2,
        DataField::new(SMALLINT_FIELD_ID, "smallint", TypeKind::SmallInt.nullable()),
    );
    table.alter_schema(RowType::new(evolved))?;
    table.commit_at(vec![row(Some(1))?], LOCAL_MILLIS + 2_000)?;

    let table = table.refresh()?;
    let handle = TableHandle::new("default", "t100", table.descriptor()?);
    Ok(AllTypesFixture {
        catalog,
        table,
        handle,
    })
}

/// Rendered rows a full scan of `default.t100` returns, in commit order.
pub fn all_types_expected_rows() -> Vec<Vec<String>> {
    [None, None, Some("1")]
        .into_iter()
        .map(|smallint| {
            [
                "true",
                "1",
                smallint.unwrap_or("null"),
                "1",
                "1",
                "1.0",
                "1.0",
                "char1",
                "varchar1",
                "1970-01-01",
                "2023-09-12T07:54:48",
                "2023-09-12T07:54:48.001",
                "2023-09-12T07:54:48.001001",
                "2023-09-11T23:54:48.002Z[UTC]",
                "0.10000",
                "010203",
                "[1, 1, 1]",
                "{1=1}",
                "[1, 1]",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect()
        })
        .collect()
}
