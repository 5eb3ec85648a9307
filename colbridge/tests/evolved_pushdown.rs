//! Pushed filters against files written under older schema versions keep
//! every row the engine-side constraint accepts.

use std::ops::Bound;
use std::sync::Arc;

use colbridge::expr::{TupleDomain, ValueSet};
use colbridge::storage::{MemCatalog, MemTable, StorageTable, TableIdentifier};
use colbridge::translation::FilterConverter;
use colbridge::types::{
    ColumnHandle, DataField, DecimalValue, EngineValue, RowType, StorageValue, TypeKind,
};
use colbridge::{PageSourceProvider, SessionOptions, TableHandle};
use colbridge_test_utils::{all_types_table, init_tracing_for_tests};

fn decimal(raw: i128, scale: u8) -> DecimalValue {
    DecimalValue::new(raw, scale).unwrap()
}

fn original_schema() -> RowType {
    RowType::new(vec![
        DataField::new(0, "id", TypeKind::Int.not_null()),
        DataField::new(1, "n", TypeKind::TinyInt.nullable()),
        DataField::new(
            2,
            "arr",
            TypeKind::Array(Box::new(TypeKind::TinyInt.nullable())).nullable(),
        ),
        DataField::new(
            3,
            "rec",
            TypeKind::Row(vec![DataField::new(10, "x", TypeKind::Int.nullable())]).nullable(),
        ),
        DataField::new(
            4,
            "price",
            TypeKind::Decimal {
                precision: 6,
                scale: 2,
            }
            .nullable(),
        ),
    ])
}

fn widened_schema() -> RowType {
    RowType::new(vec![
        DataField::new(0, "id", TypeKind::Int.not_null()),
        DataField::new(1, "n", TypeKind::Int.nullable()),
        DataField::new(2, "arr", TypeKind::Array(Box::new(TypeKind::Int.nullable())).nullable()),
        DataField::new(
            3,
            "rec",
            TypeKind::Row(vec![
                DataField::new(10, "x", TypeKind::Int.nullable()),
                DataField::new(11, "y", TypeKind::Int.nullable()),
            ])
            .nullable(),
        ),
        DataField::new(
            4,
            "price",
            TypeKind::Decimal {
                precision: 8,
                scale: 2,
            }
            .nullable(),
        ),
        DataField::new(5, "extra", TypeKind::SmallInt.nullable()),
    ])
}

/// `db.evolving`: ids 1-4 written with narrow types, ids 5-8 after widening
/// `n`, `arr`, `rec` and `price` and adding `extra`.
fn evolving_table() -> (Arc<MemCatalog>, MemTable) {
    use StorageValue as V;
    let catalog = Arc::new(MemCatalog::new());
    let id = TableIdentifier::new("db", "evolving");
    let table = catalog.create_table(id.clone(), original_schema()).unwrap();
    let tiny = |v: i8| V::TinyInt(v);
    table
        .commit_at(
            vec![
                vec![
                    V::Int(1),
                    tiny(1),
                    V::Array(vec![tiny(1)]),
                    V::Row(vec![V::Int(1)]),
                    V::Decimal(decimal(150, 2)),
                ],
                vec![
                    V::Int(2),
                    tiny(2),
                    V::Array(vec![tiny(2)]),
                    V::Row(vec![V::Int(2)]),
                    V::Decimal(decimal(250, 2)),
                ],
                vec![V::Int(3), V::Null, V::Null, V::Null, V::Null],
                vec![
                    V::Int(4),
                    tiny(5),
                    V::Array(vec![tiny(1), tiny(2)]),
                    V::Row(vec![V::Int(1)]),
                    V::Decimal(decimal(1_000, 2)),
                ],
            ],
            1_000,
        )
        .unwrap();

    table.alter_schema(widened_schema()).unwrap();
    table
        .commit_at(
            vec![
                vec![
                    V::Int(5),
                    V::Int(1),
                    V::Array(vec![V::Int(1)]),
                    V::Row(vec![V::Int(1), V::Int(7)]),
                    V::Decimal(decimal(150, 2)),
                    V::SmallInt(7),
                ],
                vec![
                    V::Int(6),
                    V::Int(300),
                    V::Array(vec![V::Int(2), V::Int(300)]),
                    V::Row(vec![V::Int(2), V::Null]),
                    V::Decimal(decimal(250, 2)),
                    V::Null,
                ],
                vec![V::Int(7), V::Null, V::Null, V::Null, V::Null, V::SmallInt(7)],
                vec![
                    V::Int(8),
                    V::Int(5),
                    V::Array(vec![V::Int(1)]),
                    V::Row(vec![V::Int(1), V::Int(1)]),
                    V::Decimal(decimal(9_999, 2)),
                    V::SmallInt(1),
                ],
            ],
            2_000,
        )
        .unwrap();
    let table = catalog.table(&id).unwrap();
    (catalog, table)
}

fn read(
    catalog: &Arc<MemCatalog>,
    table: &MemTable,
    handle: &TableHandle,
    columns: &[ColumnHandle],
) -> Vec<Vec<EngineValue>> {
    let provider = PageSourceProvider::new(catalog.clone());
    let mut rows = Vec::new();
    for split in table.splits().unwrap() {
        let bytes = split.to_bytes().unwrap();
        let mut source = provider
            .create_page_source(&SessionOptions::new(), &bytes, handle, columns)
            .unwrap();
        while let Some(page) = source.next_page().unwrap() {
            for row in 0..page.num_rows() {
                rows.push(page.row_values(row).unwrap());
            }
        }
    }
    rows
}

/// Scan once unfiltered and once with `constraint` pushed; every row the
/// constraint accepts must come back from the pushed scan. Returns the number
/// of accepted rows.
fn assert_pushdown_keeps_accepted_rows(
    catalog: &Arc<MemCatalog>,
    table: &MemTable,
    handle: &TableHandle,
    constraint: TupleDomain<ColumnHandle>,
) -> usize {
    let columns = handle.column_handles(catalog.as_ref()).unwrap();
    let all = read(catalog, table, handle, &columns);
    let accepted: Vec<&Vec<EngineValue>> = all
        .iter()
        .filter(|row| {
            constraint.contains_row(|column| {
                columns
                    .iter()
                    .position(|c| c.name() == column.name())
                    .map(|idx| &row[idx])
            })
        })
        .collect();

    let pushed = read(catalog, table, &handle.with_filter(constraint.clone()), &columns);
    for row in &accepted {
        assert!(
            pushed.contains(row),
            "pushing {constraint} lost {row:?}; pushed scan returned {pushed:?}"
        );
    }
    let (_, report) = FilterConverter::new(table.row_type()).convert_with_report(&constraint);
    if report.is_exact() {
        assert_eq!(pushed.len(), accepted.len(), "exact pushdown of {constraint}");
    }
    accepted.len()
}

fn column(handle: &TableHandle, catalog: &MemCatalog, name: &str) -> ColumnHandle {
    handle.column_handle(catalog, name).unwrap()
}

#[test]
fn widened_and_added_columns_filter_soundly() {
    init_tracing_for_tests();
    let (catalog, table) = evolving_table();
    let handle = TableHandle::new("db", "evolving", table.descriptor().unwrap());
    let n = column(&handle, &catalog, "n");
    let arr = column(&handle, &catalog, "arr");
    let rec = column(&handle, &catalog, "rec");
    let price = column(&handle, &catalog, "price");
    let extra = column(&handle, &catalog, "extra");

    let one = |c: &ColumnHandle, values: ValueSet| {
        TupleDomain::with_column_domains([(c.clone(), values)])
    };
    let cases = [
        (one(&n, ValueSet::Equals(EngineValue::Integer(1))), 2),
        (one(&n, ValueSet::greater_than(EngineValue::Integer(1))), 4),
        (one(&n, ValueSet::In(vec![EngineValue::Integer(2), EngineValue::Integer(5)])), 3),
        (one(&n, ValueSet::IsNull), 2),
        (
            one(
                &price,
                ValueSet::range(
                    Bound::Included(EngineValue::Decimal(decimal(150, 2))),
                    Bound::Excluded(EngineValue::Decimal(decimal(1_000, 2))),
                ),
            ),
            4,
        ),
        (one(&price, ValueSet::Equals(EngineValue::Decimal(decimal(25, 1)))), 2),
        (one(&arr, ValueSet::Equals(EngineValue::Array(vec![EngineValue::Integer(1)]))), 3),
        (one(&arr, ValueSet::IsNotNull), 6),
        (
            one(
                &rec,
                ValueSet::Equals(EngineValue::Row(vec![
                    EngineValue::Integer(1),
                    EngineValue::Integer(7),
                ])),
            ),
            1,
        ),
        (one(&extra, ValueSet::IsNull), 5),
        (one(&extra, ValueSet::Equals(EngineValue::SmallInt(7))), 2),
        (
            TupleDomain::with_column_domains([
                (n.clone(), ValueSet::greater_than(EngineValue::Integer(1))),
                (extra.clone(), ValueSet::IsNull),
            ]),
            3,
        ),
    ];
    for (constraint, expected) in cases {
        let accepted = assert_pushdown_keeps_accepted_rows(&catalog, &table, &handle, constraint);
        assert_eq!(accepted, expected);
    }
}

#[test]
fn added_column_filters_on_the_all_types_table() {
    let fixture = all_types_table().unwrap();
    let smallint = column(&fixture.handle, &fixture.catalog, "smallint");
    let cases = [
        (ValueSet::IsNull, 2),
        (ValueSet::IsNotNull, 1),
        (ValueSet::Equals(EngineValue::SmallInt(1)), 1),
        (ValueSet::greater_than(EngineValue::SmallInt(0)), 1),
    ];
    for (values, expected) in cases {
        let constraint = TupleDomain::with_column_domains([(smallint.clone(), values)]);
        let accepted = assert_pushdown_keeps_accepted_rows(
            &fixture.catalog,
            &fixture.table,
            &fixture.handle,
            constraint,
        );
        assert_eq!(accepted, expected);
    }
}
