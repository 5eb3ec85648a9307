use std::hash::{DefaultHasher, Hash, Hasher};
use std::ops::Bound;

use colbridge::expr::{TupleDomain, ValueSet};
use colbridge::storage::StorageTable;
use colbridge::translation::{Projection, resolve_projection};
use colbridge::types::{ColumnHandle, DecimalValue, EngineValue, Timestamp};
use colbridge::{
    Error, PageSourceProvider, PageSourceState, SessionOptions, TableHandle, apply_filter,
    apply_projection,
};
use colbridge_test_utils::{
    ALL_TYPES_COLUMNS, AllTypesFixture, all_types_expected_rows, all_types_table,
    init_tracing_for_tests,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

fn hash_of(handle: &TableHandle) -> u64 {
    let mut hasher = DefaultHasher::new();
    handle.hash(&mut hasher);
    hasher.finish()
}

fn column(fixture: &AllTypesFixture, name: &str) -> ColumnHandle {
    fixture
        .handle
        .column_handle(fixture.catalog.as_ref(), name)
        .unwrap()
}

fn read_all(
    fixture: &AllTypesFixture,
    session: &SessionOptions,
    handle: &TableHandle,
    columns: &[ColumnHandle],
) -> Vec<Vec<String>> {
    let provider = PageSourceProvider::new(fixture.catalog.clone());
    let mut rows = Vec::new();
    for split in fixture.table.splits().unwrap() {
        let bytes = split.to_bytes().unwrap();
        let mut source = provider
            .create_page_source(session, &bytes, handle, columns)
            .unwrap();
        while let Some(page) = source.next_page().unwrap() {
            for row in 0..page.num_rows() {
                rows.push(page.render_row(row).unwrap());
            }
        }
        assert_eq!(source.state(), PageSourceState::Exhausted);
    }
    rows
}

#[test]
fn handle_survives_the_wire() {
    init_tracing_for_tests();
    let fixture = all_types_table().unwrap();
    let filter = TupleDomain::with_column_domains([
        (
            column(&fixture, "decimal"),
            ValueSet::range(
                Bound::Included(EngineValue::Decimal(DecimalValue::new(5, 2).unwrap())),
                Bound::Unbounded,
            ),
        ),
        (
            column(&fixture, "timestamp_3"),
            ValueSet::Equals(EngineValue::Timestamp(Timestamp::from_epoch_millis(
                1_694_505_288_001,
            ))),
        ),
        (
            column(&fixture, "varchar"),
            ValueSet::In(vec![
                EngineValue::Varchar("varchar1".into()),
                EngineValue::Varchar("other".into()),
            ]),
        ),
        (column(&fixture, "smallint"), ValueSet::IsNull),
        (column(&fixture, "array"), ValueSet::IsNotNull),
    ]);
    let handle = fixture
        .handle
        .with_filter(filter)
        .with_projection(Some(vec![column(&fixture, "row"), column(&fixture, "int")]));

    let decoded = TableHandle::from_bytes(&handle.to_bytes().unwrap()).unwrap();
    assert_eq!(decoded, handle);
    assert_eq!(hash_of(&decoded), hash_of(&handle));
    assert!(!decoded.is_resolved());
    assert_eq!(
        decoded.column_metadatas(fixture.catalog.as_ref()).unwrap(),
        handle.column_metadatas(fixture.catalog.as_ref()).unwrap()
    );

    let unfiltered = TableHandle::from_bytes(&fixture.handle.to_bytes().unwrap()).unwrap();
    assert_ne!(unfiltered, handle);
    assert!(unfiltered.filter().is_all());
    assert!(unfiltered.projection().is_none());
}

#[test]
fn projections_keep_requested_order() {
    let fixture = all_types_table().unwrap();
    let row_type = fixture.table.row_type();
    let mut rng = StdRng::seed_from_u64(19);

    let everything: Vec<String> = ALL_TYPES_COLUMNS.iter().map(|c| c.to_string()).collect();
    assert_eq!(
        resolve_projection(row_type, &everything).unwrap(),
        Projection::Full
    );

    for _ in 0..50 {
        let mut names = everything.clone();
        names.shuffle(&mut rng);
        names.truncate(rng.random_range(1..=names.len()));

        let projection = resolve_projection(row_type, &names).unwrap();
        let indices = projection.indices(row_type);
        let resolved: Vec<&str> = indices
            .iter()
            .map(|&idx| row_type.fields()[idx].name.as_str())
            .collect();
        assert_eq!(resolved, names);
        assert_eq!(projection.is_full(), names == everything);
    }

    let err = resolve_projection(row_type, &["int".into(), "missing".into()]).unwrap_err();
    assert!(matches!(err, Error::UnknownColumn { .. }), "{err:?}");
}

#[test]
fn planner_pushdown_reaches_the_reader() {
    init_tracing_for_tests();
    let fixture = all_types_table().unwrap();
    let catalog = fixture.catalog.as_ref();
    let smallint = column(&fixture, "smallint");
    let constraint = TupleDomain::with_column_domains([
        (smallint.clone(), ValueSet::Equals(EngineValue::SmallInt(1))),
        (
            ColumnHandle::new("dropped_column", smallint.logical_type().clone()),
            ValueSet::IsNull,
        ),
    ]);

    let applied = apply_filter(&fixture.handle, catalog, constraint.clone())
        .unwrap()
        .expect("filter changes the handle");
    assert_eq!(applied.remaining, constraint);
    assert_eq!(applied.handle.filter().domains().map(|d| d.len()), Some(1));
    assert!(
        apply_filter(&applied.handle, catalog, constraint.clone())
            .unwrap()
            .is_none()
    );

    let requested = [column(&fixture, "row"), smallint.clone(), column(&fixture, "row")];
    let handle = apply_projection(&applied.handle, catalog, &requested)
        .unwrap()
        .expect("projection changes the handle");
    let projected = handle.projection().unwrap().to_vec();
    assert_eq!(projected, vec![requested[0].clone(), smallint]);

    let rows = read_all(&fixture, &SessionOptions::new(), &handle, &projected);
    assert_eq!(rows, vec![vec!["[1, 1]".to_string(), "1".to_string()]]);
}

#[test]
fn evolved_rows_read_back_exactly() {
    let fixture = all_types_table().unwrap();
    let columns = fixture
        .handle
        .column_handles(fixture.catalog.as_ref())
        .unwrap();
    let rows = read_all(&fixture, &SessionOptions::new(), &fixture.handle, &columns);
    assert_eq!(rows, all_types_expected_rows());

    // Fields added after a file was written read as null.
    let smallint = ALL_TYPES_COLUMNS
        .iter()
        .position(|c| *c == "smallint")
        .unwrap();
    assert_eq!(
        rows.iter().map(|r| r[smallint].as_str()).collect::<Vec<_>>(),
        ["null", "null", "1"]
    );
}

#[test]
fn conflicting_time_travel_options_are_rejected() {
    let fixture = all_types_table().unwrap();
    let session = SessionOptions::from_properties([
        ("scan_snapshot_id", "1"),
        ("scan_timestamp_millis", "1500"),
    ])
    .unwrap();
    let provider = PageSourceProvider::new(fixture.catalog.clone());
    let split = fixture.table.splits().unwrap().remove(0).to_bytes().unwrap();
    let columns = vec![column(&fixture, "int")];

    let err = provider
        .create_page_source(&session, &split, &fixture.handle, &columns)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgumentError(_)), "{err:?}");
}
