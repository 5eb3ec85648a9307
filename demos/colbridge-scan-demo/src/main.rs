//! Plans and reads an in-memory table whose schema changes between commits.
//!
//! Run with `RUST_LOG=debug` to watch handles resolve and page sources open.

use std::ops::Bound;
use std::sync::Arc;

use arrow::error::ArrowError;
use arrow::util::pretty::pretty_format_batches;
use colbridge::expr::{TupleDomain, ValueSet};
use colbridge::storage::{MemCatalog, StorageTable, TableIdentifier};
use colbridge::types::{
    ColumnHandle, DataField, DecimalError, DecimalValue, EngineValue, RowType, StorageTimestamp,
    StorageValue, TypeKind,
};
use colbridge::{PageSourceProvider, SessionOptions, TableHandle, apply_filter, apply_projection};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error("table has no column named {0}")]
    MissingColumn(String),
    #[error(transparent)]
    Colbridge(#[from] colbridge::Error),
    #[error(transparent)]
    Arrow(#[from] ArrowError),
    #[error(transparent)]
    Decimal(#[from] DecimalError),
}

type Result<T> = std::result::Result<T, Error>;

const SCHEMA: &str = "demo";
const TABLE: &str = "trips";
const FIRST_COMMIT_MILLIS: i64 = 1_700_000_000_000;

fn trip(id: i32, city: &str, cents: i128, minute: i64) -> Result<Vec<StorageValue>> {
    Ok(vec![
        StorageValue::Int(id),
        StorageValue::String(city.to_string()),
        StorageValue::Decimal(DecimalValue::new(cents, 2)?),
        StorageValue::Timestamp(StorageTimestamp::from_epoch_millis(
            FIRST_COMMIT_MILLIS + minute * 60_000,
        )),
    ])
}

fn build_catalog() -> Result<Arc<MemCatalog>> {
    let catalog = Arc::new(MemCatalog::new());
    let table = catalog.create_table(
        TableIdentifier::new(SCHEMA, TABLE),
        RowType::new(vec![
            DataField::new(0, "id", TypeKind::Int.not_null()),
            DataField::new(1, "city", TypeKind::VarChar(16).nullable()),
            DataField::new(
                2,
                "fare",
                TypeKind::Decimal {
                    precision: 8,
                    scale: 2,
                }
                .nullable(),
            ),
            DataField::new(3, "started_at", TypeKind::Timestamp(3).nullable()),
        ]),
    )?;

    table.commit_at(
        vec![
            trip(1, "Lisbon", 850, 0)?,
            trip(2, "Porto", 1_420, 5)?,
            trip(3, "Faro", 2_310, 9)?,
        ],
        FIRST_COMMIT_MILLIS,
    )?;

    table.add_column("tip", TypeKind::Double.nullable())?;
    let mut late = vec![trip(4, "Lisbon", 1_990, 61)?, trip(5, "Braga", 640, 75)?];
    late[0].push(StorageValue::Double(2.5));
    late[1].push(StorageValue::Null);
    table.commit_at(late, FIRST_COMMIT_MILLIS + 3_600_000)?;
    Ok(catalog)
}

fn column(handle: &TableHandle, catalog: &MemCatalog, name: &str) -> Result<ColumnHandle> {
    handle
        .column_handles(catalog)?
        .into_iter()
        .find(|column| column.name() == name)
        .ok_or_else(|| Error::MissingColumn(name.to_string()))
}

fn print_scan(
    catalog: &Arc<MemCatalog>,
    session: &SessionOptions,
    handle: &TableHandle,
    columns: &[ColumnHandle],
) -> Result<()> {
    let provider = PageSourceProvider::new(catalog.clone());
    let table = handle.table_with_dynamic_options(catalog.as_ref(), session)?;
    let mut batches = Vec::new();
    for split in table.splits()? {
        let mut source =
            provider.create_page_source(session, &split.to_bytes()?, handle, columns)?;
        while let Some(page) = source.next_page()? {
            batches.push(page.into_record_batch());
        }
        info!(
            file = split.file_id,
            rows = source.completed_rows(),
            "split drained"
        );
    }
    println!("{}", pretty_format_batches(&batches)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let catalog = build_catalog()?;
    let table = catalog.table(&TableIdentifier::new(SCHEMA, TABLE))?;
    let handle = TableHandle::new(SCHEMA, TABLE, table.descriptor()?);

    println!("Columns of {handle}:");
    for column in handle.column_metadatas(catalog.as_ref())? {
        println!("  {} {}", column.name, column.logical_type);
    }

    let fare = column(&handle, &catalog, "fare")?;
    let constraint = TupleDomain::with_column_domains([(
        fare.clone(),
        ValueSet::range(
            Bound::Included(EngineValue::Decimal(DecimalValue::new(1_000, 2)?)),
            Bound::Unbounded,
        ),
    )]);
    let handle = match apply_filter(&handle, catalog.as_ref(), constraint)? {
        Some(applied) => {
            println!("\nPushed filter: {}", applied.handle.filter());
            applied.handle
        }
        None => handle,
    };

    let requested = vec![
        column(&handle, &catalog, "city")?,
        column(&handle, &catalog, "tip")?,
        fare,
    ];
    let handle = apply_projection(&handle, catalog.as_ref(), &requested)?.unwrap_or(handle);

    println!("\nLatest snapshot, fare >= 10.00:");
    print_scan(&catalog, &SessionOptions::new(), &handle, &requested)?;

    // The first snapshot predates `tip`, so only the original columns exist there.
    let pinned = SessionOptions::new().with_scan_snapshot_id(1);
    let original = [
        column(&handle, &catalog, "id")?,
        column(&handle, &catalog, "city")?,
    ];
    println!("\nSnapshot 1, fare >= 10.00:");
    print_scan(&catalog, &pinned, &handle, &original)?;
    Ok(())
}
