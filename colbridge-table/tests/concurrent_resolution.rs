use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use colbridge_result::Result;
use colbridge_storage::{MemCatalog, StorageTable, TableIdentifier, TableResolver};
use colbridge_table::{SessionOptions, TableHandle};
use colbridge_types::{DataField, RowType, StorageValue, TypeKind};

struct CountingResolver {
    catalog: MemCatalog,
    calls: AtomicUsize,
}

impl TableResolver for CountingResolver {
    fn resolve(&self, descriptor: &[u8]) -> Result<Arc<dyn StorageTable>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.catalog.resolve(descriptor)
    }
}

fn setup() -> (Arc<CountingResolver>, TableHandle) {
    let catalog = MemCatalog::new();
    let table = catalog
        .create_table(
            TableIdentifier::new("db", "events"),
            RowType::new(vec![DataField::new(0, "v", TypeKind::Int.nullable())]),
        )
        .unwrap();
    table.commit_at(vec![vec![StorageValue::Int(1)]], 1_000).unwrap();
    table.commit_at(vec![vec![StorageValue::Int(2)]], 2_000).unwrap();
    let handle = TableHandle::new("db", "events", table.descriptor().unwrap());
    let resolver = Arc::new(CountingResolver {
        catalog,
        calls: AtomicUsize::new(0),
    });
    (resolver, handle)
}

#[test]
fn concurrent_first_use_observes_one_table() {
    let (resolver, handle) = setup();
    let handle = Arc::new(handle);

    let tables: Vec<_> = (0..8)
        .map(|_| {
            let handle = Arc::clone(&handle);
            let resolver = Arc::clone(&resolver);
            thread::spawn(move || handle.resolve_table(resolver.as_ref()).unwrap())
        })
        .map(|t| t.join().unwrap())
        .collect();

    let first = &tables[0];
    assert!(tables.iter().all(|t| Arc::ptr_eq(t, first)));
    assert!(resolver.calls.load(Ordering::SeqCst) >= 1);

    let before = resolver.calls.load(Ordering::SeqCst);
    handle.resolve_table(resolver.as_ref()).unwrap();
    assert_eq!(resolver.calls.load(Ordering::SeqCst), before);
}

#[test]
fn session_time_travel_rebinds_without_touching_the_memo() {
    let (resolver, handle) = setup();
    let latest = handle.resolve_table(resolver.as_ref()).unwrap();
    assert_eq!(latest.snapshot_id(), Some(2));

    let pinned = handle
        .table_with_dynamic_options(
            resolver.as_ref(),
            &SessionOptions::new().with_scan_snapshot_id(1),
        )
        .unwrap();
    assert_eq!(pinned.snapshot_id(), Some(1));

    let by_time = handle
        .table_with_dynamic_options(
            resolver.as_ref(),
            &SessionOptions::new().with_scan_timestamp_millis(1_500),
        )
        .unwrap();
    assert_eq!(by_time.snapshot_id(), Some(1));

    let unchanged = handle
        .table_with_dynamic_options(resolver.as_ref(), &SessionOptions::new())
        .unwrap();
    assert!(Arc::ptr_eq(&unchanged, &latest));
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
}
