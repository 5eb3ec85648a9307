//! Storage wrappers that count reader opens and closes and inject failures.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use colbridge_result::{Error, Result};
use colbridge_storage::{
    ReadSpec, RecordReader, Split, StorageRow, StorageTable, TableIdentifier, TableResolver,
};
use colbridge_types::{RowType, SnapshotId};

/// Reader lifecycle counters shared by every table a resolver hands out.
#[derive(Debug, Default)]
pub struct ReaderStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    repeated_closes: AtomicUsize,
}

impl ReaderStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close calls on readers that were already closed.
    pub fn repeated_closes(&self) -> usize {
        self.repeated_closes.load(Ordering::SeqCst)
    }

    /// Readers opened and not yet closed.
    pub fn live(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Faults {
    fail_open: bool,
    fail_after_rows: Option<usize>,
    fail_close: bool,
}

fn injected(what: &str) -> Error {
    Error::Io(io::Error::other(format!("injected {what} failure")))
}

/// Resolver decorating every table it resolves with a [`TrackingTable`].
pub struct TrackingResolver {
    inner: Arc<dyn TableResolver>,
    stats: Arc<ReaderStats>,
    faults: Faults,
}

impl TrackingResolver {
    pub fn new(inner: Arc<dyn TableResolver>) -> Self {
        Self {
            inner,
            stats: Arc::new(ReaderStats::default()),
            faults: Faults::default(),
        }
    }

    /// Make `create_reader` fail.
    pub fn fail_open(mut self) -> Self {
        self.faults.fail_open = true;
        self
    }

    /// Make readers fail once they have returned `rows` rows.
    pub fn fail_after_rows(mut self, rows: usize) -> Self {
        self.faults.fail_after_rows = Some(rows);
        self
    }

    /// Make reader `close` report an error after releasing.
    pub fn fail_close(mut self) -> Self {
        self.faults.fail_close = true;
        self
    }

    pub fn stats(&self) -> Arc<ReaderStats> {
        Arc::clone(&self.stats)
    }
}

impl TableResolver for TrackingResolver {
    fn resolve(&self, descriptor: &[u8]) -> Result<Arc<dyn StorageTable>> {
        let inner = self.inner.resolve(descriptor)?;
        Ok(Arc::new(TrackingTable {
            inner,
            stats: Arc::clone(&self.stats),
            faults: self.faults,
        }))
    }
}

/// A table whose readers report to a shared [`ReaderStats`].
#[derive(Debug)]
pub struct TrackingTable {
    inner: Arc<dyn StorageTable>,
    stats: Arc<ReaderStats>,
    faults: Faults,
}

impl StorageTable for TrackingTable {
    fn identifier(&self) -> &TableIdentifier {
        self.inner.identifier()
    }

    fn row_type(&self) -> &RowType {
        self.inner.row_type()
    }

    fn options(&self) -> &BTreeMap<String, String> {
        self.inner.options()
    }

    fn snapshot_id(&self) -> Option<SnapshotId> {
        self.inner.snapshot_id()
    }

    fn copy_with_options(
        &self,
        options: &BTreeMap<String, String>,
    ) -> Result<Arc<dyn StorageTable>> {
        Ok(Arc::new(TrackingTable {
            inner: self.inner.copy_with_options(options)?,
            stats: Arc::clone(&self.stats),
            faults: self.faults,
        }))
    }

    fn splits(&self) -> Result<Vec<Split>> {
        self.inner.splits()
    }

    fn create_reader(&self, split: &Split, spec: &ReadSpec) -> Result<Box<dyn RecordReader>> {
        if self.faults.fail_open {
            return Err(injected("open"));
        }
        let inner = self.inner.create_reader(split, spec)?;
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackingReader {
            inner,
            stats: Arc::clone(&self.stats),
            faults: self.faults,
            rows: 0,
            closed: false,
        }))
    }
}

struct TrackingReader {
    inner: Box<dyn RecordReader>,
    stats: Arc<ReaderStats>,
    faults: Faults,
    rows: usize,
    closed: bool,
}

impl RecordReader for TrackingReader {
    fn next_row(&mut self) -> Result<Option<StorageRow>> {
        if self.closed {
            return Err(Error::InvalidState("read from a closed reader".into()));
        }
        if self.faults.fail_after_rows.is_some_and(|limit| self.rows >= limit) {
            return Err(injected("read"));
        }
        let row = self.inner.next_row()?;
        if row.is_some() {
            self.rows += 1;
        }
        Ok(row)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            self.stats.repeated_closes.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
        self.closed = true;
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close()?;
        if self.faults.fail_close {
            return Err(injected("close"));
        }
        Ok(())
    }
}
