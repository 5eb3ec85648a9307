//! Page source: pulls rows of one split and emits Arrow pages.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrow::datatypes::SchemaRef;
use colbridge_plan::translation::{FieldResolution, decode_field, resolve_field};
use colbridge_result::{Error, Result};
use colbridge_storage::{ReadSpec, RecordReader, Split, StorageRow, StorageTable};
use colbridge_types::{DataField, EngineValue, LogicalType, RowType};
use tracing::{debug, trace, warn};

use crate::page::Page;

/// Lifecycle of a [`PageSource`].
///
/// `Created -> Opened -> {Exhausted | Closed | Failed}`. `Closed` is also
/// reachable straight from `Created`. The three right-hand states are final.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PageSourceState {
    Created,
    Opened,
    Exhausted,
    Closed,
    Failed,
}

impl PageSourceState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PageSourceState::Exhausted | PageSourceState::Closed | PageSourceState::Failed
        )
    }
}

/// Cross-thread cancellation flag for a [`PageSource`].
///
/// The source checks it before every row it pulls and closes itself once it
/// is set.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Column resolutions for one file schema version.
struct FileLayout {
    schema: Arc<RowType>,
    fields: Vec<FieldResolution>,
}

/// Reads exactly one split and turns its rows into [`Page`]s.
///
/// Driven by a single worker; nothing inside is shared except the live table.
pub struct PageSource {
    table: Arc<dyn StorageTable>,
    split: Split,
    read_spec: ReadSpec,
    /// Current-schema fields in output order.
    fields: Vec<DataField>,
    types: Vec<LogicalType>,
    schema: SchemaRef,
    batch_size: usize,
    reader: Option<Box<dyn RecordReader>>,
    layout: Option<FileLayout>,
    state: PageSourceState,
    end_of_data: bool,
    completed_rows: u64,
    cancel: CancelHandle,
}

impl PageSource {
    pub(crate) fn new(
        table: Arc<dyn StorageTable>,
        split: Split,
        read_spec: ReadSpec,
        fields: Vec<DataField>,
        types: Vec<LogicalType>,
        schema: SchemaRef,
        batch_size: usize,
    ) -> Self {
        Self {
            table,
            split,
            read_spec,
            fields,
            types,
            schema,
            batch_size: batch_size.max(1),
            reader: None,
            layout: None,
            state: PageSourceState::Created,
            end_of_data: false,
            completed_rows: 0,
            cancel: CancelHandle::default(),
        }
    }

    pub fn state(&self) -> PageSourceState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Rows emitted in pages so far.
    pub fn completed_rows(&self) -> u64 {
        self.completed_rows
    }

    pub fn split(&self) -> &Split {
        &self.split
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Open the split's record reader. Opening an open source is a no-op.
    pub fn open(&mut self) -> Result<()> {
        match self.state {
            PageSourceState::Created => {}
            PageSourceState::Opened => return Ok(()),
            state => {
                return Err(Error::InvalidState(format!(
                    "cannot open a page source in state {state:?}"
                )));
            }
        }
        match self.table.create_reader(&self.split, &self.read_spec) {
            Ok(reader) => {
                debug!(
                    table = %self.table.identifier(),
                    file = self.split.file_id,
                    columns = self.fields.len(),
                    projected = self.read_spec.projection.is_some(),
                    filtered = self.read_spec.filter.is_some(),
                    "opened page source"
                );
                self.reader = Some(reader);
                self.state = PageSourceState::Opened;
                Ok(())
            }
            Err(err) => Err(self.fail(Error::read_io(err))),
        }
    }

    /// Next page, or `None` once the split is exhausted or the source was
    /// closed. A source in `Created` state opens itself first.
    pub fn next_page(&mut self) -> Result<Option<Page>> {
        match self.state {
            PageSourceState::Created => self.open()?,
            PageSourceState::Opened => {}
            PageSourceState::Exhausted | PageSourceState::Closed => return Ok(None),
            PageSourceState::Failed => {
                return Err(Error::InvalidState(
                    "page source failed and cannot produce more pages".into(),
                ));
            }
        }
        if self.end_of_data {
            self.finish();
            return Ok(None);
        }

        let mut rows = Vec::with_capacity(self.batch_size);
        while rows.len() < self.batch_size {
            if self.cancel.is_cancelled() {
                debug!(file = self.split.file_id, "page source cancelled");
                self.close();
                return Ok(None);
            }
            let next = match self.reader.as_mut() {
                Some(reader) => reader.next_row(),
                None => Err(Error::InvalidState("page source has no open reader".into())),
            };
            match next {
                Ok(Some(row)) => match self.decode_row(row) {
                    Ok(values) => rows.push(values),
                    Err(err) => return Err(self.fail(err)),
                },
                Ok(None) => {
                    self.end_of_data = true;
                    self.release_reader();
                    break;
                }
                Err(err) => return Err(self.fail(Error::read_io(err))),
            }
        }

        if rows.is_empty() {
            self.finish();
            return Ok(None);
        }
        let page = match Page::from_rows(&self.schema, &self.types, &rows) {
            Ok(page) => page,
            Err(err) => return Err(self.fail(err)),
        };
        self.completed_rows += page.num_rows() as u64;
        trace!(
            file = self.split.file_id,
            rows = page.num_rows(),
            completed = self.completed_rows,
            "emitted page"
        );
        Ok(Some(page))
    }

    /// Release the reader. Safe to call any number of times from any state.
    pub fn close(&mut self) {
        self.release_reader();
        if !self.state.is_terminal() {
            self.state = PageSourceState::Closed;
        }
    }

    fn finish(&mut self) {
        self.release_reader();
        self.state = PageSourceState::Exhausted;
        debug!(
            file = self.split.file_id,
            rows = self.completed_rows,
            "page source exhausted"
        );
    }

    /// Move to `Failed`, releasing the reader before the error surfaces.
    fn fail(&mut self, err: Error) -> Error {
        self.release_reader();
        self.state = PageSourceState::Failed;
        debug!(file = self.split.file_id, error = %err, "page source failed");
        err
    }

    fn release_reader(&mut self) {
        if let Some(mut reader) = self.reader.take()
            && let Err(err) = reader.close()
        {
            warn!(file = self.split.file_id, error = %err, "failed to close record reader");
        }
    }

    fn decode_row(&mut self, row: StorageRow) -> Result<Vec<EngineValue>> {
        let stale = self
            .layout
            .as_ref()
            .is_none_or(|layout| {
                !Arc::ptr_eq(&layout.schema, &row.schema) && *layout.schema != *row.schema
            });
        if stale {
            let fields = self
                .fields
                .iter()
                .map(|field| resolve_field(&row.schema, field))
                .collect::<Result<Vec<_>>>()?;
            self.layout = Some(FileLayout {
                schema: Arc::clone(&row.schema),
                fields,
            });
        }
        let Some(layout) = &self.layout else {
            return Err(Error::Internal("file layout missing after resolution".into()));
        };
        layout
            .fields
            .iter()
            .zip(&self.fields)
            .map(|(resolution, field)| decode_field(resolution, field, &row.values))
            .collect()
    }
}

impl Drop for PageSource {
    fn drop(&mut self) {
        self.release_reader();
    }
}

impl fmt::Debug for PageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageSource")
            .field("table", self.table.identifier())
            .field("split", &self.split)
            .field("state", &self.state)
            .field("completed_rows", &self.completed_rows)
            .finish()
    }
}
