use std::sync::Arc;

use colbridge_plan::translation::{
    FilterConverter, Projection, resolve_projection, storage_to_logical,
};
use colbridge_result::{Error, Result};
use colbridge_storage::TableResolver;
use colbridge_table::{SessionOptions, TableHandle};
use colbridge_types::ColumnHandle;
use tracing::debug;

use crate::page::page_schema;
use crate::source::PageSource;

/// Maximum rows per emitted page unless configured otherwise.
pub const DEFAULT_PAGE_BATCH_SIZE: usize = 1024;

/// Tuning knobs for page sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageSourceOptions {
    pub batch_size: usize,
}

impl Default for PageSourceOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_PAGE_BATCH_SIZE,
        }
    }
}

impl PageSourceOptions {
    /// Set the page size. Zero is raised to one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Creates [`PageSource`]s for splits of handled tables.
#[derive(Clone)]
pub struct PageSourceProvider {
    resolver: Arc<dyn TableResolver>,
    options: PageSourceOptions,
}

impl PageSourceProvider {
    pub fn new(resolver: Arc<dyn TableResolver>) -> Self {
        Self {
            resolver,
            options: PageSourceOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PageSourceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> PageSourceOptions {
        self.options
    }

    /// Page source over `split` producing `columns` in the given order.
    ///
    /// The live table is resolved with the session's time travel options.
    /// Requested columns are matched by name against its schema; a request
    /// for every column in schema order reads without a projection. The
    /// handle's filter is pushed down as far as it converts.
    pub fn create_page_source(
        &self,
        session: &SessionOptions,
        split: &[u8],
        handle: &TableHandle,
        columns: &[ColumnHandle],
    ) -> Result<PageSource> {
        let table = handle.table_with_dynamic_options(self.resolver.as_ref(), session)?;
        let split = table.decode_split(split)?;
        let row_type = table.row_type();

        let names: Vec<String> = columns.iter().map(|c| c.name().to_string()).collect();
        let projection = resolve_projection(row_type, &names)?;
        let indices = projection.indices(row_type);
        let fields = indices
            .iter()
            .map(|&idx| {
                row_type.field(idx).cloned().ok_or_else(|| {
                    Error::Internal(format!("resolved projection index {idx} is out of range"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let types = fields
            .iter()
            .map(|field| storage_to_logical(&field.data_type))
            .collect::<Result<Vec<_>>>()?;
        let output: Vec<ColumnHandle> = fields
            .iter()
            .zip(&types)
            .map(|(field, ty)| ColumnHandle::new(field.name.clone(), ty.clone()))
            .collect();
        let schema = page_schema(&output)?;

        let mut builder = table.new_read_builder();
        if let Projection::Fields(indices) = projection {
            builder = builder.with_projection(indices);
        }
        if let Some(filter) = FilterConverter::new(row_type).convert(handle.filter()) {
            builder = builder.with_filter(filter);
        }
        let read_spec = builder.build();
        debug!(
            table = %handle,
            file = split.file_id,
            snapshot = split.snapshot_id,
            columns = fields.len(),
            "created page source"
        );

        Ok(PageSource::new(
            table,
            split,
            read_spec,
            fields,
            types,
            schema,
            self.options.batch_size,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_is_clamped() {
        assert_eq!(PageSourceOptions::default().batch_size, DEFAULT_PAGE_BATCH_SIZE);
        assert_eq!(PageSourceOptions::default().with_batch_size(0).batch_size, 1);
        assert_eq!(PageSourceOptions::default().with_batch_size(7).batch_size, 7);
    }
}
