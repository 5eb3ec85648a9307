use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatchOptions;
use colbridge_result::{Error, Result};
use colbridge_types::{ColumnHandle, EngineValue, LogicalType};

use crate::columnar::{build_array, logical_to_arrow, value_from_array};

/// Arrow schema of the pages produced for `columns`, in the given order.
pub fn page_schema(columns: &[ColumnHandle]) -> Result<SchemaRef> {
    let fields = columns
        .iter()
        .map(|c| Ok(Field::new(c.name(), logical_to_arrow(c.logical_type())?, true)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Arc::new(Schema::new(fields)))
}

/// A batch of rows in columnar layout, one column per requested column.
#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    batch: RecordBatch,
    types: Vec<LogicalType>,
}

impl Page {
    /// Build a page from row-major values. Every row must hold one value per
    /// column of `schema`.
    pub fn from_rows(
        schema: &SchemaRef,
        types: &[LogicalType],
        rows: &[Vec<EngineValue>],
    ) -> Result<Self> {
        if schema.fields().len() != types.len() {
            return Err(Error::Internal(format!(
                "page schema has {} fields but {} types",
                schema.fields().len(),
                types.len()
            )));
        }
        let mut columns: Vec<Vec<EngineValue>> = vec![Vec::with_capacity(rows.len()); types.len()];
        for row in rows {
            if row.len() != types.len() {
                return Err(Error::Internal(format!(
                    "row has {} values for {} columns",
                    row.len(),
                    types.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value.clone());
            }
        }

        let arrays = types
            .iter()
            .zip(&columns)
            .map(|(ty, values)| build_array(ty, values))
            .collect::<Result<Vec<_>>>()?;
        let batch = if arrays.is_empty() {
            let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
            RecordBatch::try_new_with_options(Arc::clone(schema), arrays, &options)?
        } else {
            RecordBatch::try_new(Arc::clone(schema), arrays)?
        };
        Ok(Self {
            batch,
            types: types.to_vec(),
        })
    }

    pub fn record_batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_record_batch(self) -> RecordBatch {
        self.batch
    }

    pub fn types(&self) -> &[LogicalType] {
        &self.types
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn value(&self, row: usize, column: usize) -> Result<EngineValue> {
        if row >= self.num_rows() || column >= self.num_columns() {
            return Err(Error::InvalidArgumentError(format!(
                "cell ({row}, {column}) outside a {}x{} page",
                self.num_rows(),
                self.num_columns()
            )));
        }
        value_from_array(&self.types[column], self.batch.column(column).as_ref(), row)
    }

    /// Values of one row in column order.
    pub fn row_values(&self, row: usize) -> Result<Vec<EngineValue>> {
        (0..self.num_columns())
            .map(|column| self.value(row, column))
            .collect()
    }

    /// Engine text form of one row, column by column.
    pub fn render_row(&self, row: usize) -> Result<Vec<String>> {
        Ok(self
            .row_values(row)?
            .iter()
            .zip(&self.types)
            .map(|(value, ty)| value.render(ty))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_transpose_into_columns() {
        let columns = vec![
            ColumnHandle::new("name", LogicalType::varchar()),
            ColumnHandle::new("score", LogicalType::Double),
        ];
        let schema = page_schema(&columns).unwrap();
        let types: Vec<_> = columns.iter().map(|c| c.logical_type().clone()).collect();
        let page = Page::from_rows(
            &schema,
            &types,
            &[
                vec!["ada".into(), EngineValue::Double(1.5)],
                vec![EngineValue::Null, EngineValue::Double(2.0)],
            ],
        )
        .unwrap();

        assert_eq!(page.num_rows(), 2);
        assert_eq!(page.column_names(), vec!["name", "score"]);
        assert_eq!(page.render_row(0).unwrap(), vec!["ada", "1.5"]);
        assert_eq!(page.row_values(1).unwrap()[0], EngineValue::Null);
        assert!(page.value(2, 0).is_err());
    }

    #[test]
    fn zero_column_pages_keep_row_count() {
        let schema = page_schema(&[]).unwrap();
        let page = Page::from_rows(&schema, &[], &[vec![], vec![], vec![]]).unwrap();
        assert_eq!(page.num_rows(), 3);
        assert_eq!(page.num_columns(), 0);
    }
}
