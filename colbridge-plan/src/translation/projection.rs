use colbridge_result::{Error, Result};
use colbridge_types::RowType;
use rustc_hash::FxHashSet;

/// Result of resolving a requested column list against a table schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Projection {
    /// The request is the table's field list in schema order; read everything.
    Full,
    /// Field ordinals in requested output order.
    Fields(Vec<usize>),
}

impl Projection {
    pub fn is_full(&self) -> bool {
        matches!(self, Projection::Full)
    }

    /// Ordinals to read, expanding [`Projection::Full`] against `row_type`.
    pub fn indices(&self, row_type: &RowType) -> Vec<usize> {
        match self {
            Projection::Full => (0..row_type.field_count()).collect(),
            Projection::Fields(indices) => indices.clone(),
        }
    }
}

/// Map `requested` column names to field ordinals of `row_type`.
///
/// Unknown names fail with [`Error::UnknownColumn`] and duplicates with
/// [`Error::InvalidArgumentError`]. A request equal to the schema's field
/// list, in the same order, yields [`Projection::Full`].
pub fn resolve_projection(row_type: &RowType, requested: &[String]) -> Result<Projection> {
    let mut seen = FxHashSet::default();
    let mut indices = Vec::with_capacity(requested.len());
    for name in requested {
        let index = row_type
            .index_of(name)
            .ok_or_else(|| Error::unknown_column(name.as_str(), row_type.field_names()))?;
        if !seen.insert(index) {
            return Err(Error::InvalidArgumentError(format!(
                "column '{name}' requested more than once"
            )));
        }
        indices.push(index);
    }

    let is_full = indices.len() == row_type.field_count()
        && indices.iter().enumerate().all(|(pos, idx)| pos == *idx);
    if is_full {
        Ok(Projection::Full)
    } else {
        Ok(Projection::Fields(indices))
    }
}
