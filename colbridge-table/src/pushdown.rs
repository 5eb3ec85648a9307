//! Planner hooks that fold filters and projections into a [`TableHandle`].

use colbridge_expr::TupleDomain;
use colbridge_result::{Error, Result};
use colbridge_storage::TableResolver;
use colbridge_types::ColumnHandle;
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::handle::TableHandle;

/// Outcome of folding a constraint into a handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterApplication {
    pub handle: TableHandle,
    /// What the engine must still evaluate itself. Pushed predicates only
    /// prune, so this is always the full constraint.
    pub remaining: TupleDomain<ColumnHandle>,
}

/// Intersect `constraint` with the handle's filter.
///
/// Constraints on columns the table does not have are discarded. Returns
/// `None` when the filter would not change, so planners can stop iterating.
pub fn apply_filter(
    handle: &TableHandle,
    resolver: &dyn TableResolver,
    constraint: TupleDomain<ColumnHandle>,
) -> Result<Option<FilterApplication>> {
    let table = handle.resolve_table(resolver)?;
    let row_type = table.row_type();
    let known = constraint
        .clone()
        .transform_keys(|column| row_type.field_by_name(column.name()).map(|_| column));

    let filter = handle.filter().intersect(&known);
    if &filter == handle.filter() {
        return Ok(None);
    }
    debug!(table = %handle, %filter, "pushed filter into table handle");
    Ok(Some(FilterApplication {
        handle: handle.with_filter(filter),
        remaining: constraint,
    }))
}

/// Replace the handle's projection with `columns`.
///
/// Every column must exist in the table. Repeated columns keep their first
/// position. Returns `None` when the projection would not change.
pub fn apply_projection(
    handle: &TableHandle,
    resolver: &dyn TableResolver,
    columns: &[ColumnHandle],
) -> Result<Option<TableHandle>> {
    let table = handle.resolve_table(resolver)?;
    let row_type = table.row_type();

    let mut seen = FxHashSet::default();
    let mut projection = Vec::with_capacity(columns.len());
    for column in columns {
        if row_type.field_by_name(column.name()).is_none() {
            return Err(Error::unknown_column(column.name(), row_type.field_names()));
        }
        if seen.insert(column.name()) {
            projection.push(column.clone());
        }
    }

    if handle.projection() == Some(projection.as_slice()) {
        return Ok(None);
    }
    debug!(table = %handle, columns = projection.len(), "pushed projection into table handle");
    Ok(Some(handle.with_projection(Some(projection))))
}
