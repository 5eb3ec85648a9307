//! Pushdown of engine constraints into storage predicates.
//!
//! Each column constraint either translates exactly or is dropped. A dropped
//! constraint widens the pushed predicate, which is always safe because the
//! engine re-applies the original constraint to every row it receives.
//! Nothing here narrows or approximates a constraint.

use std::fmt;
use std::ops::Bound;

use colbridge_expr::{Expr, Filter, Operator, TupleDomain, ValueSet};
use colbridge_types::{ColumnHandle, DataField, EngineValue, LogicalType, RowType};
use tracing::debug;

use super::types::{encode_value, storage_to_logical};

/// Why a column's constraint was left to the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The table schema has no column with this name.
    UnknownColumn,
    /// A value in the constraint has no exact storage representation.
    NotRepresentable(String),
    /// The constraint kind does not apply to the column type.
    Unsupported(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::UnknownColumn => f.write_str("column not in table schema"),
            DropReason::NotRepresentable(msg) => write!(f, "not representable: {msg}"),
            DropReason::Unsupported(msg) => write!(f, "unsupported: {msg}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DroppedConstraint {
    pub column: String,
    pub reason: DropReason,
}

/// Outcome of one conversion: which columns were pushed and which were left
/// for the engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversionReport {
    pub pushed: Vec<String>,
    pub dropped: Vec<DroppedConstraint>,
}

impl ConversionReport {
    /// Whether every constraint made it into the predicate.
    pub fn is_exact(&self) -> bool {
        self.dropped.is_empty()
    }
}

/// Converts engine tuple domains into storage predicates for one schema.
pub struct FilterConverter<'a> {
    row_type: &'a RowType,
}

impl<'a> FilterConverter<'a> {
    pub fn new(row_type: &'a RowType) -> Self {
        Self { row_type }
    }

    /// Convert `domain`, returning `None` when nothing can be pushed.
    pub fn convert(&self, domain: &TupleDomain<ColumnHandle>) -> Option<Expr> {
        self.convert_with_report(domain).0
    }

    /// Convert `domain` and report per-column outcomes.
    pub fn convert_with_report(
        &self,
        domain: &TupleDomain<ColumnHandle>,
    ) -> (Option<Expr>, ConversionReport) {
        let mut report = ConversionReport::default();
        let Some(domains) = domain.domains() else {
            return (self.unsatisfiable(), report);
        };

        let mut leaves = Vec::with_capacity(domains.len());
        for (column, values) in domains {
            match self.convert_column(column, values) {
                Ok(Some(expr)) => {
                    report.pushed.push(column.name.clone());
                    leaves.push(expr);
                }
                Ok(None) => {}
                Err(reason) => {
                    debug!(
                        column = %column.name,
                        %reason,
                        "dropping constraint from pushed predicate"
                    );
                    report.dropped.push(DroppedConstraint {
                        column: column.name.clone(),
                        reason,
                    });
                }
            }
        }
        (Expr::conjunction(leaves), report)
    }

    /// A predicate no row satisfies, for a domain that is already known to be
    /// empty. Without any column to reference, a full scan is still correct.
    fn unsatisfiable(&self) -> Option<Expr> {
        let field = self.row_type.fields().first()?;
        Some(Expr::all_of(vec![
            Filter::new(field.id, field.name.clone(), Operator::IsNull),
            Filter::new(field.id, field.name.clone(), Operator::IsNotNull),
        ]))
    }

    fn convert_column(
        &self,
        column: &ColumnHandle,
        values: &ValueSet,
    ) -> std::result::Result<Option<Expr>, DropReason> {
        let Some(field) = self.row_type.field_by_name(&column.name) else {
            return Err(DropReason::UnknownColumn);
        };
        let logical = storage_to_logical(&field.data_type)
            .map_err(|err| DropReason::NotRepresentable(err.to_string()))?;
        // Nested values in older files keep their written element types and
        // field lists, which do not compare with values encoded today.
        let value_constraint = matches!(
            values,
            ValueSet::Equals(_) | ValueSet::In(_) | ValueSet::Range { .. }
        );
        if value_constraint && logical.is_nested() {
            return Err(DropReason::Unsupported(format!("value constraint on {logical}")));
        }
        let op = match values {
            ValueSet::All => return Ok(None),
            ValueSet::None => {
                return Ok(Some(Expr::all_of(vec![
                    leaf(field, Operator::IsNull),
                    leaf(field, Operator::IsNotNull),
                ])));
            }
            ValueSet::IsNull => Operator::IsNull,
            ValueSet::IsNotNull => Operator::IsNotNull,
            ValueSet::Equals(value) => Operator::Equals(encode(&logical, value)?),
            ValueSet::In(set) => {
                let mut encoded = set
                    .iter()
                    .map(|value| encode(&logical, value))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                match encoded.len() {
                    0 => {
                        return Ok(Some(Expr::all_of(vec![
                            leaf(field, Operator::IsNull),
                            leaf(field, Operator::IsNotNull),
                        ])));
                    }
                    1 => Operator::Equals(encoded.remove(0)),
                    _ => Operator::In(encoded),
                }
            }
            ValueSet::Range { low, high } => range_operator(&logical, low, high)?,
        };
        Ok(Some(Expr::Pred(leaf(field, op))))
    }
}

fn leaf(field: &DataField, op: Operator) -> Filter {
    Filter::new(field.id, field.name.clone(), op)
}

fn encode(
    logical: &LogicalType,
    value: &EngineValue,
) -> std::result::Result<colbridge_types::StorageValue, DropReason> {
    if value.is_null() {
        return Err(DropReason::Unsupported(
            "null inside a value constraint".into(),
        ));
    }
    encode_value(logical, value).map_err(|err| DropReason::NotRepresentable(err.to_string()))
}

fn range_operator(
    logical: &LogicalType,
    low: &Bound<EngineValue>,
    high: &Bound<EngineValue>,
) -> std::result::Result<Operator, DropReason> {
    let encode_bound = |bound: &Bound<EngineValue>| {
        Ok::<_, DropReason>(match bound {
            Bound::Included(v) => Bound::Included(encode(logical, v)?),
            Bound::Excluded(v) => Bound::Excluded(encode(logical, v)?),
            Bound::Unbounded => Bound::Unbounded,
        })
    };
    Ok(match (encode_bound(low)?, encode_bound(high)?) {
        (Bound::Unbounded, Bound::Unbounded) => Operator::IsNotNull,
        (Bound::Included(l), Bound::Included(h)) if l == h => Operator::Equals(l),
        (Bound::Included(l), Bound::Unbounded) => Operator::GreaterThanOrEquals(l),
        (Bound::Excluded(l), Bound::Unbounded) => Operator::GreaterThan(l),
        (Bound::Unbounded, Bound::Included(h)) => Operator::LessThanOrEquals(h),
        (Bound::Unbounded, Bound::Excluded(h)) => Operator::LessThan(h),
        (lower, upper) => Operator::Range { lower, upper },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use colbridge_types::{DecimalValue, StorageValue, Timestamp, TypeKind};
    use time::macros::datetime;

    fn schema() -> RowType {
        RowType::new(vec![
            DataField::new(0, "a", TypeKind::Int.nullable()),
            DataField::new(
                1,
                "price",
                TypeKind::Decimal {
                    precision: 10,
                    scale: 2,
                }
                .nullable(),
            ),
            DataField::new(2, "name", TypeKind::VarChar(5).nullable()),
            DataField::new(3, "ts", TypeKind::Timestamp(3).nullable()),
            DataField::new(
                4,
                "tags",
                TypeKind::Array(Box::new(TypeKind::Int.nullable())).nullable(),
            ),
        ])
    }

    fn col(name: &str, ty: LogicalType) -> ColumnHandle {
        ColumnHandle::new(name, ty)
    }

    #[test]
    fn unconstrained_domain_pushes_nothing() {
        let schema = schema();
        let converter = FilterConverter::new(&schema);
        assert_eq!(converter.convert(&TupleDomain::all()), None);
    }

    #[test]
    fn single_constraint_is_not_wrapped() {
        let schema = schema();
        let domain = TupleDomain::with_column_domains([(
            col("a", LogicalType::Integer),
            ValueSet::greater_than(5),
        )]);
        let expr = FilterConverter::new(&schema).convert(&domain).unwrap();
        assert_eq!(
            expr,
            Expr::Pred(Filter::new(0, "a", Operator::GreaterThan(StorageValue::Int(5))))
        );
    }

    #[test]
    fn ranges_collapse_to_simple_operators() {
        let schema = schema();
        let converter = FilterConverter::new(&schema);
        let point = TupleDomain::with_column_domains([(
            col("a", LogicalType::Integer),
            ValueSet::range(
                Bound::Included(EngineValue::Integer(3)),
                Bound::Included(EngineValue::Integer(3)),
            ),
        )]);
        assert_eq!(
            converter.convert(&point),
            Some(Expr::Pred(Filter::new(0, "a", Operator::Equals(StorageValue::Int(3)))))
        );
        let open = TupleDomain::with_column_domains([(
            col("a", LogicalType::Integer),
            ValueSet::range(Bound::Unbounded, Bound::Unbounded),
        )]);
        assert_eq!(
            converter.convert(&open),
            Some(Expr::Pred(Filter::new(0, "a", Operator::IsNotNull)))
        );
    }

    #[test]
    fn lossy_constraints_are_dropped_not_narrowed() {
        let schema = schema();
        let lossy_price: DecimalValue = "1.005".parse().unwrap();
        let micros = Timestamp::from_datetime(datetime!(2023-09-12 07:54:48.001001));
        let domain = TupleDomain::with_column_domains([
            (col("a", LogicalType::Integer), ValueSet::IsNotNull),
            (
                col(
                    "price",
                    LogicalType::Decimal {
                        precision: 10,
                        scale: 2,
                    },
                ),
                ValueSet::greater_than(EngineValue::Decimal(lossy_price)),
            ),
            (
                col("name", LogicalType::VarChar(Some(5))),
                ValueSet::Equals("toolong".into()),
            ),
            (
                col("ts", LogicalType::Timestamp(3)),
                ValueSet::Equals(EngineValue::Timestamp(micros)),
            ),
            (
                col("tags", LogicalType::array_of(LogicalType::Integer)),
                ValueSet::less_than(EngineValue::Array(vec![])),
            ),
            (col("missing", LogicalType::Integer), ValueSet::IsNull),
        ]);
        let (expr, report) = FilterConverter::new(&schema).convert_with_report(&domain);
        assert_eq!(expr, Some(Expr::Pred(Filter::new(0, "a", Operator::IsNotNull))));
        assert_eq!(report.pushed, vec!["a".to_string()]);
        let mut dropped: Vec<&str> = report.dropped.iter().map(|d| d.column.as_str()).collect();
        dropped.sort_unstable();
        assert_eq!(dropped, vec!["missing", "name", "price", "tags", "ts"]);
        assert!(!report.is_exact());
    }

    #[test]
    fn nested_columns_only_push_null_checks() {
        let schema = schema();
        let tags = col("tags", LogicalType::array_of(LogicalType::Integer));
        let converter = FilterConverter::new(&schema);
        for values in [
            ValueSet::Equals(EngineValue::Array(vec![EngineValue::Integer(1)])),
            ValueSet::In(vec![
                EngineValue::Array(vec![EngineValue::Integer(1)]),
                EngineValue::Array(vec![]),
            ]),
            ValueSet::In(vec![]),
        ] {
            let domain = TupleDomain::with_column_domains([(tags.clone(), values)]);
            let (expr, report) = converter.convert_with_report(&domain);
            assert_eq!(expr, None);
            assert!(matches!(report.dropped[0].reason, DropReason::Unsupported(_)));
        }

        // A row written while the element type was narrower still matches.
        let stored = StorageValue::Array(vec![StorageValue::TinyInt(1)]);
        let domain = TupleDomain::with_column_domains([(tags, ValueSet::IsNotNull)]);
        let expr = converter.convert(&domain).unwrap();
        assert_eq!(expr, Expr::Pred(Filter::new(4, "tags", Operator::IsNotNull)));
        assert!(expr.matches(&|_| Some(&stored)));
    }

    #[test]
    fn discrete_sets_translate_to_in() {
        let schema = schema();
        let domain = TupleDomain::with_column_domains([
            (
                col("a", LogicalType::Integer),
                ValueSet::In(vec![1.into(), 2.into()]),
            ),
            (
                col("name", LogicalType::VarChar(Some(5))),
                ValueSet::In(vec!["x".into()]),
            ),
        ]);
        let expr = FilterConverter::new(&schema).convert(&domain).unwrap();
        let Expr::And(children) = expr else {
            panic!("expected a conjunction");
        };
        assert_eq!(children.len(), 2);
        assert!(children.contains(&Expr::Pred(Filter::new(
            0,
            "a",
            Operator::In(vec![StorageValue::Int(1), StorageValue::Int(2)])
        ))));
        assert!(children.contains(&Expr::Pred(Filter::new(
            2,
            "name",
            Operator::Equals("x".into())
        ))));
    }

    #[test]
    fn empty_domain_excludes_everything() {
        let schema = schema();
        let expr = FilterConverter::new(&schema)
            .convert(&TupleDomain::none())
            .unwrap();
        assert!(!expr.matches(&|_| None));
        let one = StorageValue::Int(1);
        assert!(!expr.matches(&|_| Some(&one)));
        assert_eq!(FilterConverter::new(&RowType::default()).convert(&TupleDomain::none()), None);
    }
}
