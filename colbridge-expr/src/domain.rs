//! Engine-side pushdown constraints.
//!
//! A [`TupleDomain`] is a conjunction of per-column [`ValueSet`]s. It is what
//! the planner hands to the connector when it asks for filter pushdown. The
//! model cannot express cross-column or disjunctive constraints; discrete
//! value sets are the only implicit disjunction.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

use colbridge_types::{EngineValue, LogicalType};
use serde::{Deserialize, Serialize};

/// Set of values a single column may take.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueSet {
    /// Unconstrained, nulls included.
    All,
    /// No value satisfies the constraint, not even null.
    None,
    IsNull,
    IsNotNull,
    Equals(EngineValue),
    /// Any of the listed non-null values.
    In(Vec<EngineValue>),
    /// Non-null values between the two bounds.
    Range {
        low: Bound<EngineValue>,
        high: Bound<EngineValue>,
    },
}

impl ValueSet {
    pub fn range(low: Bound<EngineValue>, high: Bound<EngineValue>) -> Self {
        ValueSet::Range { low, high }
    }

    pub fn greater_than(value: impl Into<EngineValue>) -> Self {
        ValueSet::range(Bound::Excluded(value.into()), Bound::Unbounded)
    }

    pub fn greater_than_or_equal(value: impl Into<EngineValue>) -> Self {
        ValueSet::range(Bound::Included(value.into()), Bound::Unbounded)
    }

    pub fn less_than(value: impl Into<EngineValue>) -> Self {
        ValueSet::range(Bound::Unbounded, Bound::Excluded(value.into()))
    }

    pub fn less_than_or_equal(value: impl Into<EngineValue>) -> Self {
        ValueSet::range(Bound::Unbounded, Bound::Included(value.into()))
    }

    /// Whether null is a member of the set.
    pub fn accepts_null(&self) -> bool {
        matches!(self, ValueSet::All | ValueSet::IsNull)
    }

    /// Whether `value` is a member of the set.
    pub fn contains(&self, value: &EngineValue) -> bool {
        match self {
            ValueSet::All => true,
            ValueSet::None => false,
            ValueSet::IsNull => value.is_null(),
            ValueSet::IsNotNull => !value.is_null(),
            ValueSet::Equals(expected) => !value.is_null() && same_value(value, expected),
            ValueSet::In(values) => {
                !value.is_null() && values.iter().any(|expected| same_value(value, expected))
            }
            ValueSet::Range { low, high } => {
                !value.is_null() && above_low(value, low) && below_high(value, high)
            }
        }
    }

    /// Conservative intersection.
    ///
    /// The result always contains every value both inputs contain. When the
    /// two sets cannot be compared precisely (incomparable value families),
    /// `self` is returned unchanged.
    pub fn intersect(&self, other: &ValueSet) -> ValueSet {
        use ValueSet as S;
        match (self, other) {
            (S::None, _) | (_, S::None) => S::None,
            (S::All, s) | (s, S::All) => s.clone(),
            (S::IsNull, s) | (s, S::IsNull) => {
                if s.accepts_null() {
                    S::IsNull
                } else {
                    S::None
                }
            }
            (S::IsNotNull, s) | (s, S::IsNotNull) => s.clone(),
            (S::Equals(v), s) | (s, S::Equals(v)) => {
                if s.contains(v) {
                    S::Equals(v.clone())
                } else {
                    S::None
                }
            }
            (S::In(values), s) | (s, S::In(values)) => {
                let mut kept: Vec<EngineValue> =
                    values.iter().filter(|v| s.contains(v)).cloned().collect();
                match kept.len() {
                    0 => S::None,
                    1 => S::Equals(kept.remove(0)),
                    _ => S::In(kept),
                }
            }
            (
                S::Range { low, high },
                S::Range {
                    low: other_low,
                    high: other_high,
                },
            ) => {
                let (Some(low), Some(high)) = (
                    tighter_low(low, other_low),
                    tighter_high(high, other_high),
                ) else {
                    return self.clone();
                };
                if range_is_empty(&low, &high) {
                    S::None
                } else {
                    S::Range { low, high }
                }
            }
        }
    }
}

impl fmt::Display for ValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSet::All => f.write_str("ALL"),
            ValueSet::None => f.write_str("NONE"),
            ValueSet::IsNull => f.write_str("IS NULL"),
            ValueSet::IsNotNull => f.write_str("IS NOT NULL"),
            ValueSet::Equals(v) => write!(f, "= {v:?}"),
            ValueSet::In(values) => write!(f, "IN {values:?}"),
            ValueSet::Range { low, high } => {
                match low {
                    Bound::Included(v) => write!(f, "[{v:?}")?,
                    Bound::Excluded(v) => write!(f, "({v:?}")?,
                    Bound::Unbounded => f.write_str("(<min>")?,
                }
                f.write_str(", ")?;
                match high {
                    Bound::Included(v) => write!(f, "{v:?}]"),
                    Bound::Excluded(v) => write!(f, "{v:?})"),
                    Bound::Unbounded => f.write_str("<max>)"),
                }
            }
        }
    }
}

fn same_value(left: &EngineValue, right: &EngineValue) -> bool {
    match left.compare(right) {
        Some(ordering) => ordering == Ordering::Equal,
        None => left == right,
    }
}

fn above_low(value: &EngineValue, low: &Bound<EngineValue>) -> bool {
    match low {
        Bound::Unbounded => true,
        Bound::Included(bound) => matches!(
            value.compare(bound),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Bound::Excluded(bound) => matches!(value.compare(bound), Some(Ordering::Greater)),
    }
}

fn below_high(value: &EngineValue, high: &Bound<EngineValue>) -> bool {
    match high {
        Bound::Unbounded => true,
        Bound::Included(bound) => {
            matches!(value.compare(bound), Some(Ordering::Less | Ordering::Equal))
        }
        Bound::Excluded(bound) => matches!(value.compare(bound), Some(Ordering::Less)),
    }
}

fn bound_value(bound: &Bound<EngineValue>) -> Option<&EngineValue> {
    match bound {
        Bound::Included(v) | Bound::Excluded(v) => Some(v),
        Bound::Unbounded => None,
    }
}

/// The more restrictive of two lower bounds, or `None` if they are incomparable.
fn tighter_low(
    left: &Bound<EngineValue>,
    right: &Bound<EngineValue>,
) -> Option<Bound<EngineValue>> {
    let (Some(l), Some(r)) = (bound_value(left), bound_value(right)) else {
        return Some(if matches!(left, Bound::Unbounded) {
            right.clone()
        } else {
            left.clone()
        });
    };
    Some(match l.compare(r)? {
        Ordering::Greater => left.clone(),
        Ordering::Less => right.clone(),
        Ordering::Equal if matches!(left, Bound::Excluded(_)) => left.clone(),
        Ordering::Equal => right.clone(),
    })
}

fn tighter_high(
    left: &Bound<EngineValue>,
    right: &Bound<EngineValue>,
) -> Option<Bound<EngineValue>> {
    let (Some(l), Some(r)) = (bound_value(left), bound_value(right)) else {
        return Some(if matches!(left, Bound::Unbounded) {
            right.clone()
        } else {
            left.clone()
        });
    };
    Some(match l.compare(r)? {
        Ordering::Less => left.clone(),
        Ordering::Greater => right.clone(),
        Ordering::Equal if matches!(left, Bound::Excluded(_)) => left.clone(),
        Ordering::Equal => right.clone(),
    })
}

fn range_is_empty(low: &Bound<EngineValue>, high: &Bound<EngineValue>) -> bool {
    let (Some(l), Some(h)) = (bound_value(low), bound_value(high)) else {
        return false;
    };
    match l.compare(h) {
        Some(Ordering::Greater) => true,
        Some(Ordering::Equal) => {
            matches!(low, Bound::Excluded(_)) || matches!(high, Bound::Excluded(_))
        }
        _ => false,
    }
}

/// Conjunction of per-column value sets.
///
/// `None` in the inner option is the unsatisfiable domain; an empty map is the
/// unconstrained one. Columns constrained to [`ValueSet::All`] are never
/// stored, and a [`ValueSet::None`] entry collapses the whole domain.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleDomain<C: Ord> {
    domains: Option<BTreeMap<C, ValueSet>>,
}

impl<C: Ord> TupleDomain<C> {
    pub fn all() -> Self {
        Self {
            domains: Some(BTreeMap::new()),
        }
    }

    pub fn none() -> Self {
        Self { domains: None }
    }

    /// Build a domain from column constraints. Repeated columns are
    /// intersected.
    pub fn with_column_domains(entries: impl IntoIterator<Item = (C, ValueSet)>) -> Self {
        let mut domains: BTreeMap<C, ValueSet> = BTreeMap::new();
        for (column, values) in entries {
            let merged = match domains.remove(&column) {
                Some(existing) => existing.intersect(&values),
                None => values,
            };
            match merged {
                ValueSet::None => return Self::none(),
                ValueSet::All => {}
                other => {
                    domains.insert(column, other);
                }
            }
        }
        Self {
            domains: Some(domains),
        }
    }

    /// Per-column constraints, or `None` when the domain is unsatisfiable.
    pub fn domains(&self) -> Option<&BTreeMap<C, ValueSet>> {
        self.domains.as_ref()
    }

    pub fn is_all(&self) -> bool {
        matches!(&self.domains, Some(map) if map.is_empty())
    }

    pub fn is_none(&self) -> bool {
        self.domains.is_none()
    }

    /// Rename constraint keys. Columns whose key maps to `None` lose their
    /// constraint, which widens the domain.
    pub fn transform_keys<D: Ord>(self, mut f: impl FnMut(C) -> Option<D>) -> TupleDomain<D> {
        match self.domains {
            None => TupleDomain::none(),
            Some(map) => TupleDomain::with_column_domains(
                map.into_iter()
                    .filter_map(|(column, values)| f(column).map(|key| (key, values))),
            ),
        }
    }

    /// Whether a row satisfies every column constraint. Columns the lookup
    /// does not know are treated as null.
    pub fn contains_row<'v>(&self, mut lookup: impl FnMut(&C) -> Option<&'v EngineValue>) -> bool {
        let Some(map) = &self.domains else {
            return false;
        };
        map.iter().all(|(column, values)| match lookup(column) {
            Some(value) => values.contains(value),
            None => values.accepts_null(),
        })
    }
}

impl<C: Ord + Clone> TupleDomain<C> {
    /// Conservative intersection of two domains.
    pub fn intersect(&self, other: &TupleDomain<C>) -> TupleDomain<C> {
        let (Some(left), Some(right)) = (&self.domains, &other.domains) else {
            return TupleDomain::none();
        };
        TupleDomain::with_column_domains(
            left.iter()
                .chain(right.iter())
                .map(|(column, values)| (column.clone(), values.clone())),
        )
    }
}

impl<C: Ord> Default for TupleDomain<C> {
    fn default() -> Self {
        Self::all()
    }
}

impl<C: Ord + fmt::Display> fmt::Display for TupleDomain<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(map) = &self.domains else {
            return f.write_str("NONE");
        };
        if map.is_empty() {
            return f.write_str("ALL");
        }
        for (idx, (column, values)) in map.iter().enumerate() {
            if idx > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{column} {values}")?;
        }
        Ok(())
    }
}

/// Whether constraints of this logical type can use range bounds.
pub fn supports_ranges(ty: &LogicalType) -> bool {
    ty.is_orderable() && !matches!(ty, LogicalType::Boolean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_follows_bounds() {
        let set = ValueSet::range(
            Bound::Included(EngineValue::Integer(1)),
            Bound::Excluded(EngineValue::Integer(5)),
        );
        assert!(set.contains(&EngineValue::Integer(1)));
        assert!(set.contains(&EngineValue::BigInt(4)));
        assert!(!set.contains(&EngineValue::Integer(5)));
        assert!(!set.contains(&EngineValue::Null));
        assert!(ValueSet::All.contains(&EngineValue::Null));
    }

    #[test]
    fn intersect_ranges_and_points() {
        let ge_two = ValueSet::greater_than_or_equal(2);
        let lt_four = ValueSet::less_than(4);
        assert_eq!(
            ge_two.intersect(&lt_four),
            ValueSet::range(
                Bound::Included(EngineValue::Integer(2)),
                Bound::Excluded(EngineValue::Integer(4)),
            )
        );
        assert_eq!(
            ValueSet::In(vec![1.into(), 3.into(), 9.into()]).intersect(&lt_four),
            ValueSet::In(vec![1.into(), 3.into()])
        );
        assert_eq!(
            ValueSet::Equals(7.into()).intersect(&lt_four),
            ValueSet::None
        );
        assert_eq!(ValueSet::IsNull.intersect(&ge_two), ValueSet::None);
        assert_eq!(
            ValueSet::greater_than(4).intersect(&lt_four),
            ValueSet::None
        );
    }

    #[test]
    fn domain_normalisation() {
        let domain = TupleDomain::with_column_domains([
            ("a", ValueSet::All),
            ("b", ValueSet::IsNotNull),
        ]);
        assert_eq!(domain.domains().map(|m| m.len()), Some(1));
        assert!(!domain.is_all());

        let collapsed = TupleDomain::with_column_domains([
            ("a", ValueSet::Equals(1.into())),
            ("b", ValueSet::None),
        ]);
        assert!(collapsed.is_none());
        assert!(TupleDomain::<&str>::with_column_domains([]).is_all());
    }

    #[test]
    fn contains_row_treats_unknown_as_null() {
        let domain = TupleDomain::with_column_domains([("a", ValueSet::IsNull)]);
        assert!(domain.contains_row(|_| None));
        let value = EngineValue::Integer(1);
        assert!(!domain.contains_row(|_| Some(&value)));
        assert!(!TupleDomain::<&str>::none().contains_row(|_| None));
    }

    #[test]
    fn transform_keys_drops_unmapped_columns() {
        let domain = TupleDomain::with_column_domains([
            ("a", ValueSet::IsNotNull),
            ("b", ValueSet::IsNull),
        ]);
        let renamed = domain.transform_keys(|c| (c == "a").then_some(1_u32));
        assert_eq!(
            renamed.domains().and_then(|m| m.get(&1)),
            Some(&ValueSet::IsNotNull)
        );
        assert_eq!(renamed.domains().map(|m| m.len()), Some(1));
    }
}
