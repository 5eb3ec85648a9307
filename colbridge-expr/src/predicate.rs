//! Storage-native predicate tree.
//!
//! Leaves reference storage fields by stable [`FieldId`] and carry values that
//! are already encoded for the storage engine. Readers evaluate the tree with
//! SQL three-valued logic: a row is kept only when the predicate is known to
//! be true.
#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;

use colbridge_types::{FieldId, StorageValue};

/// Logical expression over predicates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Pred(Filter),
}

impl Expr {
    /// Build an AND of filters.
    #[inline]
    pub fn all_of(fs: Vec<Filter>) -> Expr {
        Expr::And(fs.into_iter().map(Expr::Pred).collect())
    }

    /// Build an OR of filters.
    #[inline]
    pub fn any_of(fs: Vec<Filter>) -> Expr {
        Expr::Or(fs.into_iter().map(Expr::Pred).collect())
    }

    /// Wrap an expression in a logical NOT.
    #[allow(clippy::should_implement_trait)]
    #[inline]
    pub fn not(e: Expr) -> Expr {
        Expr::Not(Box::new(e))
    }

    /// Conjunction that avoids a one-element `And`. Returns `None` for an
    /// empty input.
    pub fn conjunction(mut parts: Vec<Expr>) -> Option<Expr> {
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Expr::And(parts)),
        }
    }

    /// Every field ID referenced anywhere in the tree, in visit order.
    pub fn referenced_fields(&self) -> Vec<FieldId> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expr::And(children) | Expr::Or(children) => stack.extend(children.iter().rev()),
                Expr::Not(inner) => stack.push(inner),
                Expr::Pred(filter) => {
                    if !out.contains(&filter.field_id) {
                        out.push(filter.field_id);
                    }
                }
            }
        }
        out
    }

    /// Three-valued evaluation. `None` means unknown.
    ///
    /// Fields the lookup cannot find read as null, which is how rows from
    /// files written before a column existed behave.
    pub fn evaluate<'v, L>(&self, lookup: &L) -> Option<bool>
    where
        L: Fn(FieldId) -> Option<&'v StorageValue>,
    {
        match self {
            Expr::And(children) => {
                let mut unknown = false;
                for child in children {
                    match child.evaluate(lookup) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                if unknown { None } else { Some(true) }
            }
            Expr::Or(children) => {
                let mut unknown = false;
                for child in children {
                    match child.evaluate(lookup) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                if unknown { None } else { Some(false) }
            }
            Expr::Not(inner) => inner.evaluate(lookup).map(|v| !v),
            Expr::Pred(filter) => match lookup(filter.field_id) {
                Some(value) => filter.op.evaluate(value),
                None => filter.op.evaluate(&StorageValue::Null),
            },
        }
    }

    /// Whether a row is kept by this predicate.
    pub fn matches<'v, L>(&self, lookup: &L) -> bool
    where
        L: Fn(FieldId) -> Option<&'v StorageValue>,
    {
        self.evaluate(lookup) == Some(true)
    }
}

/// Single predicate against a storage field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field_id: FieldId,
    /// Field name at translation time, kept for diagnostics only.
    pub field_name: String,
    pub op: Operator,
}

impl Filter {
    pub fn new(field_id: FieldId, field_name: impl Into<String>, op: Operator) -> Self {
        Self {
            field_id,
            field_name: field_name.into(),
            op,
        }
    }
}

/// Comparison/matching operators over storage values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    IsNull,
    IsNotNull,

    // Equality
    Equals(StorageValue),
    NotEquals(StorageValue),

    Range {
        lower: Bound<StorageValue>,
        upper: Bound<StorageValue>,
    },

    // Simple comparisons
    GreaterThan(StorageValue),
    GreaterThanOrEquals(StorageValue),
    LessThan(StorageValue),
    LessThanOrEquals(StorageValue),

    // Set membership
    In(Vec<StorageValue>),
}

impl Operator {
    /// Three-valued evaluation of the operator against one value.
    pub fn evaluate(&self, value: &StorageValue) -> Option<bool> {
        match self {
            Operator::IsNull => return Some(value.is_null()),
            Operator::IsNotNull => return Some(!value.is_null()),
            _ => {}
        }
        if value.is_null() {
            return None;
        }
        match self {
            Operator::IsNull | Operator::IsNotNull => None,
            Operator::Equals(expected) => equal(value, expected),
            Operator::NotEquals(expected) => equal(value, expected).map(|v| !v),
            Operator::GreaterThan(bound) => cmp(value, bound).map(|o| o == Ordering::Greater),
            Operator::GreaterThanOrEquals(bound) => {
                cmp(value, bound).map(|o| o != Ordering::Less)
            }
            Operator::LessThan(bound) => cmp(value, bound).map(|o| o == Ordering::Less),
            Operator::LessThanOrEquals(bound) => cmp(value, bound).map(|o| o != Ordering::Greater),
            Operator::Range { lower, upper } => {
                let above = match lower {
                    Bound::Unbounded => Some(true),
                    Bound::Included(b) => cmp(value, b).map(|o| o != Ordering::Less),
                    Bound::Excluded(b) => cmp(value, b).map(|o| o == Ordering::Greater),
                }?;
                let below = match upper {
                    Bound::Unbounded => Some(true),
                    Bound::Included(b) => cmp(value, b).map(|o| o != Ordering::Greater),
                    Bound::Excluded(b) => cmp(value, b).map(|o| o == Ordering::Less),
                }?;
                Some(above && below)
            }
            Operator::In(values) => {
                let mut unknown = false;
                for candidate in values {
                    match equal(value, candidate) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                if unknown { None } else { Some(false) }
            }
        }
    }

    /// Render the operator as a human-readable symbol/keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::Equals(_) => "=",
            Operator::NotEquals(_) => "!=",
            Operator::Range { .. } => "BETWEEN",
            Operator::GreaterThan(_) => ">",
            Operator::GreaterThanOrEquals(_) => ">=",
            Operator::LessThan(_) => "<",
            Operator::LessThanOrEquals(_) => "<=",
            Operator::In(_) => "IN",
        }
    }
}

fn cmp(value: &StorageValue, bound: &StorageValue) -> Option<Ordering> {
    if bound.is_null() {
        return None;
    }
    value.compare(bound)
}

fn equal(value: &StorageValue, expected: &StorageValue) -> Option<bool> {
    if expected.is_null() {
        return None;
    }
    match value.compare(expected) {
        Some(ordering) => Some(ordering == Ordering::Equal),
        None => Some(value == expected),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::And(children) | Expr::Or(children) => {
                let sep = if matches!(self, Expr::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                f.write_str("(")?;
                for (idx, child) in children.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
            Expr::Not(inner) => write!(f, "NOT {inner}"),
            Expr::Pred(filter) => write!(f, "{filter}"),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let column = format!("{}#{}", self.field_name, self.field_id);
        match &self.op {
            Operator::IsNull | Operator::IsNotNull => write!(f, "{column} {}", self.op.as_str()),
            Operator::Equals(v)
            | Operator::NotEquals(v)
            | Operator::GreaterThan(v)
            | Operator::GreaterThanOrEquals(v)
            | Operator::LessThan(v)
            | Operator::LessThanOrEquals(v) => write!(f, "{column} {} {v:?}", self.op.as_str()),
            Operator::Range { lower, upper } => write!(f, "{column} IN {lower:?}..{upper:?}"),
            Operator::In(values) => write!(f, "{column} IN {values:?}"),
        }
    }
}
