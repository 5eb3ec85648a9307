//! Runtime values on both sides of the bridge.
//!
//! [`EngineValue`] is what the query engine computes with and what output
//! pages are built from. [`StorageValue`] is the storage engine's internal row
//! representation. The two differ where the systems differ: storage keeps
//! timestamps as milliseconds plus nano-of-millisecond and has a single string
//! and binary representation regardless of declared length.
//!
//! Both enums implement structural `Eq`/`Hash`. Floating point payloads
//! compare by bit pattern so values can key hash maps and table handles.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::decimal::DecimalValue;
use crate::logical::LogicalType;
use crate::temporal::{self, Timestamp, TimestampTz};

/// Value in the engine's native encoding.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum EngineValue {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Decimal(DecimalValue),
    /// Character data for both `char(n)` and `varchar(n)` columns.
    Varchar(String),
    /// Byte data for both `binary(n)` and `varbinary(n)` columns.
    Varbinary(Vec<u8>),
    /// Days since 1970-01-01.
    Date(i32),
    /// Nanoseconds since midnight.
    Time(i64),
    Timestamp(Timestamp),
    TimestampTz(TimestampTz),
    Array(Vec<EngineValue>),
    Map(Vec<(EngineValue, EngineValue)>),
    Row(Vec<EngineValue>),
}

/// Storage timestamp: epoch milliseconds plus nanoseconds within the millisecond.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageTimestamp {
    pub millisecond: i64,
    pub nano_of_millisecond: u32,
}

impl StorageTimestamp {
    pub fn new(millisecond: i64, nano_of_millisecond: u32) -> Self {
        Self {
            millisecond,
            nano_of_millisecond,
        }
    }

    pub fn from_epoch_millis(millisecond: i64) -> Self {
        Self::new(millisecond, 0)
    }
}

impl From<Timestamp> for StorageTimestamp {
    fn from(ts: Timestamp) -> Self {
        let nanos = ts.epoch_nanos();
        let per_milli = temporal::NANOS_PER_MILLI as i128;
        StorageTimestamp {
            millisecond: nanos.div_euclid(per_milli) as i64,
            nano_of_millisecond: nanos.rem_euclid(per_milli) as u32,
        }
    }
}

impl From<StorageTimestamp> for Timestamp {
    fn from(ts: StorageTimestamp) -> Self {
        let base = Timestamp::from_epoch_millis(ts.millisecond);
        Timestamp::new(base.seconds(), base.nanos() + ts.nano_of_millisecond)
    }
}

/// Value in the storage engine's internal row encoding.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum StorageValue {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Decimal(DecimalValue),
    String(String),
    Binary(Vec<u8>),
    Date(i32),
    Time(i64),
    /// Used for both `TIMESTAMP` and `TIMESTAMP WITH LOCAL TIME ZONE`.
    Timestamp(StorageTimestamp),
    Array(Vec<StorageValue>),
    Map(Vec<(StorageValue, StorageValue)>),
    /// Positional field values of a nested row.
    Row(Vec<StorageValue>),
}

impl EngineValue {
    pub fn is_null(&self) -> bool {
        matches!(self, EngineValue::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            EngineValue::Null => "null",
            EngineValue::Boolean(_) => "boolean",
            EngineValue::TinyInt(_) => "tinyint",
            EngineValue::SmallInt(_) => "smallint",
            EngineValue::Integer(_) => "integer",
            EngineValue::BigInt(_) => "bigint",
            EngineValue::Real(_) => "real",
            EngineValue::Double(_) => "double",
            EngineValue::Decimal(_) => "decimal",
            EngineValue::Varchar(_) => "varchar",
            EngineValue::Varbinary(_) => "varbinary",
            EngineValue::Date(_) => "date",
            EngineValue::Time(_) => "time",
            EngineValue::Timestamp(_) => "timestamp",
            EngineValue::TimestampTz(_) => "timestamp with time zone",
            EngineValue::Array(_) => "array",
            EngineValue::Map(_) => "map",
            EngineValue::Row(_) => "row",
        }
    }

    /// Integer payload widened to `i64`, for any integer variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            EngineValue::TinyInt(v) => Some(*v as i64),
            EngineValue::SmallInt(v) => Some(*v as i64),
            EngineValue::Integer(v) => Some(*v as i64),
            EngineValue::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Compare two values of compatible types.
    ///
    /// Integers compare across widths, floats across widths, decimals across
    /// scales. Nulls, nested values and mismatched families are unordered.
    pub fn compare(&self, other: &EngineValue) -> Option<Ordering> {
        use EngineValue as V;
        if let (Some(l), Some(r)) = (self.as_i64(), other.as_i64()) {
            return Some(l.cmp(&r));
        }
        match (self, other) {
            (V::Boolean(l), V::Boolean(r)) => Some(l.cmp(r)),
            (V::Real(l), V::Real(r)) => l.partial_cmp(r),
            (V::Real(l), V::Double(r)) => (*l as f64).partial_cmp(r),
            (V::Double(l), V::Real(r)) => l.partial_cmp(&(*r as f64)),
            (V::Double(l), V::Double(r)) => l.partial_cmp(r),
            (V::Decimal(l), V::Decimal(r)) => Some(l.cmp(r)),
            (V::Varchar(l), V::Varchar(r)) => Some(l.cmp(r)),
            (V::Varbinary(l), V::Varbinary(r)) => Some(l.cmp(r)),
            (V::Date(l), V::Date(r)) => Some(l.cmp(r)),
            (V::Time(l), V::Time(r)) => Some(l.cmp(r)),
            (V::Timestamp(l), V::Timestamp(r)) => Some(l.cmp(r)),
            (V::TimestampTz(l), V::TimestampTz(r)) => Some(l.instant().cmp(&r.instant())),
            _ => None,
        }
    }

    /// Render the value the way the engine prints it for a column of type `ty`.
    ///
    /// Timestamps and times use the precision declared by `ty`; decimals keep
    /// every digit of their scale.
    pub fn render(&self, ty: &LogicalType) -> String {
        match (self, ty) {
            (EngineValue::Null, _) => "null".to_string(),
            (EngineValue::Boolean(v), _) => v.to_string(),
            (EngineValue::TinyInt(v), _) => v.to_string(),
            (EngineValue::SmallInt(v), _) => v.to_string(),
            (EngineValue::Integer(v), _) => v.to_string(),
            (EngineValue::BigInt(v), _) => v.to_string(),
            (EngineValue::Real(v), _) => format!("{v:?}"),
            (EngineValue::Double(v), _) => format!("{v:?}"),
            (EngineValue::Decimal(v), _) => v.to_string(),
            (EngineValue::Varchar(v), _) => v.clone(),
            (EngineValue::Varbinary(bytes), _) => {
                bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
            }
            (EngineValue::Date(days), _) => temporal::format_date(*days),
            (EngineValue::Time(nanos), LogicalType::Time(p)) => temporal::format_time(*nanos, *p),
            (EngineValue::Time(nanos), _) => temporal::format_time(*nanos, 9),
            (EngineValue::Timestamp(ts), LogicalType::Timestamp(p)) => ts.format(*p),
            (EngineValue::Timestamp(ts), _) => ts.format(9),
            (EngineValue::TimestampTz(ts), LogicalType::TimestampWithTimeZone(p)) => ts.format(*p),
            (EngineValue::TimestampTz(ts), _) => ts.format(9),
            (EngineValue::Array(items), LogicalType::Array { element, .. }) => {
                render_list(items.iter().map(|item| item.render(element)), "[", "]")
            }
            (EngineValue::Map(entries), LogicalType::Map { key, value, .. }) => render_list(
                entries
                    .iter()
                    .map(|(k, v)| format!("{}={}", k.render(key), v.render(value))),
                "{",
                "}",
            ),
            (EngineValue::Row(values), LogicalType::Row(fields)) => render_list(
                values
                    .iter()
                    .zip(fields.iter())
                    .map(|(v, f)| v.render(&f.data_type)),
                "[",
                "]",
            ),
            (other, _) => format!("{other:?}"),
        }
    }
}

fn render_list(items: impl Iterator<Item = String>, open: &str, close: &str) -> String {
    let body: Vec<String> = items.collect();
    format!("{open}{}{close}", body.join(", "))
}

impl StorageValue {
    pub fn is_null(&self) -> bool {
        matches!(self, StorageValue::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            StorageValue::Null => "NULL",
            StorageValue::Boolean(_) => "BOOLEAN",
            StorageValue::TinyInt(_) => "TINYINT",
            StorageValue::SmallInt(_) => "SMALLINT",
            StorageValue::Int(_) => "INT",
            StorageValue::BigInt(_) => "BIGINT",
            StorageValue::Float(_) => "FLOAT",
            StorageValue::Double(_) => "DOUBLE",
            StorageValue::Decimal(_) => "DECIMAL",
            StorageValue::String(_) => "STRING",
            StorageValue::Binary(_) => "BYTES",
            StorageValue::Date(_) => "DATE",
            StorageValue::Time(_) => "TIME",
            StorageValue::Timestamp(_) => "TIMESTAMP",
            StorageValue::Array(_) => "ARRAY",
            StorageValue::Map(_) => "MAP",
            StorageValue::Row(_) => "ROW",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StorageValue::TinyInt(v) => Some(*v as i64),
            StorageValue::SmallInt(v) => Some(*v as i64),
            StorageValue::Int(v) => Some(*v as i64),
            StorageValue::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Compare two storage values; integer widths and float widths compare
    /// with each other so rows from files written under a narrower schema
    /// still match predicates built against the current one.
    pub fn compare(&self, other: &StorageValue) -> Option<Ordering> {
        use StorageValue as V;
        if let (Some(l), Some(r)) = (self.as_i64(), other.as_i64()) {
            return Some(l.cmp(&r));
        }
        match (self, other) {
            (V::Boolean(l), V::Boolean(r)) => Some(l.cmp(r)),
            (V::Float(l), V::Float(r)) => l.partial_cmp(r),
            (V::Float(l), V::Double(r)) => (*l as f64).partial_cmp(r),
            (V::Double(l), V::Float(r)) => l.partial_cmp(&(*r as f64)),
            (V::Double(l), V::Double(r)) => l.partial_cmp(r),
            (V::Decimal(l), V::Decimal(r)) => Some(l.cmp(r)),
            (V::String(l), V::String(r)) => Some(l.cmp(r)),
            (V::Binary(l), V::Binary(r)) => Some(l.cmp(r)),
            (V::Date(l), V::Date(r)) => Some(l.cmp(r)),
            (V::Time(l), V::Time(r)) => Some(l.cmp(r)),
            (V::Timestamp(l), V::Timestamp(r)) => Some(l.cmp(r)),
            _ => None,
        }
    }
}

impl PartialEq for EngineValue {
    fn eq(&self, other: &Self) -> bool {
        use EngineValue as V;
        match (self, other) {
            (V::Null, V::Null) => true,
            (V::Boolean(l), V::Boolean(r)) => l == r,
            (V::TinyInt(l), V::TinyInt(r)) => l == r,
            (V::SmallInt(l), V::SmallInt(r)) => l == r,
            (V::Integer(l), V::Integer(r)) => l == r,
            (V::BigInt(l), V::BigInt(r)) => l == r,
            (V::Real(l), V::Real(r)) => l.to_bits() == r.to_bits(),
            (V::Double(l), V::Double(r)) => l.to_bits() == r.to_bits(),
            (V::Decimal(l), V::Decimal(r)) => l == r,
            (V::Varchar(l), V::Varchar(r)) => l == r,
            (V::Varbinary(l), V::Varbinary(r)) => l == r,
            (V::Date(l), V::Date(r)) => l == r,
            (V::Time(l), V::Time(r)) => l == r,
            (V::Timestamp(l), V::Timestamp(r)) => l == r,
            (V::TimestampTz(l), V::TimestampTz(r)) => l == r,
            (V::Array(l), V::Array(r)) => l == r,
            (V::Map(l), V::Map(r)) => l == r,
            (V::Row(l), V::Row(r)) => l == r,
            _ => false,
        }
    }
}

impl Eq for EngineValue {}

impl Hash for EngineValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use EngineValue as V;
        std::mem::discriminant(self).hash(state);
        match self {
            V::Null => {}
            V::Boolean(v) => v.hash(state),
            V::TinyInt(v) => v.hash(state),
            V::SmallInt(v) => v.hash(state),
            V::Integer(v) => v.hash(state),
            V::BigInt(v) => v.hash(state),
            V::Real(v) => v.to_bits().hash(state),
            V::Double(v) => v.to_bits().hash(state),
            V::Decimal(v) => v.hash(state),
            V::Varchar(v) => v.hash(state),
            V::Varbinary(v) => v.hash(state),
            V::Date(v) => v.hash(state),
            V::Time(v) => v.hash(state),
            V::Timestamp(v) => v.hash(state),
            V::TimestampTz(v) => v.hash(state),
            V::Array(v) => v.hash(state),
            V::Map(v) => v.hash(state),
            V::Row(v) => v.hash(state),
        }
    }
}

impl PartialEq for StorageValue {
    fn eq(&self, other: &Self) -> bool {
        use StorageValue as V;
        match (self, other) {
            (V::Null, V::Null) => true,
            (V::Boolean(l), V::Boolean(r)) => l == r,
            (V::TinyInt(l), V::TinyInt(r)) => l == r,
            (V::SmallInt(l), V::SmallInt(r)) => l == r,
            (V::Int(l), V::Int(r)) => l == r,
            (V::BigInt(l), V::BigInt(r)) => l == r,
            (V::Float(l), V::Float(r)) => l.to_bits() == r.to_bits(),
            (V::Double(l), V::Double(r)) => l.to_bits() == r.to_bits(),
            (V::Decimal(l), V::Decimal(r)) => l == r,
            (V::String(l), V::String(r)) => l == r,
            (V::Binary(l), V::Binary(r)) => l == r,
            (V::Date(l), V::Date(r)) => l == r,
            (V::Time(l), V::Time(r)) => l == r,
            (V::Timestamp(l), V::Timestamp(r)) => l == r,
            (V::Array(l), V::Array(r)) => l == r,
            (V::Map(l), V::Map(r)) => l == r,
            (V::Row(l), V::Row(r)) => l == r,
            _ => false,
        }
    }
}

impl Eq for StorageValue {}

impl Hash for StorageValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use StorageValue as V;
        std::mem::discriminant(self).hash(state);
        match self {
            V::Null => {}
            V::Boolean(v) => v.hash(state),
            V::TinyInt(v) => v.hash(state),
            V::SmallInt(v) => v.hash(state),
            V::Int(v) => v.hash(state),
            V::BigInt(v) => v.hash(state),
            V::Float(v) => v.to_bits().hash(state),
            V::Double(v) => v.to_bits().hash(state),
            V::Decimal(v) => v.hash(state),
            V::String(v) => v.hash(state),
            V::Binary(v) => v.hash(state),
            V::Date(v) => v.hash(state),
            V::Time(v) => v.hash(state),
            V::Timestamp(v) => v.hash(state),
            V::Array(v) => v.hash(state),
            V::Map(v) => v.hash(state),
            V::Row(v) => v.hash(state),
        }
    }
}

macro_rules! impl_from_for_value {
    ($target:ident, $variant:ident, $($t:ty),*) => {
        $(
            impl From<$t> for $target {
                fn from(v: $t) -> Self {
                    $target::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_for_value!(EngineValue, Boolean, bool);
impl_from_for_value!(EngineValue, TinyInt, i8);
impl_from_for_value!(EngineValue, SmallInt, i16);
impl_from_for_value!(EngineValue, Integer, i32);
impl_from_for_value!(EngineValue, BigInt, i64);
impl_from_for_value!(EngineValue, Real, f32);
impl_from_for_value!(EngineValue, Double, f64);
impl_from_for_value!(EngineValue, Decimal, DecimalValue);
impl_from_for_value!(EngineValue, Varchar, String);
impl_from_for_value!(EngineValue, Timestamp, Timestamp);
impl_from_for_value!(EngineValue, TimestampTz, TimestampTz);

impl_from_for_value!(StorageValue, Boolean, bool);
impl_from_for_value!(StorageValue, TinyInt, i8);
impl_from_for_value!(StorageValue, SmallInt, i16);
impl_from_for_value!(StorageValue, Int, i32);
impl_from_for_value!(StorageValue, BigInt, i64);
impl_from_for_value!(StorageValue, Float, f32);
impl_from_for_value!(StorageValue, Double, f64);
impl_from_for_value!(StorageValue, Decimal, DecimalValue);
impl_from_for_value!(StorageValue, String, String);
impl_from_for_value!(StorageValue, Timestamp, StorageTimestamp);

impl From<&str> for EngineValue {
    fn from(v: &str) -> Self {
        EngineValue::Varchar(v.to_string())
    }
}

impl From<&str> for StorageValue {
    fn from(v: &str) -> Self {
        StorageValue::String(v.to_string())
    }
}

impl<T: Into<EngineValue>> From<Option<T>> for EngineValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(EngineValue::Null, Into::into)
    }
}

impl<T: Into<StorageValue>> From<Option<T>> for StorageValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(StorageValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::RowField;
    use std::collections::HashSet;
    use time::macros::datetime;

    #[test]
    fn floats_compare_structurally_by_bits() {
        assert_eq!(EngineValue::Double(f64::NAN), EngineValue::Double(f64::NAN));
        assert_ne!(EngineValue::Double(0.0), EngineValue::Double(-0.0));
        let mut set = HashSet::new();
        set.insert(EngineValue::Real(1.5));
        assert!(set.contains(&EngineValue::Real(1.5)));
    }

    #[test]
    fn integers_compare_across_widths() {
        assert_eq!(
            EngineValue::TinyInt(3).compare(&EngineValue::BigInt(3)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            StorageValue::SmallInt(2).compare(&StorageValue::Int(9)),
            Some(Ordering::Less)
        );
        assert_eq!(EngineValue::Null.compare(&EngineValue::Integer(1)), None);
        assert_eq!(
            EngineValue::Varchar("a".into()).compare(&EngineValue::Integer(1)),
            None
        );
    }

    #[test]
    fn storage_timestamp_conversion_is_exact() {
        let ts = Timestamp::from_datetime(datetime!(2023-09-12 07:54:48.001001));
        let stored = StorageTimestamp::from(ts);
        assert_eq!(stored.nano_of_millisecond, 1_000);
        assert_eq!(Timestamp::from(stored), ts);

        let before_epoch = Timestamp::from_epoch_nanos(-1).unwrap();
        let stored = StorageTimestamp::from(before_epoch);
        assert_eq!(stored.millisecond, -1);
        assert_eq!(stored.nano_of_millisecond, 999_999);
        assert_eq!(Timestamp::from(stored), before_epoch);
    }

    #[test]
    fn render_nested_values() {
        let ty = LogicalType::Row(vec![
            RowField::new("a", LogicalType::array_of(LogicalType::Integer), true),
            RowField::new(
                "b",
                LogicalType::map_of(LogicalType::Integer, LogicalType::Integer),
                true,
            ),
            RowField::new("c", LogicalType::Double, true),
        ]);
        let value = EngineValue::Row(vec![
            EngineValue::Array(vec![1.into(), EngineValue::Null]),
            EngineValue::Map(vec![(1.into(), 1.into())]),
            EngineValue::Double(1.0),
        ]);
        assert_eq!(value.render(&ty), "[[1, null], {1=1}, 1.0]");
        assert_eq!(
            EngineValue::Varbinary(vec![1, 2, 3]).render(&LogicalType::varbinary()),
            "010203"
        );
    }
}
