//! Engine-side logical types.
//!
//! These are the types the query engine plans and executes with. They carry no
//! storage detail such as field IDs; nullability only appears where the engine
//! itself tracks it, on container elements and row fields.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical type of an engine column or value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogicalType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal {
        precision: u8,
        scale: u8,
    },
    /// Fixed-length character string.
    Char(u32),
    /// Variable-length character string; `None` means unbounded.
    VarChar(Option<u32>),
    /// Fixed-length binary string.
    Binary(u32),
    /// Variable-length binary string; `None` means unbounded.
    VarBinary(Option<u32>),
    Date,
    /// Time of day with the given fractional-second precision.
    Time(u8),
    /// Timestamp without time zone with the given fractional-second precision.
    Timestamp(u8),
    /// Timestamp with time zone with the given fractional-second precision.
    TimestampWithTimeZone(u8),
    Array {
        element: Box<LogicalType>,
        element_nullable: bool,
    },
    Map {
        key: Box<LogicalType>,
        value: Box<LogicalType>,
        value_nullable: bool,
    },
    Row(Vec<RowField>),
}

/// Named field of a [`LogicalType::Row`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowField {
    pub name: String,
    pub data_type: LogicalType,
    pub nullable: bool,
}

impl RowField {
    pub fn new(name: impl Into<String>, data_type: LogicalType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

impl LogicalType {
    /// Array of nullable elements.
    pub fn array_of(element: LogicalType) -> Self {
        LogicalType::Array {
            element: Box::new(element),
            element_nullable: true,
        }
    }

    /// Map with nullable values.
    pub fn map_of(key: LogicalType, value: LogicalType) -> Self {
        LogicalType::Map {
            key: Box::new(key),
            value: Box::new(value),
            value_nullable: true,
        }
    }

    /// Unbounded varchar.
    pub fn varchar() -> Self {
        LogicalType::VarChar(None)
    }

    /// Unbounded varbinary.
    pub fn varbinary() -> Self {
        LogicalType::VarBinary(None)
    }

    pub fn is_nested(&self) -> bool {
        matches!(
            self,
            LogicalType::Array { .. } | LogicalType::Map { .. } | LogicalType::Row(_)
        )
    }

    /// Values of this type can be ordered, so range constraints make sense.
    pub fn is_orderable(&self) -> bool {
        !self.is_nested()
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Boolean => f.write_str("boolean"),
            LogicalType::TinyInt => f.write_str("tinyint"),
            LogicalType::SmallInt => f.write_str("smallint"),
            LogicalType::Integer => f.write_str("integer"),
            LogicalType::BigInt => f.write_str("bigint"),
            LogicalType::Real => f.write_str("real"),
            LogicalType::Double => f.write_str("double"),
            LogicalType::Decimal { precision, scale } => {
                write!(f, "decimal({precision}, {scale})")
            }
            LogicalType::Char(len) => write!(f, "char({len})"),
            LogicalType::VarChar(None) => f.write_str("varchar"),
            LogicalType::VarChar(Some(len)) => write!(f, "varchar({len})"),
            LogicalType::Binary(len) => write!(f, "binary({len})"),
            LogicalType::VarBinary(None) => f.write_str("varbinary"),
            LogicalType::VarBinary(Some(len)) => write!(f, "varbinary({len})"),
            LogicalType::Date => f.write_str("date"),
            LogicalType::Time(p) => write!(f, "time({p})"),
            LogicalType::Timestamp(p) => write!(f, "timestamp({p})"),
            LogicalType::TimestampWithTimeZone(p) => write!(f, "timestamp({p}) with time zone"),
            LogicalType::Array { element, .. } => write!(f, "array({element})"),
            LogicalType::Map { key, value, .. } => write!(f, "map({key}, {value})"),
            LogicalType::Row(fields) => {
                f.write_str("row(")?;
                for (idx, field) in fields.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} {}", field.name, field.data_type)?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_engine_spelling() {
        assert_eq!(
            LogicalType::TimestampWithTimeZone(3).to_string(),
            "timestamp(3) with time zone"
        );
        let row = LogicalType::Row(vec![
            RowField::new("x", LogicalType::Integer, true),
            RowField::new("y", LogicalType::array_of(LogicalType::varchar()), false),
        ]);
        assert_eq!(row.to_string(), "row(x integer, y array(varchar))");
    }
}
