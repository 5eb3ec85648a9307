//! Mapping between engine logical types and storage data types.
//!
//! The primitive mapping is a fixed table; containers map structurally. Value
//! encoding is exact or it fails: a value that would lose digits, length or
//! fractional-second precision on the way across produces
//! [`Error::TypeMapping`].

use colbridge_result::{Error, Result};
use colbridge_types::decimal::MAX_DECIMAL_PRECISION;
use colbridge_types::{
    DataField, DataType, DecimalValue, EngineValue, LogicalType, MAX_LENGTH, MAX_TIME_PRECISION,
    RowField, RowType, StorageTimestamp, StorageValue, Timestamp, TimestampTz, TypeKind,
    temporal,
};

/// Storage type for an engine logical type. The result is nullable; column
/// level nullability is a property of the storage field.
pub fn logical_to_storage(ty: &LogicalType) -> Result<DataType> {
    let kind = match ty {
        LogicalType::Boolean => TypeKind::Boolean,
        LogicalType::TinyInt => TypeKind::TinyInt,
        LogicalType::SmallInt => TypeKind::SmallInt,
        LogicalType::Integer => TypeKind::Int,
        LogicalType::BigInt => TypeKind::BigInt,
        LogicalType::Real => TypeKind::Float,
        LogicalType::Double => TypeKind::Double,
        LogicalType::Decimal { precision, scale } => {
            check_decimal(*precision, *scale)?;
            TypeKind::Decimal {
                precision: *precision,
                scale: *scale,
            }
        }
        LogicalType::Char(len) => TypeKind::Char(*len),
        LogicalType::VarChar(len) => TypeKind::VarChar(len.unwrap_or(MAX_LENGTH)),
        LogicalType::Binary(len) => TypeKind::Binary(*len),
        LogicalType::VarBinary(len) => TypeKind::VarBinary(len.unwrap_or(MAX_LENGTH)),
        LogicalType::Date => TypeKind::Date,
        LogicalType::Time(p) => TypeKind::Time(check_time_precision(*p)?),
        LogicalType::Timestamp(p) => TypeKind::Timestamp(check_time_precision(*p)?),
        LogicalType::TimestampWithTimeZone(p) => {
            TypeKind::LocalZonedTimestamp(check_time_precision(*p)?)
        }
        LogicalType::Array {
            element,
            element_nullable,
        } => TypeKind::Array(Box::new(
            logical_to_storage(element)?.with_nullable(*element_nullable),
        )),
        LogicalType::Map {
            key,
            value,
            value_nullable,
        } => TypeKind::Map {
            key: Box::new(logical_to_storage(key)?.with_nullable(false)),
            value: Box::new(logical_to_storage(value)?.with_nullable(*value_nullable)),
        },
        LogicalType::Row(fields) => {
            let mut out = Vec::with_capacity(fields.len());
            for (id, field) in fields.iter().enumerate() {
                let data_type = logical_to_storage(&field.data_type)?.with_nullable(field.nullable);
                out.push(DataField::new(id as u32, field.name.clone(), data_type));
            }
            TypeKind::Row(out)
        }
    };
    Ok(kind.nullable())
}

/// Engine logical type for a storage type.
pub fn storage_to_logical(ty: &DataType) -> Result<LogicalType> {
    Ok(match ty.kind() {
        TypeKind::Boolean => LogicalType::Boolean,
        TypeKind::TinyInt => LogicalType::TinyInt,
        TypeKind::SmallInt => LogicalType::SmallInt,
        TypeKind::Int => LogicalType::Integer,
        TypeKind::BigInt => LogicalType::BigInt,
        TypeKind::Float => LogicalType::Real,
        TypeKind::Double => LogicalType::Double,
        TypeKind::Decimal { precision, scale } => {
            check_decimal(*precision, *scale)?;
            LogicalType::Decimal {
                precision: *precision,
                scale: *scale,
            }
        }
        TypeKind::Char(len) => LogicalType::Char(*len),
        TypeKind::VarChar(len) => LogicalType::VarChar(bounded(*len)),
        TypeKind::Binary(len) => LogicalType::Binary(*len),
        TypeKind::VarBinary(len) => LogicalType::VarBinary(bounded(*len)),
        TypeKind::Date => LogicalType::Date,
        TypeKind::Time(p) => LogicalType::Time(check_time_precision(*p)?),
        TypeKind::Timestamp(p) => LogicalType::Timestamp(check_time_precision(*p)?),
        TypeKind::LocalZonedTimestamp(p) => {
            LogicalType::TimestampWithTimeZone(check_time_precision(*p)?)
        }
        TypeKind::Array(element) => LogicalType::Array {
            element: Box::new(storage_to_logical(element)?),
            element_nullable: element.is_nullable(),
        },
        TypeKind::Map { key, value } => LogicalType::Map {
            key: Box::new(storage_to_logical(key)?),
            value: Box::new(storage_to_logical(value)?),
            value_nullable: value.is_nullable(),
        },
        TypeKind::Row(fields) => LogicalType::Row(
            fields
                .iter()
                .map(|field| {
                    Ok(RowField::new(
                        field.name.clone(),
                        storage_to_logical(&field.data_type)?,
                        field.data_type.is_nullable(),
                    ))
                })
                .collect::<Result<Vec<_>>>()?,
        ),
    })
}

fn bounded(len: u32) -> Option<u32> {
    (len != MAX_LENGTH).then_some(len)
}

fn check_decimal(precision: u8, scale: u8) -> Result<()> {
    if precision == 0 || precision > MAX_DECIMAL_PRECISION {
        return Err(Error::TypeMapping(format!(
            "decimal precision {precision} outside 1..={MAX_DECIMAL_PRECISION}"
        )));
    }
    if scale > precision {
        return Err(Error::TypeMapping(format!(
            "decimal scale {scale} exceeds precision {precision}"
        )));
    }
    Ok(())
}

fn check_time_precision(precision: u8) -> Result<u8> {
    if precision > MAX_TIME_PRECISION {
        return Err(Error::TypeMapping(format!(
            "fractional second precision {precision} exceeds {MAX_TIME_PRECISION}"
        )));
    }
    Ok(precision)
}

fn mismatch(ty: impl std::fmt::Display, got: &str) -> Error {
    Error::TypeMapping(format!("cannot represent {got} value as {ty}"))
}

/// Encode an engine value into the storage representation of `ty`.
pub fn encode_value(ty: &LogicalType, value: &EngineValue) -> Result<StorageValue> {
    if value.is_null() {
        return Ok(StorageValue::Null);
    }
    Ok(match ty {
        LogicalType::Boolean => match value {
            EngineValue::Boolean(v) => StorageValue::Boolean(*v),
            other => return Err(mismatch(ty, other.type_name())),
        },
        LogicalType::TinyInt => StorageValue::TinyInt(narrow_integer(ty, value)?),
        LogicalType::SmallInt => StorageValue::SmallInt(narrow_integer(ty, value)?),
        LogicalType::Integer => StorageValue::Int(narrow_integer(ty, value)?),
        LogicalType::BigInt => StorageValue::BigInt(narrow_integer(ty, value)?),
        LogicalType::Real => match value {
            EngineValue::Real(v) => StorageValue::Float(*v),
            EngineValue::Double(v) if (*v as f32) as f64 == *v => StorageValue::Float(*v as f32),
            other => return Err(mismatch(ty, other.type_name())),
        },
        LogicalType::Double => match value {
            EngineValue::Double(v) => StorageValue::Double(*v),
            EngineValue::Real(v) => StorageValue::Double(*v as f64),
            other => return Err(mismatch(ty, other.type_name())),
        },
        LogicalType::Decimal { precision, scale } => {
            let decimal = match value {
                EngineValue::Decimal(v) => *v,
                other => match other.as_i64() {
                    Some(v) => DecimalValue::from_i64(v),
                    None => return Err(mismatch(ty, other.type_name())),
                },
            };
            StorageValue::Decimal(decimal.to_precision_and_scale(*precision, *scale)?)
        }
        LogicalType::Char(len) => StorageValue::String(bounded_string(ty, value, Some(*len))?),
        LogicalType::VarChar(len) => StorageValue::String(bounded_string(ty, value, *len)?),
        LogicalType::Binary(len) => StorageValue::Binary(bounded_bytes(ty, value, Some(*len))?),
        LogicalType::VarBinary(len) => StorageValue::Binary(bounded_bytes(ty, value, *len)?),
        LogicalType::Date => match value {
            EngineValue::Date(days) => StorageValue::Date(*days),
            other => return Err(mismatch(ty, other.type_name())),
        },
        LogicalType::Time(p) => match value {
            EngineValue::Time(nanos) if temporal::time_fits_precision(*nanos, *p) => {
                StorageValue::Time(*nanos)
            }
            EngineValue::Time(_) => {
                return Err(Error::TypeMapping(format!(
                    "time value has more than {p} fractional digits"
                )));
            }
            other => return Err(mismatch(ty, other.type_name())),
        },
        LogicalType::Timestamp(p) => match value {
            EngineValue::Timestamp(ts) => StorageValue::Timestamp(exact_timestamp(*ts, *p)?),
            other => return Err(mismatch(ty, other.type_name())),
        },
        LogicalType::TimestampWithTimeZone(p) => match value {
            EngineValue::TimestampTz(ts) => {
                StorageValue::Timestamp(exact_timestamp(ts.instant(), *p)?)
            }
            other => return Err(mismatch(ty, other.type_name())),
        },
        LogicalType::Array { element, .. } => match value {
            EngineValue::Array(items) => StorageValue::Array(
                items
                    .iter()
                    .map(|item| encode_value(element, item))
                    .collect::<Result<_>>()?,
            ),
            other => return Err(mismatch(ty, other.type_name())),
        },
        LogicalType::Map {
            key,
            value: value_ty,
            ..
        } => match value {
            EngineValue::Map(entries) => StorageValue::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((encode_value(key, k)?, encode_value(value_ty, v)?)))
                    .collect::<Result<_>>()?,
            ),
            other => return Err(mismatch(ty, other.type_name())),
        },
        LogicalType::Row(fields) => match value {
            EngineValue::Row(values) if values.len() == fields.len() => StorageValue::Row(
                fields
                    .iter()
                    .zip(values)
                    .map(|(field, v)| encode_value(&field.data_type, v))
                    .collect::<Result<_>>()?,
            ),
            other => return Err(mismatch(ty, other.type_name())),
        },
    })
}

fn narrow_integer<T>(ty: &LogicalType, value: &EngineValue) -> Result<T>
where
    T: TryFrom<i64>,
{
    let Some(wide) = value.as_i64() else {
        return Err(mismatch(ty, value.type_name()));
    };
    T::try_from(wide).map_err(|_| Error::TypeMapping(format!("{wide} is out of range for {ty}")))
}

fn bounded_string(ty: &LogicalType, value: &EngineValue, max: Option<u32>) -> Result<String> {
    let EngineValue::Varchar(text) = value else {
        return Err(mismatch(ty, value.type_name()));
    };
    if let Some(max) = max
        && text.chars().count() > max as usize
    {
        return Err(Error::TypeMapping(format!(
            "string of length {} exceeds {ty}",
            text.chars().count()
        )));
    }
    Ok(text.clone())
}

fn bounded_bytes(ty: &LogicalType, value: &EngineValue, max: Option<u32>) -> Result<Vec<u8>> {
    let EngineValue::Varbinary(bytes) = value else {
        return Err(mismatch(ty, value.type_name()));
    };
    if let Some(max) = max
        && bytes.len() > max as usize
    {
        return Err(Error::TypeMapping(format!(
            "binary of length {} exceeds {ty}",
            bytes.len()
        )));
    }
    Ok(bytes.clone())
}

fn exact_timestamp(ts: Timestamp, precision: u8) -> Result<StorageTimestamp> {
    if !ts.fits_precision(precision) {
        return Err(Error::TypeMapping(format!(
            "timestamp has more than {precision} fractional digits"
        )));
    }
    Ok(StorageTimestamp::from(ts))
}

/// Decode a storage value of type `ty` into the engine representation of the
/// mapped logical type.
///
/// Decimals come back at exactly the declared scale; timestamps must already
/// fit the declared precision.
pub fn decode_value(ty: &DataType, value: &StorageValue) -> Result<EngineValue> {
    if value.is_null() {
        return Ok(EngineValue::Null);
    }
    let wrong = || {
        Error::TypeMapping(format!(
            "storage value of type {} does not match column type {ty}",
            value.type_name()
        ))
    };
    Ok(match ty.kind() {
        TypeKind::Boolean => match value {
            StorageValue::Boolean(v) => EngineValue::Boolean(*v),
            _ => return Err(wrong()),
        },
        TypeKind::TinyInt => EngineValue::TinyInt(widen_integer(ty, value)?),
        TypeKind::SmallInt => EngineValue::SmallInt(widen_integer(ty, value)?),
        TypeKind::Int => EngineValue::Integer(widen_integer(ty, value)?),
        TypeKind::BigInt => EngineValue::BigInt(widen_integer(ty, value)?),
        TypeKind::Float => match value {
            StorageValue::Float(v) => EngineValue::Real(*v),
            _ => return Err(wrong()),
        },
        TypeKind::Double => match value {
            StorageValue::Double(v) => EngineValue::Double(*v),
            StorageValue::Float(v) => EngineValue::Double(*v as f64),
            _ => return Err(wrong()),
        },
        TypeKind::Decimal { precision, scale } => match value {
            StorageValue::Decimal(v) => {
                EngineValue::Decimal(v.to_precision_and_scale(*precision, *scale)?)
            }
            _ => return Err(wrong()),
        },
        TypeKind::Char(_) | TypeKind::VarChar(_) => match value {
            StorageValue::String(v) => EngineValue::Varchar(v.clone()),
            _ => return Err(wrong()),
        },
        TypeKind::Binary(_) | TypeKind::VarBinary(_) => match value {
            StorageValue::Binary(v) => EngineValue::Varbinary(v.clone()),
            _ => return Err(wrong()),
        },
        TypeKind::Date => match value {
            StorageValue::Date(days) => EngineValue::Date(*days),
            _ => return Err(wrong()),
        },
        TypeKind::Time(p) => match value {
            StorageValue::Time(nanos) if temporal::time_fits_precision(*nanos, *p) => {
                EngineValue::Time(*nanos)
            }
            StorageValue::Time(_) => {
                return Err(Error::TypeMapping(format!(
                    "stored time has more than {p} fractional digits"
                )));
            }
            _ => return Err(wrong()),
        },
        TypeKind::Timestamp(p) => match value {
            StorageValue::Timestamp(ts) => EngineValue::Timestamp(stored_timestamp(*ts, *p)?),
            _ => return Err(wrong()),
        },
        TypeKind::LocalZonedTimestamp(p) => match value {
            StorageValue::Timestamp(ts) => {
                EngineValue::TimestampTz(TimestampTz::utc(stored_timestamp(*ts, *p)?))
            }
            _ => return Err(wrong()),
        },
        TypeKind::Array(element) => match value {
            StorageValue::Array(items) => EngineValue::Array(
                items
                    .iter()
                    .map(|item| decode_value(element, item))
                    .collect::<Result<_>>()?,
            ),
            _ => return Err(wrong()),
        },
        TypeKind::Map {
            key,
            value: value_ty,
        } => match value {
            StorageValue::Map(entries) => EngineValue::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((decode_value(key, k)?, decode_value(value_ty, v)?)))
                    .collect::<Result<_>>()?,
            ),
            _ => return Err(wrong()),
        },
        TypeKind::Row(fields) => match value {
            StorageValue::Row(values) if values.len() == fields.len() => EngineValue::Row(
                fields
                    .iter()
                    .zip(values)
                    .map(|(field, v)| decode_value(&field.data_type, v))
                    .collect::<Result<_>>()?,
            ),
            _ => return Err(wrong()),
        },
    })
}

fn widen_integer<T>(ty: &DataType, value: &StorageValue) -> Result<T>
where
    T: TryFrom<i64>,
{
    let Some(wide) = value.as_i64() else {
        return Err(Error::TypeMapping(format!(
            "storage value of type {} does not match column type {ty}",
            value.type_name()
        )));
    };
    T::try_from(wide).map_err(|_| Error::TypeMapping(format!("{wide} is out of range for {ty}")))
}

fn stored_timestamp(ts: StorageTimestamp, precision: u8) -> Result<Timestamp> {
    let decoded = Timestamp::from(ts);
    if !decoded.fits_precision(precision) {
        return Err(Error::TypeMapping(format!(
            "stored timestamp has more than {precision} fractional digits"
        )));
    }
    Ok(decoded)
}

/// Whether data written as `from` may be read as `to`.
///
/// Permitted changes only ever widen: integer and float widening, decimal
/// precision growth at the same scale, string and binary length growth and
/// timestamp precision growth. Containers apply the rule to their parts; row
/// fields are matched by ID and fields missing from `from` read as null.
pub fn promotion_is_valid(from: &DataType, to: &DataType) -> bool {
    use TypeKind as K;
    match (from.kind(), to.kind()) {
        (K::Boolean, K::Boolean) | (K::Date, K::Date) => true,
        (K::TinyInt, K::TinyInt | K::SmallInt | K::Int | K::BigInt) => true,
        (K::SmallInt, K::SmallInt | K::Int | K::BigInt) => true,
        (K::Int, K::Int | K::BigInt) => true,
        (K::BigInt, K::BigInt) => true,
        (K::Float, K::Float | K::Double) => true,
        (K::Double, K::Double) => true,
        (
            K::Decimal {
                precision: p1,
                scale: s1,
            },
            K::Decimal {
                precision: p2,
                scale: s2,
            },
        ) => s1 == s2 && p2 >= p1,
        (K::Char(a), K::Char(b) | K::VarChar(b)) => b >= a,
        (K::VarChar(a), K::VarChar(b)) => b >= a,
        (K::Binary(a), K::Binary(b) | K::VarBinary(b)) => b >= a,
        (K::VarBinary(a), K::VarBinary(b)) => b >= a,
        (K::Time(a), K::Time(b)) => b >= a,
        (K::Timestamp(a), K::Timestamp(b)) => b >= a,
        (K::LocalZonedTimestamp(a), K::LocalZonedTimestamp(b)) => b >= a,
        (K::Array(a), K::Array(b)) => promotion_is_valid(a, b),
        (K::Map { key: k1, value: v1 }, K::Map { key: k2, value: v2 }) => {
            promotion_is_valid(k1, k2) && promotion_is_valid(v1, v2)
        }
        (K::Row(old), K::Row(new)) => new.iter().all(|field| {
            old.iter()
                .find(|candidate| candidate.id == field.id)
                .is_none_or(|candidate| promotion_is_valid(&candidate.data_type, &field.data_type))
        }),
        _ => false,
    }
}

/// Re-express a value written as `from` in the representation of `to`.
pub fn promote_value(from: &DataType, to: &DataType, value: StorageValue) -> Result<StorageValue> {
    if value.is_null() {
        return Ok(StorageValue::Null);
    }
    if !promotion_is_valid(from, to) {
        return Err(Error::TypeMapping(format!(
            "cannot read {from} data as {to}"
        )));
    }
    Ok(match (to.kind(), value) {
        (TypeKind::SmallInt, v) if v.as_i64().is_some() => {
            StorageValue::SmallInt(widen_integer(to, &v)?)
        }
        (TypeKind::Int, v) if v.as_i64().is_some() => StorageValue::Int(widen_integer(to, &v)?),
        (TypeKind::BigInt, v) if v.as_i64().is_some() => {
            StorageValue::BigInt(widen_integer(to, &v)?)
        }
        (TypeKind::Double, StorageValue::Float(v)) => StorageValue::Double(v as f64),
        (TypeKind::Array(to_element), StorageValue::Array(items)) => {
            let TypeKind::Array(from_element) = from.kind() else {
                return Err(Error::Internal("array promotion without array source".into()));
            };
            StorageValue::Array(
                items
                    .into_iter()
                    .map(|item| promote_value(from_element, to_element, item))
                    .collect::<Result<_>>()?,
            )
        }
        (
            TypeKind::Map {
                key: to_key,
                value: to_value,
            },
            StorageValue::Map(entries),
        ) => {
            let TypeKind::Map {
                key: from_key,
                value: from_value,
            } = from.kind()
            else {
                return Err(Error::Internal("map promotion without map source".into()));
            };
            StorageValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| {
                        Ok((
                            promote_value(from_key, to_key, k)?,
                            promote_value(from_value, to_value, v)?,
                        ))
                    })
                    .collect::<Result<_>>()?,
            )
        }
        (TypeKind::Row(to_fields), StorageValue::Row(mut values)) => {
            let TypeKind::Row(from_fields) = from.kind() else {
                return Err(Error::Internal("row promotion without row source".into()));
            };
            let mut out = Vec::with_capacity(to_fields.len());
            for field in to_fields {
                match from_fields.iter().position(|f| f.id == field.id) {
                    Some(idx) if idx < values.len() => {
                        let old = std::mem::replace(&mut values[idx], StorageValue::Null);
                        out.push(promote_value(
                            &from_fields[idx].data_type,
                            &field.data_type,
                            old,
                        )?);
                    }
                    _ => out.push(StorageValue::Null),
                }
            }
            StorageValue::Row(out)
        }
        (_, v) => v,
    })
}

/// Where a current-schema field lives in a data file's schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldResolution {
    /// The file has the field at `index`, written with `data_type`.
    Present { index: usize, data_type: DataType },
    /// The file predates the field; every row reads it as null.
    Missing,
}

/// Locate `field` in `file_schema` by stable field ID.
///
/// Fails when the file stores the field with a type that cannot be widened
/// to the current one.
pub fn resolve_field(file_schema: &RowType, field: &DataField) -> Result<FieldResolution> {
    let Some((index, stored)) = file_schema.field_by_id(field.id) else {
        return Ok(FieldResolution::Missing);
    };
    if !promotion_is_valid(&stored.data_type, &field.data_type) {
        return Err(Error::TypeMapping(format!(
            "field '{}' (id {}) was written as {} and cannot be read as {}",
            field.name, field.id, stored.data_type, field.data_type
        )));
    }
    Ok(FieldResolution::Present {
        index,
        data_type: stored.data_type.clone(),
    })
}

/// Decode one field of a stored row under the current schema.
pub fn decode_field(
    resolution: &FieldResolution,
    field: &DataField,
    values: &[StorageValue],
) -> Result<EngineValue> {
    match resolution {
        FieldResolution::Missing => Ok(EngineValue::Null),
        FieldResolution::Present { index, data_type } => {
            let stored = values.get(*index).cloned().ok_or_else(|| {
                Error::Internal(format!(
                    "row has {} values but field '{}' resolved to position {index}",
                    values.len(),
                    field.name
                ))
            })?;
            let promoted = promote_value(data_type, &field.data_type, stored)?;
            decode_value(&field.data_type, &promoted)
        }
    }
}
