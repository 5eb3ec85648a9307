//! Conversion between engine values and Arrow arrays.
//!
//! Pages reach the engine as Arrow record batches. Every [`LogicalType`] has
//! one Arrow layout; [`build_array`] fills it from decoded engine values and
//! [`value_from_array`] reads a value back out.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, ArrowPrimitiveType, AsArray, BinaryArray, BooleanArray, Date32Array,
    Decimal128Array, Float32Array, Float64Array, Int8Array, Int16Array, Int32Array, Int64Array,
    ListArray, MapArray, PrimitiveArray, StringArray, StructArray, Time32MillisecondArray,
    Time32SecondArray, Time64MicrosecondArray, Time64NanosecondArray,
    TimestampMicrosecondArray, TimestampMillisecondArray, TimestampNanosecondArray,
    TimestampSecondArray,
};
use arrow::datatypes::{
    DataType as ArrowType, Date32Type, Decimal128Type, Field, Fields, Float32Type, Float64Type,
    Int8Type, Int16Type, Int32Type, Int64Type, Time32MillisecondType, Time32SecondType,
    Time64MicrosecondType, Time64NanosecondType, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType,
};
use arrow_buffer::{NullBuffer, OffsetBuffer};
use colbridge_result::{Error, Result};
use colbridge_types::{DecimalValue, EngineValue, LogicalType, RowField, Timestamp, TimestampTz};

/// Time zone attached to `timestamp with time zone` columns. Values are
/// carried as UTC instants.
pub const UTC: &str = "UTC";

/// Arrow unit for a fractional-second precision, with the number of
/// fractional digits that unit holds.
fn time_unit(precision: u8) -> (TimeUnit, u8) {
    match precision {
        0 => (TimeUnit::Second, 0),
        1..=3 => (TimeUnit::Millisecond, 3),
        4..=6 => (TimeUnit::Microsecond, 6),
        _ => (TimeUnit::Nanosecond, 9),
    }
}

/// Arrow data type a column of `ty` is materialized as.
pub fn logical_to_arrow(ty: &LogicalType) -> Result<ArrowType> {
    Ok(match ty {
        LogicalType::Boolean => ArrowType::Boolean,
        LogicalType::TinyInt => ArrowType::Int8,
        LogicalType::SmallInt => ArrowType::Int16,
        LogicalType::Integer => ArrowType::Int32,
        LogicalType::BigInt => ArrowType::Int64,
        LogicalType::Real => ArrowType::Float32,
        LogicalType::Double => ArrowType::Float64,
        LogicalType::Decimal { precision, scale } => {
            let scale = i8::try_from(*scale).map_err(Error::type_mapping)?;
            ArrowType::Decimal128(*precision, scale)
        }
        LogicalType::Char(_) | LogicalType::VarChar(_) => ArrowType::Utf8,
        LogicalType::Binary(_) | LogicalType::VarBinary(_) => ArrowType::Binary,
        LogicalType::Date => ArrowType::Date32,
        LogicalType::Time(p) => match time_unit(*p).0 {
            unit @ (TimeUnit::Second | TimeUnit::Millisecond) => ArrowType::Time32(unit),
            unit => ArrowType::Time64(unit),
        },
        LogicalType::Timestamp(p) => ArrowType::Timestamp(time_unit(*p).0, None),
        LogicalType::TimestampWithTimeZone(p) => {
            ArrowType::Timestamp(time_unit(*p).0, Some(UTC.into()))
        }
        LogicalType::Array {
            element,
            element_nullable,
        } => ArrowType::List(Arc::new(Field::new_list_field(
            logical_to_arrow(element)?,
            *element_nullable,
        ))),
        LogicalType::Map {
            key,
            value,
            value_nullable,
        } => ArrowType::Map(
            Arc::new(map_entries_field(key, value, *value_nullable)?),
            false,
        ),
        LogicalType::Row(fields) => ArrowType::Struct(struct_fields(fields)?),
    })
}

fn map_entries_field(
    key: &LogicalType,
    value: &LogicalType,
    value_nullable: bool,
) -> Result<Field> {
    let entries = Fields::from(vec![
        Field::new("key", logical_to_arrow(key)?, false),
        Field::new("value", logical_to_arrow(value)?, value_nullable),
    ]);
    Ok(Field::new("entries", ArrowType::Struct(entries), false))
}

fn struct_fields(fields: &[RowField]) -> Result<Fields> {
    fields
        .iter()
        .map(|f| Ok(Field::new(f.name.clone(), logical_to_arrow(&f.data_type)?, f.nullable)))
        .collect::<Result<Vec<_>>>()
        .map(Fields::from)
}

fn mismatch(ty: &LogicalType, value: &EngineValue) -> Error {
    Error::TypeMapping(format!(
        "{} value cannot be stored in a {ty} column",
        value.type_name()
    ))
}

fn null_buffer(validity: Vec<bool>) -> Option<NullBuffer> {
    if validity.iter().all(|valid| *valid) {
        None
    } else {
        Some(NullBuffer::from(validity))
    }
}

macro_rules! collect_values {
    ($array:ty, $ty:expr, $values:expr, $pat:pat => $out:expr) => {{
        let array = $values
            .iter()
            .map(|value| match value {
                EngineValue::Null => Ok(None),
                $pat => Ok(Some($out)),
                other => Err(mismatch($ty, other)),
            })
            .collect::<Result<$array>>()?;
        Arc::new(array) as ArrayRef
    }};
}

/// Nanoseconds of day as a count of `10^-digits` second units.
fn time_units(ty: &LogicalType, nanos: i64, digits: u8) -> Result<i64> {
    let per_unit = 10_i64.pow(9 - digits as u32);
    if nanos % per_unit != 0 {
        return Err(Error::TypeMapping(format!(
            "time value {nanos}ns has more precision than {ty}"
        )));
    }
    Ok(nanos / per_unit)
}

fn time32(ty: &LogicalType, nanos: i64, digits: u8) -> Result<i32> {
    i32::try_from(time_units(ty, nanos, digits)?).map_err(Error::type_mapping)
}

fn timestamp_units(ty: &LogicalType, ts: Timestamp, digits: u8) -> Result<i64> {
    ts.epoch_units(digits).ok_or_else(|| {
        Error::TypeMapping(format!("timestamp {ts:?} does not fit a {ty} column"))
    })
}

fn build_timestamps(
    ty: &LogicalType,
    values: &[EngineValue],
    precision: u8,
    with_zone: bool,
) -> Result<ArrayRef> {
    let (unit, digits) = time_unit(precision);
    let units = values
        .iter()
        .map(|value| match (value, with_zone) {
            (EngineValue::Null, _) => Ok(None),
            (EngineValue::Timestamp(ts), false) => timestamp_units(ty, *ts, digits).map(Some),
            (EngineValue::TimestampTz(ts), true) => {
                timestamp_units(ty, ts.instant(), digits).map(Some)
            }
            (other, _) => Err(mismatch(ty, other)),
        })
        .collect::<Result<Vec<Option<i64>>>>()?;

    let array: ArrayRef = match (unit, with_zone) {
        (TimeUnit::Second, false) => Arc::new(TimestampSecondArray::from(units)),
        (TimeUnit::Second, true) => Arc::new(TimestampSecondArray::from(units).with_timezone(UTC)),
        (TimeUnit::Millisecond, false) => Arc::new(TimestampMillisecondArray::from(units)),
        (TimeUnit::Millisecond, true) => {
            Arc::new(TimestampMillisecondArray::from(units).with_timezone(UTC))
        }
        (TimeUnit::Microsecond, false) => Arc::new(TimestampMicrosecondArray::from(units)),
        (TimeUnit::Microsecond, true) => {
            Arc::new(TimestampMicrosecondArray::from(units).with_timezone(UTC))
        }
        (TimeUnit::Nanosecond, false) => Arc::new(TimestampNanosecondArray::from(units)),
        (TimeUnit::Nanosecond, true) => {
            Arc::new(TimestampNanosecondArray::from(units).with_timezone(UTC))
        }
    };
    Ok(array)
}

/// Build one Arrow column of type `ty` from engine values.
///
/// `EngineValue::Null` becomes an Arrow null. A value of any other variant
/// than the one `ty` calls for fails with [`Error::TypeMapping`].
pub fn build_array(ty: &LogicalType, values: &[EngineValue]) -> Result<ArrayRef> {
    let array = match ty {
        LogicalType::Boolean => {
            collect_values!(BooleanArray, ty, values, EngineValue::Boolean(v) => *v)
        }
        LogicalType::TinyInt => {
            collect_values!(Int8Array, ty, values, EngineValue::TinyInt(v) => *v)
        }
        LogicalType::SmallInt => {
            collect_values!(Int16Array, ty, values, EngineValue::SmallInt(v) => *v)
        }
        LogicalType::Integer => {
            collect_values!(Int32Array, ty, values, EngineValue::Integer(v) => *v)
        }
        LogicalType::BigInt => {
            collect_values!(Int64Array, ty, values, EngineValue::BigInt(v) => *v)
        }
        LogicalType::Real => collect_values!(Float32Array, ty, values, EngineValue::Real(v) => *v),
        LogicalType::Double => {
            collect_values!(Float64Array, ty, values, EngineValue::Double(v) => *v)
        }
        LogicalType::Decimal { precision, scale } => {
            let raw = values
                .iter()
                .map(|value| match value {
                    EngineValue::Null => Ok(None),
                    EngineValue::Decimal(d) => Ok(Some(d.rescale(*scale)?.raw_value())),
                    other => Err(mismatch(ty, other)),
                })
                .collect::<Result<Decimal128Array>>()?;
            let scale = i8::try_from(*scale).map_err(Error::type_mapping)?;
            Arc::new(raw.with_precision_and_scale(*precision, scale)?) as ArrayRef
        }
        LogicalType::Char(_) | LogicalType::VarChar(_) => {
            collect_values!(StringArray, ty, values, EngineValue::Varchar(s) => s.as_str())
        }
        LogicalType::Binary(_) | LogicalType::VarBinary(_) => {
            collect_values!(BinaryArray, ty, values, EngineValue::Varbinary(b) => b.as_slice())
        }
        LogicalType::Date => collect_values!(Date32Array, ty, values, EngineValue::Date(d) => *d),
        LogicalType::Time(p) => match time_unit(*p) {
            (TimeUnit::Second, digits) => collect_values!(
                Time32SecondArray, ty, values, EngineValue::Time(n) => time32(ty, *n, digits)?
            ),
            (TimeUnit::Millisecond, digits) => collect_values!(
                Time32MillisecondArray, ty, values, EngineValue::Time(n) => time32(ty, *n, digits)?
            ),
            (TimeUnit::Microsecond, digits) => collect_values!(
                Time64MicrosecondArray, ty, values,
                EngineValue::Time(n) => time_units(ty, *n, digits)?
            ),
            (TimeUnit::Nanosecond, _) => collect_values!(
                Time64NanosecondArray, ty, values, EngineValue::Time(n) => *n
            ),
        },
        LogicalType::Timestamp(p) => build_timestamps(ty, values, *p, false)?,
        LogicalType::TimestampWithTimeZone(p) => build_timestamps(ty, values, *p, true)?,
        LogicalType::Array {
            element,
            element_nullable,
        } => {
            let mut lengths = Vec::with_capacity(values.len());
            let mut validity = Vec::with_capacity(values.len());
            let mut items = Vec::new();
            for value in values {
                match value {
                    EngineValue::Null => {
                        lengths.push(0);
                        validity.push(false);
                    }
                    EngineValue::Array(elements) => {
                        lengths.push(elements.len());
                        validity.push(true);
                        items.extend(elements.iter().cloned());
                    }
                    other => return Err(mismatch(ty, other)),
                }
            }
            let field = Arc::new(Field::new_list_field(
                logical_to_arrow(element)?,
                *element_nullable,
            ));
            let child = build_array(element, &items)?;
            Arc::new(ListArray::try_new(
                field,
                OffsetBuffer::from_lengths(lengths),
                child,
                null_buffer(validity),
            )?) as ArrayRef
        }
        LogicalType::Map {
            key,
            value: value_type,
            value_nullable,
        } => {
            let mut lengths = Vec::with_capacity(values.len());
            let mut validity = Vec::with_capacity(values.len());
            let mut keys = Vec::new();
            let mut entries = Vec::new();
            for value in values {
                match value {
                    EngineValue::Null => {
                        lengths.push(0);
                        validity.push(false);
                    }
                    EngineValue::Map(pairs) => {
                        lengths.push(pairs.len());
                        validity.push(true);
                        for (k, v) in pairs {
                            keys.push(k.clone());
                            entries.push(v.clone());
                        }
                    }
                    other => return Err(mismatch(ty, other)),
                }
            }
            let entries_field = map_entries_field(key, value_type, *value_nullable)?;
            let ArrowType::Struct(entry_fields) = entries_field.data_type().clone() else {
                return Err(Error::Internal("map entries must be a struct".into()));
            };
            let entries = StructArray::try_new(
                entry_fields,
                vec![build_array(key, &keys)?, build_array(value_type, &entries)?],
                None,
            )?;
            Arc::new(MapArray::try_new(
                Arc::new(entries_field),
                OffsetBuffer::from_lengths(lengths),
                entries,
                null_buffer(validity),
                false,
            )?) as ArrayRef
        }
        LogicalType::Row(fields) => {
            let mut validity = Vec::with_capacity(values.len());
            let mut columns: Vec<Vec<EngineValue>> =
                vec![Vec::with_capacity(values.len()); fields.len()];
            for value in values {
                match value {
                    EngineValue::Null => {
                        validity.push(false);
                        columns.iter_mut().for_each(|c| c.push(EngineValue::Null));
                    }
                    EngineValue::Row(row) if row.len() == fields.len() => {
                        validity.push(true);
                        for (column, v) in columns.iter_mut().zip(row) {
                            column.push(v.clone());
                        }
                    }
                    other => return Err(mismatch(ty, other)),
                }
            }
            let nulls = null_buffer(validity);
            if fields.is_empty() {
                Arc::new(StructArray::new_empty_fields(values.len(), nulls)) as ArrayRef
            } else {
                let children = fields
                    .iter()
                    .zip(&columns)
                    .map(|(field, column)| build_array(&field.data_type, column))
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(StructArray::try_new(struct_fields(fields)?, children, nulls)?) as ArrayRef
            }
        }
    };
    Ok(array)
}

fn layout_mismatch(ty: &LogicalType, array: &dyn Array) -> Error {
    Error::Internal(format!(
        "{ty} column is backed by an Arrow {} array",
        array.data_type()
    ))
}

fn primitive<'a, T: ArrowPrimitiveType>(
    ty: &LogicalType,
    array: &'a dyn Array,
) -> Result<&'a PrimitiveArray<T>> {
    array
        .as_primitive_opt::<T>()
        .ok_or_else(|| layout_mismatch(ty, array))
}

fn read_time(ty: &LogicalType, array: &dyn Array, row: usize, precision: u8) -> Result<i64> {
    let (unit, digits) = time_unit(precision);
    let units = match unit {
        TimeUnit::Second => primitive::<Time32SecondType>(ty, array)?.value(row) as i64,
        TimeUnit::Millisecond => primitive::<Time32MillisecondType>(ty, array)?.value(row) as i64,
        TimeUnit::Microsecond => primitive::<Time64MicrosecondType>(ty, array)?.value(row),
        TimeUnit::Nanosecond => primitive::<Time64NanosecondType>(ty, array)?.value(row),
    };
    Ok(units * 10_i64.pow(9 - digits as u32))
}

fn read_timestamp(
    ty: &LogicalType,
    array: &dyn Array,
    row: usize,
    precision: u8,
) -> Result<Timestamp> {
    let (unit, digits) = time_unit(precision);
    let units = match unit {
        TimeUnit::Second => primitive::<TimestampSecondType>(ty, array)?.value(row),
        TimeUnit::Millisecond => primitive::<TimestampMillisecondType>(ty, array)?.value(row),
        TimeUnit::Microsecond => primitive::<TimestampMicrosecondType>(ty, array)?.value(row),
        TimeUnit::Nanosecond => primitive::<TimestampNanosecondType>(ty, array)?.value(row),
    };
    Timestamp::from_epoch_units(units, digits)
        .ok_or_else(|| Error::Internal(format!("{ty} column holds {units} units")))
}

/// Read the value at `row` of an Arrow column of type `ty`.
pub fn value_from_array(ty: &LogicalType, array: &dyn Array, row: usize) -> Result<EngineValue> {
    if array.is_null(row) {
        return Ok(EngineValue::Null);
    }
    let value = match ty {
        LogicalType::Boolean => EngineValue::Boolean(
            array
                .as_boolean_opt()
                .ok_or_else(|| layout_mismatch(ty, array))?
                .value(row),
        ),
        LogicalType::TinyInt => EngineValue::TinyInt(primitive::<Int8Type>(ty, array)?.value(row)),
        LogicalType::SmallInt => {
            EngineValue::SmallInt(primitive::<Int16Type>(ty, array)?.value(row))
        }
        LogicalType::Integer => EngineValue::Integer(primitive::<Int32Type>(ty, array)?.value(row)),
        LogicalType::BigInt => EngineValue::BigInt(primitive::<Int64Type>(ty, array)?.value(row)),
        LogicalType::Real => EngineValue::Real(primitive::<Float32Type>(ty, array)?.value(row)),
        LogicalType::Double => EngineValue::Double(primitive::<Float64Type>(ty, array)?.value(row)),
        LogicalType::Decimal { scale, .. } => {
            let raw = primitive::<Decimal128Type>(ty, array)?.value(row);
            EngineValue::Decimal(DecimalValue::new(raw, *scale)?)
        }
        LogicalType::Char(_) | LogicalType::VarChar(_) => EngineValue::Varchar(
            array
                .as_string_opt::<i32>()
                .ok_or_else(|| layout_mismatch(ty, array))?
                .value(row)
                .to_string(),
        ),
        LogicalType::Binary(_) | LogicalType::VarBinary(_) => EngineValue::Varbinary(
            array
                .as_binary_opt::<i32>()
                .ok_or_else(|| layout_mismatch(ty, array))?
                .value(row)
                .to_vec(),
        ),
        LogicalType::Date => EngineValue::Date(primitive::<Date32Type>(ty, array)?.value(row)),
        LogicalType::Time(p) => EngineValue::Time(read_time(ty, array, row, *p)?),
        LogicalType::Timestamp(p) => EngineValue::Timestamp(read_timestamp(ty, array, row, *p)?),
        LogicalType::TimestampWithTimeZone(p) => {
            EngineValue::TimestampTz(TimestampTz::utc(read_timestamp(ty, array, row, *p)?))
        }
        LogicalType::Array { element, .. } => {
            let list = array
                .as_list_opt::<i32>()
                .ok_or_else(|| layout_mismatch(ty, array))?;
            let items = list.value(row);
            EngineValue::Array(
                (0..items.len())
                    .map(|i| value_from_array(element, items.as_ref(), i))
                    .collect::<Result<_>>()?,
            )
        }
        LogicalType::Map { key, value, .. } => {
            let map = array.as_map_opt().ok_or_else(|| layout_mismatch(ty, array))?;
            let entries = map.value(row);
            let (keys, values) = (entries.column(0), entries.column(1));
            EngineValue::Map(
                (0..entries.len())
                    .map(|i| {
                        Ok((
                            value_from_array(key, keys.as_ref(), i)?,
                            value_from_array(value, values.as_ref(), i)?,
                        ))
                    })
                    .collect::<Result<_>>()?,
            )
        }
        LogicalType::Row(fields) => {
            let row_array = array
                .as_struct_opt()
                .ok_or_else(|| layout_mismatch(ty, array))?;
            EngineValue::Row(
                fields
                    .iter()
                    .zip(row_array.columns())
                    .map(|(field, column)| value_from_array(&field.data_type, column.as_ref(), row))
                    .collect::<Result<_>>()?,
            )
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(ty: &LogicalType, values: Vec<EngineValue>) {
        let array = build_array(ty, &values).unwrap();
        assert_eq!(array.data_type(), &logical_to_arrow(ty).unwrap());
        assert_eq!(array.len(), values.len());
        for (row, expected) in values.iter().enumerate() {
            assert_eq!(&value_from_array(ty, array.as_ref(), row).unwrap(), expected);
        }
    }

    #[test]
    fn timestamp_precision_picks_unit() {
        assert_eq!(
            logical_to_arrow(&LogicalType::Timestamp(0)).unwrap(),
            ArrowType::Timestamp(TimeUnit::Second, None)
        );
        assert_eq!(
            logical_to_arrow(&LogicalType::Timestamp(5)).unwrap(),
            ArrowType::Timestamp(TimeUnit::Microsecond, None)
        );
        assert_eq!(
            logical_to_arrow(&LogicalType::TimestampWithTimeZone(3)).unwrap(),
            ArrowType::Timestamp(TimeUnit::Millisecond, Some(UTC.into()))
        );
        assert_eq!(
            logical_to_arrow(&LogicalType::Time(9)).unwrap(),
            ArrowType::Time64(TimeUnit::Nanosecond)
        );
    }

    #[test]
    fn decimals_keep_declared_scale() {
        let ty = LogicalType::Decimal {
            precision: 10,
            scale: 5,
        };
        let tenth: DecimalValue = "0.1".parse().unwrap();
        let array = build_array(&ty, &[EngineValue::Decimal(tenth)]).unwrap();
        let value = value_from_array(&ty, array.as_ref(), 0).unwrap();
        assert_eq!(value.render(&ty), "0.10000");
    }

    #[test]
    fn nested_values_survive() {
        let ty = LogicalType::Row(vec![
            RowField::new("tags", LogicalType::array_of(LogicalType::varchar()), true),
            RowField::new(
                "attrs",
                LogicalType::map_of(LogicalType::varchar(), LogicalType::Integer),
                true,
            ),
        ]);
        round_trip(
            &ty,
            vec![
                EngineValue::Row(vec![
                    EngineValue::Array(vec!["a".into(), EngineValue::Null]),
                    EngineValue::Map(vec![("k".into(), EngineValue::Integer(1))]),
                ]),
                EngineValue::Null,
                EngineValue::Row(vec![EngineValue::Null, EngineValue::Map(vec![])]),
            ],
        );
    }

    #[test]
    fn temporal_columns_survive() {
        let ts = Timestamp::new(1_700_000_000, 123_000_000);
        round_trip(
            &LogicalType::Timestamp(3),
            vec![EngineValue::Timestamp(ts), EngineValue::Null],
        );
        round_trip(
            &LogicalType::TimestampWithTimeZone(6),
            vec![EngineValue::TimestampTz(TimestampTz::utc(ts))],
        );
        round_trip(
            &LogicalType::Time(3),
            vec![EngineValue::Time(45_296_789_000_000)],
        );
        round_trip(&LogicalType::Date, vec![EngineValue::Date(19_000)]);
    }

    #[test]
    fn wrong_variant_is_a_mapping_error() {
        let err = build_array(&LogicalType::Integer, &[EngineValue::BigInt(1)]).unwrap_err();
        assert!(matches!(err, Error::TypeMapping(_)));

        let err = build_array(&LogicalType::Timestamp(0), &[EngineValue::Timestamp(
            Timestamp::new(1, 500_000_000),
        )])
        .unwrap_err();
        assert!(matches!(err, Error::TypeMapping(_)));
    }
}
