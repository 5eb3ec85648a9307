//! Storage-side logical types and schemas.
//!
//! The storage engine describes every column with a [`DataType`] that carries
//! its own nullability, and every schema field with a stable [`FieldId`]. A
//! [`RowType`] is one schema version; data files remember the version they were
//! written with.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::FieldId;

/// Length used by unbounded `VARCHAR` / `VARBINARY` columns.
pub const MAX_LENGTH: u32 = u32::MAX;

/// Maximum fractional-second precision of time and timestamp types.
pub const MAX_TIME_PRECISION: u8 = 9;

/// Storage type root, without nullability.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal { precision: u8, scale: u8 },
    Char(u32),
    VarChar(u32),
    Binary(u32),
    VarBinary(u32),
    Date,
    Time(u8),
    Timestamp(u8),
    LocalZonedTimestamp(u8),
    Array(Box<DataType>),
    Map { key: Box<DataType>, value: Box<DataType> },
    Row(Vec<DataField>),
}

impl TypeKind {
    /// Wrap the kind in a nullable [`DataType`].
    pub fn nullable(self) -> DataType {
        DataType {
            kind: self,
            nullable: true,
        }
    }

    /// Wrap the kind in a `NOT NULL` [`DataType`].
    pub fn not_null(self) -> DataType {
        DataType {
            kind: self,
            nullable: false,
        }
    }
}

/// Storage data type: a type root plus nullability.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    pub kind: TypeKind,
    pub nullable: bool,
}

impl DataType {
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Copy of this type with a different nullability.
    pub fn with_nullable(&self, nullable: bool) -> DataType {
        DataType {
            kind: self.kind.clone(),
            nullable,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Boolean => f.write_str("BOOLEAN")?,
            TypeKind::TinyInt => f.write_str("TINYINT")?,
            TypeKind::SmallInt => f.write_str("SMALLINT")?,
            TypeKind::Int => f.write_str("INT")?,
            TypeKind::BigInt => f.write_str("BIGINT")?,
            TypeKind::Float => f.write_str("FLOAT")?,
            TypeKind::Double => f.write_str("DOUBLE")?,
            TypeKind::Decimal { precision, scale } => write!(f, "DECIMAL({precision}, {scale})")?,
            TypeKind::Char(len) => write!(f, "CHAR({len})")?,
            TypeKind::VarChar(MAX_LENGTH) => f.write_str("STRING")?,
            TypeKind::VarChar(len) => write!(f, "VARCHAR({len})")?,
            TypeKind::Binary(len) => write!(f, "BINARY({len})")?,
            TypeKind::VarBinary(MAX_LENGTH) => f.write_str("BYTES")?,
            TypeKind::VarBinary(len) => write!(f, "VARBINARY({len})")?,
            TypeKind::Date => f.write_str("DATE")?,
            TypeKind::Time(p) => write!(f, "TIME({p})")?,
            TypeKind::Timestamp(p) => write!(f, "TIMESTAMP({p})")?,
            TypeKind::LocalZonedTimestamp(p) => write!(f, "TIMESTAMP({p}) WITH LOCAL TIME ZONE")?,
            TypeKind::Array(element) => write!(f, "ARRAY<{element}>")?,
            TypeKind::Map { key, value } => write!(f, "MAP<{key}, {value}>")?,
            TypeKind::Row(fields) => {
                f.write_str("ROW<")?;
                for (idx, field) in fields.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} {}", field.name, field.data_type)?;
                }
                f.write_str(">")?;
            }
        }
        if !self.nullable {
            f.write_str(" NOT NULL")?;
        }
        Ok(())
    }
}

/// Field of a storage schema.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataField {
    pub id: FieldId,
    pub name: String,
    pub data_type: DataType,
    pub description: Option<String>,
}

impl DataField {
    pub fn new(id: FieldId, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id,
            name: name.into(),
            data_type,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }
}

/// One version of a table's storage schema.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RowType {
    fields: Vec<DataField>,
}

impl RowType {
    pub fn new(fields: Vec<DataField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[DataField] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Ordinal of the field called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, index: usize) -> Option<&DataField> {
        self.fields.get(index)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&DataField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Ordinal and definition of the field with stable identifier `id`.
    pub fn field_by_id(&self, id: FieldId) -> Option<(usize, &DataField)> {
        self.fields.iter().enumerate().find(|(_, f)| f.id == id)
    }

    pub fn type_at(&self, index: usize) -> Option<&DataType> {
        self.fields.get(index).map(|f| &f.data_type)
    }

    /// Schema made of the fields at `indices`, in that order.
    ///
    /// Indices past the end are skipped; callers validate them beforehand.
    pub fn project(&self, indices: &[usize]) -> RowType {
        RowType::new(
            indices
                .iter()
                .filter_map(|&idx| self.fields.get(idx).cloned())
                .collect(),
        )
    }

    /// Largest field ID used at the top level, if any field exists.
    pub fn highest_field_id(&self) -> Option<FieldId> {
        self.fields.iter().map(|f| f.id).max()
    }
}

impl FromIterator<DataField> for RowType {
    fn from_iter<T: IntoIterator<Item = DataField>>(iter: T) -> Self {
        RowType::new(iter.into_iter().collect())
    }
}
