use colbridge_types::LogicalType;

/// Engine-facing description of one column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    pub logical_type: LogicalType,
    pub nullable: bool,
    pub comment: Option<String>,
}

/// Engine-facing description of a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableMetadata {
    pub schema_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnMetadata>,
}

impl TableMetadata {
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }
}
