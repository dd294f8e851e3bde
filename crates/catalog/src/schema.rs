//! Qualified names and table/column descriptors.

use arrow_schema::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fully qualified table name: `(catalog, schema, table)`.
///
/// Value type and the catalog's lookup key; unique within a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedTableName {
    /// Catalog name.
    pub catalog: String,
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
}

impl QualifiedTableName {
    /// Build a qualified name from its three parts.
    pub fn new(
        catalog: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for QualifiedTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.table)
    }
}

/// Listing prefix: catalog required, schema and table optional.
///
/// An unspecified part is a wildcard. A name matches iff the catalog is equal
/// and each specified part is equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifiedTablePrefix {
    /// Catalog name, always required.
    pub catalog: String,
    /// Optional schema restriction.
    pub schema: Option<String>,
    /// Optional table restriction.
    pub table: Option<String>,
}

impl QualifiedTablePrefix {
    /// Prefix matching every table in `catalog`.
    pub fn catalog(catalog: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            schema: None,
            table: None,
        }
    }

    /// Prefix matching every table in `catalog.schema`.
    pub fn schema(catalog: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            schema: Some(schema.into()),
            table: None,
        }
    }

    /// Prefix matching exactly `catalog.schema.table`.
    pub fn table(
        catalog: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            schema: Some(schema.into()),
            table: Some(table.into()),
        }
    }

    /// Whether `name` falls under this prefix.
    pub fn matches(&self, name: &QualifiedTableName) -> bool {
        self.catalog == name.catalog
            && self.schema.as_ref().map_or(true, |s| *s == name.schema)
            && self.table.as_ref().map_or(true, |t| *t == name.table)
    }
}

/// A single column: name plus scalar type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// Column name, unique within its table.
    pub name: String,
    /// Scalar type.
    pub data_type: DataType,
}

impl ColumnMetadata {
    /// Build a column descriptor.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// A table: qualified name plus ordered column list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    /// Qualified table name.
    pub name: QualifiedTableName,
    /// Columns in declared order.
    pub columns: Vec<ColumnMetadata>,
}

impl TableMetadata {
    /// Build table metadata from a name and its columns.
    pub fn new(name: QualifiedTableName, columns: Vec<ColumnMetadata>) -> Self {
        Self { name, columns }
    }

    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Flattened column listing row with a 1-based ordinal position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    /// Owning table.
    pub table: QualifiedTableName,
    /// Column name.
    pub name: String,
    /// Position within the table, starting at 1.
    pub ordinal_position: usize,
    /// Scalar type.
    pub data_type: DataType,
}
