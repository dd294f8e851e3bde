//! The metadata catalog contract and the in-memory reference catalog.

use std::collections::HashMap;
use std::sync::RwLock;

use quern_common::{QuernError, Result};

use crate::schema::{QualifiedTableName, QualifiedTablePrefix, TableColumn, TableMetadata};

/// Read/write contract for table and schema metadata.
///
/// Listing operations that find nothing return an empty ordered sequence,
/// which is success. Partition-key and partition-value listing are part of
/// the contract surface for connector compatibility; an empty result means
/// "no partitioning information", not "table has no data".
pub trait Metadata: Send + Sync {
    /// Resolve a qualified name to its table metadata.
    ///
    /// # Errors
    /// `TableNotFound` when the name is not registered.
    fn get_table(&self, name: &QualifiedTableName) -> Result<TableMetadata>;

    /// Distinct schema names within `catalog`, sorted.
    fn list_schema_names(&self, catalog: &str) -> Vec<String>;

    /// Qualified names of all tables under `prefix`, sorted.
    fn list_tables(&self, prefix: &QualifiedTablePrefix) -> Vec<QualifiedTableName>;

    /// Columns of all tables under `prefix`, flattened in declared order
    /// with 1-based ordinal positions, grouped by table in sorted order.
    fn list_table_columns(&self, prefix: &QualifiedTablePrefix) -> Vec<TableColumn>;

    /// Register a new table.
    ///
    /// The insert is atomic under concurrent callers: at most one wins, the
    /// others observe `TableAlreadyExists`, never a silent overwrite.
    fn create_table(&self, table: TableMetadata) -> Result<()>;

    /// Partition key names for a table.
    fn list_table_partition_keys(&self, table: &QualifiedTableName) -> Result<Vec<String>>;

    /// Partition key/value maps for all tables under `prefix`.
    fn list_table_partition_values(
        &self,
        prefix: &QualifiedTablePrefix,
    ) -> Result<Vec<HashMap<String, String>>>;
}

/// In-memory reference catalog.
///
/// The table map is the one concurrently mutated structure in the system:
/// registrations serialize on the write lock, lookups and listings share the
/// read lock. Internal storage is never exposed for raw iteration.
#[derive(Debug, Default)]
pub struct InMemoryMetadata {
    tables: RwLock<HashMap<QualifiedTableName, TableMetadata>>,
}

impl InMemoryMetadata {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metadata for InMemoryMetadata {
    fn get_table(&self, name: &QualifiedTableName) -> Result<TableMetadata> {
        self.tables
            .read()
            .expect("catalog lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| QuernError::TableNotFound(name.to_string()))
    }

    fn list_schema_names(&self, catalog: &str) -> Vec<String> {
        let mut schemas: Vec<String> = self
            .list_tables(&QualifiedTablePrefix::catalog(catalog))
            .into_iter()
            .map(|name| name.schema)
            .collect();
        schemas.sort();
        schemas.dedup();
        schemas
    }

    fn list_tables(&self, prefix: &QualifiedTablePrefix) -> Vec<QualifiedTableName> {
        let tables = self.tables.read().expect("catalog lock poisoned");
        let mut names: Vec<QualifiedTableName> = tables
            .keys()
            .filter(|name| prefix.matches(name))
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn list_table_columns(&self, prefix: &QualifiedTablePrefix) -> Vec<TableColumn> {
        let tables = self.tables.read().expect("catalog lock poisoned");
        let mut matching: Vec<&TableMetadata> = tables
            .values()
            .filter(|table| prefix.matches(&table.name))
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));
        matching.into_iter().flat_map(table_columns).collect()
    }

    fn create_table(&self, table: TableMetadata) -> Result<()> {
        let mut tables = self.tables.write().expect("catalog lock poisoned");
        if tables.contains_key(&table.name) {
            return Err(QuernError::TableAlreadyExists(table.name.to_string()));
        }
        tracing::debug!(table = %table.name, columns = table.columns.len(), "table registered");
        tables.insert(table.name.clone(), table);
        Ok(())
    }

    fn list_table_partition_keys(&self, _table: &QualifiedTableName) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn list_table_partition_values(
        &self,
        _prefix: &QualifiedTablePrefix,
    ) -> Result<Vec<HashMap<String, String>>> {
        Ok(Vec::new())
    }
}

/// Flatten one table's columns into listing rows with 1-based ordinals.
fn table_columns(table: &TableMetadata) -> Vec<TableColumn> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| TableColumn {
            table: table.name.clone(),
            name: column.name.clone(),
            ordinal_position: idx + 1,
            data_type: column.data_type.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnMetadata;
    use arrow_schema::DataType;
    use std::sync::Arc;

    fn table(catalog: &str, schema: &str, name: &str) -> TableMetadata {
        TableMetadata::new(
            QualifiedTableName::new(catalog, schema, name),
            vec![
                ColumnMetadata::new("a", DataType::Int64),
                ColumnMetadata::new("b", DataType::Utf8),
            ],
        )
    }

    #[test]
    fn create_then_get_returns_metadata_unchanged() {
        let catalog = InMemoryMetadata::new();
        let t = table("cat", "s1", "t1");
        catalog.create_table(t.clone()).expect("first create");
        let fetched = catalog.get_table(&t.name).expect("lookup");
        assert_eq!(fetched, t);
    }

    #[test]
    fn duplicate_create_is_a_conflict() {
        let catalog = InMemoryMetadata::new();
        let t = table("cat", "s1", "t1");
        catalog.create_table(t.clone()).expect("first create");
        let err = catalog.create_table(t).unwrap_err();
        assert!(matches!(err, QuernError::TableAlreadyExists(_)));
    }

    #[test]
    fn missing_table_is_not_found() {
        let catalog = InMemoryMetadata::new();
        let err = catalog
            .get_table(&QualifiedTableName::new("cat", "s1", "nope"))
            .unwrap_err();
        assert!(matches!(err, QuernError::TableNotFound(_)));
    }

    #[test]
    fn prefix_listing_filters_by_schema_and_catalog() {
        let catalog = InMemoryMetadata::new();
        catalog.create_table(table("cat", "s1", "t1")).unwrap();
        catalog.create_table(table("cat", "s1", "t2")).unwrap();
        catalog.create_table(table("cat", "s2", "t3")).unwrap();

        let s1 = catalog.list_tables(&QualifiedTablePrefix::schema("cat", "s1"));
        let s1_tables: Vec<&str> = s1.iter().map(|n| n.table.as_str()).collect();
        assert_eq!(s1_tables, vec!["t1", "t2"]);

        let all = catalog.list_tables(&QualifiedTablePrefix::catalog("cat"));
        assert_eq!(all.len(), 3);

        let none = catalog.list_tables(&QualifiedTablePrefix::catalog("other"));
        assert!(none.is_empty());
    }

    #[test]
    fn schema_names_are_deduplicated() {
        let catalog = InMemoryMetadata::new();
        catalog.create_table(table("cat", "s1", "t1")).unwrap();
        catalog.create_table(table("cat", "s1", "t2")).unwrap();
        catalog.create_table(table("cat", "s2", "t3")).unwrap();
        assert_eq!(catalog.list_schema_names("cat"), vec!["s1", "s2"]);
    }

    #[test]
    fn column_listing_uses_one_based_ordinals_in_declared_order() {
        let catalog = InMemoryMetadata::new();
        catalog.create_table(table("cat", "s1", "t1")).unwrap();
        let columns = catalog.list_table_columns(&QualifiedTablePrefix::schema("cat", "s1"));
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "a");
        assert_eq!(columns[0].ordinal_position, 1);
        assert_eq!(columns[1].name, "b");
        assert_eq!(columns[1].ordinal_position, 2);
    }

    #[test]
    fn partition_listings_are_empty_for_reference_catalog() {
        let catalog = InMemoryMetadata::new();
        catalog.create_table(table("cat", "s1", "t1")).unwrap();
        let keys = catalog
            .list_table_partition_keys(&QualifiedTableName::new("cat", "s1", "t1"))
            .unwrap();
        assert!(keys.is_empty());
        let values = catalog
            .list_table_partition_values(&QualifiedTablePrefix::catalog("cat"))
            .unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn concurrent_registration_has_exactly_one_winner() {
        let catalog = Arc::new(InMemoryMetadata::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let catalog = Arc::clone(&catalog);
            handles.push(std::thread::spawn(move || {
                catalog.create_table(table("cat", "s1", "contended")).is_ok()
            }));
        }
        let wins = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        assert!(catalog
            .get_table(&QualifiedTableName::new("cat", "s1", "contended"))
            .is_ok());
    }
}
