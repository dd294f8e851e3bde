//! Splits and the data-source boundary.
//!
//! A split identifies the physical partition a table scan must read. Splits
//! are assigned externally (by the distributed coordinator) to each
//! table-scan node id before local planning; this core only validates that
//! the mapping is complete.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use arrow::record_batch::RecordBatch;

use quern_catalog::{QualifiedTableName, TableMetadata};
use quern_common::{QuernError, Result};

/// Physical data partition for one table scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Split {
    /// Table the partition belongs to.
    pub table: QualifiedTableName,
    /// Partition ordinal within the table.
    pub partition: usize,
}

impl Split {
    /// Build a split for `partition` of `table`.
    pub fn new(table: QualifiedTableName, partition: usize) -> Self {
        Self { table, partition }
    }
}

/// Finite, one-shot page sequence for one split.
pub type PageIterator = Box<dyn Iterator<Item = Result<RecordBatch>> + Send>;

/// Read access to physical table data.
///
/// `get_pages` returns the split's pages lazily, projected to
/// `requested_columns` in the requested order. The sequence is finite and
/// may be consumed exactly once.
pub trait DataSourceProvider: Send + Sync {
    /// Open one split for reading.
    ///
    /// # Errors
    /// `InvalidArgument` for a split that does not exist.
    fn get_pages(&self, split: &Split, requested_columns: &[String]) -> Result<PageIterator>;
}

/// In-memory reference provider used for testing and embedding.
///
/// Each registered batch of a table is one split.
#[derive(Debug, Default)]
pub struct InMemoryDataSource {
    tables: RwLock<HashMap<QualifiedTableName, StoredTable>>,
}

#[derive(Debug, Clone)]
struct StoredTable {
    metadata: TableMetadata,
    partitions: Vec<RecordBatch>,
}

impl InMemoryDataSource {
    /// Empty data source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table's data; each batch becomes one split.
    pub fn register_table(&self, metadata: TableMetadata, partitions: Vec<RecordBatch>) {
        let mut tables = self.tables.write().expect("data source lock poisoned");
        tables.insert(
            metadata.name.clone(),
            StoredTable {
                metadata,
                partitions,
            },
        );
    }

    /// One split per registered partition of `table`.
    pub fn splits(&self, table: &QualifiedTableName) -> Vec<Split> {
        let tables = self.tables.read().expect("data source lock poisoned");
        tables
            .get(table)
            .map(|stored| {
                (0..stored.partitions.len())
                    .map(|partition| Split::new(table.clone(), partition))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl DataSourceProvider for InMemoryDataSource {
    fn get_pages(&self, split: &Split, requested_columns: &[String]) -> Result<PageIterator> {
        let tables = self.tables.read().expect("data source lock poisoned");
        let stored = tables.get(&split.table).ok_or_else(|| {
            QuernError::InvalidArgument(format!("unknown table in split: {}", split.table))
        })?;
        let batch = stored.partitions.get(split.partition).ok_or_else(|| {
            QuernError::InvalidArgument(format!(
                "unknown partition {} for table {}",
                split.partition, split.table
            ))
        })?;

        let indices = requested_columns
            .iter()
            .map(|name| {
                stored
                    .metadata
                    .columns
                    .iter()
                    .position(|c| &c.name == name)
                    .ok_or_else(|| {
                        QuernError::InvalidArgument(format!(
                            "unknown column '{name}' requested from {}",
                            split.table
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let projected = batch
            .project(&indices)
            .map_err(|e| QuernError::Execution(format!("split projection failed: {e}")))?;
        Ok(Box::new(std::iter::once(Ok(projected))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow_schema::{DataType, Field, Schema};
    use quern_catalog::ColumnMetadata;

    fn fixture() -> (InMemoryDataSource, QualifiedTableName) {
        let name = QualifiedTableName::new("cat", "sch", "t");
        let metadata = TableMetadata::new(
            name.clone(),
            vec![
                ColumnMetadata::new("a", DataType::Int64),
                ColumnMetadata::new("b", DataType::Int64),
            ],
        );
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(Int64Array::from(vec![10, 20])),
            ],
        )
        .unwrap();
        let source = InMemoryDataSource::new();
        source.register_table(metadata, vec![batch]);
        (source, name)
    }

    #[test]
    fn pages_are_projected_in_requested_order() {
        let (source, name) = fixture();
        let splits = source.splits(&name);
        assert_eq!(splits.len(), 1);
        let mut pages = source
            .get_pages(&splits[0], &["b".to_string(), "a".to_string()])
            .unwrap();
        let page = pages.next().unwrap().unwrap();
        assert_eq!(page.num_columns(), 2);
        assert_eq!(page.schema().field(0).name(), "b");
        assert!(pages.next().is_none());
    }

    #[test]
    fn unknown_split_is_an_invalid_argument() {
        let (source, name) = fixture();
        let bad = Split::new(name, 9);
        assert!(matches!(
            source.get_pages(&bad, &["a".to_string()]).err().unwrap(),
            QuernError::InvalidArgument(_)
        ));
    }
}
