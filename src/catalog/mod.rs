//! Database catalog.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;

use crate::datatypes::DataType;
use crate::error::OptimizerError;
use crate::statistics::ColumnStatistics;

pub mod mutable;

pub type CatalogRef = Arc<dyn Catalog>;
pub type TableRef = Arc<Table>;
pub type IndexRef = Arc<Index>;
pub type ColumnRef = Arc<Column>;

/// Provides access to database objects used by the optimizer.
pub trait Catalog: Debug + Sync + Send {
    /// Returns this catalog as [`Any`](std::any::Any) in order it can be downcast to its implementation.
    fn as_any(&self) -> &dyn Any;

    /// Returns a table with the given name.
    fn get_table(&self, name: &str) -> Option<TableRef>;

    /// Returns all indexes of the given table.
    fn get_indexes(&self, table: &str) -> Vec<IndexRef>;
}

/// Represents a database table.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: Vec<ColumnRef>,
    statistics: Option<TableStatistics>,
    distribution: TableDistribution,
    partitions: usize,
}

impl Table {
    /// The name of this table.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The columns of this table.
    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    /// Returns a column with the given name.
    pub fn get_column(&self, name: &str) -> Option<ColumnRef> {
        self.columns.iter().find(|c| c.name == name).cloned()
    }

    /// Returns statistics available for this table.
    pub fn statistics(&self) -> Option<&TableStatistics> {
        self.statistics.as_ref()
    }

    /// Describes how rows of this table are placed across workers.
    pub fn distribution(&self) -> &TableDistribution {
        &self.distribution
    }

    /// The number of partitions the rows of this table are split into.
    pub fn partitions(&self) -> usize {
        self.partitions
    }
}

/// Describes how rows of a table are placed across workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableDistribution {
    /// All rows are stored at a single node.
    Singleton,
    /// Every worker stores a full copy of the table.
    Replicated,
    /// Rows are placed by the hash of the given columns.
    Hash(Vec<String>),
    /// Rows are spread evenly with no relation to their values.
    RoundRobin,
}

/// Statistics for a database table.
#[derive(Debug, Clone, Default)]
pub struct TableStatistics {
    row_count: Option<usize>,
    columns: HashMap<String, ColumnStatistics>,
}

impl TableStatistics {
    /// Creates a new table statistics object.
    pub fn new(row_count: usize) -> Self {
        TableStatistics {
            row_count: Some(row_count),
            columns: HashMap::new(),
        }
    }

    /// The total number of rows in a table.
    pub fn row_count(&self) -> Option<usize> {
        self.row_count
    }

    /// Statistics of the column with the given name.
    pub fn column(&self, name: &str) -> Option<&ColumnStatistics> {
        self.columns.get(name)
    }
}

/// A builder to create instances of a [table].
///
/// [table]: crate::catalog::Table
#[derive(Debug, Clone)]
pub struct TableBuilder {
    name: String,
    columns: Vec<ColumnRef>,
    statistics: Option<TableStatistics>,
    distribution: TableDistribution,
    partitions: usize,
}

impl TableBuilder {
    /// Creates a builder for a table the given name.
    pub fn new(name: &str) -> Self {
        TableBuilder {
            name: name.to_string(),
            columns: Vec::new(),
            statistics: None,
            distribution: TableDistribution::Singleton,
            partitions: 1,
        }
    }

    /// Adds a column with the given name and data type to this table.
    pub fn add_column(mut self, name: &str, data_type: DataType) -> TableBuilder {
        let column = Column::new(name.to_string(), Some(self.name.clone()), data_type);
        self.columns.push(Arc::new(column));
        self
    }

    /// Sets row count statistics for this table.
    pub fn add_row_count(mut self, row_count: usize) -> TableBuilder {
        let statistics = self.statistics.get_or_insert_with(TableStatistics::default);
        statistics.row_count = Some(row_count);
        self
    }

    /// Sets statistics for the column with the given name.
    pub fn add_column_statistics(mut self, column: &str, column_statistics: ColumnStatistics) -> TableBuilder {
        let statistics = self.statistics.get_or_insert_with(TableStatistics::default);
        statistics.columns.insert(column.into(), column_statistics);
        self
    }

    /// Specifies how rows of this table are placed across the given number of partitions.
    pub fn distribution(mut self, distribution: TableDistribution, partitions: usize) -> TableBuilder {
        self.distribution = distribution;
        self.partitions = partitions;
        self
    }

    /// Creates an instance of a [table] with previously specified properties.
    ///
    /// [table]: crate::catalog::Table
    pub fn build(self) -> Result<Table, OptimizerError> {
        if self.columns.is_empty() {
            return Err(OptimizerError::argument("No columns has been specified"));
        }

        let mut names = HashSet::new();
        for col in self.columns.iter() {
            let col_name = col.name();
            if !names.insert(col_name) {
                let message = format!("Column already exists. Column: {} table: {}", col_name, self.name);
                return Err(OptimizerError::argument(message));
            }
        }

        if let Some(statistics) = self.statistics.as_ref() {
            if let Some(name) = statistics.columns.keys().find(|c| !names.contains(c.as_str())) {
                let message = format!("Statistics for unknown column. Column: {} table: {}", name, self.name);
                return Err(OptimizerError::argument(message));
            }
        }

        if let TableDistribution::Hash(keys) = &self.distribution {
            if keys.is_empty() {
                return Err(OptimizerError::argument("Hash distribution requires at least one column"));
            }
            if let Some(key) = keys.iter().find(|c| !names.contains(c.as_str())) {
                let message = format!("Distribution column does not exist. Column: {} table: {}", key, self.name);
                return Err(OptimizerError::argument(message));
            }
        }

        if self.partitions == 0 {
            return Err(OptimizerError::argument("The number of partitions must be positive"));
        }

        Ok(Table {
            name: self.name,
            columns: self.columns,
            statistics: self.statistics,
            distribution: self.distribution,
            partitions: self.partitions,
        })
    }
}

/// Represents a database index. Index scans return rows ordered by the columns of an index.
#[derive(Debug, Clone)]
pub struct Index {
    name: String,
    table: String,
    columns: Vec<ColumnRef>,
    descending: Vec<bool>,
}

impl Index {
    /// The name of this index.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of the table this index is defined for.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the columns covered by this index.
    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    /// Returns pairs of (column, descending) in the order the index is sorted.
    pub fn ordering(&self) -> impl Iterator<Item = (&ColumnRef, bool)> + '_ {
        self.columns.iter().zip(self.descending.iter().copied())
    }
}

/// A builder to create instances of an [Index].
///
/// [Index]: crate::catalog::Index
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    name: String,
    table: TableRef,
    columns: Vec<(String, bool)>,
}

impl IndexBuilder {
    /// Creates a builder for an index with the given name.
    pub fn new(table: TableRef, name: &str) -> Self {
        IndexBuilder {
            name: name.to_string(),
            table,
            columns: Vec::new(),
        }
    }

    /// Adds a column covered by this index. Values of the column are sorted in ascending order.
    pub fn add_column(self, column: &str) -> IndexBuilder {
        self.add_column_with_order(column, false)
    }

    /// Adds a column covered by this index.
    pub fn add_column_with_order(mut self, column: &str, descending: bool) -> IndexBuilder {
        self.columns.push((column.into(), descending));
        self
    }

    /// Creates an instance of an [index] with previously specified properties.
    ///
    /// [index]: crate::catalog::Index
    pub fn build(self) -> Result<Index, OptimizerError> {
        if self.columns.is_empty() {
            return Err(OptimizerError::argument("No columns have been specified"));
        }

        let mut columns = Vec::with_capacity(self.columns.len());
        let mut descending = Vec::with_capacity(self.columns.len());

        for (name, desc) in self.columns {
            match self.table.get_column(name.as_str()) {
                Some(col) => {
                    columns.push(col);
                    descending.push(desc);
                }
                None => {
                    return Err(OptimizerError::argument(format!(
                        "Column does not exist. Table: {}, column: {}",
                        &self.table.name, name
                    )))
                }
            }
        }

        Ok(Index {
            name: self.name,
            table: self.table.name.clone(),
            columns,
            descending,
        })
    }
}

/// A column of a database table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    table: Option<String>,
    data_type: DataType,
}

impl Column {
    pub(crate) fn new(column_name: String, table_name: Option<String>, data_type: DataType) -> Self {
        Column {
            name: column_name,
            table: table_name,
            data_type,
        }
    }

    /// The name of this column.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The table this column belongs to.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// The data type of this column.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }
}
