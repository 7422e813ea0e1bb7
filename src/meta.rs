use std::cell::RefCell;

use crate::datatypes::DataType;
use crate::operators::scalar::ScalarExpr;

/// Uniquely identifies a column within a query.
pub type ColumnId = usize;

/// Stores a mapping between columns and their identifiers that are globally unique within a query.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    columns: Vec<ColumnMetadata>,
}

/// Column metadata. If the table property is set then this is information about a column that belongs
/// to a database table. Otherwise this is a metadata of a synthetic column produced by an operator
/// (a projection, an aggregate or a mark join).
#[derive(Debug, Clone)]
pub struct ColumnMetadata {
    id: ColumnId,
    /// The name of this column.
    name: String,
    /// The type of this column.
    data_type: DataType,
    /// If present stores the name of the table this column belongs to.
    table: Option<String>,
    /// If present stores a copy of the expression this column is derived from.
    expr: Option<ScalarExpr>,
}

impl ColumnMetadata {
    /// Creates column metadata for a column that belongs to the given table.
    pub fn new_table_column(name: &str, data_type: DataType, table: &str) -> Self {
        ColumnMetadata {
            id: 0,
            name: name.into(),
            data_type,
            table: Some(table.into()),
            expr: None,
        }
    }

    /// Creates column metadata for a synthetic column.
    pub fn new_synthetic_column(name: &str, data_type: DataType, expr: Option<ScalarExpr>) -> Self {
        ColumnMetadata {
            id: 0,
            name: name.into(),
            data_type,
            table: None,
            expr,
        }
    }

    /// Returns the identifier of this column.
    pub fn id(&self) -> ColumnId {
        self.id
    }

    /// Returns the name of this column.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the type of this column.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the table this column belongs to. If the table is absent then this a synthetic column.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Returns a copy of the expression this column is derived from.
    pub fn expr(&self) -> Option<&ScalarExpr> {
        self.expr.as_ref()
    }
}

impl Metadata {
    pub fn new(columns: Vec<ColumnMetadata>) -> Self {
        Metadata { columns }
    }

    /// Retrieves column metadata by the given column id.
    ///
    /// # Panics
    ///
    /// This method panics if there is no metadata for the given column.
    pub fn get_column(&self, column_id: &ColumnId) -> &ColumnMetadata {
        self.try_get_column(column_id)
            .unwrap_or_else(|| panic!("Unknown or unexpected column id: {:?}", column_id))
    }

    /// Retrieves column metadata by the given column id. Returns `None` if there is no such column.
    pub fn try_get_column(&self, column_id: &ColumnId) -> Option<&ColumnMetadata> {
        if *column_id == 0 {
            None
        } else {
            self.columns.get(column_id - 1)
        }
    }

    /// Returns an iterator over available column metadata.
    pub fn columns(&self) -> impl Iterator<Item = (ColumnId, &ColumnMetadata)> {
        self.columns.iter().enumerate().map(|(i, c)| (i + 1, c))
    }

    /// Returns the sum of widths of the given columns.
    pub fn row_width(&self, columns: &[ColumnId]) -> usize {
        columns
            .iter()
            .map(|c| self.try_get_column(c).map(|c| c.data_type.width()).unwrap_or(8))
            .sum::<usize>()
            .max(1)
    }
}

/// A mutable variant of a [Metadata](self::Metadata).
/// Used while a query is built and when the optimizer introduces new columns
/// (for example a mark column of a mark join).
#[derive(Debug, Default)]
pub struct MutableMetadata {
    columns: RefCell<Vec<ColumnMetadata>>,
}

impl MutableMetadata {
    /// Creates a new instance of a MutableMetadata.
    pub fn new() -> Self {
        MutableMetadata {
            columns: RefCell::new(Vec::new()),
        }
    }

    /// Adds a new column to this metadata and returns its identifier.
    /// Every call produces a new identifier, so two references to the same table receive different columns.
    pub fn add_column(&self, mut column: ColumnMetadata) -> ColumnId {
        let mut columns = self.columns.borrow_mut();
        let id = columns.len() + 1;
        column.id = id;
        columns.push(column);
        id
    }

    /// Returns a copy of column metadata for the given column identifier.
    ///
    /// # Panics
    ///
    /// This method panics if there is no metadata for the given column.
    pub fn get_column(&self, column_id: &ColumnId) -> ColumnMetadata {
        let columns = self.columns.borrow();
        columns
            .get(column_id.wrapping_sub(1))
            .cloned()
            .unwrap_or_else(|| panic!("Unknown or unexpected column id: {:?}", column_id))
    }

    /// Creates an instances of a immutable [metadata](self::Metadata) from this metadata.
    pub fn build_metadata(&self) -> Metadata {
        Metadata::new(self.columns.borrow().clone())
    }
}
