use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::meta::ColumnId;

/// Ordering. Describes how columns are sorted.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct OrderingChoice {
    columns: Vec<OrderingColumn>,
}

impl OrderingChoice {
    /// Creates an ordering from the given ordering columns.
    ///
    /// # Panics
    ///
    /// This method panics if the ordering columns are empty.
    pub fn new(columns: Vec<OrderingColumn>) -> Self {
        assert!(!columns.is_empty(), "columns are not specified");
        OrderingChoice { columns }
    }

    /// Creates an ordering from the given columns.
    /// Returns an ordering where all columns are ordered in ascending order.
    pub fn from_columns(columns: Vec<ColumnId>) -> Self {
        OrderingChoice::new(columns.into_iter().map(OrderingColumn::asc).collect())
    }

    /// A reference to the ordering columns.
    pub fn columns(&self) -> &[OrderingColumn] {
        &self.columns
    }

    /// Returns true if the this ordering is the prefix of the given ordering.
    /// Rows sorted by `[a, b]` are also sorted by `[a]`, so `[a]` is satisfied by `[a, b]`.
    pub fn prefix_of(&self, other: &OrderingChoice) -> bool {
        if self.columns.len() > other.columns.len() {
            return false;
        }
        self.columns.iter().zip(other.columns.iter()).all(|(l, r)| l == r)
    }

    /// Creates a new ordering that replaces all columns from the `source_columns`
    /// with the columns in `output_columns`. Returns `None` if a column is not present in `source_columns`.
    pub fn with_mapping(&self, source_columns: &[ColumnId], output_columns: &[ColumnId]) -> Option<OrderingChoice> {
        let columns: Option<Vec<_>> = self
            .columns
            .iter()
            .map(|col| {
                source_columns
                    .iter()
                    .position(|s| *s == col.column())
                    .and_then(|p| output_columns.get(p))
                    .map(|output| OrderingColumn::ord(*output, col.descending()))
            })
            .collect();
        columns.map(|columns| OrderingChoice { columns })
    }

    /// Returns the longest prefix of this ordering that consists only of the given columns.
    pub fn prefix_within(&self, columns: &[ColumnId]) -> Option<OrderingChoice> {
        let prefix: Vec<_> = self.columns.iter().copied().take_while(|c| columns.contains(&c.column())).collect();
        if prefix.is_empty() {
            None
        } else {
            Some(OrderingChoice { columns: prefix })
        }
    }

    /// Converts this ordering into a `Vec` of column identifiers.
    pub fn into_columns(self) -> Vec<ColumnId> {
        self.columns.into_iter().map(|c| c.column()).collect()
    }
}

impl Display for OrderingChoice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.columns.iter().join(", "))
    }
}

/// Specifies how the column is sorted.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash, Ord, PartialOrd)]
pub struct OrderingColumn(i32);

impl OrderingColumn {
    /// Creates an ordering for the given column.
    pub fn ord(id: ColumnId, descending: bool) -> Self {
        if descending {
            OrderingColumn::desc(id)
        } else {
            OrderingColumn::asc(id)
        }
    }

    /// Ordering in ascending order for the given column.
    pub fn asc(id: ColumnId) -> Self {
        OrderingColumn(id as i32)
    }

    /// Ordering in descending order for the given column.
    pub fn desc(id: ColumnId) -> Self {
        OrderingColumn(-(id as i32))
    }

    /// Returns the column.
    pub fn column(&self) -> ColumnId {
        self.0.unsigned_abs() as ColumnId
    }

    /// Returns `true` if the column is sorted in descending order.
    pub fn descending(&self) -> bool {
        self.0 < 0
    }
}

impl Display for OrderingColumn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.descending() {
            // if ordering is descending than the column id has a negative sign.
            write!(f, "{}", self.0)
        } else {
            write!(f, "+{}", self.0)
        }
    }
}
