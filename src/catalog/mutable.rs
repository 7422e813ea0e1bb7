//! Mutable implementation of a database catalog.

use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::catalog::{Catalog, Index, IndexRef, Table, TableRef};
use crate::error::OptimizerError;

/// A [database catalog] that stores database objects in memory and provides operation to add/remove database objects.
///
/// # Error handling
///
/// Errors returned by methods of the `MutableCatalog` are recoverable.
///
/// [database catalog]: crate::catalog::Catalog
#[derive(Debug, Default)]
pub struct MutableCatalog {
    inner: RwLock<MutableCatalogInner>,
}

#[derive(Debug, Default)]
struct MutableCatalogInner {
    tables: HashMap<String, TableRef>,
    indexes: HashMap<String, Vec<IndexRef>>,
}

impl MutableCatalog {
    /// Creates a instance of [MutableCatalog].
    pub fn new() -> Self {
        MutableCatalog {
            inner: RwLock::new(MutableCatalogInner::default()),
        }
    }

    /// Adds the given table to this catalog.
    /// If the table already exists this method returns an error.
    pub fn add_table(&self, table: Table) -> Result<TableRef, OptimizerError> {
        let mut inner = self.write()?;
        match inner.tables.entry(table.name().to_string()) {
            Entry::Occupied(_) => Err(OptimizerError::argument(format!("Table already exists: {}", table.name()))),
            Entry::Vacant(v) => {
                let table = Arc::new(table);
                v.insert(table.clone());
                Ok(table)
            }
        }
    }

    /// Adds the given index to this catalog.
    /// If the table of the index does not exist or an index with the same name already exists
    /// this method returns an error.
    pub fn add_index(&self, index: Index) -> Result<(), OptimizerError> {
        let mut inner = self.write()?;
        if !inner.tables.contains_key(index.table()) {
            return Err(OptimizerError::argument(format!("Table does not exist: {}", index.table())));
        }
        let indexes = inner.indexes.entry(index.table().to_string()).or_default();
        if indexes.iter().any(|i| i.name() == index.name()) {
            return Err(OptimizerError::argument(format!("Index already exists: {}", index.name())));
        }
        indexes.push(Arc::new(index));
        Ok(())
    }

    /// Removes the table with the given name and all its indexes.
    /// If the table does not exist this method returns an error.
    pub fn remove_table(&self, table: &str) -> Result<(), OptimizerError> {
        let mut inner = self.write()?;
        if inner.tables.remove(table).is_none() {
            return Err(OptimizerError::argument(format!("Table does not exist: {}", table)));
        }
        inner.indexes.remove(table);
        Ok(())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MutableCatalogInner>, OptimizerError> {
        self.inner.write().map_err(|_| OptimizerError::internal("Catalog lock is poisoned"))
    }
}

impl Catalog for MutableCatalog {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn get_table(&self, name: &str) -> Option<TableRef> {
        let inner = self.inner.read().ok()?;
        inner.tables.get(name).cloned()
    }

    fn get_indexes(&self, table: &str) -> Vec<IndexRef> {
        match self.inner.read() {
            Ok(inner) => inner.indexes.get(table).cloned().unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }
}
