//! Statistics consumed by the optimizer: table and column statistics provided by a [StatisticsProvider]
//! and cardinality estimates of logical expressions computed by a [StatisticsBuilder].

use std::fmt::Debug;
use std::sync::Arc;

use crate::catalog::CatalogRef;
use crate::error::OptimizerError;
use crate::meta::Metadata;
use crate::operators::logical::LogicalExpr;
use crate::operators::scalar::ScalarExpr;
use crate::properties::logical::LogicalProperties;

pub mod histogram;
pub mod simple;

pub use histogram::Histogram;

/// The number of rows returned by an operator in case when no statistics is available.
pub const UNKNOWN_ROW_COUNT: f64 = 1000f64;

/// Statistics associated with an operator.
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    row_count: f64,
    selectivity: f64,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            row_count: UNKNOWN_ROW_COUNT,
            selectivity: Statistics::DEFAULT_SELECTIVITY,
        }
    }
}

impl Statistics {
    /// The default value of selectivity statistics.
    pub const DEFAULT_SELECTIVITY: f64 = 1.0;

    /// Creates new statistics with the given row count and selectivity.
    ///
    /// # Panics
    ///
    /// This method panics if the row_count is negative or the selectivity lies outside of `[0.0, 1.0]` bounds.
    pub fn new(row_count: f64, selectivity: f64) -> Self {
        assert!(row_count >= 0f64, "row_count must be non negative");
        assert!(
            (0f64..=Self::DEFAULT_SELECTIVITY).contains(&selectivity),
            "selectivity must be within [0.0, 1.0] range but got: {}",
            selectivity
        );
        Statistics { row_count, selectivity }
    }

    /// Creates a new statistics with row_count set to the given value.
    ///
    /// # Panics
    ///
    /// This method panics if row_count is negative.
    pub fn from_row_count(row_count: f64) -> Self {
        Statistics::new(row_count, Self::DEFAULT_SELECTIVITY)
    }

    /// The estimated number of rows returned by an operator.
    pub fn row_count(&self) -> f64 {
        self.row_count
    }

    /// The selectivity of a predicate.
    pub fn selectivity(&self) -> f64 {
        self.selectivity
    }
}

/// Statistics of a column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStatistics {
    distinct_count: Option<f64>,
    null_fraction: f64,
    histogram: Option<Histogram>,
}

impl ColumnStatistics {
    /// Creates new column statistics.
    ///
    /// # Panics
    ///
    /// This method panics if `null_fraction` lies outside of `[0.0, 1.0]` bounds.
    pub fn new(distinct_count: Option<f64>, null_fraction: f64, histogram: Option<Histogram>) -> Self {
        assert!((0f64..=1f64).contains(&null_fraction), "null_fraction must be within [0.0, 1.0] range");
        ColumnStatistics {
            distinct_count,
            null_fraction,
            histogram,
        }
    }

    /// The number of distinct non-NULL values.
    pub fn distinct_count(&self) -> Option<f64> {
        self.distinct_count
    }

    /// The fraction of NULL values.
    pub fn null_fraction(&self) -> f64 {
        self.null_fraction
    }

    /// A histogram of values of the column.
    pub fn histogram(&self) -> Option<&Histogram> {
        self.histogram.as_ref()
    }
}

/// Provides read-only access to table and column statistics.
/// A provider is shared between optimizers that run concurrently.
pub trait StatisticsProvider: Debug + Send + Sync {
    /// Returns the number of rows in the given table.
    fn table_row_count(&self, table: &str) -> Option<f64>;

    /// Returns statistics of the given column of the given table.
    fn column_statistics(&self, table: &str, column: &str) -> Option<ColumnStatistics>;
}

pub type StatisticsProviderRef = Arc<dyn StatisticsProvider>;

/// A [StatisticsProvider] that reads statistics stored in a database catalog.
#[derive(Debug)]
pub struct CatalogStatisticsProvider {
    catalog: CatalogRef,
}

impl CatalogStatisticsProvider {
    /// Creates a statistics provider for the given catalog.
    pub fn new(catalog: CatalogRef) -> Self {
        CatalogStatisticsProvider { catalog }
    }
}

impl StatisticsProvider for CatalogStatisticsProvider {
    fn table_row_count(&self, table: &str) -> Option<f64> {
        let table = self.catalog.get_table(table)?;
        table.statistics().and_then(|s| s.row_count()).map(|r| r as f64)
    }

    fn column_statistics(&self, table: &str, column: &str) -> Option<ColumnStatistics> {
        let table = self.catalog.get_table(table)?;
        table.statistics().and_then(|s| s.column(column)).cloned()
    }
}

/// Computes statistics of logical expressions.
pub trait StatisticsBuilder: Debug {
    /// Builds statistics for the given expression from logical properties of its inputs.
    fn build_statistics(
        &self,
        expr: &LogicalExpr,
        inputs: &[&LogicalProperties],
        metadata: &Metadata,
    ) -> Result<Statistics, OptimizerError>;

    /// Estimates the fraction of rows of the given inputs that satisfy the given predicate.
    fn selectivity(&self, _predicate: &ScalarExpr, _inputs: &[&LogicalProperties], _metadata: &Metadata) -> f64 {
        Statistics::DEFAULT_SELECTIVITY
    }
}
