use std::fmt::Debug;

use crate::error::OptimizerError;
use crate::meta::{ColumnId, Metadata};
use crate::operators::logical::LogicalExpr;
use crate::operators::scalar::ScalarExpr;
use crate::statistics::{Statistics, StatisticsBuilder};

/// Properties that are identical across all expressions within a memo group.
#[derive(Debug, Clone)]
pub struct LogicalProperties {
    output_columns: Vec<ColumnId>,
    statistics: Statistics,
}

impl LogicalProperties {
    /// Creates a new instance of `LogicalProperties` with the specified attributes.
    pub fn new(output_columns: Vec<ColumnId>, statistics: Statistics) -> Self {
        LogicalProperties {
            output_columns,
            statistics,
        }
    }

    /// Returns the columns produced by the expression.
    /// The order of columns is the order of the first expression added to a group.
    pub fn output_columns(&self) -> &[ColumnId] {
        &self.output_columns
    }

    /// Returns statistics for the expression.
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Shorthand for `self.statistics().row_count()`.
    pub fn row_count(&self) -> f64 {
        self.statistics.row_count()
    }
}

/// Builds logical properties of memo groups.
#[derive(Debug)]
pub struct LogicalPropertiesBuilder {
    statistics: Box<dyn StatisticsBuilder>,
    metadata: Metadata,
}

impl LogicalPropertiesBuilder {
    /// Creates a new builder that uses the given statistics builder.
    pub fn new(statistics: Box<dyn StatisticsBuilder>, metadata: Metadata) -> Self {
        LogicalPropertiesBuilder { statistics, metadata }
    }

    /// Builds logical properties for the given expression from the properties of its inputs.
    pub fn build_properties(
        &self,
        expr: &LogicalExpr,
        inputs: &[&LogicalProperties],
    ) -> Result<LogicalProperties, OptimizerError> {
        let input_columns: Vec<&[ColumnId]> = inputs.iter().map(|p| p.output_columns()).collect();
        let output_columns = expr.output_columns(&input_columns)?;
        let statistics = self.statistics.build_statistics(expr, inputs, &self.metadata)?;
        Ok(LogicalProperties::new(output_columns, statistics))
    }

    /// Estimates selectivity of the given predicate evaluated over rows of the given inputs.
    pub fn selectivity(&self, predicate: &ScalarExpr, inputs: &[&LogicalProperties]) -> f64 {
        self.statistics.selectivity(predicate, inputs, &self.metadata)
    }

    /// The metadata used by this builder.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}
