//! Statistics for available operators.

use std::collections::HashMap;

use crate::error::OptimizerError;
use crate::meta::{ColumnId, Metadata};
use crate::operators::join::JoinType;
use crate::operators::logical::{
    LogicalAggregate, LogicalCteConsumer, LogicalExpr, LogicalGet, LogicalJoin, LogicalLimit, LogicalSelect,
    LogicalSetOp, SetOperator,
};
use crate::operators::scalar::expr::BinaryOp;
use crate::operators::scalar::{ScalarExpr, ScalarValue};
use crate::operators::CteId;
use crate::properties::logical::LogicalProperties;
use crate::statistics::{ColumnStatistics, Statistics, StatisticsBuilder, StatisticsProviderRef, UNKNOWN_ROW_COUNT};

/// Selectivity of an equality predicate when no statistics is available.
pub const DEFAULT_EQ_SELECTIVITY: f64 = 0.1;
/// Selectivity of a range predicate when no statistics is available.
pub const DEFAULT_RANGE_SELECTIVITY: f64 = 1.0 / 3.0;
/// Selectivity of `IS NULL` when no statistics is available.
pub const DEFAULT_IS_NULL_SELECTIVITY: f64 = 0.01;
/// Selectivity of other predicates.
pub const DEFAULT_SELECTIVITY: f64 = 0.5;

/// A simple implementation of [StatisticsBuilder](super::StatisticsBuilder) that uses
/// table and column statistics available via a [StatisticsProvider](super::StatisticsProvider).
#[derive(Debug)]
pub struct SimpleStatisticsBuilder {
    provider: StatisticsProviderRef,
    cte_row_counts: HashMap<CteId, f64>,
}

impl SimpleStatisticsBuilder {
    pub fn new(provider: StatisticsProviderRef) -> Self {
        SimpleStatisticsBuilder {
            provider,
            cte_row_counts: HashMap::new(),
        }
    }

    /// Sets the number of rows produced by the given common table expression.
    pub fn with_cte_row_count(mut self, cte: CteId, row_count: f64) -> Self {
        self.cte_row_counts.insert(cte, row_count);
        self
    }

    fn build_get(&self, get: &LogicalGet) -> Statistics {
        let row_count = self.provider.table_row_count(&get.source).unwrap_or(UNKNOWN_ROW_COUNT);
        Statistics::from_row_count(row_count)
    }

    fn build_select(&self, select: &LogicalSelect, ctx: &SelectivityContext) -> Statistics {
        let input_rows = ctx.inputs[0].row_count();
        let selectivity = self.selectivity(&select.filter, ctx);
        Statistics::new(input_rows * selectivity, selectivity)
    }

    fn build_join(&self, join: &LogicalJoin, ctx: &SelectivityContext) -> Statistics {
        let left = ctx.inputs[0].row_count();
        let right = ctx.inputs[1].row_count();
        let selectivity = match join.join_type.compare() {
            Some(compare) if !matches!(join.join_type, JoinType::Mark { .. }) => {
                self.selectivity(&join.condition, ctx) * self.selectivity(compare, ctx)
            }
            _ => self.selectivity(&join.condition, ctx),
        };
        let inner = left * right * selectivity;
        let semi = left * (right * selectivity).min(1.0);

        let row_count = match &join.join_type {
            JoinType::Inner | JoinType::Cross => inner,
            JoinType::Left => inner.max(left),
            JoinType::Right => inner.max(right),
            JoinType::Full => inner.max(left).max(right),
            JoinType::Semi => semi,
            JoinType::Anti | JoinType::NullAwareAnti { .. } => (left - semi).max(left.min(1.0)),
            JoinType::Mark { .. } | JoinType::Single => left,
        };
        Statistics::from_row_count(row_count)
    }

    fn build_aggregate(&self, aggregate: &LogicalAggregate, ctx: &SelectivityContext) -> Statistics {
        let input_rows = ctx.inputs[0].row_count();
        if aggregate.group_exprs.is_empty() {
            return Statistics::from_row_count(1.0);
        }
        let groups: f64 = aggregate
            .group_exprs
            .iter()
            .map(|column| {
                self.column_statistics(*column, ctx.metadata)
                    .and_then(|s| s.distinct_count())
                    .unwrap_or(input_rows)
                    .max(1.0)
            })
            .product();
        Statistics::from_row_count(groups.min(input_rows))
    }

    fn build_set_operator(&self, set_op: &LogicalSetOp, ctx: &SelectivityContext) -> Statistics {
        let left = ctx.inputs[0].row_count();
        let right = ctx.inputs[1].row_count();
        let row_count = match set_op.op {
            SetOperator::Union => left + right,
            SetOperator::Intersect => left.min(right),
            SetOperator::Except => left,
        };
        Statistics::from_row_count(row_count)
    }

    fn build_limit(&self, limit: &LogicalLimit, ctx: &SelectivityContext) -> Statistics {
        let input_rows = ctx.inputs[0].row_count();
        Statistics::from_row_count(input_rows.min(limit.rows as f64))
    }

    fn build_cte_consumer(&self, consumer: &LogicalCteConsumer) -> Statistics {
        let row_count = self.cte_row_counts.get(&consumer.cte).copied().unwrap_or(UNKNOWN_ROW_COUNT);
        Statistics::from_row_count(row_count)
    }

    /// Returns statistics of a column. Columns computed as a plain reference to another column
    /// share statistics of that column.
    fn column_statistics(&self, column: ColumnId, metadata: &Metadata) -> Option<ColumnStatistics> {
        let mut column = metadata.try_get_column(&column)?;
        // Bounded by the number of columns to protect against malformed metadata.
        for _ in 0..=metadata.columns().count() {
            match (column.table(), column.expr()) {
                (Some(table), _) => return self.provider.column_statistics(table, column.name()),
                (None, Some(ScalarExpr::Column(id))) => column = metadata.try_get_column(id)?,
                (None, _) => return None,
            }
        }
        None
    }

    /// Estimates selectivity of the given predicate.
    pub fn selectivity(&self, expr: &ScalarExpr, ctx: &SelectivityContext) -> f64 {
        let selectivity = match expr {
            ScalarExpr::Scalar(ScalarValue::Bool(true)) => 1.0,
            ScalarExpr::Scalar(ScalarValue::Bool(false)) | ScalarExpr::Scalar(ScalarValue::Null) => 0.0,
            ScalarExpr::BinaryExpr {
                lhs,
                op: BinaryOp::And,
                rhs,
            } => self.selectivity(lhs, ctx) * self.selectivity(rhs, ctx),
            ScalarExpr::BinaryExpr {
                lhs,
                op: BinaryOp::Or,
                rhs,
            } => {
                let l = self.selectivity(lhs, ctx);
                let r = self.selectivity(rhs, ctx);
                l + r - l * r
            }
            ScalarExpr::Not(expr) => 1.0 - self.selectivity(expr, ctx),
            ScalarExpr::BinaryExpr { lhs, op, rhs } if op.is_comparison() => self.comparison_selectivity(lhs, op, rhs, ctx),
            ScalarExpr::IsNull { expr, not } => {
                let selectivity = match expr.as_ref() {
                    ScalarExpr::Column(id) => self
                        .column_statistics(*id, ctx.metadata)
                        .map(|s| s.null_fraction())
                        .unwrap_or(DEFAULT_IS_NULL_SELECTIVITY),
                    _ => DEFAULT_IS_NULL_SELECTIVITY,
                };
                negate_if(selectivity, *not)
            }
            ScalarExpr::InList { expr, list, not } => {
                let selectivity: f64 =
                    list.iter().map(|item| self.comparison_selectivity(expr, &BinaryOp::Eq, item, ctx)).sum();
                negate_if(selectivity.min(1.0), *not)
            }
            ScalarExpr::Between { expr, low, high, not } => {
                let above_low = self.histogram_selectivity(expr, &BinaryOp::GtEq, low, ctx);
                let above_high = self.histogram_selectivity(expr, &BinaryOp::Gt, high, ctx);
                let selectivity = match (above_low, above_high) {
                    (Some(above_low), Some(above_high)) => (above_low - above_high).max(0.0),
                    _ => DEFAULT_RANGE_SELECTIVITY,
                };
                negate_if(selectivity, *not)
            }
            _ => DEFAULT_SELECTIVITY,
        };
        selectivity.clamp(0.0, 1.0)
    }

    fn comparison_selectivity(
        &self,
        lhs: &ScalarExpr,
        op: &BinaryOp,
        rhs: &ScalarExpr,
        ctx: &SelectivityContext,
    ) -> f64 {
        match (lhs, rhs) {
            (ScalarExpr::Column(l), ScalarExpr::Column(r)) if *op == BinaryOp::Eq => {
                let l = self.distinct_count(*l, ctx);
                let r = self.distinct_count(*r, ctx);
                1.0 / l.max(r).max(1.0)
            }
            (ScalarExpr::Scalar(_), ScalarExpr::Column(_)) => self.comparison_selectivity(rhs, &op.swap(), lhs, ctx),
            (ScalarExpr::Column(id), ScalarExpr::Scalar(_)) => {
                if let Some(selectivity) = self.histogram_selectivity(lhs, op, rhs, ctx) {
                    return selectivity;
                }
                let distinct_count = self.column_statistics(*id, ctx.metadata).and_then(|s| s.distinct_count());
                match (op, distinct_count) {
                    (BinaryOp::Eq, Some(n)) => 1.0 / n.max(1.0),
                    (BinaryOp::NotEq, Some(n)) => 1.0 - 1.0 / n.max(1.0),
                    _ => default_comparison_selectivity(op),
                }
            }
            _ => default_comparison_selectivity(op),
        }
    }

    fn histogram_selectivity(
        &self,
        column: &ScalarExpr,
        op: &BinaryOp,
        value: &ScalarExpr,
        ctx: &SelectivityContext,
    ) -> Option<f64> {
        let (id, value) = match (column, value) {
            (ScalarExpr::Column(id), ScalarExpr::Scalar(value)) => (*id, value.as_f64()?),
            _ => return None,
        };
        let statistics = self.column_statistics(id, ctx.metadata)?;
        let histogram = statistics.histogram()?;
        let selectivity = histogram.selectivity(op, value)?;
        Some(selectivity * (1.0 - statistics.null_fraction()))
    }

    fn distinct_count(&self, column: ColumnId, ctx: &SelectivityContext) -> f64 {
        self.column_statistics(column, ctx.metadata)
            .and_then(|s| s.distinct_count())
            .unwrap_or_else(|| ctx.rows_of(column))
    }
}

fn negate_if(selectivity: f64, negate: bool) -> f64 {
    if negate {
        1.0 - selectivity
    } else {
        selectivity
    }
}

fn default_comparison_selectivity(op: &BinaryOp) -> f64 {
    match op {
        BinaryOp::Eq => DEFAULT_EQ_SELECTIVITY,
        BinaryOp::NotEq => 1.0 - DEFAULT_EQ_SELECTIVITY,
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => DEFAULT_RANGE_SELECTIVITY,
        _ => DEFAULT_SELECTIVITY,
    }
}

/// Information available when selectivity of a predicate is estimated.
#[derive(Debug)]
pub struct SelectivityContext<'a> {
    inputs: &'a [&'a LogicalProperties],
    metadata: &'a Metadata,
}

impl<'a> SelectivityContext<'a> {
    pub fn new(inputs: &'a [&'a LogicalProperties], metadata: &'a Metadata) -> Self {
        SelectivityContext { inputs, metadata }
    }

    /// The number of rows of the input that produces the given column.
    fn rows_of(&self, column: ColumnId) -> f64 {
        self.inputs
            .iter()
            .find(|p| p.output_columns().contains(&column))
            .map(|p| p.row_count())
            .unwrap_or(UNKNOWN_ROW_COUNT)
    }
}

impl StatisticsBuilder for SimpleStatisticsBuilder {
    fn build_statistics(
        &self,
        expr: &LogicalExpr,
        inputs: &[&LogicalProperties],
        metadata: &Metadata,
    ) -> Result<Statistics, OptimizerError> {
        if inputs.len() != expr.inputs().len() {
            let message = format!("Expected {} inputs but got {}: {}", expr.inputs().len(), inputs.len(), expr);
            return Err(OptimizerError::internal(message));
        }
        let ctx = SelectivityContext::new(inputs, metadata);
        let statistics = match expr {
            LogicalExpr::Get(get) => self.build_get(get),
            LogicalExpr::Select(select) => self.build_select(select, &ctx),
            LogicalExpr::Projection(_) | LogicalExpr::Window(_) => Statistics::from_row_count(inputs[0].row_count()),
            LogicalExpr::Join(join) => self.build_join(join, &ctx),
            LogicalExpr::Aggregate(aggregate) => self.build_aggregate(aggregate, &ctx),
            LogicalExpr::SetOp(set_op) => self.build_set_operator(set_op, &ctx),
            LogicalExpr::Limit(limit) => self.build_limit(limit, &ctx),
            LogicalExpr::CteConsumer(consumer) => self.build_cte_consumer(consumer),
        };
        Ok(statistics)
    }

    fn selectivity(&self, predicate: &ScalarExpr, inputs: &[&LogicalProperties], metadata: &Metadata) -> f64 {
        let ctx = SelectivityContext::new(inputs, metadata);
        SimpleStatisticsBuilder::selectivity(self, predicate, &ctx)
    }
}
