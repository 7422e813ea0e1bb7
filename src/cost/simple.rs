use std::fmt::{Debug, Formatter};

use ordered_float::OrderedFloat;

use crate::cost::{Cost, CostEstimationContext, CostEstimator};
use crate::operators::physical::PhysicalOp;

/// A very simple implementation of a [CostEstimator].
///
/// [CostEstimator]: crate::cost::CostEstimator
pub struct SimpleCostEstimator {
    _private: (),
}

impl SimpleCostEstimator {
    pub fn new() -> Self {
        SimpleCostEstimator { _private: () }
    }

    fn exchange_cost(ctx: &CostEstimationContext) -> f64 {
        0.1 * ctx.input_rows(0) * ctx.row_width() as f64 / 8.0
    }
}

impl Default for SimpleCostEstimator {
    fn default() -> Self {
        SimpleCostEstimator::new()
    }
}

impl CostEstimator for SimpleCostEstimator {
    fn estimate_cost(&self, op: &PhysicalOp, ctx: &CostEstimationContext) -> Cost {
        let cost = match op {
            PhysicalOp::Scan { .. } => ctx.row_count(),
            PhysicalOp::IndexScan { .. } => 1.5 * ctx.row_count(),
            PhysicalOp::Filter { .. } => 0.1 * ctx.input_rows(0),
            PhysicalOp::Projection { .. } => 0.01 * ctx.input_rows(0),
            PhysicalOp::HashJoin { .. } => {
                let probe = ctx.input_rows(0);
                let build = ctx.input_rows(1);
                2.0 * build + probe + ctx.row_count()
            }
            PhysicalOp::MergeJoin { .. } => ctx.input_rows(0) + ctx.input_rows(1) + ctx.row_count(),
            PhysicalOp::NestedLoopJoin { .. } => (ctx.input_rows(0) + 10.0) * (ctx.input_rows(1) + 10.0),
            PhysicalOp::HashAggregate { .. } => ctx.input_rows(0) + 2.0 * ctx.row_count(),
            PhysicalOp::StreamingAggregate { .. } => 0.5 * ctx.input_rows(0) + ctx.row_count(),
            PhysicalOp::HashSetOp { .. } => 2.0 * (ctx.input_rows(0) + ctx.input_rows(1)),
            PhysicalOp::Limit { .. } => 0.01 * ctx.row_count(),
            PhysicalOp::Window { window_exprs, .. } => ctx.input_rows(0) * (1.0 + 0.5 * window_exprs.len() as f64),
            PhysicalOp::CteScan { .. } => ctx.row_count(),
            PhysicalOp::Sort { .. } => {
                let rows = ctx.input_rows(0);
                rows * (0.1 + rows.max(1.0).ln())
            }
            PhysicalOp::Gather | PhysicalOp::Redistribute { .. } => Self::exchange_cost(ctx),
            PhysicalOp::Broadcast => Self::exchange_cost(ctx) * ctx.workers() as f64,
        };
        OrderedFloat(cost)
    }
}

impl Debug for SimpleCostEstimator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimpleCostEstimator")
    }
}
