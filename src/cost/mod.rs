//! Cost-model.

use std::fmt::Debug;

use ordered_float::OrderedFloat;

use crate::operators::physical::PhysicalOp;

pub mod simple;

/// The cost of a plan. Costs of plans are totally ordered so a cost can be used to compare alternatives.
pub type Cost = OrderedFloat<f64>;

/// Estimates a cost of a physical operator.
pub trait CostEstimator: Debug {
    /// Estimates the cost of the given physical operator excluding the cost of its inputs.
    fn estimate_cost(&self, op: &PhysicalOp, ctx: &CostEstimationContext) -> Cost;
}

/// Provides information that can be used to estimate a cost of an operator.
#[derive(Debug, Clone)]
pub struct CostEstimationContext {
    row_count: f64,
    input_rows: Vec<f64>,
    row_width: usize,
    workers: usize,
}

impl CostEstimationContext {
    /// Creates a new context.
    ///
    /// * `row_count` - the number of rows produced by the operator.
    /// * `input_rows` - the number of rows produced by each input of the operator.
    /// * `row_width` - the width of an output row in bytes.
    /// * `workers` - the number of workers a plan is executed on.
    pub fn new(row_count: f64, input_rows: Vec<f64>, row_width: usize, workers: usize) -> Self {
        CostEstimationContext {
            row_count,
            input_rows,
            row_width,
            workers,
        }
    }

    /// The number of rows produced by the operator.
    pub fn row_count(&self) -> f64 {
        self.row_count
    }

    /// The number of rows produced by the i-th input.
    ///
    /// # Panics
    ///
    /// This method panics if there is no i-th input.
    pub fn input_rows(&self, i: usize) -> f64 {
        self.input_rows[i]
    }

    /// The width of an output row in bytes.
    pub fn row_width(&self) -> usize {
        self.row_width
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}
