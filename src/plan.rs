//! The result of the optimization: a tree of physical operators.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::cost::Cost;
use crate::memo::MemoSnapshot;
use crate::meta::{ColumnId, Metadata};
use crate::operators::physical::PhysicalOp;
use crate::operators::{CteId, SubQueryId};
use crate::properties::{Distribution, PropertySet};

/// A physical plan. Unlike physical expressions stored in a memo inputs of a plan are plans themselves.
#[derive(Debug, Clone)]
pub struct PhysicalPlan {
    op: PhysicalOp,
    inputs: Vec<PhysicalPlan>,
    output_columns: Vec<ColumnId>,
    properties: PropertySet,
    cost: Cost,
    row_count: f64,
}

impl PhysicalPlan {
    /// Creates a new plan node. `cost` is the total cost of the node and its inputs.
    pub fn new(op: PhysicalOp, inputs: Vec<PhysicalPlan>, properties: PropertySet, cost: Cost, row_count: f64) -> Self {
        let output_columns = {
            let input_columns: Vec<&[ColumnId]> = inputs.iter().map(|i| i.output_columns.as_slice()).collect();
            op.output_columns(&input_columns)
        };
        PhysicalPlan {
            op,
            inputs,
            output_columns,
            properties,
            cost,
            row_count,
        }
    }

    pub fn op(&self) -> &PhysicalOp {
        &self.op
    }

    pub fn inputs(&self) -> &[PhysicalPlan] {
        &self.inputs
    }

    /// Columns produced by this plan in the order they appear in its rows.
    pub fn output_columns(&self) -> &[ColumnId] {
        &self.output_columns
    }

    /// Physical properties delivered by this plan.
    pub fn properties(&self) -> &PropertySet {
        &self.properties
    }

    /// The total cost of this plan.
    pub fn cost(&self) -> Cost {
        self.cost
    }

    /// The estimated number of rows.
    pub fn row_count(&self) -> f64 {
        self.row_count
    }

    /// Visits nodes of this plan in pre-order.
    pub fn for_each<F>(&self, f: &mut F)
    where
        F: FnMut(&PhysicalPlan),
    {
        f(self);
        for input in self.inputs.iter() {
            input.for_each(f);
        }
    }

    /// Returns operators of this plan one per line without cost annotations.
    pub fn format_ops(&self) -> String {
        let mut buf = String::new();
        self.write_tree(&mut buf, 0, false);
        buf
    }

    fn write_tree(&self, buf: &mut String, depth: usize, annotate: bool) {
        buf.push_str(&"  ".repeat(depth));
        buf.push_str(&self.op.to_string());
        if annotate {
            buf.push_str(&format!(" rows={:.2} cost={:.2}", self.row_count, self.cost.into_inner()));
            let singleton = matches!(self.properties.distribution(), Distribution::Singleton);
            if self.properties.ordering().is_some() || !singleton {
                buf.push_str(&format!(" props={}", self.properties));
            }
        }
        buf.push('\n');
        for input in self.inputs.iter() {
            input.write_tree(buf, depth + 1, annotate);
        }
    }
}

/// EXPLAIN-style representation: an operator per line annotated with
/// the estimated row count and the total cost.
impl Display for PhysicalPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut buf = String::new();
        self.write_tree(&mut buf, 0, true);
        write!(f, "{}", buf)
    }
}

/// A plan of a subquery or of a common table expression.
#[derive(Debug, Clone)]
pub struct SubPlan {
    pub plan: PhysicalPlan,
    /// Columns of the subquery in the order they were written. A scalar or `IN` subquery
    /// uses the first column, a consumer of a table expression maps its columns by position.
    pub output_columns: Vec<ColumnId>,
}

/// An optimized query.
#[derive(Debug, Clone)]
pub struct OptimizedQuery {
    /// The plan of the query.
    pub plan: PhysicalPlan,
    /// Columns returned to the client in the order they must be presented.
    pub output_columns: Vec<ColumnId>,
    /// Plans of subqueries that are evaluated per row of an outer query.
    pub subplans: HashMap<SubQueryId, SubPlan>,
    /// Plans of common table expressions read by [CteScan](PhysicalOp::CteScan) operators.
    pub ctes: HashMap<CteId, SubPlan>,
    /// Metadata of all columns referenced by the plans.
    pub metadata: Metadata,
    /// A snapshot of the memo. Only present when [retain_memo](crate::options::OptimizerOptions::retain_memo) is set.
    pub memo: Option<MemoSnapshot>,
}

impl Display for OptimizedQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "output=[{}]", self.output_columns.iter().join(", "))?;
        write!(f, "{}", self.plan)?;
        for (id, subplan) in self.ctes.iter().sorted_by_key(|(id, _)| **id) {
            writeln!(f, "{} output=[{}]:", id, subplan.output_columns.iter().join(", "))?;
            write!(f, "{}", subplan.plan)?;
        }
        for (id, subplan) in self.subplans.iter().sorted_by_key(|(id, _)| **id) {
            writeln!(f, "{} output=[{}]:", id, subplan.output_columns.iter().join(", "))?;
            write!(f, "{}", subplan.plan)?;
        }
        Ok(())
    }
}
