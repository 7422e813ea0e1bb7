use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::meta::ColumnId;
use crate::operators::join::JoinType;
use crate::operators::logical::SetOperator;
use crate::operators::scalar::ScalarExpr;
use crate::operators::CteId;
use crate::properties::OrderingChoice;

/// Physical operators. Inputs of physical operators are stored separately
/// (see [PhysicalExpr](crate::memo::PhysicalExpr) and [PhysicalPlan](crate::plan::PhysicalPlan)).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PhysicalOp {
    Scan {
        source: String,
        columns: Vec<ColumnId>,
    },
    /// Reads rows of a table in the order of an index.
    IndexScan {
        source: String,
        index: String,
        columns: Vec<ColumnId>,
        ordering: OrderingChoice,
    },
    Filter {
        filter: ScalarExpr,
    },
    Projection {
        exprs: Vec<ScalarExpr>,
        columns: Vec<ColumnId>,
    },
    /// Builds a hash table from the right input and probes it with rows of the left input.
    HashJoin {
        join_type: JoinType,
        left_keys: Vec<ColumnId>,
        right_keys: Vec<ColumnId>,
        condition: ScalarExpr,
    },
    /// Joins inputs sorted by their join keys.
    MergeJoin {
        join_type: JoinType,
        left_keys: Vec<ColumnId>,
        right_keys: Vec<ColumnId>,
        condition: ScalarExpr,
    },
    NestedLoopJoin {
        join_type: JoinType,
        condition: ScalarExpr,
    },
    HashAggregate {
        group_exprs: Vec<ColumnId>,
        aggr_exprs: Vec<ScalarExpr>,
        aggr_columns: Vec<ColumnId>,
    },
    /// Aggregates rows sorted by grouping keys.
    StreamingAggregate {
        group_exprs: Vec<ColumnId>,
        aggr_exprs: Vec<ScalarExpr>,
        aggr_columns: Vec<ColumnId>,
    },
    HashSetOp {
        op: SetOperator,
        all: bool,
        left_columns: Vec<ColumnId>,
        right_columns: Vec<ColumnId>,
        columns: Vec<ColumnId>,
    },
    Limit {
        rows: usize,
    },
    /// Computes window functions over input rows sorted by partitioning columns and the window ordering.
    Window {
        partition_by: Vec<ColumnId>,
        ordering: Option<OrderingChoice>,
        window_exprs: Vec<ScalarExpr>,
        window_columns: Vec<ColumnId>,
    },
    /// Reads the materialized result of a common table expression.
    CteScan {
        cte: CteId,
        columns: Vec<ColumnId>,
    },
    /// Enforcer. Sorts rows.
    Sort {
        ordering: OrderingChoice,
    },
    /// Enforcer. Collects rows from all workers at a single node.
    Gather,
    /// Enforcer. Repartitions rows by the hash of the given columns.
    Redistribute {
        keys: Vec<ColumnId>,
    },
    /// Enforcer. Sends a copy of every row to every worker.
    Broadcast,
}

impl PhysicalOp {
    /// The name of this operator.
    pub fn name(&self) -> &'static str {
        match self {
            PhysicalOp::Scan { .. } => "Scan",
            PhysicalOp::IndexScan { .. } => "IndexScan",
            PhysicalOp::Filter { .. } => "Filter",
            PhysicalOp::Projection { .. } => "Projection",
            PhysicalOp::HashJoin { .. } => "HashJoin",
            PhysicalOp::MergeJoin { .. } => "MergeJoin",
            PhysicalOp::NestedLoopJoin { .. } => "NestedLoopJoin",
            PhysicalOp::HashAggregate { .. } => "HashAggregate",
            PhysicalOp::StreamingAggregate { .. } => "StreamingAggregate",
            PhysicalOp::HashSetOp { .. } => "HashSetOp",
            PhysicalOp::Limit { .. } => "Limit",
            PhysicalOp::Window { .. } => "Window",
            PhysicalOp::CteScan { .. } => "CteScan",
            PhysicalOp::Sort { .. } => "Sort",
            PhysicalOp::Gather => "Gather",
            PhysicalOp::Redistribute { .. } => "Redistribute",
            PhysicalOp::Broadcast => "Broadcast",
        }
    }

    /// Returns `true` if this operator is only used to enforce physical properties.
    pub fn is_enforcer(&self) -> bool {
        matches!(
            self,
            PhysicalOp::Sort { .. } | PhysicalOp::Gather | PhysicalOp::Redistribute { .. } | PhysicalOp::Broadcast
        )
    }

    /// Returns the columns produced by this operator given the output columns of its inputs.
    pub fn output_columns(&self, inputs: &[&[ColumnId]]) -> Vec<ColumnId> {
        let input = |i: usize| inputs.get(i).map(|c| c.to_vec()).unwrap_or_default();
        match self {
            PhysicalOp::Scan { columns, .. }
            | PhysicalOp::IndexScan { columns, .. }
            | PhysicalOp::Projection { columns, .. }
            | PhysicalOp::HashSetOp { columns, .. }
            | PhysicalOp::CteScan { columns, .. } => columns.clone(),
            PhysicalOp::HashJoin { join_type, .. }
            | PhysicalOp::MergeJoin { join_type, .. }
            | PhysicalOp::NestedLoopJoin { join_type, .. } => join_type.output_columns(&input(0), &input(1)),
            PhysicalOp::HashAggregate {
                group_exprs,
                aggr_columns,
                ..
            }
            | PhysicalOp::StreamingAggregate {
                group_exprs,
                aggr_columns,
                ..
            } => group_exprs.iter().chain(aggr_columns.iter()).copied().collect(),
            PhysicalOp::Window { window_columns, .. } => input(0).into_iter().chain(window_columns.iter().copied()).collect(),
            PhysicalOp::Filter { .. }
            | PhysicalOp::Limit { .. }
            | PhysicalOp::Sort { .. }
            | PhysicalOp::Gather
            | PhysicalOp::Redistribute { .. }
            | PhysicalOp::Broadcast => input(0),
        }
    }

    /// Returns the join type if this operator is a join.
    pub fn join_type(&self) -> Option<&JoinType> {
        match self {
            PhysicalOp::HashJoin { join_type, .. }
            | PhysicalOp::MergeJoin { join_type, .. }
            | PhysicalOp::NestedLoopJoin { join_type, .. } => Some(join_type),
            _ => None,
        }
    }
}

impl Display for PhysicalOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())?;
        match self {
            PhysicalOp::Scan { source, columns } => write!(f, " {} cols=[{}]", source, columns.iter().join(", ")),
            PhysicalOp::IndexScan {
                source,
                index,
                columns,
                ordering,
            } => write!(f, " {} index={} ordering={} cols=[{}]", source, index, ordering, columns.iter().join(", ")),
            PhysicalOp::Filter { filter } => write!(f, " filter={}", filter),
            PhysicalOp::Projection { exprs, columns } => {
                write!(f, " cols=[{}] exprs=[{}]", columns.iter().join(", "), exprs.iter().join(", "))
            }
            PhysicalOp::HashJoin {
                join_type,
                left_keys,
                right_keys,
                condition,
            }
            | PhysicalOp::MergeJoin {
                join_type,
                left_keys,
                right_keys,
                condition,
            } => {
                write!(
                    f,
                    " type={} keys=[{}]",
                    join_type,
                    left_keys.iter().zip(right_keys.iter()).map(|(l, r)| format!("{}={}", l, r)).join(", ")
                )?;
                if !condition.is_true() {
                    write!(f, " on={}", condition)?;
                }
                Ok(())
            }
            PhysicalOp::NestedLoopJoin { join_type, condition } => {
                write!(f, " type={}", join_type)?;
                if !condition.is_true() {
                    write!(f, " on={}", condition)?;
                }
                Ok(())
            }
            PhysicalOp::HashAggregate {
                group_exprs,
                aggr_exprs,
                aggr_columns,
            }
            | PhysicalOp::StreamingAggregate {
                group_exprs,
                aggr_exprs,
                aggr_columns,
            } => write!(
                f,
                " group=[{}] aggrs=[{}] cols=[{}]",
                group_exprs.iter().join(", "),
                aggr_exprs.iter().join(", "),
                aggr_columns.iter().join(", ")
            ),
            PhysicalOp::HashSetOp { op, all, columns, .. } => {
                write!(f, " {}{} cols=[{}]", op, if *all { " all" } else { "" }, columns.iter().join(", "))
            }
            PhysicalOp::Limit { rows } => write!(f, " rows={}", rows),
            PhysicalOp::Window {
                partition_by,
                ordering,
                window_exprs,
                window_columns,
            } => {
                write!(f, " partition=[{}]", partition_by.iter().join(", "))?;
                if let Some(ordering) = ordering {
                    write!(f, " ordering={}", ordering)?;
                }
                write!(f, " exprs=[{}] cols=[{}]", window_exprs.iter().join(", "), window_columns.iter().join(", "))
            }
            PhysicalOp::CteScan { cte, columns } => write!(f, " {} cols=[{}]", cte, columns.iter().join(", ")),
            PhysicalOp::Sort { ordering } => write!(f, " ordering={}", ordering),
            PhysicalOp::Gather | PhysicalOp::Broadcast => Ok(()),
            PhysicalOp::Redistribute { keys } => write!(f, " keys=[{}]", keys.iter().join(", ")),
        }
    }
}
