use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::error::OptimizerError;
use crate::meta::ColumnId;
use crate::operators::join::JoinType;
use crate::operators::scalar::ScalarExpr;
use crate::operators::{CteId, RelNode};
use crate::properties::{OrderingChoice, OrderingColumn};

/// Logical expressions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalExpr {
    Get(LogicalGet),
    Select(LogicalSelect),
    Projection(LogicalProjection),
    Join(LogicalJoin),
    Aggregate(LogicalAggregate),
    SetOp(LogicalSetOp),
    Limit(LogicalLimit),
    Window(LogicalWindow),
    CteConsumer(LogicalCteConsumer),
}

/// Retrieves rows of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalGet {
    pub source: String,
    pub columns: Vec<ColumnId>,
}

/// Filters rows of its input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalSelect {
    pub input: RelNode,
    pub filter: ScalarExpr,
}

/// Computes `exprs` and names the results `columns`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalProjection {
    pub input: RelNode,
    pub exprs: Vec<ScalarExpr>,
    pub columns: Vec<ColumnId>,
}

/// Joins its inputs. Cross joins have a literal `TRUE` condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalJoin {
    pub join_type: JoinType,
    pub left: RelNode,
    pub right: RelNode,
    pub condition: ScalarExpr,
}

/// Groups rows by `group_exprs` and computes `aggr_exprs` for every group.
/// The output of an aggregate consists of `group_exprs` followed by `aggr_columns`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalAggregate {
    pub input: RelNode,
    pub group_exprs: Vec<ColumnId>,
    pub aggr_exprs: Vec<ScalarExpr>,
    pub aggr_columns: Vec<ColumnId>,
}

/// Set operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

impl Display for SetOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SetOperator::Union => write!(f, "Union"),
            SetOperator::Intersect => write!(f, "Intersect"),
            SetOperator::Except => write!(f, "Except"),
        }
    }
}

/// A set operation. Columns of the inputs are matched by position:
/// `columns[i]` is computed from `left_columns[i]` and `right_columns[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalSetOp {
    pub op: SetOperator,
    pub all: bool,
    pub left: RelNode,
    pub right: RelNode,
    pub left_columns: Vec<ColumnId>,
    pub right_columns: Vec<ColumnId>,
    pub columns: Vec<ColumnId>,
}

/// Returns at most `rows` rows of its input. When `ordering` is present
/// the rows are the first rows of the input sorted by that ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalLimit {
    pub input: RelNode,
    pub rows: usize,
    pub ordering: Option<OrderingChoice>,
}

/// Computes aggregate functions over partitions of its input without collapsing rows.
/// The output consists of the input columns followed by `window_columns`.
///
/// Without `ordering` a function is computed over the whole partition. With `ordering` it is computed
/// over the rows of the partition up to the current row and rows that are equal to it in that ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalWindow {
    pub input: RelNode,
    pub partition_by: Vec<ColumnId>,
    pub ordering: Option<OrderingChoice>,
    pub window_exprs: Vec<ScalarExpr>,
    pub window_columns: Vec<ColumnId>,
}

impl LogicalWindow {
    /// The ordering of input rows: partitioning columns followed by the window ordering.
    /// Returns `None` if neither is present.
    pub fn input_ordering(&self) -> Option<OrderingChoice> {
        window_input_ordering(&self.partition_by, self.ordering.as_ref())
    }
}

/// See [LogicalWindow::input_ordering].
pub fn window_input_ordering(partition_by: &[ColumnId], ordering: Option<&OrderingChoice>) -> Option<OrderingChoice> {
    let mut columns: Vec<OrderingColumn> = partition_by.iter().map(|c| OrderingColumn::asc(*c)).collect();
    for column in ordering.map(|o| o.columns()).unwrap_or_default() {
        if !columns.iter().any(|c| c.column() == column.column()) {
            columns.push(*column);
        }
    }
    if columns.is_empty() {
        None
    } else {
        Some(OrderingChoice::new(columns))
    }
}

/// Reads the result of a common table expression.
/// `columns[i]` is the `i`-th output column of the table expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalCteConsumer {
    pub cte: CteId,
    pub columns: Vec<ColumnId>,
}

impl LogicalExpr {
    /// Returns the inputs of this expression.
    pub fn inputs(&self) -> Vec<&RelNode> {
        match self {
            LogicalExpr::Get(_) | LogicalExpr::CteConsumer(_) => vec![],
            LogicalExpr::Select(LogicalSelect { input, .. })
            | LogicalExpr::Projection(LogicalProjection { input, .. })
            | LogicalExpr::Aggregate(LogicalAggregate { input, .. })
            | LogicalExpr::Limit(LogicalLimit { input, .. })
            | LogicalExpr::Window(LogicalWindow { input, .. }) => vec![input],
            LogicalExpr::Join(LogicalJoin { left, right, .. }) | LogicalExpr::SetOp(LogicalSetOp { left, right, .. }) => {
                vec![left, right]
            }
        }
    }

    /// Creates a copy of this expression that uses the given inputs.
    ///
    /// # Panics
    ///
    /// This method panics if the number of inputs does not match the number of inputs of this expression.
    pub fn with_new_inputs(&self, mut inputs: Vec<RelNode>) -> LogicalExpr {
        assert_eq!(inputs.len(), self.inputs().len(), "Unexpected number of inputs: {}", self);
        let mut next = || inputs.remove(0);
        match self {
            LogicalExpr::Get(_) | LogicalExpr::CteConsumer(_) => self.clone(),
            LogicalExpr::Select(expr) => LogicalExpr::Select(LogicalSelect {
                input: next(),
                filter: expr.filter.clone(),
            }),
            LogicalExpr::Projection(expr) => LogicalExpr::Projection(LogicalProjection {
                input: next(),
                exprs: expr.exprs.clone(),
                columns: expr.columns.clone(),
            }),
            LogicalExpr::Join(expr) => LogicalExpr::Join(LogicalJoin {
                join_type: expr.join_type.clone(),
                left: next(),
                right: next(),
                condition: expr.condition.clone(),
            }),
            LogicalExpr::Aggregate(expr) => LogicalExpr::Aggregate(LogicalAggregate {
                input: next(),
                group_exprs: expr.group_exprs.clone(),
                aggr_exprs: expr.aggr_exprs.clone(),
                aggr_columns: expr.aggr_columns.clone(),
            }),
            LogicalExpr::SetOp(expr) => LogicalExpr::SetOp(LogicalSetOp {
                op: expr.op,
                all: expr.all,
                left: next(),
                right: next(),
                left_columns: expr.left_columns.clone(),
                right_columns: expr.right_columns.clone(),
                columns: expr.columns.clone(),
            }),
            LogicalExpr::Limit(expr) => LogicalExpr::Limit(LogicalLimit {
                input: next(),
                rows: expr.rows,
                ordering: expr.ordering.clone(),
            }),
            LogicalExpr::Window(expr) => LogicalExpr::Window(LogicalWindow {
                input: next(),
                partition_by: expr.partition_by.clone(),
                ordering: expr.ordering.clone(),
                window_exprs: expr.window_exprs.clone(),
                window_columns: expr.window_columns.clone(),
            }),
        }
    }

    /// Returns the columns produced by this expression given the output columns of its inputs.
    pub fn output_columns(&self, inputs: &[&[ColumnId]]) -> Result<Vec<ColumnId>, OptimizerError> {
        if inputs.len() != self.inputs().len() {
            let message = format!("Expected {} inputs but got {}: {}", self.inputs().len(), inputs.len(), self);
            return Err(OptimizerError::internal(message));
        }
        let columns = match self {
            LogicalExpr::Get(expr) => expr.columns.clone(),
            LogicalExpr::Select(_) | LogicalExpr::Limit(_) => inputs[0].to_vec(),
            LogicalExpr::Projection(expr) => expr.columns.clone(),
            LogicalExpr::Join(expr) => expr.join_type.output_columns(inputs[0], inputs[1]),
            LogicalExpr::Aggregate(expr) => {
                expr.group_exprs.iter().chain(expr.aggr_columns.iter()).copied().collect()
            }
            LogicalExpr::SetOp(expr) => expr.columns.clone(),
            LogicalExpr::Window(expr) => inputs[0].iter().chain(expr.window_columns.iter()).copied().collect(),
            LogicalExpr::CteConsumer(expr) => expr.columns.clone(),
        };
        Ok(columns)
    }

    /// Returns the columns introduced by this expression.
    pub fn defined_columns(&self) -> Vec<ColumnId> {
        match self {
            LogicalExpr::Get(expr) => expr.columns.clone(),
            LogicalExpr::Projection(expr) => expr.columns.clone(),
            LogicalExpr::Aggregate(expr) => expr.aggr_columns.clone(),
            LogicalExpr::Window(expr) => expr.window_columns.clone(),
            LogicalExpr::SetOp(expr) => expr.columns.clone(),
            LogicalExpr::CteConsumer(expr) => expr.columns.clone(),
            LogicalExpr::Join(LogicalJoin {
                join_type: JoinType::Mark { column, .. },
                ..
            }) => vec![*column],
            LogicalExpr::Join(_) | LogicalExpr::Select(_) | LogicalExpr::Limit(_) => vec![],
        }
    }

    /// Returns the columns referenced by this expression that are not
    /// part of its scalar expressions (grouping and partitioning keys, orderings and set operation inputs).
    pub fn referenced_columns(&self) -> Vec<ColumnId> {
        match self {
            LogicalExpr::Aggregate(expr) => expr.group_exprs.clone(),
            LogicalExpr::SetOp(expr) => expr.left_columns.iter().chain(expr.right_columns.iter()).copied().collect(),
            LogicalExpr::Limit(LogicalLimit {
                ordering: Some(ordering),
                ..
            }) => ordering.clone().into_columns(),
            LogicalExpr::Window(expr) => expr.input_ordering().map(|o| o.into_columns()).unwrap_or_default(),
            _ => vec![],
        }
    }

    /// Returns scalar expressions used by this expression.
    pub fn scalar_exprs(&self) -> Vec<&ScalarExpr> {
        match self {
            LogicalExpr::Get(_) | LogicalExpr::SetOp(_) | LogicalExpr::Limit(_) | LogicalExpr::CteConsumer(_) => vec![],
            LogicalExpr::Select(expr) => vec![&expr.filter],
            LogicalExpr::Projection(expr) => expr.exprs.iter().collect(),
            LogicalExpr::Join(expr) => std::iter::once(&expr.condition).chain(expr.join_type.compare()).collect(),
            LogicalExpr::Aggregate(expr) => expr.aggr_exprs.iter().collect(),
            LogicalExpr::Window(expr) => expr.window_exprs.iter().collect(),
        }
    }

    /// Returns the output columns of an expression tree.
    /// Returns an error if the tree contains references to memo groups.
    pub fn tree_output_columns(&self) -> Result<Vec<ColumnId>, OptimizerError> {
        let inputs: Result<Vec<_>, _> = self
            .inputs()
            .into_iter()
            .map(|input| match input {
                RelNode::Expr(expr) => expr.tree_output_columns(),
                RelNode::Group(group) => {
                    Err(OptimizerError::internal(format!("Expected an expression but got a group {}", group)))
                }
            })
            .collect();
        let inputs = inputs?;
        let inputs: Vec<&[ColumnId]> = inputs.iter().map(|c| c.as_slice()).collect();
        self.output_columns(&inputs)
    }

    /// The name of this operator.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalExpr::Get(_) => "LogicalGet",
            LogicalExpr::Select(_) => "LogicalSelect",
            LogicalExpr::Projection(_) => "LogicalProjection",
            LogicalExpr::Join(_) => "LogicalJoin",
            LogicalExpr::Aggregate(_) => "LogicalAggregate",
            LogicalExpr::SetOp(_) => "LogicalSetOp",
            LogicalExpr::Limit(_) => "LogicalLimit",
            LogicalExpr::Window(_) => "LogicalWindow",
            LogicalExpr::CteConsumer(_) => "LogicalCteConsumer",
        }
    }
}

impl Display for LogicalExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())?;
        match self {
            LogicalExpr::Get(expr) => write!(f, " {} cols=[{}]", expr.source, expr.columns.iter().join(", ")),
            LogicalExpr::Select(expr) => write!(f, " {} filter={}", expr.input, expr.filter),
            LogicalExpr::Projection(expr) => write!(
                f,
                " {} cols=[{}] exprs=[{}]",
                expr.input,
                expr.columns.iter().join(", "),
                expr.exprs.iter().join(", ")
            ),
            LogicalExpr::Join(expr) => {
                write!(f, " {} {} type={}", expr.left, expr.right, expr.join_type)?;
                if !expr.condition.is_true() {
                    write!(f, " on={}", expr.condition)?;
                }
                Ok(())
            }
            LogicalExpr::Aggregate(expr) => write!(
                f,
                " {} group=[{}] aggrs=[{}] cols=[{}]",
                expr.input,
                expr.group_exprs.iter().join(", "),
                expr.aggr_exprs.iter().join(", "),
                expr.aggr_columns.iter().join(", ")
            ),
            LogicalExpr::SetOp(expr) => write!(
                f,
                " {} {} {}{} cols=[{}]",
                expr.left,
                expr.right,
                expr.op,
                if expr.all { " all" } else { "" },
                expr.columns.iter().join(", ")
            ),
            LogicalExpr::Limit(expr) => {
                write!(f, " {} rows={}", expr.input, expr.rows)?;
                if let Some(ordering) = expr.ordering.as_ref() {
                    write!(f, " ordering={}", ordering)?;
                }
                Ok(())
            }
            LogicalExpr::Window(expr) => {
                write!(f, " {} partition=[{}]", expr.input, expr.partition_by.iter().join(", "))?;
                if let Some(ordering) = expr.ordering.as_ref() {
                    write!(f, " ordering={}", ordering)?;
                }
                write!(
                    f,
                    " exprs=[{}] cols=[{}]",
                    expr.window_exprs.iter().join(", "),
                    expr.window_columns.iter().join(", ")
                )
            }
            LogicalExpr::CteConsumer(expr) => write!(f, " {} cols=[{}]", expr.cte, expr.columns.iter().join(", ")),
        }
    }
}
