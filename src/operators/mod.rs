//! Logical and physical operators and the query representation consumed by the optimizer.

use std::fmt::{Display, Formatter};

use crate::memo::GroupId;
use crate::meta::{ColumnId, MutableMetadata};
use crate::operators::logical::LogicalExpr;
use crate::operators::scalar::{expr_columns, expr_subqueries};
use crate::properties::OrderingChoice;

pub mod join;
pub mod logical;
pub mod physical;
pub mod scalar;

/// An input of a logical expression. Expressions that are not copied into a memo yet
/// have expressions as their inputs. Once an expression is copied into a memo its inputs are memo groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelNode {
    Expr(Box<LogicalExpr>),
    Group(GroupId),
}

impl RelNode {
    /// Returns the expression if this node is an expression.
    pub fn expr(&self) -> Option<&LogicalExpr> {
        match self {
            RelNode::Expr(expr) => Some(expr),
            RelNode::Group(_) => None,
        }
    }
}

impl From<LogicalExpr> for RelNode {
    fn from(expr: LogicalExpr) -> Self {
        RelNode::Expr(Box::new(expr))
    }
}

impl Display for RelNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RelNode::Expr(expr) => write!(f, "({})", expr),
            RelNode::Group(group) => write!(f, "{}", group),
        }
    }
}

/// Identifies a subquery within a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubQueryId(pub usize);

impl Display for SubQueryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SQ{}", self.0)
    }
}

/// Identifies a common table expression within a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CteId(pub usize);

impl Display for CteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CTE{}", self.0)
    }
}

/// A subquery referenced from a scalar expression.
#[derive(Debug, Clone)]
pub struct SubQuery {
    /// The identifier of this subquery.
    pub id: SubQueryId,
    /// The plan of this subquery. Scalar and `IN` subqueries use the first output column of the plan.
    pub plan: LogicalExpr,
    /// Columns of enclosing queries this subquery refers to. An empty list means the subquery is uncorrelated.
    pub outer_columns: Vec<ColumnId>,
}

impl SubQuery {
    /// Creates a subquery and computes the outer columns it references.
    /// `subqueries` are the subqueries nested in the given plan.
    pub fn new(id: SubQueryId, plan: LogicalExpr, subqueries: &[SubQuery]) -> Self {
        let outer_columns = outer_columns(&plan, subqueries);
        SubQuery {
            id,
            plan,
            outer_columns,
        }
    }

    /// Returns `true` if this subquery references columns of enclosing queries.
    pub fn is_correlated(&self) -> bool {
        !self.outer_columns.is_empty()
    }
}

/// A common table expression (`WITH` clause).
#[derive(Debug, Clone)]
pub struct CommonTableExpr {
    pub id: CteId,
    pub plan: LogicalExpr,
}

/// A bound query: the root of a logical plan, subqueries and common table expressions
/// referenced from that plan and the metadata of all columns used by them.
#[derive(Debug)]
pub struct Query {
    pub root: LogicalExpr,
    pub subqueries: Vec<SubQuery>,
    pub ctes: Vec<CommonTableExpr>,
    /// The ordering the result of the query must have (`ORDER BY`).
    pub ordering: Option<OrderingChoice>,
    pub metadata: MutableMetadata,
}

impl Query {
    /// Creates a query without subqueries and common table expressions.
    pub fn new(root: LogicalExpr, metadata: MutableMetadata) -> Self {
        Query {
            root,
            subqueries: Vec::new(),
            ctes: Vec::new(),
            ordering: None,
            metadata,
        }
    }

    /// Returns a subquery with the given identifier.
    pub fn get_subquery(&self, id: &SubQueryId) -> Option<&SubQuery> {
        self.subqueries.iter().find(|s| s.id == *id)
    }
}

/// Computes the columns referenced by the given plan that are not produced by the plan itself.
/// Outer columns of nested subqueries that are not produced by the plan are also included.
pub fn outer_columns(plan: &LogicalExpr, subqueries: &[SubQuery]) -> Vec<ColumnId> {
    fn collect(expr: &LogicalExpr, subqueries: &[SubQuery], referenced: &mut Vec<ColumnId>, defined: &mut Vec<ColumnId>) {
        defined.extend(expr.defined_columns());
        referenced.extend(expr.referenced_columns());

        for scalar in expr.scalar_exprs() {
            referenced.extend(expr_columns(scalar));
            for id in expr_subqueries(scalar) {
                if let Some(subquery) = subqueries.iter().find(|s| s.id == id) {
                    referenced.extend(subquery.outer_columns.iter().copied());
                }
            }
        }

        for input in expr.inputs() {
            if let RelNode::Expr(input) = input {
                collect(input, subqueries, referenced, defined);
            }
        }
    }

    let mut referenced = Vec::new();
    let mut defined = Vec::new();
    collect(plan, subqueries, &mut referenced, &mut defined);

    let mut outer = Vec::new();
    for column in referenced {
        if !defined.contains(&column) && !outer.contains(&column) {
            outer.push(column);
        }
    }
    outer
}
