//! Logical rewrites applied to a query before it is copied into a memo.

use crate::error::OptimizerError;
use crate::operators::logical::LogicalExpr;
use crate::operators::RelNode;

pub mod cte;
pub mod subqueries;

/// Rewrites inputs of the given expression using the given function.
///
/// # Errors
///
/// Returns an error if an input of the expression is a memo group.
pub fn rewrite_inputs<F>(expr: &LogicalExpr, mut rewrite: F) -> Result<LogicalExpr, OptimizerError>
where
    F: FnMut(&LogicalExpr) -> Result<LogicalExpr, OptimizerError>,
{
    let inputs: Result<Vec<RelNode>, _> = expr
        .inputs()
        .into_iter()
        .map(|input| input_expr(input).and_then(|e| rewrite(e)).map(RelNode::from))
        .collect();
    Ok(expr.with_new_inputs(inputs?))
}

/// Returns the expression of the given input. Returns an error if the input is a memo group.
pub fn input_expr(input: &RelNode) -> Result<&LogicalExpr, OptimizerError> {
    match input {
        RelNode::Expr(expr) => Ok(expr),
        RelNode::Group(group) => Err(OptimizerError::internal(format!("Expected an expression but got a group {}", group))),
    }
}
