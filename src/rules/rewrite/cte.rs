//! Inlining of common table expressions.

use crate::error::OptimizerError;
use crate::operators::logical::{LogicalExpr, LogicalProjection};
use crate::operators::scalar::ScalarExpr;
use crate::operators::{CommonTableExpr, CteId, Query, SubQuery};
use crate::rules::rewrite::rewrite_inputs;

/// Replaces every consumer of a common table expression with the plan of that expression.
/// Columns of the plan are renamed to the columns of the consumer by a projection.
/// Plans of subqueries are rewritten as well. The returned query has no common table expressions.
pub fn inline_ctes(query: Query) -> Result<Query, OptimizerError> {
    if query.ctes.is_empty() {
        return Ok(query);
    }
    let Query {
        root,
        subqueries,
        ctes,
        ordering,
        metadata,
    } = query;

    let mut stack = Vec::new();
    let root = inline(&root, &ctes, &mut stack)?;
    let mut new_subqueries: Vec<SubQuery> = Vec::with_capacity(subqueries.len());
    for subquery in subqueries {
        let plan = inline(&subquery.plan, &ctes, &mut stack)?;
        new_subqueries.push(SubQuery {
            id: subquery.id,
            plan,
            outer_columns: subquery.outer_columns,
        });
    }

    log::debug!("Inlined {} common table expression(s)", ctes.len());

    Ok(Query {
        root,
        subqueries: new_subqueries,
        ctes: Vec::new(),
        ordering,
        metadata,
    })
}

fn inline(expr: &LogicalExpr, ctes: &[CommonTableExpr], stack: &mut Vec<CteId>) -> Result<LogicalExpr, OptimizerError> {
    match expr {
        LogicalExpr::CteConsumer(consumer) => {
            if stack.contains(&consumer.cte) {
                return Err(OptimizerError::unsupported(format!("Recursive common table expression {}", consumer.cte)));
            }
            let cte = ctes
                .iter()
                .find(|c| c.id == consumer.cte)
                .ok_or_else(|| OptimizerError::argument(format!("Unknown common table expression: {}", consumer.cte)))?;

            stack.push(cte.id);
            let plan = inline(&cte.plan, ctes, stack)?;
            stack.pop();

            let columns = plan.tree_output_columns()?;
            if columns.len() != consumer.columns.len() {
                let message = format!(
                    "{} returns {} columns but its consumer expects {}",
                    cte.id,
                    columns.len(),
                    consumer.columns.len()
                );
                return Err(OptimizerError::internal(message));
            }
            Ok(LogicalExpr::Projection(LogicalProjection {
                input: plan.into(),
                exprs: columns.into_iter().map(ScalarExpr::Column).collect(),
                columns: consumer.columns.clone(),
            }))
        }
        _ => rewrite_inputs(expr, |input| inline(input, ctes, stack)),
    }
}
