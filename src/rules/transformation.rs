//! Transformation rules. See [rules module](super).

use crate::error::OptimizerError;
use crate::meta::ColumnId;
use crate::operators::join::JoinType;
use crate::operators::logical::{LogicalExpr, LogicalJoin, LogicalSelect};
use crate::operators::scalar::{combine_conjunction, expr_columns, expr_subqueries, split_conjunction, ScalarExpr};
use crate::operators::RelNode;
use crate::rules::{Rule, RuleContext, RuleResult, RuleType};

/// `A JOIN B` -> `B JOIN A`. Applies to inner and cross joins.
#[derive(Debug)]
pub struct JoinCommutativityRule;

impl Rule for JoinCommutativityRule {
    fn name(&self) -> &'static str {
        "JoinCommutativityRule"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn matches(&self, _ctx: &RuleContext, expr: &LogicalExpr) -> bool {
        matches!(expr, LogicalExpr::Join(LogicalJoin { join_type, .. }) if join_type.is_inner())
    }

    fn apply(&self, _ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError> {
        match expr {
            LogicalExpr::Join(LogicalJoin {
                join_type,
                left,
                right,
                condition,
            }) if join_type.is_inner() => {
                let expr = LogicalExpr::Join(LogicalJoin {
                    join_type: join_type.clone(),
                    left: right.clone(),
                    right: left.clone(),
                    condition: condition.clone(),
                });
                Ok(vec![RuleResult::Substitute(expr)])
            }
            _ => Ok(vec![]),
        }
    }
}

/// `[A JOIN B] JOIN C` -> `A JOIN [B JOIN C]`.
///
/// Conditions of both joins are split into conjuncts and a conjunct is moved to the new inner join
/// when it only references columns of `B` and `C`. A rewrite that turns the new inner join
/// into a cross product is skipped unless cross joins are enabled.
#[derive(Debug)]
pub struct JoinAssociativityRule;

impl JoinAssociativityRule {
    fn rotate(
        ctx: &RuleContext,
        inner: &LogicalJoin,
        top_right: &RelNode,
        top_condition: &ScalarExpr,
    ) -> Result<Option<LogicalExpr>, OptimizerError> {
        let b_columns = ctx.input_columns(&inner.right)?;
        let c_columns = ctx.input_columns(top_right)?;
        let covered = |columns: &[ColumnId]| {
            !columns.is_empty() && columns.iter().all(|c| b_columns.contains(c) || c_columns.contains(c))
        };

        let mut conjuncts = split_conjunction(inner.condition.clone());
        conjuncts.extend(split_conjunction(top_condition.clone()));
        // Conjuncts are sorted, so the same join is produced regardless of the order it has been derived in.
        conjuncts.sort_by_cached_key(|e| e.to_string());
        conjuncts.dedup();

        let (new_inner, new_top): (Vec<_>, Vec<_>) =
            conjuncts.into_iter().partition(|e| covered(&expr_columns(e)));

        if new_inner.is_empty() && !ctx.options().enable_cross_joins {
            return Ok(None);
        }

        let expr = LogicalExpr::Join(LogicalJoin {
            join_type: join_type_for(&new_top),
            left: inner.left.clone(),
            right: LogicalExpr::Join(LogicalJoin {
                join_type: join_type_for(&new_inner),
                left: inner.right.clone(),
                right: top_right.clone(),
                condition: combine_conjunction(new_inner),
            })
            .into(),
            condition: combine_conjunction(new_top),
        });
        Ok(Some(expr))
    }
}

impl Rule for JoinAssociativityRule {
    fn name(&self) -> &'static str {
        "JoinAssociativityRule"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn matches(&self, _ctx: &RuleContext, expr: &LogicalExpr) -> bool {
        matches!(expr, LogicalExpr::Join(LogicalJoin { join_type, .. }) if join_type.is_inner())
    }

    fn apply(&self, ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError> {
        let (left, right, condition) = match expr {
            LogicalExpr::Join(LogicalJoin {
                join_type,
                left,
                right,
                condition,
            }) if join_type.is_inner() => (left, right, condition),
            _ => return Ok(vec![]),
        };

        let mut result = Vec::new();
        for left_expr in ctx.input_exprs(left)? {
            if let LogicalExpr::Join(inner) = left_expr {
                if !inner.join_type.is_inner() {
                    continue;
                }
                if let Some(expr) = Self::rotate(ctx, inner, right, condition)? {
                    result.push(RuleResult::Substitute(expr));
                }
            }
        }
        Ok(result)
    }
}

/// `SELECT filter (A JOIN B)` -> `A JOIN B ON condition AND filter`.
/// Applies to inner and cross joins when the filter does not reference subqueries.
#[derive(Debug)]
pub struct PushSelectIntoJoinRule;

impl Rule for PushSelectIntoJoinRule {
    fn name(&self) -> &'static str {
        "PushSelectIntoJoinRule"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn matches(&self, _ctx: &RuleContext, expr: &LogicalExpr) -> bool {
        match expr {
            LogicalExpr::Select(select) => expr_subqueries(&select.filter).is_empty(),
            _ => false,
        }
    }

    fn apply(&self, ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError> {
        let (input, filter) = match expr {
            LogicalExpr::Select(LogicalSelect { input, filter }) => (input, filter),
            _ => return Ok(vec![]),
        };

        let mut result = Vec::new();
        for input_expr in ctx.input_exprs(input)? {
            match input_expr {
                LogicalExpr::Join(join) if join.join_type.is_inner() => {
                    let conjuncts: Vec<_> = split_conjunction(join.condition.clone())
                        .into_iter()
                        .chain(split_conjunction(filter.clone()))
                        .collect();
                    let expr = LogicalExpr::Join(LogicalJoin {
                        join_type: join_type_for(&conjuncts),
                        left: join.left.clone(),
                        right: join.right.clone(),
                        condition: combine_conjunction(conjuncts),
                    });
                    result.push(RuleResult::Substitute(expr));
                }
                _ => {}
            }
        }
        Ok(result)
    }
}

fn join_type_for(conjuncts: &[ScalarExpr]) -> JoinType {
    if conjuncts.is_empty() {
        JoinType::Cross
    } else {
        JoinType::Inner
    }
}
