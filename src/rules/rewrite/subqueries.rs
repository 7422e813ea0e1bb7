//! Rewrites subqueries into joins.
//!
//! | subquery                  | position                   | join                                             |
//! |---------------------------|----------------------------|--------------------------------------------------|
//! | `EXISTS` / `NOT EXISTS`   | a conjunct of a filter     | semi / anti join                                 |
//! | `x IN (..)`               | a conjunct of a filter     | semi join, `x = y` is added to the condition     |
//! | `x NOT IN (..)`           | a conjunct of a filter     | NULL-aware anti join that compares `x = y`       |
//! | `EXISTS`, `IN`            | any other position         | mark join, the predicate becomes the mark column |
//! | scalar subquery           | any position               | single join, or left join when at most one row   |
//!
//! Filters of a subquery that reference columns of the enclosing query become the condition of the join.
//! Such filters are pulled up through projections and through aggregates that group by the correlated
//! columns. When correlation can not be pulled up the subquery is left in place and is evaluated per row.
//!
//! An aggregate without grouping returns one row even when its input is empty. Once correlated columns are added
//! to its grouping an outer row without matching rows gets no row at all. This only preserves the result of
//! a scalar subquery (the left join produces the NULL row), so `EXISTS` and `IN` over such subqueries are
//! evaluated per row.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;

use itertools::Itertools;

use crate::datatypes::DataType;
use crate::error::OptimizerError;
use crate::meta::{ColumnId, ColumnMetadata, MutableMetadata};
use crate::operators::join::JoinType;
use crate::operators::logical::{LogicalAggregate, LogicalExpr, LogicalJoin, LogicalProjection, LogicalSelect};
use crate::operators::scalar::expr::{AggregateFunction, BinaryOp, ExprRewriter, ExprVisitor};
use crate::operators::scalar::{combine_conjunction, expr_columns, expr_subqueries, split_conjunction, ScalarExpr};
use crate::operators::{outer_columns, CommonTableExpr, Query, RelNode, SubQuery, SubQueryId};
use crate::rules::rewrite::rewrite_inputs;

/// Replaces subqueries of the given query with joins. Plans of common table expressions are rewritten as well.
/// The returned query only contains the subqueries that are still referenced.
///
/// # Errors
///
/// Returns an error if a scalar or an `IN` subquery does not return exactly one column.
pub fn unnest_subqueries(query: Query) -> Result<Query, OptimizerError> {
    let Query {
        root,
        subqueries,
        ctes,
        ordering,
        metadata,
    } = query;

    let (root, ctes, subqueries) = {
        let mut unnester = SubQueryUnnester::new(&subqueries, &metadata);
        let root = unnester.rewrite(&root)?;
        let mut new_ctes = Vec::with_capacity(ctes.len());
        for cte in ctes.iter() {
            let plan = unnester.rewrite(&cte.plan)?;
            new_ctes.push(CommonTableExpr { id: cte.id, plan });
        }
        let remaining = unnester.remaining_subqueries(&root, &new_ctes)?;
        (root, new_ctes, remaining)
    };

    Ok(Query {
        root,
        subqueries,
        ctes,
        ordering,
        metadata,
    })
}

/// Returns identifiers of subqueries referenced by operators of the given plan.
pub fn plan_subqueries(plan: &LogicalExpr) -> Vec<SubQueryId> {
    fn collect(expr: &LogicalExpr, out: &mut Vec<SubQueryId>) {
        for scalar in expr.scalar_exprs() {
            for id in expr_subqueries(scalar) {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        for input in expr.inputs() {
            if let RelNode::Expr(input) = input {
                collect(input, out);
            }
        }
    }
    let mut out = Vec::new();
    collect(plan, &mut out);
    out
}

struct SubQueryUnnester<'a> {
    subqueries: &'a [SubQuery],
    metadata: &'a MutableMetadata,
    // plans of subqueries with nested subqueries already rewritten.
    rewritten: HashMap<SubQueryId, LogicalExpr>,
}

/// A subquery which correlated filters has been moved out of its plan.
struct Decorrelated {
    plan: LogicalExpr,
    correlation: Vec<ScalarExpr>,
    at_most_one_row: bool,
    // an aggregate without grouping is now grouped by correlated columns.
    grouped_by_correlation: bool,
}

impl Decorrelated {
    fn condition(&self) -> ScalarExpr {
        combine_conjunction(self.correlation.iter().cloned())
    }
}

impl<'a> SubQueryUnnester<'a> {
    fn new(subqueries: &'a [SubQuery], metadata: &'a MutableMetadata) -> Self {
        SubQueryUnnester {
            subqueries,
            metadata,
            rewritten: HashMap::new(),
        }
    }

    fn rewrite(&mut self, expr: &LogicalExpr) -> Result<LogicalExpr, OptimizerError> {
        let expr = rewrite_inputs(expr, |input| self.rewrite(input))?;
        match expr {
            LogicalExpr::Select(select) if has_subqueries(&select.filter) => self.rewrite_select(select),
            LogicalExpr::Projection(projection) if projection.exprs.iter().any(has_subqueries) => {
                self.rewrite_projection(projection)
            }
            expr => Ok(expr),
        }
    }

    fn rewrite_select(&mut self, select: LogicalSelect) -> Result<LogicalExpr, OptimizerError> {
        let LogicalSelect { input, filter } = select;
        let mut input = into_expr(input)?;
        let columns = input.tree_output_columns()?;
        let mut filters = Vec::new();

        for conjunct in split_conjunction(filter) {
            let (new_input, filter) = self.unnest_conjunct(input, conjunct)?;
            input = new_input;
            filters.extend(filter);
        }

        let expr = if filters.is_empty() {
            input
        } else {
            LogicalExpr::Select(LogicalSelect {
                input: input.into(),
                filter: combine_conjunction(filters),
            })
        };
        restore_columns(expr, columns)
    }

    fn rewrite_projection(&mut self, projection: LogicalProjection) -> Result<LogicalExpr, OptimizerError> {
        let LogicalProjection { input, exprs, columns } = projection;
        let mut input = into_expr(input)?;
        let mut new_exprs = Vec::with_capacity(exprs.len());

        for expr in exprs {
            let (new_input, expr) = self.unnest_expr(input, expr)?;
            input = new_input;
            new_exprs.push(expr);
        }

        Ok(LogicalExpr::Projection(LogicalProjection {
            input: input.into(),
            exprs: new_exprs,
            columns,
        }))
    }

    /// Unnests a conjunct of a filter. Returns a new input and the conjunct
    /// if it must be still evaluated by the filter.
    fn unnest_conjunct(
        &mut self,
        input: LogicalExpr,
        conjunct: ScalarExpr,
    ) -> Result<(LogicalExpr, Option<ScalarExpr>), OptimizerError> {
        match &conjunct {
            ScalarExpr::Exists { not, query } => {
                if let Some(subquery) = self.decorrelate_predicate(*query)? {
                    let join_type = if *not { JoinType::Anti } else { JoinType::Semi };
                    log::debug!("{} is rewritten into {} join", conjunct, join_type);
                    let condition = subquery.condition();
                    return Ok((join(join_type, input, subquery.plan, condition), None));
                }
            }
            ScalarExpr::InSubQuery { expr, not, query } if !has_subqueries(expr) => {
                let column = self.subquery_column(*query)?;
                if let Some(subquery) = self.decorrelate_predicate(*query)? {
                    let compare = expr.as_ref().clone().equals(ScalarExpr::Column(column));
                    let (join_type, condition) = if *not {
                        let join_type = JoinType::NullAwareAnti {
                            compare: Box::new(compare),
                        };
                        (join_type, subquery.condition())
                    } else {
                        let condition = combine_conjunction(subquery.correlation.iter().cloned().chain(Some(compare)));
                        (JoinType::Semi, condition)
                    };
                    log::debug!("{} is rewritten into {} join", conjunct, join_type);
                    return Ok((join(join_type, input, subquery.plan, condition), None));
                }
            }
            _ => {}
        }
        let (input, conjunct) = self.unnest_expr(input, conjunct)?;
        Ok((input, Some(conjunct)))
    }

    /// Replaces subqueries in the given expression with columns produced by mark and single joins.
    fn unnest_expr(&mut self, input: LogicalExpr, expr: ScalarExpr) -> Result<(LogicalExpr, ScalarExpr), OptimizerError> {
        let mut rewriter = SubQueryToJoin {
            unnester: self,
            input: Some(input),
        };
        let expr = expr.rewrite(&mut rewriter)?;
        let input = rewriter.take_input()?;
        Ok((input, expr))
    }

    /// Moves correlated filters out of the plan of the given subquery.
    /// Returns `None` if the subquery must be evaluated per row.
    fn decorrelate(&mut self, id: SubQueryId) -> Result<Option<Decorrelated>, OptimizerError> {
        let plan = self.subquery_plan(id)?;
        let outer = outer_columns(&plan, self.subqueries);
        if outer.is_empty() {
            return Ok(Some(Decorrelated {
                at_most_one_row: at_most_one_row(&plan),
                plan,
                correlation: Vec::new(),
                grouped_by_correlation: false,
            }));
        }

        match self.pull_up_correlation(&plan, &outer) {
            Some(subquery) => {
                log::debug!(
                    "Correlation of {} on [{}] is pulled up: [{}]",
                    id,
                    outer.iter().join(", "),
                    subquery.correlation.iter().join(", ")
                );
                Ok(Some(subquery))
            }
            None => {
                log::debug!("{} is evaluated per row: correlation on [{}] can not be pulled up", id, outer.iter().join(", "));
                Ok(None)
            }
        }
    }

    /// Same as [decorrelate](Self::decorrelate) but for subqueries of `EXISTS` and `IN` predicates.
    /// Such predicates depend on whether the subquery returns any row, so a subquery whose aggregate
    /// without grouping has been grouped by correlated columns is evaluated per row.
    fn decorrelate_predicate(&mut self, id: SubQueryId) -> Result<Option<Decorrelated>, OptimizerError> {
        match self.decorrelate(id)? {
            Some(subquery) if subquery.grouped_by_correlation => {
                log::debug!("{} is evaluated per row: its aggregate returns a row for every outer row", id);
                Ok(None)
            }
            subquery => Ok(subquery),
        }
    }

    fn pull_up_correlation(&self, expr: &LogicalExpr, outer: &[ColumnId]) -> Option<Decorrelated> {
        match expr {
            LogicalExpr::Select(select) => {
                let input = select.input.expr()?;
                let (correlation, local): (Vec<_>, Vec<_>) = split_conjunction(select.filter.clone())
                    .into_iter()
                    .partition(|e| references_any(e, outer));
                if correlation.iter().any(has_subqueries) {
                    return None;
                }
                let plan = if local.is_empty() {
                    input.clone()
                } else {
                    LogicalExpr::Select(LogicalSelect {
                        input: input.clone().into(),
                        filter: combine_conjunction(local),
                    })
                };
                if !outer_columns(&plan, self.subqueries).is_empty() {
                    return None;
                }
                Some(Decorrelated {
                    plan,
                    correlation,
                    at_most_one_row: false,
                    grouped_by_correlation: false,
                })
            }
            LogicalExpr::Projection(projection) => {
                if projection.exprs.iter().any(|e| has_subqueries(e) || references_any(e, outer)) {
                    return None;
                }
                let input = self.pull_up_correlation(projection.input.expr()?, outer)?;
                let mut exprs = projection.exprs.clone();
                let mut columns = projection.columns.clone();
                // columns referenced by the correlation must pass through the projection.
                for column in input.correlation.iter().flat_map(expr_columns) {
                    if !outer.contains(&column) && !columns.contains(&column) {
                        exprs.push(ScalarExpr::Column(column));
                        columns.push(column);
                    }
                }
                let plan = LogicalExpr::Projection(LogicalProjection {
                    input: input.plan.into(),
                    exprs,
                    columns,
                });
                Some(Decorrelated {
                    plan,
                    correlation: input.correlation,
                    at_most_one_row: input.at_most_one_row,
                    grouped_by_correlation: input.grouped_by_correlation,
                })
            }
            LogicalExpr::Aggregate(aggregate) => {
                if aggregate.aggr_exprs.iter().any(|e| has_subqueries(e) || references_any(e, outer)) {
                    return None;
                }
                let input = self.pull_up_correlation(aggregate.input.expr()?, outer)?;
                // count of an empty group is 0 but a left join produces NULL.
                if !input.correlation.is_empty() && aggregate.aggr_exprs.iter().any(uses_count) {
                    return None;
                }
                let grouped_by_correlation =
                    input.grouped_by_correlation || (aggregate.group_exprs.is_empty() && !input.correlation.is_empty());
                let mut group_exprs = aggregate.group_exprs.clone();
                for conjunct in input.correlation.iter() {
                    let column = correlation_key(conjunct, outer)?;
                    if !group_exprs.contains(&column) {
                        group_exprs.push(column);
                    }
                }
                let plan = LogicalExpr::Aggregate(LogicalAggregate {
                    input: input.plan.into(),
                    group_exprs,
                    aggr_exprs: aggregate.aggr_exprs.clone(),
                    aggr_columns: aggregate.aggr_columns.clone(),
                });
                Some(Decorrelated {
                    plan,
                    correlation: input.correlation,
                    at_most_one_row: aggregate.group_exprs.is_empty(),
                    grouped_by_correlation,
                })
            }
            _ if outer_columns(expr, self.subqueries).is_empty() => Some(Decorrelated {
                plan: expr.clone(),
                correlation: Vec::new(),
                at_most_one_row: false,
                grouped_by_correlation: false,
            }),
            _ => None,
        }
    }

    fn subquery_plan(&mut self, id: SubQueryId) -> Result<LogicalExpr, OptimizerError> {
        if let Some(plan) = self.rewritten.get(&id) {
            return Ok(plan.clone());
        }
        let subqueries = self.subqueries;
        let subquery = subqueries
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| OptimizerError::argument(format!("Unknown subquery: {}", id)))?;
        let plan = self.rewrite(&subquery.plan)?;
        self.rewritten.insert(id, plan.clone());
        Ok(plan)
    }

    /// Returns the only output column of a scalar or an `IN` subquery.
    fn subquery_column(&mut self, id: SubQueryId) -> Result<ColumnId, OptimizerError> {
        let columns = self.subquery_plan(id)?.tree_output_columns()?;
        match columns.as_slice() {
            [column] => Ok(*column),
            _ => Err(OptimizerError::argument(format!(
                "Subquery {} must return exactly one column but returns {}",
                id,
                columns.len()
            ))),
        }
    }

    fn mark_column(&self) -> ColumnId {
        self.metadata.add_column(ColumnMetadata::new_synthetic_column("mark", DataType::Bool, None))
    }

    /// Collects subqueries referenced by the given plans and by subqueries those plans reference.
    fn remaining_subqueries(
        &mut self,
        root: &LogicalExpr,
        ctes: &[CommonTableExpr],
    ) -> Result<Vec<SubQuery>, OptimizerError> {
        let mut pending = plan_subqueries(root);
        for cte in ctes {
            pending.extend(plan_subqueries(&cte.plan));
        }

        let mut plans = BTreeMap::new();
        while let Some(id) = pending.pop() {
            if plans.contains_key(&id) {
                continue;
            }
            let plan = self.subquery_plan(id)?;
            pending.extend(plan_subqueries(&plan));
            plans.insert(id, plan);
        }

        // A nested subquery is registered before the subquery that references it.
        let mut remaining: Vec<SubQuery> = Vec::with_capacity(plans.len());
        for (id, plan) in plans {
            let subquery = SubQuery::new(id, plan, &remaining);
            remaining.push(subquery);
        }
        Ok(remaining)
    }
}

struct SubQueryToJoin<'u, 'a> {
    unnester: &'u mut SubQueryUnnester<'a>,
    input: Option<LogicalExpr>,
}

impl SubQueryToJoin<'_, '_> {
    fn take_input(&mut self) -> Result<LogicalExpr, OptimizerError> {
        self.input.take().ok_or_else(|| OptimizerError::internal("Input has already been consumed"))
    }

    fn add_join(&mut self, join_type: JoinType, right: LogicalExpr, condition: ScalarExpr) -> Result<(), OptimizerError> {
        let left = self.take_input()?;
        self.input = Some(join(join_type, left, right, condition));
        Ok(())
    }
}

impl ExprRewriter for SubQueryToJoin<'_, '_> {
    type Error = OptimizerError;

    fn rewrite(&mut self, expr: ScalarExpr) -> Result<ScalarExpr, Self::Error> {
        match expr {
            ScalarExpr::Exists { not, query } => match self.unnester.decorrelate_predicate(query)? {
                Some(subquery) => {
                    let column = self.unnester.mark_column();
                    let join_type = JoinType::Mark { column, compare: None };
                    log::debug!("EXISTS {} is rewritten into {} join", query, join_type);
                    let condition = subquery.condition();
                    self.add_join(join_type, subquery.plan, condition)?;
                    let mark = ScalarExpr::Column(column);
                    Ok(if not { mark.negate() } else { mark })
                }
                None => Ok(ScalarExpr::Exists { not, query }),
            },
            ScalarExpr::InSubQuery { expr, not, query } => {
                let subquery_column = self.unnester.subquery_column(query)?;
                match self.unnester.decorrelate_predicate(query)? {
                    Some(subquery) => {
                        let column = self.unnester.mark_column();
                        let compare = (*expr).equals(ScalarExpr::Column(subquery_column));
                        let join_type = JoinType::Mark {
                            column,
                            compare: Some(Box::new(compare)),
                        };
                        log::debug!("IN {} is rewritten into {} join", query, join_type);
                        let condition = subquery.condition();
                        self.add_join(join_type, subquery.plan, condition)?;
                        let mark = ScalarExpr::Column(column);
                        Ok(if not { mark.negate() } else { mark })
                    }
                    None => Ok(ScalarExpr::InSubQuery { expr, not, query }),
                }
            }
            ScalarExpr::SubQuery(query) => {
                let column = self.unnester.subquery_column(query)?;
                match self.unnester.decorrelate(query)? {
                    Some(subquery) => {
                        let join_type = if subquery.at_most_one_row {
                            JoinType::Left
                        } else {
                            JoinType::Single
                        };
                        log::debug!("Scalar subquery {} is rewritten into {} join", query, join_type);
                        let condition = subquery.condition();
                        self.add_join(join_type, subquery.plan, condition)?;
                        Ok(ScalarExpr::Column(column))
                    }
                    None => Ok(ScalarExpr::SubQuery(query)),
                }
            }
            expr => Ok(expr),
        }
    }
}

fn join(join_type: JoinType, left: LogicalExpr, right: LogicalExpr, condition: ScalarExpr) -> LogicalExpr {
    LogicalExpr::Join(LogicalJoin {
        join_type,
        left: left.into(),
        right: right.into(),
        condition,
    })
}

fn into_expr(node: RelNode) -> Result<LogicalExpr, OptimizerError> {
    match node {
        RelNode::Expr(expr) => Ok(*expr),
        RelNode::Group(group) => Err(OptimizerError::internal(format!("Expected an expression but got a group {}", group))),
    }
}

/// Adds a projection when the output columns of the given expression differ from `columns`.
fn restore_columns(expr: LogicalExpr, columns: Vec<ColumnId>) -> Result<LogicalExpr, OptimizerError> {
    if expr.tree_output_columns()? == columns {
        Ok(expr)
    } else {
        Ok(LogicalExpr::Projection(LogicalProjection {
            input: expr.into(),
            exprs: columns.iter().map(|c| ScalarExpr::Column(*c)).collect(),
            columns,
        }))
    }
}

fn has_subqueries(expr: &ScalarExpr) -> bool {
    !expr_subqueries(expr).is_empty()
}

fn references_any(expr: &ScalarExpr, columns: &[ColumnId]) -> bool {
    expr_columns(expr).iter().any(|c| columns.contains(c))
}

/// Returns the inner column of a conjunct `inner_column = f(outer columns)`.
fn correlation_key(conjunct: &ScalarExpr, outer: &[ColumnId]) -> Option<ColumnId> {
    let key = |inner: &ScalarExpr, other: &ScalarExpr| match inner {
        ScalarExpr::Column(column) if !outer.contains(column) => {
            let columns = expr_columns(other);
            let outer_only = !columns.is_empty() && columns.iter().all(|c| outer.contains(c));
            if outer_only && !has_subqueries(other) {
                Some(*column)
            } else {
                None
            }
        }
        _ => None,
    };
    match conjunct {
        ScalarExpr::BinaryExpr {
            lhs,
            op: BinaryOp::Eq,
            rhs,
        } => key(lhs, rhs).or_else(|| key(rhs, lhs)),
        _ => None,
    }
}

fn uses_count(expr: &ScalarExpr) -> bool {
    struct FindCount(bool);

    impl ExprVisitor for FindCount {
        type Error = Infallible;

        fn post_visit(&mut self, expr: &ScalarExpr) -> Result<(), Self::Error> {
            if let ScalarExpr::Aggregate {
                func: AggregateFunction::Count,
                ..
            } = expr
            {
                self.0 = true;
            }
            Ok(())
        }
    }

    let mut visitor = FindCount(false);
    let _ = expr.accept(&mut visitor);
    visitor.0
}

fn at_most_one_row(expr: &LogicalExpr) -> bool {
    match expr {
        LogicalExpr::Aggregate(aggregate) => aggregate.group_exprs.is_empty(),
        LogicalExpr::Limit(limit) => limit.rows <= 1,
        LogicalExpr::Projection(LogicalProjection { input, .. }) | LogicalExpr::Select(LogicalSelect { input, .. }) => {
            input.expr().map(at_most_one_row).unwrap_or_default()
        }
        _ => false,
    }
}
