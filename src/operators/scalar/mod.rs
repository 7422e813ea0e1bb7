use std::collections::HashMap;
use std::convert::Infallible;

use crate::meta::ColumnId;
use crate::operators::scalar::expr::{rewrite_with, BinaryOp, ExprVisitor};
use crate::operators::SubQueryId;

pub mod expr;
pub mod value;

pub use expr::ScalarExpr;
pub use value::ScalarValue;

/// Splits the given predicate into a list of conjuncts: `a AND (b AND c)` becomes `[a, b, c]`.
/// A literal `TRUE` produces an empty list.
pub fn split_conjunction(expr: ScalarExpr) -> Vec<ScalarExpr> {
    fn split(expr: ScalarExpr, out: &mut Vec<ScalarExpr>) {
        match expr {
            ScalarExpr::BinaryExpr {
                lhs,
                op: BinaryOp::And,
                rhs,
            } => {
                split(*lhs, out);
                split(*rhs, out);
            }
            expr if expr.is_true() => {}
            expr => out.push(expr),
        }
    }
    let mut out = Vec::new();
    split(expr, &mut out);
    out
}

/// Combines the given predicates with `AND`. An empty list produces a literal `TRUE`.
pub fn combine_conjunction<I>(exprs: I) -> ScalarExpr
where
    I: IntoIterator<Item = ScalarExpr>,
{
    exprs.into_iter().reduce(|acc, e| acc.and(e)).unwrap_or_else(ScalarExpr::true_expr)
}

/// Returns the columns referenced by the given expression in the order of their first appearance.
pub fn expr_columns(expr: &ScalarExpr) -> Vec<ColumnId> {
    struct CollectColumns(Vec<ColumnId>);

    impl ExprVisitor for CollectColumns {
        type Error = Infallible;

        fn post_visit(&mut self, expr: &ScalarExpr) -> Result<(), Self::Error> {
            if let ScalarExpr::Column(id) = expr {
                if !self.0.contains(id) {
                    self.0.push(*id);
                }
            }
            Ok(())
        }
    }

    let mut visitor = CollectColumns(Vec::new());
    let _ = expr.accept(&mut visitor);
    visitor.0
}

/// Returns subqueries referenced by the given expression.
pub fn expr_subqueries(expr: &ScalarExpr) -> Vec<SubQueryId> {
    struct CollectSubQueries(Vec<SubQueryId>);

    impl ExprVisitor for CollectSubQueries {
        type Error = Infallible;

        fn post_visit(&mut self, expr: &ScalarExpr) -> Result<(), Self::Error> {
            match expr {
                ScalarExpr::SubQuery(query) | ScalarExpr::Exists { query, .. } | ScalarExpr::InSubQuery { query, .. } => {
                    self.0.push(*query)
                }
                _ => {}
            }
            Ok(())
        }
    }

    let mut visitor = CollectSubQueries(Vec::new());
    let _ = expr.accept(&mut visitor);
    visitor.0
}

/// Returns `true` if the given expression contains an aggregate function.
pub fn contains_aggregates(expr: &ScalarExpr) -> bool {
    struct FindAggregate(bool);

    impl ExprVisitor for FindAggregate {
        type Error = Infallible;

        fn pre_visit(&mut self, expr: &ScalarExpr) -> Result<bool, Self::Error> {
            if matches!(expr, ScalarExpr::Aggregate { .. }) {
                self.0 = true;
            }
            Ok(!self.0)
        }

        fn post_visit(&mut self, _expr: &ScalarExpr) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    let mut visitor = FindAggregate(false);
    let _ = expr.accept(&mut visitor);
    visitor.0
}

/// Replaces column references according to the given mapping. Columns absent from the mapping are left intact.
pub fn replace_columns(expr: ScalarExpr, mapping: &HashMap<ColumnId, ColumnId>) -> ScalarExpr {
    rewrite_with(expr, |e| match e {
        ScalarExpr::Column(id) => ScalarExpr::Column(mapping.get(&id).copied().unwrap_or(id)),
        _ => e,
    })
}
