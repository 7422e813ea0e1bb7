use std::convert::Infallible;
use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::datatypes::DataType;
use crate::meta::ColumnId;
use crate::operators::scalar::value::ScalarValue;
use crate::operators::SubQueryId;

/// Scalar expressions. Subqueries are referenced by their identifiers,
/// their plans are stored in the [query](crate::operators::Query) they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarExpr {
    Column(ColumnId),
    Scalar(ScalarValue),
    BinaryExpr {
        lhs: Box<ScalarExpr>,
        op: BinaryOp,
        rhs: Box<ScalarExpr>,
    },
    Not(Box<ScalarExpr>),
    IsNull {
        expr: Box<ScalarExpr>,
        not: bool,
    },
    InList {
        expr: Box<ScalarExpr>,
        list: Vec<ScalarExpr>,
        not: bool,
    },
    Between {
        expr: Box<ScalarExpr>,
        low: Box<ScalarExpr>,
        high: Box<ScalarExpr>,
        not: bool,
    },
    Aggregate {
        func: AggregateFunction,
        args: Vec<ScalarExpr>,
        distinct: bool,
    },
    /// A scalar subquery. Evaluates to the only value of the only column of its result
    /// or to NULL when the subquery returns no rows.
    SubQuery(SubQueryId),
    /// `[NOT] EXISTS (subquery)`.
    Exists {
        not: bool,
        query: SubQueryId,
    },
    /// `expr [NOT] IN (subquery)`.
    InSubQuery {
        expr: Box<ScalarExpr>,
        not: bool,
        query: SubQueryId,
    },
}

impl ScalarExpr {
    /// Creates a literal `TRUE`.
    pub fn true_expr() -> ScalarExpr {
        ScalarExpr::Scalar(ScalarValue::Bool(true))
    }

    /// Creates a binary expression `self op rhs`.
    pub fn binary(self, op: BinaryOp, rhs: ScalarExpr) -> ScalarExpr {
        ScalarExpr::BinaryExpr {
            lhs: Box::new(self),
            op,
            rhs: Box::new(rhs),
        }
    }

    /// Creates `self AND rhs`.
    pub fn and(self, rhs: ScalarExpr) -> ScalarExpr {
        self.binary(BinaryOp::And, rhs)
    }

    /// Creates `self OR rhs`.
    pub fn or(self, rhs: ScalarExpr) -> ScalarExpr {
        self.binary(BinaryOp::Or, rhs)
    }

    /// Creates `self = rhs`.
    pub fn equals(self, rhs: ScalarExpr) -> ScalarExpr {
        self.binary(BinaryOp::Eq, rhs)
    }

    /// Creates `NOT self`.
    pub fn negate(self) -> ScalarExpr {
        ScalarExpr::Not(Box::new(self))
    }

    /// Returns `true` if this expression is a literal `TRUE`.
    pub fn is_true(&self) -> bool {
        matches!(self, ScalarExpr::Scalar(ScalarValue::Bool(true)))
    }

    /// Returns the type of this expression.
    /// `column_type` provides the types of the columns referenced by this expression.
    pub fn data_type<F>(&self, column_type: &F) -> DataType
    where
        F: Fn(&ColumnId) -> DataType,
    {
        match self {
            ScalarExpr::Column(id) => column_type(id),
            ScalarExpr::Scalar(value) => value.data_type(),
            ScalarExpr::BinaryExpr { lhs, op, rhs } => match op {
                BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Divide => {
                    let lhs = lhs.data_type(column_type);
                    let rhs = rhs.data_type(column_type);
                    match (lhs, rhs) {
                        (DataType::Float64, _) | (_, DataType::Float64) => DataType::Float64,
                        (DataType::Int64, _) | (_, DataType::Int64) => DataType::Int64,
                        (DataType::Null, other) => other,
                        (other, _) => other,
                    }
                }
                _ => DataType::Bool,
            },
            ScalarExpr::Aggregate { func, args, .. } => match func {
                AggregateFunction::Count => DataType::Int64,
                AggregateFunction::Avg => DataType::Float64,
                AggregateFunction::Sum => match args.first().map(|a| a.data_type(column_type)) {
                    Some(DataType::Float64) => DataType::Float64,
                    _ => DataType::Int64,
                },
                AggregateFunction::Min | AggregateFunction::Max => {
                    args.first().map(|a| a.data_type(column_type)).unwrap_or(DataType::Null)
                }
            },
            // The type of a scalar subquery is the type of its output column which is known to the caller.
            ScalarExpr::SubQuery(_) => DataType::Null,
            ScalarExpr::Not(_)
            | ScalarExpr::IsNull { .. }
            | ScalarExpr::InList { .. }
            | ScalarExpr::Between { .. }
            | ScalarExpr::Exists { .. }
            | ScalarExpr::InSubQuery { .. } => DataType::Bool,
        }
    }

    /// Performs a depth-first traversal of this expression tree calling methods of the given `visitor`.
    ///
    /// If [ExprVisitor::pre_visit] returns `false` then child expressions of the expression are not visited.
    /// If an error is returned then traversal terminates.
    pub fn accept<V>(&self, visitor: &mut V) -> Result<(), V::Error>
    where
        V: ExprVisitor,
    {
        if !visitor.pre_visit(self)? {
            return Ok(());
        }
        match self {
            ScalarExpr::Column(_) => {}
            ScalarExpr::Scalar(_) => {}
            ScalarExpr::BinaryExpr { lhs, rhs, .. } => {
                lhs.accept(visitor)?;
                rhs.accept(visitor)?;
            }
            ScalarExpr::Not(expr) => expr.accept(visitor)?,
            ScalarExpr::IsNull { expr, .. } => expr.accept(visitor)?,
            ScalarExpr::InList { expr, list, .. } => {
                expr.accept(visitor)?;
                for e in list {
                    e.accept(visitor)?;
                }
            }
            ScalarExpr::Between { expr, low, high, .. } => {
                expr.accept(visitor)?;
                low.accept(visitor)?;
                high.accept(visitor)?;
            }
            ScalarExpr::Aggregate { args, .. } => {
                for arg in args {
                    arg.accept(visitor)?;
                }
            }
            ScalarExpr::SubQuery(_) => {}
            ScalarExpr::Exists { .. } => {}
            ScalarExpr::InSubQuery { expr, .. } => expr.accept(visitor)?,
        }
        visitor.post_visit(self)
    }

    /// Performs a depth-first traversal of this expression and recursively calls [ExprRewriter::rewrite] for
    /// every expression. Child expressions are rewritten before their parent.
    ///
    /// If [ExprRewriter::pre_rewrite] returns `false` then the expression is returned as is.
    pub fn rewrite<V>(self, rewriter: &mut V) -> Result<Self, V::Error>
    where
        V: ExprRewriter,
    {
        if !rewriter.pre_rewrite(&self)? {
            return Ok(self);
        }
        let expr = match self {
            ScalarExpr::Column(_) | ScalarExpr::Scalar(_) => self,
            ScalarExpr::BinaryExpr { lhs, op, rhs } => ScalarExpr::BinaryExpr {
                lhs: rewrite_boxed(*lhs, rewriter)?,
                op,
                rhs: rewrite_boxed(*rhs, rewriter)?,
            },
            ScalarExpr::Not(expr) => ScalarExpr::Not(rewrite_boxed(*expr, rewriter)?),
            ScalarExpr::IsNull { expr, not } => ScalarExpr::IsNull {
                expr: rewrite_boxed(*expr, rewriter)?,
                not,
            },
            ScalarExpr::InList { expr, list, not } => ScalarExpr::InList {
                expr: rewrite_boxed(*expr, rewriter)?,
                list: rewrite_vec(list, rewriter)?,
                not,
            },
            ScalarExpr::Between { expr, low, high, not } => ScalarExpr::Between {
                expr: rewrite_boxed(*expr, rewriter)?,
                low: rewrite_boxed(*low, rewriter)?,
                high: rewrite_boxed(*high, rewriter)?,
                not,
            },
            ScalarExpr::Aggregate { func, args, distinct } => ScalarExpr::Aggregate {
                func,
                args: rewrite_vec(args, rewriter)?,
                distinct,
            },
            ScalarExpr::SubQuery(_) | ScalarExpr::Exists { .. } => self,
            ScalarExpr::InSubQuery { expr, not, query } => ScalarExpr::InSubQuery {
                expr: rewrite_boxed(*expr, rewriter)?,
                not,
                query,
            },
        };
        rewriter.rewrite(expr)
    }
}

/// Called by [ScalarExpr::accept] during a traversal of an expression tree.
pub trait ExprVisitor {
    /// The error type returned when operation fails.
    type Error;

    /// Called before all child expressions of `expr` are visited.
    /// Default implementation always returns `Ok(true)`.
    fn pre_visit(&mut self, _expr: &ScalarExpr) -> Result<bool, Self::Error> {
        Ok(true)
    }

    /// Called after all child expressions of `expr` are visited.
    fn post_visit(&mut self, expr: &ScalarExpr) -> Result<(), Self::Error>;
}

/// Called by [ScalarExpr::rewrite] during a traversal of an expression tree.
pub trait ExprRewriter {
    /// The error type returned when operation fails.
    type Error;

    /// Called before `expr` is rewritten. Default implementation always returns `Ok(true)`.
    fn pre_rewrite(&mut self, _expr: &ScalarExpr) -> Result<bool, Self::Error> {
        Ok(true)
    }

    /// Rewrites the given expression. Called after all child expressions of `expr` are rewritten.
    fn rewrite(&mut self, expr: ScalarExpr) -> Result<ScalarExpr, Self::Error>;
}

fn rewrite_boxed<V>(expr: ScalarExpr, rewriter: &mut V) -> Result<Box<ScalarExpr>, V::Error>
where
    V: ExprRewriter,
{
    let new_expr = expr.rewrite(rewriter)?;
    Ok(Box::new(new_expr))
}

fn rewrite_vec<V>(exprs: Vec<ScalarExpr>, rewriter: &mut V) -> Result<Vec<ScalarExpr>, V::Error>
where
    V: ExprRewriter,
{
    exprs.into_iter().map(|e| e.rewrite(rewriter)).collect()
}

/// Rewrites the given expression with a function that can not fail.
pub fn rewrite_with<F>(expr: ScalarExpr, f: F) -> ScalarExpr
where
    F: FnMut(ScalarExpr) -> ScalarExpr,
{
    struct FnRewriter<F>(F);

    impl<F> ExprRewriter for FnRewriter<F>
    where
        F: FnMut(ScalarExpr) -> ScalarExpr,
    {
        type Error = Infallible;

        fn rewrite(&mut self, expr: ScalarExpr) -> Result<ScalarExpr, Self::Error> {
            Ok((self.0)(expr))
        }
    }

    match expr.rewrite(&mut FnRewriter(f)) {
        Ok(expr) => expr,
        Err(never) => match never {},
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl BinaryOp {
    /// Returns `true` if this is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq
        )
    }

    /// Returns an operator `op` such that `a self b` is equivalent to `b op a`.
    pub fn swap(&self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::LtEq => BinaryOp::GtEq,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::GtEq => BinaryOp::LtEq,
            other => *other,
        }
    }
}

impl Display for ScalarExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarExpr::Column(column_id) => write!(f, "col:{}", column_id),
            ScalarExpr::Scalar(value) => write!(f, "{}", value),
            ScalarExpr::BinaryExpr { lhs, op, rhs } => match op {
                BinaryOp::And | BinaryOp::Or => write!(f, "({} {} {})", lhs, op, rhs),
                _ => write!(f, "{} {} {}", lhs, op, rhs),
            },
            ScalarExpr::Not(expr) => write!(f, "NOT {}", expr),
            ScalarExpr::IsNull { expr, not } => {
                write!(f, "{} IS {}NULL", expr, if *not { "NOT " } else { "" })
            }
            ScalarExpr::InList { expr, list, not } => {
                write!(f, "{} {}IN ({})", expr, if *not { "NOT " } else { "" }, list.iter().join(", "))
            }
            ScalarExpr::Between { expr, low, high, not } => {
                write!(f, "{} {}BETWEEN {} AND {}", expr, if *not { "NOT " } else { "" }, low, high)
            }
            ScalarExpr::Aggregate { func, args, distinct } => {
                write!(f, "{}({}{})", func, if *distinct { "DISTINCT " } else { "" }, args.iter().join(", "))
            }
            ScalarExpr::SubQuery(query) => write!(f, "SubQuery {}", query),
            ScalarExpr::Exists { not, query } => write!(f, "{}EXISTS {}", if *not { "NOT " } else { "" }, query),
            ScalarExpr::InSubQuery { expr, not, query } => {
                write!(f, "{} {}IN {}", expr, if *not { "NOT " } else { "" }, query)
            }
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOp::And => write!(f, "AND"),
            BinaryOp::Or => write!(f, "OR"),
            BinaryOp::Eq => write!(f, "="),
            BinaryOp::NotEq => write!(f, "!="),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::LtEq => write!(f, "<="),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::GtEq => write!(f, ">="),
            BinaryOp::Plus => write!(f, "+"),
            BinaryOp::Minus => write!(f, "-"),
            BinaryOp::Multiply => write!(f, "*"),
            BinaryOp::Divide => write!(f, "/"),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum AggregateFunction {
    Avg,
    Count,
    Max,
    Min,
    Sum,
}

impl Display for AggregateFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateFunction::Avg => write!(f, "avg"),
            AggregateFunction::Count => write!(f, "count"),
            AggregateFunction::Max => write!(f, "max"),
            AggregateFunction::Min => write!(f, "min"),
            AggregateFunction::Sum => write!(f, "sum"),
        }
    }
}
