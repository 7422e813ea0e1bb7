//! A reference executor of physical plans.
//!
//! Every operator is evaluated in the most straightforward way. Joins of all algorithms use
//! nested loops: left rows are processed in order and unmatched right rows of right and full joins
//! are emitted last. Exchange operators do not change rows. Scalar expressions use three-valued logic.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::OptimizerError;
use crate::meta::ColumnId;
use crate::operators::join::JoinType;
use crate::operators::logical::SetOperator;
use crate::operators::physical::PhysicalOp;
use crate::operators::scalar::expr::{AggregateFunction, BinaryOp};
use crate::operators::scalar::value::ScalarValue;
use crate::operators::scalar::ScalarExpr;
use crate::operators::SubQueryId;
use crate::plan::{OptimizedQuery, PhysicalPlan};
use crate::properties::OrderingChoice;

pub type Row = Vec<ScalarValue>;

type Env = HashMap<ColumnId, ScalarValue>;

/// Rows of tables. A missing table has no rows.
#[derive(Debug, Clone)]
pub struct TestData {
    tables: HashMap<String, Vec<Row>>,
}

impl TestData {
    pub fn empty() -> Self {
        TestData { tables: HashMap::new() }
    }

    /// Adds rows of integer columns. `None` is NULL.
    pub fn with_table(mut self, table: &str, rows: Vec<Vec<Option<i32>>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|v| v.map(ScalarValue::Int32).unwrap_or(ScalarValue::Null)).collect())
            .collect();
        self.tables.insert(table.into(), rows);
        self
    }
}

impl Default for TestData {
    fn default() -> Self {
        let abc = vec![
            vec![Some(0), Some(1), Some(2), Some(3)],
            vec![Some(1), Some(2), Some(3), Some(4)],
            vec![Some(2), Some(3), Some(4), Some(5)],
        ];
        TestData::empty()
            .with_table("a", abc.clone())
            .with_table("b", abc)
            .with_table(
                "c",
                vec![
                    vec![Some(1), None, Some(2)],
                    vec![Some(2), Some(3), None],
                    vec![None, Some(1), Some(1)],
                    vec![Some(3), Some(3), Some(3)],
                ],
            )
            .with_table(
                "d",
                vec![
                    vec![Some(1), Some(1), Some(1)],
                    vec![Some(2), None, Some(2)],
                    vec![Some(3), Some(3), None],
                ],
            )
    }
}

/// Executes the given query and returns its rows with columns in the presentation order.
pub fn execute(query: &OptimizedQuery, data: &TestData) -> Result<Vec<Row>, OptimizerError> {
    let executor = Executor { query, data };
    let rows = executor.run(&query.plan, &Env::new())?;
    project_rows(rows, query.plan.output_columns(), &query.output_columns)
}

/// Executes the query and returns its rows sorted, so results of different plans can be compared.
pub fn execute_sorted(query: &OptimizedQuery, data: &TestData) -> Result<Vec<Row>, OptimizerError> {
    let mut rows = execute(query, data)?;
    rows.sort();
    Ok(rows)
}

fn project_rows(rows: Vec<Row>, columns: &[ColumnId], output: &[ColumnId]) -> Result<Vec<Row>, OptimizerError> {
    let positions = output
        .iter()
        .map(|c| {
            columns
                .iter()
                .position(|p| p == c)
                .ok_or_else(|| OptimizerError::internal(format!("Column {} is not produced by the plan {:?}", c, columns)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().map(|row| positions.iter().map(|p| row[*p].clone()).collect()).collect())
}

struct Executor<'a> {
    query: &'a OptimizedQuery,
    data: &'a TestData,
}

impl Executor<'_> {
    fn run(&self, plan: &PhysicalPlan, outer: &Env) -> Result<Vec<Row>, OptimizerError> {
        let input_rows = |i: usize| -> Result<Vec<Row>, OptimizerError> {
            let input = plan
                .inputs()
                .get(i)
                .ok_or_else(|| OptimizerError::internal(format!("{} has no input {}", plan.op(), i)))?;
            self.run(input, outer)
        };
        let input_columns = |i: usize| plan.inputs().get(i).map(|p| p.output_columns()).unwrap_or_default();

        match plan.op() {
            PhysicalOp::Scan { source, .. } => Ok(self.data.tables.get(source).cloned().unwrap_or_default()),
            PhysicalOp::IndexScan { source, ordering, .. } => {
                let mut rows = self.data.tables.get(source).cloned().unwrap_or_default();
                sort_rows(&mut rows, plan.output_columns(), ordering);
                Ok(rows)
            }
            PhysicalOp::Filter { filter } => {
                let columns = input_columns(0);
                let mut result = Vec::new();
                for row in input_rows(0)? {
                    let env = bind(outer, columns, &row);
                    if truth(&self.eval(filter, &env)?) == Some(true) {
                        result.push(row);
                    }
                }
                Ok(result)
            }
            PhysicalOp::Projection { exprs, .. } => {
                let columns = input_columns(0);
                input_rows(0)?
                    .into_iter()
                    .map(|row| {
                        let env = bind(outer, columns, &row);
                        exprs.iter().map(|e| self.eval(e, &env)).collect()
                    })
                    .collect()
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
                let inputs = (input_rows(0)?, input_rows(1)?, input_columns(0), input_columns(1));
                self.join(join_type, left_keys, right_keys, condition, inputs, outer)
            }
            PhysicalOp::NestedLoopJoin { join_type, condition } => {
                let inputs = (input_rows(0)?, input_rows(1)?, input_columns(0), input_columns(1));
                self.join(join_type, &[], &[], condition, inputs, outer)
            }
            PhysicalOp::HashAggregate {
                group_exprs,
                aggr_exprs,
                ..
            }
            | PhysicalOp::StreamingAggregate {
                group_exprs,
                aggr_exprs,
                ..
            } => self.aggregate(group_exprs, aggr_exprs, input_rows(0)?, input_columns(0), outer),
            PhysicalOp::HashSetOp {
                op,
                all,
                left_columns,
                right_columns,
                ..
            } => {
                let left = project_rows(input_rows(0)?, input_columns(0), left_columns)?;
                let right = project_rows(input_rows(1)?, input_columns(1), right_columns)?;
                Ok(set_op(*op, *all, left, right))
            }
            PhysicalOp::Limit { rows } => {
                let mut result = input_rows(0)?;
                result.truncate(*rows);
                Ok(result)
            }
            PhysicalOp::Window {
                partition_by,
                ordering,
                window_exprs,
                ..
            } => {
                let ordering = ordering.as_ref().map(|o| o.clone().into_columns()).unwrap_or_default();
                self.window(partition_by, &ordering, window_exprs, input_rows(0)?, input_columns(0), outer)
            }
            PhysicalOp::CteScan { cte, .. } => {
                let subplan = self
                    .query
                    .ctes
                    .get(cte)
                    .ok_or_else(|| OptimizerError::internal(format!("No plan for {}", cte)))?;
                let rows = self.run(&subplan.plan, outer)?;
                project_rows(rows, subplan.plan.output_columns(), &subplan.output_columns)
            }
            PhysicalOp::Sort { ordering } => {
                let mut rows = input_rows(0)?;
                sort_rows(&mut rows, plan.output_columns(), ordering);
                Ok(rows)
            }
            PhysicalOp::Gather | PhysicalOp::Redistribute { .. } | PhysicalOp::Broadcast => input_rows(0),
        }
    }

    fn join(
        &self,
        join_type: &JoinType,
        left_keys: &[ColumnId],
        right_keys: &[ColumnId],
        condition: &ScalarExpr,
        inputs: (Vec<Row>, Vec<Row>, &[ColumnId], &[ColumnId]),
        outer: &Env,
    ) -> Result<Vec<Row>, OptimizerError> {
        let (left, right, left_columns, right_columns) = inputs;
        // keys of mark and null aware anti joins come from their compare expressions.
        let use_keys = join_type.compare().is_none();
        let right_nulls = || vec![ScalarValue::Null; right_columns.len()];
        let concat = |l: &Row, r: &Row| l.iter().chain(r.iter()).cloned().collect::<Row>();

        let mut result = Vec::new();
        let mut right_matched = vec![false; right.len()];

        for l in left.iter() {
            let left_env = bind(outer, left_columns, l);
            let mut candidates = Vec::new();
            for (i, r) in right.iter().enumerate() {
                let env = bind(&left_env, right_columns, r);
                let keys_match = !use_keys
                    || left_keys.iter().zip(right_keys.iter()).all(|(lk, rk)| match (env.get(lk), env.get(rk)) {
                        (Some(lv), Some(rv)) => lv.sql_cmp(rv) == Some(Ordering::Equal),
                        _ => false,
                    });
                if keys_match && truth(&self.eval(condition, &env)?) == Some(true) {
                    candidates.push((i, env));
                }
            }

            match join_type {
                JoinType::Inner | JoinType::Cross => {
                    result.extend(candidates.iter().map(|(i, _)| concat(l, &right[*i])));
                }
                JoinType::Left | JoinType::Right | JoinType::Full => {
                    for (i, _) in candidates.iter() {
                        right_matched[*i] = true;
                        result.push(concat(l, &right[*i]));
                    }
                    if candidates.is_empty() && !matches!(join_type, JoinType::Right) {
                        result.push(concat(l, &right_nulls()));
                    }
                }
                JoinType::Semi => {
                    if !candidates.is_empty() {
                        result.push(l.clone());
                    }
                }
                JoinType::Anti => {
                    if candidates.is_empty() {
                        result.push(l.clone());
                    }
                }
                JoinType::NullAwareAnti { compare } => {
                    let mut rejected = false;
                    for (_, env) in candidates.iter() {
                        if truth(&self.eval(compare, env)?) != Some(false) {
                            rejected = true;
                            break;
                        }
                    }
                    if !rejected {
                        result.push(l.clone());
                    }
                }
                JoinType::Mark { compare, .. } => {
                    let mark = match compare {
                        None => ScalarValue::Bool(!candidates.is_empty()),
                        Some(compare) => {
                            let mut mark = ScalarValue::Bool(false);
                            for (_, env) in candidates.iter() {
                                match truth(&self.eval(compare, env)?) {
                                    Some(true) => {
                                        mark = ScalarValue::Bool(true);
                                        break;
                                    }
                                    None => mark = ScalarValue::Null,
                                    Some(false) => {}
                                }
                            }
                            mark
                        }
                    };
                    let mut row = l.clone();
                    row.push(mark);
                    result.push(row);
                }
                JoinType::Single => match candidates.as_slice() {
                    [] => result.push(concat(l, &right_nulls())),
                    [(i, _)] => result.push(concat(l, &right[*i])),
                    _ => return Err(OptimizerError::argument("Subquery returned more than one row")),
                },
            }
        }

        if matches!(join_type, JoinType::Right | JoinType::Full) {
            let left_nulls = vec![ScalarValue::Null; left_columns.len()];
            for (i, r) in right.iter().enumerate() {
                if !right_matched[i] {
                    result.push(concat(&left_nulls, r));
                }
            }
        }

        Ok(result)
    }

    fn aggregate(
        &self,
        group_exprs: &[ColumnId],
        aggr_exprs: &[ScalarExpr],
        rows: Vec<Row>,
        columns: &[ColumnId],
        outer: &Env,
    ) -> Result<Vec<Row>, OptimizerError> {
        let mut groups: Vec<(Row, Vec<Env>)> = Vec::new();
        let mut index: HashMap<Row, usize> = HashMap::new();

        for row in rows.iter() {
            let env = bind(outer, columns, row);
            let key: Row = group_exprs.iter().map(|c| env.get(c).cloned().unwrap_or(ScalarValue::Null)).collect();
            match index.get(&key) {
                Some(i) => groups[*i].1.push(env),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, vec![env]));
                }
            }
        }
        if groups.is_empty() && group_exprs.is_empty() {
            groups.push((vec![], vec![]));
        }

        let mut result = Vec::with_capacity(groups.len());
        for (key, envs) in groups {
            let mut row = key;
            for expr in aggr_exprs {
                row.push(self.aggregate_value(expr, &envs)?);
            }
            result.push(row);
        }
        Ok(result)
    }

    /// Expects rows sorted by partitioning columns and the window ordering.
    fn window(
        &self,
        partition_by: &[ColumnId],
        ordering: &[ColumnId],
        window_exprs: &[ScalarExpr],
        rows: Vec<Row>,
        columns: &[ColumnId],
        outer: &Env,
    ) -> Result<Vec<Row>, OptimizerError> {
        let envs: Vec<Env> = rows.iter().map(|row| bind(outer, columns, row)).collect();
        let key = |env: &Env, keys: &[ColumnId]| -> Row {
            keys.iter().map(|c| env.get(c).cloned().unwrap_or(ScalarValue::Null)).collect()
        };

        let mut result = Vec::with_capacity(rows.len());
        let mut start = 0;
        while start < envs.len() {
            let partition_key = key(&envs[start], partition_by);
            let end = (start..envs.len()).find(|i| key(&envs[*i], partition_by) != partition_key).unwrap_or(envs.len());
            let partition = &envs[start..end];

            for i in 0..partition.len() {
                let frame = if ordering.is_empty() {
                    partition
                } else {
                    let peer_key = key(&partition[i], ordering);
                    let last_peer = (i..partition.len()).take_while(|j| key(&partition[*j], ordering) == peer_key).last();
                    &partition[..=last_peer.unwrap_or(i)]
                };
                let mut row = rows[start + i].clone();
                for expr in window_exprs {
                    row.push(self.aggregate_value(expr, frame)?);
                }
                result.push(row);
            }
            start = end;
        }
        Ok(result)
    }

    fn aggregate_value(&self, expr: &ScalarExpr, envs: &[Env]) -> Result<ScalarValue, OptimizerError> {
        let (func, args, distinct) = match expr {
            ScalarExpr::Aggregate { func, args, distinct } => (func, args, *distinct),
            _ => return Err(OptimizerError::internal(format!("Not an aggregate: {}", expr))),
        };
        let mut values = Vec::with_capacity(envs.len());
        for env in envs {
            let value = match args.first() {
                Some(arg) => self.eval(arg, env)?,
                // count(*)
                None => ScalarValue::Bool(true),
            };
            if !value.is_null() && !(distinct && values.contains(&value)) {
                values.push(value);
            }
        }

        let value = match func {
            AggregateFunction::Count => ScalarValue::Int64(values.len() as i64),
            _ if values.is_empty() => ScalarValue::Null,
            AggregateFunction::Min | AggregateFunction::Max => {
                let wanted = if *func == AggregateFunction::Min { Ordering::Less } else { Ordering::Greater };
                let mut best = values[0].clone();
                for value in values.iter().skip(1) {
                    if value.sql_cmp(&best) == Some(wanted) {
                        best = value.clone();
                    }
                }
                best
            }
            AggregateFunction::Sum => {
                if values.iter().all(|v| matches!(v, ScalarValue::Int32(_) | ScalarValue::Int64(_))) {
                    ScalarValue::Int64(values.iter().filter_map(|v| v.as_f64()).map(|v| v as i64).sum())
                } else {
                    ScalarValue::Float64(values.iter().filter_map(|v| v.as_f64()).sum::<f64>().into())
                }
            }
            AggregateFunction::Avg => {
                let sum: f64 = values.iter().filter_map(|v| v.as_f64()).sum();
                ScalarValue::Float64((sum / values.len() as f64).into())
            }
        };
        Ok(value)
    }

    fn subquery_rows(&self, id: &SubQueryId, env: &Env) -> Result<Vec<Row>, OptimizerError> {
        let subplan = self
            .query
            .subplans
            .get(id)
            .ok_or_else(|| OptimizerError::internal(format!("No plan for subquery {}", id)))?;
        let rows = self.run(&subplan.plan, env)?;
        project_rows(rows, subplan.plan.output_columns(), &subplan.output_columns)
    }

    fn eval(&self, expr: &ScalarExpr, env: &Env) -> Result<ScalarValue, OptimizerError> {
        let value = match expr {
            ScalarExpr::Column(id) => {
                env.get(id).cloned().ok_or_else(|| OptimizerError::internal(format!("Unbound column: {}", id)))?
            }
            ScalarExpr::Scalar(value) => value.clone(),
            ScalarExpr::BinaryExpr { lhs, op, rhs } => {
                let lhs = self.eval(lhs, env)?;
                let rhs = self.eval(rhs, env)?;
                binary(*op, &lhs, &rhs)
            }
            ScalarExpr::Not(expr) => not(&self.eval(expr, env)?),
            ScalarExpr::IsNull { expr, not } => ScalarValue::Bool(self.eval(expr, env)?.is_null() != *not),
            ScalarExpr::InList { expr, list, not: negated } => {
                let value = self.eval(expr, env)?;
                let list = list.iter().map(|e| self.eval(e, env)).collect::<Result<Vec<_>, _>>()?;
                let result = in_values(&value, &list);
                if *negated {
                    not(&result)
                } else {
                    result
                }
            }
            ScalarExpr::Between {
                expr,
                low,
                high,
                not: negated,
            } => {
                let value = self.eval(expr, env)?;
                let low = binary(BinaryOp::GtEq, &value, &self.eval(low, env)?);
                let high = binary(BinaryOp::LtEq, &value, &self.eval(high, env)?);
                let result = binary(BinaryOp::And, &low, &high);
                if *negated {
                    not(&result)
                } else {
                    result
                }
            }
            ScalarExpr::Aggregate { .. } => {
                return Err(OptimizerError::internal(format!("Aggregate outside of an aggregate operator: {}", expr)))
            }
            ScalarExpr::SubQuery(id) => {
                let rows = self.subquery_rows(id, env)?;
                match rows.as_slice() {
                    [] => ScalarValue::Null,
                    [row] => row.first().cloned().unwrap_or(ScalarValue::Null),
                    _ => return Err(OptimizerError::argument("Subquery returned more than one row")),
                }
            }
            ScalarExpr::Exists { not, query } => {
                let rows = self.subquery_rows(query, env)?;
                ScalarValue::Bool(rows.is_empty() == *not)
            }
            ScalarExpr::InSubQuery {
                expr,
                not: negated,
                query,
            } => {
                let value = self.eval(expr, env)?;
                let rows = self.subquery_rows(query, env)?;
                let values: Vec<_> = rows.into_iter().filter_map(|r| r.into_iter().next()).collect();
                let result = in_values(&value, &values);
                if *negated {
                    not(&result)
                } else {
                    result
                }
            }
        };
        Ok(value)
    }
}

fn bind(outer: &Env, columns: &[ColumnId], row: &[ScalarValue]) -> Env {
    let mut env = outer.clone();
    env.extend(columns.iter().copied().zip(row.iter().cloned()));
    env
}

fn truth(value: &ScalarValue) -> Option<bool> {
    match value {
        ScalarValue::Bool(value) => Some(*value),
        _ => None,
    }
}

fn not(value: &ScalarValue) -> ScalarValue {
    match truth(value) {
        Some(value) => ScalarValue::Bool(!value),
        None => ScalarValue::Null,
    }
}

fn in_values(value: &ScalarValue, values: &[ScalarValue]) -> ScalarValue {
    if values.is_empty() {
        return ScalarValue::Bool(false);
    }
    let mut result = ScalarValue::Bool(false);
    for other in values {
        match value.sql_cmp(other) {
            Some(Ordering::Equal) => return ScalarValue::Bool(true),
            None => result = ScalarValue::Null,
            Some(_) => {}
        }
    }
    result
}

fn binary(op: BinaryOp, lhs: &ScalarValue, rhs: &ScalarValue) -> ScalarValue {
    match op {
        BinaryOp::And => match (truth(lhs), truth(rhs)) {
            (Some(false), _) | (_, Some(false)) => ScalarValue::Bool(false),
            (Some(true), Some(true)) => ScalarValue::Bool(true),
            _ => ScalarValue::Null,
        },
        BinaryOp::Or => match (truth(lhs), truth(rhs)) {
            (Some(true), _) | (_, Some(true)) => ScalarValue::Bool(true),
            (Some(false), Some(false)) => ScalarValue::Bool(false),
            _ => ScalarValue::Null,
        },
        BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            match lhs.sql_cmp(rhs) {
                None => ScalarValue::Null,
                Some(ordering) => ScalarValue::Bool(match op {
                    BinaryOp::Eq => ordering == Ordering::Equal,
                    BinaryOp::NotEq => ordering != Ordering::Equal,
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::LtEq => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }),
            }
        }
        BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Divide => arithmetic(op, lhs, rhs),
    }
}

fn arithmetic(op: BinaryOp, lhs: &ScalarValue, rhs: &ScalarValue) -> ScalarValue {
    fn int_op(op: BinaryOp, l: i64, r: i64) -> Option<i64> {
        match op {
            BinaryOp::Plus => l.checked_add(r),
            BinaryOp::Minus => l.checked_sub(r),
            BinaryOp::Multiply => l.checked_mul(r),
            _ => l.checked_div(r),
        }
    }

    match (lhs, rhs) {
        (ScalarValue::Int32(l), ScalarValue::Int32(r)) => int_op(op, *l as i64, *r as i64)
            .and_then(|v| i32::try_from(v).ok())
            .map(ScalarValue::Int32)
            .unwrap_or(ScalarValue::Null),
        (ScalarValue::Int32(_) | ScalarValue::Int64(_), ScalarValue::Int32(_) | ScalarValue::Int64(_)) => {
            match (lhs.as_f64(), rhs.as_f64()) {
                (Some(l), Some(r)) => int_op(op, l as i64, r as i64).map(ScalarValue::Int64).unwrap_or(ScalarValue::Null),
                _ => ScalarValue::Null,
            }
        }
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(l), Some(r)) => {
                let value = match op {
                    BinaryOp::Plus => l + r,
                    BinaryOp::Minus => l - r,
                    BinaryOp::Multiply => l * r,
                    _ if r == 0.0 => return ScalarValue::Null,
                    _ => l / r,
                };
                ScalarValue::Float64(value.into())
            }
            _ => ScalarValue::Null,
        },
    }
}

fn sort_rows(rows: &mut [Row], columns: &[ColumnId], ordering: &OrderingChoice) {
    let keys: Vec<_> = ordering
        .columns()
        .iter()
        .filter_map(|o| columns.iter().position(|c| *c == o.column()).map(|p| (p, o.descending())))
        .collect();
    rows.sort_by(|a, b| {
        for (p, descending) in keys.iter() {
            let ordering = a[*p].cmp(&b[*p]);
            let ordering = if *descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn set_op(op: SetOperator, all: bool, left: Vec<Row>, right: Vec<Row>) -> Vec<Row> {
    fn dedup(rows: Vec<Row>) -> Vec<Row> {
        let mut result: Vec<Row> = Vec::new();
        for row in rows {
            if !result.contains(&row) {
                result.push(row);
            }
        }
        result
    }

    match (op, all) {
        (SetOperator::Union, true) => left.into_iter().chain(right).collect(),
        (SetOperator::Union, false) => dedup(left.into_iter().chain(right).collect()),
        (SetOperator::Intersect, false) => dedup(left.into_iter().filter(|r| right.contains(r)).collect()),
        (SetOperator::Except, false) => dedup(left.into_iter().filter(|r| !right.contains(r)).collect()),
        (SetOperator::Intersect, true) => {
            let mut remaining = right;
            let mut result = Vec::new();
            for row in left {
                if let Some(p) = remaining.iter().position(|r| *r == row) {
                    remaining.remove(p);
                    result.push(row);
                }
            }
            result
        }
        (SetOperator::Except, true) => {
            let mut remaining = right;
            let mut result = Vec::new();
            for row in left {
                match remaining.iter().position(|r| *r == row) {
                    Some(p) => {
                        remaining.remove(p);
                    }
                    None => result.push(row),
                }
            }
            result
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::Metadata;
    use crate::properties::PropertySet;
    use ordered_float::OrderedFloat;

    fn node(op: PhysicalOp, inputs: Vec<PhysicalPlan>) -> PhysicalPlan {
        PhysicalPlan::new(op, inputs, PropertySet::singleton(), OrderedFloat(0.0), 0.0)
    }

    fn scan(table: &str, columns: Vec<ColumnId>) -> PhysicalPlan {
        let op = PhysicalOp::Scan {
            source: table.into(),
            columns,
        };
        node(op, vec![])
    }

    fn query(plan: PhysicalPlan, output_columns: Vec<ColumnId>) -> OptimizedQuery {
        OptimizedQuery {
            plan,
            output_columns,
            subplans: HashMap::new(),
            ctes: HashMap::new(),
            metadata: Metadata::new(vec![]),
            memo: None,
        }
    }

    fn ints(values: &[Option<i32>]) -> Row {
        values.iter().map(|v| v.map(ScalarValue::Int32).unwrap_or(ScalarValue::Null)).collect()
    }

    #[test]
    fn three_valued_logic() {
        let null = ScalarValue::Null;
        let t = ScalarValue::Bool(true);
        let f = ScalarValue::Bool(false);

        assert_eq!(binary(BinaryOp::And, &null, &f), f);
        assert_eq!(binary(BinaryOp::And, &null, &t), null);
        assert_eq!(binary(BinaryOp::Or, &null, &t), t);
        assert_eq!(not(&null), null);

        let values = vec![ScalarValue::Int32(1), ScalarValue::Int32(2), ScalarValue::Null];
        assert_eq!(not(&in_values(&ScalarValue::Int32(3), &values)), null);
        assert_eq!(in_values(&ScalarValue::Int32(2), &values), t);
        assert_eq!(in_values(&null, &[]), f);
    }

    #[test]
    fn mark_join_with_nulls() {
        // d1 IN (SELECT c1 FROM c) with c1 = {1, 2, NULL, 3}
        let compare = ScalarExpr::Column(1).equals(ScalarExpr::Column(4));
        let join_type = JoinType::Mark {
            column: 7,
            compare: Some(Box::new(compare)),
        };
        let join = node(
            PhysicalOp::NestedLoopJoin {
                join_type,
                condition: ScalarExpr::true_expr(),
            },
            vec![scan("d", vec![1, 2, 3]), scan("c", vec![4, 5, 6])],
        );
        let data = TestData::empty()
            .with_table("d", vec![vec![Some(1), None, None], vec![Some(5), None, None]])
            .with_table("c", vec![vec![Some(1), None, None], vec![None, None, None]]);

        let rows = execute(&query(join, vec![1, 7]), &data).unwrap();
        assert_eq!(
            rows,
            vec![
                vec![ScalarValue::Int32(1), ScalarValue::Bool(true)],
                vec![ScalarValue::Int32(5), ScalarValue::Null]
            ]
        );
    }

    #[test]
    fn null_aware_anti_join() {
        let compare = ScalarExpr::Column(1).equals(ScalarExpr::Column(4));
        let join = |right_rows: Vec<Vec<Option<i32>>>| {
            let plan = node(
                PhysicalOp::HashJoin {
                    join_type: JoinType::NullAwareAnti {
                        compare: Box::new(compare.clone()),
                    },
                    left_keys: vec![1],
                    right_keys: vec![4],
                    condition: ScalarExpr::true_expr(),
                },
                vec![scan("d", vec![1, 2, 3]), scan("c", vec![4, 5, 6])],
            );
            let data = TestData::default().with_table("c", right_rows);
            execute_sorted(&query(plan, vec![1]), &data).unwrap()
        };

        assert_eq!(join(vec![vec![Some(1), None, None]]), vec![ints(&[Some(2)]), ints(&[Some(3)])]);
        assert_eq!(join(vec![vec![Some(1), None, None], vec![None, None, None]]), Vec::<Row>::new());
        assert_eq!(join(vec![]), vec![ints(&[Some(1)]), ints(&[Some(2)]), ints(&[Some(3)])]);
    }

    #[test]
    fn single_join_rejects_multiple_rows() {
        let plan = node(
            PhysicalOp::NestedLoopJoin {
                join_type: JoinType::Single,
                condition: ScalarExpr::true_expr(),
            },
            vec![scan("d", vec![1, 2, 3]), scan("c", vec![4, 5, 6])],
        );
        let result = execute(&query(plan, vec![1]), &TestData::default());
        assert!(result.is_err());
    }

    #[test]
    fn full_join_emits_unmatched_rows() {
        let plan = node(
            PhysicalOp::MergeJoin {
                join_type: JoinType::Full,
                left_keys: vec![1],
                right_keys: vec![4],
                condition: ScalarExpr::Column(1).equals(ScalarExpr::Column(4)),
            },
            vec![scan("d", vec![1, 2, 3]), scan("c", vec![4, 5, 6])],
        );
        let rows = execute(&query(plan, vec![1, 4]), &TestData::default()).unwrap();
        assert_eq!(
            rows,
            vec![
                ints(&[Some(1), Some(1)]),
                ints(&[Some(2), Some(2)]),
                ints(&[Some(3), Some(3)]),
                ints(&[None, None]),
            ]
        );
    }

    #[test]
    fn set_operations() {
        let rows = |values: &[i32]| values.iter().map(|v| ints(&[Some(*v)])).collect::<Vec<_>>();

        assert_eq!(set_op(SetOperator::Union, false, rows(&[1, 1, 2]), rows(&[2, 3])), rows(&[1, 2, 3]));
        assert_eq!(set_op(SetOperator::Intersect, true, rows(&[1, 1, 2]), rows(&[1, 1, 1])), rows(&[1, 1]));
        assert_eq!(set_op(SetOperator::Except, true, rows(&[1, 1, 2]), rows(&[1])), rows(&[1, 2]));
        assert_eq!(set_op(SetOperator::Except, false, rows(&[1, 1, 2]), rows(&[2])), rows(&[1]));
    }
}
