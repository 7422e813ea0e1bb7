//! End-to-end tests: queries are optimized under different configurations and the resulting plans
//! are executed by the reference executor.

use std::time::Duration;

use crate::error::OptimizerError;
use crate::meta::ColumnId;
use crate::operators::join::JoinType;
use crate::operators::physical::PhysicalOp;
use crate::operators::logical::LogicalExpr;
use crate::operators::scalar::expr::{AggregateFunction, BinaryOp};
use crate::operators::scalar::value::ScalarValue;
use crate::operators::scalar::ScalarExpr;
use crate::operators::Query;
use crate::optimizer::Optimizer;
use crate::options::{JoinOrderStrategy, OptimizerOptions};
use crate::plan::{OptimizedQuery, PhysicalPlan};
use crate::properties::OrderingChoice;
use crate::testing::exec::{execute, execute_sorted, Row, TestData};
use crate::testing::{aggr, col, init_logger, int, join, limit, null, select, test_catalog, QueryBuilder};

fn optimize(query: Query, options: OptimizerOptions) -> Result<OptimizedQuery, OptimizerError> {
    init_logger();
    Optimizer::new(test_catalog(), options).optimize(query)
}

fn run(query: Query, options: OptimizerOptions) -> Vec<Row> {
    let result = optimize(query, options.clone()).unwrap_or_else(|e| panic!("Failed to optimize {:?}: {}", options, e));
    execute_sorted(&result, &TestData::default()).unwrap_or_else(|e| panic!("Failed to execute:\n{}\n{}", result.plan, e))
}

fn ints(rows: &[&[Option<i32>]]) -> Vec<Row> {
    let mut rows: Vec<Row> = rows
        .iter()
        .map(|row| row.iter().map(|v| v.map(ScalarValue::Int32).unwrap_or(ScalarValue::Null)).collect())
        .collect();
    rows.sort();
    rows
}

fn count_ops(plan: &PhysicalPlan, name: &str) -> usize {
    let mut count = 0;
    plan.for_each(&mut |p| {
        if p.op().name() == name {
            count += 1;
        }
    });
    count
}

fn all_configurations() -> Vec<OptimizerOptions> {
    let mut configurations = vec![OptimizerOptions::default().with_memo(false)];
    for strategy in [
        JoinOrderStrategy::Transformations,
        JoinOrderStrategy::DPccp,
        JoinOrderStrategy::DPBushy,
        JoinOrderStrategy::Greedy,
    ] {
        for cross_joins in [false, true] {
            configurations.push(OptimizerOptions::default().with_join_order(strategy).with_cross_joins(cross_joins));
        }
    }
    configurations.push(OptimizerOptions::default().with_workers(4));
    configurations
}

// SELECT a1, b1 FROM a JOIN b ON a1 = b1
fn join_query() -> Query {
    let builder = QueryBuilder::default();
    let (a, a_cols) = builder.get("a");
    let (b, b_cols) = builder.get("b");
    let ab = join(JoinType::Inner, a, b, col(a_cols[0]).equals(col(b_cols[0])));
    let (root, _) = builder.project(ab, vec![col(a_cols[0]), col(b_cols[0])]);
    builder.build(root)
}

#[test]
fn test_join() {
    let expected = ints(&[&[Some(0), Some(0)], &[Some(1), Some(1)], &[Some(2), Some(2)]]);

    for options in all_configurations() {
        assert_eq!(run(join_query(), options.clone()), expected, "options: {:?}", options);
    }
}

// SELECT a1, b1, c1, d1 FROM a JOIN b ON a1 = b1 JOIN c ON b2 = c1 JOIN d ON c2 = d1
fn four_way_join_query() -> Query {
    let builder = QueryBuilder::default();
    let (a, _) = builder.get("a");
    let (b, _) = builder.get("b");
    let (c, _) = builder.get("c");
    let (d, _) = builder.get("d");
    let ab = join(JoinType::Inner, a, b, col(1).equals(col(5)));
    let abc = join(JoinType::Inner, ab, c, col(6).equals(col(9)));
    let abcd = join(JoinType::Inner, abc, d, col(10).equals(col(12)));
    let (root, _) = builder.project(abcd, vec![col(1), col(5), col(9), col(12)]);
    builder.build(root)
}

#[test]
fn test_join_orders_produce_same_rows() {
    let expected = ints(&[&[Some(1), Some(1), Some(2), Some(3)], &[Some(2), Some(2), Some(3), Some(3)]]);

    for options in all_configurations() {
        assert_eq!(run(four_way_join_query(), options.clone()), expected, "options: {:?}", options);
    }
}

#[test]
fn test_greedy_ordering_above_dp_threshold() {
    let expected = run(four_way_join_query(), OptimizerOptions::default());
    let options = OptimizerOptions::default().with_dp_threshold(2);

    assert_eq!(run(four_way_join_query(), options), expected);
}

// SELECT a2 FROM a WHERE [NOT] EXISTS (SELECT * FROM a b WHERE b.a3 >= a.a1 + b.a1 + 1)
fn exists_query(not: bool) -> Query {
    let builder = QueryBuilder::default();
    let (inner, inner_cols) = builder.get("a");
    let (outer, outer_cols) = builder.get("a");
    let filter = col(inner_cols[2]).binary(
        BinaryOp::GtEq,
        col(outer_cols[0]).binary(BinaryOp::Plus, col(inner_cols[0])).binary(BinaryOp::Plus, int(1)),
    );
    let exists = builder.exists(select(inner, filter), not);
    let (root, _) = builder.project(select(outer, exists), vec![col(outer_cols[1])]);
    builder.build(root)
}

#[test]
fn test_correlated_exists() {
    for unnesting in [true, false] {
        let options = OptimizerOptions::default().with_subquery_unnesting(unnesting);

        assert_eq!(run(exists_query(false), options.clone()), ints(&[&[Some(1)], &[Some(2)]]), "unnesting: {}", unnesting);
        assert_eq!(run(exists_query(true), options), ints(&[&[Some(3)]]), "unnesting: {}", unnesting);
    }
}

#[test]
fn test_not_in_list_with_null() {
    let builder = QueryBuilder::default();
    let (a, a_cols) = builder.get("a");
    let not_in = ScalarExpr::InList {
        expr: Box::new(col(a_cols[1])),
        list: vec![int(1), int(2), null()],
        not: true,
    };
    let (root, _) = builder.project(select(a, not_in), vec![col(a_cols[1])]);
    let query = builder.build(root);

    assert_eq!(run(query, OptimizerOptions::default()), Vec::<Row>::new());
}

// SELECT a1 FROM a WHERE a2 [NOT] IN (SELECT c2 FROM c)
fn in_subquery_query(not: bool) -> Query {
    let builder = QueryBuilder::default();
    let (c, c_cols) = builder.get("c");
    let (inner, _) = builder.project(c, vec![col(c_cols[1])]);
    let (a, a_cols) = builder.get("a");
    let in_subquery = builder.in_subquery(col(a_cols[1]), inner, not);
    let (root, _) = builder.project(select(a, in_subquery), vec![col(a_cols[0])]);
    builder.build(root)
}

#[test]
fn test_in_subquery_with_nulls() {
    // c2 = {NULL, 3, 1, 3}
    for unnesting in [true, false] {
        let options = OptimizerOptions::default().with_subquery_unnesting(unnesting);

        assert_eq!(run(in_subquery_query(false), options.clone()), ints(&[&[Some(0)], &[Some(2)]]), "unnesting: {}", unnesting);
        assert_eq!(run(in_subquery_query(true), options), Vec::<Row>::new(), "unnesting: {}", unnesting);
    }
}

#[test]
fn test_not_in_subquery_without_nulls() {
    // SELECT a1 FROM a WHERE a2 NOT IN (SELECT c1 FROM c WHERE c1 > 1)
    let query = || {
        let builder = QueryBuilder::default();
        let (c, c_cols) = builder.get("c");
        let (inner, _) = builder.project(select(c, col(c_cols[0]).binary(BinaryOp::Gt, int(1))), vec![col(c_cols[0])]);
        let (a, a_cols) = builder.get("a");
        let not_in = builder.in_subquery(col(a_cols[1]), inner, true);
        let (root, _) = builder.project(select(a, not_in), vec![col(a_cols[0])]);
        builder.build(root)
    };
    let unnested = run(query(), OptimizerOptions::default());
    let nested = run(query(), OptimizerOptions::default().with_subquery_unnesting(false));

    assert_eq!(unnested, ints(&[&[Some(0)]]));
    assert_eq!(unnested, nested);
}

/// Runs the given query with and without subquery unnesting and in distributed mode.
/// Expects every run to return the same rows.
fn run_unnested_and_nested(query: impl Fn() -> Query) -> Vec<Row> {
    let nested = run(query(), OptimizerOptions::default().with_subquery_unnesting(false));
    let unnested = run(query(), OptimizerOptions::default());
    let distributed = run(query(), OptimizerOptions::default().with_workers(4));

    assert_eq!(unnested, nested, "unnested and nested results differ");
    assert_eq!(distributed, nested, "distributed and nested results differ");
    nested
}

// SELECT a1 FROM a WHERE <predicate over (SELECT max(c2) FROM c WHERE c1 = a1)>
fn correlated_max_query(predicate: impl Fn(&QueryBuilder, LogicalExpr, &[ColumnId]) -> ScalarExpr) -> Query {
    let builder = QueryBuilder::default();
    let (a, a_cols) = builder.get("a");
    let (c, c_cols) = builder.get("c");
    let (inner, _) = builder.aggregate(
        select(c, col(c_cols[0]).equals(col(a_cols[0]))),
        vec![],
        vec![aggr(AggregateFunction::Max, col(c_cols[1]))],
    );
    let filter = predicate(&builder, inner, &a_cols[..]);
    let (root, _) = builder.project(select(a, filter), vec![col(a_cols[0])]);
    builder.build(root)
}

#[test]
fn test_correlated_aggregate_subqueries() {
    // max(c2) per a1: 0 -> NULL (no rows), 1 -> NULL, 2 -> 3
    let exists = run_unnested_and_nested(|| correlated_max_query(|b, inner, _| b.exists(inner, false)));
    assert_eq!(exists, ints(&[&[Some(0)], &[Some(1)], &[Some(2)]]));

    let not_exists = run_unnested_and_nested(|| correlated_max_query(|b, inner, _| b.exists(inner, true)));
    assert_eq!(not_exists, Vec::<Row>::new());

    let not_in = run_unnested_and_nested(|| correlated_max_query(|b, inner, a| b.in_subquery(col(a[1]), inner, true)));
    assert_eq!(not_in, Vec::<Row>::new());

    let in_or = run_unnested_and_nested(|| {
        correlated_max_query(|b, inner, a| b.in_subquery(col(a[1]), inner, false).or(col(a[0]).equals(int(1))))
    });
    assert_eq!(in_or, ints(&[&[Some(1)], &[Some(2)]]));

    let scalar = run_unnested_and_nested(|| correlated_max_query(|b, inner, a| col(a[1]).equals(b.scalar_subquery(inner))));
    assert_eq!(scalar, ints(&[&[Some(2)]]));
}

// SELECT a1 FROM a WHERE a2 [NOT] IN (SELECT c2 FROM c) OR a1 = 0
fn in_subquery_in_disjunction_query(not: bool) -> Query {
    let builder = QueryBuilder::default();
    let (c, c_cols) = builder.get("c");
    let (inner, _) = builder.project(c, vec![col(c_cols[1])]);
    let (a, a_cols) = builder.get("a");
    let filter = builder.in_subquery(col(a_cols[1]), inner, not).or(col(a_cols[0]).equals(int(0)));
    let (root, _) = builder.project(select(a, filter), vec![col(a_cols[0])]);
    builder.build(root)
}

#[test]
fn test_in_subquery_in_disjunction_with_nulls() {
    // c2 = {NULL, 3, 1, 3}, a2 = 2 is neither IN nor NOT IN.
    let rows = run_unnested_and_nested(|| in_subquery_in_disjunction_query(false));
    assert_eq!(rows, ints(&[&[Some(0)], &[Some(2)]]));

    let rows = run_unnested_and_nested(|| in_subquery_in_disjunction_query(true));
    assert_eq!(rows, ints(&[&[Some(0)]]));

    let unnested = optimize(in_subquery_in_disjunction_query(false), OptimizerOptions::default()).unwrap();
    assert!(unnested.subplans.is_empty(), "plan:\n{}", unnested.plan);
}

#[test]
fn test_scalar_subquery_with_many_rows() {
    // SELECT a1 FROM a WHERE a2 = (SELECT b1 FROM b WHERE b2 > a1)
    let query = || {
        let builder = QueryBuilder::default();
        let (a, a_cols) = builder.get("a");
        let (b, b_cols) = builder.get("b");
        let (inner, _) = builder.project(select(b, col(b_cols[1]).binary(BinaryOp::Gt, col(a_cols[0]))), vec![col(b_cols[0])]);
        let filter = col(a_cols[1]).equals(builder.scalar_subquery(inner));
        let (root, _) = builder.project(select(a, filter), vec![col(a_cols[0])]);
        builder.build(root)
    };

    for unnesting in [true, false] {
        let options = OptimizerOptions::default().with_subquery_unnesting(unnesting);
        let result = optimize(query(), options).unwrap();
        let rows = execute(&result, &TestData::default());

        match rows {
            Err(OptimizerError::Argument(err)) => {
                assert_eq!(err.message(), "Subquery returned more than one row", "unnesting: {}", unnesting)
            }
            other => panic!("Unexpected result: {:?}. unnesting: {}\n{}", other, unnesting, result.plan),
        }
    }
}

#[test]
fn test_uncorrelated_scalar_subquery() {
    // SELECT a1 FROM a WHERE a2 = (SELECT d1 FROM d WHERE d3 IS NULL)
    let query = || {
        let builder = QueryBuilder::default();
        let (d, d_cols) = builder.get("d");
        let is_null = ScalarExpr::IsNull {
            expr: Box::new(col(d_cols[2])),
            not: false,
        };
        let (inner, _) = builder.project(select(d, is_null), vec![col(d_cols[0])]);
        let subquery = builder.scalar_subquery(inner);
        let (a, a_cols) = builder.get("a");
        let (root, _) = builder.project(select(a, col(a_cols[1]).equals(subquery)), vec![col(a_cols[0])]);
        builder.build(root)
    };

    for unnesting in [true, false] {
        let options = OptimizerOptions::default().with_subquery_unnesting(unnesting);
        assert_eq!(run(query(), options), ints(&[&[Some(2)]]), "unnesting: {}", unnesting);
    }
}

#[test]
fn test_reject_multi_column_scalar_subquery() {
    let builder = QueryBuilder::default();
    let (b, _) = builder.get("b");
    let subquery = builder.scalar_subquery(b);
    let (a, a_cols) = builder.get("a");
    let query = builder.build(select(a, col(a_cols[0]).equals(subquery)));

    let result = optimize(query, OptimizerOptions::default().with_subquery_unnesting(false));
    assert!(matches!(result, Err(OptimizerError::Argument(_))), "{:?}", result.map(|r| r.plan));
}

// SELECT c1, max(c3) OVER (PARTITION BY c2 [ORDER BY c1]) FROM c
fn window_query(ordered: bool) -> Query {
    let builder = QueryBuilder::default();
    let (c, c_cols) = builder.get("c");
    let ordering = if ordered {
        Some(OrderingChoice::from_columns(vec![c_cols[0]]))
    } else {
        None
    };
    let (window, window_cols) =
        builder.window(c, vec![c_cols[1]], ordering, vec![aggr(AggregateFunction::Max, col(c_cols[2]))]);
    let (root, _) = builder.project(window, vec![col(c_cols[0]), col(window_cols[0])]);
    builder.build(root)
}

#[test]
fn test_window_functions() {
    // c = {(1, NULL, 2), (2, 3, NULL), (NULL, 1, 1), (3, 3, 3)}
    let running = ints(&[&[Some(1), Some(2)], &[None, Some(1)], &[Some(2), None], &[Some(3), Some(3)]]);
    let whole_partition = ints(&[&[Some(1), Some(2)], &[None, Some(1)], &[Some(2), Some(3)], &[Some(3), Some(3)]]);

    for options in all_configurations() {
        assert_eq!(run(window_query(true), options.clone()), running, "options: {:?}", options);
        assert_eq!(run(window_query(false), options.clone()), whole_partition, "options: {:?}", options);
    }

    let result = optimize(window_query(true), OptimizerOptions::default()).unwrap();
    assert_eq!(count_ops(&result.plan, "Window"), 1, "plan:\n{}", result.plan);
}

#[test]
fn test_reject_window_function_without_aggregate() {
    let builder = QueryBuilder::default();
    let (c, c_cols) = builder.get("c");
    let (window, _) = builder.window(c, vec![c_cols[1]], None, vec![col(c_cols[0])]);
    let query = builder.build(window);

    let result = optimize(query, OptimizerOptions::default());
    assert!(matches!(result, Err(OptimizerError::Argument(_))), "{:?}", result.map(|r| r.plan));
}

// WITH t AS (SELECT a1, a2 FROM a WHERE a1 > 0) SELECT l.a1, r.a2 FROM t l JOIN t r ON l.a1 = r.a2
fn cte_query() -> Query {
    let builder = QueryBuilder::default();
    let (a, a_cols) = builder.get("a");
    let (plan, _) = builder.project(select(a, col(a_cols[0]).binary(BinaryOp::Gt, int(0))), vec![col(a_cols[0]), col(a_cols[1])]);
    let cte = builder.cte(plan);
    let (left, left_cols) = builder.cte_consumer(cte);
    let (right, right_cols) = builder.cte_consumer(cte);
    let condition = col(left_cols[0]).equals(col(right_cols[1]));
    let (root, _) = builder.project(join(JoinType::Inner, left, right, condition), vec![col(left_cols[0]), col(right_cols[1])]);
    builder.build(root)
}

#[test]
fn test_common_table_expressions() {
    // t = {(1, 2), (2, 3)}
    let expected = ints(&[&[Some(2), Some(2)]]);

    let inlined = optimize(cte_query(), OptimizerOptions::default()).unwrap();
    assert_eq!(count_ops(&inlined.plan, "CteScan"), 0, "plan:\n{}", inlined.plan);
    assert!(inlined.ctes.is_empty());
    assert_eq!(execute_sorted(&inlined, &TestData::default()).unwrap(), expected);

    let shared = optimize(cte_query(), OptimizerOptions::default().with_cte_plan(true)).unwrap();
    assert_eq!(count_ops(&shared.plan, "CteScan"), 2, "plan:\n{}", shared.plan);
    assert_eq!(shared.ctes.len(), 1);
    assert_eq!(execute_sorted(&shared, &TestData::default()).unwrap(), expected);
}

#[test]
fn test_distributed_plan_is_gathered() {
    let result = optimize(join_query(), OptimizerOptions::default().with_workers(4)).unwrap();

    assert!(matches!(result.plan.op(), PhysicalOp::Gather), "plan:\n{}", result.plan);
    assert_eq!(count_ops(&result.plan, "Gather"), 1, "plan:\n{}", result.plan);

    let local = optimize(join_query(), OptimizerOptions::default()).unwrap();
    assert_eq!(count_ops(&local.plan, "Gather"), 0, "plan:\n{}", local.plan);
    assert_eq!(count_ops(&local.plan, "Redistribute"), 0, "plan:\n{}", local.plan);
    assert_eq!(count_ops(&local.plan, "Broadcast"), 0, "plan:\n{}", local.plan);
}

#[test]
fn test_ordering_is_enforced_once() {
    // SELECT * FROM a ORDER BY a2 LIMIT 2
    let builder = QueryBuilder::default();
    let (a, a_cols) = builder.get("a");
    let ordering = OrderingChoice::from_columns(vec![a_cols[1]]);
    let query = builder.build_ordered(limit(a, 2, Some(ordering.clone())), Some(ordering));

    let result = optimize(query, OptimizerOptions::default()).unwrap();
    assert_eq!(count_ops(&result.plan, "Sort"), 1, "plan:\n{}", result.plan);

    let rows = execute(&result, &TestData::default()).unwrap();
    let expected: Vec<Row> = vec![
        [0, 1, 2, 3].iter().map(|v| ScalarValue::Int32(*v)).collect(),
        [1, 2, 3, 4].iter().map(|v| ScalarValue::Int32(*v)).collect(),
    ];
    assert_eq!(rows, expected);
}

#[test]
fn test_unordered_query_has_no_enforcers() {
    let options = OptimizerOptions::default().with_merge_join(false);
    let result = optimize(four_way_join_query(), options).unwrap();

    for enforcer in ["Sort", "Gather", "Redistribute", "Broadcast"] {
        assert_eq!(count_ops(&result.plan, enforcer), 0, "plan:\n{}", result.plan);
    }
}

#[test]
fn test_memo_snapshot() {
    let result = optimize(four_way_join_query(), OptimizerOptions::default()).unwrap();
    assert!(result.memo.is_none());

    let result = optimize(four_way_join_query(), OptimizerOptions::default().with_retain_memo(true)).unwrap();
    let memo = result.memo.expect("memo snapshot");

    // 4 relations + 3 pairs + 2 triples + the join of all relations + the projection
    assert_eq!(memo.num_groups(), 11, "memo:\n{}", memo);
    assert!(memo.num_physical_exprs() > memo.num_exprs());
    let root = memo.groups().last().unwrap();
    assert!(root.exprs[0].starts_with("LogicalProjection"), "memo:\n{}", memo);
    assert_eq!(root.winners.len(), 1);
    assert!((root.winners[0].cost - result.plan.cost().into_inner()).abs() < 1e-9);
}

#[test]
fn test_timeout() {
    let options = OptimizerOptions::default().with_timeout(Duration::ZERO);
    let result = optimize(four_way_join_query(), options);

    assert!(matches!(result, Err(OptimizerError::Timeout(_))), "{:?}", result.map(|r| r.plan));
}

#[test]
fn test_optimizer_is_reusable() {
    init_logger();
    let optimizer = Optimizer::new(test_catalog(), OptimizerOptions::default());

    let first = optimizer.optimize(join_query()).unwrap();
    let second = optimizer.optimize(join_query()).unwrap();
    assert_eq!(first.plan.format_ops(), second.plan.format_ops());
}
