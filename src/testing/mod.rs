//! Test fixtures: a catalog with a small set of tables, a builder of logical queries
//! and a reference executor of physical plans.

use std::cell::RefCell;
use std::sync::{Arc, Once};

use itertools::Itertools;

use crate::catalog::mutable::MutableCatalog;
use crate::catalog::{Catalog, CatalogRef, IndexBuilder, TableBuilder, TableDistribution};
use crate::datatypes::DataType;
use crate::meta::{ColumnId, ColumnMetadata, MutableMetadata};
use crate::operators::join::JoinType;
use crate::operators::logical::{
    LogicalAggregate, LogicalCteConsumer, LogicalExpr, LogicalGet, LogicalJoin, LogicalLimit, LogicalProjection,
    LogicalSelect, LogicalSetOp, LogicalWindow, SetOperator,
};
use crate::operators::scalar::expr::AggregateFunction;
use crate::operators::scalar::value::ScalarValue;
use crate::operators::scalar::ScalarExpr;
use crate::operators::{CommonTableExpr, CteId, Query, RelNode, SubQuery, SubQueryId};
use crate::properties::OrderingChoice;
use crate::statistics::ColumnStatistics;

pub mod exec;

static INIT_LOG: Once = Once::new();

/// Initializes the logger. Can be called multiple times.
pub fn init_logger() {
    INIT_LOG.call_once(pretty_env_logger::init);
}

/// Creates a catalog with the tables used by tests:
/// * `a(a1, a2, a3, a4)` hash distributed by `a1`, with the index `a_a1_idx` on `a1`.
/// * `b(b1, b2, b3, b4)` hash distributed by `b1`.
/// * `c(c1, c2, c3)` round robin.
/// * `d(d1, d2, d3)` replicated.
pub fn test_catalog() -> CatalogRef {
    let catalog = MutableCatalog::new();

    let a = TableBuilder::new("a")
        .add_column("a1", DataType::Int32)
        .add_column("a2", DataType::Int32)
        .add_column("a3", DataType::Int32)
        .add_column("a4", DataType::Int32)
        .add_row_count(1000)
        .add_column_statistics("a1", ColumnStatistics::new(Some(1000.0), 0.0, None))
        .distribution(TableDistribution::Hash(vec!["a1".into()]), 4)
        .build()
        .expect("table a");
    let a = catalog.add_table(a).expect("add table a");
    let index = IndexBuilder::new(a, "a_a1_idx").add_column("a1").build().expect("index a_a1_idx");
    catalog.add_index(index).expect("add index a_a1_idx");

    let b = TableBuilder::new("b")
        .add_column("b1", DataType::Int32)
        .add_column("b2", DataType::Int32)
        .add_column("b3", DataType::Int32)
        .add_column("b4", DataType::Int32)
        .add_row_count(500)
        .distribution(TableDistribution::Hash(vec!["b1".into()]), 4)
        .build()
        .expect("table b");
    catalog.add_table(b).expect("add table b");

    let c = TableBuilder::new("c")
        .add_column("c1", DataType::Int32)
        .add_column("c2", DataType::Int32)
        .add_column("c3", DataType::Int32)
        .add_row_count(100)
        .distribution(TableDistribution::RoundRobin, 4)
        .build()
        .expect("table c");
    catalog.add_table(c).expect("add table c");

    let d = TableBuilder::new("d")
        .add_column("d1", DataType::Int32)
        .add_column("d2", DataType::Int32)
        .add_column("d3", DataType::Int32)
        .add_row_count(10)
        .distribution(TableDistribution::Replicated, 4)
        .build()
        .expect("table d");
    catalog.add_table(d).expect("add table d");

    Arc::new(catalog)
}

/// Builds logical queries. Every reference to a table introduces new columns
/// so the same table can be used several times within a query.
#[derive(Debug)]
pub struct QueryBuilder {
    catalog: CatalogRef,
    metadata: MutableMetadata,
    subqueries: RefCell<Vec<SubQuery>>,
    ctes: RefCell<Vec<CommonTableExpr>>,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        QueryBuilder::new(test_catalog())
    }
}

impl QueryBuilder {
    pub fn new(catalog: CatalogRef) -> Self {
        init_logger();
        QueryBuilder {
            catalog,
            metadata: MutableMetadata::new(),
            subqueries: RefCell::new(Vec::new()),
            ctes: RefCell::new(Vec::new()),
        }
    }

    pub fn catalog(&self) -> CatalogRef {
        self.catalog.clone()
    }

    pub fn metadata(&self) -> &MutableMetadata {
        &self.metadata
    }

    /// Reads all columns of the given table.
    pub fn get(&self, table: &str) -> (LogicalExpr, Vec<ColumnId>) {
        let table_ref = self.catalog.get_table(table).unwrap_or_else(|| panic!("Unknown table: {}", table));
        let columns: Vec<_> = table_ref
            .columns()
            .iter()
            .map(|c| self.metadata.add_column(ColumnMetadata::new_table_column(c.name(), c.data_type(), table)))
            .collect();
        let expr = LogicalExpr::Get(LogicalGet {
            source: table.into(),
            columns: columns.clone(),
        });
        (expr, columns)
    }

    /// Computes the given expressions. Every expression gets a new column.
    pub fn project(&self, input: LogicalExpr, exprs: Vec<ScalarExpr>) -> (LogicalExpr, Vec<ColumnId>) {
        let columns: Vec<_> = exprs.iter().map(|e| self.synthetic_column(e)).collect();
        let expr = LogicalExpr::Projection(LogicalProjection {
            input: input.into(),
            exprs,
            columns: columns.clone(),
        });
        (expr, columns)
    }

    /// Groups rows by the given columns. Returns the aggregate and the columns of its aggregate expressions.
    pub fn aggregate(
        &self,
        input: LogicalExpr,
        group_exprs: Vec<ColumnId>,
        aggr_exprs: Vec<ScalarExpr>,
    ) -> (LogicalExpr, Vec<ColumnId>) {
        let aggr_columns: Vec<_> = aggr_exprs.iter().map(|e| self.synthetic_column(e)).collect();
        let expr = LogicalExpr::Aggregate(LogicalAggregate {
            input: input.into(),
            group_exprs,
            aggr_exprs,
            aggr_columns: aggr_columns.clone(),
        });
        (expr, aggr_columns)
    }

    /// Computes the given window functions. Returns the window and the columns of its window functions.
    pub fn window(
        &self,
        input: LogicalExpr,
        partition_by: Vec<ColumnId>,
        ordering: Option<OrderingChoice>,
        window_exprs: Vec<ScalarExpr>,
    ) -> (LogicalExpr, Vec<ColumnId>) {
        let window_columns: Vec<_> = window_exprs.iter().map(|e| self.synthetic_column(e)).collect();
        let expr = LogicalExpr::Window(LogicalWindow {
            input: input.into(),
            partition_by,
            ordering,
            window_exprs,
            window_columns: window_columns.clone(),
        });
        (expr, window_columns)
    }

    pub fn set_op(
        &self,
        op: SetOperator,
        all: bool,
        left: LogicalExpr,
        right: LogicalExpr,
        left_columns: Vec<ColumnId>,
        right_columns: Vec<ColumnId>,
    ) -> (LogicalExpr, Vec<ColumnId>) {
        let columns: Vec<_> = left_columns
            .iter()
            .map(|c| {
                let column = self.metadata.get_column(c);
                let name = format!("{}_{}", op.to_string().to_lowercase(), column.name());
                self.metadata.add_column(ColumnMetadata::new_synthetic_column(&name, column.data_type(), None))
            })
            .collect();
        let expr = LogicalExpr::SetOp(LogicalSetOp {
            op,
            all,
            left: left.into(),
            right: right.into(),
            left_columns,
            right_columns,
            columns: columns.clone(),
        });
        (expr, columns)
    }

    /// Registers a subquery. Subqueries nested in the given plan must be registered first.
    pub fn subquery(&self, plan: LogicalExpr) -> SubQueryId {
        let mut subqueries = self.subqueries.borrow_mut();
        let id = SubQueryId(subqueries.len() + 1);
        let subquery = SubQuery::new(id, plan, &subqueries);
        subqueries.push(subquery);
        id
    }

    /// `[NOT] EXISTS (plan)`.
    pub fn exists(&self, plan: LogicalExpr, not: bool) -> ScalarExpr {
        ScalarExpr::Exists {
            not,
            query: self.subquery(plan),
        }
    }

    /// `expr [NOT] IN (plan)`.
    pub fn in_subquery(&self, expr: ScalarExpr, plan: LogicalExpr, not: bool) -> ScalarExpr {
        ScalarExpr::InSubQuery {
            expr: Box::new(expr),
            not,
            query: self.subquery(plan),
        }
    }

    /// `(plan)` used as a scalar value.
    pub fn scalar_subquery(&self, plan: LogicalExpr) -> ScalarExpr {
        ScalarExpr::SubQuery(self.subquery(plan))
    }

    /// Registers a common table expression.
    pub fn cte(&self, plan: LogicalExpr) -> CteId {
        let mut ctes = self.ctes.borrow_mut();
        let id = CteId(ctes.len() + 1);
        ctes.push(CommonTableExpr { id, plan });
        id
    }

    /// Reads the result of a common table expression. Every consumer gets new columns.
    pub fn cte_consumer(&self, cte: CteId) -> (LogicalExpr, Vec<ColumnId>) {
        let plan_columns = {
            let ctes = self.ctes.borrow();
            let cte = ctes.iter().find(|c| c.id == cte).unwrap_or_else(|| panic!("Unknown cte: {}", cte));
            cte.plan.tree_output_columns().expect("cte output columns")
        };
        let columns: Vec<_> = plan_columns
            .iter()
            .map(|c| {
                let column = self.metadata.get_column(c);
                self.metadata.add_column(ColumnMetadata::new_synthetic_column(column.name(), column.data_type(), None))
            })
            .collect();
        let expr = LogicalExpr::CteConsumer(LogicalCteConsumer {
            cte,
            columns: columns.clone(),
        });
        (expr, columns)
    }

    /// Creates a query with the given root.
    pub fn build(self, root: LogicalExpr) -> Query {
        self.build_ordered(root, None)
    }

    /// Creates a query whose result must be sorted by the given ordering.
    pub fn build_ordered(self, root: LogicalExpr, ordering: Option<OrderingChoice>) -> Query {
        Query {
            root,
            subqueries: self.subqueries.into_inner(),
            ctes: self.ctes.into_inner(),
            ordering,
            metadata: self.metadata,
        }
    }

    fn synthetic_column(&self, expr: &ScalarExpr) -> ColumnId {
        let (name, data_type) = match expr {
            ScalarExpr::Column(id) => {
                let column = self.metadata.get_column(id);
                (column.name().to_string(), column.data_type())
            }
            _ => {
                let data_type = expr.data_type(&|id| self.metadata.get_column(id).data_type());
                ("?column?".to_string(), data_type)
            }
        };
        self.metadata.add_column(ColumnMetadata::new_synthetic_column(&name, data_type, Some(expr.clone())))
    }
}

pub fn col(id: ColumnId) -> ScalarExpr {
    ScalarExpr::Column(id)
}

pub fn int(value: i32) -> ScalarExpr {
    ScalarExpr::Scalar(ScalarValue::Int32(value))
}

pub fn null() -> ScalarExpr {
    ScalarExpr::Scalar(ScalarValue::Null)
}

pub fn count(expr: ScalarExpr) -> ScalarExpr {
    ScalarExpr::Aggregate {
        func: AggregateFunction::Count,
        args: vec![expr],
        distinct: false,
    }
}

pub fn aggr(func: AggregateFunction, expr: ScalarExpr) -> ScalarExpr {
    ScalarExpr::Aggregate {
        func,
        args: vec![expr],
        distinct: false,
    }
}

pub fn join(join_type: JoinType, left: LogicalExpr, right: LogicalExpr, condition: ScalarExpr) -> LogicalExpr {
    LogicalExpr::Join(LogicalJoin {
        join_type,
        left: left.into(),
        right: right.into(),
        condition,
    })
}

pub fn select(input: LogicalExpr, filter: ScalarExpr) -> LogicalExpr {
    LogicalExpr::Select(LogicalSelect {
        input: input.into(),
        filter,
    })
}

pub fn limit(input: LogicalExpr, rows: usize, ordering: Option<OrderingChoice>) -> LogicalExpr {
    LogicalExpr::Limit(LogicalLimit {
        input: input.into(),
        rows,
        ordering,
    })
}

/// Formats a logical tree one operator per line. Inputs are indented by two spaces.
pub fn format_logical_tree(expr: &LogicalExpr) -> String {
    fn write(expr: &LogicalExpr, depth: usize, buf: &mut String) {
        let line = match expr {
            LogicalExpr::Get(e) => format!("Get {} cols=[{}]", e.source, e.columns.iter().join(", ")),
            LogicalExpr::Select(e) => format!("Select filter={}", e.filter),
            LogicalExpr::Projection(e) => {
                format!("Projection cols=[{}] exprs=[{}]", e.columns.iter().join(", "), e.exprs.iter().join(", "))
            }
            LogicalExpr::Join(e) if e.condition.is_true() => format!("Join type={}", e.join_type),
            LogicalExpr::Join(e) => format!("Join type={} on={}", e.join_type, e.condition),
            LogicalExpr::Aggregate(e) => format!(
                "Aggregate group=[{}] aggrs=[{}] cols=[{}]",
                e.group_exprs.iter().join(", "),
                e.aggr_exprs.iter().join(", "),
                e.aggr_columns.iter().join(", ")
            ),
            LogicalExpr::SetOp(e) => {
                format!("SetOp {}{} cols=[{}]", e.op, if e.all { " all" } else { "" }, e.columns.iter().join(", "))
            }
            LogicalExpr::Limit(e) => format!("Limit rows={}", e.rows),
            LogicalExpr::Window(e) => format!(
                "Window partition=[{}] exprs=[{}] cols=[{}]",
                e.partition_by.iter().join(", "),
                e.window_exprs.iter().join(", "),
                e.window_columns.iter().join(", ")
            ),
            LogicalExpr::CteConsumer(e) => format!("CteConsumer {} cols=[{}]", e.cte, e.columns.iter().join(", ")),
        };
        buf.push_str(&"  ".repeat(depth));
        buf.push_str(&line);
        buf.push('\n');
        for input in expr.inputs() {
            match input {
                RelNode::Expr(input) => write(input, depth + 1, buf),
                RelNode::Group(group) => {
                    buf.push_str(&"  ".repeat(depth + 1));
                    buf.push_str(&format!("{}\n", group));
                }
            }
        }
    }

    let mut buf = String::new();
    write(expr, 0, &mut buf);
    buf
}
