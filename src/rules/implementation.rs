//! Implementation rules. See [rules module](super).
//!
//! An implementation rule produces physical alternatives of a logical expression. Every alternative
//! specifies the physical properties the operator requires from each of its inputs.

use crate::error::OptimizerError;
use crate::meta::ColumnId;
use crate::operators::join::{extract_join_keys, JoinKeys, JoinType};
use crate::operators::logical::{
    LogicalAggregate, LogicalCteConsumer, LogicalExpr, LogicalGet, LogicalJoin, LogicalLimit, LogicalProjection,
    LogicalSelect, LogicalSetOp, LogicalWindow,
};
use crate::operators::physical::PhysicalOp;
use crate::operators::scalar::ScalarExpr;
use crate::properties::{Distribution, OrderingChoice, OrderingColumn, RequiredProperties};
use crate::rules::{PhysicalAlternative, Rule, RuleContext, RuleResult, RuleType};

#[derive(Debug)]
pub struct ScanRule;

impl Rule for ScanRule {
    fn name(&self) -> &'static str {
        "ScanRule"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn matches(&self, _ctx: &RuleContext, expr: &LogicalExpr) -> bool {
        matches!(expr, LogicalExpr::Get(_))
    }

    fn apply(&self, _ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError> {
        match expr {
            LogicalExpr::Get(LogicalGet { source, columns }) => {
                let op = PhysicalOp::Scan {
                    source: source.clone(),
                    columns: columns.clone(),
                };
                Ok(vec![implementation(op, vec![])])
            }
            _ => Ok(vec![]),
        }
    }
}

/// Reads a table using one of its indexes. An index can be used when every column of that index
/// is retrieved from the table.
#[derive(Debug)]
pub struct IndexScanRule;

impl IndexScanRule {
    fn index_ordering(ctx: &RuleContext, index_columns: Vec<(&str, bool)>, columns: &[ColumnId]) -> Option<OrderingChoice> {
        let metadata = ctx.metadata();
        let ordering: Option<Vec<_>> = index_columns
            .into_iter()
            .map(|(name, descending)| {
                columns
                    .iter()
                    .find(|id| metadata.try_get_column(id).map(|c| c.name() == name).unwrap_or_default())
                    .map(|id| OrderingColumn::ord(*id, descending))
            })
            .collect();
        ordering.filter(|o| !o.is_empty()).map(OrderingChoice::new)
    }
}

impl Rule for IndexScanRule {
    fn name(&self) -> &'static str {
        "IndexScanRule"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn matches(&self, ctx: &RuleContext, expr: &LogicalExpr) -> bool {
        ctx.options().enable_index_scan && matches!(expr, LogicalExpr::Get(_))
    }

    fn apply(&self, ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError> {
        let (source, columns) = match expr {
            LogicalExpr::Get(LogicalGet { source, columns }) => (source, columns),
            _ => return Ok(vec![]),
        };
        let mut result = Vec::new();
        for index in ctx.catalog().get_indexes(source) {
            let index_columns: Vec<_> = index.ordering().map(|(c, descending)| (c.name(), descending)).collect();
            if let Some(ordering) = Self::index_ordering(ctx, index_columns, columns) {
                let op = PhysicalOp::IndexScan {
                    source: source.clone(),
                    index: index.name().into(),
                    columns: columns.clone(),
                    ordering,
                };
                result.push(implementation(op, vec![]));
            }
        }
        Ok(result)
    }
}

#[derive(Debug)]
pub struct FilterRule;

impl Rule for FilterRule {
    fn name(&self) -> &'static str {
        "FilterRule"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn matches(&self, _ctx: &RuleContext, expr: &LogicalExpr) -> bool {
        matches!(expr, LogicalExpr::Select(_))
    }

    fn apply(&self, ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError> {
        match expr {
            LogicalExpr::Select(LogicalSelect { filter, .. }) => {
                let op = PhysicalOp::Filter { filter: filter.clone() };
                // A filter neither reorders nor moves rows.
                let required = ctx.required_properties().clone();
                Ok(pass_through_alternatives(op, Some(required)))
            }
            _ => Ok(vec![]),
        }
    }
}

#[derive(Debug)]
pub struct ProjectionRule;

impl ProjectionRule {
    /// Returns pairs of (projection column, input column) for the columns that are copied from the input as is.
    fn column_mapping(exprs: &[ScalarExpr], columns: &[ColumnId]) -> (Vec<ColumnId>, Vec<ColumnId>) {
        exprs
            .iter()
            .zip(columns.iter())
            .filter_map(|(expr, col)| match expr {
                ScalarExpr::Column(input) => Some((*col, *input)),
                _ => None,
            })
            .unzip()
    }
}

impl Rule for ProjectionRule {
    fn name(&self) -> &'static str {
        "ProjectionRule"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn matches(&self, _ctx: &RuleContext, expr: &LogicalExpr) -> bool {
        matches!(expr, LogicalExpr::Projection(_))
    }

    fn apply(&self, ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError> {
        let (exprs, columns) = match expr {
            LogicalExpr::Projection(LogicalProjection { exprs, columns, .. }) => (exprs, columns),
            _ => return Ok(vec![]),
        };
        let op = PhysicalOp::Projection {
            exprs: exprs.clone(),
            columns: columns.clone(),
        };

        let (output, input) = Self::column_mapping(exprs, columns);
        let required = ctx.required_properties();
        let ordering = match required.ordering() {
            Some(ordering) => ordering.with_mapping(&output, &input).map(Some),
            None => Some(None),
        };
        let distribution = match required.distribution() {
            Some(hash @ Distribution::Hash(_)) => match hash.with_mapping(&output, &input) {
                Distribution::Any => None,
                mapped => Some(Some(mapped)),
            },
            other => Some(other.cloned()),
        };
        let pass_through = match (ordering, distribution) {
            (Some(ordering), Some(distribution)) => Some(RequiredProperties::new(ordering, distribution)),
            _ => None,
        };

        Ok(pass_through_alternatives(op, pass_through))
    }
}

/// Builds a hash table from the right input and probes it with rows of the left input.
#[derive(Debug)]
pub struct HashJoinRule;

impl Rule for HashJoinRule {
    fn name(&self) -> &'static str {
        "HashJoinRule"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn matches(&self, ctx: &RuleContext, expr: &LogicalExpr) -> bool {
        ctx.options().enable_hash_join && matches!(expr, LogicalExpr::Join(_))
    }

    fn apply(&self, ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError> {
        let join = match expr {
            LogicalExpr::Join(join) => join,
            _ => return Ok(vec![]),
        };
        let keys = JoinKeysPair::new(ctx, join)?;
        if keys.all.is_empty() {
            return Ok(vec![]);
        }
        let op = PhysicalOp::HashJoin {
            join_type: join.join_type.clone(),
            left_keys: keys.all.left.clone(),
            right_keys: keys.all.right.clone(),
            condition: join.condition.clone(),
        };
        let alternatives = join_alternatives(ctx, &join.join_type, &keys.distribution, None, None);
        Ok(alternatives.into_iter().map(|inputs| implementation(op.clone(), inputs)).collect())
    }
}

/// Joins inputs sorted in ascending order of their join keys.
#[derive(Debug)]
pub struct MergeJoinRule;

impl Rule for MergeJoinRule {
    fn name(&self) -> &'static str {
        "MergeJoinRule"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn matches(&self, ctx: &RuleContext, expr: &LogicalExpr) -> bool {
        ctx.options().enable_merge_join && matches!(expr, LogicalExpr::Join(_))
    }

    fn apply(&self, ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError> {
        let join = match expr {
            LogicalExpr::Join(join) => join,
            _ => return Ok(vec![]),
        };
        let keys = JoinKeysPair::new(ctx, join)?;
        if keys.all.is_empty() {
            return Ok(vec![]);
        }
        let op = PhysicalOp::MergeJoin {
            join_type: join.join_type.clone(),
            left_keys: keys.all.left.clone(),
            right_keys: keys.all.right.clone(),
            condition: join.condition.clone(),
        };
        let left_ordering = OrderingChoice::from_columns(keys.all.left.clone());
        let right_ordering = OrderingChoice::from_columns(keys.all.right.clone());
        let alternatives =
            join_alternatives(ctx, &join.join_type, &keys.distribution, Some(left_ordering), Some(right_ordering));
        Ok(alternatives.into_iter().map(|inputs| implementation(op.clone(), inputs)).collect())
    }
}

/// Nested loop joins are used for joins without equality keys even when they are disabled.
#[derive(Debug)]
pub struct NestedLoopJoinRule;

impl Rule for NestedLoopJoinRule {
    fn name(&self) -> &'static str {
        "NestedLoopJoinRule"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn matches(&self, _ctx: &RuleContext, expr: &LogicalExpr) -> bool {
        matches!(expr, LogicalExpr::Join(_))
    }

    fn apply(&self, ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError> {
        let join = match expr {
            LogicalExpr::Join(join) => join,
            _ => return Ok(vec![]),
        };
        let keys = JoinKeysPair::new(ctx, join)?;
        if !ctx.options().enable_nested_loop_join && !keys.all.is_empty() {
            return Ok(vec![]);
        }
        let op = PhysicalOp::NestedLoopJoin {
            join_type: join.join_type.clone(),
            condition: join.condition.clone(),
        };

        let mut result = Vec::new();
        // Rows of the left input are processed in order, so the ordering of the left input is preserved.
        if let Some(ordering) = ctx.required_properties().ordering() {
            let left_columns = ctx.input_columns(&join.left)?;
            let left_ordered = ordering.columns().iter().all(|c| left_columns.contains(&c.column()));
            if left_ordered && preserves_left_ordering(&join.join_type) {
                let alternatives =
                    join_alternatives(ctx, &join.join_type, &keys.distribution, Some(ordering.clone()), None);
                result.extend(alternatives.into_iter().map(|inputs| implementation(op.clone(), inputs)));
            }
        }
        let alternatives = join_alternatives(ctx, &join.join_type, &keys.distribution, None, None);
        result.extend(alternatives.into_iter().map(|inputs| implementation(op.clone(), inputs)));

        Ok(result)
    }
}

#[derive(Debug)]
pub struct HashAggregateRule;

impl Rule for HashAggregateRule {
    fn name(&self) -> &'static str {
        "HashAggregateRule"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn matches(&self, _ctx: &RuleContext, expr: &LogicalExpr) -> bool {
        matches!(expr, LogicalExpr::Aggregate(_))
    }

    fn apply(&self, ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError> {
        match expr {
            LogicalExpr::Aggregate(LogicalAggregate {
                group_exprs,
                aggr_exprs,
                aggr_columns,
                ..
            }) => {
                let op = PhysicalOp::HashAggregate {
                    group_exprs: group_exprs.clone(),
                    aggr_exprs: aggr_exprs.clone(),
                    aggr_columns: aggr_columns.clone(),
                };
                let alternatives = aggregate_alternatives(ctx, group_exprs, None);
                Ok(alternatives.into_iter().map(|inputs| implementation(op.clone(), inputs)).collect())
            }
            _ => Ok(vec![]),
        }
    }
}

/// Aggregates rows sorted by grouping keys. Aggregates without grouping keys are always implemented by hash aggregates.
#[derive(Debug)]
pub struct StreamingAggregateRule;

impl StreamingAggregateRule {
    /// Orders input rows by grouping keys. When the required ordering consists only of grouping keys
    /// it becomes the prefix of the input ordering, so the output of the aggregate is ordered as required.
    fn input_ordering(required: Option<&OrderingChoice>, group_exprs: &[ColumnId]) -> OrderingChoice {
        let mut columns: Vec<OrderingColumn> = match required {
            Some(ordering) if ordering.columns().iter().all(|c| group_exprs.contains(&c.column())) => {
                ordering.columns().to_vec()
            }
            _ => Vec::new(),
        };
        for col in group_exprs {
            if !columns.iter().any(|c| c.column() == *col) {
                columns.push(OrderingColumn::asc(*col));
            }
        }
        OrderingChoice::new(columns)
    }
}

impl Rule for StreamingAggregateRule {
    fn name(&self) -> &'static str {
        "StreamingAggregateRule"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn matches(&self, ctx: &RuleContext, expr: &LogicalExpr) -> bool {
        match expr {
            LogicalExpr::Aggregate(aggr) => ctx.options().enable_streaming_aggregate && !aggr.group_exprs.is_empty(),
            _ => false,
        }
    }

    fn apply(&self, ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError> {
        match expr {
            LogicalExpr::Aggregate(LogicalAggregate {
                group_exprs,
                aggr_exprs,
                aggr_columns,
                ..
            }) if !group_exprs.is_empty() => {
                let op = PhysicalOp::StreamingAggregate {
                    group_exprs: group_exprs.clone(),
                    aggr_exprs: aggr_exprs.clone(),
                    aggr_columns: aggr_columns.clone(),
                };
                let ordering = Self::input_ordering(ctx.required_properties().ordering(), group_exprs);
                let alternatives = aggregate_alternatives(ctx, group_exprs, Some(ordering));
                Ok(alternatives.into_iter().map(|inputs| implementation(op.clone(), inputs)).collect())
            }
            _ => Ok(vec![]),
        }
    }
}

#[derive(Debug)]
pub struct HashSetOpRule;

impl Rule for HashSetOpRule {
    fn name(&self) -> &'static str {
        "HashSetOpRule"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn matches(&self, _ctx: &RuleContext, expr: &LogicalExpr) -> bool {
        matches!(expr, LogicalExpr::SetOp(_))
    }

    fn apply(&self, ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError> {
        let set_op = match expr {
            LogicalExpr::SetOp(set_op) => set_op,
            _ => return Ok(vec![]),
        };
        let LogicalSetOp {
            op,
            all,
            left_columns,
            right_columns,
            columns,
            ..
        } = set_op;
        let physical_op = PhysicalOp::HashSetOp {
            op: *op,
            all: *all,
            left_columns: left_columns.clone(),
            right_columns: right_columns.clone(),
            columns: columns.clone(),
        };

        let alternatives = if ctx.options().is_distributed() {
            let singleton = RequiredProperties::new_with_distribution(Distribution::Singleton);
            vec![
                vec![singleton.clone(), singleton],
                vec![
                    RequiredProperties::new_with_distribution(Distribution::Hash(left_columns.clone())),
                    RequiredProperties::new_with_distribution(Distribution::Hash(right_columns.clone())),
                ],
            ]
        } else {
            vec![vec![RequiredProperties::none(), RequiredProperties::none()]]
        };
        Ok(alternatives.into_iter().map(|inputs| implementation(physical_op.clone(), inputs)).collect())
    }
}

/// A limit takes the first rows of its input, so the input must be sorted and located at a single node.
#[derive(Debug)]
pub struct LimitRule;

impl Rule for LimitRule {
    fn name(&self) -> &'static str {
        "LimitRule"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn matches(&self, _ctx: &RuleContext, expr: &LogicalExpr) -> bool {
        matches!(expr, LogicalExpr::Limit(_))
    }

    fn apply(&self, ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError> {
        match expr {
            LogicalExpr::Limit(LogicalLimit { rows, ordering, .. }) => {
                let op = PhysicalOp::Limit { rows: *rows };
                let distribution = if ctx.options().is_distributed() {
                    Some(Distribution::Singleton)
                } else {
                    None
                };
                let required = RequiredProperties::new(ordering.clone(), distribution);
                Ok(vec![implementation(op, vec![required])])
            }
            _ => Ok(vec![]),
        }
    }
}

/// Window functions are computed over rows sorted by partitioning columns, so every partition
/// is a contiguous run of rows located at a single node.
#[derive(Debug)]
pub struct WindowRule;

impl Rule for WindowRule {
    fn name(&self) -> &'static str {
        "WindowRule"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn matches(&self, _ctx: &RuleContext, expr: &LogicalExpr) -> bool {
        matches!(expr, LogicalExpr::Window(_))
    }

    fn apply(&self, ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError> {
        match expr {
            LogicalExpr::Window(window) => {
                let LogicalWindow {
                    partition_by,
                    ordering,
                    window_exprs,
                    window_columns,
                    ..
                } = window;
                let op = PhysicalOp::Window {
                    partition_by: partition_by.clone(),
                    ordering: ordering.clone(),
                    window_exprs: window_exprs.clone(),
                    window_columns: window_columns.clone(),
                };
                let alternatives = aggregate_alternatives(ctx, partition_by, window.input_ordering());
                Ok(alternatives.into_iter().map(|inputs| implementation(op.clone(), inputs)).collect())
            }
            _ => Ok(vec![]),
        }
    }
}

#[derive(Debug)]
pub struct CteScanRule;

impl Rule for CteScanRule {
    fn name(&self) -> &'static str {
        "CteScanRule"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn matches(&self, _ctx: &RuleContext, expr: &LogicalExpr) -> bool {
        matches!(expr, LogicalExpr::CteConsumer(_))
    }

    fn apply(&self, _ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError> {
        match expr {
            LogicalExpr::CteConsumer(LogicalCteConsumer { cte, columns }) => {
                let op = PhysicalOp::CteScan {
                    cte: *cte,
                    columns: columns.clone(),
                };
                Ok(vec![implementation(op, vec![])])
            }
            _ => Ok(vec![]),
        }
    }
}

fn implementation(op: PhysicalOp, inputs: Vec<RequiredProperties>) -> RuleResult {
    RuleResult::Implementation(PhysicalAlternative::new(op, inputs))
}

/// Alternatives of a single input operator that either passes the given requirements to its input
/// or requires nothing.
fn pass_through_alternatives(op: PhysicalOp, pass_through: Option<RequiredProperties>) -> Vec<RuleResult> {
    let mut result = Vec::new();
    match pass_through {
        Some(required) if required.has_any() => {
            result.push(implementation(op.clone(), vec![required]));
            result.push(implementation(op, vec![RequiredProperties::none()]));
        }
        _ => result.push(implementation(op, vec![RequiredProperties::none()])),
    }
    result
}

/// Returns `true` if a join of the given type returns rows in the order of its left input.
/// Right and full joins return unmatched rows of the right input after all rows of the left input.
pub(crate) fn preserves_left_ordering(join_type: &JoinType) -> bool {
    !matches!(join_type, JoinType::Right | JoinType::Full)
}

/// Equality keys of a join.
/// `all` are used to build and probe hash tables and to merge sorted inputs.
/// `distribution` are keys that can be used to co-partition inputs of a join.
struct JoinKeysPair {
    all: JoinKeys,
    distribution: JoinKeys,
}

impl JoinKeysPair {
    fn new(ctx: &RuleContext, join: &LogicalJoin) -> Result<Self, OptimizerError> {
        let left_columns = ctx.input_columns(&join.left)?;
        let right_columns = ctx.input_columns(&join.right)?;
        let all = extract_join_keys(&join.join_type, &join.condition, left_columns, right_columns);
        let distribution = match &join.join_type {
            // Candidates of mark and NULL-aware anti joins are selected by the join condition.
            // A comparison must see every candidate including the ones with NULLs so rows can only
            // be co-partitioned by the keys of the join condition.
            JoinType::Mark { .. } | JoinType::NullAwareAnti { .. } => {
                extract_join_keys(&JoinType::Inner, &join.condition, left_columns, right_columns)
            }
            _ => all.clone(),
        };
        Ok(JoinKeysPair { all, distribution })
    }
}

/// Builds required properties of the inputs of a join.
///
/// When the plan is distributed a join can be executed:
/// * when both inputs are partitioned by their join keys.
/// * when the right input is replicated to every worker (broadcast).
/// * when both inputs are located at a single node.
fn join_alternatives(
    ctx: &RuleContext,
    join_type: &JoinType,
    keys: &JoinKeys,
    left_ordering: Option<OrderingChoice>,
    right_ordering: Option<OrderingChoice>,
) -> Vec<Vec<RequiredProperties>> {
    let required = |ordering: &Option<OrderingChoice>, distribution: Option<Distribution>| {
        RequiredProperties::new(ordering.clone(), distribution)
    };

    if !ctx.options().is_distributed() {
        return vec![vec![required(&left_ordering, None), required(&right_ordering, None)]];
    }

    let mut alternatives = Vec::new();
    if !keys.is_empty() {
        alternatives.push(vec![
            required(&left_ordering, Some(Distribution::Hash(keys.left.clone()))),
            required(&right_ordering, Some(Distribution::Hash(keys.right.clone()))),
        ]);
    }
    if ctx.options().enable_broadcast && join_type.can_broadcast_right() {
        alternatives.push(vec![
            required(&left_ordering, None),
            required(&right_ordering, Some(Distribution::Replicated)),
        ]);
    }
    alternatives.push(vec![
        required(&left_ordering, Some(Distribution::Singleton)),
        required(&right_ordering, Some(Distribution::Singleton)),
    ]);
    alternatives
}

/// Builds required properties of the input of an aggregate.
/// In a distributed plan all rows of a group must be processed by the same worker.
fn aggregate_alternatives(
    ctx: &RuleContext,
    group_exprs: &[ColumnId],
    ordering: Option<OrderingChoice>,
) -> Vec<Vec<RequiredProperties>> {
    if !ctx.options().is_distributed() {
        return vec![vec![RequiredProperties::new(ordering, None)]];
    }
    let mut alternatives = Vec::new();
    if !group_exprs.is_empty() {
        let distribution = Distribution::Hash(group_exprs.to_vec());
        alternatives.push(vec![RequiredProperties::new(ordering.clone(), Some(distribution))]);
    }
    alternatives.push(vec![RequiredProperties::new(ordering, Some(Distribution::Singleton))]);
    alternatives
}
