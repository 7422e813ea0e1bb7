//! The cost-based optimizer.
//!
//! Optimization of a query runs in the following phases:
//! 1. Subqueries are unnested and common table expressions are inlined (see [rewrite](crate::rules::rewrite)).
//! 2. The logical plan is copied into a [memo](crate::memo::Memo). Join blocks are ordered by a
//!    [join enumerator](crate::joins::JoinEnumerator) unless join orders are explored by transformation rules.
//! 3. Transformation rules explore logically equivalent alternatives until no rule produces a new expression.
//! 4. Implementation rules produce physical alternatives of every expression. Alternatives are costed
//!    bottom-up, enforcers are added where an alternative does not deliver the required properties
//!    and the cheapest alternative becomes the winner of a group.
//! 5. The winners are copied out of the memo into a [PhysicalPlan].

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::catalog::CatalogRef;
use crate::cost::simple::SimpleCostEstimator;
use crate::cost::{Cost, CostEstimationContext, CostEstimator};
use crate::error::OptimizerError;
use crate::joins::{enumerator_for, EnumerationContext, JoinBlock, JoinGraph, JoinRelation, RelSet};
use crate::memo::{ExprId, GroupId, Memo, MemoSnapshot, PhysicalExpr, PhysicalExprId, PhysicalInput};
use crate::meta::{ColumnId, Metadata};
use crate::operators::logical::{LogicalExpr, LogicalJoin, LogicalSelect};
use crate::operators::scalar::expr::ExprVisitor;
use crate::operators::scalar::{combine_conjunction, contains_aggregates, expr_columns, ScalarExpr};
use crate::operators::{CommonTableExpr, CteId, Query, RelNode, SubQuery, SubQueryId};
use crate::options::{check_deadline, Deadline, JoinOrderStrategy, OptimizerOptions};
use crate::plan::{OptimizedQuery, PhysicalPlan, SubPlan};
use crate::properties::logical::{LogicalProperties, LogicalPropertiesBuilder};
use crate::properties::{Distribution, OrderingChoice, PropertySet, RequiredProperties};
use crate::rules::enforcers::{accepts_input_distributions, derive_properties, required_enforcers};
use crate::rules::rewrite::cte::inline_ctes;
use crate::rules::rewrite::subqueries::unnest_subqueries;
use crate::rules::{PhysicalAlternative, RuleContext, RuleResult, StaticRuleSet};
use crate::statistics::simple::SimpleStatisticsBuilder;
use crate::statistics::{CatalogStatisticsProvider, StatisticsProviderRef};

/// Cost-based optimizer.
///
/// An optimizer holds no state between calls to [optimize](Self::optimize): every query is optimized
/// using its own memo.
#[derive(Debug)]
pub struct Optimizer {
    catalog: CatalogRef,
    statistics: StatisticsProviderRef,
    cost_estimator: Arc<dyn CostEstimator + Send + Sync>,
    options: OptimizerOptions,
}

impl Optimizer {
    /// Creates an optimizer that reads statistics from the given catalog.
    pub fn new(catalog: CatalogRef, options: OptimizerOptions) -> Self {
        let statistics = Arc::new(CatalogStatisticsProvider::new(catalog.clone()));
        Optimizer {
            catalog,
            statistics,
            cost_estimator: Arc::new(SimpleCostEstimator::new()),
            options,
        }
    }

    /// Replaces the provider of table and column statistics.
    pub fn with_statistics(mut self, statistics: StatisticsProviderRef) -> Self {
        self.statistics = statistics;
        self
    }

    /// Replaces the cost model.
    pub fn with_cost_estimator<T>(mut self, cost_estimator: T) -> Self
    where
        T: CostEstimator + Send + Sync + 'static,
    {
        self.cost_estimator = Arc::new(cost_estimator);
        self
    }

    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }

    /// Optimizes the given query.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is malformed (for example a scalar subquery returns more than one column),
    /// if no physical plan can be built because every applicable algorithm is disabled, or
    /// if the optimization has not been completed within the configured time limit.
    pub fn optimize(&self, query: Query) -> Result<OptimizedQuery, OptimizerError> {
        let start_time = Instant::now();
        let deadline = Deadline::from_options(&self.options);

        log::debug!("Optimizing query. Options: {:?}", self.options);

        let output_columns = query.root.tree_output_columns()?;

        let query = if self.options.enable_subquery_unnesting {
            unnest_subqueries(query)?
        } else {
            query
        };
        let query = if self.options.enable_cte_plan {
            query
        } else {
            inline_ctes(query)?
        };
        validate_subqueries(&query)?;
        validate_window_functions(&query)?;

        let Query {
            root,
            subqueries,
            ctes,
            ordering,
            metadata,
        } = query;
        let metadata = metadata.build_metadata();

        let mut stats = Stats::default();
        let mut cte_plans = HashMap::new();
        for CommonTableExpr { id, plan } in ctes.iter() {
            let (physical_plan, _) =
                self.optimize_plan(plan, None, &metadata, &cte_plans, deadline, false, &mut stats)?;
            log::debug!("Plan of {}:\n{}", id, physical_plan);
            cte_plans.insert(
                *id,
                SubPlan {
                    plan: physical_plan,
                    output_columns: plan.tree_output_columns()?,
                },
            );
        }

        let (plan, memo) =
            self.optimize_plan(&root, ordering, &metadata, &cte_plans, deadline, self.options.retain_memo, &mut stats)?;

        let mut subplans = HashMap::new();
        for SubQuery { id, plan: subquery, .. } in subqueries.iter() {
            let (physical_plan, _) =
                self.optimize_plan(subquery, None, &metadata, &cte_plans, deadline, false, &mut stats)?;
            subplans.insert(
                *id,
                SubPlan {
                    plan: physical_plan,
                    output_columns: subquery.tree_output_columns()?,
                },
            );
        }

        stats.optimization_time = start_time.elapsed();
        log::debug!("Stats: {:?}", stats);
        log::debug!("Plan:\n{}", plan);

        Ok(OptimizedQuery {
            plan,
            output_columns,
            subplans,
            ctes: cte_plans,
            metadata,
            memo,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn optimize_plan(
        &self,
        expr: &LogicalExpr,
        ordering: Option<OrderingChoice>,
        metadata: &Metadata,
        ctes: &HashMap<CteId, SubPlan>,
        deadline: Option<Deadline>,
        retain_memo: bool,
        stats: &mut Stats,
    ) -> Result<(PhysicalPlan, Option<MemoSnapshot>), OptimizerError> {
        let statistics = ctes.iter().fold(SimpleStatisticsBuilder::new(self.statistics.clone()), |builder, (id, cte)| {
            builder.with_cte_row_count(*id, cte.plan.row_count())
        });
        let properties = LogicalPropertiesBuilder::new(Box::new(statistics), metadata.clone());
        let mut memo = Memo::new(properties);
        let rules = StaticRuleSet::from_options(&self.options);

        let mut search = Search {
            memo: &mut memo,
            rules: &rules,
            catalog: &self.catalog,
            options: &self.options,
            cost_estimator: self.cost_estimator.as_ref(),
            deadline,
            stats,
        };

        let root = search.copy_in(expr)?;
        log::debug!("Initial memo: {:?}", search.memo);

        if self.options.use_memo {
            search.explore(root)?;
        }

        let distribution = if self.options.is_distributed() {
            Some(Distribution::Singleton)
        } else {
            None
        };
        let required = RequiredProperties::new(ordering, distribution);
        let winner = match search.optimize_group(root, &required)? {
            Some(winner) => winner,
            None => {
                let message = format!("No physical plan satisfies {} for {}", required, expr);
                return Err(OptimizerError::unsupported(message));
            }
        };

        search.stats.groups += search.memo.num_groups();
        search.stats.logical_exprs += search.memo.num_exprs();
        search.stats.physical_exprs += search.memo.num_physical_exprs();

        let plan = select_plan(&memo, winner);
        let snapshot = if retain_memo { Some(memo.snapshot()) } else { None };

        Ok((plan, snapshot))
    }
}

/// Statistics of an optimization.
#[derive(Debug, Default)]
struct Stats {
    groups: usize,
    logical_exprs: usize,
    physical_exprs: usize,
    join_blocks: usize,
    join_block_fallbacks: usize,
    tasks: TaskStats,
    optimized_groups: usize,
    optimization_time: Duration,
}

#[derive(Debug, Default)]
struct TaskStats {
    explore_group: usize,
    explore_expr: usize,
    apply_rule: usize,
    max_stack_depth: usize,
}

/// A step of the exploration phase.
#[derive(Debug)]
enum Task {
    ExploreGroup { group: GroupId },
    ExploreExpr { expr: ExprId },
    ApplyRule { expr: ExprId, rule: &'static str },
}

impl Display for Task {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::ExploreGroup { group } => write!(f, "ExploreGroup: {}", group),
            Task::ExploreExpr { expr } => write!(f, "ExploreExpr: {}", expr),
            Task::ApplyRule { expr, rule } => write!(f, "ApplyRule: {} rule: {}", expr, rule),
        }
    }
}

struct Search<'a> {
    memo: &'a mut Memo,
    rules: &'a StaticRuleSet,
    catalog: &'a CatalogRef,
    options: &'a OptimizerOptions,
    cost_estimator: &'a dyn CostEstimator,
    deadline: Option<Deadline>,
    stats: &'a mut Stats,
}

impl Search<'_> {
    /// Copies the given expression into the memo. Join blocks are replaced with the join orders
    /// produced by a join enumerator.
    fn copy_in(&mut self, expr: &LogicalExpr) -> Result<GroupId, OptimizerError> {
        check_deadline(&self.deadline)?;

        let enumerate_joins = self.options.use_memo && self.options.join_order != JoinOrderStrategy::Transformations;
        if enumerate_joins {
            if let Some(block) = JoinBlock::extract(expr) {
                self.stats.join_blocks += 1;
                if let Some(group) = self.copy_in_join_block(block)? {
                    return Ok(group);
                }
                self.stats.join_block_fallbacks += 1;
            }
        }

        let mut inputs = Vec::with_capacity(expr.inputs().len());
        for input in expr.inputs() {
            let group = match input {
                RelNode::Expr(input) => self.copy_in(input)?,
                RelNode::Group(group) => *group,
            };
            inputs.push(RelNode::Group(group));
        }
        let (group, _) = self.memo.insert_group(expr.with_new_inputs(inputs))?;
        Ok(group)
    }

    /// Copies relations of the given join block into the memo and adds the join orders produced by
    /// a join enumerator. Returns `None` if the enumerator can not order the block.
    fn copy_in_join_block(&mut self, block: JoinBlock) -> Result<Option<GroupId>, OptimizerError> {
        let JoinBlock { relations, predicates } = block;

        let mut groups = Vec::with_capacity(relations.len());
        for relation in relations.iter() {
            groups.push(self.copy_in(relation)?);
        }

        let graph = self.build_graph(&groups)?;
        let mut local: Vec<Vec<ScalarExpr>> = vec![Vec::new(); groups.len()];
        let mut join_predicates = Vec::new();
        let mut top = Vec::new();
        for predicate in predicates {
            let referenced = graph.relations_of(&expr_columns(&predicate));
            match referenced.len() {
                0 => top.push(predicate),
                1 => {
                    let i = referenced.lowest().unwrap_or_default();
                    local[i].push(predicate);
                }
                _ => join_predicates.push(predicate),
            }
        }

        // Filters that reference a single relation are evaluated before joins.
        for (i, filters) in local.into_iter().enumerate() {
            if filters.is_empty() {
                continue;
            }
            let select = LogicalExpr::Select(LogicalSelect {
                input: RelNode::Group(groups[i]),
                filter: combine_conjunction(filters),
            });
            groups[i] = self.memo.insert_group(select)?.0;
        }

        let mut graph = self.build_graph(&groups)?;
        for predicate in join_predicates {
            let selectivity = {
                let referenced = graph.relations_of(&expr_columns(&predicate));
                let props: Result<Vec<&LogicalProperties>, _> =
                    referenced.iter().map(|i| self.memo.props(&groups[i])).collect();
                self.memo.properties_builder().selectivity(&predicate, &props?)
            };
            graph.add_predicate(predicate, selectivity)?;
        }

        let enumerator = match enumerator_for(self.options, graph.num_relations()) {
            Some(enumerator) => enumerator,
            None => return Ok(None),
        };
        let ctx = EnumerationContext::new(self.options.enable_cross_joins, self.deadline);
        let steps = match enumerator.enumerate(&graph, &ctx)? {
            Some(steps) => steps,
            None => {
                log::debug!(
                    "{} can not order a join block of {} relations. Using the join order of the query",
                    enumerator.name(),
                    graph.num_relations()
                );
                return Ok(None);
            }
        };

        log::debug!("{}: {} relations, {} join steps", enumerator.name(), graph.num_relations(), steps.len());

        let mut set_groups: HashMap<RelSet, GroupId> =
            groups.iter().enumerate().map(|(i, g)| (RelSet::single(i), *g)).collect();

        for step in steps {
            let input_group = |set: &RelSet| {
                set_groups
                    .get(set)
                    .copied()
                    .ok_or_else(|| OptimizerError::internal(format!("No memo group for join input {}", set)))
            };
            let left = input_group(&step.left)?;
            let right = input_group(&step.right)?;
            let (join_type, condition) = step.condition(&graph);
            let join = LogicalExpr::Join(LogicalJoin {
                join_type,
                left: RelNode::Group(left),
                right: RelNode::Group(right),
                condition,
            });

            let output = step.output();
            match set_groups.get(&output) {
                Some(group) => {
                    self.memo.insert_group_member(*group, join)?;
                }
                None => {
                    let (group, _) = self.memo.insert_group(join)?;
                    set_groups.insert(output, group);
                }
            }
        }

        let root = set_groups
            .get(&graph.all())
            .copied()
            .ok_or_else(|| OptimizerError::internal("Join steps do not produce all relations of a join block"))?;

        if top.is_empty() {
            Ok(Some(root))
        } else {
            let select = LogicalExpr::Select(LogicalSelect {
                input: RelNode::Group(root),
                filter: combine_conjunction(top),
            });
            Ok(Some(self.memo.insert_group(select)?.0))
        }
    }

    fn build_graph(&self, groups: &[GroupId]) -> Result<JoinGraph, OptimizerError> {
        let relations: Result<Vec<JoinRelation>, OptimizerError> = groups
            .iter()
            .map(|group| {
                let props = self.memo.props(group)?;
                Ok(JoinRelation {
                    columns: props.output_columns().to_vec(),
                    row_count: props.row_count(),
                })
            })
            .collect();
        JoinGraph::new(relations?)
    }

    /// Applies transformation rules to every expression reachable from the given group
    /// until no rule produces a new expression.
    fn explore(&mut self, root: GroupId) -> Result<(), OptimizerError> {
        let mut tasks = vec![Task::ExploreGroup { group: root }];

        while let Some(task) = tasks.pop() {
            log::trace!("{}", task);
            check_deadline(&self.deadline)?;

            let stats = &mut self.stats.tasks;
            stats.max_stack_depth = stats.max_stack_depth.max(tasks.len() + 1);

            match task {
                Task::ExploreGroup { group } => {
                    stats.explore_group += 1;
                    if !self.memo.mark_explored(&group) {
                        continue;
                    }
                    for expr_id in self.memo.get_group(&group)?.exprs().iter().rev() {
                        tasks.push(Task::ExploreExpr { expr: *expr_id });
                    }
                }
                Task::ExploreExpr { expr } => {
                    stats.explore_expr += 1;
                    // Rules are applied in the order of their registration.
                    let matched = self.matching_rules(&expr);
                    for rule in matched.into_iter().rev() {
                        tasks.push(Task::ApplyRule { expr, rule });
                    }
                    for input in self.memo.expr(&expr).input_groups() {
                        tasks.push(Task::ExploreGroup { group: input });
                    }
                }
                Task::ApplyRule { expr, rule } => {
                    stats.apply_rule += 1;
                    if !self.memo.mark_rule_applied(&expr, rule) {
                        continue;
                    }
                    let new_exprs = self.apply_transformation(&expr, rule)?;
                    for new_expr in new_exprs {
                        tasks.push(Task::ExploreExpr { expr: new_expr });
                    }
                }
            }
        }
        Ok(())
    }

    fn matching_rules(&self, expr_id: &ExprId) -> Vec<&'static str> {
        let required = RequiredProperties::none();
        let ctx = RuleContext::new(&*self.memo, self.catalog, self.options, &required);
        let expr = self.memo.expr(expr_id).expr();
        self.rules.transformation_rules().filter(|rule| rule.matches(&ctx, expr)).map(|rule| rule.name()).collect()
    }

    /// Applies a transformation rule and returns the new expressions it has added to the memo.
    fn apply_transformation(&mut self, expr_id: &ExprId, rule_name: &'static str) -> Result<Vec<ExprId>, OptimizerError> {
        let results = {
            let required = RequiredProperties::none();
            let ctx = RuleContext::new(&*self.memo, self.catalog, self.options, &required);
            let expr = self.memo.expr(expr_id).expr();
            match self.rules.transformation_rules().find(|r| r.name() == rule_name) {
                Some(rule) => rule.apply(&ctx, expr)?,
                None => return Err(OptimizerError::internal(format!("Unknown rule: {}", rule_name))),
            }
        };

        let group = self.memo.expr(expr_id).group_id();
        let mut new_exprs = Vec::new();
        for result in results {
            match result {
                RuleResult::Substitute(new_expr) => {
                    let num_exprs = self.memo.num_exprs();
                    let (_, new_expr_id) = self.memo.insert_group_member(group, new_expr)?;
                    if self.memo.num_exprs() > num_exprs {
                        log::trace!(" + {} {}: {}", rule_name, group, self.memo.expr(&new_expr_id).expr());
                        new_exprs.push(new_expr_id);
                    }
                }
                RuleResult::Implementation(_) => {
                    let message = format!("Transformation rule {} returned a physical alternative", rule_name);
                    return Err(OptimizerError::internal(message));
                }
            }
        }
        Ok(new_exprs)
    }

    /// Finds the cheapest physical expression of the given group that delivers the required properties.
    /// Returns `None` if no physical expression can be built.
    fn optimize_group(&mut self, group: GroupId, required: &RequiredProperties) -> Result<Option<PhysicalExprId>, OptimizerError> {
        check_deadline(&self.deadline)?;

        if !self.memo.mark_optimized(&group, required) {
            return Ok(self.memo.winner(&group, required).map(|w| w.expr));
        }
        self.stats.optimized_groups += 1;

        let exprs = self.memo.get_group(&group)?.exprs().to_vec();
        for expr_id in exprs {
            let alternatives = self.implementations(&expr_id, required)?;
            for alternative in alternatives {
                self.optimize_alternative(group, &expr_id, alternative, required)?;
            }
        }

        let winner = self.memo.winner(&group, required).copied();
        match &winner {
            Some(winner) => log::trace!("{} {}: winner {} cost={}", group, required, winner.expr, winner.cost),
            None => log::trace!("{} {}: no physical alternatives", group, required),
        }
        Ok(winner.map(|w| w.expr))
    }

    fn implementations(
        &self,
        expr_id: &ExprId,
        required: &RequiredProperties,
    ) -> Result<Vec<PhysicalAlternative>, OptimizerError> {
        let ctx = RuleContext::new(&*self.memo, self.catalog, self.options, required);
        let expr = self.memo.expr(expr_id).expr();
        let mut alternatives = Vec::new();

        for rule in self.rules.implementation_rules() {
            if !rule.matches(&ctx, expr) {
                continue;
            }
            for result in rule.apply(&ctx, expr)? {
                match result {
                    RuleResult::Implementation(alternative) => alternatives.push(alternative),
                    RuleResult::Substitute(_) => {
                        let message = format!("Implementation rule {} returned a logical expression", rule.name());
                        return Err(OptimizerError::internal(message));
                    }
                }
            }
        }
        Ok(alternatives)
    }

    fn optimize_alternative(
        &mut self,
        group: GroupId,
        expr_id: &ExprId,
        alternative: PhysicalAlternative,
        required: &RequiredProperties,
    ) -> Result<(), OptimizerError> {
        let PhysicalAlternative { op, inputs } = alternative;
        let input_groups = self.memo.expr(expr_id).input_groups();
        if input_groups.len() != inputs.len() {
            let message = format!("{} expects {} inputs but got {}", op.name(), inputs.len(), input_groups.len());
            return Err(OptimizerError::internal(message));
        }

        let mut input_exprs = Vec::with_capacity(inputs.len());
        for (input_group, input_required) in input_groups.iter().zip(inputs.iter()) {
            match self.optimize_group(*input_group, input_required)? {
                Some(winner) => input_exprs.push(winner),
                None => return Ok(()),
            }
        }

        let (properties, input_cost, input_rows) = {
            let input_props: Vec<&PropertySet> =
                input_exprs.iter().map(|e| &self.memo.physical_expr(e).properties).collect();
            let distributions: Vec<&Distribution> = input_props.iter().map(|p| p.distribution()).collect();
            if !accepts_input_distributions(&op, &distributions) {
                return Ok(());
            }
            let ctx = RuleContext::new(&*self.memo, self.catalog, self.options, required);
            let properties = derive_properties(&ctx, &op, &input_props)?;
            let input_cost: Cost = input_exprs.iter().map(|e| self.memo.physical_expr(e).cost).sum();
            let input_rows: Vec<f64> = input_exprs.iter().map(|e| self.memo.physical_expr(e).row_count).collect();
            (properties, input_cost, input_rows)
        };

        let (row_count, row_width) = self.row_count_and_width(&group)?;
        let ctx = CostEstimationContext::new(row_count, input_rows, row_width, self.options.workers);
        let cost = input_cost + self.cost_estimator.estimate_cost(&op, &ctx);

        let expr = PhysicalExpr {
            op,
            inputs: input_groups
                .into_iter()
                .zip(inputs.into_iter())
                .map(|(group, required)| PhysicalInput::Group { group, required })
                .collect(),
            properties,
            cost,
            row_count,
        };
        let expr_id = self.memo.add_physical_expr(expr);
        self.enforce_properties(group, expr_id, required)
    }

    /// Adds enforcers on top of the given physical expression if it does not deliver the required properties
    /// and offers the result as a winner of the group.
    fn enforce_properties(
        &mut self,
        group: GroupId,
        expr_id: PhysicalExprId,
        required: &RequiredProperties,
    ) -> Result<(), OptimizerError> {
        let enforcers = required_enforcers(&self.memo.physical_expr(&expr_id).properties, required)?;
        let (_, row_width) = self.row_count_and_width(&group)?;

        let mut current = expr_id;
        for op in enforcers {
            let (properties, cost, row_count) = {
                let input = self.memo.physical_expr(&current);
                let ctx = RuleContext::new(&*self.memo, self.catalog, self.options, required);
                let properties = derive_properties(&ctx, &op, &[&input.properties])?;
                let ctx = CostEstimationContext::new(input.row_count, vec![input.row_count], row_width, self.options.workers);
                let cost = input.cost + self.cost_estimator.estimate_cost(&op, &ctx);
                (properties, cost, input.row_count)
            };
            current = self.memo.add_physical_expr(PhysicalExpr {
                op,
                inputs: vec![PhysicalInput::Expr(current)],
                properties,
                cost,
                row_count,
            });
        }

        let expr = self.memo.physical_expr(&current);
        if expr.properties.satisfies(required) {
            if self.memo.record_winner(&group, required.clone(), current) {
                log::trace!(" * {} {}: {} cost={}", group, required, current, self.memo.physical_expr(&current).cost);
            }
        } else {
            log::trace!("{} {}: {} does not deliver the required properties", group, required, expr.op);
        }
        Ok(())
    }

    fn row_count_and_width(&self, group: &GroupId) -> Result<(f64, usize), OptimizerError> {
        let props = self.memo.props(group)?;
        let metadata = self.memo.properties_builder().metadata();
        Ok((props.row_count(), metadata.row_width(props.output_columns())))
    }
}

/// Copies the given physical expression and the winners of its inputs out of the memo.
///
/// # Panics
///
/// Panics if an input group has no winner for the properties required by the expression.
/// Winners of all inputs are found before the expression itself is costed so a missing winner
/// is a bug in the optimizer.
fn select_plan(memo: &Memo, expr_id: PhysicalExprId) -> PhysicalPlan {
    let expr = memo.physical_expr(&expr_id);
    let inputs = expr
        .inputs
        .iter()
        .map(|input| match input {
            PhysicalInput::Group { group, required } => {
                let winner = memo
                    .winner(group, required)
                    .unwrap_or_else(|| panic!("No winner for group {} and required properties {}", group, required));
                select_plan(memo, winner.expr)
            }
            PhysicalInput::Expr(input) => select_plan(memo, *input),
        })
        .collect();
    PhysicalPlan::new(expr.op.clone(), inputs, expr.properties.clone(), expr.cost, expr.row_count)
}

/// Checks that every scalar and `IN` subquery that is evaluated per row returns exactly one column.
fn validate_subqueries(query: &Query) -> Result<(), OptimizerError> {
    struct SingleColumnSubQueries(Vec<SubQueryId>);

    impl ExprVisitor for SingleColumnSubQueries {
        type Error = OptimizerError;

        fn post_visit(&mut self, expr: &ScalarExpr) -> Result<(), Self::Error> {
            match expr {
                ScalarExpr::SubQuery(query) | ScalarExpr::InSubQuery { query, .. } => self.0.push(*query),
                _ => {}
            }
            Ok(())
        }
    }

    fn collect(expr: &LogicalExpr, visitor: &mut SingleColumnSubQueries) -> Result<(), OptimizerError> {
        for scalar in expr.scalar_exprs() {
            scalar.accept(visitor)?;
        }
        for input in expr.inputs() {
            if let RelNode::Expr(input) = input {
                collect(input, visitor)?;
            }
        }
        Ok(())
    }

    let mut visitor = SingleColumnSubQueries(Vec::new());
    collect(&query.root, &mut visitor)?;
    for subquery in query.subqueries.iter() {
        collect(&subquery.plan, &mut visitor)?;
    }
    for cte in query.ctes.iter() {
        collect(&cte.plan, &mut visitor)?;
    }

    for id in visitor.0 {
        let subquery = query
            .get_subquery(&id)
            .ok_or_else(|| OptimizerError::argument(format!("Unknown subquery: {}", id)))?;
        let columns: Vec<ColumnId> = subquery.plan.tree_output_columns()?;
        if columns.len() != 1 {
            let message = format!("{} must return exactly one column but returns {}", id, columns.len());
            return Err(OptimizerError::argument(message));
        }
    }
    Ok(())
}

/// Checks that every window function is an aggregate function whose arguments contain no aggregates.
fn validate_window_functions(query: &Query) -> Result<(), OptimizerError> {
    fn validate(expr: &LogicalExpr) -> Result<(), OptimizerError> {
        if let LogicalExpr::Window(window) = expr {
            for func in window.window_exprs.iter() {
                match func {
                    ScalarExpr::Aggregate { args, .. } if !args.iter().any(contains_aggregates) => {}
                    _ => return Err(OptimizerError::argument(format!("Unsupported window function: {}", func))),
                }
            }
        }
        for input in expr.inputs() {
            if let RelNode::Expr(input) = input {
                validate(input)?;
            }
        }
        Ok(())
    }

    validate(&query.root)?;
    for subquery in query.subqueries.iter() {
        validate(&subquery.plan)?;
    }
    for cte in query.ctes.iter() {
        validate(&cte.plan)?;
    }
    Ok(())
}
