//! Join ordering.
//!
//! A tree of inner and cross joins (a join block) is flattened into a [JoinGraph]: the relations
//! of the block are vertices and the conjuncts of join conditions and filters are edges.
//! A [JoinEnumerator] then produces [JoinStep]s, each of which tells the optimizer to join
//! two disjoint sets of relations. Every step is copied into a memo as a join of the groups of its inputs.

use std::collections::HashSet;
use std::fmt::{Debug, Display, Formatter};

use itertools::Itertools;

use crate::error::OptimizerError;
use crate::meta::ColumnId;
use crate::operators::join::JoinType;
use crate::operators::logical::{LogicalExpr, LogicalJoin, LogicalSelect};
use crate::operators::scalar::{combine_conjunction, expr_columns, expr_subqueries, split_conjunction, ScalarExpr};
use crate::operators::RelNode;
use crate::options::{check_deadline, Deadline, JoinOrderStrategy, OptimizerOptions};

pub mod dpbushy;
pub mod dpccp;
pub mod goo;

pub use dpbushy::DPBushy;
pub use dpccp::DPccp;
pub use goo::GreedyOperatorOrdering;

/// The maximum number of relations in a join graph.
pub const MAX_RELATIONS: usize = 64;

/// A set of relations of a join graph.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelSet(u64);

impl RelSet {
    /// An empty set.
    pub const EMPTY: RelSet = RelSet(0);

    /// Creates a set that contains the given relation.
    pub fn single(relation: usize) -> Self {
        debug_assert!(relation < MAX_RELATIONS, "relation index is out of bounds: {}", relation);
        RelSet(1 << relation)
    }

    /// Creates a set of the first `n` relations.
    pub fn first(n: usize) -> Self {
        if n >= MAX_RELATIONS {
            RelSet(u64::MAX)
        } else {
            RelSet((1u64 << n) - 1)
        }
    }

    pub fn from_bits(bits: u64) -> Self {
        RelSet(bits)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn contains(&self, relation: usize) -> bool {
        relation < MAX_RELATIONS && self.0 & (1 << relation) != 0
    }

    pub fn union(&self, other: RelSet) -> RelSet {
        RelSet(self.0 | other.0)
    }

    pub fn intersection(&self, other: RelSet) -> RelSet {
        RelSet(self.0 & other.0)
    }

    pub fn difference(&self, other: RelSet) -> RelSet {
        RelSet(self.0 & !other.0)
    }

    pub fn is_subset(&self, other: RelSet) -> bool {
        self.0 & other.0 == self.0
    }

    pub fn overlaps(&self, other: RelSet) -> bool {
        self.0 & other.0 != 0
    }

    /// The relation with the smallest index.
    pub fn lowest(&self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    /// Returns relations of this set in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> {
        let bits = self.0;
        (0..MAX_RELATIONS).filter(move |i| bits & (1 << i) != 0)
    }

    /// Returns all non-empty subsets of this set. Each subset is returned before its supersets.
    pub fn subsets(&self) -> impl Iterator<Item = RelSet> {
        let mask = self.0;
        let mut current = 0u64;
        let mut done = mask == 0;
        std::iter::from_fn(move || {
            if done {
                return None;
            }
            current = current.wrapping_sub(mask) & mask;
            if current == mask {
                done = true;
            }
            Some(RelSet(current))
        })
    }
}

impl Display for RelSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.iter().join(", "))
    }
}

impl Debug for RelSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

/// A relation of a join graph.
#[derive(Debug, Clone)]
pub struct JoinRelation {
    pub columns: Vec<ColumnId>,
    pub row_count: f64,
}

/// A conjunct of join conditions of a join block.
#[derive(Debug, Clone)]
pub struct JoinPredicate {
    pub expr: ScalarExpr,
    /// The relations whose columns are referenced by the predicate.
    pub relations: RelSet,
    pub selectivity: f64,
}

/// A join graph. Vertices are relations and (hyper)edges are predicates that reference columns of
/// two or more relations.
#[derive(Debug, Clone, Default)]
pub struct JoinGraph {
    relations: Vec<JoinRelation>,
    predicates: Vec<JoinPredicate>,
}

impl JoinGraph {
    /// Creates a join graph with the given relations.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of relations exceeds [MAX_RELATIONS].
    pub fn new(relations: Vec<JoinRelation>) -> Result<Self, OptimizerError> {
        if relations.len() > MAX_RELATIONS {
            let message = format!("Join graph can not have more than {} relations", MAX_RELATIONS);
            return Err(OptimizerError::argument(message));
        }
        Ok(JoinGraph {
            relations,
            predicates: Vec::new(),
        })
    }

    /// Adds an edge to this graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the predicate references fewer than two relations.
    pub fn add_predicate(&mut self, expr: ScalarExpr, selectivity: f64) -> Result<usize, OptimizerError> {
        let relations = self.relations_of(&expr_columns(&expr));
        if relations.len() < 2 {
            let message = format!("Join predicate must reference at least two relations: {}", expr);
            return Err(OptimizerError::internal(message));
        }
        self.predicates.push(JoinPredicate {
            expr,
            relations,
            selectivity: selectivity.clamp(0.0, 1.0),
        });
        Ok(self.predicates.len() - 1)
    }

    /// Returns the set of relations that produce any of the given columns.
    /// Columns produced by none of the relations are ignored.
    pub fn relations_of(&self, columns: &[ColumnId]) -> RelSet {
        self.relations
            .iter()
            .enumerate()
            .filter(|(_, r)| columns.iter().any(|c| r.columns.contains(c)))
            .fold(RelSet::EMPTY, |acc, (i, _)| acc.union(RelSet::single(i)))
    }

    pub fn num_relations(&self) -> usize {
        self.relations.len()
    }

    pub fn relation(&self, i: usize) -> &JoinRelation {
        &self.relations[i]
    }

    pub fn predicates(&self) -> &[JoinPredicate] {
        &self.predicates
    }

    pub fn predicate(&self, i: usize) -> &JoinPredicate {
        &self.predicates[i]
    }

    /// The set of all relations.
    pub fn all(&self) -> RelSet {
        RelSet::first(self.relations.len())
    }

    /// Returns relations outside of `excluded` that share an edge with a relation from `set`.
    /// Relations of a hyperedge are treated as pairwise adjacent.
    pub fn neighbours(&self, set: RelSet, excluded: RelSet) -> RelSet {
        self.predicates
            .iter()
            .filter(|p| p.relations.overlaps(set))
            .fold(RelSet::EMPTY, |acc, p| acc.union(p.relations))
            .difference(set)
            .difference(excluded)
    }

    /// Returns `true` if there is an edge between relations of `left` and relations of `right`.
    pub fn connects(&self, left: RelSet, right: RelSet) -> bool {
        self.predicates.iter().any(|p| p.relations.overlaps(left) && p.relations.overlaps(right))
    }

    /// Returns `true` if the relations of the given set form a connected subgraph.
    pub fn is_connected(&self, set: RelSet) -> bool {
        let start = match set.lowest() {
            Some(start) => RelSet::single(start),
            None => return true,
        };
        let mut reached = start;
        loop {
            let next = self.neighbours(reached, RelSet::EMPTY).intersection(set);
            if next.is_empty() {
                break;
            }
            reached = reached.union(next);
        }
        reached == set
    }

    /// Returns the predicates evaluated by a join of `left` and `right`: predicates that
    /// reference relations of both sides and no relation outside of them.
    pub fn join_predicates(&self, left: RelSet, right: RelSet) -> Vec<usize> {
        let joined = left.union(right);
        self.predicates
            .iter()
            .enumerate()
            .filter(|(_, p)| p.relations.is_subset(joined) && !p.relations.is_subset(left) && !p.relations.is_subset(right))
            .map(|(i, _)| i)
            .collect()
    }

    /// The estimated number of rows produced by a join of the given relations.
    pub fn cardinality(&self, set: RelSet) -> f64 {
        let rows: f64 = set.iter().map(|i| self.relations[i].row_count).product();
        let selectivity: f64 =
            self.predicates.iter().filter(|p| p.relations.is_subset(set)).map(|p| p.selectivity).product();
        rows * selectivity
    }

    /// Builds a join step of the given sets.
    pub fn step(&self, left: RelSet, right: RelSet) -> JoinStep {
        JoinStep {
            left,
            right,
            predicates: self.join_predicates(left, right),
        }
    }
}

/// Tells the optimizer to join two disjoint sets of relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinStep {
    pub left: RelSet,
    pub right: RelSet,
    /// Indexes of the predicates of a join graph evaluated by this join.
    pub predicates: Vec<usize>,
}

impl JoinStep {
    /// The set of relations produced by this step.
    pub fn output(&self) -> RelSet {
        self.left.union(self.right)
    }

    /// Builds the join condition of this step. Steps without predicates are cross joins.
    pub fn condition(&self, graph: &JoinGraph) -> (JoinType, ScalarExpr) {
        if self.predicates.is_empty() {
            (JoinType::Cross, ScalarExpr::true_expr())
        } else {
            let conjuncts = self.predicates.iter().map(|i| graph.predicate(*i).expr.clone());
            (JoinType::Inner, combine_conjunction(conjuncts))
        }
    }
}

impl Display for JoinStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} x {}", self.left, self.right)
    }
}

/// Parameters of an enumeration.
#[derive(Debug, Clone)]
pub struct EnumerationContext {
    pub allow_cross_joins: bool,
    pub deadline: Option<Deadline>,
}

impl EnumerationContext {
    pub fn new(allow_cross_joins: bool, deadline: Option<Deadline>) -> Self {
        EnumerationContext {
            allow_cross_joins,
            deadline,
        }
    }

    /// Returns an error if the time limit of the optimization has been exceeded.
    pub fn check_deadline(&self) -> Result<(), OptimizerError> {
        check_deadline(&self.deadline)
    }
}

/// Produces alternative join orders of a join graph.
pub trait JoinEnumerator: Debug {
    /// The name of this enumerator.
    fn name(&self) -> &'static str;

    /// Enumerates join orders of the given graph.
    ///
    /// Steps are ordered so that the inputs of a step are single relations or sets produced by
    /// the preceding steps. The last step produces all relations of the graph.
    /// Returns `Ok(None)` if this enumerator can not order the given graph (for example when the graph is
    /// not connected and cross joins are not allowed).
    ///
    /// # Errors
    ///
    /// Returns an error if the time limit of the optimization has been exceeded.
    fn enumerate(&self, graph: &JoinGraph, ctx: &EnumerationContext) -> Result<Option<Vec<JoinStep>>, OptimizerError>;
}

/// Selects an enumerator for a join graph with the given number of relations.
/// Returns `None` if joins must be ordered by transformation rules.
pub fn enumerator_for(options: &OptimizerOptions, num_relations: usize) -> Option<Box<dyn JoinEnumerator>> {
    let dp_allowed = num_relations <= options.dp_threshold;
    match options.join_order {
        JoinOrderStrategy::Transformations => None,
        JoinOrderStrategy::DPccp if dp_allowed => Some(Box::new(DPccp)),
        JoinOrderStrategy::DPBushy if dp_allowed => Some(Box::new(DPBushy)),
        _ => Some(Box::new(GreedyOperatorOrdering)),
    }
}

/// Orders the given steps by the size of the sets they produce and removes steps whose inputs are never produced.
/// Returns `None` if no remaining step produces all relations of the graph.
pub(crate) fn finish_steps(graph: &JoinGraph, mut steps: Vec<JoinStep>) -> Option<Vec<JoinStep>> {
    steps.sort_by_key(|s| s.output().len());

    let mut available = HashSet::new();
    let mut result = Vec::with_capacity(steps.len());

    for step in steps {
        let is_available = |set: &RelSet| set.len() == 1 || available.contains(set);
        if is_available(&step.left) && is_available(&step.right) {
            // inputs of a step are strictly smaller than its output.
            available.insert(step.output());
            result.push(step);
        }
    }

    if graph.num_relations() == 1 || available.contains(&graph.all()) {
        Some(result)
    } else {
        None
    }
}

/// A join block: relations joined by inner and cross joins and the conjuncts of their conditions and filters.
#[derive(Debug, Clone)]
pub struct JoinBlock {
    pub relations: Vec<LogicalExpr>,
    pub predicates: Vec<ScalarExpr>,
}

impl JoinBlock {
    /// Extracts a join block rooted at the given expression.
    ///
    /// Returns `None` if the expression is not an inner or a cross join, if the block contains
    /// predicates with subqueries, or if the block has more than [MAX_RELATIONS] relations.
    /// Filters that reside between joins of a block become predicates of the block.
    pub fn extract(expr: &LogicalExpr) -> Option<JoinBlock> {
        match expr {
            LogicalExpr::Join(join) if Self::is_block_join(join) => {}
            _ => return None,
        }
        let mut block = JoinBlock {
            relations: Vec::new(),
            predicates: Vec::new(),
        };
        block.add(expr);
        if block.relations.len() < 2 {
            return None;
        }
        if block.relations.len() > MAX_RELATIONS {
            log::debug!("Join block with {} relations is too large", block.relations.len());
            return None;
        }
        Some(block)
    }

    fn is_block_join(join: &LogicalJoin) -> bool {
        join.join_type.is_inner() && expr_subqueries(&join.condition).is_empty()
    }

    fn add(&mut self, expr: &LogicalExpr) {
        match expr {
            LogicalExpr::Join(join) if Self::is_block_join(join) => {
                match (&join.left, &join.right) {
                    (RelNode::Expr(left), RelNode::Expr(right)) => {
                        self.add_input(left);
                        self.add_input(right);
                    }
                    _ => {
                        self.relations.push(expr.clone());
                        return;
                    }
                }
                self.predicates.extend(split_conjunction(join.condition.clone()));
            }
            _ => self.relations.push(expr.clone()),
        }
    }

    fn add_input(&mut self, expr: &LogicalExpr) {
        match expr {
            LogicalExpr::Select(LogicalSelect {
                input: RelNode::Expr(input),
                filter,
            }) if expr_subqueries(filter).is_empty() && matches!(&**input, LogicalExpr::Join(j) if Self::is_block_join(j)) => {
                self.add(input);
                self.predicates.extend(split_conjunction(filter.clone()));
            }
            _ => self.add(expr),
        }
    }
}
