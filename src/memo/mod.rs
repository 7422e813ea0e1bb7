//! The memo: groups of logically equivalent expressions and the best physical
//! expressions found for them.

use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Display, Formatter};

use itertools::Itertools;
use triomphe::Arc;

use crate::cost::Cost;
use crate::error::OptimizerError;
use crate::operators::logical::LogicalExpr;
use crate::operators::physical::PhysicalOp;
use crate::operators::RelNode;
use crate::properties::logical::{LogicalProperties, LogicalPropertiesBuilder};
use crate::properties::{PropertySet, RequiredProperties};


/// `Memo` is the primary data structure used by the cost-based optimizer:
///  * It stores each expression as a group of logically equivalent expressions.
///  * It provides memoization of identical subexpressions within an expression tree.
///  * For every group it stores the cheapest physical expression found for every set of required properties.
///
/// Groups and expressions are stored in arenas and reference each other by their identifiers.
/// Inputs of a memo expression are always memo groups that have been created before that expression,
/// so the graph of groups is acyclic.
pub struct Memo {
    groups: Vec<MemoGroup>,
    exprs: Vec<MemoExpr>,
    physical_exprs: Vec<PhysicalExpr>,
    expr_cache: HashMap<LogicalExpr, ExprId>,
    properties: LogicalPropertiesBuilder,
}

impl Memo {
    /// Creates a new memo that computes logical properties of groups with the given builder.
    pub fn new(properties: LogicalPropertiesBuilder) -> Self {
        Memo {
            groups: Vec::new(),
            exprs: Vec::new(),
            physical_exprs: Vec::new(),
            expr_cache: HashMap::new(),
            properties,
        }
    }

    /// Copies the given expression `expr` into this memo. If this memo does not contain the given expression
    /// a new memo group is created. Otherwise returns the group of the already existing expression.
    /// Inputs of the expression are copied into the memo before the expression itself.
    pub fn insert_group(&mut self, expr: LogicalExpr) -> Result<(GroupId, ExprId), OptimizerError> {
        self.copy_in(expr, None)
    }

    /// Copies the expression `expr` into this memo and adds it to the given group.
    /// If an identical expression already exists this method returns that expression instead.
    pub fn insert_group_member(
        &mut self,
        group_id: GroupId,
        expr: LogicalExpr,
    ) -> Result<(GroupId, ExprId), OptimizerError> {
        self.get_group(&group_id)?;
        self.copy_in(expr, Some(group_id))
    }

    fn copy_in(&mut self, expr: LogicalExpr, parent: Option<GroupId>) -> Result<(GroupId, ExprId), OptimizerError> {
        let mut inputs = Vec::with_capacity(expr.inputs().len());
        for input in expr.inputs() {
            let group_id = match input {
                RelNode::Expr(input) => self.copy_in(input.as_ref().clone(), None)?.0,
                RelNode::Group(group_id) => {
                    self.get_group(group_id)?;
                    *group_id
                }
            };
            inputs.push(RelNode::Group(group_id));
        }
        let expr = expr.with_new_inputs(inputs);

        if let Some(expr_id) = self.expr_cache.get(&expr) {
            let expr_id = *expr_id;
            return Ok((self.exprs[expr_id.0].group_id, expr_id));
        }

        let group_id = match parent {
            Some(group_id) => group_id,
            None => {
                let input_props: Vec<&LogicalProperties> =
                    expr.inputs().iter().map(|input| &self.groups[group_of(input).0].props).collect();
                let props = self.properties.build_properties(&expr, &input_props)?;
                let group_id = GroupId(self.groups.len());
                self.groups.push(MemoGroup {
                    id: group_id,
                    exprs: Vec::new(),
                    props,
                    explored: false,
                    winners: HashMap::new(),
                    optimized: HashSet::new(),
                });
                group_id
            }
        };

        let expr_id = ExprId(self.exprs.len());
        self.exprs.push(MemoExpr {
            id: expr_id,
            group_id,
            expr: expr.clone(),
            applied_rules: HashSet::new(),
        });
        self.expr_cache.insert(expr, expr_id);
        self.groups[group_id.0].exprs.push(expr_id);

        Ok((group_id, expr_id))
    }

    /// Returns a group with the given identifier.
    pub fn get_group(&self, group_id: &GroupId) -> Result<&MemoGroup, OptimizerError> {
        self.groups
            .get(group_id.0)
            .ok_or_else(|| OptimizerError::internal(format!("Group does not exist: {}", group_id)))
    }

    /// Returns an expression with the given identifier.
    ///
    /// # Panics
    ///
    /// This method panics if the expression does not exist.
    pub fn expr(&self, expr_id: &ExprId) -> &MemoExpr {
        self.exprs.get(expr_id.0).unwrap_or_else(|| panic!("expr id is invalid: {}", expr_id))
    }

    /// Returns a physical expression with the given identifier.
    ///
    /// # Panics
    ///
    /// This method panics if the physical expression does not exist.
    pub fn physical_expr(&self, expr_id: &PhysicalExprId) -> &PhysicalExpr {
        self.physical_exprs.get(expr_id.0).unwrap_or_else(|| panic!("physical expr id is invalid: {}", expr_id))
    }

    /// Returns logical properties of the given group.
    pub fn props(&self, group_id: &GroupId) -> Result<&LogicalProperties, OptimizerError> {
        self.get_group(group_id).map(|g| &g.props)
    }

    /// Returns the builder of logical properties used by this memo.
    pub fn properties_builder(&self) -> &LogicalPropertiesBuilder {
        &self.properties
    }

    /// Returns the identifiers of all groups in the order they have been created.
    pub fn group_ids(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.groups.iter().map(|g| g.id)
    }

    /// Returns the number of groups.
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Returns the number of logical expressions.
    pub fn num_exprs(&self) -> usize {
        self.exprs.len()
    }

    /// Returns the number of physical expressions that have been costed.
    pub fn num_physical_exprs(&self) -> usize {
        self.physical_exprs.len()
    }

    /// Marks the given group as explored. Returns `false` if the group has already been explored.
    pub fn mark_explored(&mut self, group_id: &GroupId) -> bool {
        let group = &mut self.groups[group_id.0];
        !std::mem::replace(&mut group.explored, true)
    }

    /// Records that the rule `rule` has been applied to the expression `expr_id`.
    /// Returns `false` if the rule has already been applied to that expression.
    pub fn mark_rule_applied(&mut self, expr_id: &ExprId, rule: &'static str) -> bool {
        self.exprs[expr_id.0].applied_rules.insert(rule)
    }

    /// Stores the given physical expression.
    pub fn add_physical_expr(&mut self, expr: PhysicalExpr) -> PhysicalExprId {
        let expr_id = PhysicalExprId(self.physical_exprs.len());
        self.physical_exprs.push(expr);
        expr_id
    }

    /// Returns the best physical expression of the given group for the given required properties.
    pub fn winner(&self, group_id: &GroupId, required: &RequiredProperties) -> Option<&Winner> {
        self.groups.get(group_id.0).and_then(|g| g.winners.get(required))
    }

    /// Offers the physical expression `expr_id` as the winner of the given group for the given required properties.
    /// The winner is replaced only if the cost of the offered expression is strictly lower than the cost
    /// of the current winner. Returns `true` if the offered expression became the new winner.
    pub fn record_winner(&mut self, group_id: &GroupId, required: RequiredProperties, expr_id: PhysicalExprId) -> bool {
        let cost = self.physical_exprs[expr_id.0].cost;
        let group = &mut self.groups[group_id.0];
        let replace = group.winners.get(&required).map_or(true, |winner| cost < winner.cost);
        if replace {
            group.winners.insert(required, Winner { expr: expr_id, cost });
        }
        replace
    }

    /// Marks the given group as optimized for the given required properties.
    /// Returns `false` if the group has already been optimized for them.
    pub fn mark_optimized(&mut self, group_id: &GroupId, required: &RequiredProperties) -> bool {
        self.groups[group_id.0].optimized.insert(required.clone())
    }

    /// Creates a read-only snapshot of this memo.
    pub fn snapshot(&self) -> MemoSnapshot {
        let groups = self
            .groups
            .iter()
            .map(|group| GroupSnapshot {
                id: group.id,
                exprs: group.exprs.iter().map(|e| self.exprs[e.0].expr.to_string()).collect(),
                row_count: group.props.row_count(),
                winners: group
                    .winners
                    .iter()
                    .map(|(required, winner)| WinnerSnapshot {
                        required: required.to_string(),
                        expr: self.physical_exprs[winner.expr.0].op.to_string(),
                        cost: winner.cost.into_inner(),
                    })
                    .sorted_by(|a, b| a.required.cmp(&b.required))
                    .collect(),
            })
            .collect();

        MemoSnapshot {
            inner: Arc::new(SnapshotData {
                groups,
                num_physical_exprs: self.physical_exprs.len(),
            }),
        }
    }
}

fn group_of(node: &RelNode) -> GroupId {
    match node {
        RelNode::Group(group_id) => *group_id,
        RelNode::Expr(expr) => unreachable!("Inputs of a memo expression must be memo groups: {}", expr),
    }
}

impl Debug for Memo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("groups", &self.groups.len())
            .field("exprs", &self.exprs.len())
            .field("physical_exprs", &self.physical_exprs.len())
            .finish()
    }
}

/// A group of logically equivalent expressions.
#[derive(Debug)]
pub struct MemoGroup {
    id: GroupId,
    exprs: Vec<ExprId>,
    props: LogicalProperties,
    explored: bool,
    winners: HashMap<RequiredProperties, Winner>,
    optimized: HashSet<RequiredProperties>,
}

impl MemoGroup {
    /// The identifier of this group.
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Expressions of this group in the order they were added.
    pub fn exprs(&self) -> &[ExprId] {
        &self.exprs
    }

    /// Logical properties shared by all expressions of this group.
    pub fn props(&self) -> &LogicalProperties {
        &self.props
    }

    pub fn is_explored(&self) -> bool {
        self.explored
    }
}

/// A logical expression stored in a memo. Inputs of the expression are memo groups.
#[derive(Debug)]
pub struct MemoExpr {
    id: ExprId,
    group_id: GroupId,
    expr: LogicalExpr,
    applied_rules: HashSet<&'static str>,
}

impl MemoExpr {
    pub fn id(&self) -> ExprId {
        self.id
    }

    /// The group this expression belongs to.
    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn expr(&self) -> &LogicalExpr {
        &self.expr
    }

    /// Returns the input groups of this expression.
    pub fn input_groups(&self) -> Vec<GroupId> {
        self.expr.inputs().into_iter().map(group_of).collect()
    }
}

/// An input of a physical expression.
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalInput {
    /// The best expression of a group for the given required properties.
    Group {
        group: GroupId,
        required: RequiredProperties,
    },
    /// A concrete physical expression. Enforcers use this kind of input to refer to the expression they enforce
    /// properties for.
    Expr(PhysicalExprId),
}

/// A physical expression stored in a memo.
#[derive(Debug, Clone)]
pub struct PhysicalExpr {
    pub op: PhysicalOp,
    pub inputs: Vec<PhysicalInput>,
    /// Properties delivered by this expression.
    pub properties: PropertySet,
    /// The total cost of this expression including the cost of its inputs.
    pub cost: Cost,
    pub row_count: f64,
}

/// The best physical expression found for a group and a set of required properties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Winner {
    pub expr: PhysicalExprId,
    pub cost: Cost,
}

/// Uniquely identifies a memo group in a memo.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub usize);

impl Display for GroupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl Debug for GroupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GroupId({:})", self.0)
    }
}

/// Uniquely identifies a memo expression in a memo.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ExprId(usize);

impl Display for ExprId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl Debug for ExprId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExprId({:})", self.0)
    }
}

/// Uniquely identifies a physical expression in a memo.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct PhysicalExprId(usize);

impl Display for PhysicalExprId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{:02}", self.0)
    }
}

/// An immutable snapshot of a memo. Snapshots are cheap to clone and can be shared between threads.
#[derive(Debug, Clone)]
pub struct MemoSnapshot {
    inner: Arc<SnapshotData>,
}

#[derive(Debug)]
struct SnapshotData {
    groups: Vec<GroupSnapshot>,
    num_physical_exprs: usize,
}

/// A snapshot of a memo group.
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    pub id: GroupId,
    /// Textual representation of logical expressions of the group.
    pub exprs: Vec<String>,
    pub row_count: f64,
    pub winners: Vec<WinnerSnapshot>,
}

/// A snapshot of a winner of a memo group.
#[derive(Debug, Clone)]
pub struct WinnerSnapshot {
    pub required: String,
    pub expr: String,
    pub cost: f64,
}

impl MemoSnapshot {
    pub fn groups(&self) -> &[GroupSnapshot] {
        &self.inner.groups
    }

    pub fn num_groups(&self) -> usize {
        self.inner.groups.len()
    }

    /// The total number of logical expressions.
    pub fn num_exprs(&self) -> usize {
        self.inner.groups.iter().map(|g| g.exprs.len()).sum()
    }

    /// The number of physical alternatives that have been costed (enforcers included).
    pub fn num_physical_exprs(&self) -> usize {
        self.inner.num_physical_exprs
    }
}

impl Display for MemoSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for group in self.inner.groups.iter().rev() {
            write!(f, "{} ", group.id)?;
            for (i, expr) in group.exprs.iter().enumerate() {
                if i > 0 {
                    // newline + 3 spaces
                    write!(f, "\n   ")?;
                }
                write!(f, "{}", expr)?;
            }
            writeln!(f)?;
            for winner in group.winners.iter() {
                writeln!(f, "   winner {} {} cost={:.2}", winner.required, winner.expr, winner.cost)?;
            }
        }
        Ok(())
    }
}

/// Builds a textual representation of the given memo.
pub(crate) fn format_memo(memo: &Memo) -> String {
    let mut buf = String::new();

    for group in memo.groups.iter().rev() {
        buf.push_str(format!("{} ", group.id).as_str());
        for (i, expr) in group.exprs.iter().enumerate() {
            if i > 0 {
                // newline + 3 spaces
                buf.push_str("\n   ");
            }
            buf.push_str(&memo.exprs[expr.0].expr.to_string());
        }
        buf.push('\n');
    }

    buf
}
