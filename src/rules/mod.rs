//! Rules used by the optimizer.

use std::fmt::{Debug, Formatter};

use crate::catalog::CatalogRef;
use crate::error::OptimizerError;
use crate::memo::Memo;
use crate::meta::{ColumnId, Metadata};
use crate::operators::logical::LogicalExpr;
use crate::operators::physical::PhysicalOp;
use crate::operators::RelNode;
use crate::options::{JoinOrderStrategy, OptimizerOptions};
use crate::properties::logical::LogicalProperties;
use crate::properties::RequiredProperties;
use crate::rules::implementation::*;
use crate::rules::transformation::*;

pub mod enforcers;
pub mod implementation;
pub mod rewrite;
#[cfg(test)]
pub mod testing;
pub mod transformation;

/// An optimization rule used by the optimizer. An optimization rule either transform one logical expression into another or
/// provides implementations of the given logical expression.
pub trait Rule: Debug {
    /// The name of this rule.
    fn name(&self) -> &'static str;

    /// Returns type type of this rule.
    fn rule_type(&self) -> RuleType;

    /// Checks whether this rule can be applied to the given expression `expr`.
    fn matches(&self, ctx: &RuleContext, expr: &LogicalExpr) -> bool;

    /// Applies this rule to the given expression `expr`.
    /// If this rule can not be applied to the given expression this method must return an empty vector.
    fn apply(&self, ctx: &RuleContext, expr: &LogicalExpr) -> Result<Vec<RuleResult>, OptimizerError>;
}

/// Rule type specifies which expressions a rule produces.
/// A transformation rule produce [logical expressions].
/// An implementation rule produce [physical alternatives](PhysicalAlternative).
///
/// [logical expressions]: crate::operators::logical::LogicalExpr
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RuleType {
    /// Transformation rules produce equivalent logical expressions.
    Transformation,
    /// Implementation rules produce physical expressions.
    /// Physical expressions are used to compute cost of a query plan.
    Implementation,
}

/// A result of a rule application.
#[derive(Debug, Clone)]
pub enum RuleResult {
    /// A alternative logical expression.
    Substitute(LogicalExpr),
    /// An implementation.
    Implementation(PhysicalAlternative),
}

/// A physical operator and physical properties it requires from each of its inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalAlternative {
    pub op: PhysicalOp,
    pub inputs: Vec<RequiredProperties>,
}

impl PhysicalAlternative {
    pub fn new(op: PhysicalOp, inputs: Vec<RequiredProperties>) -> Self {
        PhysicalAlternative { op, inputs }
    }
}

/// Provides information available to rules.
pub struct RuleContext<'a> {
    memo: &'a Memo,
    catalog: &'a CatalogRef,
    options: &'a OptimizerOptions,
    required: &'a RequiredProperties,
}

impl<'a> RuleContext<'a> {
    pub fn new(
        memo: &'a Memo,
        catalog: &'a CatalogRef,
        options: &'a OptimizerOptions,
        required: &'a RequiredProperties,
    ) -> Self {
        RuleContext {
            memo,
            catalog,
            options,
            required,
        }
    }

    /// Physical properties required from the expression the rule is applied to.
    pub fn required_properties(&self) -> &RequiredProperties {
        self.required
    }

    pub fn options(&self) -> &OptimizerOptions {
        self.options
    }

    pub fn catalog(&self) -> &CatalogRef {
        self.catalog
    }

    pub fn metadata(&self) -> &Metadata {
        self.memo.properties_builder().metadata()
    }

    /// Returns logical properties of the given input of an expression.
    pub fn input_props(&self, input: &RelNode) -> Result<&'a LogicalProperties, OptimizerError> {
        match input {
            RelNode::Group(group_id) => {
                let memo = self.memo;
                memo.props(group_id)
            }
            RelNode::Expr(expr) => {
                Err(OptimizerError::internal(format!("Expected a memo group but got an expression: {}", expr)))
            }
        }
    }

    /// Returns output columns of the given input of an expression.
    pub fn input_columns(&self, input: &RelNode) -> Result<&'a [ColumnId], OptimizerError> {
        self.input_props(input).map(|p| p.output_columns())
    }

    /// Returns logical expressions of the memo group referenced by the given input.
    pub fn input_exprs(&self, input: &RelNode) -> Result<Vec<&'a LogicalExpr>, OptimizerError> {
        match input {
            RelNode::Group(group_id) => {
                let memo = self.memo;
                let group = memo.get_group(group_id)?;
                Ok(group.exprs().iter().map(|e| memo.expr(e).expr()).collect())
            }
            RelNode::Expr(expr) => {
                Err(OptimizerError::internal(format!("Expected a memo group but got an expression: {}", expr)))
            }
        }
    }
}

impl Debug for RuleContext<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleContext").field("required", self.required).finish()
    }
}

/// An ordered collection of optimization rules.
/// When several rules produce alternatives of the same cost the alternative produced by the rule registered first wins.
#[derive(Debug)]
pub struct StaticRuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl StaticRuleSet {
    /// Creates a new [StaticRuleSet] from the given collection of rules.
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        StaticRuleSet { rules }
    }

    /// Creates a rule set for the given options.
    /// Join reordering rules are only included when joins are ordered by transformations.
    pub fn from_options(options: &OptimizerOptions) -> Self {
        let mut rules: Vec<Box<dyn Rule>> = Vec::new();

        if options.use_memo && options.join_order == JoinOrderStrategy::Transformations {
            rules.push(Box::new(PushSelectIntoJoinRule));
            rules.push(Box::new(JoinCommutativityRule));
            rules.push(Box::new(JoinAssociativityRule));
        }

        rules.push(Box::new(ScanRule));
        rules.push(Box::new(IndexScanRule));
        rules.push(Box::new(FilterRule));
        rules.push(Box::new(ProjectionRule));
        rules.push(Box::new(HashJoinRule));
        rules.push(Box::new(MergeJoinRule));
        rules.push(Box::new(NestedLoopJoinRule));
        rules.push(Box::new(HashAggregateRule));
        rules.push(Box::new(StreamingAggregateRule));
        rules.push(Box::new(HashSetOpRule));
        rules.push(Box::new(LimitRule));
        rules.push(Box::new(WindowRule));
        rules.push(Box::new(CteScanRule));

        StaticRuleSet::new(rules)
    }

    /// Returns transformation rules in the order they were registered.
    pub fn transformation_rules(&self) -> impl Iterator<Item = &dyn Rule> {
        self.rules_of_type(RuleType::Transformation)
    }

    /// Returns implementation rules in the order they were registered.
    pub fn implementation_rules(&self) -> impl Iterator<Item = &dyn Rule> {
        self.rules_of_type(RuleType::Implementation)
    }

    fn rules_of_type(&self, rule_type: RuleType) -> impl Iterator<Item = &dyn Rule> {
        self.rules.iter().map(|r| r.as_ref()).filter(move |r| r.rule_type() == rule_type)
    }
}
