use std::sync::Arc;

use itertools::Itertools;

use crate::catalog::CatalogRef;
use crate::memo::Memo;
use crate::operators::logical::LogicalExpr;
use crate::options::OptimizerOptions;
use crate::properties::logical::LogicalPropertiesBuilder;
use crate::properties::RequiredProperties;
use crate::rules::{Rule, RuleContext, RuleResult};
use crate::statistics::simple::SimpleStatisticsBuilder;
use crate::statistics::CatalogStatisticsProvider;
use crate::testing::QueryBuilder;

/// Provides methods to test [optimization rules].
///
/// Expressions passed to a tester are copied into a memo first, so the rule sees them the same way
/// it sees them during optimization: inputs of an expression are memo groups.
///
/// [optimization rules]: crate::rules::Rule
pub struct RuleTester {
    rule: Box<dyn Rule>,
    memo: Memo,
    catalog: CatalogRef,
    options: OptimizerOptions,
}

impl RuleTester {
    /// Creates a tester for the given rule. Columns are resolved using the metadata of the given query builder.
    pub fn new<T>(rule: T, options: OptimizerOptions, builder: &QueryBuilder) -> Self
    where
        T: Rule + 'static,
    {
        let catalog = builder.catalog();
        let provider = Arc::new(CatalogStatisticsProvider::new(catalog.clone()));
        let statistics = SimpleStatisticsBuilder::new(provider);
        let properties = LogicalPropertiesBuilder::new(Box::new(statistics), builder.metadata().build_metadata());

        RuleTester {
            rule: Box::new(rule),
            memo: Memo::new(properties),
            catalog,
            options,
        }
    }

    /// Copies the given expression into a memo and returns the results of the rule application.
    /// Every result is written on its own line.
    pub fn apply(&mut self, expr: &LogicalExpr, required: &RequiredProperties) -> Vec<String> {
        let (_, expr_id) = self.memo.insert_group(expr.clone()).expect("Failed to copy an expression into a memo");
        let expr = self.memo.expr(&expr_id).expr();
        let ctx = RuleContext::new(&self.memo, &self.catalog, &self.options, required);

        assert!(self.rule.matches(&ctx, expr), "Rule does not match: {:?}. Expr: {}", self.rule, expr);

        match self.rule.apply(&ctx, expr) {
            Ok(results) => results.into_iter().map(format_rule_result).collect(),
            Err(e) => panic!("Failed to apply a rule. Rule: {:?}. Error: {}", self.rule, e),
        }
    }

    /// Applies the rule and compares its results with the expected ones.
    pub fn expect_apply<S>(&mut self, expr: &LogicalExpr, required: RequiredProperties, expected: Vec<S>)
    where
        S: AsRef<str>,
    {
        let actual = self.apply(expr, &required);
        let expected: Vec<&str> = expected.iter().map(|s| s.as_ref()).collect();

        assert_eq!(actual, expected, "Rule: {:?}. Required: {}", self.rule, required);
    }

    /// Expects the rule not to match the given expression.
    pub fn expect_no_match(&mut self, expr: &LogicalExpr) {
        let (_, expr_id) = self.memo.insert_group(expr.clone()).expect("Failed to copy an expression into a memo");
        let expr = self.memo.expr(&expr_id).expr();
        let required = RequiredProperties::none();
        let ctx = RuleContext::new(&self.memo, &self.catalog, &self.options, &required);

        assert!(!self.rule.matches(&ctx, expr), "Rule should not have matched. Rule: {:?} expr: {}", self.rule, expr);
    }

    /// The memo used by this tester.
    pub fn memo(&self) -> &Memo {
        &self.memo
    }
}

fn format_rule_result(result: RuleResult) -> String {
    match result {
        RuleResult::Substitute(expr) => format!("{}", expr),
        RuleResult::Implementation(alternative) => {
            format!("{} inputs=[{}]", alternative.op, alternative.inputs.iter().join(", "))
        }
    }
}
