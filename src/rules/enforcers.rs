//! Physical properties delivered by physical operators and enforcers of physical properties.

use crate::catalog::TableDistribution;
use crate::error::OptimizerError;
use crate::meta::ColumnId;
use crate::operators::join::JoinType;
use crate::operators::physical::PhysicalOp;
use crate::operators::scalar::ScalarExpr;
use crate::properties::{Distribution, OrderingChoice, PropertySet, RequiredProperties};
use crate::rules::implementation::preserves_left_ordering;
use crate::rules::RuleContext;

/// Computes physical properties delivered by the given operator from the properties delivered by its inputs.
pub fn derive_properties(
    ctx: &RuleContext,
    op: &PhysicalOp,
    inputs: &[&PropertySet],
) -> Result<PropertySet, OptimizerError> {
    let expected_inputs = match op {
        PhysicalOp::Scan { .. } | PhysicalOp::IndexScan { .. } | PhysicalOp::CteScan { .. } => 0,
        PhysicalOp::HashJoin { .. }
        | PhysicalOp::MergeJoin { .. }
        | PhysicalOp::NestedLoopJoin { .. }
        | PhysicalOp::HashSetOp { .. } => 2,
        _ => 1,
    };
    if inputs.len() != expected_inputs {
        let message = format!("{} expects {} inputs but got {}", op.name(), expected_inputs, inputs.len());
        return Err(OptimizerError::internal(message));
    }

    let properties = match op {
        PhysicalOp::Scan { source, columns } => PropertySet::new(None, scan_distribution(ctx, source, columns)),
        PhysicalOp::IndexScan {
            source,
            columns,
            ordering,
            ..
        } => PropertySet::new(Some(ordering.clone()), scan_distribution(ctx, source, columns)),
        PhysicalOp::Filter { .. } | PhysicalOp::Limit { .. } | PhysicalOp::Window { .. } => inputs[0].clone(),
        PhysicalOp::Projection { exprs, columns } => {
            let (source, output): (Vec<ColumnId>, Vec<ColumnId>) = exprs
                .iter()
                .zip(columns.iter())
                .filter_map(|(expr, col)| match expr {
                    ScalarExpr::Column(input) => Some((*input, *col)),
                    _ => None,
                })
                .unzip();
            let input = inputs[0];
            let ordering = input.ordering().and_then(|o| o.with_mapping(&source, &output));
            PropertySet::new(ordering, input.distribution().with_mapping(&source, &output))
        }
        PhysicalOp::HashJoin { join_type, .. } => {
            let distribution = join_distribution(join_type, inputs[0].distribution(), inputs[1].distribution());
            PropertySet::new(None, distribution)
        }
        PhysicalOp::MergeJoin {
            join_type, left_keys, ..
        } => {
            let distribution = join_distribution(join_type, inputs[0].distribution(), inputs[1].distribution());
            let ordering = if preserves_left_ordering(join_type) {
                Some(OrderingChoice::from_columns(left_keys.clone()))
            } else {
                None
            };
            PropertySet::new(ordering, distribution)
        }
        PhysicalOp::NestedLoopJoin { join_type, .. } => {
            let distribution = join_distribution(join_type, inputs[0].distribution(), inputs[1].distribution());
            let ordering = if preserves_left_ordering(join_type) {
                inputs[0].ordering().cloned()
            } else {
                None
            };
            PropertySet::new(ordering, distribution)
        }
        PhysicalOp::HashAggregate { group_exprs, .. } => {
            PropertySet::new(None, aggregate_distribution(inputs[0].distribution(), group_exprs))
        }
        PhysicalOp::StreamingAggregate { group_exprs, .. } => {
            let ordering = inputs[0].ordering().and_then(|o| o.prefix_within(group_exprs));
            PropertySet::new(ordering, aggregate_distribution(inputs[0].distribution(), group_exprs))
        }
        PhysicalOp::HashSetOp {
            left_columns, columns, ..
        } => PropertySet::new(None, inputs[0].distribution().with_mapping(left_columns, columns)),
        PhysicalOp::CteScan { .. } => PropertySet::singleton(),
        PhysicalOp::Sort { ordering } => inputs[0].with_ordering(Some(ordering.clone())),
        PhysicalOp::Gather => PropertySet::singleton(),
        PhysicalOp::Redistribute { keys } => PropertySet::new(None, Distribution::Hash(keys.clone())),
        PhysicalOp::Broadcast => PropertySet::new(None, Distribution::Replicated),
    };
    Ok(properties)
}

/// Returns enforcers that must be placed on top of an operator that delivers the `delivered` properties
/// in order to satisfy the `required` properties. Enforcers are returned bottom-up:
/// a distribution enforcer is followed by a sort. Returns an empty vector when no enforcers are needed.
pub fn required_enforcers(
    delivered: &PropertySet,
    required: &RequiredProperties,
) -> Result<Vec<PhysicalOp>, OptimizerError> {
    let mut enforcers = Vec::new();

    if !delivered.distribution_satisfies(required) {
        let enforcer = match required.distribution() {
            Some(Distribution::Singleton) => PhysicalOp::Gather,
            Some(Distribution::Hash(keys)) => PhysicalOp::Redistribute { keys: keys.clone() },
            Some(Distribution::Replicated) => PhysicalOp::Broadcast,
            Some(other) => {
                return Err(OptimizerError::unsupported(format!("No enforcer for distribution: {}", other)));
            }
            None => return Err(OptimizerError::internal("Distribution is not required")),
        };
        enforcers.push(enforcer);
    }

    // Exchanges do not preserve ordering.
    if let Some(ordering) = required.ordering() {
        if !enforcers.is_empty() || !delivered.ordering_satisfies(required) {
            enforcers.push(PhysicalOp::Sort {
                ordering: ordering.clone(),
            });
        }
    }

    Ok(enforcers)
}

/// Checks whether an operator produces correct results when its inputs are placed across workers
/// according to the given distributions.
///
/// A replicated input satisfies every distribution requirement, but when only one input of a join
/// is replicated the rows of that input that have no matches must not be returned by every worker.
pub fn accepts_input_distributions(op: &PhysicalOp, inputs: &[&Distribution]) -> bool {
    match (op, inputs) {
        (PhysicalOp::HashSetOp { .. }, [left, right]) => {
            matches!(left, Distribution::Replicated) == matches!(right, Distribution::Replicated)
        }
        (op, [left, right]) => match op.join_type() {
            Some(join_type) => match (left, right) {
                (Distribution::Replicated, Distribution::Replicated) => true,
                (Distribution::Replicated, _) => matches!(join_type, JoinType::Inner | JoinType::Cross | JoinType::Right),
                (_, Distribution::Replicated) => join_type.can_broadcast_right(),
                _ => true,
            },
            None => true,
        },
        _ => true,
    }
}

fn scan_distribution(ctx: &RuleContext, source: &str, columns: &[ColumnId]) -> Distribution {
    if !ctx.options().is_distributed() {
        return Distribution::Singleton;
    }
    let table = match ctx.catalog().get_table(source) {
        Some(table) => table,
        None => return Distribution::Any,
    };
    match table.distribution() {
        TableDistribution::Singleton => Distribution::Singleton,
        TableDistribution::Replicated => Distribution::Replicated,
        TableDistribution::RoundRobin => Distribution::RoundRobin,
        TableDistribution::Hash(names) => {
            let metadata = ctx.metadata();
            let keys: Option<Vec<_>> = names
                .iter()
                .map(|name| {
                    columns
                        .iter()
                        .find(|id| metadata.try_get_column(id).map(|c| c.name() == name).unwrap_or_default())
                        .copied()
                })
                .collect();
            keys.map(Distribution::Hash).unwrap_or(Distribution::Any)
        }
    }
}

fn join_distribution(join_type: &JoinType, left: &Distribution, right: &Distribution) -> Distribution {
    match (left, right) {
        (Distribution::Singleton, Distribution::Singleton) => Distribution::Singleton,
        (Distribution::Replicated, Distribution::Replicated) => Distribution::Replicated,
        (left, Distribution::Replicated) => left.clone(),
        (Distribution::Replicated, right) => right.clone(),
        (Distribution::Hash(left), Distribution::Hash(right)) => match join_type {
            JoinType::Right => Distribution::Hash(right.clone()),
            JoinType::Full => Distribution::Any,
            _ => Distribution::Hash(left.clone()),
        },
        _ => Distribution::Any,
    }
}

fn aggregate_distribution(input: &Distribution, group_exprs: &[ColumnId]) -> Distribution {
    match input {
        Distribution::Singleton | Distribution::Replicated => input.clone(),
        Distribution::Hash(_) if !group_exprs.is_empty() => Distribution::Hash(group_exprs.to_vec()),
        _ => Distribution::Any,
    }
}
