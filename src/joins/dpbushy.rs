//! Dynamic programming over all splits of every subset of relations.

use std::collections::HashSet;

use crate::error::OptimizerError;
use crate::joins::{finish_steps, EnumerationContext, GreedyOperatorOrdering, JoinEnumerator, JoinGraph, JoinStep, RelSet};

/// The maximum number of relations ordered by [DPBushy]. Larger graphs are ordered greedily.
pub const MAX_BUSHY_RELATIONS: usize = 16;

/// Considers every pair of disjoint subsets whose union is a subset being planned.
/// Unlike [DPccp](super::DPccp) the subsets of a pair are not required to be connected subgraphs, so
/// pairs of unconnected subsets are joined by cross products when cross joins are allowed.
#[derive(Debug, Default)]
pub struct DPBushy;

impl JoinEnumerator for DPBushy {
    fn name(&self) -> &'static str {
        "DPBushy"
    }

    fn enumerate(&self, graph: &JoinGraph, ctx: &EnumerationContext) -> Result<Option<Vec<JoinStep>>, OptimizerError> {
        let n = graph.num_relations();
        if n < 2 {
            return Ok(Some(Vec::new()));
        }
        if n > MAX_BUSHY_RELATIONS {
            log::debug!("DPBushy: {} relations exceed the limit of {}. Using greedy ordering", n, MAX_BUSHY_RELATIONS);
            return GreedyOperatorOrdering.enumerate(graph, ctx);
        }
        if !ctx.allow_cross_joins && !graph.is_connected(graph.all()) {
            log::debug!("DPBushy: join graph is not connected and cross joins are disabled");
            return Ok(None);
        }

        let mut by_size: Vec<Vec<RelSet>> = vec![Vec::new(); n + 1];
        for set in graph.all().subsets() {
            by_size[set.len()].push(set);
        }

        let mut available: HashSet<RelSet> = (0..n).map(RelSet::single).collect();
        let mut steps = Vec::new();

        for sets in by_size.iter().skip(2) {
            ctx.check_deadline()?;

            for set in sets {
                let mut produced = false;
                for left in set.subsets().filter(|s| s != set) {
                    let right = set.difference(left);
                    if !available.contains(&left) || !available.contains(&right) {
                        continue;
                    }
                    if !ctx.allow_cross_joins && !graph.connects(left, right) {
                        continue;
                    }
                    steps.push(graph.step(left, right));
                    produced = true;
                }
                if produced {
                    available.insert(*set);
                }
            }
        }

        log::debug!("DPBushy: {} relations, {} steps", n, steps.len());

        Ok(finish_steps(graph, steps))
    }
}
