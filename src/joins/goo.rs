//! Greedy operator ordering.

use crate::error::OptimizerError;
use crate::joins::{EnumerationContext, JoinEnumerator, JoinGraph, JoinStep, RelSet};

/// Repeatedly joins the pair of subtrees that produces the smallest intermediate result.
/// Pairs connected by a predicate are always preferred to cross products.
/// Produces a single join tree (in both orders of inputs at every step).
#[derive(Debug, Default)]
pub struct GreedyOperatorOrdering;

impl JoinEnumerator for GreedyOperatorOrdering {
    fn name(&self) -> &'static str {
        "GOO"
    }

    fn enumerate(&self, graph: &JoinGraph, ctx: &EnumerationContext) -> Result<Option<Vec<JoinStep>>, OptimizerError> {
        let mut trees: Vec<RelSet> = (0..graph.num_relations()).map(RelSet::single).collect();
        let mut steps = Vec::new();

        while trees.len() > 1 {
            ctx.check_deadline()?;

            let (i, j) = match find_minimum_cost_pair(graph, &trees, ctx.allow_cross_joins) {
                Some(pair) => pair,
                None => {
                    log::debug!("GOO: join graph is not connected and cross joins are disabled");
                    return Ok(None);
                }
            };
            let (left, right) = (trees[i], trees[j]);
            steps.push(graph.step(left, right));
            steps.push(graph.step(right, left));

            trees[i] = left.union(right);
            trees.swap_remove(j);
        }

        Ok(Some(steps))
    }
}

fn find_minimum_cost_pair(graph: &JoinGraph, trees: &[RelSet], allow_cross_joins: bool) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, bool, f64)> = None;

    for i in 0..trees.len() {
        for j in i + 1..trees.len() {
            let connected = graph.connects(trees[i], trees[j]);
            if !connected && !allow_cross_joins {
                continue;
            }
            let rows = graph.cardinality(trees[i].union(trees[j]));
            let better = match best {
                None => true,
                Some((_, _, best_connected, best_rows)) => {
                    (connected && !best_connected) || (connected == best_connected && rows < best_rows)
                }
            };
            if better {
                best = Some((i, j, connected, rows));
            }
        }
    }

    best.map(|(i, j, _, _)| (i, j))
}
