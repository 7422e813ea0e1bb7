//! Dynamic programming over connected subgraphs and their complements (DPccp).
//!
//! Every connected subgraph `S1` is paired with every connected subgraph `S2` adjacent to it such that
//! `S1` and `S2` are disjoint. Each pair is enumerated exactly once so no cross products are ever considered
//! for a connected graph.

use crate::error::OptimizerError;
use crate::joins::{finish_steps, EnumerationContext, JoinEnumerator, JoinGraph, JoinStep, RelSet};

/// Enumerates all bushy join trees of a join graph without cross products.
/// A disconnected graph is treated as a clique when cross joins are allowed.
#[derive(Debug, Default)]
pub struct DPccp;

impl JoinEnumerator for DPccp {
    fn name(&self) -> &'static str {
        "DPccp"
    }

    fn enumerate(&self, graph: &JoinGraph, ctx: &EnumerationContext) -> Result<Option<Vec<JoinStep>>, OptimizerError> {
        let n = graph.num_relations();
        if n < 2 {
            return Ok(Some(Vec::new()));
        }
        let cross_products = !graph.is_connected(graph.all());
        if cross_products && !ctx.allow_cross_joins {
            log::debug!("DPccp: join graph is not connected and cross joins are disabled");
            return Ok(None);
        }

        let mut enumeration = Enumeration {
            graph,
            complete: cross_products,
            steps: Vec::new(),
        };
        for v in (0..n).rev() {
            ctx.check_deadline()?;

            let start = RelSet::single(v);
            enumeration.emit_csg(start);
            enumeration.enumerate_csg_rec(start, RelSet::first(v + 1));
        }

        log::debug!("DPccp: {} relations, {} steps", n, enumeration.steps.len());

        Ok(finish_steps(graph, enumeration.steps))
    }
}

struct Enumeration<'a> {
    graph: &'a JoinGraph,
    complete: bool,
    steps: Vec<JoinStep>,
}

impl Enumeration<'_> {
    fn neighbours(&self, set: RelSet, excluded: RelSet) -> RelSet {
        if self.complete {
            self.graph.all().difference(set).difference(excluded)
        } else {
            self.graph.neighbours(set, excluded)
        }
    }

    // Extends a connected subgraph with its neighbours that are not excluded.
    fn enumerate_csg_rec(&mut self, set: RelSet, excluded: RelSet) {
        let neighbours = self.neighbours(set, excluded);
        for subset in neighbours.subsets() {
            self.emit_csg(set.union(subset));
        }
        let excluded = excluded.union(neighbours);
        for subset in neighbours.subsets() {
            self.enumerate_csg_rec(set.union(subset), excluded);
        }
    }

    // Finds all complements of the given connected subgraph.
    fn emit_csg(&mut self, set: RelSet) {
        let min = match set.lowest() {
            Some(min) => min,
            None => return,
        };
        let excluded = set.union(RelSet::first(min + 1));
        let neighbours = self.neighbours(set, excluded);
        let candidates: Vec<usize> = neighbours.iter().collect();

        for v in candidates.into_iter().rev() {
            let other = RelSet::single(v);
            self.emit_pair(set, other);

            let excluded = excluded.union(RelSet::first(v + 1).intersection(neighbours));
            self.enumerate_cmp_rec(set, other, excluded);
        }
    }

    fn enumerate_cmp_rec(&mut self, left: RelSet, right: RelSet, excluded: RelSet) {
        let neighbours = self.neighbours(right, excluded);
        for subset in neighbours.subsets() {
            self.emit_pair(left, right.union(subset));
        }
        let excluded = excluded.union(neighbours);
        for subset in neighbours.subsets() {
            self.enumerate_cmp_rec(left, right.union(subset), excluded);
        }
    }

    fn emit_pair(&mut self, left: RelSet, right: RelSet) {
        self.steps.push(self.graph.step(left, right));
        self.steps.push(self.graph.step(right, left));
    }
}
