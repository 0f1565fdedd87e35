//! This module contains the iterative graph comparator: the global
//! similarity algorithm built on the element matcher and the minimum-cost
//! assignment solver.
//!
//! The algorithm seeds a one-to-one node mapping from operator and
//! method-call nodes grouped by a coarse key, then grows it by propagation:
//! each newly mapped pair nominates its unmapped neighbors as candidates, a
//! frontier-restricted assignment accepts the best of them, and the process
//! repeats until no new pairs are produced. A final catch-all pass over the
//! remaining nodes recovers matches in disconnected components. The result is
//! a greedy, non-backtracking fixpoint — locally optimal per round, not
//! globally optimal overall, which is intentional: exact graph matching is
//! intractable at the sizes involved.

use std::collections::HashMap;

use bimap::BiHashMap;
use itertools::Itertools;
use petgraph::graph::NodeIndex;
use tracing::debug;

use crate::{
    algorithm::assignment::{CostMatrix, HungarianSolver, OptimalAssignment},
    compare::matcher,
    constant::DEFAULT_MATCH_THRESHOLD,
    graph::ExecutionGraph,
    memory::stack::Operator,
};

/// The outcome of comparing two execution graphs.
#[derive(Clone, Debug, PartialEq)]
pub struct ComparisonResult {
    /// The fraction of all nodes, across both graphs, that were mapped.
    pub union_sim: f64,

    /// The accepted node mapping, left index paired with right index.
    pub node_mappings: Vec<(NodeIndex, NodeIndex)>,

    /// The fraction of left-graph nodes that were mapped.
    pub lr_sim: f64,

    /// The fraction of right-graph nodes that were mapped.
    pub rl_sim: f64,

    /// The fraction of left-graph nodes left unmapped.
    pub l_disjoint: f64,

    /// The fraction of right-graph nodes left unmapped.
    pub r_disjoint: f64,
}

/// Compares two execution graphs.
///
/// Similarity denominators count *all* nodes, including degree-0 nodes,
/// matching the behavior the scores were calibrated against; comparing two
/// empty graphs yields full similarity vacuously.
#[must_use]
pub fn compare(lhs: &ExecutionGraph, rhs: &ExecutionGraph) -> ComparisonResult {
    Comparator::new(lhs, rhs).compare()
}

/// The coarse key used to seed candidate pairs.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
enum CandidateKey {
    Operator(Operator),
    Method(String),
}

struct Comparator<'a> {
    lhs: &'a ExecutionGraph,
    rhs: &'a ExecutionGraph,
    solver: HungarianSolver,

    /// Costs (1 − similarity) of the locally-scored seed candidates.
    seed_costs: HashMap<(NodeIndex, NodeIndex), f64>,

    /// The accepted one-to-one mapping.
    mapped: BiHashMap<NodeIndex, NodeIndex>,

    /// The mapping in acceptance order.
    mappings: Vec<(NodeIndex, NodeIndex)>,
}

impl<'a> Comparator<'a> {
    fn new(lhs: &'a ExecutionGraph, rhs: &'a ExecutionGraph) -> Self {
        Self {
            lhs,
            rhs,
            solver: HungarianSolver,
            seed_costs: HashMap::new(),
            mapped: BiHashMap::new(),
            mappings: Vec::new(),
        }
    }

    fn compare(mut self) -> ComparisonResult {
        self.score_seed_candidates();

        let mut last_mapped = self.select_seed_mapping();
        self.accept(&last_mapped);
        self.propagate(&mut last_mapped);

        // Catch-all pass for disconnected components, followed by another
        // round of propagation since new mappings can unlock further growth.
        let recovered = self.map_remaining();
        if !recovered.is_empty() {
            self.accept(&recovered);
            let mut frontier = recovered;
            self.propagate(&mut frontier);
        }

        debug!(
            lhs = %self.lhs.title,
            rhs = %self.rhs.title,
            mapped = self.mappings.len(),
            "graph comparison complete"
        );

        self.score()
    }

    //
    //  Step 1 + 2: candidate seeding and local scoring
    //

    /// Groups operator and method-call nodes on each side by a coarse key and
    /// locally scores every candidate pair whose key appears on both sides.
    fn score_seed_candidates(&mut self) {
        let left_groups = Self::group_by_key(self.lhs);
        let right_groups = Self::group_by_key(self.rhs);

        for (key, left_nodes) in &left_groups {
            let Some(right_nodes) = right_groups.get(key) else {
                continue;
            };

            for (&left, &right) in left_nodes.iter().cartesian_product(right_nodes) {
                let cost = self.local_cost(left, right);
                self.seed_costs.insert((left, right), cost);
            }
        }
    }

    fn group_by_key(graph: &ExecutionGraph) -> HashMap<CandidateKey, Vec<NodeIndex>> {
        let mut groups: HashMap<CandidateKey, Vec<NodeIndex>> = HashMap::new();
        for index in graph.node_indices() {
            let node = graph.node(index);
            let key = if node.is_operator() {
                node.operator.map(CandidateKey::Operator)
            } else if node.is_method_call() {
                node.signature
                    .as_ref()
                    .map(|signature| CandidateKey::Method(signature.to_string()))
            } else {
                None
            };
            if let Some(key) = key {
                groups.entry(key).or_default().push(index);
            }
        }
        groups
    }

    /// Scores one candidate pair by a local assignment over its incident
    /// edges: each edge pairing costs `1 − (edgeCompatible ×
    /// neighborCompatible)`, edges of differing orientation are
    /// incompatible, and the pair's similarity is the number of compatibly
    /// matched edges over the larger degree.
    fn local_cost(&self, left: NodeIndex, right: NodeIndex) -> f64 {
        let left_edges = self.lhs.incident_edges(left);
        let right_edges = self.rhs.incident_edges(right);

        if left_edges.is_empty() || right_edges.is_empty() {
            return 1.0;
        }

        let mut costs = CostMatrix::filled(left_edges.len(), right_edges.len());
        for (row, &(ledge, lneighbor, lout)) in left_edges.iter().enumerate() {
            for (column, &(redge, rneighbor, rout)) in right_edges.iter().enumerate() {
                if lout != rout {
                    continue;
                }
                let compatible = matcher::match_edges(ledge, redge)
                    && matcher::match_nodes(self.lhs, lneighbor, self.rhs, rneighbor);
                if compatible {
                    costs.set(row, column, 0.0);
                }
            }
        }

        let mut matched = 0;
        for (row, column) in self.solver.solve(&costs).into_iter().enumerate() {
            if let Some(column) = column {
                if costs.cost(row, column) < 1.0 {
                    matched += 1;
                }
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let similarity = matched as f64 / left_edges.len().max(right_edges.len()) as f64;
        1.0 - similarity
    }

    //
    //  Step 3: global seed selection
    //

    /// Runs one global assignment over the locally-scored candidates to
    /// select a mutually-best, one-to-one initial mapping.
    fn select_seed_mapping(&self) -> Vec<(NodeIndex, NodeIndex)> {
        let left_nodes: Vec<_> = self.lhs.node_indices().collect();
        let right_nodes: Vec<_> = self.rhs.node_indices().collect();
        if left_nodes.is_empty() || right_nodes.is_empty() {
            return Vec::new();
        }

        let mut costs = CostMatrix::filled(left_nodes.len(), right_nodes.len());
        for (row, left) in left_nodes.iter().enumerate() {
            for (column, right) in right_nodes.iter().enumerate() {
                if let Some(cost) = self.seed_costs.get(&(*left, *right)) {
                    costs.set(row, column, *cost);
                }
            }
        }

        self.solver
            .solve(&costs)
            .into_iter()
            .enumerate()
            .filter_map(|(row, column)| {
                let column = column?;
                let similarity = 1.0 - costs.cost(row, column);
                (similarity > 0.0).then(|| (left_nodes[row], right_nodes[column]))
            })
            .collect()
    }

    //
    //  Step 4: propagation fixpoint
    //

    /// Grows the mapping from the provided frontier until no round produces a
    /// new pair.
    fn propagate(&mut self, last_mapped: &mut Vec<(NodeIndex, NodeIndex)>) {
        while !last_mapped.is_empty() {
            let pairs = std::mem::take(last_mapped);

            let mut frontier_costs: HashMap<(NodeIndex, NodeIndex), f64> = HashMap::new();
            let mut left_frontier: Vec<NodeIndex> = Vec::new();
            let mut right_frontier: Vec<NodeIndex> = Vec::new();

            for (left, right) in pairs {
                for (ledge, lneighbor, lout) in self.lhs.incident_edges(left) {
                    if self.mapped.contains_left(&lneighbor) {
                        continue;
                    }
                    if !left_frontier.contains(&lneighbor) {
                        left_frontier.push(lneighbor);
                    }

                    for (redge, rneighbor, rout) in self.rhs.incident_edges(right) {
                        if self.mapped.contains_right(&rneighbor) {
                            continue;
                        }
                        if !right_frontier.contains(&rneighbor) {
                            right_frontier.push(rneighbor);
                        }

                        if lout != rout {
                            continue;
                        }

                        let edge_compatible = matcher::match_edges(ledge, redge);
                        let node_compatible =
                            matcher::match_nodes(self.lhs, lneighbor, self.rhs, rneighbor);
                        let similarity =
                            f64::from(u8::from(edge_compatible && node_compatible)).min(1.0);
                        frontier_costs.insert((lneighbor, rneighbor), 1.0 - similarity);
                    }
                }
            }

            if left_frontier.is_empty() || right_frontier.is_empty() {
                continue;
            }

            let mut costs = CostMatrix::filled(left_frontier.len(), right_frontier.len());
            for (row, left) in left_frontier.iter().enumerate() {
                for (column, right) in right_frontier.iter().enumerate() {
                    if let Some(cost) = frontier_costs.get(&(*left, *right)) {
                        costs.set(row, column, *cost);
                    }
                }
            }

            let accepted: Vec<_> = self
                .solver
                .solve(&costs)
                .into_iter()
                .enumerate()
                .filter_map(|(row, column)| {
                    let column = column?;
                    let similarity = 1.0 - costs.cost(row, column);
                    (similarity > 0.0).then(|| (left_frontier[row], right_frontier[column]))
                })
                .collect();

            self.accept(&accepted);
            *last_mapped = accepted;
        }
    }

    //
    //  Step 5: catch-all pass
    //

    /// Maps still-unmapped nodes with a coarse compatible/incompatible cost,
    /// accepting matches above the configured threshold. This recovers
    /// matches in components the propagation never reached.
    fn map_remaining(&mut self) -> Vec<(NodeIndex, NodeIndex)> {
        let unmapped_left: Vec<_> = self
            .lhs
            .node_indices()
            .filter(|index| !self.mapped.contains_left(index))
            .collect();
        let unmapped_right: Vec<_> = self
            .rhs
            .node_indices()
            .filter(|index| !self.mapped.contains_right(index))
            .collect();

        if unmapped_left.is_empty() || unmapped_right.is_empty() {
            return Vec::new();
        }

        let mut costs = CostMatrix::filled(unmapped_left.len(), unmapped_right.len());
        for (row, left) in unmapped_left.iter().enumerate() {
            for (column, right) in unmapped_right.iter().enumerate() {
                if matcher::match_nodes(self.lhs, *left, self.rhs, *right) {
                    costs.set(row, column, 0.0);
                }
            }
        }

        self.solver
            .solve_with_threshold(&costs, DEFAULT_MATCH_THRESHOLD)
            .into_iter()
            .map(|accepted| (unmapped_left[accepted.row], unmapped_right[accepted.column]))
            .collect()
    }

    //
    //  Bookkeeping and scoring
    //

    fn accept(&mut self, pairs: &[(NodeIndex, NodeIndex)]) {
        for (left, right) in pairs {
            self.mapped.insert(*left, *right);
            self.mappings.push((*left, *right));
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn score(self) -> ComparisonResult {
        let left_total = self.lhs.node_count();
        let right_total = self.rhs.node_count();
        let left_mapped = self.mapped.len();
        let right_mapped = self.mapped.len();

        let ratio = |mapped: usize, total: usize, empty: f64| {
            if total == 0 {
                empty
            } else {
                mapped as f64 / total as f64
            }
        };

        let union_sim = if left_total + right_total == 0 {
            1.0
        } else {
            (left_mapped + right_mapped) as f64 / (left_total + right_total) as f64
        };

        ComparisonResult {
            union_sim,
            lr_sim: ratio(left_mapped, left_total, 1.0),
            rl_sim: ratio(right_mapped, right_total, 1.0),
            l_disjoint: ratio(left_total - left_mapped, left_total, 0.0),
            r_disjoint: ratio(right_total - right_mapped, right_total, 0.0),
            node_mappings: self.mappings,
        }
    }
}
