// Transfer graph: routes a resource between two locations by finding the
// cheapest chain of transfer templates, breaking ties deterministically so
// the same topology always plans the same route.
//
// Edges are never read off a template's own fields - a template has no
// notion of "its" source or target. Instead, for every pair of distinct
// locations and every template, an edge exists iff both locations carry a
// `reference` entry for the template's node - the same rule
// `transfer_planner.py::_can_transfer_between_locations` uses
// (`template.node_name in source.representations and ... in dest.representations`).
// This is what keeps the graph honest when the topology changes: add a
// `reference` entry to a location and every template naming that node
// routes through it automatically, with no template to hand-edit.

use std::collections::HashMap;

use petgraph::algo::dijkstra;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::{Result, WorkcellError};
use crate::models::{Location, TransferTemplate};

/// One hop in a planned transfer: which node executes it and between which
/// locations (by location id).
#[derive(Debug, Clone, PartialEq)]
pub struct TransferHop {
    pub template_name: String,
    pub node_name: String,
    pub action_name: String,
    pub source_arg_name: String,
    pub target_arg_name: String,
    pub from_location: String,
    pub to_location: String,
    pub cost: f64,
}

/// A fully planned multi-hop transfer, in dispatch order.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferPlan {
    pub hops: Vec<TransferHop>,
    pub total_cost: f64,
}

/// Built fresh from a workcell's current locations and transfer templates
/// whenever a transfer needs planning - locations (and the resources and
/// reservations moving through them) change far more often than templates,
/// so unlike a static topology graph this one is cheap to rebuild per plan
/// rather than cached.
pub struct TransferGraph {
    graph: DiGraph<String, TransferHop>,
    index_of: HashMap<String, NodeIndex>,
}

impl TransferGraph {
    pub fn build(locations: &HashMap<String, Location>, templates: &[TransferTemplate]) -> Self {
        let mut graph = DiGraph::new();
        let mut index_of: HashMap<String, NodeIndex> = HashMap::new();

        let ids: Vec<&String> = locations.keys().collect();
        for template in templates {
            for &source_id in &ids {
                for &dest_id in &ids {
                    if source_id == dest_id {
                        continue;
                    }
                    let source = &locations[source_id];
                    let dest = &locations[dest_id];
                    if !can_transfer_between(source, dest, template) {
                        continue;
                    }

                    let from = *index_of
                        .entry(source_id.clone())
                        .or_insert_with(|| graph.add_node(source_id.clone()));
                    let to = *index_of
                        .entry(dest_id.clone())
                        .or_insert_with(|| graph.add_node(dest_id.clone()));
                    graph.add_edge(
                        from,
                        to,
                        TransferHop {
                            template_name: template.template_name.clone(),
                            node_name: template.node_name.clone(),
                            action_name: template.action_name.clone(),
                            source_arg_name: template.source_arg_name.clone(),
                            target_arg_name: template.target_arg_name.clone(),
                            from_location: source_id.clone(),
                            to_location: dest_id.clone(),
                            cost: template.cost_weight,
                        },
                    );
                }
            }
        }

        Self { graph, index_of }
    }

    /// Shortest (by summed cost_weight) chain of hops from `from` to `to`,
    /// by location id. Ties break first on fewest hops, then
    /// lexicographically on the smaller node name at each hop, so replanning
    /// the same request always yields the same route.
    pub fn plan(&self, from: &str, to: &str) -> Result<TransferPlan> {
        let not_found = || WorkcellError::NoTransferPath { from: from.to_string(), to: to.to_string() };
        let start = self.index_of.get(from).copied().ok_or_else(not_found)?;
        let goal = self.index_of.get(to).copied().ok_or_else(not_found)?;

        if start == goal {
            return Ok(TransferPlan { hops: Vec::new(), total_cost: 0.0 });
        }

        let costs = dijkstra(&self.graph, start, Some(goal), |e| e.weight().cost);
        if !costs.contains_key(&goal) {
            return Err(not_found());
        }

        // Reconstruct the path by walking backward from `goal`, at each step
        // choosing the predecessor edge whose cost lines up with the running
        // total and, among ties, the one naming the lexicographically
        // smaller node.
        let mut path_nodes = vec![goal];
        let mut current = goal;
        while current != start {
            let current_cost = costs[&current];
            let mut candidates: Vec<(NodeIndex, &TransferHop)> = self
                .graph
                .edges_directed(current, petgraph::Direction::Incoming)
                .filter_map(|e| {
                    let predecessor = e.source();
                    let predecessor_cost = *costs.get(&predecessor)?;
                    if (predecessor_cost + e.weight().cost - current_cost).abs() < f64::EPSILON {
                        Some((predecessor, e.weight()))
                    } else {
                        None
                    }
                })
                .collect();
            candidates.sort_by(|a, b| a.1.node_name.cmp(&b.1.node_name));
            let (predecessor, _) = candidates
                .into_iter()
                .next()
                .ok_or_else(|| WorkcellError::Internal("broken transfer path reconstruction".into()))?;
            path_nodes.push(predecessor);
            current = predecessor;
        }
        path_nodes.reverse();

        let mut hops = Vec::new();
        for window in path_nodes.windows(2) {
            let (a, b) = (window[0], window[1]);
            let mut edges_between: Vec<&TransferHop> =
                self.graph.edges_connecting(a, b).map(|e| e.weight()).collect();
            edges_between.sort_by(|x, y| {
                x.cost
                    .partial_cmp(&y.cost)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| x.node_name.cmp(&y.node_name))
            });
            let chosen = edges_between
                .into_iter()
                .next()
                .ok_or_else(|| WorkcellError::Internal("broken transfer path reconstruction".into()))?;
            hops.push(chosen.clone());
        }

        let total_cost = hops.iter().map(|h| h.cost).sum();
        Ok(TransferPlan { hops, total_cost })
    }

    /// All locations reachable from `from`, with their cheapest cost - used
    /// by the Ingress API's transfer-options diagnostic endpoint.
    pub fn reachable_from(&self, from: &str) -> HashMap<String, f64> {
        let Some(&start) = self.index_of.get(from) else {
            return HashMap::new();
        };
        let costs = dijkstra(&self.graph, start, None, |e| e.weight().cost);
        costs
            .into_iter()
            .filter(|(node, _)| *node != start)
            .map(|(node, cost)| (self.graph[node].clone(), cost))
            .collect()
    }

    pub fn validate_request(&self, from: &str, to: &str) -> Result<()> {
        self.plan(from, to).map(|_| ())
    }
}

fn can_transfer_between(source: &Location, dest: &Location, template: &TransferTemplate) -> bool {
    if source.reference.is_empty() || dest.reference.is_empty() {
        return false;
    }
    source.reference.contains_key(&template.node_name) && dest.reference.contains_key(&template.node_name)
}
