//! The RuleLink/OptionLink graph built over an unsat core.
//!
//! Rules and options are nodes in one petgraph arena. An option points at
//! every rule that reads from it; a rule points at every option it can
//! constrain. Negated literals never appear: rules report plain options.

use std::collections::BTreeMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::solver::{OptionId, ResolutionContext, RuleId, UnsatCore};

/// A node of the diagnosis graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Link {
    Rule(RuleId),
    Option(OptionId),
}

/// Serializable form of a [`DiagnosisGraph`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Nodes in arena order
    pub nodes: Vec<Link>,
    /// Edges as (from, to) arena indices
    pub edges: Vec<(usize, usize)>,
}

/// Bipartite rule/option graph for one failed solve.
#[derive(Debug, Clone, Default)]
pub struct DiagnosisGraph {
    graph: DiGraph<Link, ()>,
    nodes: BTreeMap<Link, NodeIndex>,
}

impl DiagnosisGraph {
    /// Build the graph for the rules of an unsat core.
    pub fn build(core: &UnsatCore, context: &ResolutionContext) -> Self {
        let mut graph = DiagnosisGraph::default();

        for &rule_id in core.rules() {
            let Some(rule) = context.rule(rule_id) else {
                continue;
            };
            let rule_node = graph.node(Link::Rule(rule_id));

            for option in rule.nodes_from() {
                let option_node = graph.node(Link::Option(option));
                graph.graph.update_edge(option_node, rule_node, ());
            }
            for option in rule.nodes_to() {
                let option_node = graph.node(Link::Option(option));
                graph.graph.update_edge(rule_node, option_node, ());
            }
        }

        graph
    }

    fn node(&mut self, link: Link) -> NodeIndex {
        if let Some(index) = self.nodes.get(&link) {
            return *index;
        }
        let index = self.graph.add_node(link);
        self.nodes.insert(link, index);
        index
    }

    /// Rules not gated by any option, in id order.
    pub fn roots(&self) -> Vec<RuleId> {
        self.nodes
            .iter()
            .filter_map(|(link, index)| match link {
                Link::Rule(rule) => self
                    .graph
                    .neighbors_directed(*index, Direction::Incoming)
                    .next()
                    .is_none()
                    .then_some(*rule),
                Link::Option(_) => None,
            })
            .collect()
    }

    /// Every rule in the graph, in id order.
    pub fn rules(&self) -> Vec<RuleId> {
        self.nodes
            .keys()
            .filter_map(|link| match link {
                Link::Rule(rule) => Some(*rule),
                Link::Option(_) => None,
            })
            .collect()
    }

    /// Rules reading from an option, in id order.
    pub fn rules_from(&self, option: OptionId) -> Vec<RuleId> {
        let mut rules: Vec<RuleId> = self
            .neighbors(Link::Option(option), Direction::Outgoing)
            .filter_map(|link| match link {
                Link::Rule(rule) => Some(rule),
                Link::Option(_) => None,
            })
            .collect();
        rules.sort();
        rules
    }

    /// Options a rule points at, in id order.
    pub fn targets_of(&self, rule: RuleId) -> Vec<OptionId> {
        let mut options: Vec<OptionId> = self
            .neighbors(Link::Rule(rule), Direction::Outgoing)
            .filter_map(|link| match link {
                Link::Option(option) => Some(option),
                Link::Rule(_) => None,
            })
            .collect();
        options.sort();
        options
    }

    fn neighbors(&self, link: Link, direction: Direction) -> impl Iterator<Item = Link> + '_ {
        self.nodes
            .get(&link)
            .into_iter()
            .flat_map(move |index| self.graph.neighbors_directed(*index, direction))
            .map(|index| self.graph[index])
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.graph.node_weights().copied().collect(),
            edges: self
                .graph
                .raw_edges()
                .iter()
                .map(|edge| (edge.source().index(), edge.target().index()))
                .collect(),
        }
    }

    /// Rebuild a graph from a snapshot, keeping arena order.
    pub fn from_snapshot(snapshot: &GraphSnapshot) -> Self {
        let mut graph = DiagnosisGraph::default();
        let indices: Vec<NodeIndex> = snapshot.nodes.iter().map(|link| graph.node(*link)).collect();

        for &(from, to) in &snapshot.edges {
            if let (Some(from), Some(to)) = (indices.get(from), indices.get(to)) {
                graph.graph.update_edge(*from, *to, ());
            }
        }
        graph
    }
}
