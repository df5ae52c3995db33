//! Workflow graph: agents as nodes, dependency edges between them.
//!
//! The graph is assembled through [`GraphBuilder`] and validated as a whole
//! by `build()`, which returns an immutable [`FlowGraph`]. Validation covers
//! cycles, dangling edges, the existence of at least one entry node, and
//! every filter rule's source selector.

use crate::error::{Error, Result};
use crate::filter::FilterSet;
use crate::transcript::AgentId;
use crate::worker::WorkerRef;
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;

/// A single agent node: identity, worker capability, and what it may see.
pub struct AgentNode {
    pub id: AgentId,
    pub worker: WorkerRef,
    pub filters: FilterSet,
}

/// Builder for a workflow graph.
///
/// Nodes and edges are collected without validation; `build()` validates the
/// whole topology at once so a misconfigured workflow fails before any run
/// starts.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<AgentNode>,
    edges: Vec<(AgentId, AgentId)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an agent with its worker capability and filter rules.
    pub fn add_agent(
        mut self,
        id: impl Into<AgentId>,
        worker: WorkerRef,
        filters: FilterSet,
    ) -> Self {
        self.nodes.push(AgentNode {
            id: id.into(),
            worker,
            filters,
        });
        self
    }

    /// Add a dependency edge: `from` must complete before `to` may start.
    pub fn add_edge(mut self, from: impl Into<AgentId>, to: impl Into<AgentId>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Validate the topology and produce an immutable [`FlowGraph`].
    pub fn build(self) -> Result<FlowGraph> {
        let mut graph: DiGraph<AgentNode, ()> = DiGraph::new();
        let mut index: HashMap<AgentId, NodeIndex> = HashMap::new();

        for node in self.nodes {
            if index.contains_key(&node.id) {
                return Err(Error::DuplicateAgent(node.id));
            }
            let id = node.id.clone();
            let node_index = graph.add_node(node);
            index.insert(id, node_index);
        }

        for (from, to) in self.edges {
            let from_index = *index
                .get(&from)
                .ok_or_else(|| Error::DanglingEdge(from.clone()))?;
            let to_index = *index
                .get(&to)
                .ok_or_else(|| Error::DanglingEdge(to.clone()))?;
            graph.add_edge(from_index, to_index, ());
        }

        // Checked before the cycle test: a graph where every node has a
        // predecessor has no starting point, whatever else is wrong with it.
        if graph.node_count() > 0
            && graph.node_indices().all(|n| {
                graph
                    .neighbors_directed(n, petgraph::Direction::Incoming)
                    .next()
                    .is_some()
            })
        {
            return Err(Error::NoEntryNode);
        }

        if is_cyclic_directed(&graph) {
            // toposort names a node on the cycle for the error message.
            let culprit = toposort(&graph, None)
                .err()
                .map(|cycle| graph[cycle.node_id()].id.clone())
                .unwrap_or_else(AgentId::user);
            return Err(Error::Cycle(culprit));
        }

        // Every filter selector must name a node in the graph or the
        // reserved external input, and take at least one message.
        for node_index in graph.node_indices() {
            let node = &graph[node_index];
            for rule in node.filters.rules() {
                if !rule.source.is_user() && !index.contains_key(&rule.source) {
                    return Err(Error::UnknownFilterSource {
                        agent: node.id.clone(),
                        selector: rule.source.clone(),
                    });
                }
                if rule.count == 0 {
                    return Err(Error::ZeroFilterCount {
                        agent: node.id.clone(),
                        selector: rule.source.clone(),
                    });
                }
            }
        }

        Ok(FlowGraph { graph, index })
    }
}

/// Immutable, validated workflow graph.
pub struct FlowGraph {
    graph: DiGraph<AgentNode, ()>,
    index: HashMap<AgentId, NodeIndex>,
}

impl FlowGraph {
    /// Number of agents in the graph.
    pub fn agent_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All agent ids, in insertion order.
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.graph.node_weights().map(|n| n.id.clone()).collect()
    }

    /// Whether the graph contains an agent.
    pub fn contains(&self, id: &AgentId) -> bool {
        self.index.contains_key(id)
    }

    /// Agents with no predecessors, sorted by id for deterministic dispatch.
    pub fn entry_agents(&self) -> Vec<AgentId> {
        let mut entries: Vec<AgentId> = self
            .graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, petgraph::Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|n| self.graph[n].id.clone())
            .collect();
        entries.sort();
        entries
    }

    /// Predecessor ids of an agent.
    pub fn predecessors(&self, id: &AgentId) -> Vec<AgentId> {
        self.neighbors(id, petgraph::Direction::Incoming)
    }

    /// Successor ids of an agent.
    pub fn successors(&self, id: &AgentId) -> Vec<AgentId> {
        self.neighbors(id, petgraph::Direction::Outgoing)
    }

    fn neighbors(&self, id: &AgentId, direction: petgraph::Direction) -> Vec<AgentId> {
        let Some(&node_index) = self.index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<AgentId> = self
            .graph
            .neighbors_directed(node_index, direction)
            .map(|n| self.graph[n].id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of predecessors of an agent.
    pub fn predecessor_count(&self, id: &AgentId) -> usize {
        self.index
            .get(id)
            .map(|&n| {
                self.graph
                    .neighbors_directed(n, petgraph::Direction::Incoming)
                    .count()
            })
            .unwrap_or(0)
    }

    /// The worker capability attached to an agent.
    pub fn worker(&self, id: &AgentId) -> Option<WorkerRef> {
        self.index
            .get(id)
            .map(|&n| Arc::clone(&self.graph[n].worker))
    }

    /// The filter set attached to an agent.
    pub fn filters(&self, id: &AgentId) -> Option<&FilterSet> {
        self.index.get(id).map(|&n| &self.graph[n].filters)
    }
}

impl std::fmt::Debug for FlowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowGraph")
            .field("agents", &self.agent_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}
