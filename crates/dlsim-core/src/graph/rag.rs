//! Resource allocation and wait-for graph construction
//!
//! The RAG is bipartite between process and resource nodes, with request
//! edges (process -> resource) and assignment edges (resource -> process).
//! The WFG projects the RAG onto processes: an edge `p -> q` means `p` has
//! a pending request for a resource that `q` holds.

use crate::graph::cycles::{simple_cycles, tarjan_scc};
use crate::state::SystemState;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Node kind in the resource allocation graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RagNodeKind {
    Process,
    Resource,
}

/// Edge kind in the resource allocation graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RagEdgeKind {
    /// Process -> resource, weighted by requested units
    Request,
    /// Resource -> process, weighted by assigned units
    Assignment,
}

/// A node in the serialized RAG
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RagNodeKind,
    pub units: u32,
}

/// An edge in the serialized RAG
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagEdge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: RagEdgeKind,
    pub units: u32,
}

/// JSON-safe representation of a resource allocation graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagDocument {
    pub nodes: Vec<RagNode>,
    pub edges: Vec<RagEdge>,
}

/// Resource allocation graph over tagged process and resource nodes
#[derive(Debug, Clone, Default)]
pub struct ResourceAllocationGraph {
    nodes: IndexMap<String, RagNode>,
    edges: Vec<RagEdge>,
}

impl ResourceAllocationGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a process node
    pub fn add_process(&mut self, process_id: &str) {
        self.nodes.insert(
            process_id.to_string(),
            RagNode {
                id: process_id.to_string(),
                kind: RagNodeKind::Process,
                units: 1,
            },
        );
    }

    /// Add a resource node carrying its total units
    pub fn add_resource(&mut self, resource_id: &str, units: u32) {
        self.nodes.insert(
            resource_id.to_string(),
            RagNode {
                id: resource_id.to_string(),
                kind: RagNodeKind::Resource,
                units,
            },
        );
    }

    /// Add a request edge from a process to a resource
    pub fn add_request_edge(&mut self, process_id: &str, resource_id: &str, units: u32) {
        self.edges.push(RagEdge {
            from: process_id.to_string(),
            to: resource_id.to_string(),
            kind: RagEdgeKind::Request,
            units,
        });
    }

    /// Add an assignment edge from a resource to a process
    pub fn add_assignment_edge(&mut self, resource_id: &str, process_id: &str, units: u32) {
        self.edges.push(RagEdge {
            from: resource_id.to_string(),
            to: process_id.to_string(),
            kind: RagEdgeKind::Assignment,
            units,
        });
    }

    /// All node ids in insertion order
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Edges in insertion order
    pub fn edges(&self) -> &[RagEdge] {
        &self.edges
    }

    /// Whether the node id names a resource node
    pub fn is_resource(&self, node_id: &str) -> bool {
        self.nodes
            .get(node_id)
            .map(|node| node.kind == RagNodeKind::Resource)
            .unwrap_or(false)
    }

    /// Whether an edge from `from` to `to` exists
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges
            .iter()
            .any(|edge| edge.from == from && edge.to == to)
    }

    /// Serializable form of the graph
    pub fn to_document(&self) -> RagDocument {
        RagDocument {
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.clone(),
        }
    }

    fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            if let (Some(from), Some(to)) = (
                self.nodes.get_index_of(&edge.from),
                self.nodes.get_index_of(&edge.to),
            ) {
                adjacency[from].push(to);
            }
        }
        adjacency
    }
}

/// Wait-for graph: processes only, at most one edge per ordered pair
#[derive(Debug, Clone, Default)]
pub struct WaitForGraph {
    nodes: IndexSet<String>,
    /// `(waiter, holder) -> resource` that induced the edge
    edges: IndexMap<(String, String), String>,
}

impl WaitForGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a process node
    pub fn add_process(&mut self, process_id: &str) {
        self.nodes.insert(process_id.to_string());
    }

    /// Add an edge recording that `waiter` waits on `holder` for a resource.
    /// Duplicate `(waiter, holder)` pairs collapse to the first edge.
    pub fn add_edge(&mut self, waiter: &str, holder: &str, resource_id: &str) {
        self.edges
            .entry((waiter.to_string(), holder.to_string()))
            .or_insert_with(|| resource_id.to_string());
    }

    /// All process ids in insertion order
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    /// Whether `waiter` waits on `holder`
    pub fn has_edge(&self, waiter: &str, holder: &str) -> bool {
        self.edges
            .keys()
            .any(|(from, to)| from == waiter && to == holder)
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.nodes.len()];
        for (waiter, holder) in self.edges.keys() {
            if let (Some(from), Some(to)) = (
                self.nodes.get_index_of(waiter),
                self.nodes.get_index_of(holder),
            ) {
                adjacency[from].push(to);
            }
        }
        adjacency
    }
}

/// Build the resource allocation graph for a state
pub fn build_rag(state: &SystemState) -> ResourceAllocationGraph {
    let mut rag = ResourceAllocationGraph::new();

    for (resource_id, resource) in &state.resources {
        rag.add_resource(resource_id, resource.total_units);
    }

    for (process_id, process) in &state.processes {
        rag.add_process(process_id);
        for (resource_id, units) in &process.allocated {
            if *units > 0 {
                rag.add_assignment_edge(resource_id, process_id, *units);
            }
        }
        for (resource_id, units) in &process.requested {
            if *units > 0 {
                rag.add_request_edge(process_id, resource_id, *units);
            }
        }
    }

    rag
}

/// Build the wait-for graph for a state
pub fn build_wait_for_graph(state: &SystemState) -> WaitForGraph {
    let mut wfg = WaitForGraph::new();

    for process_id in state.processes.keys() {
        wfg.add_process(process_id);
    }

    for (waiter_id, waiter) in &state.processes {
        for (resource_id, requested) in &waiter.requested {
            if *requested == 0 {
                continue;
            }
            for (holder_id, holder) in &state.processes {
                if holder_id == waiter_id {
                    continue;
                }
                if holder.allocated.get(resource_id).copied().unwrap_or(0) > 0 {
                    wfg.add_edge(waiter_id, holder_id, resource_id);
                }
            }
        }
    }

    wfg
}

/// Enumerate simple cycles of the RAG as node-id sequences
pub fn detect_cycles(rag: &ResourceAllocationGraph) -> Vec<Vec<String>> {
    let ids: Vec<&str> = rag.node_ids().collect();
    simple_cycles(&rag.adjacency())
        .into_iter()
        .map(|cycle| cycle.into_iter().map(|v| ids[v].to_string()).collect())
        .collect()
}

/// Enumerate simple cycles of the WFG as process-id sequences
pub fn detect_wait_for_cycles(wfg: &WaitForGraph) -> Vec<Vec<String>> {
    let ids: Vec<&str> = wfg.node_ids().collect();
    simple_cycles(&wfg.adjacency())
        .into_iter()
        .map(|cycle| cycle.into_iter().map(|v| ids[v].to_string()).collect())
        .collect()
}

/// Strongly connected components of the RAG.
///
/// Singleton components without a self-loop are discarded; the survivors
/// are the candidate deadlock clusters.
pub fn strongly_connected_components(rag: &ResourceAllocationGraph) -> Vec<Vec<String>> {
    let ids: Vec<&str> = rag.node_ids().collect();
    let adjacency = rag.adjacency();
    tarjan_scc(&adjacency)
        .into_iter()
        .filter(|component| {
            component.len() > 1
                || component
                    .first()
                    .map(|&v| adjacency[v].contains(&v))
                    .unwrap_or(false)
        })
        .map(|component| {
            component
                .into_iter()
                .map(|v| ids[v].to_string())
                .collect()
        })
        .collect()
}
