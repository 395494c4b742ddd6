//! Resource allocation graphs and deadlock analysis
//!
//! Builds the RAG and WFG for a system state and runs cycle / SCC
//! detection over them. The operational deadlock predicate is a cycle in
//! the wait-for graph; RAG cycles are reported for diagnostics (with
//! multi-unit resources a RAG cycle is only a necessary condition).

mod cycles;
mod rag;

pub use rag::{
    build_rag, build_wait_for_graph, detect_cycles, detect_wait_for_cycles,
    strongly_connected_components, RagDocument, RagEdge, RagEdgeKind, RagNode, RagNodeKind,
    ResourceAllocationGraph, WaitForGraph,
};

use crate::state::SystemState;
use serde::{Deserialize, Serialize};

/// Complete deadlock analysis of one system state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadlockAnalysis {
    /// Whether the wait-for graph contains a cycle
    pub has_deadlock: bool,
    /// Simple cycles of the resource allocation graph (diagnostic)
    pub rag_cycles: Vec<Vec<String>>,
    /// Simple cycles of the wait-for graph
    pub wait_for_cycles: Vec<Vec<String>>,
    /// Processes on any wait-for cycle, in first-seen order
    pub deadlocked_processes: Vec<String>,
    /// Resource nodes on any RAG cycle, in first-seen order
    pub deadlocked_resources: Vec<String>,
    /// Serialized resource allocation graph
    pub rag: RagDocument,
    pub process_count: usize,
    pub resource_count: usize,
}

/// Analyze a state for deadlock using both the RAG and the WFG
pub fn analyze_deadlock(state: &SystemState) -> DeadlockAnalysis {
    let rag = build_rag(state);
    let wfg = build_wait_for_graph(state);

    let rag_cycles = detect_cycles(&rag);
    let wait_for_cycles = detect_wait_for_cycles(&wfg);

    let mut deadlocked_processes: Vec<String> = Vec::new();
    for cycle in &wait_for_cycles {
        for process_id in cycle {
            if !deadlocked_processes.contains(process_id) {
                deadlocked_processes.push(process_id.clone());
            }
        }
    }

    let mut deadlocked_resources: Vec<String> = Vec::new();
    for cycle in &rag_cycles {
        for node_id in cycle {
            if rag.is_resource(node_id) && !deadlocked_resources.contains(node_id) {
                deadlocked_resources.push(node_id.clone());
            }
        }
    }

    DeadlockAnalysis {
        has_deadlock: !wait_for_cycles.is_empty(),
        rag_cycles,
        wait_for_cycles,
        deadlocked_processes,
        deadlocked_resources,
        rag: rag.to_document(),
        process_count: state.processes.len(),
        resource_count: state.resources.len(),
    }
}

/// Convenience predicate: does the state contain a deadlock?
pub fn has_deadlock(state: &SystemState) -> bool {
    !detect_wait_for_cycles(&build_wait_for_graph(state)).is_empty()
}
