//! Banker's algorithm
//!
//! Safe-state determination and tentative-allocation safety checks. The
//! safety probe always runs on a clone of the state, so callers keep a
//! side-effect-free original.

use crate::state::SystemState;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Detailed outcome of a Banker's decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankerDecision {
    /// Whether granting the request keeps the system safe
    pub safe: bool,
    /// Human-readable explanation of the verdict
    pub reason: String,
    /// Safe execution order, present when `safe` is true
    pub safe_sequence: Option<Vec<String>>,
}

/// Search for an execution order in which every process can complete.
///
/// Candidates are scanned in the state's insertion order, so a given state
/// always yields the same sequence. An empty process set is trivially safe.
pub fn find_safe_sequence(state: &SystemState) -> (bool, Option<Vec<String>>) {
    if state.processes.is_empty() {
        return (true, Some(Vec::new()));
    }

    let resource_ids: Vec<&str> = state.resources.keys().map(String::as_str).collect();
    let mut work: IndexMap<&str, u32> = state
        .resources
        .iter()
        .map(|(id, resource)| (id.as_str(), resource.available_units))
        .collect();
    let mut finished: IndexSet<&str> = IndexSet::new();
    let mut sequence: Vec<String> = Vec::new();

    let mut progress = true;
    while progress {
        progress = false;
        for (pid, process) in &state.processes {
            if finished.contains(pid.as_str()) {
                continue;
            }
            let can_finish = resource_ids
                .iter()
                .all(|&rid| process.need(rid) <= work.get(rid).copied().unwrap_or(0));
            if can_finish {
                // The process can run to completion and hand back everything
                // it holds.
                for &rid in &resource_ids {
                    let returned = process.allocated.get(rid).copied().unwrap_or(0);
                    *work.entry(rid).or_insert(0) += returned;
                }
                finished.insert(pid.as_str());
                sequence.push(pid.clone());
                progress = true;
            }
        }
    }

    let safe = finished.len() == state.processes.len();
    if safe {
        (true, Some(sequence))
    } else {
        (false, None)
    }
}

/// Check whether the system is in a safe state, optionally after a
/// tentative grant.
///
/// When `process` and `request` are given, the grant is applied to a clone:
/// the check fails fast if any requested amount exceeds the process's need
/// or the resource's available units, otherwise each grant is allocated on
/// the clone before the safety search runs. The original state is never
/// mutated.
pub fn is_safe_state(
    state: &SystemState,
    process: Option<&str>,
    request: Option<&IndexMap<String, u32>>,
) -> (bool, Option<Vec<String>>) {
    let mut probe = state.clone();

    if let (Some(process_id), Some(request)) = (process, request) {
        let Some(proc) = probe.processes.get(process_id) else {
            return (false, None);
        };
        for (resource_id, units) in request {
            if *units > proc.need(resource_id) {
                return (false, None);
            }
            match probe.get_available(resource_id) {
                Ok(available) if *units <= available => {}
                _ => return (false, None),
            }
        }
        for (resource_id, units) in request {
            match probe.allocate(process_id, resource_id, *units) {
                Ok(true) => {}
                _ => return (false, None),
            }
        }
    }

    find_safe_sequence(&probe)
}

/// Get a detailed Banker's decision for a request, with the refusal reason
/// spelled out.
pub fn banker_decision(
    state: &SystemState,
    process_id: &str,
    request: &IndexMap<String, u32>,
) -> BankerDecision {
    let Some(process) = state.processes.get(process_id) else {
        return BankerDecision {
            safe: false,
            reason: format!("Process {} does not exist", process_id),
            safe_sequence: None,
        };
    };

    for (resource_id, units) in request {
        let need = process.need(resource_id);
        if *units > need {
            return BankerDecision {
                safe: false,
                reason: format!(
                    "Request for {} ({}) exceeds need ({})",
                    resource_id, units, need
                ),
                safe_sequence: None,
            };
        }
    }

    for (resource_id, units) in request {
        let available = state.get_available(resource_id).unwrap_or(0);
        if *units > available {
            return BankerDecision {
                safe: false,
                reason: format!(
                    "Request for {} ({}) exceeds available ({})",
                    resource_id, units, available
                ),
                safe_sequence: None,
            };
        }
    }

    let (safe, sequence) = is_safe_state(state, Some(process_id), Some(request));
    if safe {
        BankerDecision {
            safe: true,
            reason: "Request leaves system in safe state".to_string(),
            safe_sequence: sequence,
        }
    } else {
        BankerDecision {
            safe: false,
            reason: "Request would leave system in unsafe state (no safe sequence exists)"
                .to_string(),
            safe_sequence: None,
        }
    }
}
