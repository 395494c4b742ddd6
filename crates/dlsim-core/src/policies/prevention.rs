//! Deadlock prevention policies
//!
//! A prevention policy is consulted before a `REQUEST` event is recorded.
//! Policies read the state freely but never mutate it; the only mutable
//! piece is the resource-ordering cache derived on first use.

use crate::banker::is_safe_state;
use crate::error::{DlsimError, DlsimResult};
use crate::state::SystemState;
use indexmap::IndexMap;

/// Concrete prevention policies
#[derive(Debug, Clone, PartialEq)]
pub enum PreventionPolicy {
    /// Allow a request only if the tentative grant leaves a safe state
    Bankers,
    /// Enforce a global acquisition order over resources
    ResourceOrdering {
        /// Configured order; empty means derive lexicographically
        order: Vec<String>,
        /// Order derived from the state on first use
        derived: Option<Vec<String>>,
    },
    /// Deny anything that could never be satisfied, or cannot be now
    Conservative,
}

impl PreventionPolicy {
    /// Resource-ordering policy with an explicit acquisition order.
    /// An empty order defers to the lexicographic order of the state's
    /// resources, derived on first use.
    pub fn resource_ordering(order: Vec<String>) -> Self {
        Self::ResourceOrdering {
            order,
            derived: None,
        }
    }

    /// Decide whether a request should be allowed.
    ///
    /// Returns `(allowed, reason)`. The state is never mutated; an unknown
    /// process id is a typed error, surfaced by the dispatcher like any
    /// other precondition violation.
    pub fn should_allow(
        &mut self,
        state: &SystemState,
        process_id: &str,
        request: &IndexMap<String, u32>,
    ) -> DlsimResult<(bool, String)> {
        if !state.processes.contains_key(process_id) {
            return Err(DlsimError::unknown_process(process_id));
        }

        match self {
            Self::Bankers => Ok(bankers_check(state, process_id, request)),
            Self::ResourceOrdering { order, derived } => {
                let order: &[String] = if !order.is_empty() {
                    order
                } else {
                    derived.get_or_insert_with(|| {
                        let mut ids: Vec<String> = state.resources.keys().cloned().collect();
                        ids.sort();
                        ids
                    })
                };
                Ok(ordering_check(state, process_id, request, order))
            }
            Self::Conservative => conservative_check(state, process_id, request),
        }
    }
}

fn bankers_check(
    state: &SystemState,
    process_id: &str,
    request: &IndexMap<String, u32>,
) -> (bool, String) {
    let (safe, sequence) = is_safe_state(state, Some(process_id), Some(request));
    if safe {
        let sequence = sequence.unwrap_or_default().join(", ");
        (
            true,
            format!("Safe state maintained. Safe sequence: [{}]", sequence),
        )
    } else {
        (false, "Request would lead to unsafe state".to_string())
    }
}

fn ordering_check(
    state: &SystemState,
    process_id: &str,
    request: &IndexMap<String, u32>,
    order: &[String],
) -> (bool, String) {
    let rank = |resource_id: &str| order.iter().position(|id| id == resource_id);

    let highest_held = state
        .processes
        .get(process_id)
        .into_iter()
        .flat_map(|process| process.allocated.iter())
        .filter(|(_, units)| **units > 0)
        .filter_map(|(resource_id, _)| rank(resource_id))
        .max();

    let Some(highest_held) = highest_held else {
        return (true, "No resources held, request allowed".to_string());
    };

    for resource_id in request.keys() {
        if let Some(requested_rank) = rank(resource_id) {
            if requested_rank < highest_held {
                return (
                    false,
                    format!(
                        "Violates resource ordering: requesting {} while holding higher-order resources",
                        resource_id
                    ),
                );
            }
        }
    }

    (true, "Follows resource ordering".to_string())
}

fn conservative_check(
    state: &SystemState,
    process_id: &str,
    request: &IndexMap<String, u32>,
) -> DlsimResult<(bool, String)> {
    let process = state
        .processes
        .get(process_id)
        .ok_or_else(|| DlsimError::unknown_process(process_id))?;

    // Deny anything that could never be satisfied, even with every unit free
    for (resource_id, need) in process.total_need() {
        let total = state
            .resources
            .get(&resource_id)
            .ok_or_else(|| DlsimError::unknown_resource(&resource_id))?
            .total_units;
        if need > total {
            return Ok((
                false,
                format!(
                    "Maximum need for {} ({}) exceeds total available ({})",
                    resource_id, need, total
                ),
            ));
        }
    }

    for (resource_id, units) in request {
        let available = state.get_available(resource_id)?;
        if *units > available {
            return Ok((false, format!("Insufficient {} available now", resource_id)));
        }
    }

    Ok((true, "Conservative check passed".to_string()))
}
