//! System state management
//!
//! Processes, resources, and their allocations. `SystemState` is the single
//! mutable record a dispatcher owns; every mutating call that succeeds or is
//! refused appends a structured record to its event log.
//!
//! All id-keyed maps are insertion-ordered. Iteration order is part of the
//! contract: the Banker candidate scan, recovery victim selection, and
//! release-on-removal all depend on it.

use crate::error::{DlsimError, DlsimResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A system resource with a fixed number of reusable units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource identifier
    pub id: String,
    /// Total units, fixed after creation
    pub total_units: u32,
    /// Units not currently allocated to any process
    pub available_units: u32,
}

/// A process with resource claims and allocations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    /// Process identifier
    pub id: String,
    /// Maximum units of each resource the process may ever hold
    pub max_claims: IndexMap<String, u32>,
    /// Units currently held, keyed by resource (absent key means zero)
    pub allocated: IndexMap<String, u32>,
    /// Units requested but not yet granted
    pub requested: IndexMap<String, u32>,
    /// Priority for recovery tie-breaks (lower number = lower priority)
    pub priority: i32,
}

impl Process {
    /// Remaining need for one resource: `max_claim - allocated`
    pub fn need(&self, resource_id: &str) -> u32 {
        let max_claim = self.max_claims.get(resource_id).copied().unwrap_or(0);
        let current = self.allocated.get(resource_id).copied().unwrap_or(0);
        max_claim.saturating_sub(current)
    }

    /// Remaining need for every resource the process claims or holds
    pub fn total_need(&self) -> IndexMap<String, u32> {
        let mut needs = IndexMap::new();
        for resource_id in self.max_claims.keys().chain(self.allocated.keys()) {
            if !needs.contains_key(resource_id) {
                needs.insert(resource_id.clone(), self.need(resource_id));
            }
        }
        needs
    }
}

/// One structured record in the state's append-only event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Record kind, e.g. `allocation` or `request_rejected`
    pub kind: String,
    /// Monotonically increasing index at append time
    pub timestamp: usize,
    /// Kind-specific fields
    pub fields: Value,
}

/// JSON-safe projection of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub total: u32,
    pub available: u32,
}

/// JSON-safe projection of one process, including its derived need
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub max_claims: IndexMap<String, u32>,
    pub allocated: IndexMap<String, u32>,
    pub requested: IndexMap<String, u32>,
    pub need: IndexMap<String, u32>,
    pub priority: i32,
}

/// JSON-safe projection of the complete system state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub resources: IndexMap<String, ResourceSnapshot>,
    pub processes: IndexMap<String, ProcessSnapshot>,
}

/// The complete system state: all resources, processes, and the event log
///
/// Single-writer by construction. `clone()` is a full deep copy (everything
/// is owned data, including the event log); mutations of a clone are never
/// observable in the original.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemState {
    /// Resources keyed by id, insertion-ordered
    pub resources: IndexMap<String, Resource>,
    /// Processes keyed by id, insertion-ordered
    pub processes: IndexMap<String, Process>,
    /// Append-only structured event log
    pub event_log: Vec<LogRecord>,
}

impl SystemState {
    /// Create an empty system state
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new resource with all units available.
    ///
    /// Fails if a resource with this id already exists.
    pub fn add_resource(&mut self, resource_id: &str, total_units: u32) -> DlsimResult<()> {
        if self.resources.contains_key(resource_id) {
            return Err(DlsimError::DuplicateResource {
                id: resource_id.to_string(),
            });
        }
        self.resources.insert(
            resource_id.to_string(),
            Resource {
                id: resource_id.to_string(),
                total_units,
                available_units: total_units,
            },
        );
        self.log_event(
            "resource_added",
            json!({ "resource": resource_id, "units": total_units }),
        );
        Ok(())
    }

    /// Add a new process with its maximum claims.
    ///
    /// Fails if the id already exists, if any claimed resource is unknown,
    /// or if any claim exceeds the resource's total units.
    pub fn add_process(
        &mut self,
        process_id: &str,
        max_claims: IndexMap<String, u32>,
        priority: i32,
    ) -> DlsimResult<()> {
        if self.processes.contains_key(process_id) {
            return Err(DlsimError::DuplicateProcess {
                id: process_id.to_string(),
            });
        }
        for (resource_id, units) in &max_claims {
            let resource = self
                .resources
                .get(resource_id)
                .ok_or_else(|| DlsimError::unknown_resource(resource_id))?;
            if *units > resource.total_units {
                return Err(DlsimError::ClaimExceedsTotal {
                    process: process_id.to_string(),
                    resource: resource_id.clone(),
                    claim: *units,
                    total: resource.total_units,
                });
            }
        }
        self.log_event(
            "process_added",
            json!({ "process": process_id, "max_claims": &max_claims, "priority": priority }),
        );
        self.processes.insert(
            process_id.to_string(),
            Process {
                id: process_id.to_string(),
                max_claims,
                allocated: IndexMap::new(),
                requested: IndexMap::new(),
                priority,
            },
        );
        Ok(())
    }

    /// Record a resource request. No units move.
    ///
    /// Returns `Ok(false)` without mutation if the request, together with
    /// any units already pending, would exceed the process's remaining
    /// need.
    pub fn request(&mut self, process_id: &str, resource_id: &str, units: u32) -> DlsimResult<bool> {
        self.ensure_known(process_id, resource_id)?;
        if units == 0 {
            return Err(DlsimError::zero_units("Request"));
        }

        let process = self
            .processes
            .get(process_id)
            .ok_or_else(|| DlsimError::unknown_process(process_id))?;
        let pending = process.requested.get(resource_id).copied().unwrap_or(0);
        let need = process.need(resource_id);
        if units > need.saturating_sub(pending) {
            self.log_event(
                "request_rejected",
                json!({
                    "process": process_id,
                    "resource": resource_id,
                    "units": units,
                    "reason": "exceeds_need",
                }),
            );
            return Ok(false);
        }

        if let Some(process) = self.processes.get_mut(process_id) {
            *process
                .requested
                .entry(resource_id.to_string())
                .or_insert(0) += units;
        }
        self.log_event(
            "request",
            json!({ "process": process_id, "resource": resource_id, "units": units }),
        );
        Ok(true)
    }

    /// Allocate units of a resource to a process.
    ///
    /// Zero units is a logged no-op success. Returns `Ok(false)` without
    /// mutation if the resource has too few available units or the
    /// allocation would exceed the process's max claim. On success any
    /// pending request for the resource is reduced by the granted amount.
    pub fn allocate(
        &mut self,
        process_id: &str,
        resource_id: &str,
        units: u32,
    ) -> DlsimResult<bool> {
        self.ensure_known(process_id, resource_id)?;

        if units == 0 {
            self.log_event(
                "allocation_skipped",
                json!({ "process": process_id, "resource": resource_id, "units": 0 }),
            );
            return Ok(true);
        }

        let available = self
            .resources
            .get(resource_id)
            .ok_or_else(|| DlsimError::unknown_resource(resource_id))?
            .available_units;
        if units > available {
            self.log_event(
                "allocation_failed",
                json!({
                    "process": process_id,
                    "resource": resource_id,
                    "units": units,
                    "reason": "insufficient_available",
                }),
            );
            return Ok(false);
        }

        let process = self
            .processes
            .get_mut(process_id)
            .ok_or_else(|| DlsimError::unknown_process(process_id))?;
        let current = process.allocated.get(resource_id).copied().unwrap_or(0);
        let max_claim = process.max_claims.get(resource_id).copied().unwrap_or(0);
        if current + units > max_claim {
            self.log_event(
                "allocation_failed",
                json!({
                    "process": process_id,
                    "resource": resource_id,
                    "units": units,
                    "reason": "exceeds_max_claim",
                }),
            );
            return Ok(false);
        }

        process
            .allocated
            .insert(resource_id.to_string(), current + units);
        if let Some(pending) = process.requested.get_mut(resource_id) {
            *pending = pending.saturating_sub(units);
            if *pending == 0 {
                process.requested.shift_remove(resource_id);
            }
        }
        if let Some(resource) = self.resources.get_mut(resource_id) {
            resource.available_units -= units;
        }

        self.log_event(
            "allocation",
            json!({ "process": process_id, "resource": resource_id, "units": units }),
        );
        Ok(true)
    }

    /// Release units of a resource held by a process.
    ///
    /// Returns `Ok(false)` without mutation if the process holds fewer
    /// units than requested.
    pub fn release(&mut self, process_id: &str, resource_id: &str, units: u32) -> DlsimResult<bool> {
        self.ensure_known(process_id, resource_id)?;
        if units == 0 {
            return Err(DlsimError::zero_units("Release"));
        }

        let process = self
            .processes
            .get_mut(process_id)
            .ok_or_else(|| DlsimError::unknown_process(process_id))?;
        let current = process.allocated.get(resource_id).copied().unwrap_or(0);
        if units > current {
            self.log_event(
                "release_failed",
                json!({
                    "process": process_id,
                    "resource": resource_id,
                    "units": units,
                    "reason": "insufficient_allocation",
                }),
            );
            return Ok(false);
        }

        if current == units {
            process.allocated.shift_remove(resource_id);
        } else {
            process
                .allocated
                .insert(resource_id.to_string(), current - units);
        }
        if let Some(resource) = self.resources.get_mut(resource_id) {
            resource.available_units += units;
        }

        self.log_event(
            "release",
            json!({ "process": process_id, "resource": resource_id, "units": units }),
        );
        Ok(true)
    }

    /// Remove a process, releasing everything it holds first (in the order
    /// the allocations were made).
    pub fn remove_process(&mut self, process_id: &str) -> DlsimResult<()> {
        let held: Vec<(String, u32)> = self
            .processes
            .get(process_id)
            .ok_or_else(|| DlsimError::unknown_process(process_id))?
            .allocated
            .iter()
            .map(|(resource_id, units)| (resource_id.clone(), *units))
            .collect();

        for (resource_id, units) in held {
            self.release(process_id, &resource_id, units)?;
        }

        self.processes.shift_remove(process_id);
        self.log_event("process_removed", json!({ "process": process_id }));
        Ok(())
    }

    /// Get available units of a resource
    pub fn get_available(&self, resource_id: &str) -> DlsimResult<u32> {
        self.resources
            .get(resource_id)
            .map(|resource| resource.available_units)
            .ok_or_else(|| DlsimError::unknown_resource(resource_id))
    }

    /// Create a JSON-safe projection of the current state
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            resources: self
                .resources
                .iter()
                .map(|(id, resource)| {
                    (
                        id.clone(),
                        ResourceSnapshot {
                            total: resource.total_units,
                            available: resource.available_units,
                        },
                    )
                })
                .collect(),
            processes: self
                .processes
                .iter()
                .map(|(id, process)| {
                    (
                        id.clone(),
                        ProcessSnapshot {
                            max_claims: process.max_claims.clone(),
                            allocated: process.allocated.clone(),
                            requested: process.requested.clone(),
                            need: process.total_need(),
                            priority: process.priority,
                        },
                    )
                })
                .collect(),
        }
    }

    fn ensure_known(&self, process_id: &str, resource_id: &str) -> DlsimResult<()> {
        if !self.processes.contains_key(process_id) {
            return Err(DlsimError::unknown_process(process_id));
        }
        if !self.resources.contains_key(resource_id) {
            return Err(DlsimError::unknown_resource(resource_id));
        }
        Ok(())
    }

    fn log_event(&mut self, kind: &str, fields: Value) {
        self.event_log.push(LogRecord {
            kind: kind.to_string(),
            timestamp: self.event_log.len(),
            fields,
        });
    }
}
