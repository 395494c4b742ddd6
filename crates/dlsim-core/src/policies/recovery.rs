//! Deadlock recovery policies
//!
//! Recovery runs after the dispatcher observes a deadlock. These are the
//! only policies that mutate state, and only while the dispatcher holds
//! the step. Victim ties break toward the earliest process in the
//! deadlocked list.

use crate::error::{DlsimError, DlsimResult};
use crate::state::SystemState;

/// Concrete recovery policies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Preempt the deadlocked process with the lowest priority
    PreemptLowestPriority,
    /// Preempt the deadlocked process with the lowest preemption cost
    PreemptMinimalCost,
    /// Terminate the lowest-priority deadlocked process
    KillOne,
    /// Terminate every deadlocked process
    KillAll,
}

/// Cost of preempting a process: held units scaled down by priority.
/// Lower priority means lower cost.
pub fn preemption_cost(state: &SystemState, process_id: &str) -> DlsimResult<f64> {
    let process = state
        .processes
        .get(process_id)
        .ok_or_else(|| DlsimError::unknown_process(process_id))?;
    let held_units: u32 = process.allocated.values().sum();
    let priority_factor = 1.0 / (process.priority as f64 + 1.0);
    Ok(held_units as f64 * priority_factor)
}

impl RecoveryPolicy {
    /// Attempt to break a deadlock among the given processes.
    ///
    /// Returns `(success, reason, affected_processes)`. An empty deadlock
    /// set returns `(false, ..)` without mutating anything.
    pub fn recover(
        &self,
        state: &mut SystemState,
        deadlocked: &[String],
    ) -> DlsimResult<(bool, String, Vec<String>)> {
        if deadlocked.is_empty() {
            return Ok((false, "No deadlocked processes".to_string(), Vec::new()));
        }

        match self {
            Self::PreemptLowestPriority => {
                let victim = lowest_priority_victim(state, deadlocked)?;
                let priority = state
                    .processes
                    .get(&victim)
                    .map(|process| process.priority)
                    .unwrap_or_default();
                let released = release_everything(state, &victim)?;
                Ok((
                    true,
                    format!(
                        "Preempted {} (priority={}), released {}",
                        victim,
                        priority,
                        describe_released(&released)
                    ),
                    vec![victim],
                ))
            }
            Self::PreemptMinimalCost => {
                let mut victim: Option<(&String, f64)> = None;
                for process_id in deadlocked {
                    let cost = preemption_cost(state, process_id)?;
                    let better = match victim {
                        None => true,
                        Some((_, best)) => cost < best,
                    };
                    if better {
                        victim = Some((process_id, cost));
                    }
                }
                let (victim, cost) = match victim {
                    Some((process_id, cost)) => (process_id.clone(), cost),
                    None => return Ok((false, "No deadlocked processes".to_string(), Vec::new())),
                };
                let released = release_everything(state, &victim)?;
                Ok((
                    true,
                    format!(
                        "Preempted {} (cost={:.2}), released {}",
                        victim,
                        cost,
                        describe_released(&released)
                    ),
                    vec![victim],
                ))
            }
            Self::KillOne => {
                let victim = lowest_priority_victim(state, deadlocked)?;
                state.remove_process(&victim)?;
                Ok((
                    true,
                    format!("Terminated process {}", victim),
                    vec![victim],
                ))
            }
            Self::KillAll => {
                for process_id in deadlocked {
                    state.remove_process(process_id)?;
                }
                Ok((
                    true,
                    format!(
                        "Terminated all {} deadlocked processes",
                        deadlocked.len()
                    ),
                    deadlocked.to_vec(),
                ))
            }
        }
    }
}

/// First process with the minimum priority, scanning in list order
fn lowest_priority_victim(state: &SystemState, deadlocked: &[String]) -> DlsimResult<String> {
    let mut victim: Option<(&String, i32)> = None;
    for process_id in deadlocked {
        let priority = state
            .processes
            .get(process_id)
            .ok_or_else(|| DlsimError::unknown_process(process_id))?
            .priority;
        let better = match victim {
            None => true,
            Some((_, best)) => priority < best,
        };
        if better {
            victim = Some((process_id, priority));
        }
    }
    victim
        .map(|(process_id, _)| process_id.clone())
        .ok_or_else(|| DlsimError::unknown_process("<none>"))
}

/// Release every unit the victim holds, in allocation order
fn release_everything(state: &mut SystemState, victim: &str) -> DlsimResult<Vec<(String, u32)>> {
    let held: Vec<(String, u32)> = state
        .processes
        .get(victim)
        .ok_or_else(|| DlsimError::unknown_process(victim))?
        .allocated
        .iter()
        .map(|(resource_id, units)| (resource_id.clone(), *units))
        .collect();

    for (resource_id, units) in &held {
        state.release(victim, resource_id, *units)?;
    }
    Ok(held)
}

fn describe_released(released: &[(String, u32)]) -> String {
    if released.is_empty() {
        return "nothing".to_string();
    }
    let parts: Vec<String> = released
        .iter()
        .map(|(resource_id, units)| format!("{}:{}", resource_id, units))
        .collect();
    format!("{{{}}}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;

    fn deadlock_state() -> SystemState {
        let mut state = SystemState::new();
        state.add_resource("R1", 1).unwrap();
        state.add_resource("R2", 1).unwrap();
        let claims = indexmap! { "R1".to_string() => 1, "R2".to_string() => 1 };
        state.add_process("P1", claims.clone(), 1).unwrap();
        state.add_process("P2", claims, 2).unwrap();
        state.allocate("P1", "R1", 1).unwrap();
        state.allocate("P2", "R2", 1).unwrap();
        state.request("P1", "R2", 1).unwrap();
        state.request("P2", "R1", 1).unwrap();
        state
    }

    fn deadlocked() -> Vec<String> {
        vec!["P1".to_string(), "P2".to_string()]
    }

    #[test]
    fn test_empty_deadlock_set_is_a_noop() {
        let mut state = deadlock_state();
        let before = state.snapshot();
        let (success, reason, affected) = RecoveryPolicy::PreemptLowestPriority
            .recover(&mut state, &[])
            .unwrap();
        assert!(!success);
        assert!(reason.contains("No deadlocked processes"));
        assert!(affected.is_empty());
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn test_preempt_lowest_priority() {
        let mut state = deadlock_state();
        let (success, reason, affected) = RecoveryPolicy::PreemptLowestPriority
            .recover(&mut state, &deadlocked())
            .unwrap();

        assert!(success);
        assert_eq!(affected, vec!["P1".to_string()]);
        assert!(reason.contains("P1"));
        // Victim still present, everything released
        assert!(state.processes.contains_key("P1"));
        assert!(state.processes["P1"].allocated.is_empty());
        assert_eq!(state.resources["R1"].available_units, 1);
    }

    #[test]
    fn test_preempt_priority_tie_takes_first() {
        let mut state = deadlock_state();
        if let Some(process) = state.processes.get_mut("P2") {
            process.priority = 1;
        }
        let (_, _, affected) = RecoveryPolicy::PreemptLowestPriority
            .recover(&mut state, &deadlocked())
            .unwrap();
        assert_eq!(affected, vec!["P1".to_string()]);
    }

    #[test]
    fn test_preempt_minimal_cost() {
        let mut state = deadlock_state();
        // P1 cost: 1 / (1 + 1) = 0.5; P2 cost: 1 / (2 + 1) = 0.33
        let (success, _, affected) = RecoveryPolicy::PreemptMinimalCost
            .recover(&mut state, &deadlocked())
            .unwrap();
        assert!(success);
        assert_eq!(affected, vec!["P2".to_string()]);
        assert!(state.processes["P2"].allocated.is_empty());
    }

    #[test]
    fn test_kill_one_removes_victim() {
        let mut state = deadlock_state();
        let (success, _, affected) = RecoveryPolicy::KillOne
            .recover(&mut state, &deadlocked())
            .unwrap();
        assert!(success);
        assert_eq!(affected, vec!["P1".to_string()]);
        assert!(!state.processes.contains_key("P1"));
        assert_eq!(state.resources["R1"].available_units, 1);
    }

    #[test]
    fn test_kill_all_removes_everyone() {
        let mut state = deadlock_state();
        let (success, reason, affected) = RecoveryPolicy::KillAll
            .recover(&mut state, &deadlocked())
            .unwrap();
        assert!(success);
        assert_eq!(affected.len(), 2);
        assert!(reason.contains("2"));
        assert!(state.processes.is_empty());
        assert_eq!(state.resources["R1"].available_units, 1);
        assert_eq!(state.resources["R2"].available_units, 1);
    }

    #[test]
    fn test_cost_calculation() {
        let state = deadlock_state();
        let cost = preemption_cost(&state, "P1").unwrap();
        assert!((cost - 0.5).abs() < 1e-9);
    }
}
