//! Event dispatcher
//!
//! Drives a scenario's event timeline against one mutable `SystemState`.
//! Every step runs in a fixed order: prevention check (requests only),
//! state mutation, deadlock analysis, recovery, snapshot. Steps are atomic
//! with respect to the state; the realtime driver only suspends between
//! events, outside the mutation path.

use crate::error::DlsimResult;
use crate::graph::{analyze_deadlock, DeadlockAnalysis};
use crate::policies::{prevention_policy, recovery_policy, PreventionPolicy, RecoveryPolicy};
use crate::scenario::{Event, EventType, Scenario};
use crate::state::{StateSnapshot, SystemState};
use indexmap::{indexmap, IndexMap};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Simulation execution modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    /// Run all events back to back
    Continuous,
    /// Step through events under an external driver
    Step,
    /// Sleep between events by their time difference
    Realtime,
}

/// Outcome of executing one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventResult {
    /// Whether the event took effect
    pub success: bool,
    /// The executed event
    pub event: Event,
    /// Human-readable outcome
    pub message: String,
    /// Error kind when a precondition violation was absorbed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when a prevention policy denied the request
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub prevention_blocked: bool,
}

/// Outcome of a recovery invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub success: bool,
    pub reason: String,
    pub affected_processes: Vec<String>,
}

/// Immutable record of one simulation step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    /// Time of the executed event (0.0 for the initial snapshot)
    pub time: f64,
    /// Index of the executed event, -1 for the initial snapshot
    pub event_index: i64,
    /// Projection of the system state after the step
    pub system_state: StateSnapshot,
    /// Deadlock analysis of the post-step state
    pub deadlock_analysis: DeadlockAnalysis,
    /// Result of the executed event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event: Option<EventResult>,
    /// Recovery outcome, when recovery was triggered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_result: Option<RecoveryOutcome>,
}

/// Summary statistics over one simulation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub total_events: usize,
    pub executed_events: usize,
    pub deadlock_detected_count: usize,
    pub recovery_attempts: usize,
    pub snapshots: usize,
}

/// Full snapshot export document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub scenario: Scenario,
    pub summary: SimulationSummary,
    pub snapshots: Vec<SimulationSnapshot>,
}

/// Callback fired after an event executes
pub type EventCallback = Box<dyn Fn(&Event, &EventResult)>;
/// Callback fired when deadlock is detected
pub type DeadlockCallback = Box<dyn Fn(&DeadlockAnalysis)>;
/// Callback fired when a prevention policy denies a request
pub type PreventionCallback = Box<dyn Fn(&Event, bool, &str)>;
/// Callback fired after a recovery attempt
pub type RecoveryCallback = Box<dyn Fn(&RecoveryOutcome)>;

/// Dispatches scenario events and records snapshots
pub struct EventDispatcher {
    scenario: Scenario,
    state: SystemState,
    events: Vec<Event>,
    snapshots: Vec<SimulationSnapshot>,
    current_index: usize,
    prevention: Option<PreventionPolicy>,
    recovery: Option<RecoveryPolicy>,
    on_event: Vec<EventCallback>,
    on_deadlock: Vec<DeadlockCallback>,
    on_prevention: Vec<PreventionCallback>,
    on_recovery: Vec<RecoveryCallback>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("scenario", &self.scenario)
            .field("state", &self.state)
            .field("events", &self.events)
            .field("snapshots", &self.snapshots)
            .field("current_index", &self.current_index)
            .field("prevention", &self.prevention)
            .field("recovery", &self.recovery)
            .field("on_event", &self.on_event.len())
            .field("on_deadlock", &self.on_deadlock.len())
            .field("on_prevention", &self.on_prevention.len())
            .field("on_recovery", &self.on_recovery.len())
            .finish()
    }
}

impl EventDispatcher {
    /// Build a dispatcher for a scenario.
    ///
    /// Adds every resource and process in scenario order, sorts the
    /// timeline (stable), and takes snapshot #0. Fails on an invalid
    /// scenario or a reserved policy selector.
    pub fn new(scenario: Scenario) -> DlsimResult<Self> {
        let prevention = prevention_policy(scenario.prevention_policy, None)?;
        let recovery = recovery_policy(scenario.recovery_policy)?;

        let mut events = scenario.events.clone();
        events.sort_by(|a, b| {
            a.time
                .partial_cmp(&b.time)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut dispatcher = Self {
            scenario,
            state: SystemState::new(),
            events,
            snapshots: Vec::new(),
            current_index: 0,
            prevention,
            recovery,
            on_event: Vec::new(),
            on_deadlock: Vec::new(),
            on_prevention: Vec::new(),
            on_recovery: Vec::new(),
        };
        dispatcher.initialize_state()?;
        Ok(dispatcher)
    }

    fn initialize_state(&mut self) -> DlsimResult<()> {
        for resource in &self.scenario.resources {
            self.state.add_resource(&resource.id, resource.units)?;
        }
        for process in &self.scenario.processes {
            self.state
                .add_process(&process.id, process.max.clone(), process.priority)?;
        }
        self.take_snapshot(0.0, -1, None, None);
        Ok(())
    }

    /// The current system state
    pub fn state(&self) -> &SystemState {
        &self.state
    }

    /// Snapshots recorded so far (snapshot #0 included)
    pub fn snapshots(&self) -> &[SimulationSnapshot] {
        &self.snapshots
    }

    /// The sorted event timeline
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Whether every event has been executed
    pub fn is_finished(&self) -> bool {
        self.current_index >= self.events.len()
    }

    /// Register a callback fired after each executed event
    pub fn on_event(&mut self, callback: EventCallback) {
        self.on_event.push(callback);
    }

    /// Register a callback fired on deadlock detection
    pub fn on_deadlock(&mut self, callback: DeadlockCallback) {
        self.on_deadlock.push(callback);
    }

    /// Register a callback fired when prevention denies a request
    pub fn on_prevention(&mut self, callback: PreventionCallback) {
        self.on_prevention.push(callback);
    }

    /// Register a callback fired after each recovery attempt
    pub fn on_recovery(&mut self, callback: RecoveryCallback) {
        self.on_recovery.push(callback);
    }

    /// Execute the next event; `None` when the timeline is exhausted.
    pub fn step(&mut self) -> Option<EventResult> {
        if self.current_index >= self.events.len() {
            return None;
        }

        let event = self.events[self.current_index].clone();
        let result = self.execute_event(&event);
        let recovery_result = self.check_and_recover();
        self.take_snapshot(
            event.time,
            self.current_index as i64,
            Some(result.clone()),
            recovery_result,
        );
        self.current_index += 1;
        Some(result)
    }

    /// Run the whole timeline and return the snapshots
    pub fn run(&mut self) -> &[SimulationSnapshot] {
        while self.step().is_some() {}
        &self.snapshots
    }

    /// Run the timeline, sleeping between events by their time difference
    /// divided by `speed`. The sleep is the only suspension point; each
    /// step still completes atomically.
    pub async fn run_realtime(&mut self, speed: f64) -> &[SimulationSnapshot] {
        while self.current_index < self.events.len() {
            if self.current_index > 0 {
                let gap = self.events[self.current_index].time
                    - self.events[self.current_index - 1].time;
                let delay = gap / speed;
                if delay.is_finite() && delay > 0.0 {
                    tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                }
            }
            self.step();
        }
        &self.snapshots
    }

    /// Rebuild the state from the scenario and clear all snapshots
    pub fn reset(&mut self) -> DlsimResult<()> {
        self.state = SystemState::new();
        self.snapshots.clear();
        self.current_index = 0;
        self.initialize_state()
    }

    /// Summary statistics for the run so far
    pub fn get_summary(&self) -> SimulationSummary {
        SimulationSummary {
            total_events: self.events.len(),
            executed_events: self.current_index,
            deadlock_detected_count: self
                .snapshots
                .iter()
                .filter(|snapshot| snapshot.deadlock_analysis.has_deadlock)
                .count(),
            recovery_attempts: self
                .snapshots
                .iter()
                .filter(|snapshot| snapshot.recovery_result.is_some())
                .count(),
            snapshots: self.snapshots.len(),
        }
    }

    /// Build the snapshot export document for the run so far
    pub fn export_document(&self) -> ExportDocument {
        ExportDocument {
            scenario: self.scenario.clone(),
            summary: self.get_summary(),
            snapshots: self.snapshots.clone(),
        }
    }

    fn execute_event(&mut self, event: &Event) -> EventResult {
        let result = match self.apply_event(event) {
            Ok(result) => result,
            Err(err) => EventResult {
                success: false,
                event: event.clone(),
                message: format!("Error: {}", err),
                error: Some(err.kind().to_string()),
                prevention_blocked: false,
            },
        };

        // Prevention-blocked requests fire the prevention callbacks instead
        if !result.prevention_blocked {
            for callback in &self.on_event {
                callback(event, &result);
            }
        }
        result
    }

    fn apply_event(&mut self, event: &Event) -> DlsimResult<EventResult> {
        let mut result = EventResult {
            success: false,
            event: event.clone(),
            message: String::new(),
            error: None,
            prevention_blocked: false,
        };

        match event.kind {
            EventType::Allocate => {
                let (proc, res, units) = (event.proc_id()?, event.res_id()?, event.unit_count()?);
                result.success = self.state.allocate(proc, res, units)?;
                result.message = format!("Allocated {} of {} to {}", units, res, proc);
            }
            EventType::Request => {
                let (proc, res, units) = (event.proc_id()?, event.res_id()?, event.unit_count()?);

                if let Some(policy) = self.prevention.as_mut() {
                    let request: IndexMap<String, u32> = indexmap! { res.to_string() => units };
                    let (allowed, reason) = policy.should_allow(&self.state, proc, &request)?;
                    if !allowed {
                        for callback in &self.on_prevention {
                            callback(event, false, &reason);
                        }
                        result.message =
                            format!("Request denied by prevention policy: {}", reason);
                        result.prevention_blocked = true;
                        return Ok(result);
                    }
                }

                result.success = self.state.request(proc, res, units)?;
                result.message = format!("Process {} requested {} of {}", proc, units, res);
            }
            EventType::Release => {
                let (proc, res, units) = (event.proc_id()?, event.res_id()?, event.unit_count()?);
                result.success = self.state.release(proc, res, units)?;
                result.message = format!("Released {} of {} from {}", units, res, proc);
            }
            EventType::AddProcess => {
                let proc = event.proc_id()?;
                self.state.add_process(
                    proc,
                    event.max.clone().unwrap_or_default(),
                    event.priority.unwrap_or(0),
                )?;
                result.success = true;
                result.message = format!("Added process {}", proc);
            }
            EventType::RemoveProcess => {
                let proc = event.proc_id()?;
                self.state.remove_process(proc)?;
                result.success = true;
                result.message = format!("Removed process {}", proc);
            }
        }

        Ok(result)
    }

    fn check_and_recover(&mut self) -> Option<RecoveryOutcome> {
        let analysis = analyze_deadlock(&self.state);
        if !analysis.has_deadlock {
            return None;
        }

        for callback in &self.on_deadlock {
            callback(&analysis);
        }

        let policy = self.recovery?;
        let outcome = match policy.recover(&mut self.state, &analysis.deadlocked_processes) {
            Ok((success, reason, affected)) => RecoveryOutcome {
                success,
                reason,
                affected_processes: affected,
            },
            Err(err) => RecoveryOutcome {
                success: false,
                reason: err.to_string(),
                affected_processes: Vec::new(),
            },
        };
        for callback in &self.on_recovery {
            callback(&outcome);
        }
        Some(outcome)
    }

    fn take_snapshot(
        &mut self,
        time: f64,
        event_index: i64,
        last_event: Option<EventResult>,
        recovery_result: Option<RecoveryOutcome>,
    ) {
        self.snapshots.push(SimulationSnapshot {
            time,
            event_index,
            system_state: self.state.snapshot(),
            deadlock_analysis: analyze_deadlock(&self.state),
            last_event,
            recovery_result,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::simple_circular_scenario;

    #[test]
    fn test_initial_snapshot() {
        let dispatcher = EventDispatcher::new(simple_circular_scenario(2, 2, 1)).unwrap();
        let snapshots = dispatcher.snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].event_index, -1);
        assert_eq!(snapshots[0].time, 0.0);
        assert!(snapshots[0].last_event.is_none());
    }

    #[test]
    fn test_step_returns_none_when_exhausted() {
        let mut dispatcher = EventDispatcher::new(simple_circular_scenario(2, 2, 1)).unwrap();
        for _ in 0..4 {
            assert!(dispatcher.step().is_some());
        }
        assert!(dispatcher.step().is_none());
        assert!(dispatcher.is_finished());
    }

    #[test]
    fn test_run_takes_one_snapshot_per_event() {
        let mut dispatcher = EventDispatcher::new(simple_circular_scenario(2, 2, 1)).unwrap();
        let snapshots = dispatcher.run();
        assert_eq!(snapshots.len(), 5);
    }

    #[test]
    fn test_circular_wait_deadlocks() {
        let mut dispatcher = EventDispatcher::new(simple_circular_scenario(2, 2, 1)).unwrap();
        dispatcher.run();

        let last = dispatcher.snapshots().last().expect("snapshot");
        assert!(last.deadlock_analysis.has_deadlock);
        assert_eq!(last.deadlock_analysis.deadlocked_processes.len(), 2);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut dispatcher = EventDispatcher::new(simple_circular_scenario(2, 2, 1)).unwrap();
        dispatcher.run();
        dispatcher.reset().unwrap();

        assert_eq!(dispatcher.snapshots().len(), 1);
        assert!(!dispatcher.is_finished());
        assert_eq!(dispatcher.state().resources["R1"].available_units, 1);
    }

    #[test]
    fn test_summary_counts() {
        let mut dispatcher = EventDispatcher::new(simple_circular_scenario(2, 2, 1)).unwrap();
        dispatcher.run();

        let summary = dispatcher.get_summary();
        assert_eq!(summary.total_events, 4);
        assert_eq!(summary.executed_events, 4);
        assert_eq!(summary.snapshots, 5);
        // The final event closes the cycle; only that snapshot deadlocks
        assert_eq!(summary.deadlock_detected_count, 1);
        assert_eq!(summary.recovery_attempts, 0);
    }

    #[test]
    fn test_unknown_process_is_absorbed() {
        let mut scenario = simple_circular_scenario(2, 2, 1);
        scenario.events[0].proc = Some("P99".to_string());

        let mut dispatcher = EventDispatcher::new(scenario).unwrap();
        let result = dispatcher.step().expect("result");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("unknown_process"));
        // The run keeps going
        assert!(dispatcher.step().is_some());
    }

    #[test]
    fn test_realtime_run_completes() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        runtime.block_on(async {
            let mut scenario = simple_circular_scenario(2, 2, 1);
            for (i, event) in scenario.events.iter_mut().enumerate() {
                event.time = i as f64 * 0.001;
            }
            let mut dispatcher = EventDispatcher::new(scenario).unwrap();
            let snapshots = dispatcher.run_realtime(1000.0).await;
            assert_eq!(snapshots.len(), 5);
        });
    }
}
