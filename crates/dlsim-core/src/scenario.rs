//! Scenario definition and loading
//!
//! A scenario is a pure value: resource and process declarations, an
//! ordered event timeline, and the two policy selectors. Files are JSON or
//! YAML; JSON is tried first. Unknown top-level keys are ignored, unknown
//! event kinds are a parse error.

use crate::error::{DlsimError, DlsimResult};
use crate::policies::{PreventionStrategy, RecoveryStrategy};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::Path;

/// Kinds of events in a scenario timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Allocate,
    Request,
    Release,
    AddProcess,
    RemoveProcess,
}

/// One event on the scenario timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event timestamp; ordering key, informational in continuous mode
    pub time: f64,
    /// Event kind
    #[serde(rename = "type")]
    pub kind: EventType,
    /// Process id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proc: Option<String>,
    /// Resource id, for the three resource events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub res: Option<String>,
    /// Units to allocate, request, or release
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<u32>,
    /// Max claims, for `add_process`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<IndexMap<String, u32>>,
    /// Priority, for `add_process`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl Event {
    /// The process id, required by every event kind
    pub fn proc_id(&self) -> DlsimResult<&str> {
        self.proc
            .as_deref()
            .ok_or_else(|| DlsimError::MissingEventField {
                field: "proc".to_string(),
            })
    }

    /// The resource id, required by allocate/request/release
    pub fn res_id(&self) -> DlsimResult<&str> {
        self.res
            .as_deref()
            .ok_or_else(|| DlsimError::MissingEventField {
                field: "res".to_string(),
            })
    }

    /// The unit count, required by allocate/request/release
    pub fn unit_count(&self) -> DlsimResult<u32> {
        self.units.ok_or_else(|| DlsimError::MissingEventField {
            field: "units".to_string(),
        })
    }
}

/// Resource declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource identifier
    pub id: String,
    /// Total units, must be positive
    pub units: u32,
}

/// Process declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Process identifier
    pub id: String,
    /// Maximum claims per resource
    #[serde(default)]
    pub max: IndexMap<String, u32>,
    /// Priority (lower number = lower priority)
    #[serde(default)]
    pub priority: i32,
}

/// Complete scenario definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub resources: Vec<ResourceConfig>,
    pub processes: Vec<ProcessConfig>,
    pub events: Vec<Event>,
    #[serde(default)]
    pub prevention_policy: PreventionStrategy,
    #[serde(default)]
    pub recovery_policy: RecoveryStrategy,
}

fn default_name() -> String {
    "Unnamed Scenario".to_string()
}

impl Scenario {
    /// Load a scenario from a JSON or YAML file
    pub fn from_file(path: impl AsRef<Path>) -> DlsimResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse a scenario document; JSON is tried first, then YAML
    pub fn parse(content: &str) -> DlsimResult<Self> {
        let mut scenario: Scenario = match serde_json::from_str(content) {
            Ok(scenario) => scenario,
            Err(_) => serde_yaml::from_str(content)?,
        };
        scenario.validate()?;
        scenario.sort_events();
        Ok(scenario)
    }

    /// Save the scenario; `.yaml`/`.yml` extensions write YAML, anything
    /// else writes pretty JSON
    pub fn to_file(&self, path: impl AsRef<Path>) -> DlsimResult<()> {
        let path = path.as_ref();
        let yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );
        let content = if yaml {
            serde_yaml::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        fs::write(path, content)?;
        Ok(())
    }

    /// Check declaration-level invariants
    pub fn validate(&self) -> DlsimResult<()> {
        for resource in &self.resources {
            if resource.units == 0 {
                return Err(DlsimError::scenario_error(format!(
                    "Resource {} must have positive units",
                    resource.id
                )));
            }
        }
        for event in &self.events {
            if !event.time.is_finite() || event.time < 0.0 {
                return Err(DlsimError::scenario_error(format!(
                    "Event time must be a non-negative number, got {}",
                    event.time
                )));
            }
        }
        Ok(())
    }

    /// Sort events ascending by time; stable, so ties keep their original
    /// timeline position
    pub fn sort_events(&mut self) {
        self.events
            .sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap_or(Ordering::Equal));
    }
}

/// Generate a circular-wait scenario: each process allocates one resource
/// and then requests the next one around the ring.
pub fn simple_circular_scenario(
    num_processes: usize,
    num_resources: usize,
    resource_units: u32,
) -> Scenario {
    let resources = (0..num_resources)
        .map(|i| ResourceConfig {
            id: format!("R{}", i + 1),
            units: resource_units,
        })
        .collect();

    let processes = (0..num_processes)
        .map(|i| ProcessConfig {
            id: format!("P{}", i + 1),
            max: (0..num_resources)
                .map(|j| (format!("R{}", j + 1), 1))
                .collect(),
            priority: 0,
        })
        .collect();

    let mut events = Vec::new();
    let mut time = 0.0;
    for i in 0..num_processes {
        let proc_id = format!("P{}", i + 1);
        let res_id = format!("R{}", i + 1);
        let next_res_id = format!("R{}", ((i + 1) % num_resources) + 1);

        events.push(Event {
            time,
            kind: EventType::Allocate,
            proc: Some(proc_id.clone()),
            res: Some(res_id),
            units: Some(1),
            max: None,
            priority: None,
        });
        time += 0.5;

        events.push(Event {
            time,
            kind: EventType::Request,
            proc: Some(proc_id),
            res: Some(next_res_id),
            units: Some(1),
            max: None,
            priority: None,
        });
        time += 0.5;
    }

    Scenario {
        name: "Simple Circular Wait Deadlock".to_string(),
        description: format!(
            "Circular wait between {} processes and {} resources",
            num_processes, num_resources
        ),
        resources,
        processes,
        events,
        prevention_policy: PreventionStrategy::None,
        recovery_policy: RecoveryStrategy::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_SCENARIO: &str = r#"{
        "name": "two resources",
        "resources": [{"id": "R1", "units": 1}, {"id": "R2", "units": 1}],
        "processes": [
            {"id": "P1", "max": {"R1": 1, "R2": 1}, "priority": 1},
            {"id": "P2", "max": {"R1": 1, "R2": 1}}
        ],
        "events": [
            {"time": 1.0, "type": "request", "proc": "P1", "res": "R2", "units": 1},
            {"time": 0.0, "type": "allocate", "proc": "P1", "res": "R1", "units": 1}
        ],
        "prevention_policy": "bankers",
        "recovery_policy": "kill_one",
        "comment": "unknown keys are ignored"
    }"#;

    #[test]
    fn test_parse_json() {
        let scenario = Scenario::parse(JSON_SCENARIO).unwrap();
        assert_eq!(scenario.name, "two resources");
        assert_eq!(scenario.resources.len(), 2);
        assert_eq!(scenario.prevention_policy, PreventionStrategy::Bankers);
        assert_eq!(scenario.recovery_policy, RecoveryStrategy::KillOne);
        assert_eq!(scenario.processes[1].priority, 0);
    }

    #[test]
    fn test_events_sorted_by_time() {
        let scenario = Scenario::parse(JSON_SCENARIO).unwrap();
        assert_eq!(scenario.events[0].kind, EventType::Allocate);
        assert_eq!(scenario.events[1].kind, EventType::Request);
    }

    #[test]
    fn test_stable_sort_keeps_tie_order() {
        let mut scenario = simple_circular_scenario(2, 2, 1);
        for event in &mut scenario.events {
            event.time = 1.0;
        }
        let before: Vec<Event> = scenario.events.clone();
        scenario.sort_events();
        assert_eq!(scenario.events, before);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
name: yaml scenario
resources:
  - id: R1
    units: 2
processes:
  - id: P1
    max:
      R1: 2
events:
  - time: 0.0
    type: allocate
    proc: P1
    res: R1
    units: 1
"#;
        let scenario = Scenario::parse(yaml).unwrap();
        assert_eq!(scenario.name, "yaml scenario");
        assert_eq!(scenario.prevention_policy, PreventionStrategy::None);
    }

    #[test]
    fn test_unknown_event_kind_is_a_parse_error() {
        let bad = r#"{
            "resources": [{"id": "R1", "units": 1}],
            "processes": [{"id": "P1", "max": {"R1": 1}}],
            "events": [{"time": 0.0, "type": "hibernate", "proc": "P1"}]
        }"#;
        assert!(Scenario::parse(bad).is_err());
    }

    #[test]
    fn test_unknown_policy_is_a_parse_error() {
        let bad = r#"{
            "resources": [{"id": "R1", "units": 1}],
            "processes": [{"id": "P1", "max": {"R1": 1}}],
            "events": [],
            "prevention_policy": "optimistic"
        }"#;
        assert!(Scenario::parse(bad).is_err());
    }

    #[test]
    fn test_zero_unit_resource_rejected() {
        let bad = r#"{
            "resources": [{"id": "R1", "units": 0}],
            "processes": [],
            "events": []
        }"#;
        let err = Scenario::parse(bad).unwrap_err();
        assert_eq!(err.kind(), "scenario_error");
    }

    #[test]
    fn test_negative_time_rejected() {
        let bad = r#"{
            "resources": [{"id": "R1", "units": 1}],
            "processes": [],
            "events": [{"time": -1.0, "type": "allocate", "proc": "P1", "res": "R1", "units": 1}]
        }"#;
        assert!(Scenario::parse(bad).is_err());
    }

    #[test]
    fn test_simple_circular_scenario_shape() {
        let scenario = simple_circular_scenario(3, 3, 1);
        assert_eq!(scenario.resources.len(), 3);
        assert_eq!(scenario.processes.len(), 3);
        assert_eq!(scenario.events.len(), 6);
        // P3's second event closes the ring back to R1
        let last = scenario.events.last().expect("event");
        assert_eq!(last.kind, EventType::Request);
        assert_eq!(last.res.as_deref(), Some("R1"));
    }

    #[test]
    fn test_json_round_trip() {
        let scenario = simple_circular_scenario(2, 2, 1);
        let text = serde_json::to_string(&scenario).unwrap();
        let parsed = Scenario::parse(&text).unwrap();
        assert_eq!(parsed, scenario);
    }
}
