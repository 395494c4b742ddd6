//! Prevention and recovery policies
//!
//! Both policy sets are closed and enumerated by the scenario file, so the
//! concrete policies are sum types rather than trait objects. The strategy
//! enums are the wire-level selectors; the factory functions turn them into
//! policy values (or `None` when no policy is selected).

mod prevention;
mod recovery;

pub use prevention::PreventionPolicy;
pub use recovery::{preemption_cost, RecoveryPolicy};

use crate::error::{DlsimError, DlsimResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Available prevention strategies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreventionStrategy {
    #[default]
    None,
    Bankers,
    ResourceOrdering,
    Conservative,
    /// Reserved selector; construction fails with a typed error
    MaxClaim,
}

/// Available recovery strategies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    #[default]
    None,
    PreemptLowPriority,
    PreemptMinCost,
    KillOne,
    KillAll,
    /// Reserved selector; construction fails with a typed error
    Rollback,
}

impl PreventionStrategy {
    /// Wire name of the selector
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bankers => "bankers",
            Self::ResourceOrdering => "resource_ordering",
            Self::Conservative => "conservative",
            Self::MaxClaim => "max_claim",
        }
    }
}

impl RecoveryStrategy {
    /// Wire name of the selector
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::PreemptLowPriority => "preempt_low_priority",
            Self::PreemptMinCost => "preempt_min_cost",
            Self::KillOne => "kill_one",
            Self::KillAll => "kill_all",
            Self::Rollback => "rollback",
        }
    }
}

impl fmt::Display for PreventionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreventionStrategy {
    type Err = DlsimError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "none" => Ok(Self::None),
            "bankers" => Ok(Self::Bankers),
            "resource_ordering" => Ok(Self::ResourceOrdering),
            "conservative" => Ok(Self::Conservative),
            "max_claim" => Ok(Self::MaxClaim),
            other => Err(DlsimError::scenario_error(format!(
                "Unknown prevention policy: {}",
                other
            ))),
        }
    }
}

impl FromStr for RecoveryStrategy {
    type Err = DlsimError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "none" => Ok(Self::None),
            "preempt_low_priority" => Ok(Self::PreemptLowPriority),
            "preempt_min_cost" => Ok(Self::PreemptMinCost),
            "kill_one" => Ok(Self::KillOne),
            "kill_all" => Ok(Self::KillAll),
            "rollback" => Ok(Self::Rollback),
            other => Err(DlsimError::scenario_error(format!(
                "Unknown recovery policy: {}",
                other
            ))),
        }
    }
}

/// Build a prevention policy for the selected strategy.
///
/// `resource_order` configures the resource-ordering policy explicitly;
/// when absent the ordering is derived from the state on first use.
pub fn prevention_policy(
    strategy: PreventionStrategy,
    resource_order: Option<Vec<String>>,
) -> DlsimResult<Option<PreventionPolicy>> {
    match strategy {
        PreventionStrategy::None => Ok(None),
        PreventionStrategy::Bankers => Ok(Some(PreventionPolicy::Bankers)),
        PreventionStrategy::ResourceOrdering => Ok(Some(PreventionPolicy::resource_ordering(
            resource_order.unwrap_or_default(),
        ))),
        PreventionStrategy::Conservative => Ok(Some(PreventionPolicy::Conservative)),
        PreventionStrategy::MaxClaim => Err(DlsimError::ReservedPolicy {
            policy: strategy.as_str().to_string(),
        }),
    }
}

/// Build a recovery policy for the selected strategy
pub fn recovery_policy(strategy: RecoveryStrategy) -> DlsimResult<Option<RecoveryPolicy>> {
    match strategy {
        RecoveryStrategy::None => Ok(None),
        RecoveryStrategy::PreemptLowPriority => Ok(Some(RecoveryPolicy::PreemptLowestPriority)),
        RecoveryStrategy::PreemptMinCost => Ok(Some(RecoveryPolicy::PreemptMinimalCost)),
        RecoveryStrategy::KillOne => Ok(Some(RecoveryPolicy::KillOne)),
        RecoveryStrategy::KillAll => Ok(Some(RecoveryPolicy::KillAll)),
        RecoveryStrategy::Rollback => Err(DlsimError::ReservedPolicy {
            policy: strategy.as_str().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_round_trip() {
        for strategy in [
            PreventionStrategy::None,
            PreventionStrategy::Bankers,
            PreventionStrategy::ResourceOrdering,
            PreventionStrategy::Conservative,
            PreventionStrategy::MaxClaim,
        ] {
            assert_eq!(strategy.as_str().parse::<PreventionStrategy>(), Ok(strategy));
        }
    }

    #[test]
    fn test_unknown_strategy_is_an_error() {
        assert!("wait_die".parse::<PreventionStrategy>().is_err());
        assert!("wound_wait".parse::<RecoveryStrategy>().is_err());
    }

    #[test]
    fn test_none_builds_no_policy() {
        assert!(prevention_policy(PreventionStrategy::None, None)
            .unwrap()
            .is_none());
        assert!(recovery_policy(RecoveryStrategy::None).unwrap().is_none());
    }

    #[test]
    fn test_reserved_selectors_fail_fast() {
        let err = prevention_policy(PreventionStrategy::MaxClaim, None).unwrap_err();
        assert_eq!(err.kind(), "reserved_policy");

        let err = recovery_policy(RecoveryStrategy::Rollback).unwrap_err();
        assert_eq!(err.kind(), "reserved_policy");
    }

    #[test]
    fn test_serde_wire_names() {
        let strategy: PreventionStrategy = serde_json::from_str("\"resource_ordering\"").unwrap();
        assert_eq!(strategy, PreventionStrategy::ResourceOrdering);

        let strategy: RecoveryStrategy = serde_json::from_str("\"preempt_low_priority\"").unwrap();
        assert_eq!(strategy, RecoveryStrategy::PreemptLowPriority);
    }
}
