//! Error types for the deadlock engine
//!
//! Precondition violations (unknown ids, duplicate ids, zero units where
//! positive units are required) are typed errors. Business-rule refusals
//! (insufficient available units, exceeding a max claim) are not errors;
//! state operations report those as `Ok(false)` plus a refusal log record.

use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DlsimError {
    #[error("Resource {id} already exists")]
    DuplicateResource { id: String },

    #[error("Process {id} already exists")]
    DuplicateProcess { id: String },

    #[error("Resource {id} does not exist")]
    UnknownResource { id: String },

    #[error("Process {id} does not exist")]
    UnknownProcess { id: String },

    #[error("Process {process} max claim for {resource} ({claim}) exceeds total units ({total})")]
    ClaimExceedsTotal {
        process: String,
        resource: String,
        claim: u32,
        total: u32,
    },

    #[error("{operation} units must be positive")]
    ZeroUnits { operation: String },

    #[error("Event is missing required field {field}")]
    MissingEventField { field: String },

    #[error("Policy {policy} is reserved and not implemented")]
    ReservedPolicy { policy: String },

    #[error("Scenario error: {message}")]
    ScenarioError { message: String },

    #[error("IO error: {message}")]
    IoError { message: String },
}

impl DlsimError {
    /// Create an unknown-resource error
    pub fn unknown_resource(id: impl Into<String>) -> Self {
        Self::UnknownResource { id: id.into() }
    }

    /// Create an unknown-process error
    pub fn unknown_process(id: impl Into<String>) -> Self {
        Self::UnknownProcess { id: id.into() }
    }

    /// Create a zero-units error for the named operation
    pub fn zero_units(operation: impl Into<String>) -> Self {
        Self::ZeroUnits {
            operation: operation.into(),
        }
    }

    /// Create a scenario error
    pub fn scenario_error(message: impl Into<String>) -> Self {
        Self::ScenarioError {
            message: message.into(),
        }
    }

    /// Short machine-readable kind, used in event results
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateResource { .. } => "duplicate_resource",
            Self::DuplicateProcess { .. } => "duplicate_process",
            Self::UnknownResource { .. } => "unknown_resource",
            Self::UnknownProcess { .. } => "unknown_process",
            Self::ClaimExceedsTotal { .. } => "claim_exceeds_total",
            Self::ZeroUnits { .. } => "zero_units",
            Self::MissingEventField { .. } => "missing_event_field",
            Self::ReservedPolicy { .. } => "reserved_policy",
            Self::ScenarioError { .. } => "scenario_error",
            Self::IoError { .. } => "io_error",
        }
    }

    /// Check if this error can be absorbed into an event result.
    ///
    /// The dispatcher continues past recoverable errors; scenario and IO
    /// failures abort the run instead.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::DuplicateResource { .. } => true,
            Self::DuplicateProcess { .. } => true,
            Self::UnknownResource { .. } => true,
            Self::UnknownProcess { .. } => true,
            Self::ClaimExceedsTotal { .. } => true,
            Self::ZeroUnits { .. } => true,
            Self::MissingEventField { .. } => true,
            Self::ReservedPolicy { .. } => false,
            Self::ScenarioError { .. } => false,
            Self::IoError { .. } => false,
        }
    }
}

impl From<std::io::Error> for DlsimError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DlsimError {
    fn from(err: serde_json::Error) -> Self {
        Self::ScenarioError {
            message: format!("JSON error: {}", err),
        }
    }
}

impl From<serde_yaml::Error> for DlsimError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ScenarioError {
            message: format!("YAML error: {}", err),
        }
    }
}

/// Result type for engine operations
pub type DlsimResult<T> = Result<T, DlsimError>;
