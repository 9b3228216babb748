//! Error types for pingwatch.
//!
//! Validation and registry errors are returned to the host synchronously.
//! Probe errors never travel past the prober boundary; the retry layer
//! turns them into an "unreachable" result.

use std::io;

use thiserror::Error;

use crate::target::TargetId;

/// A configuration value a host tried to apply was rejected.
///
/// Every variant names the offending field through [`ValidationError::field`]
/// so the host can attach the message to the right input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("This needs to be a valid IP address.")]
    InvalidAddress { value: String },
    #[error("This needs to be > 0.")]
    IntervalTooSmall { value: i64 },
    #[error("This needs to be a valid number.")]
    IntervalNotANumber { value: String },
}

impl ValidationError {
    /// Name of the configuration field the error refers to
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::InvalidAddress { .. } => "address",
            ValidationError::IntervalTooSmall { .. } | ValidationError::IntervalNotANumber { .. } => {
                "interval"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{field}: {0}", field = .0.field())]
    Validation(#[from] ValidationError),
    #[error("Endpoint {0} is already registered")]
    DuplicateTarget(TargetId),
    #[error("Endpoint {0} is not registered")]
    UnknownTarget(TargetId),
}

/// Failure to execute a probe at all, as opposed to a probe that ran and
/// got no answer.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to launch ping utility: {0}")]
    Spawn(#[source] io::Error),
    #[error("ICMP socket error: {0}")]
    Socket(#[source] io::Error),
    #[error("Ping utility exited abnormally: {0}")]
    Exit(String),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Invalid monitor configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Prober(#[from] ProbeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_fields() {
        let address = ValidationError::InvalidAddress { value: "host".into() };
        assert_eq!(address.field(), "address");
        assert_eq!(address.to_string(), "This needs to be a valid IP address.");

        let interval = ValidationError::IntervalTooSmall { value: 0 };
        assert_eq!(interval.field(), "interval");
        assert_eq!(interval.to_string(), "This needs to be > 0.");
    }

    #[test]
    fn test_registry_error_names_field() {
        let err = RegistryError::from(ValidationError::IntervalNotANumber { value: "x".into() });
        assert_eq!(err.to_string(), "interval: This needs to be a valid number.");
    }
}
