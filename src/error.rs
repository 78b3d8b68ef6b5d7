//! Error types for the ECL engine.
//!
//! Validation happens at the load boundary; the hot loop trusts its inputs.
//! Every surfaced error carries the identifier it failed on (segment id,
//! contract id, scenario name) so a bad input row can be found in the data.

use thiserror::Error;

/// Errors that can occur while loading inputs or running the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Unrecognised enum value or out-of-range numeric assumption
    #[error("Invalid configuration for {context}: {message}")]
    InvalidConfig { context: String, message: String },

    /// The TTC matrix has no valid one-month root (complex or non-positive spectrum)
    #[error("Invalid TTC transition matrix for segment {segment_id}: {message}")]
    InvalidTtcMatrix { segment_id: i64, message: String },

    /// A generator row could not be repaired into a valid transition row
    #[error("Matrix regularisation failed for segment {segment_id}: {message}")]
    MatrixRegularisation { segment_id: i64, message: String },

    /// A macro variable or date is missing from a scenario series
    #[error("Scenario '{scenario}' is missing {variable} at {date}")]
    ScenarioLookup {
        scenario: String,
        variable: String,
        date: String,
    },

    /// License parse, signature or expiry failure
    #[error("License invalid: {0}")]
    LicenseInvalid(String),

    /// Tabular reader/writer failure
    #[error("I/O failure on {path}: {message}")]
    Io { path: String, message: String },

    /// Cooperative cancellation; in-flight rows were discarded
    #[error("Execution cancelled; partial results discarded")]
    Cancelled,
}

impl EngineError {
    pub fn invalid_config(context: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::InvalidConfig {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<String>, message: impl ToString) -> Self {
        EngineError::Io {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code for the CLI: 1 invalid inputs, 2 license, 3 runtime.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::InvalidConfig { .. }
            | EngineError::InvalidTtcMatrix { .. }
            | EngineError::MatrixRegularisation { .. }
            | EngineError::ScenarioLookup { .. }
            | EngineError::Io { .. } => 1,
            EngineError::LicenseInvalid(_) => 2,
            EngineError::Cancelled => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(EngineError::invalid_config("ead_type", "bad").exit_code(), 1);
        assert_eq!(EngineError::LicenseInvalid("expired".into()).exit_code(), 2);
        assert_eq!(EngineError::Cancelled.exit_code(), 3);
    }

    #[test]
    fn test_messages_carry_identifiers() {
        let err = EngineError::ScenarioLookup {
            scenario: "base".into(),
            variable: "HPI".into(),
            date: "2030-01-31".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("base") && msg.contains("HPI") && msg.contains("2030-01-31"));
    }
}
