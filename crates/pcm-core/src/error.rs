//! Unified error types for the production cost model.
//!
//! [`PcmError`] covers every failure the core and the algorithms crate can
//! raise. Solver-side failures keep the window index so a partial run can be
//! reported precisely.
//!
//! # Example
//!
//! ```ignore
//! use pcm_core::{PcmError, PcmResult};
//!
//! fn single_node(hours: usize) -> PcmResult<SystemInput> {
//!     let input = SystemInput::builder(hours).node("A").build()?;
//!     Ok(input)
//! }
//! ```

use thiserror::Error;

/// Unified error type for all model operations.
#[derive(Error, Debug)]
pub enum PcmError {
    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors that are not tied to one entity
    #[error("Validation error: {0}")]
    Validation(String),

    /// An asset, line or series references something that does not exist or is malformed.
    #[error("Data inconsistency in '{entity}': {reason}")]
    DataInconsistency { entity: String, reason: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network structure errors
    #[error("Network error: {0}")]
    Network(String),

    /// The solver proved the window infeasible. With slacked balance and
    /// reserve constraints this points at a model construction bug.
    #[error("Window {window} is infeasible")]
    SolverInfeasible { window: usize },

    /// The solver failed for any other reason.
    #[error("Solver failed on window {window}: {reason}")]
    SolverFailed { window: usize, reason: String },

    /// The time limit expired before any feasible solution was found.
    #[error("Window {window} hit the time limit without a feasible solution")]
    TimeLimitWithoutSolution { window: usize },

    /// Grid/reservoir coupling did not converge within the iteration cap.
    #[error(
        "Coupling did not converge on window {window} after {iterations} iterations (max deviation {max_deviation:.3} MWh)"
    )]
    CouplingNotConverged {
        window: usize,
        iterations: usize,
        max_deviation: f64,
    },

    /// Reservoir basin errors (cyclic flow paths, bad parameters)
    #[error("Reservoir error: {0}")]
    Reservoir(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

impl PcmError {
    /// Shorthand for [`PcmError::DataInconsistency`].
    pub fn inconsistent(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        PcmError::DataInconsistency {
            entity: entity.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results using PcmError.
pub type PcmResult<T> = Result<T, PcmError>;

impl From<anyhow::Error> for PcmError {
    fn from(err: anyhow::Error) -> Self {
        PcmError::Other(err.to_string())
    }
}

impl From<String> for PcmError {
    fn from(s: String) -> Self {
        PcmError::Other(s)
    }
}

impl From<&str> for PcmError {
    fn from(s: &str) -> Self {
        PcmError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for PcmError {
    fn from(err: serde_json::Error) -> Self {
        PcmError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inconsistency_names_entity() {
        let err = PcmError::inconsistent("coal_1", "unknown node 'Z'");
        let msg = err.to_string();
        assert!(msg.contains("coal_1"));
        assert!(msg.contains("unknown node 'Z'"));
    }

    #[test]
    fn test_infeasible_is_distinct_from_failure() {
        let infeasible = PcmError::SolverInfeasible { window: 3 };
        let failed = PcmError::SolverFailed {
            window: 3,
            reason: "numerical trouble".into(),
        };
        assert!(matches!(infeasible, PcmError::SolverInfeasible { .. }));
        assert!(!matches!(failed, PcmError::SolverInfeasible { .. }));
        assert!(infeasible.to_string().contains("infeasible"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PcmError = io_err.into();
        assert!(matches!(err, PcmError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> PcmResult<()> {
            Err(PcmError::Validation("test".into()))
        }

        fn outer() -> PcmResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
