//! Error types shared by the parser, the solver driver and the verifier

use std::time::Duration;
use thiserror::Error;

/// Errors that abort the current problem instance.
///
/// Timeouts and unsatisfiable backbones are not errors; they are reported as
/// [`crate::controller::SolveOutcome`] variants.
#[derive(Debug, Error)]
pub enum FondError {
    /// Malformed model input or solver answer text
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// The external solver exited abnormally or reported an error
    #[error("solver process `{command}` failed ({status}): {stderr}")]
    SolverProcess {
        command: String,
        status: String,
        stderr: String,
    },

    /// A soundness check failed while simulating a controller
    #[error("verification failed: {0}")]
    Verification(String),

    /// Invalid or inconsistent configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FondError {
    /// Build a parse error for a 1-based line number
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        FondError::Parse {
            line,
            message: message.into(),
        }
    }

    /// Build a verification error
    pub fn verification(message: impl Into<String>) -> Self {
        FondError::Verification(message.into())
    }
}

/// Convenience alias for library results
pub type FondResult<T> = Result<T, FondError>;

/// Human readable rendering of a time budget
pub fn describe_budget(budget: Option<Duration>) -> String {
    match budget {
        Some(d) => format!("{:.1}s", d.as_secs_f64()),
        None => "unlimited".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = FondError::parse(12, "expected integer, found `x`");
        assert_eq!(
            err.to_string(),
            "parse error at line 12: expected integer, found `x`"
        );
    }

    #[test]
    fn test_describe_budget() {
        assert_eq!(describe_budget(None), "unlimited");
        assert_eq!(describe_budget(Some(Duration::from_millis(1500))), "1.5s");
    }
}
