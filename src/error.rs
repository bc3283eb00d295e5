/*!
 * Error types for the replication orchestrator
 */

use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug)]
pub enum OrchestratorError {
    /// Missing required field, invalid path format, unsafe path/pattern, or
    /// a conflicting copier-switch combination. Fails the offending profile
    /// (or the whole run, for global configuration).
    Configuration(String),

    /// Source path inaccessible, including unreachable network paths.
    /// Fails the profile, other profiles may continue.
    PreFlight(String),

    /// Copier exit indicated copy errors or a retryable fatal condition.
    /// Goes through the retry handler; surfaces as permanent only once
    /// retries are exhausted.
    TransientCopier(String),

    /// Fatal copier exit without copy errors, or retry budget exhausted.
    PermanentCopier(String),

    /// Snapshot creation/teardown failed. Non-fatal to the run: the
    /// profile proceeds without the snapshot.
    Snapshot(String),

    /// Checkpoint read/write failed. The run continues without resumable
    /// state.
    CheckpointIo(String),

    /// The copier's log file could not be parsed for statistics. The
    /// chunk is still considered complete (the exit code was already
    /// observed); counters default to zero.
    LogParser(String),

    /// The health document could not be written. The run continues.
    HealthReporter(String),

    /// I/O error not otherwise classified.
    Io(io::Error),
}

impl OrchestratorError {
    /// True if this error should not be retried at all.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Configuration(_) | OrchestratorError::PermanentCopier(_)
        )
    }

    /// True if a retry is likely to succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OrchestratorError::TransientCopier(_) | OrchestratorError::Snapshot(_)
        )
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            OrchestratorError::Configuration(_) => ErrorCategory::Configuration,
            OrchestratorError::PreFlight(_) => ErrorCategory::PreFlight,
            OrchestratorError::TransientCopier(_) => ErrorCategory::TransientCopier,
            OrchestratorError::PermanentCopier(_) => ErrorCategory::PermanentCopier,
            OrchestratorError::Snapshot(_) => ErrorCategory::Snapshot,
            OrchestratorError::CheckpointIo(_) => ErrorCategory::Checkpoint,
            OrchestratorError::LogParser(_) => ErrorCategory::LogParser,
            OrchestratorError::HealthReporter(_) => ErrorCategory::Health,
            OrchestratorError::Io(_) => ErrorCategory::Io,
        }
    }
}

/// Error category for classification, logging, and the per-profile summary table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    PreFlight,
    TransientCopier,
    PermanentCopier,
    Snapshot,
    Checkpoint,
    LogParser,
    Health,
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::PreFlight => write!(f, "preflight"),
            ErrorCategory::TransientCopier => write!(f, "transient_copier"),
            ErrorCategory::PermanentCopier => write!(f, "permanent_copier"),
            ErrorCategory::Snapshot => write!(f, "snapshot"),
            ErrorCategory::Checkpoint => write!(f, "checkpoint"),
            ErrorCategory::LogParser => write!(f, "log_parser"),
            ErrorCategory::Health => write!(f, "health"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            OrchestratorError::PreFlight(msg) => write!(f, "pre-flight check failed: {}", msg),
            OrchestratorError::TransientCopier(msg) => write!(f, "transient copier failure: {}", msg),
            OrchestratorError::PermanentCopier(msg) => write!(f, "permanent copier failure: {}", msg),
            OrchestratorError::Snapshot(msg) => write!(f, "snapshot error: {}", msg),
            OrchestratorError::CheckpointIo(msg) => write!(f, "checkpoint I/O error: {}", msg),
            OrchestratorError::LogParser(msg) => write!(f, "log parse error: {}", msg),
            OrchestratorError::HealthReporter(msg) => write!(f, "health reporter error: {}", msg),
            OrchestratorError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OrchestratorError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for OrchestratorError {
    fn from(err: io::Error) -> Self {
        OrchestratorError::Io(err)
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::CheckpointIo(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(OrchestratorError::Configuration("bad".into()).is_fatal());
        assert!(OrchestratorError::PermanentCopier("fatal".into()).is_fatal());
        assert!(!OrchestratorError::TransientCopier("retry me".into()).is_fatal());
    }

    #[test]
    fn test_transient_errors() {
        assert!(OrchestratorError::TransientCopier("x".into()).is_transient());
        assert!(OrchestratorError::Snapshot("busy".into()).is_transient());
        assert!(!OrchestratorError::Configuration("x".into()).is_transient());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            OrchestratorError::Snapshot("x".into()).category(),
            ErrorCategory::Snapshot
        );
        assert_eq!(ErrorCategory::Snapshot.to_string(), "snapshot");
    }

    #[test]
    fn test_display() {
        let err = OrchestratorError::PermanentCopier("exit 16".into());
        assert_eq!(err.to_string(), "permanent copier failure: exit 16");
    }
}
