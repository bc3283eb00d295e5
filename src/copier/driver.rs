/*!
 * Copier driver
 *
 * Owns the lifecycle of one copier invocation: build arguments, spawn the
 * process, and — once it exits — classify the exit code and parse the log
 * it left behind. The orchestrator polls [`ActiveJob::try_wait`] from its
 * `tick` loop; nothing here blocks waiting on the child.
 */

use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus};
use std::time::Instant;

use crate::chunker::Chunk;
use crate::config::{CopierOptions, MismatchSeverity};
use crate::copier::args::{build_args, ArgsInput};
use crate::copier::log_parser::{self, LogStats};
use crate::error::Result;

/// Name of the platform-provided directory-mirroring executable. Overridable
/// for tests via `PARASYNC_COPIER_BIN`.
pub fn copier_binary() -> String {
    std::env::var("PARASYNC_COPIER_BIN").unwrap_or_else(|_| "robocopy".to_string())
}

/// Exit-code bitmask meaning, per the copier's own convention.
const BIT_FILES_COPIED: i32 = 1 << 0;
const BIT_EXTRAS: i32 = 1 << 1;
const BIT_MISMATCHES: i32 = 1 << 2;
const BIT_COPY_ERRORS: i32 = 1 << 3;
const BIT_FATAL: i32 = 1 << 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub severity: Severity,
    pub retryable: bool,
    pub message: String,
    pub stats: LogStats,
}

/// Classify a copier exit code into a severity plus a human-readable
/// distinguishing message, honoring the profile's mismatch-severity policy.
pub fn classify_exit_code(code: i32, mismatch_severity: MismatchSeverity) -> (Severity, bool, String) {
    if code & BIT_FATAL != 0 {
        let retryable = code & BIT_COPY_ERRORS != 0;
        return (Severity::Fatal, retryable, format!("fatal copier error (exit {})", code));
    }
    if code & BIT_COPY_ERRORS != 0 {
        return (Severity::Error, true, format!("copier reported copy errors (exit {})", code));
    }
    if code & BIT_MISMATCHES != 0 {
        let severity = match mismatch_severity {
            MismatchSeverity::Success => Severity::Success,
            MismatchSeverity::Warning => Severity::Warning,
            MismatchSeverity::Error => Severity::Error,
        };
        let retryable = matches!(severity, Severity::Error);
        return (severity, retryable, format!("mismatches detected (exit {})", code));
    }
    if code & (BIT_EXTRAS | BIT_FILES_COPIED) != 0 {
        return (Severity::Success, false, "files copied successfully".to_string());
    }
    (Severity::Success, false, "no changes needed".to_string())
}

/// A copier process started for one chunk, tracked by the orchestrator's
/// active-job map.
pub struct ActiveJob {
    pub chunk: Chunk,
    pub log_path: PathBuf,
    pub started_at: Instant,
    child: Child,
}

impl ActiveJob {
    /// Build arguments and spawn the copier for one chunk. Does not wait.
    pub fn spawn(
        chunk: Chunk,
        log_path: PathBuf,
        thread_count: u32,
        options: &CopierOptions,
        preview: bool,
        verbose: bool,
        inter_packet_gap_ms: u32,
    ) -> Result<Self> {
        let input = ArgsInput {
            source: &chunk.source_path,
            destination: &chunk.destination_path,
            log_path: &log_path,
            thread_count,
            options,
            chunk_switches: &chunk.extra_switches,
            preview,
            verbose,
            inter_packet_gap_ms,
        };
        let built = build_args(&input)?;
        for warning in &built.warnings {
            tracing::warn!(chunk_id = chunk.id, %warning, "argument sanitization warning");
        }

        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let child = Command::new(copier_binary())
            .args(&built.args)
            .spawn()?;

        Ok(Self {
            chunk,
            log_path,
            started_at: Instant::now(),
            child,
        })
    }

    /// Process identifier, used as the active-job map key.
    pub fn process_id(&self) -> u32 {
        self.child.id()
    }

    /// Non-blocking exit check.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Terminate the process, waiting briefly for a clean exit.
    pub fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    /// Parse the log and classify the exit status into a completion record.
    pub fn complete(&self, status: ExitStatus, mismatch_severity: MismatchSeverity) -> Completion {
        let code = status.code().unwrap_or(-1);
        let (severity, retryable, message) = classify_exit_code(code, mismatch_severity);

        let stats = log_parser::parse_log(&self.log_path).unwrap_or_else(|err| {
            tracing::warn!(chunk_id = self.chunk.id, %err, "failed to open copier log");
            LogStats {
                parse_success: false,
                parse_warning: Some(err.to_string()),
                ..LogStats::default()
            }
        });

        Completion {
            severity,
            retryable,
            message,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success_no_changes() {
        let (severity, retryable, _) = classify_exit_code(0, MismatchSeverity::Warning);
        assert_eq!(severity, Severity::Success);
        assert!(!retryable);
    }

    #[test]
    fn test_classify_files_copied() {
        let (severity, retryable, _) = classify_exit_code(1, MismatchSeverity::Warning);
        assert_eq!(severity, Severity::Success);
        assert!(!retryable);
    }

    #[test]
    fn test_classify_copy_errors_retryable() {
        let (severity, retryable, _) = classify_exit_code(8, MismatchSeverity::Warning);
        assert_eq!(severity, Severity::Error);
        assert!(retryable);
    }

    #[test]
    fn test_classify_pure_fatal_not_retryable() {
        let (severity, retryable, _) = classify_exit_code(16, MismatchSeverity::Warning);
        assert_eq!(severity, Severity::Fatal);
        assert!(!retryable);
    }

    #[test]
    fn test_classify_fatal_with_copy_errors_retryable() {
        let (severity, retryable, _) = classify_exit_code(16 | 8, MismatchSeverity::Warning);
        assert_eq!(severity, Severity::Fatal);
        assert!(retryable);
    }

    #[test]
    fn test_classify_mismatch_follows_profile_severity() {
        let (severity, retryable, _) = classify_exit_code(4, MismatchSeverity::Error);
        assert_eq!(severity, Severity::Error);
        assert!(retryable);

        let (severity, retryable, _) = classify_exit_code(4, MismatchSeverity::Success);
        assert_eq!(severity, Severity::Success);
        assert!(!retryable);
    }
}
