/*!
 * Health reporter
 *
 * A small JSON document, written atomically and at most every
 * `interval_seconds`, that an external monitor can poll to detect a hung
 * or crashed run without parsing logs.
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

const HEALTH_FILE_NAME: &str = "Robocurse-Health.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "Phase")]
    pub phase: String,
    #[serde(rename = "CurrentProfile")]
    pub current_profile: Option<String>,
    #[serde(rename = "ProfileIndex")]
    pub profile_index: usize,
    #[serde(rename = "ProfileCount")]
    pub profile_count: usize,
    #[serde(rename = "ChunksCompleted")]
    pub chunks_completed: u64,
    #[serde(rename = "ChunksTotal")]
    pub chunks_total: u64,
    #[serde(rename = "ChunksPending")]
    pub chunks_pending: u64,
    #[serde(rename = "ChunksFailed")]
    pub chunks_failed: u64,
    #[serde(rename = "ActiveJobs")]
    pub active_jobs: usize,
    #[serde(rename = "BytesCompleted")]
    pub bytes_completed: u64,
    #[serde(rename = "EtaSeconds")]
    pub eta_seconds: Option<u64>,
    #[serde(rename = "SessionId")]
    pub session_id: Uuid,
    #[serde(rename = "Healthy")]
    pub healthy: bool,
    #[serde(rename = "Message")]
    pub message: String,
    /// Set only by `read_status`; never serialized into the written file.
    #[serde(skip)]
    pub is_stale: bool,
}

impl HealthStatus {
    fn compute_healthy(phase: &str, chunks_failed: u64) -> bool {
        phase != "stopped" && chunks_failed == 0
    }
}

/// Writes at most one health document per `interval_secs`, tracked via a
/// last-write timestamp shared across threads.
pub struct HealthReporter {
    path: PathBuf,
    interval_secs: u64,
    last_write_unix: AtomicI64,
}

impl HealthReporter {
    pub fn new(temp_dir: &Path, interval_secs: u64) -> Self {
        Self {
            path: temp_dir.join(HEALTH_FILE_NAME),
            interval_secs,
            last_write_unix: AtomicI64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the status document unless `force` is false and fewer than
    /// `interval_secs` have elapsed since the last successful write.
    pub fn write_status(&self, mut status: HealthStatus, force: bool) -> Result<()> {
        let now = Utc::now();
        let last = self.last_write_unix.load(Ordering::Acquire);
        if !force && now.timestamp() - last < self.interval_secs as i64 {
            return Ok(());
        }

        status.timestamp = now;
        status.healthy = HealthStatus::compute_healthy(&status.phase, status.chunks_failed);

        let tmp_path = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(&status)?;
        fs::write(&tmp_path, body)?;
        fs::rename(&tmp_path, &self.path)?;

        self.last_write_unix.store(now.timestamp(), Ordering::Release);
        Ok(())
    }

    /// Read and deserialize the status document, marking it stale (and
    /// therefore unhealthy) if older than `max_age_secs` (0 disables the
    /// staleness check).
    pub fn read_status(&self, max_age_secs: u64) -> Result<HealthStatus> {
        let body = fs::read_to_string(&self.path)?;
        let mut status: HealthStatus = serde_json::from_str(&body)?;

        if max_age_secs > 0 {
            let age = (Utc::now() - status.timestamp).num_seconds().max(0) as u64;
            if age > max_age_secs {
                status.is_stale = true;
                status.healthy = false;
            }
        }

        Ok(status)
    }

    pub fn remove(&self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_status(session_id: Uuid) -> HealthStatus {
        HealthStatus {
            timestamp: Utc::now(),
            phase: "replicating".to_string(),
            current_profile: Some("nightly".to_string()),
            profile_index: 0,
            profile_count: 1,
            chunks_completed: 3,
            chunks_total: 10,
            chunks_pending: 6,
            chunks_failed: 1,
            active_jobs: 1,
            bytes_completed: 4096,
            eta_seconds: Some(120),
            session_id,
            healthy: true,
            message: "running".to_string(),
            is_stale: false,
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let reporter = HealthReporter::new(dir.path(), 10);
        reporter.write_status(sample_status(Uuid::new_v4()), true).unwrap();

        let status = reporter.read_status(0).unwrap();
        assert_eq!(status.chunks_completed, 3);
        // failed_count > 0 forces unhealthy regardless of the caller's input.
        assert!(!status.healthy);
    }

    #[test]
    fn test_skips_write_within_interval() {
        let dir = tempdir().unwrap();
        let reporter = HealthReporter::new(dir.path(), 3600);
        reporter.write_status(sample_status(Uuid::new_v4()), true).unwrap();
        // Not forced, interval has not elapsed: silently skipped, file untouched.
        let mut second = sample_status(Uuid::new_v4());
        second.chunks_completed = 99;
        reporter.write_status(second, false).unwrap();

        let status = reporter.read_status(0).unwrap();
        assert_eq!(status.chunks_completed, 3);
    }

    #[test]
    fn test_stale_forces_unhealthy() {
        let dir = tempdir().unwrap();
        let reporter = HealthReporter::new(dir.path(), 0);
        let mut status = sample_status(Uuid::new_v4());
        status.chunks_failed = 0;
        status.timestamp = Utc::now() - chrono::Duration::seconds(600);
        let body = serde_json::to_string_pretty(&status).unwrap();
        fs::write(reporter.path(), body).unwrap();

        let read = reporter.read_status(60).unwrap();
        assert!(read.is_stale);
        assert!(!read.healthy);
    }

    #[test]
    fn test_remove_deletes_file() {
        let dir = tempdir().unwrap();
        let reporter = HealthReporter::new(dir.path(), 0);
        reporter.write_status(sample_status(Uuid::new_v4()), true).unwrap();
        reporter.remove();
        assert!(reporter.read_status(0).is_err());
    }
}
