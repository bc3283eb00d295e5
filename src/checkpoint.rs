/*!
 * Checkpoint store
 *
 * Persists the identity of completed chunks so a killed run can resume
 * without redoing finished work. Writes are atomic: temp file, rotate the
 * previous good copy to `.bak`, rename into place.
 */

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

const SCHEMA_VERSION: &str = "1.0";
const CHECKPOINT_FILE_NAME: &str = "replication-checkpoint.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "SessionId")]
    pub session_id: Uuid,
    #[serde(rename = "SavedAt")]
    pub saved_at: DateTime<Utc>,
    #[serde(rename = "ProfileIndex")]
    pub profile_index: usize,
    #[serde(rename = "CurrentProfileName")]
    pub current_profile_name: String,
    #[serde(rename = "CompletedChunkPaths")]
    pub completed_chunk_paths: Vec<Option<String>>,
    #[serde(rename = "CompletedCount")]
    pub completed_count: u64,
    #[serde(rename = "FailedCount")]
    pub failed_count: u64,
    #[serde(rename = "BytesComplete")]
    pub bytes_complete: u64,
    #[serde(rename = "StartTime")]
    pub start_time: DateTime<Utc>,
}

impl Checkpoint {
    pub fn path(run_dir: &Path) -> PathBuf {
        run_dir.join(CHECKPOINT_FILE_NAME)
    }

    /// Atomically persist the checkpoint next to the run's operational log.
    pub fn save(&self, run_dir: &Path) -> Result<()> {
        fs::create_dir_all(run_dir)?;
        let final_path = Self::path(run_dir);
        let tmp_path = final_path.with_extension("json.tmp");
        let bak_path = final_path.with_extension("json.bak");

        let body = serde_json::to_string_pretty(self)?;
        fs::write(&tmp_path, body)?;

        if final_path.exists() {
            fs::rename(&final_path, &bak_path)?;
        }
        fs::rename(&tmp_path, &final_path)?;
        let _ = fs::remove_file(&bak_path);

        Ok(())
    }

    /// Load a checkpoint if present and its schema version is understood.
    /// A missing file or an unknown version both resolve to `None` so the
    /// caller starts fresh rather than erroring.
    pub fn load(run_dir: &Path) -> Option<Self> {
        let path = Self::path(run_dir);
        let body = fs::read_to_string(&path).ok()?;
        let checkpoint: Checkpoint = serde_json::from_str(&body).ok()?;
        if checkpoint.version != SCHEMA_VERSION {
            tracing::warn!(
                found = %checkpoint.version,
                expected = SCHEMA_VERSION,
                "checkpoint schema version mismatch, ignoring"
            );
            return None;
        }
        Some(checkpoint)
    }

    /// Whether `source_path` is recorded as already completed, compared
    /// ordinal case-insensitively. Null entries in the list are ignored.
    pub fn is_completed(&self, source_path: &str) -> bool {
        self.completed_chunk_paths
            .iter()
            .flatten()
            .any(|p| p.eq_ignore_ascii_case(source_path))
    }

    pub fn remove(run_dir: &Path) {
        let path = Self::path(run_dir);
        let _ = fs::remove_file(path);
    }

    pub fn new(session_id: Uuid, start_time: DateTime<Utc>) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            session_id,
            saved_at: Utc::now(),
            profile_index: 0,
            current_profile_name: String::new(),
            completed_chunk_paths: Vec::new(),
            completed_count: 0,
            failed_count: 0,
            bytes_complete: 0,
            start_time,
        }
    }
}
