/*!
 * Snapshot tracking file
 *
 * Every snapshot created is recorded here before it's used, so a crashed
 * run's snapshots can be released on the next process's startup rather
 * than leaking until the volume runs out of shadow-copy storage.
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::snapshot::{
    LocalSnapshotProvider, RemoteSnapshotProvider, Snapshot, SnapshotProvider, SnapshotRecord,
};

const TRACKING_FILE_NAME: &str = "parasync-snapshot-tracking.json";

/// Guards concurrent access to the tracking file within this process;
/// cross-process coordination is out of scope (each session uses a
/// distinct file name suffix derived from the log root).
static TRACKING_LOCK: Mutex<()> = Mutex::new(());

pub struct SnapshotTrackingFile {
    path: PathBuf,
}

impl SnapshotTrackingFile {
    pub fn new(temp_dir: &Path) -> Self {
        Self {
            path: temp_dir.join(TRACKING_FILE_NAME),
        }
    }

    fn read_all(&self) -> Vec<SnapshotRecord> {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|body| serde_json::from_str(&body).ok())
            .unwrap_or_default()
    }

    fn write_all(&self, records: &[SnapshotRecord]) -> Result<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(records)?;
        fs::write(&tmp_path, body)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn record(&self, record: SnapshotRecord) -> Result<()> {
        let _guard = TRACKING_LOCK.lock().unwrap();
        let mut records = self.read_all();
        records.push(record);
        self.write_all(&records)
    }

    pub fn untrack(&self, snapshot_id: &str) -> Result<()> {
        let _guard = TRACKING_LOCK.lock().unwrap();
        let mut records = self.read_all();
        records.retain(|r| r.snapshot_id != snapshot_id);
        self.write_all(&records)
    }

    pub fn remove_file(&self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// On startup, release every snapshot recorded in the tracking file, then
/// remove the file. Crash-left snapshots from a prior session are
/// eventually reclaimed this way, regardless of which kind they were.
pub fn recover_orphans(tracking: &SnapshotTrackingFile) {
    let records = tracking.read_all();
    for record in records {
        let released = if record.is_remote {
            release_orphan(&RemoteSnapshotProvider::new(), &record)
        } else {
            release_orphan(&LocalSnapshotProvider::new(), &record)
        };
        if let Err(err) = released {
            tracing::warn!(snapshot_id = %record.snapshot_id, %err, "failed to release orphaned snapshot");
        }
    }
    tracking.remove_file();
}

/// Rebuild a releasable handle from what was persisted (`shadow_root`,
/// `source_link`) and hand it to the provider's normal teardown path.
/// `source_root` is never read by `remove`, so the shadow root stands in
/// for it rather than leaving it unrecoverable.
fn release_orphan(provider: &dyn SnapshotProvider, record: &SnapshotRecord) -> Result<()> {
    let snapshot = Snapshot {
        record: record.clone(),
        source_link: record.source_link.clone(),
        shadow_root: record.shadow_root.clone(),
        source_root: record.shadow_root.clone(),
    };
    provider.remove(snapshot)?;
    tracing::info!(snapshot_id = %record.snapshot_id, "released orphaned snapshot");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use tempfile::tempdir;

    fn sample_record(id: &str) -> SnapshotRecord {
        SnapshotRecord {
            snapshot_id: id.to_string(),
            source_volume: "C:".to_string(),
            created_at: SystemTime::now(),
            server_name: None,
            is_remote: false,
            shadow_root: PathBuf::from("/nonexistent/shadow"),
            source_link: PathBuf::from("/nonexistent/link"),
        }
    }

    #[test]
    fn test_record_and_untrack() {
        let dir = tempdir().unwrap();
        let tracking = SnapshotTrackingFile::new(dir.path());
        tracking.record(sample_record("a")).unwrap();
        tracking.record(sample_record("b")).unwrap();
        assert_eq!(tracking.read_all().len(), 2);

        tracking.untrack("a").unwrap();
        let remaining = tracking.read_all();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].snapshot_id, "b");
    }

    #[test]
    fn test_recover_orphans_clears_file() {
        let dir = tempdir().unwrap();
        let tracking = SnapshotTrackingFile::new(dir.path());
        tracking.record(sample_record("orphan")).unwrap();

        recover_orphans(&tracking);
        assert!(tracking.read_all().is_empty());
        assert!(!dir.path().join(TRACKING_FILE_NAME).exists());
    }

    #[test]
    fn test_recover_orphans_deletes_shadow_root() {
        let dir = tempdir().unwrap();
        let tracking = SnapshotTrackingFile::new(dir.path());

        let shadow = tempdir().unwrap();
        let shadow_root = shadow.path().to_path_buf();
        std::mem::forget(shadow);
        let record = SnapshotRecord {
            shadow_root: shadow_root.clone(),
            source_link: dir.path().join("not-a-symlink"),
            ..sample_record("orphan-with-real-shadow")
        };
        tracking.record(record).unwrap();

        recover_orphans(&tracking);
        assert!(!shadow_root.exists(), "orphan recovery must actually delete the shadow root, not just log it");
    }
}
