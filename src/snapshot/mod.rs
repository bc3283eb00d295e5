/*!
 * Snapshot manager
 *
 * Exposes a volume's contents as they existed at an instant, so the
 * copier can read files that would otherwise be locked or changing
 * mid-copy. Local and remote snapshots are dispatched through the same
 * [`SnapshotProvider`] trait so the orchestrator doesn't care which one
 * it got.
 */

mod local;
mod remote;
mod tracking;

pub use local::LocalSnapshotProvider;
pub use remote::RemoteSnapshotProvider;
pub use tracking::{recover_orphans, SnapshotTrackingFile};

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub snapshot_id: String,
    pub source_volume: String,
    pub created_at: SystemTime,
    pub server_name: Option<String>,
    pub is_remote: bool,
    /// Device-level (or server-side) snapshot path. Persisted so a
    /// crash-orphaned snapshot can be released on the next startup without
    /// a live `Snapshot` handle.
    pub shadow_root: PathBuf,
    /// The directory-link or junction that exposed `shadow_root` to the
    /// copier, removed before the snapshot itself on release.
    pub source_link: PathBuf,
}

/// A live snapshot handle: enough to translate paths into it and to tear
/// it down again.
pub struct Snapshot {
    pub record: SnapshotRecord,
    /// The directory the copier should actually read from — a junction
    /// or directory-link pointing at the device-level snapshot path.
    pub source_link: PathBuf,
    /// Device-level (or server-side) snapshot path, used for translation.
    pub shadow_root: PathBuf,
    /// Original volume root the snapshot was taken of.
    pub source_root: PathBuf,
}

/// Rewrites `original` (rooted at `source_root`) into its snapshot
/// equivalent under `shadow_root`. Returns `shadow_root` unchanged for the
/// root-directory case.
pub fn translate(original: &Path, shadow_root: &Path, source_root: &Path) -> PathBuf {
    let source_norm = crate::profiler::normalize_path(source_root);
    let original_norm = crate::profiler::normalize_path(original);
    if original_norm == source_norm {
        return shadow_root.to_path_buf();
    }
    let suffix = &original.to_string_lossy()[source_root.to_string_lossy().len()..];
    let suffix = suffix.trim_start_matches(['/', '\\']);
    shadow_root.join(suffix)
}

/// Common seam for local vs. remote snapshot creation, so the caller
/// doesn't need to branch on path shape more than once.
pub trait SnapshotProvider: Send + Sync {
    fn create(&self, path: &Path, retry_count: u32, retry_delay: Duration) -> Result<Snapshot>;
    fn remove(&self, snapshot: Snapshot) -> Result<()>;
}

/// Substrings that, found in a copier or platform error message, mark the
/// failure as worth retrying even without a matching known error code.
const TRANSIENT_MESSAGE_HINTS: &[&str] = &["busy", "timeout", "lock", "in use", "try again"];

/// Known retryable platform error codes for snapshot creation.
const TRANSIENT_ERROR_CODES: &[i32] = &[
    -2147212300, // VSS_E_SNAPSHOT_SET_IN_PROGRESS-style busy code
    -2147212289, // VSS_E_MAXIMUM_NUMBER_OF_VOLUMES_REACHED-style transient
];

pub fn is_transient_failure(code: Option<i32>, message: &str) -> bool {
    if let Some(code) = code {
        if TRANSIENT_ERROR_CODES.contains(&code) {
            return true;
        }
    }
    let lower = message.to_lowercase();
    TRANSIENT_MESSAGE_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Pick the provider for `path`: a UNC path (`\\server\share...`) is
/// remote, everything else is local.
pub fn provider_for(path: &Path) -> Box<dyn SnapshotProvider> {
    let s = path.to_string_lossy();
    if s.starts_with(r"\\") {
        Box::new(RemoteSnapshotProvider::new())
    } else {
        Box::new(LocalSnapshotProvider::new())
    }
}

/// Create the server-side junction used by the remote provider, inside
/// the share's local directory, pointing at the snapshot-equivalent path.
#[cfg(windows)]
pub(crate) fn local_junction(target: &Path, junction_path: &Path) -> Result<()> {
    std::os::windows::fs::symlink_dir(target, junction_path)?;
    Ok(())
}

#[cfg(not(windows))]
pub(crate) fn local_junction(target: &Path, junction_path: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, junction_path)?;
    Ok(())
}

pub(crate) fn local_junction_remove(junction_path: &Path) -> std::io::Result<()> {
    if junction_path.is_symlink() {
        #[cfg(windows)]
        {
            std::fs::remove_dir(junction_path)
        }
        #[cfg(not(windows))]
        {
            std::fs::remove_file(junction_path)
        }
    } else {
        Ok(())
    }
}
