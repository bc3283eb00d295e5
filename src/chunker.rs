/*!
 * Chunker
 *
 * Recursively partitions a source tree into chunks bounded by size, file
 * count, and depth, so each chunk is independently copyable by one copier
 * invocation.
 */

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::ChunkLimits;
use crate::error::{OrchestratorError, Result};
use crate::profiler::ProfileCache;

static NEXT_CHUNK_ID: AtomicU64 = AtomicU64::new(1);

/// Reset the run-scoped chunk id counter. Call once per run, before the
/// first `chunk()` invocation.
pub fn reset_chunk_ids() {
    NEXT_CHUNK_ID.store(1, Ordering::SeqCst);
}

fn next_chunk_id() -> u64 {
    NEXT_CHUNK_ID.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    Running,
    Complete,
    CompleteWithWarnings,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: u64,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub estimated_size: u64,
    pub estimated_files: u64,
    pub is_files_only: bool,
    pub status: ChunkStatus,
    pub retry_count: u32,
    pub retry_after: Option<std::time::Instant>,
    pub extra_switches: Vec<String>,
}

impl Chunk {
    fn new(source_path: PathBuf, destination_path: PathBuf, estimated_size: u64, estimated_files: u64) -> Self {
        Self {
            id: next_chunk_id(),
            source_path,
            destination_path,
            estimated_size,
            estimated_files,
            is_files_only: false,
            status: ChunkStatus::Pending,
            retry_count: 0,
            retry_after: None,
            extra_switches: Vec::new(),
        }
    }

    fn files_only(source_path: PathBuf, destination_path: PathBuf, estimated_size: u64, estimated_files: u64) -> Self {
        let mut chunk = Self::new(source_path, destination_path, estimated_size, estimated_files);
        chunk.is_files_only = true;
        chunk.extra_switches.push("/lev:1".to_string());
        chunk
    }
}

fn derive_destination(source: &Path, src_root: &Path, dst_root: &Path) -> Result<PathBuf> {
    let src_root_norm = crate::profiler::normalize_path(src_root);
    let source_norm = crate::profiler::normalize_path(source);
    if !source_norm.starts_with(&src_root_norm) {
        return Err(OrchestratorError::Configuration(format!(
            "chunk path {} is not under source root {}",
            source.display(),
            src_root.display()
        )));
    }
    let suffix = &source.to_string_lossy()[src_root.to_string_lossy().len()..];
    let suffix = suffix.trim_start_matches(['/', '\\']);
    Ok(dst_root.join(suffix))
}

/// Recursively partition `path` into chunks under `limits`.
pub fn chunk(
    cache: &ProfileCache,
    path: &Path,
    dst_root: &Path,
    src_root: &Path,
    limits: &ChunkLimits,
    depth: u32,
) -> Result<Vec<Chunk>> {
    limits
        .validate()
        .map_err(OrchestratorError::Configuration)?;
    if !path.is_dir() {
        return Err(OrchestratorError::PreFlight(format!(
            "{} does not exist or is not a directory",
            path.display()
        )));
    }

    let profile = cache.profile(path, true)?;
    let destination = derive_destination(path, src_root, dst_root)?;

    if profile.total_bytes <= limits.max_size_bytes && profile.file_count <= limits.max_files {
        return Ok(vec![Chunk::new(
            path.to_path_buf(),
            destination,
            profile.total_bytes,
            profile.file_count,
        )]);
    }

    if depth >= limits.max_depth {
        tracing::warn!(
            path = %path.display(),
            depth,
            "directory exceeds limits but max depth reached, emitting single chunk"
        );
        return Ok(vec![Chunk::new(
            path.to_path_buf(),
            destination,
            profile.total_bytes,
            profile.file_count,
        )]);
    }

    if profile.total_bytes < limits.min_size_bytes {
        return Ok(vec![Chunk::new(
            path.to_path_buf(),
            destination,
            profile.total_bytes,
            profile.file_count,
        )]);
    }

    let mut children = Vec::new();
    let mut has_loose_files = false;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            children.push(entry.path());
        } else if file_type.is_file() {
            has_loose_files = true;
        }
    }

    if children.is_empty() {
        return Ok(vec![Chunk::new(
            path.to_path_buf(),
            destination,
            profile.total_bytes,
            profile.file_count,
        )]);
    }

    let mut chunks = Vec::new();
    for child in &children {
        chunks.extend(chunk(cache, child, dst_root, src_root, limits, depth + 1)?);
    }

    if has_loose_files {
        // Count only the files directly in `path`, not in subdirectories,
        // so the files-only chunk's estimate doesn't double the totals
        // already covered by the child chunks above.
        let mut loose_bytes = 0u64;
        let mut loose_files = 0u64;
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                loose_files += 1;
                loose_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        chunks.push(Chunk::files_only(
            path.to_path_buf(),
            destination,
            loose_bytes,
            loose_files,
        ));
    }

    Ok(chunks)
}
