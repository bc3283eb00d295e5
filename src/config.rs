/*!
 * Configuration structures consumed by the orchestrator
 *
 * The core never loads or validates a configuration *file* — that is an
 * external collaborator's job (see crate-level docs). Everything here is
 * plain in-memory data the caller (CLI or embedder) constructs directly.
 */

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a directory tree is scanned for chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Recursively split subtrees that exceed the configured limits.
    Smart,
    /// Each immediate top-level directory becomes exactly one chunk
    /// (equivalent to `Smart` with `max_depth` forced to 0).
    Flat,
}

impl Default for ScanMode {
    fn default() -> Self {
        ScanMode::Smart
    }
}

/// Severity assigned to a copier exit that reports mismatches only
/// (bit 2 of the exit code, no copy errors or fatal bits set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchSeverity {
    Success,
    Warning,
    Error,
}

impl Default for MismatchSeverity {
    fn default() -> Self {
        MismatchSeverity::Warning
    }
}

/// Size/count/depth thresholds that bound chunker recursion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkLimits {
    pub max_size_bytes: u64,
    pub max_files: u64,
    pub max_depth: u32,
    pub min_size_bytes: u64,
}

impl ChunkLimits {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_size_bytes <= self.min_size_bytes {
            return Err(format!(
                "max_size_bytes ({}) must exceed min_size_bytes ({})",
                self.max_size_bytes, self.min_size_bytes
            ));
        }
        Ok(())
    }
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_size_bytes: 10 * 1024 * 1024 * 1024, // 10 GB
            max_files: 50_000,
            max_depth: 4,
            min_size_bytes: 64 * 1024 * 1024, // 64 MB
        }
    }
}

/// Options passed through to every copier invocation for a profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopierOptions {
    /// Extra switches supplied by the operator; switches colliding with a
    /// managed one (threads, retries, log, mirror, tee, no-progress, bytes)
    /// are silently dropped by the argument builder.
    pub custom_switches: Vec<String>,
    /// Glob-like patterns of files to exclude.
    pub exclude_file_patterns: Vec<String>,
    /// Glob-like patterns of directories to exclude.
    pub exclude_dir_patterns: Vec<String>,
    pub retry_count: u32,
    pub retry_wait_secs: u32,
    pub no_mirror: bool,
    pub skip_junctions: bool,
    /// Overrides the run-wide default mismatch severity for this profile.
    pub mismatch_severity_override: Option<MismatchSeverity>,
}

/// One source/destination pair plus its per-copy options, executed as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncProfile {
    pub name: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub snapshot_requested: bool,
    pub scan_mode: ScanMode,
    pub chunk_limits: ChunkLimits,
    pub copier_options: CopierOptions,
}

impl SyncProfile {
    pub fn new(name: impl Into<String>, source: PathBuf, destination: PathBuf) -> Self {
        Self {
            name: name.into(),
            source,
            destination,
            snapshot_requested: false,
            scan_mode: ScanMode::default(),
            chunk_limits: ChunkLimits::default(),
            copier_options: CopierOptions::default(),
        }
    }

    /// Effective chunk limits for `Flat` scan mode (max_depth forced to 0).
    pub fn effective_chunk_limits(&self) -> ChunkLimits {
        match self.scan_mode {
            ScanMode::Smart => self.chunk_limits,
            ScanMode::Flat => ChunkLimits {
                max_depth: 0,
                ..self.chunk_limits
            },
        }
    }
}

/// Run-wide configuration passed to `Orchestrator::start_run`.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub profiles: Vec<SyncProfile>,
    pub max_concurrent: usize,
    /// Aggregate bandwidth budget across all active jobs, in Mbps. `0` disables throttling.
    pub bandwidth_limit_mbps: u64,
    /// Pass `/list_only` to the copier instead of performing the mirror.
    pub preview: bool,
    /// Request per-file log verbosity from the copier (disables the
    /// default `/no_file_list /no_dir_list` suppression).
    pub verbose: bool,
    pub ignore_checkpoint: bool,
    /// Root directory under which per-session logs, checkpoints, and
    /// per-chunk copier logs are written.
    pub log_root: PathBuf,
    pub default_mismatch_severity: MismatchSeverity,
    pub max_chunk_retries: u32,
    pub checkpoint_frequency: u64,
    pub health_interval_secs: u64,
    pub profiling_workers: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            profiles: Vec::new(),
            max_concurrent: 4,
            bandwidth_limit_mbps: 0,
            preview: false,
            verbose: false,
            ignore_checkpoint: false,
            log_root: PathBuf::from("."),
            default_mismatch_severity: MismatchSeverity::default(),
            max_chunk_retries: 3,
            checkpoint_frequency: 5,
            health_interval_secs: 10,
            profiling_workers: 4,
        }
    }
}
