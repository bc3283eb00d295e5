/*!
 * parasync - Parallel replication orchestrator
 *
 * Drives concurrent invocations of an external directory-mirroring tool
 * ("the copier") to mirror source trees to destination trees, with
 * size/file-count-aware chunking, a bounded worker pool, bandwidth
 * governance, retry/backoff, crash-resumable checkpoints, and optional
 * snapshot-based consistency.
 */

pub mod bandwidth;
pub mod checkpoint;
pub mod chunker;
pub mod config;
pub mod copier;
pub mod error;
pub mod events;
pub mod health;
pub mod logging;
pub mod orchestrator;
pub mod profiler;
pub mod sanitize;
pub mod snapshot;

pub use config::{ChunkLimits, CopierOptions, MismatchSeverity, RunConfig, ScanMode, SyncProfile};
pub use error::{ErrorCategory, OrchestratorError, Result};
pub use orchestrator::{Orchestrator, Phase, ProfileResult, ProgressSnapshot};

/// Library version, surfaced by the CLI's `--version` flag.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
