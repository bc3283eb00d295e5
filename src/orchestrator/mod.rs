/*!
 * Orchestrator
 *
 * The state machine at the center of a run: admits chunks into a bounded
 * pool of copier processes, reaps completions, retries or fails them,
 * and walks through profiles in sequence. `tick` is meant to be invoked
 * on a steady cadence (~500 ms) by the owning driver; nothing in here
 * blocks waiting for a copier process.
 */

pub mod retry;
mod state;

pub use state::{Phase, ProfileResult};

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::Receiver;
use uuid::Uuid;

use crate::bandwidth;
use crate::checkpoint::Checkpoint;
use crate::chunker::{self, Chunk, ChunkStatus};
use crate::config::{MismatchSeverity, RunConfig, SyncProfile};
use crate::copier::{ActiveJob, Severity};
use crate::error::{OrchestratorError, Result};
use crate::events::{ChunkSeverity, Event, EventKind, EventPublisher};
use crate::health::{HealthReporter, HealthStatus};
use crate::profiler::ProfileCache;
use crate::snapshot::{self, Snapshot, SnapshotTrackingFile};
use retry::BackoffPolicy;
use state::OrchestrationState;

pub struct Orchestrator {
    state: Arc<OrchestrationState>,
    config: RunConfig,
    profile_cache: ProfileCache,
    checkpoint: parking_lot::Mutex<Option<Checkpoint>>,
    health: HealthReporter,
    events: EventPublisher,
    events_receiver: Receiver<Event>,
    backoff: BackoffPolicy,
    run_dir: PathBuf,
    tracking: SnapshotTrackingFile,
}

#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub phase: Phase,
    pub profile_index: usize,
    pub profile_count: usize,
    pub current_profile: Option<String>,
    pub chunks_total: u64,
    pub chunks_completed: u64,
    pub chunks_pending: u64,
    pub chunks_failed: u64,
    pub active_jobs: usize,
    pub bytes_completed: u64,
}

impl Orchestrator {
    pub fn new(config: RunConfig) -> Self {
        Self::with_session_id(config, Uuid::new_v4())
    }

    /// Like `new`, but reuses an existing session id so the checkpoint
    /// and health document of a prior, abandoned run are picked back up
    /// instead of starting a fresh, empty one. Used by the `resume` CLI
    /// path once it has located the session id of the run to continue.
    pub fn with_session_id(config: RunConfig, session_id: Uuid) -> Self {
        let (events, events_receiver) = EventPublisher::new(session_id);
        let run_dir = config
            .log_root
            .join(Utc::now().format("%Y-%m-%d").to_string())
            .join(session_id.to_string());

        Self {
            state: Arc::new(OrchestrationState::new(session_id)),
            profile_cache: ProfileCache::new(Duration::from_secs(600), 512),
            checkpoint: parking_lot::Mutex::new(None),
            health: HealthReporter::new(&health_dir(), config.health_interval_secs),
            events,
            events_receiver,
            backoff: BackoffPolicy::default(),
            tracking: SnapshotTrackingFile::new(&health_dir()),
            run_dir,
            config,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.state.session_id
    }

    pub fn events(&self) -> Receiver<Event> {
        self.events_receiver.clone()
    }

    /// Results of every profile that has completed so far this run.
    pub fn profile_results(&self) -> Vec<ProfileResult> {
        self.state.profile_results.lock().clone()
    }

    /// Validates copier availability, initializes state, loads a
    /// checkpoint unless `ignore_checkpoint` is set, and begins the
    /// first profile.
    pub fn start_run(&self) -> Result<()> {
        if self.config.profiles.is_empty() {
            return Err(OrchestratorError::Configuration("no profiles configured".into()));
        }
        ensure_copier_available()?;

        snapshot::recover_orphans(&self.tracking);

        chunker::reset_chunk_ids();

        {
            let mut refs = self.state.refs.lock();
            refs.phase = Phase::Replicating;
            refs.profiles = self.config.profiles.clone();
            refs.start_time = Some(Utc::now());
        }

        if !self.config.ignore_checkpoint {
            *self.checkpoint.lock() = Checkpoint::load(&self.run_dir);
        }

        self.events.publish(EventKind::SessionStart {
            profile_count: self.config.profiles.len(),
        });

        self.begin_profile(0)?;
        Ok(())
    }

    fn begin_profile(&self, index: usize) -> Result<()> {
        let profile = {
            let refs = self.state.refs.lock();
            refs.profiles.get(index).cloned()
        };
        let Some(profile) = profile else {
            self.finish_run();
            return Ok(());
        };

        self.state.set_phase(Phase::Scanning);
        self.events.publish(EventKind::ProfileStart {
            profile_name: profile.name.clone(),
            profile_index: index,
        });

        let scan_source = if profile.snapshot_requested {
            match self.create_snapshot(&profile) {
                Ok(snapshot) => {
                    let path = snapshot.source_link.clone();
                    let mut refs = self.state.refs.lock();
                    refs.current_snapshot = Some(snapshot);
                    path
                }
                Err(err) => {
                    tracing::warn!(profile = %profile.name, %err, "snapshot failed, proceeding without it");
                    self.state.push_error(format!("snapshot failed for {}: {}", profile.name, err));
                    profile.source.clone()
                }
            }
        } else {
            profile.source.clone()
        };

        let limits = profile.effective_chunk_limits();
        let chunks = chunker::chunk(
            &self.profile_cache,
            &scan_source,
            &profile.destination,
            &scan_source,
            &limits,
            0,
        )?;

        self.state.profile_index.store(index as u64, Ordering::SeqCst);
        self.state
            .total_chunks_current_profile
            .store(chunks.len() as u64, Ordering::SeqCst);
        self.state.total_bytes_current_profile.store(
            chunks.iter().map(|c| c.estimated_size).sum(),
            Ordering::SeqCst,
        );
        self.state
            .profile_start_files
            .store(self.state.completed_chunk_files.load(Ordering::SeqCst), Ordering::SeqCst);
        self.state
            .profile_start_bytes
            .store(self.state.completed_chunk_bytes.load(Ordering::SeqCst), Ordering::SeqCst);
        self.state.profile_start_skipped_count.store(
            self.state.skipped_chunk_count.load(Ordering::SeqCst),
            Ordering::SeqCst,
        );
        self.state.profile_start_skipped_bytes.store(
            self.state.skipped_chunk_bytes.load(Ordering::SeqCst),
            Ordering::SeqCst,
        );

        {
            let mut refs = self.state.refs.lock();
            refs.current_profile = Some(profile.clone());
            refs.profile_start_time = Some(Utc::now());
            refs.profile_start_instant = Some(Instant::now());
            refs.phase = Phase::Replicating;
        }

        let checkpoint = self.checkpoint.lock().clone();
        for chunk in chunks {
            if let Some(checkpoint) = &checkpoint {
                if checkpoint.is_completed(&chunk.source_path.to_string_lossy()) {
                    self.state.skipped_chunk_count.fetch_add(1, Ordering::SeqCst);
                    self.state
                        .skipped_chunk_bytes
                        .fetch_add(chunk.estimated_size, Ordering::SeqCst);
                    continue;
                }
            }
            self.state.enqueue(chunk);
        }

        Ok(())
    }

    fn create_snapshot(&self, profile: &SyncProfile) -> Result<Snapshot> {
        let provider = snapshot::provider_for(&profile.source);
        let snap = provider.create(&profile.source, 3, Duration::from_secs(5))?;
        self.tracking.record(snap.record.clone())?;
        self.events.publish(EventKind::SnapshotCreated {
            snapshot_id: snap.record.snapshot_id.clone(),
            source_volume: snap.record.source_volume.clone(),
        });
        Ok(snap)
    }

    fn teardown_snapshot(&self) {
        let taken = self.state.refs.lock().current_snapshot.take();
        if let Some(snapshot) = taken {
            let snapshot_id = snapshot.record.snapshot_id.clone();
            let provider = if snapshot.record.is_remote {
                snapshot::provider_for(std::path::Path::new(r"\\placeholder\share"))
            } else {
                snapshot::provider_for(std::path::Path::new("/"))
            };
            if let Err(err) = provider.remove(snapshot) {
                tracing::warn!(%snapshot_id, %err, "failed to tear down snapshot");
            } else {
                let _ = self.tracking.untrack(&snapshot_id);
                self.events.publish(EventKind::SnapshotRemoved { snapshot_id });
            }
        }
    }

    pub fn request_stop(&self) {
        self.state.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn request_pause(&self) {
        self.state.pause_requested.store(true, Ordering::SeqCst);
    }

    pub fn request_resume(&self) {
        self.state.pause_requested.store(false, Ordering::SeqCst);
    }

    /// The admission-and-completion loop. Intended to be called roughly
    /// every 500ms by the owning run until phase is terminal.
    pub fn tick(&self, max_concurrent: usize) -> Result<()> {
        if self.state.stop_requested.load(Ordering::SeqCst) {
            self.stop_all_jobs();
            return Ok(());
        }

        if self.state.phase() != Phase::Replicating {
            return Ok(());
        }

        self.reap_completed_jobs()?;

        if !self.state.pause_requested.load(Ordering::SeqCst) {
            self.admit_new_jobs(max_concurrent)?;
        }

        if self.state.queue_is_empty() && self.state.active_jobs.is_empty() {
            self.complete_current_profile()?;
        }

        self.write_health_if_due();

        Ok(())
    }

    fn reap_completed_jobs(&self) -> Result<()> {
        let exited: Vec<u32> = self
            .state
            .active_jobs
            .iter_mut()
            .filter_map(|mut entry| entry.value_mut().try_wait().ok().flatten().map(|_| *entry.key()))
            .collect();

        for pid in exited {
            let Some((_, mut job)) = self.state.active_jobs.remove(&pid) else {
                continue;
            };
            let status = job.try_wait().ok().flatten();
            let failed = match status {
                Some(status) => self.handle_completion(job, status)?,
                None => false,
            };

            let completed = self.state.completed_count.fetch_add(1, Ordering::SeqCst) + 1;
            if failed || completed % self.config.checkpoint_frequency == 0 {
                self.write_checkpoint();
            }
        }
        Ok(())
    }

    /// Runs the completion handler for one exited job. Returns `true` if
    /// the chunk ended up permanently failed, so the caller can force an
    /// out-of-cadence checkpoint write.
    fn handle_completion(&self, job: ActiveJob, status: std::process::ExitStatus) -> Result<bool> {
        let mismatch_severity = {
            let refs = self.state.refs.lock();
            refs.current_profile
                .as_ref()
                .and_then(|p| p.copier_options.mismatch_severity_override)
                .unwrap_or(self.config.default_mismatch_severity)
        };

        let completion = job.complete(status, mismatch_severity);
        let duration_ms = job.started_at.elapsed().as_millis() as u64;
        let exit_code = status.code().unwrap_or(-1);
        let ActiveJob { mut chunk, .. } = job;

        let permanently_failed = match completion.severity {
            Severity::Success | Severity::Warning => {
                chunk.status = ChunkStatus::Complete;
                let chunk_id = chunk.id;
                self.state.completed_chunks.lock().push(chunk);
                self.state
                    .bytes_complete
                    .fetch_add(completion.stats.bytes_copied, Ordering::SeqCst);
                self.state
                    .completed_chunk_bytes
                    .fetch_add(completion.stats.bytes_copied, Ordering::SeqCst);
                self.state
                    .completed_chunk_files
                    .fetch_add(completion.stats.files_copied, Ordering::SeqCst);
                self.events.publish(EventKind::ChunkComplete {
                    chunk_id,
                    severity: ChunkSeverity::from_mismatch(mismatch_severity),
                    exit_code,
                    bytes: completion.stats.bytes_copied,
                    duration_ms,
                });
                false
            }
            Severity::Error | Severity::Fatal if completion.retryable => {
                self.retry_or_fail(chunk, exit_code, &completion.message)
            }
            _ => {
                self.mark_permanently_failed(chunk, exit_code, &completion.message);
                true
            }
        };
        Ok(permanently_failed)
    }

    /// Increment `retry_count`; re-enqueue at `retry_after` if the chunk
    /// still has budget, otherwise give up permanently. Returns `true` if
    /// the chunk was given up on.
    fn retry_or_fail(&self, mut chunk: Chunk, exit_code: i32, message: &str) -> bool {
        chunk.retry_count += 1;
        self.events.publish(EventKind::ChunkError {
            chunk_id: chunk.id,
            exit_code,
            message: message.to_string(),
            will_retry: retry::decide(chunk.retry_count, self.config.max_chunk_retries) == retry::RetryDecision::RetryAt,
        });
        self.state.push_error(format!("chunk {} failed transiently: {}", chunk.id, message));

        match retry::decide(chunk.retry_count, self.config.max_chunk_retries) {
            retry::RetryDecision::RetryAt => {
                chunk.retry_after = Some(self.backoff.retry_after(chunk.retry_count, Instant::now()));
                chunk.status = ChunkStatus::Pending;
                self.state.enqueue(chunk);
                false
            }
            retry::RetryDecision::GiveUp => {
                self.mark_permanently_failed(chunk, exit_code, message);
                true
            }
        }
    }

    fn mark_permanently_failed(&self, mut chunk: Chunk, exit_code: i32, message: &str) {
        chunk.status = ChunkStatus::Failed;
        self.events.publish(EventKind::ChunkError {
            chunk_id: chunk.id,
            exit_code,
            message: message.to_string(),
            will_retry: false,
        });
        self.state.push_error(format!("chunk {} failed permanently: {}", chunk.id, message));
        self.state.failed_chunks.lock().push(chunk);
    }

    fn admit_new_jobs(&self, max_concurrent: usize) -> Result<()> {
        let mut deferred = Vec::new();

        while self.state.active_jobs.len() < max_concurrent {
            let Some(chunk) = self.state.dequeue() else {
                break;
            };

            if let Some(checkpoint) = self.checkpoint.lock().as_ref() {
                if checkpoint.is_completed(&chunk.source_path.to_string_lossy()) {
                    self.state.skipped_chunk_count.fetch_add(1, Ordering::SeqCst);
                    self.state
                        .skipped_chunk_bytes
                        .fetch_add(chunk.estimated_size, Ordering::SeqCst);
                    continue;
                }
            }

            if let Some(retry_after) = chunk.retry_after {
                if retry_after > Instant::now() {
                    deferred.push(chunk);
                    continue;
                }
            }

            self.start_job(chunk)?;
        }

        for chunk in deferred {
            self.state.enqueue(chunk);
        }
        Ok(())
    }

    fn start_job(&self, chunk: Chunk) -> Result<()> {
        let (thread_count, options, log_root_day, preview, verbose, gap_ms) = {
            let refs = self.state.refs.lock();
            let profile = refs
                .current_profile
                .as_ref()
                .expect("profile must be set before jobs are started");
            let active = self.state.active_jobs.len();
            let gap_ms = bandwidth::gap(self.config.bandwidth_limit_mbps, active, true);
            (
                4u32,
                profile.copier_options.clone(),
                self.run_dir.join("Jobs"),
                self.config.preview,
                self.config.verbose,
                gap_ms,
            )
        };

        let log_path = log_root_day.join(format!("Chunk_{:03}.log", chunk.id));

        self.events.publish(EventKind::ChunkStart {
            chunk_id: chunk.id,
            source: chunk.source_path.to_string_lossy().to_string(),
            destination: chunk.destination_path.to_string_lossy().to_string(),
        });

        let fallback = chunk.clone();
        match ActiveJob::spawn(chunk, log_path, thread_count, &options, preview, verbose, gap_ms) {
            Ok(job) => {
                self.state.active_jobs.insert(job.process_id(), job);
            }
            Err(err) => {
                self.mark_permanently_failed(fallback, -1, &err.to_string());
            }
        }
        Ok(())
    }

    fn complete_current_profile(&self) -> Result<()> {
        let (profile_name, index, duration) = {
            let refs = self.state.refs.lock();
            let name = refs
                .current_profile
                .as_ref()
                .map(|p| p.name.clone())
                .unwrap_or_default();
            let duration = refs
                .profile_start_instant
                .map(|i| i.elapsed())
                .unwrap_or_default();
            (name, self.state.profile_index.load(Ordering::SeqCst) as usize, duration)
        };

        let skipped_bytes_this_profile = self.state.skipped_chunk_bytes.load(Ordering::SeqCst)
            - self.state.profile_start_skipped_bytes.load(Ordering::SeqCst);

        let result = ProfileResult {
            profile_name: profile_name.clone(),
            chunks_total: self.state.total_chunks_current_profile.load(Ordering::SeqCst) as usize,
            chunks_complete: self.state.completed_chunks.lock().len(),
            chunks_failed: self.state.failed_chunks.lock().len(),
            chunks_skipped: (self.state.skipped_chunk_count.load(Ordering::SeqCst)
                - self.state.profile_start_skipped_count.load(Ordering::SeqCst))
                as usize,
            bytes_copied: (self.state.completed_chunk_bytes.load(Ordering::SeqCst)
                - self.state.profile_start_bytes.load(Ordering::SeqCst))
                + skipped_bytes_this_profile,
            files_copied: self.state.completed_chunk_files.load(Ordering::SeqCst)
                - self.state.profile_start_files.load(Ordering::SeqCst),
            duration,
            error_messages: self.state.error_messages.lock().iter().cloned().collect(),
        };

        self.state.profile_results.lock().push(result.clone());
        self.teardown_snapshot();

        self.events.publish(EventKind::ProfileComplete {
            profile_name,
            chunks_total: result.chunks_total,
            chunks_complete: result.chunks_complete,
            chunks_failed: result.chunks_failed,
            chunks_skipped: result.chunks_skipped,
            bytes_copied: result.bytes_copied,
        });

        // Drain in place: observers may be iterating a snapshot of these
        // collections, so the containers themselves are never replaced.
        self.state.completed_chunks.lock().clear();
        self.state.failed_chunks.lock().clear();
        self.state.drain_queue();

        self.begin_profile(index + 1)
    }

    fn finish_run(&self) {
        self.state.set_phase(Phase::Complete);
        Checkpoint::remove(&self.run_dir);
        self.health.write_status(self.build_health_status(), true).ok();
        self.health.remove();
        self.events.publish(EventKind::SessionEnd {
            reason: "complete".to_string(),
        });
    }

    fn stop_all_jobs(&self) {
        let pids: Vec<u32> = self.state.active_jobs.iter().map(|e| *e.key()).collect();
        for pid in pids {
            if let Some((_, mut job)) = self.state.active_jobs.remove(&pid) {
                job.kill();
            }
        }
        self.teardown_snapshot();
        self.state.set_phase(Phase::Stopped);
        self.events.publish(EventKind::SessionEnd {
            reason: "stopped".to_string(),
        });
    }

    fn write_checkpoint(&self) {
        let mut checkpoint = self.checkpoint.lock();
        let session_id = self.state.session_id;
        let start_time = {
            self.state
                .refs
                .lock()
                .start_time
                .unwrap_or_else(Utc::now)
        };
        let c = checkpoint.get_or_insert_with(|| Checkpoint::new(session_id, start_time));
        c.saved_at = Utc::now();
        c.profile_index = self.state.profile_index.load(Ordering::SeqCst) as usize;
        c.current_profile_name = self
            .state
            .refs
            .lock()
            .current_profile
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_default();
        c.completed_count = self.state.completed_count.load(Ordering::SeqCst);
        c.failed_count = self.state.failed_chunks.lock().len() as u64;
        c.bytes_complete = self.state.bytes_complete.load(Ordering::SeqCst);
        c.completed_chunk_paths = self
            .state
            .completed_chunks
            .lock()
            .iter()
            .map(|chunk| Some(chunk.source_path.to_string_lossy().to_string()))
            .collect();

        if let Err(err) = c.save(&self.run_dir) {
            tracing::warn!(%err, "failed to write checkpoint");
        }
    }

    fn write_health_if_due(&self) {
        let status = self.build_health_status();
        if let Err(err) = self.health.write_status(status, false) {
            tracing::warn!(%err, "failed to write health document");
        }
    }

    fn build_health_status(&self) -> HealthStatus {
        let refs = self.state.refs.lock();
        HealthStatus {
            timestamp: Utc::now(),
            phase: refs.phase.as_str().to_string(),
            current_profile: refs.current_profile.as_ref().map(|p| p.name.clone()),
            profile_index: self.state.profile_index.load(Ordering::SeqCst) as usize,
            profile_count: refs.profiles.len(),
            chunks_completed: self.state.completed_count.load(Ordering::SeqCst),
            chunks_total: self.state.total_chunks_current_profile.load(Ordering::SeqCst),
            chunks_pending: self.state.queue_len() as u64,
            chunks_failed: self.state.failed_chunks.lock().len() as u64,
            active_jobs: self.state.active_jobs.len(),
            bytes_completed: self.state.bytes_complete.load(Ordering::SeqCst),
            eta_seconds: None,
            session_id: self.state.session_id,
            healthy: refs.phase != Phase::Stopped,
            message: String::new(),
            is_stale: false,
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let refs = self.state.refs.lock();
        ProgressSnapshot {
            phase: refs.phase,
            profile_index: self.state.profile_index.load(Ordering::SeqCst) as usize,
            profile_count: refs.profiles.len(),
            current_profile: refs.current_profile.as_ref().map(|p| p.name.clone()),
            chunks_total: self.state.total_chunks_current_profile.load(Ordering::SeqCst),
            chunks_completed: self.state.completed_count.load(Ordering::SeqCst),
            chunks_pending: self.state.queue_len() as u64,
            chunks_failed: self.state.failed_chunks.lock().len() as u64,
            active_jobs: self.state.active_jobs.len(),
            bytes_completed: self.state.bytes_complete.load(Ordering::SeqCst),
        }
    }
}

/// Directory the health document and snapshot tracking file live in.
/// Always the OS temp directory in production; overridable via
/// `PARASYNC_HEALTH_DIR` so concurrent test runs don't collide on it.
fn health_dir() -> PathBuf {
    std::env::var_os("PARASYNC_HEALTH_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

fn ensure_copier_available() -> Result<()> {
    let binary = crate::copier::driver::copier_binary();
    if which_binary(&binary).is_none() {
        return Err(OrchestratorError::Configuration(format!(
            "copier executable '{}' not found on PATH",
            binary
        )));
    }
    Ok(())
}

fn which_binary(name: &str) -> Option<PathBuf> {
    if std::path::Path::new(name).is_absolute() && std::path::Path::new(name).exists() {
        return Some(PathBuf::from(name));
    }
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths).find_map(|dir| {
            let candidate = dir.join(name);
            candidate.exists().then_some(candidate)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_run_without_profiles_errors() {
        let config = RunConfig::default();
        let orchestrator = Orchestrator::new(config);
        assert!(orchestrator.start_run().is_err());
    }
}
