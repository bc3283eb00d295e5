/*!
 * Orchestration state
 *
 * Owned exclusively by one run. Counters are atomic; reference fields sit
 * behind a single lock taken only briefly by readers; the chunk/job/result
 * collections are concurrent containers that need no external lock at all.
 */

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::chunker::Chunk;
use crate::config::SyncProfile;
use crate::copier::ActiveJob;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scanning,
    Replicating,
    Complete,
    Stopped,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Scanning => "scanning",
            Phase::Replicating => "replicating",
            Phase::Complete => "complete",
            Phase::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileResult {
    pub profile_name: String,
    pub chunks_total: usize,
    pub chunks_complete: usize,
    pub chunks_failed: usize,
    pub chunks_skipped: usize,
    pub bytes_copied: u64,
    pub files_copied: u64,
    pub duration: std::time::Duration,
    pub error_messages: Vec<String>,
}

/// Reference fields mutated infrequently, guarded by a single lock.
pub struct StateRefs {
    pub phase: Phase,
    pub current_profile: Option<SyncProfile>,
    pub profiles: Vec<SyncProfile>,
    pub current_snapshot: Option<Snapshot>,
    pub start_time: Option<DateTime<Utc>>,
    pub profile_start_time: Option<DateTime<Utc>>,
    pub profile_start_instant: Option<Instant>,
}

pub struct OrchestrationState {
    pub session_id: Uuid,
    pub refs: Mutex<StateRefs>,
    pub profile_index: AtomicU64,
    pub total_chunks_current_profile: AtomicU64,
    pub total_bytes_current_profile: AtomicU64,

    pub completed_count: AtomicU64,
    pub bytes_complete: AtomicU64,
    pub completed_chunk_bytes: AtomicU64,
    pub completed_chunk_files: AtomicU64,
    pub skipped_chunk_count: AtomicU64,
    pub skipped_chunk_bytes: AtomicU64,
    pub profile_start_files: AtomicU64,
    pub profile_start_bytes: AtomicU64,
    pub profile_start_skipped_count: AtomicU64,
    pub profile_start_skipped_bytes: AtomicU64,

    pub stop_requested: AtomicBool,
    pub pause_requested: AtomicBool,

    chunk_sender: Sender<Chunk>,
    chunk_receiver: Receiver<Chunk>,
    pub active_jobs: DashMap<u32, ActiveJob>,
    pub completed_chunks: Mutex<Vec<Chunk>>,
    pub failed_chunks: Mutex<Vec<Chunk>>,
    pub profile_results: Mutex<Vec<ProfileResult>>,
    pub error_messages: Mutex<VecDeque<String>>,
}

const MAX_ERROR_MESSAGES: usize = 5;

impl OrchestrationState {
    pub fn new(session_id: Uuid) -> Self {
        let (chunk_sender, chunk_receiver) = crossbeam_channel::unbounded();
        Self {
            session_id,
            refs: Mutex::new(StateRefs {
                phase: Phase::Idle,
                current_profile: None,
                profiles: Vec::new(),
                current_snapshot: None,
                start_time: None,
                profile_start_time: None,
                profile_start_instant: None,
            }),
            profile_index: AtomicU64::new(0),
            total_chunks_current_profile: AtomicU64::new(0),
            total_bytes_current_profile: AtomicU64::new(0),
            completed_count: AtomicU64::new(0),
            bytes_complete: AtomicU64::new(0),
            completed_chunk_bytes: AtomicU64::new(0),
            completed_chunk_files: AtomicU64::new(0),
            skipped_chunk_count: AtomicU64::new(0),
            skipped_chunk_bytes: AtomicU64::new(0),
            profile_start_files: AtomicU64::new(0),
            profile_start_bytes: AtomicU64::new(0),
            profile_start_skipped_count: AtomicU64::new(0),
            profile_start_skipped_bytes: AtomicU64::new(0),
            stop_requested: AtomicBool::new(false),
            pause_requested: AtomicBool::new(false),
            chunk_sender,
            chunk_receiver,
            active_jobs: DashMap::new(),
            completed_chunks: Mutex::new(Vec::new()),
            failed_chunks: Mutex::new(Vec::new()),
            profile_results: Mutex::new(Vec::new()),
            error_messages: Mutex::new(VecDeque::new()),
        }
    }

    pub fn phase(&self) -> Phase {
        self.refs.lock().phase
    }

    pub fn set_phase(&self, phase: Phase) {
        self.refs.lock().phase = phase;
    }

    pub fn enqueue(&self, chunk: Chunk) {
        let _ = self.chunk_sender.send(chunk);
    }

    pub fn dequeue(&self) -> Option<Chunk> {
        self.chunk_receiver.try_recv().ok()
    }

    pub fn queue_len(&self) -> usize {
        self.chunk_receiver.len()
    }

    pub fn queue_is_empty(&self) -> bool {
        self.chunk_receiver.is_empty()
    }

    /// Drain the queue in place without reassigning the channel, so any
    /// observer holding a clone of the receiver never sees a stale one.
    pub fn drain_queue(&self) {
        while self.chunk_receiver.try_recv().is_ok() {}
    }

    pub fn push_error(&self, message: String) {
        let mut messages = self.error_messages.lock();
        messages.push_back(message);
        while messages.len() > MAX_ERROR_MESSAGES {
            messages.pop_front();
        }
    }
}
