/*!
 * Structured lifecycle events
 *
 * The orchestrator is headless: it never calls into a UI thread directly.
 * Instead it publishes events on a bounded crossbeam channel and observers
 * (a logging sink, a TUI, a test harness) drain it independently.
 */

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use uuid::Uuid;

use crate::config::MismatchSeverity;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum EventKind {
    SessionStart {
        profile_count: usize,
    },
    SessionEnd {
        reason: String,
    },
    ProfileStart {
        profile_name: String,
        profile_index: usize,
    },
    ProfileComplete {
        profile_name: String,
        chunks_total: usize,
        chunks_complete: usize,
        chunks_failed: usize,
        chunks_skipped: usize,
        bytes_copied: u64,
    },
    ChunkStart {
        chunk_id: u64,
        source: String,
        destination: String,
    },
    ChunkComplete {
        chunk_id: u64,
        severity: ChunkSeverity,
        exit_code: i32,
        bytes: u64,
        duration_ms: u64,
    },
    ChunkError {
        chunk_id: u64,
        exit_code: i32,
        message: String,
        will_retry: bool,
    },
    ConfigChange {
        field: String,
    },
    EmailSent {
        recipient: String,
    },
    SnapshotCreated {
        snapshot_id: String,
        source_volume: String,
    },
    SnapshotRemoved {
        snapshot_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkSeverity {
    Success,
    Warning,
    Error,
    Fatal,
}

impl ChunkSeverity {
    pub fn from_mismatch(severity: MismatchSeverity) -> Self {
        match severity {
            MismatchSeverity::Success => ChunkSeverity::Success,
            MismatchSeverity::Warning => ChunkSeverity::Warning,
            MismatchSeverity::Error => ChunkSeverity::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub host: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Publishes events for a single session; cheap to clone, shares the channel.
#[derive(Clone)]
pub struct EventPublisher {
    session_id: Uuid,
    user: String,
    host: String,
    sender: Sender<Event>,
}

impl EventPublisher {
    pub fn new(session_id: Uuid) -> (Self, Receiver<Event>) {
        let (sender, receiver) = crossbeam_channel::bounded(1024);
        let publisher = Self {
            session_id,
            user: whoami_user(),
            host: whoami_host(),
            sender,
        };
        (publisher, receiver)
    }

    pub fn publish(&self, kind: EventKind) {
        log_event(&kind);
        let event = Event {
            session_id: self.session_id,
            timestamp: Utc::now(),
            user: self.user.clone(),
            host: self.host.clone(),
            kind,
        };
        // A full channel means no observer is draining it; dropping the
        // event is preferable to blocking the orchestration loop.
        let _ = self.sender.try_send(event);
    }
}

/// Mirror every lifecycle event into the tracing log so the operational
/// log and the event stream never drift out of sync.
fn log_event(kind: &EventKind) {
    match kind {
        EventKind::SessionStart { profile_count } => {
            tracing::info!(profile_count, "session started")
        }
        EventKind::SessionEnd { reason } => tracing::info!(reason, "session ended"),
        EventKind::ProfileStart { profile_name, profile_index } => {
            tracing::info!(profile_name, profile_index, "profile started")
        }
        EventKind::ProfileComplete {
            profile_name,
            chunks_total,
            chunks_complete,
            chunks_failed,
            chunks_skipped,
            bytes_copied,
        } => tracing::info!(
            profile_name,
            chunks_total,
            chunks_complete,
            chunks_failed,
            chunks_skipped,
            bytes_copied,
            "profile complete"
        ),
        EventKind::ChunkStart { chunk_id, source, destination } => {
            tracing::info!(chunk_id, source, destination, "chunk started")
        }
        EventKind::ChunkComplete { chunk_id, exit_code, bytes, duration_ms, .. } => {
            tracing::info!(chunk_id, exit_code, bytes, duration_ms, "chunk complete")
        }
        EventKind::ChunkError { chunk_id, exit_code, message, will_retry } => {
            tracing::warn!(chunk_id, exit_code, message, will_retry, "chunk error")
        }
        EventKind::ConfigChange { field } => tracing::info!(field, "config changed"),
        EventKind::EmailSent { recipient } => tracing::info!(recipient, "notification email sent"),
        EventKind::SnapshotCreated { snapshot_id, source_volume } => {
            tracing::info!(snapshot_id, source_volume, "snapshot created")
        }
        EventKind::SnapshotRemoved { snapshot_id } => {
            tracing::info!(snapshot_id, "snapshot removed")
        }
    }
}

fn whoami_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn whoami_host() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
