//! End-to-end: stopping mid-run kills active jobs and retains the
//! checkpoint; a run started against an existing checkpoint skips the
//! chunks it already recorded as complete.

mod common;

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use parasync::config::{ChunkLimits, MismatchSeverity, RunConfig, ScanMode, SyncProfile};
use parasync::orchestrator::{Orchestrator, Phase};

fn make_subdirs(root: &Path, count: usize) {
    for i in 0..count {
        let dir = root.join(format!("d{i}"));
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("f.bin"), vec![0u8; 128]).unwrap();
    }
}

/// Forces one chunk per top-level subdirectory: no subdirectory alone
/// exceeds these limits, but the root does, and it has nothing left to
/// split once it reaches each leaf directory.
fn splitting_limits() -> ChunkLimits {
    ChunkLimits {
        max_size_bytes: 0,
        max_files: 0,
        max_depth: 2,
        min_size_bytes: 0,
    }
}

fn tick_until(orchestrator: &Orchestrator, deadline: Duration, mut predicate: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < deadline {
        orchestrator.tick(1).unwrap();
        if predicate() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("condition not reached within {:?}", deadline);
}

#[test]
fn stop_mid_run_kills_jobs_and_keeps_checkpoint() {
    let _guard = common::RUN_LOCK.lock().unwrap();
    common::install_fake_copier();

    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let log_root = tempfile::tempdir().unwrap();
    let health_dir = tempfile::tempdir().unwrap();
    common::install_health_dir(health_dir.path());
    make_subdirs(src.path(), 3);

    let mut profile = SyncProfile::new("nightly", src.path().to_path_buf(), dst.path().to_path_buf());
    profile.scan_mode = ScanMode::Smart;
    profile.chunk_limits = splitting_limits();

    let config = RunConfig {
        profiles: vec![profile],
        max_concurrent: 1,
        log_root: log_root.path().to_path_buf(),
        checkpoint_frequency: 1,
        default_mismatch_severity: MismatchSeverity::Warning,
        ..RunConfig::default()
    };

    let orchestrator = Orchestrator::new(config);
    orchestrator.start_run().unwrap();
    assert_eq!(orchestrator.profile_results().len(), 0);

    tick_until(&orchestrator, Duration::from_secs(10), || {
        orchestrator.snapshot().chunks_completed >= 2
    });

    orchestrator.request_stop();
    orchestrator.tick(1).unwrap();

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.phase, Phase::Stopped);
    assert_eq!(snapshot.active_jobs, 0);

    let checkpoint_path = log_root
        .path()
        .join(chrono::Utc::now().format("%Y-%m-%d").to_string())
        .join(orchestrator.session_id().to_string())
        .join("replication-checkpoint.json");
    assert!(checkpoint_path.exists(), "checkpoint must survive a stop");

    let body = fs::read_to_string(&checkpoint_path).unwrap();
    assert!(body.contains("\"CompletedChunkPaths\""));
}

#[test]
fn resume_skips_chunks_the_checkpoint_already_completed() {
    let _guard = common::RUN_LOCK.lock().unwrap();
    common::install_fake_copier();

    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let log_root = tempfile::tempdir().unwrap();
    let health_dir = tempfile::tempdir().unwrap();
    common::install_health_dir(health_dir.path());
    make_subdirs(src.path(), 5);

    let build_profile = || {
        let mut profile = SyncProfile::new("nightly", src.path().to_path_buf(), dst.path().to_path_buf());
        profile.scan_mode = ScanMode::Smart;
        profile.chunk_limits = splitting_limits();
        profile
    };

    let config_a = RunConfig {
        profiles: vec![build_profile()],
        max_concurrent: 1,
        log_root: log_root.path().to_path_buf(),
        checkpoint_frequency: 1,
        default_mismatch_severity: MismatchSeverity::Warning,
        ..RunConfig::default()
    };

    let run_a = Orchestrator::new(config_a);
    run_a.start_run().unwrap();

    // Simulate a crash after exactly 3 of 5 chunks have completed: stop
    // ticking without calling request_stop or finish_run, so the
    // checkpoint on disk is the only record of what happened.
    tick_until(&run_a, Duration::from_secs(10), || {
        run_a.snapshot().chunks_completed >= 3
    });
    assert_eq!(run_a.snapshot().chunks_completed, 3);
    let session_id = run_a.session_id();
    drop(run_a);

    let config_b = RunConfig {
        profiles: vec![build_profile()],
        max_concurrent: 2,
        log_root: log_root.path().to_path_buf(),
        checkpoint_frequency: 1,
        ignore_checkpoint: false,
        default_mismatch_severity: MismatchSeverity::Warning,
        ..RunConfig::default()
    };

    let run_b = Orchestrator::with_session_id(config_b, session_id);
    run_b.start_run().unwrap();
    common::run_to_completion(&run_b, 2, 400);

    assert_eq!(run_b.snapshot().phase, Phase::Complete);

    let results = run_b.profile_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunks_total, 5);
    assert_eq!(results[0].chunks_skipped, 3);
    assert_eq!(results[0].chunks_complete, 2);
    assert_eq!(results[0].chunks_failed, 0);
}

