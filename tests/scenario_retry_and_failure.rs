//! End-to-end: transient copier errors are retried with backoff up to the
//! configured limit; a chunk whose exit code is fatal and non-retryable
//! fails after a single attempt.

mod common;

use std::fs;

use parasync::config::{MismatchSeverity, RunConfig, SyncProfile};
use parasync::orchestrator::{Orchestrator, Phase};

fn small_profile(name: &str, src: &std::path::Path, dst: &std::path::Path) -> SyncProfile {
    fs::write(src.join("a.txt"), vec![0u8; 1024]).unwrap();
    SyncProfile::new(name, src.to_path_buf(), dst.to_path_buf())
}

#[test]
fn transient_failure_is_retried_then_succeeds() {
    let _guard = common::RUN_LOCK.lock().unwrap();
    common::install_fake_copier();

    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let log_root = tempfile::tempdir().unwrap();
    let health_dir = tempfile::tempdir().unwrap();
    common::install_health_dir(health_dir.path());

    let profile = small_profile("nightly", src.path(), dst.path());
    let config = RunConfig {
        profiles: vec![profile],
        max_concurrent: 1,
        log_root: log_root.path().to_path_buf(),
        checkpoint_frequency: 1,
        max_chunk_retries: 3,
        default_mismatch_severity: MismatchSeverity::Warning,
        ..RunConfig::default()
    };

    let orchestrator = Orchestrator::new(config);

    // Chunk ids are reset to 1 at the start of every run, so the single
    // chunk this profile produces is always id 1.
    let jobs_dir = common::jobs_dir(log_root.path(), &orchestrator);
    common::seed_exit_codes(&jobs_dir, 1, &[8, 0]);

    orchestrator.start_run().unwrap();
    // Backoff after one retry is several seconds; give the run plenty of ticks.
    common::run_to_completion(&orchestrator, 1, 600);

    assert_eq!(orchestrator.snapshot().phase, Phase::Complete);

    let results = orchestrator.profile_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunks_complete, 1);
    assert_eq!(results[0].chunks_failed, 0);
    assert!(!results[0].error_messages.is_empty(), "the transient failure should have logged an error message");
}

#[test]
fn permanent_failure_gives_up_after_one_attempt() {
    let _guard = common::RUN_LOCK.lock().unwrap();
    common::install_fake_copier();

    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let log_root = tempfile::tempdir().unwrap();
    let health_dir = tempfile::tempdir().unwrap();
    common::install_health_dir(health_dir.path());

    let profile = small_profile("nightly", src.path(), dst.path());
    let config = RunConfig {
        profiles: vec![profile],
        max_concurrent: 1,
        log_root: log_root.path().to_path_buf(),
        checkpoint_frequency: 1,
        max_chunk_retries: 3,
        default_mismatch_severity: MismatchSeverity::Warning,
        ..RunConfig::default()
    };

    let orchestrator = Orchestrator::new(config);
    let jobs_dir = common::jobs_dir(log_root.path(), &orchestrator);
    // Bit 4 (fatal) with neither bit 3 (copy errors) set: fatal, not retryable.
    common::seed_exit_codes(&jobs_dir, 1, &[16]);

    orchestrator.start_run().unwrap();
    common::run_to_completion(&orchestrator, 1, 200);

    assert_eq!(orchestrator.snapshot().phase, Phase::Complete);

    let attempts_file = jobs_dir.join("Chunk_001.log.attempts");
    let attempts: u32 = fs::read_to_string(&attempts_file).unwrap().trim().parse().unwrap();
    assert_eq!(attempts, 1, "a non-retryable fatal exit must not be retried");

    let results = orchestrator.profile_results();
    assert_eq!(results[0].chunks_complete, 0);
    assert_eq!(results[0].chunks_failed, 1);
}
