//! Shared harness for end-to-end orchestrator tests.
//!
//! The health document and snapshot tracking file live in the OS temp
//! directory by design (one real run per machine is assumed), so tests
//! that drive a full `Orchestrator` run share that state and must not
//! run concurrently with each other.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use parasync::Orchestrator;

/// Held for the duration of any test that drives a full orchestrator run.
pub static RUN_LOCK: Mutex<()> = Mutex::new(());

pub fn fake_copier_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fake_copier.sh")
}

pub fn install_fake_copier() {
    std::env::set_var("PARASYNC_COPIER_BIN", fake_copier_path());
}

/// Redirects the health document and snapshot tracking file out of the
/// real OS temp directory so concurrent test runs (and the developer's
/// own machine) never collide on `Robocurse-Health.json`. Must be called
/// while holding `RUN_LOCK`, since it mutates process-wide environment
/// state.
pub fn install_health_dir(dir: &Path) {
    std::env::set_var("PARASYNC_HEALTH_DIR", dir);
}

/// Where a freshly constructed orchestrator will write per-chunk logs,
/// given the `log_root` passed into its `RunConfig`.
pub fn jobs_dir(log_root: &Path, orchestrator: &Orchestrator) -> PathBuf {
    log_root
        .join(Utc::now().format("%Y-%m-%d").to_string())
        .join(orchestrator.session_id().to_string())
        .join("Jobs")
}

/// Pre-seed the exit codes the fake copier will return for a given
/// chunk, one per attempt (the last value repeats once exhausted).
pub fn seed_exit_codes(jobs_dir: &Path, chunk_id: u64, codes: &[i32]) {
    std::fs::create_dir_all(jobs_dir).unwrap();
    let log_path = jobs_dir.join(format!("Chunk_{:03}.log", chunk_id));
    let body = codes.iter().map(|c| c.to_string()).collect::<Vec<_>>().join("\n");
    std::fs::write(format!("{}.exitcodes", log_path.display()), body).unwrap();
}

/// Drive `tick` until the run reaches a terminal phase or `max_ticks` elapses.
pub fn run_to_completion(orchestrator: &Orchestrator, max_concurrent: usize, max_ticks: usize) {
    use parasync::Phase;

    for _ in 0..max_ticks {
        orchestrator.tick(max_concurrent).unwrap();
        let phase = orchestrator.snapshot().phase;
        if matches!(phase, Phase::Complete | Phase::Stopped) {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    panic!("orchestrator did not reach a terminal phase within {} ticks", max_ticks);
}
