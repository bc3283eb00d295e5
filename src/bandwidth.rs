/*!
 * Bandwidth governor
 *
 * The orchestrator never throttles bytes itself; it hands the copier an
 * inter-packet gap and trusts the copier to honor it. This module only
 * computes that gap.
 */

const PACKET_BYTES: f64 = 512.0;
const MIN_GAP_MS: u32 = 1;
const MAX_GAP_MS: u32 = 10_000;

/// Compute the inter-packet gap, in milliseconds, that one job should use
/// so the sum of per-job caps approximates `limit_mbps` across
/// `active_jobs` running jobs plus one about to start if `pending_new`.
///
/// Once a job is started its gap cannot be changed; jobs that finish free
/// up bandwidth only for jobs started afterward. See the crate's design
/// notes for why this is accepted rather than worked around.
pub fn gap(limit_mbps: u64, active_jobs: usize, pending_new: bool) -> u32 {
    if limit_mbps == 0 {
        return 0;
    }

    let denominator = active_jobs.max(1) + if pending_new { 1 } else { 0 };
    let per_job_bytes_per_sec = (limit_mbps as f64 * 125_000.0) / denominator as f64;

    let gap_ms = (PACKET_BYTES * 1000.0 / per_job_bytes_per_sec).ceil() as u32;
    gap_ms.clamp(MIN_GAP_MS, MAX_GAP_MS)
}
