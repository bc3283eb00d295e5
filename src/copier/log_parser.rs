/*!
 * Copier log parser
 *
 * Parses a per-chunk copier log for running/final statistics. Statistics
 * lines are identified structurally (`label : six numbers`), not by
 * locale-specific label text, so the parser works regardless of the
 * copier's configured display language.
 */

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Result;

/// Below this size, a log with no recognizable statistics lines is
/// assumed to be mid-write rather than malformed; no warning is raised.
const MIN_SIZE_FOR_PARSE_WARNING: u64 = 64;

/// First five unique `ERROR` lines are kept; later duplicates are dropped.
const MAX_ERROR_MESSAGES: usize = 5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogStats {
    pub files_copied: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub dirs_copied: u64,
    pub dirs_skipped: u64,
    pub dirs_failed: u64,
    pub bytes_copied: u64,
    pub speed_bytes_per_sec: f64,
    pub current_file: Option<String>,
    pub parse_success: bool,
    pub parse_warning: Option<String>,
    pub error_messages: Vec<String>,
}

fn stats_line_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^\s*
            (?P<label>[\p{L} ]+?)
            \s*:\s*
            (?P<n1>[\d.,]+)\s+
            (?P<n2>[\d.,]+)\s+
            (?P<n3>[\d.,]+)\s+
            (?P<n4>[\d.,]+)\s+
            (?P<n5>[\d.,]+)\s+
            (?P<n6>[\d.,]+[kmgt]?)
            \s*$
            ",
        )
        .unwrap()
    })
}

fn current_file_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*\d+(\.\d+)?%?\s+(?P<path>.+[/\\].+)\s*$").unwrap())
}

/// Transfer rate, reported on its own line after the Times row rather than
/// as part of the aligned six-number statistics blocks. The copier emits
/// this twice, once in each unit; `Bytes/sec` is kept when both are present.
fn speed_line_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*Speed\s*:\s*(?P<value>[\d.,]+)\s*(?P<unit>bytes/sec|megabytes/min)\.?\s*$").unwrap()
    })
}

fn error_line_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bERROR\s+(\d+|:)").unwrap())
}

/// Decode a number that may use either plain notation or European
/// decimal-comma / period-thousands grouping, with an optional k/m/g/t
/// size suffix (case-insensitive).
fn decode_number(raw: &str) -> f64 {
    let raw = raw.trim();
    let (digits, multiplier) = match raw.chars().last() {
        Some(c) if "kKmMgGtT".contains(c) => (&raw[..raw.len() - 1], size_multiplier(c)),
        _ => (raw, 1.0),
    };

    let normalized = normalize_numeric(digits);
    let value: f64 = normalized.parse().unwrap_or(0.0);
    value * multiplier
}

fn size_multiplier(c: char) -> f64 {
    match c.to_ascii_lowercase() {
        'k' => 1024.0,
        'm' => 1024.0 * 1024.0,
        'g' => 1024.0 * 1024.0 * 1024.0,
        't' => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    }
}

/// Disambiguate `,` / `.` as decimal separator vs. thousands grouping.
/// If both appear, whichever comes last is the decimal separator. If
/// only a comma appears, it is treated as the decimal separator
/// (European convention); a period-only string is parsed as-is.
fn normalize_numeric(s: &str) -> String {
    let last_comma = s.rfind(',');
    let last_dot = s.rfind('.');
    match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => s.replace('.', "").replace(',', "."),
        (Some(c), Some(d)) if d > c => s.replace(',', ""),
        (Some(_), None) => s.replace(',', "."),
        _ => s.to_string(),
    }
}

/// Parse a copier log file opened allowing concurrent write access.
pub fn parse_log(path: &Path) -> Result<LogStats> {
    let mut file = File::open(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(parse_log_content(&content))
}

pub fn parse_log_content(content: &str) -> LogStats {
    let mut stats = LogStats::default();
    let mut stat_lines: Vec<[f64; 6]> = Vec::new();
    let mut last_current_file: Option<String> = None;
    let mut seen_errors = std::collections::HashSet::new();
    let mut speed_bytes_per_sec = 0.0f64;
    let mut have_precise_speed = false;

    for line in content.lines() {
        if let Some(caps) = stats_line_pattern().captures(line) {
            let nums = [
                decode_number(&caps["n1"]),
                decode_number(&caps["n2"]),
                decode_number(&caps["n3"]),
                decode_number(&caps["n4"]),
                decode_number(&caps["n5"]),
                decode_number(&caps["n6"]),
            ];
            stat_lines.push(nums);
        }

        if let Some(caps) = current_file_pattern().captures(line) {
            last_current_file = Some(caps["path"].trim().to_string());
        }

        if let Some(caps) = speed_line_pattern().captures(line) {
            let value = decode_number(&caps["value"]);
            if caps["unit"].eq_ignore_ascii_case("bytes/sec") {
                speed_bytes_per_sec = value;
                have_precise_speed = true;
            } else if !have_precise_speed {
                speed_bytes_per_sec = value * 1024.0 * 1024.0 / 60.0;
            }
        }

        if error_line_pattern().is_match(line) && stats.error_messages.len() < MAX_ERROR_MESSAGES {
            let trimmed = line.trim().to_string();
            if seen_errors.insert(trimmed.clone()) {
                stats.error_messages.push(trimmed);
            }
        }
    }

    stats.current_file = last_current_file;
    stats.speed_bytes_per_sec = speed_bytes_per_sec;

    // The three trailing statistics lines are, in order: Dirs, Files, Bytes.
    // We take the last occurrence of each kind found, tolerating a log
    // that was still being written when it was opened.
    if stat_lines.len() >= 3 {
        let bytes_row = stat_lines[stat_lines.len() - 1];
        let files_row = stat_lines[stat_lines.len() - 2];
        let dirs_row = stat_lines[stat_lines.len() - 3];

        stats.dirs_copied = dirs_row[1] as u64;
        stats.dirs_skipped = dirs_row[2] as u64;
        stats.dirs_failed = dirs_row[4] as u64;

        stats.files_copied = files_row[1] as u64;
        stats.files_skipped = files_row[2] as u64;
        stats.files_failed = files_row[4] as u64;

        stats.bytes_copied = bytes_row[1] as u64;

        stats.parse_success = true;
    } else if content.len() as u64 > MIN_SIZE_FOR_PARSE_WARNING {
        stats.parse_warning = Some(
            "no recognizable statistics lines found in copier log".to_string(),
        );
        stats.parse_success = false;
    } else {
        // Small/empty log: likely still being written; not an error.
        stats.parse_success = false;
    }

    stats
}
