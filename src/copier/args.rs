/*!
 * Copier argument builder
 *
 * Deterministically assembles the copier command line from a chunk,
 * profile options, and run-wide flags. Every path/pattern string is
 * funneled through [`crate::sanitize`] before it lands in the vector.
 */

use std::path::Path;

use crate::config::CopierOptions;
use crate::error::Result;
use crate::sanitize::{sanitize_chunk_switches, sanitize_exclude_patterns, sanitize_path};

/// Switch identifiers the builder manages itself; any user-supplied
/// custom switch naming one of these is dropped so the orchestrator's
/// semantics (threading, retries, logging, mirroring) aren't overridden
/// out from under it.
const MANAGED_SWITCH_PREFIXES: &[&str] = &[
    "/threads:", "/mt:", "/retries:", "/r:", "/retry_wait:", "/w:", "/log:", "/unilog:", "/mir",
    "/e", "/tee", "/np", "/bytes",
];

fn is_managed_switch(switch: &str) -> bool {
    MANAGED_SWITCH_PREFIXES
        .iter()
        .any(|prefix| switch.eq_ignore_ascii_case(prefix) || switch.to_lowercase().starts_with(prefix))
}

/// Inputs needed to build one copier invocation for one chunk.
pub struct ArgsInput<'a> {
    pub source: &'a Path,
    pub destination: &'a Path,
    pub log_path: &'a Path,
    pub thread_count: u32,
    pub options: &'a CopierOptions,
    pub chunk_switches: &'a [String],
    pub preview: bool,
    pub verbose: bool,
    pub inter_packet_gap_ms: u32,
}

/// Warnings accumulated while building arguments (e.g. dropped exclude
/// patterns); the copy still proceeds.
pub struct ArgsOutput {
    pub args: Vec<String>,
    pub warnings: Vec<String>,
}

/// Build the ordered argument vector for one copier invocation.
pub fn build_args(input: &ArgsInput<'_>) -> Result<ArgsOutput> {
    let mut warnings = Vec::new();
    let mut args = Vec::new();

    let src = sanitize_path(&input.source.display().to_string(), "source")?;
    let dst = sanitize_path(&input.destination.display().to_string(), "destination")?;
    let log = sanitize_path(&input.log_path.display().to_string(), "log_path")?;

    args.push(src);
    args.push(dst);
    args.push(if input.options.no_mirror { "/e".to_string() } else { "/mir".to_string() });

    let custom: Vec<String> = input
        .options
        .custom_switches
        .iter()
        .filter(|s| !is_managed_switch(s))
        .cloned()
        .collect();

    if custom.is_empty() {
        // Defaults: preserve file attributes and directory timestamps.
        args.push("/copy:dat".to_string());
        args.push("/dcopy:dat".to_string());
    } else {
        args.extend(custom);
    }

    args.push(format!("/threads:{}", input.thread_count));
    args.push(format!("/retries:{}", input.options.retry_count));
    args.push(format!("/retry_wait:{}", input.options.retry_wait_secs));
    args.push(format!("/log:{}", log));
    args.push("/tee".to_string());
    args.push("/no_progress".to_string());

    if !input.verbose {
        args.push("/no_file_list".to_string());
        args.push("/no_dir_list".to_string());
    }

    args.push("/bytes".to_string());

    if input.options.skip_junctions {
        args.push("/exclude_junction_dirs".to_string());
        args.push("/exclude_junction_files".to_string());
    }

    if input.inter_packet_gap_ms > 0 {
        args.push(format!("/ipg:{}", input.inter_packet_gap_ms));
    }

    let (safe_files, mut file_warnings) =
        sanitize_exclude_patterns(&input.options.exclude_file_patterns, "file");
    warnings.append(&mut file_warnings);
    if !safe_files.is_empty() {
        args.push("/exclude_files".to_string());
        args.extend(safe_files);
    }

    let (safe_dirs, mut dir_warnings) =
        sanitize_exclude_patterns(&input.options.exclude_dir_patterns, "directory");
    warnings.append(&mut dir_warnings);
    if !safe_dirs.is_empty() {
        args.push("/exclude_dirs".to_string());
        args.extend(safe_dirs);
    }

    args.extend(sanitize_chunk_switches(input.chunk_switches));

    if input.preview {
        args.push("/list_only".to_string());
    }

    Ok(ArgsOutput { args, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn base_input<'a>(
        source: &'a Path,
        destination: &'a Path,
        log_path: &'a Path,
        options: &'a CopierOptions,
    ) -> ArgsInput<'a> {
        ArgsInput {
            source,
            destination,
            log_path,
            thread_count: 8,
            options,
            chunk_switches: &[],
            preview: false,
            verbose: false,
            inter_packet_gap_ms: 0,
        }
    }

    #[test]
    fn test_default_switches_emitted_when_no_custom() {
        let options = CopierOptions::default();
        let src = PathBuf::from("/src");
        let dst = PathBuf::from("/dst");
        let log = PathBuf::from("/logs/chunk_001.log");
        let input = base_input(&src, &dst, &log, &options);
        let out = build_args(&input).unwrap();
        assert!(out.args.contains(&"/copy:dat".to_string()));
        assert!(out.args.contains(&"/dcopy:dat".to_string()));
        assert!(out.args.contains(&"/mir".to_string()));
    }

    #[test]
    fn test_no_mirror_uses_e_switch() {
        let options = CopierOptions {
            no_mirror: true,
            ..CopierOptions::default()
        };
        let src = PathBuf::from("/src");
        let dst = PathBuf::from("/dst");
        let log = PathBuf::from("/logs/chunk_001.log");
        let input = base_input(&src, &dst, &log, &options);
        let out = build_args(&input).unwrap();
        assert_eq!(out.args[2], "/e");
    }

    #[test]
    fn test_managed_switches_filtered_from_custom() {
        let options = CopierOptions {
            custom_switches: vec!["/threads:99".to_string(), "/xd".to_string()],
            ..CopierOptions::default()
        };
        let src = PathBuf::from("/src");
        let dst = PathBuf::from("/dst");
        let log = PathBuf::from("/logs/chunk_001.log");
        let input = base_input(&src, &dst, &log, &options);
        let out = build_args(&input).unwrap();
        assert!(!out.args.iter().any(|a| a == "/threads:99"));
        assert!(out.args.contains(&"/xd".to_string()));
        // thread count is still managed by the builder itself
        assert!(out.args.contains(&"/threads:8".to_string()));
    }

    #[test]
    fn test_verbose_skips_no_file_list() {
        let options = CopierOptions::default();
        let src = PathBuf::from("/src");
        let dst = PathBuf::from("/dst");
        let log = PathBuf::from("/logs/chunk_001.log");
        let mut input = base_input(&src, &dst, &log, &options);
        input.verbose = true;
        let out = build_args(&input).unwrap();
        assert!(!out.args.contains(&"/no_file_list".to_string()));
    }

    #[test]
    fn test_preview_appends_list_only_last() {
        let options = CopierOptions::default();
        let src = PathBuf::from("/src");
        let dst = PathBuf::from("/dst");
        let log = PathBuf::from("/logs/chunk_001.log");
        let mut input = base_input(&src, &dst, &log, &options);
        input.preview = true;
        let out = build_args(&input).unwrap();
        assert_eq!(out.args.last(), Some(&"/list_only".to_string()));
    }

    #[test]
    fn test_exclude_patterns_sanitized_and_warned() {
        let options = CopierOptions {
            exclude_file_patterns: vec!["*.tmp".to_string(), "$(evil)".to_string()],
            ..CopierOptions::default()
        };
        let src = PathBuf::from("/src");
        let dst = PathBuf::from("/dst");
        let log = PathBuf::from("/logs/chunk_001.log");
        let input = base_input(&src, &dst, &log, &options);
        let out = build_args(&input).unwrap();
        assert!(out.args.contains(&"*.tmp".to_string()));
        assert!(!out.args.iter().any(|a| a.contains("evil")));
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_unsafe_source_path_is_hard_error() {
        let options = CopierOptions::default();
        let src = PathBuf::from("-rf /");
        let dst = PathBuf::from("/dst");
        let log = PathBuf::from("/logs/chunk_001.log");
        let input = base_input(&src, &dst, &log, &options);
        assert!(build_args(&input).is_err());
    }

    #[test]
    fn test_ipg_emitted_only_when_positive() {
        let options = CopierOptions::default();
        let src = PathBuf::from("/src");
        let dst = PathBuf::from("/dst");
        let log = PathBuf::from("/logs/chunk_001.log");
        let mut input = base_input(&src, &dst, &log, &options);
        input.inter_packet_gap_ms = 50;
        let out = build_args(&input).unwrap();
        assert!(out.args.contains(&"/ipg:50".to_string()));
    }
}
