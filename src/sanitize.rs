/*!
 * Argument sanitization for the external copier
 *
 * Every string that ends up in a copier argument vector passes through
 * this module first. The policy denies rather than transforms wherever
 * possible: a path or pattern that looks like it could smuggle an extra
 * switch is rejected outright rather than escaped.
 */

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{OrchestratorError, Result};

fn percent_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%[^%]*%").unwrap())
}

fn traversal_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|[/\\])\.\.([/\\]|$)").unwrap())
}

fn chunk_switch_whitelist() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"^/lev:\d+$").unwrap(),
            Regex::new(r"^/maxage:\d+$").unwrap(),
            Regex::new(r"^/minage:\d+$").unwrap(),
            Regex::new(r"^/e$").unwrap(),
        ]
    })
}

/// True if `s` contains none of the disallowed sequences for a copier argument.
pub fn is_safe_argument(s: &str) -> bool {
    if s.chars().any(|c| (c as u32) <= 0x1F) {
        return false;
    }
    const SEPARATORS: &[char] = &[';', '&', '|', '<', '>', '`'];
    if s.chars().any(|c| SEPARATORS.contains(&c)) {
        return false;
    }
    if s.contains("$(") || s.contains("${") {
        return false;
    }
    if percent_pattern().is_match(s) {
        return false;
    }
    if traversal_pattern().is_match(s) {
        return false;
    }
    if s.starts_with('-') {
        return false;
    }
    true
}

/// Validate and, where safe, transform a path argument.
///
/// Returns the sanitized string on success. The terminal backslash of a
/// Windows-style path is doubled so the platform's argument parser does
/// not swallow the outer quote.
pub fn sanitize_path(s: &str, field_name: &str) -> Result<String> {
    if !is_safe_argument(s) {
        return Err(OrchestratorError::Configuration(format!(
            "unsafe value for {}: {}",
            field_name, s
        )));
    }
    if s.ends_with('\\') && !s.ends_with("\\\\") {
        Ok(format!("{}\\", s))
    } else {
        Ok(s.to_string())
    }
}

/// Filter a list of exclude patterns, dropping (with a caller-visible
/// warning reason) any pattern that fails sanitization. The copy proceeds
/// with whatever remains.
pub fn sanitize_exclude_patterns(patterns: &[String], kind: &str) -> (Vec<String>, Vec<String>) {
    let mut kept = Vec::with_capacity(patterns.len());
    let mut warnings = Vec::new();
    for pattern in patterns {
        if is_safe_argument(pattern) {
            kept.push(pattern.clone());
        } else {
            warnings.push(format!("dropped unsafe {} exclude pattern: {}", kind, pattern));
        }
    }
    (kept, warnings)
}

/// Whitelist of chunk-specific switch patterns (level/age selectors).
/// Chunk switches are generated internally, never supplied by the
/// operator, so anything not matching is dropped rather than passed
/// through with a warning.
pub fn sanitize_chunk_switches(switches: &[String]) -> Vec<String> {
    switches
        .iter()
        .filter(|s| chunk_switch_whitelist().iter().any(|re| re.is_match(s)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_control_chars() {
        assert!(!is_safe_argument("path\nwith\nnewline"));
        assert!(!is_safe_argument("path\0null"));
    }

    #[test]
    fn test_rejects_shell_metacharacters() {
        assert!(!is_safe_argument("foo; rm -rf /"));
        assert!(!is_safe_argument("foo && bar"));
        assert!(!is_safe_argument("foo | bar"));
        assert!(!is_safe_argument("foo < bar"));
        assert!(!is_safe_argument("foo > bar"));
        assert!(!is_safe_argument("`whoami`"));
    }

    #[test]
    fn test_rejects_substitution() {
        assert!(!is_safe_argument("$(whoami)"));
        assert!(!is_safe_argument("${HOME}"));
        assert!(!is_safe_argument("%TEMP%"));
    }

    #[test]
    fn test_rejects_traversal() {
        assert!(!is_safe_argument("../etc/passwd"));
        assert!(!is_safe_argument("foo/../bar"));
        assert!(!is_safe_argument("foo\\..\\bar"));
    }

    #[test]
    fn test_rejects_leading_dash() {
        assert!(!is_safe_argument("-rf"));
    }

    #[test]
    fn test_accepts_normal_paths() {
        assert!(is_safe_argument(r"C:\Data\Project"));
        assert!(is_safe_argument("/mnt/data/project"));
    }

    #[test]
    fn test_sanitize_path_doubles_trailing_backslash() {
        let out = sanitize_path(r"C:\Data\", "source").unwrap();
        assert_eq!(out, r"C:\Data\\");
    }

    #[test]
    fn test_sanitize_path_rejects_unsafe() {
        assert!(sanitize_path("foo; rm -rf /", "source").is_err());
    }

    #[test]
    fn test_sanitize_exclude_patterns_drops_with_warning() {
        let patterns = vec!["*.tmp".to_string(), "$(evil)".to_string()];
        let (kept, warnings) = sanitize_exclude_patterns(&patterns, "file");
        assert_eq!(kept, vec!["*.tmp".to_string()]);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_sanitize_chunk_switches_whitelist() {
        let switches = vec![
            "/lev:1".to_string(),
            "/e".to_string(),
            "/evil:thing".to_string(),
        ];
        let out = sanitize_chunk_switches(&switches);
        assert_eq!(out, vec!["/lev:1".to_string(), "/e".to_string()]);
    }
}
