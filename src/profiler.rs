/*!
 * Directory profiler and cache
 *
 * Obtains `(total_bytes, file_count, dir_count)` for a directory tree by
 * walking it directly with `walkdir` rather than shelling out to the
 * copier in list-only mode. A profile only feeds chunking-threshold
 * decisions (is this subtree small enough to stay one chunk); the actual
 * copy of each resulting chunk still goes through the real copier
 * process, whose own authoritative stats come back through
 * `copier::log_parser`. A tree containing symlinks or junctions the
 * copier would enumerate differently can therefore skew where a split
 * happens, but not what gets copied or how it's reported. See DESIGN.md
 * for the full tradeoff against driving the copier here directly.
 */

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use rand::seq::IteratorRandom;
use walkdir::WalkDir;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct DirectoryProfile {
    pub path: String,
    pub total_bytes: u64,
    pub file_count: u64,
    pub dir_count: u64,
    pub avg_file_size: f64,
    pub last_scanned: SystemTime,
}

impl DirectoryProfile {
    fn scan(path: &Path) -> Result<Self> {
        let mut total_bytes = 0u64;
        let mut file_count = 0u64;
        let mut dir_count = 0u64;

        for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_dir() {
                dir_count += 1;
            } else if entry.file_type().is_file() {
                file_count += 1;
                total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }

        let avg_file_size = if file_count > 0 {
            total_bytes as f64 / file_count as f64
        } else {
            0.0
        };

        Ok(Self {
            path: normalize_path(path),
            total_bytes,
            file_count,
            dir_count,
            avg_file_size,
            last_scanned: SystemTime::now(),
        })
    }
}

/// Path-normalize for cache-key comparison: forward slashes folded to
/// backslashes, trailing separators trimmed except for drive roots,
/// compared ordinal case-insensitively by the caller.
pub fn normalize_path(path: &Path) -> String {
    let mut s = path.to_string_lossy().replace('/', "\\");
    while s.len() > 3 && (s.ends_with('\\')) {
        s.pop();
    }
    s.to_lowercase()
}

struct CacheEntry {
    profile: DirectoryProfile,
}

/// Bounded, approximately-LRU cache of directory profiles.
pub struct ProfileCache {
    entries: DashMap<String, CacheEntry>,
    max_age: Duration,
    max_entries: usize,
}

impl ProfileCache {
    pub fn new(max_age: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_age,
            max_entries,
        }
    }

    /// Returns the cached profile if present and fresh; otherwise scans,
    /// inserts, and evicts if the cache has grown past its soft limit.
    pub fn profile(&self, path: &Path, use_cache: bool) -> Result<DirectoryProfile> {
        let key = normalize_path(path);

        if use_cache {
            if let Some(entry) = self.entries.get(&key) {
                let age = entry
                    .profile
                    .last_scanned
                    .elapsed()
                    .unwrap_or(Duration::MAX);
                if age <= self.max_age {
                    return Ok(entry.profile.clone());
                }
            }
        }

        let profile = DirectoryProfile::scan(path)?;
        self.entries.insert(key, CacheEntry { profile: profile.clone() });
        self.maybe_evict();
        Ok(profile)
    }

    /// Approximate LRU eviction: once the cache exceeds `max_entries *
    /// 1.10`, sample `5 * excess` random entries, sort by last-scanned
    /// time, and compare-and-delete the oldest `excess`. Deletions race
    /// harmlessly with concurrent inserts.
    fn maybe_evict(&self) {
        let soft_limit = (self.max_entries as f64 * 1.10) as usize;
        let len = self.entries.len();
        if len <= soft_limit {
            return;
        }
        let excess = len - self.max_entries;
        let sample_size = (5 * excess).max(excess);

        let mut rng = rand::rng();
        let mut sample: Vec<(String, SystemTime)> = self
            .entries
            .iter()
            .map(|kv| (kv.key().clone(), kv.value().profile.last_scanned))
            .choose_multiple(&mut rng, sample_size);

        sample.sort_by_key(|(_, last_scanned)| *last_scanned);

        for (key, _) in sample.into_iter().take(excess) {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum ProfileOutcome {
    Success(DirectoryProfile),
    Failure { path: PathBuf, message: String },
}

/// Profile multiple paths, in parallel once there are at least three of
/// them; each caller-visible result distinguishes a zero-sized directory
/// from a scan failure.
pub fn profile_many(cache: &ProfileCache, paths: &[PathBuf], degree: usize) -> Vec<ProfileOutcome> {
    if paths.len() < 3 {
        return paths
            .iter()
            .map(|p| match cache.profile(p, true) {
                Ok(profile) => ProfileOutcome::Success(profile),
                Err(err) => ProfileOutcome::Failure {
                    path: p.clone(),
                    message: err.to_string(),
                },
            })
            .collect();
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(degree.max(1))
        .build()
        .expect("failed to build profiling worker pool");

    pool.install(|| {
        use rayon::prelude::*;
        paths
            .par_iter()
            .map(|p| match cache.profile(p, true) {
                Ok(profile) => ProfileOutcome::Success(profile),
                Err(err) => ProfileOutcome::Failure {
                    path: p.clone(),
                    message: err.to_string(),
                },
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_scan_counts_files_and_bytes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::write(dir.path().join("b.txt"), b"world!").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let profile = DirectoryProfile::scan(dir.path()).unwrap();
        assert_eq!(profile.file_count, 2);
        assert_eq!(profile.total_bytes, 11);
        assert!(profile.dir_count >= 1);
    }

    #[test]
    fn test_cache_hit_avoids_rescan() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let cache = ProfileCache::new(Duration::from_secs(60), 100);

        let first = cache.profile(dir.path(), true).unwrap();
        fs::write(dir.path().join("b.txt"), b"more").unwrap();
        let second = cache.profile(dir.path(), true).unwrap();

        assert_eq!(first.file_count, second.file_count);
    }

    #[test]
    fn test_cache_miss_when_disabled() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let cache = ProfileCache::new(Duration::from_secs(60), 100);

        cache.profile(dir.path(), true).unwrap();
        fs::write(dir.path().join("b.txt"), b"more").unwrap();
        let second = cache.profile(dir.path(), false).unwrap();

        assert_eq!(second.file_count, 2);
    }

    #[test]
    fn test_normalize_path_case_and_separator() {
        assert_eq!(
            normalize_path(Path::new(r"C:\Data\Project\")),
            normalize_path(Path::new("c:/data/project"))
        );
    }

    #[test]
    fn test_profile_many_small_set_is_sequential() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();

        let cache = ProfileCache::new(Duration::from_secs(60), 100);
        let results = profile_many(&cache, &[a, b], 4);
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], ProfileOutcome::Success(_)));
    }

    #[test]
    fn test_eviction_bounds_cache_size() {
        let cache = ProfileCache::new(Duration::from_secs(60), 5);
        let dirs: Vec<_> = (0..20)
            .map(|i| {
                let dir = tempdir().unwrap();
                let path = dir.path().to_path_buf();
                std::mem::forget(dir);
                (i, path)
            })
            .collect();

        for (_, path) in &dirs {
            cache.profile(path, true).unwrap();
        }

        assert!(cache.len() <= (5.0 * 1.10) as usize + 1);
    }
}
