//! Cache limits and directory resolution.
//!
//! Limits default to 1000 entries, 500 MiB, and 30 days, and can be
//! overridden from the environment (`MAX_ENTRIES`, `MAX_SIZE_MB`) or the
//! CLI. The cache directory resolves through `CACHE_DIR`, then
//! `$HOME/.cache/vesper`, then `/tmp/vesper_cache`.

use std::path::PathBuf;

/// Default maximum number of cache entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Default maximum total cache size: 500 MiB.
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 500 * 1024 * 1024;

/// Default maximum entry age: 30 days.
pub const DEFAULT_MAX_AGE_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Eviction limits for the module cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    /// Maximum number of entries; the excess is evicted least-used first.
    pub max_entries: usize,
    /// Maximum total serialized size in bytes (approximate accounting).
    pub max_size_bytes: u64,
    /// Maximum entry age in seconds; zero disables age eviction.
    pub max_age_seconds: i64,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            max_age_seconds: DEFAULT_MAX_AGE_SECONDS,
        }
    }
}

impl CacheLimits {
    /// Returns the default limits with any environment overrides applied:
    /// `MAX_ENTRIES` (count) and `MAX_SIZE_MB` (megabytes).
    pub fn from_env() -> Self {
        let mut limits = Self::default();
        if let Some(n) = read_env_number("MAX_ENTRIES") {
            limits.max_entries = n as usize;
        }
        if let Some(mb) = read_env_number("MAX_SIZE_MB") {
            limits.max_size_bytes = mb * 1024 * 1024;
        }
        limits
    }
}

fn read_env_number(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            log::warn!("ignoring non-numeric {name}={raw:?}");
            None
        }
    }
}

/// Resolves the cache directory.
///
/// An explicit directory wins; otherwise `CACHE_DIR`, then
/// `$HOME/.cache/vesper`, then `/tmp/vesper_cache`.
pub fn resolve_cache_dir(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir;
    }
    if let Ok(dir) = std::env::var("CACHE_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    match std::env::var("HOME") {
        Ok(home) if !home.is_empty() => PathBuf::from(home).join(".cache").join("vesper"),
        _ => PathBuf::from("/tmp/vesper_cache"),
    }
}
