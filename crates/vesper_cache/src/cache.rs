//! The module cache proper: lookup, store, restore, invalidation, eviction,
//! and persistence.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use vesper_ir::{Design, Module, ModuleCodec};

use crate::config::{resolve_cache_dir, CacheLimits};
use crate::error::CacheError;
use crate::index::{parse_index, IndexDoc, IndexEntry, INDEX_FILE, INDEX_VERSION, MODULES_SUBDIR};

/// One cached, serialized module.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The module name.
    pub module_name: String,
    /// The content fingerprint the artifact was stored under.
    pub fingerprint: u64,
    /// The transform-sequence tag that produced the artifact.
    pub transform_tag: String,
    /// Serialized module bytes. Empty for entries loaded from disk until
    /// the artifact is lazily read on restore.
    pub data: Vec<u8>,
    /// Insertion time, seconds since the UNIX epoch.
    pub timestamp: i64,
    /// Times this entry has been restored. Monotonic within a process.
    pub hits: u64,
}

impl CacheEntry {
    /// Approximate memory/disk footprint used for size eviction: payload
    /// plus the key strings.
    fn approx_size(&self, key: &str) -> u64 {
        (self.data.len() + key.len() + self.module_name.len() + self.transform_tag.len()) as u64
    }
}

/// Content-addressed store of synthesized modules.
///
/// Uninitialized caches answer `false` to every query and refuse stores;
/// initialization failure is a degradation, not an error. The cache is
/// single-writer: no inter-process locking is attempted.
#[derive(Debug, Default)]
pub struct ModuleCache {
    cache_dir: Option<PathBuf>,
    entries: BTreeMap<String, CacheEntry>,
    limits: CacheLimits,
    dirty: bool,
    total_hits: u64,
    total_misses: u64,
}

impl ModuleCache {
    /// Creates an uninitialized cache with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an uninitialized cache with the given limits.
    pub fn with_limits(limits: CacheLimits) -> Self {
        Self {
            cache_dir: None,
            entries: BTreeMap::new(),
            limits,
            dirty: false,
            total_hits: 0,
            total_misses: 0,
        }
    }

    /// Builds the canonical cache key for a lookup triple.
    pub fn make_key(module_name: &str, fingerprint: u64, transform_tag: &str) -> String {
        format!("{module_name}|{fingerprint:x}|{transform_tag}")
    }

    /// Initializes the cache directory and loads any existing index.
    ///
    /// Idempotent: a second call on an initialized cache is a no-op
    /// returning `true`. Returns `false` (with a warning) if the directory
    /// cannot be created; the cache then stays uninitialized and every
    /// lookup misses.
    pub fn init(&mut self, dir: Option<PathBuf>) -> bool {
        if self.cache_dir.is_some() {
            return true;
        }

        let dir = resolve_cache_dir(dir);
        let modules_dir = dir.join(MODULES_SUBDIR);
        if let Err(err) = std::fs::create_dir_all(&modules_dir) {
            log::warn!(
                "failed to create cache directory {}: {err}",
                modules_dir.display()
            );
            return false;
        }

        self.cache_dir = Some(dir.clone());
        self.load_from_disk();
        log::info!(
            "cache initialized at {} ({} entries)",
            dir.display(),
            self.entries.len()
        );
        true
    }

    /// Returns `true` once `init` has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.cache_dir.is_some()
    }

    /// The cache directory, if initialized.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// The current eviction limits.
    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    /// Sets the maximum entry count.
    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.limits.max_entries = max_entries;
    }

    /// Sets the maximum total size in bytes.
    pub fn set_max_size_bytes(&mut self, max_size_bytes: u64) {
        self.limits.max_size_bytes = max_size_bytes;
    }

    /// Sets the maximum entry age in seconds. Zero disables age eviction.
    pub fn set_max_age_seconds(&mut self, max_age_seconds: i64) {
        self.limits.max_age_seconds = max_age_seconds;
    }

    /// Checks whether an entry exists for the triple. Updates the
    /// aggregate hit/miss counters (reporting only).
    pub fn has(&mut self, module_name: &str, fingerprint: u64, transform_tag: &str) -> bool {
        let found = self.cache_dir.is_some()
            && self
                .entries
                .contains_key(&Self::make_key(module_name, fingerprint, transform_tag));
        if found {
            self.total_hits += 1;
        } else {
            self.total_misses += 1;
        }
        found
    }

    /// Serializes and stores a module under the triple.
    ///
    /// Returns `false` (with a warning, no state change) if the cache is
    /// uninitialized, the serializer fails, or it produces empty output.
    /// On success the entry is inserted, the cache is marked dirty, and
    /// eviction runs.
    pub fn put(
        &mut self,
        module_name: &str,
        fingerprint: u64,
        transform_tag: &str,
        module: &Module,
        codec: &dyn ModuleCodec,
    ) -> bool {
        if self.cache_dir.is_none() {
            log::debug!("cache uninitialized, not storing {module_name}");
            return false;
        }

        let data = match codec.serialize_module(module) {
            Ok(data) => data,
            Err(err) => {
                log::warn!("failed to serialize module {module_name}: {err}");
                return false;
            }
        };
        if data.is_empty() {
            log::warn!("serializer produced empty output for module {module_name}");
            return false;
        }

        let key = Self::make_key(module_name, fingerprint, transform_tag);
        self.entries.insert(
            key,
            CacheEntry {
                module_name: module_name.to_string(),
                fingerprint,
                transform_tag: transform_tag.to_string(),
                data,
                timestamp: now_unix(),
                hits: 0,
            },
        );
        self.dirty = true;
        log::debug!("cached module {module_name} (fingerprint {fingerprint:#018x})");

        self.evict_if_needed();
        true
    }

    /// Restores a cached module into the design.
    ///
    /// Artifact bytes are taken from memory, falling back to the artifact
    /// file. Returns `false` if the key is absent, the bytes are empty, or
    /// the loader fails; restore failures are non-fatal and the caller is
    /// expected to fall back to synthesis.
    pub fn restore(
        &mut self,
        module_name: &str,
        fingerprint: u64,
        transform_tag: &str,
        design: &mut Design,
        codec: &dyn ModuleCodec,
    ) -> bool {
        let Some(cache_dir) = self.cache_dir.clone() else {
            return false;
        };
        let key = Self::make_key(module_name, fingerprint, transform_tag);
        let Some(entry) = self.entries.get_mut(&key) else {
            return false;
        };

        if entry.data.is_empty() {
            let path = artifact_path(&cache_dir, &key);
            match std::fs::read(&path) {
                Ok(bytes) => entry.data = bytes,
                Err(err) => {
                    log::warn!("cache artifact {} unreadable: {err}", path.display());
                }
            }
        }
        if entry.data.is_empty() {
            log::warn!("cache entry exists but module data is empty: {key}");
            return false;
        }

        match codec.load_module(&entry.data, design) {
            Ok(_) => {
                entry.hits += 1;
                true
            }
            Err(err) => {
                log::warn!("failed to restore module {module_name} from cache: {err}");
                false
            }
        }
    }

    /// Removes every entry for the named module, whatever its fingerprint
    /// or tag.
    pub fn invalidate(&mut self, module_name: &str) {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.module_name == module_name)
            .map(|(k, _)| k.clone())
            .collect();
        if keys.is_empty() {
            return;
        }
        for key in &keys {
            self.drop_entry(key);
        }
        log::info!(
            "invalidated {} cache entries for module {module_name}",
            keys.len()
        );
    }

    /// Removes exactly one entry.
    pub fn invalidate_entry(&mut self, module_name: &str, fingerprint: u64, transform_tag: &str) {
        let key = Self::make_key(module_name, fingerprint, transform_tag);
        if self.entries.contains_key(&key) {
            self.drop_entry(&key);
        }
    }

    /// Invalidates the changed modules and every transitive dependent of
    /// them under the given dependents mapping. BFS with a visited set, so
    /// it terminates on cyclic graphs.
    pub fn invalidate_affected(
        &mut self,
        changed: &BTreeSet<String>,
        dependents: &BTreeMap<String, BTreeSet<String>>,
    ) {
        let mut affected = changed.clone();
        let mut worklist: VecDeque<String> = changed.iter().cloned().collect();
        while let Some(module) = worklist.pop_front() {
            if let Some(users) = dependents.get(&module) {
                for user in users {
                    if affected.insert(user.clone()) {
                        worklist.push_back(user.clone());
                    }
                }
            }
        }
        for module in &affected {
            self.invalidate(module);
        }
    }

    /// Removes every entry and resets the reporting counters.
    pub fn clear(&mut self) {
        let keys: Vec<String> = self.entries.keys().cloned().collect();
        for key in &keys {
            self.drop_entry(key);
        }
        self.total_hits = 0;
        self.total_misses = 0;
        self.dirty = true;
    }

    /// Runs the eviction policy: age first, then entry count, then total
    /// size, evicting least-used oldest first.
    pub fn evict_if_needed(&mut self) {
        // 1. Age.
        if self.limits.max_age_seconds > 0 {
            let cutoff = now_unix() - self.limits.max_age_seconds;
            let expired: Vec<String> = self
                .entries
                .iter()
                .filter(|(_, e)| e.timestamp < cutoff)
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired {
                log::debug!("evicting expired cache entry {key}");
                self.drop_entry(&key);
            }
        }

        // 2. Entry count.
        if self.entries.len() > self.limits.max_entries {
            let excess = self.entries.len() - self.limits.max_entries;
            for key in self.eviction_order().into_iter().take(excess) {
                log::debug!("evicting cache entry {key} (entry limit)");
                self.drop_entry(&key);
            }
        }

        // 3. Total size.
        let mut total = self.total_size_bytes();
        if total > self.limits.max_size_bytes {
            for key in self.eviction_order() {
                if total <= self.limits.max_size_bytes || self.entries.is_empty() {
                    break;
                }
                let size = self
                    .entries
                    .get(&key)
                    .map(|e| e.approx_size(&key))
                    .unwrap_or(0);
                log::debug!("evicting cache entry {key} (size limit)");
                self.drop_entry(&key);
                total = total.saturating_sub(size);
            }
        }
    }

    /// Keys in eviction order: hit count ascending, then timestamp
    /// ascending, ties in key order.
    fn eviction_order(&self) -> Vec<String> {
        let mut keys: Vec<(u64, i64, String)> = self
            .entries
            .iter()
            .map(|(k, e)| (e.hits, e.timestamp, k.clone()))
            .collect();
        keys.sort();
        keys.into_iter().map(|(_, _, k)| k).collect()
    }

    /// Deletes the artifact file (best effort), then removes the record.
    fn drop_entry(&mut self, key: &str) {
        if let Some(dir) = &self.cache_dir {
            let path = artifact_path(dir, key);
            if let Err(err) = std::fs::remove_file(&path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    log::debug!("could not remove artifact {}: {err}", path.display());
                }
            }
        }
        self.entries.remove(key);
        self.dirty = true;
    }

    /// Writes every artifact and then the versioned index document.
    ///
    /// Individual artifact write failures are logged and skipped; the
    /// index is still written. Clears the dirty flag on success.
    pub fn save_to_disk(&mut self) -> Result<(), CacheError> {
        let Some(dir) = self.cache_dir.clone() else {
            return Err(CacheError::NotInitialized);
        };

        for (key, entry) in &self.entries {
            if entry.data.is_empty() {
                // Loaded lazily and never touched; the artifact is already
                // on disk.
                continue;
            }
            let path = artifact_path(&dir, key);
            if let Err(err) = std::fs::write(&path, &entry.data) {
                log::warn!("failed to write cache artifact {}: {err}", path.display());
            }
        }

        let doc = IndexDoc {
            version: INDEX_VERSION,
            entries: self
                .entries
                .iter()
                .map(|(key, e)| IndexEntry {
                    key: key.clone(),
                    module_name: e.module_name.clone(),
                    hash: e.fingerprint,
                    transform_tag: e.transform_tag.clone(),
                    timestamp: e.timestamp,
                    hits: e.hits,
                })
                .collect(),
        };
        let json =
            serde_json::to_string_pretty(&doc).map_err(|err| CacheError::Serialization {
                reason: err.to_string(),
            })?;
        let index_path = dir.join(INDEX_FILE);
        std::fs::write(&index_path, json).map_err(|err| CacheError::Io {
            path: index_path,
            source: err,
        })?;

        self.dirty = false;
        log::info!("saved cache index with {} entries", self.entries.len());
        Ok(())
    }

    /// Loads the index document, dropping entries whose artifact file is
    /// not readable. Malformed or mis-versioned documents degrade to an
    /// empty cache; pre-existing artifacts are left in place.
    fn load_from_disk(&mut self) {
        let Some(dir) = self.cache_dir.clone() else {
            return;
        };
        let index_path = dir.join(INDEX_FILE);
        let content = match std::fs::read_to_string(&index_path) {
            Ok(content) => content,
            Err(_) => return, // fresh cache
        };
        let Some(doc) = parse_index(&content) else {
            return;
        };

        self.entries.clear();
        for entry in doc.entries {
            if entry.module_name.is_empty() {
                log::warn!("skipping cache index entry with empty module name");
                continue;
            }
            let path = artifact_path(&dir, &entry.key);
            if std::fs::metadata(&path).is_err() {
                log::warn!(
                    "dropping cache entry {} (artifact {} missing)",
                    entry.key,
                    path.display()
                );
                self.dirty = true;
                continue;
            }
            self.entries.insert(
                entry.key,
                CacheEntry {
                    module_name: entry.module_name,
                    fingerprint: entry.hash,
                    transform_tag: entry.transform_tag,
                    data: Vec::new(), // lazily read on restore
                    timestamp: entry.timestamp,
                    hits: entry.hits,
                },
            );
        }
    }

    /// The number of entries currently held.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Aggregate lookup hits this process.
    pub fn hit_count(&self) -> u64 {
        self.total_hits
    }

    /// Aggregate lookup misses this process.
    pub fn miss_count(&self) -> u64 {
        self.total_misses
    }

    /// Hit rate as a percentage of all lookups (0.0 when none).
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_hits + self.total_misses;
        if total == 0 {
            return 0.0;
        }
        self.total_hits as f64 / total as f64 * 100.0
    }

    /// Approximate total size of all entries in bytes.
    pub fn total_size_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|(k, e)| e.approx_size(k))
            .sum()
    }

    /// Iterates over `(key, entry)` pairs in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &CacheEntry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    /// Returns `true` if there are unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Renders cache statistics for the CLI.
    pub fn render_stats(&self) -> String {
        let mut out = String::new();
        let dir = self
            .cache_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "(uninitialized)".to_string());
        let _ = writeln!(out, "cache directory: {dir}");
        let _ = writeln!(out, "entries:         {}", self.entries.len());
        let _ = writeln!(out, "size:            {} bytes", self.total_size_bytes());
        let _ = writeln!(out, "hits:            {}", self.total_hits);
        let _ = writeln!(out, "misses:          {}", self.total_misses);
        let _ = writeln!(out, "hit rate:        {:.1}%", self.hit_rate());
        out
    }

    /// Renders the entry listing for the CLI.
    pub fn render_entries(&self) -> String {
        let mut out = String::new();
        for (key, e) in &self.entries {
            let _ = writeln!(out, "{}", e.module_name);
            let _ = writeln!(out, "  key:       {key}");
            let _ = writeln!(out, "  hash:      {:#018x}", e.fingerprint);
            let _ = writeln!(out, "  transform: {}", e.transform_tag);
            let _ = writeln!(out, "  hits:      {}", e.hits);
            let _ = writeln!(out, "  size:      {} bytes", e.data.len());
        }
        out
    }
}

impl Drop for ModuleCache {
    /// Persists pending writes on teardown, swallowing any failure: the
    /// destructor may run during process exit and correctness must not
    /// depend on it.
    fn drop(&mut self) {
        if self.cache_dir.is_some() && self.dirty {
            let _ = self.save_to_disk();
        }
    }
}

/// The artifact file for a key: a deterministic hash of the full key,
/// rendered as hex, under `modules/`.
fn artifact_path(cache_dir: &Path, key: &str) -> PathBuf {
    let hash = xxhash_rust::xxh3::xxh3_64(key.as_bytes());
    cache_dir.join(MODULES_SUBDIR).join(format!("{hash:016x}"))
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesper_ir::{fingerprint, CodecError, Module, PortDirection, Wire};

    /// Bincode codec mirroring the engine's; kept local so the cache crate
    /// stays independent of the engine.
    struct TestCodec;

    impl ModuleCodec for TestCodec {
        fn serialize_module(&self, module: &Module) -> Result<Vec<u8>, CodecError> {
            bincode::serde::encode_to_vec(module, bincode::config::standard()).map_err(|e| {
                CodecError::Encode {
                    reason: e.to_string(),
                }
            })
        }

        fn load_module(&self, data: &[u8], design: &mut Design) -> Result<String, CodecError> {
            let (module, _): (Module, usize) =
                bincode::serde::decode_from_slice(data, bincode::config::standard()).map_err(
                    |e| CodecError::Decode {
                        reason: e.to_string(),
                    },
                )?;
            let name = module.name().to_string();
            design.add_module(module);
            Ok(name)
        }
    }

    /// Codec that always produces empty output.
    struct EmptyCodec;

    impl ModuleCodec for EmptyCodec {
        fn serialize_module(&self, _module: &Module) -> Result<Vec<u8>, CodecError> {
            Ok(Vec::new())
        }

        fn load_module(&self, _data: &[u8], _design: &mut Design) -> Result<String, CodecError> {
            Err(CodecError::Decode {
                reason: "empty codec".to_string(),
            })
        }
    }

    fn sample_module(name: &str) -> Module {
        let mut m = Module::new(name);
        m.add_port("a", 4, PortDirection::Input);
        m.add_port("y", 4, PortDirection::Output);
        m.add_wire(Wire::new("t", 4));
        m
    }

    fn init_cache(dir: &Path) -> ModuleCache {
        let mut cache = ModuleCache::new();
        assert!(cache.init(Some(dir.to_path_buf())));
        cache
    }

    #[test]
    fn init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = init_cache(dir.path());
        assert!(cache.init(Some(dir.path().join("elsewhere"))));
        assert_eq!(cache.cache_dir(), Some(dir.path()));
    }

    #[test]
    fn init_failure_degrades() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the directory should go makes create_dir_all fail.
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, b"file").unwrap();
        let mut cache = ModuleCache::new();
        assert!(!cache.init(Some(blocked)));
        assert!(!cache.is_initialized());
        assert!(!cache.has("m", 1, "post_hierarchy"));
    }

    #[test]
    fn put_then_has_then_restore() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = init_cache(dir.path());
        let module = sample_module("add4");
        let fp = fingerprint(&module);

        assert!(!cache.has("add4", fp, "post_hierarchy"));
        assert!(cache.put("add4", fp, "post_hierarchy", &module, &TestCodec));
        assert!(cache.has("add4", fp, "post_hierarchy"));
        assert_eq!(cache.hit_count(), 1);
        assert_eq!(cache.miss_count(), 1);

        let mut design = Design::new();
        assert!(cache.restore("add4", fp, "post_hierarchy", &mut design, &TestCodec));
        let restored = design.module("add4").unwrap();
        assert_eq!(fingerprint(restored), fp);
    }

    #[test]
    fn empty_serializer_output_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = init_cache(dir.path());
        let module = sample_module("m");
        assert!(!cache.put("m", 1, "post_hierarchy", &module, &EmptyCodec));
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn uninitialized_cache_refuses_everything() {
        let mut cache = ModuleCache::new();
        let module = sample_module("m");
        assert!(!cache.put("m", 1, "t", &module, &TestCodec));
        assert!(!cache.has("m", 1, "t"));
        let mut design = Design::new();
        assert!(!cache.restore("m", 1, "t", &mut design, &TestCodec));
        assert!(matches!(
            cache.save_to_disk(),
            Err(CacheError::NotInitialized)
        ));
    }

    #[test]
    fn entries_for_different_tags_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = init_cache(dir.path());
        let module = sample_module("m");
        let fp = fingerprint(&module);
        assert!(cache.put("m", fp, "post_hierarchy", &module, &TestCodec));
        assert!(cache.put("m", fp, "post_techmap", &module, &TestCodec));
        assert_eq!(cache.entry_count(), 2);
    }

    #[test]
    fn invalidate_by_module_removes_all_tags() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = init_cache(dir.path());
        let module = sample_module("m");
        let fp = fingerprint(&module);
        cache.put("m", fp, "a", &module, &TestCodec);
        cache.put("m", fp, "b", &module, &TestCodec);
        cache.put("other", fp, "a", &sample_module("other"), &TestCodec);

        cache.invalidate("m");
        assert_eq!(cache.entry_count(), 1);
        assert!(cache.has("other", fp, "a"));
    }

    #[test]
    fn invalidate_exact_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = init_cache(dir.path());
        let module = sample_module("m");
        let fp = fingerprint(&module);
        cache.put("m", fp, "a", &module, &TestCodec);
        cache.put("m", fp, "b", &module, &TestCodec);

        cache.invalidate_entry("m", fp, "a");
        assert!(!cache.has("m", fp, "a"));
        assert!(cache.has("m", fp, "b"));
    }

    #[test]
    fn invalidate_affected_follows_dependents_transitively() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = init_cache(dir.path());
        for name in ["m1", "m2", "m3", "m4", "m5"] {
            let m = sample_module(name);
            cache.put(name, fingerprint(&m), "t", &m, &TestCodec);
        }

        // m1 <- m3 <- m5, m1 <- m4; m2 untouched.
        let mut dependents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        dependents.insert(
            "m1".into(),
            ["m3".to_string(), "m4".to_string()].into_iter().collect(),
        );
        dependents.insert("m3".into(), ["m5".to_string()].into_iter().collect());

        let changed: BTreeSet<String> = ["m1".to_string()].into_iter().collect();
        cache.invalidate_affected(&changed, &dependents);

        let surviving: Vec<&str> = cache.entries().map(|(_, e)| e.module_name.as_str()).collect();
        assert_eq!(surviving, vec!["m2"]);
    }

    #[test]
    fn invalidate_affected_terminates_on_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = init_cache(dir.path());
        for name in ["a", "b"] {
            let m = sample_module(name);
            cache.put(name, fingerprint(&m), "t", &m, &TestCodec);
        }
        let mut dependents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        dependents.insert("a".into(), ["b".to_string()].into_iter().collect());
        dependents.insert("b".into(), ["a".to_string()].into_iter().collect());

        let changed: BTreeSet<String> = ["a".to_string()].into_iter().collect();
        cache.invalidate_affected(&changed, &dependents);
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn entry_count_eviction_keeps_most_used() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = init_cache(dir.path());
        cache.set_max_entries(3);

        for name in ["e1", "e2", "e3"] {
            let m = sample_module(name);
            cache.put(name, fingerprint(&m), "t", &m, &TestCodec);
        }
        // Raise e1's and e3's hit counts through restores.
        let mut scratch = Design::new();
        for name in ["e1", "e3"] {
            let fp = fingerprint(&sample_module(name));
            assert!(cache.restore(name, fp, "t", &mut scratch, &TestCodec));
        }

        // A fourth entry pushes the count over the limit; e2 (0 hits) goes.
        let m4 = sample_module("e4");
        cache.put("e4", fingerprint(&m4), "t", &m4, &TestCodec);

        assert_eq!(cache.entry_count(), 3);
        let names: BTreeSet<&str> = cache.entries().map(|(_, e)| e.module_name.as_str()).collect();
        assert!(!names.contains("e2"));
        assert!(names.contains("e1"));
        assert!(names.contains("e3"));
        assert!(names.contains("e4"));
    }

    #[test]
    fn entry_count_never_exceeds_limit_after_put() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = init_cache(dir.path());
        cache.set_max_entries(10);
        for i in 0..25 {
            let m = sample_module(&format!("m{i}"));
            cache.put(&format!("m{i}"), fingerprint(&m), "t", &m, &TestCodec);
            assert!(cache.entry_count() <= 10);
        }
        assert_eq!(cache.entry_count(), 10);
    }

    #[test]
    fn size_eviction_bounds_total() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = init_cache(dir.path());
        cache.set_max_size_bytes(2048);
        for i in 0..20 {
            let mut m = sample_module(&format!("m{i}"));
            // Pad with wires so each artifact has real size.
            for w in 0..10 {
                m.add_wire(Wire::new(format!("pad{w}"), 32));
            }
            cache.put(&format!("m{i}"), fingerprint(&m), "t", &m, &TestCodec);
            assert!(cache.total_size_bytes() <= 2048);
        }
        assert!(cache.entry_count() < 20);
    }

    #[test]
    fn age_eviction_drops_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = init_cache(dir.path());
        let m = sample_module("old");
        cache.put("old", fingerprint(&m), "t", &m, &TestCodec);

        // Backdate the entry past the age limit.
        cache.set_max_age_seconds(60);
        let key = ModuleCache::make_key("old", fingerprint(&m), "t");
        cache.entries.get_mut(&key).unwrap().timestamp = now_unix() - 120;

        cache.evict_if_needed();
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn zero_age_limit_disables_age_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = init_cache(dir.path());
        cache.set_max_age_seconds(0);
        let m = sample_module("old");
        cache.put("old", fingerprint(&m), "t", &m, &TestCodec);
        let key = ModuleCache::make_key("old", fingerprint(&m), "t");
        cache.entries.get_mut(&key).unwrap().timestamp = 0;

        cache.evict_if_needed();
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let module = sample_module("add4");
        let fp = fingerprint(&module);

        {
            let mut cache = init_cache(dir.path());
            assert!(cache.put("add4", fp, "post_hierarchy", &module, &TestCodec));
            cache.save_to_disk().unwrap();
            assert!(!cache.is_dirty());
        }

        let mut cache = init_cache(dir.path());
        assert_eq!(cache.entry_count(), 1);
        assert!(cache.has("add4", fp, "post_hierarchy"));

        // Artifact bytes load lazily on restore.
        let mut design = Design::new();
        assert!(cache.restore("add4", fp, "post_hierarchy", &mut design, &TestCodec));
        assert_eq!(fingerprint(design.module("add4").unwrap()), fp);
    }

    #[test]
    fn reload_drops_entry_with_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let module = sample_module("m");
        let fp = fingerprint(&module);

        {
            let mut cache = init_cache(dir.path());
            cache.put("m", fp, "t", &module, &TestCodec);
            cache.save_to_disk().unwrap();
        }

        // Delete the artifact file behind the index's back.
        let key = ModuleCache::make_key("m", fp, "t");
        std::fs::remove_file(artifact_path(dir.path(), &key)).unwrap();

        let mut cache = init_cache(dir.path());
        assert_eq!(cache.entry_count(), 0);
        assert!(!cache.has("m", fp, "t"));
    }

    #[test]
    fn malformed_index_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(MODULES_SUBDIR)).unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), "{{{ nope").unwrap();
        let cache = init_cache(dir.path());
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn wrong_version_index_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(MODULES_SUBDIR)).unwrap();
        std::fs::write(
            dir.path().join(INDEX_FILE),
            r#"{"version": 99, "entries": []}"#,
        )
        .unwrap();
        let cache = init_cache(dir.path());
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn index_entry_with_empty_name_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(MODULES_SUBDIR)).unwrap();
        std::fs::write(
            dir.path().join(INDEX_FILE),
            r#"{"version": 1, "entries": [{"key": "|0|t", "module_name": "",
                "hash": 0, "transform_tag": "t", "timestamp": 0, "hits": 0}]}"#,
        )
        .unwrap();
        let cache = init_cache(dir.path());
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn drop_persists_dirty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let module = sample_module("m");
        let fp = fingerprint(&module);
        {
            let mut cache = init_cache(dir.path());
            cache.put("m", fp, "t", &module, &TestCodec);
            // No explicit save; Drop should persist.
        }
        let mut cache = init_cache(dir.path());
        assert!(cache.has("m", fp, "t"));
    }

    #[test]
    fn clear_removes_entries_and_resets_counters() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = init_cache(dir.path());
        let module = sample_module("m");
        let fp = fingerprint(&module);
        cache.put("m", fp, "t", &module, &TestCodec);
        cache.has("m", fp, "t");

        cache.clear();
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.hit_count(), 0);
        assert_eq!(cache.miss_count(), 0);
    }

    #[test]
    fn stats_render() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = init_cache(dir.path());
        let module = sample_module("m");
        let fp = fingerprint(&module);
        cache.put("m", fp, "t", &module, &TestCodec);
        cache.has("m", fp, "t");
        cache.has("m", fp.wrapping_add(1), "t");

        let stats = cache.render_stats();
        assert!(stats.contains("entries:         1"));
        assert!(stats.contains("hit rate:        50.0%"));
        assert!(cache.render_entries().contains("m"));
    }

    #[test]
    fn key_format() {
        assert_eq!(
            ModuleCache::make_key("add4", 0xab, "post_hierarchy"),
            "add4|ab|post_hierarchy"
        );
    }
}
