//! The versioned on-disk index document.
//!
//! The index is a single JSON file listing every cache entry's metadata;
//! artifact bytes live in separate per-entry files. Loading is fail-safe:
//! a document that does not parse, is not version 1, or is otherwise
//! malformed degrades to an empty cache with a warning.

use serde::{Deserialize, Serialize};

/// The index document version this build reads and writes.
pub const INDEX_VERSION: u32 = 1;

/// Name of the index file within the cache directory.
pub const INDEX_FILE: &str = "index";

/// Name of the artifact subdirectory within the cache directory.
pub const MODULES_SUBDIR: &str = "modules";

/// The top-level index document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDoc {
    /// Document version; must equal [`INDEX_VERSION`] to load.
    pub version: u32,
    /// All cache entries.
    pub entries: Vec<IndexEntry>,
}

/// One cache entry's metadata in the index document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// The canonical cache key (`name|hex(hash)|tag`).
    pub key: String,
    /// The module name. Entries with empty names are skipped on load.
    pub module_name: String,
    /// The 64-bit content fingerprint.
    pub hash: u64,
    /// The transform-sequence tag that produced the artifact.
    pub transform_tag: String,
    /// Insertion time, seconds since the UNIX epoch.
    pub timestamp: i64,
    /// Hit counter at save time.
    pub hits: u64,
}

/// Parses an index document, enforcing the version. Returns `None` (with a
/// warning) for anything that cannot be loaded verbatim.
pub fn parse_index(content: &str) -> Option<IndexDoc> {
    let doc: IndexDoc = match serde_json::from_str(content) {
        Ok(doc) => doc,
        Err(err) => {
            log::warn!("cache index is malformed, starting empty: {err}");
            return None;
        }
    };
    if doc.version != INDEX_VERSION {
        log::warn!(
            "cache index version {} is not {INDEX_VERSION}, starting empty",
            doc.version
        );
        return None;
    }
    Some(doc)
}
