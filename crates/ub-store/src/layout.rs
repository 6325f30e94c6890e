//! Storage layout constants and the chunk metadata record
//!
//! The block list lives under a fixed family of keys: a metadata record that
//! is the single source of truth for reconstruction, plus one key per chunk.
//! Field names are camelCase because a JS extension host reads the same
//! records.

use serde::{Deserialize, Serialize};

/// Key of the pre-chunking record (one flat array). Migrated on first read.
pub const LEGACY_KEY: &str = "blockedUsers";

/// Key of the metadata record.
pub const META_KEY: &str = "blockedUsersMeta";

/// Prefix of the per-chunk keys; the chunk index follows.
pub const CHUNK_KEY_PREFIX: &str = "blockedUsersChunk_";

/// Patterns per chunk. Sized so a full chunk of worst-case names stays
/// within an 8 KB per-item storage quota.
pub const DEFAULT_CHUNK_CAPACITY: usize = 100;

pub fn chunk_key(index: usize) -> String {
    format!("{CHUNK_KEY_PREFIX}{index}")
}

/// Parse a chunk index back out of a storage key.
pub fn parse_chunk_key(key: &str) -> Option<usize> {
    key.strip_prefix(CHUNK_KEY_PREFIX)?.parse().ok()
}

/// Metadata record reconstructing the list from its chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
    pub total_count: usize,
    pub chunk_count: usize,
    /// Epoch milliseconds of the last successful write.
    pub last_updated: i64,
}

impl ChunkMeta {
    pub fn new(total_count: usize, chunk_count: usize) -> Self {
        Self {
            total_count,
            chunk_count,
            last_updated: chrono::Utc::now().timestamp_millis(),
        }
    }
}
